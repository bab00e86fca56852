//! Hash operations: HSET, HGET, HMSET, HGETALL, HDEL, HEXISTS.

use std::collections::HashMap;

use crate::error::WrongType;
use crate::types::Value;

use super::Keyspace;

impl Keyspace {
    fn hash_mut(&mut self, key: &str) -> Result<&mut HashMap<String, String>, WrongType> {
        match self.entry_for_write(key, || Value::Hash(HashMap::new())) {
            Value::Hash(hash) => Ok(hash),
            _ => Err(WrongType),
        }
    }

    /// Sets one field. Returns 1 when the field is new, 0 on update.
    pub fn hset(&mut self, key: &str, field: &str, value: String) -> Result<usize, WrongType> {
        let hash = self.hash_mut(key)?;
        let added = hash.insert(field.to_owned(), value).is_none();
        Ok(usize::from(added))
    }

    /// Sets many fields at once.
    pub fn hmset(&mut self, key: &str, fields: Vec<(String, String)>) -> Result<(), WrongType> {
        let hash = self.hash_mut(key)?;
        for (field, value) in fields {
            hash.insert(field, value);
        }
        Ok(())
    }

    /// Fetches one field.
    pub fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, WrongType> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(WrongType),
        }
    }

    /// All fields and values, sorted by field for deterministic output.
    /// `None` when the key doesn't exist.
    pub fn hgetall(&mut self, key: &str) -> Result<Option<Vec<(String, String)>>, WrongType> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Hash(hash)) => {
                let mut pairs: Vec<_> = hash
                    .iter()
                    .map(|(f, v)| (f.clone(), v.clone()))
                    .collect();
                pairs.sort();
                Ok(Some(pairs))
            }
            Some(_) => Err(WrongType),
        }
    }

    /// Deletes a field. Returns 1 when it existed.
    pub fn hdel(&mut self, key: &str, field: &str) -> Result<usize, WrongType> {
        match self.value_mut(key) {
            None => Ok(0),
            Some(Value::Hash(hash)) => Ok(usize::from(hash.remove(field).is_some())),
            Some(_) => Err(WrongType),
        }
    }

    /// Whether a field exists.
    pub fn hexists(&mut self, key: &str, field: &str) -> Result<bool, WrongType> {
        match self.value(key) {
            None => Ok(false),
            Some(Value::Hash(hash)) => Ok(hash.contains_key(field)),
            Some(_) => Err(WrongType),
        }
    }
}
