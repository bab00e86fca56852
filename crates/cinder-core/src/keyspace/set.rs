//! Set operations: SADD, SREM, SMEMBERS, SISMEMBER, SUNION, SINTER, SDIFF.

use std::collections::HashSet;

use crate::error::WrongType;
use crate::types::Value;

use super::Keyspace;

impl Keyspace {
    fn set_mut(&mut self, key: &str) -> Result<&mut HashSet<String>, WrongType> {
        match self.entry_for_write(key, || Value::Set(HashSet::new())) {
            Value::Set(set) => Ok(set),
            _ => Err(WrongType),
        }
    }

    fn set_ref(&mut self, key: &str) -> Result<Option<&HashSet<String>>, WrongType> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Set(set)) => Ok(Some(set)),
            Some(_) => Err(WrongType),
        }
    }

    /// Adds members. Returns how many were actually new.
    pub fn sadd(&mut self, key: &str, members: Vec<String>) -> Result<usize, WrongType> {
        let set = self.set_mut(key)?;
        let mut added = 0;
        for m in members {
            if set.insert(m) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes members. Returns how many were present.
    pub fn srem(&mut self, key: &str, members: &[String]) -> Result<usize, WrongType> {
        match self.value_mut(key) {
            None => Ok(0),
            Some(Value::Set(set)) => {
                Ok(members.iter().filter(|m| set.remove(m.as_str())).count())
            }
            Some(_) => Err(WrongType),
        }
    }

    /// All members, sorted for deterministic output.
    pub fn smembers(&mut self, key: &str) -> Result<Vec<String>, WrongType> {
        let mut members: Vec<String> = match self.set_ref(key)? {
            None => return Ok(Vec::new()),
            Some(set) => set.iter().cloned().collect(),
        };
        members.sort();
        Ok(members)
    }

    /// Membership test.
    pub fn sismember(&mut self, key: &str, member: &str) -> Result<bool, WrongType> {
        Ok(self
            .set_ref(key)?
            .is_some_and(|set| set.contains(member)))
    }

    /// Union across keys; missing keys read as empty.
    pub fn sunion(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let mut union = HashSet::new();
        for key in keys {
            if let Some(set) = self.set_ref(key)? {
                union.extend(set.iter().cloned());
            }
        }
        let mut members: Vec<String> = union.into_iter().collect();
        members.sort();
        Ok(members)
    }

    /// Intersection across keys; any missing key makes it empty.
    pub fn sinter(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let mut inter: HashSet<String> = match self.set_ref(first)? {
            None => return Ok(Vec::new()),
            Some(set) => set.clone(),
        };
        for key in rest {
            match self.set_ref(key)? {
                None => return Ok(Vec::new()),
                Some(set) => inter.retain(|m| set.contains(m)),
            }
        }
        let mut members: Vec<String> = inter.into_iter().collect();
        members.sort();
        Ok(members)
    }

    /// Members of the first set not present in any of the rest.
    pub fn sdiff(&mut self, keys: &[String]) -> Result<Vec<String>, WrongType> {
        let Some((first, rest)) = keys.split_first() else {
            return Ok(Vec::new());
        };
        let mut diff: HashSet<String> = match self.set_ref(first)? {
            None => return Ok(Vec::new()),
            Some(set) => set.clone(),
        };
        for key in rest {
            if let Some(set) = self.set_ref(key)? {
                diff.retain(|m| !set.contains(m));
            }
        }
        let mut members: Vec<String> = diff.into_iter().collect();
        members.sort();
        Ok(members)
    }
}
