//! List operations: LPUSH, RPUSH, LPOP, RPOP, LLEN, LRANGE.

use std::collections::VecDeque;

use crate::error::WrongType;
use crate::types::{normalize_range, Value};

use super::Keyspace;

impl Keyspace {
    fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<String>, WrongType> {
        match self.entry_for_write(key, || Value::List(VecDeque::new())) {
            Value::List(list) => Ok(list),
            _ => Err(WrongType),
        }
    }

    /// Pushes values onto the head, first value ending up outermost.
    /// Returns the new length.
    pub fn lpush(&mut self, key: &str, values: Vec<String>) -> Result<usize, WrongType> {
        let list = self.list_mut(key)?;
        for v in values {
            list.push_front(v);
        }
        Ok(list.len())
    }

    /// Appends values at the tail. Returns the new length.
    pub fn rpush(&mut self, key: &str, values: Vec<String>) -> Result<usize, WrongType> {
        let list = self.list_mut(key)?;
        for v in values {
            list.push_back(v);
        }
        Ok(list.len())
    }

    /// Pops from the head.
    pub fn lpop(&mut self, key: &str) -> Result<Option<String>, WrongType> {
        match self.value_mut(key) {
            None => Ok(None),
            Some(Value::List(list)) => Ok(list.pop_front()),
            Some(_) => Err(WrongType),
        }
    }

    /// Pops from the tail.
    pub fn rpop(&mut self, key: &str) -> Result<Option<String>, WrongType> {
        match self.value_mut(key) {
            None => Ok(None),
            Some(Value::List(list)) => Ok(list.pop_back()),
            Some(_) => Err(WrongType),
        }
    }

    /// List length; 0 when the key is missing.
    pub fn llen(&mut self, key: &str) -> Result<usize, WrongType> {
        match self.value(key) {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len()),
            Some(_) => Err(WrongType),
        }
    }

    /// Elements between `start` and `stop` inclusive, with negative
    /// indices from the tail.
    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, WrongType> {
        let list = match self.value(key) {
            None => return Ok(Vec::new()),
            Some(Value::List(list)) => list,
            Some(_) => return Err(WrongType),
        };

        let (s, e) = normalize_range(start, stop, list.len() as i64);
        if s > e {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(s as usize)
            .take((e - s + 1) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn push_pop_both_ends() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.rpush("l", strs(&["b", "c"])).unwrap(), 2);
        assert_eq!(ks.lpush("l", strs(&["a"])).unwrap(), 3);

        assert_eq!(ks.lpop("l").unwrap(), Some("a".into()));
        assert_eq!(ks.rpop("l").unwrap(), Some("c".into()));
        assert_eq!(ks.llen("l").unwrap(), 1);
    }

    #[test]
    fn lpush_order_is_reversed() {
        let mut ks = Keyspace::new();
        ks.lpush("l", strs(&["a", "b", "c"])).unwrap();
        assert_eq!(ks.lrange("l", 0, -1).unwrap(), strs(&["c", "b", "a"]));
    }

    #[test]
    fn pop_on_missing_or_empty() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.lpop("nope").unwrap(), None);

        ks.rpush("l", strs(&["only"])).unwrap();
        assert_eq!(ks.rpop("l").unwrap(), Some("only".into()));
        // the empty list stays as a zero-length value
        assert_eq!(ks.rpop("l").unwrap(), None);
        assert!(ks.exists("l"));
    }

    #[test]
    fn lrange_negative_indices() {
        let mut ks = Keyspace::new();
        ks.rpush("l", strs(&["a", "b", "c", "d", "e"])).unwrap();
        assert_eq!(ks.lrange("l", -2, -1).unwrap(), strs(&["d", "e"]));
        assert_eq!(ks.lrange("l", 1, 3).unwrap(), strs(&["b", "c", "d"]));
        assert_eq!(ks.lrange("l", 0, 100).unwrap().len(), 5);
        assert!(ks.lrange("l", 3, 1).unwrap().is_empty());
        assert!(ks.lrange("missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn wrong_type_errors() {
        let mut ks = Keyspace::new();
        ks.set("s", "v".into(), None);
        assert_eq!(ks.lpush("s", strs(&["x"])), Err(WrongType));
        assert_eq!(ks.llen("s"), Err(WrongType));
        assert_eq!(ks.lrange("s", 0, -1), Err(WrongType));
    }
}
