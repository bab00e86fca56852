//! Sorted set operations: ZADD, ZRANGE, ZRANK, ZREM, ZRANGEBYSCORE.

use crate::error::WrongType;
use crate::types::skiplist::SortedSet;
use crate::types::Value;

use super::Keyspace;

impl Keyspace {
    fn zset_mut(&mut self, key: &str) -> Result<&mut SortedSet, WrongType> {
        match self.entry_for_write(key, || Value::ZSet(SortedSet::new())) {
            Value::ZSet(set) => Ok(set),
            _ => Err(WrongType),
        }
    }

    fn zset_ref(&mut self, key: &str) -> Result<Option<&SortedSet>, WrongType> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::ZSet(set)) => Ok(Some(set)),
            Some(_) => Err(WrongType),
        }
    }

    /// Adds a member or moves it to a new score. Returns 1 on insert,
    /// 0 on update.
    pub fn zadd(&mut self, key: &str, score: f64, member: &str) -> Result<usize, WrongType> {
        let set = self.zset_mut(key)?;
        Ok(usize::from(set.insert(member, score)))
    }

    /// Members in the given rank range, inclusive, negative indices
    /// from the tail.
    pub fn zrange(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, WrongType> {
        match self.zset_ref(key)? {
            None => Ok(Vec::new()),
            Some(set) => Ok(set
                .range_by_rank(start, stop)
                .into_iter()
                .map(|(m, _)| m.to_owned())
                .collect()),
        }
    }

    /// 0-based rank of a member in ascending order.
    pub fn zrank(&mut self, key: &str, member: &str) -> Result<Option<usize>, WrongType> {
        match self.zset_ref(key)? {
            None => Ok(None),
            Some(set) => Ok(set.rank(member)),
        }
    }

    /// Removes a member. Returns `true` when it existed.
    pub fn zrem(&mut self, key: &str, member: &str) -> Result<bool, WrongType> {
        match self.value_mut(key) {
            None => Ok(false),
            Some(Value::ZSet(set)) => Ok(set.remove(member)),
            Some(_) => Err(WrongType),
        }
    }

    /// Members with scores in the closed interval `[min, max]`.
    pub fn zrangebyscore(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, WrongType> {
        match self.zset_ref(key)? {
            None => Ok(Vec::new()),
            Some(set) => Ok(set
                .range_by_score(min, max)
                .into_iter()
                .map(|(m, _)| m.to_owned())
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zadd_insert_and_update_counts() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.zadd("z", 1.0, "a").unwrap(), 1);
        assert_eq!(ks.zadd("z", 2.0, "a").unwrap(), 0);
    }

    #[test]
    fn zrange_orders_by_score_then_member() {
        let mut ks = Keyspace::new();
        ks.zadd("z", 2.0, "b").unwrap();
        ks.zadd("z", 1.0, "a").unwrap();
        ks.zadd("z", 3.0, "c").unwrap();

        assert_eq!(
            ks.zrange("z", 0, 2).unwrap(),
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]
        );
        assert_eq!(
            ks.zrange("z", -2, -1).unwrap(),
            vec!["b".to_owned(), "c".to_owned()]
        );
        assert!(ks.zrange("missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn zrange_after_updates_has_no_duplicates() {
        let mut ks = Keyspace::new();
        ks.zadd("z", 1.0, "a").unwrap();
        ks.zadd("z", 5.0, "a").unwrap();
        ks.zadd("z", 3.0, "b").unwrap();

        assert_eq!(
            ks.zrange("z", 0, -1).unwrap(),
            vec!["b".to_owned(), "a".to_owned()]
        );
    }

    #[test]
    fn zrank_and_zrem() {
        let mut ks = Keyspace::new();
        ks.zadd("z", 1.0, "a").unwrap();
        ks.zadd("z", 2.0, "b").unwrap();
        ks.zadd("z", 3.0, "c").unwrap();

        assert_eq!(ks.zrank("z", "b").unwrap(), Some(1));
        assert!(ks.zrem("z", "b").unwrap());
        assert_eq!(ks.zrank("z", "b").unwrap(), None);
        assert_eq!(ks.zrank("z", "c").unwrap(), Some(1));
        assert!(!ks.zrem("z", "b").unwrap());
    }

    #[test]
    fn zrangebyscore_inclusive_with_ties() {
        let mut ks = Keyspace::new();
        ks.zadd("z", 1.0, "a").unwrap();
        ks.zadd("z", 2.0, "beta").unwrap();
        ks.zadd("z", 2.0, "alpha").unwrap();
        ks.zadd("z", 3.0, "d").unwrap();

        assert_eq!(
            ks.zrangebyscore("z", 2.0, 3.0).unwrap(),
            vec!["alpha".to_owned(), "beta".to_owned(), "d".to_owned()]
        );
    }

    #[test]
    fn wrong_type_errors() {
        let mut ks = Keyspace::new();
        ks.set("s", "v".into(), None);
        assert_eq!(ks.zadd("s", 1.0, "a"), Err(WrongType));
        assert_eq!(ks.zrange("s", 0, -1), Err(WrongType));
    }
}
