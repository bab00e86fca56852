//! Sorted set backed by a probabilistic skip list.
//!
//! Members are ordered by `(score, member)` — ties in score are broken
//! lexicographically. The skip list gives expected O(log n) insert and
//! remove; a member → score map gives O(1) score lookups.
//!
//! Nodes live in an arena (`Vec<Node>`) and link to each other by
//! index, with a free list for recycling removed slots. Index links
//! sidestep the aliasing problems a pointer-based list would have.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maximum number of levels in the skip list.
const MAX_LEVEL: usize = 16;

/// Probability of promoting a node to the next level.
const PROMOTE_P: f64 = 0.5;

/// Sentinel index meaning "no next node".
const NIL: usize = usize::MAX;

/// Arena slot index of the head sentinel.
const HEAD: usize = 0;

#[derive(Debug, Clone)]
struct Node {
    score: f64,
    member: String,
    /// Forward links, one per level this node participates in.
    forward: Vec<usize>,
}

/// A sorted set of unique string members, each with a float score.
///
/// Serialized as a flat `(score, member)` list and rebuilt on decode,
/// so the arena layout never leaks into the snapshot format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "Vec<(f64, String)>", from = "Vec<(f64, String)>")]
pub struct SortedSet {
    nodes: Vec<Node>,
    free: Vec<usize>,
    scores: HashMap<String, f64>,
    /// Highest level currently in use (≥ 1).
    level: usize,
}

/// Total order on `(score, member)` pairs. Scores are never NaN —
/// command parsing rejects them before they reach the set.
fn key_less(a_score: f64, a_member: &str, b_score: f64, b_member: &str) -> bool {
    match a_score.partial_cmp(&b_score) {
        Some(Ordering::Less) => true,
        Some(Ordering::Greater) => false,
        _ => a_member < b_member,
    }
}

impl SortedSet {
    /// Creates an empty sorted set.
    pub fn new() -> Self {
        let head = Node {
            score: f64::NEG_INFINITY,
            member: String::new(),
            forward: vec![NIL; MAX_LEVEL],
        };
        Self {
            nodes: vec![head],
            free: Vec::new(),
            scores: HashMap::new(),
            level: 1,
        }
    }

    /// Adds a member or updates its score in place (remove + reinsert
    /// at the new position). Returns `true` if the member was newly
    /// inserted, `false` if an existing member was updated.
    pub fn insert(&mut self, member: &str, score: f64) -> bool {
        if let Some(&old) = self.scores.get(member) {
            if old == score {
                return false;
            }
            self.unlink(old, member);
            self.link(member, score);
            self.scores.insert(member.to_owned(), score);
            false
        } else {
            self.link(member, score);
            self.scores.insert(member.to_owned(), score);
            true
        }
    }

    /// Removes a member. Returns `true` if it existed.
    pub fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.unlink(score, member);
                true
            }
            None => false,
        }
    }

    /// Returns the score for a member, or `None` if not present.
    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Returns the 0-based rank of a member: the count of members with
    /// a strictly smaller `(score, member)` pair.
    pub fn rank(&self, member: &str) -> Option<usize> {
        self.scores.get(member)?;
        self.iter().position(|(m, _)| m == member)
    }

    /// Returns members in the given rank range, inclusive on both
    /// ends. Negative indices count back from the tail.
    pub fn range_by_rank(&self, start: i64, stop: i64) -> Vec<(&str, f64)> {
        let (s, e) = super::normalize_range(start, stop, self.len() as i64);
        if s > e {
            return Vec::new();
        }
        self.iter()
            .skip(s as usize)
            .take((e - s + 1) as usize)
            .collect()
    }

    /// Returns members whose score lies in the closed interval
    /// `[min, max]`, in `(score, member)` order.
    pub fn range_by_score(&self, min: f64, max: f64) -> Vec<(&str, f64)> {
        self.iter()
            .skip_while(|(_, s)| *s < min)
            .take_while(|(_, s)| *s <= max)
            .collect()
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Returns `true` if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Iterates over `(member, score)` pairs in `(score, member)` order
    /// by walking the level-0 links.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        Walk {
            set: self,
            next: self.nodes[HEAD].forward[0],
        }
    }

    /// Draws a level in `[1, MAX_LEVEL]` with geometric distribution.
    fn random_level(&self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && rand::random::<f64>() < PROMOTE_P {
            level += 1;
        }
        level
    }

    /// Finds, per level, the rightmost node strictly before
    /// `(score, member)`.
    fn predecessors(&self, score: f64, member: &str) -> [usize; MAX_LEVEL] {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;
        for lvl in (0..self.level).rev() {
            loop {
                let next = self.nodes[x].forward[lvl];
                if next != NIL
                    && key_less(self.nodes[next].score, &self.nodes[next].member, score, member)
                {
                    x = next;
                } else {
                    break;
                }
            }
            update[lvl] = x;
        }
        update
    }

    /// Splices a new node into the list.
    fn link(&mut self, member: &str, score: f64) {
        let mut update = self.predecessors(score, member);
        let node_level = self.random_level();
        if node_level > self.level {
            for slot in update.iter_mut().take(node_level).skip(self.level) {
                *slot = HEAD;
            }
            self.level = node_level;
        }

        let node = Node {
            score,
            member: member.to_owned(),
            forward: vec![NIL; node_level],
        };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        for lvl in 0..node_level {
            self.nodes[idx].forward[lvl] = self.nodes[update[lvl]].forward[lvl];
            self.nodes[update[lvl]].forward[lvl] = idx;
        }
    }

    /// Unsplices the node for `(score, member)` from the list.
    fn unlink(&mut self, score: f64, member: &str) {
        let update = self.predecessors(score, member);
        let target = self.nodes[update[0]].forward[0];
        debug_assert!(target != NIL && self.nodes[target].member == member);

        for lvl in 0..self.level {
            if self.nodes[update[lvl]].forward[lvl] == target {
                self.nodes[update[lvl]].forward[lvl] = self.nodes[target].forward[lvl];
            }
        }
        self.free.push(target);

        // shrink the active level while the top is empty
        while self.level > 1 && self.nodes[HEAD].forward[self.level - 1] == NIL {
            self.level -= 1;
        }
    }
}

struct Walk<'a> {
    set: &'a SortedSet,
    next: usize,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (&'a str, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let node = &self.set.nodes[self.next];
        self.next = node.forward[0];
        Some((node.member.as_str(), node.score))
    }
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for SortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl From<SortedSet> for Vec<(f64, String)> {
    fn from(set: SortedSet) -> Self {
        set.iter().map(|(m, s)| (s, m.to_owned())).collect()
    }
}

impl From<Vec<(f64, String)>> for SortedSet {
    fn from(pairs: Vec<(f64, String)>) -> Self {
        let mut set = SortedSet::new();
        for (score, member) in pairs {
            set.insert(&member, score);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_score() {
        let mut ss = SortedSet::new();
        assert!(ss.insert("alice", 100.0));
        assert_eq!(ss.score("alice"), Some(100.0));
        assert_eq!(ss.len(), 1);
    }

    #[test]
    fn update_existing_score() {
        let mut ss = SortedSet::new();
        ss.insert("alice", 100.0);
        assert!(!ss.insert("alice", 200.0));
        assert_eq!(ss.score("alice"), Some(200.0));
        assert_eq!(ss.len(), 1);
    }

    #[test]
    fn remove_existing() {
        let mut ss = SortedSet::new();
        ss.insert("alice", 100.0);
        assert!(ss.remove("alice"));
        assert!(ss.is_empty());
        assert_eq!(ss.score("alice"), None);
    }

    #[test]
    fn remove_nonexistent() {
        let mut ss = SortedSet::new();
        assert!(!ss.remove("nobody"));
    }

    #[test]
    fn rank_ordering() {
        let mut ss = SortedSet::new();
        ss.insert("c", 300.0);
        ss.insert("a", 100.0);
        ss.insert("b", 200.0);

        assert_eq!(ss.rank("a"), Some(0));
        assert_eq!(ss.rank("b"), Some(1));
        assert_eq!(ss.rank("c"), Some(2));
        assert_eq!(ss.rank("d"), None);
    }

    #[test]
    fn equal_scores_lexicographic_order() {
        let mut ss = SortedSet::new();
        ss.insert("charlie", 100.0);
        ss.insert("alice", 100.0);
        ss.insert("bob", 100.0);

        assert_eq!(ss.rank("alice"), Some(0));
        assert_eq!(ss.rank("bob"), Some(1));
        assert_eq!(ss.rank("charlie"), Some(2));
    }

    #[test]
    fn iter_sorted_order() {
        let mut ss = SortedSet::new();
        ss.insert("c", 3.0);
        ss.insert("a", 1.0);
        ss.insert("b", 2.0);

        let items: Vec<_> = ss.iter().collect();
        assert_eq!(items, vec![("a", 1.0), ("b", 2.0), ("c", 3.0)]);
    }

    #[test]
    fn update_score_changes_rank() {
        let mut ss = SortedSet::new();
        ss.insert("a", 10.0);
        ss.insert("b", 20.0);
        ss.insert("c", 30.0);

        assert_eq!(ss.rank("a"), Some(0));

        // move "a" to the top
        ss.insert("a", 50.0);
        assert_eq!(ss.rank("a"), Some(2));
        assert_eq!(ss.rank("b"), Some(0));
    }

    #[test]
    fn range_by_rank_basic() {
        let mut ss = SortedSet::new();
        ss.insert("a", 10.0);
        ss.insert("b", 20.0);
        ss.insert("c", 30.0);

        let result = ss.range_by_rank(0, -1);
        assert_eq!(result, vec![("a", 10.0), ("b", 20.0), ("c", 30.0)]);

        let result = ss.range_by_rank(1, 1);
        assert_eq!(result, vec![("b", 20.0)]);

        let result = ss.range_by_rank(-2, -1);
        assert_eq!(result, vec![("b", 20.0), ("c", 30.0)]);
    }

    #[test]
    fn range_by_rank_out_of_bounds() {
        let mut ss = SortedSet::new();
        ss.insert("a", 10.0);

        assert!(ss.range_by_rank(2, 1).is_empty());
        assert!(ss.range_by_rank(5, 10).is_empty());
        let empty = SortedSet::new();
        assert!(empty.range_by_rank(0, -1).is_empty());
    }

    #[test]
    fn range_by_score_closed_interval() {
        let mut ss = SortedSet::new();
        ss.insert("a", 1.0);
        ss.insert("b", 2.0);
        ss.insert("c", 3.0);
        ss.insert("d", 4.0);

        let result = ss.range_by_score(2.0, 3.0);
        assert_eq!(result, vec![("b", 2.0), ("c", 3.0)]);
    }

    #[test]
    fn range_by_score_ties_in_member_order() {
        let mut ss = SortedSet::new();
        ss.insert("beta", 5.0);
        ss.insert("alpha", 5.0);
        ss.insert("gamma", 5.0);

        let result = ss.range_by_score(5.0, 5.0);
        let members: Vec<_> = result.iter().map(|(m, _)| *m).collect();
        assert_eq!(members, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn positive_and_negative_infinity_scores() {
        let mut ss = SortedSet::new();
        ss.insert("normal", 100.0);
        ss.insert("top", f64::INFINITY);
        ss.insert("bottom", f64::NEG_INFINITY);

        assert_eq!(ss.rank("bottom"), Some(0));
        assert_eq!(ss.rank("normal"), Some(1));
        assert_eq!(ss.rank("top"), Some(2));
    }

    #[test]
    fn arena_slot_reuse_preserves_order() {
        let mut ss = SortedSet::new();
        for i in 0..50 {
            ss.insert(&format!("m{i:02}"), i as f64);
        }
        for i in (0..50).step_by(2) {
            assert!(ss.remove(&format!("m{i:02}")));
        }
        for i in (0..50).step_by(2) {
            ss.insert(&format!("m{i:02}"), i as f64);
        }

        assert_eq!(ss.len(), 50);
        let items: Vec<_> = ss.iter().map(|(_, s)| s).collect();
        let mut sorted = items.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(items, sorted);
    }

    #[test]
    fn many_members_stay_ordered() {
        let mut ss = SortedSet::new();
        // insert in a scrambled order
        for i in 0..500u32 {
            let k = (i * 7919) % 500;
            ss.insert(&format!("m{k:03}"), k as f64);
        }
        assert_eq!(ss.len(), 500);
        let scores: Vec<_> = ss.iter().map(|(_, s)| s).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn serde_round_trip() {
        let mut ss = SortedSet::new();
        ss.insert("a", 1.5);
        ss.insert("b", -2.0);
        ss.insert("c", 0.0);

        let json = serde_json::to_string(&ss).unwrap();
        let back: SortedSet = serde_json::from_str(&json).unwrap();
        assert_eq!(ss, back);
    }
}
