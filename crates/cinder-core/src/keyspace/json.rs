//! JSON document operations: JSON.SET, JSON.GET, JSON.DEL, JSON.ARRAPPEND.
//!
//! Documents are stored decoded (`serde_json::Value`) and serialized
//! on read, so set→get round-trips are stable. Paths are dot-separated
//! object keys; `.` addresses the root. Intermediate objects are
//! created on write.

use serde_json::Value as Json;
use thiserror::Error;

use crate::types::Value;

use super::Keyspace;

/// Errors from JSON document operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JsonError {
    /// Key holds a non-document type.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    /// Operation on a key that doesn't exist.
    #[error("key not found")]
    KeyNotFound,
    /// A path segment didn't resolve.
    #[error("path not found")]
    PathNotFound,
    /// ARRAPPEND against a non-array.
    #[error("path does not point to an array")]
    NotAnArray,
    /// The value argument wasn't valid JSON.
    #[error("invalid JSON value")]
    InvalidJson,
}

/// Splits a path into segments; `.` or the empty string is the root.
fn segments(path: &str) -> Vec<&str> {
    let trimmed = path.trim_start_matches('.');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('.').collect()
    }
}

impl Keyspace {
    fn doc_mut(&mut self, key: &str) -> Result<Option<&mut Json>, JsonError> {
        match self.value_mut(key) {
            None => Ok(None),
            Some(Value::Json(doc)) => Ok(Some(doc)),
            Some(_) => Err(JsonError::WrongType),
        }
    }

    /// Stores `raw` (a JSON literal) at `path`, creating the document
    /// and any intermediate objects as needed.
    pub fn json_set(&mut self, key: &str, path: &str, raw: &str) -> Result<(), JsonError> {
        let parsed: Json = serde_json::from_str(raw).map_err(|_| JsonError::InvalidJson)?;
        let segs = segments(path);

        if segs.is_empty() {
            self.set_value(key, Value::Json(parsed));
            return Ok(());
        }

        if self.value(key).is_none() {
            self.set_value(key, Value::Json(Json::Object(Default::default())));
        }
        let doc = self.doc_mut(key)?.expect("document exists");

        let mut current = doc;
        for seg in &segs[..segs.len() - 1] {
            let obj = current.as_object_mut().ok_or(JsonError::PathNotFound)?;
            current = obj
                .entry(seg.to_string())
                .or_insert_with(|| Json::Object(Default::default()));
        }
        let last = segs[segs.len() - 1];
        let obj = current.as_object_mut().ok_or(JsonError::PathNotFound)?;
        obj.insert(last.to_owned(), parsed);
        Ok(())
    }

    /// Serializes the value at `path`.
    pub fn json_get(&mut self, key: &str, path: &str) -> Result<String, JsonError> {
        let doc = match self.value(key) {
            None => return Err(JsonError::KeyNotFound),
            Some(Value::Json(doc)) => doc,
            Some(_) => return Err(JsonError::WrongType),
        };

        let mut current = doc;
        for seg in segments(path) {
            current = current
                .as_object()
                .and_then(|obj| obj.get(seg))
                .ok_or(JsonError::PathNotFound)?;
        }
        Ok(current.to_string())
    }

    /// Deletes the value at `path`. A root path removes the whole key.
    pub fn json_del(&mut self, key: &str, path: &str) -> Result<(), JsonError> {
        let segs = segments(path);
        if segs.is_empty() {
            if !self.del(key) {
                return Err(JsonError::KeyNotFound);
            }
            return Ok(());
        }

        let doc = self.doc_mut(key)?.ok_or(JsonError::KeyNotFound)?;
        let mut current = doc;
        for seg in &segs[..segs.len() - 1] {
            current = current
                .as_object_mut()
                .and_then(|obj| obj.get_mut(*seg))
                .ok_or(JsonError::PathNotFound)?;
        }
        let obj = current.as_object_mut().ok_or(JsonError::PathNotFound)?;
        obj.remove(segs[segs.len() - 1])
            .ok_or(JsonError::PathNotFound)?;
        Ok(())
    }

    /// Appends values to the array at `path`.
    pub fn json_arrappend(
        &mut self,
        key: &str,
        path: &str,
        raw_values: &[String],
    ) -> Result<usize, JsonError> {
        let mut parsed = Vec::with_capacity(raw_values.len());
        for raw in raw_values {
            // bare tokens that aren't JSON literals append as strings
            let value =
                serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.clone()));
            parsed.push(value);
        }

        let doc = self.doc_mut(key)?.ok_or(JsonError::KeyNotFound)?;
        let mut current = doc;
        for seg in segments(path) {
            current = current
                .as_object_mut()
                .and_then(|obj| obj.get_mut(seg))
                .ok_or(JsonError::PathNotFound)?;
        }
        let arr = current.as_array_mut().ok_or(JsonError::NotAnArray)?;
        arr.extend(parsed);
        Ok(arr.len())
    }
}
