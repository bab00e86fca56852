//! Append-only command log.
//!
//! One executed mutating command per line, UTF-8, exactly the
//! tokenized reconstruction of the original line. On startup the file
//! is read back and each line re-dispatched to rebuild the state.
//!
//! The handle tracks its open/closed state explicitly — appends after
//! `close` fail with [`AofError::Closed`] instead of probing the file
//! with a side-effectful write.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use cinder_core::types::Value;
use cinder_protocol::join_tokens;

/// Errors from the append-only log.
#[derive(Debug, Error)]
pub enum AofError {
    /// Append attempted after the log was closed.
    #[error("append-only log is closed")]
    Closed,
    /// Underlying file I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Writer handle for the append-only log.
pub struct AofLog {
    writer: BufWriter<File>,
    path: PathBuf,
    closed: bool,
}

impl AofLog {
    /// Opens (or creates) the log in append mode, creating parent
    /// directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AofError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            closed: false,
        })
    }

    /// Appends one command line and flushes it to the OS.
    pub fn append(&mut self, line: &str) -> Result<(), AofError> {
        if self.closed {
            return Err(AofError::Closed);
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and fsyncs the log to disk.
    pub fn sync(&mut self) -> Result<(), AofError> {
        if self.closed {
            return Err(AofError::Closed);
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Flushes and marks the handle closed. Further appends fail.
    pub fn close(&mut self) -> Result<(), AofError> {
        if !self.closed {
            self.writer.flush()?;
            self.writer.get_ref().sync_all()?;
            self.closed = true;
        }
        Ok(())
    }

    /// Whether the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The log's file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the log's contents with `commands`: writes them to a
    /// temporary file in the same directory, renames it over the live
    /// log, and reopens the handle so subsequent appends land in the
    /// new file.
    pub fn rewrite(&mut self, commands: &[String]) -> Result<(), AofError> {
        if self.closed {
            return Err(AofError::Closed);
        }
        self.writer.flush()?;

        let tmp_path = self.path.with_extension("rewrite.tmp");
        {
            let tmp = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(tmp);
            for command in commands {
                writer.write_all(command.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

/// Reads the non-empty command lines out of a log file. A missing file
/// reads as an empty log.
pub fn read_commands(path: impl AsRef<Path>) -> Result<Vec<String>, AofError> {
    let file = match File::open(path.as_ref()) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let reader = BufReader::new(file);
    let mut commands = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            commands.push(line);
        }
    }
    Ok(commands)
}

/// Builds the minimal command sequence that reconstructs the given
/// entries: one typed write per key (several for multi-part types),
/// followed by an `EX` when a live TTL remains.
///
/// HyperLogLog registers can't be rebuilt from commands and are
/// skipped; stream consumer pending state reconstructs as empty.
pub fn reconstruction_commands<'a>(
    entries: impl Iterator<Item = (&'a str, &'a Value, Option<DateTime<Utc>>)>,
) -> Vec<String> {
    let mut commands = Vec::new();
    let now = Utc::now();

    for (key, value, deadline) in entries {
        match value {
            Value::Str(s) => {
                commands.push(line(&["SET", key, s]));
            }
            Value::Bytes(bytes) => {
                for (i, byte) in bytes.iter().enumerate() {
                    for bit in 0..8 {
                        if byte & (1 << (7 - bit)) != 0 {
                            let offset = (i * 8 + bit).to_string();
                            commands.push(line(&["SETBIT", key, &offset, "1"]));
                        }
                    }
                }
            }
            Value::List(items) => {
                if !items.is_empty() {
                    let mut tokens = vec!["RPUSH".to_owned(), key.to_owned()];
                    tokens.extend(items.iter().cloned());
                    commands.push(join_tokens(&tokens));
                }
            }
            Value::Hash(fields) => {
                if !fields.is_empty() {
                    let mut tokens = vec!["HMSET".to_owned(), key.to_owned()];
                    let mut sorted: Vec<_> = fields.iter().collect();
                    sorted.sort();
                    for (f, v) in sorted {
                        tokens.push(f.clone());
                        tokens.push(v.clone());
                    }
                    commands.push(join_tokens(&tokens));
                }
            }
            Value::Set(members) => {
                if !members.is_empty() {
                    let mut tokens = vec!["SADD".to_owned(), key.to_owned()];
                    let mut sorted: Vec<_> = members.iter().cloned().collect();
                    sorted.sort();
                    tokens.extend(sorted);
                    commands.push(join_tokens(&tokens));
                }
            }
            Value::ZSet(set) => {
                for (member, score) in set.iter() {
                    commands.push(line(&["ZADD", key, &score.to_string(), member]));
                }
            }
            Value::Geo(geo) => {
                for (member, p) in geo.iter() {
                    commands.push(line(&[
                        "GEOADD",
                        key,
                        &p.longitude.to_string(),
                        &p.latitude.to_string(),
                        member,
                    ]));
                }
            }
            Value::Hll(_) => {}
            Value::Stream(stream) => {
                for entry in stream.entries() {
                    let mut tokens = vec!["XADD".to_owned(), key.to_owned(), entry.id.to_string()];
                    for (f, v) in &entry.fields {
                        tokens.push(f.clone());
                        tokens.push(v.clone());
                    }
                    commands.push(join_tokens(&tokens));
                }
            }
            Value::TimeSeries(ts) => {
                commands.push(line(&["TS.CREATE", key, &ts.aggregation().to_string()]));
                for p in ts.range(i64::MIN, i64::MAX) {
                    commands.push(line(&[
                        "TS.ADD",
                        key,
                        &p.timestamp.to_string(),
                        &p.value.to_string(),
                    ]));
                }
            }
            Value::Vector(v) => {
                let mut tokens = vec!["VECTOR.SET".to_owned(), key.to_owned()];
                tokens.extend(v.iter().map(|x| x.to_string()));
                commands.push(join_tokens(&tokens));
            }
            Value::Json(doc) => {
                commands.push(line(&["JSON.SET", key, ".", &doc.to_string()]));
            }
        }

        if let Some(deadline) = deadline {
            let remaining = (deadline - now).num_seconds();
            if remaining > 0 {
                commands.push(line(&["EX", key, &remaining.to_string()]));
            }
        }
    }

    commands
}

fn line(tokens: &[&str]) -> String {
    let owned: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    join_tokens(&owned)
}
