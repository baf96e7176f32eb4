//! Holder record: who holds the gate and since when.
//!
//! The record is informational only. It never decides who holds the lock;
//! it lets a waiting operator see the holder's name and how long they have
//! held it. The on-disk format is plain text, one `Key: value` per line:
//!
//! ```text
//! Timestamp: 2024-01-01 10:00:00
//! Username: alice
//! Host: ops-bastion-1
//! Pid: 41877
//! ```
//!
//! Readers accept the lines in any order, ignore unknown keys, and degrade
//! to `unknown` for anything missing or unparsable.

use crate::error::Result;
use crate::fs::atomic_write;
use crate::identity::{self, UNKNOWN};
use chrono::{Local, NaiveDateTime, Timelike};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Timestamp format used in the holder record (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Mode for the holder record; other operators must be able to read it.
pub const HOLDER_FILE_MODE: u32 = 0o644;

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<key>[A-Za-z]+)\s*:\s*(?P<value>.*?)\s*$").expect("Invalid holder line regex")
});

/// The most recent holder of the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderRecord {
    /// Login name of the holder, or `unknown`.
    pub owner: String,

    /// When the holder acquired the gate; `None` when unknown or unparsable.
    pub acquired_at: Option<NaiveDateTime>,

    /// Host the holder ran on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Process ID of the holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl HolderRecord {
    /// Record for the current process.
    pub fn new(owner: &str, acquired_at: NaiveDateTime) -> Self {
        Self {
            owner: owner.to_string(),
            acquired_at: Some(acquired_at),
            host: Some(identity::current_hostname()),
            pid: Some(std::process::id()),
        }
    }

    /// Sentinel returned when the record is missing or unreadable.
    pub fn unknown() -> Self {
        Self {
            owner: UNKNOWN.to_string(),
            acquired_at: None,
            host: None,
            pid: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.owner == UNKNOWN && self.acquired_at.is_none()
    }

    /// Parse record text. Never fails; missing fields stay unknown.
    pub fn parse(content: &str) -> Self {
        let mut record = Self::unknown();

        for line in content.lines() {
            let Some(caps) = LINE_RE.captures(line) else {
                continue;
            };
            let value = &caps["value"];
            if value.is_empty() {
                continue;
            }
            match caps["key"].to_ascii_lowercase().as_str() {
                "username" => record.owner = value.to_string(),
                "timestamp" => {
                    record.acquired_at = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
                }
                "host" => record.host = Some(value.to_string()),
                "pid" => record.pid = value.parse().ok(),
                _ => {}
            }
        }

        record
    }

    /// Render the on-disk text form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self.acquired_at {
            Some(ts) => out.push_str(&format!("Timestamp: {}\n", ts.format(TIMESTAMP_FORMAT))),
            None => out.push_str(&format!("Timestamp: {}\n", UNKNOWN)),
        }
        out.push_str(&format!("Username: {}\n", self.owner));
        if let Some(host) = &self.host {
            out.push_str(&format!("Host: {}\n", host));
        }
        if let Some(pid) = self.pid {
            out.push_str(&format!("Pid: {}\n", pid));
        }
        out
    }

    /// Time held as of `now`. `None` when the timestamp is unknown.
    ///
    /// A timestamp in the future (clock skew between hosts) counts as zero.
    pub fn elapsed_at(&self, now: NaiveDateTime) -> Option<Duration> {
        let acquired_at = self.acquired_at?;
        Some(
            now.signed_duration_since(acquired_at)
                .to_std()
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Why this holder looks stale, if it does.
    ///
    /// A holder is stale when it ran on this host and its pid is gone, or when
    /// it has held the gate for longer than `stale_after`.
    pub fn stale_reason(
        &self,
        now: NaiveDateTime,
        stale_after: Duration,
        local_host: &str,
    ) -> Option<String> {
        if let (Some(host), Some(pid)) = (&self.host, self.pid)
            && host == local_host
            && !identity::process_alive(pid)
        {
            return Some(format!("holder process {} is no longer running on {}", pid, host));
        }

        match self.elapsed_at(now) {
            Some(elapsed) if elapsed > stale_after => Some(format!(
                "held for {} (threshold {})",
                format_elapsed(Some(elapsed)),
                format_elapsed(Some(stale_after))
            )),
            _ => None,
        }
    }
}

impl fmt::Display for HolderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.owner)?;
        if let Some(host) = &self.host {
            write!(f, "@{}", host)?;
        }
        if let Some(pid) = self.pid {
            write!(f, " (pid {})", pid)?;
        }
        Ok(())
    }
}

/// Format a duration as `HH:MM:SS`; hours grow past 24 rather than wrapping.
pub fn format_elapsed(elapsed: Option<Duration>) -> String {
    match elapsed {
        Some(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
        None => UNKNOWN.to_string(),
    }
}

/// Reads and writes the holder record file.
#[derive(Debug, Clone)]
pub struct HolderRegistry {
    path: PathBuf,
}

impl HolderRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the record with the given holder.
    pub fn write(&self, owner_identity: &str, timestamp: NaiveDateTime) -> Result<()> {
        self.write_record(&HolderRecord::new(owner_identity, timestamp))
    }

    pub fn write_record(&self, record: &HolderRecord) -> Result<()> {
        atomic_write(&self.path, record.render().as_bytes(), HOLDER_FILE_MODE)?;
        tracing::debug!(path = %self.path.display(), owner = %record.owner, "holder record written");
        Ok(())
    }

    /// Last-written record, or the `unknown` sentinel.
    pub fn read(&self) -> HolderRecord {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => HolderRecord::parse(&content),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "holder record unreadable");
                HolderRecord::unknown()
            }
        }
    }
}

/// Current local time at second precision, matching the record format.
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
