//! Change log of a single scope.
//!
//! A change log starts from a full serialized document (`init_html`) and
//! accumulates diff sets, each stamped with an id from the relay's shared
//! counter. Readers ask for everything since an id and get either the full
//! log or just the tail of diff sets.

use serde::{Deserialize, Serialize};
use tracing::debug;

use mirrordom_core::DiffRecord;

/// Error codes attached to failed scopes and relay responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unknown/unspecified error.
    Unknown = 0,
    /// Diffs arrived for a scope the relay holds no change log for.
    UnknownScope = 1,
    /// Invalid message format.
    InvalidMessage = 2,
    /// Message exceeds a protocol limit.
    MessageTooLarge = 3,
    /// Internal error in the relay.
    InternalError = 4,
}

/// What a reader receives for one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Full serialized document; present when the reader must reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_html: Option<String>,

    /// Diff records to apply, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffs: Option<Vec<DiffRecord>>,

    /// Page URL; only accompanies `init_html`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Set when the relay could not keep this scope's log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,

    /// Id of the newest diff set in the log.
    pub last_change_id: u64,
}

impl ChangeEntry {
    /// Whether the entry carries anything to apply.
    pub fn has_content(&self) -> bool {
        self.init_html.is_some() || self.diffs.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Failure recorded in place of a scope's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogError {
    pub code: ErrorCode,
    pub message: String,
}

/// Change log for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changelog {
    /// Sanitised full document the log starts from.
    pub init_html: Option<String>,
    pub url: Option<String>,
    pub first_change_id: u64,
    /// Diff sets as `(change_id, records)`, ids ascending.
    pub diffs: Vec<(u64, Vec<DiffRecord>)>,
    pub error: Option<ChangelogError>,
}

impl Changelog {
    /// A log starting from `init_html` at `first_change_id`.
    pub fn new(init_html: String, first_change_id: u64, url: Option<String>) -> Self {
        Self {
            init_html: Some(init_html),
            url,
            first_change_id,
            diffs: Vec::new(),
            error: None,
        }
    }

    /// A log that only reports a failure.
    pub fn failed(code: ErrorCode, message: impl Into<String>, change_id: u64) -> Self {
        Self {
            init_html: None,
            url: None,
            first_change_id: change_id,
            diffs: Vec::new(),
            error: Some(ChangelogError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Append a diff set under `change_id`.
    pub fn add_diff_set(&mut self, change_id: u64, diffs: Vec<DiffRecord>) {
        debug!(count = diffs.len(), change_id, "adding diff set");
        self.diffs.push((change_id, diffs));
    }

    /// Id of the newest diff set, or the first id when there is none.
    pub fn last_change_id(&self) -> u64 {
        self.diffs
            .last()
            .map_or(self.first_change_id, |(id, _)| *id)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Everything a reader needs after having applied up to `since - 1`.
    ///
    /// - `since` past the newest id: only `last_change_id`.
    /// - `since` absent or at/before the first id: the full log.
    /// - otherwise: the diff sets with id `>= since`.
    pub fn diffs_since(&self, since: Option<u64>) -> ChangeEntry {
        let last_change_id = self.last_change_id();
        match since {
            Some(since) if since > last_change_id => ChangeEntry {
                last_change_id,
                ..ChangeEntry::default()
            },
            Some(since) if since > self.first_change_id => ChangeEntry {
                diffs: Some(flatten(self.diffs.iter().filter(|(id, _)| *id >= since))),
                last_change_id,
                ..ChangeEntry::default()
            },
            _ => ChangeEntry {
                init_html: self.init_html.clone(),
                diffs: self
                    .init_html
                    .as_ref()
                    .map(|_| flatten(self.diffs.iter())),
                url: self.url.clone(),
                error: self.error.as_ref().map(|e| e.code),
                error_msg: self.error.as_ref().map(|e| e.message.clone()),
                last_change_id,
            },
        }
    }
}

fn flatten<'a>(sets: impl Iterator<Item = &'a (u64, Vec<DiffRecord>)>) -> Vec<DiffRecord> {
    sets.flat_map(|(_, records)| records.iter().cloned()).collect()
}
