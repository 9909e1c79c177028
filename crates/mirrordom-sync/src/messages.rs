//! Session protocol message types.
//!
//! The broadcaster pushes [`SendUpdateRequest`]s to the relay and viewers
//! pull [`GetUpdateResponse`]s from it. Per-scope messages travel as
//! `[frame_path, kind, data]` triples.

use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use mirrordom_core::{DiffRecord, FramePath};
use mirrordom_store::ChangeEntry;

/// Method name of the viewer's poll.
pub const GET_UPDATE: &str = "get_update";

/// Method name of the broadcaster's push.
pub const SEND_UPDATE: &str = "send_update";

/// Message size limits.
pub mod limits {
    /// Max per-scope messages in one send_update.
    pub const MAX_MESSAGES_PER_SEND: usize = 256;
    /// Max records in one diffs message.
    pub const MAX_RECORDS_PER_DIFFS: usize = 10_000;
    /// Max frame paths in send_update.iframes.
    pub const MAX_ACTIVE_FRAMES: usize = 256;
}

/// Full content of a scope, sent when the relay must start its log over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitData {
    /// Serialized document, unsanitised.
    pub html: String,
    /// `props` records for elements with out-of-band state.
    #[serde(default)]
    pub props: Vec<DiffRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One per-scope message of a send_update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameMessage {
    /// A scope the relay has not seen in this session.
    NewInstance { frame: FramePath, data: InitData },
    /// A known scope that navigated or has to be resent whole.
    NewPage { frame: FramePath, data: InitData },
    /// Changes to a known scope.
    Diffs { frame: FramePath, diffs: Vec<DiffRecord> },
}

impl FrameMessage {
    pub fn frame(&self) -> &FramePath {
        match self {
            FrameMessage::NewInstance { frame, .. }
            | FrameMessage::NewPage { frame, .. }
            | FrameMessage::Diffs { frame, .. } => frame,
        }
    }

    /// Wire tag of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameMessage::NewInstance { .. } => "new_instance",
            FrameMessage::NewPage { .. } => "new_page",
            FrameMessage::Diffs { .. } => "diffs",
        }
    }

    /// Records carried by the message, counting init props.
    pub fn record_count(&self) -> usize {
        match self {
            FrameMessage::NewInstance { data, .. } | FrameMessage::NewPage { data, .. } => {
                data.props.len()
            }
            FrameMessage::Diffs { diffs, .. } => diffs.len(),
        }
    }
}

impl Serialize for FrameMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FrameMessage::NewInstance { frame, data } | FrameMessage::NewPage { frame, data } => {
                (frame, self.kind(), data).serialize(serializer)
            }
            FrameMessage::Diffs { frame, diffs } => (frame, self.kind(), diffs).serialize(serializer),
        }
    }
}

const KINDS: &[&str] = &["new_instance", "new_page", "diffs"];

struct MessageVisitor;

fn next<'de, A, T>(seq: &mut A, index: usize) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, &MessageVisitor))
}

impl<'de> Visitor<'de> for MessageVisitor {
    type Value = FrameMessage;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a [frame_path, kind, data] message")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<FrameMessage, A::Error> {
        let frame: FramePath = next(&mut seq, 0)?;
        let kind: String = next(&mut seq, 1)?;
        match kind.as_str() {
            "new_instance" => Ok(FrameMessage::NewInstance {
                frame,
                data: next(&mut seq, 2)?,
            }),
            "new_page" => Ok(FrameMessage::NewPage {
                frame,
                data: next(&mut seq, 2)?,
            }),
            "diffs" => Ok(FrameMessage::Diffs {
                frame,
                diffs: next(&mut seq, 2)?,
            }),
            other => Err(de::Error::unknown_variant(other, KINDS)),
        }
    }
}

impl<'de> Deserialize<'de> for FrameMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(MessageVisitor)
    }
}

/// Arguments of get_update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUpdateRequest {
    /// First change id the viewer has not applied yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_id: Option<u64>,
    /// Set while the viewer is recovering; only a main-scope reset helps.
    #[serde(default)]
    pub init_html_required: bool,
}

/// Result of get_update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUpdateResponse {
    /// Entries per scope, outer scopes first. Absent when withheld.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changesets: Option<Vec<(FramePath, ChangeEntry)>>,
    pub last_change_id: Option<u64>,
}

/// Arguments of send_update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendUpdateRequest {
    pub messages: Vec<FrameMessage>,
    /// Every frame scope currently present on the broadcaster.
    #[serde(default)]
    pub iframes: Vec<FramePath>,
}

impl SendUpdateRequest {
    /// Check if this request respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        if self.messages.len() > limits::MAX_MESSAGES_PER_SEND {
            return Err("too many messages");
        }
        if self.iframes.len() > limits::MAX_ACTIVE_FRAMES {
            return Err("too many active frames");
        }
        for message in &self.messages {
            if message.record_count() > limits::MAX_RECORDS_PER_DIFFS {
                return Err("too many records in message");
            }
        }
        Ok(())
    }
}

/// Result of send_update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendUpdateResponse {
    pub last_change_id: Option<u64>,
    /// A recovering viewer asked for every scope to be resent.
    #[serde(default)]
    pub reset_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrordom_core::{DocType, Path};
    use serde_json::json;

    fn frame() -> FramePath {
        FramePath::main().child_scope(&Path::new(vec![1, 4]))
    }

    #[test]
    fn test_frame_message_wire_shape() {
        let msg = FrameMessage::Diffs {
            frame: frame(),
            diffs: vec![DiffRecord::Deleted {
                path: Path::new(vec![1, 2]),
                doc_type: DocType::Html,
            }],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!([["m", 1, 4, "i"], "diffs", [["deleted", "html", [1, 2]]]])
        );
        assert_eq!(serde_json::from_value::<FrameMessage>(value).unwrap(), msg);
    }

    #[test]
    fn test_init_message_omits_url() {
        let msg = FrameMessage::NewInstance {
            frame: FramePath::main(),
            data: InitData {
                html: "<html/>".into(),
                props: vec![],
                url: None,
            },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!([["m"], "new_instance", {"html": "<html/>", "props": []}])
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let value = json!([["m"], "reset", {}]);
        assert!(serde_json::from_value::<FrameMessage>(value).is_err());
    }

    #[test]
    fn test_get_update_defaults() {
        let req: GetUpdateRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req, GetUpdateRequest::default());

        let resp = GetUpdateResponse {
            changesets: None,
            last_change_id: None,
        };
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"last_change_id": null})
        );
    }

    #[test]
    fn test_limits_valid() {
        let req = SendUpdateRequest {
            messages: vec![],
            iframes: vec![frame()],
        };
        assert!(req.validate_limits().is_ok());
    }

    #[test]
    fn test_limits_exceeded() {
        let req = SendUpdateRequest {
            messages: vec![],
            iframes: vec![frame(); limits::MAX_ACTIVE_FRAMES + 1],
        };
        assert!(req.validate_limits().is_err());

        let req = SendUpdateRequest {
            messages: vec![FrameMessage::Diffs {
                frame: FramePath::main(),
                diffs: vec![
                    DiffRecord::Deleted {
                        path: Path::new(vec![1, 0]),
                        doc_type: DocType::Html,
                    };
                    limits::MAX_RECORDS_PER_DIFFS + 1
                ],
            }],
            iframes: vec![],
        };
        assert_eq!(req.validate_limits(), Err("too many records in message"));
    }
}
