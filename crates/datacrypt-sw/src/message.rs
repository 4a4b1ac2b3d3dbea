//! Page → worker message protocol.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::warn;

/// Messages a page may post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate the waiting worker now.
    SkipWaiting,
    /// Reply with the active cache generation labels.
    GetVersion,
    /// Drop the dynamic generation.
    ClearCache,
}

impl WorkerMessage {
    /// Parse a posted JSON message. Unknown or malformed messages are logged
    /// and yield `None`.
    pub fn parse(data: &str) -> Option<Self> {
        match serde_json::from_str(data) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, data, "Ignoring unrecognized message");
                None
            }
        }
    }
}

/// Reply sent back through a message's response port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MessageReply {
    Version {
        version: String,
        static_cache: String,
        dynamic_cache: String,
    },
    Cleared {
        cache: String,
        deleted: bool,
    },
}

/// Response port attached to a message.
pub type ReplyPort = oneshot::Sender<MessageReply>;

/// What the host must do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEffect {
    None,
    /// The worker called skip-waiting.
    SkipWaiting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(
            WorkerMessage::parse(r#"{"type":"SKIP_WAITING"}"#),
            Some(WorkerMessage::SkipWaiting)
        );
        assert_eq!(
            WorkerMessage::parse(r#"{"type":"GET_VERSION"}"#),
            Some(WorkerMessage::GetVersion)
        );
        assert_eq!(
            WorkerMessage::parse(r#"{"type":"CLEAR_CACHE","extra":1}"#),
            Some(WorkerMessage::ClearCache)
        );
    }

    #[test]
    fn test_parse_unknown_messages() {
        assert_eq!(WorkerMessage::parse(r#"{"type":"RELOAD_THEME"}"#), None);
        assert_eq!(WorkerMessage::parse("SKIP_WAITING"), None);
    }

    #[test]
    fn test_version_reply_shape() {
        let reply = MessageReply::Version {
            version: "v3.0".to_string(),
            static_cache: "static-v3.0".to_string(),
            dynamic_cache: "dynamic-v3.0".to_string(),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["version"], "v3.0");
        assert_eq!(json["static_cache"], "static-v3.0");
    }
}
