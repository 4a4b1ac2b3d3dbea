//! Push payloads and the notifications they raise.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::NotificationConfig;

/// Action that opens the target URL.
pub const ACTION_OPEN: &str = "open";

/// Action that only closes the notification.
pub const ACTION_DISMISS: &str = "dismiss";

/// Most actions a notification displays.
pub const MAX_ACTIONS: usize = 2;

/// Tag used when a payload carries none.
pub const DEFAULT_TAG: &str = "datacrypt-notification";

/// A notification button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    fn new(action: &str, title: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
        }
    }
}

/// JSON body of a push message. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tag: Option<String>,
    pub url: Option<String>,
    pub actions: Option<Vec<NotificationAction>>,
}

impl PushPayload {
    /// Decode push data. Non-JSON data becomes the notification body.
    pub fn decode(data: Option<&[u8]>) -> Self {
        let Some(data) = data.filter(|d| !d.is_empty()) else {
            return Self::default();
        };

        match serde_json::from_slice(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Push payload is not JSON, using it as text");
                Self {
                    body: Some(String::from_utf8_lossy(data).into_owned()),
                    ..Default::default()
                }
            }
        }
    }
}

/// A displayed system notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub actions: Vec<NotificationAction>,
    /// Page opened when the notification is clicked.
    pub url: String,
}

impl Notification {
    /// Build the notification for a push payload.
    pub fn from_push(payload: PushPayload, config: &NotificationConfig) -> Self {
        let mut actions = payload.actions.unwrap_or_else(|| {
            vec![
                NotificationAction::new(ACTION_OPEN, "Open"),
                NotificationAction::new(ACTION_DISMISS, "Dismiss"),
            ]
        });
        actions.truncate(MAX_ACTIONS);

        Self {
            title: payload.title.unwrap_or_else(|| config.default_title.clone()),
            body: payload.body.unwrap_or_else(|| config.default_body.clone()),
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            actions,
            url: payload.url.unwrap_or_else(|| "/".to_string()),
        }
    }
}

/// Notifications currently on screen, keyed by tag.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: IndexMap<String, Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a notification, replacing any with the same tag.
    pub fn show(&mut self, notification: Notification) {
        self.shown.shift_remove(&notification.tag);
        self.shown.insert(notification.tag.clone(), notification);
    }

    /// Close and return the notification with `tag`.
    pub fn close(&mut self, tag: &str) -> Option<Notification> {
        self.shown.shift_remove(tag)
    }

    /// Notifications on screen, oldest first.
    pub fn get_notifications(&self) -> Vec<&Notification> {
        self.shown.values().collect()
    }
}

/// Result of a notification click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The dismiss action was chosen.
    Dismissed,
    /// An existing window was focused.
    Focused(String),
    /// A new window was opened.
    Opened(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_payload() {
        let data = br#"{
            "title": "Quarterly report",
            "body": "Q3 numbers are in",
            "tag": "report-q3",
            "url": "/reports/q3",
            "actions": [
                {"action": "open", "title": "Read"},
                {"action": "dismiss", "title": "Later"},
                {"action": "share", "title": "Share"}
            ]
        }"#;

        let notification =
            Notification::from_push(PushPayload::decode(Some(data)), &NotificationConfig::default());

        assert_eq!(notification.title, "Quarterly report");
        assert_eq!(notification.tag, "report-q3");
        assert_eq!(notification.url, "/reports/q3");
        assert_eq!(notification.actions.len(), MAX_ACTIONS);
        assert_eq!(notification.actions[0].title, "Read");
    }

    #[test]
    fn test_decode_missing_payload_uses_defaults() {
        let config = NotificationConfig::default();
        let notification = Notification::from_push(PushPayload::decode(None), &config);

        assert_eq!(notification.title, config.default_title);
        assert_eq!(notification.body, config.default_body);
        assert_eq!(notification.icon, config.icon);
        assert_eq!(notification.badge, config.badge);
        assert_eq!(notification.tag, DEFAULT_TAG);
        assert_eq!(notification.url, "/");
        let actions: Vec<_> = notification.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec![ACTION_OPEN, ACTION_DISMISS]);
    }

    #[test]
    fn test_decode_text_payload() {
        let payload = PushPayload::decode(Some(b"Server maintenance tonight"));
        assert_eq!(payload.body.as_deref(), Some("Server maintenance tonight"));
        assert!(payload.title.is_none());
    }

    #[test]
    fn test_center_replaces_same_tag() {
        let config = NotificationConfig::default();
        let mut center = NotificationCenter::new();
        center.show(Notification::from_push(PushPayload::default(), &config));
        center.show(Notification::from_push(
            PushPayload {
                body: Some("second".to_string()),
                ..Default::default()
            },
            &config,
        ));

        let shown = center.get_notifications();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].body, "second");
        assert!(center.close(DEFAULT_TAG).is_some());
        assert!(center.close(DEFAULT_TAG).is_none());
    }
}
