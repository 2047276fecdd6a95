//! Outbound webhook message shape.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use nottif_types::Identity;

/// Username used when the caller supplies none.
pub const DEFAULT_USERNAME: &str = "Nottif Notification";
/// Avatar used when the caller supplies none.
pub const DEFAULT_AVATAR_URL: &str =
    "https://raw.githubusercontent.com/tanq16/nottif/main/.github/assets/logo.png";
/// Embed accent color.
pub const EMBED_COLOR: u32 = 0x89b4fa;
/// Footer attribution text.
pub const FOOTER_TEXT: &str = "via Nottif";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub description: String,
    pub color: u32,
    /// RFC 3339.
    pub timestamp: String,
    pub footer: Footer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footer {
    pub text: String,
}

impl WebhookPayload {
    /// Render one part of a message.
    ///
    /// `part` is `(index, total)` with a 1-based index; a label is only added
    /// to the footer when `total > 1`.
    pub fn render(
        content: &str,
        identity: &Identity,
        part: (usize, usize),
        now: DateTime<Utc>,
    ) -> Self {
        let (index, total) = part;
        let footer = if total > 1 {
            format!("{FOOTER_TEXT} • part {index}/{total}")
        } else {
            FOOTER_TEXT.to_string()
        };

        Self {
            username: Some(
                non_empty(identity.username.as_deref()).unwrap_or(DEFAULT_USERNAME).to_string(),
            ),
            avatar_url: Some(
                non_empty(identity.avatar_url.as_deref())
                    .unwrap_or(DEFAULT_AVATAR_URL)
                    .to_string(),
            ),
            embeds: vec![Embed {
                description: content.to_string(),
                color: EMBED_COLOR,
                timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
                footer: Footer { text: footer },
            }],
        }
    }

    /// Description of the first embed, if any.
    pub fn description(&self) -> Option<&str> {
        self.embeds.first().map(|e| e.description.as_str())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_defaults() {
        let payload = WebhookPayload::render("hello", &Identity::default(), (1, 1), Utc::now());
        assert_eq!(payload.username.as_deref(), Some(DEFAULT_USERNAME));
        assert_eq!(payload.avatar_url.as_deref(), Some(DEFAULT_AVATAR_URL));
        assert_eq!(payload.description(), Some("hello"));
        assert_eq!(payload.embeds[0].footer.text, FOOTER_TEXT);
        assert_eq!(payload.embeds[0].color, EMBED_COLOR);
    }

    #[test]
    fn test_render_identity_override() {
        let identity = Identity {
            username: Some("Bot".into()),
            avatar_url: Some("http://avatar".into()),
        };
        let payload = WebhookPayload::render("x", &identity, (1, 1), Utc::now());
        assert_eq!(payload.username.as_deref(), Some("Bot"));
        assert_eq!(payload.avatar_url.as_deref(), Some("http://avatar"));
    }

    #[test]
    fn test_empty_override_falls_back() {
        let identity = Identity {
            username: Some(String::new()),
            avatar_url: None,
        };
        let payload = WebhookPayload::render("x", &identity, (1, 1), Utc::now());
        assert_eq!(payload.username.as_deref(), Some(DEFAULT_USERNAME));
    }

    #[test]
    fn test_part_label() {
        let payload = WebhookPayload::render("x", &Identity::default(), (2, 3), Utc::now());
        assert_eq!(payload.embeds[0].footer.text, "via Nottif • part 2/3");
    }

    #[test]
    fn test_json_shape() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let payload = WebhookPayload::render("body", &Identity::cron(), (1, 1), now);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["username"], "Nottif Cron");
        assert_eq!(value["embeds"][0]["description"], "body");
        assert_eq!(value["embeds"][0]["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(value["embeds"][0]["footer"]["text"], "via Nottif");
        assert_eq!(value["embeds"][0]["color"], 0x89b4fa);
    }
}
