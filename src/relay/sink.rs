use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Field of a rich embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rich embed attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            fields: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn inline_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: true,
        });
        self
    }
}

/// Message body as posted to a channel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
        }
    }
}

/// Where relay output is delivered
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(&self, channel_id: u64, message: &OutgoingMessage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_message_json() {
        let body = serde_json::to_value(OutgoingMessage::text("ciao")).unwrap();
        assert_eq!(body, json!({ "content": "ciao" }));
    }

    #[test]
    fn test_embed_message_json() {
        let embed = Embed::new("Titolo", 0x00ff00)
            .description("desc")
            .inline_field("a", "1");
        let body = serde_json::to_value(OutgoingMessage::embed(embed)).unwrap();
        assert_eq!(
            body,
            json!({
                "embeds": [{
                    "title": "Titolo",
                    "description": "desc",
                    "color": 65280,
                    "fields": [{ "name": "a", "value": "1", "inline": true }]
                }]
            })
        );
    }
}
