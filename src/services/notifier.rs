// src/services/notifier.rs

//! Message delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::pipeline::{Message, Section, SectionKind};

/// Environment variable holding the bot token.
pub const TOKEN_ENV: &str = "SLACK_BOT_TFL_TOKEN";
/// Environment variable holding the target channel.
pub const CHANNEL_ENV: &str = "SLACK_CHANNEL_TFL";

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Delivers composed messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn send(&self, message: &Message) -> Result<()>;
}

/// Prints messages to stdout.
#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        println!("{}", message.to_plain_text());
        Ok(())
    }
}

/// Bot token and channel for the chat workspace.
#[derive(Clone)]
pub struct SlackCredentials {
    pub token: String,
    pub channel: String,
}

impl SlackCredentials {
    /// Read credentials from the environment. Missing or blank values are a
    /// configuration error.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            token: read_env(TOKEN_ENV)?,
            channel: read_env(CHANNEL_ENV)?,
        })
    }
}

impl std::fmt::Debug for SlackCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackCredentials")
            .field("token", &"<redacted>")
            .field("channel", &self.channel)
            .finish()
    }
}

fn read_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::config(format!("{key} is not set")))
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Posts messages with `chat.postMessage`, one attachment per section.
pub struct SlackNotifier {
    client: Client,
    credentials: SlackCredentials,
}

impl SlackNotifier {
    pub fn new(client: Client, credentials: SlackCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    pub fn payload(&self, message: &Message) -> Value {
        slack_payload(message, &self.credentials.channel)
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let response: SlackResponse = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.credentials.token)
            .json(&self.payload(message))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.ok {
            return Err(AppError::notify(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        log::info!(
            "Posted '{}' with {} sections to {}",
            message.title,
            message.sections.len(),
            self.credentials.channel
        );
        Ok(())
    }
}

/// Request body for `chat.postMessage`.
pub fn slack_payload(message: &Message, channel: &str) -> Value {
    let attachments: Vec<Value> = message
        .sections
        .iter()
        .map(|section| {
            json!({
                "color": section.color,
                "text": section_text(section),
                "mrkdwn_in": ["text"],
            })
        })
        .collect();

    json!({
        "channel": channel,
        "text": format!("*{}*", message.title),
        "attachments": attachments,
    })
}

/// Markdown for one section, e.g. "🆕 :central: *Central* (NEW DISRUPTION)".
fn section_text(section: &Section) -> String {
    let mut head: Vec<String> = Vec::new();
    head.extend(section.kind.marker().map(str::to_string));
    head.extend(section.emoji.clone());
    head.push(format!("*{}*", section.heading));
    head.extend(section.kind.label().map(|l| format!("({l})")));
    let mut text = head.join(" ");

    if let Some(body) = &section.body {
        let glue = if section.kind == SectionKind::StillAffected {
            " "
        } else {
            "\n"
        };
        text.push_str(glue);
        text.push_str(body);
    }

    if !section.mentions.is_empty() {
        let mentions: Vec<String> = section.mentions.iter().map(|u| format!("<@{u}>")).collect();
        text.push('\n');
        text.push_str(&mentions.join(" "));
    }
    text
}
