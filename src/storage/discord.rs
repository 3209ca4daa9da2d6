//! Chat-platform channel used as ad-hoc object storage. An upload posts
//! the file as a message attachment; the message id is persisted as the
//! image's `public_id` so the (expiring) attachment URL can be re-resolved
//! later.

use serde::Deserialize;

use crate::config::DiscordConfig;

const API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Message has no attachments")]
    NoAttachment,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

/// The file as stored in the channel.
#[derive(Debug, Clone)]
pub struct StoredAttachment {
    pub message_id: String,
    pub url: String,
}

pub struct DiscordStorage {
    client: reqwest::Client,
    bot_token: String,
    channel_id: String,
    api_base: String,
}

impl DiscordStorage {
    pub fn from_config(config: &DiscordConfig) -> Option<Self> {
        match (&config.bot_token, &config.channel_id) {
            (Some(token), Some(channel)) => Some(Self::new(token.clone(), channel.clone())),
            _ => None,
        }
    }

    pub fn new(bot_token: String, channel_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            channel_id,
            api_base: API_BASE.to_string(),
        }
    }

    /// Post a file to the channel; returns the message id and the
    /// attachment URL.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<StoredAttachment, DiscordError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("files[0]", part);

        let response = self
            .client
            .post(format!(
                "{}/channels/{}/messages",
                self.api_base, self.channel_id
            ))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscordError::Status(response.status()));
        }

        let message: Message = response.json().await?;
        let attachment = message
            .attachments
            .into_iter()
            .next()
            .ok_or(DiscordError::NoAttachment)?;

        Ok(StoredAttachment {
            message_id: message.id,
            url: attachment.url,
        })
    }

    /// Re-resolve the attachment URL for a previously uploaded file.
    pub async fn attachment_url(&self, message_id: &str) -> Result<String, DiscordError> {
        let response = self
            .client
            .get(format!(
                "{}/channels/{}/messages/{}",
                self.api_base, self.channel_id, message_id
            ))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DiscordError::Status(response.status()));
        }

        let message: Message = response.json().await?;
        message
            .attachments
            .into_iter()
            .next()
            .map(|a| a.url)
            .ok_or(DiscordError::NoAttachment)
    }
}
