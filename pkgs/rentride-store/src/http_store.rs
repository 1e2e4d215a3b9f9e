//! Conversation Store over HTTP

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::conversation_store::ConversationStore;
use crate::error::StoreError;
use crate::models::{Actor, Message, NewMessage, Role, UnreadCount};

/// REST client for the marketplace chat API
///
/// Every request carries the session token as a bearer credential.
#[derive(Debug, Clone)]
pub struct HttpConversationStore {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpConversationStore {
    /// Create a client rooted at `base_url` (e.g. `https://api.example.com/api/chat`)
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidInput(format!(
                "'{base_url}' cannot be used as an API base"
            )));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidInput(format!("bad API base {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ConversationStore for HttpConversationStore {
    #[instrument(skip(self, body))]
    async fn send_message(&self, receiver_id: &str, body: &str) -> Result<Message, StoreError> {
        let url = self.endpoint(&["messages"])?;
        let payload = NewMessage {
            receiver_id: receiver_id.to_string(),
            body: body.to_string(),
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        let message: Message = Self::check(response).await?.json().await?;

        debug!(id = %message.id, "message persisted");
        Ok(message)
    }

    #[instrument(skip(self))]
    async fn fetch_conversation(&self, peer_id: &str) -> Result<Vec<Message>, StoreError> {
        let url = self.endpoint(&["conversations", peer_id])?;
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let messages: Vec<Message> = Self::check(response).await?.json().await?;

        debug!(count = messages.len(), "conversation fetched");
        Ok(messages)
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, peer_id: &str) -> Result<(), StoreError> {
        let url = self.endpoint(&["conversations", peer_id, "read"])?;
        let response = self.client.put(url).bearer_auth(&self.token).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn unread_count(&self) -> Result<u64, StoreError> {
        let url = self.endpoint(&["unread", "count"])?;
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let unread: UnreadCount = Self::check(response).await?.json().await?;
        Ok(unread.count)
    }

    #[instrument(skip(self))]
    async fn directory(&self, role: Role) -> Result<Vec<Actor>, StoreError> {
        let url = self.endpoint(&["directory"])?;
        let response = self
            .client
            .get(url)
            .query(&[("role", role.as_str())])
            .bearer_auth(&self.token)
            .send()
            .await?;
        let actors: Vec<Actor> = Self::check(response).await?.json().await?;

        debug!(count = actors.len(), "directory fetched");
        Ok(actors)
    }
}
