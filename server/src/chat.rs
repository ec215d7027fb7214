//! Chat moderation with an external profanity filter
//!
//! Every sender gets its own lane: a task that filters that sender's messages
//! one at a time, so their order survives a slow filter while different
//! senders proceed independently. Finished messages are handed back to the
//! server loop, which looks the sender's name up again at that point since
//! the world may have changed while the filter was running.

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use shared::MAX_CHAT_LEN;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type FilterError = Box<dyn Error + Send + Sync>;

/// Label used when the sender left before their message was filtered.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Messages a sender may have waiting behind the one being filtered.
pub const MAX_PENDING_CHAT: usize = 8;

#[async_trait]
pub trait ChatFilter: Send + Sync {
    async fn filter(&self, text: &str) -> Result<String, FilterError>;
}

/// Remote filter backed by the PurgoMalum JSON endpoint.
pub struct PurgoMalumFilter {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct PurgoMalumResponse {
    result: Option<String>,
}

impl PurgoMalumFilter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FilterError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/service/json", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatFilter for PurgoMalumFilter {
    async fn filter(&self, text: &str) -> Result<String, FilterError> {
        let url = reqwest::Url::parse_with_params(&self.endpoint, &[("text", text)])?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body: PurgoMalumResponse = response.json().await?;

        Ok(body
            .result
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| text.to_string()))
    }
}

/// Filter used when the remote service is disabled.
pub struct PassthroughFilter;

#[async_trait]
impl ChatFilter for PassthroughFilter {
    async fn filter(&self, text: &str) -> Result<String, FilterError> {
        Ok(text.to_string())
    }
}

/// Local, ASCII case-insensitive word masking.
#[derive(Debug, Clone, Default)]
pub struct LocalMask {
    words: Vec<String>,
}

impl LocalMask {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_ascii_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Replaces every denylisted word with one `*` per character.
    ///
    /// Only whole words are masked: a match inside a longer word is left alone.
    pub fn mask(&self, text: &str) -> String {
        let lowered = text.to_ascii_lowercase();
        let mut masked = vec![false; text.len()];
        for word in &self.words {
            for (start, found) in lowered.match_indices(word.as_str()) {
                let end = start + found.len();
                if is_word_char(lowered[..start].chars().next_back())
                    || is_word_char(lowered[end..].chars().next())
                {
                    continue;
                }
                masked[start..end].fill(true);
            }
        }

        text.char_indices()
            .map(|(i, c)| if masked[i] { '*' } else { c })
            .collect()
    }
}

fn is_word_char(c: Option<char>) -> bool {
    c.is_some_and(char::is_alphanumeric)
}

/// A message that made it through moderation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeratedChat {
    pub sender_id: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredMessage {
    pub username: String,
    pub message: String,
}

impl ModeratedChat {
    /// Attaches the sender's name as it is now, not as it was at submit time.
    pub fn into_message(self, current_username: Option<String>) -> FilteredMessage {
        FilteredMessage {
            username: current_username.unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
            message: self.text,
        }
    }
}

/// Trims and caps raw chat input. Empty messages are dropped.
pub fn sanitize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_CHAT_LEN).collect())
}

/// Single best-effort pass through `filter`, falling back to `fallback`.
pub async fn moderate(
    filter: &dyn ChatFilter,
    fallback: &LocalMask,
    timeout: Duration,
    raw: &str,
) -> String {
    let failure = match tokio::time::timeout(timeout, filter.filter(raw)).await {
        Ok(Ok(filtered)) => return filtered,
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {:?}", timeout),
    };

    if fallback.is_empty() {
        warn!("Chat filter failed ({}), passing message through", failure);
        raw.to_string()
    } else {
        warn!("Chat filter failed ({}), masking locally", failure);
        fallback.mask(raw)
    }
}

pub struct ChatModerator {
    filter: Arc<dyn ChatFilter>,
    fallback: Arc<LocalMask>,
    timeout: Duration,
    lanes: HashMap<u32, mpsc::Sender<String>>,
    completed: mpsc::UnboundedSender<ModeratedChat>,
}

impl ChatModerator {
    pub fn new(
        filter: Arc<dyn ChatFilter>,
        fallback: LocalMask,
        timeout: Duration,
        completed: mpsc::UnboundedSender<ModeratedChat>,
    ) -> Self {
        Self {
            filter,
            fallback: Arc::new(fallback),
            timeout,
            lanes: HashMap::new(),
            completed,
        }
    }

    /// Queues a message on the sender's lane. Returns false if it was dropped,
    /// either because it was blank or because the lane is full.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, sender_id: u32, raw: &str) -> bool {
        let Some(text) = sanitize(raw) else {
            return false;
        };

        let text = match self.lane(sender_id).try_send(text) {
            Ok(()) => return true,
            Err(TrySendError::Full(_)) => {
                warn!("Chat lane for client {} is full, dropping message", sender_id);
                return false;
            }
            Err(TrySendError::Closed(text)) => text,
        };

        // Lane task is gone; start a fresh one.
        self.lanes.remove(&sender_id);
        self.lane(sender_id).try_send(text).is_ok()
    }

    /// Stops accepting messages from `sender_id`. Queued ones still finish.
    pub fn close_lane(&mut self, sender_id: u32) {
        if self.lanes.remove(&sender_id).is_some() {
            debug!("Closed chat lane for client {}", sender_id);
        }
    }

    pub fn open_lanes(&self) -> usize {
        self.lanes.len()
    }

    fn lane(&mut self, sender_id: u32) -> &mpsc::Sender<String> {
        let filter = &self.filter;
        let fallback = &self.fallback;
        let completed = &self.completed;
        let timeout = self.timeout;

        self.lanes.entry(sender_id).or_insert_with(|| {
            let (tx, mut rx) = mpsc::channel::<String>(MAX_PENDING_CHAT);
            let filter = Arc::clone(filter);
            let fallback = Arc::clone(fallback);
            let completed = completed.clone();

            tokio::spawn(async move {
                while let Some(raw) = rx.recv().await {
                    let text = moderate(filter.as_ref(), &fallback, timeout, &raw).await;
                    if completed.send(ModeratedChat { sender_id, text }).is_err() {
                        break;
                    }
                }
            });

            tx
        })
    }
}
