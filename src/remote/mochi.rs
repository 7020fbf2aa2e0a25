//! Mochi cards API client.
//!
//! Talks to `https://app.mochi.cards/api` with HTTP basic auth (API key
//! as the username, empty password). Card listing is paginated with an
//! opaque `bookmark`; the API signals the last page with an empty,
//! `"nil"`-like, or repeated bookmark.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::retry::RetryPolicy;
use super::{
    CardContent, RemoteCard, RemoteCardMaintenance, RemoteCardService, RemoteError, RemoteResult,
};
use crate::config::{RemoteSettings, SyncOptions};
use crate::error::{Error, Result};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://app.mochi.cards/api";

/// Largest page the API accepts.
const MAX_PAGE_SIZE: usize = 200;

/// A remote deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDeck {
    pub id: String,
    pub name: String,
}

/// HTTP client for the Mochi API.
pub struct MochiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: usize,
    page_timeout: Duration,
    retry: RetryPolicy,
}

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    docs: Vec<Value>,
    #[serde(default)]
    bookmark: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateCardRequest<'a> {
    content: &'a str,
    #[serde(rename = "deck-id")]
    deck_id: &'a str,
    #[serde(rename = "manual-tags")]
    manual_tags: &'a [String],
}

#[derive(Debug, Serialize)]
struct CreateDeckRequest<'a> {
    name: &'a str,
}

impl MochiClient {
    /// Build a client from resolved settings.
    ///
    /// # Errors
    ///
    /// Returns a config error when no API key is configured, or if the
    /// HTTP client cannot be constructed.
    pub fn from_settings(settings: &RemoteSettings, options: &SyncOptions) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("Missing Mochi API key".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url().trim_end_matches('/').to_string(),
            api_key,
            page_size: options.fetch_page_size.clamp(1, MAX_PAGE_SIZE),
            page_timeout: options.timeout,
            retry: RetryPolicy {
                max_retries: options.rate_limit_retries,
                ..RetryPolicy::default()
            },
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        allow_404: bool,
    ) -> RemoteResult<Option<Value>> {
        let url = format!("{}{path}", self.base_url);
        self.retry
            .run(|| self.send_once(method.clone(), &url, query, body, allow_404))
            .await
    }

    /// One HTTP round trip. `Ok(None)` means a tolerated 404.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        allow_404: bool,
    ) -> RemoteResult<Option<Value>> {
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(&self.api_key, Some(""))
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if allow_404 && status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let text = response.text().await.map_err(map_transport_error)?;
        if text.trim().is_empty() {
            return Ok(Some(Value::Null));
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    async fn get_page(&self, path: &str, query: &[(&str, String)]) -> RemoteResult<Page> {
        let value = self
            .request(Method::GET, path, query, None, false)
            .await?
            .unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    /// List all decks visible to the API key.
    ///
    /// # Errors
    ///
    /// Returns a `RemoteError` if the request fails.
    pub async fn list_decks(&self) -> RemoteResult<Vec<RemoteDeck>> {
        let page = self.get_page("/decks/", &[]).await?;
        Ok(page
            .docs
            .iter()
            .filter_map(|d| {
                Some(RemoteDeck {
                    id: d.get("id")?.as_str()?.to_string(),
                    name: d.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    /// Create a deck and return its id.
    ///
    /// # Errors
    ///
    /// Returns a `RemoteError` if the request fails or no id comes back.
    pub async fn create_deck(&self, name: &str) -> RemoteResult<String> {
        let body = serde_json::to_value(CreateDeckRequest { name })
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        let value = self
            .request(Method::POST, "/decks/", &[], Some(&body), false)
            .await?
            .unwrap_or(Value::Null);
        value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RemoteError::InvalidResponse("deck response has no id".to_string()))
    }
}

impl RemoteCardService for MochiClient {
    async fn list_cards(&self, deck_id: &str) -> RemoteResult<Vec<RemoteCard>> {
        let client = self;
        let cards = walk_pages(self.page_timeout, move |bookmark| {
            let query = list_query(deck_id, client.page_size, bookmark.as_deref());
            async move { client.get_page("/cards/", &query).await }
        })
        .await?;
        tracing::debug!(deck_id, total = cards.len(), "listed remote cards");
        Ok(cards)
    }

    async fn create_card(&self, deck_id: &str, content: &CardContent) -> RemoteResult<RemoteCard> {
        let body = serde_json::to_value(CreateCardRequest {
            content: &content.content,
            deck_id,
            manual_tags: &content.tags,
        })
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        let value = self
            .request(Method::POST, "/cards/", &[], Some(&body), false)
            .await
            .map_err(|e| create_error(deck_id, e))?
            .unwrap_or(Value::Null);

        card_from_json(&value)
            .ok_or_else(|| RemoteError::InvalidResponse("created card has no id".to_string()))
    }
}

impl RemoteCardMaintenance for MochiClient {
    async fn delete_card(&self, card_id: &str) -> RemoteResult<bool> {
        let path = format!("/cards/{card_id}");
        let deleted = self
            .request(Method::DELETE, &path, &[], None, true)
            .await?
            .is_some();
        Ok(deleted)
    }
}

/// Query for one page of a deck listing.
fn list_query(
    deck_id: &str,
    page_size: usize,
    bookmark: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("deck-id", deck_id.to_string()),
        ("limit", page_size.to_string()),
    ];
    if let Some(b) = bookmark {
        query.push(("bookmark", b.to_string()));
    }
    query
}

/// Follow bookmarks until the API signals the last page.
///
/// `fetch` receives the bookmark to resume from (`None` for the first
/// page). Each page gets its own `page_timeout`; a slow deck is fine as
/// long as no single page stalls.
async fn walk_pages<F, Fut>(page_timeout: Duration, mut fetch: F) -> RemoteResult<Vec<RemoteCard>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = RemoteResult<Page>>,
{
    let mut cards = Vec::new();
    let mut bookmark: Option<String> = None;
    let mut seen_bookmarks = HashSet::new();

    loop {
        let page = tokio::time::timeout(page_timeout, fetch(bookmark.take()))
            .await
            .map_err(|_| RemoteError::Timeout)??;
        cards.extend(page.docs.iter().filter_map(card_from_json));

        match page.bookmark {
            b if is_terminal_bookmark(b.as_deref()) => break,
            Some(b) if !seen_bookmarks.insert(b.clone()) => break,
            b => bookmark = b,
        }
    }

    Ok(cards)
}

/// A 404 on create means the target deck does not exist.
fn create_error(deck_id: &str, err: RemoteError) -> RemoteError {
    match err {
        RemoteError::Rejected { status: 404, .. } => RemoteError::DeckNotFound(deck_id.to_string()),
        other => other,
    }
}

/// Whether a bookmark marks the end of pagination.
fn is_terminal_bookmark(bookmark: Option<&str>) -> bool {
    match bookmark.map(str::trim) {
        None | Some("") => true,
        Some(b) => matches!(b.to_lowercase().as_str(), "nil" | "null" | "none"),
    }
}

fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_decode() {
        RemoteError::InvalidResponse(err.to_string())
    } else {
        RemoteError::Connection(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        s if s.is_server_error() => RemoteError::Unavailable { status: s.as_u16() },
        s => RemoteError::Rejected {
            status: s.as_u16(),
            message: body.chars().take(200).collect(),
        },
    }
}

/// Extract tag names from `manual-tags` / `tags`, which may hold plain
/// strings or `{name}` objects.
fn tags_from_json(card: &Value) -> Vec<String> {
    let raw = ["manual-tags", "tags"]
        .iter()
        .filter_map(|k| card.get(*k).and_then(Value::as_array))
        .find(|a| !a.is_empty());

    raw.map(|items| {
        items
            .iter()
            .filter_map(|t| match t {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o
                    .get("name")
                    .or_else(|| o.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect()
    })
    .unwrap_or_default()
}

/// `updated-at` is either `{"date": "..."}` or a plain string.
fn updated_at_from_json(card: &Value) -> Option<String> {
    match card.get("updated-at")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("date").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Convert an API card document; documents without an id are dropped.
fn card_from_json(card: &Value) -> Option<RemoteCard> {
    let id = card.get("id")?.as_str()?.trim();
    if id.is_empty() {
        return None;
    }
    let text = |key: &str| card.get(key).and_then(Value::as_str).map(str::to_string);

    Some(RemoteCard {
        id: id.to_string(),
        deck_id: text("deck-id").unwrap_or_default(),
        content: text("content").unwrap_or_default(),
        name: text("name").filter(|n| !n.trim().is_empty()),
        tags: tags_from_json(card),
        updated_at: updated_at_from_json(card),
    })
}
