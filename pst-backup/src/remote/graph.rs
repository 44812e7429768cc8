//! OneDrive client over the Microsoft Graph REST API.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ChunkOutcome, ConflictBehavior, RemoteError, RemoteItem, RemoteStorage, SessionHandle};
use crate::transfer::progress_stream::counted_body;
use crate::transfer::{ChunkRange, SentCounter};

/// Graph v1.0 endpoint
pub const GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";

const CONFLICT_KEY: &str = "@microsoft.graph.conflictBehavior";

#[derive(Debug, Deserialize)]
struct DriveResponse {
    quota: Option<QuotaResponse>,
}

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    remaining: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    upload_url: String,
    #[serde(default)]
    expiration_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ItemResponse {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Authenticated OneDrive of the signed-in user (`/me/drive`)
pub struct GraphDrive {
    client: Client,
    base_url: String,
    token: String,
    sent: SentCounter,
}

impl GraphDrive {
    /// `token` is a bearer token acquired by the caller. Body bytes are
    /// added to `sent` as they are handed to the transport.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, sent: SentCounter) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            sent,
        }
    }

    fn drive_url(&self) -> Result<Url, RemoteError> {
        let mut url = self.parse_base()?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::new("graph url cannot be a base"))?
            .pop_if_empty()
            .extend(["me", "drive"]);
        Ok(url)
    }

    /// `/me/drive/root:/{path}:/{action}`
    fn item_url(&self, path: &str, action: &str) -> Result<Url, RemoteError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| RemoteError::new(format!("'{}' does not name an item", path)))?;

        let mut url = self.parse_base()?;
        {
            let mut builder = url
                .path_segments_mut()
                .map_err(|_| RemoteError::new("graph url cannot be a base"))?;
            builder.pop_if_empty().extend(["me", "drive", "root:"]);
            builder.extend(parents.iter().copied());
            builder.push(&format!("{}:", last));
            builder.push(action);
        }
        Ok(url)
    }

    fn parse_base(&self) -> Result<Url, RemoteError> {
        Url::parse(&self.base_url)
            .map_err(|e| RemoteError::new(format!("invalid graph url '{}': {}", self.base_url, e)))
    }
}

/// Turn a non-success response into a [`RemoteError`], keeping Graph's
/// `code: message` when the body carries one.
async fn check(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => format!("{}: {}", envelope.error.code, envelope.error.message),
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("{}: {}", status, body),
    };
    Err(RemoteError::with_status(status.as_u16(), message))
}

async fn read_item(resp: Response) -> Result<RemoteItem, RemoteError> {
    let item: ItemResponse = resp.json().await?;
    Ok(RemoteItem {
        id: item.id,
        name: item.name,
    })
}

#[async_trait]
impl RemoteStorage for GraphDrive {
    async fn quota_remaining(&self) -> Result<Option<u64>, RemoteError> {
        let resp = self
            .client
            .get(self.drive_url()?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let drive: DriveResponse = check(resp).await?.json().await?;

        Ok(drive
            .quota
            .and_then(|q| q.remaining)
            .map(|remaining| remaining.max(0) as u64))
    }

    async fn create_upload_session(
        &self,
        path: &str,
        conflict: ConflictBehavior,
    ) -> Result<SessionHandle, RemoteError> {
        let mut item = serde_json::Map::new();
        item.insert(CONFLICT_KEY.to_string(), conflict.as_str().into());
        let body = serde_json::json!({ "item": item });

        let resp = self
            .client
            .post(self.item_url(path, "createUploadSession")?)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let session: UploadSessionResponse = check(resp).await?.json().await?;

        match session.expiration_date_time {
            Some(expires) => info!("Upload session for {} expires at {}", path, expires),
            None => info!("Upload session created for {}", path),
        }
        Ok(SessionHandle(session.upload_url))
    }

    async fn submit_chunk(
        &self,
        session: &SessionHandle,
        range: ChunkRange,
        total: u64,
        data: Bytes,
    ) -> Result<ChunkOutcome, RemoteError> {
        let content_range = format!("bytes {}-{}/{}", range.start, range.last_byte(), total);
        debug!("PUT {}", content_range);

        // The upload URL is pre-authenticated; Graph rejects a bearer header here.
        let resp = self
            .client
            .put(&session.0)
            .header(CONTENT_LENGTH, data.len())
            .header(CONTENT_RANGE, content_range)
            .body(reqwest::Body::wrap_stream(counted_body(data, self.sent.clone())))
            .send()
            .await?;
        let resp = check(resp).await?;

        match resp.status() {
            StatusCode::ACCEPTED => Ok(ChunkOutcome::Accepted),
            StatusCode::OK | StatusCode::CREATED => Ok(ChunkOutcome::Completed(read_item(resp).await?)),
            other => Err(RemoteError::with_status(
                other.as_u16(),
                format!("unexpected status {} for chunk", other),
            )),
        }
    }

    async fn abort_session(&self, session: &SessionHandle) -> Result<(), RemoteError> {
        let resp = self.client.delete(&session.0).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn direct_put(
        &self,
        path: &str,
        conflict: ConflictBehavior,
        data: Bytes,
    ) -> Result<RemoteItem, RemoteError> {
        let mut url = self.item_url(path, "content")?;
        url.query_pairs_mut().append_pair(CONFLICT_KEY, conflict.as_str());

        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.token)
            .header(CONTENT_LENGTH, data.len())
            .body(reqwest::Body::wrap_stream(counted_body(data, self.sent.clone())))
            .send()
            .await?;

        read_item(check(resp).await?).await
    }
}
