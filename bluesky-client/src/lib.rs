//! Publishes finished units to Bluesky over the AT Protocol XRPC API.

pub mod api;

use api::{
    CreateRecordRequest, CreateRecordResponse, CreateSessionRequest, Embed, ImageEmbed,
    PostRecord, Session, UploadBlobResponse, XrpcError,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use skyrelay_core::{
    CoreError, Credentials, PublishError, PublishReceipt, PublishRequest, Publisher,
};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub struct BlueskyClient {
    http: Client,
    service: String,
    identifier: String,
    app_password: String,
    session: Mutex<Option<Session>>,
}

impl BlueskyClient {
    pub fn new(identifier: String, app_password: String) -> Result<Self, CoreError> {
        Self::with_service(identifier, app_password, api::BLUESKY_SERVICE.to_string())
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self, CoreError> {
        Self::new(
            credentials.bluesky_identifier.clone(),
            credentials.bluesky_app_password.clone(),
        )
    }

    pub fn with_service(
        identifier: String,
        app_password: String,
        service: String,
    ) -> Result<Self, CoreError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            service: service.trim_end_matches('/').to_string(),
            identifier,
            app_password,
            session: Mutex::new(None),
        })
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    async fn create_session(&self) -> Result<Session, CoreError> {
        info!("Logging in to Bluesky as {}", self.identifier);
        let response = self
            .http
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&CreateSessionRequest {
                identifier: &self.identifier,
                password: &self.app_password,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            let body: XrpcError = response.json().await.unwrap_or_default();
            error!("Bluesky login rejected: {:?}", body.message);
            return Err(PublishError::AuthenticationFailed {
                reason: body
                    .message
                    .or(body.error)
                    .unwrap_or_else(|| status.to_string()),
            }
            .into());
        }
        parse_response(response).await
    }

    /// Returns the cached session, logging in first if there is none.
    async fn session(&self) -> Result<Session, CoreError> {
        let mut cached = self.session.lock().await;
        if let Some(session) = cached.as_ref() {
            return Ok(session.clone());
        }
        let session = self.create_session().await?;
        debug!("Bluesky session established for {}", session.did);
        *cached = Some(session.clone());
        Ok(session)
    }

    async fn send_authed<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        session: &Session,
    ) -> Result<T, CoreError> {
        let response = request.bearer_auth(&session.access_jwt).send().await?;
        match parse_response(response).await {
            Err(CoreError::Publish(PublishError::SessionExpired)) => {
                warn!("Bluesky session expired, logging in again on the next attempt");
                *self.session.lock().await = None;
                Err(PublishError::SessionExpired.into())
            }
            other => other,
        }
    }

    async fn upload_image(
        &self,
        session: &Session,
        path: &Path,
        mime_type: &str,
    ) -> Result<serde_json::Value, CoreError> {
        let bytes = tokio::fs::read(path).await?;
        debug!("Uploading {} ({} bytes)", path.display(), bytes.len());

        let request = self
            .http
            .post(self.xrpc_url("com.atproto.repo.uploadBlob"))
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes);
        let uploaded: UploadBlobResponse =
            self.send_authed(request, session).await.map_err(|e| match e {
                CoreError::Publish(PublishError::Rejected { reason }) => {
                    PublishError::BlobUploadFailed {
                        file: path.display().to_string(),
                        reason,
                    }
                    .into()
                }
                other => other,
            })?;
        Ok(uploaded.blob)
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, CoreError> {
    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        let body: XrpcError = response.json().await.unwrap_or_default();
        return Err(api::status_error(status, &headers, &body).into());
    }
    response.json::<T>().await.map_err(|e| {
        PublishError::InvalidResponse {
            details: e.to_string(),
        }
        .into()
    })
}

#[async_trait]
impl Publisher for BlueskyClient {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, CoreError> {
        let session = self.session().await?;

        let images: Vec<(&Path, &'static str)> = request
            .media
            .iter()
            .filter_map(|path| api::image_mime_type(path).map(|mime| (path.as_path(), mime)))
            .take(api::MAX_IMAGES)
            .collect();
        if images.len() < request.media.len() {
            debug!(
                "Embedding {} of {} media files for {}",
                images.len(),
                request.media.len(),
                request.unit_id
            );
        }

        let mut embedded = Vec::with_capacity(images.len());
        for (path, mime_type) in images {
            let blob = self.upload_image(&session, path, mime_type).await?;
            embedded.push(ImageEmbed {
                alt: api::IMAGE_ALT_TEXT.to_string(),
                image: blob,
            });
        }

        let record = PostRecord {
            kind: api::POST_COLLECTION,
            text: request.text.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            embed: (!embedded.is_empty()).then(|| Embed {
                kind: api::IMAGES_EMBED,
                images: embedded,
            }),
        };
        let create = self
            .http
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .json(&CreateRecordRequest {
                repo: &session.did,
                collection: api::POST_COLLECTION,
                record,
            });
        let created: CreateRecordResponse = self.send_authed(create, &session).await?;

        info!("Published {} as {}", request.unit_id, created.uri);
        Ok(PublishReceipt {
            uri: created.uri,
            cid: created.cid,
        })
    }
}

#[cfg(test)]
mod tests;
