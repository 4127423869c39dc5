//! Reddit source client using an app-only OAuth2 client-credentials grant.

pub mod api;


use api::{RedditListing, RedditPostData};
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    TokenResponse, TokenUrl,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use skyrelay_core::{
    CommentRecord, CoreError, Credentials, PostRecord, QuerySpec, SourceClient, SourceFetchError,
};
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Tokens are refreshed this long before Reddit would reject them.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub api_base: String,
    pub auth_url: String,
    pub token_url: String,
}

impl RedditConfig {
    pub fn new(client_id: String, client_secret: String, user_agent: String) -> Self {
        Self {
            client_id,
            client_secret,
            user_agent,
            api_base: api::REDDIT_API_BASE.to_string(),
            auth_url: api::REDDIT_AUTH_URL.to_string(),
            token_url: api::REDDIT_TOKEN_URL.to_string(),
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self::new(
            credentials.reddit_client_id.clone(),
            credentials.reddit_client_secret.clone(),
            credentials.reddit_user_agent.clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() + TOKEN_EXPIRY_MARGIN >= self.expires_at
    }
}

pub struct RedditClient {
    http: Client,
    oauth: BasicClient,
    api_base: String,
    token: RwLock<Option<RedditToken>>,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Result<Self, CoreError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(HTTP_TIMEOUT)
            .build()?;

        let invalid_url = |field: &str, value: &str| {
            CoreError::from(skyrelay_core::ConfigError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
            })
        };
        let auth_url = AuthUrl::new(config.auth_url.clone())
            .map_err(|_| invalid_url("auth_url", &config.auth_url))?;
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|_| invalid_url("token_url", &config.token_url))?;

        let oauth = BasicClient::new(
            ClientId::new(config.client_id),
            Some(ClientSecret::new(config.client_secret)),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::BasicAuth);

        Ok(Self {
            http,
            oauth,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .is_some_and(|token| !token.is_expired())
    }

    async fn clear_token(&self) {
        debug!("Discarding cached Reddit token");
        *self.token.write().await = None;
    }

    /// Runs the client-credentials grant and returns a fresh token.
    pub async fn authenticate(&self) -> Result<RedditToken, CoreError> {
        info!("Requesting Reddit application token");
        let http = self.http.clone();
        let response = self
            .oauth
            .exchange_client_credentials()
            .request_async(|request| send_oauth_request(http, request))
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) if e.is_timeout() => {
                    CoreError::from(SourceFetchError::RequestTimeout)
                }
                RequestTokenError::Request(e) => CoreError::Network(e),
                RequestTokenError::ServerResponse(response) => {
                    error!("Reddit rejected the client credentials: {}", response);
                    SourceFetchError::AuthenticationFailed {
                        reason: response.to_string(),
                    }
                    .into()
                }
                other => SourceFetchError::AuthenticationFailed {
                    reason: other.to_string(),
                }
                .into(),
            })?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        debug!("Reddit token valid for {:?}", lifetime);
        Ok(RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + lifetime,
        })
    }

    async fn access_token(&self) -> Result<String, CoreError> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }

        let mut cached = self.token.write().await;
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }
        let token = self.authenticate().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        source_name: &str,
    ) -> Result<T, CoreError> {
        let access_token = self.access_token().await?;
        let url = format!("{}{}", self.api_base, endpoint);

        debug!("Making Reddit API request: GET {}", endpoint);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    CoreError::from(SourceFetchError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.clear_token().await;
            }
            return Err(api::status_error(status, response.headers(), endpoint, source_name).into());
        }

        response.json::<T>().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            SourceFetchError::InvalidResponse {
                details: format!("Failed to parse response from {}", endpoint),
            }
            .into()
        })
    }
}

#[async_trait]
impl SourceClient for RedditClient {
    async fn list_posts(&self, query: &QuerySpec) -> Result<Vec<PostRecord>, CoreError> {
        let endpoint = format!("/r/{}/{}", query.source_name, query.filter_type.as_str());
        let mut params = vec![("limit", query.limit.to_string())];
        if let Some(time_filter) = query.time_filter {
            params.push(("t", time_filter.as_str().to_string()));
        }

        let listing: RedditListing<RedditPostData> = self
            .get_json(&endpoint, &params, &query.source_name)
            .await?;

        let posts: Vec<PostRecord> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into_record(&query.source_name))
            .collect();
        info!("Retrieved {} posts from r/{}", posts.len(), query.source_name);
        Ok(posts)
    }

    async fn list_comments(
        &self,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<CommentRecord>, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let params = [
            ("limit", limit.to_string()),
            ("sort", "top".to_string()),
            ("depth", "1".to_string()),
        ];

        let listings: Vec<RedditListing<serde_json::Value>> =
            self.get_json(&endpoint, &params, post_id).await?;
        let comments = api::extract_comments(listings);
        debug!("Retrieved {} comments for post {}", comments.len(), post_id);
        Ok(comments)
    }
}

/// Sends oauth2 token requests through the shared client so they carry the
/// configured user agent.
async fn send_oauth_request(
    http: Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let mut builder = http
        .request(request.method, request.url.as_str())
        .body(request.body);
    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }

    let response = builder.send().await?;
    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
