//! API client layer for the REST backend and the push event stream.

use crate::config::{AuthConfig, ConsoleConfig, ForwardConfig};
use crate::traits::{
    AgentDirectory, AttentionSource, CaseBackend, EventStream, EventStreamConnector,
};
use async_trait::async_trait;
use dialdesk_core::{
    AgentLite, AttentionPage, CaseKind, ForwardRequest, ForwardResponse, ListAttentionsQuery,
    TicketRecord,
};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Event stream error: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for ApiClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

impl ApiClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
    forward: ForwardConfig,
}

impl RestClient {
    pub fn new(config: &ConsoleConfig) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let auth_header = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header,
            forward: config.forward.clone(),
        })
    }

    pub async fn list_attentions(
        &self,
        query: &ListAttentionsQuery,
    ) -> Result<AttentionPage, ApiClientError> {
        self.get_json("/webhooks/events", Some(query)).await
    }

    pub async fn fetch_case(
        &self,
        kind: CaseKind,
        id: i64,
    ) -> Result<TicketRecord, ApiClientError> {
        self.get_json::<TicketRecord, ()>(&case_path(kind, id), None)
            .await
    }

    pub async fn patch_case(
        &self,
        kind: CaseKind,
        id: i64,
        payload: &TicketRecord,
    ) -> Result<TicketRecord, ApiClientError> {
        let url = format!("{}{}", self.base_url, case_path(kind, id));
        let response = self
            .client
            .patch(url)
            .headers(self.auth_header.clone())
            .json(payload)
            .send()
            .await?;
        parse_response(response).await
    }

    /// Post the correlation id to the kind's forward webhook.
    ///
    /// Runs under the forward timeout rather than the general request timeout.
    pub async fn forward_case(
        &self,
        kind: CaseKind,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, ApiClientError> {
        let response = self
            .client
            .post(self.forward.url_for(kind))
            .headers(self.auth_header.clone())
            .timeout(self.forward.timeout())
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(response).await);
        }
        // Some forward hooks answer 200 with an empty body.
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ForwardResponse::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Lightweight user lookup by extension. A 404 means no such agent.
    pub async fn lookup_extension(
        &self,
        extension: i64,
    ) -> Result<Option<AgentLite>, ApiClientError> {
        let path = format!("/users/by-extension/{}/lite", extension);
        match self.get_json::<AgentLite, ()>(&path, None).await {
            Ok(agent) => Ok(Some(agent)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(url).headers(self.auth_header.clone());
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await?;
        parse_response(response).await
    }
}

#[async_trait]
impl AttentionSource for RestClient {
    async fn list_attentions(
        &self,
        query: &ListAttentionsQuery,
    ) -> Result<AttentionPage, ApiClientError> {
        RestClient::list_attentions(self, query).await
    }
}

#[async_trait]
impl AgentDirectory for RestClient {
    async fn lookup_extension(&self, extension: i64) -> Result<Option<AgentLite>, ApiClientError> {
        RestClient::lookup_extension(self, extension).await
    }
}

#[async_trait]
impl CaseBackend for RestClient {
    async fn fetch_case(&self, kind: CaseKind, id: i64) -> Result<TicketRecord, ApiClientError> {
        RestClient::fetch_case(self, kind, id).await
    }

    async fn patch_case(
        &self,
        kind: CaseKind,
        id: i64,
        payload: &TicketRecord,
    ) -> Result<TicketRecord, ApiClientError> {
        RestClient::patch_case(self, kind, id, payload).await
    }

    async fn forward_case(
        &self,
        kind: CaseKind,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, ApiClientError> {
        RestClient::forward_case(self, kind, request).await
    }
}

/// Opens the server-sent event stream that carries push invalidations.
#[derive(Clone)]
pub struct SseConnector {
    client: reqwest::Client,
    url: String,
    auth_header: HeaderMap,
}

impl SseConnector {
    pub fn new(config: &ConsoleConfig) -> Result<Self, ApiClientError> {
        // The stream is long-lived, so only the connect phase is bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.events_url.clone(),
            auth_header: build_auth_headers(&config.auth)?,
        })
    }
}

#[async_trait]
impl EventStreamConnector for SseConnector {
    async fn connect(&self) -> Result<EventStream, ApiClientError> {
        let response = self
            .client
            .get(&self.url)
            .headers(self.auth_header.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .map(|result| match result {
                Ok(event) => Ok(event.data),
                Err(err) => Err(ApiClientError::Stream(err.to_string())),
            });
        Ok(Box::pin(stream))
    }
}

fn case_path(kind: CaseKind, id: i64) -> String {
    format!("/{}/by-id_dialvox/{}", kind.resource_segment(), id)
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiClientError> {
    if response.status().is_success() {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    } else {
        Err(status_error(response).await)
    }
}

async fn status_error(response: reqwest::Response) -> ApiClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = extract_detail(&body).unwrap_or(body);
    ApiClientError::Status {
        status: status.as_u16(),
        body: if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_str())
                .to_string()
        } else {
            body
        },
    }
}

/// Backends report failures as `{"detail": "..."}`; surface just the message.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &auth.bearer_token {
        let value = format!("Bearer {}", token);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    Ok(headers)
}
