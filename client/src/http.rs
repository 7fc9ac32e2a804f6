//! HTTP/JSON implementation of the suggestion service.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use votebox_types::{
    CommittedState, DraftSuggestion, DuplicateCheck, SimilarityMatch, Suggestion, SuggestionId,
    SuggestionStatus, VoteKind,
};

use crate::error::ServiceError;
use crate::service::SuggestionService;
use crate::session::SessionStore;
use crate::wire::{
    suggestions_from, CreateBody, DuplicateCheckRecord, HealthRecord, RegisterBody,
    SimilarityQuery, SimilarityResponse, SuggestionRecord, TokenRecord, UserRecord, VoteBody,
    VoteRecord,
};

/// Default timeout for a whole request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── ApiClient ───────────────────────────────────────────────────────────

/// Shared HTTP plumbing: base URL, connection pool and bearer token.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<dyn SessionStore>,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`).
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<dyn SessionStore>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| ServiceError::InvalidRequest(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode a JSON body, mapping statuses to errors.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = ServiceError::from_status(status.as_u16(), &body);
            tracing::debug!(status = status.as_u16(), error = %err, "request rejected");
            return Err(err);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

fn id_path(id: &SuggestionId) -> Result<String, ServiceError> {
    if !id.is_valid() {
        return Err(ServiceError::InvalidRequest(format!(
            "malformed suggestion id: {id:?}"
        )));
    }
    Ok(format!("/suggestions/{}", id.as_str()))
}

// ── HttpSuggestionService ───────────────────────────────────────────────

/// [`SuggestionService`] over the backend's REST endpoints.
#[derive(Clone)]
pub struct HttpSuggestionService {
    api: ApiClient,
}

impl HttpSuggestionService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}

#[async_trait]
impl SuggestionService for HttpSuggestionService {
    async fn list(
        &self,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<Suggestion>, ServiceError> {
        let mut req = self.api.request(reqwest::Method::GET, "/suggestions");
        if let Some(status) = status {
            req = req.query(&[("status", status.as_str())]);
        }
        let records: Vec<SuggestionRecord> = self.api.send(req).await?;
        suggestions_from(records)
    }

    async fn get(&self, id: &SuggestionId) -> Result<Suggestion, ServiceError> {
        let req = self.api.request(reqwest::Method::GET, &id_path(id)?);
        let record: SuggestionRecord = self.api.send(req).await?;
        Suggestion::try_from(record)
    }

    async fn create(&self, draft: &DraftSuggestion) -> Result<Suggestion, ServiceError> {
        let body = CreateBody {
            title: &draft.title,
            description: draft.description.as_deref(),
        };
        let req = self
            .api
            .request(reqwest::Method::POST, "/suggestions")
            .json(&body);
        let record: SuggestionRecord = self.api.send(req).await?;
        Suggestion::try_from(record)
    }

    async fn vote(
        &self,
        id: &SuggestionId,
        kind: VoteKind,
    ) -> Result<CommittedState, ServiceError> {
        let path = format!("{}/vote", id_path(id)?);
        let req = match kind {
            VoteKind::Vote => self.api.request(reqwest::Method::POST, &path),
            VoteKind::Upvote => self
                .api
                .request(reqwest::Method::POST, &path)
                .json(&VoteBody {
                    vote_type: "upvote",
                }),
            VoteKind::Downvote => self
                .api
                .request(reqwest::Method::POST, &path)
                .json(&VoteBody {
                    vote_type: "downvote",
                }),
            VoteKind::Unvote => self.api.request(reqwest::Method::DELETE, &path),
        };
        let record: VoteRecord = self.api.send(req).await?;
        CommittedState::try_from(record)
    }

    async fn similar(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>, ServiceError> {
        let req = self
            .api
            .request(reqwest::Method::POST, "/suggestions/check-similarity")
            .json(&SimilarityQuery { query: text, limit });
        let response: SimilarityResponse = self.api.send(req).await?;
        let mut matches = response.into_matches();
        matches.truncate(limit);
        Ok(matches)
    }

    async fn check_duplicate(
        &self,
        draft: &DraftSuggestion,
    ) -> Result<DuplicateCheck, ServiceError> {
        let body = CreateBody {
            title: &draft.title,
            description: draft.description.as_deref(),
        };
        let req = self
            .api
            .request(reqwest::Method::POST, "/suggestions/check-duplicate")
            .json(&body);
        let record: DuplicateCheckRecord = self.api.send(req).await?;
        Ok(DuplicateCheck::from(record))
    }

    async fn my_votes(&self) -> Result<Vec<Suggestion>, ServiceError> {
        let req = self.api.request(reqwest::Method::GET, "/suggestions/my/votes");
        let records: Vec<SuggestionRecord> = self.api.send(req).await?;
        suggestions_from(records)
    }

    async fn health(&self) -> Result<String, ServiceError> {
        let req = self.api.request(reqwest::Method::GET, "/health");
        let record: HealthRecord = self.api.send(req).await?;
        Ok(record.status)
    }
}

// ── AuthClient ──────────────────────────────────────────────────────────

/// Login and registration against the backend's auth endpoints.
///
/// A successful login stores the token in the shared session.
#[derive(Clone)]
pub struct AuthClient {
    api: ApiClient,
}

impl AuthClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// OAuth2 password login; the email goes in the `username` field.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ServiceError> {
        let req = self
            .api
            .request(reqwest::Method::POST, "/auth/login")
            .form(&[("username", email), ("password", password)]);
        let token: TokenRecord = self.api.send(req).await?;
        if token.access_token.is_empty() {
            return Err(ServiceError::InvalidResponse("empty access token".into()));
        }
        tracing::info!(token_type = %token.token_type, "logged in");
        self.api.session().set_token(token.access_token);
        Ok(())
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<UserRecord, ServiceError> {
        let req = self
            .api
            .request(reqwest::Method::POST, "/auth/register")
            .json(&RegisterBody {
                email,
                password,
                full_name,
            });
        self.api.send(req).await
    }

    pub async fn me(&self) -> Result<UserRecord, ServiceError> {
        let req = self.api.request(reqwest::Method::GET, "/auth/me");
        self.api.send(req).await
    }

    pub fn logout(&self) {
        self.api.session().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;

    fn api() -> ApiClient {
        ApiClient::new(
            "http://127.0.0.1:8000/",
            Arc::new(MemorySession::new()),
            DEFAULT_TIMEOUT,
        )
        .unwrap()
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = api();
        assert_eq!(api.base_url(), "http://127.0.0.1:8000");
        assert_eq!(api.url("/health"), "http://127.0.0.1:8000/health");
    }

    #[test]
    fn malformed_id_never_reaches_the_wire() {
        assert!(id_path(&SuggestionId::new("../admin")).is_err());
        assert!(id_path(&SuggestionId::new("..")).is_err());
        assert!(id_path(&SuggestionId::new("S1?admin=1")).is_err());
        assert!(id_path(&SuggestionId::new("S1#x")).is_err());
        assert_eq!(
            id_path(&SuggestionId::new("S1")).unwrap(),
            "/suggestions/S1"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let api = ApiClient::new(
            "http://127.0.0.1:9",
            Arc::new(MemorySession::with_token("t")),
            Duration::from_secs(2),
        )
        .unwrap();
        let service = HttpSuggestionService::new(api);
        let err = service.list(None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Network(_)), "got {err:?}");
    }
}
