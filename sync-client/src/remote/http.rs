//! HTTP client for the remote store.

use super::{RemoteError, RemoteStore};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::Mutex;
use vaultsync_types::{
    CompleteRequest, CompleteResponse, DeltaRequest, DeltaResponse, EncryptionSaltRequest, FileId,
    FixHashRequest, LoginRequest, RefreshRequest, TokenPair, UploadRequest, UploadResponse,
    VaultKeyBody,
};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Session {
    tokens: TokenPair,
    /// Bumped on every login or refresh.
    generation: u64,
}

/// JSON-over-HTTPS remote store with bearer-token authentication.
///
/// An expired access token (401) triggers one refresh followed by one retry
/// of the request. Concurrent callers that hit the same expired token share
/// a single refresh call.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    session: Mutex<Option<Session>>,
    refresh_gate: Mutex<()>,
}

impl HttpRemote {
    /// Create a client for `base_url` (e.g. `https://sync.example.com/api`).
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        Self::build(base_url, None)
    }

    /// Create a client with a previously persisted session.
    pub fn with_tokens(base_url: &str, tokens: TokenPair) -> Result<Self, RemoteError> {
        Self::build(
            base_url,
            Some(Session {
                tokens,
                generation: 1,
            }),
        )
    }

    fn build(base_url: &str, session: Option<Session>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: Mutex::new(session),
            refresh_gate: Mutex::new(()),
        })
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current tokens, for persisting after a refresh.
    pub async fn tokens(&self) -> Option<TokenPair> {
        self.session.lock().await.as_ref().map(|s| s.tokens.clone())
    }

    /// `POST auth/login`.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, RemoteError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp = self
            .client
            .post(self.url("auth/login"))
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest)?;
        let tokens: TokenPair = decode(check(resp).await?).await?;
        self.install(tokens.clone()).await;
        tracing::info!("Logged in as {}", username);
        Ok(tokens)
    }

    /// Drop the session.
    pub async fn logout(&self) {
        *self.session.lock().await = None;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn install(&self, tokens: TokenPair) {
        let mut session = self.session.lock().await;
        let generation = session.as_ref().map_or(0, |s| s.generation) + 1;
        *session = Some(Session { tokens, generation });
    }

    async fn current_token(&self) -> Result<(String, u64), RemoteError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| (s.tokens.access_token.clone(), s.generation))
            .ok_or(RemoteError::NotAuthenticated)
    }

    /// Refresh unless another caller already replaced the token we used.
    async fn refresh(&self, seen_generation: u64) -> Result<(), RemoteError> {
        let _gate = self.refresh_gate.lock().await;

        let refresh_token = {
            let session = self.session.lock().await;
            match session.as_ref() {
                None => return Err(RemoteError::NotAuthenticated),
                Some(s) if s.generation != seen_generation => return Ok(()),
                Some(s) => s.tokens.refresh_token.clone(),
            }
        };

        tracing::debug!("Access token expired, refreshing");
        let resp = self
            .client
            .post(self.url("auth/refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(map_reqwest)?;
        let tokens: TokenPair = decode(check(resp).await?).await?;
        self.install(tokens).await;
        Ok(())
    }

    /// Send with the bearer token; on 401 refresh once and retry once.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let (token, generation) = self.current_token().await?;
        let retry = builder.try_clone();
        let resp = builder
            .bearer_auth(&token)
            .send()
            .await
            .map_err(map_reqwest)?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return check(resp).await;
        }
        let Some(retry) = retry else {
            return check(resp).await;
        };

        self.refresh(generation).await?;
        let (token, _) = self.current_token().await?;
        let resp = retry
            .bearer_auth(&token)
            .send()
            .await
            .map_err(map_reqwest)?;
        check(resp).await
    }
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn map_reqwest(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Network(e.to_string())
    }
}

async fn check(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp
        .text()
        .await
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RemoteError> {
    let bytes = resp.bytes().await.map_err(map_reqwest)?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn delta(&self, request: &DeltaRequest) -> Result<DeltaResponse, RemoteError> {
        let resp = self
            .send(self.client.post(self.url("delta")).json(request))
            .await?;
        decode(resp).await
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResponse, RemoteError> {
        let resp = self
            .send(self.client.post(self.url("upload")).json(request))
            .await?;
        decode(resp).await
    }

    async fn download(&self, file_id: &FileId) -> Result<Vec<u8>, RemoteError> {
        let url = self.url(&format!("download/{}", file_id));
        let resp = self.send(self.client.get(url)).await?;
        let bytes = resp.bytes().await.map_err(map_reqwest)?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, file_id: &FileId) -> Result<(), RemoteError> {
        let url = self.url(&format!("delete/{}", file_id));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn fix_hash(&self, request: &FixHashRequest) -> Result<(), RemoteError> {
        self.send(self.client.post(self.url("fix-hash")).json(request))
            .await?;
        Ok(())
    }

    async fn complete(&self, request: &CompleteRequest) -> Result<CompleteResponse, RemoteError> {
        let resp = self
            .send(self.client.post(self.url("complete")).json(request))
            .await?;
        decode(resp).await
    }

    async fn put_encryption_salt(
        &self,
        request: &EncryptionSaltRequest,
    ) -> Result<bool, RemoteError> {
        let result = self
            .send(
                self.client
                    .put(self.url("auth/encryption-salt"))
                    .json(request),
            )
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(RemoteError::Status { status: 409, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn put_vault_key(&self, blob: &str) -> Result<(), RemoteError> {
        let body = VaultKeyBody {
            blob: Some(blob.to_string()),
        };
        self.send(self.client.put(self.url("auth/vault-key")).json(&body))
            .await?;
        Ok(())
    }

    async fn get_vault_key(&self) -> Result<Option<String>, RemoteError> {
        match self.send(self.client.get(self.url("auth/vault-key"))).await {
            Ok(resp) => {
                let body: VaultKeyBody = decode(resp).await?;
                Ok(body.blob.filter(|b| !b.is_empty()))
            }
            Err(RemoteError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
