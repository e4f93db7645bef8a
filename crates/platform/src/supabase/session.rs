use std::sync::Arc;
use std::time::Duration;

use ferrer_storage::{KeyValueStore, StorageResult};
use serde::Serialize;
use snafu::ResultExt;
use tokio::sync::Mutex;

use super::SupabaseClient;
use crate::error::{
    AuthStorageSnafu, DecodePayloadSnafu, EncodePayloadSnafu, HttpRequestSnafu, PlatformResult,
    StorageTaskSnafu,
};
use crate::types::{Session, unix_timestamp_seconds};

/// Sessions closer than this to expiry are refreshed before being handed out.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Persisted session state shared by the auth, store and realtime adapters.
#[derive(Clone)]
pub struct SessionKeeper {
    client: SupabaseClient,
    storage: Arc<dyn KeyValueStore>,
    refresh_lock: Arc<Mutex<()>>,
}

impl SessionKeeper {
    pub fn new(client: SupabaseClient, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            client,
            storage,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn client(&self) -> &SupabaseClient {
        &self.client
    }

    pub(crate) async fn with_storage<T, F>(&self, stage: &'static str, op: F) -> PlatformResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn KeyValueStore) -> StorageResult<T> + Send + 'static,
    {
        // SQLite-backed stores block, so keep them off the async workers.
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || op(storage.as_ref()))
            .await
            .context(StorageTaskSnafu { stage })?
            .context(AuthStorageSnafu { stage })
    }

    pub(crate) async fn load_stored(&self) -> PlatformResult<Option<Session>> {
        let key = self.client.storage_key().to_string();
        let raw = self
            .with_storage("auth-load-session", move |storage| storage.get_item(&key))
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                tracing::warn!(error = %error, "discarding unreadable stored session");
                self.clear().await?;
                Ok(None)
            }
        }
    }

    pub(crate) async fn save(&self, session: &Session) -> PlatformResult<()> {
        let raw = serde_json::to_string(session).context(EncodePayloadSnafu {
            stage: "auth-save-session-encode",
        })?;
        let key = self.client.storage_key().to_string();
        self.with_storage("auth-save-session", move |storage| {
            storage.set_item(&key, &raw)
        })
        .await?;
        self.client.set_session(Some(session.clone()));
        Ok(())
    }

    pub(crate) async fn clear(&self) -> PlatformResult<()> {
        self.client.set_session(None);
        let key = self.client.storage_key().to_string();
        self.with_storage("auth-clear-session", move |storage| storage.remove_item(&key))
            .await
    }

    pub(crate) async fn request_session(
        &self,
        grant_type: &str,
        body: &impl Serialize,
        stage: &'static str,
    ) -> PlatformResult<Session> {
        let mut url = self.client.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let request = self
            .client
            .with_api_headers(self.client.http().post(url), &self.client.config().anon_key)
            .json(body);
        let response = self.client.send(request, stage).await?;
        let text = response.text().await.context(HttpRequestSnafu { stage })?;
        let session: Session =
            serde_json::from_str(&text).context(DecodePayloadSnafu { stage })?;
        Ok(session.normalized(unix_timestamp_seconds()))
    }

    pub(crate) async fn refresh(&self, stale: &Session) -> PlatformResult<Option<Session>> {
        let body = RefreshRequest {
            refresh_token: &stale.refresh_token,
        };
        match self
            .request_session("refresh_token", &body, "auth-refresh-session")
            .await
        {
            Ok(session) => {
                self.save(&session).await?;
                tracing::debug!(user_id = %session.user.id, "refreshed session");
                Ok(Some(session))
            }
            Err(error) if error.is_client_rejection() => {
                tracing::info!(error = %error, "refresh token rejected, clearing session");
                self.clear().await?;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// The in-memory session, refreshed and persisted first when it is about to expire.
    pub async fn ensure_fresh_session(&self) -> PlatformResult<Option<Session>> {
        let Some(current) = self.client.current_session() else {
            return Ok(None);
        };
        if !current.expires_within(EXPIRY_MARGIN, unix_timestamp_seconds()) {
            return Ok(Some(current.as_ref().clone()));
        }

        // Refresh tokens are single use; concurrent callers wait for one refresh.
        let _guard = self.refresh_lock.lock().await;
        match self.client.current_session() {
            Some(session) if !session.expires_within(EXPIRY_MARGIN, unix_timestamp_seconds()) => {
                Ok(Some(session.as_ref().clone()))
            }
            Some(session) => self.refresh(&session).await,
            None => Ok(None),
        }
    }

    /// Bearer for data requests: the user's fresh access token, or the anon key.
    pub async fn bearer_token(&self) -> PlatformResult<String> {
        Ok(self
            .ensure_fresh_session()
            .await?
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.client.config().anon_key.clone()))
    }
}
