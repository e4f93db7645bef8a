mod auth;
mod phoenix;
mod realtime;
mod rest;
mod session;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use reqwest::{RequestBuilder, Response};
use snafu::{ResultExt, ensure};
use url::Url;

pub use auth::{SupabaseAuth, auth_code_from_callback, pkce_challenge};
pub use realtime::{Backoff, SupabaseRealtime};
pub use rest::SupabaseStore;
pub use session::SessionKeeper;

use crate::error::{
    HttpClientBuildSnafu, HttpRequestSnafu, HttpStatusSnafu, InvalidInputSnafu, InvalidUrlSnafu,
    MissingConfigSnafu, PlatformResult,
};
use crate::types::Session;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub schema: String,
    pub messages_table: String,
    /// Key of the persisted session; derived from the project host when blank.
    pub storage_key: String,
    pub request_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().to_string(),
            anon_key: anon_key.into().trim().to_string(),
            schema: "public".to_string(),
            messages_table: "messages".to_string(),
            storage_key: String::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_messages_table(mut self, table: impl Into<String>) -> Self {
        self.messages_table = table.into();
        self
    }

    pub fn with_storage_key(mut self, storage_key: impl Into<String>) -> Self {
        self.storage_key = storage_key.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn validate(&self) -> PlatformResult<Url> {
        ensure!(
            !self.url.is_empty(),
            MissingConfigSnafu {
                stage: "supabase-config-validate",
                field: "url",
            }
        );
        ensure!(
            !self.anon_key.is_empty(),
            MissingConfigSnafu {
                stage: "supabase-config-validate",
                field: "anon_key",
            }
        );
        ensure!(
            !self.messages_table.trim().is_empty(),
            MissingConfigSnafu {
                stage: "supabase-config-validate",
                field: "messages_table",
            }
        );

        let mut base_url = Url::parse(&self.url).context(InvalidUrlSnafu {
            stage: "supabase-config-parse-url",
            url: self.url.clone(),
        })?;
        ensure!(
            matches!(base_url.scheme(), "http" | "https"),
            InvalidInputSnafu {
                stage: "supabase-config-url-scheme",
                details: format!("expected http(s) URL, got '{}'", self.url),
            }
        );
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(base_url)
    }
}

/// Shared HTTP state for the auth, store and realtime adapters.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: SupabaseConfig,
    base_url: Url,
    storage_key: String,
    http: reqwest::Client,
    session: ArcSwapOption<Session>,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> PlatformResult<Self> {
        let base_url = config.validate()?;
        let storage_key = if config.storage_key.trim().is_empty() {
            default_storage_key(&base_url)
        } else {
            config.storage_key.trim().to_string()
        };

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .context(HttpClientBuildSnafu {
                stage: "supabase-client-build",
            })?;

        tracing::debug!(url = %base_url, storage_key = %storage_key, "created platform client");
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                base_url,
                storage_key,
                http,
                session: ArcSwapOption::empty(),
            }),
        })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.inner.config
    }

    pub fn storage_key(&self) -> &str {
        &self.inner.storage_key
    }

    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.inner.session.load_full()
    }

    pub(crate) fn set_session(&self, session: Option<Session>) {
        self.inner.session.store(session.map(Arc::new));
    }

    pub(crate) fn endpoint(&self, path: &str) -> PlatformResult<Url> {
        self.inner.base_url.join(path).context(InvalidUrlSnafu {
            stage: "supabase-endpoint-join",
            url: path.to_string(),
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn with_api_headers(&self, builder: RequestBuilder, bearer: &str) -> RequestBuilder {
        builder
            .header("apikey", self.inner.config.anon_key.as_str())
            .bearer_auth(bearer)
    }

    pub(crate) fn realtime_url(&self) -> PlatformResult<Url> {
        let mut url = self.endpoint("realtime/v1/websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        if url.set_scheme(scheme).is_err() {
            return InvalidInputSnafu {
                stage: "supabase-realtime-url-scheme",
                details: format!("cannot switch '{url}' to {scheme}"),
            }
            .fail();
        }
        url.query_pairs_mut()
            .append_pair("apikey", &self.inner.config.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    pub(crate) async fn send(
        &self,
        builder: RequestBuilder,
        stage: &'static str,
    ) -> PlatformResult<Response> {
        let response = builder.send().await.context(HttpRequestSnafu { stage })?;
        check_status(response, stage).await
    }
}

pub(crate) async fn check_status(
    response: Response,
    stage: &'static str,
) -> PlatformResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    HttpStatusSnafu {
        stage,
        status: status.as_u16(),
        body,
    }
    .fail()
}

fn default_storage_key(base_url: &Url) -> String {
    let project = base_url
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .unwrap_or("local");
    format!("sb-{project}-auth-token")
}
