use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use sha2::{Digest, Sha256};
use snafu::{OptionExt, ResultExt};
use url::Url;

use super::SupabaseClient;
use super::session::SessionKeeper;
use crate::error::{InvalidUrlSnafu, MissingCodeVerifierSnafu, PlatformError, PlatformResult};
use crate::provider::{AuthProvider, BoxFuture};
use crate::types::Session;

const CODE_VERIFIER_LEN: usize = 64;

#[derive(Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
    code_challenge: String,
    code_challenge_method: &'static str,
}

#[derive(Serialize)]
struct PkceExchange<'a> {
    auth_code: &'a str,
    code_verifier: &'a str,
}

pub struct SupabaseAuth {
    sessions: SessionKeeper,
}

impl SupabaseAuth {
    pub fn new(sessions: SessionKeeper) -> Self {
        Self { sessions }
    }

    fn client(&self) -> &SupabaseClient {
        self.sessions.client()
    }

    fn verifier_key(&self) -> String {
        format!("{}-code-verifier", self.client().storage_key())
    }
}

impl AuthProvider for SupabaseAuth {
    fn get_session<'a>(&'a self) -> BoxFuture<'a, PlatformResult<Option<Session>>> {
        Box::pin(async move {
            let Some(session) = self.sessions.load_stored().await? else {
                self.client().set_session(None);
                return Ok(None);
            };

            self.client().set_session(Some(session));
            self.sessions.ensure_fresh_session().await
        })
    }

    fn sign_in_with_otp<'a>(
        &'a self,
        email: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        Box::pin(async move {
            let verifier = generate_code_verifier();
            let body = OtpRequest {
                email,
                create_user: true,
                code_challenge: pkce_challenge(&verifier),
                code_challenge_method: "s256",
            };

            let key = self.verifier_key();
            self.sessions.with_storage("auth-otp-store-verifier", move |storage| {
                storage.set_item(&key, &verifier)
            })
            .await?;

            let client = self.client();
            let mut url = client.endpoint("auth/v1/otp")?;
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
            let request = client
                .with_api_headers(client.http().post(url), &client.config().anon_key)
                .json(&body);
            client.send(request, "auth-otp-request").await?;

            tracing::info!(redirect_to = %redirect_to, "requested magic link");
            Ok(())
        })
    }

    fn exchange_code_for_session<'a>(
        &'a self,
        callback_url: &'a str,
    ) -> BoxFuture<'a, PlatformResult<Session>> {
        Box::pin(async move {
            let auth_code = auth_code_from_callback(callback_url)?;

            let key = self.verifier_key();
            let verifier = self
                .sessions
                .with_storage("auth-exchange-load-verifier", move |storage| {
                    storage.get_item(&key)
                })
                .await?
                .context(MissingCodeVerifierSnafu {
                    stage: "auth-exchange-load-verifier",
                })?;

            let body = PkceExchange {
                auth_code: &auth_code,
                code_verifier: &verifier,
            };
            let exchanged = self
                .sessions
                .request_session("pkce", &body, "auth-exchange-code")
                .await;

            // A verifier is single use whatever the outcome.
            let key = self.verifier_key();
            self.sessions.with_storage("auth-exchange-remove-verifier", move |storage| {
                storage.remove_item(&key)
            })
            .await?;

            let session = exchanged?;
            self.sessions.save(&session).await?;
            tracing::info!(user_id = %session.user.id, "exchanged callback code for session");
            Ok(session)
        })
    }

    fn sign_out<'a>(&'a self) -> BoxFuture<'a, PlatformResult<()>> {
        Box::pin(async move {
            let client = self.client();
            let remote = match client.current_session() {
                Some(session) => {
                    let mut url = client.endpoint("auth/v1/logout")?;
                    url.query_pairs_mut().append_pair("scope", "global");
                    let request =
                        client.with_api_headers(client.http().post(url), &session.access_token);
                    client
                        .send(request, "auth-sign-out")
                        .await
                        .map(|_| ())
                }
                None => Ok(()),
            };

            self.sessions.clear().await?;
            if let Err(error) = &remote {
                tracing::warn!(error = %error, "server sign-out failed, local session cleared");
            }
            remote
        })
    }
}

pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn generate_code_verifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_VERIFIER_LEN)
        .map(char::from)
        .collect()
}

/// Pulls the `code` parameter out of a magic-link callback URL.
pub fn auth_code_from_callback(callback_url: &str) -> PlatformResult<String> {
    let url = Url::parse(callback_url).context(InvalidUrlSnafu {
        stage: "auth-callback-parse",
        url: callback_url.to_string(),
    })?;

    let mut code = None;
    let mut failure = None;
    let fragment_pairs = url
        .fragment()
        .map(|fragment| url::form_urlencoded::parse(fragment.as_bytes()).into_owned().collect())
        .unwrap_or_else(Vec::new);

    for (name, value) in url.query_pairs().into_owned().chain(fragment_pairs) {
        match name.as_str() {
            "code" if !value.trim().is_empty() => code = Some(value),
            "error_description" => failure = Some(value),
            "error" if failure.is_none() => failure = Some(value),
            _ => {}
        }
    }

    match (code, failure) {
        (Some(code), _) => Ok(code),
        (None, failure) => Err(PlatformError::MissingAuthCode {
            stage: "auth-callback-code",
            details: failure.unwrap_or_else(|| "the link has no code parameter".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ferrer_storage::{KeyValueStore, MemoryKeyValueStore};
    use uuid::Uuid;

    use super::*;
    use crate::supabase::SupabaseConfig;
    use crate::supabase::session::test_server::respond_once;
    use crate::types::{AuthUser, unix_timestamp_seconds};

    fn auth_with_storage() -> (SupabaseAuth, Arc<MemoryKeyValueStore>) {
        let client = SupabaseClient::new(
            SupabaseConfig::new("http://127.0.0.1:9", "anon").with_storage_key("sb-test-auth-token"),
        )
        .unwrap();
        let storage = Arc::new(MemoryKeyValueStore::new());
        (SupabaseAuth::new(SessionKeeper::new(client, storage.clone())), storage)
    }

    fn session(expires_at: Option<u64>) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            expires_at,
            user: AuthUser {
                id: Uuid::nil(),
                email: Some("alice@x.com".to_string()),
            },
        }
    }

    #[test]
    fn challenge_matches_rfc7636_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn verifiers_are_long_and_unreserved() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), CODE_VERIFIER_LEN);
        assert!(verifier.chars().all(|ch| ch.is_ascii_alphanumeric()));
        assert_ne!(verifier, generate_code_verifier());
    }

    #[test]
    fn extracts_code_or_reports_link_errors() {
        assert_eq!(
            auth_code_from_callback("ferrer://app/auth/callback?code=abc-123").unwrap(),
            "abc-123"
        );

        let error = auth_code_from_callback(
            "ferrer://app/auth/callback#error=access_denied&error_description=Email+link+is+invalid+or+has+expired",
        )
        .unwrap_err();
        match error {
            PlatformError::MissingAuthCode { details, .. } => {
                assert_eq!(details, "Email link is invalid or has expired");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            auth_code_from_callback("ferrer://app/auth/callback"),
            Err(PlatformError::MissingAuthCode { .. })
        ));
    }

    #[tokio::test]
    async fn missing_session_reads_as_signed_out() {
        let (auth, _storage) = auth_with_storage();
        assert_eq!(auth.get_session().await.unwrap(), None);
        assert!(auth.client().current_session().is_none());
    }

    #[tokio::test]
    async fn fresh_stored_session_is_returned_and_mirrored() {
        let (auth, storage) = auth_with_storage();
        let stored = session(Some(unix_timestamp_seconds() + 3_600));
        storage
            .set_item("sb-test-auth-token", &serde_json::to_string(&stored).unwrap())
            .unwrap();

        assert_eq!(auth.get_session().await.unwrap(), Some(stored.clone()));
        assert_eq!(auth.client().current_session().unwrap().access_token, "access");
    }

    #[tokio::test]
    async fn expired_stored_session_is_refreshed_on_restore() {
        let fresh = Session {
            access_token: "fresh".to_string(),
            ..session(Some(unix_timestamp_seconds() + 3_600))
        };
        let (url, server) = respond_once(200, serde_json::to_string(&fresh).unwrap()).await;
        let client =
            SupabaseClient::new(SupabaseConfig::new(&url, "anon").with_storage_key("sb-test-auth-token"))
                .unwrap();
        let storage = Arc::new(MemoryKeyValueStore::new());
        let auth = SupabaseAuth::new(SessionKeeper::new(client, storage.clone()));
        let stale = session(Some(unix_timestamp_seconds() - 600));
        storage
            .set_item("sb-test-auth-token", &serde_json::to_string(&stale).unwrap())
            .unwrap();

        assert_eq!(auth.get_session().await.unwrap(), Some(fresh));
        assert!(server.await.unwrap().contains("grant_type=refresh_token"));
        assert_eq!(auth.client().current_session().unwrap().access_token, "fresh");
    }

    #[tokio::test]
    async fn unreadable_session_is_discarded() {
        let (auth, storage) = auth_with_storage();
        storage.set_item("sb-test-auth-token", "not json").unwrap();

        assert_eq!(auth.get_session().await.unwrap(), None);
        assert_eq!(storage.get_item("sb-test-auth-token").unwrap(), None);
    }

    #[tokio::test]
    async fn exchange_without_pending_sign_in_fails_before_any_request() {
        let (auth, _storage) = auth_with_storage();
        let error = auth
            .exchange_code_for_session("ferrer://app/auth/callback?code=abc")
            .await
            .unwrap_err();
        assert!(matches!(error, PlatformError::MissingCodeVerifier { .. }));
    }

    #[tokio::test]
    async fn sign_out_without_session_clears_storage_locally() {
        let (auth, storage) = auth_with_storage();
        storage.set_item("sb-test-auth-token", "not json").unwrap();

        auth.sign_out().await.unwrap();
        assert_eq!(storage.get_item("sb-test-auth-token").unwrap(), None);
    }

    #[tokio::test]
    async fn sign_out_clears_local_session_when_server_is_unreachable() {
        let (auth, storage) = auth_with_storage();
        let stored = session(Some(unix_timestamp_seconds() + 3_600));
        storage
            .set_item("sb-test-auth-token", &serde_json::to_string(&stored).unwrap())
            .unwrap();
        auth.get_session().await.unwrap();

        // Port 9 (discard) refuses connections, so the remote call fails.
        assert!(auth.sign_out().await.is_err());
        assert_eq!(storage.get_item("sb-test-auth-token").unwrap(), None);
        assert!(auth.client().current_session().is_none());
    }
}
