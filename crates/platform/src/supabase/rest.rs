use reqwest::RequestBuilder;
use snafu::ResultExt;

use super::session::SessionKeeper;
use crate::error::{DecodePayloadSnafu, EncodePayloadSnafu, HttpRequestSnafu, PlatformResult};
use crate::provider::{BoxFuture, MessageStore};
use crate::types::{ChatMessage, MessageOrder, NewChatMessage};

/// Table access over the PostgREST endpoint, authorized as the signed-in user.
pub struct SupabaseStore {
    sessions: SessionKeeper,
}

impl SupabaseStore {
    pub fn new(sessions: SessionKeeper) -> Self {
        Self { sessions }
    }

    fn table_path(&self) -> String {
        format!("rest/v1/{}", self.sessions.client().config().messages_table.trim())
    }

    async fn select_request(&self, order: MessageOrder) -> PlatformResult<RequestBuilder> {
        let bearer = self.sessions.bearer_token().await?;
        let client = self.sessions.client();
        let mut url = client.endpoint(&self.table_path())?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", order.as_query());

        Ok(client
            .with_api_headers(client.http().get(url), &bearer)
            .header("Accept-Profile", client.config().schema.as_str()))
    }

    async fn insert_request(&self, record: &NewChatMessage) -> PlatformResult<RequestBuilder> {
        let bearer = self.sessions.bearer_token().await?;
        let client = self.sessions.client();
        let url = client.endpoint(&self.table_path())?;
        let body = serde_json::to_vec(&[record]).context(EncodePayloadSnafu {
            stage: "store-insert-encode",
        })?;

        Ok(client
            .with_api_headers(client.http().post(url), &bearer)
            .header("Content-Profile", client.config().schema.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .body(body))
    }
}

impl MessageStore for SupabaseStore {
    fn select_messages<'a>(
        &'a self,
        order: MessageOrder,
    ) -> BoxFuture<'a, PlatformResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            let request = self.select_request(order).await?;
            let client = self.sessions.client();
            let response = client.send(request, "store-select").await?;
            let text = response.text().await.context(HttpRequestSnafu {
                stage: "store-select-read",
            })?;
            let rows: Vec<ChatMessage> = serde_json::from_str(&text).context(DecodePayloadSnafu {
                stage: "store-select-decode",
            })?;

            tracing::debug!(
                table = %client.config().messages_table,
                count = rows.len(),
                "loaded message history"
            );
            Ok(rows)
        })
    }

    fn insert_message<'a>(&'a self, record: NewChatMessage) -> BoxFuture<'a, PlatformResult<()>> {
        Box::pin(async move {
            let request = self.insert_request(&record).await?;
            let client = self.sessions.client();
            client.send(request, "store-insert").await?;
            tracing::debug!(
                table = %client.config().messages_table,
                user_id = %record.user_id,
                "inserted message"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ferrer_storage::MemoryKeyValueStore;
    use uuid::Uuid;

    use super::*;
    use crate::supabase::session::test_server::respond_once;
    use crate::supabase::{SupabaseClient, SupabaseConfig};
    use crate::types::{AuthUser, Session, unix_timestamp_seconds};

    fn store_at(url: &str) -> SupabaseStore {
        let client = SupabaseClient::new(SupabaseConfig::new(url, "anon")).unwrap();
        SupabaseStore::new(SessionKeeper::new(
            client,
            Arc::new(MemoryKeyValueStore::new()),
        ))
    }

    fn session(access_token: &str, expires_at: u64) -> Session {
        Session {
            access_token: access_token.to_string(),
            refresh_token: "refresh-1".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            expires_at: Some(expires_at),
            user: AuthUser {
                id: Uuid::nil(),
                email: Some("alice@x.com".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn select_orders_by_ascending_id() {
        let request = store_at("https://abcd1234.supabase.co")
            .select_request(MessageOrder::IdAscending)
            .await
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::GET);
        assert_eq!(
            request.url().as_str(),
            "https://abcd1234.supabase.co/rest/v1/messages?select=*&order=id.asc"
        );
        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["authorization"], "Bearer anon");
        assert_eq!(request.headers()["accept-profile"], "public");
    }

    #[tokio::test]
    async fn insert_posts_a_single_row_without_echo() {
        let record = NewChatMessage::new(Uuid::nil(), "alice@x.com", "hello");
        let request = store_at("https://abcd1234.supabase.co")
            .insert_request(&record)
            .await
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.headers()["prefer"], "return=minimal");
        let body = request.body().and_then(|body| body.as_bytes()).unwrap();
        let rows: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(rows[0]["message"], "hello");
        assert_eq!(rows[0]["name"], "alice");
        assert_eq!(rows[0]["email"], "alice@x.com");
    }

    #[tokio::test]
    async fn insert_after_expiry_carries_the_refreshed_token() {
        let fresh = session("fresh-jwt", unix_timestamp_seconds() + 3_600);
        let (url, server) = respond_once(200, serde_json::to_string(&fresh).unwrap()).await;
        let store = store_at(&url);
        store
            .sessions
            .client()
            .set_session(Some(session("expired-jwt", unix_timestamp_seconds() - 600)));

        let record = NewChatMessage::new(Uuid::nil(), "alice@x.com", "hello");
        let request = store.insert_request(&record).await.unwrap().build().unwrap();

        assert_eq!(request.headers()["authorization"], "Bearer fresh-jwt");
        assert!(server.await.unwrap().contains("grant_type=refresh_token"));
    }
}
