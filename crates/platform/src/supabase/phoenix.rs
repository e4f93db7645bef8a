use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use snafu::ResultExt;

use crate::error::{DecodePayloadSnafu, EncodePayloadSnafu, PlatformResult};
use crate::types::{ChangeFilter, ChatMessage};

pub(crate) const PHOENIX_TOPIC: &str = "phoenix";
pub(crate) const EVENT_JOIN: &str = "phx_join";
pub(crate) const EVENT_LEAVE: &str = "phx_leave";
pub(crate) const EVENT_REPLY: &str = "phx_reply";
pub(crate) const EVENT_ERROR: &str = "phx_error";
pub(crate) const EVENT_CLOSE: &str = "phx_close";
pub(crate) const EVENT_HEARTBEAT: &str = "heartbeat";
pub(crate) const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

/// One frame of the Phoenix channel protocol (`vsn=1.0.0`, JSON objects).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    Joined,
    JoinRejected(String),
    Inserted(ChatMessage),
    ChannelError(String),
    Ignored,
}

pub(crate) fn channel_topic(filter: &ChangeFilter) -> String {
    format!("realtime:{}", filter.table)
}

impl PhoenixMessage {
    pub fn join(
        topic: &str,
        filter: &ChangeFilter,
        access_token: &str,
        reference: &str,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": {"ack": false, "self": false},
                    "presence": {"key": ""},
                    "postgres_changes": [{
                        "event": filter.event.as_wire(),
                        "schema": filter.schema,
                        "table": filter.table,
                    }],
                    "private": false,
                },
                "access_token": access_token,
            }),
            reference: Some(reference.to_string()),
            join_ref: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    pub fn leave(topic: &str, reference: &str, join_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: Some(join_ref.to_string()),
        }
    }

    pub fn encode(&self) -> PlatformResult<String> {
        serde_json::to_string(self).context(EncodePayloadSnafu {
            stage: "phoenix-encode",
        })
    }

    pub fn decode(text: &str) -> PlatformResult<Self> {
        serde_json::from_str(text).context(DecodePayloadSnafu {
            stage: "phoenix-decode",
        })
    }

    /// Interprets a frame received on `topic` for the join identified by `join_ref`.
    pub fn classify(&self, topic: &str, join_ref: &str) -> Inbound {
        if self.topic != topic {
            return Inbound::Ignored;
        }

        match self.event.as_str() {
            EVENT_REPLY if self.reference.as_deref() == Some(join_ref) => {
                match self.payload.get("status").and_then(Value::as_str) {
                    Some("ok") => Inbound::Joined,
                    _ => Inbound::JoinRejected(reply_reason(&self.payload)),
                }
            }
            EVENT_POSTGRES_CHANGES => {
                let data = &self.payload["data"];
                if data.get("type").and_then(Value::as_str) != Some("INSERT") {
                    return Inbound::Ignored;
                }
                match serde_json::from_value::<ChatMessage>(data["record"].clone()) {
                    Ok(record) => Inbound::Inserted(record),
                    Err(error) => {
                        tracing::warn!(topic = %topic, error = %error, "dropping undecodable insert record");
                        Inbound::Ignored
                    }
                }
            }
            EVENT_ERROR => Inbound::ChannelError("channel crashed on server".to_string()),
            EVENT_CLOSE => Inbound::ChannelError("channel closed by server".to_string()),
            "system" if self.payload.get("status").and_then(Value::as_str) == Some("error") => {
                Inbound::ChannelError(
                    self.payload
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("realtime system error")
                        .to_string(),
                )
            }
            _ => Inbound::Ignored,
        }
    }
}

fn reply_reason(payload: &Value) -> String {
    let response = &payload["response"];
    response
        .get("reason")
        .or_else(|| response.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| response.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_carries_filter_and_token() {
        let filter = ChangeFilter::inserts_on("messages");
        let frame = PhoenixMessage::join("realtime:messages", &filter, "jwt", "1");
        let encoded: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();

        assert_eq!(encoded["topic"], "realtime:messages");
        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "1");
        assert_eq!(encoded["join_ref"], "1");
        assert_eq!(encoded["payload"]["access_token"], "jwt");
        let change = &encoded["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "INSERT");
        assert_eq!(change["schema"], "public");
        assert_eq!(change["table"], "messages");
    }

    #[test]
    fn heartbeat_has_no_join_ref() {
        let encoded = PhoenixMessage::heartbeat("7").encode().unwrap();
        assert!(encoded.contains("\"topic\":\"phoenix\""));
        assert!(!encoded.contains("join_ref"));
    }

    #[test]
    fn decodes_insert_records() {
        let text = r#"{
            "topic": "realtime:messages",
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [12],
                "data": {
                    "schema": "public",
                    "table": "messages",
                    "type": "INSERT",
                    "commit_timestamp": "2024-05-01T10:00:00Z",
                    "record": {
                        "id": 42,
                        "user_id": "8d0fd2b3-9ca7-4f3c-9d5a-7a1a9c1f7c11",
                        "email": "bob@y.com",
                        "name": "bob",
                        "message": "hola",
                        "created_at": "2024-05-01T10:00:00Z"
                    }
                }
            }
        }"#;
        let frame = PhoenixMessage::decode(text).unwrap();

        match frame.classify("realtime:messages", "1") {
            Inbound::Inserted(record) => {
                assert_eq!(record.id, 42);
                assert_eq!(record.message, "hola");
                assert_eq!(record.display_name(), "bob");
            }
            other => panic!("expected insert, got {other:?}"),
        }
        assert_eq!(frame.classify("realtime:other", "1"), Inbound::Ignored);
    }

    #[test]
    fn join_replies_resolve_by_reference() {
        let ok = PhoenixMessage::decode(
            r#"{"topic":"realtime:messages","event":"phx_reply","ref":"1","payload":{"status":"ok","response":{}}}"#,
        )
        .unwrap();
        assert_eq!(ok.classify("realtime:messages", "1"), Inbound::Joined);
        // Replies to heartbeats or leaves share the event name but not the join ref.
        assert_eq!(ok.classify("realtime:messages", "2"), Inbound::Ignored);

        let rejected = PhoenixMessage::decode(
            r#"{"topic":"realtime:messages","event":"phx_reply","ref":"1","payload":{"status":"error","response":{"reason":"Invalid JWT"}}}"#,
        )
        .unwrap();
        assert_eq!(
            rejected.classify("realtime:messages", "1"),
            Inbound::JoinRejected("Invalid JWT".to_string())
        );
    }

    #[test]
    fn server_side_channel_failures_are_reported() {
        let crashed = PhoenixMessage::decode(
            r#"{"topic":"realtime:messages","event":"phx_error","ref":"1","payload":{}}"#,
        )
        .unwrap();
        assert!(matches!(
            crashed.classify("realtime:messages", "1"),
            Inbound::ChannelError(_)
        ));
    }
}
