use std::time::Duration;

use futures::{SinkExt, StreamExt};
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::session::SessionKeeper;
use super::phoenix::{Inbound, PHOENIX_TOPIC, PhoenixMessage, channel_topic};
use crate::error::{PlatformError, PlatformResult, RealtimeSocketSnafu};
use crate::provider::{
    ChannelEvent, ChannelHandle, ChannelLease, ChannelStatus, RealtimeProvider, make_channel,
};
use crate::types::ChangeFilter;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reconnect delays: 1 s doubling up to 30 s, back to 1 s after a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    attempt: u32,
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempt: 0,
            next: INITIAL_BACKOFF,
        }
    }
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.attempt = self.attempt.saturating_add(1);
        self.next = (self.next * 2).min(MAX_BACKOFF);
        delay
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ConnectionEnd {
    Released,
    ReceiverGone,
    Disconnected(String),
}

impl From<PlatformError> for ConnectionEnd {
    fn from(error: PlatformError) -> Self {
        Self::Disconnected(error.to_string())
    }
}

pub struct SupabaseRealtime {
    sessions: SessionKeeper,
}

impl SupabaseRealtime {
    pub fn new(sessions: SessionKeeper) -> Self {
        Self { sessions }
    }
}

impl RealtimeProvider for SupabaseRealtime {
    fn subscribe(&self, filter: ChangeFilter) -> PlatformResult<ChannelHandle> {
        // Surface URL problems to the caller instead of retrying them forever.
        let client = self.sessions.client();
        client.realtime_url()?;
        let filter = filter.with_schema(client.config().schema.clone());
        let (event_tx, stream, lease, cancel_rx) = make_channel(filter.clone());
        let worker = Box::pin(run_channel_worker(
            self.sessions.clone(),
            filter,
            event_tx,
            cancel_rx,
        ));
        Ok(ChannelHandle {
            stream,
            lease,
            worker,
        })
    }

    fn unsubscribe(&self, lease: ChannelLease) -> bool {
        let table = lease.filter().table.clone();
        let released = lease.release();
        if released {
            tracing::debug!(table = %table, "unsubscribing from realtime channel");
        }
        released
    }
}

async fn run_channel_worker(
    sessions: SessionKeeper,
    filter: ChangeFilter,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let topic = channel_topic(&filter);
    let mut backoff = Backoff::default();

    loop {
        let end = run_connection(&sessions, &filter, &topic, &event_tx, &mut cancel_rx, &mut backoff)
            .await;
        let reason = match end {
            ConnectionEnd::Released | ConnectionEnd::ReceiverGone => break,
            ConnectionEnd::Disconnected(reason) => reason,
        };

        let retry_in = backoff.next_delay();
        let attempt = backoff.attempt();
        tracing::warn!(
            topic = %topic,
            attempt,
            retry_in_ms = retry_in.as_millis() as u64,
            reason = %reason,
            "realtime channel disconnected"
        );
        let status = ChannelStatus::Reconnecting { attempt, retry_in };
        if event_tx.send(ChannelEvent::Status(status)).is_err() {
            break;
        }

        tokio::select! {
            _ = &mut cancel_rx => break,
            _ = tokio::time::sleep(retry_in) => {}
        }
    }

    let _ = event_tx.send(ChannelEvent::Status(ChannelStatus::Closed));
    tracing::debug!(topic = %topic, "realtime channel worker stopped");
}

async fn run_connection(
    sessions: &SessionKeeper,
    filter: &ChangeFilter,
    topic: &str,
    event_tx: &mpsc::UnboundedSender<ChannelEvent>,
    cancel_rx: &mut oneshot::Receiver<()>,
    backoff: &mut Backoff,
) -> ConnectionEnd {
    let client = sessions.client();
    let url = match client.realtime_url() {
        Ok(url) => url,
        Err(error) => return error.into(),
    };

    let timeout = client.config().request_timeout;
    let connect = tokio::time::timeout(timeout, connect_async(url.as_str()));
    let socket = tokio::select! {
        _ = &mut *cancel_rx => return ConnectionEnd::Released,
        result = connect => match result {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(source)) => {
                return PlatformError::RealtimeSocket {
                    stage: "realtime-connect",
                    source,
                }
                .into();
            }
            Err(_) => return ConnectionEnd::Disconnected(format!(
                "realtime connect timed out after {}s",
                timeout.as_secs()
            )),
        },
    };
    let (mut sink, mut stream) = socket.split();

    let mut refs = RefCounter::default();
    let join_ref = refs.next();
    // Every (re)join carries a token that is valid right now.
    let access_token = match sessions.bearer_token().await {
        Ok(token) => token,
        Err(error) => return error.into(),
    };
    let join = PhoenixMessage::join(topic, filter, &access_token, &join_ref);
    if let Err(end) = send_frame(&mut sink, &join, "realtime-join").await {
        return end;
    }
    tracing::debug!(topic = %topic, join_ref = %join_ref, "joining realtime channel");

    let period = client.config().heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending_heartbeat: Option<String> = None;

    loop {
        tokio::select! {
            _ = &mut *cancel_rx => {
                let leave = PhoenixMessage::leave(topic, &refs.next(), &join_ref);
                let _ = send_frame(&mut sink, &leave, "realtime-leave").await;
                let _ = sink.close().await;
                tracing::debug!(topic = %topic, "released realtime channel");
                return ConnectionEnd::Released;
            }
            _ = heartbeat.tick() => {
                if pending_heartbeat.is_some() {
                    return ConnectionEnd::Disconnected("heartbeat reply timed out".to_string());
                }
                let reference = refs.next();
                if let Err(end) = send_frame(&mut sink, &PhoenixMessage::heartbeat(&reference), "realtime-heartbeat").await {
                    return end;
                }
                pending_heartbeat = Some(reference);
            }
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return ConnectionEnd::Disconnected("socket closed by server".to_string());
                    }
                    Some(Err(source)) => {
                        return PlatformError::RealtimeSocket {
                            stage: "realtime-read",
                            source,
                        }
                        .into();
                    }
                    Some(Ok(_)) => continue,
                };

                let message = match PhoenixMessage::decode(&text) {
                    Ok(message) => message,
                    Err(error) => {
                        tracing::warn!(topic = %topic, error = %error, "ignoring malformed realtime frame");
                        continue;
                    }
                };

                if message.topic == PHOENIX_TOPIC {
                    if message.reference.is_some() && message.reference == pending_heartbeat {
                        pending_heartbeat = None;
                    }
                    continue;
                }

                let event = match message.classify(topic, &join_ref) {
                    Inbound::Joined => {
                        backoff.reset();
                        tracing::info!(topic = %topic, table = %filter.table, "subscribed to realtime channel");
                        ChannelEvent::Status(ChannelStatus::Subscribed)
                    }
                    Inbound::JoinRejected(reason) => {
                        let _ = event_tx.send(ChannelEvent::Error(reason.clone()));
                        return ConnectionEnd::Disconnected(format!("join rejected: {reason}"));
                    }
                    Inbound::Inserted(record) => ChannelEvent::Inserted(record),
                    Inbound::ChannelError(reason) => return ConnectionEnd::Disconnected(reason),
                    Inbound::Ignored => continue,
                };

                if event_tx.send(event).is_err() {
                    let leave = PhoenixMessage::leave(topic, &refs.next(), &join_ref);
                    let _ = send_frame(&mut sink, &leave, "realtime-leave").await;
                    return ConnectionEnd::ReceiverGone;
                }
            }
        }
    }
}

async fn send_frame<S>(
    sink: &mut S,
    message: &PhoenixMessage,
    stage: &'static str,
) -> Result<(), ConnectionEnd>
where
    S: futures::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = message.encode()?;
    sink.send(WsMessage::Text(text))
        .await
        .context(RealtimeSocketSnafu { stage })
        .map_err(ConnectionEnd::from)
}

#[derive(Default)]
struct RefCounter(u64);

impl RefCounter {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}
