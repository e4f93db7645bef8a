use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::PlatformResult;
use crate::types::{ChangeFilter, ChatMessage, MessageOrder, NewChatMessage, Session};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ChannelWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Hosted auth: magic-link sign-in, callback exchange and the persisted session.
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` means nobody is signed in. Errors are transport or storage faults.
    fn get_session<'a>(&'a self) -> BoxFuture<'a, PlatformResult<Option<Session>>>;
    fn sign_in_with_otp<'a>(
        &'a self,
        email: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, PlatformResult<()>>;
    fn exchange_code_for_session<'a>(
        &'a self,
        callback_url: &'a str,
    ) -> BoxFuture<'a, PlatformResult<Session>>;
    /// Clears the local session even when the server call fails.
    fn sign_out<'a>(&'a self) -> BoxFuture<'a, PlatformResult<()>>;
}

pub trait MessageStore: Send + Sync {
    fn select_messages<'a>(
        &'a self,
        order: MessageOrder,
    ) -> BoxFuture<'a, PlatformResult<Vec<ChatMessage>>>;
    fn insert_message<'a>(&'a self, record: NewChatMessage) -> BoxFuture<'a, PlatformResult<()>>;
}

pub trait RealtimeProvider: Send + Sync {
    fn subscribe(&self, filter: ChangeFilter) -> PlatformResult<ChannelHandle>;

    /// Returns true only for the call that actually released the channel.
    fn unsubscribe(&self, lease: ChannelLease) -> bool {
        lease.release()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    Reconnecting { attempt: u32, retry_in: Duration },
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Inserted(ChatMessage),
    Status(ChannelStatus),
    Error(String),
}

/// One-shot cancel shared by the stream and the lease of a channel.
#[derive(Clone)]
struct CancelSignal(Arc<Mutex<Option<oneshot::Sender<()>>>>);

impl CancelSignal {
    fn fire(&self) -> bool {
        let sender = self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(sender) => {
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }

    fn is_fired(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

/// Receiving half of a channel. Dropping it releases the channel.
pub struct ChannelEventStream {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    cancel: CancelSignal,
}

/// The token handed back to [`RealtimeProvider::unsubscribe`].
pub struct ChannelLease {
    filter: ChangeFilter,
    cancel: CancelSignal,
}

pub struct ChannelHandle {
    pub stream: ChannelEventStream,
    pub lease: ChannelLease,
    pub worker: ChannelWorker,
}

impl ChannelEventStream {
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    pub fn is_released(&self) -> bool {
        self.cancel.is_fired()
    }
}

impl Drop for ChannelEventStream {
    fn drop(&mut self) {
        self.cancel.fire();
    }
}

impl ChannelLease {
    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }

    pub fn release(self) -> bool {
        self.cancel.fire()
    }
}

/// Wires one channel: the worker keeps `event_tx` and `cancel_rx`, the
/// subscriber gets the stream and the lease.
pub fn make_channel(
    filter: ChangeFilter,
) -> (
    mpsc::UnboundedSender<ChannelEvent>,
    ChannelEventStream,
    ChannelLease,
    oneshot::Receiver<()>,
) {
    let (event_tx, events) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let cancel = CancelSignal(Arc::new(Mutex::new(Some(cancel_tx))));
    let stream = ChannelEventStream {
        events,
        cancel: cancel.clone(),
    };
    (event_tx, stream, ChannelLease { filter, cancel }, cancel_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_release_signals_worker_exactly_once() {
        let (_event_tx, stream, lease, mut cancel_rx) =
            make_channel(ChangeFilter::inserts_on("messages"));

        assert!(!stream.is_released());
        assert!(lease.release());
        assert!(stream.is_released());
        assert!(cancel_rx.try_recv().is_ok());

        // The stream's own drop finds the channel already released.
        drop(stream);
        assert!(cancel_rx.try_recv().is_err());
    }

    #[test]
    fn dropping_the_stream_releases_the_channel() {
        let (_event_tx, stream, lease, mut cancel_rx) =
            make_channel(ChangeFilter::inserts_on("messages"));
        drop(stream);
        assert!(cancel_rx.try_recv().is_ok());
        assert!(!lease.release());
    }

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (event_tx, mut stream, _lease, _cancel_rx) =
            make_channel(ChangeFilter::inserts_on("messages"));
        event_tx
            .send(ChannelEvent::Status(ChannelStatus::Subscribed))
            .unwrap();
        event_tx
            .send(ChannelEvent::Error("socket closed".to_string()))
            .unwrap();
        drop(event_tx);

        assert_eq!(
            stream.recv().await,
            Some(ChannelEvent::Status(ChannelStatus::Subscribed))
        );
        assert_eq!(
            stream.recv().await,
            Some(ChannelEvent::Error("socket closed".to_string()))
        );
        assert_eq!(stream.recv().await, None);
    }
}
