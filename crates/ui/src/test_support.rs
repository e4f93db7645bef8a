use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use ferrer_platform::{
    AuthProvider, AuthUser, BoxFuture, ChangeFilter, ChannelEvent, ChannelHandle, ChannelLease,
    ChatMessage, MessageOrder, MessageStore, NewChatMessage, PlatformError, PlatformResult,
    RealtimeProvider, Session, make_channel,
};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub fn session_for(email: &str) -> Session {
    Session {
        access_token: format!("token-{email}"),
        refresh_token: "refresh".to_string(),
        token_type: "bearer".to_string(),
        expires_in: Some(3600),
        expires_at: None,
        user: AuthUser {
            id: Uuid::from_u128(email.bytes().map(u128::from).sum()),
            email: Some(email.to_string()),
        },
    }
}

pub fn message_row(id: i64, email: &str, text: &str) -> ChatMessage {
    ChatMessage {
        id,
        user_id: None,
        email: Some(email.to_string()),
        name: None,
        message: text.to_string(),
        created_at: None,
    }
}

fn rejected(stage: &'static str) -> PlatformError {
    PlatformError::HttpStatus {
        stage,
        status: 500,
        body: "boom".to_string(),
    }
}

#[derive(Default)]
pub struct FakeAuth {
    session: Option<Session>,
    fail_session: bool,
    fail_otp: bool,
    fail_exchange: bool,
    pub otp_requests: Mutex<Vec<(String, String)>>,
    pub exchanges: AtomicUsize,
    pub sign_outs: AtomicUsize,
}

impl FakeAuth {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    pub fn failing_session() -> Self {
        Self {
            fail_session: true,
            ..Self::default()
        }
    }

    pub fn failing_otp() -> Self {
        Self {
            fail_otp: true,
            ..Self::default()
        }
    }

    pub fn failing_exchange() -> Self {
        Self {
            fail_exchange: true,
            ..Self::default()
        }
    }

    pub fn otp_calls(&self) -> usize {
        self.otp_requests.lock().unwrap().len()
    }
}

impl AuthProvider for FakeAuth {
    fn get_session<'a>(&'a self) -> BoxFuture<'a, PlatformResult<Option<Session>>> {
        Box::pin(async move {
            if self.fail_session {
                return Err(rejected("fake-get-session"));
            }
            Ok(self.session.clone())
        })
    }

    fn sign_in_with_otp<'a>(
        &'a self,
        email: &'a str,
        redirect_to: &'a str,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        Box::pin(async move {
            self.otp_requests
                .lock()
                .unwrap()
                .push((email.to_string(), redirect_to.to_string()));
            if self.fail_otp {
                return Err(rejected("fake-otp"));
            }
            Ok(())
        })
    }

    fn exchange_code_for_session<'a>(
        &'a self,
        _callback_url: &'a str,
    ) -> BoxFuture<'a, PlatformResult<Session>> {
        Box::pin(async move {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if self.fail_exchange {
                return Err(rejected("fake-exchange"));
            }
            Ok(session_for("alice@x.com"))
        })
    }

    fn sign_out<'a>(&'a self) -> BoxFuture<'a, PlatformResult<()>> {
        Box::pin(async move {
            self.sign_outs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct FakeStore {
    rows: Vec<ChatMessage>,
    fail_select: bool,
    fail_insert: bool,
    pub selects: Mutex<Vec<MessageOrder>>,
    pub inserts: Mutex<Vec<NewChatMessage>>,
}

impl FakeStore {
    pub fn with_rows(rows: Vec<ChatMessage>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn failing_select() -> Self {
        Self {
            fail_select: true,
            ..Self::default()
        }
    }

    pub fn failing_insert() -> Self {
        Self {
            fail_insert: true,
            ..Self::default()
        }
    }

    pub fn inserted(&self) -> Vec<NewChatMessage> {
        self.inserts.lock().unwrap().clone()
    }
}

impl MessageStore for FakeStore {
    fn select_messages<'a>(
        &'a self,
        order: MessageOrder,
    ) -> BoxFuture<'a, PlatformResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            self.selects.lock().unwrap().push(order);
            if self.fail_select {
                return Err(rejected("fake-select"));
            }
            Ok(self.rows.clone())
        })
    }

    fn insert_message<'a>(&'a self, record: NewChatMessage) -> BoxFuture<'a, PlatformResult<()>> {
        Box::pin(async move {
            self.inserts.lock().unwrap().push(record);
            if self.fail_insert {
                return Err(rejected("fake-insert"));
            }
            Ok(())
        })
    }
}

/// Hands out in-memory channels and keeps both far ends for inspection.
#[derive(Default)]
pub struct FakeRealtime {
    pub filters: Mutex<Vec<ChangeFilter>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<ChannelEvent>>>,
    cancels: Mutex<Vec<oneshot::Receiver<()>>>,
    released: AtomicUsize,
    unsubscribes: AtomicUsize,
}

impl FakeRealtime {
    pub fn subscriptions(&self) -> usize {
        self.filters.lock().unwrap().len()
    }

    pub fn sender(&self, index: usize) -> mpsc::UnboundedSender<ChannelEvent> {
        self.senders.lock().unwrap()[index].clone()
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    /// Number of channels whose release signal reached the worker side.
    pub fn released(&self) -> usize {
        let newly_released = self
            .cancels
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|cancel| cancel.try_recv().is_ok())
            .count();
        self.released.fetch_add(newly_released, Ordering::SeqCst) + newly_released
    }
}

impl RealtimeProvider for FakeRealtime {
    fn subscribe(&self, filter: ChangeFilter) -> PlatformResult<ChannelHandle> {
        let (event_tx, stream, lease, cancel_rx) = make_channel(filter.clone());
        self.filters.lock().unwrap().push(filter);
        self.senders.lock().unwrap().push(event_tx);
        self.cancels.lock().unwrap().push(cancel_rx);
        Ok(ChannelHandle {
            stream,
            lease,
            worker: Box::pin(async {}),
        })
    }

    fn unsubscribe(&self, lease: ChannelLease) -> bool {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        lease.release()
    }
}
