use std::collections::HashSet;
use std::fmt::Display;

use ferrer_platform::{ChatMessage, MessageOrder, MessageStore, PlatformResult};

pub const HISTORY_FAILED_NOTICE: &str = "No se pudieron cargar los mensajes.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedLoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// Messages shown in the room: one history snapshot followed by realtime arrivals.
#[derive(Debug, Default)]
pub struct MessageFeed {
    messages: Vec<ChatMessage>,
    load_state: FeedLoadState,
    /// Realtime arrivals seen while the snapshot was in flight.
    arrived_while_loading: Vec<ChatMessage>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn load_state(&self) -> &FeedLoadState {
        &self.load_state
    }

    pub fn load_error(&self) -> Option<&str> {
        match &self.load_state {
            FeedLoadState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn begin_load(&mut self) {
        self.load_state = FeedLoadState::Loading;
        self.arrived_while_loading.clear();
    }

    /// Replaces the feed with the loaded history, then re-appends arrivals
    /// the snapshot missed. Returns true when the view should scroll to the bottom.
    pub fn finish_load<E: Display>(&mut self, loaded: Result<Vec<ChatMessage>, E>) -> bool {
        let arrived = std::mem::take(&mut self.arrived_while_loading);
        match loaded {
            Ok(snapshot) => {
                let known: HashSet<i64> = snapshot.iter().map(|message| message.id).collect();
                self.messages = snapshot;
                self.messages
                    .extend(arrived.into_iter().filter(|message| !known.contains(&message.id)));
                self.load_state = FeedLoadState::Loaded;
                true
            }
            Err(error) => {
                let reason = error.to_string();
                tracing::warn!(error = %reason, "failed to load message history");
                self.messages.clear();
                self.load_state = FeedLoadState::Failed(reason);
                false
            }
        }
    }

    /// Appends one realtime arrival in delivery order, without sorting or dedup.
    pub fn append(&mut self, message: ChatMessage) {
        if self.load_state == FeedLoadState::Loading {
            self.arrived_while_loading.push(message.clone());
        }
        self.messages.push(message);
    }
}

pub async fn load_history(store: &dyn MessageStore) -> PlatformResult<Vec<ChatMessage>> {
    store.select_messages(MessageOrder::IdAscending).await
}
