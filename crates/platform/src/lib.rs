mod error;
mod provider;
pub mod supabase;
mod types;

use std::sync::Arc;

use ferrer_storage::KeyValueStore;

pub use error::{PlatformError, PlatformResult};
pub use provider::{
    AuthProvider, BoxFuture, ChannelEvent, ChannelEventStream, ChannelHandle, ChannelLease,
    ChannelStatus, ChannelWorker, MessageStore, RealtimeProvider, make_channel,
};
pub use supabase::{
    SessionKeeper, SupabaseAuth, SupabaseClient, SupabaseConfig, SupabaseRealtime, SupabaseStore,
};
pub use types::{
    ANONYMOUS_DISPLAY_NAME, AuthUser, ChangeEvent, ChangeFilter, ChatMessage, MessageOrder,
    NewChatMessage, Session, display_name_from_email,
};

/// The three hosted capabilities the client talks to.
#[derive(Clone)]
pub struct Platform {
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn MessageStore>,
    pub realtime: Arc<dyn RealtimeProvider>,
}

impl Platform {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn MessageStore>,
        realtime: Arc<dyn RealtimeProvider>,
    ) -> Self {
        Self {
            auth,
            store,
            realtime,
        }
    }
}

pub fn create_platform(
    config: SupabaseConfig,
    storage: Arc<dyn KeyValueStore>,
) -> PlatformResult<Platform> {
    let sessions = SessionKeeper::new(SupabaseClient::new(config)?, storage);
    Ok(Platform::new(
        Arc::new(SupabaseAuth::new(sessions.clone())),
        Arc::new(SupabaseStore::new(sessions.clone())),
        Arc::new(SupabaseRealtime::new(sessions)),
    ))
}
