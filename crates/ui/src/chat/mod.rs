pub mod composer;
pub mod events;
/// History snapshot plus realtime arrivals.
pub mod feed;
pub mod message_input;
pub mod message_list;
pub mod scroll_manager;
/// Lifecycle of the live insert channel.
pub mod subscription;
pub mod view;

pub use composer::{ComposeRejection, Composer, prepare_send, send_message};
pub use events::ComposeSubmitted;
pub use feed::{FeedLoadState, MessageFeed, load_history};
pub use message_input::MessageInput;
pub use message_list::MessageList;
pub use scroll_manager::ScrollManager;
pub use subscription::{RealtimeSubscription, SubscriptionState};
pub use view::ChatView;
