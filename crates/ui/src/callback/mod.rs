pub mod flow;
pub mod view;

pub use flow::{INVALID_LINK_NOTICE, VALIDATING_MESSAGE, callback_outcome, complete_sign_in};
pub use view::CallbackView;
