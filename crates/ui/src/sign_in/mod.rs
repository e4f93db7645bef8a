pub mod flow;
pub mod view;

pub use flow::{MagicLinkRequest, SignInFlow, SignInNotice, SignInRejection, request_magic_link};
pub use view::SignInView;
