#![deny(unsafe_code)]

/// Desktop client for the Ferrer event chat, built with GPUI and gpui-component.
///
/// Route views sit on top of `ferrer-platform` capabilities; everything they
/// decide lives in plain state types that are tested without a window.
pub mod app;
/// Magic-link callback screen.
pub mod callback;
pub mod chat;
pub mod config;
pub mod routes;
pub mod session;
pub mod sign_in;
pub mod tasks;
/// Named style records for bubbles, labels and banners.
pub mod theme;

#[cfg(test)]
mod test_support;
