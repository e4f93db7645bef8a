use std::fmt::Display;

use ferrer_platform::{AuthUser, MessageStore, NewChatMessage, PlatformResult};

pub const SEND_FAILED_NOTICE: &str = "No se pudo enviar el mensaje.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeRejection {
    /// No signed-in user with an email to attribute the message to.
    NoIdentity,
    EmptyText,
}

/// Builds the insert record for `text`, or says why nothing should be sent.
pub fn prepare_send(
    identity: Option<&AuthUser>,
    text: &str,
) -> Result<NewChatMessage, ComposeRejection> {
    let message = text.trim();
    if message.is_empty() {
        return Err(ComposeRejection::EmptyText);
    }

    let Some((user, email)) = identity.and_then(|user| {
        user.email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .map(|email| (user, email))
    }) else {
        return Err(ComposeRejection::NoIdentity);
    };

    Ok(NewChatMessage::new(user.id, email, message))
}

/// The composer's buffer and the outcome of its last send.
#[derive(Debug, Default)]
pub struct Composer {
    draft: String,
    send_error: Option<&'static str>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn edit(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// An accepted draft empties the buffer; a rejected one keeps it as typed.
    pub fn submit(&mut self, identity: Option<&AuthUser>) -> Result<NewChatMessage, ComposeRejection> {
        let record = prepare_send(identity, &self.draft)?;
        self.draft.clear();
        self.send_error = None;
        Ok(record)
    }

    pub fn finish_send<E: Display>(&mut self, sent: Result<(), E>) {
        if let Err(error) = sent {
            tracing::warn!(error = %error, "message insert failed");
            self.send_error = Some(SEND_FAILED_NOTICE);
        }
    }

    pub fn send_error(&self) -> Option<&'static str> {
        self.send_error
    }
}

pub async fn send_message(store: &dyn MessageStore, record: NewChatMessage) -> PlatformResult<()> {
    store.insert_message(record).await
}
