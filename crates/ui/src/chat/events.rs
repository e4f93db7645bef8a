/// Emitted when the composer submits its buffer (Enter or the send button).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSubmitted {
    pub text: String,
}

impl ComposeSubmitted {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
