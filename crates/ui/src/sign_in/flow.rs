use std::fmt::Display;

use ferrer_platform::{AuthProvider, PlatformResult};

pub const INVALID_EMAIL_MESSAGE: &str = "Ingresa un correo válido.";
pub const CHECK_EMAIL_MESSAGE: &str = "Revisa tu correo para entrar.";
pub const SENDING_LABEL: &str = "Enviando…";
pub const SUBMIT_LABEL: &str = "Entrar";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInNotice {
    Info(String),
    Error(String),
}

impl SignInNotice {
    pub fn text(&self) -> &str {
        match self {
            Self::Info(text) | Self::Error(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInRejection {
    EmptyEmail,
    InFlight,
}

/// One accepted magic-link request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicLinkRequest {
    pub email: String,
    pub redirect_to: String,
}

/// Sign-in form state: one request in flight at most, plus the message under the form.
#[derive(Debug, Default)]
pub struct SignInFlow {
    in_flight: bool,
    notice: Option<SignInNotice>,
}

impl SignInFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn notice(&self) -> Option<&SignInNotice> {
        self.notice.as_ref()
    }

    /// Shows a message carried over from another screen.
    pub fn set_notice(&mut self, notice: SignInNotice) {
        self.notice = Some(notice);
    }

    pub fn button_label(&self) -> &'static str {
        if self.in_flight {
            SENDING_LABEL
        } else {
            SUBMIT_LABEL
        }
    }

    pub fn begin(
        &mut self,
        email: &str,
        redirect_to: &str,
    ) -> Result<MagicLinkRequest, SignInRejection> {
        if self.in_flight {
            return Err(SignInRejection::InFlight);
        }

        let email = email.trim();
        if email.is_empty() {
            self.notice = Some(SignInNotice::Error(INVALID_EMAIL_MESSAGE.to_string()));
            return Err(SignInRejection::EmptyEmail);
        }

        self.in_flight = true;
        self.notice = None;
        Ok(MagicLinkRequest {
            email: email.to_string(),
            redirect_to: redirect_to.to_string(),
        })
    }

    pub fn finish<E: Display>(&mut self, result: Result<(), E>) {
        self.in_flight = false;
        self.notice = Some(match result {
            Ok(()) => SignInNotice::Info(CHECK_EMAIL_MESSAGE.to_string()),
            Err(error) => {
                tracing::warn!(error = %error, "magic link request failed");
                SignInNotice::Error(format!("No se pudo enviar el enlace: {error}"))
            }
        });
    }
}

pub async fn request_magic_link(
    auth: &dyn AuthProvider,
    request: &MagicLinkRequest,
) -> PlatformResult<()> {
    auth.sign_in_with_otp(&request.email, &request.redirect_to)
        .await
}
