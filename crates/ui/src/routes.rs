use url::Url;

pub const DEFAULT_ORIGIN: &str = "ferrer://app";
pub const SIGN_IN_PATH: &str = "/";
pub const CALLBACK_PATH: &str = "/auth/callback";
pub const CHAT_PATH: &str = "/chat";

/// One screen of the app. Exactly one is mounted at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    SignIn,
    /// Carries the full callback URL so the exchange can read its query.
    AuthCallback { url: String },
    Chat,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Self::SignIn => SIGN_IN_PATH,
            Self::AuthCallback { .. } => CALLBACK_PATH,
            Self::Chat => CHAT_PATH,
        }
    }

    /// Resolves an absolute deep link or a bare path against `origin`.
    ///
    /// Links for a different origin or an unknown path resolve to `None`.
    pub fn parse(input: &str, origin: &str) -> Option<Self> {
        let origin = Url::parse(origin).ok()?;
        let url = match Url::parse(input.trim()) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => origin.join(input.trim()).ok()?,
            Err(_) => return None,
        };

        if url.scheme() != origin.scheme() || url.host_str() != origin.host_str() {
            return None;
        }

        match url.path().trim_end_matches('/') {
            "" => Some(Self::SignIn),
            CALLBACK_PATH => Some(Self::AuthCallback {
                url: url.to_string(),
            }),
            CHAT_PATH => Some(Self::Chat),
            _ => None,
        }
    }
}

/// Where magic links send the user back to.
pub fn callback_redirect_url(origin: &str) -> String {
    format!("{}{CALLBACK_PATH}", origin.trim_end_matches('/'))
}

/// Emitted by route views to replace the mounted screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigate {
    pub route: Route,
    /// Shown on the destination screen, if it has a place for it.
    pub notice: Option<String>,
}

impl Navigate {
    pub fn to(route: Route) -> Self {
        Self {
            route,
            notice: None,
        }
    }

    pub fn with_notice(route: Route, notice: impl Into<String>) -> Self {
        Self {
            route,
            notice: Some(notice.into()),
        }
    }
}
