use std::fmt::Display;

use ferrer_platform::{AuthProvider, PlatformResult, Session};

use crate::routes::{Navigate, Route};

pub const VALIDATING_MESSAGE: &str = "Validando acceso...";
pub const INVALID_LINK_NOTICE: &str =
    "El enlace de acceso no es válido o ya expiró. Solicita uno nuevo.";

/// Where the callback screen goes once the code exchange settles.
pub fn callback_outcome<E: Display>(exchanged: Result<Session, E>) -> Navigate {
    match exchanged {
        Ok(session) => {
            tracing::info!(user_id = %session.user.id, "sign-in link accepted");
            Navigate::to(Route::Chat)
        }
        Err(error) => {
            tracing::warn!(error = %error, "sign-in link rejected");
            Navigate::with_notice(Route::SignIn, INVALID_LINK_NOTICE)
        }
    }
}

pub async fn complete_sign_in(auth: &dyn AuthProvider, callback_url: &str) -> PlatformResult<Session> {
    auth.exchange_code_for_session(callback_url).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_support::FakeAuth;

    const CALLBACK: &str = "ferrer://app/auth/callback?code=abc";

    #[tokio::test]
    async fn accepted_link_navigates_to_chat() {
        let auth = FakeAuth::signed_out();

        let navigate = callback_outcome(complete_sign_in(&auth, CALLBACK).await);

        assert_eq!(navigate, Navigate::to(Route::Chat));
        assert_eq!(auth.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_link_returns_to_sign_in_with_notice() {
        let auth = FakeAuth::failing_exchange();

        let navigate = callback_outcome(complete_sign_in(&auth, CALLBACK).await);

        assert_eq!(
            navigate,
            Navigate::with_notice(Route::SignIn, INVALID_LINK_NOTICE)
        );
    }
}
