use std::fmt::Display;

use ferrer_platform::{AuthProvider, AuthUser, PlatformResult, Session};

use crate::routes::{Navigate, Route};

pub const SESSION_CHECK_FAILED_NOTICE: &str =
    "No se pudo verificar la sesión. Vuelve a ingresar tu correo.";

/// Whether the chat screen may show content, decided once per mount.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Unknown,
    Checking,
    Authenticated(AuthUser),
    Unauthenticated,
    Failed(String),
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Authenticated(_) | Self::Unauthenticated | Self::Failed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateTransitionRejection {
    AlreadyChecking,
    NotChecking(GateState),
    AlreadyResolved(GateState),
}

/// What the chat screen does once the check resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Render(AuthUser),
    Redirect(Navigate),
}

#[derive(Debug, Default)]
pub struct SessionGate {
    state: GateState,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn viewer(&self) -> Option<&AuthUser> {
        match &self.state {
            GateState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn allows_content(&self) -> bool {
        self.viewer().is_some()
    }

    pub fn begin(&mut self) -> Result<(), GateTransitionRejection> {
        match &self.state {
            GateState::Unknown => {
                self.state = GateState::Checking;
                Ok(())
            }
            GateState::Checking => Err(GateTransitionRejection::AlreadyChecking),
            resolved => Err(GateTransitionRejection::AlreadyResolved(resolved.clone())),
        }
    }

    pub fn resolve<E: Display>(
        &mut self,
        checked: Result<Option<Session>, E>,
    ) -> Result<GateOutcome, GateTransitionRejection> {
        if self.state != GateState::Checking {
            return Err(GateTransitionRejection::NotChecking(self.state.clone()));
        }

        let outcome = match checked {
            Ok(Some(session)) => {
                self.state = GateState::Authenticated(session.user.clone());
                GateOutcome::Render(session.user)
            }
            Ok(None) => {
                self.state = GateState::Unauthenticated;
                GateOutcome::Redirect(Navigate::to(Route::SignIn))
            }
            Err(error) => {
                let reason = error.to_string();
                tracing::warn!(error = %reason, "session check failed");
                self.state = GateState::Failed(reason);
                GateOutcome::Redirect(Navigate::with_notice(
                    Route::SignIn,
                    SESSION_CHECK_FAILED_NOTICE,
                ))
            }
        };
        Ok(outcome)
    }
}

pub async fn check_session(auth: &dyn AuthProvider) -> PlatformResult<Option<Session>> {
    auth.get_session().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{FakeAuth, session_for};

    #[tokio::test]
    async fn missing_session_redirects_before_content() {
        let auth = Arc::new(FakeAuth::signed_out());
        let mut gate = SessionGate::new();
        gate.begin().unwrap();
        assert!(!gate.allows_content());

        let outcome = gate.resolve(check_session(auth.as_ref()).await).unwrap();

        assert_eq!(outcome, GateOutcome::Redirect(Navigate::to(Route::SignIn)));
        assert_eq!(gate.state(), &GateState::Unauthenticated);
        assert!(!gate.allows_content());
    }

    #[tokio::test]
    async fn session_exposes_viewer_identity() {
        let session = session_for("alice@x.com");
        let auth = FakeAuth::signed_in(session.clone());
        let mut gate = SessionGate::new();
        gate.begin().unwrap();

        let outcome = gate.resolve(check_session(&auth).await).unwrap();

        assert_eq!(outcome, GateOutcome::Render(session.user.clone()));
        assert_eq!(gate.viewer(), Some(&session.user));
    }

    #[tokio::test]
    async fn failed_check_is_distinct_from_signed_out() {
        let auth = FakeAuth::failing_session();
        let mut gate = SessionGate::new();
        gate.begin().unwrap();

        let outcome = gate.resolve(check_session(&auth).await).unwrap();

        assert_eq!(
            outcome,
            GateOutcome::Redirect(Navigate::with_notice(
                Route::SignIn,
                SESSION_CHECK_FAILED_NOTICE
            ))
        );
        assert!(matches!(gate.state(), GateState::Failed(_)));
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut gate = SessionGate::new();
        assert!(matches!(
            gate.resolve(Ok::<_, String>(None)),
            Err(GateTransitionRejection::NotChecking(GateState::Unknown))
        ));

        gate.begin().unwrap();
        assert_eq!(gate.begin(), Err(GateTransitionRejection::AlreadyChecking));
        gate.resolve(Ok::<_, String>(None)).unwrap();

        assert!(gate.state().is_terminal());
        assert!(matches!(
            gate.begin(),
            Err(GateTransitionRejection::AlreadyResolved(GateState::Unauthenticated))
        ));
        assert!(gate.resolve(Ok::<_, String>(None)).is_err());
    }
}
