use ferrer_platform::{PlatformError, PlatformResult};
use snafu::{ResultExt, Snafu};

pub type TaskResult<T> = Result<T, TaskError>;

/// Failure of a platform call that ran on the Tokio side of the bridge.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TaskError {
    #[snafu(display("{source}"))]
    Platform {
        stage: &'static str,
        source: PlatformError,
    },
    #[snafu(display("background task for `{stage}` stopped early: {details}"))]
    Interrupted {
        stage: &'static str,
        details: String,
    },
}

/// Flattens the bridge join result and the platform result into one.
pub fn settle<T>(
    stage: &'static str,
    joined: Result<PlatformResult<T>, gpui_tokio_bridge::JoinError>,
) -> TaskResult<T> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(source).context(PlatformSnafu { stage }),
        Err(error) => InterruptedSnafu {
            stage,
            details: format!("{error:?}"),
        }
        .fail(),
    }
}
