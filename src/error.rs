use thiserror::Error;

/// Everything Eidolon can complain about.
///
/// Only construction, `load_images` and `start_animation` hand these back to
/// the caller. Drawing helpers log them and carry on, so a bad image name
/// inside a frame never unwinds the tick loop.
#[derive(Debug, Error)]
pub enum EidolonError {
    /// Onscreen or offscreen surface could not be created. Fatal.
    #[error("could not initialize drawing surface: {0}")]
    SurfaceInit(String),

    #[error("image not found in the current batch: {0}")]
    ImageNotFound(String),

    #[error("pixel access already set up for image: {0}")]
    AlreadyConfigured(String),

    #[error("animation is already running; stop it before starting again")]
    AlreadyRunning,

    /// A call reached back into state that is currently borrowed, e.g.
    /// `load_images` from inside the frame function.
    #[error("re-entrant call to {0} while Eidolon state is in use")]
    Reentrant(&'static str),

    #[error("host error: {0}")]
    Host(String),
}

impl From<anyhow::Error> for EidolonError {
    fn from(err: anyhow::Error) -> Self {
        EidolonError::Host(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, EidolonError>;
