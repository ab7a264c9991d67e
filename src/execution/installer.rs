//! Conditional installer - skip work whose result is already present

use std::future::Future;
use tracing::{debug, info};

/// What `ensure` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured<T> {
    /// The precondition held; nothing was run
    AlreadySatisfied(String),
    /// The action ran and produced this value
    Performed(T),
}

impl<T> Ensured<T> {
    pub fn was_performed(&self) -> bool {
        matches!(self, Ensured::Performed(_))
    }
}

/// Run `action` unless `precondition` reports the work as already done
///
/// The precondition returns the reason it holds, e.g. "directory venv
/// exists". Existence is taken at face value; nothing checks that what is
/// there is current.
pub async fn ensure<T, E, P, F, Fut>(precondition: P, action: F) -> Result<Ensured<T>, E>
where
    P: FnOnce() -> Option<String>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(reason) = precondition() {
        info!("Already satisfied: {}", reason);
        return Ok(Ensured::AlreadySatisfied(reason));
    }

    debug!("Precondition not met, running action");
    action().await.map(Ensured::Performed)
}
