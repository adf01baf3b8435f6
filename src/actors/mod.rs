//! The long-running tasks sharing the table.
//!
//! - Agent: places two random ingredients, waits for them to be taken
//! - Smoker: one per ingredient, takes matching placements
//! - Smoking session: the timed smoke spawned by a successful take
//!
//! Every actor stops at its next suspension point once the shutdown flag
//! flips to `true`.

mod agent;
mod session;
mod smoker;

pub use agent::Agent;
pub use session::SmokingSession;
pub use smoker::Smoker;

use tokio::sync::watch;

/// Resolve once shutdown has been requested or the sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
