//! A smoker: waits for a wake-up, tries the table, smokes or passes.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::{SmokingSession, stopped};
use crate::coordination::Table;
use crate::error::{Error, Result};
use crate::ingredient::Ingredient;

/// A smoker holding an endless supply of one ingredient.
pub struct Smoker {
    ingredient: Ingredient,
    table: Arc<Table>,
    pause: Duration,
    smoke_duration: Duration,
}

impl Smoker {
    /// Create the smoker who owns `ingredient`.
    pub fn new(ingredient: Ingredient, table: Arc<Table>, pause: Duration, smoke_duration: Duration) -> Self {
        Self {
            ingredient,
            table,
            pause,
            smoke_duration,
        }
    }

    /// Run until shutdown, then wait for any cigarette still burning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut sessions = JoinSet::new();

        let outcome = self.serve(&mut sessions, &mut shutdown).await;

        if !sessions.is_empty() {
            debug!(
                "Smoker with {} waiting for {} session(s) to finish",
                self.ingredient,
                sessions.len()
            );
        }
        let drained = drain(&mut sessions).await;

        info!("Smoker with {} leaves the table", self.ingredient);
        outcome.and(drained)
    }

    async fn serve(
        &self,
        sessions: &mut JoinSet<Result<()>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            while let Some(finished) = sessions.try_join_next() {
                finished??;
            }

            tokio::select! {
                biased;
                _ = stopped(shutdown) => return Ok(()),
                woken = self.table.wait_for_wake() => woken?,
            }

            if self.table.try_consume(self.ingredient).await? {
                let session = SmokingSession::new(self.table.clone(), self.ingredient, self.smoke_duration);
                sessions.spawn(session.run());
            } else {
                self.table.hand_back(self.ingredient).await;
            }

            tokio::select! {
                biased;
                _ = stopped(shutdown) => return Ok(()),
                _ = tokio::time::sleep(self.pause) => {}
            }
        }
    }
}

/// Await every session, keeping the first error.
async fn drain(sessions: &mut JoinSet<Result<()>>) -> Result<()> {
    let mut outcome = Ok(());
    while let Some(finished) = sessions.join_next().await {
        let result = finished.map_err(Error::from).and_then(|r| r);
        if outcome.is_ok() {
            outcome = result;
        }
    }
    outcome
}
