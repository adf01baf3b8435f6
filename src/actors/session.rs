//! A smoking session: the timed smoke following a successful take.

use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::coordination::Table;
use crate::error::Result;
use crate::ingredient::Ingredient;

/// One cigarette. Runs to completion and releases the smoker exactly once.
pub struct SmokingSession {
    table: Arc<Table>,
    smoker: Ingredient,
    duration: Duration,
}

impl SmokingSession {
    /// Create a session for `smoker` lasting `duration`.
    pub fn new(table: Arc<Table>, smoker: Ingredient, duration: Duration) -> Self {
        Self {
            table,
            smoker,
            duration,
        }
    }

    /// Smoke, then mark the smoker as finished.
    pub async fn run(self) -> Result<()> {
        debug!("Smoker with {} smoking for {:?}", self.smoker, self.duration);
        tokio::time::sleep(self.duration).await;
        self.table.finish_consuming(self.smoker).await
    }
}
