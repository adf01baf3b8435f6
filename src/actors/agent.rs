//! The agent: sole producer of placements.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;

use super::stopped;
use crate::coordination::Table;
use crate::error::Result;
use crate::ingredient::Placement;

/// Places two random ingredients per round, one placement in flight at a time.
pub struct Agent {
    table: Arc<Table>,
    pause: Duration,
    rounds: Option<u64>,
    rng: StdRng,
}

impl Agent {
    /// Create an agent seeded from the OS.
    pub fn new(table: Arc<Table>, pause: Duration) -> Self {
        Self {
            table,
            pause,
            rounds: None,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Use a fixed seed so the sequence of placements is reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Stop after `rounds` placements instead of running forever.
    pub fn with_rounds(mut self, rounds: u64) -> Self {
        self.rounds = Some(rounds);
        self
    }

    /// Run until shutdown or until the configured rounds are placed.
    ///
    /// Returns the number of placements made.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<u64> {
        let mut placed = 0u64;

        loop {
            if self.rounds.is_some_and(|rounds| placed >= rounds) {
                info!("Agent done after {} placements", placed);
                break;
            }

            let placement = Placement::random(&mut self.rng);
            debug!("Agent waiting for a free table to place {}", placement);

            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                result = self.table.publish(placement.first(), placement.second()) => result?,
            }
            placed += 1;

            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = tokio::time::sleep(self.pause) => {}
            }
        }

        Ok(placed)
    }
}
