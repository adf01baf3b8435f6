//! The driver: builds the table, seats the agent and the three smokers, and
//! keeps them running until told to stop.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::actors::{Agent, Smoker, stopped};
use crate::coordination::{Table, TableConfig, TableStats};
use crate::error::{Error, Result};
use crate::ingredient::Ingredient;

/// Runtime configuration for a driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Table configuration.
    pub table: TableConfig,
    /// Agent pause between placements.
    pub agent_pause: Duration,
    /// Smoker pause after each check of the table.
    pub smoker_pause: Duration,
    /// How long one cigarette lasts.
    pub smoke_duration: Duration,
    /// Stop after this many placements (None = run forever).
    pub rounds: Option<u64>,
    /// Seed for the agent's choice of ingredients.
    pub seed: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            table: TableConfig::default(),
            agent_pause: Duration::from_millis(100),
            smoker_pause: Duration::from_secs(1),
            smoke_duration: Duration::from_secs(5),
            rounds: None,
            seed: None,
        }
    }
}

enum Phase {
    AgentDone(Result<u64>),
    SmokerExited(Result<()>),
    Stopped,
}

/// Owns the table and the actors around it.
pub struct Driver {
    config: DriverConfig,
    table: Arc<Table>,
    shutdown: watch::Sender<bool>,
}

impl Driver {
    /// Create a driver with a fresh table.
    pub fn new(config: DriverConfig) -> Result<Self> {
        config.table.validate()?;

        let table = Arc::new(Table::new(config.table.clone()));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            table,
            shutdown,
        })
    }

    /// The shared table.
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Ask every actor to stop at its next suspension point.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Run the agent and the smokers.
    ///
    /// Returns once shutdown is requested, or once the configured rounds are
    /// placed and taken. Cigarettes still burning are always smoked to the
    /// end before this returns. An error from any actor stops the others and
    /// is returned.
    pub async fn run(&self) -> Result<TableStats> {
        let mut agent = tokio::spawn(self.agent().run(self.shutdown.subscribe()));

        let mut smokers = JoinSet::new();
        for ingredient in Ingredient::ALL {
            let smoker = Smoker::new(
                ingredient,
                self.table.clone(),
                self.config.smoker_pause,
                self.config.smoke_duration,
            );
            smokers.spawn(smoker.run(self.shutdown.subscribe()));
        }

        info!(
            "Table set: agent and {} smokers seated ({} policy)",
            Ingredient::ALL.len(),
            self.config.table.policy
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let phase = tokio::select! {
            joined = &mut agent => Phase::AgentDone(joined.map_err(Error::from).and_then(|r| r)),
            Some(exited) = smokers.join_next() => Phase::SmokerExited(exited.map_err(Error::from).and_then(|r| r)),
            _ = stopped(&mut shutdown_rx) => Phase::Stopped,
        };

        let mut outcome = Ok(());
        let mut agent_joined = false;
        match phase {
            Phase::AgentDone(Ok(placed)) => {
                agent_joined = true;
                info!("Agent placed {} rounds, waiting for the table to clear", placed);
                tokio::select! {
                    cleared = self.table.wait_until_free() => outcome = cleared,
                    Some(exited) = smokers.join_next() => {
                        outcome = exited.map_err(Error::from).and_then(|r| r);
                    }
                    _ = stopped(&mut shutdown_rx) => {}
                }
            }
            Phase::AgentDone(Err(e)) => {
                agent_joined = true;
                outcome = Err(e);
            }
            Phase::SmokerExited(result) => {
                if result.is_ok() && !*self.shutdown.borrow() {
                    warn!("A smoker left the table before shutdown");
                }
                outcome = result;
            }
            Phase::Stopped => info!("Shutdown requested"),
        }

        if let Err(e) = &outcome {
            error!("Stopping the table: {}", e);
        }
        self.shutdown();

        if !agent_joined {
            let joined = agent.await.map_err(Error::from).and_then(|r| r);
            keep_first(&mut outcome, joined.map(|_| ()));
        }
        while let Some(exited) = smokers.join_next().await {
            keep_first(&mut outcome, exited.map_err(Error::from).and_then(|r| r));
        }

        outcome?;
        let stats = self.table.stats().await;
        info!("Table cleared: {:?}", stats);
        Ok(stats)
    }

    fn agent(&self) -> Agent {
        let mut agent = Agent::new(self.table.clone(), self.config.agent_pause);
        if let Some(seed) = self.config.seed {
            agent = agent.with_seed(seed);
        }
        if let Some(rounds) = self.config.rounds {
            agent = agent.with_rounds(rounds);
        }
        agent
    }
}

fn keep_first(outcome: &mut Result<()>, next: Result<()>) {
    if outcome.is_ok() {
        *outcome = next;
    }
}
