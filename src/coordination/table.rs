//! The shared table: the agent's staging area and the smokers' rendezvous.
//!
//! All mutable state (what is on the table, who is smoking) lives behind one
//! mutex so the two facts are never observed out of step. Two counting
//! semaphores carry the signalling:
//! - `table_free` starts with one permit; the agent takes it to place
//!   ingredients and the smoker who takes them gives it back.
//! - `wake` starts empty; placements, finished smokes and hand-backs add a
//!   permit, and every smoker waits on it. The number of pending wakes is
//!   bounded by `max_pending_wakes`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};

use super::events::EventBus;
use crate::error::{Error, Result};
use crate::ingredient::{Ingredient, Placement};

/// Whether several smokers may smoke at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmokingPolicy {
    /// At most one smoker smokes at any instant; a matching claim is refused
    /// while someone else is still smoking.
    #[default]
    Exclusive,
    /// A claim only checks the claimant's own smoking flag.
    Concurrent,
}

impl SmokingPolicy {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SmokingPolicy::Exclusive => "exclusive",
            SmokingPolicy::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for SmokingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmokingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclusive" => Ok(SmokingPolicy::Exclusive),
            "concurrent" => Ok(SmokingPolicy::Concurrent),
            other => Err(Error::Config(format!("unknown smoking policy: {}", other))),
        }
    }
}

/// Configuration for the table.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Smoking policy.
    pub policy: SmokingPolicy,
    /// Upper bound on wake-ups waiting to be picked up by a smoker.
    pub max_pending_wakes: usize,
    /// Number of events kept in the event bus history.
    pub event_history: usize,
}

impl Default for TableConfig {
    // A placement adds at most one wake under this bound. `usize::MAX` lets
    // every placement, finish and hand-back add exactly one.
    fn default() -> Self {
        Self {
            policy: SmokingPolicy::Exclusive,
            max_pending_wakes: 1,
            event_history: 1000,
        }
    }
}

impl TableConfig {
    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_wakes == 0 {
            return Err(Error::Config(
                "max_pending_wakes must be at least 1, smokers would never wake".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a smoker's attempt to take the ingredients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    /// Ingredients taken; the smoker is now smoking.
    Claimed,
    /// Nothing on the table.
    Empty,
    /// The table holds the smoker's own ingredient.
    WrongIngredients { on_table: Placement },
    /// The smoker has not finished its previous cigarette.
    AlreadySmoking,
    /// Another smoker is still smoking (exclusive policy only).
    Blocked { smoker: Ingredient },
}

impl ClaimResult {
    /// Whether the claim succeeded.
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimResult::Claimed)
    }
}

/// Counters over the lifetime of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    /// Placements made by the agent.
    pub placements: u64,
    /// Successful claims.
    pub claims: u64,
    /// Refused claims.
    pub refusals: u64,
    /// Wake-ups handed back by ineligible smokers.
    pub hand_backs: u64,
    /// Finished smoking sessions.
    pub finishes: u64,
    /// Highest number of smokers observed smoking at once.
    pub peak_smoking: usize,
}

/// Point-in-time view of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    /// Ingredients currently on the table.
    pub contents: Option<Placement>,
    /// Smokers currently smoking.
    pub smoking: Vec<Ingredient>,
}

struct TableState {
    contents: Option<Placement>,
    smoking: HashMap<Ingredient, bool>,
    stats: TableStats,
}

impl TableState {
    fn new() -> Self {
        Self {
            contents: None,
            smoking: Ingredient::ALL.into_iter().map(|i| (i, false)).collect(),
            stats: TableStats::default(),
        }
    }

    fn is_smoking(&self, smoker: Ingredient) -> bool {
        self.smoking.get(&smoker).copied().unwrap_or(false)
    }

    fn smokers(&self) -> Vec<Ingredient> {
        let mut smokers: Vec<_> = self
            .smoking
            .iter()
            .filter(|(_, smoking)| **smoking)
            .map(|(smoker, _)| *smoker)
            .collect();
        smokers.sort();
        smokers
    }
}

/// The shared table.
pub struct Table {
    state: Mutex<TableState>,
    table_free: Semaphore,
    wake: Semaphore,
    config: TableConfig,
    events: Arc<EventBus>,
}

impl Table {
    /// Create an empty table with no smoker smoking.
    pub fn new(config: TableConfig) -> Self {
        let events = Arc::new(EventBus::with_history_size(config.event_history));
        Self {
            state: Mutex::new(TableState::new()),
            table_free: Semaphore::new(1),
            wake: Semaphore::new(0),
            config,
            events,
        }
    }

    /// Event bus carrying every transition of this table.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Place two ingredients on the table.
    ///
    /// Waits until the previous placement has been taken. Equal ingredients
    /// are rejected before waiting or touching any state. Once the guard is
    /// held nothing suspends, so a cancelled call either placed the pair and
    /// published its event or changed nothing.
    pub async fn publish(&self, first: Ingredient, second: Ingredient) -> Result<()> {
        let placement = Placement::new(first, second)?;

        let permit = self.table_free.acquire().await?;
        let mut state = self.state.lock().await;

        if let Some(on_table) = state.contents {
            return Err(Error::InvariantViolated(format!(
                "agent placed {} while {} was still on the table",
                placement, on_table
            )));
        }

        state.contents = Some(placement);
        state.stats.placements += 1;
        permit.forget();
        self.release_wake(&state);

        info!("Agent places {}", placement);
        self.events.ingredients_placed(placement);
        Ok(())
    }

    /// Wait for a wake-up: something changed that a smoker should look at.
    pub async fn wait_for_wake(&self) -> Result<()> {
        self.wake.acquire().await?.forget();
        Ok(())
    }

    /// Try to take the ingredients for `smoker`.
    ///
    /// The check and the take happen under the table guard, so at most one
    /// claim succeeds per placement. A successful claim frees the table for
    /// the agent.
    pub async fn claim(&self, smoker: Ingredient) -> Result<ClaimResult> {
        let mut state = self.state.lock().await;

        let result = match state.contents {
            None => ClaimResult::Empty,
            Some(on_table) if !on_table.satisfies(smoker) => ClaimResult::WrongIngredients { on_table },
            Some(_) if state.is_smoking(smoker) => ClaimResult::AlreadySmoking,
            Some(_) => match state.smokers().first() {
                Some(other) if self.config.policy == SmokingPolicy::Exclusive => {
                    ClaimResult::Blocked { smoker: *other }
                }
                _ => ClaimResult::Claimed,
            },
        };

        if !result.is_claimed() {
            state.stats.refusals += 1;
            debug!("Smoker with {} cannot take: {:?}", smoker, result);
            return Ok(result);
        }

        let Some(placement) = state.contents.take() else {
            return Err(Error::InvariantViolated("claimed an empty table".to_string()));
        };
        state.smoking.insert(smoker, true);
        state.stats.claims += 1;
        let smoking = state.smokers().len();
        state.stats.peak_smoking = state.stats.peak_smoking.max(smoking);
        self.table_free.add_permits(1);

        info!("Smoker with {} takes {} and starts smoking", smoker, placement);
        self.events.ingredients_taken(smoker, placement);
        Ok(ClaimResult::Claimed)
    }

    /// Try to take the ingredients for `smoker`, returning whether it worked.
    pub async fn try_consume(&self, smoker: Ingredient) -> Result<bool> {
        Ok(self.claim(smoker).await?.is_claimed())
    }

    /// Pass a wake-up on after a refused claim so a sibling gets a turn.
    pub async fn hand_back(&self, smoker: Ingredient) {
        let mut state = self.state.lock().await;
        state.stats.hand_backs += 1;
        self.release_wake(&state);

        debug!("Smoker with {} hands the wake-up back", smoker);
        self.events.wake_handed_back(smoker);
    }

    /// Mark `smoker` as done smoking and wake the smokers to re-check.
    pub async fn finish_consuming(&self, smoker: Ingredient) -> Result<()> {
        let mut state = self.state.lock().await;

        if !state.is_smoking(smoker) {
            return Err(Error::InvariantViolated(format!(
                "smoker with {} finished without smoking",
                smoker
            )));
        }

        state.smoking.insert(smoker, false);
        state.stats.finishes += 1;
        self.release_wake(&state);

        info!("Smoker with {} finished smoking", smoker);
        self.events.smoking_finished(smoker);
        Ok(())
    }

    /// Wait until nothing is left on the table.
    pub async fn wait_until_free(&self) -> Result<()> {
        let _permit = self.table_free.acquire().await?;
        Ok(())
    }

    /// Current contents and smokers.
    pub async fn snapshot(&self) -> TableSnapshot {
        let state = self.state.lock().await;
        TableSnapshot {
            contents: state.contents,
            smoking: state.smokers(),
        }
    }

    /// Whether `smoker` is smoking right now.
    pub async fn is_smoking(&self, smoker: Ingredient) -> bool {
        self.state.lock().await.is_smoking(smoker)
    }

    /// Lifetime counters.
    pub async fn stats(&self) -> TableStats {
        self.state.lock().await.stats.clone()
    }

    /// Wake-ups not yet picked up by any smoker.
    pub fn pending_wakes(&self) -> usize {
        self.wake.available_permits()
    }

    /// Add a wake-up unless the bound is reached.
    ///
    /// Only called with the state guard held, so concurrent releases cannot
    /// overshoot the bound.
    fn release_wake(&self, _state: &TableState) {
        if self.wake.available_permits() < self.config.max_pending_wakes {
            self.wake.add_permits(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::coordination::EventKind;
    use crate::ingredient::Ingredient::{Matches, Paper, Tobacco};

    fn table() -> Table {
        Table::new(TableConfig::default())
    }

    fn concurrent_table() -> Table {
        Table::new(TableConfig {
            policy: SmokingPolicy::Concurrent,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_publish_wakes_once() {
        let table = table();
        assert_eq!(table.pending_wakes(), 0);

        table.publish(Tobacco, Paper).await.unwrap();

        assert_eq!(table.pending_wakes(), 1);
        let snapshot = table.snapshot().await;
        assert_eq!(snapshot.contents, Some(Placement::new(Tobacco, Paper).unwrap()));
        assert!(snapshot.smoking.is_empty());
    }

    #[tokio::test]
    async fn test_only_missing_smoker_may_take() {
        let table = table();
        table.publish(Tobacco, Paper).await.unwrap();

        assert!(!table.try_consume(Tobacco).await.unwrap());
        assert!(!table.try_consume(Paper).await.unwrap());
        assert!(table.try_consume(Matches).await.unwrap());

        let snapshot = table.snapshot().await;
        assert_eq!(snapshot.contents, None);
        assert_eq!(snapshot.smoking, vec![Matches]);
    }

    #[tokio::test]
    async fn test_claim_reports_reason() {
        let table = table();
        assert_eq!(table.claim(Matches).await.unwrap(), ClaimResult::Empty);

        table.publish(Paper, Matches).await.unwrap();
        let on_table = Placement::new(Paper, Matches).unwrap();
        assert_eq!(
            table.claim(Paper).await.unwrap(),
            ClaimResult::WrongIngredients { on_table }
        );
        assert_eq!(table.claim(Tobacco).await.unwrap(), ClaimResult::Claimed);

        let stats = table.stats().await;
        assert_eq!(stats.claims, 1);
        assert_eq!(stats.refusals, 2);
    }

    #[tokio::test]
    async fn test_second_publish_waits_for_take() {
        let table = Arc::new(table());
        table.publish(Tobacco, Paper).await.unwrap();

        let agent = table.clone();
        let second = tokio::spawn(async move { agent.publish(Paper, Matches).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());
        assert_eq!(table.stats().await.placements, 1);

        assert!(table.try_consume(Matches).await.unwrap());

        let result = tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .expect("second placement should proceed once the table is free")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(
            table.snapshot().await.contents,
            Some(Placement::new(Paper, Matches).unwrap())
        );
    }

    #[tokio::test]
    async fn test_smoker_cannot_take_while_smoking() {
        let table = concurrent_table();
        table.publish(Tobacco, Paper).await.unwrap();
        assert!(table.try_consume(Matches).await.unwrap());

        table.publish(Paper, Tobacco).await.unwrap();
        assert_eq!(table.claim(Matches).await.unwrap(), ClaimResult::AlreadySmoking);
        assert!(table.snapshot().await.contents.is_some());
    }

    #[tokio::test]
    async fn test_smoker_takes_again_after_finishing() {
        let table = table();
        table.publish(Tobacco, Paper).await.unwrap();
        assert!(table.try_consume(Matches).await.unwrap());

        table.finish_consuming(Matches).await.unwrap();
        assert!(!table.is_smoking(Matches).await);

        table.publish(Paper, Tobacco).await.unwrap();
        assert!(table.try_consume(Matches).await.unwrap());
    }

    #[tokio::test]
    async fn test_exclusive_policy_blocks_second_smoker() {
        let table = table();
        table.publish(Tobacco, Paper).await.unwrap();
        assert!(table.try_consume(Matches).await.unwrap());

        table.publish(Paper, Matches).await.unwrap();
        assert_eq!(
            table.claim(Tobacco).await.unwrap(),
            ClaimResult::Blocked { smoker: Matches }
        );

        table.finish_consuming(Matches).await.unwrap();
        assert!(table.try_consume(Tobacco).await.unwrap());
        assert_eq!(table.stats().await.peak_smoking, 1);
    }

    #[tokio::test]
    async fn test_concurrent_policy_allows_overlap() {
        let table = concurrent_table();
        table.publish(Tobacco, Paper).await.unwrap();
        assert!(table.try_consume(Matches).await.unwrap());

        table.publish(Paper, Matches).await.unwrap();
        assert!(table.try_consume(Tobacco).await.unwrap());

        assert_eq!(table.snapshot().await.smoking, vec![Tobacco, Matches]);
        assert_eq!(table.stats().await.peak_smoking, 2);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_before_waiting() {
        let table = table();

        let err = table.publish(Paper, Paper).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateIngredient(Paper)));
        assert_eq!(table.snapshot().await.contents, None);
        assert_eq!(table.pending_wakes(), 0);

        // The table-free permit was not consumed
        tokio::time::timeout(Duration::from_millis(100), table.publish(Tobacco, Paper))
            .await
            .expect("table should still be free")
            .unwrap();
    }

    #[tokio::test]
    async fn test_finish_without_smoking_is_invariant_violation() {
        let table = table();
        let err = table.finish_consuming(Tobacco).await.unwrap_err();
        assert!(matches!(err, Error::InvariantViolated(_)));
    }

    #[tokio::test]
    async fn test_hand_back_respects_bound() {
        let table = table();
        table.publish(Tobacco, Paper).await.unwrap();

        table.hand_back(Tobacco).await;
        table.hand_back(Paper).await;
        assert_eq!(table.pending_wakes(), 1);

        table.wait_for_wake().await.unwrap();
        assert_eq!(table.pending_wakes(), 0);

        // A refused claim handing back restores the wake for the next smoker
        assert!(!table.try_consume(Paper).await.unwrap());
        table.hand_back(Paper).await;
        assert_eq!(table.pending_wakes(), 1);
        assert_eq!(table.stats().await.hand_backs, 3);
    }

    #[tokio::test]
    async fn test_larger_wake_bound() {
        let table = Table::new(TableConfig {
            max_pending_wakes: 3,
            ..Default::default()
        });
        table.publish(Tobacco, Paper).await.unwrap();
        for _ in 0..5 {
            table.hand_back(Tobacco).await;
        }
        assert_eq!(table.pending_wakes(), 3);
    }

    #[tokio::test]
    async fn test_finish_releases_wake() {
        let table = table();
        table.publish(Tobacco, Paper).await.unwrap();
        table.wait_for_wake().await.unwrap();
        assert!(table.try_consume(Matches).await.unwrap());
        assert_eq!(table.pending_wakes(), 0);

        table.finish_consuming(Matches).await.unwrap();
        assert_eq!(table.pending_wakes(), 1);
    }

    #[tokio::test]
    async fn test_wait_until_free() {
        let table = Arc::new(table());
        table.wait_until_free().await.unwrap();

        table.publish(Tobacco, Matches).await.unwrap();
        let waiter = table.clone();
        let drained = tokio::spawn(async move { waiter.wait_until_free().await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!drained.is_finished());

        assert!(table.try_consume(Paper).await.unwrap());
        tokio::time::timeout(Duration::from_secs(1), drained)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // Waiting does not keep the permit
        tokio::time::timeout(Duration::from_millis(100), table.publish(Tobacco, Paper))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_claims_take_once() {
        let table = Arc::new(concurrent_table());
        table.publish(Tobacco, Paper).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let table = table.clone();
                tokio::spawn(async move { table.try_consume(Matches).await.unwrap() })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let taken = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(taken, 1);
    }

    #[tokio::test]
    async fn test_events_follow_transitions() {
        let table = table();
        let mut sub = table.events().subscribe();

        table.publish(Tobacco, Paper).await.unwrap();
        assert!(!table.try_consume(Paper).await.unwrap());
        table.hand_back(Paper).await;
        assert!(table.try_consume(Matches).await.unwrap());
        table.finish_consuming(Matches).await.unwrap();

        let kinds: Vec<_> = std::iter::from_fn(|| sub.try_recv()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::IngredientsPlaced,
                EventKind::WakeHandedBack,
                EventKind::IngredientsTaken,
                EventKind::SmokingFinished,
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_publish_keeps_events_in_step() {
        let table = Arc::new(Table::new(TableConfig {
            event_history: 100_000,
            ..Default::default()
        }));
        for _ in 0..20_000 {
            table.hand_back(Tobacco).await;
        }

        // Keep the event history busy while placements are cut short
        let busy = table.clone();
        let reader = tokio::spawn(async move {
            loop {
                let _ = busy.events().recent_events(usize::MAX);
                tokio::task::yield_now().await;
            }
        });

        for i in 0..300u64 {
            let _ = tokio::time::timeout(
                Duration::from_micros(10 + i % 90),
                table.publish(Tobacco, Paper),
            )
            .await;
            if table.try_consume(Matches).await.unwrap() {
                table.finish_consuming(Matches).await.unwrap();
            }
        }
        reader.abort();

        table.publish(Tobacco, Paper).await.unwrap();

        let stats = table.stats().await;
        let counts = table.events().event_counts();
        let count = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0) as u64;
        assert!(stats.placements >= 1);
        assert_eq!(stats.placements, count(EventKind::IngredientsPlaced));
        assert_eq!(stats.claims, count(EventKind::IngredientsTaken));
        assert_eq!(stats.finishes, count(EventKind::SmokingFinished));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Exclusive".parse::<SmokingPolicy>().unwrap(), SmokingPolicy::Exclusive);
        assert_eq!("concurrent".parse::<SmokingPolicy>().unwrap(), SmokingPolicy::Concurrent);
        assert!("sometimes".parse::<SmokingPolicy>().is_err());
    }

    #[test]
    fn test_zero_wake_bound_rejected() {
        let config = TableConfig {
            max_pending_wakes: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
