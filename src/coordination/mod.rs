//! Coordination primitives shared by the agent and the smokers.
//!
//! - Table: the guarded staging area plus its two counting signals
//! - Event bus: structured narration of every table transition

pub mod events;
pub mod table;

pub use events::{Event, EventBus, EventKind, Subscription};
pub use table::{ClaimResult, SmokingPolicy, Table, TableConfig, TableSnapshot, TableStats};
