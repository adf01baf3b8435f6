//! Smokers: the cigarette smokers synchronization problem on tokio.
//!
//! An agent repeatedly places two of three ingredients on a shared table;
//! three smokers, each holding an endless supply of one ingredient, wait for
//! the pair they are missing, take it and smoke for a while.

pub mod actors;
pub mod config;
pub mod coordination;
pub mod driver;
pub mod error;
pub mod ingredient;

pub use config::Config;
pub use coordination::{ClaimResult, SmokingPolicy, Table, TableConfig, TableStats};
pub use driver::{Driver, DriverConfig};
pub use error::{Error, Result};
pub use ingredient::{Ingredient, Placement};
