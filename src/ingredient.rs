//! Ingredients and the pairs the agent places on the table.
//!
//! Each smoker is identified by the ingredient it has an endless supply of,
//! which is also the one ingredient it can never find on the table.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One of the three ingredients needed to roll a cigarette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ingredient {
    /// Tobacco
    Tobacco,
    /// Rolling paper
    Paper,
    /// Matches
    Matches,
}

impl Ingredient {
    /// Every ingredient, in a fixed order.
    pub const ALL: [Ingredient; 3] = [Ingredient::Tobacco, Ingredient::Paper, Ingredient::Matches];

    /// Lowercase name used for display and parsing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ingredient::Tobacco => "tobacco",
            Ingredient::Paper => "paper",
            Ingredient::Matches => "matches",
        }
    }

    /// The two ingredients a smoker holding `self` needs from the table.
    pub fn complement(&self) -> [Ingredient; 2] {
        match self {
            Ingredient::Tobacco => [Ingredient::Paper, Ingredient::Matches],
            Ingredient::Paper => [Ingredient::Tobacco, Ingredient::Matches],
            Ingredient::Matches => [Ingredient::Tobacco, Ingredient::Paper],
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ingredient {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tobacco" => Ok(Ingredient::Tobacco),
            "paper" => Ok(Ingredient::Paper),
            "matches" => Ok(Ingredient::Matches),
            _ => Err(Error::UnknownIngredient(s.to_string())),
        }
    }
}

/// Two distinct ingredients placed on the table together.
///
/// The order is the order the agent put them down in; it carries no meaning
/// for eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPlacement")]
pub struct Placement {
    first: Ingredient,
    second: Ingredient,
}

#[derive(Deserialize)]
struct RawPlacement {
    first: Ingredient,
    second: Ingredient,
}

impl TryFrom<RawPlacement> for Placement {
    type Error = Error;

    fn try_from(raw: RawPlacement) -> Result<Self> {
        Placement::new(raw.first, raw.second)
    }
}

impl Placement {
    /// Create a placement, rejecting a pair of equal ingredients.
    pub fn new(first: Ingredient, second: Ingredient) -> Result<Self> {
        if first == second {
            return Err(Error::DuplicateIngredient(first));
        }
        Ok(Self { first, second })
    }

    /// Pick two distinct ingredients uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut all = Ingredient::ALL;
        all.shuffle(rng);
        Self {
            first: all[0],
            second: all[1],
        }
    }

    /// First ingredient put down.
    pub fn first(&self) -> Ingredient {
        self.first
    }

    /// Second ingredient put down.
    pub fn second(&self) -> Ingredient {
        self.second
    }

    /// Whether `ingredient` is part of this placement.
    pub fn contains(&self, ingredient: Ingredient) -> bool {
        self.first == ingredient || self.second == ingredient
    }

    /// Whether this placement is exactly what a smoker holding `smoker` needs.
    pub fn satisfies(&self, smoker: Ingredient) -> bool {
        smoker.complement().iter().all(|needed| self.contains(*needed))
    }

    /// The ingredient not on the table, i.e. the identity of the only smoker
    /// who can use this placement.
    pub fn missing(&self) -> Ingredient {
        Ingredient::ALL
            .into_iter()
            .find(|i| !self.contains(*i))
            .unwrap_or(self.first)
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} and {}", self.first, self.second)
    }
}
