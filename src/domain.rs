use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::QueryError;

pub const DEFAULT_MARKER: &str = "COI";
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Organism name with surrounding whitespace trimmed and inner runs collapsed
/// to a single space. URL encoding happens when the request is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Organism(String);

impl Organism {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Organism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Organism {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let words = value.split_whitespace().collect::<Vec<_>>();
        if words.is_empty() {
            return Err(QueryError::InvalidOrganism(value.to_string()));
        }
        Ok(Self(words.join(" ")))
    }
}

/// Single-token marker/gene name such as `COI` or `16S`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Marker(String);

impl Marker {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lenient parse used by the command line: a multi-word marker is replaced by
    /// [`DEFAULT_MARKER`] after a warning instead of aborting the run.
    pub fn parse_or_default(value: &str) -> Self {
        match value.parse() {
            Ok(marker) => marker,
            Err(_) => {
                warn!(marker = value, "provide a single marker/gene name!");
                Self::default()
            }
        }
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self(DEFAULT_MARKER.to_string())
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Marker {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let words = value.split_whitespace().collect::<Vec<_>>();
        match words.as_slice() {
            [single] => Ok(Self((*single).to_string())),
            _ => Err(QueryError::InvalidMarker(value.to_string())),
        }
    }
}

/// Maximum number of identifiers requested per search page (`retmax`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PageSize(u64);

impl PageSize {
    pub fn new(value: u64) -> Result<Self, QueryError> {
        if value == 0 {
            return Err(QueryError::InvalidPageSize(value));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(DEFAULT_PAGE_SIZE)
    }
}

impl TryFrom<u64> for PageSize {
    type Error = QueryError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PageSize> for u64 {
    fn from(value: PageSize) -> Self {
        value.0
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
