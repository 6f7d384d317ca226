//! Revision markers.
//!
//! A revision is `{generation}-{hash}`. The generation grows by one on every
//! write to a document; the hash disambiguates concurrent writes that reach
//! the same generation on different replicas.

use crate::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A per-document revision token.
///
/// Ordering is by generation first, then by hash, so two replicas that
/// compare the same pair of revisions always pick the same winner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision {
    generation: u64,
    hash: String,
}

impl Revision {
    /// The revision of a freshly created document.
    #[must_use]
    pub fn first() -> Self {
        Self::with_generation(1)
    }

    /// The revision that supersedes this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self::with_generation(self.generation + 1)
    }

    fn with_generation(generation: u64) -> Self {
        Self {
            generation,
            hash: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Returns the write generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the hash part.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.hash)
    }
}

impl FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, hash) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidRevision(s.to_string()))?;
        let generation: u64 = generation
            .parse()
            .map_err(|_| Error::InvalidRevision(s.to_string()))?;
        if generation == 0 || hash.is_empty() {
            return Err(Error::InvalidRevision(s.to_string()));
        }
        Ok(Self {
            generation,
            hash: hash.to_string(),
        })
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
