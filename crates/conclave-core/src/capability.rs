use crate::ConclaveError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// A category of work a worker can perform.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Gathering and digesting information.
    Research,
    /// Writing or modifying code.
    Code,
    /// Evaluating data or artifacts.
    Analysis,
    /// Sending or drafting messages.
    Communication,
    /// Building up the worker's own knowledge.
    Learning,
    /// Breaking goals into steps.
    Planning,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 6] = [
        Capability::Research,
        Capability::Code,
        Capability::Analysis,
        Capability::Communication,
        Capability::Learning,
        Capability::Planning,
    ];

    /// The lowercase tag used in configs and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Research => "research",
            Capability::Code => "code",
            Capability::Analysis => "analysis",
            Capability::Communication => "communication",
            Capability::Learning => "learning",
            Capability::Planning => "planning",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ConclaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == tag)
            .ok_or_else(|| ConclaveError::Config(format!("Unknown capability '{s}'")))
    }
}

/// The set of capabilities a worker declares.
///
/// Backed by a `BTreeSet` so iteration and serialization order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a capability.
    pub fn grant(&mut self, cap: Capability) {
        self.capabilities.insert(cap);
    }

    /// Removes a capability.
    pub fn revoke(&mut self, cap: Capability) {
        self.capabilities.remove(&cap);
    }

    /// Whether the set contains `cap`.
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Whether every required capability is in this set.
    pub fn covers(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Number of capabilities in the set.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Iterates in capability order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<&str> = self.capabilities.iter().map(Capability::as_str).collect();
        write!(f, "[{}]", tags.join(", "))
    }
}
