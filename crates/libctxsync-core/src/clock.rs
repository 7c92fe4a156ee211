//! Vector clocks for causal versioning of shared context revisions
//!
//! Every agent that mutates the shared context bumps its own counter.
//! Comparing two clocks tells whether one revision strictly supersedes
//! the other or whether both were produced independently.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Causal relationship between two clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockOrdering {
    /// Left happened strictly before right
    Before,
    /// Left happened strictly after right
    After,
    /// Neither dominates; the histories diverged
    Concurrent,
    /// Identical histories
    Equal,
}

impl ClockOrdering {
    /// The same relationship seen from the other side
    pub fn reverse(self) -> Self {
        match self {
            ClockOrdering::Before => ClockOrdering::After,
            ClockOrdering::After => ClockOrdering::Before,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClockOrdering::Before => "before",
            ClockOrdering::After => "after",
            ClockOrdering::Concurrent => "concurrent",
            ClockOrdering::Equal => "equal",
        }
    }
}

/// Mapping from agent id to the number of updates that agent contributed.
///
/// Counters are unsigned and only ever grow through `increment` and
/// `merge`. The sorted map keeps the string form canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for an agent (0 if the agent never contributed)
    pub fn get(&self, agent: &str) -> u64 {
        self.entries.get(agent).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Agents present in this clock, in sorted order
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Return a copy with `agent`'s counter advanced by one
    pub fn increment(&self, agent: &str) -> Self {
        let mut next = self.clone();
        let counter = next.entries.entry(agent.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
        next
    }

    /// Pointwise maximum of both clocks
    pub fn merge(&self, other: &VectorClock) -> Self {
        let mut merged = self.clone();
        for (agent, &count) in &other.entries {
            let entry = merged.entries.entry(agent.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        merged
    }

    /// Compare two clocks under the happened-before partial order
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut self_le_other = true;
        let mut other_le_self = true;

        for agent in self.entries.keys().chain(other.entries.keys()) {
            let a = self.get(agent);
            let b = other.get(agent);
            if a > b {
                self_le_other = false;
            }
            if b > a {
                other_le_self = false;
            }
            if !self_le_other && !other_le_self {
                return ClockOrdering::Concurrent;
            }
        }

        match (self_le_other, other_le_self) {
            (true, true) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (false, false) => ClockOrdering::Concurrent,
        }
    }

    /// Validate a JSON value as a clock: an object whose values are all
    /// non-negative integers.
    pub fn validate_json(value: &serde_json::Value) -> Result<Self, CoreError> {
        let map = value
            .as_object()
            .ok_or_else(|| CoreError::InvalidClock("expected an object".to_string()))?;

        let mut entries = BTreeMap::new();
        for (agent, count) in map {
            if agent.is_empty() {
                return Err(CoreError::InvalidClock("empty agent id".to_string()));
            }
            let count = count.as_u64().ok_or_else(|| {
                CoreError::InvalidClock(format!(
                    "counter for '{}' is not a non-negative integer: {}",
                    agent, count
                ))
            })?;
            entries.insert(agent.clone(), count);
        }
        Ok(Self { entries })
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (agent, count) in &self.entries {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", agent, count)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for VectorClock {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = BTreeMap::new();
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self { entries });
        }

        for part in s.split(',') {
            let (agent, count) = part
                .rsplit_once(':')
                .ok_or_else(|| CoreError::InvalidClock(format!("missing ':' in '{}'", part)))?;
            let agent = agent.trim();
            if agent.is_empty() {
                return Err(CoreError::InvalidClock(format!("empty agent id in '{}'", part)));
            }
            let count: u64 = count.trim().parse().map_err(|_| {
                CoreError::InvalidClock(format!("invalid counter in '{}'", part))
            })?;
            if entries.insert(agent.to_string(), count).is_some() {
                return Err(CoreError::InvalidClock(format!("duplicate agent '{}'", agent)));
            }
        }
        Ok(Self { entries })
    }
}

impl Serialize for VectorClock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VectorClock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl<const N: usize> From<[(&str, u64); N]> for VectorClock {
    fn from(pairs: [(&str, u64); N]) -> Self {
        Self {
            entries: pairs.iter().map(|(a, c)| (a.to_string(), *c)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(s: &str) -> VectorClock {
        s.parse().unwrap()
    }

    #[test]
    fn test_increment_copies() {
        let a = VectorClock::new();
        let b = a.increment("claude");
        assert_eq!(a.get("claude"), 0);
        assert_eq!(b.get("claude"), 1);
        assert_eq!(b.increment("claude").get("claude"), 2);
    }

    #[test]
    fn test_compare_orderings() {
        assert_eq!(clock("a:1").compare(&clock("a:2")), ClockOrdering::Before);
        assert_eq!(clock("a:2").compare(&clock("a:1")), ClockOrdering::After);
        assert_eq!(clock("a:1,b:2").compare(&clock("a:1,b:2")), ClockOrdering::Equal);
        assert_eq!(clock("a:2,b:1").compare(&clock("a:1,b:2")), ClockOrdering::Concurrent);
        // Missing keys count as zero
        assert_eq!(clock("a:1").compare(&clock("a:1,b:1")), ClockOrdering::Before);
        assert_eq!(VectorClock::new().compare(&VectorClock::new()), ClockOrdering::Equal);
    }

    #[test]
    fn test_compare_is_antisymmetric() {
        let samples = ["", "a:1", "a:2", "b:1", "a:1,b:1", "a:2,b:1", "a:1,b:3,c:1"];
        for x in samples {
            for y in samples {
                let (cx, cy) = (clock(x), clock(y));
                assert_eq!(cx.compare(&cy), cy.compare(&cx).reverse(), "{} vs {}", x, y);
            }
            assert_eq!(clock(x).compare(&clock(x)), ClockOrdering::Equal);
        }
    }

    #[test]
    fn test_merge_commutative_idempotent() {
        let a = clock("a:3,b:1");
        let b = clock("b:4,c:2");
        let ab = a.merge(&b);
        assert_eq!(ab, b.merge(&a));
        assert_eq!(ab, clock("a:3,b:4,c:2"));
        assert_eq!(a.merge(&a), a);
        // Merged clock dominates or equals both inputs
        assert_ne!(ab.compare(&a), ClockOrdering::Before);
        assert_ne!(ab.compare(&b), ClockOrdering::Before);
    }

    #[test]
    fn test_string_form_is_canonical() {
        let x: VectorClock = VectorClock::new().increment("zed").increment("amp").increment("zed");
        assert_eq!(x.to_string(), "amp:1,zed:2");
        assert_eq!(clock("zed:2,amp:1").to_string(), "amp:1,zed:2");
        assert_eq!(VectorClock::new().to_string(), "");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("a".parse::<VectorClock>().is_err());
        assert!("a:-1".parse::<VectorClock>().is_err());
        assert!("a:1.5".parse::<VectorClock>().is_err());
        assert!(":3".parse::<VectorClock>().is_err());
        assert!("a:1,a:2".parse::<VectorClock>().is_err());
    }

    #[test]
    fn test_validate_json() {
        let ok = serde_json::json!({"a": 1, "b": 0});
        assert_eq!(VectorClock::validate_json(&ok).unwrap(), clock("a:1,b:0"));

        for bad in [
            serde_json::json!({"a": -1}),
            serde_json::json!({"a": 1.5}),
            serde_json::json!({"a": "1"}),
            serde_json::json!([1, 2]),
        ] {
            assert!(matches!(
                VectorClock::validate_json(&bad),
                Err(CoreError::InvalidClock(_))
            ));
        }
    }

    #[test]
    fn test_serde_uses_string_form() {
        let c = clock("b:2,a:1");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"a:1,b:2\"");
        let back: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
