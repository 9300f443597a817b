//! # Priority Tiers
//!
//! Channels and cached queries share the same three-tier priority scheme.
//! Recovery work is grouped into [`PriorityWave`]s that are processed strictly
//! in `Critical → High → Normal` order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Priority tier for a channel or a cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Normal,
}

impl Priority {
    /// All tiers in processing order
    pub const ALL: [Priority; 3] = [Priority::Critical, Priority::High, Priority::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// An ordered tier of work items sharing a priority and a stagger delay.
///
/// Waves are computed fresh for every recovery cycle and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityWave<T> {
    pub priority: Priority,
    /// Delay applied before this wave starts (meaning depends on the consumer)
    pub delay: Duration,
    pub items: Vec<T>,
}

impl<T> PriorityWave<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Group prioritized items into waves ordered critical → high → normal.
///
/// Tiers with no items are omitted. Items keep their relative input order
/// inside a tier.
pub fn group_into_waves<T, I, D>(items: I, delay_for: D) -> Vec<PriorityWave<T>>
where
    I: IntoIterator<Item = (Priority, T)>,
    D: Fn(Priority) -> Duration,
{
    let mut critical = Vec::new();
    let mut high = Vec::new();
    let mut normal = Vec::new();

    for (priority, item) in items {
        match priority {
            Priority::Critical => critical.push(item),
            Priority::High => high.push(item),
            Priority::Normal => normal.push(item),
        }
    }

    [
        (Priority::Critical, critical),
        (Priority::High, high),
        (Priority::Normal, normal),
    ]
    .into_iter()
    .filter(|(_, items)| !items.is_empty())
    .map(|(priority, items)| PriorityWave {
        priority,
        delay: delay_for(priority),
        items,
    })
    .collect()
}
