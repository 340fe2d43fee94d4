//! Static capability → tier defaults, overridable by `RoutingConfig`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::routing::RoutingConfig;

/// Tier hierarchy, highest to lowest. `external` is deliberately placed
/// below `micro`: a sole `external` capability never wins tier selection,
/// it falls back to `standard` (spec §3, §8 boundary case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Ultra,
    Heavy,
    Standard,
    Light,
    Micro,
    External,
}

impl Tier {
    /// Rank used for comparison: lower is higher priority.
    fn rank(self) -> u8 {
        match self {
            Tier::Ultra => 0,
            Tier::Heavy => 1,
            Tier::Standard => 2,
            Tier::Light => 3,
            Tier::Micro => 4,
            Tier::External => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Ultra => "ultra",
            Tier::Heavy => "heavy",
            Tier::Standard => "standard",
            Tier::Light => "light",
            Tier::Micro => "micro",
            Tier::External => "external",
        }
    }
}

impl PartialOrd for Tier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse rank so Tier::Ultra > Tier::External, matching the hierarchy
        // stated in the spec ("highest to lowest").
        other.rank().cmp(&self.rank())
    }
}

/// Default capability → tier table, mirroring the source's `CAPABILITY_MAP`.
fn default_table() -> HashMap<&'static str, Tier> {
    HashMap::from([
        ("coding", Tier::Heavy),
        ("reasoning", Tier::Heavy),
        ("analysis", Tier::Heavy),
        ("verification", Tier::Ultra),
        ("deep_research", Tier::Ultra),
        ("finance", Tier::Standard),
        ("multilingual", Tier::Standard),
        ("math", Tier::Standard),
        ("fast_response", Tier::Standard),
        ("routing", Tier::Standard),
        ("classification", Tier::Standard),
        ("extraction", Tier::Standard),
        ("search", Tier::External),
    ])
}

pub struct CapabilityMap {
    defaults: HashMap<&'static str, Tier>,
}

impl CapabilityMap {
    pub fn new() -> Self {
        Self {
            defaults: default_table(),
        }
    }

    /// Resolve a single capability's tier, consulting `config` overrides first.
    pub fn tier_for_capability(&self, capability: &str, config: Option<&RoutingConfig>) -> Tier {
        if let Some(cfg) = config {
            if let Some(tier) = cfg.get_tier_for_category(capability) {
                return tier;
            }
        }
        self.defaults
            .get(capability)
            .copied()
            .unwrap_or(Tier::Standard)
    }

    /// Required tier for a set of capabilities: the highest-ranked tier any
    /// member demands. Empty input, or a sole `external` capability, both
    /// resolve to `Tier::Standard` (spec §3, §8).
    pub fn required_tier(&self, capabilities: &[String], config: Option<&RoutingConfig>) -> Tier {
        if capabilities.is_empty() {
            return Tier::Standard;
        }

        let mut best: Option<Tier> = None;
        for cap in capabilities {
            let tier = self.tier_for_capability(cap, config);
            best = Some(match best {
                Some(current) if current > tier => current,
                _ => tier,
            });
        }

        match best {
            Some(Tier::External) | None => Tier::Standard,
            Some(tier) => tier,
        }
    }
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self::new()
    }
}
