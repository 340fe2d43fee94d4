//! `RoutingConfig` and its nested types: the JSON shape persisted at
//! `config/routing_config.json` and replaced/patched via the admin HTTP surface.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::capability::Tier;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRouting {
    #[serde(default = "default_tier")]
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u32>,
}

fn default_tier() -> Tier {
    Tier::Standard
}

fn default_priority() -> String {
    "medium".to_string()
}

impl Default for CategoryRouting {
    fn default() -> Self {
        Self {
            tier: default_tier(),
            provider: None,
            model: None,
            priority: default_priority(),
            max_latency_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: u32,
    #[serde(default = "default_tier_priority")]
    pub priority: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_concurrent() -> u32 {
    10
}
fn default_tier_priority() -> u32 {
    1
}
fn default_enabled() -> bool {
    true
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            max_concurrent_requests: default_max_concurrent(),
            priority: default_tier_priority(),
            enabled: default_enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceConstraints {
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold_direct: f32,
    #[serde(default = "default_consistency_threshold")]
    pub self_consistency_threshold: f32,
    #[serde(default = "default_latency_threshold_ms")]
    pub delegation_latency_threshold_ms: u32,
    #[serde(default = "default_max_sub_tasks")]
    pub max_sub_tasks: usize,
}

fn default_complexity_threshold() -> f32 {
    0.5
}
fn default_consistency_threshold() -> f32 {
    0.6
}
fn default_latency_threshold_ms() -> u32 {
    5000
}
fn default_max_sub_tasks() -> usize {
    5
}

impl Default for PerformanceConstraints {
    fn default() -> Self {
        Self {
            complexity_threshold_direct: default_complexity_threshold(),
            self_consistency_threshold: default_consistency_threshold(),
            delegation_latency_threshold_ms: default_latency_threshold_ms(),
            max_sub_tasks: default_max_sub_tasks(),
        }
    }
}

/// Top-level routing configuration, hot-reloadable via the admin API.
///
/// Note: scoped globally, not per-org. See DESIGN.md for the resolved
/// open question on per-org routing config scoping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub categories: HashMap<String, CategoryRouting>,
    #[serde(default)]
    pub tiers: HashMap<String, TierConfig>,
    #[serde(default)]
    pub performance: PerformanceConstraints,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            categories: HashMap::new(),
            tiers: HashMap::new(),
            performance: PerformanceConstraints::default(),
        }
    }
}

impl RoutingConfig {
    pub fn get_tier_for_category(&self, category: &str) -> Option<Tier> {
        self.categories.get(category).map(|c| c.tier)
    }

    /// tier → "host:port" for every enabled tier that has a configured endpoint.
    pub fn get_tier_endpoints(&self) -> HashMap<String, String> {
        self.tiers
            .iter()
            .filter(|(_, cfg)| cfg.enabled && !cfg.endpoint.is_empty())
            .map(|(name, cfg)| (name.clone(), cfg.endpoint.clone()))
            .collect()
    }
}
