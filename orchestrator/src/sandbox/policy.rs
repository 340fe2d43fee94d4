//! Execution policy: forbidden-import lists and resource limits per profile.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyProfile {
    Default,
    ModuleValidation,
    IntegrationTest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    pub profile: PolicyProfile,
    pub forbidden_imports: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub max_cpu_seconds: u64,
    pub max_memory_bytes: u64,
    pub max_wall_seconds: u64,
    /// Once set by a merge, a stricter (`true`) flag can never be relaxed.
    pub strict_forbidden_enforcement: bool,
}

const BASE_FORBIDDEN: &[&str] = &[
    "std::process",
    "std::fs::remove_dir_all",
    "std::net::TcpListener",
    "std::os::unix::process",
];

impl ExecutionPolicy {
    pub fn default_profile() -> Self {
        Self {
            profile: PolicyProfile::Default,
            forbidden_imports: BASE_FORBIDDEN.iter().map(|s| s.to_string()).collect(),
            allowed_domains: Vec::new(),
            max_cpu_seconds: 5,
            max_memory_bytes: 256 * 1024 * 1024,
            max_wall_seconds: 10,
            strict_forbidden_enforcement: true,
        }
    }

    /// Used for running a generated adapter's test suite: slightly more
    /// headroom than the bare default, filesystem writes still forbidden.
    pub fn module_validation() -> Self {
        let mut policy = Self::default_profile();
        policy.profile = PolicyProfile::ModuleValidation;
        policy.max_cpu_seconds = 15;
        policy.max_wall_seconds = 30;
        policy
    }

    /// Used for integration tests that need outbound HTTP to a named set of
    /// domains — everything else in `BASE_FORBIDDEN` still applies.
    pub fn integration_test(allowed_domains: Vec<String>) -> Self {
        let mut policy = Self::default_profile();
        policy.profile = PolicyProfile::IntegrationTest;
        policy.allowed_domains = allowed_domains;
        policy.max_wall_seconds = 60;
        policy
    }

    /// Merge two policies, keeping the union of forbidden imports, the
    /// tightest resource limits, and the stricter forbidden-enforcement
    /// flag (`true` wins).
    pub fn merge(&self, other: &ExecutionPolicy) -> ExecutionPolicy {
        let mut forbidden_imports = self.forbidden_imports.clone();
        for item in &other.forbidden_imports {
            if !forbidden_imports.contains(item) {
                forbidden_imports.push(item.clone());
            }
        }

        ExecutionPolicy {
            profile: self.profile,
            forbidden_imports,
            allowed_domains: self
                .allowed_domains
                .iter()
                .filter(|d| other.allowed_domains.contains(d))
                .cloned()
                .collect(),
            max_cpu_seconds: self.max_cpu_seconds.min(other.max_cpu_seconds),
            max_memory_bytes: self.max_memory_bytes.min(other.max_memory_bytes),
            max_wall_seconds: self.max_wall_seconds.min(other.max_wall_seconds),
            strict_forbidden_enforcement: self.strict_forbidden_enforcement || other.strict_forbidden_enforcement,
        }
    }

    /// Walk the source's `use`/`extern crate` statements and report any
    /// forbidden import along with a 1-based line number.
    pub fn check_imports(&self, source: &str) -> Vec<(String, usize)> {
        let mut violations = Vec::new();
        for (line_number, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            if !trimmed.starts_with("use ") && !trimmed.starts_with("extern crate ") {
                continue;
            }
            for forbidden in &self.forbidden_imports {
                if trimmed.contains(forbidden.as_str()) {
                    violations.push((forbidden.clone(), line_number + 1));
                }
            }
        }
        violations
    }
}
