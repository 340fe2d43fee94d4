//! Module manifest: identity, requirements, and lifecycle status for a
//! dynamically built module. Grounded on `shared/modules/manifest.py`'s
//! `ModuleManifest`/`ModuleStatus`/`ValidationResults`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Pending,
    Validating,
    Validated,
    Approved,
    Installed,
    Disabled,
    Failed,
    Uninstalled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResults {
    #[serde(default = "pending_state")]
    pub syntax_check: String,
    #[serde(default = "pending_state")]
    pub unit_tests: String,
    #[serde(default = "pending_state")]
    pub integration_test: String,
    #[serde(default)]
    pub test_coverage: f32,
    pub error_details: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
}

fn pending_state() -> String {
    "pending".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    ApiKey,
    Oauth2,
    Basic,
    None,
}

fn default_auth_type() -> AuthType {
    AuthType::ApiKey
}

/// Mirrors the module's own last-observed health, independent of
/// `ProviderHealth` (which tracks LLM providers, not installed modules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub category: String,
    pub platform: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default = "default_test_file")]
    pub test_file: String,

    #[serde(default)]
    pub requires_api_key: bool,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default = "default_auth_type")]
    pub auth_type: AuthType,
    #[serde(default)]
    pub health_status: HealthStatus,
    #[serde(default)]
    pub allowed_imports: Vec<String>,

    pub status: ModuleStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub validation_results: ValidationResults,

    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub success_count: u32,
}

fn default_version() -> String {
    "1.0.0".to_string()
}
fn default_entry_point() -> String {
    "adapter.rs".to_string()
}
fn default_test_file() -> String {
    "adapter_test.rs".to_string()
}

impl ModuleManifest {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        platform: impl Into<String>,
        auth_type: AuthType,
    ) -> Self {
        let name = name.into();
        let category = category.into();
        let platform = platform.into();
        let now = Utc::now();
        Self {
            display_name: name.replace('_', " "),
            class_name: format!("{}Adapter", titlecase(&platform)),
            name,
            version: default_version(),
            category,
            platform,
            description: String::new(),
            entry_point: default_entry_point(),
            test_file: default_test_file(),
            requires_api_key: auth_type == AuthType::ApiKey,
            requires_auth: auth_type != AuthType::None,
            auth_type,
            health_status: HealthStatus::Unknown,
            allowed_imports: Vec::new(),
            status: ModuleStatus::Pending,
            created_at: now,
            updated_at: now,
            validation_results: ValidationResults::default(),
            failure_count: 0,
            success_count: 0,
        }
    }

    /// Unique identifier: `category/platform`.
    pub fn module_id(&self) -> String {
        format!("{}/{}", self.category, self.platform)
    }

    pub fn module_dir(&self, modules_root: &Path) -> PathBuf {
        modules_root.join(&self.category).join(&self.platform)
    }

    pub fn save(&mut self, modules_root: &Path) -> Result<PathBuf, PipelineError> {
        self.updated_at = Utc::now();
        let dir = self.module_dir(modules_root);
        fs::create_dir_all(&dir).map_err(PipelineError::Io)?;
        let path = dir.join("manifest.json");
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&path, data).map_err(PipelineError::Io)?;
        Ok(path)
    }

    pub fn load(manifest_path: &Path) -> Result<Self, PipelineError> {
        let data = fs::read_to_string(manifest_path).map_err(PipelineError::Io)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn discover(modules_root: &Path) -> Vec<Self> {
        let mut manifests = Vec::new();
        let Ok(categories) = fs::read_dir(modules_root) else {
            return manifests;
        };
        for category in categories.flatten() {
            let Ok(platforms) = fs::read_dir(category.path()) else {
                continue;
            };
            for platform in platforms.flatten() {
                let manifest_path = platform.path().join("manifest.json");
                if manifest_path.exists() {
                    match Self::load(&manifest_path) {
                        Ok(manifest) => manifests.push(manifest),
                        Err(e) => {
                            tracing::warn!(path = %manifest_path.display(), error = %e, "skipping invalid manifest");
                        }
                    }
                }
            }
        }
        manifests
    }
}

fn titlecase(s: &str) -> String {
    s.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_id_joins_category_and_platform() {
        let manifest = ModuleManifest::new("nyt", "news", "nyt", AuthType::None);
        assert_eq!(manifest.module_id(), "news/nyt");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = ModuleManifest::new("nyt", "news", "nyt", AuthType::None);
        let path = manifest.save(dir.path()).unwrap();
        let loaded = ModuleManifest::load(&path).unwrap();
        assert_eq!(loaded.module_id(), manifest.module_id());
        assert_eq!(loaded.status, ModuleStatus::Pending);
    }

    #[test]
    fn discover_finds_nested_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = ModuleManifest::new("nyt", "news", "nyt", AuthType::None);
        manifest.save(dir.path()).unwrap();
        let mut manifest2 = ModuleManifest::new("cibc", "finance", "cibc", AuthType::None);
        manifest2.save(dir.path()).unwrap();

        let found = ModuleManifest::discover(dir.path());
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn auth_type_none_means_requires_auth_is_false() {
        let manifest = ModuleManifest::new("nyt", "news", "nyt", AuthType::None);
        assert!(!manifest.requires_auth);
        assert!(!manifest.requires_api_key);
    }

    #[test]
    fn api_key_auth_type_implies_requires_api_key() {
        let manifest = ModuleManifest::new("cibc", "finance", "cibc", AuthType::ApiKey);
        assert!(manifest.requires_auth);
        assert!(manifest.requires_api_key);
    }

    #[test]
    fn oauth2_auth_type_requires_auth_without_requires_api_key() {
        let manifest = ModuleManifest::new("applewatch", "health", "applewatch", AuthType::Oauth2);
        assert!(manifest.requires_auth);
        assert!(!manifest.requires_api_key);
    }

    #[test]
    fn new_manifests_start_with_unknown_health_status() {
        let manifest = ModuleManifest::new("nyt", "news", "nyt", AuthType::None);
        assert_eq!(manifest.health_status, HealthStatus::Unknown);
    }
}
