//! End-to-end build orchestration: scaffold → validate/repair, wiring the
//! repair loop's fix-attempts to the gateway's `repair` purpose lane
//! instead of a caller-injected closure (previously the only thing driving
//! `Purpose::Repair` was lane setup and tests). Installation stays a
//! separate, explicit admission step (`install_module`) once the caller has
//! reviewed the outcome and obtained an attestation.

use std::path::Path;
use std::sync::Mutex;

use tracing::warn;

use crate::audit::BuildAuditLog;
use crate::gateway::{ChatMessage, LlmGateway, Purpose};

use super::manifest::ModuleManifest;
use super::repair::{run_repair_loop, RepairOutcome};
use super::scaffold::{scaffold_module, ScaffoldRequest};
use super::validation::ValidationReport;
use super::PipelineError;

#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildPipelineOutcome {
    pub manifest: ModuleManifest,
    pub repair: RepairOutcome,
}

/// Scaffold a brand-new module, then drive it through the bounded
/// write→validate→repair cycle, asking the gateway's `repair` purpose lane
/// for a fix whenever an attempt after the first fails validation.
pub async fn run_build_pipeline(
    gateway: &LlmGateway,
    request: &ScaffoldRequest,
    modules_root: &Path,
    job_id: &str,
) -> Result<BuildPipelineOutcome, PipelineError> {
    let scaffolded = scaffold_module(request, modules_root)?;
    let manifest = scaffolded.manifest;

    let outcome = run_validate_repair(gateway, &manifest, modules_root, scaffolded.adapter_source, job_id).await;

    Ok(BuildPipelineOutcome { manifest, repair: outcome })
}

/// The validate/repair half of the pipeline, independent of scaffolding —
/// the gateway-repair wiring a broken module needs regardless of whether
/// its source came from a fresh scaffold or a prior `write_code` call.
async fn run_validate_repair(
    gateway: &LlmGateway,
    manifest: &ModuleManifest,
    modules_root: &Path,
    initial_adapter_source: String,
    job_id: &str,
) -> RepairOutcome {
    let allowed_dir = manifest.module_dir(modules_root).to_string_lossy().into_owned();
    let adapter_path = format!("{allowed_dir}/{}", manifest.entry_point);

    let mut audit_log = BuildAuditLog::new(job_id);
    let current_source = Mutex::new(initial_adapter_source);

    run_repair_loop(
        &mut audit_log,
        |attempt| format!("{job_id}-attempt-{attempt}"),
        |attempt, previous_report| {
            let allowed_dir = allowed_dir.clone();
            let adapter_path = adapter_path.clone();
            async move {
                if attempt == 1 {
                    return (current_source.lock().expect("source lock poisoned").clone(), None);
                }

                let previous_source = current_source.lock().expect("source lock poisoned").clone();
                let messages = repair_messages(manifest, &previous_source, previous_report);

                match gateway
                    .generate(Purpose::Repair, &messages, &repair_schema(), &[allowed_dir], Some(job_id), 0.2, None, 4096)
                    .await
                {
                    Ok((contract, _metadata)) => {
                        if let Some(new_source) =
                            contract.changed_files.get(&adapter_path).or_else(|| contract.changed_files.values().next())
                        {
                            *current_source.lock().expect("source lock poisoned") = new_source.clone();
                        }
                    }
                    Err(error) => {
                        warn!(
                            module_id = %manifest.module_id(),
                            attempt,
                            error = %error,
                            "repair request failed; re-validating the previous source unchanged",
                        );
                    }
                }

                (current_source.lock().expect("source lock poisoned").clone(), None)
            }
        },
        manifest,
        modules_root,
    )
    .await
}

fn repair_messages(manifest: &ModuleManifest, adapter_source: &str, previous_report: Option<&ValidationReport>) -> Vec<ChatMessage> {
    let failure_summary = previous_report
        .map(|report| {
            report
                .fix_hints
                .iter()
                .map(|hint| format!("- {} ({})", hint.message, hint.category))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    vec![ChatMessage {
        role: "user".to_string(),
        content: format!(
            "The adapter for module '{}' failed validation:\n{failure_summary}\n\n\
             Current source:\n{adapter_source}\n\n\
             Return the corrected full adapter source under `changed_files`.",
            manifest.module_id(),
        ),
    }]
}

fn repair_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["stage", "module", "changed_files", "deleted_files", "assumptions", "rationale", "policy"],
    })
}

#[cfg(test)]
mod tests {
    use super::super::manifest::AuthType;
    use super::*;
    use crate::gateway::{ChatRequest, ChatResponse, GeneratorResponseContract, ModelInfo, ModelPreference, Provider, ProviderError, RoutingPolicy};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    const BROKEN_ADAPTER: &str = "fn fetch_raw() {}";
    const FIXED_ADAPTER: &str = "#[register_adapter]\nfn fetch_raw() {}\nfn transform(raw: String) -> String { raw }\nfn get_schema() {}";

    struct RepairsOnce {
        adapter_path: String,
    }

    #[async_trait]
    impl Provider for RepairsOnce {
        async fn generate(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            let contract = GeneratorResponseContract {
                stage: "repair".to_string(),
                module: "news/nyt".to_string(),
                changed_files: BTreeMap::from([(self.adapter_path.clone(), FIXED_ADAPTER.to_string())]),
                deleted_files: vec![],
                assumptions: vec![],
                rationale: "fixed the missing methods".to_string(),
                policy: serde_json::json!({}),
                validation_report: None,
            };
            Ok(ChatResponse { content: serde_json::to_value(&contract).unwrap(), usage: Default::default() })
        }
        async fn health_check(&self) -> bool {
            true
        }
        fn list_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn gateway_with_repair_lane(adapter_path: String) -> LlmGateway {
        let mut policy = RoutingPolicy::new();
        policy.set_lane(Purpose::Repair, vec![ModelPreference { provider: "fixer".to_string(), model: "m1".to_string(), priority: 0 }]);
        let mut gateway = LlmGateway::new(policy);
        gateway.register_provider("fixer", Box::new(RepairsOnce { adapter_path }));
        gateway
    }

    #[tokio::test]
    async fn run_build_pipeline_validates_the_scaffolded_skeleton_on_the_first_attempt() {
        let gateway = LlmGateway::new(RoutingPolicy::new());
        let dir = tempfile::tempdir().unwrap();
        let request = ScaffoldRequest {
            name: "nyt".to_string(),
            category: "news".to_string(),
            platform: "nyt".to_string(),
            description: String::new(),
            api_base_url: "https://api.nytimes.com/v1".to_string(),
            auth_type: AuthType::ApiKey,
        };

        let outcome = run_build_pipeline(&gateway, &request, dir.path(), "job-scaffold").await.unwrap();
        assert_eq!(outcome.repair, RepairOutcome::Validated { attempts: 1 });
    }

    #[tokio::test]
    async fn a_failing_source_is_sent_to_the_repair_purpose_lane_and_the_returned_fix_is_validated() {
        let manifest = ModuleManifest::new("nyt", "news", "nyt", AuthType::None);
        let dir = tempfile::tempdir().unwrap();
        let adapter_path = format!("{}/{}", manifest.module_dir(dir.path()).to_string_lossy(), manifest.entry_point);
        let gateway = gateway_with_repair_lane(adapter_path);

        let outcome = run_validate_repair(&gateway, &manifest, dir.path(), BROKEN_ADAPTER.to_string(), "job-repair").await;
        assert_eq!(outcome, RepairOutcome::Validated { attempts: 2 });
    }
}
