//! Build (scaffold) stage: create `{modules_root}/{category}/{platform}/`
//! with a manifest and an adapter/test skeleton for the LLM to refine.
//! Grounded on `tools/builtin/module_builder.py`'s `build_module`.

use std::path::Path;

use super::manifest::{AuthType, ModuleManifest};
use super::validation::REGISTRATION_MARKER;
use super::PipelineError;

/// High-level spec for a new module, matching `build_module`'s kwargs.
#[derive(Debug, Clone)]
pub struct ScaffoldRequest {
    pub name: String,
    pub category: String,
    /// Defaults to `name` when empty.
    pub platform: String,
    pub description: String,
    pub api_base_url: String,
    pub auth_type: AuthType,
}

#[derive(Debug, Clone)]
pub struct ScaffoldOutput {
    pub manifest: ModuleManifest,
    pub adapter_source: String,
    pub test_source: String,
}

/// Create a new module's directory, manifest, and adapter/test skeleton on
/// disk. Rejects if a manifest already exists at the target module
/// directory — `write_code` is the update path for an existing module.
pub fn scaffold_module(request: &ScaffoldRequest, modules_root: &Path) -> Result<ScaffoldOutput, PipelineError> {
    let platform = if request.platform.is_empty() { request.name.clone() } else { request.platform.clone() };
    let mut manifest = ModuleManifest::new(request.name.clone(), request.category.clone(), platform, request.auth_type);
    manifest.description = request.description.clone();

    let module_dir = manifest.module_dir(modules_root);
    if module_dir.join("manifest.json").exists() {
        return Err(PipelineError::DuplicateModule { module_id: manifest.module_id() });
    }

    let adapter_source = render_adapter_skeleton(&manifest, &request.api_base_url);
    let test_source = render_test_skeleton(&manifest);

    manifest.save(modules_root)?;
    std::fs::write(module_dir.join(&manifest.entry_point), &adapter_source).map_err(PipelineError::Io)?;
    std::fs::write(module_dir.join(&manifest.test_file), &test_source).map_err(PipelineError::Io)?;

    Ok(ScaffoldOutput { manifest, adapter_source, test_source })
}

fn render_adapter_skeleton(manifest: &ModuleManifest, api_base_url: &str) -> String {
    format!(
        r#"//! {display_name} adapter — scaffolded skeleton, fill in the
//! API-specific fetch/transform logic.

{marker}
pub struct {class_name};

impl {class_name} {{
    pub const API_BASE_URL: &'static str = "{api_base_url}";

    pub fn fetch_raw() -> String {{
        String::new()
    }}

    pub fn transform(raw: String) -> String {{
        raw
    }}

    pub fn get_schema() -> String {{
        String::new()
    }}
}}
"#,
        display_name = manifest.display_name,
        marker = REGISTRATION_MARKER,
        class_name = manifest.class_name,
        api_base_url = api_base_url,
    )
}

fn render_test_skeleton(manifest: &ModuleManifest) -> String {
    format!(
        r#"#[test]
fn {platform}_adapter_transforms_fetched_data() {{
    let raw = {class_name}::fetch_raw();
    let _ = {class_name}::transform(raw);
}}
"#,
        platform = manifest.platform,
        class_name = manifest.class_name,
    )
}
