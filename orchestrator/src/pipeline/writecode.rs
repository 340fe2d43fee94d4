//! WriteCode stage: replace an existing module's adapter source (and
//! optionally its test source), pre-flight checked for syntax errors before
//! anything reaches disk. Grounded on `tools/builtin/module_builder.py`'s
//! `write_module_code`.

use std::path::{Path, PathBuf};

use super::manifest::{ModuleManifest, ModuleStatus};
use super::validation::check_syntax;
use super::PipelineError;

#[derive(Debug, Clone)]
pub struct WriteCodeOutput {
    pub files_written: Vec<PathBuf>,
}

/// Overwrite `manifest`'s adapter source (and, if given, its test source),
/// resetting validation status back to `pending`. Rejects on a syntax error
/// in either file, or if the module was never scaffolded, before writing
/// anything.
pub fn write_code(
    manifest: &mut ModuleManifest,
    modules_root: &Path,
    adapter_source: &str,
    test_source: Option<&str>,
) -> Result<WriteCodeOutput, PipelineError> {
    let module_dir = manifest.module_dir(modules_root);
    if !module_dir.join("manifest.json").exists() {
        return Err(PipelineError::ModuleNotScaffolded { module_id: manifest.module_id() });
    }

    let syntax = check_syntax(adapter_source);
    if !syntax.passed {
        return Err(PipelineError::SyntaxError(syntax.details));
    }
    if let Some(test_source) = test_source {
        let test_syntax = check_syntax(test_source);
        if !test_syntax.passed {
            return Err(PipelineError::SyntaxError(test_syntax.details));
        }
    }

    let adapter_path = module_dir.join(&manifest.entry_point);
    std::fs::write(&adapter_path, adapter_source).map_err(PipelineError::Io)?;
    let mut files_written = vec![adapter_path];

    if let Some(test_source) = test_source {
        let test_path = module_dir.join(&manifest.test_file);
        std::fs::write(&test_path, test_source).map_err(PipelineError::Io)?;
        files_written.push(test_path);
    }

    manifest.status = ModuleStatus::Pending;
    manifest.save(modules_root)?;

    Ok(WriteCodeOutput { files_written })
}
