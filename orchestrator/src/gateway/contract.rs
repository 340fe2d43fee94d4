//! The generator response contract: every codegen/repair/critic call must
//! return this shape, and every changed/deleted path must fall under one of
//! the caller's allowed directories. Grounded on
//! `shared/modules/contracts.py`'s `GeneratorResponseContract`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorResponseContract {
    pub stage: String,
    pub module: String,
    pub changed_files: BTreeMap<String, String>,
    pub deleted_files: Vec<String>,
    pub assumptions: Vec<String>,
    pub rationale: String,
    pub policy: serde_json::Value,
    pub validation_report: Option<serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum SchemaValidationError {
    #[error("response did not match the expected contract shape: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("path '{0}' is outside the allowed directories {1:?}")]
    PathNotAllowed(String, Vec<String>),
}

fn path_allowed(path: &str, allowed_dirs: &[String]) -> bool {
    if allowed_dirs.is_empty() {
        return true;
    }
    allowed_dirs.iter().any(|dir| {
        if dir.is_empty() {
            return true;
        }
        path == dir || path.starts_with(&format!("{dir}/"))
    })
}

/// Parse `content` into a `GeneratorResponseContract` and enforce the
/// directory allowlist over every changed and deleted path.
pub fn validate(
    content: &serde_json::Value,
    _schema: &serde_json::Value,
    allowed_dirs: &[String],
) -> Result<GeneratorResponseContract, SchemaValidationError> {
    let contract: GeneratorResponseContract = serde_json::from_value(content.clone())?;

    for path in contract.changed_files.keys().chain(contract.deleted_files.iter()) {
        if !path_allowed(path, allowed_dirs) {
            return Err(SchemaValidationError::PathNotAllowed(
                path.clone(),
                allowed_dirs.to_vec(),
            ));
        }
    }

    Ok(contract)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(path: &str) -> serde_json::Value {
        serde_json::json!({
            "stage": "implement",
            "module": "news/nyt",
            "changed_files": {path: "fn main() {}"},
            "deleted_files": [],
            "assumptions": [],
            "rationale": "ok",
            "policy": {},
            "validation_report": null,
        })
    }

    #[test]
    fn accepts_path_within_allowed_dir() {
        let schema = serde_json::json!({});
        let result = validate(&sample("modules/news/nyt/adapter.rs"), &schema, &["modules/news/nyt".to_string()]);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_path_outside_allowed_dir() {
        let schema = serde_json::json!({});
        let result = validate(&sample("modules/other/adapter.rs"), &schema, &["modules/news/nyt".to_string()]);
        assert!(matches!(result, Err(SchemaValidationError::PathNotAllowed(_, _))));
    }

    #[test]
    fn rejects_malformed_response() {
        let schema = serde_json::json!({});
        let malformed = serde_json::json!({"unexpected": true});
        let result = validate(&malformed, &schema, &[]);
        assert!(matches!(result, Err(SchemaValidationError::Malformed(_))));
    }

    #[test]
    fn empty_allowlist_permits_any_path() {
        let schema = serde_json::json!({});
        let result = validate(&sample("anywhere/file.rs"), &schema, &[]);
        assert!(result.is_ok());
    }
}
