//! Dev-mode draft lifecycle: `EDITING → VALIDATED → PROMOTED`, `DISCARDED`
//! as sink. A draft is a workspace copy of an installed module's files;
//! validation and promotion are injected callbacks so this module stays
//! independent of which validator/installer backs them. Grounded on spec
//! §4.5.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::ValidationReport;

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("draft '{0}' not found")]
    NotFound(String),
    #[error("cannot {action} in state {state:?}")]
    InvalidState { action: String, state: DraftState },
}

pub type DraftResult<T> = Result<T, DraftError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DraftState {
    Editing,
    Validated,
    Promoted,
    Discarded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub draft_id: String,
    pub module_id: String,
    pub state: DraftState,
    pub files: BTreeMap<String, Vec<u8>>,
    pub bundle_sha256: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a promotion attempt, handed to the injected installer.
#[derive(Debug, Clone)]
pub struct PromotionRequest {
    pub bundle_sha256: String,
    pub status: &'static str,
}

pub struct DraftManager {
    drafts: std::collections::HashMap<String, Draft>,
}

impl DraftManager {
    pub fn new() -> Self {
        Self { drafts: std::collections::HashMap::new() }
    }

    /// Copy the installed module's files into a new draft workspace.
    pub fn create_draft(&mut self, module_id: &str, installed_files: BTreeMap<String, Vec<u8>>) -> &Draft {
        let now = Utc::now();
        let draft = Draft {
            draft_id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            state: DraftState::Editing,
            files: installed_files,
            bundle_sha256: None,
            created_at: now,
            updated_at: now,
        };
        let draft_id = draft.draft_id.clone();
        self.drafts.insert(draft_id.clone(), draft);
        self.drafts.get(&draft_id).expect("just inserted")
    }

    pub fn get(&self, draft_id: &str) -> DraftResult<&Draft> {
        self.drafts.get(draft_id).ok_or_else(|| DraftError::NotFound(draft_id.to_string()))
    }

    /// Allowed only in `EDITING`.
    pub fn edit_file(&mut self, draft_id: &str, path: &str, content: Vec<u8>) -> DraftResult<()> {
        let draft = self.drafts.get_mut(draft_id).ok_or_else(|| DraftError::NotFound(draft_id.to_string()))?;
        if draft.state != DraftState::Editing {
            return Err(DraftError::InvalidState { action: "edit".to_string(), state: draft.state });
        }
        draft.files.insert(path.to_string(), content);
        draft.updated_at = Utc::now();
        Ok(())
    }

    /// Run `validator` over the draft's files; on success move to
    /// `VALIDATED` and record the bundle hash, on failure stay in `EDITING`.
    pub fn validate_draft(
        &mut self,
        draft_id: &str,
        validator: impl FnOnce(&BTreeMap<String, Vec<u8>>) -> ValidationReport,
    ) -> DraftResult<ValidationReport> {
        let draft = self.drafts.get_mut(draft_id).ok_or_else(|| DraftError::NotFound(draft_id.to_string()))?;
        if draft.state == DraftState::Discarded {
            return Err(DraftError::InvalidState { action: "validate".to_string(), state: draft.state });
        }

        let report = validator(&draft.files);
        if report.status == crate::pipeline::ValidationStatus::Validated {
            draft.state = DraftState::Validated;
            draft.bundle_sha256 = Some(crate::artifact::bundle_hash(&draft.files));
        } else {
            draft.state = DraftState::Editing;
        }
        draft.updated_at = Utc::now();
        Ok(report)
    }

    /// Allowed only in `VALIDATED`; invokes `installer` with the recorded
    /// bundle hash, moving to `PROMOTED` on success.
    pub fn promote_draft(
        &mut self,
        draft_id: &str,
        installer: impl FnOnce(PromotionRequest) -> bool,
    ) -> DraftResult<bool> {
        let draft = self.drafts.get_mut(draft_id).ok_or_else(|| DraftError::NotFound(draft_id.to_string()))?;
        if draft.state != DraftState::Validated {
            return Err(DraftError::InvalidState { action: "promote".to_string(), state: draft.state });
        }

        let bundle_sha256 = draft.bundle_sha256.clone().expect("VALIDATED drafts always carry a bundle hash");
        let installed = installer(PromotionRequest { bundle_sha256, status: "VALIDATED" });
        if installed {
            draft.state = DraftState::Promoted;
            draft.updated_at = Utc::now();
        }
        Ok(installed)
    }

    /// Always allowed; any later validate/promote call then fails.
    pub fn discard_draft(&mut self, draft_id: &str) -> DraftResult<()> {
        let draft = self.drafts.get_mut(draft_id).ok_or_else(|| DraftError::NotFound(draft_id.to_string()))?;
        draft.state = DraftState::Discarded;
        draft.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for DraftManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ValidationStatus;

    fn passing_validator(_files: &BTreeMap<String, Vec<u8>>) -> ValidationReport {
        let mut report = ValidationReport::new("news/nyt");
        report.status = ValidationStatus::Validated;
        report
    }

    fn failing_validator(_files: &BTreeMap<String, Vec<u8>>) -> ValidationReport {
        let mut report = ValidationReport::new("news/nyt");
        report.status = ValidationStatus::Failed;
        report
    }

    #[test]
    fn edit_only_allowed_while_editing() {
        let mut manager = DraftManager::new();
        let draft_id = manager.create_draft("news/nyt", BTreeMap::new()).draft_id.clone();
        manager.edit_file(&draft_id, "adapter.rs", b"fn main() {}".to_vec()).unwrap();

        manager.validate_draft(&draft_id, passing_validator).unwrap();
        let result = manager.edit_file(&draft_id, "adapter.rs", b"changed".to_vec());
        assert!(matches!(result, Err(DraftError::InvalidState { .. })));
    }

    #[test]
    fn failed_validation_returns_to_editing() {
        let mut manager = DraftManager::new();
        let draft_id = manager.create_draft("news/nyt", BTreeMap::new()).draft_id.clone();
        manager.validate_draft(&draft_id, failing_validator).unwrap();
        assert_eq!(manager.get(&draft_id).unwrap().state, DraftState::Editing);
    }

    #[test]
    fn promote_requires_validated_state() {
        let mut manager = DraftManager::new();
        let draft_id = manager.create_draft("news/nyt", BTreeMap::new()).draft_id.clone();
        let result = manager.promote_draft(&draft_id, |_| true);
        assert!(matches!(result, Err(DraftError::InvalidState { .. })));
    }

    #[test]
    fn full_lifecycle_editing_to_promoted() {
        let mut manager = DraftManager::new();
        let draft_id = manager.create_draft("news/nyt", BTreeMap::new()).draft_id.clone();
        manager.validate_draft(&draft_id, passing_validator).unwrap();
        let installed = manager.promote_draft(&draft_id, |req| req.status == "VALIDATED").unwrap();
        assert!(installed);
        assert_eq!(manager.get(&draft_id).unwrap().state, DraftState::Promoted);
    }

    #[test]
    fn discard_blocks_subsequent_validate_and_promote() {
        let mut manager = DraftManager::new();
        let draft_id = manager.create_draft("news/nyt", BTreeMap::new()).draft_id.clone();
        manager.discard_draft(&draft_id).unwrap();

        let validate_result = manager.validate_draft(&draft_id, passing_validator);
        assert!(matches!(validate_result, Err(DraftError::InvalidState { .. })));

        let promote_result = manager.promote_draft(&draft_id, |_| true);
        assert!(matches!(promote_result, Err(DraftError::InvalidState { .. })));
    }
}
