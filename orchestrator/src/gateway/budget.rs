//! Per-job token budgets, grounded on `llm_gateway.py`'s `_check_budget` /
//! `_record_usage`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobBudget {
    pub job_id: String,
    pub max_tokens: u32,
    pub total_tokens: u32,
    pub request_count: u32,
}

impl JobBudget {
    pub fn new(job_id: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            job_id: job_id.into(),
            max_tokens,
            total_tokens: 0,
            request_count: 0,
        }
    }

    pub fn has_headroom(&self, requested_tokens: u32) -> bool {
        self.total_tokens.saturating_add(requested_tokens) <= self.max_tokens
    }

    pub fn record_usage(&mut self, tokens: u32) {
        self.total_tokens = self.total_tokens.saturating_add(tokens);
        self.request_count += 1;
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.total_tokens)
    }
}

/// Running totals across a job's full lifetime, independent of whether the
/// caller enforces a cap — used for `UsageRecord` reporting even when no
/// `JobBudget` is registered.
#[derive(Debug, Default, Clone)]
pub struct UsageAccumulator {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub request_count: u64,
}

impl UsageAccumulator {
    pub fn add(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        self.total_prompt_tokens += prompt_tokens as u64;
        self.total_completion_tokens += completion_tokens as u64;
        self.request_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headroom_respects_max_tokens() {
        let budget = JobBudget::new("job", 100);
        assert!(budget.has_headroom(100));
        assert!(!budget.has_headroom(101));
    }

    #[test]
    fn record_usage_accumulates_and_shrinks_remaining() {
        let mut budget = JobBudget::new("job", 100);
        budget.record_usage(30);
        assert_eq!(budget.remaining(), 70);
        assert_eq!(budget.request_count, 1);
        assert!(!budget.has_headroom(71));
        assert!(budget.has_headroom(70));
    }
}
