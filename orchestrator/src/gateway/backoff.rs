//! Exponential backoff with jitter, grounded on `llm_gateway.py`'s
//! `_compute_backoff`: `min(base * 2^attempt, cap) + uniform(0, delay * 0.5)`.

use rand::Rng;

/// `attempt` is 0-based (the retry number, not the total call count).
pub fn compute_backoff(attempt: u32, base_delay_secs: f64, cap_secs: f64) -> f64 {
    let delay = (base_delay_secs * 2f64.powi(attempt as i32)).min(cap_secs);
    let jitter = rand::thread_rng().gen_range(0.0..=delay * 0.5);
    delay + jitter
}
