//! Run identifier generation
//!
//! Ids look like `run_20250130_120000` (UTC, second precision). When that id is
//! already taken the generator tries `run_20250130_120000_123456` (microseconds)
//! and then `run_20250130_120000_123456_1`, `_2`, ... Every form sorts
//! chronologically. An id is only handed out once the store confirmed the claim.

use chrono::{DateTime, Utc};

use super::HistoryStore;
use crate::error::{Error, Result};

/// Prefix shared by all generated ids
pub const RUN_ID_PREFIX: &str = "run_";

/// Counter suffixes tried after the microsecond form
const MAX_COUNTER_SUFFIX: u32 = 1000;

/// Second-precision id for an instant
pub fn base_run_id(now: DateTime<Utc>) -> String {
    format!("{}{}", RUN_ID_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// Candidate ids for an instant, in the order they are tried
pub fn candidate_run_ids(now: DateTime<Utc>) -> impl Iterator<Item = String> {
    let base = base_run_id(now);
    let micros = format!("{}_{}", base, now.format("%6f"));
    let counted = {
        let micros = micros.clone();
        (1..=MAX_COUNTER_SUFFIX).map(move |n| format!("{}_{}", micros, n))
    };
    [base, micros].into_iter().chain(counted)
}

/// Claim the first free candidate id in `store`
pub fn allocate_run_id<S>(store: &S, now: DateTime<Utc>) -> Result<String>
where
    S: HistoryStore + ?Sized,
{
    for candidate in candidate_run_ids(now) {
        if store.claim_run_id(&candidate)? {
            return Ok(candidate);
        }
        tracing::debug!("Run id {} already claimed, trying next candidate", candidate);
    }
    Err(Error::internal(format!(
        "could not allocate a run id for {}",
        base_run_id(now)
    )))
}

/// Ids double as storage keys, so only `[A-Za-z0-9_-]` is accepted
pub fn is_valid_run_id(run_id: &str) -> bool {
    !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
