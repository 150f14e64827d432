//! Exponential backoff for transient send failures.

/// `min(base_ms * 2^try_count, cap_ms)`, saturating rather than panicking
/// when the shift or product would overflow `u64`.
pub fn compute_backoff(base_ms: u64, try_count: u32, cap_ms: u64) -> u64 {
    let factor = 1u64.checked_shl(try_count).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(cap_ms)
}
