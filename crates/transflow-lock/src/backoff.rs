use std::time::Duration;

use rand::Rng;

/// `delay_k = base * 2^k * uniform(0.5, 1.5)`, capped at `max_ms` (spec
/// §4.B). `k` is clamped before shifting so a long-running retry loop never
/// overflows the exponent.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let shift = attempt.min(32);
    let exp_ms = base_ms.saturating_mul(1u64.checked_shl(shift).unwrap_or(u64::MAX));
    let capped_ms = exp_ms.min(max_ms);
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    let jittered_ms = (capped_ms as f64 * jitter) as u64;
    Duration::from_millis(jittered_ms.min(max_ms))
}
