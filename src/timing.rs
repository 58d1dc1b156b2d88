//! Stage duration model: a nominal duration perturbed by bounded jitter.

use rand::RngExt;

/// Nominal duration `base_ms` perturbed by up to `±base_ms * jitter_ratio`.
///
/// The ratio is clamped into `[0, 1]` and the result is rounded to the nearest
/// millisecond, so it is never negative.
pub fn compute_duration(base_ms: u64, jitter_ratio: f64) -> u64 {
    let ratio = clamp_ratio(jitter_ratio);
    if base_ms == 0 || ratio == 0.0 {
        return base_ms;
    }
    let draw = rand::rng().random_range(-1.0..=1.0);
    apply_jitter(base_ms, ratio, draw)
}

fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// `draw` is the uniform sample in [-1, 1].
fn apply_jitter(base_ms: u64, ratio: f64, draw: f64) -> u64 {
    let base = base_ms as f64;
    (base + draw * base * ratio).round().max(0.0) as u64
}
