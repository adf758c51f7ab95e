//! Per-request sampling decision.
//!
//! Two gates, both of which must pass: a uniform draw over `[0, 100)`
//! against the throttle percentage (bounds the volume of observed traffic),
//! and the request's elapsed time against a millisecond threshold (restricts
//! observation to requests already identified as slow). The draw is checked
//! first so the common low-throttle case returns without touching the clock.

use rand::Rng;

/// Decide whether a request should be observed.
///
/// Must be called at most once per request; callers memoize the result in
/// the request context via [`RequestContext::decide_sampled`].
///
/// [`RequestContext::decide_sampled`]: crate::pipeline::context::RequestContext::decide_sampled
pub fn decide(throttle_percent: u8, time_threshold_ms: u64, elapsed_ms: u64) -> bool {
    let draw: f64 = rand::thread_rng().gen_range(0.0..100.0);
    decide_with_draw(draw, throttle_percent, time_threshold_ms, elapsed_ms)
}

/// Decision logic with the random draw injected. Split out so the gating
/// can be tested deterministically.
fn decide_with_draw(
    draw: f64,
    throttle_percent: u8,
    time_threshold_ms: u64,
    elapsed_ms: u64,
) -> bool {
    if draw >= f64::from(throttle_percent) {
        return false;
    }
    elapsed_ms >= time_threshold_ms
}
