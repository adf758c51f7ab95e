//! Per-request pipeline state.
//!
//! The body stages are re-entered once per chunk, so their state cannot live
//! in call-local variables. Each request gets a `RequestContext`, created
//! lazily on the first chunk either body stage sees and kept in a shared
//! store keyed by request id. A guard removes the entry at teardown and
//! cancels any armed timer before the state is dropped; a timer fire that
//! loses that race is a no-op (see `pipeline::timer`).

use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

use crate::pipeline::buffer::GrowableBuffer;
use crate::pipeline::timer::TimerHandle;
use crate::pipeline::{sampling, TapSettings};

/// State record for one in-flight request.
#[derive(Debug)]
pub struct RequestContext {
    pub id: Uuid,
    pub started_at: Instant,

    /// Memoized sampling decision. `None` until the first response chunk.
    sampled: Option<bool>,
    /// Probe truncation bound, fixed when the sampling decision is made so
    /// a settings swap mid-request cannot change what the variable reads.
    output_limit: usize,

    /// Mirrored response bytes. Allocated only for sampled requests.
    pub observed: Option<GrowableBuffer>,
    /// Logical number of mirrored bytes.
    pub observed_size: usize,

    /// Armed deferred-release timer, if any. Cleared on fire or teardown.
    pub timer: Option<TimerHandle>,
    /// Chunks withheld by the deferred-release stage, arrival order.
    pub pending: Vec<Bytes>,
    /// End-of-stream reached while chunks were still withheld.
    pub pending_end: bool,
    /// The withheld batch has been flushed; later chunks pass through.
    pub released: bool,

    /// Captured prefix of the inbound request body, bounded by the probe
    /// truncation limit. Source for the raw-request-body variable.
    inbound: Vec<u8>,
    inbound_seen: bool,
}

impl RequestContext {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            started_at: Instant::now(),
            sampled: None,
            output_limit: 0,
            observed: None,
            observed_size: 0,
            timer: None,
            pending: Vec::new(),
            pending_end: false,
            released: false,
            inbound: Vec::new(),
            inbound_seen: false,
        }
    }

    /// Compute the sampling decision on first call, then return the same
    /// answer for the rest of the request's lifetime.
    pub fn decide_sampled(&mut self, settings: &TapSettings) -> bool {
        if let Some(decided) = self.sampled {
            return decided;
        }

        let decided = settings.enabled
            && sampling::decide(
                settings.throttle_percent,
                settings.time_threshold_ms,
                self.elapsed_ms(),
            );
        if decided && self.observed.is_none() {
            self.observed = Some(GrowableBuffer::new());
        }
        self.sampled = Some(decided);
        self.output_limit = settings.max_output_bytes;
        decided
    }

    /// The memoized decision, without computing one.
    pub fn is_sampled(&self) -> bool {
        self.sampled == Some(true)
    }

    /// Truncation bound snapshotted with the sampling decision.
    pub fn output_limit(&self) -> usize {
        self.output_limit
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Record a prefix of the inbound body, up to `limit` bytes total.
    pub fn capture_inbound(&mut self, chunk: &[u8], limit: usize) {
        self.inbound_seen = true;
        let room = limit.saturating_sub(self.inbound.len());
        if room > 0 {
            let take = chunk.len().min(room);
            self.inbound.extend_from_slice(&chunk[..take]);
        }
    }

    /// Captured inbound prefix, or `None` if no body chunk was ever seen.
    /// The distinction matters: an empty body reads as `Some(&[])`.
    pub fn inbound_body(&self) -> Option<&[u8]> {
        self.inbound_seen.then_some(self.inbound.as_slice())
    }
}

/// Shared store of live request contexts, keyed by request id.
#[derive(Debug, Default)]
pub struct ContextStore {
    map: DashMap<Uuid, Arc<Mutex<RequestContext>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the context for `id`, creating it on first access.
    pub fn acquire(&self, id: Uuid) -> Arc<Mutex<RequestContext>> {
        self.map
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(RequestContext::new(id))))
            .clone()
    }

    /// Remove the context and disarm its timer. Idempotent. Runs from a
    /// `Drop` impl, so a poisoned lock is tolerated rather than escalated.
    pub fn release(&self, id: Uuid) {
        if let Some((_, ctx)) = self.map.remove(&id) {
            if let Ok(mut ctx) = ctx.lock() {
                if let Some(timer) = ctx.timer.take() {
                    timer.cancel();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Teardown guard for one request's context entry.
///
/// Cloned (via `Arc`) into every task that touches the request; when the
/// last clone drops, the context is removed and its timer cancelled.
#[derive(Debug)]
pub struct ContextGuard {
    store: Arc<ContextStore>,
    id: Uuid,
}

impl ContextGuard {
    pub fn new(store: Arc<ContextStore>, id: Uuid) -> Self {
        Self { store, id }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.store.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(throttle: u8, threshold_ms: u64) -> TapSettings {
        TapSettings {
            enabled: true,
            throttle_percent: throttle,
            time_threshold_ms: threshold_ms,
            max_output_bytes: 64,
            hold_enabled: false,
            hold_delay_ms: 1000,
        }
    }

    #[test]
    fn test_decision_is_memoized() {
        let mut ctx = RequestContext::new(Uuid::new_v4());
        let first = ctx.decide_sampled(&settings(100, 0));
        assert!(first);

        // A config that would decide differently must not change anything.
        for _ in 0..100 {
            assert_eq!(ctx.decide_sampled(&settings(0, u64::MAX)), first);
        }
    }

    #[test]
    fn test_disabled_tap_never_samples() {
        let mut ctx = RequestContext::new(Uuid::new_v4());
        let mut s = settings(100, 0);
        s.enabled = false;
        assert!(!ctx.decide_sampled(&s));
        assert!(ctx.observed.is_none());
    }

    #[test]
    fn test_sampled_request_gets_a_buffer() {
        let mut ctx = RequestContext::new(Uuid::new_v4());
        assert!(ctx.decide_sampled(&settings(100, 0)));
        assert!(ctx.observed.is_some());
    }

    #[test]
    fn test_inbound_capture_is_bounded() {
        let mut ctx = RequestContext::new(Uuid::new_v4());
        assert!(ctx.inbound_body().is_none());

        ctx.capture_inbound(b"abc", 5);
        ctx.capture_inbound(b"defgh", 5);
        assert_eq!(ctx.inbound_body(), Some(&b"abcde"[..]));
    }

    #[test]
    fn test_empty_inbound_distinct_from_absent() {
        let mut ctx = RequestContext::new(Uuid::new_v4());
        ctx.capture_inbound(b"", 16);
        assert_eq!(ctx.inbound_body(), Some(&[][..]));
    }

    #[test]
    fn test_guard_removes_entry_and_disarms_timer() {
        let store = Arc::new(ContextStore::new());
        let id = Uuid::new_v4();
        let ctx = store.acquire(id);
        let timer = TimerHandle::arm(Duration::from_secs(60));
        ctx.lock().unwrap().timer = Some(timer.clone());

        drop(ContextGuard::new(store.clone(), id));

        assert!(store.is_empty());
        // A late fire must be a no-op.
        assert!(!timer.fire());
        assert!(!timer.fired());
    }

    #[test]
    fn test_acquire_is_lazy_and_stable() {
        let store = ContextStore::new();
        let id = Uuid::new_v4();
        let a = store.acquire(id);
        let b = store.acquire(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }
}
