//! Deferred release of inbound request body chunks.
//!
//! Chunks are withheld for a fixed hold delay so the rest of the pipeline
//! can get ahead, then flushed downstream as one concatenated batch when the
//! timer fires. End-of-stream does not shortcut the hold: the delay is a
//! fixed wait, not a race with body completion. After the flush, later
//! chunks pass straight through.

use std::time::Duration;

use bytes::Bytes;

use crate::pipeline::context::RequestContext;
use crate::pipeline::timer::TimerHandle;
use crate::pipeline::PipelineError;

/// What the stage did with an incoming chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum HoldOutcome {
    /// Withheld; nothing forwarded yet. The driver must signal an empty
    /// accept downstream so the pipeline does not stall.
    Held,
    /// The hold is over; forward this chunk directly.
    Forward(Bytes),
}

/// Timer-gated request body hold.
#[derive(Debug, Clone)]
pub struct DeferredRelease {
    delay: Duration,
}

impl DeferredRelease {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Arm the hold timer for `ctx` if none is armed yet, returning the
    /// handle the driver should wait on. Re-entries reuse the armed timer.
    pub fn arm(&self, ctx: &mut RequestContext) -> TimerHandle {
        if let Some(timer) = ctx.timer.as_ref() {
            return timer.clone();
        }
        let timer = TimerHandle::arm(self.delay);
        ctx.timer = Some(timer.clone());
        timer
    }

    /// Accept one inbound chunk.
    pub fn on_chunk(
        &self,
        ctx: &mut RequestContext,
        chunk: Bytes,
    ) -> Result<HoldOutcome, PipelineError> {
        if ctx.released {
            return Ok(HoldOutcome::Forward(chunk));
        }
        ctx.pending.try_reserve(1)?;
        ctx.pending.push(chunk);
        Ok(HoldOutcome::Held)
    }

    /// Accept the end-of-stream marker. The accumulated data still waits
    /// for the timer.
    pub fn on_end(&self, ctx: &mut RequestContext) {
        if !ctx.released {
            ctx.pending_end = true;
        }
    }

    /// Flush on timer fire: concatenate every withheld chunk, in arrival
    /// order, into the single batch the driver forwards downstream.
    pub fn release(&self, ctx: &mut RequestContext) -> Result<Bytes, PipelineError> {
        let total: usize = ctx.pending.iter().map(Bytes::len).sum();
        let mut batch: Vec<u8> = Vec::new();
        batch.try_reserve_exact(total)?;
        for chunk in ctx.pending.drain(..) {
            batch.extend_from_slice(&chunk);
        }
        ctx.released = true;
        ctx.timer = None;
        Ok(Bytes::from(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn stage() -> DeferredRelease {
        DeferredRelease::new(Duration::from_millis(1000))
    }

    #[test]
    fn test_chunks_held_then_released_as_one_batch() {
        let stage = stage();
        let mut ctx = RequestContext::new(Uuid::new_v4());

        assert_eq!(
            stage.on_chunk(&mut ctx, Bytes::from_static(b"C1")).unwrap(),
            HoldOutcome::Held
        );
        assert_eq!(
            stage.on_chunk(&mut ctx, Bytes::from_static(b"C2")).unwrap(),
            HoldOutcome::Held
        );
        assert_eq!(
            stage.on_chunk(&mut ctx, Bytes::from_static(b"C3")).unwrap(),
            HoldOutcome::Held
        );

        let batch = stage.release(&mut ctx).unwrap();
        assert_eq!(&batch[..], b"C1C2C3");
        assert!(ctx.pending.is_empty());
        assert!(ctx.released);
    }

    #[test]
    fn test_end_of_stream_does_not_trigger_release() {
        let stage = stage();
        let mut ctx = RequestContext::new(Uuid::new_v4());

        stage.on_chunk(&mut ctx, Bytes::from_static(b"body")).unwrap();
        stage.on_end(&mut ctx);

        // Data is still pending: only the timer releases it.
        assert!(ctx.pending_end);
        assert!(!ctx.released);
        assert_eq!(ctx.pending.len(), 1);
    }

    #[test]
    fn test_chunks_after_release_pass_through() {
        let stage = stage();
        let mut ctx = RequestContext::new(Uuid::new_v4());

        stage.on_chunk(&mut ctx, Bytes::from_static(b"held")).unwrap();
        stage.release(&mut ctx).unwrap();

        match stage.on_chunk(&mut ctx, Bytes::from_static(b"late")).unwrap() {
            HoldOutcome::Forward(b) => assert_eq!(&b[..], b"late"),
            HoldOutcome::Held => panic!("chunk after release must pass through"),
        }
    }

    #[test]
    fn test_arm_is_idempotent_per_request() {
        let stage = stage();
        let mut ctx = RequestContext::new(Uuid::new_v4());

        let first = stage.arm(&mut ctx);
        let second = stage.arm(&mut ctx);
        // Same underlying timer: firing one exhausts the other.
        assert!(first.fire());
        assert!(!second.fire());
    }

    #[test]
    fn test_release_of_empty_hold_is_empty_batch() {
        let stage = stage();
        let mut ctx = RequestContext::new(Uuid::new_v4());
        let batch = stage.release(&mut ctx).unwrap();
        assert!(batch.is_empty());
        assert!(ctx.released);
    }
}
