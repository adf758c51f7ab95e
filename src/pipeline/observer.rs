//! Response body observer.
//!
//! Per-request state machine: unknown on the first chunk, then either
//! observing or not for the rest of the body. Observing means mirroring a
//! copy of every chunk into the context's growable buffer; the chunk itself
//! is always forwarded downstream unchanged and in order by the caller.
//! A failed mirror append must fail the request, never report success while
//! dropping data.

use crate::pipeline::context::RequestContext;
use crate::pipeline::{PipelineError, TapSettings};

/// Process one response body chunk for `ctx`.
///
/// The first call decides (and memoizes) whether this request is observed;
/// every call on an observed request appends a copy of `chunk` to the
/// buffer. Forwarding downstream is the caller's job and is unconditional.
pub fn observe_chunk(
    ctx: &mut RequestContext,
    settings: &TapSettings,
    chunk: &[u8],
) -> Result<(), PipelineError> {
    if !ctx.decide_sampled(settings) {
        return Ok(());
    }

    let Some(buffer) = ctx.observed.as_mut() else {
        // decide_sampled allocates the buffer for every sampled request.
        return Err(PipelineError::BufferAlloc);
    };
    buffer.append(chunk)?;
    ctx.observed_size += chunk.len();
    Ok(())
}
