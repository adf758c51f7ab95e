//! Per-request variable registry and the derived diagnostic probe.
//!
//! Variables are registered by name at startup and looked up by the index
//! handed back at registration, so request-time resolution is a slot access,
//! not a name search. A lookup can report "not found", which is distinct
//! from an empty value.
//!
//! The probe variable stitches the captured inbound body and the observed
//! outbound buffer into `"<inbound> -> <outbound>"`, each side truncated to
//! the configured bound. Non-sampled requests read as a fixed one-character
//! placeholder. Resolution is lazy (access-log time) and idempotent within
//! a request.

use bytes::Bytes;

use crate::pipeline::context::RequestContext;

/// Name of the raw inbound body variable, provided by the host.
pub const RAW_BODY_VAR: &str = "request_body";

/// Name of the derived diagnostic variable.
pub const PROBE_VAR: &str = "quantum_probe";

/// Value read for requests that were not sampled.
pub const NOT_SAMPLED_PLACEHOLDER: &str = "-";

/// Result of a variable lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Found(Bytes),
    NotFound,
}

/// Pre-resolved variable index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarId(usize);

type Provider = Box<dyn Fn(&RequestContext, &VariableRegistry) -> VarValue + Send + Sync>;

/// Startup-built table of variable providers.
#[derive(Default)]
pub struct VariableRegistry {
    slots: Vec<(String, Provider)>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`, returning its index.
    pub fn register(&mut self, name: &str, provider: Provider) -> VarId {
        self.slots.push((name.to_string(), provider));
        VarId(self.slots.len() - 1)
    }

    /// Resolve a name to its index. Done once at startup, never per request.
    pub fn resolve(&self, name: &str) -> Option<VarId> {
        self.slots.iter().position(|(n, _)| n == name).map(VarId)
    }

    /// Evaluate a variable against a request context.
    pub fn eval(&self, id: VarId, ctx: &RequestContext) -> VarValue {
        match self.slots.get(id.0) {
            Some((_, provider)) => provider(ctx, self),
            None => VarValue::NotFound,
        }
    }
}

impl std::fmt::Debug for VariableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableRegistry")
            .field("names", &self.slots.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

/// Render the probe value for `ctx`, pulling the inbound side from the
/// registry by its pre-resolved index.
pub fn render_probe(
    ctx: &RequestContext,
    registry: &VariableRegistry,
    raw_body: VarId,
    max_output_bytes: usize,
) -> String {
    if !ctx.is_sampled() {
        return NOT_SAMPLED_PLACEHOLDER.to_string();
    }

    let inbound = match registry.eval(raw_body, ctx) {
        VarValue::Found(bytes) => bytes,
        VarValue::NotFound => Bytes::new(),
    };
    let outbound: &[u8] = match ctx.observed.as_ref() {
        Some(buffer) => buffer.as_slice(),
        None => &[],
    };

    format!(
        "{} -> {}",
        truncated(&inbound, max_output_bytes),
        truncated(outbound, max_output_bytes)
    )
}

fn truncated(bytes: &[u8], max: usize) -> std::borrow::Cow<'_, str> {
    let end = bytes.len().min(max);
    String::from_utf8_lossy(&bytes[..end])
}

/// Build the registry the gateway exposes: the host-provided raw body
/// variable plus the derived probe. The probe's truncation bound comes from
/// the context snapshot, not live settings, so every read within a request
/// sees the same bytes.
pub fn build_registry() -> (VariableRegistry, VarId) {
    let mut registry = VariableRegistry::new();

    let raw_body = registry.register(
        RAW_BODY_VAR,
        Box::new(|ctx, _| match ctx.inbound_body() {
            Some(bytes) => VarValue::Found(Bytes::copy_from_slice(bytes)),
            None => VarValue::NotFound,
        }),
    );

    let probe = registry.register(
        PROBE_VAR,
        Box::new(move |ctx, registry| {
            VarValue::Found(Bytes::from(render_probe(
                ctx,
                registry,
                raw_body,
                ctx.output_limit(),
            )))
        }),
    );

    (registry, probe)
}
