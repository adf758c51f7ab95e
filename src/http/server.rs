//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Create the Axum router and middleware stack (trace, request id,
//!   reject rule, timeout, concurrency cap)
//! - Forward requests to the upstream via a pooled hyper client
//! - Drive the body pipeline: deferred request-body hold on the way in,
//!   response-body observation on the way out
//! - Resolve the diagnostic probe variable lazily for the completion log
//! - Swap live tap settings when the config watcher reports a change
//!
//! The pipeline stages themselves are synchronous (`crate::pipeline`); this
//! module owns all the async plumbing around them: frame polling, the hold
//! timer wait, and teardown of per-request state on any exit path.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::uri::{Authority, Scheme},
    http::{HeaderValue, Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures_util::stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::{GatewayConfig, SyntheticConfig};
use crate::http::reject::reject_middleware;
use crate::http::request::{request_id_middleware, X_REQUEST_ID};
use crate::http::synthetic;
use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;
use crate::pipeline::deferred::{DeferredRelease, HoldOutcome};
use crate::pipeline::variable::{self, VarId, VarValue, VariableRegistry};
use crate::pipeline::{observer, ContextGuard, ContextStore, RequestContext, TapSettings};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    client: Client<HttpConnector, Body>,
    upstream: String,
    settings: Arc<ArcSwap<TapSettings>>,
    contexts: Arc<ContextStore>,
    variables: Arc<VariableRegistry>,
    probe_var: VarId,
    synthetic: SyntheticConfig,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    settings: Arc<ArcSwap<TapSettings>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let settings = Arc::new(ArcSwap::from_pointee(TapSettings::from(&config.tap)));
        let (variables, probe_var) = variable::build_registry();

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            client,
            upstream: config.upstream.address.clone(),
            settings: settings.clone(),
            contexts: Arc::new(ContextStore::new()),
            variables: Arc::new(variables),
            probe_var,
            synthetic: config.synthetic.clone(),
        };

        let router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn(request_id_middleware))
                    .layer(middleware::from_fn_with_state(
                        config.reject.clone(),
                        reject_middleware,
                    ))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    )))
                    .layer(tower::limit::GlobalConcurrencyLimitLayer::new(
                        config.listener.max_connections,
                    )),
            );

        Self { router, settings }
    }

    /// Run the server until shutdown, swapping tap settings on reloads.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: ShutdownListener,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "gateway listening");

        let settings = self.settings.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                let swapped = TapSettings::from(&config.tap);
                tracing::info!(
                    enabled = swapped.enabled,
                    throttle_percent = swapped.throttle_percent,
                    "tap settings swapped"
                );
                settings.store(Arc::new(swapped));
            }
        });

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("gateway stopped");
        Ok(())
    }
}

/// Main proxy handler: wires the body pipeline around a forwarded request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().as_str().to_string();

    if state.synthetic.enabled && request.uri().path() == state.synthetic.path {
        metrics::record_request(&method, state.synthetic.status, start);
        return synthetic::synthetic_response(&state.synthetic, &request_id);
    }

    // Per-request pipeline state. The store key is generated here, never
    // taken from the request: two requests carrying the same id header must
    // not share a context. The guard is shared by both body legs; the last
    // one to finish tears the entry down.
    let key = Uuid::new_v4();
    let ctx = state.contexts.acquire(key);
    let guard = Arc::new(ContextGuard::new(state.contexts.clone(), key));
    let settings = state.settings.load_full();

    let (parts, inbound) = request.into_parts();

    let upstream_body = if settings.hold_enabled {
        deferred_request_body(inbound, ctx.clone(), guard.clone(), settings.clone())
    } else {
        captured_request_body(inbound, ctx.clone(), settings.clone())
    };

    // Rewrite the URI toward the upstream.
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    match Authority::from_str(&state.upstream) {
        Ok(authority) => uri_parts.authority = Some(authority),
        Err(e) => {
            tracing::error!(error = %e, upstream = %state.upstream, "invalid upstream authority");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Bad upstream").into_response();
        }
    }
    let uri = Uri::from_parts(uri_parts).unwrap_or_else(|_| parts.uri.clone());

    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .version(parts.version);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in parts.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
    }
    let upstream_request = match builder.body(upstream_body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "failed to build upstream request");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Bad upstream request").into_response();
        }
    };

    match state.client.request(upstream_request).await {
        Ok(response) => {
            let status = response.status();
            let (mut resp_parts, body) = response.into_parts();
            // Response header stage: tag before handing to the next filter.
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                resp_parts.headers.insert(X_REQUEST_ID, value);
            }
            let completion = RequestCompletion {
                ctx,
                _guard: guard,
                settings,
                variables: state.variables.clone(),
                probe_var: state.probe_var,
                request_id,
                method,
                status: status.as_u16(),
                start,
            };
            Response::from_parts(resp_parts, observed_response_body(Body::new(body), completion))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "upstream request failed");
            metrics::record_request(&method, 502, start);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Pass-through request body that records a bounded inbound prefix for the
/// raw-request-body variable.
fn captured_request_body(
    inbound: Body,
    ctx: Arc<Mutex<RequestContext>>,
    settings: Arc<TapSettings>,
) -> Body {
    let stream = stream::unfold(
        (inbound, ctx, settings),
        |(mut inbound, ctx, settings)| async move {
            match inbound.frame().await {
                None => None,
                Some(Ok(frame)) => {
                    let frame = match frame.into_data() {
                        Ok(data) => {
                            {
                                let mut ctx = ctx.lock().expect("request context mutex poisoned");
                                ctx.capture_inbound(&data, settings.max_output_bytes);
                            }
                            Frame::data(data)
                        }
                        // Trailer frames pass through untouched.
                        Err(frame) => frame,
                    };
                    Some((Ok(frame), (inbound, ctx, settings)))
                }
                Some(Err(e)) => Some((Err(axum::BoxError::from(e)), (inbound, ctx, settings))),
            }
        },
    );
    Body::new(StreamBody::new(stream))
}

/// Request body routed through the deferred-release stage.
///
/// A driver task accumulates inbound chunks and waits on the hold timer;
/// the returned body is fed from the driver over a channel. Until the timer
/// fires the channel stays silent, so the upstream sees no data; the flush
/// arrives as one batch. Trailer frames are withheld with the data and sent
/// after it. A client body error is forwarded as a body error so the
/// upstream send aborts instead of ending as a complete body. The context
/// guard travels with the driver so an aborted request still cancels the
/// timer.
fn deferred_request_body(
    mut inbound: Body,
    ctx: Arc<Mutex<RequestContext>>,
    guard: Arc<ContextGuard>,
    settings: Arc<TapSettings>,
) -> Body {
    let (tx, rx) = mpsc::channel::<Result<Frame<Bytes>, axum::BoxError>>(16);
    let stage = DeferredRelease::new(Duration::from_millis(settings.hold_delay_ms));

    tokio::spawn(async move {
        let _guard = guard;
        let timer = {
            let mut ctx = ctx.lock().expect("request context mutex poisoned");
            stage.arm(&mut ctx)
        };

        let mut end_seen = false;
        let mut held_trailers: Option<Frame<Bytes>> = None;
        // Hold phase: accumulate until the timer fires.
        loop {
            tokio::select! {
                _ = timer.due() => {
                    if !timer.fire() {
                        // Cancelled by teardown.
                        return;
                    }
                    let released = {
                        let mut ctx = ctx.lock().expect("request context mutex poisoned");
                        stage.release(&mut ctx)
                    };
                    match released {
                        Ok(batch) => {
                            metrics::record_held_release(batch.len());
                            if !batch.is_empty()
                                && tx.send(Ok(Frame::data(batch))).await.is_err()
                            {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(axum::BoxError::from(e))).await;
                            return;
                        }
                    }
                    break;
                }
                frame = inbound.frame(), if !end_seen => {
                    match frame {
                        Some(Ok(frame)) => match frame.into_data() {
                            Ok(data) => {
                                let held = {
                                    let mut ctx = ctx.lock().expect("request context mutex poisoned");
                                    ctx.capture_inbound(&data, settings.max_output_bytes);
                                    stage.on_chunk(&mut ctx, data)
                                };
                                match held {
                                    Ok(HoldOutcome::Held) => {}
                                    Ok(HoldOutcome::Forward(data)) => {
                                        if tx.send(Ok(Frame::data(data))).await.is_err() {
                                            return;
                                        }
                                    }
                                    Err(e) => {
                                        let _ = tx.send(Err(axum::BoxError::from(e))).await;
                                        return;
                                    }
                                }
                            }
                            // Trailers follow all data; withhold them with it.
                            Err(frame) => held_trailers = Some(frame),
                        },
                        Some(Err(e)) => {
                            // Abort the upstream send; a silent end here would
                            // read as a complete body.
                            let _ = tx.send(Err(axum::BoxError::from(e))).await;
                            return;
                        }
                        None => {
                            end_seen = true;
                            let mut ctx = ctx.lock().expect("request context mutex poisoned");
                            stage.on_end(&mut ctx);
                        }
                    }
                }
            }
        }

        if end_seen {
            // The flushed batch was the whole body.
            if let Some(trailers) = held_trailers {
                let _ = tx.send(Ok(trailers)).await;
            }
            return;
        }
        // Pass-through phase: the hold is over, forward directly.
        while let Some(frame) = inbound.frame().await {
            match frame {
                Ok(frame) => match frame.into_data() {
                    Ok(data) => {
                        {
                            let mut ctx = ctx.lock().expect("request context mutex poisoned");
                            ctx.capture_inbound(&data, settings.max_output_bytes);
                        }
                        if tx.send(Ok(Frame::data(data))).await.is_err() {
                            return;
                        }
                    }
                    Err(frame) => {
                        if tx.send(Ok(frame)).await.is_err() {
                            return;
                        }
                    }
                },
                Err(e) => {
                    let _ = tx.send(Err(axum::BoxError::from(e))).await;
                    return;
                }
            }
        }
        if let Some(trailers) = held_trailers {
            let _ = tx.send(Ok(trailers)).await;
        }
    });

    Body::new(StreamBody::new(stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })))
}

/// Everything needed to finish a request once its response body ends.
struct RequestCompletion {
    ctx: Arc<Mutex<RequestContext>>,
    _guard: Arc<ContextGuard>,
    settings: Arc<TapSettings>,
    variables: Arc<VariableRegistry>,
    probe_var: VarId,
    request_id: String,
    method: String,
    status: u16,
    start: Instant,
}

impl RequestCompletion {
    /// Resolve the probe lazily and emit the completion record.
    fn finish(&self) {
        let sampled;
        let probe = {
            let ctx = self.ctx.lock().expect("request context mutex poisoned");
            sampled = ctx.is_sampled();
            match self.variables.eval(self.probe_var, &ctx) {
                VarValue::Found(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                VarValue::NotFound => variable::NOT_SAMPLED_PLACEHOLDER.to_string(),
            }
        };
        if sampled {
            metrics::record_sampled();
        }
        metrics::record_request(&self.method, self.status, self.start);
        tracing::info!(
            request_id = %self.request_id,
            method = %self.method,
            status = self.status,
            probe = %probe,
            "request completed"
        );
    }
}

/// Response body that mirrors every chunk through the observer stage while
/// forwarding it unchanged, and finishes the request at end-of-stream.
fn observed_response_body(upstream: Body, completion: RequestCompletion) -> Body {
    let stream = stream::unfold(
        (upstream, completion, false),
        |(mut upstream, completion, failed)| async move {
            if failed {
                return None;
            }
            match upstream.frame().await {
                None => {
                    completion.finish();
                    None
                }
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        let mirrored = {
                            let mut ctx =
                                completion.ctx.lock().expect("request context mutex poisoned");
                            observer::observe_chunk(&mut ctx, &completion.settings, &data)
                        };
                        match mirrored {
                            Ok(()) => Some((Ok(Frame::data(data)), (upstream, completion, false))),
                            Err(e) => {
                                tracing::error!(
                                    request_id = %completion.request_id,
                                    error = %e,
                                    "mirror append failed, aborting response"
                                );
                                Some((Err(axum::BoxError::from(e)), (upstream, completion, true)))
                            }
                        }
                    }
                    // Trailer frames are forwarded, not mirrored.
                    Err(frame) => Some((Ok(frame), (upstream, completion, false))),
                },
                Some(Err(e)) => {
                    Some((Err(axum::BoxError::from(e)), (upstream, completion, true)))
                }
            }
        },
    );
    Body::new(StreamBody::new(stream))
}
