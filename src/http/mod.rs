//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! client connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request id)
//!     → reject.rs (header-equality rule, 403 or decline)
//!     → synthetic.rs (locally answered route) or upstream forward
//!     → pipeline (deferred hold on the way in, observation on the way out)
//!     → client
//! ```

pub mod reject;
pub mod request;
pub mod server;
pub mod synthetic;

pub use request::{request_id_middleware, X_REQUEST_ID};
pub use server::HttpServer;
