//! Reverse proxy with a streaming body observability pipeline.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
