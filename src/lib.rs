//! # crmgate
//!
//! AI gateway for a CRM dashboard. It proxies prompts to OpenAI and Google
//! Gemini, decodes their replies into typed payloads with canned fallbacks,
//! recommends models per CRM task, and persists customers, usage logs and
//! logos in a hosted PostgREST backend.
//!
//! The HTTP layer is a small tokio + `httparse` HTTP/1.1 server with a
//! router and a middleware pipeline.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crmgate::api::{AppState, build_router};
//! use crmgate::config::Config;
//! use crmgate::middleware::{LoggerMiddleware, Pipeline, from_middleware};
//! use crmgate::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = Arc::new(AppState::from_config(&config)?);
//!     let pipeline = Pipeline::new(build_router(state)).layer(from_middleware(Arc::new(LoggerMiddleware)));
//!
//!     let server = Server::bind(&config.bind_addr).await?;
//!     server.run(move |req| {
//!         let pipeline = pipeline.clone();
//!         async move { pipeline.handle(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Domain ────────────────────────────────────────────────────────────────────
pub mod ai;
pub mod api;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod crm;
pub mod error;
pub mod llm;
pub mod recommender;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use error::ApiError;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
