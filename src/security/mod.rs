//! Cross-origin policy for the browser dashboard calling the gateway.

mod cors;

pub use cors::CorsMiddleware;
