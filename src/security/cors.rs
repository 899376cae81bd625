use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

/// Headers the dashboard's backend SDK sends on every call.
const DEFAULT_ALLOWED_HEADERS: &[&str] = &["authorization", "x-client-info", "apikey", "content-type"];
const DEFAULT_ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

/// CORS middleware driven by an explicit origin allow-list.
///
/// - No `Origin` header: the request passes through untouched.
/// - Origin not on the list: preflights are refused with `403`, other
///   requests pass through without any `Access-Control-*` headers.
/// - Allowed preflight (`OPTIONS`): answered here with `204 No Content`.
/// - Allowed request: handled downstream, then decorated.
///
/// `"*"` is honored only when it is put on the list explicitly.
///
/// ```rust
/// use crmgate::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new(["https://crm.example.com"]);
/// assert!(cors.is_allowed("https://crm.example.com"));
/// assert!(!cors.is_allowed("https://evil.example.com"));
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    policy: Arc<Policy>,
}

#[derive(Debug)]
struct Policy {
    origins: Vec<String>,
    methods: String,
    headers: String,
}

impl CorsMiddleware {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            policy: Arc::new(Policy {
                origins: origins.into_iter().map(Into::into).collect(),
                methods: DEFAULT_ALLOWED_METHODS.join(", "),
                headers: DEFAULT_ALLOWED_HEADERS.join(", "),
            }),
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.policy.origins.iter().any(|o| o == "*" || o == origin)
    }

    fn allow_origin_value(&self, origin: &str) -> Option<String> {
        if self.policy.origins.iter().any(|o| o == "*") {
            Some("*".to_owned())
        } else if self.is_allowed(origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cors = self.clone();

        Box::pin(async move {
            let is_preflight = ctx.request().method() == &Method::Options;
            let Some(origin) = ctx.request().headers().get("origin").map(str::to_owned) else {
                return next.run(ctx).await;
            };

            let Some(allow_origin) = cors.allow_origin_value(&origin) else {
                if is_preflight {
                    tracing::warn!(origin = %origin, "preflight from origin outside the allow-list");
                    return Response::json(
                        StatusCode::Forbidden,
                        &serde_json::json!({ "error": "Origin not allowed" }),
                    );
                }
                return next.run(ctx).await;
            };

            let mut resp = if is_preflight {
                Response::new(StatusCode::NoContent).header("Access-Control-Max-Age", "3600")
            } else {
                next.run(ctx).await
            };

            if allow_origin != "*" {
                resp.add_header("Vary", "Origin");
            }
            resp.add_header("Access-Control-Allow-Origin", allow_origin);
            resp.add_header("Access-Control-Allow-Methods", cors.policy.methods.as_str());
            resp.add_header("Access-Control-Allow-Headers", cors.policy.headers.as_str());
            resp
        })
    }
}
