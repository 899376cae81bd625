//! Request routing: map HTTP methods and URL patterns to handlers.
//!
//! | Pattern                  | Example match                 | Captured params                  |
//! |--------------------------|-------------------------------|----------------------------------|
//! | `/models`                | `/models`                     | *(none)*                         |
//! | `/customers/:id`         | `/customers/42`               | `id → "42"`                      |
//! | `/static/*`              | `/static/logo.png`            | `wildcard → "/logo.png"`         |
//!
//! Trailing slashes are normalized on both sides. Routes are tried in
//! registration order and the first match wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Anything callable as `Fn(Context) -> impl Future<Output = Response>`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    /// Compiles a pattern string. `/*` suffix makes a wildcard, any `:`
    /// makes a parameterized pattern, everything else matches exactly.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                let mut params = PathParams::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// Dispatches requests to registered handlers, answering 404 when nothing matches.
///
/// ```rust,no_run
/// use crmgate::context::Context;
/// use crmgate::{Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/health", |_ctx: Context| async { Response::new(StatusCode::Ok) });
/// router.delete("/customers/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Patch, path, handler);
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches a bare request.
    pub async fn route(&self, request: Request) -> Response {
        self.dispatch(Context::new(request)).await
    }

    /// Dispatches a context that middleware may already have decorated.
    pub async fn dispatch(&self, mut ctx: Context) -> Response {
        let matched = self.routes.iter().find_map(|route| {
            if &route.method != ctx.request().method() {
                return None;
            }
            route
                .pattern
                .matches(ctx.request().path())
                .map(|params| (route.handler.clone(), params))
        });

        match matched {
            Some((handler, params)) => {
                ctx.set_params(params);
                handler(ctx).await
            }
            None => Response::json(
                StatusCode::NotFound,
                &serde_json::json!({ "error": "Not Found" }),
            ),
        }
    }
}
