//! Middleware pipeline: ordered layers in front of the [`Router`].
//!
//! Each [`Middleware`] receives the [`Context`] and a [`Next`] cursor. It may
//! pass through, short-circuit with its own response, or decorate the
//! downstream response. When the cursor runs past the last layer the request
//! is dispatched to the router.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;
use uuid::Uuid;

use crate::{Request, Response, context::Context, router::Router};

/// Type-erased, cheaply-cloneable middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Wraps a [`Middleware`] implementation as a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Cursor into the remaining layers for one request. Consumed by [`Next::run`].
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
    endpoint: Arc<Router>,
}

impl Next {
    /// Runs the next layer, or the router once every layer has run.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => self.endpoint.dispatch(ctx).await,
        }
    }
}

/// A layer in the pipeline. Implementations must be `Send + Sync` because one
/// instance serves every connection task.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Middleware stack terminated by a router.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use crmgate::{Response, Router, StatusCode};
/// use crmgate::middleware::{LoggerMiddleware, Pipeline, from_middleware};
///
/// let mut router = Router::new();
/// router.get("/health", |_ctx| async { Response::new(StatusCode::Ok) });
/// let pipeline = Pipeline::new(router).layer(from_middleware(Arc::new(LoggerMiddleware)));
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    router: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self {
            middlewares: Arc::from(Vec::new()),
            router: Arc::new(router),
        }
    }

    /// Appends a layer. Layers run in the order they are added.
    #[must_use]
    pub fn layer(mut self, middleware: MiddlewareHandler) -> Self {
        let mut layers = self.middlewares.to_vec();
        layers.push(middleware);
        self.middlewares = layers.into();
        self
    }

    pub async fn handle(&self, request: Request) -> Response {
        let next = Next {
            middlewares: Arc::clone(&self.middlewares),
            index: 0,
            endpoint: Arc::clone(&self.router),
        };
        next.run(Context::new(request)).await
    }
}

/// Correlation id assigned to every request by [`LoggerMiddleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// Logs method, path, status, and duration for each request and tags the
/// response with an `X-Request-Id` header.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let request_id = Uuid::new_v4();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();
            ctx.extensions_mut().insert(RequestId(request_id));

            let mut response = next.run(ctx).await;

            tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request handled"
            );

            response.add_header("X-Request-Id", request_id.to_string());
            response
        })
    }
}
