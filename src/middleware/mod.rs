//! Middleware layer.
//!
//! A middleware sees the request before the endpoint does and decides what
//! happens next:
//!
//! - call [`Next::run`] to continue the chain (possibly with a rewritten request),
//! - call [`Next::run_with_error`] to continue while handing error state to
//!   whoever comes later, or
//! - return its own [`Response`](crate::Response) and end the chain there.
//!
//! Middleware is attached per route through a [`Stack`]; layers run in the
//! order they were pushed.
//!
//! ```rust,no_run
//! use http::Method;
//! use serde_json::json;
//! use vetted::middleware::{self, Next, Stack};
//! use vetted::schema::JsonSchema;
//! use vetted::{Request, Response, Router};
//!
//! # fn app() -> Result<Router, vetted::Error> {
//! let user = JsonSchema::new(&json!({
//!     "type": "object",
//!     "properties": { "name": { "type": "string" } },
//!     "required": ["name"]
//! }))?;
//!
//! let stack = Stack::new()
//!     .push(middleware::from_fn(log_path))
//!     .push(middleware::process_request_body(user));
//!
//! Ok(Router::new().on_with(Method::POST, "/users", stack, create_user))
//! # }
//!
//! async fn log_path(req: Request, next: Next) -> Response {
//!     tracing::info!(path = req.path(), "incoming");
//!     next.run(req).await
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     Response::json_value(req.body())
//! }
//! ```
//!
//! Built-in middleware:
//! - [`process_request`] and friends: validate and rewrite params, query and body
//! - [`validate_request`] and friends: validate only, optionally forwarding failures

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::Request;
use crate::response::IntoResponse;

mod respond;
mod validate;

pub use respond::{send_error, send_errors, ErrorSender};
pub use validate::{
    process_request, process_request_body, process_request_params, process_request_query,
    validate_request, validate_request_body, validate_request_params, validate_request_query,
    DispatchOptions, RequestValidator, SchemaSet, Slot, SlotError, ValidationErrors,
};

/// A request interceptor.
///
/// Implement it on your own types, or wrap an async function with [`from_fn`].
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

// ── Next ──────────────────────────────────────────────────────────────────────

/// The rest of the chain: remaining middleware, then the endpoint.
///
/// Consumed by [`run`](Next::run) or [`run_with_error`](Next::run_with_error),
/// so a middleware can continue the chain at most once.
pub struct Next {
    layers: Arc<[BoxedMiddleware]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    /// Continues the chain with `req`.
    pub fn run(mut self, req: Request) -> BoxFuture {
        match self.layers.get(self.index).cloned() {
            Some(layer) => {
                self.index += 1;
                layer.handle(req, self)
            }
            None => self.endpoint.call(req),
        }
    }

    /// Continues the chain carrying `error` as chain error state.
    ///
    /// Downstream middleware and the endpoint read it with
    /// [`Request::chain_error`] and decide whether to answer or go on.
    pub fn run_with_error<E>(self, mut req: Request, error: E) -> BoxFuture
    where
        E: Clone + Send + Sync + 'static,
    {
        req.set_chain_error(error);
        self.run(req)
    }
}

// ── Stack ─────────────────────────────────────────────────────────────────────

/// An ordered list of middleware for one route.
#[derive(Clone, Default)]
pub struct Stack {
    layers: Vec<BoxedMiddleware>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer. Layers run in push order.
    pub fn push(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize { self.layers.len() }
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    /// Wraps `endpoint` so that calling it runs every layer first.
    pub(crate) fn wrap(self, endpoint: BoxedHandler) -> BoxedHandler {
        if self.layers.is_empty() {
            return endpoint;
        }
        Arc::new(Chain { layers: self.layers.into(), endpoint })
    }
}

struct Chain {
    layers: Arc<[BoxedMiddleware]>,
    endpoint: BoxedHandler,
}

impl ErasedHandler for Chain {
    fn call(&self, req: Request) -> BoxFuture {
        let next = Next {
            layers: Arc::clone(&self.layers),
            index: 0,
            endpoint: Arc::clone(&self.endpoint),
        };
        next.run(req)
    }
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// Turns `async fn(Request, Next) -> impl IntoResponse` into a [`Middleware`].
pub fn from_fn<F, Fut, R>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut, R> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self.0)(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::*;
    use crate::handler::Handler;
    use crate::response::Response;

    fn endpoint() -> BoxedHandler {
        (|req: Request| async move {
            let seen = req.chain_error::<String>().cloned().unwrap_or_default();
            Response::text(format!("{} {seen}", req.path()))
        })
        .into_boxed_handler()
    }

    struct Record(Arc<Mutex<Vec<&'static str>>>, &'static str);

    impl Middleware for Record {
        fn handle(&self, req: Request, next: Next) -> BoxFuture {
            self.0.lock().unwrap().push(self.1);
            next.run(req)
        }
    }

    #[tokio::test]
    async fn layers_run_in_push_order_before_the_endpoint() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Stack::new()
            .push(Record(Arc::clone(&log), "first"))
            .push(Record(Arc::clone(&log), "second"))
            .wrap(endpoint());

        let res = chain.call(Request::builder().uri("/x").empty()).await;
        assert_eq!(res.body(), b"/x ");
        assert_eq!(*log.lock().unwrap(), ["first", "second"]);
    }

    #[tokio::test]
    async fn a_layer_can_end_the_chain() {
        let chain = Stack::new()
            .push(from_fn(|_req: Request, _next: Next| async { StatusCode::FORBIDDEN }))
            .wrap(endpoint());

        let res = chain.call(Request::builder().empty()).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn run_with_error_is_visible_downstream() {
        let chain = Stack::new()
            .push(from_fn(|req: Request, next: Next| async move {
                next.run_with_error(req, "upstream said no".to_owned()).await
            }))
            .wrap(endpoint());

        let res = chain.call(Request::builder().uri("/y").empty()).await;
        assert_eq!(res.body(), b"/y upstream said no");
    }

    #[test]
    fn an_empty_stack_leaves_the_endpoint_unwrapped() {
        let endpoint = endpoint();
        let wrapped = Stack::new().wrap(Arc::clone(&endpoint));
        assert!(Arc::ptr_eq(&endpoint, &wrapped));
    }
}
