//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. A route is a path, an
//! endpoint, and optionally the [`Stack`] of middleware that guards it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::Stack;
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register an endpoint for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and land in
    /// [`Request::params`] as strings:
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use vetted::{Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, Stack::new(), handler)
    }

    /// Register an endpoint guarded by `stack`, which runs first, in order.
    pub fn on_with(self, method: Method, path: &str, stack: Stack, handler: impl Handler) -> Self {
        self.add(method, path, stack, handler)
    }

    fn add(mut self, method: Method, path: &str, stack: Stack, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, stack.wrap(handler.into_boxed_handler()))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Routes one request through its middleware and endpoint.
    ///
    /// `404 Not Found` when nothing matches.
    pub async fn handle(&self, mut req: Request) -> Response {
        match self.lookup(&req.method, &req.path) {
            Some((handler, params)) => {
                req.set_route_params(params);
                handler.call(req).await
            }
            None => Response::status(StatusCode::NOT_FOUND),
        }
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), decode_segment(v)))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// Percent-decodes a matched segment. Sequences that do not decode to UTF-8
/// leave the segment as received.
fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_owned())
}
