//! # vetted
//!
//! A minimal HTTP framework whose middleware checks every request part
//! against a schema before your handler runs.
//!
//! ## The contract
//!
//! A route can declare schemas for three parts of the request: path
//! **params**, the **query** string, and the **body**. Every declared part is
//! checked, in that order, and all failures are reported together:
//!
//! ```json
//! HTTP/1.1 400 Bad Request
//!
//! [
//!   { "type": "Params", "errors": [{ "path": "/id", "message": "\"abc\" is not of type \"integer\"" }] },
//!   { "type": "Body",   "errors": [{ "path": "",    "message": "\"name\" is a required property" }] }
//! ]
//! ```
//!
//! When everything passes, [`process_request`](middleware::process_request)
//! swaps each part for the parsed value (so `"42"` arrives as `42`) and calls
//! your handler. [`validate_request`](middleware::validate_request) only gates,
//! and can hand the failures to your handler instead of answering itself.
//!
//! Schemas are whatever implements [`schema::Schema`]: a compiled JSON Schema
//! document, a serde type, or a closure.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::Method;
//! use serde_json::json;
//! use vetted::middleware::{self, SchemaSet, Stack};
//! use vetted::schema::{self, JsonSchema, SchemaExt};
//! use vetted::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vetted::Error> {
//!     let params = JsonSchema::new(&json!({
//!         "type": "object",
//!         "properties": { "id": { "type": "integer" } },
//!         "required": ["id"]
//!     }))?
//!     .preprocess(schema::coerce::numbers(&["id"]));
//!
//!     let app = Router::new().on_with(
//!         Method::GET,
//!         "/users/{id}",
//!         Stack::new().push(middleware::process_request(SchemaSet::new().params(params))),
//!         get_user,
//!     );
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     // Already an integer: the middleware rewrote params.
//!     Response::json_value(&json!({ "id": req.params()["id"] }))
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;
pub mod schema;

pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use request::{Request, RequestBuilder};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{DEFAULT_BODY_LIMIT, Server};
