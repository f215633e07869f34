//! Incoming HTTP request type.
//!
//! Besides the raw pieces (method, path, headers, body bytes) a [`Request`]
//! carries the three *parts* validation middleware works on, each as a JSON
//! value:
//!
//! | Part | Initial value |
//! |---|---|
//! | params | object of path parameters, all strings |
//! | query | object decoded from the query string; repeated keys become arrays |
//! | body | decoded by `content-type`: JSON, form, text, or `null` when empty |
//!
//! Middleware may replace a part wholesale (see
//! [`process_request`](crate::middleware::process_request)); everything
//! downstream then sees the replacement.

use std::collections::HashMap;

use bytes::Bytes;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// An incoming HTTP request.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) raw_body: Bytes,
    pub(crate) params: Value,
    pub(crate) query: Value,
    pub(crate) body: Value,
    pub(crate) extensions: Extensions,
}

/// Error state handed down the chain by [`Next::run_with_error`](crate::middleware::Next::run_with_error).
#[derive(Clone)]
struct ChainError<E>(E);

impl Request {
    pub(crate) fn new(
        method: Method,
        path: String,
        query: Option<&str>,
        headers: HeaderMap,
        raw_body: Bytes,
    ) -> Self {
        let body = decode_body(&headers, &raw_body);
        Self {
            method,
            path,
            headers,
            raw_body,
            params: Value::Object(Map::new()),
            query: decode_query(query.unwrap_or_default()),
            body,
            extensions: Extensions::new(),
        }
    }

    /// Builder for requests constructed by hand, e.g. in handler tests.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// The body bytes exactly as received.
    pub fn raw_body(&self) -> &[u8] { &self.raw_body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter if it is (still) a string.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns
    /// `Some("42")`. After a coercing middleware has run the value may be a
    /// number; read it through [`params`](Self::params) instead.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn params(&self) -> &Value { &self.params }
    pub fn query(&self) -> &Value { &self.query }
    pub fn body(&self) -> &Value { &self.body }

    pub fn set_params(&mut self, params: Value) { self.params = params; }
    pub fn set_query(&mut self, query: Value) { self.query = query; }
    pub fn set_body(&mut self, body: Value) { self.body = body; }

    /// Deserializes the params part into `T`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.params)
    }

    /// Deserializes the query part into `T`.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.query)
    }

    /// Deserializes the body part into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Error state passed down by an earlier middleware, if any of type `E`.
    ///
    /// `Some` means the upstream middleware chose to delegate the decision to
    /// you; the value may still be "empty" (e.g. a list with no entries).
    pub fn chain_error<E: Clone + Send + Sync + 'static>(&self) -> Option<&E> {
        self.extensions.get::<ChainError<E>>().map(|e| &e.0)
    }

    pub(crate) fn set_chain_error<E: Clone + Send + Sync + 'static>(&mut self, error: E) {
        self.extensions.insert(ChainError(error));
    }

    pub(crate) fn set_route_params(&mut self, params: HashMap<String, String>) {
        let map: Map<String, Value> = params.into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        self.params = Value::Object(map);
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`]. Defaults to `GET /` with no body.
///
/// ```rust
/// use http::Method;
/// use serde_json::json;
/// use vetted::Request;
///
/// let req = Request::builder()
///     .method(Method::POST)
///     .uri("/users?notify=true")
///     .json(&json!({ "name": "alice" }));
///
/// assert_eq!(req.query(), &json!({ "notify": "true" }));
/// assert_eq!(req.body(), &json!({ "name": "alice" }));
/// ```
#[derive(Default)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    params: HashMap<String, String>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path plus optional query string, e.g. `/users?page=2`.
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_owned();
        self
    }

    /// Adds a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets a path parameter, as the router would after matching.
    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: &Value) -> Request {
        self.header("content-type", "application/json")
            .bytes(body.to_string().into_bytes())
    }

    /// Terminate with raw body bytes, decoded per the `content-type` header.
    pub fn bytes(self, body: impl Into<Bytes>) -> Request {
        let (path, query) = match self.uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (self.uri.as_str(), None),
        };
        let path = if path.is_empty() { "/" } else { path };
        let mut req = Request::new(
            self.method,
            path.to_owned(),
            query,
            self.headers,
            body.into(),
        );
        req.set_route_params(self.params);
        req
    }

    /// Terminate with no body.
    pub fn empty(self) -> Request {
        self.bytes(Bytes::new())
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

fn decode_query(query: &str) -> Value {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    pairs_to_object(pairs)
}

/// Repeated keys collect into an array, in order of appearance.
fn pairs_to_object(pairs: Vec<(String, String)>) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    Value::Object(map)
}

fn decode_body(headers: &HeaderMap, raw: &[u8]) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    let content_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let text = || Value::String(String::from_utf8_lossy(raw).into_owned());

    if content_type.starts_with("application/json") || content_type.contains("+json") {
        // Malformed JSON stays visible as text so a body schema can reject it.
        serde_json::from_slice(raw).unwrap_or_else(|_| text())
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(raw)
            .map(pairs_to_object)
            .unwrap_or_else(|_| text())
    } else {
        text()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[test]
    fn query_strings_decode_into_objects_with_repeated_keys_as_arrays() {
        let req = Request::builder().uri("/search?q=rust&tag=a&tag=b&tag=c").empty();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), &json!({ "q": "rust", "tag": ["a", "b", "c"] }));
    }

    #[test]
    fn missing_query_is_an_empty_object() {
        let req = Request::builder().uri("/").empty();
        assert_eq!(req.query(), &json!({}));
    }

    #[test]
    fn bodies_decode_by_content_type() {
        let form = Request::builder()
            .header("content-type", "application/x-www-form-urlencoded")
            .bytes("name=alice&age=30");
        assert_eq!(form.body(), &json!({ "name": "alice", "age": "30" }));

        let text = Request::builder().header("content-type", "text/plain").bytes("hi");
        assert_eq!(text.body(), &json!("hi"));

        let empty = Request::builder().empty();
        assert_eq!(empty.body(), &Value::Null);
    }

    #[test]
    fn malformed_json_is_kept_as_text() {
        let req = Request::builder()
            .header("content-type", "application/json")
            .bytes("{not json");
        assert_eq!(req.body(), &json!("{not json"));
        assert_eq!(req.raw_body(), b"{not json");
    }

    #[test]
    fn params_are_strings_until_replaced() {
        let mut req = Request::builder().param("id", "42").empty();
        assert_eq!(req.param("id"), Some("42"));

        req.set_params(json!({ "id": 42 }));
        assert_eq!(req.param("id"), None);
        assert_eq!(req.params()["id"], json!(42));
    }

    #[test]
    fn typed_accessors_deserialize_parts() {
        #[derive(Deserialize)]
        struct User { name: String }

        let req = Request::builder().json(&json!({ "name": "alice" }));
        let user: User = req.body_as().unwrap();
        assert_eq!(user.name, "alice");
        assert!(req.params_as::<User>().is_err());
    }

    #[test]
    fn chain_error_is_typed() {
        let mut req = Request::builder().empty();
        assert!(req.chain_error::<Vec<u8>>().is_none());

        req.set_chain_error(vec![1u8, 2]);
        assert_eq!(req.chain_error::<Vec<u8>>(), Some(&vec![1, 2]));
        assert!(req.chain_error::<String>().is_none());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::builder().header("X-Request-Id", "abc").empty();
        assert_eq!(req.header("x-request-id"), Some("abc"));
    }
}
