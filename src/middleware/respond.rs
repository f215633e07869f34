//! Default error responses for rejected requests.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;

use super::validate::{SlotError, ValidationErrors};
use crate::response::Response;

/// `400 Bad Request` with every failing slot, in evaluation order:
///
/// ```json
/// [
///   { "type": "Params", "errors": [{ "path": "/id", "message": "…" }] },
///   { "type": "Body",   "errors": [{ "path": "",    "message": "…" }] }
/// ]
/// ```
pub fn send_errors(errors: &ValidationErrors) -> Response {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .json_value(errors)
}

/// `400 Bad Request` with a single `{ "type", "errors" }` object, no array.
pub fn send_error(error: &SlotError) -> Response {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .json_value(error)
}

/// How a rejecting validator turns its failures into a response.
#[derive(Clone, Default)]
pub enum ErrorSender {
    /// [`send_errors`]: the complete ordered list.
    #[default]
    List,
    /// [`send_error`] for validators with a single configured slot, where a
    /// wrapping array carries no information.
    ///
    /// [`validate_request`](super::validate_request) replaces it with
    /// [`List`](Self::List) when more than one slot is configured.
    Single,
    /// Your own formatter. Always receives the complete ordered list.
    Custom(Arc<dyn Fn(&ValidationErrors) -> Response + Send + Sync>),
}

impl ErrorSender {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ValidationErrors) -> Response + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub(crate) fn send(&self, errors: &ValidationErrors) -> Response {
        match self {
            Self::List => send_errors(errors),
            Self::Single => match errors.as_slice() {
                [only] => send_error(only),
                _ => send_errors(errors),
            },
            Self::Custom(f) => f(errors),
        }
    }
}

impl fmt::Debug for ErrorSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => f.write_str("List"),
            Self::Single => f.write_str("Single"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::middleware::Slot;
    use crate::schema::SchemaIssues;

    fn failure(slot: Slot) -> SlotError {
        SlotError::new(slot, SchemaIssues::single("/x", "required"))
    }

    fn body_json(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[test]
    fn list_sender_wraps_even_a_single_failure() {
        let errors = ValidationErrors::from(vec![failure(Slot::Query)]);
        let res = ErrorSender::List.send(&errors);
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(&res),
            json!([{ "type": "Query", "errors": [{ "path": "/x", "message": "required" }] }]),
        );
    }

    #[test]
    fn single_sender_unwraps_one_failure_only() {
        let one = ValidationErrors::from(vec![failure(Slot::Body)]);
        assert_eq!(body_json(&ErrorSender::Single.send(&one))["type"], "Body");

        let two = ValidationErrors::from(vec![failure(Slot::Params), failure(Slot::Body)]);
        let res = ErrorSender::Single.send(&two);
        assert_eq!(body_json(&res).as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn custom_sender_sees_the_whole_list() {
        let sender = ErrorSender::custom(|errors| {
            Response::builder()
                .status(StatusCode::UNPROCESSABLE_ENTITY)
                .text(format!("{} slots failed", errors.len()))
        });
        let errors = ValidationErrors::from(vec![failure(Slot::Params), failure(Slot::Query)]);
        let res = sender.send(&errors);
        assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.body(), b"2 slots failed");
    }
}
