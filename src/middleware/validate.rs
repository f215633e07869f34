//! Schema validation for params, query and body.
//!
//! A [`RequestValidator`] holds up to one [`Schema`] per request part
//! ([`Slot`]). On every request it runs each configured schema in the fixed
//! order params, query, body, never stopping at the first failure, and then
//! dispatches once on the collected [`ValidationErrors`].
//!
//! Two modes, fixed when the middleware is built:
//!
//! | Constructor | Rewrites request | On failure |
//! |---|---|---|
//! | [`process_request`] | yes, each part that parsed | `400`, chain ends |
//! | [`validate_request`] | no | `400` via the [`ErrorSender`], chain ends; or, with [`DispatchOptions::forward_to_next`], the chain continues carrying the errors |
//!
//! ```rust
//! use serde_json::json;
//! use vetted::middleware::{self, SchemaSet};
//! use vetted::schema::{self, JsonSchema, SchemaExt};
//!
//! # fn main() -> Result<(), vetted::Error> {
//! let params = JsonSchema::new(&json!({
//!     "type": "object",
//!     "properties": { "id": { "type": "integer", "minimum": 1 } },
//!     "required": ["id"]
//! }))?
//! .preprocess(schema::coerce::numbers(&["id"]));
//!
//! let body = JsonSchema::new(&json!({ "type": "object" }))?;
//!
//! let validator = middleware::process_request(SchemaSet::new().params(params).body(body));
//! # let _ = validator;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::respond::{send_errors, ErrorSender};
use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::schema::{ParseOutcome, Schema, SchemaIssues};

// ── Slots and failures ────────────────────────────────────────────────────────

/// A request part subject to validation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Slot {
    Params,
    Query,
    Body,
}

impl Slot {
    /// Evaluation order.
    pub const ALL: [Slot; 3] = [Slot::Params, Slot::Query, Slot::Body];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Params => "Params",
            Self::Query  => "Query",
            Self::Body   => "Body",
        }
    }

    fn part(self, req: &Request) -> &Value {
        match self {
            Self::Params => req.params(),
            Self::Query  => req.query(),
            Self::Body   => req.body(),
        }
    }

    fn replace(self, req: &mut Request, value: Value) {
        match self {
            Self::Params => req.set_params(value),
            Self::Query  => req.set_query(value),
            Self::Body   => req.set_body(value),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slot's failure: which part, and the schema's issues verbatim.
///
/// Serializes as `{ "type": "Params" | "Query" | "Body", "errors": [...] }`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SlotError {
    #[serde(rename = "type")]
    pub slot: Slot,
    pub errors: SchemaIssues,
}

impl SlotError {
    pub fn new(slot: Slot, errors: SchemaIssues) -> Self {
        Self { slot, errors }
    }
}

/// Every failing slot of one request, in evaluation order, at most one per slot.
///
/// This is the error state [`validate_request`] hands down the chain when
/// forwarding; read it with `req.chain_error::<ValidationErrors>()`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<SlotError>);

impl ValidationErrors {
    pub fn as_slice(&self) -> &[SlotError] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// The failure recorded for `slot`, if any.
    pub fn get(&self, slot: Slot) -> Option<&SlotError> {
        self.0.iter().find(|e| e.slot == slot)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SlotError> {
        self.0.iter()
    }

    fn push(&mut self, error: SlotError) {
        self.0.push(error);
    }
}

impl From<Vec<SlotError>> for ValidationErrors {
    fn from(errors: Vec<SlotError>) -> Self { Self(errors) }
}

impl IntoIterator for ValidationErrors {
    type Item = SlotError;
    type IntoIter = std::vec::IntoIter<SlotError>;

    fn into_iter(self) -> Self::IntoIter { self.0.into_iter() }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a SlotError;
    type IntoIter = std::slice::Iter<'a, SlotError>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

// ── SchemaSet ─────────────────────────────────────────────────────────────────

type BoxedSchema = Arc<dyn Schema>;

/// Up to one schema per slot. Plain and transforming schemas mix freely.
#[derive(Clone, Default)]
pub struct SchemaSet {
    params: Option<BoxedSchema>,
    query: Option<BoxedSchema>,
    body: Option<BoxedSchema>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, schema: impl Schema) -> Self {
        self.params = Some(Arc::new(schema));
        self
    }

    pub fn query(mut self, schema: impl Schema) -> Self {
        self.query = Some(Arc::new(schema));
        self
    }

    pub fn body(mut self, schema: impl Schema) -> Self {
        self.body = Some(Arc::new(schema));
        self
    }

    /// A set with only `slot` populated.
    pub fn only(slot: Slot, schema: impl Schema) -> Self {
        match slot {
            Slot::Params => Self::new().params(schema),
            Slot::Query  => Self::new().query(schema),
            Slot::Body   => Self::new().body(schema),
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&dyn Schema> {
        match slot {
            Slot::Params => self.params.as_deref(),
            Slot::Query  => self.query.as_deref(),
            Slot::Body   => self.body.as_deref(),
        }
    }

    /// Configured slots, in evaluation order.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        Slot::ALL.into_iter().filter(move |slot| self.get(*slot).is_some())
    }

    /// Runs every configured schema against `req`.
    ///
    /// With `rewrite` set, each slot that parses is replaced in `req` by the
    /// schema's output before the next slot runs; failing slots are left as
    /// they were. Unconfigured slots are skipped.
    pub fn run(&self, req: &mut Request, rewrite: bool) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        for slot in Slot::ALL {
            let Some(schema) = self.get(slot) else {
                continue;
            };
            let outcome: ParseOutcome = schema.attempt_parse(slot.part(req));
            match outcome {
                Ok(parsed) if rewrite => slot.replace(req, parsed),
                Ok(_) => {}
                Err(issues) => errors.push(SlotError::new(slot, issues)),
            }
        }
        errors
    }
}

impl fmt::Debug for SchemaSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots()).finish()
    }
}

// ── Dispatch options ──────────────────────────────────────────────────────────

/// What [`validate_request`] does with its failures.
///
/// ```rust
/// use vetted::middleware::{DispatchOptions, ErrorSender};
///
/// let respond = DispatchOptions::new().single_error();
/// let forward = DispatchOptions::new().forward_to_next();
/// # let _ = (respond, forward, ErrorSender::List);
/// ```
#[derive(Clone, Debug, Default)]
pub struct DispatchOptions {
    forward_to_next: bool,
    error_sender: ErrorSender,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never answer; always continue the chain with the (possibly empty)
    /// [`ValidationErrors`] as chain error state.
    pub fn forward_to_next(mut self) -> Self {
        self.forward_to_next = true;
        self
    }

    /// Formatter used when the chain is terminated. Ignored when forwarding.
    pub fn error_sender(mut self, sender: ErrorSender) -> Self {
        self.error_sender = sender;
        self
    }

    /// Shorthand for `error_sender(ErrorSender::Single)`.
    ///
    /// Only honoured when the [`SchemaSet`] has exactly one configured slot;
    /// with more, the validator keeps the list shape so every rejection from
    /// one endpoint looks the same.
    pub fn single_error(self) -> Self {
        self.error_sender(ErrorSender::Single)
    }
}

/// The dispatch policy, settled at construction.
#[derive(Clone, Debug)]
enum Dispatch {
    /// Rewrite parsed parts; reject with the default list responder.
    Process,
    /// Leave the request alone; reject through `ErrorSender`.
    Respond(ErrorSender),
    /// Leave the request alone; always continue with the errors attached.
    Forward,
}

// ── RequestValidator ──────────────────────────────────────────────────────────

/// The validation middleware. Build one with [`process_request`] or
/// [`validate_request`] (or a per-slot shorthand) and push it onto a
/// [`Stack`](super::Stack).
///
/// Immutable after construction and shared by all requests on the route.
#[derive(Clone, Debug)]
pub struct RequestValidator {
    schemas: Arc<SchemaSet>,
    dispatch: Dispatch,
}

impl RequestValidator {
    fn new(schemas: SchemaSet, dispatch: Dispatch) -> Self {
        Self { schemas: Arc::new(schemas), dispatch }
    }

    pub fn schemas(&self) -> &SchemaSet { &self.schemas }

    /// Whether a passing request is rewritten with the parsed parts.
    pub fn rewrites(&self) -> bool {
        matches!(self.dispatch, Dispatch::Process)
    }
}

impl Middleware for RequestValidator {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let errors = self.schemas.run(&mut req, self.rewrites());

        match &self.dispatch {
            Dispatch::Forward => {
                trace!(failed = errors.len(), "forwarding validation outcome");
                next.run_with_error(req, errors)
            }
            _ if errors.is_empty() => next.run(req),
            Dispatch::Process => {
                trace!(failed = errors.len(), "rejecting request");
                let res = send_errors(&errors);
                Box::pin(async move { res })
            }
            Dispatch::Respond(sender) => {
                trace!(failed = errors.len(), "rejecting request");
                let res = sender.send(&errors);
                Box::pin(async move { res })
            }
        }
    }
}

// ── Constructors ──────────────────────────────────────────────────────────────

/// Validates every configured slot and rewrites the request with the parsed
/// values. Any failure ends the chain with `400` and the full error list.
pub fn process_request(schemas: SchemaSet) -> RequestValidator {
    RequestValidator::new(schemas, Dispatch::Process)
}

/// [`process_request`] with only a params schema.
pub fn process_request_params(schema: impl Schema) -> RequestValidator {
    process_request(SchemaSet::only(Slot::Params, schema))
}

/// [`process_request`] with only a query schema.
pub fn process_request_query(schema: impl Schema) -> RequestValidator {
    process_request(SchemaSet::only(Slot::Query, schema))
}

/// [`process_request`] with only a body schema.
pub fn process_request_body(schema: impl Schema) -> RequestValidator {
    process_request(SchemaSet::only(Slot::Body, schema))
}

/// Validates every configured slot without touching the request.
///
/// By default a failure ends the chain with the configured [`ErrorSender`].
/// With [`DispatchOptions::forward_to_next`] the chain always continues and
/// the [`ValidationErrors`], empty or not, ride along as chain error state.
///
/// [`ErrorSender::Single`] falls back to [`ErrorSender::List`] unless exactly
/// one slot is configured.
pub fn validate_request(schemas: SchemaSet, options: DispatchOptions) -> RequestValidator {
    let dispatch = match options.error_sender {
        _ if options.forward_to_next => Dispatch::Forward,
        ErrorSender::Single if schemas.slots().count() != 1 => {
            Dispatch::Respond(ErrorSender::List)
        }
        sender => Dispatch::Respond(sender),
    };
    RequestValidator::new(schemas, dispatch)
}

/// [`validate_request`] with only a params schema and default options.
pub fn validate_request_params(schema: impl Schema) -> RequestValidator {
    validate_request(SchemaSet::only(Slot::Params, schema), DispatchOptions::default())
}

/// [`validate_request`] with only a query schema and default options.
pub fn validate_request_query(schema: impl Schema) -> RequestValidator {
    validate_request(SchemaSet::only(Slot::Query, schema), DispatchOptions::default())
}

/// [`validate_request`] with only a body schema and default options.
pub fn validate_request_body(schema: impl Schema) -> RequestValidator {
    validate_request(SchemaSet::only(Slot::Body, schema), DispatchOptions::default())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn reject(message: &'static str) -> impl Schema {
        move |_: &Value| -> ParseOutcome { Err(SchemaIssues::single("", message)) }
    }

    fn constant(value: Value) -> impl Schema {
        move |_: &Value| -> ParseOutcome { Ok(value.clone()) }
    }

    #[test]
    fn slots_serialize_by_name() {
        let err = SlotError::new(Slot::Params, SchemaIssues::single("/id", "bad"));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "type": "Params", "errors": [{ "path": "/id", "message": "bad" }] }),
        );
    }

    #[test]
    fn run_collects_failures_in_order_without_short_circuit() {
        let set = SchemaSet::new()
            .body(reject("body"))
            .query(constant(json!({ "ok": true })))
            .params(reject("params"));
        let mut req = Request::builder().empty();

        let errors = set.run(&mut req, true);
        let slots: Vec<Slot> = errors.iter().map(|e| e.slot).collect();
        assert_eq!(slots, [Slot::Params, Slot::Body]);
        assert_eq!(req.query(), &json!({ "ok": true }));
    }

    #[test]
    fn run_without_rewrite_leaves_the_request_alone() {
        let set = SchemaSet::new().body(constant(json!("parsed")));
        let mut req = Request::builder().json(&json!({ "raw": 1 }));

        assert!(set.run(&mut req, false).is_empty());
        assert_eq!(req.body(), &json!({ "raw": 1 }));
    }

    #[test]
    fn failing_slots_are_not_rewritten() {
        let set = SchemaSet::new().params(reject("nope"));
        let mut req = Request::builder().param("id", "x").empty();

        let errors = set.run(&mut req, true);
        assert_eq!(errors.len(), 1);
        assert_eq!(req.params(), &json!({ "id": "x" }));
    }

    #[test]
    fn each_schema_sees_its_own_part() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |seen: Arc<Mutex<Vec<Value>>>| {
            move |v: &Value| -> ParseOutcome {
                seen.lock().unwrap().push(v.clone());
                Ok(v.clone())
            }
        };
        let set = SchemaSet::new()
            .params(record(Arc::clone(&seen)))
            .query(record(Arc::clone(&seen)))
            .body(record(Arc::clone(&seen)));
        let mut req = Request::builder()
            .uri("/?q=1")
            .param("id", "7")
            .json(&json!([1, 2]));

        set.run(&mut req, true);
        assert_eq!(
            *seen.lock().unwrap(),
            [json!({ "id": "7" }), json!({ "q": "1" }), json!([1, 2])],
        );
    }

    #[test]
    fn unconfigured_slots_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let set = SchemaSet::new().query(move |v: &Value| -> ParseOutcome {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(v.clone())
        });

        assert_eq!(set.slots().collect::<Vec<_>>(), [Slot::Query]);
        let mut req = Request::builder().param("id", "1").json(&json!({ "a": 1 }));
        assert!(set.run(&mut req, true).is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(req.params(), &json!({ "id": "1" }));
        assert_eq!(req.body(), &json!({ "a": 1 }));
    }

    #[test]
    fn single_slot_constructors_populate_one_slot() {
        let cases = [
            (process_request_params(constant(Value::Null)), Slot::Params, true),
            (process_request_query(constant(Value::Null)), Slot::Query, true),
            (process_request_body(constant(Value::Null)), Slot::Body, true),
            (validate_request_params(constant(Value::Null)), Slot::Params, false),
            (validate_request_query(constant(Value::Null)), Slot::Query, false),
            (validate_request_body(constant(Value::Null)), Slot::Body, false),
        ];
        for (validator, slot, rewrites) in cases {
            assert_eq!(validator.schemas().slots().collect::<Vec<_>>(), [slot]);
            assert_eq!(validator.rewrites(), rewrites);
        }
    }

    #[test]
    fn single_error_needs_exactly_one_configured_slot() {
        let sender = |v: &RequestValidator| match &v.dispatch {
            Dispatch::Respond(sender) => format!("{sender:?}"),
            other => format!("{other:?}"),
        };

        let one = validate_request(
            SchemaSet::new().body(reject("b")),
            DispatchOptions::new().single_error(),
        );
        assert_eq!(sender(&one), "Single");

        let two = validate_request(
            SchemaSet::new().params(reject("p")).body(reject("b")),
            DispatchOptions::new().single_error(),
        );
        assert_eq!(sender(&two), "List");
    }

    #[test]
    fn validation_errors_lookup_by_slot() {
        let errors = ValidationErrors::from(vec![
            SlotError::new(Slot::Query, SchemaIssues::single("", "q")),
        ]);
        assert!(errors.get(Slot::Params).is_none());
        assert_eq!(errors.get(Slot::Query).map(|e| e.errors.to_string()), Some("q".into()));
    }
}
