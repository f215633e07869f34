//! The schema capability the validation middleware consumes.
//!
//! A schema is anything that can look at a raw JSON value and either hand back
//! the parsed value or explain, field by field, why it could not. vetted does
//! not define a schema language. It adapts the ones you already have:
//!
//! | Adapter | Kind | Output |
//! |---|---|---|
//! | [`JsonSchema`] | plain | the input, unchanged |
//! | [`Typed<T>`] | transforming | `T` deserialized by serde, re-serialized |
//! | `Fn(&Value) -> ParseOutcome` | either | whatever the closure returns |
//!
//! Plain and transforming schemas share one trait, so the middleware never
//! needs to know which one it holds. Wrap any of them with
//! [`SchemaExt::preprocess`] or [`SchemaExt::transform`] to coerce input or
//! reshape output:
//!
//! ```rust
//! use serde_json::json;
//! use vetted::schema::{self, JsonSchema, Schema, SchemaExt};
//!
//! let id = JsonSchema::new(&json!({
//!     "type": "object",
//!     "properties": { "id": { "type": "integer" } },
//!     "required": ["id"]
//! }))
//! .unwrap()
//! .preprocess(schema::coerce::numbers(&["id"]));
//!
//! assert_eq!(id.attempt_parse(&json!({ "id": "42" })).unwrap(), json!({ "id": 42 }));
//! assert!(id.attempt_parse(&json!({ "id": "abc" })).is_err());
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

// ── Outcome types ─────────────────────────────────────────────────────────────

/// Result of running a schema over one value.
///
/// A slot either parses completely or fails completely; there is no partial
/// success.
pub type ParseOutcome<T = Value> = Result<T, SchemaIssues>;

/// One field-level problem reported by a schema.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Issue {
    /// JSON pointer to the offending field (`""` for the value itself).
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

/// Ordered field-level issues, exactly as the schema produced them.
///
/// Serializes as a bare JSON array of `{ "path", "message" }` objects.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SchemaIssues(Vec<Issue>);

impl SchemaIssues {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self(issues)
    }

    /// A single issue at `path`.
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![Issue::new(path, message)])
    }

    pub fn issues(&self) -> &[Issue] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl From<Vec<Issue>> for SchemaIssues {
    fn from(issues: Vec<Issue>) -> Self { Self(issues) }
}

impl fmt::Display for SchemaIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            if issue.path.is_empty() {
                f.write_str(&issue.message)?;
            } else {
                write!(f, "{}: {}", issue.path, issue.message)?;
            }
        }
        Ok(())
    }
}

// ── The capability ────────────────────────────────────────────────────────────

/// Parses or rejects one raw request part.
///
/// Implementations must be total: malformed input is reported through the
/// `Err` side of [`ParseOutcome`], never by panicking. They must also be free
/// of side effects, because a single schema is shared by every request the
/// middleware sees.
pub trait Schema: Send + Sync + 'static {
    fn attempt_parse(&self, value: &Value) -> ParseOutcome;
}

impl<F> Schema for F
where
    F: Fn(&Value) -> ParseOutcome + Send + Sync + 'static,
{
    fn attempt_parse(&self, value: &Value) -> ParseOutcome {
        self(value)
    }
}

// ── JSON Schema ───────────────────────────────────────────────────────────────

/// A plain schema backed by a compiled JSON Schema document.
///
/// On success the output is the input, untouched. On failure every violation
/// is reported, not only the first.
pub struct JsonSchema {
    validator: jsonschema::Validator,
}

impl JsonSchema {
    /// Compiles `schema`, picking the draft from its `$schema` keyword.
    pub fn new(schema: &Value) -> Result<Self, Error> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| Error::Schema(e.to_string()))?;
        Ok(Self { validator })
    }
}

impl Schema for JsonSchema {
    fn attempt_parse(&self, value: &Value) -> ParseOutcome {
        let issues: Vec<Issue> = self.validator
            .iter_errors(value)
            .map(|err| Issue::new(err.instance_path.to_string(), err.to_string()))
            .collect();

        if issues.is_empty() {
            Ok(value.clone())
        } else {
            Err(issues.into())
        }
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema").finish_non_exhaustive()
    }
}

// ── serde-typed ───────────────────────────────────────────────────────────────

/// A transforming schema: deserializes the raw value into `T`.
///
/// Whatever `T`'s `Deserialize` impl does (defaults, renames, custom
/// `deserialize_with` coercions) shows up in the output, which is `T`
/// serialized back to JSON. Read it downstream with
/// [`Request::body_as`](crate::Request::body_as) and friends.
pub struct Typed<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Serialize + 'static,
{
    fn attempt_parse(&self, value: &Value) -> ParseOutcome {
        let parsed = T::deserialize(value)
            .map_err(|e| SchemaIssues::single("", e.to_string()))?;
        serde_json::to_value(parsed)
            .map_err(|e| SchemaIssues::single("", e.to_string()))
    }
}

// ── Combinators ───────────────────────────────────────────────────────────────

/// Adapters available on every [`Schema`].
pub trait SchemaExt: Schema + Sized {
    /// Rewrites the raw input before `self` sees it.
    fn preprocess<F>(self, f: F) -> Preprocess<Self, F>
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Preprocess { inner: self, f }
    }

    /// Maps a successful output. `f` may still reject the value.
    fn transform<F>(self, f: F) -> Transform<Self, F>
    where
        F: Fn(Value) -> ParseOutcome + Send + Sync + 'static,
    {
        Transform { inner: self, f }
    }
}

impl<S: Schema> SchemaExt for S {}

/// See [`SchemaExt::preprocess`].
pub struct Preprocess<S, F> {
    inner: S,
    f: F,
}

impl<S, F> Schema for Preprocess<S, F>
where
    S: Schema,
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    fn attempt_parse(&self, value: &Value) -> ParseOutcome {
        self.inner.attempt_parse(&(self.f)(value))
    }
}

/// See [`SchemaExt::transform`].
pub struct Transform<S, F> {
    inner: S,
    f: F,
}

impl<S, F> Schema for Transform<S, F>
where
    S: Schema,
    F: Fn(Value) -> ParseOutcome + Send + Sync + 'static,
{
    fn attempt_parse(&self, value: &Value) -> ParseOutcome {
        self.inner.attempt_parse(value).and_then(&self.f)
    }
}

// ── Coercions ─────────────────────────────────────────────────────────────────

/// Ready-made input rewrites for [`SchemaExt::preprocess`].
///
/// Path parameters and query strings always arrive as strings. These turn the
/// named fields into what the schema actually wants, and leave anything that
/// does not convert alone so the schema can reject it with a proper message.
pub mod coerce {
    use serde_json::{Map, Number, Value};

    /// Parses the named string fields of an object as numbers.
    pub fn numbers(fields: &[&str]) -> impl Fn(&Value) -> Value + Send + Sync + 'static {
        let fields = owned(fields);
        move |value: &Value| rewrite(value, &fields, |s| {
            if let Ok(n) = s.parse::<i64>() {
                return Some(Value::from(n));
            }
            s.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
        })
    }

    /// Parses the named string fields of an object as booleans (`true`/`false`).
    pub fn booleans(fields: &[&str]) -> impl Fn(&Value) -> Value + Send + Sync + 'static {
        let fields = owned(fields);
        move |value: &Value| rewrite(value, &fields, |s| s.parse::<bool>().ok().map(Value::Bool))
    }

    fn owned(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| (*f).to_owned()).collect()
    }

    fn rewrite(value: &Value, fields: &[String], parse: impl Fn(&str) -> Option<Value>) -> Value {
        let Value::Object(map) = value else {
            return value.clone();
        };
        let out: Map<String, Value> = map.iter()
            .map(|(k, v)| {
                let converted = match v {
                    Value::String(s) if fields.contains(k) => parse(s.trim()),
                    _ => None,
                };
                (k.clone(), converted.unwrap_or_else(|| v.clone()))
            })
            .collect();
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;

    fn user_schema() -> JsonSchema {
        JsonSchema::new(&json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "minLength": 1 },
                "age":  { "type": "integer", "minimum": 0 }
            },
            "required": ["name", "age"]
        }))
        .unwrap()
    }

    #[test]
    fn json_schema_passes_valid_input_through() {
        let input = json!({ "name": "alice", "age": 30 });
        assert_eq!(user_schema().attempt_parse(&input).unwrap(), input);
    }

    #[test]
    fn json_schema_reports_every_violation_with_its_path() {
        let issues = user_schema()
            .attempt_parse(&json!({ "name": "", "age": -1 }))
            .unwrap_err();
        let paths: Vec<&str> = issues.issues().iter().map(|i| i.path.as_str()).collect();
        assert_eq!(issues.len(), 2);
        assert!(paths.contains(&"/name"));
        assert!(paths.contains(&"/age"));
    }

    #[test]
    fn invalid_schema_documents_are_rejected_up_front() {
        let err = JsonSchema::new(&json!({ "type": "not-a-type" })).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[derive(Deserialize, Serialize)]
    struct Page {
        #[serde(default = "default_size")]
        size: u32,
    }

    fn default_size() -> u32 { 20 }

    #[test]
    fn typed_schema_outputs_the_deserialized_shape() {
        let out = Typed::<Page>::new().attempt_parse(&json!({})).unwrap();
        assert_eq!(out, json!({ "size": 20 }));
    }

    #[test]
    fn typed_schema_failure_is_a_single_root_issue() {
        let issues = Typed::<Page>::new()
            .attempt_parse(&json!({ "size": "big" }))
            .unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues.issues()[0].path, "");
    }

    #[test]
    fn closures_are_schemas() {
        let even = |v: &Value| match v.as_i64() {
            Some(n) if n % 2 == 0 => Ok(v.clone()),
            _ => Err(SchemaIssues::single("", "expected an even number")),
        };
        assert!(even.attempt_parse(&json!(4)).is_ok());
        assert_eq!(
            even.attempt_parse(&json!(3)).unwrap_err().to_string(),
            "expected an even number",
        );
    }

    #[test]
    fn transform_maps_successful_output_only() {
        let upper = user_schema().transform(|mut v| {
            if let Some(name) = v["name"].as_str().map(str::to_uppercase) {
                v["name"] = Value::String(name);
            }
            Ok(v)
        });
        assert_eq!(
            upper.attempt_parse(&json!({ "name": "bob", "age": 1 })).unwrap(),
            json!({ "name": "BOB", "age": 1 }),
        );
        assert!(upper.attempt_parse(&json!({ "age": 1 })).is_err());
    }

    #[test]
    fn numeric_coercion_leaves_unconvertible_values_for_the_schema() {
        let coerce = coerce::numbers(&["id", "ratio"]);
        assert_eq!(
            coerce(&json!({ "id": "42", "ratio": "0.5", "name": "7" })),
            json!({ "id": 42, "ratio": 0.5, "name": "7" }),
        );
        assert_eq!(coerce(&json!({ "id": "abc" })), json!({ "id": "abc" }));
        assert_eq!(coerce(&json!("42")), json!("42"));
    }

    #[test]
    fn boolean_coercion() {
        let coerce = coerce::booleans(&["active"]);
        assert_eq!(coerce(&json!({ "active": "true" })), json!({ "active": true }));
        assert_eq!(coerce(&json!({ "active": "yes" })), json!({ "active": "yes" }));
    }

    #[test]
    fn issues_display_joins_paths_and_messages() {
        let issues = SchemaIssues::new(vec![
            Issue::new("/a", "bad"),
            Issue::new("", "worse"),
        ]);
        assert_eq!(issues.to_string(), "/a: bad; worse");
    }
}
