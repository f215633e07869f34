//! Minimal vetted example — validated JSON endpoints.
//!
//! Run with:
//!   RUST_LOG=vetted=trace,info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl http://localhost:3000/users/abc
//!   curl -X POST 'http://localhost:3000/users?notify=true' \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","age":30}'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"age":-1}'
//!   curl 'http://localhost:3000/search'

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use vetted::middleware::{self, DispatchOptions, SchemaSet, Stack, ValidationErrors};
use vetted::schema::{self, JsonSchema, SchemaExt, Typed};
use vetted::{Request, Response, Router, Server};

#[derive(Deserialize, Serialize)]
struct CreateUser {
    name: String,
    #[serde(default)]
    age: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), vetted::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let user_id = JsonSchema::new(&json!({
        "type": "object",
        "properties": { "id": { "type": "integer", "minimum": 1 } },
        "required": ["id"]
    }))?
    .preprocess(schema::coerce::numbers(&["id"]));

    let notify = JsonSchema::new(&json!({
        "type": "object",
        "properties": { "notify": { "type": "boolean" } }
    }))?
    .preprocess(schema::coerce::booleans(&["notify"]));

    let search = JsonSchema::new(&json!({
        "type": "object",
        "properties": { "q": { "type": "string", "minLength": 1 } },
        "required": ["q"]
    }))?;

    let app = Router::new()
        .on_with(
            Method::GET,
            "/users/{id}",
            Stack::new().push(middleware::process_request_params(user_id)),
            get_user,
        )
        .on_with(
            Method::POST,
            "/users",
            Stack::new().push(middleware::process_request(
                SchemaSet::new().query(notify).body(Typed::<CreateUser>::new()),
            )),
            create_user,
        )
        .on_with(
            Method::GET,
            "/search",
            Stack::new().push(middleware::validate_request(
                SchemaSet::new().query(search),
                DispatchOptions::new().forward_to_next(),
            )),
            search_users,
        );

    Server::bind("0.0.0.0:3000")
        .body_limit(64 * 1024)
        .serve(app)
        .await
}

// GET /users/{id} — `id` is a number by the time we get here.
async fn get_user(req: Request) -> Response {
    Response::json_value(&json!({ "id": req.params()["id"], "name": "alice" }))
}

// POST /users — body parsed into `CreateUser`, query `notify` coerced to bool.
async fn create_user(req: Request) -> Response {
    let Ok(user) = req.body_as::<CreateUser>() else {
        return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
    };
    let notify = req.query()["notify"].as_bool().unwrap_or(false);

    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json_value(&json!({ "id": 99, "name": user.name, "age": user.age, "notified": notify }))
}

// GET /search — failures are forwarded; this handler decides what to do.
async fn search_users(req: Request) -> Response {
    match req.chain_error::<ValidationErrors>() {
        Some(errors) if !errors.is_empty() => Response::json_value(&json!({ "results": [] })),
        _ => Response::json_value(&json!({ "results": [req.query()["q"]] })),
    }
}
