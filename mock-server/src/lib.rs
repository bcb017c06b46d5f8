use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Multipart, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse},
    routing::{any, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Uses per feature allowed without a subscription.
pub const FREE_LIMIT: u32 = 3;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Clone, Debug, Default)]
pub struct UserState {
    pub usage: HashMap<String, u32>,
    pub plan: Option<String>,
}

pub type Db = Arc<RwLock<HashMap<String, UserState>>>;

type Failure = (StatusCode, Json<Value>);

/// Header value as UTF-8. `HeaderValue::to_str` only accepts visible ASCII,
/// which would turn non-ASCII identities into missing ones.
fn header_text(value: &HeaderValue) -> Option<&str> {
    std::str::from_utf8(value.as_bytes()).ok()
}

fn failure(status: StatusCode, error: impl Into<String>) -> Failure {
    (status, Json(json!({ "success": false, "error": error.into() })))
}

/// Caller identity taken from the `X-User-ID` header.
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = Failure;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(header_text)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "X-User-ID header is required"))
    }
}

#[derive(Deserialize)]
pub struct FeatureBody {
    pub feature: Option<String>,
    #[serde(default)]
    pub input_size: u64,
    pub usage_type: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateOrder {
    pub user_id: Option<String>,
    pub plan: Option<String>,
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    let api = Router::new()
        .route("/solve/", post(solve))
        .route("/usage/check/", post(check_usage))
        .route("/usage/record/", post(record_usage))
        .route("/subscriptions/create/", post(create_subscription))
        .route("/subscriptions/status/", get(subscription_status))
        .route("/health/", get(health))
        .route("/maintenance/", get(maintenance))
        .route("/debug/echo/", any(echo));
    Router::new().nest("/api", api).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Answer for the handful of arithmetic questions the mock understands.
pub fn answer_for(question: &str) -> String {
    let expr = question
        .trim()
        .trim_start_matches("What is")
        .trim_end_matches('?')
        .trim();
    if let Some((a, b)) = expr.split_once('+') {
        if let (Ok(a), Ok(b)) = (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
            return (a + b).to_string();
        }
    }
    "I could not solve this question.".to_string()
}

async fn solve(UserId(user): UserId, request: Request) -> Result<Json<Value>, Failure> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| failure(StatusCode::BAD_REQUEST, e.body_text()))?;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| failure(StatusCode::BAD_REQUEST, e.body_text()))?
        {
            if field.name() == Some("image") {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| failure(StatusCode::BAD_REQUEST, e.body_text()))?;
                tracing::info!(%user, bytes = bytes.len(), "solving image question");
                return Ok(Json(json!({
                    "success": true,
                    "source": "image",
                    "image_bytes": bytes.len(),
                    "answer": "Image received",
                })));
            }
        }
        return Err(failure(StatusCode::BAD_REQUEST, "image field is required"));
    }

    let Json(body) = Json::<Value>::from_request(request, &())
        .await
        .map_err(|e| failure(StatusCode::BAD_REQUEST, e.body_text()))?;
    let question = body
        .get("text")
        .or_else(|| body.get("question_text"))
        .and_then(Value::as_str)
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "text or image is required"))?;
    tracing::info!(%user, question, "solving text question");
    Ok(Json(json!({
        "success": true,
        "source": "text",
        "question": question,
        "answer": answer_for(question),
    })))
}

async fn check_usage(
    State(db): State<Db>,
    UserId(user): UserId,
    Json(input): Json<FeatureBody>,
) -> Result<Json<Value>, Failure> {
    let feature = input
        .feature
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "feature name is required"))?;
    let users = db.read().await;
    let state = users.get(&user).cloned().unwrap_or_default();
    let used = state.usage.get(&feature).copied().unwrap_or(0);

    if state.plan.is_some() {
        return Ok(Json(json!({
            "success": true,
            "message": "Feature available",
            "status": { "allowed": true, "used": used, "limit": null },
        })));
    }
    if used >= FREE_LIMIT {
        let reason = format!("Free limit reached for {feature}");
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "error": reason,
                "status": { "allowed": false, "used": used, "limit": FREE_LIMIT, "reason": reason },
            })),
        ));
    }
    Ok(Json(json!({
        "success": true,
        "message": "Feature available",
        "status": {
            "allowed": true,
            "used": used,
            "limit": FREE_LIMIT,
            "remaining": FREE_LIMIT - used,
        },
    })))
}

async fn record_usage(
    State(db): State<Db>,
    UserId(user): UserId,
    Json(input): Json<FeatureBody>,
) -> Result<Json<Value>, Failure> {
    let feature = input
        .feature
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "feature name is required"))?;
    let mut users = db.write().await;
    let used = users
        .entry(user)
        .or_default()
        .usage
        .entry(feature.clone())
        .or_insert(0);
    *used += 1;
    Ok(Json(json!({
        "success": true,
        "feature": feature,
        "used": *used,
        "input_size": input.input_size,
        "usage_type": input.usage_type.unwrap_or_else(|| "default".to_string()),
    })))
}

async fn create_subscription(
    State(db): State<Db>,
    UserId(user): UserId,
    Json(input): Json<CreateOrder>,
) -> Result<Json<Value>, Failure> {
    let recurring_amount = match input.plan.as_deref() {
        Some("basic") => 9900,
        Some("premium") => 19900,
        _ => {
            return Err(failure(
                StatusCode::BAD_REQUEST,
                r#"Invalid plan. Must be "basic" or "premium""#,
            ))
        }
    };
    let plan = input.plan.unwrap_or_default();
    if input.user_id.as_deref().is_some_and(|body_user| body_user != user) {
        return Err(failure(StatusCode::BAD_REQUEST, "user_id does not match X-User-ID"));
    }

    db.write().await.entry(user.clone()).or_default().plan = Some(plan.clone());
    Ok(Json(json!({
        "success": true,
        "order_id": format!("order_{}", Uuid::new_v4().simple()),
        "user_id": user,
        "plan": plan,
        "first_amount": 100,
        "recurring_amount": recurring_amount,
        "currency": "INR",
    })))
}

async fn subscription_status(State(db): State<Db>, UserId(user): UserId) -> Json<Value> {
    let users = db.read().await;
    let plan = users.get(&user).and_then(|s| s.plan.clone());
    Json(json!({
        "success": true,
        "subscription": {
            "plan": plan.as_deref().unwrap_or("free").to_uppercase(),
            "is_active": plan.is_some(),
        },
    }))
}

/// Health check. Also hands out a session cookie so clients can check that
/// cookies travel on later calls.
async fn health() -> impl IntoResponse {
    let cookie = format!("{SESSION_COOKIE}={}; Path=/", Uuid::new_v4().simple());
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "status": "healthy" })),
    )
}

/// The HTML page a hosting proxy serves while the backend is down.
async fn maintenance() -> Html<&'static str> {
    Html("<!DOCTYPE html><html><body><h1>Service waking up</h1></body></html>")
}

/// Reflects what arrived on the wire.
async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let get_header = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": method.as_str(),
        "user_id": headers.get(USER_ID_HEADER).and_then(header_text),
        "content_type": get_header(header::CONTENT_TYPE),
        "origin": get_header(header::ORIGIN),
        "cookie": get_header(header::COOKIE),
        "body_len": body.len(),
        "body": String::from_utf8_lossy(&body),
    }))
}
