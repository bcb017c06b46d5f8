//! Convenience calls for the backend endpoints.
//!
//! Each method fixes a path and shapes the payload, then defers to
//! `ApiClient::call`. Failure handling is exactly that of `call`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ApiClient, JsonPayload};
use crate::error::ApiError;
use crate::http::{BinaryPayload, HttpMethod};
use crate::transport::Transport;

pub const SOLVE: &str = "/solve/";
pub const USAGE_CHECK: &str = "/usage/check/";
pub const USAGE_RECORD: &str = "/usage/record/";
pub const SUBSCRIPTION_CREATE: &str = "/subscriptions/create/";
pub const SUBSCRIPTION_STATUS: &str = "/subscriptions/status/";
pub const HEALTH: &str = "/health/";

/// Multipart field name the solve endpoint reads images from.
pub const IMAGE_FIELD: &str = "image";

/// Paid subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Basic,
    Premium,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Basic => f.write_str("basic"),
            Plan::Premium => f.write_str("premium"),
        }
    }
}

/// Body for `/usage/check/` and `/usage/record/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureUsage {
    pub feature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<String>,
}

impl FeatureUsage {
    pub fn new(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            input_size: None,
            usage_type: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateSubscription<'a> {
    user_id: &'a str,
    plan: Plan,
}

/// Serialize a request struct into the JSON object `call` expects. Failures
/// never reach `call`, so they are logged here.
fn to_payload<B: Serialize>(endpoint: &str, body: &B) -> Result<JsonPayload, ApiError> {
    let result = match serde_json::to_value(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ApiError::Serialization(format!(
            "request body for {endpoint} must be a JSON object, got {other}"
        ))),
        Err(e) => Err(ApiError::Serialization(format!(
            "request body for {endpoint}: {e}"
        ))),
    };
    if let Err(e) = &result {
        tracing::error!(endpoint, error = %e, "API error");
    }
    result
}

impl<T: Transport> ApiClient<T> {
    /// Ask the solver a text question.
    pub async fn solve_by_text(&self, question: &str) -> Result<Value, ApiError> {
        let mut payload = JsonPayload::new();
        payload.insert(self.solve_text_field.clone(), Value::String(question.to_string()));
        self.call(SOLVE, &payload, HttpMethod::Post).await
    }

    /// Ask the solver about an image (photo of a question).
    pub async fn solve_by_image(&self, image: BinaryPayload) -> Result<Value, ApiError> {
        self.call_with_binary(SOLVE, IMAGE_FIELD, image).await
    }

    pub async fn check_feature_access(&self, feature: &str) -> Result<Value, ApiError> {
        let payload = to_payload(USAGE_CHECK, &FeatureUsage::new(feature))?;
        self.call(USAGE_CHECK, &payload, HttpMethod::Post).await
    }

    pub async fn record_feature_usage(&self, feature: &str) -> Result<Value, ApiError> {
        self.record_feature_usage_with(&FeatureUsage::new(feature)).await
    }

    /// Record usage with the optional size and type details.
    pub async fn record_feature_usage_with(&self, usage: &FeatureUsage) -> Result<Value, ApiError> {
        let payload = to_payload(USAGE_RECORD, usage)?;
        self.call(USAGE_RECORD, &payload, HttpMethod::Post).await
    }

    /// Create a payment order for `plan`. The body's `user_id` is the same
    /// identity sent in `X-User-ID`.
    pub async fn create_subscription_order(&self, plan: Plan) -> Result<Value, ApiError> {
        let identity = self.current_identity();
        let payload = to_payload(SUBSCRIPTION_CREATE, &CreateSubscription {
            user_id: &identity,
            plan,
        })?;
        self.call_as(&identity, SUBSCRIPTION_CREATE, &payload, HttpMethod::Post)
            .await
    }

    pub async fn get_subscription_status(&self) -> Result<Value, ApiError> {
        self.call(SUBSCRIPTION_STATUS, &JsonPayload::new(), HttpMethod::Get)
            .await
    }

    pub async fn health_check(&self) -> Result<Value, ApiError> {
        self.call(HEALTH, &JsonPayload::new(), HttpMethod::Get).await
    }
}
