use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Application status code for every successful response.
pub const ERRNO_OK: u32 = 20000;

/// Success envelope: `{ "errno": 20000, "message": ..., <field>: <data> }`.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    message: String,
    payload: Option<(&'static str, T)>,
}

impl ApiResponse<()> {
    /// Envelope without an operation payload.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with(message: impl Into<String>, field: &'static str, data: T) -> Self {
        Self {
            message: message.into(),
            payload: Some((field, data)),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let mut envelope = Map::new();
        envelope.insert("errno".into(), json!(ERRNO_OK));
        envelope.insert("message".into(), Value::String(self.message));

        if let Some((field, data)) = self.payload {
            match serde_json::to_value(&data) {
                Ok(value) => {
                    envelope.insert(field.into(), value);
                }
                Err(e) => {
                    tracing::error!("Failed to serialize response data: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({
                            "errno": 50099,
                            "message": "failed to serialize response data"
                        })),
                    )
                        .into_response();
                }
            }
        }

        (StatusCode::OK, Json(Value::Object(envelope))).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn payload_is_placed_under_its_field() {
        let resp = ApiResponse::with("ok", "houseID", 42).into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errno"], 20000);
        assert_eq!(body["message"], "ok");
        assert_eq!(body["houseID"], 42);
    }

    #[tokio::test]
    async fn message_only_envelope_has_two_keys() {
        let resp = ApiResponse::message("deleted").into_response();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.as_object().unwrap().len(), 2);
    }
}
