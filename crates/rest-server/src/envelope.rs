//! The uniform `{code, message, data}` response wrapper.

use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;

pub const SUCCESS_CODE: i32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T = serde_json::Value> {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ResponseEnvelope<T> {
    pub fn success() -> Self {
        Self {
            code: SUCCESS_CODE,
            message: "success".to_string(),
            data: None,
        }
    }

    pub fn parsed(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: "parsed".to_string(),
            data: Some(data),
        }
    }

    pub fn error(err: &RequestError) -> Self {
        Self {
            code: err.code(),
            message: format!("request failed, {err}"),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

impl<T: Serialize> IntoResponse for ResponseEnvelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_omits_data() {
        let value = serde_json::to_value(ResponseEnvelope::<()>::success()).unwrap();
        assert_eq!(value, json!({"code": 0, "message": "success"}));
    }

    #[test]
    fn error_carries_detail_and_code() {
        let envelope = ResponseEnvelope::<()>::error(&RequestError::MissingField("content"));
        assert_eq!(envelope.code, -2);
        assert_eq!(envelope.message, "request failed, content must not be empty");
        assert!(!envelope.is_success());
    }

    #[test]
    fn parsed_includes_data() {
        let value = serde_json::to_value(ResponseEnvelope::parsed(json!({"segments": []}))).unwrap();
        assert_eq!(
            value,
            json!({"code": 0, "message": "parsed", "data": {"segments": []}})
        );
    }
}
