//! RFC 7807 problem responses for the HTTP layer.

use std::collections::BTreeMap;

use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Wire shape of a problem response, used for OpenAPI documentation.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "title": "Validation Error",
    "detail": "backup 7 has status in_progress, expected completed",
    "errors": ["backup 7 has status in_progress, expected completed"]
}))]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_url: Option<String>,
    /// Short, human-readable summary of the problem type
    pub title: String,
    /// Explanation specific to this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Extra members, e.g. `errors` for validation failures
    #[serde(flatten)]
    #[schema(additional_properties = true)]
    pub extensions: BTreeMap<String, Value>,
}

/// A problem that can be returned from a handler.
#[derive(Debug, Clone)]
pub struct Problem {
    pub status_code: StatusCode,
    pub body: BTreeMap<String, Value>,
}

/// Start building a problem for the given status.
pub fn new<S>(status_code: S) -> Problem
where
    S: Into<StatusCode>,
{
    Problem {
        status_code: status_code.into(),
        body: BTreeMap::new(),
    }
}

impl Problem {
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with_value("title", title.into())
    }

    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        self.with_value("detail", detail.into())
    }

    pub fn with_type(self, type_url: impl Into<String>) -> Self {
        self.with_value("type", type_url.into())
    }

    /// Attach an arbitrary extension member.
    pub fn with_value<V>(mut self, key: &str, value: V) -> Self
    where
        V: Into<Value>,
    {
        self.body.insert(key.to_owned(), value.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.body.get("title").and_then(Value::as_str)
    }
}

impl From<StatusCode> for Problem {
    fn from(status_code: StatusCode) -> Self {
        new(status_code)
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> axum::response::Response {
        if self.body.is_empty() {
            return self.status_code.into_response();
        }

        let mut response = (self.status_code, Json(self.body)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static(PROBLEM_CONTENT_TYPE),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_builder_collects_members() {
        let problem = new(StatusCode::BAD_REQUEST)
            .with_title("Validation Error")
            .with_detail("name must not be empty")
            .with_value("errors", vec!["name must not be empty"]);

        assert_eq!(problem.status_code, StatusCode::BAD_REQUEST);
        assert_eq!(problem.title(), Some("Validation Error"));
        assert_eq!(problem.body.len(), 3);
    }

    #[tokio::test]
    async fn test_into_response_sets_problem_content_type() {
        let response = new(StatusCode::NOT_FOUND)
            .with_title("Resource Not Found")
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            PROBLEM_CONTENT_TYPE
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["title"], "Resource Not Found");
    }

    #[test]
    fn test_empty_problem_is_bare_status() {
        let response = Problem::from(StatusCode::NO_CONTENT).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }
}
