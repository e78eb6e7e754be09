//! Parsing of ARM responses
//!
//! Kept free of I/O so the header and body conventions can be tested
//! without a server.

use driftwood_core::{ApiError, OperationStatus};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::time::Duration;

pub const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
pub const LOCATION_HEADER: &str = "location";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StatusDocument {
    status: Option<String>,
    error: Option<ErrorDetail>,
}

/// `Retry-After` in whole seconds; HTTP dates are ignored
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    parse_retry_after(header(headers, RETRY_AFTER_HEADER))
}

/// URL to poll for a mutation answered with `status`
///
/// `Azure-AsyncOperation` is preferred over `Location`.
pub fn operation_url(status: u16, headers: &HeaderMap) -> Option<String> {
    if let Some(url) = header(headers, ASYNC_OPERATION_HEADER) {
        if matches!(status, 200 | 201 | 202) {
            return Some(url.to_string());
        }
    }
    match (status, header(headers, LOCATION_HEADER)) {
        (201 | 202, Some(url)) => Some(url.to_string()),
        _ => None,
    }
}

fn reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
        .replace(' ', "")
}

/// Turn a non-success response body into an [`ApiError`]
///
/// ARM errors look like `{"error": {"code": ..., "message": ...}}`; any other
/// body is kept verbatim as the message.
pub fn parse_error_body(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: Some(detail),
        }) => {
            let code = if detail.code.is_empty() {
                reason(status)
            } else {
                detail.code
            };
            ApiError::new(status, code, detail.message)
        }
        _ => ApiError::new(status, reason(status), body.trim()),
    }
}

/// Interpret one poll of an operation URL
pub fn parse_operation_status(
    http_status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> Result<OperationStatus, ApiError> {
    if http_status == 202 {
        return Ok(OperationStatus::InProgress { retry_after });
    }
    if !(200..300).contains(&http_status) {
        return Err(parse_error_body(http_status, body));
    }
    if body.trim().is_empty() {
        return Ok(OperationStatus::Succeeded);
    }

    let document: StatusDocument = serde_json::from_str(body).map_err(|err| {
        ApiError::new(
            http_status,
            "MalformedResponse",
            format!("operation status is not valid JSON: {err}"),
        )
    })?;

    // a Location poll ends with the resource itself, which has no status
    let Some(status) = document.status else {
        return Ok(OperationStatus::Succeeded);
    };

    let status = status.to_ascii_lowercase();
    Ok(match status.as_str() {
        "succeeded" => OperationStatus::Succeeded,
        "failed" => {
            let detail = document.error.unwrap_or(ErrorDetail {
                code: String::new(),
                message: String::new(),
            });
            OperationStatus::Failed {
                code: if detail.code.is_empty() {
                    "OperationFailed".to_string()
                } else {
                    detail.code
                },
                message: detail.message,
            }
        }
        "canceled" | "cancelled" => OperationStatus::Canceled,
        _ => OperationStatus::InProgress { retry_after },
    })
}
