//! Core domain model and the normalized error taxonomy for the product catalog client.

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const CRATE_NAME: &str = "catalog-core";

/// Externally assigned product identifier; immutable once created.
pub type ProductId = String;

/// Catalog entry as the application sees it.
///
/// `date_revision` is derived from `date_release` when a product is created or
/// edited, but it is stored independently and never re-derived after a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub logo: String,
    pub date_release: NaiveDate,
    pub date_revision: NaiveDate,
}

impl Product {
    /// Case-insensitive substring match over `id`, `name` and `description`.
    /// `needle` must already be trimmed and lowercased; an empty needle matches.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        format!("{} {} {}", self.id, self.name, self.description)
            .to_lowercase()
            .contains(needle)
    }
}

/// Closed set of error categories every transport failure is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Network,
    /// Reserved; nothing produces it yet.
    Timeout,
    BadRequest,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Server,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Timeout => "TIMEOUT",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::Server => "SERVER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-shape error value handed to every caller downstream of the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct NormalizedError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl NormalizedError {
    fn with_status(code: ErrorCode, message: impl Into<String>, status: u16) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            status: Some(status),
        }
    }
}

/// Failure as produced by a transport, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFailure {
    /// The request completed with an HTTP status (`0` = never reached a server).
    /// `payload` is the response body: parsed JSON, a JSON string for non-JSON
    /// text, or `null` when there was no body.
    Http { status: u16, payload: JsonValue },
    /// Anything that is not an HTTP failure (e.g. an undecodable payload).
    Other(String),
}

impl RawFailure {
    pub fn http(status: u16, payload: JsonValue) -> Self {
        Self::Http { status, payload }
    }

    pub fn network() -> Self {
        Self::Http {
            status: 0,
            payload: JsonValue::Null,
        }
    }
}

impl std::fmt::Display for RawFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { status, .. } => write!(f, "http failure with status {status}"),
            Self::Other(reason) => write!(f, "non-http failure: {reason}"),
        }
    }
}

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unexpected error occurred.";
pub const NETWORK_ERROR_MESSAGE: &str = "Could not connect to the server.";
pub const NETWORK_ERROR_DETAIL: &str = "Check the network connection, CORS settings and that the backend is running.";

/// Translate a raw transport failure into a [`NormalizedError`].
///
/// Status precedence: 400, 401, 403, 404, 409, then `>= 500`, then anything
/// else as `UNKNOWN`. A non-blank server message replaces the default text.
pub fn to_normalized_error(raw: &RawFailure) -> NormalizedError {
    let (status, payload) = match raw {
        RawFailure::Http { status, payload } => (*status, payload),
        RawFailure::Other(_) => {
            return NormalizedError {
                code: ErrorCode::Unknown,
                message: UNKNOWN_ERROR_MESSAGE.to_string(),
                detail: None,
                status: None,
            };
        }
    };

    if status == 0 {
        return NormalizedError {
            code: ErrorCode::Network,
            message: NETWORK_ERROR_MESSAGE.to_string(),
            detail: Some(NETWORK_ERROR_DETAIL.to_string()),
            status: Some(0),
        };
    }

    let server_message = extract_server_message(payload);
    let pick = |fallback: String| server_message.clone().unwrap_or(fallback);

    match status {
        400 => NormalizedError::with_status(ErrorCode::BadRequest, pick("Invalid request.".into()), status),
        401 => NormalizedError::with_status(ErrorCode::Unauthorized, pick("Not authorized.".into()), status),
        403 => NormalizedError::with_status(ErrorCode::Forbidden, pick("Access denied.".into()), status),
        404 => NormalizedError::with_status(ErrorCode::NotFound, pick("Not found.".into()), status),
        409 => NormalizedError::with_status(ErrorCode::Conflict, pick("Data conflict.".into()), status),
        s if s >= 500 => NormalizedError::with_status(ErrorCode::Server, pick("Server error.".into()), status),
        s => NormalizedError::with_status(ErrorCode::Unknown, pick(format!("HTTP error {s}.")), status),
    }
}

/// Object payloads win over bare strings; blank values count as absent.
fn extract_server_message(payload: &JsonValue) -> Option<String> {
    if let Some(message) = payload.as_object().and_then(|obj| obj.get("message")) {
        let text = match message {
            JsonValue::Null => String::new(),
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        return (!text.trim().is_empty()).then_some(text);
    }

    if let JsonValue::String(s) = payload {
        let trimmed = s.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    None
}

/// Calendar-date format used on forms and on the wire.
pub const CALENDAR_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(CALENDAR_DATE_FORMAT).to_string()
}

/// Parse `YYYY-MM-DD`, or an RFC 3339 timestamp whose UTC calendar day is used.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, CALENDAR_DATE_FORMAT) {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc).date_naive())
}

/// Same month and day `years` later; 29 February clamps to 28 February.
pub fn add_years(date: NaiveDate, years: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(years.checked_mul(12)?))
}

/// Revision date for a given release date.
pub fn revision_date_for(release: NaiveDate) -> Option<NaiveDate> {
    add_years(release, 1)
}

pub fn is_valid_url(value: &str) -> bool {
    url::Url::parse(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn d(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn non_http_failure_is_generic_unknown() {
        let err = to_normalized_error(&RawFailure::Other("boom".into()));
        assert_eq!(err.code, ErrorCode::Unknown);
        assert_eq!(err.message, UNKNOWN_ERROR_MESSAGE);
        assert_eq!(err.status, None);
        assert_eq!(err.detail, None);
    }

    #[test]
    fn status_zero_is_network_with_detail() {
        let err = to_normalized_error(&RawFailure::network());
        assert_eq!(err.code, ErrorCode::Network);
        assert_eq!(err.message, NETWORK_ERROR_MESSAGE);
        assert_eq!(err.detail.as_deref(), Some(NETWORK_ERROR_DETAIL));
        assert_eq!(err.status, Some(0));
    }

    #[test]
    fn server_message_from_object_payload() {
        let err = to_normalized_error(&RawFailure::http(400, json!({"message": "Name is too short"})));
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert_eq!(err.message, "Name is too short");
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn blank_object_message_falls_back_to_default() {
        let err = to_normalized_error(&RawFailure::http(400, json!({"message": "   "})));
        assert_eq!(err.message, "Invalid request.");

        let err = to_normalized_error(&RawFailure::http(400, json!({"message": null})));
        assert_eq!(err.message, "Invalid request.");
    }

    #[test]
    fn server_message_from_string_payload_is_trimmed() {
        let err = to_normalized_error(&RawFailure::http(404, json!("  Product missing  ")));
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Product missing");

        let err = to_normalized_error(&RawFailure::http(404, json!("   ")));
        assert_eq!(err.message, "Not found.");
    }

    #[test]
    fn object_without_message_uses_default() {
        let err = to_normalized_error(&RawFailure::http(409, json!({"error": "dup"})));
        assert_eq!(err.code, ErrorCode::Conflict);
        assert_eq!(err.message, "Data conflict.");
    }

    #[test]
    fn status_table_defaults() {
        let cases = [
            (400, ErrorCode::BadRequest, "Invalid request."),
            (401, ErrorCode::Unauthorized, "Not authorized."),
            (403, ErrorCode::Forbidden, "Access denied."),
            (404, ErrorCode::NotFound, "Not found."),
            (409, ErrorCode::Conflict, "Data conflict."),
            (500, ErrorCode::Server, "Server error."),
            (503, ErrorCode::Server, "Server error."),
            (418, ErrorCode::Unknown, "HTTP error 418."),
            (302, ErrorCode::Unknown, "HTTP error 302."),
        ];
        for (status, code, message) in cases {
            let err = to_normalized_error(&RawFailure::http(status, JsonValue::Null));
            assert_eq!(err.code, code, "status {status}");
            assert_eq!(err.message, message, "status {status}");
            assert_eq!(err.status, Some(status));
            assert_eq!(err.detail, None);
        }
    }

    #[test]
    fn server_error_prefers_server_message() {
        let err = to_normalized_error(&RawFailure::http(502, json!({"message": "Upstream down"})));
        assert_eq!(err.code, ErrorCode::Server);
        assert_eq!(err.message, "Upstream down");
    }

    #[test]
    fn error_code_serializes_as_screaming_snake() {
        assert_eq!(serde_json::to_value(ErrorCode::BadRequest).unwrap(), json!("BAD_REQUEST"));
        assert_eq!(ErrorCode::NotFound.to_string(), "NOT_FOUND");
    }

    #[test]
    fn calendar_dates_parse_both_shapes() {
        assert_eq!(parse_calendar_date("2030-01-15"), Some(d("2030-01-15")));
        assert_eq!(parse_calendar_date("2025-01-01T00:00:00.000Z"), Some(d("2025-01-01")));
        assert_eq!(parse_calendar_date("2025-01-01T23:30:00-05:00"), Some(d("2025-01-02")));
        assert_eq!(parse_calendar_date("not a date"), None);
        assert_eq!(parse_calendar_date(""), None);
    }

    #[test]
    fn revision_is_one_year_after_release() {
        assert_eq!(revision_date_for(d("2030-01-15")), Some(d("2031-01-15")));
        assert_eq!(revision_date_for(d("2028-02-29")), Some(d("2029-02-28")));
        assert_eq!(format_date(d("2031-01-05")), "2031-01-05");
    }

    #[test]
    fn url_validation() {
        assert!(is_valid_url("https://example.com/logo.png"));
        assert!(!is_valid_url("example.com/logo.png"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn product_matching_is_case_insensitive_over_three_fields() {
        let product = Product {
            id: "p2".into(),
            name: "Mouse".into(),
            description: "Wireless".into(),
            logo: "https://example.com/2.png".into(),
            date_release: d("2025-02-01"),
            date_revision: d("2026-02-01"),
        };
        assert!(product.matches(""));
        assert!(product.matches("mouse"));
        assert!(product.matches("wire"));
        assert!(product.matches("p2"));
        assert!(!product.matches("keyboard"));
    }

    proptest! {
        #[test]
        fn unmatched_client_statuses_are_unknown(status in 400u16..500, message in proptest::option::of("[a-z]{1,12}")) {
            prop_assume!(![400, 401, 403, 404, 409].contains(&status));
            let payload = match &message {
                Some(m) => json!({ "message": m }),
                None => JsonValue::Null,
            };
            let err = to_normalized_error(&RawFailure::http(status, payload));
            prop_assert_eq!(err.code, ErrorCode::Unknown);
            prop_assert_eq!(err.status, Some(status));
            match message {
                Some(m) => prop_assert_eq!(err.message, m),
                None => prop_assert_eq!(err.message, format!("HTTP error {status}.")),
            }
        }

        #[test]
        fn five_hundreds_are_always_server(status in 500u16..=u16::MAX) {
            let err = to_normalized_error(&RawFailure::http(status, json!("whatever")));
            prop_assert_eq!(err.code, ErrorCode::Server);
            prop_assert_eq!(err.status, Some(status));
        }
    }
}
