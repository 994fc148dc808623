//! Provider integrations.
//!
//! Each provider knows how to build its discovery and detail requests and how
//! to decode the payloads into [`ResourceRecord`]s. Everything else, from
//! retries to encoding and shipping, stays provider-agnostic.

pub mod cloud;
pub mod robot;

use core::fmt;

use http_retry::HttpRequest;
use serde::Deserialize;
use thiserror::Error;

pub use self::cloud::CloudApi;
pub use self::robot::RobotApi;
use crate::config::ProviderKind;
use crate::config::Settings;
use crate::record::ResourceRecord;
use crate::record::ResourceRef;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {value:?}")]
    Field { field: &'static str, value: String },
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<ResourceRecord>,
    pub last_page: u64,
}

/// Discovery through a paginated listing that returns full records.
pub trait PaginatedApi: Send + Sync {
    /// Request for page `page`, counting from 1.
    fn page_request(&self, page: u64) -> HttpRequest;

    fn decode_page(&self, body: &[u8]) -> Result<Page, DecodeError>;
}

/// Discovery through a list of identifiers and one detail call each.
pub trait ListDetailApi: Send + Sync {
    fn list_request(&self) -> HttpRequest;

    fn decode_list(&self, body: &[u8]) -> Result<Vec<ResourceRef>, DecodeError>;

    fn detail_request(&self, resource: ResourceRef) -> HttpRequest;

    fn decode_detail(&self, body: &[u8]) -> Result<ResourceRecord, DecodeError>;
}

pub enum Provider {
    Cloud(CloudApi),
    Robot(RobotApi),
}

impl Provider {
    pub fn from_settings(kind: ProviderKind, settings: &Settings, base_url: Option<&str>) -> Self {
        match kind {
            ProviderKind::Cloud => Self::Cloud(CloudApi::new(
                base_url.unwrap_or(cloud::DEFAULT_BASE_URL),
                &settings.api_token,
            )),
            ProviderKind::Robot => Self::Robot(RobotApi::new(
                base_url.unwrap_or(robot::DEFAULT_BASE_URL),
                settings.api_user.as_deref().unwrap_or_default(),
                &settings.api_token,
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cloud(_) => "cloud",
            Self::Robot(_) => "robot",
        }
    }
}

/// Structured error body returned with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.code, self.message)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorEnvelope {
    Nested { error: ApiError },
    Flat(ApiError),
}

/// Best-effort decode of an error body, for logging only.
pub fn decode_api_error(body: &[u8]) -> Option<ApiError> {
    match serde_json::from_slice(body).ok()? {
        ErrorEnvelope::Nested { error } | ErrorEnvelope::Flat(error) => Some(error),
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn nested_error_body_decodes() {
        let body = br#"{"error": {"status": 404, "code": "NOT_FOUND", "message": "Storage box not found"}}"#;

        assert_eq!(
            decode_api_error(body).map(|e| e.to_string()),
            Some("NOT_FOUND - Storage box not found".to_string())
        );
    }

    #[test]
    fn flat_error_body_decodes() {
        let body = br#"{"code": "forbidden", "message": "insufficient permissions", "details": {}}"#;

        assert_eq!(decode_api_error(body), Some(ApiError {
            code: "forbidden".into(),
            message: "insufficient permissions".into(),
        }));
    }

    #[test]
    fn unstructured_error_body_is_none() {
        assert_eq!(decode_api_error(b"<html>Bad Gateway</html>"), None);
        assert_eq!(decode_api_error(br#"{"unexpected": true}"#), None);
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://a/v1/", "/items"), "http://a/v1/items");
        assert_eq!(join_url("http://a/v1", "items"), "http://a/v1/items");
    }

    #[test]
    fn provider_follows_kind() {
        let settings = Settings {
            bucket: "b".into(),
            influxdb_host: "h".into(),
            influxdb_api_token: "t".into(),
            org: "o".into(),
            api_token: "secret".into(),
            api_user: Some("user".into()),
        };

        let cloud = Provider::from_settings(ProviderKind::Cloud, &settings, None);
        let robot = Provider::from_settings(ProviderKind::Robot, &settings, Some("http://mock"));

        assert_eq!(cloud.name(), "cloud");
        assert_eq!(robot.name(), "robot");
    }
}
