use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::{config::Settings, models::CountryInfo};

#[derive(Debug, Error)]
pub enum CountryLookupError {
    #[error("country not found: {0}")]
    NotFound(String),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream error {status}: {body}")]
    Upstream { status: StatusCode, body: String },
    #[error("invalid json from upstream")]
    BadJson,
}

/// Resolves ISO alpha-2 codes to country name and demonym.
#[async_trait]
pub trait CountryValidator: Send + Sync {
    async fn find_by_iso_code(&self, code: &str) -> Result<CountryInfo, CountryLookupError>;
}

/// Adapter for the restcountries.com v3.1 API.
#[derive(Clone)]
pub struct RestCountriesClient {
    http: Client,
    base_url: String,
}

impl RestCountriesClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CountryLookupError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.into() })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CountryLookupError> {
        Self::new(
            settings.country_api_base_url.clone(),
            Duration::from_millis(settings.country_http_timeout_ms),
        )
    }
}

#[async_trait]
impl CountryValidator for RestCountriesClient {
    async fn find_by_iso_code(&self, code: &str) -> Result<CountryInfo, CountryLookupError> {
        // the code becomes a path segment; anything but two letters cannot match
        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(CountryLookupError::NotFound(code.to_string()));
        }
        let url = format!("{}/v3.1/alpha/{}", self.base_url.trim_end_matches('/'), code);

        let resp = self.http.get(&url).header("Accept", "application/json").send().await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if status == StatusCode::NOT_FOUND {
            return Err(CountryLookupError::NotFound(code.to_string()));
        }
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).to_string();
            tracing::warn!(%status, code, "country api answered with an error");
            return Err(CountryLookupError::Upstream { status, body });
        }
        let payload: Value =
            serde_json::from_slice(&bytes).map_err(|_| CountryLookupError::BadJson)?;
        parse_country(code, &payload)
    }
}

/// Answers from an embedded fixture shaped like the upstream payload.
pub struct StubCountryValidator {
    entries: Vec<Value>,
}

impl StubCountryValidator {
    pub fn new() -> Result<Self, CountryLookupError> {
        let payload: Value = serde_json::from_str(include_str!("./countries_stub.json"))
            .map_err(|_| CountryLookupError::BadJson)?;
        match payload {
            Value::Array(entries) => Ok(Self { entries }),
            _ => Err(CountryLookupError::BadJson),
        }
    }
}

#[async_trait]
impl CountryValidator for StubCountryValidator {
    async fn find_by_iso_code(&self, code: &str) -> Result<CountryInfo, CountryLookupError> {
        let entry = self
            .entries
            .iter()
            .find(|e| {
                e.get("cca2")
                    .and_then(|v| v.as_str())
                    .is_some_and(|c| c.eq_ignore_ascii_case(code))
            })
            .ok_or_else(|| CountryLookupError::NotFound(code.to_string()))?;
        parse_country(code, entry)
    }
}

/// Reads name and male demonym out of a restcountries payload. The upstream
/// wraps matches in an array; a bare object is accepted too.
pub fn parse_country(code: &str, payload: &Value) -> Result<CountryInfo, CountryLookupError> {
    let entry = match payload {
        Value::Array(arr) => arr.first().ok_or_else(|| CountryLookupError::NotFound(code.to_string()))?,
        Value::Object(_) => payload,
        _ => return Err(CountryLookupError::BadJson),
    };
    if !entry.is_object() {
        return Err(CountryLookupError::BadJson);
    }

    let name = entry
        .get("name")
        .and_then(|n| n.get("common"))
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown");
    let demonym = entry
        .get("demonyms")
        .and_then(|d| d.get("eng"))
        .and_then(|e| e.get("m"))
        .and_then(|v| v.as_str())
        .unwrap_or("N/A");

    Ok(CountryInfo {
        iso_code: code.trim().to_uppercase(),
        name: name.to_string(),
        demonym: demonym.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, response::IntoResponse, routing::get, Router};
    use serde_json::json;

    #[test]
    fn parses_first_match_and_uppercases_code() {
        let payload = json!([{
            "name": { "common": "United States" },
            "demonyms": { "eng": { "f": "American", "m": "American" } }
        }]);

        let info = parse_country("us", &payload).unwrap();

        assert_eq!(info.iso_code, "US");
        assert_eq!(info.name, "United States");
        assert_eq!(info.demonym, "American");
    }

    #[test]
    fn missing_fields_fall_back_to_placeholders() {
        let info = parse_country("AQ", &json!({ "cca2": "AQ" })).unwrap();
        assert_eq!(info.name, "Unknown");
        assert_eq!(info.demonym, "N/A");
    }

    #[test]
    fn empty_match_list_is_not_found() {
        let err = parse_country("XX", &json!([])).unwrap_err();
        assert!(matches!(err, CountryLookupError::NotFound(ref c) if c == "XX"));
    }

    #[test]
    fn scalar_payload_is_bad_json() {
        assert!(matches!(parse_country("US", &json!("US")), Err(CountryLookupError::BadJson)));
        assert!(matches!(parse_country("US", &json!([1])), Err(CountryLookupError::BadJson)));
    }

    #[tokio::test]
    async fn stub_resolves_known_codes_case_insensitively() {
        let stub = StubCountryValidator::new().unwrap();

        let us = stub.find_by_iso_code("us").await.unwrap();
        assert_eq!(us.iso_code, "US");
        assert_eq!(us.demonym, "American");

        let mx = stub.find_by_iso_code("MX").await.unwrap();
        assert_eq!(mx.demonym, "Mexican");

        assert!(matches!(
            stub.find_by_iso_code("ZZ").await,
            Err(CountryLookupError::NotFound(_))
        ));
    }

    async fn alpha(Path(code): Path<String>) -> axum::response::Response {
        match code.as_str() {
            "US" => axum::Json(json!([{
                "name": { "common": "United States" },
                "demonyms": { "eng": { "m": "American" } }
            }]))
            .into_response(),
            "XX" => axum::Json(json!([])).into_response(),
            "YY" => (StatusCode::NOT_FOUND, "{\"status\":404}").into_response(),
            "ZB" => (StatusCode::OK, "not json").into_response(),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        }
    }

    async fn spawn_upstream() -> String {
        let app = Router::new().route("/v3.1/alpha/:code", get(alpha));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn rest_client_maps_upstream_answers() {
        let base = spawn_upstream().await;
        let client = RestCountriesClient::new(base, Duration::from_secs(5)).unwrap();

        let us = client.find_by_iso_code("US").await.unwrap();
        assert_eq!(us.name, "United States");
        assert_eq!(us.demonym, "American");

        assert!(matches!(
            client.find_by_iso_code("XX").await,
            Err(CountryLookupError::NotFound(_))
        ));
        assert!(matches!(
            client.find_by_iso_code("YY").await,
            Err(CountryLookupError::NotFound(_))
        ));
        assert!(matches!(client.find_by_iso_code("ZB").await, Err(CountryLookupError::BadJson)));

        match client.find_by_iso_code("QQ").await {
            Err(CountryLookupError::Upstream { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_codes_never_reach_the_upstream() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            RestCountriesClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();

        for code in ["../name/us", "U/", "USA", "", "1A", "%2F"] {
            assert!(
                matches!(client.find_by_iso_code(code).await, Err(CountryLookupError::NotFound(_))),
                "code {code:?} should be refused locally"
            );
        }
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            RestCountriesClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();

        assert!(matches!(client.find_by_iso_code("US").await, Err(CountryLookupError::Http(_))));
    }
}
