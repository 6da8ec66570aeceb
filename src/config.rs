use dotenvy::dotenv;
use std::env;

#[derive(Clone, Debug)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_secs: u64,
    /// Hard deadline for a whole HTTP request, upstream calls included
    pub request_timeout_secs: u64,
    pub country_api_base_url: String,
    pub country_http_timeout_ms: u64,
    /// If true, countries are resolved from the embedded fixture instead of the upstream API
    pub country_use_stub: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        let _ = dotenv();

        let bind_addr =
            env::var("CUSTOMERS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let database_url = env::var("CUSTOMERS_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://customers.db?mode=rwc".to_string());
        let db_max_connections = parsed("CUSTOMERS_DB_MAX_CONNECTIONS").unwrap_or(5);
        let db_timeout_secs = parsed("CUSTOMERS_DB_TIMEOUT_SECS").unwrap_or(30);
        let request_timeout_secs = parsed("CUSTOMERS_REQUEST_TIMEOUT_SECS").unwrap_or(20);
        let country_api_base_url = env::var("COUNTRY_API_BASE_URL")
            .unwrap_or_else(|_| "https://restcountries.com".to_string());
        let country_http_timeout_ms = parsed("COUNTRY_HTTP_TIMEOUT_MS").unwrap_or(5_000u64);
        let country_use_stub = env::var("COUNTRY_USE_STUB")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            bind_addr,
            database_url,
            db_max_connections,
            db_timeout_secs,
            request_timeout_secs,
            country_api_base_url,
            country_http_timeout_ms,
            country_use_stub,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
