mod api;
mod config;
mod country;
mod db;
mod error;
mod health;
mod metrics;
mod models;
mod repository;
mod service;

use axum::{error_handling::HandleErrorLayer, http::StatusCode, Router};
use std::{sync::Arc, time::Duration};
use tower::{timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    api::{ApiDoc, AppState},
    config::Settings,
    country::{CountryValidator, RestCountriesClient, StubCountryValidator},
    db::SqlCustomerRepository,
    metrics::CustomerMetrics,
    service::CustomerService,
};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();

    let pool =
        db::connect(&settings.database_url, settings.db_max_connections, settings.db_timeout_secs)
            .await?;
    db::run_migrations(&pool).await?;
    tracing::info!("database ready at {}", settings.database_url);

    let countries: Arc<dyn CountryValidator> = if settings.country_use_stub {
        tracing::warn!("country lookups served from the embedded stub");
        Arc::new(StubCountryValidator::new()?)
    } else {
        Arc::new(RestCountriesClient::from_settings(&settings)?)
    };
    let customers = CustomerService::new(
        Arc::new(SqlCustomerRepository::new(pool)),
        countries,
        Arc::new(CustomerMetrics::new()?),
    );

    let app = app(
        AppState { customers },
        Duration::from_secs(settings.request_timeout_secs),
    );

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

fn app(state: AppState, request_timeout: Duration) -> Router {
    // Outermost first: trace, CORS, error handler, then the timeout it guards.
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .layer(TimeoutLayer::new(request_timeout))
        .into_inner();

    api::router(state)
        .layer(middleware)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

async fn handle_middleware_error(e: BoxError) -> (StatusCode, String) {
    if e.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
