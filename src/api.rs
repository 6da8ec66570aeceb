use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, sync::LazyLock};
use utoipa::{IntoParams, OpenApi, ToSchema};
use validator::Validate;

use crate::{
    error::{ErrorBody, ServiceError},
    health, metrics,
    models::{Customer, CustomerDraft, CustomerId, CustomerPatch, PageRequest},
    service::CustomerService,
};

static COUNTRY_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").unwrap());
static PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[0-9\-\s()]*$").unwrap());
static NOT_BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S").unwrap());

#[derive(Clone)]
pub struct AppState {
    pub customers: CustomerService,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_customer,
        get_customer,
        list_customers,
        update_customer,
        delete_customer,
        health::liveness,
        health::readiness
    ),
    components(schemas(
        CustomerCreateRequest,
        CustomerUpdateRequest,
        CustomerResponse,
        CustomerPageResponse,
        ErrorBody,
        health::HealthReport
    )),
    tags((name = "customers", description = "Customer management"))
)]
pub struct ApiDoc;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerCreateRequest {
    #[validate(
        length(max = 50, message = "First name must not exceed 50 characters"),
        regex(path = *NOT_BLANK, message = "First name is required")
    )]
    pub first_name: String,
    #[validate(length(max = 50, message = "Second name must not exceed 50 characters"))]
    pub second_name: Option<String>,
    #[validate(
        length(max = 50, message = "First last name must not exceed 50 characters"),
        regex(path = *NOT_BLANK, message = "First last name is required")
    )]
    pub first_last_name: String,
    #[validate(length(max = 50, message = "Second last name must not exceed 50 characters"))]
    pub second_last_name: Option<String>,
    #[validate(
        email(message = "Email must be a valid email address"),
        length(max = 100, message = "Email must not exceed 100 characters")
    )]
    pub email: String,
    #[validate(
        length(max = 255, message = "Address must not exceed 255 characters"),
        regex(path = *NOT_BLANK, message = "Address is required")
    )]
    pub address: String,
    #[validate(
        length(min = 7, max = 20, message = "Phone must be between 7 and 20 characters"),
        regex(path = *PHONE, message = "Phone must be a valid phone number")
    )]
    pub phone: String,
    #[validate(regex(path = *COUNTRY_CODE, message = "Country must be in ISO 3166-1 alpha-2 format (uppercase letters)"))]
    pub country: String,
}

impl From<CustomerCreateRequest> for CustomerDraft {
    fn from(req: CustomerCreateRequest) -> Self {
        Self {
            first_name: req.first_name,
            second_name: req.second_name.filter(|v| !v.trim().is_empty()),
            first_last_name: req.first_last_name,
            second_last_name: req.second_last_name.filter(|v| !v.trim().is_empty()),
            email: req.email,
            address: req.address,
            phone: req.phone,
            country: req.country,
        }
    }
}

/// Every field is optional; absent or blank means "leave unchanged".
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdateRequest {
    #[validate(
        email(message = "Email must be a valid email address"),
        length(max = 100, message = "Email must not exceed 100 characters")
    )]
    pub email: Option<String>,
    #[validate(length(max = 255, message = "Address must not exceed 255 characters"))]
    pub address: Option<String>,
    #[validate(length(max = 20, message = "Phone must not exceed 20 characters"))]
    pub phone: Option<String>,
    #[validate(regex(path = *COUNTRY_CODE, message = "Country must be in ISO 3166-1 alpha-2 format (uppercase letters)"))]
    pub country: Option<String>,
}

impl CustomerUpdateRequest {
    /// Blank fields mean "leave unchanged", so they skip validation too.
    fn without_blanks(self) -> Self {
        let CustomerPatch { email, address, phone, country } = CustomerPatch::from_optional(
            self.email,
            self.address,
            self.phone,
            self.country,
        );
        Self { email, address, phone, country }
    }
}

impl From<CustomerUpdateRequest> for CustomerPatch {
    fn from(req: CustomerUpdateRequest) -> Self {
        CustomerPatch::from_optional(req.email, req.address, req.phone, req.country)
    }
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CustomerQuery {
    /// exact ISO alpha-2 filter
    #[validate(regex(path = *COUNTRY_CODE, message = "Country must be in ISO 3166-1 alpha-2 format (uppercase letters)"))]
    pub country: Option<String>,
    /// zero-based
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100, message = "Size must be between 1 and 100"))]
    pub size: u32,
}

fn default_page_size() -> u32 {
    10
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub id: i64,
    pub first_name: String,
    pub second_name: Option<String>,
    pub first_last_name: String,
    pub second_last_name: Option<String>,
    pub email: String,
    pub address: String,
    pub phone: String,
    pub country: String,
    pub demonym: String,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        Self {
            id: c.id.0,
            first_name: c.first_name,
            second_name: c.second_name,
            first_last_name: c.first_last_name,
            second_last_name: c.second_last_name,
            email: c.email,
            address: c.address,
            phone: c.phone,
            country: c.country,
            demonym: c.demonym,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CustomerPageResponse {
    pub items: Vec<CustomerResponse>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

/// Extractor and validation failures all answer 400 with the error body.
fn rejected(reason: impl Display) -> ServiceError {
    tracing::warn!("rejected request: {}", reason);
    ServiceError::validation(reason.to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route(
            "/customers/:id",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .merge(health::routes())
        .merge(metrics::routes())
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/customers",
    tag = "customers",
    request_body = CustomerCreateRequest,
    responses(
        (status = 201, description = "Customer created", body = CustomerResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 404, description = "Unknown country", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 500, description = "Country service or internal failure", body = ErrorBody),
    )
)]
pub async fn create_customer(
    State(state): State<AppState>,
    payload: Result<Json<CustomerCreateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(req) = payload.map_err(rejected)?;
    tracing::info!(
        "received customer creation request for: {} {}",
        req.first_name,
        req.first_last_name
    );
    req.validate().map_err(rejected)?;

    let customer = state.customers.create_customer(req.into()).await?;
    let location = format!("/customers/{}", customer.id);

    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(CustomerResponse::from(customer))))
}

#[utoipa::path(
    get,
    path = "/customers/{id}",
    tag = "customers",
    params(("id" = i64, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer found", body = CustomerResponse),
        (status = 404, description = "Customer not found", body = ErrorBody),
    )
)]
pub async fn get_customer(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<CustomerResponse>, ServiceError> {
    let Path(id) = id.map_err(rejected)?;
    let customer = state.customers.get_customer_by_id(CustomerId(id)).await?;
    Ok(Json(customer.into()))
}

#[utoipa::path(
    get,
    path = "/customers",
    tag = "customers",
    params(CustomerQuery),
    responses(
        (status = 200, description = "Page of customers", body = CustomerPageResponse),
        (status = 400, description = "Invalid paging or country filter", body = ErrorBody),
    )
)]
pub async fn list_customers(
    State(state): State<AppState>,
    query: Result<Query<CustomerQuery>, QueryRejection>,
) -> Result<Json<CustomerPageResponse>, ServiceError> {
    let Query(mut q) = query.map_err(rejected)?;
    q.country = q.country.filter(|c| !c.trim().is_empty());
    q.validate().map_err(rejected)?;
    let page = PageRequest::new(q.page, q.size)?;

    let customers = match q.country.as_deref() {
        Some(country) => state.customers.get_customers_by_country(country, page).await?,
        None => state.customers.get_all_customers(page).await?,
    };

    let customers = customers.map(CustomerResponse::from);
    Ok(Json(CustomerPageResponse {
        items: customers.items,
        page: customers.page,
        size: customers.size,
        total: customers.total,
    }))
}

#[utoipa::path(
    put,
    path = "/customers/{id}",
    tag = "customers",
    params(("id" = i64, Path, description = "Customer id")),
    request_body = CustomerUpdateRequest,
    responses(
        (status = 200, description = "Customer updated", body = CustomerResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 404, description = "Customer or country not found", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    )
)]
pub async fn update_customer(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CustomerUpdateRequest>, JsonRejection>,
) -> Result<Json<CustomerResponse>, ServiceError> {
    let Path(id) = id.map_err(rejected)?;
    let Json(req) = payload.map_err(rejected)?;
    tracing::info!(customer_id = id, "received customer update request");
    let req = req.without_blanks();
    req.validate().map_err(rejected)?;

    let customer = state.customers.update_customer(CustomerId(id), req.into()).await?;
    Ok(Json(customer.into()))
}

#[utoipa::path(
    delete,
    path = "/customers/{id}",
    tag = "customers",
    params(("id" = i64, Path, description = "Customer id")),
    responses(
        (status = 204, description = "Customer deleted"),
        (status = 404, description = "Customer not found", body = ErrorBody),
    )
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ServiceError> {
    let Path(id) = id.map_err(rejected)?;
    state.customers.delete_customer(CustomerId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
