use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    country::CountryValidator,
    error::ServiceError,
    metrics::CustomerMetrics,
    models::{CountryInfo, Customer, CustomerDraft, CustomerId, CustomerPatch, PageRequest, PageResponse},
    repository::CustomerRepository,
};

/// Orchestrates customer workflows. Every write runs inside one repository
/// transaction; any abort drops it before commit.
#[derive(Clone)]
pub struct CustomerService {
    repository: Arc<dyn CustomerRepository>,
    countries: Arc<dyn CountryValidator>,
    metrics: Arc<CustomerMetrics>,
}

impl CustomerService {
    pub fn new(
        repository: Arc<dyn CustomerRepository>,
        countries: Arc<dyn CountryValidator>,
        metrics: Arc<CustomerMetrics>,
    ) -> Self {
        Self { repository, countries, metrics }
    }

    pub fn repository(&self) -> &Arc<dyn CustomerRepository> {
        &self.repository
    }

    pub fn metrics(&self) -> &CustomerMetrics {
        &self.metrics
    }

    async fn resolve_country(&self, code: &str) -> Result<CountryInfo, ServiceError> {
        info!(country = code, "validating country");
        match self.countries.find_by_iso_code(code).await {
            Ok(info) => {
                info!(
                    country = %info.iso_code,
                    name = %info.name,
                    demonym = %info.demonym,
                    "country validated"
                );
                Ok(info)
            }
            Err(e) => {
                warn!(country = code, error = %e, "country validation failed");
                Err(e.into())
            }
        }
    }

    pub async fn create_customer(&self, draft: CustomerDraft) -> Result<Customer, ServiceError> {
        self.metrics.track("create", self.create(draft)).await
    }

    pub async fn get_customer_by_id(&self, id: CustomerId) -> Result<Customer, ServiceError> {
        self.metrics.track("fetch", self.fetch(id)).await
    }

    pub async fn get_all_customers(
        &self,
        page: PageRequest,
    ) -> Result<PageResponse<Customer>, ServiceError> {
        self.metrics.track("fetch_all", self.fetch_all(page)).await
    }

    pub async fn get_customers_by_country(
        &self,
        country: &str,
        page: PageRequest,
    ) -> Result<PageResponse<Customer>, ServiceError> {
        self.metrics.track("fetch_by_country", self.fetch_by_country(country, page)).await
    }

    /// Applies each supplied, non-blank field independently. An email equal
    /// to the current one is a no-op for that field only. Nothing is written
    /// when no value actually changes.
    pub async fn update_customer(
        &self,
        id: CustomerId,
        patch: CustomerPatch,
    ) -> Result<Customer, ServiceError> {
        self.metrics.track("update", self.update(id, patch.without_blanks())).await
    }

    pub async fn delete_customer(&self, id: CustomerId) -> Result<bool, ServiceError> {
        self.metrics.track("delete", self.delete(id)).await
    }

    async fn create(&self, draft: CustomerDraft) -> Result<Customer, ServiceError> {
        info!(
            "creating customer {} {} {} {}",
            draft.first_name,
            draft.second_name.as_deref().unwrap_or(""),
            draft.first_last_name,
            draft.second_last_name.as_deref().unwrap_or("")
        );

        // country first: a doomed request must not check for email collisions
        let country = self.resolve_country(&draft.country).await?;

        let mut tx = self.repository.begin().await?;
        if tx.exists_by_email(&draft.email).await? {
            warn!(email = %draft.email, "email already registered");
            return Err(ServiceError::conflict(format!("Email already registered: {}", draft.email)));
        }

        let customer = tx.save(draft.with_country(&country)).await?;
        tx.commit().await?;

        info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    async fn fetch(&self, id: CustomerId) -> Result<Customer, ServiceError> {
        match self.repository.find_by_id(id).await? {
            Some(customer) => {
                info!(customer_id = %id, "customer found");
                Ok(customer)
            }
            None => {
                warn!(customer_id = %id, "customer not found");
                Err(ServiceError::not_found(format!("Customer not found: {id}")))
            }
        }
    }

    async fn fetch_all(&self, page: PageRequest) -> Result<PageResponse<Customer>, ServiceError> {
        info!(page = page.page, size = page.size, "fetching all customers");

        let items = self.repository.find_all(page).await?;
        let total = self.repository.count().await?;

        Ok(PageResponse { items, page: page.page, size: page.size, total })
    }

    async fn fetch_by_country(
        &self,
        country: &str,
        page: PageRequest,
    ) -> Result<PageResponse<Customer>, ServiceError> {
        info!(country, page = page.page, size = page.size, "fetching customers by country");

        let items = self.repository.find_by_country(country, page).await?;
        let total = self.repository.count_by_country(country).await?;

        Ok(PageResponse { items, page: page.page, size: page.size, total })
    }

    async fn update(&self, id: CustomerId, patch: CustomerPatch) -> Result<Customer, ServiceError> {
        info!(customer_id = %id, "updating customer");

        let mut tx = self.repository.begin().await?;
        let existing = tx.find_by_id(id).await?.ok_or_else(|| {
            warn!(customer_id = %id, "customer not found for update");
            ServiceError::not_found(format!("Customer not found for update: {id}"))
        })?;

        let mut updated = existing.clone();

        if let Some(code) = patch.country.as_deref() {
            let country = self.resolve_country(code).await?;
            updated.country = country.iso_code;
            updated.demonym = country.demonym;
        }

        if let Some(email) = patch.email {
            if email != existing.email {
                if tx.exists_by_email(&email).await? {
                    warn!(customer_id = %id, email = %email, "email already registered");
                    return Err(ServiceError::conflict(format!("Email already registered: {email}")));
                }
                updated.email = email;
            }
        }

        if let Some(address) = patch.address {
            updated.address = address;
        }
        if let Some(phone) = patch.phone {
            updated.phone = phone;
        }

        if updated == existing {
            info!(customer_id = %id, "update carries no changes");
            return Ok(existing);
        }

        let saved = tx.update(&updated).await?.ok_or_else(|| {
            error!(customer_id = %id, "customer vanished before update was persisted");
            ServiceError::inconsistency(format!("Error updating customer with ID: {id}"))
        })?;
        tx.commit().await?;

        info!(customer_id = %id, "customer updated");
        Ok(saved)
    }

    async fn delete(&self, id: CustomerId) -> Result<bool, ServiceError> {
        info!(customer_id = %id, "deleting customer");

        let mut tx = self.repository.begin().await?;
        if !tx.delete_by_id(id).await? {
            warn!(customer_id = %id, "customer not found for deletion");
            return Err(ServiceError::not_found(format!("Customer not found for deletion: {id}")));
        }
        tx.commit().await?;

        info!(customer_id = %id, "customer deleted");
        Ok(true)
    }
}
