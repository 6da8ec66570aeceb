use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{Customer, CustomerId, NewCustomer, PageRequest};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::UniqueViolation(db.message().to_string())
            }
            _ => Self::Database(err),
        }
    }
}

/// Read side of the customer store plus the entry point for write transactions.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CustomerTransaction>, RepositoryError>;

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError>;

    /// Ascending id order.
    async fn find_all(&self, page: PageRequest) -> Result<Vec<Customer>, RepositoryError>;

    async fn find_by_country(
        &self,
        country: &str,
        page: PageRequest,
    ) -> Result<Vec<Customer>, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;

    async fn count_by_country(&self, country: &str) -> Result<u64, RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// One atomic unit of work. Dropping it without `commit` discards every change.
#[async_trait]
pub trait CustomerTransaction: Send {
    async fn find_by_id(&mut self, id: CustomerId) -> Result<Option<Customer>, RepositoryError>;

    async fn exists_by_email(&mut self, email: &str) -> Result<bool, RepositoryError>;

    async fn save(&mut self, customer: NewCustomer) -> Result<Customer, RepositoryError>;

    /// Writes the mutable fields (email, address, phone, country, demonym).
    /// `None` when the id no longer exists.
    async fn update(&mut self, customer: &Customer) -> Result<Option<Customer>, RepositoryError>;

    async fn delete_by_id(&mut self, id: CustomerId) -> Result<bool, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

#[derive(Clone, Default)]
struct Store {
    customers: BTreeMap<CustomerId, Customer>,
    last_id: i64,
}

impl Store {
    fn email_taken(&self, email: &str, except: Option<CustomerId>) -> bool {
        self.customers.values().any(|c| c.email == email && Some(c.id) != except)
    }

    fn page<'a>(
        customers: impl Iterator<Item = &'a Customer>,
        page: PageRequest,
    ) -> Vec<Customer> {
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        customers.skip(offset).take(page.size as usize).cloned().collect()
    }
}

/// Process-local store. Writers are serialized and work on a private copy
/// that replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryCustomerRepository {
    store: Arc<Mutex<Store>>,
}

#[async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn begin(&self) -> Result<Box<dyn CustomerTransaction>, RepositoryError> {
        let guard = self.store.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.customers.get(&id).cloned())
    }

    async fn find_all(&self, page: PageRequest) -> Result<Vec<Customer>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(Store::page(store.customers.values(), page))
    }

    async fn find_by_country(
        &self,
        country: &str,
        page: PageRequest,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let store = self.store.lock().await;
        Ok(Store::page(store.customers.values().filter(|c| c.country == country), page))
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.customers.len() as u64)
    }

    async fn count_by_country(&self, country: &str) -> Result<u64, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store.customers.values().filter(|c| c.country == country).count() as u64)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<Store>,
    working: Store,
}

#[async_trait]
impl CustomerTransaction for InMemoryTransaction {
    async fn find_by_id(&mut self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn exists_by_email(&mut self, email: &str) -> Result<bool, RepositoryError> {
        Ok(self.working.email_taken(email, None))
    }

    async fn save(&mut self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        if self.working.email_taken(&customer.email, None) {
            return Err(RepositoryError::UniqueViolation("customers.email".to_string()));
        }
        self.working.last_id += 1;
        let saved = customer.persisted(CustomerId(self.working.last_id));
        self.working.customers.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn update(&mut self, customer: &Customer) -> Result<Option<Customer>, RepositoryError> {
        if !self.working.customers.contains_key(&customer.id) {
            return Ok(None);
        }
        if self.working.email_taken(&customer.email, Some(customer.id)) {
            return Err(RepositoryError::UniqueViolation("customers.email".to_string()));
        }
        let Some(stored) = self.working.customers.get_mut(&customer.id) else {
            return Ok(None);
        };
        stored.email = customer.email.clone();
        stored.address = customer.address.clone();
        stored.phone = customer.phone.clone();
        stored.country = customer.country.clone();
        stored.demonym = customer.demonym.clone();
        Ok(Some(stored.clone()))
    }

    async fn delete_by_id(&mut self, id: CustomerId) -> Result<bool, RepositoryError> {
        Ok(self.working.customers.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn new_customer(email: &str, country: &str) -> NewCustomer {
        NewCustomer {
            first_name: "John".to_string(),
            second_name: None,
            first_last_name: "Doe".to_string(),
            second_last_name: Some("Smith".to_string()),
            email: email.to_string(),
            address: "123 Main St".to_string(),
            phone: "+1 555 0100".to_string(),
            country: country.to_string(),
            demonym: "American".to_string(),
        }
    }

    #[tokio::test]
    async fn committed_saves_get_sequential_ids() {
        let repo = InMemoryCustomerRepository::default();

        let mut tx = repo.begin().await.unwrap();
        let first = tx.save(new_customer("a@example.com", "US")).await.unwrap();
        let second = tx.save(new_customer("b@example.com", "US")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.id, CustomerId(1));
        assert_eq!(second.id, CustomerId(2));
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.find_by_id(CustomerId(2)).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let repo = InMemoryCustomerRepository::default();

        let mut tx = repo.begin().await.unwrap();
        tx.save(new_customer("a@example.com", "US")).await.unwrap();
        drop(tx);

        assert_eq!(repo.count().await.unwrap(), 0);
        let mut tx = repo.begin().await.unwrap();
        assert!(!tx.exists_by_email("a@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_violates_uniqueness() {
        let repo = InMemoryCustomerRepository::default();
        let mut tx = repo.begin().await.unwrap();
        let first = tx.save(new_customer("a@example.com", "US")).await.unwrap();
        let mut second = tx.save(new_customer("b@example.com", "US")).await.unwrap();

        let err = tx.save(new_customer("a@example.com", "MX")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueViolation(_)));

        second.email = first.email.clone();
        let err = tx.update(&second).await.unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn update_only_touches_mutable_fields() {
        let repo = InMemoryCustomerRepository::default();
        let mut tx = repo.begin().await.unwrap();
        let saved = tx.save(new_customer("a@example.com", "US")).await.unwrap();

        let mut changed = saved.clone();
        changed.first_name = "Ignored".to_string();
        changed.phone = "+1 555 0199".to_string();
        let updated = tx.update(&changed).await.unwrap().unwrap();

        assert_eq!(updated.first_name, "John");
        assert_eq!(updated.phone, "+1 555 0199");

        changed.id = CustomerId(99);
        assert_eq!(tx.update(&changed).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_of_vanished_row_is_none_even_when_email_is_taken() {
        let repo = InMemoryCustomerRepository::default();
        let mut tx = repo.begin().await.unwrap();
        tx.save(new_customer("a@example.com", "US")).await.unwrap();
        let mut gone = tx.save(new_customer("b@example.com", "US")).await.unwrap();
        assert!(tx.delete_by_id(gone.id).await.unwrap());

        gone.email = "a@example.com".to_string();

        assert_eq!(tx.update(&gone).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pages_follow_insertion_order_and_filter_by_country() {
        let repo = InMemoryCustomerRepository::default();
        let mut tx = repo.begin().await.unwrap();
        for (i, country) in ["US", "MX", "US", "US"].iter().enumerate() {
            tx.save(new_customer(&format!("c{i}@example.com"), country)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let page = repo.find_all(PageRequest { page: 1, size: 3 }).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, CustomerId(4));

        let us = repo.find_by_country("US", PageRequest { page: 0, size: 2 }).await.unwrap();
        let ids: Vec<_> = us.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(repo.count_by_country("US").await.unwrap(), 3);
        assert_eq!(repo.count_by_country("CA").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_went_away() {
        let repo = InMemoryCustomerRepository::default();
        let mut tx = repo.begin().await.unwrap();
        let saved = tx.save(new_customer("a@example.com", "US")).await.unwrap();

        assert!(tx.delete_by_id(saved.id).await.unwrap());
        assert!(!tx.delete_by_id(saved.id).await.unwrap());
    }
}
