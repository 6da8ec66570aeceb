use async_trait::async_trait;
use sqlx::{
    migrate::{MigrateError, Migrator},
    sqlite::{SqlitePoolOptions, SqliteRow},
    Row, Sqlite, Transaction,
};
use std::time::Duration;

use crate::{
    models::{Customer, CustomerId, NewCustomer, PageRequest},
    repository::{CustomerRepository, CustomerTransaction, RepositoryError},
};

pub type DbPool = sqlx::SqlitePool;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

const CUSTOMER_COLUMNS: &str = "id, first_name, second_name, first_last_name, second_last_name,
                                email, address, phone, country, demonym";

fn row_to_customer(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());
    Ok(Customer {
        id: CustomerId(row.try_get("id").map_err(decode)?),
        first_name: row.try_get("first_name").map_err(decode)?,
        second_name: row.try_get("second_name").map_err(decode)?,
        first_last_name: row.try_get("first_last_name").map_err(decode)?,
        second_last_name: row.try_get("second_last_name").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        address: row.try_get("address").map_err(decode)?,
        phone: row.try_get("phone").map_err(decode)?,
        country: row.try_get("country").map_err(decode)?,
        demonym: row.try_get("demonym").map_err(decode)?,
    })
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
    (i64::from(page.size), offset)
}

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn begin(&self) -> Result<Box<dyn CustomerTransaction>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqlCustomerTransaction { tx }))
    }

    async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn find_all(&self, page: PageRequest) -> Result<Vec<Customer>, RepositoryError> {
        let (limit, offset) = page_bounds(page);
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_customer).collect()
    }

    async fn find_by_country(
        &self,
        country: &str,
        page: PageRequest,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let (limit, offset) = page_bounds(page);
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE country = ?
             ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(country)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_customer).collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(to_count(count))
    }

    async fn count_by_country(&self, country: &str) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE country = ?")
            .bind(country)
            .fetch_one(&self.pool)
            .await?;
        Ok(to_count(count))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

/// Rolls back on drop unless committed.
struct SqlCustomerTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl CustomerTransaction for SqlCustomerTransaction {
    async fn find_by_id(&mut self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn exists_by_email(&mut self, email: &str) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE email = ?")
            .bind(email)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count > 0)
    }

    async fn save(&mut self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO customers (first_name, second_name, first_last_name, second_last_name,
                                    email, address, phone, country, demonym)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&customer.first_name)
        .bind(&customer.second_name)
        .bind(&customer.first_last_name)
        .bind(&customer.second_last_name)
        .bind(&customer.email)
        .bind(&customer.address)
        .bind(&customer.phone)
        .bind(&customer.country)
        .bind(&customer.demonym)
        .execute(&mut *self.tx)
        .await?;

        Ok(customer.persisted(CustomerId(result.last_insert_rowid())))
    }

    async fn update(&mut self, customer: &Customer) -> Result<Option<Customer>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE customers
             SET email = ?, address = ?, phone = ?, country = ?, demonym = ?
             WHERE id = ?",
        )
        .bind(&customer.email)
        .bind(&customer.address)
        .bind(&customer.phone)
        .bind(&customer.country)
        .bind(&customer.demonym)
        .bind(customer.id.0)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(customer.id).await
    }

    async fn delete_by_id(&mut self, id: CustomerId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}
