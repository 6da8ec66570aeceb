use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ServiceError;

pub const MAX_PAGE_SIZE: u32 = 100;

/// Server-assigned identity. Set once by the repository on insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub i64);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted customer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub second_name: Option<String>,
    pub first_last_name: String,
    pub second_last_name: Option<String>,
    pub email: String,
    pub address: String,
    pub phone: String,
    /// Uppercase ISO alpha-2, always resolved through the country validator
    pub country: String,
    pub demonym: String,
}

/// Client-supplied data for a new customer. Carries no demonym: that only
/// ever comes from a successful country lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomerDraft {
    pub first_name: String,
    pub second_name: Option<String>,
    pub first_last_name: String,
    pub second_last_name: Option<String>,
    pub email: String,
    pub address: String,
    pub phone: String,
    pub country: String,
}

impl CustomerDraft {
    pub fn with_country(self, country: &CountryInfo) -> NewCustomer {
        NewCustomer {
            first_name: self.first_name,
            second_name: self.second_name,
            first_last_name: self.first_last_name,
            second_last_name: self.second_last_name,
            email: self.email,
            address: self.address,
            phone: self.phone,
            country: country.iso_code.clone(),
            demonym: country.demonym.clone(),
        }
    }
}

/// A validated customer that has not been assigned an id yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCustomer {
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

impl NewCustomer {
    pub fn persisted(self, id: CustomerId) -> Customer {
        Customer {
            id,
            first_name: self.first_name,
            second_name: self.second_name,
            first_last_name: self.first_last_name,
            second_last_name: self.second_last_name,
            email: self.email,
            address: self.address,
            phone: self.phone,
            country: self.country,
            demonym: self.demonym,
        }
    }
}

/// Fields an update may touch. `None` means "leave unchanged"; there is no
/// way to clear a field. Names are deliberately absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerPatch {
    pub email: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
}

impl CustomerPatch {
    /// Builds a patch treating blank strings as absent.
    pub fn from_optional(
        email: Option<String>,
        address: Option<String>,
        phone: Option<String>,
        country: Option<String>,
    ) -> Self {
        Self {
            email: non_blank(email),
            address: non_blank(address),
            phone: non_blank(phone),
            country: non_blank(country),
        }
    }

    pub fn without_blanks(self) -> Self {
        Self::from_optional(self.email, self.address, self.phone, self.country)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CountryInfo {
    pub iso_code: String,
    pub name: String,
    pub demonym: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Result<Self, ServiceError> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(ServiceError::validation(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {size}"
            )));
        }
        Ok(Self { page, size })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    /// Count of all matching records, not just this page
    pub total: u64,
}

impl<T> PageResponse<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResponse<U> {
        PageResponse {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
        }
    }
}
