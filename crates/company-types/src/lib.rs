//! Shared domain types for the company service.
//!
//! This crate holds the `Company` entity and the request-side shapes used to
//! create and patch it. Persistence, HTTP and event dispatch crates all depend
//! on it, and it depends on nothing else in the workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod validation;
pub use validation::{
    validate_company, validate_new_company, ValidationErrors, DESCRIPTION_MAX_LEN, NAME_MAX_LEN,
};

/// Legal form of a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanyType {
    /// A corporation.
    Corporations,
    /// A non-profit organisation.
    NonProfit,
    /// A cooperative.
    Cooperative,
    /// A sole proprietorship.
    #[serde(rename = "Sole Proprietorship")]
    SoleProprietorship,
}

impl CompanyType {
    /// Every supported company type, in display order.
    pub const ALL: [CompanyType; 4] = [
        Self::Corporations,
        Self::NonProfit,
        Self::Cooperative,
        Self::SoleProprietorship,
    ];

    /// Returns the canonical label stored in the database and sent over the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Corporations => "Corporations",
            Self::NonProfit => "NonProfit",
            Self::Cooperative => "Cooperative",
            Self::SoleProprietorship => "Sole Proprietorship",
        }
    }
}

impl std::fmt::Display for CompanyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CompanyType {
    type Err = ParseCompanyTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseCompanyTypeError(s.to_string()))
    }
}

/// Error returned when parsing an unknown company type label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown company type: {0}")]
pub struct ParseCompanyTypeError(pub String);

/// A persisted company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Server-assigned identifier.
    pub id: Uuid,
    /// Unique display name.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Number of employees.
    pub employees: i64,
    /// Whether the company is officially registered.
    pub registered: bool,
    /// Legal form.
    #[serde(rename = "type")]
    pub company_type: CompanyType,
    /// Optimistic concurrency version, bumped on every update.
    #[serde(skip_serializing, default)]
    pub version: i64,
}

/// A validated company that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompany {
    pub name: String,
    pub description: Option<String>,
    pub employees: i64,
    pub registered: bool,
    pub company_type: CompanyType,
}

/// Raw company fields as submitted by a client.
///
/// Every field is optional so that missing values surface as validation
/// errors instead of deserialization failures. The same shape doubles as a
/// PATCH body, where absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompanyInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub employees: Option<i64>,
    pub registered: Option<bool>,
    #[serde(rename = "type")]
    pub company_type: Option<String>,
}

impl CompanyInput {
    /// Returns `true` if no field was supplied.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.employees.is_none()
            && self.registered.is_none()
            && self.company_type.is_none()
    }

    /// Overlays the supplied fields onto `company`, leaving the others intact.
    ///
    /// An unknown type label is reported through `errors` and leaves the
    /// stored type untouched.
    pub fn apply_to(&self, company: &mut Company, errors: &mut ValidationErrors) {
        if let Some(name) = &self.name {
            company.name = name.clone();
        }
        if let Some(description) = &self.description {
            company.description = Some(description.clone());
        }
        if let Some(employees) = self.employees {
            company.employees = employees;
        }
        if let Some(registered) = self.registered {
            company.registered = registered;
        }
        if let Some(label) = &self.company_type {
            match label.parse() {
                Ok(t) => company.company_type = t,
                Err(e) => errors.add("type", e.to_string()),
            }
        }
    }
}
