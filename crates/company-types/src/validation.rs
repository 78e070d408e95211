//! Field-level validation for company data.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::{Company, CompanyInput, CompanyType, NewCompany};

/// Maximum length of a company name, in characters.
pub const NAME_MAX_LEN: usize = 15;
/// Maximum length of a company description, in characters.
pub const DESCRIPTION_MAX_LEN: usize = 3000;

/// Field name to error message map.
///
/// Serialises as a flat JSON object so it can be returned to clients as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    /// Records an error for `field` unless one is already present.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    /// Records `message` for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn check_name(errors: &mut ValidationErrors, name: &str) {
    errors.check(!name.trim().is_empty(), "name", "must be provided");
    errors.check(
        name.chars().count() <= NAME_MAX_LEN,
        "name",
        "must not be more than 15 characters long",
    );
}

fn check_description(errors: &mut ValidationErrors, description: Option<&str>) {
    if let Some(d) = description {
        errors.check(
            d.chars().count() <= DESCRIPTION_MAX_LEN,
            "description",
            "must not be more than 3000 characters long",
        );
    }
}

/// Validates a client submission for a new company.
///
/// # Errors
///
/// Returns every failing field at once.
pub fn validate_new_company(input: &CompanyInput) -> Result<NewCompany, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    match &input.name {
        Some(name) => check_name(&mut errors, name),
        None => errors.add("name", "must be provided"),
    }
    check_description(&mut errors, input.description.as_deref());
    match input.employees {
        Some(n) => errors.check(n > 0, "employees", "must be greater than zero"),
        None => errors.add("employees", "must be provided"),
    }
    errors.check(input.registered.is_some(), "registered", "must be provided");

    let company_type = match input.company_type.as_deref() {
        Some(label) => match label.parse::<CompanyType>() {
            Ok(t) => Some(t),
            Err(e) => {
                errors.add("type", e.to_string());
                None
            }
        },
        None => {
            errors.add("type", "must be provided");
            None
        }
    };

    match (
        errors.is_empty(),
        &input.name,
        input.employees,
        input.registered,
        company_type,
    ) {
        (true, Some(name), Some(employees), Some(registered), Some(company_type)) => {
            Ok(NewCompany {
                name: name.trim().to_string(),
                description: input.description.clone(),
                employees,
                registered,
                company_type,
            })
        }
        _ => Err(errors),
    }
}

/// Validates a fully populated company, typically after a patch was applied.
pub fn validate_company(company: &Company, errors: &mut ValidationErrors) {
    check_name(errors, &company.name);
    check_description(errors, company.description.as_deref());
    errors.check(
        company.employees > 0,
        "employees",
        "must be greater than zero",
    );
}
