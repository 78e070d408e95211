//! Company persistence.
//!
//! Plain functions over a borrowed `rusqlite::Connection`, in the same shape
//! as the rest of the data layer: the HTTP layer checks a connection out of
//! the pool inside `spawn_blocking` and calls straight into these.
//!
//! Updates use an optimistic `version` column, so a writer holding a stale
//! copy gets [`CompanyError::EditConflict`] instead of silently overwriting a
//! concurrent change.

use company_types::{Company, CompanyType, NewCompany, ParseCompanyTypeError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CompanyError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("company not found: {0}")]
    NotFound(Uuid),
    #[error("a company named {0:?} already exists")]
    DuplicateName(String),
    #[error("company {0} was modified concurrently")]
    EditConflict(Uuid),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, description, employees, registered, company_type, version FROM companies";

/// A `companies` row before its text columns have been parsed.
struct RawCompany {
    id: String,
    name: String,
    description: Option<String>,
    employees: i64,
    registered: bool,
    company_type: String,
    version: i64,
}

impl RawCompany {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            employees: row.get(3)?,
            registered: row.get(4)?,
            company_type: row.get(5)?,
            version: row.get(6)?,
        })
    }

    fn into_company(self) -> Result<Company, CompanyError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| CompanyError::Corrupt(format!("id {:?}: {e}", self.id)))?;
        let company_type: CompanyType = self
            .company_type
            .parse()
            .map_err(|e: ParseCompanyTypeError| CompanyError::Corrupt(e.to_string()))?;
        Ok(Company {
            id,
            name: self.name,
            description: self.description,
            employees: self.employees,
            registered: self.registered,
            company_type,
            version: self.version,
        })
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Fetches a company by id.
///
/// # Errors
///
/// `CompanyError::NotFound` if no row has this id.
pub fn get_company(conn: &Connection, id: Uuid) -> Result<Company, CompanyError> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        [id.to_string()],
        RawCompany::from_row,
    )
    .optional()?
    .ok_or(CompanyError::NotFound(id))?
    .into_company()
}

/// Inserts a new company and returns its generated id.
///
/// # Errors
///
/// `CompanyError::DuplicateName` if the name is already taken.
pub fn create_company(conn: &Connection, company: &NewCompany) -> Result<Uuid, CompanyError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO companies (id, name, description, employees, registered, company_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            company.name,
            company.description,
            company.employees,
            company.registered,
            company.company_type.as_str(),
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            CompanyError::DuplicateName(company.name.clone())
        } else {
            CompanyError::Database(e)
        }
    })?;

    tracing::debug!(%id, name = %company.name, "company inserted");
    Ok(id)
}

/// Writes every field of `company`, guarded by its `version`.
///
/// Returns the stored company with its bumped version.
///
/// # Errors
///
/// `CompanyError::NotFound` if the row is gone, `CompanyError::EditConflict`
/// if it exists with a different version, `CompanyError::DuplicateName` if
/// the new name collides with another company.
pub fn update_company(conn: &Connection, company: &Company) -> Result<Company, CompanyError> {
    let count = conn
        .execute(
            "UPDATE companies
             SET name = ?1, description = ?2, employees = ?3, registered = ?4,
                 company_type = ?5, version = version + 1, updated_at = datetime('now')
             WHERE id = ?6 AND version = ?7",
            params![
                company.name,
                company.description,
                company.employees,
                company.registered,
                company.company_type.as_str(),
                company.id.to_string(),
                company.version,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                CompanyError::DuplicateName(company.name.clone())
            } else {
                CompanyError::Database(e)
            }
        })?;

    if count == 0 {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM companies WHERE id = ?1)",
            [company.id.to_string()],
            |row| row.get(0),
        )?;
        return Err(if exists {
            CompanyError::EditConflict(company.id)
        } else {
            CompanyError::NotFound(company.id)
        });
    }

    Ok(Company {
        version: company.version + 1,
        ..company.clone()
    })
}

/// Removes a company.
///
/// # Errors
///
/// `CompanyError::NotFound` if no row has this id.
pub fn delete_company(conn: &Connection, id: Uuid) -> Result<(), CompanyError> {
    let count = conn.execute("DELETE FROM companies WHERE id = ?1", [id.to_string()])?;
    if count == 0 {
        return Err(CompanyError::NotFound(id));
    }
    Ok(())
}
