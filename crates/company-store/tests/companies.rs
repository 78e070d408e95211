use company_store::{create_company, delete_company, get_company, update_company, CompanyError};
use company_types::{CompanyType, NewCompany};
use rusqlite::Connection;
use uuid::Uuid;

fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("should open in-memory db");
    company_db::run_migrations(&conn).expect("migrations should succeed");
    conn
}

fn company_one() -> NewCompany {
    NewCompany {
        name: "Company One".to_string(),
        description: Some("Description for company one".to_string()),
        employees: 100,
        registered: true,
        company_type: CompanyType::Corporations,
    }
}

#[test]
fn create_then_get_returns_same_fields() {
    let conn = test_db();
    let id = create_company(&conn, &company_one()).expect("create should succeed");

    let stored = get_company(&conn, id).expect("get should succeed");
    assert_eq!(stored.id, id);
    assert_eq!(stored.name, "Company One");
    assert_eq!(stored.description.as_deref(), Some("Description for company one"));
    assert_eq!(stored.employees, 100);
    assert!(stored.registered);
    assert_eq!(stored.company_type, CompanyType::Corporations);
    assert_eq!(stored.version, 1);
}

#[test]
fn get_unknown_id_is_not_found() {
    let conn = test_db();
    let missing = Uuid::parse_str("e2d3253c-3e65-4516-9318-d013fde56dca").unwrap();
    match get_company(&conn, missing) {
        Err(CompanyError::NotFound(id)) => assert_eq!(id, missing),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn duplicate_name_is_rejected() {
    let conn = test_db();
    create_company(&conn, &company_one()).unwrap();
    match create_company(&conn, &company_one()) {
        Err(CompanyError::DuplicateName(name)) => assert_eq!(name, "Company One"),
        other => panic!("expected DuplicateName, got {other:?}"),
    }
}

#[test]
fn update_bumps_version_and_persists() {
    let conn = test_db();
    let id = create_company(&conn, &company_one()).unwrap();

    let mut company = get_company(&conn, id).unwrap();
    company.employees = 2;
    company.description = None;
    let updated = update_company(&conn, &company).expect("update should succeed");
    assert_eq!(updated.version, 2);

    let stored = get_company(&conn, id).unwrap();
    assert_eq!(stored, updated);
    assert_eq!(stored.employees, 2);
    assert_eq!(stored.description, None);
}

#[test]
fn update_with_stale_version_conflicts() {
    let conn = test_db();
    let id = create_company(&conn, &company_one()).unwrap();

    let first = get_company(&conn, id).unwrap();
    let mut second = first.clone();
    update_company(&conn, &first).unwrap();

    second.employees = 7;
    assert!(matches!(
        update_company(&conn, &second),
        Err(CompanyError::EditConflict(_))
    ));
    assert_eq!(get_company(&conn, id).unwrap().employees, 100);
}

#[test]
fn update_missing_company_is_not_found() {
    let conn = test_db();
    let id = create_company(&conn, &company_one()).unwrap();
    let mut company = get_company(&conn, id).unwrap();
    delete_company(&conn, id).unwrap();

    company.employees = 5;
    assert!(matches!(
        update_company(&conn, &company),
        Err(CompanyError::NotFound(_))
    ));
}

#[test]
fn delete_twice_reports_not_found() {
    let conn = test_db();
    let id = create_company(&conn, &company_one()).unwrap();

    delete_company(&conn, id).expect("first delete should succeed");
    assert!(matches!(
        delete_company(&conn, id),
        Err(CompanyError::NotFound(_))
    ));
    assert!(matches!(get_company(&conn, id), Err(CompanyError::NotFound(_))));
}

#[test]
fn corrupt_type_label_is_reported() {
    let conn = test_db();
    let id = create_company(&conn, &company_one()).unwrap();
    conn.execute_batch("PRAGMA ignore_check_constraints = ON;").unwrap();
    conn.execute(
        "UPDATE companies SET company_type = 'Guild' WHERE id = ?1",
        [id.to_string()],
    )
    .unwrap();

    assert!(matches!(get_company(&conn, id), Err(CompanyError::Corrupt(_))));
}
