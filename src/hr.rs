// 🏢 HR Preset - The employee snapshot
// Canonical tables, column aliases and the standard attribute catalogue for
// the employees / salaries / titles / departments exports.

use crate::reconciliation::{DerivedField, DerivedKind, SnapshotRequest};
use crate::resolver::{AttributeSpec, FallbackSource, PrimarySource};
use crate::schema::{SchemaNormalizer, TableSchema};

// ============================================================================
// TABLE & COLUMN NAMES
// ============================================================================

pub const EMPLOYEE: &str = "employee";
pub const SALARY: &str = "salary";
pub const TITLE: &str = "title";
pub const DEPARTMENT: &str = "department";
pub const DEPT_EMP: &str = "dept_emp";
pub const SNAPSHOT: &str = "snapshot";

/// Every table the preset knows, in load order
pub const TABLES: &[&str] = &[SALARY, EMPLOYEE, DEPARTMENT, TITLE, DEPT_EMP, SNAPSHOT];

pub const EMPLOYEE_ID: &str = "employee_id";
pub const FROM_DATE: &str = "from_date";
pub const AMOUNT: &str = "amount";
pub const GENDER: &str = "gender";

/// Optional registry columns, first match wins
pub const LOCATION_COLUMNS: &[&str] = &["location", "office", "office_location"];
pub const EMPLOYMENT_TYPE_COLUMNS: &[&str] = &["employment_type", "emp_type", "contract_type"];

pub const LATEST_SALARY: &str = "latest_salary";
pub const TITLE_ATTR: &str = "title";
pub const DEPT_NAME: &str = "dept_name";
pub const AGE: &str = "age";
pub const COMPANY_TENURE: &str = "company_tenure";

/// Default file name for a table
pub fn default_file(table: &str) -> Option<&'static str> {
    match table {
        EMPLOYEE => Some("employee.csv"),
        SALARY => Some("salary.csv"),
        TITLE => Some("title.csv"),
        DEPARTMENT => Some("department.csv"),
        DEPT_EMP => Some("department_employee.csv"),
        SNAPSHOT => Some("current_employee_snapshot.csv"),
        _ => None,
    }
}

// ============================================================================
// SCHEMAS
// ============================================================================

const GENDER_ALIASES: &[&str] = &["sex", "Gender", "Sex"];
const DATE_RANGE: &[&str] = &["from_date", "to_date"];
const PERSON_DATES: &[&str] = &["birth_date", "hire_date", "termination_date"];

fn with_gender_aliases(mut schema: TableSchema) -> TableSchema {
    for alias in GENDER_ALIASES {
        schema = schema.alias(*alias, GENDER);
    }
    schema
}

/// Schemas for every preset table
pub fn schemas() -> Vec<TableSchema> {
    vec![
        with_gender_aliases(
            TableSchema::new(EMPLOYEE)
                .alias("id", EMPLOYEE_ID)
                .key(EMPLOYEE_ID)
                .timestamps(PERSON_DATES)
                .synthesize_key(),
        ),
        TableSchema::new(SALARY)
            .alias("salary", AMOUNT)
            .alias("id", EMPLOYEE_ID)
            .key(EMPLOYEE_ID)
            .timestamps(DATE_RANGE)
            .numeric(&[AMOUNT]),
        TableSchema::new(TITLE)
            .alias("id", EMPLOYEE_ID)
            .key(EMPLOYEE_ID)
            .timestamps(DATE_RANGE),
        TableSchema::new(DEPT_EMP)
            .alias("id", EMPLOYEE_ID)
            .key(EMPLOYEE_ID)
            .timestamps(DATE_RANGE),
        TableSchema::new(DEPARTMENT)
            .alias("id", "dept_id")
            .alias("department_name", DEPT_NAME),
        with_gender_aliases(
            TableSchema::new(SNAPSHOT)
                .alias("id", EMPLOYEE_ID)
                .alias("department_name", DEPT_NAME)
                .alias("salary", LATEST_SALARY)
                .key(EMPLOYEE_ID)
                .timestamps(PERSON_DATES)
                .numeric(&[LATEST_SALARY]),
        ),
    ]
}

pub fn normalizer() -> SchemaNormalizer {
    schemas()
        .into_iter()
        .fold(SchemaNormalizer::new(), SchemaNormalizer::with_schema)
}

// ============================================================================
// SNAPSHOT REQUEST
// ============================================================================

/// employee registry + latest salary / title / department + age / tenure
pub fn snapshot_request() -> SnapshotRequest {
    SnapshotRequest::new(EMPLOYEE, EMPLOYEE_ID)
        .derive(DerivedField::new(AGE, "birth_date", DerivedKind::AgeYears))
        .derive(DerivedField::new(COMPANY_TENURE, "hire_date", DerivedKind::TenureYears))
        .attribute(
            AttributeSpec::new(LATEST_SALARY)
                .primary(PrimarySource::new(SALARY, AMOUNT, FROM_DATE))
                .fallback(FallbackSource::new(SNAPSHOT, LATEST_SALARY)),
        )
        .attribute(
            AttributeSpec::new(TITLE_ATTR)
                .primary(PrimarySource::new(TITLE, "title", FROM_DATE))
                .fallback(FallbackSource::new(SNAPSHOT, TITLE_ATTR)),
        )
        .attribute(
            AttributeSpec::new(DEPT_NAME)
                .primary(
                    PrimarySource::new(DEPT_EMP, "dept_id", FROM_DATE).with_lookup(
                        DEPARTMENT,
                        "dept_id",
                        DEPT_NAME,
                    ),
                )
                .fallback(FallbackSource::new(SNAPSHOT, DEPT_NAME)),
        )
}

// ============================================================================
// TESTS
// ============================================================================
