//! PostgreSQL-backed applicant repository.
//!
//! Every write runs on a `sqlx::Transaction`; dropping the transaction
//! without committing rolls it back.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{FromRow, PgPool, Transaction};

use super::domain::{
    Address, AddressId, Applicant, ApplicantId, Form, FormId, HousingStatus, NewAddress,
    NewApplicant, NewForm,
};
use super::repository::{ApplicantRepository, ApplicantTransaction, RepositoryError};
use crate::config::DatabaseConfig;

const APPLICANT_COLUMNS: &str =
    "id, first_name, last_name, second_last_name, birth_date, phone, email, photo_url";
const ADDRESS_COLUMNS: &str = "id, applicant_id, street, exterior_number, interior_number, \
     neighborhood, municipality, state, postal_code";
const FORM_COLUMNS: &str =
    "id, applicant_id, household_size, monthly_income, housing_status, has_dependents, notes";

#[derive(Debug, FromRow)]
struct ApplicantRow {
    id: i32,
    first_name: String,
    last_name: String,
    second_last_name: Option<String>,
    birth_date: NaiveDate,
    phone: String,
    email: Option<String>,
    photo_url: Option<String>,
}

impl From<ApplicantRow> for Applicant {
    fn from(row: ApplicantRow) -> Self {
        Applicant {
            id: ApplicantId(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            second_last_name: row.second_last_name,
            birth_date: row.birth_date,
            phone: row.phone,
            email: row.email,
            photo_url: row.photo_url,
        }
    }
}

#[derive(Debug, FromRow)]
struct AddressRow {
    id: i32,
    applicant_id: i32,
    street: String,
    exterior_number: String,
    interior_number: Option<String>,
    neighborhood: String,
    municipality: String,
    state: String,
    postal_code: String,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Address {
            id: AddressId(row.id),
            applicant_id: ApplicantId(row.applicant_id),
            street: row.street,
            exterior_number: row.exterior_number,
            interior_number: row.interior_number,
            neighborhood: row.neighborhood,
            municipality: row.municipality,
            state: row.state,
            postal_code: row.postal_code,
        }
    }
}

#[derive(Debug, FromRow)]
struct FormRow {
    id: i32,
    applicant_id: i32,
    household_size: i16,
    monthly_income: i64,
    housing_status: String,
    has_dependents: bool,
    notes: Option<String>,
}

impl TryFrom<FormRow> for Form {
    type Error = RepositoryError;

    fn try_from(row: FormRow) -> Result<Self, Self::Error> {
        let housing_status = HousingStatus::from_label(&row.housing_status).ok_or_else(|| {
            RepositoryError::InvalidRow(format!(
                "form {} has unknown housing status '{}'",
                row.id, row.housing_status
            ))
        })?;

        Ok(Form {
            id: FormId(row.id),
            applicant_id: ApplicantId(row.applicant_id),
            household_size: row.household_size,
            monthly_income: row.monthly_income,
            housing_status,
            has_dependents: row.has_dependents,
            notes: row.notes,
        })
    }
}

/// Open a pool sized and timed from configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
}

/// Create the applicant tables when they do not exist yet.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("running applicant migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS applicants (
            id SERIAL PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            second_last_name TEXT,
            birth_date DATE NOT NULL,
            phone TEXT NOT NULL,
            email TEXT,
            photo_url TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS applicant_addresses (
            id SERIAL PRIMARY KEY,
            applicant_id INTEGER NOT NULL REFERENCES applicants(id) ON DELETE CASCADE,
            street TEXT NOT NULL,
            exterior_number TEXT NOT NULL,
            interior_number TEXT,
            neighborhood TEXT NOT NULL,
            municipality TEXT NOT NULL,
            state TEXT NOT NULL,
            postal_code TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS applicant_forms (
            id SERIAL PRIMARY KEY,
            applicant_id INTEGER NOT NULL REFERENCES applicants(id) ON DELETE CASCADE,
            household_size SMALLINT NOT NULL,
            monthly_income BIGINT NOT NULL,
            housing_status TEXT NOT NULL,
            has_dependents BOOLEAN NOT NULL DEFAULT FALSE,
            notes TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS applicant_addresses_applicant_idx \
         ON applicant_addresses (applicant_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Applicant repository over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgApplicantStore {
    pool: PgPool,
}

impl PgApplicantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ApplicantRepository for PgApplicantStore {
    async fn list(&self) -> Result<Vec<Applicant>, RepositoryError> {
        let rows: Vec<ApplicantRow> =
            sqlx::query_as(&format!("SELECT {APPLICANT_COLUMNS} FROM applicants ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Applicant::from).collect())
    }

    async fn fetch(&self, id: ApplicantId) -> Result<Option<Applicant>, RepositoryError> {
        let row: Option<ApplicantRow> =
            sqlx::query_as(&format!("SELECT {APPLICANT_COLUMNS} FROM applicants WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Applicant::from))
    }

    async fn address_for(
        &self,
        applicant: ApplicantId,
    ) -> Result<Option<Address>, RepositoryError> {
        let row: Option<AddressRow> = sqlx::query_as(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM applicant_addresses \
             WHERE applicant_id = $1 ORDER BY id LIMIT 1"
        ))
        .bind(applicant.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Address::from))
    }

    async fn begin(&self) -> Result<Box<dyn ApplicantTransaction>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgApplicantTransaction { tx }))
    }
}

struct PgApplicantTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ApplicantTransaction for PgApplicantTransaction {
    async fn fetch_applicant(
        &mut self,
        id: ApplicantId,
    ) -> Result<Option<Applicant>, RepositoryError> {
        let row: Option<ApplicantRow> = sqlx::query_as(&format!(
            "SELECT {APPLICANT_COLUMNS} FROM applicants WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Applicant::from))
    }

    async fn fetch_address(&mut self, id: AddressId) -> Result<Option<Address>, RepositoryError> {
        let row: Option<AddressRow> = sqlx::query_as(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM applicant_addresses WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Address::from))
    }

    async fn address_for(
        &mut self,
        applicant: ApplicantId,
    ) -> Result<Option<Address>, RepositoryError> {
        let row: Option<AddressRow> = sqlx::query_as(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM applicant_addresses \
             WHERE applicant_id = $1 ORDER BY id LIMIT 1 FOR UPDATE"
        ))
        .bind(applicant.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Address::from))
    }

    async fn insert_applicant(
        &mut self,
        applicant: NewApplicant,
        photo_url: Option<String>,
    ) -> Result<Applicant, RepositoryError> {
        let row: ApplicantRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO applicants
                (first_name, last_name, second_last_name, birth_date, phone, email, photo_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {APPLICANT_COLUMNS}
            "#
        ))
        .bind(applicant.first_name)
        .bind(applicant.last_name)
        .bind(applicant.second_last_name)
        .bind(applicant.birth_date)
        .bind(applicant.phone)
        .bind(applicant.email)
        .bind(photo_url)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn insert_address(
        &mut self,
        applicant: ApplicantId,
        address: NewAddress,
    ) -> Result<Address, RepositoryError> {
        let row: AddressRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO applicant_addresses
                (applicant_id, street, exterior_number, interior_number,
                 neighborhood, municipality, state, postal_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ADDRESS_COLUMNS}
            "#
        ))
        .bind(applicant.0)
        .bind(address.street)
        .bind(address.exterior_number)
        .bind(address.interior_number)
        .bind(address.neighborhood)
        .bind(address.municipality)
        .bind(address.state)
        .bind(address.postal_code)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn insert_form(
        &mut self,
        applicant: ApplicantId,
        form: NewForm,
    ) -> Result<Form, RepositoryError> {
        let row: FormRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO applicant_forms
                (applicant_id, household_size, monthly_income, housing_status,
                 has_dependents, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {FORM_COLUMNS}
            "#
        ))
        .bind(applicant.0)
        .bind(form.household_size)
        .bind(form.monthly_income)
        .bind(form.housing_status.label())
        .bind(form.has_dependents)
        .bind(form.notes)
        .fetch_one(&mut *self.tx)
        .await?;
        Form::try_from(row)
    }

    async fn update_applicant(
        &mut self,
        applicant: &Applicant,
    ) -> Result<Applicant, RepositoryError> {
        let row: Option<ApplicantRow> = sqlx::query_as(&format!(
            r#"
            UPDATE applicants
            SET first_name = $2, last_name = $3, second_last_name = $4,
                birth_date = $5, phone = $6, email = $7, photo_url = $8
            WHERE id = $1
            RETURNING {APPLICANT_COLUMNS}
            "#
        ))
        .bind(applicant.id.0)
        .bind(&applicant.first_name)
        .bind(&applicant.last_name)
        .bind(&applicant.second_last_name)
        .bind(applicant.birth_date)
        .bind(&applicant.phone)
        .bind(&applicant.email)
        .bind(&applicant.photo_url)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Applicant::from).ok_or(RepositoryError::Missing {
            resource: "applicant",
            id: applicant.id.0,
        })
    }

    async fn update_address(&mut self, address: &Address) -> Result<Address, RepositoryError> {
        let row: Option<AddressRow> = sqlx::query_as(&format!(
            r#"
            UPDATE applicant_addresses
            SET street = $2, exterior_number = $3, interior_number = $4,
                neighborhood = $5, municipality = $6, state = $7, postal_code = $8
            WHERE id = $1
            RETURNING {ADDRESS_COLUMNS}
            "#
        ))
        .bind(address.id.0)
        .bind(&address.street)
        .bind(&address.exterior_number)
        .bind(&address.interior_number)
        .bind(&address.neighborhood)
        .bind(&address.municipality)
        .bind(&address.state)
        .bind(&address.postal_code)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Address::from).ok_or(RepositoryError::Missing {
            resource: "address",
            id: address.id.0,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
