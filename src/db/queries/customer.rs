//! Customer database queries

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::upsert::CustomerStore;
use crate::types::{CustomerNote, CustomerRecord};

/// All records in an account sharing a `last10` match key, most recently
/// updated first.
pub async fn find_candidates_by_last10(
    pool: &PgPool,
    account_id: Uuid,
    last10: &str,
) -> Result<Vec<CustomerRecord>> {
    let customers = sqlx::query_as::<_, CustomerRecord>(
        r#"
        SELECT
            id, account_id, name, phone, phone_e164, phone_last10, email,
            address1, address2, city, state, zip_code, customer_type,
            vehicles, first_visit, last_completed_service,
            completed_service_count, lifetime_value, extra,
            created_at, updated_at
        FROM customers
        WHERE account_id = $1 AND phone_last10 = $2
        ORDER BY updated_at DESC
        "#,
    )
    .bind(account_id)
    .bind(last10)
    .fetch_all(pool)
    .await?;

    Ok(customers)
}

/// Get customer by ID
pub async fn get_customer(
    pool: &PgPool,
    account_id: Uuid,
    customer_id: Uuid,
) -> Result<Option<CustomerRecord>> {
    let customer = sqlx::query_as::<_, CustomerRecord>(
        r#"
        SELECT
            id, account_id, name, phone, phone_e164, phone_last10, email,
            address1, address2, city, state, zip_code, customer_type,
            vehicles, first_visit, last_completed_service,
            completed_service_count, lifetime_value, extra,
            created_at, updated_at
        FROM customers
        WHERE id = $1 AND account_id = $2
        "#,
    )
    .bind(customer_id)
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    Ok(customer)
}

/// Insert a new customer and its optional seed note in one transaction.
pub async fn insert_with_note(
    pool: &PgPool,
    record: &CustomerRecord,
    note: Option<&str>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO customers (
            id, account_id, name, phone, phone_e164, phone_last10, email,
            address1, address2, city, state, zip_code, customer_type,
            vehicles, first_visit, last_completed_service,
            completed_service_count, lifetime_value, extra,
            created_at, updated_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7,
            $8, $9, $10, $11, $12, $13,
            $14, $15, $16,
            $17, $18, $19,
            $20, $21
        )
        "#,
    )
    .bind(record.id)
    .bind(record.account_id)
    .bind(&record.name)
    .bind(&record.phone)
    .bind(&record.phone_e164)
    .bind(&record.phone_last10)
    .bind(&record.email)
    .bind(&record.address1)
    .bind(&record.address2)
    .bind(&record.city)
    .bind(&record.state)
    .bind(&record.zip_code)
    .bind(&record.customer_type)
    .bind(&record.vehicles)
    .bind(record.first_visit)
    .bind(record.last_completed_service)
    .bind(record.completed_service_count)
    .bind(record.lifetime_value)
    .bind(&record.extra)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut *tx)
    .await?;

    if let Some(body) = note {
        sqlx::query(
            r#"
            INSERT INTO customer_notes (id, customer_id, body, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.id)
        .bind(body)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Write a merged customer back and append its optional note in one
/// transaction.
pub async fn update_with_note(
    pool: &PgPool,
    record: &CustomerRecord,
    note: Option<&str>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE customers
        SET
            name = $3, phone = $4, phone_e164 = $5, phone_last10 = $6,
            email = $7, address1 = $8, address2 = $9, city = $10,
            state = $11, zip_code = $12, customer_type = $13,
            vehicles = $14, first_visit = $15, last_completed_service = $16,
            completed_service_count = $17, lifetime_value = $18, extra = $19,
            updated_at = $20
        WHERE id = $1 AND account_id = $2
        "#,
    )
    .bind(record.id)
    .bind(record.account_id)
    .bind(&record.name)
    .bind(&record.phone)
    .bind(&record.phone_e164)
    .bind(&record.phone_last10)
    .bind(&record.email)
    .bind(&record.address1)
    .bind(&record.address2)
    .bind(&record.city)
    .bind(&record.state)
    .bind(&record.zip_code)
    .bind(&record.customer_type)
    .bind(&record.vehicles)
    .bind(record.first_visit)
    .bind(record.last_completed_service)
    .bind(record.completed_service_count)
    .bind(record.lifetime_value)
    .bind(&record.extra)
    .bind(record.updated_at)
    .execute(&mut *tx)
    .await?;

    if let Some(body) = note {
        sqlx::query(
            r#"
            INSERT INTO customer_notes (id, customer_id, body, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.id)
        .bind(body)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// List a customer's notes, oldest first.
pub async fn list_notes(pool: &PgPool, customer_id: Uuid) -> Result<Vec<CustomerNote>> {
    let notes = sqlx::query_as::<_, CustomerNote>(
        r#"
        SELECT id, customer_id, body, created_at
        FROM customer_notes
        WHERE customer_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await?;

    Ok(notes)
}

/// Edit a single note. Returns false when the note does not exist under
/// this account/customer.
pub async fn update_note(
    pool: &PgPool,
    account_id: Uuid,
    customer_id: Uuid,
    note_id: Uuid,
    body: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE customer_notes
        SET body = $4
        FROM customers
        WHERE customer_notes.id = $3
          AND customer_notes.customer_id = customers.id
          AND customers.id = $2
          AND customers.account_id = $1
        "#,
    )
    .bind(account_id)
    .bind(customer_id)
    .bind(note_id)
    .bind(body)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a single note. Returns false when the note does not exist under
/// this account/customer.
pub async fn delete_note(
    pool: &PgPool,
    account_id: Uuid,
    customer_id: Uuid,
    note_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM customer_notes
        USING customers
        WHERE customer_notes.id = $3
          AND customer_notes.customer_id = customers.id
          AND customers.id = $2
          AND customers.account_id = $1
        "#,
    )
    .bind(account_id)
    .bind(customer_id)
    .bind(note_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Postgres-backed `CustomerStore` used by the import orchestrator.
pub struct PgCustomerStore {
    pool: PgPool,
}

impl PgCustomerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerStore for PgCustomerStore {
    async fn find_candidates(
        &self,
        account_id: Uuid,
        last10: &str,
    ) -> Result<Vec<CustomerRecord>> {
        find_candidates_by_last10(&self.pool, account_id, last10).await
    }

    async fn create(&self, record: &CustomerRecord, note: Option<&str>) -> Result<()> {
        insert_with_note(&self.pool, record, note).await
    }

    async fn update(&self, record: &CustomerRecord, note: Option<&str>) -> Result<()> {
        update_with_note(&self.pool, record, note).await
    }
}
