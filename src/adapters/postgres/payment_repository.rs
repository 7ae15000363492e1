//! PostgreSQL implementation of PaymentRepository.
//!
//! The conditional transition is a single
//! `UPDATE ... WHERE id = $1 AND status = 'pending' RETURNING ...`, so the
//! database decides the winner when signals race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, PackageId, PaymentId, Timestamp, UserId,
};
use crate::domain::payment::{
    CorrelationFields, CorrelationKey, Payment, PaymentCode, PaymentStatus, ProviderKind,
};
use crate::ports::{PaymentRepository, TransitionResult};

const PURCHASE_TOKEN_INDEX: &str = "payments_purchase_token_key";

const PAYMENT_COLUMNS: &str = "id, payment_code, user_id, package_id, amount, provider, status, \
                               correlation, created_at, updated_at";

/// PostgreSQL implementation of the PaymentRepository port.
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a payment.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    payment_code: String,
    user_id: String,
    package_id: String,
    amount: i64,
    provider: String,
    status: String,
    correlation: Json<CorrelationFields>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            code: PaymentCode::parse(row.payment_code).map_err(corrupt_row)?,
            user_id: UserId::new(row.user_id).map_err(corrupt_row)?,
            package_id: PackageId::new(row.package_id).map_err(corrupt_row)?,
            amount: row.amount,
            provider: row.provider.parse().map_err(corrupt_row)?,
            status: parse_status(&row.status)?,
            correlation: row.correlation.0,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn corrupt_row(err: impl std::fmt::Display) -> DomainError {
    DomainError::database(format!("Invalid payment row: {}", err))
}

fn parse_status(s: &str) -> Result<PaymentStatus, DomainError> {
    match s {
        "pending" => Ok(PaymentStatus::Pending),
        "success" => Ok(PaymentStatus::Success),
        "failed" => Ok(PaymentStatus::Failed),
        "canceled" => Ok(PaymentStatus::Canceled),
        _ => Err(DomainError::database(format!("Invalid status value: {}", s))),
    }
}

fn query_error(action: &str) -> impl Fn(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::database(format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, payment_code, user_id, package_id, amount, provider, status,
                correlation, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.code.as_str())
        .bind(payment.user_id.as_str())
        .bind(payment.package_id.as_str())
        .bind(payment.amount)
        .bind(payment.provider.as_str())
        .bind(payment.status.as_str())
        .bind(Json(&payment.correlation))
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("payments_payment_code_key") {
                    return DomainError::new(
                        ErrorCode::DuplicatePaymentCode,
                        format!("Payment code {} already exists", payment.code),
                    );
                }
            }
            DomainError::database(format!("Failed to insert payment: {}", e))
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("find payment"))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_code(&self, code: &PaymentCode) -> Result<Option<Payment>, DomainError> {
        let sql = format!("SELECT {} FROM payments WHERE payment_code = $1", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("find payment by code"))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_correlation(
        &self,
        provider: ProviderKind,
        key: &CorrelationKey,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = match key.field_name() {
            None => {
                let sql = format!(
                    "SELECT {} FROM payments WHERE provider = $1 AND payment_code = $2",
                    PAYMENT_COLUMNS
                );
                sqlx::query_as(&sql)
                    .bind(provider.as_str())
                    .bind(key.value())
                    .fetch_optional(&self.pool)
                    .await
            }
            Some(field) => {
                let sql = format!(
                    "SELECT {} FROM payments WHERE provider = $1 AND correlation ->> $2 = $3",
                    PAYMENT_COLUMNS
                );
                sqlx::query_as(&sql)
                    .bind(provider.as_str())
                    .bind(field)
                    .bind(key.value())
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(query_error("find payment by correlation"))?;

        row.map(Payment::try_from).transpose()
    }

    async fn try_transition(
        &self,
        id: &PaymentId,
        to: PaymentStatus,
        patch: &CorrelationFields,
        at: Timestamp,
    ) -> Result<TransitionResult, DomainError> {
        if to.is_pending() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Cannot transition a payment to pending",
            ));
        }

        let sql = format!(
            r#"
            UPDATE payments SET
                status = $2,
                correlation = correlation || $3,
                updated_at = $4
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );
        let updated: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .bind(to.as_str())
            .bind(Json(patch))
            .bind(at.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.constraint() == Some(PURCHASE_TOKEN_INDEX) {
                        return DomainError::new(
                            ErrorCode::PurchaseTokenReused,
                            "Purchase token already redeemed by another payment",
                        );
                    }
                }
                DomainError::database(format!("Failed to transition payment: {}", e))
            })?;

        if let Some(row) = updated {
            return Ok(TransitionResult::Transitioned(Payment::try_from(row)?));
        }

        // Lost the race or never pending. Terminal statuses never change, so
        // whatever is read now is the winner's status.
        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM payments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("read payment status"))?;

        match current {
            Some((status,)) => Ok(TransitionResult::AlreadyTerminal(parse_status(&status)?)),
            None => Err(DomainError::new(
                ErrorCode::PaymentNotFound,
                format!("Payment not found: {}", id),
            )),
        }
    }

    async fn patch_correlation(
        &self,
        id: &PaymentId,
        patch: &CorrelationFields,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                correlation = correlation || $2,
                updated_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(Json(patch))
        .execute(&self.pool)
        .await
        .map_err(query_error("patch payment correlation"))?;

        Ok(result.rows_affected() == 1)
    }
}
