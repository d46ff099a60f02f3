//! PostgreSQL implementation of the store traits

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::error::DatabaseError;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{
    AdminStore, BookingStore, DashboardStats, LedgerStore, OtpStore, UserStore, WorkerStore,
};
use crate::{
    error::{DomainError, DomainResult},
    models::{
        Attendance, Booking, BookingFilter, BookingStatus, ContactMessage, Direction, NewBooking,
        NewContactMessage, NewOtp, NewTransaction, NewUser, NewWorkerProfile, Otp, Role,
        ServiceType, Transaction, TransactionFilter, TransactionKind, TransactionStatus, User,
        Worker, WorkerCandidate, transaction::reference,
    },
};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, phone, wallet_balance, is_active, created_at";

const WORKER_COLUMNS: &str = "user_id, services, is_available, pending_payouts, rating, skills, \
     is_active, last_settled_on, created_at";

const BOOKING_COLUMNS: &str = "id, customer_id, worker_id, service_type, scheduled_date, \
     scheduled_time, address, price, status, cancellation_reason, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, worker_id, booking_id, kind, direction, amount, \
     method, status, reference, created_at";

const ACTIVE_STATUSES: &str = "('assigned', 'confirmed', 'in-progress')";

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> DomainResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool.begin().await.map_err(query_error)
    }
}

fn query_error(err: sqlx::Error) -> DomainError {
    DomainError::Database(DatabaseError::Query(err))
}

/// Map a unique violation to `Conflict`, anything else to a query error
fn unique_or(err: sqlx::Error, conflict: &str) -> DomainError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DomainError::Conflict(conflict.to_string())
        }
        _ => query_error(err),
    }
}

fn parse_column<T: FromStr>(table: &'static str, value: &str) -> DomainResult<T> {
    value.parse().map_err(|_| {
        DomainError::Database(DatabaseError::CorruptRow {
            table,
            reason: format!("unexpected value {:?}", value),
        })
    })
}

fn user_from_row(row: &PgRow) -> DomainResult<User> {
    let role: String = row.get("role");

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: parse_column("users", &role)?,
        phone: row.get("phone"),
        wallet_balance: row.get("wallet_balance"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

fn worker_from_row(row: &PgRow) -> DomainResult<Worker> {
    let services: Vec<String> = row.get("services");

    Ok(Worker {
        id: row.get("user_id"),
        services: services
            .iter()
            .map(|s| parse_column("workers", s))
            .collect::<DomainResult<_>>()?,
        is_available: row.get("is_available"),
        pending_payouts: row.get("pending_payouts"),
        rating: row.get("rating"),
        skills: row.get("skills"),
        is_active: row.get("is_active"),
        last_settled_on: row.get("last_settled_on"),
        created_at: row.get("created_at"),
    })
}

fn booking_from_row(row: &PgRow) -> DomainResult<Booking> {
    let service_type: String = row.get("service_type");
    let status: String = row.get("status");

    Ok(Booking {
        id: row.get("id"),
        customer_id: row.get("customer_id"),
        worker_id: row.get("worker_id"),
        service_type: parse_column("bookings", &service_type)?,
        scheduled_date: row.get("scheduled_date"),
        scheduled_time: row.get("scheduled_time"),
        address: row.get("address"),
        price: row.get("price"),
        status: parse_column("bookings", &status)?,
        cancellation_reason: row.get("cancellation_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn transaction_from_row(row: &PgRow) -> DomainResult<Transaction> {
    let kind: String = row.get("kind");
    let direction: String = row.get("direction");
    let status: String = row.get("status");

    Ok(Transaction {
        id: row.get("id"),
        user_id: row.get("user_id"),
        worker_id: row.get("worker_id"),
        booking_id: row.get("booking_id"),
        kind: parse_column("transactions", &kind)?,
        direction: parse_column("transactions", &direction)?,
        amount: row.get("amount"),
        method: row.get("method"),
        status: parse_column("transactions", &status)?,
        reference: row.get("reference"),
        date: row.get("created_at"),
    })
}

fn attendance_from_row(row: &PgRow) -> Attendance {
    Attendance {
        id: row.get("id"),
        worker_id: row.get("worker_id"),
        work_date: row.get("work_date"),
        check_in: row.get("check_in"),
        check_out: row.get("check_out"),
    }
}

fn contact_from_row(row: &PgRow) -> ContactMessage {
    ContactMessage {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        subject: row.get("subject"),
        message: row.get("message"),
        created_at: row.get("created_at"),
    }
}

fn otp_from_row(row: &PgRow) -> Otp {
    Otp {
        id: row.get("id"),
        target: row.get("target"),
        code_hash: row.get("code_hash"),
        expires_at: row.get("expires_at"),
        consumed_at: row.get("consumed_at"),
        created_at: row.get("created_at"),
    }
}

/// Lock a booking row for the rest of the transaction and read its status
async fn lock_booking(conn: &mut PgConnection, id: Uuid) -> DomainResult<Option<BookingStatus>> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(query_error)?;

    status.map(|s| parse_column("bookings", &s)).transpose()
}

async fn transaction_on(conn: &mut PgConnection, reference: &str) -> DomainResult<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE reference = $1",
        TRANSACTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await
        .map_err(query_error)?;

    row.as_ref().map(transaction_from_row).transpose()
}

/// Append a ledger entry on an open connection, locking and updating the
/// wallet row when the entry moves money.
async fn append_on(conn: &mut PgConnection, entry: NewTransaction) -> DomainResult<Transaction> {
    if entry.moves_wallet() {
        let user_id = entry.user_id.unwrap_or_default();
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT wallet_balance FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(query_error)?;
        let balance = balance.ok_or_else(|| DomainError::not_found("User"))?;

        let next = balance + entry.signed_amount();
        if next < Decimal::ZERO {
            return Err(DomainError::InsufficientFunds {
                balance,
                requested: entry.amount,
            });
        }

        sqlx::query("UPDATE users SET wallet_balance = $2 WHERE id = $1")
            .bind(user_id)
            .bind(next)
            .execute(&mut *conn)
            .await
            .map_err(query_error)?;
    }

    let conflict = format!(
        "ledger entry {} already exists",
        entry.reference.as_deref().unwrap_or_default()
    );
    let sql = format!(
        r#"
        INSERT INTO transactions
            (id, user_id, worker_id, booking_id, kind, direction, amount, method, status, reference)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        TRANSACTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.worker_id)
        .bind(entry.booking_id)
        .bind(entry.kind.as_str())
        .bind(entry.direction.as_str())
        .bind(entry.amount)
        .bind(&entry.method)
        .bind(entry.status.as_str())
        .bind(&entry.reference)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| unique_or(e, &conflict))?;

    transaction_from_row(&row)
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(
        &self,
        new_user: NewUser,
        worker: Option<NewWorkerProfile>,
    ) -> DomainResult<User> {
        let mut tx = self.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, role, phone)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(new_user.role.as_str())
            .bind(&new_user.phone)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| unique_or(e, "Email already registered"))?;
        let user = user_from_row(&row)?;

        if let Some(profile) = worker {
            let services: Vec<String> = profile
                .services
                .iter()
                .map(|s| s.as_str().to_string())
                .collect();

            sqlx::query("INSERT INTO workers (user_id, services, skills) VALUES ($1, $2, $3)")
                .bind(user.id)
                .bind(services)
                .bind(profile.skills)
                .execute(&mut *tx)
                .await
                .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> DomainResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_phone(&self, phone: &str) -> DomainResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE phone = $1 ORDER BY created_at LIMIT 1",
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self, role: Option<Role>) -> DomainResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE ($1::text IS NULL OR role = $1) ORDER BY created_at DESC",
            USER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(role.map(|r| r.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(user_from_row).collect()
    }
}

#[async_trait]
impl WorkerStore for PgStore {
    async fn find_worker(&self, id: Uuid) -> DomainResult<Option<Worker>> {
        let sql = format!("SELECT {} FROM workers WHERE user_id = $1", WORKER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(worker_from_row).transpose()
    }

    async fn list_worker_candidates(
        &self,
        service_type: ServiceType,
    ) -> DomainResult<Vec<WorkerCandidate>> {
        let sql = format!(
            r#"
            SELECT w.user_id, w.services, w.is_available, w.pending_payouts, w.rating, w.skills,
                   w.is_active, w.last_settled_on, w.created_at, u.name,
                   (SELECT COUNT(*) FROM bookings b
                    WHERE b.worker_id = w.user_id AND b.status IN {}) AS active_assignments
            FROM workers w
            JOIN users u ON u.id = w.user_id
            WHERE w.is_active AND w.is_available AND $1 = ANY(w.services)
            "#,
            ACTIVE_STATUSES
        );
        let rows = sqlx::query(&sql)
            .bind(service_type.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(WorkerCandidate {
                    worker: worker_from_row(row)?,
                    name: row.get("name"),
                    active_assignments: row.get("active_assignments"),
                })
            })
            .collect()
    }

    async fn set_worker_availability(&self, id: Uuid, is_available: bool) -> DomainResult<Worker> {
        let sql = format!(
            "UPDATE workers SET is_available = $2 WHERE user_id = $1 RETURNING {}",
            WORKER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(is_available)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| DomainError::not_found("Worker"))?;

        worker_from_row(&row)
    }

    async fn deactivate_worker(&self, id: Uuid) -> DomainResult<Worker> {
        let mut tx = self.begin().await?;

        let sql = format!(
            "UPDATE workers SET is_active = FALSE, is_available = FALSE WHERE user_id = $1 \
             RETURNING {}",
            WORKER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?
            .ok_or_else(|| DomainError::not_found("Worker"))?;

        sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        worker_from_row(&row)
    }

    async fn workers_with_pending_payouts(&self) -> DomainResult<Vec<Uuid>> {
        sqlx::query_scalar("SELECT user_id FROM workers WHERE is_active AND pending_payouts > 0")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)
    }

    async fn settle_worker(&self, id: Uuid, on: NaiveDate) -> DomainResult<Option<Transaction>> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(
            "SELECT pending_payouts, last_settled_on FROM workers WHERE user_id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?
        .ok_or_else(|| DomainError::not_found("Worker"))?;

        let pending: Decimal = row.get("pending_payouts");
        let last_settled_on: Option<NaiveDate> = row.get("last_settled_on");
        if pending <= Decimal::ZERO || last_settled_on == Some(on) {
            return Ok(None);
        }

        let salary = append_on(
            &mut *tx,
            NewTransaction {
                user_id: None,
                worker_id: Some(id),
                booking_id: None,
                kind: TransactionKind::Salary,
                direction: Direction::Credit,
                amount: pending,
                method: "bank-transfer".to_string(),
                status: TransactionStatus::Completed,
                reference: Some(reference::payout(id, on)),
            },
        )
        .await?;

        sqlx::query(
            "UPDATE workers SET pending_payouts = 0, last_settled_on = $2 WHERE user_id = $1",
        )
        .bind(id)
        .bind(on)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(Some(salary))
    }

    async fn check_in(
        &self,
        worker_id: Uuid,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> DomainResult<Attendance> {
        let row = sqlx::query(
            r#"
            INSERT INTO attendance (id, worker_id, work_date, check_in)
            VALUES ($1, $2, $3, $4)
            RETURNING id, worker_id, work_date, check_in, check_out
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(worker_id)
        .bind(on)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_or(e, "Already checked in today"))?;

        Ok(attendance_from_row(&row))
    }

    async fn check_out(
        &self,
        worker_id: Uuid,
        on: NaiveDate,
        at: DateTime<Utc>,
    ) -> DomainResult<Attendance> {
        let row = sqlx::query(
            r#"
            UPDATE attendance SET check_out = $3
            WHERE worker_id = $1 AND work_date = $2 AND check_out IS NULL
            RETURNING id, worker_id, work_date, check_in, check_out
            "#,
        )
        .bind(worker_id)
        .bind(on)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        if let Some(row) = row {
            return Ok(attendance_from_row(&row));
        }

        let checked_in: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM attendance WHERE worker_id = $1 AND work_date = $2)",
        )
        .bind(worker_id)
        .bind(on)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        if checked_in {
            Err(DomainError::Conflict("Already checked out today".to_string()))
        } else {
            Err(DomainError::not_found("Check-in for today"))
        }
    }

    async fn list_attendance(&self, worker_id: Uuid) -> DomainResult<Vec<Attendance>> {
        let rows = sqlx::query(
            r#"
            SELECT id, worker_id, work_date, check_in, check_out
            FROM attendance
            WHERE worker_id = $1
            ORDER BY work_date DESC
            "#,
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows.iter().map(attendance_from_row).collect())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_booking(&self, new_booking: NewBooking) -> DomainResult<Booking> {
        let sql = format!(
            r#"
            INSERT INTO bookings
                (id, customer_id, service_type, scheduled_date, scheduled_time, address, price, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(new_booking.customer_id)
            .bind(new_booking.service_type.as_str())
            .bind(new_booking.scheduled_date)
            .bind(new_booking.scheduled_time)
            .bind(&new_booking.address)
            .bind(new_booking.price)
            .bind(BookingStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;

        booking_from_row(&row)
    }

    async fn find_booking(&self, id: Uuid) -> DomainResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> DomainResult<Vec<Booking>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM bookings
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::uuid IS NULL OR worker_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#,
            BOOKING_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.customer_id)
            .bind(filter.worker_id)
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(booking_from_row).collect()
    }

    async fn advance_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        worker_id: Option<Uuid>,
    ) -> DomainResult<Option<Booking>> {
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $3, worker_id = COALESCE($4, worker_id), updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn complete_booking(
        &self,
        id: Uuid,
        commission: NewTransaction,
        payout: Decimal,
    ) -> DomainResult<Option<(Booking, Transaction)>> {
        let mut tx = self.begin().await?;

        let worker_id: Option<Option<Uuid>> =
            sqlx::query_scalar("SELECT worker_id FROM bookings WHERE id = $1 AND status = $2 FOR UPDATE")
                .bind(id)
                .bind(BookingStatus::InProgress.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_error)?;
        let Some(worker_id) = worker_id else {
            return Ok(None);
        };

        let entry = append_on(&mut *tx, commission).await?;

        if let Some(worker_id) = worker_id {
            sqlx::query(
                "UPDATE workers SET pending_payouts = pending_payouts + $2 WHERE user_id = $1",
            )
            .bind(worker_id)
            .bind(payout)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        let sql = format!(
            "UPDATE bookings SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            BOOKING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(BookingStatus::Completed.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;
        let booking = booking_from_row(&row)?;

        tx.commit().await.map_err(query_error)?;
        Ok(Some((booking, entry)))
    }

    async fn cancel_booking(
        &self,
        id: Uuid,
        from: BookingStatus,
        reason: Option<String>,
    ) -> DomainResult<Option<(Booking, Option<Transaction>)>> {
        let mut tx = self.begin().await?;

        let status = lock_booking(&mut *tx, id).await?;
        if status != Some(from) {
            return Ok(None);
        }

        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $2, cancellation_reason = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(BookingStatus::Cancelled.as_str())
            .bind(&reason)
            .fetch_one(&mut *tx)
            .await
            .map_err(query_error)?;
        let booking = booking_from_row(&row)?;

        // Payments take the same row lock, so one committed before us is visible here
        let payment = transaction_on(&mut *tx, &reference::booking_payment(id))
            .await?
            .filter(|p| p.status == TransactionStatus::Completed);
        let refund = match payment {
            Some(payment) => Some(append_on(&mut *tx, NewTransaction::refund_of(&payment, id)).await?),
            None => None,
        };

        tx.commit().await.map_err(query_error)?;
        Ok(Some((booking, refund)))
    }

    async fn pay_booking(&self, id: Uuid, payment: NewTransaction) -> DomainResult<Transaction> {
        let mut tx = self.begin().await?;

        match lock_booking(&mut *tx, id).await? {
            None => return Err(DomainError::not_found("Booking")),
            Some(BookingStatus::Cancelled) => {
                return Err(DomainError::Conflict(
                    "Cannot pay for a cancelled booking".to_string(),
                ));
            }
            Some(_) => {}
        }

        if transaction_on(&mut *tx, &reference::booking_payment(id))
            .await?
            .is_some()
        {
            return Err(DomainError::Conflict("Booking already paid".to_string()));
        }

        let entry = append_on(&mut *tx, payment).await?;
        tx.commit().await.map_err(query_error)?;
        Ok(entry)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn append_transaction(&self, entry: NewTransaction) -> DomainResult<Transaction> {
        let mut tx = self.begin().await?;
        let appended = append_on(&mut *tx, entry).await?;
        tx.commit().await.map_err(query_error)?;
        Ok(appended)
    }

    async fn wallet_balance(&self, user_id: Uuid) -> DomainResult<Decimal> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT wallet_balance FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        balance.ok_or_else(|| DomainError::not_found("User"))
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> DomainResult<Vec<Transaction>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE ($1::uuid IS NULL OR user_id = $1 OR worker_id = $1)
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::uuid IS NULL OR booking_id = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#,
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.party_id)
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.booking_id)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> DomainResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE reference = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(transaction_from_row).transpose()
    }
}

#[async_trait]
impl AdminStore for PgStore {
    async fn dashboard_stats(&self) -> DomainResult<DashboardStats> {
        let mut stats = DashboardStats::default();

        let rows = sqlx::query("SELECT role, COUNT(*) AS n FROM users GROUP BY role")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        for row in rows {
            stats.users_by_role.insert(row.get("role"), row.get("n"));
        }

        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM bookings GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        for row in rows {
            stats.bookings_by_status.insert(row.get("status"), row.get("n"));
        }

        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE kind = 'commission'), 0) AS commission_revenue,
                COALESCE(SUM(amount) FILTER (WHERE kind = 'salary'), 0) AS settled_payouts
            FROM transactions
            WHERE status = 'completed'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;
        stats.commission_revenue = row.get("commission_revenue");
        stats.settled_payouts = row.get("settled_payouts");

        stats.pending_payouts =
            sqlx::query_scalar("SELECT COALESCE(SUM(pending_payouts), 0) FROM workers")
                .fetch_one(&self.pool)
                .await
                .map_err(query_error)?;

        Ok(stats)
    }

    async fn insert_contact(&self, message: NewContactMessage) -> DomainResult<ContactMessage> {
        let row = sqlx::query(
            r#"
            INSERT INTO contact_messages (id, name, email, subject, message)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, subject, message, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&message.name)
        .bind(&message.email)
        .bind(&message.subject)
        .bind(&message.message)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(contact_from_row(&row))
    }

    async fn list_contacts(&self) -> DomainResult<Vec<ContactMessage>> {
        let rows = sqlx::query(
            "SELECT id, name, email, subject, message, created_at FROM contact_messages \
             ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows.iter().map(contact_from_row).collect())
    }
}

#[async_trait]
impl OtpStore for PgStore {
    async fn insert_otp(&self, otp: NewOtp) -> DomainResult<Otp> {
        let row = sqlx::query(
            r#"
            INSERT INTO otps (id, target, code_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, target, code_hash, expires_at, consumed_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&otp.target)
        .bind(&otp.code_hash)
        .bind(otp.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(otp_from_row(&row))
    }

    async fn latest_live_otp(
        &self,
        target: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<Otp>> {
        let row = sqlx::query(
            r#"
            SELECT id, target, code_hash, expires_at, consumed_at, created_at
            FROM otps
            WHERE target = $1 AND consumed_at IS NULL AND expires_at > $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(target)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.as_ref().map(otp_from_row))
    }

    async fn consume_otp(&self, id: Uuid, now: DateTime<Utc>) -> DomainResult<bool> {
        let result =
            sqlx::query("UPDATE otps SET consumed_at = $2 WHERE id = $1 AND consumed_at IS NULL")
                .bind(id)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired_otps(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM otps WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(result.rows_affected())
    }
}
