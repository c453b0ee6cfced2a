use std::{env, fs, path::Path};

use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{hash_password, new_id},
    models::{AppointmentDetail, AppointmentRow, AppointmentServiceRow, ROLE_ADMIN},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Creates a default business and admin account on first boot so the API is
/// usable out of the box.
pub async fn seed_defaults(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM businesses LIMIT 1")
        .fetch_optional(pool)
        .await?;
    let business_id = match existing {
        Some((id,)) => id,
        None => seed_business(pool).await?,
    };
    seed_admin(pool, &business_id).await?;
    Ok(())
}

pub async fn log_activity(
    pool: &SqlitePool,
    kind: &str,
    message: &str,
    user_id: Option<&str>,
    appointment_id: Option<&str>,
) {
    let result = sqlx::query(
        r#"INSERT INTO activities (id, kind, message, created_at, user_id, appointment_id)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(kind)
    .bind(message)
    .bind(Utc::now().to_rfc3339())
    .bind(user_id)
    .bind(appointment_id)
    .execute(pool)
    .await;

    if let Err(err) = result {
        log::warn!("activity insert failed: {err}");
    }
}

pub async fn fetch_appointment(
    pool: &SqlitePool,
    business_id: &str,
    appointment_id: &str,
) -> Result<Option<AppointmentDetail>, sqlx::Error> {
    let row = sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, business_id, business_client_id, date, start_time, end_time,
                  start_minutes, end_minutes, total_duration_min, status,
                  status_changed_at, created_at, updated_at
           FROM appointments
           WHERE id = ? AND business_id = ?
           LIMIT 1"#,
    )
    .bind(appointment_id)
    .bind(business_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let services = fetch_service_rows(pool, &row.id).await?;
    Ok(Some(AppointmentDetail::from_rows(row, services)))
}

pub async fn fetch_appointments(
    pool: &SqlitePool,
    business_id: &str,
) -> Result<Vec<AppointmentDetail>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AppointmentRow>(
        r#"SELECT id, business_id, business_client_id, date, start_time, end_time,
                  start_minutes, end_minutes, total_duration_min, status,
                  status_changed_at, created_at, updated_at
           FROM appointments
           WHERE business_id = ?
           ORDER BY date, start_minutes"#,
    )
    .bind(business_id)
    .fetch_all(pool)
    .await?;

    let mut appointments = Vec::with_capacity(rows.len());
    for row in rows {
        let services = fetch_service_rows(pool, &row.id).await?;
        appointments.push(AppointmentDetail::from_rows(row, services));
    }
    Ok(appointments)
}

async fn fetch_service_rows(
    pool: &SqlitePool,
    appointment_id: &str,
) -> Result<Vec<AppointmentServiceRow>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentServiceRow>(
        r#"SELECT id, appointment_id, service_id, staff_id, position, start_minutes, end_minutes
           FROM appointment_services
           WHERE appointment_id = ?
           ORDER BY position"#,
    )
    .bind(appointment_id)
    .fetch_all(pool)
    .await
}

async fn seed_business(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let name = env::var("BUSINESS_NAME").unwrap_or_else(|_| "Slotwise Demo".to_string());
    let hours = serde_json::json!({
        "monday": { "open": "09:00", "close": "17:00" },
        "tuesday": { "open": "09:00", "close": "17:00" },
        "wednesday": { "open": "09:00", "close": "17:00" },
        "thursday": { "open": "09:00", "close": "17:00" },
        "friday": { "open": "09:00", "close": "17:00" }
    })
    .to_string();

    let business_id = new_id();
    sqlx::query(
        r#"INSERT INTO businesses (id, name, business_hours, slot_interval_min, created_at)
           VALUES (?, ?, ?, 30, ?)"#,
    )
    .bind(&business_id)
    .bind(name)
    .bind(hours)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(business_id)
}

async fn seed_admin(pool: &SqlitePool, business_id: &str) -> Result<(), sqlx::Error> {
    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(ROLE_ADMIN)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let username = env::var("ADMIN_USER").unwrap_or_else(|_| "admin".to_string());
    let password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let display_name = env::var("ADMIN_DISPLAY_NAME").unwrap_or_else(|_| "Administrator".to_string());

    if password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    let password_hash = hash_password(&password)
        .map_err(|_| sqlx::Error::Protocol("password hash failed".into()))?;

    sqlx::query(
        r#"INSERT INTO users (id, business_id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(new_id())
    .bind(business_id)
    .bind(username)
    .bind(display_name)
    .bind(ROLE_ADMIN)
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
