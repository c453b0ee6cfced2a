use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::auth::new_id;
use crate::availability::ResolvedService;
use crate::catalog::load_slot_context;
use crate::db::{fetch_appointment, log_activity};
use crate::error::BookingError;
use crate::models::{
    AppointmentDetail, AppointmentRow, ServiceRequest, STATUS_CANCELED, STATUS_COMPLETED,
    STATUS_SCHEDULED,
};
use crate::state::AppState;
use crate::timeutil::{parse_date, to_clock, to_minutes};

/// Advisory locks keyed by (business, date), held across
/// recheck + resolve + persist. Closes the gap between an availability
/// query and the commit: for one business day, bookings serialize.
#[derive(Default)]
pub struct BookingLocks {
    inner: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl BookingLocks {
    pub async fn acquire(&self, business_id: &str, date: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry((business_id.to_string(), date.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentInput {
    pub business_client_id: String,
    pub date: String,
    pub start_time: String,
    #[serde(default)]
    pub services: Vec<ServiceRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdateInput {
    pub id: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub services: Option<Vec<ServiceRequest>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub business_client_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusNotice {
    pub status: String,
    pub msg: String,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(AppointmentDetail),
    /// Mutation against a terminal appointment: nothing changed, the payload
    /// names the stored status and when it was entered.
    Unchanged(StatusNotice),
}

pub async fn create_appointment(
    state: &AppState,
    business_id: &str,
    input: &AppointmentInput,
) -> Result<AppointmentDetail, BookingError> {
    if input.business_client_id.trim().is_empty() {
        return Err(BookingError::MissingField("businessClientId"));
    }
    // Dates are normalized back to zero-padded ISO so every stored row and
    // busy-range query shares one key per day.
    let date = parse_date(&input.date)
        .ok_or(BookingError::MissingField("date"))?
        .format("%Y-%m-%d")
        .to_string();
    if input.start_time.trim().is_empty() {
        return Err(BookingError::MissingField("startTime"));
    }
    if input.services.is_empty() {
        return Err(BookingError::MissingField("services"));
    }
    ensure_client(&state.db, business_id, &input.business_client_id).await?;

    let _guard = state.locks.acquire(business_id, &date).await;

    let mut retried = false;
    loop {
        let resolved = validated_assignment(
            &state.db,
            business_id,
            &date,
            &input.start_time,
            &input.services,
            None,
        )
        .await?;

        match persist_new(
            &state.db,
            business_id,
            &input.business_client_id,
            &date,
            &resolved,
        )
        .await
        {
            Ok(appointment_id) => {
                log_activity(
                    &state.db,
                    "appointment_created",
                    &format!("Appointment scheduled for {} {}.", date, input.start_time),
                    None,
                    Some(&appointment_id),
                )
                .await;
                return fetch_appointment(&state.db, business_id, &appointment_id)
                    .await?
                    .ok_or(BookingError::AppointmentNotFound);
            }
            // One re-validation pass after a store-level collision; a second
            // collision surfaces as a lost slot.
            Err(BookingError::StoreConflict) if !retried => {
                retried = true;
                continue;
            }
            Err(BookingError::StoreConflict) => return Err(BookingError::SlotUnavailable),
            Err(err) => return Err(err),
        }
    }
}

pub async fn update_appointment(
    state: &AppState,
    business_id: &str,
    input: &AppointmentUpdateInput,
) -> Result<UpdateOutcome, BookingError> {
    if input.id.trim().is_empty() {
        return Err(BookingError::MissingField("id"));
    }
    let current = fetch_row(&state.db, business_id, &input.id)
        .await?
        .ok_or(BookingError::AppointmentNotFound)?;

    let requested_status = input.status.as_deref().unwrap_or(STATUS_SCHEDULED);
    if requested_status != STATUS_SCHEDULED {
        return apply_status(state, business_id, &current, requested_status).await;
    }

    if current.status != STATUS_SCHEDULED {
        return Err(BookingError::AppointmentTerminalState {
            status: current.status.clone(),
            changed_at: transition_time(&current),
        });
    }

    let date = trimmed(input.date.as_deref())
        .and_then(parse_date)
        .ok_or(BookingError::MissingField("date"))?
        .format("%Y-%m-%d")
        .to_string();
    let start_time =
        trimmed(input.start_time.as_deref()).ok_or(BookingError::MissingField("startTime"))?;
    let services = input
        .services
        .as_deref()
        .filter(|services| !services.is_empty())
        .ok_or(BookingError::MissingField("services"))?;
    let client_id = trimmed(input.business_client_id.as_deref());
    if let Some(client_id) = client_id {
        ensure_client(&state.db, business_id, client_id).await?;
    }

    let _guard = state.locks.acquire(business_id, &date).await;

    let mut retried = false;
    loop {
        let resolved = validated_assignment(
            &state.db,
            business_id,
            &date,
            start_time,
            services,
            Some(&current.id),
        )
        .await?;

        match persist_update(&state.db, business_id, &current.id, client_id, &date, &resolved).await
        {
            Ok(()) => {
                log_activity(
                    &state.db,
                    "appointment_rescheduled",
                    &format!("Appointment moved to {date} {start_time}."),
                    None,
                    Some(&current.id),
                )
                .await;
                let detail = fetch_appointment(&state.db, business_id, &current.id)
                    .await?
                    .ok_or(BookingError::AppointmentNotFound)?;
                return Ok(UpdateOutcome::Updated(detail));
            }
            Err(BookingError::StoreConflict) if !retried => {
                retried = true;
                continue;
            }
            Err(BookingError::StoreConflict) => return Err(BookingError::SlotUnavailable),
            Err(err) => return Err(err),
        }
    }
}

pub async fn cancel_appointment(
    state: &AppState,
    business_id: &str,
    appointment_id: &str,
) -> Result<StatusNotice, BookingError> {
    if appointment_id.trim().is_empty() {
        return Err(BookingError::MissingField("id"));
    }
    let current = fetch_row(&state.db, business_id, appointment_id)
        .await?
        .ok_or(BookingError::AppointmentNotFound)?;

    if current.status != STATUS_SCHEDULED {
        return Ok(terminal_notice(&current));
    }

    mark_canceled(&state.db, &current).await?;
    log_activity(
        &state.db,
        "appointment_canceled",
        &format!("Appointment for {} {} canceled.", current.date, current.start_time),
        None,
        Some(appointment_id),
    )
    .await;

    Ok(StatusNotice {
        status: STATUS_CANCELED.to_string(),
        msg: "Appointment canceled successfully".to_string(),
    })
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn transition_time(appointment: &AppointmentRow) -> String {
    appointment
        .status_changed_at
        .clone()
        .unwrap_or_else(|| appointment.updated_at.clone())
}

fn terminal_notice(appointment: &AppointmentRow) -> StatusNotice {
    let when = transition_time(appointment);
    let msg = if appointment.status == STATUS_CANCELED {
        format!("Appointment was canceled on {when}")
    } else {
        format!("Appointment was completed on {when}")
    };
    StatusNotice {
        status: appointment.status.clone(),
        msg,
    }
}

/// Re-runs the availability computation for the target day, confirms the
/// requested start is still among the valid slots, and fixes staff
/// assignments for it.
async fn validated_assignment(
    pool: &SqlitePool,
    business_id: &str,
    date: &str,
    start_time: &str,
    services: &[ServiceRequest],
    exclude_appointment_id: Option<&str>,
) -> Result<Vec<ResolvedService>, BookingError> {
    let start = to_minutes(start_time).ok_or(BookingError::MissingField("startTime"))?;

    let ctx = load_slot_context(pool, business_id, date, services, exclude_appointment_id)
        .await?
        .ok_or(BookingError::BusinessHoursUnavailable)?;

    let slots = ctx.compute_slots();
    if !slots.iter().any(|slot| to_minutes(slot) == Some(start)) {
        return Err(BookingError::SlotUnavailable);
    }
    ctx.resolve(start_time)
}

async fn ensure_client(
    pool: &SqlitePool,
    business_id: &str,
    client_id: &str,
) -> Result<(), BookingError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM business_clients WHERE id = ? AND business_id = ?",
    )
    .bind(client_id)
    .bind(business_id)
    .fetch_one(pool)
    .await
    .map_err(BookingError::from_db)?;

    if count == 0 {
        return Err(BookingError::MissingField("businessClientId"));
    }
    Ok(())
}

async fn fetch_row(
    pool: &SqlitePool,
    business_id: &str,
    appointment_id: &str,
) -> Result<Option<AppointmentRow>, BookingError> {
    sqlx::query_as::<_, AppointmentRow>(
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
    .await
    .map_err(BookingError::from_db)
}

async fn persist_new(
    pool: &SqlitePool,
    business_id: &str,
    client_id: &str,
    date: &str,
    resolved: &[ResolvedService],
) -> Result<String, BookingError> {
    let first = resolved.first().ok_or(BookingError::MissingField("services"))?;
    let last = resolved.last().ok_or(BookingError::MissingField("services"))?;

    let appointment_id = new_id();
    let now = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await.map_err(BookingError::from_db)?;
    sqlx::query(
        r#"INSERT INTO appointments
           (id, business_id, business_client_id, date, start_time, end_time,
            start_minutes, end_minutes, total_duration_min, status, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&appointment_id)
    .bind(business_id)
    .bind(client_id)
    .bind(date)
    .bind(to_clock(first.start))
    .bind(to_clock(last.end))
    .bind(first.start)
    .bind(last.end)
    .bind(last.end - first.start)
    .bind(STATUS_SCHEDULED)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(BookingError::from_db)?;

    insert_service_rows(&mut tx, &appointment_id, business_id, date, resolved).await?;
    tx.commit().await.map_err(BookingError::from_db)?;

    Ok(appointment_id)
}

async fn persist_update(
    pool: &SqlitePool,
    business_id: &str,
    appointment_id: &str,
    client_id: Option<&str>,
    date: &str,
    resolved: &[ResolvedService],
) -> Result<(), BookingError> {
    let first = resolved.first().ok_or(BookingError::MissingField("services"))?;
    let last = resolved.last().ok_or(BookingError::MissingField("services"))?;

    let now = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await.map_err(BookingError::from_db)?;
    sqlx::query(
        r#"UPDATE appointments
           SET business_client_id = COALESCE(?, business_client_id),
               date = ?, start_time = ?, end_time = ?,
               start_minutes = ?, end_minutes = ?, total_duration_min = ?,
               updated_at = ?
           WHERE id = ?"#,
    )
    .bind(client_id)
    .bind(date)
    .bind(to_clock(first.start))
    .bind(to_clock(last.end))
    .bind(first.start)
    .bind(last.end)
    .bind(last.end - first.start)
    .bind(&now)
    .bind(appointment_id)
    .execute(&mut *tx)
    .await
    .map_err(BookingError::from_db)?;

    sqlx::query("DELETE FROM appointment_services WHERE appointment_id = ?")
        .bind(appointment_id)
        .execute(&mut *tx)
        .await
        .map_err(BookingError::from_db)?;

    insert_service_rows(&mut tx, appointment_id, business_id, date, resolved).await?;
    tx.commit().await.map_err(BookingError::from_db)?;

    Ok(())
}

async fn insert_service_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    appointment_id: &str,
    business_id: &str,
    date: &str,
    resolved: &[ResolvedService],
) -> Result<(), BookingError> {
    for (position, service) in resolved.iter().enumerate() {
        sqlx::query(
            r#"INSERT INTO appointment_services
               (id, appointment_id, business_id, date, service_id, staff_id,
                position, start_minutes, end_minutes, blocking)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)"#,
        )
        .bind(new_id())
        .bind(appointment_id)
        .bind(business_id)
        .bind(date)
        .bind(&service.service_id)
        .bind(&service.staff_id)
        .bind(position as i64)
        .bind(service.start)
        .bind(service.end)
        .execute(&mut **tx)
        .await
        .map_err(BookingError::from_db)?;
    }
    Ok(())
}

async fn apply_status(
    state: &AppState,
    business_id: &str,
    current: &AppointmentRow,
    status: &str,
) -> Result<UpdateOutcome, BookingError> {
    if current.status != STATUS_SCHEDULED {
        return Ok(UpdateOutcome::Unchanged(terminal_notice(current)));
    }

    match status {
        STATUS_CANCELED => mark_canceled(&state.db, current).await?,
        STATUS_COMPLETED => mark_completed(&state.db, current).await?,
        _ => return Err(BookingError::MissingField("status")),
    }

    let detail = fetch_appointment(&state.db, business_id, &current.id)
        .await?
        .ok_or(BookingError::AppointmentNotFound)?;
    Ok(UpdateOutcome::Updated(detail))
}

async fn mark_canceled(pool: &SqlitePool, current: &AppointmentRow) -> Result<(), BookingError> {
    let now = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await.map_err(BookingError::from_db)?;
    sqlx::query(
        "UPDATE appointments SET status = ?, status_changed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(STATUS_CANCELED)
    .bind(&now)
    .bind(&now)
    .bind(&current.id)
    .execute(&mut *tx)
    .await
    .map_err(BookingError::from_db)?;

    // Canceled blocks stop occupying staff: they drop out of busy-range
    // queries and out of the slot uniqueness index.
    sqlx::query("UPDATE appointment_services SET blocking = 0 WHERE appointment_id = ?")
        .bind(&current.id)
        .execute(&mut *tx)
        .await
        .map_err(BookingError::from_db)?;

    tx.commit().await.map_err(BookingError::from_db)
}

async fn mark_completed(pool: &SqlitePool, current: &AppointmentRow) -> Result<(), BookingError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE appointments SET status = ?, status_changed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(STATUS_COMPLETED)
    .bind(&now)
    .bind(&now)
    .bind(&current.id)
    .execute(pool)
    .await
    .map_err(BookingError::from_db)?;
    Ok(())
}
