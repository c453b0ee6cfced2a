use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{admin_validator, hash_password, new_id, AuthUser},
    db::log_activity,
    error::BookingError,
    models::{BusinessRow, ServiceRow, WeeklyHours, ROLE_STAFF},
    state::AppState,
    timeutil,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaffCreateInput {
    username: String,
    display_name: String,
    password: String,
    #[serde(default)]
    schedule: Option<WeeklyHours>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceCreateInput {
    name: String,
    duration_min: i64,
    #[serde(default)]
    cleanup_min: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityInput {
    staff_id: String,
    service_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoursInput {
    #[serde(default)]
    business_hours: Option<WeeklyHours>,
    #[serde(default)]
    slot_interval_min: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientCreateInput {
    name: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockedTimeInput {
    date: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    staff_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .service(web::resource("/business").route(web::get().to(get_business)))
            .service(
                web::resource("/staff")
                    .route(web::get().to(list_staff))
                    .route(web::post().to(create_staff)),
            )
            .service(
                web::resource("/services")
                    .route(web::get().to(list_services))
                    .route(web::post().to(create_service)),
            )
            .service(web::resource("/capabilities").route(web::post().to(assign_capability)))
            .service(web::resource("/hours").route(web::post().to(update_hours)))
            .service(web::resource("/clients").route(web::post().to(create_client)))
            .service(web::resource("/blocked-times").route(web::post().to(create_blocked_time)))
            .service(
                web::resource("/blocked-times/{id}").route(web::delete().to(delete_blocked_time)),
            ),
    );
}

fn internal(msg: &str) -> BookingError {
    BookingError::Store(sqlx::Error::Protocol(msg.into()))
}

async fn get_business(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, BookingError> {
    let business = sqlx::query_as::<_, BusinessRow>(
        r#"SELECT id, name, phone, email, business_hours, slot_interval_min, created_at
           FROM businesses WHERE id = ?"#,
    )
    .bind(&auth.business_id)
    .fetch_one(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    let hours: serde_json::Value = business
        .business_hours
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(serde_json::Value::Null);

    Ok(HttpResponse::Ok().json(json!({
        "id": business.id,
        "name": business.name,
        "phone": business.phone,
        "email": business.email,
        "businessHours": hours,
        "slotIntervalMin": business.slot_interval_min,
    })))
}

async fn create_staff(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<StaffCreateInput>,
) -> Result<HttpResponse, BookingError> {
    let body = body.into_inner();
    if body.username.trim().is_empty() {
        return Err(BookingError::MissingField("username"));
    }
    if body.display_name.trim().is_empty() {
        return Err(BookingError::MissingField("displayName"));
    }
    if body.password.trim().is_empty() {
        return Err(BookingError::MissingField("password"));
    }

    let password_hash =
        hash_password(&body.password).map_err(|_| internal("password hash failed"))?;
    let schedule = match &body.schedule {
        Some(schedule) => {
            Some(serde_json::to_string(schedule).map_err(|_| internal("schedule encode failed"))?)
        }
        None => None,
    };

    let staff_id = new_id();
    sqlx::query(
        r#"INSERT INTO users (id, business_id, username, display_name, role, password_hash, schedule, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&staff_id)
    .bind(&auth.business_id)
    .bind(body.username.trim())
    .bind(body.display_name.trim())
    .bind(ROLE_STAFF)
    .bind(password_hash)
    .bind(schedule)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    log_activity(
        &state.db,
        "staff_created",
        &format!("{} added staff member {}.", auth.display_name, body.display_name.trim()),
        Some(&auth.id),
        None,
    )
    .await;

    Ok(HttpResponse::Created().json(json!({ "msg": "Staff member created successfully", "id": staff_id })))
}

async fn list_staff(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, BookingError> {
    let rows = sqlx::query_as::<_, (String, String, String, i64)>(
        "SELECT id, username, display_name, active FROM users WHERE business_id = ? ORDER BY created_at, id",
    )
    .bind(&auth.business_id)
    .fetch_all(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    let staff: Vec<_> = rows
        .into_iter()
        .map(|(id, username, display_name, active)| {
            json!({
                "id": id,
                "username": username,
                "displayName": display_name,
                "active": active == 1,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "staff": staff })))
}

async fn create_service(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<ServiceCreateInput>,
) -> Result<HttpResponse, BookingError> {
    let body = body.into_inner();
    if body.name.trim().is_empty() {
        return Err(BookingError::MissingField("name"));
    }
    if body.duration_min <= 0 {
        return Err(BookingError::MissingField("durationMin"));
    }
    if body.cleanup_min < 0 {
        return Err(BookingError::MissingField("cleanupMin"));
    }

    let service_id = new_id();
    sqlx::query(
        r#"INSERT INTO services (id, business_id, name, duration_min, cleanup_min, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&service_id)
    .bind(&auth.business_id)
    .bind(body.name.trim())
    .bind(body.duration_min)
    .bind(body.cleanup_min)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    Ok(HttpResponse::Created().json(json!({ "msg": "Service created successfully", "id": service_id })))
}

async fn list_services(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse, BookingError> {
    let rows = sqlx::query_as::<_, ServiceRow>(
        r#"SELECT id, business_id, name, duration_min, cleanup_min, active, created_at
           FROM services WHERE business_id = ? ORDER BY created_at, id"#,
    )
    .bind(&auth.business_id)
    .fetch_all(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    let services: Vec<_> = rows
        .into_iter()
        .map(|service| {
            json!({
                "id": service.id,
                "name": service.name,
                "durationMin": service.duration_min,
                "cleanupMin": service.cleanup_min,
                "active": service.active == 1,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "services": services })))
}

async fn assign_capability(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<CapabilityInput>,
) -> Result<HttpResponse, BookingError> {
    let body = body.into_inner();

    let staff = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE id = ? AND business_id = ? AND active = 1",
    )
    .bind(&body.staff_id)
    .bind(&auth.business_id)
    .fetch_one(&state.db)
    .await
    .map_err(BookingError::from_db)?;
    if staff == 0 {
        return Err(BookingError::MissingField("staffId"));
    }

    let service = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM services WHERE id = ? AND business_id = ? AND active = 1",
    )
    .bind(&body.service_id)
    .bind(&auth.business_id)
    .fetch_one(&state.db)
    .await
    .map_err(BookingError::from_db)?;
    if service == 0 {
        return Err(BookingError::InvalidService);
    }

    sqlx::query(
        "INSERT OR IGNORE INTO user_services (user_id, service_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(&body.staff_id)
    .bind(&body.service_id)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    Ok(HttpResponse::Ok().json(json!({ "msg": "Capability assigned successfully" })))
}

async fn update_hours(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<HoursInput>,
) -> Result<HttpResponse, BookingError> {
    let body = body.into_inner();

    let hours = match &body.business_hours {
        Some(hours) => {
            Some(serde_json::to_string(hours).map_err(|_| internal("hours encode failed"))?)
        }
        None => None,
    };
    if let Some(interval) = body.slot_interval_min {
        if interval <= 0 {
            return Err(BookingError::MissingField("slotIntervalMin"));
        }
    }

    sqlx::query(
        r#"UPDATE businesses
           SET business_hours = COALESCE(?, business_hours),
               slot_interval_min = COALESCE(?, slot_interval_min)
           WHERE id = ?"#,
    )
    .bind(hours)
    .bind(body.slot_interval_min)
    .bind(&auth.business_id)
    .execute(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    Ok(HttpResponse::Ok().json(json!({ "msg": "Business updated successfully" })))
}

async fn create_client(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<ClientCreateInput>,
) -> Result<HttpResponse, BookingError> {
    let body = body.into_inner();
    if body.name.trim().is_empty() {
        return Err(BookingError::MissingField("name"));
    }

    let client_id = new_id();
    sqlx::query(
        r#"INSERT INTO business_clients (id, business_id, name, phone, email, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&client_id)
    .bind(&auth.business_id)
    .bind(body.name.trim())
    .bind(body.phone)
    .bind(body.email)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    Ok(HttpResponse::Created().json(json!({ "msg": "Client created successfully", "id": client_id })))
}

async fn create_blocked_time(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<BlockedTimeInput>,
) -> Result<HttpResponse, BookingError> {
    let body = body.into_inner();
    if timeutil::parse_date(&body.date).is_none() {
        return Err(BookingError::MissingField("date"));
    }
    let start = timeutil::to_minutes(&body.start_time)
        .ok_or(BookingError::MissingField("startTime"))?;
    let end = timeutil::to_minutes(&body.end_time).ok_or(BookingError::MissingField("endTime"))?;
    if start >= end {
        return Err(BookingError::MissingField("endTime"));
    }

    if let Some(staff_id) = body.staff_id.as_deref() {
        let staff = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE id = ? AND business_id = ? AND active = 1",
        )
        .bind(staff_id)
        .bind(&auth.business_id)
        .fetch_one(&state.db)
        .await
        .map_err(BookingError::from_db)?;
        if staff == 0 {
            return Err(BookingError::MissingField("staffId"));
        }
    }

    let blocked_id = new_id();
    sqlx::query(
        r#"INSERT INTO blocked_times (id, business_id, staff_id, date, start_time, end_time, reason, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&blocked_id)
    .bind(&auth.business_id)
    .bind(body.staff_id)
    .bind(&body.date)
    .bind(&body.start_time)
    .bind(&body.end_time)
    .bind(body.reason)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await
    .map_err(BookingError::from_db)?;

    Ok(HttpResponse::Created().json(json!({ "msg": "Blocked time created successfully", "id": blocked_id })))
}

async fn delete_blocked_time(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse, BookingError> {
    let blocked_id = path.into_inner();
    let result = sqlx::query("DELETE FROM blocked_times WHERE id = ? AND business_id = ?")
        .bind(&blocked_id)
        .bind(&auth.business_id)
        .execute(&state.db)
        .await
        .map_err(BookingError::from_db)?;

    if result.rows_affected() == 0 {
        return Ok(HttpResponse::NotFound().json(json!({ "msg": "Blocked time not found" })));
    }
    Ok(HttpResponse::Ok().json(json!({ "msg": "Blocked time removed successfully" })))
}
