use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::auth::{hash_password, new_id};
use crate::db;
use crate::models::{ServiceRequest, ROLE_STAFF};

pub struct Fixture {
    pub business_id: String,
    pub staff_id: String,
    pub service_id: String,
    pub client_id: String,
}

static SEQ: AtomicU64 = AtomicU64::new(0);

/// Monotonic fake timestamps so declared-order queries stay deterministic.
fn next_timestamp() -> String {
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("2025-01-01T00:00:00.{seq:09}+00:00")
}

pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    db::run_migrations(&pool).await.expect("migrations");
    pool
}

pub fn request(service_id: &str, staff_id: Option<&str>) -> ServiceRequest {
    ServiceRequest {
        service_id: service_id.to_string(),
        staff_id: staff_id.map(str::to_string),
    }
}

pub const WEEKDAY_HOURS: &str = r#"{
    "monday": { "open": "09:00", "close": "17:00" },
    "tuesday": { "open": "09:00", "close": "17:00" },
    "wednesday": { "open": "09:00", "close": "17:00" },
    "thursday": { "open": "09:00", "close": "17:00" },
    "friday": { "open": "09:00", "close": "17:00" }
}"#;

pub async fn seed_business(pool: &SqlitePool, hours: Option<&str>, slot_interval: i64) -> String {
    let business_id = new_id();
    sqlx::query(
        r#"INSERT INTO businesses (id, name, business_hours, slot_interval_min, created_at)
           VALUES (?, 'Test Salon', ?, ?, ?)"#,
    )
    .bind(&business_id)
    .bind(hours)
    .bind(slot_interval)
    .bind(next_timestamp())
    .execute(pool)
    .await
    .expect("seed business");
    business_id
}

pub async fn seed_staff(pool: &SqlitePool, business_id: &str, username: &str) -> String {
    seed_staff_with_schedule(pool, business_id, username, None).await
}

pub async fn seed_staff_with_schedule(
    pool: &SqlitePool,
    business_id: &str,
    username: &str,
    schedule: Option<&str>,
) -> String {
    let staff_id = new_id();
    sqlx::query(
        r#"INSERT INTO users (id, business_id, username, display_name, role, password_hash, schedule, active, created_at)
           VALUES (?, ?, ?, ?, ?, 'x', ?, 1, ?)"#,
    )
    .bind(&staff_id)
    .bind(business_id)
    .bind(username)
    .bind(username)
    .bind(ROLE_STAFF)
    .bind(schedule)
    .bind(next_timestamp())
    .execute(pool)
    .await
    .expect("seed staff");
    staff_id
}

/// A staff account with a real password hash, for route tests that go
/// through the basic-auth boundary.
pub async fn seed_login(
    pool: &SqlitePool,
    business_id: &str,
    username: &str,
    password: &str,
) -> String {
    let staff_id = new_id();
    let password_hash = hash_password(password).expect("hash password");
    sqlx::query(
        r#"INSERT INTO users (id, business_id, username, display_name, role, password_hash, active, created_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&staff_id)
    .bind(business_id)
    .bind(username)
    .bind(username)
    .bind(ROLE_STAFF)
    .bind(password_hash)
    .bind(next_timestamp())
    .execute(pool)
    .await
    .expect("seed login");
    staff_id
}

pub async fn seed_service(
    pool: &SqlitePool,
    business_id: &str,
    name: &str,
    duration_min: i64,
    cleanup_min: i64,
) -> String {
    let service_id = new_id();
    sqlx::query(
        r#"INSERT INTO services (id, business_id, name, duration_min, cleanup_min, active, created_at)
           VALUES (?, ?, ?, ?, ?, 1, ?)"#,
    )
    .bind(&service_id)
    .bind(business_id)
    .bind(name)
    .bind(duration_min)
    .bind(cleanup_min)
    .bind(next_timestamp())
    .execute(pool)
    .await
    .expect("seed service");
    service_id
}

pub async fn grant_capability(pool: &SqlitePool, staff_id: &str, service_id: &str) {
    sqlx::query("INSERT INTO user_services (user_id, service_id, created_at) VALUES (?, ?, ?)")
        .bind(staff_id)
        .bind(service_id)
        .bind(next_timestamp())
        .execute(pool)
        .await
        .expect("grant capability");
}

pub async fn seed_client(pool: &SqlitePool, business_id: &str) -> String {
    let client_id = new_id();
    sqlx::query(
        "INSERT INTO business_clients (id, business_id, name, created_at) VALUES (?, ?, 'Walk In', ?)",
    )
    .bind(&client_id)
    .bind(business_id)
    .bind(next_timestamp())
    .execute(pool)
    .await
    .expect("seed client");
    client_id
}

pub async fn seed_blocked_time(
    pool: &SqlitePool,
    business_id: &str,
    staff_id: Option<&str>,
    date: &str,
    start_time: &str,
    end_time: &str,
) {
    sqlx::query(
        r#"INSERT INTO blocked_times (id, business_id, staff_id, date, start_time, end_time, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(new_id())
    .bind(business_id)
    .bind(staff_id)
    .bind(date)
    .bind(start_time)
    .bind(end_time)
    .bind(next_timestamp())
    .execute(pool)
    .await
    .expect("seed blocked time");
}

/// One business open monday-friday 09:00-17:00 (slot interval 30), one staff
/// member capable of one 60-minute service, one client.
pub async fn seed_basic(pool: &SqlitePool) -> Fixture {
    let business_id = seed_business(pool, Some(WEEKDAY_HOURS), 30).await;
    let staff_id = seed_staff(pool, &business_id, "ana").await;
    let service_id = seed_service(pool, &business_id, "Signature Cut", 60, 0).await;
    grant_capability(pool, &staff_id, &service_id).await;
    let client_id = seed_client(pool, &business_id).await;

    Fixture {
        business_id,
        staff_id,
        service_id,
        client_id,
    }
}
