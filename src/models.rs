use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STAFF: &str = "staff";

pub const STATUS_SCHEDULED: &str = "SCHEDULED";
pub const STATUS_CANCELED: &str = "CANCELED";
pub const STATUS_COMPLETED: &str = "COMPLETED";

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub business_id: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub password_hash: String,
    pub schedule: Option<String>,
    pub active: i64,
    pub created_at: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BusinessRow {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub business_hours: Option<String>,
    pub slot_interval_min: i64,
    pub created_at: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub duration_min: i64,
    pub cleanup_min: i64,
    pub active: i64,
    pub created_at: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub business_id: String,
    pub business_client_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub start_minutes: i64,
    pub end_minutes: i64,
    pub total_duration_min: i64,
    pub status: String,
    pub status_changed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentServiceRow {
    pub id: String,
    pub appointment_id: String,
    pub service_id: String,
    pub staff_id: Option<String>,
    pub position: i64,
    pub start_minutes: i64,
    pub end_minutes: i64,
}

/// One open/close pair of wall-clock strings, as stored in the weekly-hours
/// JSON columns on businesses and staff.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DayHours {
    pub open: String,
    pub close: String,
}

/// Weekly hours keyed by lowercase weekday name. A missing key means closed
/// (business) or off (staff) that day.
pub type WeeklyHours = HashMap<String, DayHours>;

/// A requested service, optionally pinned to a staff member.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentServiceDetail {
    pub service_id: String,
    pub staff_id: Option<String>,
    pub position: i64,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDetail {
    pub id: String,
    pub business_client_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub total_duration_min: i64,
    pub status: String,
    pub status_changed_at: Option<String>,
    pub services: Vec<AppointmentServiceDetail>,
}

impl AppointmentDetail {
    pub fn from_rows(row: AppointmentRow, services: Vec<AppointmentServiceRow>) -> Self {
        let services = services
            .into_iter()
            .map(|service| AppointmentServiceDetail {
                service_id: service.service_id,
                staff_id: service.staff_id,
                position: service.position,
                start_time: crate::timeutil::to_clock(service.start_minutes),
                end_time: crate::timeutil::to_clock(service.end_minutes),
            })
            .collect();

        Self {
            id: row.id,
            business_client_id: row.business_client_id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            total_duration_min: row.total_duration_min,
            status: row.status,
            status_changed_at: row.status_changed_at,
            services,
        }
    }
}
