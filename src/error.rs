use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid services")]
    InvalidService,
    #[error("staff member cannot perform the requested service")]
    InvalidStaffAssignment,
    #[error("business hours are not configured for this date")]
    BusinessHoursUnavailable,
    #[error("slot is no longer available")]
    SlotUnavailable,
    #[error("appointment not found")]
    AppointmentNotFound,
    #[error("appointment is {status}, last changed {changed_at}")]
    AppointmentTerminalState { status: String, changed_at: String },
    #[error("conflicting write in the store")]
    StoreConflict,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl BookingError {
    /// Uniqueness violations carry booking-conflict meaning; everything else
    /// from the store stays opaque.
    pub fn from_db(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::StoreConflict,
            _ => Self::Store(err),
        }
    }
}

impl ResponseError for BookingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::InvalidService | Self::InvalidStaffAssignment => {
                StatusCode::BAD_REQUEST
            }
            Self::BusinessHoursUnavailable
            | Self::SlotUnavailable
            | Self::AppointmentTerminalState { .. }
            | Self::StoreConflict => StatusCode::CONFLICT,
            Self::AppointmentNotFound => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let msg = match self {
            Self::Store(err) => {
                log::error!("store error: {err}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "msg": msg }))
    }
}
