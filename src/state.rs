use std::sync::Arc;

use sqlx::SqlitePool;

use crate::booking::BookingLocks;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub locks: Arc<BookingLocks>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            locks: Arc::new(BookingLocks::default()),
        }
    }
}
