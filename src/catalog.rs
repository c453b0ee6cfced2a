use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::availability::SlotContext;
use crate::conflict::BusyRange;
use crate::error::BookingError;
use crate::models::{ServiceRequest, WeeklyHours};
use crate::timeline::{ServiceInfo, ServiceMap};
use crate::timeutil::{self, DAY_MINUTES};

pub const DEFAULT_SLOT_INTERVAL: i64 = 30;

#[derive(Debug, Clone)]
pub struct BusinessInfo {
    pub hours: Option<WeeklyHours>,
    pub slot_interval: i64,
}

impl BusinessInfo {
    /// Open/close minutes for one weekday. `None` means closed: hours absent,
    /// unparseable, or open >= close.
    pub fn day_window(&self, weekday: &str) -> Option<(i64, i64)> {
        let hours = self.hours.as_ref()?.get(weekday)?;
        let open = timeutil::to_minutes(&hours.open)?;
        let close = timeutil::to_minutes(&hours.close)?;
        if open >= close {
            return None;
        }
        Some((open, close))
    }
}

pub fn parse_weekly_hours(raw: Option<&str>) -> Option<WeeklyHours> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(hours) => Some(hours),
        Err(err) => {
            log::warn!("unreadable weekly hours json: {err}");
            None
        }
    }
}

pub async fn load_business(
    pool: &SqlitePool,
    business_id: &str,
) -> Result<BusinessInfo, BookingError> {
    let (hours, slot_interval_min) = sqlx::query_as::<_, (Option<String>, i64)>(
        "SELECT business_hours, slot_interval_min FROM businesses WHERE id = ?",
    )
    .bind(business_id)
    .fetch_one(pool)
    .await
    .map_err(BookingError::from_db)?;

    let slot_interval = if slot_interval_min > 0 {
        slot_interval_min
    } else {
        DEFAULT_SLOT_INTERVAL
    };

    Ok(BusinessInfo {
        hours: parse_weekly_hours(hours.as_deref()),
        slot_interval,
    })
}

pub async fn load_services(
    pool: &SqlitePool,
    business_id: &str,
) -> Result<ServiceMap, BookingError> {
    let rows = sqlx::query_as::<_, (String, i64, i64)>(
        "SELECT id, duration_min, cleanup_min FROM services WHERE business_id = ? AND active = 1",
    )
    .bind(business_id)
    .fetch_all(pool)
    .await
    .map_err(BookingError::from_db)?;

    Ok(rows
        .into_iter()
        .map(|(id, duration_min, cleanup_min)| {
            (id, ServiceInfo { duration_min, cleanup_min })
        })
        .collect())
}

/// Every requested service must be an active service of the business.
pub fn validate_requests(
    requests: &[ServiceRequest],
    services: &ServiceMap,
) -> Result<(), BookingError> {
    for request in requests {
        if !services.contains_key(&request.service_id) {
            return Err(BookingError::InvalidService);
        }
    }
    Ok(())
}

/// Capability pairs from the user_services join table, the single
/// authoritative source: service id -> capable staff ids in declared order
/// (staff creation time, then id).
pub async fn load_capabilities(
    pool: &SqlitePool,
    business_id: &str,
) -> Result<HashMap<String, Vec<String>>, BookingError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        r#"SELECT us.service_id, us.user_id
           FROM user_services us
           JOIN users u ON us.user_id = u.id
           WHERE u.business_id = ? AND u.active = 1
           ORDER BY us.service_id, u.created_at, u.id"#,
    )
    .bind(business_id)
    .fetch_all(pool)
    .await
    .map_err(BookingError::from_db)?;

    let mut capabilities: HashMap<String, Vec<String>> = HashMap::new();
    for (service_id, user_id) in rows {
        capabilities.entry(service_id).or_default().push(user_id);
    }
    Ok(capabilities)
}

pub fn validate_pinned(
    requests: &[ServiceRequest],
    capabilities: &HashMap<String, Vec<String>>,
) -> Result<(), BookingError> {
    for request in requests {
        if let Some(staff_id) = &request.staff_id {
            let capable = capabilities
                .get(&request.service_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if !capable.iter().any(|id| id == staff_id) {
                return Err(BookingError::InvalidStaffAssignment);
            }
        }
    }
    Ok(())
}

pub async fn load_staff_schedules(
    pool: &SqlitePool,
    business_id: &str,
) -> Result<Vec<(String, Option<WeeklyHours>)>, BookingError> {
    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT id, schedule FROM users WHERE business_id = ? AND active = 1 ORDER BY created_at, id",
    )
    .bind(business_id)
    .fetch_all(pool)
    .await
    .map_err(BookingError::from_db)?;

    Ok(rows
        .into_iter()
        .map(|(id, schedule)| {
            let weekly = parse_weekly_hours(schedule.as_deref());
            (id, weekly)
        })
        .collect())
}

/// Outside-schedule minutes for one weekday, as busy ranges. A NULL schedule
/// column leaves the staff member unconstrained; a schedule without an entry
/// for the weekday takes them off that whole day.
pub fn schedule_busy(
    schedules: &[(String, Option<WeeklyHours>)],
    weekday: &str,
) -> Vec<BusyRange> {
    let mut ranges = Vec::new();
    for (staff_id, weekly) in schedules {
        let Some(weekly) = weekly else { continue };
        match weekly.get(weekday) {
            None => ranges.push(BusyRange {
                staff_id: Some(staff_id.clone()),
                start: 0,
                end: DAY_MINUTES,
            }),
            Some(hours) => {
                let (Some(open), Some(close)) =
                    (timeutil::to_minutes(&hours.open), timeutil::to_minutes(&hours.close))
                else {
                    continue;
                };
                if open >= close {
                    continue;
                }
                if open > 0 {
                    ranges.push(BusyRange {
                        staff_id: Some(staff_id.clone()),
                        start: 0,
                        end: open,
                    });
                }
                if close < DAY_MINUTES {
                    ranges.push(BusyRange {
                        staff_id: Some(staff_id.clone()),
                        start: close,
                        end: DAY_MINUTES,
                    });
                }
            }
        }
    }
    ranges
}

/// Committed service blocks of non-canceled appointments for one day,
/// optionally excluding one appointment (update-in-place).
pub async fn load_appointment_blocks(
    pool: &SqlitePool,
    business_id: &str,
    date: &str,
    exclude_appointment_id: Option<&str>,
) -> Result<Vec<BusyRange>, BookingError> {
    let rows = sqlx::query_as::<_, (Option<String>, i64, i64)>(
        r#"SELECT staff_id, start_minutes, end_minutes
           FROM appointment_services
           WHERE business_id = ? AND date = ? AND blocking = 1
             AND (? IS NULL OR appointment_id <> ?)"#,
    )
    .bind(business_id)
    .bind(date)
    .bind(exclude_appointment_id)
    .bind(exclude_appointment_id)
    .fetch_all(pool)
    .await
    .map_err(BookingError::from_db)?;

    Ok(rows
        .into_iter()
        .map(|(staff_id, start, end)| BusyRange { staff_id, start, end })
        .collect())
}

pub async fn load_appointment_blocks_window(
    pool: &SqlitePool,
    business_id: &str,
    from_date: &str,
    until_date: &str,
) -> Result<HashMap<String, Vec<BusyRange>>, BookingError> {
    let rows = sqlx::query_as::<_, (String, Option<String>, i64, i64)>(
        r#"SELECT date, staff_id, start_minutes, end_minutes
           FROM appointment_services
           WHERE business_id = ? AND date >= ? AND date < ? AND blocking = 1"#,
    )
    .bind(business_id)
    .bind(from_date)
    .bind(until_date)
    .fetch_all(pool)
    .await
    .map_err(BookingError::from_db)?;

    let mut by_date: HashMap<String, Vec<BusyRange>> = HashMap::new();
    for (date, staff_id, start, end) in rows {
        by_date
            .entry(date)
            .or_default()
            .push(BusyRange { staff_id, start, end });
    }
    Ok(by_date)
}

/// Blocked-time entries for one day. Entries with unparseable or inverted
/// times are skipped, closing no slots.
pub async fn load_blocked_times(
    pool: &SqlitePool,
    business_id: &str,
    date: &str,
) -> Result<Vec<BusyRange>, BookingError> {
    let rows = sqlx::query_as::<_, (Option<String>, String, String)>(
        "SELECT staff_id, start_time, end_time FROM blocked_times WHERE business_id = ? AND date = ?",
    )
    .bind(business_id)
    .bind(date)
    .fetch_all(pool)
    .await
    .map_err(BookingError::from_db)?;

    Ok(rows
        .into_iter()
        .filter_map(|(staff_id, start, end)| blocked_range(staff_id, &start, &end))
        .collect())
}

pub async fn load_blocked_times_window(
    pool: &SqlitePool,
    business_id: &str,
    from_date: &str,
    until_date: &str,
) -> Result<HashMap<String, Vec<BusyRange>>, BookingError> {
    let rows = sqlx::query_as::<_, (String, Option<String>, String, String)>(
        r#"SELECT date, staff_id, start_time, end_time
           FROM blocked_times
           WHERE business_id = ? AND date >= ? AND date < ?"#,
    )
    .bind(business_id)
    .bind(from_date)
    .bind(until_date)
    .fetch_all(pool)
    .await
    .map_err(BookingError::from_db)?;

    let mut by_date: HashMap<String, Vec<BusyRange>> = HashMap::new();
    for (date, staff_id, start, end) in rows {
        if let Some(range) = blocked_range(staff_id, &start, &end) {
            by_date.entry(date).or_default().push(range);
        }
    }
    Ok(by_date)
}

fn blocked_range(staff_id: Option<String>, start: &str, end: &str) -> Option<BusyRange> {
    let start = timeutil::to_minutes(start)?;
    let end = timeutil::to_minutes(end)?;
    if start >= end {
        return None;
    }
    Some(BusyRange { staff_id, start, end })
}

/// Assembles everything the engine needs for one business day: hours,
/// service footprints, capability lists, and all busy ranges loaded in one
/// batch. `Ok(None)` means the business is closed that day.
pub async fn load_slot_context(
    pool: &SqlitePool,
    business_id: &str,
    date: &str,
    requests: &[ServiceRequest],
    exclude_appointment_id: Option<&str>,
) -> Result<Option<SlotContext>, BookingError> {
    if requests.is_empty() {
        return Err(BookingError::MissingField("services"));
    }
    let day = timeutil::parse_date(date).ok_or(BookingError::MissingField("date"))?;

    let business = load_business(pool, business_id).await?;
    let services = load_services(pool, business_id).await?;
    validate_requests(requests, &services)?;
    let capabilities = load_capabilities(pool, business_id).await?;
    validate_pinned(requests, &capabilities)?;

    let weekday = timeutil::weekday_key(day);
    let Some((open, close)) = business.day_window(weekday) else {
        return Ok(None);
    };

    // Stored dates are zero-padded ISO; queries use the normalized key.
    let date_key = day.format("%Y-%m-%d").to_string();
    let mut busy =
        load_appointment_blocks(pool, business_id, &date_key, exclude_appointment_id).await?;
    busy.extend(load_blocked_times(pool, business_id, &date_key).await?);
    let schedules = load_staff_schedules(pool, business_id).await?;
    busy.extend(schedule_busy(&schedules, weekday));

    Ok(Some(SlotContext {
        open,
        close,
        step: business.slot_interval,
        requests: requests.to_vec(),
        services,
        capabilities,
        busy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DayHours;
    use crate::testutil;

    fn weekly(entries: &[(&str, &str, &str)]) -> Option<WeeklyHours> {
        let map = entries
            .iter()
            .map(|(day, open, close)| {
                (
                    day.to_string(),
                    DayHours { open: open.to_string(), close: close.to_string() },
                )
            })
            .collect();
        Some(map)
    }

    #[test]
    fn day_window_requires_sane_hours() {
        let business = BusinessInfo {
            hours: weekly(&[("monday", "09:00", "17:00"), ("tuesday", "18:00", "09:00")]),
            slot_interval: 30,
        };
        assert_eq!(business.day_window("monday"), Some((540, 1020)));
        assert_eq!(business.day_window("tuesday"), None); // open >= close
        assert_eq!(business.day_window("sunday"), None); // absent = closed

        let unconfigured = BusinessInfo { hours: None, slot_interval: 30 };
        assert_eq!(unconfigured.day_window("monday"), None);
    }

    #[test]
    fn unreadable_hours_json_reads_as_closed() {
        assert!(parse_weekly_hours(None).is_none());
        assert!(parse_weekly_hours(Some("")).is_none());
        assert!(parse_weekly_hours(Some("{not json")).is_none());
        assert!(parse_weekly_hours(Some(r#"{"monday":{"open":"09:00","close":"17:00"}}"#)).is_some());
    }

    #[test]
    fn schedule_busy_covers_off_hours() {
        let schedules = vec![
            ("ana".to_string(), None),
            ("leo".to_string(), weekly(&[("monday", "10:00", "14:00")])),
        ];

        // Ana has no schedule: unconstrained.
        let ranges = schedule_busy(&schedules, "monday");
        assert_eq!(ranges.len(), 2);
        assert!(ranges.iter().all(|r| r.staff_id.as_deref() == Some("leo")));
        assert!(ranges.iter().any(|r| r.start == 0 && r.end == 600));
        assert!(ranges.iter().any(|r| r.start == 840 && r.end == DAY_MINUTES));

        // Leo's schedule has no tuesday entry: off all day.
        let ranges = schedule_busy(&schedules, "tuesday");
        assert_eq!(ranges.len(), 1);
        assert_eq!((ranges[0].start, ranges[0].end), (0, DAY_MINUTES));
    }

    #[test]
    fn malformed_blocked_entries_close_no_slots() {
        assert!(blocked_range(None, "ab:cd", "11:00").is_none());
        assert!(blocked_range(None, "11:00", "10:00").is_none());
        assert!(blocked_range(Some("ana".to_string()), "10:00", "11:00").is_some());
    }

    #[tokio::test]
    async fn context_validates_services_and_pins() {
        let pool = testutil::test_pool().await;
        let fixture = testutil::seed_basic(&pool).await;

        let unknown = vec![testutil::request("nope", None)];
        assert!(matches!(
            load_slot_context(&pool, &fixture.business_id, "2025-06-02", &unknown, None).await,
            Err(BookingError::InvalidService)
        ));

        let unpinned = vec![testutil::request(&fixture.service_id, None)];
        let inactive = sqlx::query("UPDATE services SET active = 0 WHERE id = ?")
            .bind(&fixture.service_id)
            .execute(&pool)
            .await;
        assert!(inactive.is_ok());
        assert!(matches!(
            load_slot_context(&pool, &fixture.business_id, "2025-06-02", &unpinned, None).await,
            Err(BookingError::InvalidService)
        ));
        let restore = sqlx::query("UPDATE services SET active = 1 WHERE id = ?")
            .bind(&fixture.service_id)
            .execute(&pool)
            .await;
        assert!(restore.is_ok());

        let bad_pin = vec![testutil::request(&fixture.service_id, Some("stranger"))];
        assert!(matches!(
            load_slot_context(&pool, &fixture.business_id, "2025-06-02", &bad_pin, None).await,
            Err(BookingError::InvalidStaffAssignment)
        ));
    }

    #[tokio::test]
    async fn closed_day_yields_no_context() {
        let pool = testutil::test_pool().await;
        let fixture = testutil::seed_basic(&pool).await;
        let requests = vec![testutil::request(&fixture.service_id, None)];

        // seed_basic configures monday-friday; 2025-06-01 was a Sunday.
        let ctx = load_slot_context(&pool, &fixture.business_id, "2025-06-01", &requests, None)
            .await
            .unwrap();
        assert!(ctx.is_none());
    }

    #[tokio::test]
    async fn busy_ranges_merge_blocks_and_blocked_times() {
        let pool = testutil::test_pool().await;
        let fixture = testutil::seed_basic(&pool).await;
        let requests = vec![testutil::request(&fixture.service_id, None)];

        testutil::seed_blocked_time(&pool, &fixture.business_id, None, "2025-06-02", "12:00", "13:00")
            .await;
        testutil::seed_blocked_time(
            &pool,
            &fixture.business_id,
            Some(&fixture.staff_id),
            "2025-06-02",
            "15:00",
            "15:30",
        )
        .await;

        let ctx = load_slot_context(&pool, &fixture.business_id, "2025-06-02", &requests, None)
            .await
            .unwrap()
            .unwrap();

        assert!(ctx.busy.iter().any(|r| r.staff_id.is_none() && r.start == 720 && r.end == 780));
        assert!(ctx
            .busy
            .iter()
            .any(|r| r.staff_id.as_deref() == Some(fixture.staff_id.as_str()) && r.start == 900));
    }
}
