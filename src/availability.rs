use std::collections::HashMap;

use chrono::Days;
use sqlx::SqlitePool;

use crate::catalog;
use crate::conflict::{first_free_staff, has_conflict, BusyRange};
use crate::error::BookingError;
use crate::models::ServiceRequest;
use crate::timeline::{build_timeline, total_duration, ServiceMap};
use crate::timeutil::{self, to_clock, to_minutes};

/// Everything the engine needs to answer availability questions for one
/// business day. Loaded once per query; all checks below are pure.
#[derive(Debug, Clone)]
pub struct SlotContext {
    pub open: i64,
    pub close: i64,
    pub step: i64,
    pub requests: Vec<ServiceRequest>,
    pub services: ServiceMap,
    pub capabilities: HashMap<String, Vec<String>>,
    pub busy: Vec<BusyRange>,
}

/// A service block with its staff assignment fixed.
#[derive(Debug, Clone)]
pub struct ResolvedService {
    pub service_id: String,
    pub staff_id: String,
    pub start: i64,
    pub end: i64,
}

impl SlotContext {
    fn capable(&self, service_id: &str) -> &[String] {
        self.capabilities
            .get(service_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the full service sequence starting at `start` clears every
    /// busy range. Shared by slot-level and day-level availability.
    fn fits(&self, start: i64) -> bool {
        let Ok(timeline) = build_timeline(&self.requests, start, &self.services) else {
            return false;
        };
        timeline
            .iter()
            .all(|block| !has_conflict(block, &self.busy, self.capable(&block.service_id)))
    }

    /// Valid start times in ascending order, stepped by the slot interval.
    pub fn compute_slots(&self) -> Vec<String> {
        let Ok(total) = total_duration(&self.requests, &self.services) else {
            return Vec::new();
        };

        let mut slots = Vec::new();
        let mut start = self.open;
        while start + total <= self.close {
            if self.fits(start) {
                slots.push(to_clock(start));
            }
            start += self.step;
        }
        slots
    }

    /// Short-circuiting form of `compute_slots` for day-level queries.
    pub fn has_any_slot(&self) -> bool {
        let Ok(total) = total_duration(&self.requests, &self.services) else {
            return false;
        };

        let mut start = self.open;
        while start + total <= self.close {
            if self.fits(start) {
                return true;
            }
            start += self.step;
        }
        false
    }

    /// Fixes a concrete staff member for every block of one chosen start
    /// time. Pinned requests keep their staff; unpinned ones take the first
    /// free capable staff member in declared order. `SlotUnavailable` is the
    /// race-loss path: the slot was valid at query time but has since been
    /// consumed.
    pub fn resolve(&self, start_time: &str) -> Result<Vec<ResolvedService>, BookingError> {
        let start = to_minutes(start_time).ok_or(BookingError::MissingField("startTime"))?;
        let timeline = build_timeline(&self.requests, start, &self.services)?;

        let mut resolved = Vec::with_capacity(timeline.len());
        for block in timeline {
            let staff_id = match block.staff_id {
                Some(staff_id) => staff_id,
                None => first_free_staff(
                    self.capable(&block.service_id),
                    block.start,
                    block.end,
                    &self.busy,
                )
                .cloned()
                .ok_or(BookingError::SlotUnavailable)?,
            };
            resolved.push(ResolvedService {
                service_id: block.service_id,
                staff_id,
                start: block.start,
                end: block.end,
            });
        }
        Ok(resolved)
    }
}

/// Dates in `[from_date, from_date + window_days)` with at least one valid
/// slot for the requested services. Reuses the exact per-candidate check of
/// `compute_slots`; busy data for the whole window is loaded in one batch.
pub async fn compute_available_dates(
    pool: &SqlitePool,
    business_id: &str,
    service_ids: &[String],
    from_date: &str,
    window_days: i64,
) -> Result<Vec<String>, BookingError> {
    if service_ids.is_empty() {
        return Err(BookingError::MissingField("serviceIds"));
    }
    let from = timeutil::parse_date(from_date).ok_or(BookingError::MissingField("fromDate"))?;

    let requests: Vec<ServiceRequest> = service_ids
        .iter()
        .map(|service_id| ServiceRequest {
            service_id: service_id.clone(),
            staff_id: None,
        })
        .collect();

    let business = catalog::load_business(pool, business_id).await?;
    let services = catalog::load_services(pool, business_id).await?;
    catalog::validate_requests(&requests, &services)?;
    let capabilities = catalog::load_capabilities(pool, business_id).await?;
    let schedules = catalog::load_staff_schedules(pool, business_id).await?;

    let days = window_days.max(0) as u64;
    let until = from + Days::new(days);
    let from_key = from.format("%Y-%m-%d").to_string();
    let until_key = until.format("%Y-%m-%d").to_string();

    let mut appointment_blocks =
        catalog::load_appointment_blocks_window(pool, business_id, &from_key, &until_key).await?;
    let mut blocked_times =
        catalog::load_blocked_times_window(pool, business_id, &from_key, &until_key).await?;

    let mut ctx = SlotContext {
        open: 0,
        close: 0,
        step: business.slot_interval,
        requests,
        services,
        capabilities,
        busy: Vec::new(),
    };

    let mut dates = Vec::new();
    for offset in 0..days {
        let day = from + Days::new(offset);
        let key = day.format("%Y-%m-%d").to_string();
        let weekday = timeutil::weekday_key(day);

        let Some((open, close)) = business.day_window(weekday) else {
            continue;
        };

        let mut busy = appointment_blocks.remove(&key).unwrap_or_default();
        busy.extend(blocked_times.remove(&key).unwrap_or_default());
        busy.extend(catalog::schedule_busy(&schedules, weekday));

        ctx.open = open;
        ctx.close = close;
        ctx.busy = busy;
        if ctx.has_any_slot() {
            dates.push(key);
        }
    }
    Ok(dates)
}
