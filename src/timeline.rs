use std::collections::HashMap;

use crate::error::BookingError;
use crate::models::ServiceRequest;

/// Resource footprint of a service: client-facing duration plus cleanup time
/// that occupies the staff member without being bookable.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub duration_min: i64,
    pub cleanup_min: i64,
}

impl ServiceInfo {
    pub fn occupied(&self) -> i64 {
        self.duration_min + self.cleanup_min
    }
}

pub type ServiceMap = HashMap<String, ServiceInfo>;

/// One service block on a booking timeline, `[start, end)` in minutes.
#[derive(Debug, Clone)]
pub struct Block {
    pub service_id: String,
    pub staff_id: Option<String>,
    pub start: i64,
    pub end: i64,
}

/// Stacks the requested services into contiguous blocks from `start`.
/// Caller-supplied order is the booking's committed sequence.
pub fn build_timeline(
    requests: &[ServiceRequest],
    start: i64,
    services: &ServiceMap,
) -> Result<Vec<Block>, BookingError> {
    let mut cursor = start;
    let mut blocks = Vec::with_capacity(requests.len());

    for request in requests {
        let info = services
            .get(&request.service_id)
            .ok_or(BookingError::InvalidService)?;
        let end = cursor + info.occupied();
        blocks.push(Block {
            service_id: request.service_id.clone(),
            staff_id: request.staff_id.clone(),
            start: cursor,
            end,
        });
        cursor = end;
    }

    Ok(blocks)
}

pub fn total_duration(
    requests: &[ServiceRequest],
    services: &ServiceMap,
) -> Result<i64, BookingError> {
    requests.iter().try_fold(0, |sum, request| {
        let info = services
            .get(&request.service_id)
            .ok_or(BookingError::InvalidService)?;
        Ok(sum + info.occupied())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(service_id: &str, staff_id: Option<&str>) -> ServiceRequest {
        ServiceRequest {
            service_id: service_id.to_string(),
            staff_id: staff_id.map(str::to_string),
        }
    }

    fn services() -> ServiceMap {
        let mut map = ServiceMap::new();
        map.insert(
            "cut".to_string(),
            ServiceInfo { duration_min: 45, cleanup_min: 15 },
        );
        map.insert(
            "color".to_string(),
            ServiceInfo { duration_min: 60, cleanup_min: 0 },
        );
        map
    }

    #[test]
    fn blocks_are_contiguous_and_ordered() {
        let requests = vec![request("cut", Some("ana")), request("color", None)];
        let timeline = build_timeline(&requests, 540, &services()).unwrap();

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].service_id, "cut");
        assert_eq!(timeline[0].staff_id.as_deref(), Some("ana"));
        assert_eq!((timeline[0].start, timeline[0].end), (540, 600));
        assert_eq!(timeline[1].service_id, "color");
        assert_eq!(timeline[1].staff_id, None);
        assert_eq!((timeline[1].start, timeline[1].end), (600, 660));
    }

    #[test]
    fn cleanup_time_occupies_the_block() {
        let requests = vec![request("cut", None)];
        let timeline = build_timeline(&requests, 0, &services()).unwrap();
        assert_eq!(timeline[0].end, 60);
    }

    #[test]
    fn request_order_is_preserved() {
        let requests = vec![request("color", None), request("cut", None)];
        let timeline = build_timeline(&requests, 600, &services()).unwrap();
        assert_eq!(timeline[0].service_id, "color");
        assert_eq!((timeline[1].start, timeline[1].end), (660, 720));
    }

    #[test]
    fn unknown_service_is_rejected() {
        let requests = vec![request("massage", None)];
        assert!(matches!(
            build_timeline(&requests, 540, &services()),
            Err(BookingError::InvalidService)
        ));
        assert!(matches!(
            total_duration(&requests, &services()),
            Err(BookingError::InvalidService)
        ));
    }

    #[test]
    fn total_duration_sums_occupied_minutes() {
        let requests = vec![request("cut", None), request("color", None)];
        assert_eq!(total_duration(&requests, &services()).unwrap(), 120);
    }
}
