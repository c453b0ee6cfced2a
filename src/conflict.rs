use crate::timeline::Block;

/// A minute interval during which a staff member is unavailable. `staff_id`
/// of `None` blocks every staff member of the business.
#[derive(Debug, Clone)]
pub struct BusyRange {
    pub staff_id: Option<String>,
    pub start: i64,
    pub end: i64,
}

impl BusyRange {
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.start < end && self.end > start
    }

    pub fn applies_to(&self, staff_id: &str) -> bool {
        match &self.staff_id {
            Some(id) => id == staff_id,
            None => true,
        }
    }
}

pub fn staff_is_busy(staff_id: &str, start: i64, end: i64, busy: &[BusyRange]) -> bool {
    busy.iter()
        .any(|range| range.applies_to(staff_id) && range.overlaps(start, end))
}

/// First capable staff member, in declared order, free over `[start, end)`.
pub fn first_free_staff<'a>(
    capable: &'a [String],
    start: i64,
    end: i64,
    busy: &[BusyRange],
) -> Option<&'a String> {
    capable
        .iter()
        .find(|staff_id| !staff_is_busy(staff_id, start, end, busy))
}

/// Pinned blocks conflict on any overlapping busy range for that staff
/// member. Unpinned blocks conflict only when no capable staff member is
/// free (capacity semantics); an empty capability set always conflicts.
pub fn has_conflict(block: &Block, busy: &[BusyRange], capable: &[String]) -> bool {
    match &block.staff_id {
        Some(staff_id) => staff_is_busy(staff_id, block.start, block.end, busy),
        None => first_free_staff(capable, block.start, block.end, busy).is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(staff_id: Option<&str>, start: i64, end: i64) -> Block {
        Block {
            service_id: "cut".to_string(),
            staff_id: staff_id.map(str::to_string),
            start,
            end,
        }
    }

    fn busy(staff_id: Option<&str>, start: i64, end: i64) -> BusyRange {
        BusyRange {
            staff_id: staff_id.map(str::to_string),
            start,
            end,
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn overlap_is_half_open() {
        let range = busy(Some("ana"), 600, 660);
        assert!(range.overlaps(570, 630));
        assert!(range.overlaps(630, 690));
        assert!(range.overlaps(600, 660));
        assert!(!range.overlaps(540, 600)); // adjacent, not overlapping
        assert!(!range.overlaps(660, 720));
    }

    #[test]
    fn pinned_block_conflicts_only_with_its_staff() {
        let ranges = vec![busy(Some("ana"), 600, 660)];
        assert!(has_conflict(&block(Some("ana"), 570, 630), &ranges, &[]));
        assert!(!has_conflict(&block(Some("leo"), 570, 630), &ranges, &[]));
    }

    #[test]
    fn unscoped_busy_range_blocks_everyone() {
        let ranges = vec![busy(None, 600, 660)];
        assert!(has_conflict(&block(Some("ana"), 600, 660), &ranges, &[]));
        assert!(has_conflict(
            &block(None, 600, 660),
            &ranges,
            &ids(&["ana", "leo"])
        ));
    }

    #[test]
    fn unpinned_block_uses_capacity_semantics() {
        let ranges = vec![busy(Some("ana"), 600, 660)];
        let capable = ids(&["ana", "leo"]);
        // One of two capable staff busy: slot stays open.
        assert!(!has_conflict(&block(None, 600, 660), &ranges, &capable));

        let ranges = vec![busy(Some("ana"), 600, 660), busy(Some("leo"), 630, 690)];
        assert!(has_conflict(&block(None, 600, 660), &ranges, &capable));
    }

    #[test]
    fn empty_capability_set_always_conflicts() {
        assert!(has_conflict(&block(None, 540, 600), &[], &[]));
    }

    #[test]
    fn first_free_staff_is_deterministic() {
        let capable = ids(&["ana", "leo", "mia"]);
        assert_eq!(
            first_free_staff(&capable, 540, 600, &[]),
            Some(&"ana".to_string())
        );

        let ranges = vec![busy(Some("ana"), 540, 600)];
        assert_eq!(
            first_free_staff(&capable, 540, 600, &ranges),
            Some(&"leo".to_string())
        );

        let ranges = vec![
            busy(Some("ana"), 540, 600),
            busy(Some("leo"), 540, 600),
            busy(Some("mia"), 540, 600),
        ];
        assert_eq!(first_free_staff(&capable, 540, 600, &ranges), None);
    }
}
