use std::collections::BTreeMap;
use std::ops::Range;

use chrono::Duration;

use crate::config::{EngineConfig, VoidRefundConfig};
use crate::detectors::Assessment;
use crate::error::DetectorError;
use crate::models::{DaySummary, VoidEvent};

/// Looks for bursts of voids and refunds inside a sliding time window.
#[derive(Debug, Clone)]
pub struct VoidRefundDetector {
    config: VoidRefundConfig,
    pub(crate) cap: f64,
}

impl VoidRefundDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.void_refund.clone(),
            cap: config.point_cap,
        }
    }

    pub fn assess(&self, day: &DaySummary) -> Result<Assessment, DetectorError> {
        let window = Duration::minutes(self.config.window_minutes);
        let events = &day.void_events;
        if events.windows(2).any(|pair| pair[0].time > pair[1].time) {
            return Err(DetectorError::InvalidInput(
                "void events are not in time order".to_string(),
            ));
        }

        let clusters = find_clusters(events, window, self.config.min_cluster_size);
        if clusters.is_empty() {
            return Ok(Assessment::quiet(format!(
                "{} voids/refunds, none clustered ({}+ within {} min)",
                events.len(),
                self.config.min_cluster_size,
                self.config.window_minutes
            )));
        }

        let mut points = 0.0;
        let mut evidence = Vec::with_capacity(clusters.len());
        let mut factor = 1.0;

        for cluster in &clusters {
            let size = cluster.len();
            let extra = (size - self.config.min_cluster_size) as f64;
            points += factor
                * (self.config.base_points + self.config.points_per_extra_event * extra);
            factor *= self.config.additional_cluster_decay;

            let members = &events[cluster.clone()];
            let mut line = format!(
                "cluster of {} voids/refunds between {} and {} (window {} min)",
                size,
                members[0].time.format("%H:%M"),
                members[size - 1].time.format("%H:%M"),
                self.config.window_minutes
            );
            if let Some((staff, count)) = dominant_staff(members) {
                line.push_str(&format!("; {count} by staff {staff}"));
            }
            evidence.push(line);
        }

        Ok(Assessment {
            points,
            triggered: true,
            evidence,
        })
    }
}

/// Disjoint clusters, largest first. Each pass takes the densest window in a
/// segment of the timeline, then searches what is left on either side of it.
pub fn find_clusters(events: &[VoidEvent], window: Duration, min_size: usize) -> Vec<Range<usize>> {
    let mut clusters = Vec::new();
    let mut pending = vec![0..events.len()];

    while let Some(segment) = pending.pop() {
        let Some(best) = densest_window(events, segment.clone(), window) else {
            continue;
        };
        if best.len() < min_size {
            continue;
        }
        pending.push(segment.start..best.start);
        pending.push(best.end..segment.end);
        clusters.push(best);
    }

    clusters.sort_by(|a, b| b.len().cmp(&a.len()).then(a.start.cmp(&b.start)));
    clusters
}

fn densest_window(events: &[VoidEvent], segment: Range<usize>, window: Duration) -> Option<Range<usize>> {
    let mut best: Option<Range<usize>> = None;
    let mut end = segment.start;

    for start in segment.clone() {
        if end < start {
            end = start;
        }
        while end < segment.end
            && events[end].time.signed_duration_since(events[start].time) <= window
        {
            end += 1;
        }
        if best.as_ref().map_or(true, |b| end - start > b.len()) {
            best = Some(start..end);
        }
    }

    best
}

fn dominant_staff(events: &[VoidEvent]) -> Option<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        *counts.entry(event.staff_id.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(&str, usize)>, (staff, count)| match best {
            Some((_, top)) if top >= count => best,
            _ => Some((staff, count)),
        })
        .map(|(staff, count)| (staff.to_string(), count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionStatus;
    use crate::testing::{date, day_summary, time};

    fn void_at(hour: u32, minute: u32, staff: &str) -> VoidEvent {
        VoidEvent {
            time: time(hour, minute),
            staff_id: staff.to_string(),
            status: TransactionStatus::Voided,
        }
    }

    fn day_with(events: Vec<VoidEvent>) -> DaySummary {
        let mut day = day_summary(date(2025, 9, 15), 1000.0, 20);
        day.void_count = events.len();
        day.void_events = events;
        day
    }

    fn detector() -> VoidRefundDetector {
        VoidRefundDetector::new(&EngineConfig::default())
    }

    #[test]
    fn seven_voids_in_two_hours_form_one_cluster() {
        let events = vec![
            void_at(14, 5, "S-2"),
            void_at(14, 20, "S-2"),
            void_at(14, 40, "S-2"),
            void_at(15, 0, "S-1"),
            void_at(15, 15, "S-2"),
            void_at(15, 30, "S-2"),
            void_at(15, 55, "S-2"),
        ];
        let result = detector().assess(&day_with(events)).unwrap();

        assert!(result.triggered);
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(
            result.evidence[0],
            "cluster of 7 voids/refunds between 14:05 and 15:55 (window 120 min); 6 by staff S-2"
        );
        assert!((result.points - 100.0).abs() < 1e-9);
    }

    #[test]
    fn spread_out_voids_do_not_trigger() {
        let events = vec![
            void_at(8, 0, "S-1"),
            void_at(11, 0, "S-1"),
            void_at(14, 0, "S-1"),
            void_at(17, 0, "S-1"),
        ];
        let result = detector().assess(&day_with(events)).unwrap();
        assert!(!result.triggered);
        assert_eq!(result.points, 0.0);
    }

    #[test]
    fn second_cluster_adds_diminishing_points() {
        let morning = vec![void_at(9, 0, "S-1"), void_at(9, 10, "S-1"), void_at(9, 20, "S-1")];
        let mut both = morning.clone();
        both.extend([void_at(16, 0, "S-3"), void_at(16, 5, "S-3"), void_at(16, 10, "S-3")]);

        let single = detector().assess(&day_with(morning)).unwrap();
        let double = detector().assess(&day_with(both)).unwrap();

        assert_eq!(single.points, 40.0);
        assert_eq!(double.points, 60.0);
        assert_eq!(double.evidence.len(), 2);
    }

    #[test]
    fn clusters_are_disjoint_and_largest_first() {
        let events = vec![
            void_at(9, 0, "S-1"),
            void_at(9, 30, "S-1"),
            void_at(10, 0, "S-1"),
            void_at(13, 0, "S-2"),
            void_at(13, 10, "S-2"),
            void_at(13, 20, "S-2"),
            void_at(13, 30, "S-2"),
        ];
        let clusters = find_clusters(&events, Duration::minutes(120), 3);
        assert_eq!(clusters, vec![3..7, 0..3]);
    }

    #[test]
    fn unordered_events_are_a_fault() {
        let events = vec![void_at(15, 0, "S-1"), void_at(9, 0, "S-1")];
        assert!(matches!(
            detector().assess(&day_with(events)),
            Err(DetectorError::InvalidInput(_))
        ));
    }
}
