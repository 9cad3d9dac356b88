//! Pure purge policy (§4.4): at most once per 60s, only once the list grows
//! past 20 entries, dropping anything finished more than 600s ago.

use chrono::{DateTime, Duration, Utc};

use super::task::TaskRecord;

pub const PURGE_INTERVAL_SECS: i64 = 60;
pub const PURGE_THRESHOLD_COUNT: usize = 20;
pub const PURGE_MAX_AGE_SECS: i64 = 600;

/// Whether a purge sweep should run now, given when the last one ran and how
/// many records are currently tracked.
pub fn purge_due(now: DateTime<Utc>, last_purge: Option<DateTime<Utc>>, count: usize) -> bool {
    if count <= PURGE_THRESHOLD_COUNT {
        return false;
    }
    match last_purge {
        None => true,
        Some(last) => now - last >= Duration::seconds(PURGE_INTERVAL_SECS),
    }
}

/// Drop finished records older than the max age. Running tasks (no
/// `finish_time`) are never purged.
pub fn purge(records: &mut Vec<TaskRecord>, now: DateTime<Utc>) -> usize {
    let before = records.len();
    records.retain(|r| match r.finish_time {
        None => true,
        Some(finish) => now - finish < Duration::seconds(PURGE_MAX_AGE_SECS),
    });
    before - records.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::task::TaskId;

    fn finished_record(finish_age_secs: i64, now: DateTime<Utc>) -> TaskRecord {
        let mut r = TaskRecord::new(TaskId::new(), "t".into());
        r.start_time = Some(now - Duration::seconds(finish_age_secs + 1));
        r.finish_time = Some(now - Duration::seconds(finish_age_secs));
        r
    }

    #[test]
    fn not_due_below_threshold_count() {
        let now = Utc::now();
        assert!(!purge_due(now, None, 5));
    }

    #[test]
    fn due_above_threshold_with_no_prior_purge() {
        let now = Utc::now();
        assert!(purge_due(now, None, 21));
    }

    #[test]
    fn not_due_again_within_interval() {
        let now = Utc::now();
        let last = now - Duration::seconds(30);
        assert!(!purge_due(now, Some(last), 21));
    }

    #[test]
    fn due_again_once_interval_elapses() {
        let now = Utc::now();
        let last = now - Duration::seconds(61);
        assert!(purge_due(now, Some(last), 21));
    }

    #[test]
    fn purge_drops_only_old_finished_entries() {
        let now = Utc::now();
        let mut records = vec![
            finished_record(700, now),
            finished_record(10, now),
            TaskRecord::new(TaskId::new(), "running".into()),
        ];
        let removed = purge(&mut records, now);
        assert_eq!(removed, 1);
        assert_eq!(records.len(), 2);
    }
}
