//! Scheduled-job table.
//!
//! All recurring and one-shot timers live in a single map keyed by
//! `(user_id, kind)`, which makes the core invariant structural: a
//! subscriber can never hold two live jobs of the same kind, because
//! `schedule` is an atomic replace in that map. This removes the race
//! window of the "cancel if exists, then create" pattern entirely.
//!
//! The table stores wall-clock due times (`DateTime<Utc>`); the scheduler
//! loop drains it with `due(now)` on a coarse tick. Recurring jobs are
//! re-armed at drain time, one-shots are removed.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Weather refresh every N seconds (N ≈ 7200).
    RecurringInterval,
    /// Morning forecast at a fixed subscriber-local clock time.
    DailyAtTime,
    /// Fires once and is removed (onboarding nudge).
    OneShot,
}

/// One scheduled job, owned by exactly one subscriber.
#[derive(Debug, Clone)]
pub struct Job {
    pub user_id: i64,
    pub kind: JobKind,
    pub next_fire_at: DateTime<Utc>,
    pub chat_id: i64,
    /// Location the job is bound to; `None` for jobs that re-read the
    /// subscriber record when they fire.
    pub location: Option<String>,
    /// Re-arm step for the recurring kinds; ignored for `OneShot`.
    pub interval_seconds: i64,
}

#[derive(Default)]
pub struct JobTable {
    jobs: Mutex<HashMap<(i64, JobKind), Job>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `job`, atomically replacing any live job of the same kind
    /// for the same subscriber.
    pub fn schedule(&self, job: Job) {
        let mut jobs = self.jobs.lock().expect("job table lock poisoned");
        jobs.insert((job.user_id, job.kind), job);
    }

    /// Cancel one job. Cancelling an absent (already fired or already
    /// cancelled) job is a no-op.
    pub fn cancel(&self, user_id: i64, kind: JobKind) {
        let mut jobs = self.jobs.lock().expect("job table lock poisoned");
        jobs.remove(&(user_id, kind));
    }

    /// Cancel every job the subscriber owns.
    pub fn cancel_all(&self, user_id: i64) {
        let mut jobs = self.jobs.lock().expect("job table lock poisoned");
        jobs.retain(|(owner, _), _| *owner != user_id);
    }

    pub fn get(&self, user_id: i64, kind: JobKind) -> Option<Job> {
        let jobs = self.jobs.lock().expect("job table lock poisoned");
        jobs.get(&(user_id, kind)).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("job table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every job due at `now`. Recurring jobs are re-armed past `now`
    /// before being returned (a long stall yields one catch-up fire, not a
    /// burst); one-shots are removed from the table.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<Job> {
        let mut jobs = self.jobs.lock().expect("job table lock poisoned");
        let mut fired = Vec::new();

        jobs.retain(|_, job| {
            if job.next_fire_at > now {
                return true;
            }
            fired.push(job.clone());
            match job.kind {
                JobKind::OneShot => false,
                JobKind::RecurringInterval | JobKind::DailyAtTime => {
                    let step = Duration::seconds(job.interval_seconds.max(1));
                    while job.next_fire_at <= now {
                        job.next_fire_at += step;
                    }
                    true
                }
            }
        });

        fired
    }
}

/// Next occurrence of `hour`:00 in the subscriber's local timezone,
/// expressed in UTC. Falls back to UTC when the stored offset is invalid.
pub fn next_daily_fire(now: DateTime<Utc>, tz_offset_secs: i32, hour: u32) -> DateTime<Utc> {
    let offset = FixedOffset::east_opt(tz_offset_secs)
        .unwrap_or_else(|| Utc.fix());
    let local_now = now.with_timezone(&offset);

    let target_time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let mut candidate = local_now.date_naive().and_time(target_time);
    if candidate <= local_now.naive_local() {
        candidate += Duration::days(1);
    }

    match offset.from_local_datetime(&candidate).single() {
        Some(local) => local.with_timezone(&Utc),
        None => now + Duration::days(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job(user_id: i64, kind: JobKind, fire_in_secs: i64) -> Job {
        Job {
            user_id,
            kind,
            next_fire_at: Utc::now() + Duration::seconds(fire_in_secs),
            chat_id: user_id * 100,
            location: Some("Kyiv".to_string()),
            interval_seconds: 7200,
        }
    }

    // ---- schedule / replace ----

    #[test]
    fn schedule_replaces_job_of_same_kind_for_same_user() {
        let table = JobTable::new();
        table.schedule(make_job(1, JobKind::RecurringInterval, 100));

        let mut replacement = make_job(1, JobKind::RecurringInterval, 500);
        replacement.location = Some("Lviv".to_string());
        table.schedule(replacement);

        assert_eq!(table.len(), 1);
        let job = table.get(1, JobKind::RecurringInterval).unwrap();
        assert_eq!(job.location.as_deref(), Some("Lviv"));
    }

    #[test]
    fn different_kinds_coexist_for_one_user() {
        let table = JobTable::new();
        table.schedule(make_job(1, JobKind::RecurringInterval, 100));
        table.schedule(make_job(1, JobKind::DailyAtTime, 100));
        table.schedule(make_job(1, JobKind::OneShot, 100));

        assert_eq!(table.len(), 3);
    }

    // ---- cancel ----

    #[test]
    fn cancel_is_idempotent() {
        let table = JobTable::new();
        table.schedule(make_job(1, JobKind::OneShot, 100));

        table.cancel(1, JobKind::OneShot);
        table.cancel(1, JobKind::OneShot); // no-op, not an error

        assert!(table.is_empty());
    }

    #[test]
    fn cancel_all_only_touches_the_given_user() {
        let table = JobTable::new();
        table.schedule(make_job(1, JobKind::RecurringInterval, 100));
        table.schedule(make_job(1, JobKind::DailyAtTime, 100));
        table.schedule(make_job(2, JobKind::RecurringInterval, 100));

        table.cancel_all(1);

        assert_eq!(table.len(), 1);
        assert!(table.get(2, JobKind::RecurringInterval).is_some());
    }

    // ---- due / re-arm ----

    #[test]
    fn due_returns_nothing_before_fire_time() {
        let table = JobTable::new();
        table.schedule(make_job(1, JobKind::RecurringInterval, 100));

        assert!(table.due(Utc::now()).is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn due_fires_and_rearms_recurring_jobs() {
        let table = JobTable::new();
        table.schedule(make_job(1, JobKind::RecurringInterval, -1));

        let now = Utc::now();
        let fired = table.due(now);

        assert_eq!(fired.len(), 1);
        let rearmed = table.get(1, JobKind::RecurringInterval).unwrap();
        assert!(rearmed.next_fire_at > now);
        assert!(rearmed.next_fire_at <= now + Duration::seconds(7200));
    }

    #[test]
    fn due_removes_one_shot_jobs() {
        let table = JobTable::new();
        table.schedule(make_job(1, JobKind::OneShot, -1));

        let fired = table.due(Utc::now());

        assert_eq!(fired.len(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn due_after_long_stall_yields_one_catchup_fire() {
        let table = JobTable::new();
        // Due five intervals ago.
        table.schedule(make_job(1, JobKind::RecurringInterval, -5 * 7200));

        let now = Utc::now();
        let fired = table.due(now);
        assert_eq!(fired.len(), 1);

        // Re-armed strictly past now, not five times in the past.
        let rearmed = table.get(1, JobKind::RecurringInterval).unwrap();
        assert!(rearmed.next_fire_at > now);

        // An immediate second drain fires nothing.
        assert!(table.due(now).is_empty());
    }

    // ---- next_daily_fire ----

    #[test]
    fn next_daily_fire_today_when_hour_is_ahead() {
        // 05:00 UTC at offset +2h = 07:00 local; 08:00 local is 06:00 UTC today.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap();
        let fire = next_daily_fire(now, 7200, 8);
        assert_eq!(fire, Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn next_daily_fire_tomorrow_when_hour_has_passed() {
        // 10:00 UTC at offset +2h = 12:00 local; next 08:00 local is tomorrow.
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let fire = next_daily_fire(now, 7200, 8);
        assert_eq!(fire, Utc.with_ymd_and_hms(2024, 6, 2, 6, 0, 0).unwrap());
    }

    #[test]
    fn next_daily_fire_defaults_to_utc_on_invalid_offset() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap();
        // Offsets beyond ±24h are invalid for FixedOffset.
        let fire = next_daily_fire(now, 999_999, 8);
        assert_eq!(fire, Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());
    }
}
