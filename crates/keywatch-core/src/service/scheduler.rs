//! Jittered scheduling of lookup tasks.
//!
//! Each active user gets one task per interval at a random minute offset, so
//! lookups spread across the interval instead of stampeding the directory at
//! the same instant. With frequency F the offset is uniform in [1, F−1] and a
//! task stays executable for one further interval, bounding staleness to
//! roughly 2F minutes.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::entities::{LookupTask, User};
use crate::domain::errors::PipelineError;
use crate::ports::outbound::{Storage, TimeSource};

/// The random offset is drawn from [1, F−1] minutes, so any frequency below
/// two leaves no legal offset and is rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("lookup frequency must be at least 2 minutes, got {minutes}")]
pub struct InvalidFrequency {
    pub minutes: u32,
}

/// Creates jittered lookup tasks for active users.
pub struct Scheduler<T: TimeSource> {
    time: T,
    frequency_minutes: u32,
}

impl<T: TimeSource> Scheduler<T> {
    pub fn new(time: T, frequency_minutes: u32) -> Result<Self, InvalidFrequency> {
        if frequency_minutes < 2 {
            return Err(InvalidFrequency {
                minutes: frequency_minutes,
            });
        }
        Ok(Self {
            time,
            frequency_minutes,
        })
    }

    fn frequency(&self) -> Duration {
        Duration::minutes(i64::from(self.frequency_minutes))
    }

    /// Schedules one lookup for `user` at a random minute offset after
    /// `start`.
    pub fn schedule_for_user<S: Storage>(
        &self,
        store: &mut S,
        user: &User,
        start: DateTime<Utc>,
    ) -> Result<LookupTask, PipelineError> {
        let offset = rand::thread_rng().gen_range(1..i64::from(self.frequency_minutes));
        let not_before = start + Duration::minutes(offset);
        let expires = not_before + self.frequency();

        let task = store.create_task(user.id, not_before, expires)?;
        debug!(
            task = task.id,
            user = user.id,
            %not_before,
            %expires,
            "scheduled lookup task"
        );
        Ok(task)
    }

    /// Schedules one lookup per currently-ACTIVE user, starting now.
    pub fn run<S: Storage>(&self, store: &mut S) -> Result<Vec<LookupTask>, PipelineError> {
        let start = self.time.now();
        let users = store.active_users()?;

        let mut tasks = Vec::with_capacity(users.len());
        for user in &users {
            tasks.push(self.schedule_for_user(store, user, start)?);
        }

        info!(scheduled = tasks.len(), "scheduler sweep complete");
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::TimeZone;

    use crate::adapters::memory::MemoryStore;
    use crate::adapters::mock::MockTimeSource;
    use crate::domain::entities::{TaskStatus, UserStatus};
    use crate::domain::value_objects::PhoneNumber;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn store_with_user() -> (MemoryStore, User) {
        let mut store = MemoryStore::new();
        let user = store
            .create_user(PhoneNumber::new("+15555550100").unwrap())
            .unwrap();
        (store, user)
    }

    #[test]
    fn test_rejects_frequency_below_two_minutes() {
        assert!(Scheduler::new(MockTimeSource::new(ts(0)), 0).is_err());
        assert!(Scheduler::new(MockTimeSource::new(ts(0)), 1).is_err());
        assert!(Scheduler::new(MockTimeSource::new(ts(0)), 2).is_ok());
    }

    #[test]
    fn test_task_always_lands_inside_the_interval() {
        let (mut store, user) = store_with_user();
        let frequency = 60u32;
        let scheduler = Scheduler::new(MockTimeSource::new(ts(0)), frequency).unwrap();
        let start = ts(1_000_000);

        for _ in 0..1_000 {
            let task = scheduler
                .schedule_for_user(&mut store, &user, start)
                .unwrap();

            assert!(task.not_before > start);
            assert!(task.not_before < start + Duration::minutes(i64::from(frequency)));
            assert_eq!(
                task.expires,
                task.not_before + Duration::minutes(i64::from(frequency))
            );
            assert_eq!(task.status, TaskStatus::Pending);
        }
    }

    #[test]
    fn test_offsets_cover_the_whole_range() {
        let (mut store, user) = store_with_user();
        let frequency = 60u32;
        let scheduler = Scheduler::new(MockTimeSource::new(ts(0)), frequency).unwrap();
        let start = ts(1_000_000);

        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let task = scheduler
                .schedule_for_user(&mut store, &user, start)
                .unwrap();
            seen.insert((task.not_before - start).num_minutes());
        }

        let expected: HashSet<i64> = (1..i64::from(frequency)).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_minimum_frequency_pins_offset_to_one_minute() {
        let (mut store, user) = store_with_user();
        let scheduler = Scheduler::new(MockTimeSource::new(ts(0)), 2).unwrap();
        let start = ts(500_000);

        for _ in 0..50 {
            let task = scheduler
                .schedule_for_user(&mut store, &user, start)
                .unwrap();
            assert_eq!(task.not_before, start + Duration::minutes(1));
        }
    }

    #[test]
    fn test_run_schedules_only_active_users() {
        let (mut store, active) = store_with_user();
        let inactive = store
            .create_user(PhoneNumber::new("+15555550101").unwrap())
            .unwrap();
        store
            .update_user_status(inactive.id, UserStatus::Deactivated)
            .unwrap();

        let now = ts(2_000_000);
        let scheduler = Scheduler::new(MockTimeSource::new(now), 60).unwrap();
        let tasks = scheduler.run(&mut store).unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].user_id, active.id);
        assert!(tasks[0].not_before > now);
    }
}
