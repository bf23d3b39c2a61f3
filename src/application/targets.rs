use crate::domain::models::{Frequency, HistoryLog, Target, TargetType};
use crate::domain::units;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_repository::PlannerRepository;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTarget {
    pub title: String,
    pub target_type: TargetType,
    pub target_value: f64,
    pub frequency: Frequency,
    pub assigned_date: Option<String>,
    pub custom_days: Option<Vec<u8>>,
    pub notes: Option<String>,
    pub reminder_time: Option<String>,
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub target: Target,
    pub logged: Option<HistoryLog>,
    pub completed_task_count: usize,
}

/// Manual target edits, progress and focus timers.
#[derive(Clone)]
pub struct TargetTracker {
    repository: PlannerRepository,
    timezone: Tz,
    now_provider: NowProvider,
}

impl TargetTracker {
    pub fn new(repository: PlannerRepository, timezone: Tz) -> Self {
        Self {
            repository,
            timezone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.now_provider)().with_timezone(&self.timezone).date_naive()
    }

    pub fn create_target(&self, input: NewTarget) -> Result<Target, InfraError> {
        let reminder_time = match input.reminder_time.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => {
                NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").map_err(|_| {
                    InfraError::InvalidConfig(
                        "reminder time must be YYYY-MM-DDTHH:MM:SS".to_string(),
                    )
                })?;
                Some(value.to_string())
            }
            _ => None,
        };

        let target = Target {
            id: next_id("tgt"),
            title: input.title.trim().to_string(),
            target_type: input.target_type,
            target_value: input.target_value,
            current_value: 0.0,
            start_time: None,
            frequency: input.frequency,
            assigned_date: match input.frequency {
                Frequency::Once => Some(
                    input
                        .assigned_date
                        .unwrap_or_else(|| self.today().to_string()),
                ),
                _ => None,
            },
            custom_days: match input.frequency {
                Frequency::Custom => input.custom_days.map(|mut days| {
                    days.sort_unstable();
                    days.dedup();
                    days
                }),
                _ => None,
            },
            notes: input
                .notes
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
            reminder_time,
            notification_id: None,
            linked_task_ids: None,
            priority: input.priority.map(f64::from),
        };
        target.validate().map_err(InfraError::InvalidConfig)?;

        let mut targets = self.repository.load_targets()?;
        targets.push(target.clone());
        self.repository.save_targets(&targets)?;
        Ok(target)
    }

    pub fn list_for_date(&self, date: NaiveDate) -> Result<Vec<Target>, InfraError> {
        Ok(self
            .repository
            .load_targets()?
            .into_iter()
            .filter(|target| target.is_scheduled_for(date))
            .collect())
    }

    /// History entries of the deleted target are kept.
    pub fn delete_target(&self, target_id: &str) -> Result<bool, InfraError> {
        let mut targets = self.repository.load_targets()?;
        let before = targets.len();
        targets.retain(|target| target.id != target_id);
        if targets.len() == before {
            return Ok(false);
        }
        self.repository.save_targets(&targets)?;
        Ok(true)
    }

    pub fn add_progress(&self, target_id: &str, amount: f64) -> Result<ProgressUpdate, InfraError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(InfraError::InvalidConfig("amount must be > 0".to_string()));
        }
        let mut targets = self.repository.load_targets()?;
        let index = find_target(&targets, target_id)?;
        self.apply_progress(&mut targets, index, amount)
    }

    pub fn start_timer(&self, target_id: &str) -> Result<Target, InfraError> {
        let mut targets = self.repository.load_targets()?;
        let index = find_target(&targets, target_id)?;
        let target = &mut targets[index];
        if target.target_type != TargetType::Time {
            return Err(InfraError::InvalidConfig(format!(
                "target {target_id} is not a Time target"
            )));
        }
        if target.start_time.is_none() {
            target.start_time = Some((self.now_provider)().timestamp_millis());
            let started = target.clone();
            self.repository.save_targets(&targets)?;
            return Ok(started);
        }
        Ok(target.clone())
    }

    /// Adds the whole seconds elapsed since `start_timer` and clears the timer.
    pub fn stop_timer(&self, target_id: &str) -> Result<ProgressUpdate, InfraError> {
        let mut targets = self.repository.load_targets()?;
        let index = find_target(&targets, target_id)?;
        let Some(started_at) = targets[index].start_time.take() else {
            return Err(InfraError::InvalidConfig(format!(
                "timer is not running for target {target_id}"
            )));
        };
        let elapsed_ms = (self.now_provider)().timestamp_millis() - started_at;
        let elapsed_seconds = (elapsed_ms.max(0) / 1000) as f64;
        self.apply_progress(&mut targets, index, elapsed_seconds)
    }

    pub fn history(&self) -> Result<Vec<HistoryLog>, InfraError> {
        self.repository.history()
    }

    fn apply_progress(
        &self,
        targets: &mut [Target],
        index: usize,
        amount: f64,
    ) -> Result<ProgressUpdate, InfraError> {
        let now = (self.now_provider)();
        let target = &mut targets[index];
        let at_goal = target.is_complete();
        let logged = if amount > 0.0 && !(at_goal && target.target_type == TargetType::Quantity) {
            target.current_value += amount;
            Some(HistoryLog {
                id: next_id("log"),
                target_id: target.id.clone(),
                target_title: target.title.clone(),
                timestamp: now.timestamp_millis(),
                value_change: amount,
                date_str: now.with_timezone(&self.timezone).date_naive().to_string(),
            })
        } else {
            None
        };
        let updated = target.clone();

        self.repository.save_targets(targets)?;
        if let Some(entry) = &logged {
            self.repository.log_activity(entry.clone())?;
        }
        let completed_task_count = if updated.is_complete() {
            self.repository.complete_tasks_by_target_id(&updated.id)?
        } else {
            0
        };
        if logged.is_some() {
            tracing::debug!(
                target_id = %updated.id,
                progress = %units::format_progress(
                    updated.target_type,
                    updated.target_value,
                    updated.current_value
                ),
                "progress recorded"
            );
        }

        Ok(ProgressUpdate {
            target: updated,
            logged,
            completed_task_count,
        })
    }
}

fn find_target(targets: &[Target], target_id: &str) -> Result<usize, InfraError> {
    targets
        .iter()
        .position(|target| target.id == target_id)
        .ok_or_else(|| InfraError::InvalidConfig(format!("target not found: {target_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Task;
    use crate::infrastructure::storage::InMemoryKeyValueStore;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    struct Clock {
        now: Mutex<DateTime<Utc>>,
    }

    impl Clock {
        fn advance(&self, seconds: i64) {
            let mut guard = self.now.lock().expect("clock mutex poisoned");
            *guard += Duration::seconds(seconds);
        }
    }

    fn tracker() -> (Arc<Clock>, PlannerRepository, TargetTracker) {
        let clock = Arc::new(Clock {
            now: Mutex::new(
                Utc.with_ymd_and_hms(2026, 2, 16, 23, 30, 0)
                    .single()
                    .expect("valid timestamp"),
            ),
        });
        let repository = PlannerRepository::new(Arc::new(InMemoryKeyValueStore::default()));
        let reader = Arc::clone(&clock);
        let tracker = TargetTracker::new(repository.clone(), chrono_tz::Asia::Tokyo)
            .with_now_provider(Arc::new(move || {
                *reader.now.lock().expect("clock mutex poisoned")
            }));
        (clock, repository, tracker)
    }

    fn new_target(target_type: TargetType, value: f64) -> NewTarget {
        NewTarget {
            title: "Read".to_string(),
            target_type,
            target_value: value,
            frequency: Frequency::Daily,
            assigned_date: None,
            custom_days: None,
            notes: None,
            reminder_time: None,
            priority: None,
        }
    }

    #[test]
    fn once_target_defaults_to_today_in_configured_timezone() {
        let (_, _, tracker) = tracker();
        let target = tracker
            .create_target(NewTarget {
                frequency: Frequency::Once,
                custom_days: Some(vec![1]),
                ..new_target(TargetType::Quantity, 3.0)
            })
            .expect("create target");
        assert_eq!(target.assigned_date.as_deref(), Some("2026-02-17"));
        assert_eq!(target.custom_days, None);
    }

    #[test]
    fn create_target_rejects_invalid_input() {
        let (_, _, tracker) = tracker();
        assert!(tracker.create_target(new_target(TargetType::Quantity, 0.0)).is_err());
        assert!(
            tracker
                .create_target(NewTarget {
                    frequency: Frequency::Custom,
                    custom_days: Some(vec![]),
                    ..new_target(TargetType::Quantity, 1.0)
                })
                .is_err()
        );
        assert!(
            tracker
                .create_target(NewTarget {
                    reminder_time: Some("9am".to_string()),
                    ..new_target(TargetType::Quantity, 1.0)
                })
                .is_err()
        );
    }

    #[test]
    fn list_for_date_applies_frequency_rules() {
        let (_, _, tracker) = tracker();
        tracker
            .create_target(new_target(TargetType::Quantity, 1.0))
            .expect("daily");
        tracker
            .create_target(NewTarget {
                frequency: Frequency::Custom,
                custom_days: Some(vec![0]),
                ..new_target(TargetType::Quantity, 1.0)
            })
            .expect("sundays");

        let sunday = NaiveDate::from_ymd_opt(2026, 2, 15).expect("valid date");
        let monday = NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date");
        assert_eq!(tracker.list_for_date(sunday).expect("list").len(), 2);
        assert_eq!(tracker.list_for_date(monday).expect("list").len(), 1);
    }

    #[test]
    fn add_progress_logs_and_completes_linked_tasks() {
        let (_, repository, tracker) = tracker();
        let target = tracker
            .create_target(new_target(TargetType::Quantity, 2.0))
            .expect("create target");
        let mut task = Task::new("t1", "Call mom");
        task.linked_target_id = Some(target.id.clone());
        repository.save_tasks(&[task]).expect("save tasks");

        let first = tracker.add_progress(&target.id, 1.0).expect("progress");
        assert_eq!(first.completed_task_count, 0);
        let logged = first.logged.expect("history entry");
        assert_eq!(logged.value_change, 1.0);
        assert_eq!(logged.date_str, "2026-02-17");

        let second = tracker.add_progress(&target.id, 1.0).expect("progress");
        assert_eq!(second.completed_task_count, 1);
        assert!(repository.load_tasks().expect("tasks")[0].completed);

        let third = tracker.add_progress(&target.id, 1.0).expect("progress");
        assert_eq!(third.target.current_value, 2.0);
        assert!(third.logged.is_none());
        assert_eq!(tracker.history().expect("history").len(), 2);
    }

    #[test]
    fn add_progress_rejects_non_positive_amounts() {
        let (_, _, tracker) = tracker();
        let target = tracker
            .create_target(new_target(TargetType::Quantity, 2.0))
            .expect("create target");
        assert!(tracker.add_progress(&target.id, 0.0).is_err());
        assert!(tracker.add_progress(&target.id, -1.0).is_err());
        assert!(tracker.add_progress("missing", 1.0).is_err());
    }

    #[test]
    fn timer_adds_elapsed_seconds_and_completes_in_minutes() {
        let (clock, _, tracker) = tracker();
        let target = tracker
            .create_target(new_target(TargetType::Time, 10.0))
            .expect("create target");

        let started = tracker.start_timer(&target.id).expect("start");
        assert!(started.start_time.is_some());
        clock.advance(30);
        let restarted = tracker.start_timer(&target.id).expect("start again");
        assert_eq!(restarted.start_time, started.start_time);

        clock.advance(570);
        let update = tracker.stop_timer(&target.id).expect("stop");
        assert_eq!(update.target.current_value, 600.0);
        assert_eq!(update.target.start_time, None);
        assert_eq!(update.target.progress_percent(), 100.0);
        assert!(update.target.is_complete());
        assert!(tracker.stop_timer(&target.id).is_err());
    }

    #[test]
    fn timer_is_only_for_time_targets() {
        let (_, _, tracker) = tracker();
        let target = tracker
            .create_target(new_target(TargetType::Quantity, 2.0))
            .expect("create target");
        assert!(tracker.start_timer(&target.id).is_err());
    }

    #[test]
    fn delete_target_keeps_history() {
        let (_, _, tracker) = tracker();
        let target = tracker
            .create_target(new_target(TargetType::Quantity, 5.0))
            .expect("create target");
        tracker.add_progress(&target.id, 2.0).expect("progress");

        assert!(tracker.delete_target(&target.id).expect("delete"));
        assert!(!tracker.delete_target(&target.id).expect("delete again"));
        assert_eq!(tracker.history().expect("history").len(), 1);
    }
}
