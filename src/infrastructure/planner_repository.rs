use crate::domain::models::{HistoryLog, Target, Task};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::KeyValueStore;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub const TASKS_KEY: &str = "@tasks_data";
pub const TARGETS_KEY: &str = "@targets_data";
pub const LOGS_KEY: &str = "@target_logs";

/// Task list, target list and the append-only activity log.
#[derive(Clone)]
pub struct PlannerRepository {
    store: Arc<dyn KeyValueStore>,
}

impl PlannerRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load_tasks(&self) -> Result<Vec<Task>, InfraError> {
        self.load_list(TASKS_KEY)
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), InfraError> {
        self.store.set(TASKS_KEY, &serde_json::to_string(tasks)?)
    }

    pub fn load_targets(&self) -> Result<Vec<Target>, InfraError> {
        self.load_list(TARGETS_KEY)
    }

    pub fn save_targets(&self, targets: &[Target]) -> Result<(), InfraError> {
        self.store.set(TARGETS_KEY, &serde_json::to_string(targets)?)
    }

    /// Replaces both lists in one write.
    pub fn commit(&self, tasks: &[Task], targets: &[Target]) -> Result<(), InfraError> {
        let tasks = serde_json::to_string(tasks)?;
        let targets = serde_json::to_string(targets)?;
        self.store.set_many(&[(TASKS_KEY, tasks), (TARGETS_KEY, targets)])
    }

    pub fn history(&self) -> Result<Vec<HistoryLog>, InfraError> {
        self.load_list(LOGS_KEY)
    }

    pub fn log_activity(&self, entry: HistoryLog) -> Result<(), InfraError> {
        let mut logs = self.history()?;
        logs.push(entry);
        self.store.set(LOGS_KEY, &serde_json::to_string(&logs)?)
    }

    /// Completes every open task linked to `target_id`; returns how many changed.
    pub fn complete_tasks_by_target_id(&self, target_id: &str) -> Result<usize, InfraError> {
        let mut tasks = self.load_tasks()?;
        let mut completed = 0;
        for task in tasks.iter_mut() {
            if task.linked_target_id.as_deref() == Some(target_id) && !task.completed {
                task.completed = true;
                completed += 1;
            }
        }
        if completed > 0 {
            self.save_tasks(&tasks)?;
        }
        Ok(completed)
    }

    fn load_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, InfraError> {
        match self.store.get(key)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Frequency, TargetType};
    use crate::infrastructure::storage::InMemoryKeyValueStore;

    fn repository() -> (Arc<InMemoryKeyValueStore>, PlannerRepository) {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let repository = PlannerRepository::new(store.clone());
        (store, repository)
    }

    fn sample_target(id: &str) -> Target {
        Target {
            id: id.to_string(),
            title: "Workout".to_string(),
            target_type: TargetType::Time,
            target_value: 20.0,
            current_value: 0.0,
            start_time: None,
            frequency: Frequency::Daily,
            assigned_date: None,
            custom_days: None,
            notes: None,
            reminder_time: None,
            notification_id: None,
            linked_task_ids: None,
            priority: None,
        }
    }

    #[test]
    fn missing_blobs_load_as_empty_lists() {
        let (_, repository) = repository();
        assert!(repository.load_tasks().expect("tasks").is_empty());
        assert!(repository.load_targets().expect("targets").is_empty());
        assert!(repository.history().expect("history").is_empty());
    }

    #[test]
    fn commit_writes_tasks_and_targets_in_one_call() {
        let (store, repository) = repository();
        let tasks = vec![Task::new("t1", "Call mom")];
        let targets = vec![sample_target("tgt-1")];

        repository.commit(&tasks, &targets).expect("commit");

        assert_eq!(store.write_count(), 1);
        assert_eq!(repository.load_tasks().expect("tasks"), tasks);
        assert_eq!(repository.load_targets().expect("targets"), targets);
    }

    #[test]
    fn log_activity_appends_entries() {
        let (_, repository) = repository();
        for index in 0..3 {
            repository
                .log_activity(HistoryLog {
                    id: format!("log-{index}"),
                    target_id: "tgt-1".to_string(),
                    target_title: "Workout".to_string(),
                    timestamp: 1_700_000_000_000 + index,
                    value_change: 60.0,
                    date_str: "2026-02-16".to_string(),
                })
                .expect("log activity");
        }
        let history = repository.history().expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].id, "log-2");
    }

    #[test]
    fn complete_tasks_by_target_id_only_touches_linked_open_tasks() {
        let (store, repository) = repository();
        let mut linked = Task::new("t1", "Write report");
        linked.linked_target_id = Some("tgt-1".to_string());
        let mut other = Task::new("t2", "Groceries");
        other.linked_target_id = Some("tgt-2".to_string());
        repository
            .save_tasks(&[linked, other, Task::new("t3", "Unlinked")])
            .expect("save tasks");

        assert_eq!(repository.complete_tasks_by_target_id("tgt-1").expect("complete"), 1);
        let writes = store.write_count();
        assert_eq!(repository.complete_tasks_by_target_id("tgt-1").expect("complete"), 0);
        assert_eq!(store.write_count(), writes);

        let tasks = repository.load_tasks().expect("tasks");
        assert!(tasks[0].completed);
        assert!(!tasks[1].completed);
        assert!(!tasks[2].completed);
    }
}
