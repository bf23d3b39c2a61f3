use crate::application::fallback::FallbackOrchestrator;
use crate::application::prompts::{cleanup_prompt, generation_prompt};
use crate::application::response_parser::{parse_generated_targets, parse_task_ids};
use crate::domain::models::{AiGeneratedTarget, Frequency, Target, Task};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::ModelClient;
use crate::infrastructure::planner_repository::PlannerRepository;
use crate::infrastructure::settings_store::SettingsStore;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const CLEANUP_OPERATION: &str = "cleanup";
const GENERATION_OPERATION: &str = "generation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    Idle,
    ValidatingPreconditions,
    Cleaning,
    Generating,
    Persisting,
    Done,
}

impl WorkflowPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ValidatingPreconditions => "validating_preconditions",
            Self::Cleaning => "cleaning",
            Self::Generating => "generating",
            Self::Persisting => "persisting",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("API key required")]
    ApiKeyRequired,
    #[error("no tasks")]
    NoTasks,
    #[error("{0}")]
    Generation(String),
    #[error(transparent)]
    Storage(#[from] InfraError),
    #[error("AI workflow already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub cleaned_count: usize,
    pub created_count: usize,
    pub cleaned_task_ids: Vec<String>,
    pub created_target_ids: Vec<String>,
    pub assigned_date: String,
}

impl WorkflowSummary {
    /// Nothing cleaned and nothing created. Not an error.
    pub fn is_noop(&self) -> bool {
        self.cleaned_count == 0 && self.created_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed(WorkflowSummary),
    /// Preferences must be collected before the workflow can run.
    PreferencesRequired,
}

struct PhaseTracker {
    current: WorkflowPhase,
}

impl PhaseTracker {
    fn enter(&mut self, next: WorkflowPhase) {
        tracing::info!(from = self.current.as_str(), to = next.as_str(), "workflow phase");
        self.current = next;
    }
}

/// Cleans up stale tasks and turns the rest into targets for tomorrow.
pub struct AiWorkflow<C>
where
    C: ModelClient + ?Sized,
{
    settings: SettingsStore,
    repository: PlannerRepository,
    fallback: FallbackOrchestrator<C>,
    timezone: Tz,
    now_provider: NowProvider,
}

impl<C> AiWorkflow<C>
where
    C: ModelClient + ?Sized,
{
    pub fn new(
        settings: SettingsStore,
        repository: PlannerRepository,
        fallback: FallbackOrchestrator<C>,
        timezone: Tz,
    ) -> Self {
        Self {
            settings,
            repository,
            fallback,
            timezone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn run(&self) -> Result<WorkflowOutcome, WorkflowError> {
        let mut phase = PhaseTracker {
            current: WorkflowPhase::Idle,
        };
        let result = self.run_phases(&mut phase).await;
        if let Err(error) = &result {
            tracing::warn!(phase = phase.current.as_str(), %error, "workflow reported error");
        }
        result
    }

    async fn run_phases(&self, phase: &mut PhaseTracker) -> Result<WorkflowOutcome, WorkflowError> {
        phase.enter(WorkflowPhase::ValidatingPreconditions);
        let Some(api_key) = self.settings.api_key()? else {
            return Err(WorkflowError::ApiKeyRequired);
        };
        let prefs = self.settings.user_prefs()?;
        if !prefs.prefs_completed {
            tracing::info!("workflow waiting for user preferences");
            return Ok(WorkflowOutcome::PreferencesRequired);
        }
        let mut tasks = self.repository.load_tasks()?;
        let incomplete = tasks
            .iter()
            .filter(|task| !task.completed)
            .cloned()
            .collect::<Vec<_>>();
        if incomplete.is_empty() {
            return Err(WorkflowError::NoTasks);
        }
        let existing_targets = self.repository.load_targets()?;

        let now = (self.now_provider)();
        let tomorrow = now.with_timezone(&self.timezone).date_naive() + Duration::days(1);
        let mut preferred_model = self.settings.preferred_model()?;

        phase.enter(WorkflowPhase::Cleaning);
        let flagged = match self
            .fallback
            .execute(
                CLEANUP_OPERATION,
                &cleanup_prompt(&incomplete),
                &api_key,
                &preferred_model,
                |raw| Ok(parse_task_ids(raw)),
            )
            .await
        {
            Ok(success) => {
                preferred_model = success.model;
                success.value.into_iter().collect::<HashSet<_>>()
            }
            Err(error) => {
                tracing::warn!(%error, "cleanup failed, continuing with all tasks");
                HashSet::new()
            }
        };
        let cleaned_task_ids = mark_cleaned(&mut tasks, &flagged);
        let working_set = incomplete
            .into_iter()
            .filter(|task| !flagged.contains(&task.id))
            .collect::<Vec<_>>();

        phase.enter(WorkflowPhase::Generating);
        let generated = if working_set.is_empty() {
            tracing::info!("no tasks left after cleanup, skipping generation");
            Vec::new()
        } else {
            self.fallback
                .execute(
                    GENERATION_OPERATION,
                    &generation_prompt(&working_set, &prefs, tomorrow),
                    &api_key,
                    &preferred_model,
                    parse_generated_targets,
                )
                .await
                .map_err(|error| WorkflowError::Generation(error.to_string()))?
                .value
        };

        phase.enter(WorkflowPhase::Persisting);
        let new_targets = build_targets(generated, now, tomorrow);
        link_tasks(&mut tasks, &new_targets);
        let summary = WorkflowSummary {
            cleaned_count: cleaned_task_ids.len(),
            created_count: new_targets.len(),
            cleaned_task_ids,
            created_target_ids: new_targets.iter().map(|target| target.id.clone()).collect(),
            assigned_date: tomorrow.to_string(),
        };
        if !summary.is_noop() {
            let mut targets = existing_targets;
            targets.extend(new_targets);
            self.repository.commit(&tasks, &targets)?;
        }

        phase.enter(WorkflowPhase::Done);
        tracing::info!(
            cleaned = summary.cleaned_count,
            created = summary.created_count,
            "workflow finished"
        );
        Ok(WorkflowOutcome::Completed(summary))
    }
}

fn mark_cleaned(tasks: &mut [Task], flagged: &HashSet<String>) -> Vec<String> {
    let mut cleaned = Vec::new();
    for task in tasks.iter_mut() {
        if !task.completed && flagged.contains(&task.id) {
            task.completed = true;
            task.ai_suggested = Some(true);
            cleaned.push(task.id.clone());
        }
    }
    cleaned
}

fn build_targets(
    generated: Vec<AiGeneratedTarget>,
    now: DateTime<Utc>,
    tomorrow: NaiveDate,
) -> Vec<Target> {
    let base_id = now.timestamp_millis();
    generated
        .into_iter()
        .enumerate()
        .map(|(index, item)| Target {
            id: format!("{base_id}-{index}"),
            title: item.title,
            target_type: item.target_type,
            target_value: item.target_value,
            current_value: 0.0,
            start_time: None,
            frequency: Frequency::Once,
            assigned_date: Some(tomorrow.to_string()),
            custom_days: None,
            notes: item.notes.filter(|notes| !notes.trim().is_empty()),
            reminder_time: item
                .reminder_time
                .as_deref()
                .and_then(|value| reminder_at(tomorrow, value)),
            notification_id: None,
            linked_task_ids: Some(item.linked_task_ids),
            priority: item.priority,
        })
        .collect()
}

/// `"HH:MM"` on `date` as a local ISO datetime; `None` when unreadable.
fn reminder_at(date: NaiveDate, value: &str) -> Option<String> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some(format!("{}T{}:00", date, time.format("%H:%M")))
}

/// First new target listing a task wins that task.
fn link_tasks(tasks: &mut [Task], new_targets: &[Target]) {
    for task in tasks.iter_mut() {
        if let Some(target) = new_targets.iter().find(|target| target.is_linked_to(&task.id)) {
            task.linked_target_id = Some(target.id.clone());
        }
    }
}
