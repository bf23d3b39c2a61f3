use crate::application::ai_workflow::{AiWorkflow, WorkflowError, WorkflowOutcome};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::fallback::FallbackOrchestrator;
use crate::application::targets::{NewTarget, ProgressUpdate, TargetTracker, next_id};
use crate::domain::models::{HistoryLog, Target, Task, UserPrefs};
use crate::infrastructure::config::{AppConfig, CredentialBackend};
use crate::infrastructure::credential_store::{
    CredentialStore, KeyValueCredentialStore, KeyringCredentialStore,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::{ModelClient, ReqwestGeminiClient};
use crate::infrastructure::planner_repository::PlannerRepository;
use crate::infrastructure::settings_store::SettingsStore;
use crate::infrastructure::storage::SqliteKeyValueStore;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const CREDENTIAL_ACCOUNT: &str = "default";

pub struct AppState {
    workspace_root: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    config: AppConfig,
    settings: SettingsStore,
    repository: PlannerRepository,
    tracker: TargetTracker,
    model_client: Arc<dyn ModelClient>,
    workflow_busy: AtomicBool,
    log_guard: Mutex<()>,
}

struct WorkflowBusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for WorkflowBusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let credentials: Arc<dyn CredentialStore> = match bootstrap.config.credential_backend {
            CredentialBackend::Database => Arc::new(KeyValueCredentialStore::new(Arc::new(
                SqliteKeyValueStore::new(&bootstrap.database_path),
            ))),
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new(
                bootstrap.config.credential_service.clone(),
                CREDENTIAL_ACCOUNT,
            )),
        };
        let model_client = Arc::new(ReqwestGeminiClient::new(
            bootstrap.config.ai_endpoint.clone(),
        ));
        Self::with_services(workspace_root, credentials, model_client)
    }

    /// Same workspace layout with caller-supplied credential store and model client.
    pub fn with_services(
        workspace_root: PathBuf,
        credentials: Arc<dyn CredentialStore>,
        model_client: Arc<dyn ModelClient>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));
        let settings = SettingsStore::new(credentials, store.clone());
        let repository = PlannerRepository::new(store);
        let tracker = TargetTracker::new(repository.clone(), bootstrap.config.timezone);

        Ok(Self {
            workspace_root: bootstrap.workspace_root,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            config: bootstrap.config,
            settings,
            repository,
            tracker,
            model_client,
            workflow_busy: AtomicBool::new(false),
            log_guard: Mutex::new(()),
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn command_error(&self, command: &str, error: &impl Display) -> String {
        let message = error.to_string();
        self.log_error(command, &message);
        message
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn try_begin_workflow(&self) -> Option<WorkflowBusyGuard<'_>> {
        self.workflow_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| WorkflowBusyGuard {
                flag: &self.workflow_busy,
            })
    }

    pub fn is_workflow_running(&self) -> bool {
        self.workflow_busy.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub has_api_key: bool,
    pub preferred_model: String,
    pub user_prefs: UserPrefs,
    pub timezone: String,
    pub ai_endpoint: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResponse {
    pub model: String,
    pub ok: bool,
}

pub fn set_api_key_impl(state: &AppState, api_key: String) -> Result<(), InfraError> {
    state.settings.set_api_key(&api_key)?;
    state.log_info("set_api_key", "api key stored");
    Ok(())
}

pub fn clear_api_key_impl(state: &AppState) -> Result<(), InfraError> {
    state.settings.clear_api_key()?;
    state.log_info("clear_api_key", "api key removed");
    Ok(())
}

/// Sends a one-token request to the preferred model.
pub async fn test_connection_impl(
    state: &AppState,
    api_key: Option<String>,
) -> Result<ConnectionTestResponse, InfraError> {
    let api_key = match api_key
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        Some(value) => value,
        None => state
            .settings
            .api_key()?
            .ok_or_else(|| InfraError::InvalidConfig("API key required".to_string()))?,
    };
    let model = state.settings.preferred_model()?;
    let ok = state.model_client.check_model(&api_key, &model).await?;
    state.log_info("test_connection", &format!("model={model} ok={ok}"));
    Ok(ConnectionTestResponse { model, ok })
}

pub fn set_preferred_model_impl(state: &AppState, model_id: String) -> Result<String, InfraError> {
    state.settings.set_preferred_model(&model_id)?;
    let model = state.settings.preferred_model()?;
    state.log_info("set_preferred_model", &format!("model={model}"));
    Ok(model)
}

pub fn get_settings_impl(state: &AppState) -> Result<SettingsResponse, InfraError> {
    Ok(SettingsResponse {
        has_api_key: state.settings.api_key()?.is_some(),
        preferred_model: state.settings.preferred_model()?,
        user_prefs: state.settings.user_prefs()?,
        timezone: state.config.timezone.name().to_string(),
        ai_endpoint: state.config.ai_endpoint.clone(),
    })
}

/// Stores the preferences and marks them as collected.
pub fn save_user_prefs_impl(
    state: &AppState,
    work_start_time: Option<String>,
    break_duration: Option<u32>,
    total_work_time: Option<f64>,
) -> Result<UserPrefs, InfraError> {
    let mut prefs = state.settings.user_prefs()?;
    if let Some(value) = work_start_time {
        prefs.work_start_time = value.trim().to_string();
    }
    if let Some(value) = break_duration {
        prefs.break_duration = value;
    }
    if let Some(value) = total_work_time {
        prefs.total_work_time = value;
    }
    prefs.prefs_completed = true;
    state.settings.save_user_prefs(&prefs)?;
    state.log_info(
        "save_user_prefs",
        &format!(
            "work_start_time={} total_work_time={}",
            prefs.work_start_time, prefs.total_work_time
        ),
    );
    Ok(prefs)
}

pub fn create_task_impl(state: &AppState, text: String) -> Result<Task, InfraError> {
    let task = Task::new(next_id("tsk"), text.trim());
    task.validate().map_err(InfraError::InvalidConfig)?;

    let mut tasks = state.repository.load_tasks()?;
    tasks.push(task.clone());
    state.repository.save_tasks(&tasks)?;

    state.log_info("create_task", &format!("created task_id={}", task.id));
    Ok(task)
}

pub fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    state.repository.load_tasks()
}

pub fn update_task_impl(state: &AppState, task_id: String, text: String) -> Result<Task, InfraError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(InfraError::InvalidConfig("text must not be empty".to_string()));
    }
    let updated = modify_task(state, &task_id, |task| task.text = text.to_string())?;
    state.log_info("update_task", &format!("updated task_id={task_id}"));
    Ok(updated)
}

pub fn toggle_task_impl(state: &AppState, task_id: String) -> Result<Task, InfraError> {
    let updated = modify_task(state, &task_id, |task| task.completed = !task.completed)?;
    state.log_info(
        "toggle_task",
        &format!("task_id={task_id} completed={}", updated.completed),
    );
    Ok(updated)
}

pub fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    let mut tasks = state.repository.load_tasks()?;
    let before = tasks.len();
    tasks.retain(|task| task.id != task_id);
    if tasks.len() == before {
        return Ok(false);
    }
    state.repository.save_tasks(&tasks)?;

    state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    Ok(true)
}

pub fn create_target_impl(state: &AppState, input: NewTarget) -> Result<Target, InfraError> {
    let target = state.tracker.create_target(input)?;
    state.log_info("create_target", &format!("created target_id={}", target.id));
    Ok(target)
}

/// Targets scheduled on `date` (`YYYY-MM-DD`), or today in the configured timezone.
pub fn list_targets_impl(state: &AppState, date: Option<String>) -> Result<Vec<Target>, InfraError> {
    let date = match date {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| InfraError::InvalidConfig(format!("invalid date: {raw}")))?,
        None => state.tracker.today(),
    };
    state.tracker.list_for_date(date)
}

pub fn delete_target_impl(state: &AppState, target_id: String) -> Result<bool, InfraError> {
    let target_id = required_id(&target_id, "target_id")?;
    let deleted = state.tracker.delete_target(target_id)?;
    if deleted {
        state.log_info("delete_target", &format!("deleted target_id={target_id}"));
    }
    Ok(deleted)
}

pub fn add_progress_impl(
    state: &AppState,
    target_id: String,
    amount: f64,
) -> Result<ProgressUpdate, InfraError> {
    let target_id = required_id(&target_id, "target_id")?;
    let update = state.tracker.add_progress(target_id, amount)?;
    log_progress(state, "add_progress", &update);
    Ok(update)
}

pub fn start_timer_impl(state: &AppState, target_id: String) -> Result<Target, InfraError> {
    let target_id = required_id(&target_id, "target_id")?;
    let target = state.tracker.start_timer(target_id)?;
    state.log_info("start_timer", &format!("target_id={target_id}"));
    Ok(target)
}

pub fn stop_timer_impl(state: &AppState, target_id: String) -> Result<ProgressUpdate, InfraError> {
    let target_id = required_id(&target_id, "target_id")?;
    let update = state.tracker.stop_timer(target_id)?;
    log_progress(state, "stop_timer", &update);
    Ok(update)
}

pub fn list_history_impl(state: &AppState) -> Result<Vec<HistoryLog>, InfraError> {
    state.tracker.history()
}

pub async fn run_ai_workflow_impl(state: &AppState) -> Result<WorkflowOutcome, WorkflowError> {
    let Some(_busy) = state.try_begin_workflow() else {
        return Err(WorkflowError::AlreadyRunning);
    };

    let fallback = FallbackOrchestrator::new(Arc::clone(&state.model_client), state.settings.clone())
        .with_generation_config(state.config.temperature, state.config.max_output_tokens);
    let workflow = AiWorkflow::new(
        state.settings.clone(),
        state.repository.clone(),
        fallback,
        state.config.timezone,
    );
    let outcome = workflow.run().await?;

    match &outcome {
        WorkflowOutcome::Completed(summary) => state.log_info(
            "run_ai_workflow",
            &format!(
                "cleaned={} created={} assigned_date={}",
                summary.cleaned_count, summary.created_count, summary.assigned_date
            ),
        ),
        WorkflowOutcome::PreferencesRequired => {
            state.log_info("run_ai_workflow", "user preferences required")
        }
    }
    Ok(outcome)
}

fn required_id<'a>(value: &'a str, field: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn modify_task(
    state: &AppState,
    task_id: &str,
    change: impl FnOnce(&mut Task),
) -> Result<Task, InfraError> {
    let task_id = required_id(task_id, "task_id")?;
    let mut tasks = state.repository.load_tasks()?;
    let Some(task) = tasks.iter_mut().find(|task| task.id == task_id) else {
        return Err(InfraError::InvalidConfig(format!("task not found: {task_id}")));
    };
    change(task);
    let updated = task.clone();
    state.repository.save_tasks(&tasks)?;
    Ok(updated)
}

fn log_progress(state: &AppState, command: &str, update: &ProgressUpdate) {
    let change = update
        .logged
        .as_ref()
        .map(|entry| entry.value_change)
        .unwrap_or(0.0);
    state.log_info(
        command,
        &format!(
            "target_id={} change={} current={} completed_tasks={}",
            update.target.id, change, update.target.current_value, update.completed_task_count
        ),
    );
}
