use clap::{Parser, Subcommand, ValueEnum};
use daytarget::application::commands::{
    add_progress_impl, clear_api_key_impl, create_target_impl, create_task_impl,
    delete_target_impl, delete_task_impl, get_settings_impl, list_history_impl,
    list_targets_impl, list_tasks_impl, run_ai_workflow_impl, save_user_prefs_impl,
    set_api_key_impl, set_preferred_model_impl, start_timer_impl, stop_timer_impl,
    test_connection_impl, toggle_task_impl, update_task_impl,
};
use daytarget::application::targets::{NewTarget, ProgressUpdate};
use daytarget::{AppState, Frequency, Target, TargetType, Task, WorkflowOutcome};
use serde::Serialize;
use std::path::PathBuf;

/// Task list that turns into tomorrow's targets with the help of Gemini.
#[derive(Parser)]
#[command(name = "daytarget", version, about = "AI-assisted daily targets")]
pub struct Cli {
    /// Workspace directory holding config/, state/ and logs/.
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TargetKind {
    Quantity,
    Time,
}

impl From<TargetKind> for TargetType {
    fn from(value: TargetKind) -> Self {
        match value {
            TargetKind::Quantity => TargetType::Quantity,
            TargetKind::Time => TargetType::Time,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Repeat {
    Once,
    Daily,
    Custom,
}

impl From<Repeat> for Frequency {
    fn from(value: Repeat) -> Self {
        match value {
            Repeat::Once => Frequency::Once,
            Repeat::Daily => Frequency::Daily,
            Repeat::Custom => Frequency::Custom,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store the Gemini API key (workspace database or OS keyring, per config).
    SetApiKey { api_key: String },
    /// Remove the stored API key.
    ClearApiKey,
    /// Send a one-token request to the preferred model.
    TestConnection {
        /// Key to test instead of the stored one.
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Set the model tried first.
    SetModel { model_id: String },
    /// Show key status, model, and work preferences.
    Settings,
    /// Save work preferences (marks them as completed).
    Prefs {
        /// Work start time, HH:MM.
        #[arg(long)]
        start: Option<String>,
        /// Break length in minutes.
        #[arg(long = "break")]
        break_minutes: Option<u32>,
        /// Total work hours per day.
        #[arg(long)]
        hours: Option<f64>,
    },
    /// Add a task.
    AddTask { text: String },
    /// List tasks.
    Tasks,
    /// Change a task's text.
    EditTask { id: String, text: String },
    /// Flip a task between open and completed.
    ToggleTask { id: String },
    /// Delete a task.
    DeleteTask { id: String },
    /// Add a target.
    AddTarget {
        title: String,
        #[arg(long, value_enum, default_value_t = TargetKind::Quantity)]
        kind: TargetKind,
        /// Count for Quantity targets, minutes for Time targets.
        #[arg(long, default_value_t = 1.0)]
        value: f64,
        #[arg(long, value_enum, default_value_t = Repeat::Once)]
        repeat: Repeat,
        /// Date for one-off targets, YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<String>,
        /// Weekday indexes for custom targets (0 = Sunday). May be repeated.
        #[arg(long = "day")]
        days: Vec<u8>,
        #[arg(long)]
        notes: Option<String>,
        /// Reminder, YYYY-MM-DDTHH:MM:SS.
        #[arg(long)]
        reminder: Option<String>,
        #[arg(long)]
        priority: Option<u32>,
    },
    /// List targets scheduled on a date (default: today).
    Targets {
        #[arg(long)]
        date: Option<String>,
    },
    /// Delete a target. Its history is kept.
    DeleteTarget { id: String },
    /// Record progress on a target.
    Progress { id: String, amount: f64 },
    /// Start the focus timer of a Time target.
    StartTimer { id: String },
    /// Stop the focus timer and record the elapsed seconds.
    StopTimer { id: String },
    /// Show the activity log.
    History,
    /// Clean up tasks and generate tomorrow's targets.
    Plan,
}

pub async fn execute(state: &AppState, command: Commands, json: bool) -> Result<String, String> {
    match command {
        Commands::SetApiKey { api_key } => {
            set_api_key_impl(state, api_key)
                .map_err(|error| state.command_error("set_api_key", &error))?;
            Ok("API key saved".to_string())
        }
        Commands::ClearApiKey => {
            clear_api_key_impl(state)
                .map_err(|error| state.command_error("clear_api_key", &error))?;
            Ok("API key removed".to_string())
        }
        Commands::TestConnection { api_key } => {
            let response = test_connection_impl(state, api_key)
                .await
                .map_err(|error| state.command_error("test_connection", &error))?;
            render(json, &response, |response| {
                if response.ok {
                    format!("{} is reachable", response.model)
                } else {
                    format!("{} rejected the request", response.model)
                }
            })
        }
        Commands::SetModel { model_id } => {
            let model = set_preferred_model_impl(state, model_id)
                .map_err(|error| state.command_error("set_preferred_model", &error))?;
            Ok(format!("preferred model: {model}"))
        }
        Commands::Settings => {
            let settings = get_settings_impl(state)
                .map_err(|error| state.command_error("get_settings", &error))?;
            render(json, &settings, |settings| {
                format!(
                    "api key: {}\nmodel: {}\nwork start: {}\nbreak: {}m\nwork hours: {}\nprefs saved: {}\ntimezone: {}",
                    if settings.has_api_key { "set" } else { "missing" },
                    settings.preferred_model,
                    settings.user_prefs.work_start_time,
                    settings.user_prefs.break_duration,
                    settings.user_prefs.total_work_time,
                    settings.user_prefs.prefs_completed,
                    settings.timezone
                )
            })
        }
        Commands::Prefs {
            start,
            break_minutes,
            hours,
        } => {
            let prefs = save_user_prefs_impl(state, start, break_minutes, hours)
                .map_err(|error| state.command_error("save_user_prefs", &error))?;
            render(json, &prefs, |prefs| {
                format!(
                    "work starts {} for {}h, {}m breaks",
                    prefs.work_start_time, prefs.total_work_time, prefs.break_duration
                )
            })
        }
        Commands::AddTask { text } => {
            let task = create_task_impl(state, text)
                .map_err(|error| state.command_error("create_task", &error))?;
            render(json, &task, task_line)
        }
        Commands::Tasks => {
            let tasks =
                list_tasks_impl(state).map_err(|error| state.command_error("list_tasks", &error))?;
            render(json, &tasks, |tasks| lines(tasks.iter().map(task_line)))
        }
        Commands::EditTask { id, text } => {
            let task = update_task_impl(state, id, text)
                .map_err(|error| state.command_error("update_task", &error))?;
            render(json, &task, task_line)
        }
        Commands::ToggleTask { id } => {
            let task = toggle_task_impl(state, id)
                .map_err(|error| state.command_error("toggle_task", &error))?;
            render(json, &task, task_line)
        }
        Commands::DeleteTask { id } => {
            let deleted = delete_task_impl(state, id)
                .map_err(|error| state.command_error("delete_task", &error))?;
            render(json, &deleted, |deleted| deleted_line(*deleted))
        }
        Commands::AddTarget {
            title,
            kind,
            value,
            repeat,
            date,
            days,
            notes,
            reminder,
            priority,
        } => {
            let target = create_target_impl(
                state,
                NewTarget {
                    title,
                    target_type: kind.into(),
                    target_value: value,
                    frequency: repeat.into(),
                    assigned_date: date,
                    custom_days: (!days.is_empty()).then_some(days),
                    notes,
                    reminder_time: reminder,
                    priority,
                },
            )
            .map_err(|error| state.command_error("create_target", &error))?;
            render(json, &target, target_line)
        }
        Commands::Targets { date } => {
            let targets = list_targets_impl(state, date)
                .map_err(|error| state.command_error("list_targets", &error))?;
            render(json, &targets, |targets| lines(targets.iter().map(target_line)))
        }
        Commands::DeleteTarget { id } => {
            let deleted = delete_target_impl(state, id)
                .map_err(|error| state.command_error("delete_target", &error))?;
            render(json, &deleted, |deleted| deleted_line(*deleted))
        }
        Commands::Progress { id, amount } => {
            let update = add_progress_impl(state, id, amount)
                .map_err(|error| state.command_error("add_progress", &error))?;
            render(json, &update, progress_line)
        }
        Commands::StartTimer { id } => {
            let target = start_timer_impl(state, id)
                .map_err(|error| state.command_error("start_timer", &error))?;
            render(json, &target, target_line)
        }
        Commands::StopTimer { id } => {
            let update = stop_timer_impl(state, id)
                .map_err(|error| state.command_error("stop_timer", &error))?;
            render(json, &update, progress_line)
        }
        Commands::History => {
            let history = list_history_impl(state)
                .map_err(|error| state.command_error("list_history", &error))?;
            render(json, &history, |history| {
                lines(history.iter().map(|entry| {
                    format!(
                        "{}  {}  +{}",
                        entry.date_str, entry.target_title, entry.value_change
                    )
                }))
            })
        }
        Commands::Plan => {
            let outcome = run_ai_workflow_impl(state)
                .await
                .map_err(|error| state.command_error("run_ai_workflow", &error))?;
            match outcome {
                WorkflowOutcome::PreferencesRequired => Err(state.command_error(
                    "run_ai_workflow",
                    &"work preferences required; run `daytarget prefs` first",
                )),
                WorkflowOutcome::Completed(summary) => render(json, &summary, |summary| {
                    if summary.is_noop() {
                        "nothing to clean up and no targets generated".to_string()
                    } else {
                        format!(
                            "cleaned {} task(s), created {} target(s) for {}",
                            summary.cleaned_count, summary.created_count, summary.assigned_date
                        )
                    }
                }),
            }
        }
    }
}

fn render<T: Serialize>(
    json: bool,
    value: &T,
    human: impl FnOnce(&T) -> String,
) -> Result<String, String> {
    if json {
        serde_json::to_string_pretty(value).map_err(|error| error.to_string())
    } else {
        Ok(human(value))
    }
}

fn lines(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join("\n")
}

fn task_line(task: &Task) -> String {
    format!(
        "[{}] {}  {}{}",
        if task.completed { "x" } else { " " },
        task.id,
        task.text,
        task.linked_target_id
            .as_deref()
            .map(|id| format!("  -> {id}"))
            .unwrap_or_default()
    )
}

fn target_line(target: &Target) -> String {
    format!(
        "{}  {}  {} ({:.0}%){}",
        target.id,
        target.title,
        daytarget::domain::units::format_progress(
            target.target_type,
            target.target_value,
            target.current_value
        ),
        target.progress_percent(),
        if target.start_time.is_some() { "  [timer running]" } else { "" }
    )
}

fn progress_line(update: &ProgressUpdate) -> String {
    let mut line = target_line(&update.target);
    if update.logged.is_none() {
        line.push_str("  (no change)");
    }
    if update.completed_task_count > 0 {
        line.push_str(&format!(
            "  completed {} linked task(s)",
            update.completed_task_count
        ));
    }
    line
}

fn deleted_line(deleted: bool) -> String {
    let label = if deleted { "deleted" } else { "not found" };
    label.to_string()
}
