use crate::domain::units;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_suggested: Option<bool>,
}

impl Task {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            completed: false,
            linked_target_id: None,
            ai_suggested: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.text, "task.text")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TargetType {
    Quantity,
    Time,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quantity => "Quantity",
            Self::Time => "Time",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Frequency {
    Once,
    Daily,
    Custom,
}

/// A goal tracked by cumulative quantity or elapsed time.
///
/// For `TargetType::Time`, `target_value` is in minutes while `current_value`
/// is in seconds. Compare the two only through [`crate::domain::units`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub target_value: f64,
    pub current_value: f64,
    #[serde(default)]
    pub start_time: Option<i64>,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_days: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_task_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

impl Target {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "target.id")?;
        validate_non_empty(&self.title, "target.title")?;
        if !self.target_value.is_finite() || self.target_value <= 0.0 {
            return Err("target.target_value must be > 0".to_string());
        }
        if !self.current_value.is_finite() || self.current_value < 0.0 {
            return Err("target.current_value must be >= 0".to_string());
        }
        match self.frequency {
            Frequency::Once => {
                let Some(date) = self.assigned_date.as_deref() else {
                    return Err("target.assigned_date is required for Once targets".to_string());
                };
                validate_date(date, "target.assigned_date")?;
            }
            Frequency::Daily => {}
            Frequency::Custom => {
                let days = self.custom_days.as_deref().unwrap_or_default();
                if days.is_empty() {
                    return Err("target.custom_days must not be empty for Custom targets".to_string());
                }
                if days.iter().any(|day| *day > 6) {
                    return Err("target.custom_days[] must be within 0..=6".to_string());
                }
            }
        }
        Ok(())
    }

    pub fn is_scheduled_for(&self, date: NaiveDate) -> bool {
        match self.frequency {
            Frequency::Daily => true,
            Frequency::Once => self.assigned_date.as_deref() == Some(date.to_string().as_str()),
            Frequency::Custom => {
                let weekday = date.weekday().num_days_from_sunday() as u8;
                self.custom_days
                    .as_deref()
                    .map(|days| days.contains(&weekday))
                    .unwrap_or(false)
            }
        }
    }

    pub fn is_linked_to(&self, task_id: &str) -> bool {
        self.linked_task_ids
            .as_deref()
            .map(|ids| ids.iter().any(|id| id == task_id))
            .unwrap_or(false)
    }

    pub fn progress_percent(&self) -> f64 {
        units::progress_percent(self.target_type, self.target_value, self.current_value)
    }

    pub fn is_complete(&self) -> bool {
        units::is_goal_reached(self.target_type, self.target_value, self.current_value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLog {
    pub id: String,
    pub target_id: String,
    pub target_title: String,
    pub timestamp: i64,
    pub value_change: f64,
    pub date_str: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPrefs {
    pub work_start_time: String,
    pub break_duration: u32,
    pub total_work_time: f64,
    pub prefs_completed: bool,
}

impl Default for UserPrefs {
    fn default() -> Self {
        Self {
            work_start_time: "09:00".to_string(),
            break_duration: 15,
            total_work_time: 8.0,
            prefs_completed: false,
        }
    }
}

impl UserPrefs {
    pub fn validate(&self) -> Result<(), String> {
        validate_hhmm(&self.work_start_time, "prefs.work_start_time")?;
        if !self.total_work_time.is_finite()
            || self.total_work_time <= 0.0
            || self.total_work_time > 24.0
        {
            return Err("prefs.total_work_time must be within (0, 24]".to_string());
        }
        Ok(())
    }
}

/// Target descriptor as returned by the model; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiGeneratedTarget {
    pub title: String,
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub target_value: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reminder_time: Option<String>,
    #[serde(default)]
    pub linked_task_ids: Vec<String>,
    #[serde(default)]
    pub priority: Option<f64>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    let mut split = value.split(':');
    let Some(hour_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    let Some(minute_str) = split.next() else {
        return Err(format!("{field_name} must be HH:MM"));
    };
    if split.next().is_some() {
        return Err(format!("{field_name} must be HH:MM"));
    }

    let hour = hour_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    let minute = minute_str
        .parse::<u8>()
        .map_err(|_| format!("{field_name} must be HH:MM"))?;
    if hour > 23 || minute > 59 {
        return Err(format!("{field_name} must be HH:MM"));
    }
    Ok(())
}

fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn sample_target() -> Target {
        Target {
            id: "tgt-1".to_string(),
            title: "Read".to_string(),
            target_type: TargetType::Time,
            target_value: 30.0,
            current_value: 0.0,
            start_time: None,
            frequency: Frequency::Once,
            assigned_date: Some("2026-02-16".to_string()),
            custom_days: None,
            notes: None,
            reminder_time: None,
            notification_id: None,
            linked_task_ids: Some(vec!["t1".to_string()]),
            priority: Some(1.0),
        }
    }

    #[test]
    fn task_serializes_with_camel_case_and_skips_unset_links() {
        let task = Task::new("t1", "Call mom");
        let value = serde_json::to_value(&task).expect("serialize task");
        assert_eq!(
            value,
            serde_json::json!({ "id": "t1", "text": "Call mom", "completed": false })
        );

        let mut linked = task.clone();
        linked.linked_target_id = Some("tgt-9".to_string());
        linked.ai_suggested = Some(true);
        let value = serde_json::to_value(&linked).expect("serialize task");
        assert_eq!(value["linkedTargetId"], "tgt-9");
        assert_eq!(value["aiSuggested"], true);
    }

    #[test]
    fn target_uses_type_key_and_null_start_time() {
        let value = serde_json::to_value(sample_target()).expect("serialize target");
        assert_eq!(value["type"], "Time");
        assert_eq!(value["frequency"], "Once");
        assert!(value["startTime"].is_null());
        assert_eq!(value["linkedTaskIds"], serde_json::json!(["t1"]));
    }

    #[test]
    fn target_validate_requires_assigned_date_for_once() {
        let mut target = sample_target();
        assert!(target.validate().is_ok());
        target.assigned_date = None;
        assert!(target.validate().is_err());
    }

    #[test]
    fn target_validate_rejects_out_of_range_custom_day() {
        let mut target = sample_target();
        target.frequency = Frequency::Custom;
        target.custom_days = Some(vec![1, 7]);
        assert!(target.validate().is_err());
    }

    #[test]
    fn once_target_is_scheduled_only_on_its_date() {
        let target = sample_target();
        assert!(target.is_scheduled_for(date("2026-02-16")));
        assert!(!target.is_scheduled_for(date("2026-02-17")));
    }

    #[test]
    fn custom_target_uses_sunday_based_weekday_index() {
        let mut target = sample_target();
        target.frequency = Frequency::Custom;
        target.custom_days = Some(vec![0, 1]);
        // 2026-02-15 is a Sunday, 2026-02-17 a Tuesday.
        assert!(target.is_scheduled_for(date("2026-02-15")));
        assert!(target.is_scheduled_for(date("2026-02-16")));
        assert!(!target.is_scheduled_for(date("2026-02-17")));
    }

    #[test]
    fn daily_target_is_always_scheduled() {
        let mut target = sample_target();
        target.frequency = Frequency::Daily;
        target.assigned_date = None;
        assert!(target.is_scheduled_for(date("2030-01-01")));
    }

    #[test]
    fn user_prefs_default_is_not_completed() {
        let prefs = UserPrefs::default();
        assert!(!prefs.prefs_completed);
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn user_prefs_validate_rejects_bad_start_time() {
        let prefs = UserPrefs {
            work_start_time: "25:00".to_string(),
            ..UserPrefs::default()
        };
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn ai_generated_target_defaults_optional_fields() {
        let parsed: AiGeneratedTarget = serde_json::from_str(
            r#"{"title":"Call mom","type":"Quantity","targetValue":1,"reminderTime":null}"#,
        )
        .expect("parse generated target");
        assert_eq!(parsed.target_type, TargetType::Quantity);
        assert!(parsed.linked_task_ids.is_empty());
        assert_eq!(parsed.reminder_time, None);
        assert_eq!(parsed.priority, None);
    }
}
