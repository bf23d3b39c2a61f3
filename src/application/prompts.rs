use crate::domain::models::{Task, UserPrefs};
use chrono::NaiveDate;

fn numbered_tasks(tasks: &[Task]) -> String {
    tasks
        .iter()
        .enumerate()
        .map(|(index, task)| format!("{}. [ID: {}] {}", index + 1, task.id, task.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn cleanup_prompt(tasks: &[Task]) -> String {
    format!(
        r#"You are a strict task manager. Analyze this task list and identify tasks that are:
1. Gibberish or random letters (e.g., "xff", "asdf", "test")
2. Default tutorial tasks (e.g., "Welcome to your tasks", "Drag to reorder")
3. Vague or empty (e.g., "thing", ".")

TASKS:
{tasks}

Return ONLY a JSON array of the IDs of these unnecessary tasks. If all tasks look real and valid, return an empty array [].
Example Response: ["123", "456"]"#,
        tasks = numbered_tasks(tasks)
    )
}

pub fn generation_prompt(tasks: &[Task], prefs: &UserPrefs, tomorrow: NaiveDate) -> String {
    format!(
        r#"You are a productivity AI assistant for a task management app called "Target".
Your job is to analyze tasks and convert them into focused targets for the next day.

USER'S WORK PREFERENCES:
- Work starts at: {work_start}
- Usual break duration: {break_minutes} minutes
- Total work time: {work_hours} hours

TASKS TO ANALYZE:
{tasks}

RULES:
1. STRICTLY classify targets types:
   - "Quantity": for distinct actions (e.g., "Send email", "Call mom", "Submit report"). Value should be 1.
   - "Time": for continuous activities (e.g., "Study", "Read book", "Write code", "Workout"). Value should be duration in minutes (max 60).
2. If a task is too big, split it into multiple targets
3. If tasks are related, you can merge them into one target
4. Prioritize tasks by importance (1 = highest priority)
5. Skip tasks that seem unnecessary or can be marked complete without action
6. ONLY add "notes" if absolutely necessary (e.g., specific instructions, links, or critical reminders). Do not add casual or obvious notes.
7. Set reminder times based on user's work schedule

OUTPUT FORMAT (JSON array only, no markdown):
[
  {{
    "title": "Target title",
    "type": "Time" or "Quantity",
    "targetValue": number (minutes if Time, generally 1 if Quantity),
    "notes": "Optional notes if critical",
    "reminderTime": "HH:MM format or null",
    "linkedTaskIds": ["task_id_1", "task_id_2"],
    "priority": 1
  }}
]

Generate targets for tomorrow ({tomorrow}). Return ONLY the JSON array, no explanation."#,
        work_start = prefs.work_start_time,
        break_minutes = prefs.break_duration,
        work_hours = prefs.total_work_time,
        tasks = numbered_tasks(tasks),
        tomorrow = tomorrow.format("%Y-%m-%d"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks() -> Vec<Task> {
        vec![Task::new("101", "Submit report"), Task::new("102", "asdf")]
    }

    #[test]
    fn cleanup_prompt_numbers_tasks_with_ids() {
        let prompt = cleanup_prompt(&tasks());
        assert!(prompt.contains("1. [ID: 101] Submit report\n2. [ID: 102] asdf"));
        assert!(prompt.contains("JSON array of the IDs"));
    }

    #[test]
    fn generation_prompt_embeds_prefs_and_tomorrow() {
        let prefs = UserPrefs {
            work_start_time: "08:30".to_string(),
            break_duration: 10,
            total_work_time: 6.0,
            prefs_completed: true,
        };
        let tomorrow = NaiveDate::from_ymd_opt(2026, 2, 17).expect("valid date");
        let prompt = generation_prompt(&tasks(), &prefs, tomorrow);

        assert!(prompt.contains("Work starts at: 08:30"));
        assert!(prompt.contains("Usual break duration: 10 minutes"));
        assert!(prompt.contains("Total work time: 6 hours"));
        assert!(prompt.contains("[ID: 102] asdf"));
        assert!(prompt.contains("Generate targets for tomorrow (2026-02-17)"));
        assert!(prompt.contains("\"linkedTaskIds\""));
    }
}
