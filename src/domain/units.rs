//! Progress unit handling for targets.
//!
//! Time targets declare their goal in minutes but accumulate progress in
//! seconds. Every comparison between the two goes through this module.

use crate::domain::models::TargetType;

pub const SECONDS_PER_MINUTE: f64 = 60.0;

pub fn minutes_to_seconds(minutes: f64) -> f64 {
    minutes * SECONDS_PER_MINUTE
}

pub fn seconds_to_minutes(seconds: f64) -> f64 {
    seconds / SECONDS_PER_MINUTE
}

/// Goal expressed in the unit `current_value` is stored in.
pub fn goal_in_progress_units(target_type: TargetType, target_value: f64) -> f64 {
    match target_type {
        TargetType::Quantity => target_value,
        TargetType::Time => minutes_to_seconds(target_value),
    }
}

/// Percentage in `0.0..=100.0`. A non-positive goal reads as 0%.
pub fn progress_percent(target_type: TargetType, target_value: f64, current_value: f64) -> f64 {
    let goal = goal_in_progress_units(target_type, target_value);
    if goal <= 0.0 || !goal.is_finite() {
        return 0.0;
    }
    (current_value / goal * 100.0).clamp(0.0, 100.0)
}

pub fn is_goal_reached(target_type: TargetType, target_value: f64, current_value: f64) -> bool {
    let goal = goal_in_progress_units(target_type, target_value);
    goal > 0.0 && current_value >= goal
}

/// Renders progress as `current / goal`, e.g. `12:30 / 30m` or `2 / 5`.
pub fn format_progress(target_type: TargetType, target_value: f64, current_value: f64) -> String {
    match target_type {
        TargetType::Quantity => format!("{} / {}", current_value.floor(), target_value),
        TargetType::Time => format!(
            "{} / {}m",
            format_clock(current_value.max(0.0) as u64),
            target_value
        ),
    }
}

fn format_clock(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
