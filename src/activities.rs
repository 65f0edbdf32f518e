use crate::error::ActivityError;
use crate::model::{CustomTask, UserState};

pub const JUZ_COUNT: u32 = 30;
pub const NAMES_COUNT: u32 = 99;

fn insert_sorted(list: &mut Vec<u32>, n: u32) -> bool {
    match list.binary_search(&n) {
        Ok(_) => false,
        Err(pos) => {
            list.insert(pos, n);
            true
        }
    }
}

/// Marks a juz as read through. Completing the same juz twice changes nothing.
pub fn complete_juz(state: &UserState, juz: u32) -> Result<UserState, ActivityError> {
    if !(1..=JUZ_COUNT).contains(&juz) {
        return Err(ActivityError::JuzOutOfRange(juz));
    }
    let mut next = state.clone();
    next.completed_juzs.sort_unstable();
    insert_sorted(&mut next.completed_juzs, juz);
    Ok(next)
}

/// Records one of the 99 Names as memorized, by its 1-based position.
pub fn memorize_name(state: &UserState, number: u32) -> Result<UserState, ActivityError> {
    if !(1..=NAMES_COUNT).contains(&number) {
        return Err(ActivityError::NameOutOfRange(number));
    }
    let mut next = state.clone();
    next.memorized_names.sort_unstable();
    insert_sorted(&mut next.memorized_names, number);
    Ok(next)
}

pub fn record_khatam(state: &UserState) -> UserState {
    let mut next = state.clone();
    next.quran_khatams = next.quran_khatams.saturating_add(1);
    next
}

fn next_task_id(state: &UserState) -> String {
    let n = state
        .custom_tasks
        .iter()
        .filter_map(|t| t.id.strip_prefix('t').and_then(|s| s.parse::<u32>().ok()))
        .max()
        .unwrap_or(0);
    format!("t{:04}", n + 1)
}

pub fn add_custom_task(state: &UserState, title: &str) -> Result<(UserState, CustomTask), ActivityError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ActivityError::EmptyTaskTitle);
    }
    let task = CustomTask {
        id: next_task_id(state),
        title: title.to_string(),
        completed: false,
    };
    let mut next = state.clone();
    next.custom_tasks.push(task.clone());
    Ok((next, task))
}

pub fn complete_custom_task(state: &UserState, id: &str) -> Result<UserState, ActivityError> {
    let mut next = state.clone();
    let task = next
        .custom_tasks
        .iter_mut()
        .find(|t| t.id == id.trim())
        .ok_or_else(|| ActivityError::TaskNotFound(id.trim().to_string()))?;
    task.completed = true;
    Ok(next)
}
