//! The update pipeline every state mutation goes through:
//! store update, XP, streak, badges.

use crate::badges::unlock_badges;
use crate::config::TrackerConfig;
use crate::date::CivilDate;
use crate::error::{ActivityError, InvalidFieldError};
use crate::model::UserState;
use crate::phase::PhaseCalendar;
use crate::progress::{apply_update, get_or_default, DaySlot, FieldUpdate};
use crate::streak::apply_streak_update;
use crate::xp::{apply_xp, xp_delta};

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub state: UserState,
    /// Net XP actually applied (after the zero floor).
    pub xp_delta: i64,
    /// XP the update earned or took back before the zero floor.
    pub earned_xp: i64,
    pub newly_unlocked: Option<Vec<String>>,
}

impl UpdateOutcome {
    /// Whether the update touched a weighted field, even if the floor
    /// left the total unchanged.
    pub fn xp_changed(&self) -> bool {
        self.earned_xp != 0
    }
}

fn finish(
    previous_xp: u64,
    earned_xp: i64,
    state: UserState,
    today: CivilDate,
    config: &TrackerConfig,
) -> UpdateOutcome {
    let state = apply_streak_update(&state, today);
    let (state, newly_unlocked) = unlock_badges(state, &config.badges);
    UpdateOutcome {
        xp_delta: state.xp as i64 - previous_xp as i64,
        earned_xp,
        state,
        newly_unlocked,
    }
}

/// Applies a checklist update for `slot`. Only Ramadan and preparation days
/// award XP; basic days still count as activity for the streak.
pub fn record_progress(
    state: &UserState,
    calendar: &PhaseCalendar,
    config: &TrackerConfig,
    slot: &DaySlot,
    updates: &[FieldUpdate],
    today: CivilDate,
) -> Result<UpdateOutcome, InvalidFieldError> {
    let before = get_or_default(state, calendar, slot);
    let mut next = apply_update(state, calendar, slot, updates)?;

    let mut earned = 0;
    if !matches!(slot, DaySlot::Basic(_)) {
        earned = xp_delta(&before, updates, &config.xp_weights);
        next.xp = apply_xp(state.xp, earned);
    }

    Ok(finish(state.xp, earned, next, today, config))
}

/// Runs a non-checklist mutation (juz, names, tasks) through streak and badges.
pub fn record_activity<F>(
    state: &UserState,
    config: &TrackerConfig,
    today: CivilDate,
    mutate: F,
) -> Result<UpdateOutcome, ActivityError>
where
    F: FnOnce(&UserState) -> Result<UserState, ActivityError>,
{
    let next = mutate(state)?;
    let earned = next.xp as i64 - state.xp as i64;
    Ok(finish(state.xp, earned, next, today, config))
}
