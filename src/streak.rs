use crate::date::CivilDate;
use crate::model::UserState;

/// Advances the day streak for activity on `today` (a UTC+5 local date).
///
/// Re-entry on the same day is a no-op. A one-day gap extends the streak,
/// anything longer restarts it at 1. A `lastActiveDate` in the future, or one
/// that does not parse, leaves the counters alone or restarts respectively.
pub fn apply_streak_update(state: &UserState, today: CivilDate) -> UserState {
    let today_str = today.to_string();
    if state.last_active_date == today_str {
        return state.clone();
    }

    let mut next = state.clone();
    let last = CivilDate::parse_iso(&state.last_active_date);

    match last {
        None => next.current_streak = 1,
        Some(last) => {
            let gap = last.days_until(&today);
            if gap == 1 {
                next.current_streak = state.current_streak.saturating_add(1);
            } else if gap > 1 {
                next.current_streak = 1;
            } else {
                // clock went backwards; keep counters and the later date
                return next;
            }
        }
    }

    next.longest_streak = next.longest_streak.max(next.current_streak);
    next.last_active_date = today_str;
    next
}
