//! Achievement badges. The table order is the unlock/report order; the
//! thresholds come from [`BadgeThresholds`].

use crate::config::BadgeThresholds;
use crate::model::UserState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeMetric {
    FastingDays,
    CompletedJuzs,
    CharityTotal,
    TaraweehNights,
    MemorizedNames,
    Xp,
    QuranKhatams,
    CompletedTasks,
    Referrals,
    LongestStreak,
}

impl BadgeMetric {
    pub fn value(&self, state: &UserState) -> u64 {
        match self {
            BadgeMetric::FastingDays => state.all_days().filter(|d| d.fasting).count() as u64,
            BadgeMetric::CompletedJuzs => state.completed_juzs.len() as u64,
            BadgeMetric::CharityTotal => state
                .all_days()
                .fold(0u64, |sum, d| sum.saturating_add(d.charity_amount)),
            BadgeMetric::TaraweehNights => state.all_days().filter(|d| d.taraweeh).count() as u64,
            BadgeMetric::MemorizedNames => state.memorized_names.len() as u64,
            BadgeMetric::Xp => state.xp,
            BadgeMetric::QuranKhatams => state.quran_khatams as u64,
            BadgeMetric::CompletedTasks => state.custom_tasks.iter().filter(|t| t.completed).count() as u64,
            BadgeMetric::Referrals => state.referral_count as u64,
            BadgeMetric::LongestStreak => state.longest_streak as u64,
        }
    }

    pub fn threshold(&self, th: &BadgeThresholds) -> u64 {
        match self {
            BadgeMetric::FastingDays => th.fasting_days,
            BadgeMetric::CompletedJuzs => th.completed_juzs,
            BadgeMetric::CharityTotal => th.charity_total,
            BadgeMetric::TaraweehNights => th.taraweeh_nights,
            BadgeMetric::MemorizedNames => th.memorized_names,
            BadgeMetric::Xp => th.xp,
            BadgeMetric::QuranKhatams => th.quran_khatams,
            BadgeMetric::CompletedTasks => th.completed_tasks,
            BadgeMetric::Referrals => th.referrals,
            BadgeMetric::LongestStreak => th.streak_days,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub id: &'static str,
    pub title: &'static str,
    pub metric: BadgeMetric,
}

pub const BADGES: [Badge; 10] = [
    Badge { id: "first_fast", title: "First fast", metric: BadgeMetric::FastingDays },
    Badge { id: "first_juz", title: "First juz", metric: BadgeMetric::CompletedJuzs },
    Badge { id: "generous_giver", title: "Generous giver", metric: BadgeMetric::CharityTotal },
    Badge { id: "night_prayer", title: "Night prayer", metric: BadgeMetric::TaraweehNights },
    Badge { id: "names_scholar", title: "Names scholar", metric: BadgeMetric::MemorizedNames },
    Badge { id: "xp_master", title: "XP master", metric: BadgeMetric::Xp },
    Badge { id: "quran_khatam", title: "Quran khatam", metric: BadgeMetric::QuranKhatams },
    Badge { id: "task_keeper", title: "Task keeper", metric: BadgeMetric::CompletedTasks },
    Badge { id: "ambassador", title: "Ambassador", metric: BadgeMetric::Referrals },
    Badge { id: "steadfast", title: "Steadfast", metric: BadgeMetric::LongestStreak },
];

impl Badge {
    /// A zero threshold would unlock for everyone; treat it as "at least one".
    pub fn is_earned(&self, state: &UserState, th: &BadgeThresholds) -> bool {
        self.metric.value(state) >= self.metric.threshold(th).max(1)
    }
}

pub fn find_badge(id: &str) -> Option<&'static Badge> {
    BADGES.iter().find(|b| b.id == id)
}

/// Ids of badges that are earned but not yet in `unlockedBadges`, in table
/// order. `None` when nothing new was earned.
pub fn newly_unlocked(state: &UserState, th: &BadgeThresholds) -> Option<Vec<String>> {
    let fresh: Vec<String> = BADGES
        .iter()
        .filter(|b| !state.has_badge(b.id))
        .filter(|b| b.is_earned(state, th))
        .map(|b| b.id.to_string())
        .collect();
    if fresh.is_empty() {
        None
    } else {
        Some(fresh)
    }
}

/// Appends every newly earned badge to the state and reports which ones.
pub fn unlock_badges(mut state: UserState, th: &BadgeThresholds) -> (UserState, Option<Vec<String>>) {
    let fresh = newly_unlocked(&state, th);
    if let Some(ids) = fresh.as_ref() {
        state.unlocked_badges.extend(ids.iter().cloned());
    }
    (state, fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomTask, DayProgress};
    use std::sync::Arc;

    fn with_ramadan_days(days: Vec<DayProgress>) -> UserState {
        UserState {
            progress: Arc::new(
                days.into_iter()
                    .enumerate()
                    .map(|(i, d)| (i as u32 + 1, d))
                    .collect(),
            ),
            ..UserState::default()
        }
    }

    #[test]
    fn nothing_earned_returns_none() {
        let (state, fresh) = unlock_badges(UserState::default(), &BadgeThresholds::default());
        assert_eq!(fresh, None);
        assert!(state.unlocked_badges.is_empty());
    }

    #[test]
    fn first_fast_unlocks_once() {
        let mut day = DayProgress::default();
        day.fasting = true;
        let th = BadgeThresholds::default();

        let (state, fresh) = unlock_badges(with_ramadan_days(vec![day]), &th);
        assert_eq!(fresh, Some(vec!["first_fast".to_string()]));

        let (again, fresh) = unlock_badges(state, &th);
        assert_eq!(fresh, None);
        assert_eq!(again.unlocked_badges, vec!["first_fast".to_string()]);
    }

    #[test]
    fn several_badges_unlock_together_in_table_order() {
        let th = BadgeThresholds::default();
        let state = UserState {
            xp: 4_000,
            referral_count: 10,
            quran_khatams: 1,
            completed_juzs: vec![1],
            ..UserState::default()
        };
        let (state, fresh) = unlock_badges(state, &th);
        assert_eq!(
            fresh,
            Some(vec![
                "first_juz".to_string(),
                "xp_master".to_string(),
                "quran_khatam".to_string(),
                "ambassador".to_string(),
            ])
        );
        assert_eq!(state.unlocked_badges.len(), 4);
    }

    #[test]
    fn aggregates_span_all_days() {
        let th = BadgeThresholds::default();
        let days: Vec<DayProgress> = (0..5)
            .map(|i| DayProgress {
                taraweeh: i < 4,
                charity_amount: 2_000,
                ..DayProgress::default()
            })
            .collect();
        let mut state = with_ramadan_days(days);
        assert_eq!(BadgeMetric::TaraweehNights.value(&state), 4);
        assert_eq!(newly_unlocked(&state, &th), Some(vec!["generous_giver".to_string()]));

        let mut prep_day = DayProgress::default();
        prep_day.taraweeh = true;
        Arc::make_mut(&mut state.preparation_progress).insert(1, prep_day);
        assert_eq!(
            newly_unlocked(&state, &th),
            Some(vec!["generous_giver".to_string(), "night_prayer".to_string()])
        );
    }

    #[test]
    fn completed_tasks_only() {
        let th = BadgeThresholds::default();
        let tasks = (0..6)
            .map(|i| CustomTask {
                id: format!("t{:04}", i + 1),
                title: "x".into(),
                completed: i != 0,
            })
            .collect();
        let state = UserState {
            custom_tasks: tasks,
            ..UserState::default()
        };
        assert_eq!(newly_unlocked(&state, &th), Some(vec!["task_keeper".to_string()]));
    }

    #[test]
    fn thresholds_are_configurable() {
        let th = BadgeThresholds {
            memorized_names: 2,
            ..BadgeThresholds::default()
        };
        let state = UserState {
            memorized_names: vec![1, 2],
            ..UserState::default()
        };
        assert_eq!(newly_unlocked(&state, &th), Some(vec!["names_scholar".to_string()]));
        assert_eq!(newly_unlocked(&state, &BadgeThresholds::default()), None);
    }
}
