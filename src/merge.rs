//! Three-way merge of user state sources.
//!
//! Per field, the first source that has a value wins:
//! server > local storage > previous in-memory state > default.
//! Exceptions:
//! - identity fields always come from the live session;
//! - `unlockedBadges` is the union of all sources, server order first;
//! - `longestStreak` is raised to at least `currentStreak`.

use crate::model::{UserSnapshot, UserState};
use std::sync::Arc;

/// Who the running session belongs to, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: i64,
    pub name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub language: String,
}

fn pick<T: Clone>(server: Option<&T>, local: Option<&T>, base: &T) -> T {
    server.or(local).unwrap_or(base).clone()
}

fn pick_map<M: Clone>(server: Option<&M>, local: Option<&M>, base: &Arc<M>) -> Arc<M> {
    match server.or(local) {
        Some(m) => Arc::new(m.clone()),
        None => Arc::clone(base),
    }
}

fn union_badges(sources: [Option<&Vec<String>>; 3]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ids in sources.into_iter().flatten() {
        for id in ids {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
    }
    out
}

pub fn merge_user_state(
    previous: Option<&UserState>,
    local: Option<&UserSnapshot>,
    server: Option<&UserSnapshot>,
    identity: &SessionIdentity,
) -> UserState {
    let default = UserState::default();
    let base = previous.unwrap_or(&default);
    let s = server.cloned().unwrap_or_default();
    let l = local.cloned().unwrap_or_default();

    let current_streak = pick(s.current_streak.as_ref(), l.current_streak.as_ref(), &base.current_streak);
    let longest_streak = pick(s.longest_streak.as_ref(), l.longest_streak.as_ref(), &base.longest_streak);

    UserState {
        id: identity.user_id,
        name: identity.name.clone(),
        username: identity.username.clone(),
        photo_url: identity.photo_url.clone(),
        language: identity.language.clone(),

        progress: pick_map(s.progress.as_ref(), l.progress.as_ref(), &base.progress),
        preparation_progress: pick_map(
            s.preparation_progress.as_ref(),
            l.preparation_progress.as_ref(),
            &base.preparation_progress,
        ),
        basic_progress: pick_map(s.basic_progress.as_ref(), l.basic_progress.as_ref(), &base.basic_progress),

        xp: pick(s.xp.as_ref(), l.xp.as_ref(), &base.xp),
        current_streak,
        longest_streak: longest_streak.max(current_streak),
        last_active_date: pick(s.last_active_date.as_ref(), l.last_active_date.as_ref(), &base.last_active_date),
        unlocked_badges: union_badges([
            s.unlocked_badges.as_ref(),
            l.unlocked_badges.as_ref(),
            Some(&base.unlocked_badges),
        ]),

        completed_juzs: pick(s.completed_juzs.as_ref(), l.completed_juzs.as_ref(), &base.completed_juzs),
        memorized_names: pick(s.memorized_names.as_ref(), l.memorized_names.as_ref(), &base.memorized_names),
        quran_khatams: pick(s.quran_khatams.as_ref(), l.quran_khatams.as_ref(), &base.quran_khatams),
        custom_tasks: pick(s.custom_tasks.as_ref(), l.custom_tasks.as_ref(), &base.custom_tasks),
        referral_count: pick(s.referral_count.as_ref(), l.referral_count.as_ref(), &base.referral_count),
        promo_code: s.promo_code.or(l.promo_code).or_else(|| base.promo_code.clone()),
    }
}
