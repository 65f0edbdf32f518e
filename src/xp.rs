use crate::model::DayProgress;
use crate::progress::{FieldUpdate, FieldValue, ProgressField};
use std::collections::BTreeMap;

/// XP change caused by applying `updates` on top of `before`.
///
/// Only boolean fields with a configured weight count: +weight on
/// false→true, -weight on true→false. Updates are applied in order, so a
/// field repeated within one update is compared against its running value.
pub fn xp_delta(
    before: &DayProgress,
    updates: &[FieldUpdate],
    weights: &BTreeMap<ProgressField, u32>,
) -> i64 {
    let mut day = before.clone();
    let mut delta = 0i64;

    for u in updates {
        let old = u.field.get(&day);
        if u.field.set(&mut day, u.value).is_err() {
            continue;
        }
        let weight = match weights.get(&u.field) {
            Some(w) => *w as i64,
            None => continue,
        };
        match (old, u.value) {
            (FieldValue::Flag(false), FieldValue::Flag(true)) => delta += weight,
            (FieldValue::Flag(true), FieldValue::Flag(false)) => delta -= weight,
            _ => {}
        }
    }

    delta
}

/// Cumulative XP never drops below zero.
pub fn apply_xp(previous: u64, delta: i64) -> u64 {
    if delta >= 0 {
        previous.saturating_add(delta as u64)
    } else {
        previous.saturating_sub(delta.unsigned_abs())
    }
}
