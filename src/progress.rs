use crate::error::InvalidFieldError;
use crate::model::{DayProgress, UserState};
use crate::phase::{Phase, PhaseCalendar};
use std::str::FromStr;
use std::sync::Arc;

/// Where one day's progress lives: the phase picks the map, the payload is
/// the key (day index or ISO date).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DaySlot {
    Basic(String),
    Preparation(u32),
    Ramadan(u32),
}

impl DaySlot {
    pub fn phase(&self) -> Phase {
        match self {
            DaySlot::Basic(_) => Phase::Basic,
            DaySlot::Preparation(_) => Phase::Preparation,
            DaySlot::Ramadan(_) => Phase::Ramadan,
        }
    }

    pub fn key(&self) -> String {
        match self {
            DaySlot::Basic(date) => date.clone(),
            DaySlot::Preparation(n) | DaySlot::Ramadan(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressField {
    Fasting,
    Suhoor,
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
    Taraweeh,
    Tahajjud,
    QuranRead,
    MorningDhikr,
    EveningDhikr,
    Charity,
    Dua,
    CharityAmount,
    QuranPages,
}

impl ProgressField {
    pub const ALL: [ProgressField; 16] = [
        ProgressField::Fasting,
        ProgressField::Suhoor,
        ProgressField::Fajr,
        ProgressField::Dhuhr,
        ProgressField::Asr,
        ProgressField::Maghrib,
        ProgressField::Isha,
        ProgressField::Taraweeh,
        ProgressField::Tahajjud,
        ProgressField::QuranRead,
        ProgressField::MorningDhikr,
        ProgressField::EveningDhikr,
        ProgressField::Charity,
        ProgressField::Dua,
        ProgressField::CharityAmount,
        ProgressField::QuranPages,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProgressField::Fasting => "fasting",
            ProgressField::Suhoor => "suhoor",
            ProgressField::Fajr => "fajr",
            ProgressField::Dhuhr => "dhuhr",
            ProgressField::Asr => "asr",
            ProgressField::Maghrib => "maghrib",
            ProgressField::Isha => "isha",
            ProgressField::Taraweeh => "taraweeh",
            ProgressField::Tahajjud => "tahajjud",
            ProgressField::QuranRead => "quranRead",
            ProgressField::MorningDhikr => "morningDhikr",
            ProgressField::EveningDhikr => "eveningDhikr",
            ProgressField::Charity => "charity",
            ProgressField::Dua => "dua",
            ProgressField::CharityAmount => "charityAmount",
            ProgressField::QuranPages => "quranPages",
        }
    }

    /// Boolean checklist item, as opposed to a numeric counter.
    pub fn is_flag(&self) -> bool {
        !matches!(self, ProgressField::CharityAmount | ProgressField::QuranPages)
    }

    pub fn get(&self, day: &DayProgress) -> FieldValue {
        match self {
            ProgressField::Fasting => FieldValue::Flag(day.fasting),
            ProgressField::Suhoor => FieldValue::Flag(day.suhoor),
            ProgressField::Fajr => FieldValue::Flag(day.fajr),
            ProgressField::Dhuhr => FieldValue::Flag(day.dhuhr),
            ProgressField::Asr => FieldValue::Flag(day.asr),
            ProgressField::Maghrib => FieldValue::Flag(day.maghrib),
            ProgressField::Isha => FieldValue::Flag(day.isha),
            ProgressField::Taraweeh => FieldValue::Flag(day.taraweeh),
            ProgressField::Tahajjud => FieldValue::Flag(day.tahajjud),
            ProgressField::QuranRead => FieldValue::Flag(day.quran_read),
            ProgressField::MorningDhikr => FieldValue::Flag(day.morning_dhikr),
            ProgressField::EveningDhikr => FieldValue::Flag(day.evening_dhikr),
            ProgressField::Charity => FieldValue::Flag(day.charity),
            ProgressField::Dua => FieldValue::Flag(day.dua),
            ProgressField::CharityAmount => FieldValue::Count(day.charity_amount),
            ProgressField::QuranPages => FieldValue::Count(day.quran_pages as u64),
        }
    }

    pub fn set(&self, day: &mut DayProgress, value: FieldValue) -> Result<(), InvalidFieldError> {
        match (self, value) {
            (ProgressField::CharityAmount, FieldValue::Count(n)) => day.charity_amount = n,
            (ProgressField::QuranPages, FieldValue::Count(n)) => {
                day.quran_pages = u32::try_from(n).map_err(|_| InvalidFieldError::BadValue {
                    field: self.name().to_string(),
                    value: n.to_string(),
                })?
            }
            (_, FieldValue::Flag(b)) => match self.flag_mut(day) {
                Some(flag) => *flag = b,
                None => return Err(self.wrong_type()),
            },
            (_, FieldValue::Count(_)) => return Err(self.wrong_type()),
        }
        Ok(())
    }

    fn wrong_type(&self) -> InvalidFieldError {
        InvalidFieldError::WrongType {
            field: self.name(),
            expected: if self.is_flag() { "boolean" } else { "numeric" },
        }
    }

    fn flag_mut<'a>(&self, day: &'a mut DayProgress) -> Option<&'a mut bool> {
        let flag = match self {
            ProgressField::Fasting => &mut day.fasting,
            ProgressField::Suhoor => &mut day.suhoor,
            ProgressField::Fajr => &mut day.fajr,
            ProgressField::Dhuhr => &mut day.dhuhr,
            ProgressField::Asr => &mut day.asr,
            ProgressField::Maghrib => &mut day.maghrib,
            ProgressField::Isha => &mut day.isha,
            ProgressField::Taraweeh => &mut day.taraweeh,
            ProgressField::Tahajjud => &mut day.tahajjud,
            ProgressField::QuranRead => &mut day.quran_read,
            ProgressField::MorningDhikr => &mut day.morning_dhikr,
            ProgressField::EveningDhikr => &mut day.evening_dhikr,
            ProgressField::Charity => &mut day.charity,
            ProgressField::Dua => &mut day.dua,
            ProgressField::CharityAmount | ProgressField::QuranPages => return None,
        };
        Some(flag)
    }
}

impl FromStr for ProgressField {
    type Err = InvalidFieldError;

    /// Accepts the wire name (`quranRead`) or snake_case (`quran_read`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.trim().chars().filter(|c| *c != '_').collect::<String>().to_lowercase();
        ProgressField::ALL
            .iter()
            .find(|f| f.name().to_lowercase() == wanted)
            .copied()
            .ok_or_else(|| InvalidFieldError::Unknown(s.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Count(u64),
}

/// One `field = value` entry of a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldUpdate {
    pub field: ProgressField,
    pub value: FieldValue,
}

impl FieldUpdate {
    pub fn new(field: ProgressField, value: FieldValue) -> Self {
        Self { field, value }
    }

    pub fn flag(field: ProgressField, on: bool) -> Self {
        Self::new(field, FieldValue::Flag(on))
    }
}

/// Parses `fajr=true`, `quran_pages=12`. A bare boolean field name means `=true`.
pub fn parse_assignment(raw: &str) -> Result<FieldUpdate, InvalidFieldError> {
    let (name, value) = match raw.split_once('=') {
        Some((n, v)) => (n, Some(v.trim())),
        None => (raw, None),
    };
    let field: ProgressField = name.parse()?;

    let bad = || InvalidFieldError::BadValue {
        field: field.name().to_string(),
        value: value.unwrap_or("").to_string(),
    };

    let value = if field.is_flag() {
        match value.map(|v| v.to_lowercase()).as_deref() {
            None | Some("true") | Some("1") | Some("yes") | Some("on") => FieldValue::Flag(true),
            Some("false") | Some("0") | Some("no") | Some("off") => FieldValue::Flag(false),
            Some(_) => return Err(bad()),
        }
    } else {
        let v = value.ok_or_else(bad)?;
        FieldValue::Count(v.parse::<u64>().map_err(|_| bad())?)
    };

    Ok(FieldUpdate { field, value })
}

/// The stored record for `slot`, or an all-false record dated by the slot.
pub fn get_or_default(state: &UserState, calendar: &PhaseCalendar, slot: &DaySlot) -> DayProgress {
    let stored = match slot {
        DaySlot::Ramadan(n) => state.progress.get(n),
        DaySlot::Preparation(n) => state.preparation_progress.get(n),
        DaySlot::Basic(date) => state.basic_progress.get(date),
    };
    stored
        .cloned()
        .unwrap_or_else(|| DayProgress::empty(calendar.implied_date(slot)))
}

/// Returns a new state with the addressed day replaced. Only the map that
/// holds `slot` is copied; the other two stay shared with `state`.
pub fn apply_update(
    state: &UserState,
    calendar: &PhaseCalendar,
    slot: &DaySlot,
    updates: &[FieldUpdate],
) -> Result<UserState, InvalidFieldError> {
    let mut day = get_or_default(state, calendar, slot);
    for u in updates {
        u.field.set(&mut day, u.value)?;
    }

    let mut next = state.clone();
    match slot {
        DaySlot::Ramadan(n) => {
            Arc::make_mut(&mut next.progress).insert(*n, day);
        }
        DaySlot::Preparation(n) => {
            Arc::make_mut(&mut next.preparation_progress).insert(*n, day);
        }
        DaySlot::Basic(date) => {
            Arc::make_mut(&mut next.basic_progress).insert(date.clone(), day);
        }
    }
    Ok(next)
}
