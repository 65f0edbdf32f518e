//! Phase calendar: which part of the season a local date falls in, and the
//! day index within that part.
//!
//! This is the only place that turns a date into a phase/day pair; the
//! engine, the session timer and the CLI all go through [`PhaseCalendar`].

use crate::config::CalendarConfig;
use crate::date::{local_date_from_unix_ms, CivilDate};
use crate::progress::DaySlot;

pub const RAMADAN_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Basic,
    Preparation,
    Ramadan,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Basic => "basic",
            Phase::Preparation => "preparation",
            Phase::Ramadan => "ramadan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPosition {
    pub phase: Phase,
    /// 1-based within preparation/ramadan. For `basic` it is the signed
    /// offset from the preparation start and is never shown as a day number.
    pub day_index: i64,
    pub date: CivilDate,
}

impl DayPosition {
    /// Storage slot for progress recorded on this day.
    pub fn slot(&self) -> DaySlot {
        match self.phase {
            Phase::Basic => DaySlot::Basic(self.date.to_string()),
            Phase::Preparation => DaySlot::Preparation(self.day_index as u32),
            Phase::Ramadan => DaySlot::Ramadan(self.day_index as u32),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseCalendar {
    pub preparation_start: CivilDate,
    pub ramadan_start: CivilDate,
}

impl PhaseCalendar {
    pub fn new(preparation_start: CivilDate, ramadan_start: CivilDate) -> Self {
        Self {
            preparation_start,
            ramadan_start,
        }
    }

    pub fn from_config(config: &CalendarConfig) -> Self {
        Self::new(config.preparation_start, config.ramadan_start)
    }

    /// Boundary dates belong to the later phase.
    pub fn classify(&self, date: CivilDate) -> DayPosition {
        let from_prep = self.preparation_start.days_until(&date) as i64;
        if date < self.preparation_start {
            return DayPosition {
                phase: Phase::Basic,
                day_index: from_prep,
                date,
            };
        }
        if date < self.ramadan_start {
            return DayPosition {
                phase: Phase::Preparation,
                day_index: from_prep + 1,
                date,
            };
        }
        let from_ramadan = self.ramadan_start.days_until(&date) as i64;
        DayPosition {
            phase: Phase::Ramadan,
            day_index: (from_ramadan + 1).clamp(1, RAMADAN_DAYS),
            date,
        }
    }

    /// Classifies an instant by its UTC+5 calendar date, so the time of day
    /// never affects the result.
    pub fn classify_instant(&self, unix_ms: i64) -> DayPosition {
        self.classify(local_date_from_unix_ms(unix_ms))
    }

    pub fn preparation_days(&self) -> i64 {
        self.preparation_start.days_until(&self.ramadan_start) as i64
    }

    /// The calendar date a slot stands for.
    pub fn implied_date(&self, slot: &DaySlot) -> String {
        match slot {
            DaySlot::Ramadan(n) => self.ramadan_start.add_days(*n as i32 - 1).to_string(),
            DaySlot::Preparation(n) => self.preparation_start.add_days(*n as i32 - 1).to_string(),
            DaySlot::Basic(date) => date.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> CivilDate {
        CivilDate::parse_iso(s).unwrap()
    }

    fn cal() -> PhaseCalendar {
        PhaseCalendar::new(d("2027-01-29"), d("2027-02-08"))
    }

    #[test]
    fn dates_before_preparation_are_basic_with_signed_offset() {
        let pos = cal().classify(d("2027-01-20"));
        assert_eq!(pos.phase, Phase::Basic);
        assert_eq!(pos.day_index, -9);
        assert_eq!(pos.slot(), DaySlot::Basic("2027-01-20".to_string()));

        let day_before = cal().classify(d("2027-01-28"));
        assert_eq!(day_before.phase, Phase::Basic);
        assert_eq!(day_before.day_index, -1);
    }

    #[test]
    fn boundaries_belong_to_the_later_phase() {
        let prep = cal().classify(d("2027-01-29"));
        assert_eq!((prep.phase, prep.day_index), (Phase::Preparation, 1));

        let last_prep = cal().classify(d("2027-02-07"));
        assert_eq!((last_prep.phase, last_prep.day_index), (Phase::Preparation, 10));

        let first = cal().classify(d("2027-02-08"));
        assert_eq!((first.phase, first.day_index), (Phase::Ramadan, 1));
    }

    #[test]
    fn preparation_indices_stay_within_range() {
        let c = cal();
        let mut date = c.preparation_start;
        while date < c.ramadan_start {
            let pos = c.classify(date);
            assert_eq!(pos.phase, Phase::Preparation);
            assert!((1..=c.preparation_days()).contains(&pos.day_index));
            date = date.add_days(1);
        }
    }

    #[test]
    fn ramadan_index_is_clamped_to_thirty() {
        let c = cal();
        assert_eq!(c.classify(d("2027-03-09")).day_index, 30);
        assert_eq!(c.classify(d("2027-03-10")).day_index, 30);
        assert_eq!(c.classify(d("2027-06-01")).day_index, 30);
        assert_eq!(c.classify(d("2027-02-20")).day_index, 13);
    }

    #[test]
    fn time_of_day_does_not_change_the_day() {
        let c = cal();
        let midnight = d("2027-02-08").local_midnight_unix_ms();
        let late = midnight + 86_400_000 - 1;
        assert_eq!(c.classify_instant(midnight).day_index, 1);
        assert_eq!(c.classify_instant(late).day_index, 1);
        assert_eq!(c.classify_instant(midnight - 1).phase, Phase::Preparation);
    }

    #[test]
    fn implied_dates_follow_the_slot() {
        let c = cal();
        assert_eq!(c.implied_date(&DaySlot::Ramadan(1)), "2027-02-08");
        assert_eq!(c.implied_date(&DaySlot::Ramadan(3)), "2027-02-10");
        assert_eq!(c.implied_date(&DaySlot::Preparation(2)), "2027-01-30");
        assert_eq!(c.implied_date(&DaySlot::Basic("2026-12-01".into())), "2026-12-01");
    }
}
