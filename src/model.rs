use std::collections::BTreeMap;
use std::sync::Arc;

/// Ramadan and preparation days are keyed by their 1-based day index.
pub type DayIndexMap = BTreeMap<u32, DayProgress>;
/// Basic (pre-tracking) days are keyed by ISO date.
pub type DateMap = BTreeMap<String, DayProgress>;

/// One day's checklist.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DayProgress {
    pub date: String,
    pub fasting: bool,
    pub suhoor: bool,
    pub fajr: bool,
    pub dhuhr: bool,
    pub asr: bool,
    pub maghrib: bool,
    pub isha: bool,
    pub taraweeh: bool,
    pub tahajjud: bool,
    pub quran_read: bool,
    pub morning_dhikr: bool,
    pub evening_dhikr: bool,
    pub charity: bool,
    pub dua: bool,
    pub charity_amount: u64,
    pub quran_pages: u32,
}

impl DayProgress {
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTask {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

/// The aggregate user record. The progress maps sit behind `Arc` so that an
/// update touching one map leaves the other two pointer-equal.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserState {
    pub id: i64,
    pub name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub language: String,
    pub progress: Arc<DayIndexMap>,
    pub preparation_progress: Arc<DayIndexMap>,
    pub basic_progress: Arc<DateMap>,
    pub xp: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: String,
    pub unlocked_badges: Vec<String>,
    pub completed_juzs: Vec<u32>,
    pub memorized_names: Vec<u32>,
    pub quran_khatams: u32,
    pub custom_tasks: Vec<CustomTask>,
    pub referral_count: u32,
    pub promo_code: Option<String>,
}

impl UserState {
    /// Every stored day across the three maps.
    pub fn all_days(&self) -> impl Iterator<Item = &DayProgress> {
        self.progress
            .values()
            .chain(self.preparation_progress.values())
            .chain(self.basic_progress.values())
    }

    pub fn has_badge(&self, id: &str) -> bool {
        self.unlocked_badges.iter().any(|b| b == id)
    }
}

/// A `UserState` as read from a source that may omit fields (older local
/// blobs, partial server payloads).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub language: Option<String>,
    pub progress: Option<DayIndexMap>,
    pub preparation_progress: Option<DayIndexMap>,
    pub basic_progress: Option<DateMap>,
    pub xp: Option<u64>,
    pub current_streak: Option<u32>,
    pub longest_streak: Option<u32>,
    pub last_active_date: Option<String>,
    pub unlocked_badges: Option<Vec<String>>,
    pub completed_juzs: Option<Vec<u32>>,
    pub memorized_names: Option<Vec<u32>>,
    pub quran_khatams: Option<u32>,
    pub custom_tasks: Option<Vec<CustomTask>>,
    pub referral_count: Option<u32>,
    pub promo_code: Option<String>,
}

/// A push that could not reach the backend, kept for replay.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub owner_id: i64,
    pub payload: UserState,
    pub enqueued_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_wire_names() {
        let mut day = DayProgress::empty("2027-02-08");
        day.quran_read = true;
        day.charity_amount = 500;
        let v = serde_json::to_value(&day).unwrap();
        assert_eq!(v["quranRead"], true);
        assert_eq!(v["charityAmount"], 500);
        assert_eq!(v["date"], "2027-02-08");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let state: UserState = serde_json::from_str(
            r#"{"xp": 120, "progress": {"3": {"fajr": true}}, "lastActiveDate": "2027-02-10"}"#,
        )
        .unwrap();
        assert_eq!(state.xp, 120);
        assert!(state.progress[&3].fajr);
        assert!(!state.progress[&3].isha);
        assert!(state.preparation_progress.is_empty());
        assert_eq!(state.current_streak, 0);

        let snap: UserSnapshot = serde_json::from_str(r#"{"xp": 5}"#).unwrap();
        assert_eq!(snap.xp, Some(5));
        assert_eq!(snap.current_streak, None);
    }
}
