use crate::date::CivilDate;
use crate::error::CliError;
use crate::progress::ProgressField;
use std::collections::BTreeMap;
use std::fs;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    pub calendar: CalendarConfig,
    pub xp_weights: BTreeMap<ProgressField, u32>,
    pub badges: BadgeThresholds,
    pub sync: SyncConfig,
    /// Language forced onto every session regardless of what is stored.
    pub language: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            calendar: CalendarConfig::default(),
            xp_weights: default_xp_weights(),
            badges: BadgeThresholds::default(),
            sync: SyncConfig::default(),
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalendarConfig {
    pub preparation_start: CivilDate,
    pub ramadan_start: CivilDate,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            preparation_start: CivilDate::ymd(2027, 1, 29),
            ramadan_start: CivilDate::ymd(2027, 2, 8),
        }
    }
}

/// Thresholds for the badge table. Kept as data so they can be tuned
/// without touching the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BadgeThresholds {
    pub fasting_days: u64,
    pub completed_juzs: u64,
    pub charity_total: u64,
    pub taraweeh_nights: u64,
    pub memorized_names: u64,
    pub xp: u64,
    pub quran_khatams: u64,
    pub completed_tasks: u64,
    pub referrals: u64,
    pub streak_days: u64,
}

impl Default for BadgeThresholds {
    fn default() -> Self {
        Self {
            fasting_days: 1,
            completed_juzs: 1,
            charity_total: 10_000,
            taraweeh_nights: 5,
            memorized_names: 10,
            xp: 4_000,
            quran_khatams: 1,
            completed_tasks: 5,
            referrals: 10,
            streak_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    pub backend_url: Option<String>,
    pub debounce_ms: i64,
    pub immediate_push_ms: i64,
    pub autosave_interval_ms: i64,
    pub day_recompute_interval_ms: i64,
    pub queue_max_items: usize,
    pub queue_retention_days: i64,
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            debounce_ms: 5_000,
            immediate_push_ms: 100,
            autosave_interval_ms: 30_000,
            day_recompute_interval_ms: 60_000,
            queue_max_items: 50,
            queue_retention_days: 7,
            timeout_secs: 10,
        }
    }
}

pub fn default_xp_weights() -> BTreeMap<ProgressField, u32> {
    use ProgressField::*;
    BTreeMap::from([
        (Fasting, 50),
        (Taraweeh, 30),
        (Tahajjud, 20),
        (QuranRead, 20),
        (Charity, 15),
        (Fajr, 10),
        (Dhuhr, 10),
        (Asr, 10),
        (Maghrib, 10),
        (Isha, 10),
        (MorningDhikr, 10),
        (EveningDhikr, 10),
        (Dua, 5),
    ])
}

fn validate_config(config: &TrackerConfig) -> Result<(), CliError> {
    if config.calendar.ramadan_start < config.calendar.preparation_start {
        return Err(CliError::usage(
            "Invalid config: ramadanStart is before preparationStart",
        ));
    }
    for field in config.xp_weights.keys() {
        if !field.is_flag() {
            return Err(CliError::usage(format!(
                "Invalid config: xpWeights.{} is not a boolean field",
                field.name()
            )));
        }
    }
    if config.sync.debounce_ms < 0 || config.sync.immediate_push_ms < 0 {
        return Err(CliError::usage("Invalid config: negative push delay"));
    }
    if config.sync.autosave_interval_ms <= 0 || config.sync.day_recompute_interval_ms <= 0 {
        return Err(CliError::usage("Invalid config: timer intervals must be positive"));
    }
    Ok(())
}

pub fn resolve_config_path(cli_path: Option<&str>) -> Option<String> {
    if let Some(p) = cli_path.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        return Some(p.to_string());
    }
    std::env::var("RAMADAN_CONFIG")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

/// Reads the config file if one was given; a missing path means defaults.
pub fn load_config(path: Option<&str>) -> Result<TrackerConfig, CliError> {
    let config = match path {
        None => TrackerConfig::default(),
        Some(p) => {
            let txt = fs::read_to_string(p)
                .map_err(|_| CliError::io(format!("Config IO error: {}", p)))?;
            serde_json::from_str(&txt)
                .map_err(|e| CliError::usage(format!("Invalid config: {}", e)))?
        }
    };
    validate_config(&config)?;
    Ok(config)
}
