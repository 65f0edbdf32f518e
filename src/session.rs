//! A running tracker session: the single owner of the user's state.
//!
//! Every mutation runs to completion through the engine, is written to the
//! local store, and schedules backend pushes on the session timers. The
//! caller drives time by passing `now_ms` into each call.

use crate::backend::{AccessStatus, SyncBackend};
use crate::config::TrackerConfig;
use crate::date::local_date_from_unix_ms;
use crate::engine::{record_activity, record_progress, UpdateOutcome};
use crate::error::{ActivityError, StorageError, TrackerError};
use crate::merge::{merge_user_state, SessionIdentity};
use crate::model::{UserSnapshot, UserState};
use crate::phase::{DayPosition, PhaseCalendar};
use crate::progress::{DaySlot, FieldUpdate};
use crate::reconciler::{PushOutcome, Reconciler, ReplayReport, SyncStatus};
use crate::storage::LocalStore;
use crate::timers::{TimerKind, Timers};

pub struct Session<B, S> {
    state: UserState,
    identity: SessionIdentity,
    config: TrackerConfig,
    calendar: PhaseCalendar,
    position: DayPosition,
    reconciler: Reconciler<B, S>,
    timers: Timers,
}

fn load_local_or_warn<B: SyncBackend, S: LocalStore>(
    reconciler: &Reconciler<B, S>,
) -> Result<Option<UserSnapshot>, StorageError> {
    match reconciler.load_local() {
        Ok(snapshot) => Ok(snapshot),
        Err(StorageError::Corrupted(msg)) => {
            log::warn!("ignoring unreadable local state: {}", msg);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl<B: SyncBackend, S: LocalStore> Session<B, S> {
    /// Hydrates from local storage without waiting for the network.
    pub fn start(
        identity: SessionIdentity,
        config: TrackerConfig,
        reconciler: Reconciler<B, S>,
        now_ms: i64,
    ) -> Result<Self, StorageError> {
        let local = load_local_or_warn(&reconciler)?;
        let state = merge_user_state(None, local.as_ref(), None, &identity);
        let calendar = PhaseCalendar::from_config(&config.calendar);
        let position = calendar.classify_instant(now_ms);

        let mut timers = Timers::new();
        timers.schedule_every(TimerKind::Autosave, config.sync.autosave_interval_ms, now_ms);
        timers.schedule_every(TimerKind::DayRecompute, config.sync.day_recompute_interval_ms, now_ms);

        log::debug!(
            "session for user {} starts on {} ({} day {})",
            identity.user_id,
            position.date,
            position.phase.as_str(),
            position.day_index
        );

        Ok(Self {
            state,
            identity,
            config,
            calendar,
            position,
            reconciler,
            timers,
        })
    }

    pub fn state(&self) -> &UserState {
        &self.state
    }

    pub fn position(&self) -> &DayPosition {
        &self.position
    }

    pub fn calendar(&self) -> &PhaseCalendar {
        &self.calendar
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn status(&self) -> SyncStatus {
        self.reconciler.status()
    }

    pub fn reconciler(&self) -> &Reconciler<B, S> {
        &self.reconciler
    }

    #[cfg(test)]
    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Pulls the server copy and merges it over local and in-memory state.
    /// Returns false when the server could not be reached.
    pub fn refresh_from_server(&mut self) -> Result<bool, StorageError> {
        let server = match self.reconciler.fetch_server(self.identity.user_id) {
            Some(s) => s,
            None => return Ok(false),
        };
        let local = load_local_or_warn(&self.reconciler)?;
        self.state = merge_user_state(Some(&self.state), local.as_ref(), Some(&server), &self.identity);
        self.reconciler.persist_local(&self.state)?;
        Ok(true)
    }

    /// Brings the session online. The offline queue is replayed before the
    /// server copy is pulled, and the pull is skipped while this user's own
    /// changes are newer than the server's (still queued, or just replayed).
    pub fn connect(&mut self, now_ms: i64) -> Result<Option<ReplayReport>, StorageError> {
        let report = self.set_online(true, now_ms)?;
        if !self.reconciler.has_backend() {
            return Ok(report);
        }
        let own = self.identity.user_id;
        let replayed_own = report.as_ref().is_some_and(|r| r.replayed_owners.contains(&own));
        if replayed_own || self.reconciler.queue().has_owner(own) {
            log::debug!("skipping server refresh: user {} has newer local changes", own);
            return Ok(report);
        }
        self.refresh_from_server()?;
        Ok(report)
    }

    /// Re-derives the current phase and day from the clock. Returns whether
    /// the day changed.
    pub fn recompute_day(&mut self, now_ms: i64) -> bool {
        let position = self.calendar.classify_instant(now_ms);
        if position == self.position {
            return false;
        }
        log::info!(
            "day changed: {} {} -> {} {}",
            self.position.phase.as_str(),
            self.position.day_index,
            position.phase.as_str(),
            position.day_index
        );
        self.position = position;
        true
    }

    pub fn record_progress(
        &mut self,
        slot: &DaySlot,
        updates: &[FieldUpdate],
        now_ms: i64,
    ) -> Result<UpdateOutcome, TrackerError> {
        let today = local_date_from_unix_ms(now_ms);
        let outcome = record_progress(&self.state, &self.calendar, &self.config, slot, updates, today)?;
        self.commit(&outcome, now_ms)?;
        Ok(outcome)
    }

    /// Updates the slot for the current day.
    pub fn mark_today(&mut self, updates: &[FieldUpdate], now_ms: i64) -> Result<UpdateOutcome, TrackerError> {
        self.recompute_day(now_ms);
        let slot = self.position.slot();
        self.record_progress(&slot, updates, now_ms)
    }

    pub fn activity<F>(&mut self, now_ms: i64, mutate: F) -> Result<UpdateOutcome, TrackerError>
    where
        F: FnOnce(&UserState) -> Result<UserState, ActivityError>,
    {
        let today = local_date_from_unix_ms(now_ms);
        let outcome = record_activity(&self.state, &self.config, today, mutate)?;
        self.commit(&outcome, now_ms)?;
        Ok(outcome)
    }

    fn commit(&mut self, outcome: &UpdateOutcome, now_ms: i64) -> Result<(), StorageError> {
        self.state = outcome.state.clone();
        self.on_state_change(outcome.xp_changed(), now_ms)
    }

    /// Persists immediately, then debounces a push. XP changes also get a
    /// near-immediate push.
    pub fn on_state_change(&mut self, xp_changed: bool, now_ms: i64) -> Result<(), StorageError> {
        self.reconciler.persist_local(&self.state)?;
        let sync = &self.config.sync;
        self.timers
            .schedule_once(TimerKind::DebouncedPush, now_ms + sync.debounce_ms);
        if xp_changed {
            self.timers
                .schedule_once(TimerKind::ImmediatePush, now_ms + sync.immediate_push_ms);
        }
        Ok(())
    }

    fn push(&mut self, now_ms: i64) -> Result<PushOutcome, StorageError> {
        let outcome = self.reconciler.push(&self.state, now_ms)?;
        if let PushOutcome::Synced(Some(data)) = &outcome {
            self.state = data.clone();
        }
        Ok(outcome)
    }

    /// Fires every due timer. Several push timers due together push once.
    pub fn tick(&mut self, now_ms: i64) -> Result<Vec<TimerKind>, StorageError> {
        let fired = self.timers.take_due(now_ms);
        let mut pushed = false;
        for kind in &fired {
            if !kind.pushes() {
                self.recompute_day(now_ms);
            } else if !pushed {
                self.push(now_ms)?;
                pushed = true;
            }
        }
        Ok(fired)
    }

    /// Runs any pending push right away instead of waiting for its timer.
    pub fn flush(&mut self, now_ms: i64) -> Result<Option<PushOutcome>, StorageError> {
        let pending = self.timers.is_scheduled(TimerKind::DebouncedPush)
            || self.timers.is_scheduled(TimerKind::ImmediatePush);
        if !pending {
            return Ok(None);
        }
        self.timers.cancel(TimerKind::DebouncedPush);
        self.timers.cancel(TimerKind::ImmediatePush);
        self.push(now_ms).map(Some)
    }

    /// Replays the offline queue, then pushes the current state.
    pub fn sync_now(&mut self, now_ms: i64) -> Result<(ReplayReport, PushOutcome), StorageError> {
        let report = self.reconciler.replay_queue(now_ms)?;
        self.adopt_replayed(&report);
        self.timers.cancel(TimerKind::DebouncedPush);
        self.timers.cancel(TimerKind::ImmediatePush);
        let outcome = self.push(now_ms)?;
        Ok((report, outcome))
    }

    pub fn set_online(&mut self, online: bool, now_ms: i64) -> Result<Option<ReplayReport>, StorageError> {
        let report = self.reconciler.set_online(online, now_ms)?;
        if let Some(r) = &report {
            if self.adopt_replayed(r) {
                self.reconciler.persist_local(&self.state)?;
            }
        }
        Ok(report)
    }

    fn adopt_replayed(&mut self, report: &ReplayReport) -> bool {
        match report.server_states.get(&self.identity.user_id) {
            Some(data) => {
                self.state = data.clone();
                true
            }
            None => false,
        }
    }

    pub fn check_access(&mut self) -> Option<AccessStatus> {
        self.reconciler.check_access(self.identity.user_id)
    }

    pub fn teardown(&mut self) {
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::complete_juz;
    use crate::backend::mock::MockBackend;
    use crate::backend::SyncResponse;
    use crate::date::CivilDate;
    use crate::error::SyncError;
    use crate::phase::Phase;
    use crate::progress::ProgressField;
    use crate::storage::memory::MemoryStore;
    use crate::storage::save_state;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            user_id: 42,
            name: "Amina".into(),
            username: None,
            photo_url: None,
            language: "en".into(),
        }
    }

    fn at(date: &str) -> i64 {
        CivilDate::parse_iso(date).unwrap().local_midnight_unix_ms() + 8 * 3_600_000
    }

    fn session_with(store: MemoryStore, online: bool, now: i64) -> Session<MockBackend, MemoryStore> {
        let config = TrackerConfig::default();
        let reconciler = Reconciler::new(Some(MockBackend::default()), store, &config.sync, online).unwrap();
        Session::start(identity(), config, reconciler, now).unwrap()
    }

    fn pushes(s: &Session<MockBackend, MemoryStore>) -> usize {
        s.reconciler().backend().unwrap().pushed.borrow().len()
    }

    #[test]
    fn start_hydrates_from_local_storage() {
        let mut store = MemoryStore::default();
        let stored = UserState {
            id: 1,
            name: "Someone else".into(),
            xp: 120,
            current_streak: 3,
            longest_streak: 3,
            ..UserState::default()
        };
        save_state(&mut store, &stored).unwrap();

        let s = session_with(store, true, at("2027-02-10"));
        assert_eq!(s.state().xp, 120);
        assert_eq!(s.state().id, 42);
        assert_eq!(s.state().name, "Amina");
        assert_eq!(s.position().phase, Phase::Ramadan);
        assert_eq!(s.position().day_index, 3);
        assert!(s.timers().is_scheduled(TimerKind::Autosave));
        assert!(s.timers().is_scheduled(TimerKind::DayRecompute));
    }

    #[test]
    fn corrupted_local_state_starts_fresh() {
        let mut store = MemoryStore::default();
        store
            .entries
            .insert(crate::storage::STATE_KEY.to_string(), "{oops".to_string());
        let s = session_with(store, true, at("2027-02-10"));
        assert_eq!(s.state().xp, 0);
    }

    #[test]
    fn xp_update_schedules_immediate_and_debounced_push() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), true, now);
        let out = s
            .mark_today(&[FieldUpdate::flag(ProgressField::Fasting, true)], now)
            .unwrap();
        assert_eq!(out.state.xp, 50);
        assert_eq!(s.timers().due_at(TimerKind::ImmediatePush), Some(now + 100));
        assert_eq!(s.timers().due_at(TimerKind::DebouncedPush), Some(now + 5_000));
        assert_eq!(pushes(&s), 0);

        s.tick(now + 100).unwrap();
        assert_eq!(pushes(&s), 1);
        s.tick(now + 5_000).unwrap();
        assert_eq!(pushes(&s), 2);
        assert_eq!(s.status(), SyncStatus::Success);
    }

    #[test]
    fn rapid_changes_debounce_into_one_push() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), true, now);
        for i in 0..3 {
            s.activity(now + i * 1_000, |st| complete_juz(st, (i + 1) as u32)).unwrap();
        }
        assert!(!s.timers().is_scheduled(TimerKind::ImmediatePush));
        s.tick(now + 6_999).unwrap();
        assert_eq!(pushes(&s), 0);
        s.tick(now + 7_000).unwrap();
        assert_eq!(pushes(&s), 1);
        assert_eq!(s.state().completed_juzs, vec![1, 2, 3]);
    }

    #[test]
    fn local_write_precedes_push() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), false, now);
        s.mark_today(&[FieldUpdate::flag(ProgressField::Fajr, true)], now)
            .unwrap();
        assert!(s.reconciler().store().writes >= 1);
        assert_eq!(s.reconciler().load_local().unwrap().unwrap().xp, Some(10));
    }

    #[test]
    fn offline_then_online_replays() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), false, now);
        s.mark_today(&[FieldUpdate::flag(ProgressField::Fasting, true)], now)
            .unwrap();
        s.flush(now).unwrap();
        assert_eq!(s.status(), SyncStatus::Offline);
        assert_eq!(s.reconciler().queue().len(), 1);

        let report = s.set_online(true, now + 1_000).unwrap().unwrap();
        assert_eq!(report.replayed, 1);
        assert!(s.reconciler().queue().is_empty());
        assert_eq!(pushes(&s), 1);
    }

    fn stale_server_copy() -> Option<Result<UserSnapshot, SyncError>> {
        Some(Ok(UserSnapshot {
            progress: Some(Default::default()),
            xp: Some(0),
            ..UserSnapshot::default()
        }))
    }

    fn queued_fasting_store(now: i64) -> MemoryStore {
        let mut offline = session_with(MemoryStore::default(), false, now);
        offline
            .mark_today(&[FieldUpdate::flag(ProgressField::Fasting, true)], now)
            .unwrap();
        offline.flush(now).unwrap();
        assert_eq!(offline.reconciler().queue().len(), 1);
        MemoryStore {
            entries: offline.reconciler().store().entries.clone(),
            ..MemoryStore::default()
        }
    }

    #[test]
    fn offline_changes_survive_the_next_online_start() {
        let now = at("2027-02-08");
        let mut s = session_with(queued_fasting_store(now), false, now + 60_000);
        *s.reconciler().backend().unwrap().full.borrow_mut() = stale_server_copy();

        let report = s.connect(now + 60_000).unwrap().unwrap();
        assert_eq!(report.replayed_owners, vec![42]);
        assert!(s.reconciler().queue().is_empty());
        assert_eq!(pushes(&s), 1);
        assert_eq!(s.state().xp, 50);
        assert_eq!(s.state().progress.get(&1).map(|d| d.fasting), Some(true));
        assert_eq!(s.reconciler().load_local().unwrap().unwrap().xp, Some(50));
    }

    #[test]
    fn failed_replay_keeps_local_state_over_server_copy() {
        let now = at("2027-02-08");
        let mut s = session_with(queued_fasting_store(now), false, now + 60_000);
        *s.reconciler().backend().unwrap().full.borrow_mut() = stale_server_copy();
        s.reconciler()
            .backend()
            .unwrap()
            .script(Err(SyncError::Network("refused".into())));

        let report = s.connect(now + 60_000).unwrap().unwrap();
        assert_eq!(report.remaining, 1);
        assert_eq!(s.status(), SyncStatus::Error);
        assert_eq!(s.state().xp, 50);
        assert_eq!(s.state().progress.get(&1).map(|d| d.fasting), Some(true));
    }

    #[test]
    fn connect_with_empty_queue_pulls_the_server_copy() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), false, now);
        *s.reconciler().backend().unwrap().full.borrow_mut() = Some(Ok(UserSnapshot {
            xp: Some(300),
            ..UserSnapshot::default()
        }));
        let report = s.connect(now).unwrap().unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(pushes(&s), 0);
        assert_eq!(s.state().xp, 300);
        assert_eq!(s.status(), SyncStatus::Success);
    }

    #[test]
    fn newer_push_is_not_overwritten_by_queued_snapshot() {
        let now = at("2027-02-08");
        let mut s = session_with(queued_fasting_store(now), true, now + 60_000);
        s.mark_today(&[FieldUpdate::flag(ProgressField::Fajr, true)], now + 60_000)
            .unwrap();
        s.flush(now + 60_000).unwrap();
        assert!(s.reconciler().queue().is_empty());

        let (report, _) = s.sync_now(now + 120_000).unwrap();
        assert_eq!(report.replayed, 0);
        let day = s.state().progress.get(&1).cloned().unwrap_or_default();
        assert!(day.fasting);
        assert!(day.fajr);
    }

    #[test]
    fn unmarking_at_zero_xp_pushes_immediately() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), true, now);
        s.mark_today(&[FieldUpdate::flag(ProgressField::Fasting, true)], now)
            .unwrap();
        s.flush(now).unwrap();
        s.state.xp = 0;

        let out = s
            .mark_today(&[FieldUpdate::flag(ProgressField::Fasting, false)], now + 1_000)
            .unwrap();
        assert_eq!(out.xp_delta, 0);
        assert_eq!(s.timers().due_at(TimerKind::ImmediatePush), Some(now + 1_100));
    }

    #[test]
    fn server_reply_replaces_state() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), true, now);
        let server = UserState {
            id: 42,
            xp: 75,
            ..UserState::default()
        };
        s.reconciler().backend().unwrap().script(Ok(SyncResponse {
            data: Some(server),
            ..MockBackend::ok_echo()
        }));
        s.mark_today(&[FieldUpdate::flag(ProgressField::Fasting, true)], now)
            .unwrap();
        s.flush(now).unwrap();
        assert_eq!(s.state().xp, 75);
        assert_eq!(s.flush(now).unwrap(), None);
    }

    #[test]
    fn network_failure_surfaces_as_status_only() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), true, now);
        s.reconciler()
            .backend()
            .unwrap()
            .script(Err(SyncError::Network("reset".into())));
        s.mark_today(&[FieldUpdate::flag(ProgressField::Dua, true)], now)
            .unwrap();
        let outcome = s.flush(now).unwrap();
        assert_eq!(outcome, Some(PushOutcome::Queued));
        assert_eq!(s.status(), SyncStatus::Error);
        assert_eq!(s.state().xp, 5);
    }

    #[test]
    fn refresh_merges_server_over_local() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), true, now);
        s.activity(now, |st| complete_juz(st, 4)).unwrap();
        *s.reconciler().backend().unwrap().full.borrow_mut() = Some(Ok(UserSnapshot {
            xp: Some(300),
            unlocked_badges: Some(vec!["steadfast".into()]),
            ..UserSnapshot::default()
        }));
        assert!(s.refresh_from_server().unwrap());
        assert_eq!(s.state().xp, 300);
        assert_eq!(s.state().completed_juzs, vec![4]);
        assert!(s.state().has_badge("steadfast"));
        assert!(s.state().has_badge("first_juz"));
    }

    #[test]
    fn day_recompute_follows_the_clock() {
        let mut s = session_with(MemoryStore::default(), true, at("2027-02-07"));
        assert_eq!(s.position().phase, Phase::Preparation);
        let fired = s.tick(at("2027-02-08")).unwrap();
        assert!(fired.contains(&TimerKind::DayRecompute));
        assert_eq!(s.position().phase, Phase::Ramadan);
        assert_eq!(s.position().day_index, 1);
    }

    #[test]
    fn teardown_clears_timers() {
        let now = at("2027-02-08");
        let mut s = session_with(MemoryStore::default(), true, now);
        s.mark_today(&[FieldUpdate::flag(ProgressField::Fasting, true)], now)
            .unwrap();
        s.teardown();
        assert!(s.timers().is_empty());
        assert!(s.tick(now + 60_000).unwrap().is_empty());
        assert_eq!(pushes(&s), 0);
    }
}
