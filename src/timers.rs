/// Timers a session runs. The caller owns the clock: nothing fires until
/// [`Timers::take_due`] is called with the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    DebouncedPush,
    ImmediatePush,
    Autosave,
    DayRecompute,
}

impl TimerKind {
    /// Whether firing this timer pushes the state to the backend.
    pub fn pushes(&self) -> bool {
        !matches!(self, TimerKind::DayRecompute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Timer {
    kind: TimerKind,
    due_at_ms: i64,
    every_ms: Option<i64>,
}

#[derive(Debug, Default, Clone)]
pub struct Timers {
    timers: Vec<Timer>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a one-shot timer, replacing any pending one of the same
    /// kind (so repeated calls debounce).
    pub fn schedule_once(&mut self, kind: TimerKind, due_at_ms: i64) {
        self.cancel(kind);
        self.timers.push(Timer {
            kind,
            due_at_ms,
            every_ms: None,
        });
    }

    pub fn schedule_every(&mut self, kind: TimerKind, every_ms: i64, now_ms: i64) {
        self.cancel(kind);
        let every_ms = every_ms.max(1);
        self.timers.push(Timer {
            kind,
            due_at_ms: now_ms + every_ms,
            every_ms: Some(every_ms),
        });
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.timers.retain(|t| t.kind != kind);
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.timers.iter().any(|t| t.kind == kind)
    }

    #[cfg(test)]
    pub fn due_at(&self, kind: TimerKind) -> Option<i64> {
        self.timers.iter().find(|t| t.kind == kind).map(|t| t.due_at_ms)
    }

    /// Timers due at `now_ms`, earliest first. One-shot timers are removed;
    /// periodic ones move to their next slot after `now_ms`. A periodic timer
    /// that missed several periods fires once.
    pub fn take_due(&mut self, now_ms: i64) -> Vec<TimerKind> {
        let mut due: Vec<(i64, TimerKind)> = self
            .timers
            .iter()
            .filter(|t| t.due_at_ms <= now_ms)
            .map(|t| (t.due_at_ms, t.kind))
            .collect();
        due.sort_by_key(|(at, _)| *at);

        self.timers.retain(|t| t.due_at_ms > now_ms || t.every_ms.is_some());
        for t in self.timers.iter_mut() {
            if let Some(every) = t.every_ms {
                if t.due_at_ms <= now_ms {
                    let missed = (now_ms - t.due_at_ms) / every + 1;
                    t.due_at_ms += missed * every;
                }
            }
        }

        due.into_iter().map(|(_, k)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_debounces() {
        let mut t = Timers::new();
        t.schedule_once(TimerKind::DebouncedPush, 5_000);
        t.schedule_once(TimerKind::DebouncedPush, 7_000);
        assert!(t.take_due(5_000).is_empty());
        assert_eq!(t.take_due(7_000), vec![TimerKind::DebouncedPush]);
        assert!(t.take_due(100_000).is_empty());
    }

    #[test]
    fn periodic_timers_repeat() {
        let mut t = Timers::new();
        t.schedule_every(TimerKind::Autosave, 30_000, 0);
        assert!(t.take_due(29_999).is_empty());
        assert_eq!(t.take_due(30_000), vec![TimerKind::Autosave]);
        assert_eq!(t.due_at(TimerKind::Autosave), Some(60_000));
        // several missed periods fire once
        assert_eq!(t.take_due(125_000), vec![TimerKind::Autosave]);
        assert_eq!(t.due_at(TimerKind::Autosave), Some(150_000));
    }

    #[test]
    fn due_timers_come_out_earliest_first() {
        let mut t = Timers::new();
        t.schedule_once(TimerKind::DebouncedPush, 5_000);
        t.schedule_once(TimerKind::ImmediatePush, 100);
        t.schedule_every(TimerKind::DayRecompute, 60_000, 0);
        assert_eq!(
            t.take_due(60_000),
            vec![TimerKind::ImmediatePush, TimerKind::DebouncedPush, TimerKind::DayRecompute]
        );
    }

    #[test]
    fn clear_cancels_everything() {
        let mut t = Timers::new();
        t.schedule_once(TimerKind::DebouncedPush, 5_000);
        t.schedule_every(TimerKind::Autosave, 30_000, 0);
        t.clear();
        assert!(t.is_empty());
        assert!(t.take_due(i64::MAX).is_empty());
    }
}
