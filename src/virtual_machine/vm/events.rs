use crate::virtual_machine::program::CodeAddr;

/// A pending `CALLTM`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimedEvent {
    pub countdown_ms: i32,
    pub addr: CodeAddr,
}

/// Timed events in scheduling order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(super) struct EventQueue {
    events: Vec<TimedEvent>,
}

impl EventQueue {
    pub(super) fn schedule(&mut self, addr: CodeAddr, countdown_ms: i32) {
        self.events.push(TimedEvent { countdown_ms, addr });
    }

    /// Counts every event down by `delta_ms` and removes the ones that
    /// reached zero, returning their addresses in scheduling order.
    pub(super) fn advance(&mut self, delta_ms: u32) -> Vec<CodeAddr> {
        let delta = i32::try_from(delta_ms).unwrap_or(i32::MAX);
        let mut due = Vec::new();
        self.events.retain_mut(|event| {
            event.countdown_ms = event.countdown_ms.saturating_sub(delta);
            if event.countdown_ms <= 0 {
                due.push(event.addr);
                false
            } else {
                true
            }
        });
        due
    }

    pub(super) fn pending(&self) -> &[TimedEvent] {
        &self.events
    }

    pub(super) fn clear(&mut self) {
        self.events.clear();
    }
}
