//! Pluggable event-stream sink: the simulation core never hardcodes an I/O or
//! logging backend, it calls out to a trait object instead.

use crate::codec::{Command, Reply};
use crate::tag::TagState;

/// Observes simulation milestones. All methods have no-op default bodies so
/// an implementor only overrides what it cares about.
pub trait SimObserver {
    fn round_started(&mut self, _time: f64) {}
    fn round_ended(&mut self, _time: f64) {}
    fn slot_started(&mut self, _time: f64, _slot: u16) {}
    fn slot_ended(&mut self, _time: f64, _slot: u16) {}
    fn command_sent(&mut self, _time: f64, _command: &Command) {}
    fn reply_received(&mut self, _time: f64, _tag: usize, _reply: &Reply) {}
    fn reply_lost(&mut self, _time: f64, _tag: Option<usize>, _reason: &str) {}
    fn tag_state_changed(&mut self, _time: f64, _tag: usize, _from: TagState, _to: TagState) {}
    fn tag_read(&mut self, _time: f64, _tag: usize, _bank: crate::types::MemoryBank, _data: &[u8]) {}
}

/// Discards every event. The default observer when the caller doesn't need one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SimObserver for NullObserver {}

/// Forwards every event to the `log` crate at a level proportional to how
/// noisy it is.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl SimObserver for LoggingObserver {
    fn round_started(&mut self, time: f64) {
        log::info!("round started at t={time:.6}");
    }

    fn round_ended(&mut self, time: f64) {
        log::info!("round ended at t={time:.6}");
    }

    fn slot_started(&mut self, time: f64, slot: u16) {
        log::debug!("slot {slot} started at t={time:.6}");
    }

    fn slot_ended(&mut self, time: f64, slot: u16) {
        log::debug!("slot {slot} ended at t={time:.6}");
    }

    fn command_sent(&mut self, time: f64, command: &Command) {
        log::debug!("t={time:.6} reader -> {command:?}");
    }

    fn reply_received(&mut self, time: f64, tag: usize, reply: &Reply) {
        log::debug!("t={time:.6} tag[{tag}] -> {reply:?}");
    }

    fn reply_lost(&mut self, time: f64, tag: Option<usize>, reason: &str) {
        log::warn!("t={time:.6} reply lost (tag={tag:?}): {reason}");
    }

    fn tag_state_changed(&mut self, time: f64, tag: usize, from: TagState, to: TagState) {
        log::debug!("t={time:.6} tag[{tag}] {from:?} -> {to:?}");
    }

    fn tag_read(&mut self, time: f64, tag: usize, bank: crate::types::MemoryBank, data: &[u8]) {
        let hex: String = data.iter().map(|b| format!("{b:02x}")).collect();
        log::info!("t={time:.6} READ: tag={tag} bank={bank:?} data={hex}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingObserver {
        reads: u32,
    }

    impl SimObserver for CountingObserver {
        fn tag_read(&mut self, _time: f64, _tag: usize, _bank: crate::types::MemoryBank, _data: &[u8]) {
            self.reads += 1;
        }
    }

    #[test]
    fn null_observer_accepts_every_call() {
        let mut obs = NullObserver;
        obs.round_started(0.0);
        obs.slot_started(0.0, 0);
        obs.reply_lost(0.0, None, "collision");
    }

    #[test]
    fn custom_observer_only_overrides_what_it_needs() {
        let mut obs = CountingObserver { reads: 0 };
        obs.round_started(1.0);
        obs.tag_read(1.0, 0, crate::types::MemoryBank::Tid, &[0, 1]);
        assert_eq!(obs.reads, 1);
    }
}
