use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Derived liveness of the device end of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

/// An edge on the link state, reported exactly once per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    Up,
    Down,
}

const PROBE_IN_FLIGHT: u8 = 0;
const PROBE_ACKED: u8 = 1;
const PROBE_TIMED_OUT: u8 = 2;

/// Resolution slot for one in-flight probe.
///
/// The probe's query listeners resolve through this slot instead of
/// touching supervisor state, which is owned by the port loop and not
/// reachable from inside a dispatch.
#[derive(Debug)]
pub struct ProbeSlot(AtomicU8);

impl ProbeSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self(AtomicU8::new(PROBE_IN_FLIGHT)))
    }

    /// Mark the probe as answered.
    pub fn ack(&self) {
        self.0.store(PROBE_ACKED, Ordering::Release);
    }

    /// Mark the probe as timed out.
    pub fn timed_out(&self) {
        self.0.store(PROBE_TIMED_OUT, Ordering::Release);
    }

    fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}

/// Heartbeat supervisor configuration, in housekeeping ticks.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Ticks between probes (measured from the previous probe being armed).
    pub interval_ticks: u32,
    /// Ticks to wait for a probe response before declaring it lost.
    pub timeout_ticks: u16,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ticks: 1000,
            timeout_ticks: 500,
        }
    }
}

/// Periodic liveness prober.
///
/// Issues at most one probe at a time: the interval check additionally
/// requires the previous probe to have resolved, so repeated loss can
/// never pile up pending queries. Link-state transitions are edge
/// triggered — a run of successes or a run of timeouts reports once.
pub struct Heartbeat {
    config: HeartbeatConfig,
    counter: u32,
    state: LinkState,
    elapsed: u32,
    probe: Option<Arc<ProbeSlot>>,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            counter: 0,
            state: LinkState::Down,
            elapsed: 0,
            probe: None,
        }
    }

    /// Advance the interval clock by one housekeeping tick.
    pub fn tick(&mut self) {
        self.elapsed = self.elapsed.saturating_add(1);
    }

    /// True when a new probe should be issued: the interval has elapsed
    /// and no probe is outstanding.
    pub fn due(&self) -> bool {
        self.probe.is_none() && self.elapsed >= self.config.interval_ticks
    }

    /// Arm the next probe, returning its payload and resolution slot.
    ///
    /// The payload carries an ASCII sequence marker (`HB <n>`) so probe
    /// traffic is self-describing in link captures.
    pub fn arm(&mut self) -> (Vec<u8>, Arc<ProbeSlot>) {
        self.counter = self.counter.wrapping_add(1);
        self.elapsed = 0;
        let slot = ProbeSlot::new();
        self.probe = Some(slot.clone());
        debug!(seq = self.counter, "arming heartbeat probe");
        (format!("HB {}", self.counter).into_bytes(), slot)
    }

    /// Roll back an armed probe whose query never made it onto the wire.
    pub fn disarm(&mut self) {
        self.probe = None;
    }

    /// Ticks to wait for a probe response.
    pub fn timeout_ticks(&self) -> u16 {
        self.config.timeout_ticks
    }

    /// Current link state level.
    pub fn link_state(&self) -> LinkState {
        self.state
    }

    /// Absorb a resolved probe, yielding a transition on state edges only.
    pub fn poll(&mut self) -> Option<LinkTransition> {
        let outcome = self.probe.as_ref()?.get();
        match outcome {
            PROBE_ACKED => {
                self.probe = None;
                if self.state == LinkState::Down {
                    self.state = LinkState::Up;
                    Some(LinkTransition::Up)
                } else {
                    None
                }
            }
            PROBE_TIMED_OUT => {
                self.probe = None;
                if self.state == LinkState::Up {
                    self.state = LinkState::Down;
                    Some(LinkTransition::Down)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(interval: u32) -> Heartbeat {
        Heartbeat::new(HeartbeatConfig {
            interval_ticks: interval,
            timeout_ticks: 10,
        })
    }

    /// Run one probe to the given outcome and return any transition.
    fn probe(hb: &mut Heartbeat, ok: bool) -> Option<LinkTransition> {
        while !hb.due() {
            hb.tick();
            assert!(hb.poll().is_none());
        }
        let (_payload, slot) = hb.arm();
        if ok {
            slot.ack();
        } else {
            slot.timed_out();
        }
        hb.poll()
    }

    #[test]
    fn transitions_fire_on_edges_only() {
        let mut hb = heartbeat(5);

        let outcomes = [true, true, false, false, true];
        let transitions: Vec<_> = outcomes
            .iter()
            .filter_map(|&ok| probe(&mut hb, ok))
            .collect();

        assert_eq!(
            transitions,
            vec![
                LinkTransition::Up,
                LinkTransition::Down,
                LinkTransition::Up
            ]
        );
        assert_eq!(hb.link_state(), LinkState::Up);
    }

    #[test]
    fn no_second_probe_while_one_is_outstanding() {
        let mut hb = heartbeat(2);

        for _ in 0..2 {
            hb.tick();
        }
        assert!(hb.due());
        let (_payload, slot) = hb.arm();

        // Interval elapses again, but the probe is still unresolved.
        for _ in 0..50 {
            hb.tick();
        }
        assert!(!hb.due());

        slot.ack();
        assert_eq!(hb.poll(), Some(LinkTransition::Up));
        // Elapsed time accrued while in flight; next probe is due at once.
        assert!(hb.due());
    }

    #[test]
    fn initial_timeout_reports_nothing() {
        let mut hb = heartbeat(1);
        // The link starts down; a failed first probe is not an edge.
        assert_eq!(probe(&mut hb, false), None);
        assert_eq!(hb.link_state(), LinkState::Down);
    }

    #[test]
    fn probe_payload_carries_sequence_marker() {
        let mut hb = heartbeat(0);
        let (payload, _slot) = hb.arm();
        assert_eq!(payload, b"HB 1");
        hb.disarm();
        let (payload, _slot) = hb.arm();
        assert_eq!(payload, b"HB 2");
    }
}
