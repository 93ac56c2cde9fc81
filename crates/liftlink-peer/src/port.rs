use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use liftlink_frame::{encode_frame, Decoder, Frame, FrameConfig, FrameError};
use liftlink_link::{ByteLink, LinkError, LinkRx, LinkTx};
use tracing::{debug, warn};

use crate::error::{PeerError, Result};
use crate::heartbeat::{Heartbeat, HeartbeatConfig, LinkState, LinkTransition};
use crate::proto::{
    CommandRequest, CommandResponse, StateEvent, MSG_TYPE_COMMAND, MSG_TYPE_ESTOP, MSG_TYPE_EVENT,
    MSG_TYPE_HEARTBEAT,
};
use crate::registry::{FrameId, ListenerAction, Registry, RegistryConfig, Role};

/// Everything the application hears from the link.
///
/// Delivered through a bounded queue from the receive loop; consumers run
/// outside the port guard and may freely call back into the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The device answered a command.
    CommandResponse(CommandResponse),
    /// A command went unanswered for its full timeout.
    CommandTimeout,
    /// The device reported an unsolicited state change.
    StateEvent(StateEvent),
    /// Heartbeat supervision saw the link come up.
    LinkUp,
    /// Heartbeat supervision saw the link go down.
    LinkDown,
}

/// Port behavior configuration.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Which end of the link this port speaks for.
    pub role: Role,
    pub frame: FrameConfig,
    pub registry: RegistryConfig,
    /// Heartbeat supervision; `None` disables probing entirely.
    pub heartbeat: Option<HeartbeatConfig>,
    /// Ticks to wait for a command response.
    pub command_timeout_ticks: u16,
    /// Cadence of codec/registry/heartbeat housekeeping ticks.
    pub tick_interval: Duration,
    /// Bounded wait used when polling the link for bytes.
    pub poll_wait: Duration,
    /// Depth of the bounded [`LinkEvent`] queue.
    pub event_queue_depth: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            role: Role::Controller,
            frame: FrameConfig::default(),
            registry: RegistryConfig::default(),
            heartbeat: Some(HeartbeatConfig::default()),
            command_timeout_ticks: 500,
            tick_interval: Duration::from_millis(10),
            poll_wait: Duration::from_millis(10),
            event_queue_depth: 32,
        }
    }
}

/// The mutable transport core, guarded as a single unit.
///
/// Encoder scratch, decoder, listener registry, heartbeat supervisor and
/// the link tx half all mutate under one lock; every public port
/// operation holds it for its full duration.
struct Core {
    tx: Box<dyn LinkTx>,
    encode_buf: BytesMut,
    decoder: Decoder,
    registry: Registry,
    heartbeat: Option<Heartbeat>,
    max_payload: usize,
}

impl Core {
    fn send_frame(&mut self, frame_type: u8, id: FrameId, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload {
            return Err(PeerError::Frame(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            }));
        }
        self.encode_buf.clear();
        encode_frame(frame_type, id, payload, &mut self.encode_buf)?;
        self.tx.send(&self.encode_buf)?;
        Ok(())
    }

    /// Register a pending query and put its frame on the wire, atomically
    /// from the caller's point of view: a failed send rolls the
    /// registration back so neither handler can ever fire for it.
    fn query(
        &mut self,
        frame_type: u8,
        payload: &[u8],
        timeout_ticks: u16,
        on_response: impl FnMut(&Frame) + Send + 'static,
        on_timeout: impl FnMut() + Send + 'static,
    ) -> Result<FrameId> {
        let id = self
            .registry
            .register_query(on_response, on_timeout, timeout_ticks)?;
        if let Err(err) = self.send_frame(frame_type, id, payload) {
            self.registry.remove_query(id);
            return Err(err);
        }
        Ok(id)
    }
}

/// A shared serial transport: one byte link, one receive/housekeeping
/// loop, any number of concurrent sender contexts.
///
/// Dropping the port (or calling [`Port::shutdown`]) stops the loop and
/// joins its thread; pending queries are discarded without firing either
/// handler.
pub struct Port {
    core: Arc<Mutex<Core>>,
    events: SyncSender<LinkEvent>,
    running: Arc<AtomicBool>,
    link_open: Arc<AtomicBool>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    command_timeout_ticks: u16,
}

impl Port {
    /// Split the link, install the built-in listeners, and start the
    /// receive loop. Returns the port and the application event queue.
    pub fn spawn<L: ByteLink>(link: L, config: PortConfig) -> Result<(Self, Receiver<LinkEvent>)> {
        let (rx, tx) = link.split()?;
        let (events_tx, events_rx) = sync_channel(config.event_queue_depth);
        let mut registry = Registry::new(config.registry.clone(), config.role);

        // Unsolicited device events go straight onto the event queue.
        let state_events = events_tx.clone();
        registry.add_type_listener(MSG_TYPE_EVENT, move |frame| {
            match StateEvent::from_wire(&frame.payload) {
                Ok(event) => push_event(&state_events, LinkEvent::StateEvent(event)),
                Err(err) => warn!(%err, "dropping malformed state event"),
            }
            ListenerAction::Continue
        })?;

        // Diagnostics fallback: strays and unknown types end here.
        registry.add_generic_listener(|frame| {
            debug!(
                frame_type = frame.frame_type,
                id = frame.id,
                len = frame.payload.len(),
                "unmatched frame"
            );
        })?;

        let core = Arc::new(Mutex::new(Core {
            tx: Box::new(tx),
            encode_buf: BytesMut::with_capacity(256),
            decoder: Decoder::with_config(config.frame.clone()),
            registry,
            heartbeat: config.heartbeat.clone().map(Heartbeat::new),
            max_payload: config.frame.max_payload,
        }));

        let running = Arc::new(AtomicBool::new(true));
        let link_open = Arc::new(AtomicBool::new(true));
        let rx_thread = {
            let core = core.clone();
            let running = running.clone();
            let link_open = link_open.clone();
            let events = events_tx.clone();
            let (tick_interval, poll_wait) = (config.tick_interval, config.poll_wait);
            std::thread::Builder::new()
                .name("liftlink-rx".into())
                .spawn(move || rx_loop(rx, core, running, link_open, events, tick_interval, poll_wait))
                .map_err(|err| PeerError::Link(LinkError::Io(err)))?
        };

        Ok((
            Self {
                core,
                events: events_tx,
                running,
                link_open,
                rx_thread: Mutex::new(Some(rx_thread)),
                command_timeout_ticks: config.command_timeout_ticks,
            },
            events_rx,
        ))
    }

    /// Send a command expecting a correlated response.
    ///
    /// `Ok(())` means the frame was accepted onto the wire, not that it
    /// was delivered: the outcome arrives later as exactly one of
    /// [`LinkEvent::CommandResponse`] or [`LinkEvent::CommandTimeout`].
    pub fn send_command(&self, request: &CommandRequest) -> Result<()> {
        self.ensure_running()?;
        let payload = request.to_wire();
        let response_events = self.events.clone();
        let timeout_events = self.events.clone();

        let mut core = self.lock();
        core.query(
            MSG_TYPE_COMMAND,
            &payload,
            self.command_timeout_ticks,
            move |frame| match CommandResponse::from_wire(&frame.payload) {
                Ok(response) => push_event(&response_events, LinkEvent::CommandResponse(response)),
                Err(err) => warn!(%err, "dropping malformed command response"),
            },
            move || push_event(&timeout_events, LinkEvent::CommandTimeout),
        )?;
        Ok(())
    }

    /// Send a fire-and-forget frame of the given type.
    pub fn send(&self, frame_type: u8, payload: &[u8]) -> Result<()> {
        self.ensure_running()?;
        let mut core = self.lock();
        let id = core.registry.alloc_frame_id();
        core.send_frame(frame_type, id, payload)
    }

    /// Send an emergency-stop signal.
    ///
    /// Bypasses correlation entirely: no response is awaited and no
    /// delivery confirmation exists at this layer.
    pub fn send_urgent(&self, payload: &[u8]) -> Result<()> {
        self.send(MSG_TYPE_ESTOP, payload)
    }

    /// Issue a raw correlated query with explicit listeners.
    ///
    /// Listeners run on the receive loop with the port guard held: they
    /// must not call back into the port. Hand any follow-up send to
    /// another context (a channel works).
    pub fn query(
        &self,
        frame_type: u8,
        payload: &[u8],
        timeout_ticks: u16,
        on_response: impl FnMut(&Frame) + Send + 'static,
        on_timeout: impl FnMut() + Send + 'static,
    ) -> Result<FrameId> {
        self.ensure_running()?;
        let mut core = self.lock();
        core.query(frame_type, payload, timeout_ticks, on_response, on_timeout)
    }

    /// Reply to an inbound query frame, echoing its type and id.
    pub fn respond(&self, to: &Frame, payload: &[u8]) -> Result<()> {
        self.ensure_running()?;
        let mut core = self.lock();
        core.send_frame(to.frame_type, to.id, payload)
    }

    /// Register a persistent listener for one frame type.
    ///
    /// Same guard caveat as [`Port::query`]: no sends from inside the
    /// handler.
    pub fn add_type_listener(
        &self,
        frame_type: u8,
        handler: impl FnMut(&Frame) -> ListenerAction + Send + 'static,
    ) -> Result<()> {
        self.lock().registry.add_type_listener(frame_type, handler)
    }

    /// Register a diagnostics-only fallback listener.
    pub fn add_generic_listener(
        &self,
        handler: impl FnMut(&Frame) + Send + 'static,
    ) -> Result<()> {
        self.lock().registry.add_generic_listener(handler)
    }

    /// Current heartbeat-derived link state, if supervision is enabled.
    pub fn link_state(&self) -> Option<LinkState> {
        self.lock().heartbeat.as_ref().map(Heartbeat::link_state)
    }

    /// Whether the receive side of the link is still readable.
    ///
    /// Goes false when the far end closes; housekeeping (timeouts,
    /// heartbeat edges) keeps running regardless.
    pub fn link_open(&self) -> bool {
        self.link_open.load(Ordering::SeqCst)
    }

    /// Stop the receive loop and join its thread. Idempotent.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self
            .rx_thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PeerError::Shutdown)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        // A panicking user listener must not wedge the whole port.
        self.core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.shutdown();
    }
}

const READ_CHUNK_SIZE: usize = 64;

#[allow(clippy::too_many_arguments)]
fn rx_loop(
    mut rx: impl LinkRx,
    core: Arc<Mutex<Core>>,
    running: Arc<AtomicBool>,
    link_open: Arc<AtomicBool>,
    events: SyncSender<LinkEvent>,
    tick_interval: Duration,
    poll_wait: Duration,
) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    let mut last_tick = Instant::now();

    while running.load(Ordering::SeqCst) {
        // Polling happens outside the guard; the rx half is owned here.
        let received = if link_open.load(Ordering::SeqCst) {
            match rx.recv(&mut buf, poll_wait) {
                Ok(n) => n,
                Err(err) => {
                    debug!(%err, "receive side closed, housekeeping continues");
                    link_open.store(false, Ordering::SeqCst);
                    0
                }
            }
        } else {
            std::thread::sleep(poll_wait);
            0
        };

        let mut guard = match core.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if received > 0 {
            let Core {
                decoder, registry, ..
            } = &mut *guard;
            for frame in decoder.feed(&buf[..received]) {
                registry.dispatch(&frame);
            }
        }

        if last_tick.elapsed() >= tick_interval {
            last_tick = Instant::now();
            guard.decoder.tick();
            guard.registry.tick();
            run_heartbeat(&mut guard, &events);
        }
    }

    debug!("receive loop exiting");
}

fn run_heartbeat(core: &mut Core, events: &SyncSender<LinkEvent>) {
    let Some(heartbeat) = core.heartbeat.as_mut() else {
        return;
    };
    heartbeat.tick();

    if let Some(transition) = heartbeat.poll() {
        let event = match transition {
            LinkTransition::Up => LinkEvent::LinkUp,
            LinkTransition::Down => LinkEvent::LinkDown,
        };
        push_event(events, event);
    }

    if heartbeat.due() {
        let timeout_ticks = heartbeat.timeout_ticks();
        let (payload, slot) = heartbeat.arm();
        let ack_slot = slot.clone();
        let result = core.query(
            MSG_TYPE_HEARTBEAT,
            &payload,
            timeout_ticks,
            move |_frame| ack_slot.ack(),
            move || slot.timed_out(),
        );
        if let Err(err) = result {
            warn!(%err, "failed to issue heartbeat probe");
            if let Some(heartbeat) = core.heartbeat.as_mut() {
                heartbeat.disarm();
            }
        }
    }
}

fn push_event(events: &SyncSender<LinkEvent>, event: LinkEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!(?event, "event queue full, dropping event"),
        Err(TrySendError::Disconnected(_)) => debug!("event receiver dropped"),
    }
}

#[cfg(test)]
mod tests {
    use liftlink_link::StreamLink;

    use super::*;

    fn quiet_config() -> PortConfig {
        PortConfig {
            heartbeat: None,
            tick_interval: Duration::from_millis(2),
            poll_wait: Duration::from_millis(2),
            ..PortConfig::default()
        }
    }

    #[test]
    fn shutdown_is_idempotent_and_rejects_sends() {
        let (link, _far_end) = StreamLink::pair().unwrap();
        let (port, _events) = Port::spawn(link, quiet_config()).unwrap();

        port.shutdown();
        port.shutdown();

        let request = CommandRequest::new(0x01, &b""[..]).unwrap();
        assert!(matches!(
            port.send_command(&request),
            Err(PeerError::Shutdown)
        ));
        assert!(matches!(
            port.send_urgent(&[0x01]),
            Err(PeerError::Shutdown)
        ));
    }

    #[test]
    fn oversized_send_is_rejected_synchronously() {
        let (link, _far_end) = StreamLink::pair().unwrap();
        let (port, _events) = Port::spawn(link, quiet_config()).unwrap();

        let oversized = vec![0u8; MAX_TEST_PAYLOAD + 1];
        let result = port.send(0x05, &oversized);
        assert!(matches!(
            result,
            Err(PeerError::Frame(FrameError::PayloadTooLarge { .. }))
        ));
    }

    const MAX_TEST_PAYLOAD: usize = liftlink_frame::MAX_PAYLOAD;

    #[test]
    fn failed_query_send_rolls_back_registration() {
        let (link, _far_end) = StreamLink::pair().unwrap();
        let (port, _events) = Port::spawn(link, quiet_config()).unwrap();

        let oversized = vec![0u8; MAX_TEST_PAYLOAD + 1];
        let result = port.query(0x03, &oversized, 10, |_| {}, || {});
        assert!(result.is_err());

        // The slot freed by the rollback is usable again at full capacity.
        for _ in 0..RegistryConfig::default().query_slots {
            port.query(0x03, b"ok", 1000, |_| {}, || {}).unwrap();
        }
    }
}
