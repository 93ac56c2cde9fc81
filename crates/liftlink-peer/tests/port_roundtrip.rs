//! End-to-end port tests over an in-process socket pair.
//!
//! The device end is a second `Port` in `Role::Device`: its listeners
//! forward inbound query frames to a responder thread, which replies via
//! `Port::respond` from its own context — the same handoff pattern real
//! consumers use to avoid sending from inside a dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use liftlink_frame::Frame;
use liftlink_link::StreamLink;
use liftlink_peer::{
    CommandRequest, CommandResponse, CommandStatus, HeartbeatConfig, LinkEvent, ListenerAction,
    Port, PortConfig, Role, StateEvent, MSG_TYPE_COMMAND, MSG_TYPE_ESTOP, MSG_TYPE_EVENT,
    MSG_TYPE_HEARTBEAT,
};

const TICK: Duration = Duration::from_millis(2);

fn controller_config(
    command_timeout_ticks: u16,
    heartbeat: Option<HeartbeatConfig>,
) -> PortConfig {
    PortConfig {
        role: Role::Controller,
        heartbeat,
        command_timeout_ticks,
        tick_interval: TICK,
        poll_wait: TICK,
        ..PortConfig::default()
    }
}

fn device_config() -> PortConfig {
    PortConfig {
        role: Role::Device,
        heartbeat: None,
        tick_interval: TICK,
        poll_wait: TICK,
        ..PortConfig::default()
    }
}

struct DeviceHarness {
    port: Arc<Port>,
    responding: Arc<AtomicBool>,
    estops: mpsc::Receiver<Vec<u8>>,
}

/// Emulate the device end: ack heartbeat probes with their own payload,
/// answer commands with `Ok` echoing the params back as data.
fn spawn_device(link: StreamLink) -> DeviceHarness {
    let (port, _events) = Port::spawn(link, device_config()).unwrap();
    let port = Arc::new(port);
    let responding = Arc::new(AtomicBool::new(true));

    let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>();
    for frame_type in [MSG_TYPE_HEARTBEAT, MSG_TYPE_COMMAND] {
        let tx = inbound_tx.clone();
        port.add_type_listener(frame_type, move |frame| {
            let _ = tx.send(frame.clone());
            ListenerAction::Continue
        })
        .unwrap();
    }

    let (estop_tx, estop_rx) = mpsc::channel::<Vec<u8>>();
    port.add_type_listener(MSG_TYPE_ESTOP, move |frame| {
        let _ = estop_tx.send(frame.payload.to_vec());
        ListenerAction::Continue
    })
    .unwrap();

    {
        let port = Arc::clone(&port);
        let responding = Arc::clone(&responding);
        thread::spawn(move || {
            while let Ok(frame) = inbound_rx.recv() {
                if !responding.load(Ordering::SeqCst) {
                    continue;
                }
                let reply = match frame.frame_type {
                    MSG_TYPE_HEARTBEAT => frame.payload.to_vec(),
                    MSG_TYPE_COMMAND => match CommandRequest::from_wire(&frame.payload) {
                        Ok(request) => {
                            CommandResponse::new(
                                request.command_id,
                                CommandStatus::Ok,
                                request.params().to_vec(),
                            )
                            .unwrap()
                            .to_wire()
                            .to_vec()
                        }
                        Err(_) => continue,
                    },
                    _ => continue,
                };
                if port.respond(&frame, &reply).is_err() {
                    break;
                }
            }
        });
    }

    DeviceHarness {
        port,
        responding,
        estops: estop_rx,
    }
}

fn expect_event(
    events: &mpsc::Receiver<LinkEvent>,
    deadline: Duration,
    mut accept: impl FnMut(&LinkEvent) -> bool,
) -> LinkEvent {
    let started = std::time::Instant::now();
    loop {
        let remaining = deadline
            .checked_sub(started.elapsed())
            .expect("timed out waiting for link event");
        let event = events
            .recv_timeout(remaining)
            .expect("timed out waiting for link event");
        if accept(&event) {
            return event;
        }
    }
}

#[test]
fn command_roundtrip_delivers_exactly_one_response() {
    let (near, far) = StreamLink::pair().unwrap();
    let device = spawn_device(far);
    let (port, events) = Port::spawn(near, controller_config(250, None)).unwrap();

    let request = CommandRequest::new(0x02, &b"\x03"[..]).unwrap();
    port.send_command(&request).unwrap();

    let event = expect_event(&events, Duration::from_secs(5), |event| {
        matches!(event, LinkEvent::CommandResponse(_))
    });
    let LinkEvent::CommandResponse(response) = event else {
        unreachable!();
    };
    assert_eq!(response.command_id, 0x02);
    assert_eq!(response.status, CommandStatus::Ok);
    assert_eq!(response.data(), b"\x03");

    // The timeout side of the query must never fire after the response.
    match events.recv_timeout(Duration::from_millis(900)) {
        Err(mpsc::RecvTimeoutError::Timeout) => {}
        other => panic!("unexpected event after response: {other:?}"),
    }

    drop(device);
}

#[test]
fn unanswered_command_times_out() {
    let (near, far) = StreamLink::pair().unwrap();
    let device = spawn_device(far);
    device.responding.store(false, Ordering::SeqCst);

    let (port, events) = Port::spawn(near, controller_config(25, None)).unwrap();
    let request = CommandRequest::new(0x01, &b""[..]).unwrap();
    port.send_command(&request).unwrap();

    let event = expect_event(&events, Duration::from_secs(5), |event| {
        matches!(event, LinkEvent::CommandTimeout)
    });
    assert_eq!(event, LinkEvent::CommandTimeout);

    drop(device);
}

#[test]
fn unsolicited_state_event_reaches_consumer() {
    let (near, far) = StreamLink::pair().unwrap();
    let device = spawn_device(far);
    let (_port, events) = Port::spawn(near, controller_config(250, None)).unwrap();

    let state_event = StateEvent::new(0x01, 0x02);
    device
        .port
        .send(MSG_TYPE_EVENT, &state_event.to_wire())
        .unwrap();

    let event = expect_event(&events, Duration::from_secs(5), |event| {
        matches!(event, LinkEvent::StateEvent(_))
    });
    assert_eq!(event, LinkEvent::StateEvent(state_event));
}

#[test]
fn heartbeat_reports_link_up_then_down_on_edges() {
    let (near, far) = StreamLink::pair().unwrap();
    let device = spawn_device(far);

    let heartbeat = HeartbeatConfig {
        interval_ticks: 5,
        timeout_ticks: 50,
    };
    let (_port, events) = Port::spawn(near, controller_config(250, Some(heartbeat))).unwrap();

    let up = expect_event(&events, Duration::from_secs(5), |event| {
        matches!(event, LinkEvent::LinkUp | LinkEvent::LinkDown)
    });
    assert_eq!(up, LinkEvent::LinkUp, "first edge must be link-up");

    // Stop acking probes; the next unanswered probe must produce exactly
    // one link-down edge.
    device.responding.store(false, Ordering::SeqCst);
    let down = expect_event(&events, Duration::from_secs(5), |event| {
        matches!(event, LinkEvent::LinkUp | LinkEvent::LinkDown)
    });
    assert_eq!(down, LinkEvent::LinkDown);

    // Resume acking; the link must come back up, with no duplicate downs
    // in between.
    device.responding.store(true, Ordering::SeqCst);
    let back_up = expect_event(&events, Duration::from_secs(5), |event| {
        matches!(event, LinkEvent::LinkUp | LinkEvent::LinkDown)
    });
    assert_eq!(back_up, LinkEvent::LinkUp);
}

#[test]
fn estop_is_fire_and_forget() {
    let (near, far) = StreamLink::pair().unwrap();
    let device = spawn_device(far);
    let (port, events) = Port::spawn(near, controller_config(250, None)).unwrap();

    port.send_urgent(&[0x01]).unwrap();

    let payload = device
        .estops
        .recv_timeout(Duration::from_secs(5))
        .expect("estop should reach the device");
    assert_eq!(payload, vec![0x01]);

    // No response, no timeout: estop bypasses correlation entirely.
    match events.recv_timeout(Duration::from_millis(300)) {
        Err(mpsc::RecvTimeoutError::Timeout) => {}
        other => panic!("unexpected event after estop: {other:?}"),
    }
}

#[test]
fn concurrent_senders_each_get_their_response() {
    let (near, far) = StreamLink::pair().unwrap();
    let device = spawn_device(far);
    let (port, events) = Port::spawn(near, controller_config(500, None)).unwrap();
    let port = Arc::new(port);

    let senders: Vec<_> = (0u8..3)
        .map(|i| {
            let port = Arc::clone(&port);
            thread::spawn(move || {
                let request = CommandRequest::new(0x10 + i, &b""[..]).unwrap();
                port.send_command(&request).unwrap();
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let event = expect_event(&events, Duration::from_secs(5), |event| {
            matches!(event, LinkEvent::CommandResponse(_))
        });
        if let LinkEvent::CommandResponse(response) = event {
            assert_eq!(response.status, CommandStatus::Ok);
            seen.push(response.command_id);
        }
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0x10, 0x11, 0x12]);

    drop(device);
}
