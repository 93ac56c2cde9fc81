use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use liftlink_frame::Frame;
use liftlink_link::{LinkListener, StreamLink};
use liftlink_peer::{
    CommandRequest, CommandResponse, CommandStatus, ListenerAction, Port, PortConfig, Role,
    MSG_TYPE_COMMAND, MSG_TYPE_ESTOP, MSG_TYPE_HEARTBEAT,
};
use tracing::{info, warn};

use crate::cmd::EchoArgs;
use crate::exit::{link_error, peer_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let listener = LinkListener::bind(&args.path).map_err(|err| link_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let status = args.status.as_status();

    while running.load(Ordering::SeqCst) {
        let link = match listener.accept() {
            Ok(link) => link,
            Err(err) => return Err(link_error("accept failed", err)),
        };
        info!("device emulator serving connection");
        serve_connection(link, status, &running)?;

        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

/// Serve one connection as the device end of the link.
///
/// Listeners only forward inbound query frames to this thread; all
/// replies go out via `Port::respond` from here, outside the dispatch
/// path.
fn serve_connection(
    link: StreamLink,
    status: CommandStatus,
    running: &AtomicBool,
) -> CliResult<()> {
    let config = PortConfig {
        role: Role::Device,
        heartbeat: None,
        ..PortConfig::default()
    };
    let (port, _events) =
        Port::spawn(link, config).map_err(|err| peer_error("port setup failed", err))?;

    let (inbound_tx, inbound) = mpsc::channel::<Frame>();
    for frame_type in [MSG_TYPE_HEARTBEAT, MSG_TYPE_COMMAND] {
        let tx = inbound_tx.clone();
        port.add_type_listener(frame_type, move |frame| {
            let _ = tx.send(frame.clone());
            ListenerAction::Continue
        })
        .map_err(|err| peer_error("listener setup failed", err))?;
    }
    port.add_type_listener(MSG_TYPE_ESTOP, |frame| {
        warn!(len = frame.payload.len(), "emergency stop received");
        ListenerAction::Continue
    })
    .map_err(|err| peer_error("listener setup failed", err))?;
    drop(inbound_tx);

    while running.load(Ordering::SeqCst) && port.link_open() {
        let frame = match inbound.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => frame,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        let reply = match frame.frame_type {
            MSG_TYPE_HEARTBEAT => frame.payload.to_vec(),
            MSG_TYPE_COMMAND => match CommandRequest::from_wire(&frame.payload) {
                Ok(request) => {
                    info!(command_id = request.command_id, %status, "answering command");
                    CommandResponse::new(request.command_id, status, request.params().to_vec())
                        .map_err(|err| peer_error("response build failed", err))?
                        .to_wire()
                        .to_vec()
                }
                Err(err) => {
                    warn!(%err, "ignoring malformed command");
                    continue;
                }
            },
            _ => continue,
        };

        if let Err(err) = port.respond(&frame, &reply) {
            warn!(%err, "reply failed, closing connection");
            break;
        }
    }

    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
