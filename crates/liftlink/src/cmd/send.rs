use std::time::{Duration, Instant};

use liftlink_link::StreamLink;
use liftlink_peer::{CommandRequest, LinkEvent, Port, PortConfig};

use crate::cmd::{parse_duration, parse_hex, SendArgs};
use crate::exit::{link_error, peer_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_response, print_timeout, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_hex(&args.params)?;
    let request =
        CommandRequest::new(args.command, params).map_err(|err| peer_error("invalid command", err))?;

    let link = StreamLink::connect(&args.path).map_err(|err| link_error("connect failed", err))?;

    let tick_interval = Duration::from_millis(10);
    let config = PortConfig {
        heartbeat: None,
        command_timeout_ticks: ticks_for(timeout, tick_interval),
        tick_interval,
        ..PortConfig::default()
    };
    let (port, events) =
        Port::spawn(link, config).map_err(|err| peer_error("port setup failed", err))?;

    port.send_command(&request)
        .map_err(|err| peer_error("send failed", err))?;

    // The port resolves the command exactly once; allow some slack over
    // its own timeout before giving up on the queue.
    let deadline = Instant::now() + timeout + Duration::from_secs(2);
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or_else(|| CliError::new(TIMEOUT, "no command outcome from port"))?;
        match events.recv_timeout(remaining) {
            Ok(LinkEvent::CommandResponse(response)) => {
                print_response(&response, format);
                return Ok(if response.status.is_ok() {
                    SUCCESS
                } else {
                    FAILURE
                });
            }
            Ok(LinkEvent::CommandTimeout) => {
                print_timeout(format);
                return Ok(TIMEOUT);
            }
            Ok(_) => continue,
            Err(_) => return Err(CliError::new(TIMEOUT, "no command outcome from port")),
        }
    }
}

fn ticks_for(timeout: Duration, tick_interval: Duration) -> u16 {
    let ticks = timeout.as_millis() / tick_interval.as_millis().max(1);
    ticks.clamp(1, u16::MAX as u128) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_conversion_clamps() {
        let tick = Duration::from_millis(10);
        assert_eq!(ticks_for(Duration::from_secs(5), tick), 500);
        assert_eq!(ticks_for(Duration::from_millis(1), tick), 1);
        assert_eq!(ticks_for(Duration::from_secs(86400), tick), u16::MAX);
    }
}
