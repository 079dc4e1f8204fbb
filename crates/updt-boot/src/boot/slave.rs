use std::{fs::OpenOptions, io::ErrorKind, path::Path};

use log::trace;
use updt_port::{Port, Transport, err::Error as PortError};
use updt_protocol::{ProtocolConfig, SessionResult, UpdateService};

use crate::{Result, boot::BUF_SIZE, status, step};

/// Transport that keeps waiting through read timeouts until the master sends its first
/// byte. Once the stream has started, timeouts fail the session as usual.
struct AwaitMaster<T> {
    inner: T,
    started: bool,
}

impl<T: Transport> AwaitMaster<T> {
    fn new(inner: T) -> Self {
        Self {
            inner,
            started: false,
        }
    }
}

impl<T: Transport> Transport for AwaitMaster<T> {
    fn send(&mut self, buf: &[u8]) -> updt_port::Result<usize> {
        self.inner.send(buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> updt_port::Result<usize> {
        loop {
            match self.inner.receive(buf) {
                Err(PortError::Io(e)) if !self.started && e.kind() == ErrorKind::TimedOut => {
                    trace!("no data from the master yet");
                }
                Ok(n) => {
                    self.started |= n > 0;
                    return Ok(n);
                }
                ret => return ret,
            }
        }
    }
}

/// Receive one image from `port` and commit it into the file or block device at `output`.
///
/// Waits for the master indefinitely; the port timeout applies once the stream has
/// started. Existing content outside the received segments is left untouched.
pub fn run_slave(port: Port, output: &Path, config: ProtocolConfig) -> Result<SessionResult> {
    config.validate()?;

    let mut flash = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(output)?;
    let mut service = UpdateService::<BUF_SIZE>::new(config.max_payload_size)?;
    let mut port = AwaitMaster::new(port);

    step!("Receiving into {}...", output.display());
    Ok(status!(service.run_session(&mut port, &mut flash))?)
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, io};

    use super::*;

    /// Replays scripted reads, one per call.
    struct Script(VecDeque<updt_port::Result<Vec<u8>>>);

    impl Transport for Script {
        fn send(&mut self, buf: &[u8]) -> updt_port::Result<usize> {
            Ok(buf.len())
        }

        fn receive(&mut self, buf: &mut [u8]) -> updt_port::Result<usize> {
            let bytes = self.0.pop_front().unwrap_or(Err(PortError::PeerClosed))?;
            buf[..bytes.len()].copy_from_slice(&bytes);
            Ok(bytes.len())
        }
    }

    fn timed_out() -> updt_port::Result<Vec<u8>> {
        Err(io::Error::from(ErrorKind::TimedOut).into())
    }

    #[test]
    fn idle_link_is_not_an_error_before_the_stream() {
        let mut port = AwaitMaster::new(Script(VecDeque::from([
            timed_out(),
            timed_out(),
            timed_out(),
            Ok(vec![1, 2]),
        ])));
        let mut buf = [0; 4];

        assert_eq!(port.receive(&mut buf).unwrap(), 2);
        assert_eq!(buf[..2], [1, 2]);
    }

    #[test]
    fn timeout_mid_stream_fails() {
        let mut port = AwaitMaster::new(Script(VecDeque::from([Ok(vec![1]), timed_out()])));
        let mut buf = [0; 4];

        port.receive(&mut buf).unwrap();
        assert!(matches!(port.receive(&mut buf), Err(PortError::Io(e)) if e.kind() == ErrorKind::TimedOut));
    }

    #[test]
    fn other_errors_pass_through_while_waiting() {
        let mut port = AwaitMaster::new(Script(VecDeque::new()));

        assert!(matches!(port.receive(&mut [0; 4]), Err(PortError::PeerClosed)));
    }
}
