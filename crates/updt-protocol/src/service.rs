use derive_more::IsVariant;
use log::{debug, error, info, trace};
use updt_port::Transport;

use crate::{
    Result, SessionResult,
    err::Error,
    flash::FlashSink,
    payload::{HEADER_SIZE, Header, Payload, wire_size},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum ServiceState {
    /// Transport is open, nothing consumed yet
    WaitConnect,
    Receiving,
    Committing,
    Done,
    Failed,
}

/// Receiving side of an update session.
///
/// Reads payloads off the transport, verifies them and commits each body to the flash
/// sink at its target address, until the end-of-stream marker arrives. Any error ends the
/// session; bytes already committed stay in flash.
///
/// `N` is the size of the receive buffer and must hold a payload of `max_payload_size`
/// plus framing.
pub struct UpdateService<const N: usize> {
    buf: [u8; N],
    max_payload_size: u16,
    state: ServiceState,
}

impl<const N: usize> UpdateService<N> {
    pub fn new(max_payload_size: u16) -> Result<Self> {
        if max_payload_size == 0 {
            return Err(Error::InvalidConfig("payload size must be greater than zero"));
        }

        let needed = wire_size(max_payload_size as usize);
        if N < needed {
            return Err(Error::BufferTooSmall {
                needed,
                available: N,
            });
        }

        Ok(Self {
            buf: [0; N],
            max_payload_size,
            state: ServiceState::WaitConnect,
        })
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Receive and commit one image. A service instance runs a single session.
    pub fn run_session<T, F>(&mut self, transport: &mut T, flash: &mut F) -> Result<SessionResult>
    where
        T: Transport + ?Sized,
        F: FlashSink + ?Sized,
    {
        if !self.state.is_wait_connect() {
            return Err(Error::SessionOver);
        }

        info!("Waiting for update stream");
        match self.receive_payloads(transport, flash) {
            Ok(result) => {
                self.state = ServiceState::Done;
                info!(
                    "Update complete: {} payloads, {} bytes written",
                    result.payloads, result.image_bytes
                );
                Ok(result)
            }
            Err(e) => {
                debug!("Update service: {:?} -> Failed", self.state);
                self.state = ServiceState::Failed;
                error!("Update failed: {e}");
                Err(e)
            }
        }
    }

    fn receive_payloads<T, F>(&mut self, transport: &mut T, flash: &mut F) -> Result<SessionResult>
    where
        T: Transport + ?Sized,
        F: FlashSink + ?Sized,
    {
        let mut result = SessionResult::default();

        loop {
            self.state = ServiceState::Receiving;

            transport.receive_exact(&mut self.buf[..HEADER_SIZE])?;
            let header = Header::from_bytes(&self.buf)?;
            if header.length > self.max_payload_size {
                return Err(Error::MalformedHeader {
                    address: header.address,
                    length: header.length,
                });
            }

            let size = wire_size(header.length as usize);
            transport.receive_exact(&mut self.buf[HEADER_SIZE..size])?;
            let payload = Payload::deserialize(&self.buf[..size])?;
            trace!("<= {payload}");

            if payload.is_end_of_stream() {
                result.record(&payload);
                return Ok(result);
            }

            self.state = ServiceState::Committing;
            flash
                .write(payload.address(), payload.body())
                .map_err(|source| Error::FlashWrite {
                    address: payload.address(),
                    source,
                })?;
            result.record(&payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::FlashError;

    /// Replays a fixed byte stream, then reports the peer as gone.
    struct Replay {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Replay {
        fn new(payloads: &[Payload]) -> Self {
            let mut bytes = Vec::new();
            for payload in payloads {
                let mut buf = vec![0; payload.wire_size()];
                payload.serialize(&mut buf).unwrap();
                bytes.extend_from_slice(&buf);
            }
            Self { bytes, pos: 0 }
        }
    }

    impl Transport for Replay {
        fn send(&mut self, buf: &[u8]) -> updt_port::Result<usize> {
            Ok(buf.len())
        }

        fn receive(&mut self, buf: &mut [u8]) -> updt_port::Result<usize> {
            let rest = &self.bytes[self.pos..];
            if rest.is_empty() {
                return Err(updt_port::err::Error::PeerClosed);
            }
            let n = rest.len().min(buf.len()).min(3);
            buf[..n].copy_from_slice(&rest[..n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct ReadOnly;

    impl FlashSink for ReadOnly {
        fn write(&mut self, _: u32, _: &[u8]) -> core::result::Result<(), FlashError> {
            Err(FlashError::Device("write protected"))
        }
    }

    #[test]
    fn buffer_must_fit_a_full_payload() {
        assert!(matches!(
            UpdateService::<71>::new(64),
            Err(Error::BufferTooSmall { needed: 72, .. })
        ));
        assert!(matches!(
            UpdateService::<72>::new(0),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn commits_bodies_at_their_addresses() {
        let mut transport = Replay::new(&[
            Payload::new(4, &[1, 2, 3]).unwrap(),
            Payload::new(0, &[9, 9]).unwrap(),
            Payload::end_of_stream(7),
        ]);
        let mut flash = [0u8; 8];
        let mut service = UpdateService::<16>::new(8).unwrap();

        let result = service.run_session(&mut transport, &mut flash[..]).unwrap();
        assert!(service.state().is_done());
        assert_eq!(result.payloads, 2);
        assert_eq!(result.image_bytes, 5);
        assert_eq!(flash, [9, 9, 0, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn oversized_length_is_malformed() {
        let mut transport = Replay::new(&[Payload::new(0x20, &[0; 12]).unwrap()]);
        let mut flash = [0u8; 64];
        let mut service = UpdateService::<32>::new(8).unwrap();

        let err = service
            .run_session(&mut transport, &mut flash[..])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedHeader {
                address: 0x20,
                length: 12
            }
        ));
        assert!(err.kind().is_protocol());
        assert!(service.state().is_failed());
    }

    #[test]
    fn flash_failure_carries_address() {
        let mut transport = Replay::new(&[
            Payload::new(0x80, &[1]).unwrap(),
            Payload::end_of_stream(0x81),
        ]);
        let mut service = UpdateService::<16>::new(8).unwrap();

        let err = service
            .run_session(&mut transport, &mut ReadOnly)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FlashWrite {
                address: 0x80,
                source: FlashError::Device(_)
            }
        ));
        assert!(err.kind().is_flash());
    }

    #[test]
    fn missing_marker_ends_with_peer_closed() {
        let mut transport = Replay::new(&[Payload::new(0, &[5; 4]).unwrap()]);
        let mut flash = [0u8; 4];
        let mut service = UpdateService::<16>::new(8).unwrap();

        let err = service
            .run_session(&mut transport, &mut flash[..])
            .unwrap_err();
        assert!(err.is_peer_closed());
        assert_eq!(flash, [5; 4]);
    }
}
