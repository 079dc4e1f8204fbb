use derive_more::IsVariant;
use log::{debug, error, info, trace};
use updt_port::Transport;

use crate::{
    Result, SessionResult, config::DEFAULT_SEND_RETRIES, err::Error, packer::Packer,
    payload::wire_size,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IsVariant)]
pub enum MasterState {
    /// Bound to a packer and a transport, nothing sent yet
    Init,
    Sending,
    Done,
    Failed,
}

/// Sending side of an update session.
///
/// Streams every payload of a [`Packer`] over the transport, one at a time, and finishes
/// after the end-of-stream marker has been sent. There is no acknowledgement channel:
/// `Done` means the whole stream was handed to the transport.
///
/// `N` is the size of the serialization buffer and must hold a payload of the packer's
/// maximum size plus framing.
pub struct Master<'a, T: Transport, const N: usize> {
    transport: T,
    packer: Packer<'a>,
    buf: [u8; N],
    retries: u8,
    state: MasterState,
}

impl<'a, T: Transport, const N: usize> Master<'a, T, N> {
    pub fn new(transport: T, packer: Packer<'a>) -> Result<Self> {
        let needed = wire_size(packer.max_payload_size() as usize);
        if N < needed {
            return Err(Error::BufferTooSmall {
                needed,
                available: N,
            });
        }

        Ok(Self {
            transport,
            packer,
            buf: [0; N],
            retries: DEFAULT_SEND_RETRIES,
            state: MasterState::Init,
        })
    }

    /// Zero-progress sends tolerated per payload before the session fails.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    /// Stream the whole image. A master runs a single session.
    pub fn run_session(&mut self) -> Result<SessionResult> {
        if !self.state.is_init() {
            return Err(Error::SessionOver);
        }

        info!("Starting update session");
        self.state = MasterState::Sending;
        debug!("Master: Init -> Sending");

        match self.send_payloads() {
            Ok(result) => {
                self.state = MasterState::Done;
                info!(
                    "transmission successful: {} payloads, {} image bytes",
                    result.payloads, result.image_bytes
                );
                Ok(result)
            }
            Err(e) => {
                self.state = MasterState::Failed;
                error!("transmission error: {e}");
                Err(e)
            }
        }
    }

    fn send_payloads(&mut self) -> Result<SessionResult> {
        let mut result = SessionResult::default();

        loop {
            let payload = self.packer.next_payload();
            let size = payload.serialize(&mut self.buf)?;

            self.transport.send_all(&self.buf[..size], self.retries)?;
            trace!("=> {payload}");
            result.record(&payload);

            if payload.is_end_of_stream() {
                return Ok(result);
            }
        }
    }

    /// Finish with the master and hand back the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}
