use std::{fs, path::Path, thread};

use log::debug;
use updt_port::{Loopback, loopback::DEFAULT_CAPACITY};
use updt_protocol::{
    Master, Packer, ProtocolConfig, Rebased, SegmentSet, SessionResult, UpdateService,
};

use crate::{Result, boot::BUF_SIZE, err::Error, image::Image, status, step};

/// Run a master and an update service on two threads joined by a loopback pair, then
/// check that the committed image matches `image`.
///
/// Flash is a RAM image starting at the lowest segment address. It is written to
/// `output` when given.
pub fn run_loopback(
    image: &Image,
    config: ProtocolConfig,
    output: Option<&Path>,
) -> Result<SessionResult> {
    config.validate()?;

    let segments = image.segments();
    let set = SegmentSet::new(&segments)?;
    let packer = Packer::new(set, config.max_payload_size)?;
    let mut service = UpdateService::<BUF_SIZE>::new(config.max_payload_size)?;
    let (master_end, mut slave_end) = Loopback::pair(DEFAULT_CAPACITY);
    let mut flash: Rebased<Vec<u8>> = Rebased::new(image.base(), Vec::new());

    step!(
        "Streaming {} segments ({} bytes) over loopback...",
        set.len(),
        set.total_size()
    );
    let (sent, written) = thread::scope(|s| {
        let master = s.spawn(move || {
            Master::<_, BUF_SIZE>::new(master_end, packer)?
                .with_retries(config.send_retries)
                .run_session()
        });

        let written = service.run_session(&mut slave_end, &mut flash);
        // Unblocks the master if the service gave up early
        drop(slave_end);

        (master.join(), written)
    });

    let written = status!(written)?;
    let sent = sent.map_err(|_| Error::Custom("master thread panicked".into()))??;
    debug!("sent {sent:?}, committed {written:?}");

    let base = flash.base();
    let flash = flash.into_inner();
    step!("Verifying {} bytes of flash from {base:#010x}...", flash.len());
    status!(image.verify(base, &flash))?;

    if let Some(path) = output {
        step!("Saving flash image to {}...", path.display());
        status!(fs::write(path, &flash))?;
    }

    Ok(written)
}
