use updt_port::Port;
use updt_protocol::{Master, Packer, ProtocolConfig, SegmentSet, SessionResult};

use crate::{Result, boot::BUF_SIZE, image::Image, status, step};

/// Stream `image` to the device behind `port`.
pub fn run_master(port: Port, image: &Image, config: ProtocolConfig) -> Result<SessionResult> {
    config.validate()?;

    let segments = image.segments();
    let set = SegmentSet::new(&segments)?;
    let packer = Packer::new(set, config.max_payload_size)?;
    let mut master = Master::<_, BUF_SIZE>::new(port, packer)?.with_retries(config.send_retries);

    step!(
        "Sending {} segments ({} bytes) in payloads of up to {} bytes...",
        set.len(),
        set.total_size(),
        config.max_payload_size
    );
    Ok(status!(master.run_session())?)
}
