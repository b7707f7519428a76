use super::{Payload, DATA_LENGTH};
use crate::error::{Error, IncompleteFrames};

/// Joins the payloads of a multi-frame response into one data stream.
///
/// Every payload starts with a 1-based sequence id followed by 7 data bytes. The
/// frames may arrive in any order, but once sorted the ids have to be exactly
/// `1..=frame_count`. The result holds `7 * frame_count` bytes.
pub fn reassemble(payloads: &[Payload], frame_count: usize) -> Result<Vec<u8>, Error> {
    if payloads.len() != frame_count {
        log::warn!(
            "Invalid number of frames - expected={} received={}",
            frame_count,
            payloads.len()
        );
        return Err(IncompleteFrames::FrameCount {
            expected: frame_count,
            received: payloads.len(),
        }
        .into());
    }

    let mut sorted: Vec<&Payload> = payloads.iter().collect();
    sorted.sort_by_key(|payload| payload[0]);

    let mut data = Vec::with_capacity(frame_count * DATA_LENGTH);
    for (position, payload) in sorted.into_iter().enumerate() {
        // The Daly documentation claims ids start at 0, devices count from 1
        if usize::from(payload[0]) != position + 1 {
            log::warn!(
                "Frame out of order - expected={} received={}",
                position + 1,
                payload[0]
            );
            return Err(IncompleteFrames::SequenceGap {
                position,
                id: payload[0],
            }
            .into());
        }
        log::trace!("Frame #{} data={:02X?}", payload[0], &payload[1..]);
        data.extend_from_slice(&payload[1..]);
    }
    Ok(data)
}
