//! Synthetic decode-order streams.

use vdq_common::Pts;

/// A compressed frame as a demuxer would hand it out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessUnit {
    /// Position in display order.
    pub display_index: u64,
    pub pts: Pts,
    pub data: Vec<u8>,
}

const PREALLOC_LIMIT: usize = 1 << 16;

/// Display indices of `frame_count` frames in decode order, with up to
/// `b_frames` bidirectional frames between each pair of anchors.
///
/// With two B-frames: `0 3 1 2 6 4 5 ...`.
pub fn decode_order(frame_count: u64, b_frames: u64) -> Vec<u64> {
    let capacity = usize::try_from(frame_count).map_or(PREALLOC_LIMIT, |n| n.min(PREALLOC_LIMIT));
    let mut order = Vec::with_capacity(capacity);
    if frame_count == 0 {
        return order;
    }

    order.push(0);
    let mut next: u64 = 1;
    while next < frame_count {
        let anchor = next.saturating_add(b_frames).min(frame_count - 1);
        order.push(anchor);
        order.extend(next..anchor);
        next = anchor + 1;
    }
    order
}

/// Build the access units for a stream, in decode order.
pub fn synthesize(frame_count: u64, b_frames: u64, frame_duration: Pts) -> Vec<AccessUnit> {
    decode_order(frame_count, b_frames)
        .into_iter()
        .map(|display_index| AccessUnit {
            display_index,
            pts: display_index as Pts * frame_duration,
            data: display_index.to_be_bytes().to_vec(),
        })
        .collect()
}
