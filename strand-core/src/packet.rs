//! Demuxed elementary-stream packet.
//!
//! A `Packet` is the unit of work a demuxer produces and a decoder
//! consumes. The queue never looks inside `data`; it only accounts for
//! its length.

use crate::packet_queue::{Payload, QueueError};

/// One compressed packet from a container stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Index of the stream this packet belongs to
    pub stream_index: u32,
    /// Presentation timestamp (microseconds)
    pub pts_us: Option<i64>,
    /// Decode timestamp (microseconds)
    pub dts_us: Option<i64>,
    /// Does this packet start a keyframe?
    pub keyframe: bool,
    /// Compressed payload
    pub data: Vec<u8>,
}

impl Packet {
    /// Create a packet taking ownership of an existing buffer.
    pub fn new(stream_index: u32, data: Vec<u8>) -> Self {
        Self {
            stream_index,
            pts_us: None,
            dts_us: None,
            keyframe: false,
            data,
        }
    }

    /// Create a packet by copying a borrowed buffer.
    ///
    /// Demuxers that reuse their read buffer go through here. The copy is
    /// the only allocation the transport path performs, and it is fallible:
    /// an allocation failure is reported instead of aborting.
    pub fn from_slice(stream_index: u32, data: &[u8]) -> Result<Self, QueueError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(data.len())
            .map_err(|_| QueueError::AllocationFailed)?;
        buf.extend_from_slice(data);
        Ok(Self::new(stream_index, buf))
    }

    /// Set presentation/decode timestamps.
    pub fn with_timing(mut self, pts_us: i64, dts_us: i64) -> Self {
        self.pts_us = Some(pts_us);
        self.dts_us = Some(dts_us);
        self
    }

    /// Mark this packet as the start of a keyframe.
    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Payload for Packet {
    fn byte_len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_copies() {
        let src = vec![1u8, 2, 3, 4];
        let pkt = Packet::from_slice(7, &src).unwrap();
        assert_eq!(pkt.stream_index, 7);
        assert_eq!(pkt.data, src);
        assert_eq!(pkt.len(), 4);
        assert!(!pkt.keyframe);
        assert!(pkt.pts_us.is_none());
    }

    #[test]
    fn test_timing_builder() {
        let pkt = Packet::new(0, vec![0; 16])
            .with_timing(33_333, 16_666)
            .with_keyframe(true);
        assert_eq!(pkt.pts_us, Some(33_333));
        assert_eq!(pkt.dts_us, Some(16_666));
        assert!(pkt.keyframe);
        assert_eq!(pkt.byte_len(), 16);
    }
}
