//! GOP (Group of Pictures) cache for late-joiner support
//!
//! When a new subscriber attaches to a live stream, it needs to receive:
//! 1. The metadata packet
//! 2. The sequence headers (SPS/PPS for video, AudioSpecificConfig for audio)
//! 3. The most recent keyframe and every packet since it
//!
//! so its decoder can start without waiting for the next keyframe.

use std::collections::VecDeque;

use crate::av::Packet;

/// Cache of the packets a late joiner needs
#[derive(Debug)]
pub struct GopCache {
    /// Maximum size of buffered GOP packets in bytes
    max_size: usize,
    current_size: usize,
    metadata: Option<Packet>,
    video_header: Option<Packet>,
    audio_header: Option<Packet>,
    /// Packets since the last keyframe, keyframe first
    frames: VecDeque<Packet>,
    has_complete_gop: bool,
}

impl GopCache {
    /// Create a cache with default max size (4MB)
    pub fn new() -> Self {
        Self::with_max_size(4 * 1024 * 1024)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            current_size: 0,
            metadata: None,
            video_header: None,
            audio_header: None,
            frames: VecDeque::new(),
            has_complete_gop: false,
        }
    }

    /// Classify and cache one packet
    ///
    /// Packets before the first keyframe are not cached; a new keyframe
    /// replaces the current GOP. Returns false when the packet was dropped
    /// because it does not fit.
    pub fn push(&mut self, packet: &Packet) -> bool {
        if packet.is_metadata {
            self.metadata = Some(packet.clone());
            return true;
        }
        if packet.is_sequence_header() {
            if packet.is_video {
                self.video_header = Some(packet.clone());
            } else {
                self.audio_header = Some(packet.clone());
            }
            return true;
        }

        if packet.is_video && packet.is_key_frame() {
            self.clear_frames();
            self.has_complete_gop = true;
        }
        if !self.has_complete_gop {
            return false;
        }

        let size = packet.size();
        if self.current_size + size > self.max_size {
            // Over budget: the GOP is no longer usable for catch-up
            tracing::debug!(
                cached = self.current_size,
                incoming = size,
                max = self.max_size,
                "GOP cache overflow, waiting for next keyframe"
            );
            self.clear_frames();
            return false;
        }

        self.frames.push_back(packet.clone());
        self.current_size += size;
        true
    }

    /// Drop buffered GOP packets but keep headers and metadata
    pub fn clear_frames(&mut self) {
        self.frames.clear();
        self.current_size = 0;
        self.has_complete_gop = false;
    }

    /// Drop everything, used when a new publisher takes over
    pub fn clear(&mut self) {
        self.clear_frames();
        self.metadata = None;
        self.video_header = None;
        self.audio_header = None;
    }

    pub fn has_complete_gop(&self) -> bool {
        self.has_complete_gop
    }

    /// Metadata, sequence headers, then the current GOP
    pub fn catchup(&self) -> Vec<Packet> {
        let mut result = Vec::with_capacity(self.frames.len() + 3);
        result.extend(self.metadata.iter().cloned());
        result.extend(self.video_header.iter().cloned());
        result.extend(self.audio_header.iter().cloned());
        result.extend(self.frames.iter().cloned());
        result
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Buffered GOP size in bytes
    pub fn size(&self) -> usize {
        self.current_size
    }
}

impl Default for GopCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::av::{Demuxer, PacketHeader};
    use crate::media::flv::FlvDemuxer;

    fn video(timestamp: u32, is_keyframe: bool, size: usize) -> Packet {
        let mut data = vec![0u8; size.max(5)];
        data[0] = if is_keyframe { 0x17 } else { 0x27 };
        data[1] = 0x01;
        FlvDemuxer::new()
            .demux(Packet::video(timestamp, Bytes::from(data)))
            .unwrap()
    }

    fn video_header() -> Packet {
        FlvDemuxer::new()
            .demux(Packet::video(0, Bytes::from_static(&[0x17, 0x00, 0x00, 0x00, 0x00])))
            .unwrap()
    }

    fn audio_header() -> Packet {
        FlvDemuxer::new()
            .demux(Packet::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10])))
            .unwrap()
    }

    fn audio(timestamp: u32) -> Packet {
        FlvDemuxer::new()
            .demux(Packet::audio(timestamp, Bytes::from_static(&[0xAF, 0x01, 0x21])))
            .unwrap()
    }

    #[test]
    fn test_frames_before_keyframe_are_skipped() {
        let mut cache = GopCache::new();
        assert!(!cache.push(&video(0, false, 100)));
        assert!(!cache.push(&audio(10)));
        assert_eq!(cache.frame_count(), 0);

        assert!(cache.push(&video(33, true, 100)));
        assert!(cache.push(&audio(40)));
        assert!(cache.has_complete_gop());
        assert_eq!(cache.frame_count(), 2);
    }

    #[test]
    fn test_keyframe_starts_new_gop() {
        let mut cache = GopCache::new();
        cache.push(&video(0, true, 100));
        cache.push(&video(33, false, 100));
        cache.push(&video(66, false, 100));
        assert_eq!(cache.frame_count(), 3);

        cache.push(&video(100, true, 100));
        assert_eq!(cache.frame_count(), 1);
        assert_eq!(cache.size(), 100);
    }

    #[test]
    fn test_catchup_order() {
        let mut cache = GopCache::new();
        cache.push(&Packet::metadata(Bytes::from_static(b"meta")));
        cache.push(&video_header());
        cache.push(&audio_header());
        cache.push(&video(0, true, 100));
        cache.push(&audio(10));
        cache.push(&video(33, false, 50));

        let catchup = cache.catchup();
        assert_eq!(catchup.len(), 6);
        assert!(catchup[0].is_metadata);
        assert!(catchup[1].is_video && catchup[1].is_sequence_header());
        assert!(catchup[2].is_audio && catchup[2].is_sequence_header());
        assert!(catchup[3].is_key_frame());
        assert!(catchup[4].is_audio);
        assert_eq!(catchup[5].timestamp, 33);
    }

    #[test]
    fn test_overflow_drops_gop_until_next_keyframe() {
        let mut cache = GopCache::with_max_size(250);
        cache.push(&video(0, true, 100));
        cache.push(&video(33, false, 100));
        assert!(!cache.push(&video(66, false, 100)));
        assert_eq!(cache.frame_count(), 0);
        assert!(!cache.has_complete_gop());

        assert!(!cache.push(&video(99, false, 10)));
        assert!(cache.push(&video(133, true, 100)));
        assert_eq!(cache.frame_count(), 1);
    }

    #[test]
    fn test_clear_keeps_nothing() {
        let mut cache = GopCache::default();
        cache.push(&video_header());
        cache.push(&Packet::metadata(Bytes::from_static(b"meta")));
        cache.push(&video(0, true, 100));

        cache.clear_frames();
        assert_eq!(cache.catchup().len(), 2);

        cache.clear();
        assert!(cache.catchup().is_empty());
    }

    #[test]
    fn test_headerless_packets_are_treated_as_frames() {
        let mut cache = GopCache::new();
        let raw = Packet::video(0, Bytes::from_static(&[0x17])).with_header(PacketHeader::None);
        // Without a parsed header the packet cannot start a GOP
        assert!(!cache.push(&raw));
    }
}
