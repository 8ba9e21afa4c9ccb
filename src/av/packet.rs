//! Packet data model
//!
//! A [`Packet`] is one demultiplexed media unit exchanged between demuxers,
//! the registry and muxers. Exactly one of `is_audio`, `is_video` and
//! `is_metadata` is set by the producer; the header variant follows the flag.

use bytes::Bytes;

/// FLV tag id for audio
pub const TAG_AUDIO: u8 = 0x08;
/// FLV tag id for video
pub const TAG_VIDEO: u8 = 0x09;
/// FLV tag id for AMF0 script data
pub const TAG_SCRIPT_DATA_AMF0: u8 = 0x12;

pub const SOUND_MP3: u8 = 0x02;
pub const SOUND_AAC: u8 = 0x0a;

pub const AAC_SEQ_HDR: u8 = 0x00;
pub const AAC_RAW: u8 = 0x01;

pub const VIDEO_H264: u8 = 0x07;

/// Audio tag header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHeader {
    /// Sound format (upper 4 bits of the first audio byte)
    pub sound_format: u8,
    /// AAC packet type (only meaningful for AAC)
    pub aac_packet_type: u8,
}

/// Video tag header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoHeader {
    pub is_key_frame: bool,
    pub is_sequence_header: bool,
    pub codec_id: u8,
    /// Composition time offset in milliseconds (pts - dts)
    pub composition_time: i32,
}

/// Codec header carried by a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketHeader {
    /// Raw or metadata packet
    #[default]
    None,
    Audio(AudioHeader),
    Video(VideoHeader),
}

/// One demultiplexed media unit
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub is_audio: bool,
    pub is_video: bool,
    pub is_metadata: bool,
    /// Decode timestamp in milliseconds
    pub timestamp: u32,
    /// Transport-level message stream id
    pub stream_id: u32,
    pub header: PacketHeader,
    /// Codec payload (zero-copy via reference counting)
    pub data: Bytes,
}

impl Packet {
    /// Create an audio packet without a parsed header
    pub fn audio(timestamp: u32, data: Bytes) -> Self {
        Self {
            is_audio: true,
            timestamp,
            data,
            ..Default::default()
        }
    }

    /// Create a video packet without a parsed header
    pub fn video(timestamp: u32, data: Bytes) -> Self {
        Self {
            is_video: true,
            timestamp,
            data,
            ..Default::default()
        }
    }

    /// Create a metadata packet
    pub fn metadata(data: Bytes) -> Self {
        Self {
            is_metadata: true,
            data,
            ..Default::default()
        }
    }

    /// Attach a parsed header
    pub fn with_header(mut self, header: PacketHeader) -> Self {
        self.header = header;
        self
    }

    /// Set the transport stream id
    pub fn with_stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// FLV tag id matching the packet's flags
    pub fn type_id(&self) -> u8 {
        if self.is_audio {
            TAG_AUDIO
        } else if self.is_video {
            TAG_VIDEO
        } else {
            TAG_SCRIPT_DATA_AMF0
        }
    }

    pub fn audio_header(&self) -> Option<&AudioHeader> {
        match &self.header {
            PacketHeader::Audio(h) => Some(h),
            _ => None,
        }
    }

    pub fn video_header(&self) -> Option<&VideoHeader> {
        match &self.header {
            PacketHeader::Video(h) => Some(h),
            _ => None,
        }
    }

    /// Video keyframe (sequence headers included)
    pub fn is_key_frame(&self) -> bool {
        self.video_header().map(|h| h.is_key_frame).unwrap_or(false)
    }

    /// AVC or AAC sequence header
    pub fn is_sequence_header(&self) -> bool {
        match &self.header {
            PacketHeader::Video(h) => h.is_sequence_header,
            PacketHeader::Audio(h) => h.sound_format == SOUND_AAC && h.aac_packet_type == AAC_SEQ_HDR,
            PacketHeader::None => false,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_one_flag() {
        let a = Packet::audio(10, Bytes::from_static(&[0xAF, 0x01]));
        assert!(a.is_audio && !a.is_video && !a.is_metadata);
        assert_eq!(a.type_id(), TAG_AUDIO);

        let v = Packet::video(20, Bytes::from_static(&[0x17, 0x01]));
        assert!(v.is_video && !v.is_audio && !v.is_metadata);
        assert_eq!(v.type_id(), TAG_VIDEO);

        let m = Packet::metadata(Bytes::from_static(b"onMetaData"));
        assert!(m.is_metadata && !m.is_audio && !m.is_video);
        assert_eq!(m.type_id(), TAG_SCRIPT_DATA_AMF0);
        assert_eq!(m.timestamp, 0);
    }

    #[test]
    fn test_header_absent_by_default() {
        let p = Packet::video(0, Bytes::new());
        assert_eq!(p.header, PacketHeader::None);
        assert!(p.video_header().is_none());
        assert!(!p.is_key_frame());
        assert!(!p.is_sequence_header());
    }

    #[test]
    fn test_sequence_header_detection() {
        let aac = Packet::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10])).with_header(
            PacketHeader::Audio(AudioHeader {
                sound_format: SOUND_AAC,
                aac_packet_type: AAC_SEQ_HDR,
            }),
        );
        assert!(aac.is_sequence_header());

        let mp3 = Packet::audio(0, Bytes::from_static(&[0x2F, 0x00])).with_header(
            PacketHeader::Audio(AudioHeader {
                sound_format: SOUND_MP3,
                aac_packet_type: 0,
            }),
        );
        assert!(!mp3.is_sequence_header());

        let avc = Packet::video(0, Bytes::from_static(&[0x17, 0x00])).with_header(
            PacketHeader::Video(VideoHeader {
                is_key_frame: true,
                is_sequence_header: true,
                codec_id: VIDEO_H264,
                composition_time: 0,
            }),
        );
        assert!(avc.is_sequence_header());
        assert!(avc.is_key_frame());
    }
}
