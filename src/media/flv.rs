//! FLV tag demuxing and muxing
//!
//! RTMP audio/video messages are FLV tag bodies without the 11-byte tag
//! header. [`FlvDemuxer`] parses the codec header bytes at the front of the
//! body into a [`PacketHeader`]; [`FlvMuxer`] writes packets back out as a
//! complete FLV byte stream.
//!
//! RTMP Video Data:
//! ```text
//! +----------+----------+------------+-------------------+
//! | FrameType| CodecID  | AVCPktType | CompositionTime   | CodecData...
//! | (4 bits) | (4 bits) | (1 byte)   | (3 bytes, signed) |
//! +----------+----------+------------+-------------------+
//! ```
//!
//! RTMP Audio Data:
//! ```text
//! +-----------+----------+----------+----------+---------+
//! |SoundFormat|SoundRate |SoundSize |SoundType | AACType | AudioData...
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  | (1 byte)|
//! +-----------+----------+----------+----------+---------+
//! ```

use std::io;

use bytes::{BufMut, BytesMut};

use crate::av::packet::{TAG_AUDIO, TAG_SCRIPT_DATA_AMF0, TAG_VIDEO};
use crate::av::{AudioHeader, Demuxer, Muxer, Packet, PacketHeader, VideoHeader};
use crate::error::{Error, MediaError, Result};

/// FLV file header followed by the first (zero) previous-tag-size
const FLV_FILE_HEADER: [u8; 13] = [
    b'F', b'L', b'V', 0x01, 0x05, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00,
];

const TAG_HEADER_LEN: usize = 11;

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe = 1,
    InterFrame = 2,
    DisposableInterFrame = 3,
    GeneratedKeyframe = 4,
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(
            self,
            VideoFrameType::Keyframe | VideoFrameType::GeneratedKeyframe
        )
    }
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    SorensonH263 = 2,
    ScreenVideo = 3,
    Vp6 = 4,
    Vp6Alpha = 5,
    ScreenVideoV2 = 6,
    Avc = 7,
    /// HEVC (H.265) - enhanced RTMP extension
    Hevc = 12,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            _ => None,
        }
    }

    /// Codecs whose body carries a packet type and composition time
    fn has_avc_header(&self) -> bool {
        matches!(self, VideoCodec::Avc | VideoCodec::Hevc)
    }
}

/// Audio format (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    LinearPcmPlatform = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLe = 3,
    Nellymoser16kMono = 4,
    Nellymoser8kMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
    Mp38k = 14,
    DeviceSpecific = 15,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            4 => Some(AudioFormat::Nellymoser16kMono),
            5 => Some(AudioFormat::Nellymoser8kMono),
            6 => Some(AudioFormat::Nellymoser),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            14 => Some(AudioFormat::Mp38k),
            15 => Some(AudioFormat::DeviceSpecific),
            _ => None,
        }
    }
}

fn require(data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(MediaError::TruncatedTag {
            needed,
            available: data.len(),
        }
        .into());
    }
    Ok(())
}

/// Parses FLV audio/video tag bodies into packet headers
///
/// The payload is left untouched; only `header` is filled in.
#[derive(Debug, Default)]
pub struct FlvDemuxer;

impl FlvDemuxer {
    pub fn new() -> Self {
        Self
    }

    fn audio_header(data: &[u8]) -> Result<AudioHeader> {
        require(data, 1)?;
        let sound_format = (data[0] >> 4) & 0x0F;

        let aac_packet_type = if AudioFormat::from_byte(data[0]) == Some(AudioFormat::Aac) {
            require(data, 2)?;
            data[1]
        } else {
            0
        };

        Ok(AudioHeader {
            sound_format,
            aac_packet_type,
        })
    }

    fn video_header(data: &[u8]) -> Result<VideoHeader> {
        require(data, 1)?;
        let frame_type = VideoFrameType::from_byte(data[0]);
        let codec_id = data[0] & 0x0F;

        let (is_sequence_header, composition_time) = match VideoCodec::from_byte(data[0]) {
            Some(codec) if codec.has_avc_header() => {
                require(data, 5)?;
                let raw = ((data[2] as u32) << 16) | ((data[3] as u32) << 8) | data[4] as u32;
                // Sign-extend the 24-bit composition time
                let cts = ((raw << 8) as i32) >> 8;
                (data[1] == 0, cts)
            }
            _ => (false, 0),
        };

        Ok(VideoHeader {
            is_key_frame: frame_type.map(|ft| ft.is_keyframe()).unwrap_or(false),
            is_sequence_header,
            codec_id,
            composition_time,
        })
    }
}

impl Demuxer for FlvDemuxer {
    fn demux(&mut self, mut raw: Packet) -> Result<Packet> {
        raw.header = if raw.is_audio {
            PacketHeader::Audio(Self::audio_header(&raw.data)?)
        } else if raw.is_video {
            PacketHeader::Video(Self::video_header(&raw.data)?)
        } else {
            PacketHeader::None
        };
        Ok(raw)
    }
}

/// Writes packets as an FLV byte stream
#[derive(Debug, Default)]
pub struct FlvMuxer {
    header_written: bool,
}

impl FlvMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_codec(packet: &Packet) -> Result<()> {
        match &packet.header {
            PacketHeader::Audio(h) if AudioFormat::from_byte(h.sound_format << 4).is_none() => Err(
                Error::UnsupportedCodec(format!("sound format {}", h.sound_format)),
            ),
            PacketHeader::Video(h) if VideoCodec::from_byte(h.codec_id).is_none() => Err(
                Error::UnsupportedCodec(format!("video codec id {}", h.codec_id)),
            ),
            _ => Ok(()),
        }
    }
}

impl Muxer for FlvMuxer {
    fn mux(&mut self, packet: &Packet, sink: &mut dyn io::Write) -> Result<()> {
        Self::check_codec(packet)?;

        let tag_type = if packet.is_audio {
            TAG_AUDIO
        } else if packet.is_video {
            TAG_VIDEO
        } else {
            TAG_SCRIPT_DATA_AMF0
        };

        let data_len = packet.data.len();
        if data_len > 0x00FF_FFFF {
            return Err(Error::WriteFailure(format!("tag body of {} bytes", data_len)));
        }

        let mut buf = BytesMut::with_capacity(FLV_FILE_HEADER.len() + TAG_HEADER_LEN + data_len + 4);
        if !self.header_written {
            buf.put_slice(&FLV_FILE_HEADER);
        }

        let ts = packet.timestamp;
        buf.put_u8(tag_type);
        buf.put_uint(data_len as u64, 3);
        buf.put_uint((ts & 0x00FF_FFFF) as u64, 3);
        buf.put_u8((ts >> 24) as u8);
        buf.put_uint(0, 3);
        buf.put_slice(&packet.data);
        buf.put_u32((TAG_HEADER_LEN + data_len) as u32);

        sink.write_all(&buf)?;
        self.header_written = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::av::packet::{AAC_SEQ_HDR, SOUND_AAC, SOUND_MP3, VIDEO_H264};

    #[test]
    fn test_video_frame_type() {
        assert_eq!(
            VideoFrameType::from_byte(0x17),
            Some(VideoFrameType::Keyframe)
        );
        assert_eq!(VideoCodec::from_byte(0x17), Some(VideoCodec::Avc));
        assert_eq!(
            VideoFrameType::from_byte(0x27),
            Some(VideoFrameType::InterFrame)
        );
        assert_eq!(VideoFrameType::from_byte(0x00), None);
        assert!(VideoFrameType::GeneratedKeyframe.is_keyframe());
        assert!(!VideoFrameType::DisposableInterFrame.is_keyframe());
    }

    #[test]
    fn test_audio_format_values() {
        assert_eq!(AudioFormat::from_byte(0xAF), Some(AudioFormat::Aac));
        assert_eq!(AudioFormat::from_byte(0x2F), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_byte(0x90), None);
    }

    #[test]
    fn test_demux_avc_sequence_header() {
        let raw = Packet::video(0, Bytes::from_static(&[0x17, 0x00, 0x00, 0x00, 0x00, 0x01]));
        let packet = FlvDemuxer::new().demux(raw).unwrap();

        let header = packet.video_header().unwrap();
        assert!(header.is_key_frame);
        assert!(header.is_sequence_header);
        assert_eq!(header.codec_id, VIDEO_H264);
        assert_eq!(header.composition_time, 0);
        assert_eq!(packet.size(), 6);
    }

    #[test]
    fn test_demux_composition_time_sign() {
        let positive = Packet::video(0, Bytes::from_static(&[0x27, 0x01, 0x00, 0x00, 0x42]));
        let header = *FlvDemuxer::new().demux(positive).unwrap().video_header().unwrap();
        assert!(!header.is_key_frame);
        assert!(!header.is_sequence_header);
        assert_eq!(header.composition_time, 0x42);

        let negative = Packet::video(0, Bytes::from_static(&[0x27, 0x01, 0xFF, 0xFF, 0xFE]));
        let header = *FlvDemuxer::new().demux(negative).unwrap().video_header().unwrap();
        assert_eq!(header.composition_time, -2);
    }

    #[test]
    fn test_demux_audio() {
        let aac = Packet::audio(0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]));
        let packet = FlvDemuxer::new().demux(aac).unwrap();
        let header = packet.audio_header().unwrap();
        assert_eq!(header.sound_format, SOUND_AAC);
        assert_eq!(header.aac_packet_type, AAC_SEQ_HDR);
        assert!(packet.is_sequence_header());

        let mp3 = Packet::audio(0, Bytes::from_static(&[0x2F]));
        let packet = FlvDemuxer::new().demux(mp3).unwrap();
        assert_eq!(packet.audio_header().unwrap().sound_format, SOUND_MP3);
    }

    #[test]
    fn test_demux_truncated_input_is_malformed() {
        let mut demuxer = FlvDemuxer::new();

        let empty = demuxer.demux(Packet::video(0, Bytes::new()));
        assert!(matches!(empty, Err(Error::MalformedInput(_))));

        let short_avc = demuxer.demux(Packet::video(0, Bytes::from_static(&[0x17, 0x01])));
        assert!(matches!(short_avc, Err(Error::MalformedInput(_))));

        let short_aac = demuxer.demux(Packet::audio(0, Bytes::from_static(&[0xAF])));
        assert!(matches!(short_aac, Err(Error::MalformedInput(_))));
    }

    #[test]
    fn test_demux_metadata_has_no_header() {
        let packet = FlvDemuxer::new()
            .demux(Packet::metadata(Bytes::from_static(b"\x02\x00\x0aonMetaData")))
            .unwrap();
        assert_eq!(packet.header, PacketHeader::None);
    }

    #[test]
    fn test_mux_writes_file_header_once() {
        let mut muxer = FlvMuxer::new();
        let mut out = Vec::new();

        let packet = Packet::video(0x0102_0304, Bytes::from_static(&[0x17, 0x01]));
        muxer.mux(&packet, &mut out).unwrap();
        assert_eq!(&out[..3], b"FLV");
        assert_eq!(out.len(), 13 + 11 + 2 + 4);

        let tag = &out[13..];
        assert_eq!(tag[0], TAG_VIDEO);
        assert_eq!(&tag[1..4], &[0x00, 0x00, 0x02]);
        assert_eq!(&tag[4..7], &[0x02, 0x03, 0x04]);
        assert_eq!(tag[7], 0x01);
        assert_eq!(&tag[11..13], &[0x17, 0x01]);
        assert_eq!(&tag[13..17], &13u32.to_be_bytes());

        let first_len = out.len();
        muxer.mux(&Packet::audio(5, Bytes::from_static(&[0xAF, 0x01])), &mut out).unwrap();
        assert_eq!(out.len() - first_len, 11 + 2 + 4);
        assert_eq!(out[first_len], TAG_AUDIO);
    }

    #[test]
    fn test_mux_rejects_unknown_codec() {
        let packet = Packet::video(0, Bytes::from_static(&[0x19])).with_header(PacketHeader::Video(
            VideoHeader {
                is_key_frame: true,
                is_sequence_header: false,
                codec_id: 9,
                composition_time: 0,
            },
        ));
        let mut out = Vec::new();
        let result = FlvMuxer::new().mux(&packet, &mut out);
        assert!(matches!(result, Err(Error::UnsupportedCodec(_))));
        assert!(out.is_empty());
    }

    struct BrokenSink;

    impl io::Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_mux_sink_failure() {
        let result = FlvMuxer::new().mux(&Packet::audio(0, Bytes::from_static(&[0x2F])), &mut BrokenSink);
        assert!(matches!(result, Err(Error::WriteFailure(_))));
    }
}
