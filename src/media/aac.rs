//! AAC codec parser
//!
//! RTMP transports AAC without ADTS headers. [`AacParser`] keeps the
//! AudioSpecificConfig from the sequence header and re-frames raw AAC packets
//! as ADTS for sinks that need self-describing frames.
//!
//! AACPacketType:
//! - 0: AAC sequence header (AudioSpecificConfig)
//! - 1: AAC raw frame data

use std::io;

use bytes::Bytes;

use crate::av::packet::{AAC_RAW, AAC_SEQ_HDR, SOUND_AAC};
use crate::av::{CodecParser, Packet, SampleRater};
use crate::error::{Error, MediaError, Result};

/// Bytes in front of the AAC payload: sound format byte and packet type
const AAC_TAG_PREFIX: usize = 2;

/// AudioSpecificConfig (from sequence header)
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    /// Audio object type (profile)
    pub audio_object_type: u8,
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, etc.)
    pub channel_configuration: u8,
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    const SAMPLING_FREQUENCIES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    /// Parse from the bytes following the AAC packet type
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket.into());
        }

        // audioObjectType: 5 bits, samplingFrequencyIndex: 4 bits,
        // channelConfiguration: 4 bits
        let b0 = data[0];
        let b1 = data[1];

        let audio_object_type = (b0 >> 3) & 0x1F;
        let sampling_frequency_index = ((b0 & 0x07) << 1) | ((b1 >> 7) & 0x01);
        let sampling_frequency = *Self::SAMPLING_FREQUENCIES
            .get(sampling_frequency_index as usize)
            .ok_or(MediaError::InvalidAacPacket)?;
        let channel_configuration = (b1 >> 3) & 0x0F;

        Ok(Self {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            raw: data,
        })
    }

    /// 7-byte ADTS header (no CRC) for a raw frame of `frame_length` bytes
    pub fn adts_header(&self, frame_length: usize) -> [u8; 7] {
        let profile = self.audio_object_type.saturating_sub(1);
        let freq_idx = self.sampling_frequency_index;
        let channels = self.channel_configuration;
        let frame_len = frame_length + 7;

        let mut header = [0u8; 7];
        header[0] = 0xFF;
        header[1] = 0xF1;
        header[2] = ((profile & 0x03) << 6) | ((freq_idx & 0x0F) << 2) | ((channels >> 2) & 0x01);
        header[3] = ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8;
        header[4] = ((frame_len >> 3) & 0xFF) as u8;
        header[5] = (((frame_len & 0x07) << 5) | 0x1F) as u8;
        header[6] = 0xFC;
        header
    }
}

/// Codec parser for AAC audio packets
#[derive(Debug, Default)]
pub struct AacParser {
    config: Option<AudioSpecificConfig>,
}

impl AacParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&AudioSpecificConfig> {
        self.config.as_ref()
    }
}

impl SampleRater for AacParser {
    fn sample_rate(&self) -> Result<u32> {
        self.config
            .as_ref()
            .map(|c| c.sampling_frequency)
            .ok_or_else(|| MediaError::MissingAacConfig.into())
    }
}

impl CodecParser for AacParser {
    /// Sequence headers update the stored config; raw frames are written to
    /// `sink` as ADTS frames.
    fn parse(&mut self, packet: &mut Packet, sink: &mut dyn io::Write) -> Result<()> {
        let header = packet
            .audio_header()
            .copied()
            .ok_or_else(|| Error::UnsupportedCodec("not an audio packet".into()))?;
        if header.sound_format != SOUND_AAC {
            return Err(Error::UnsupportedCodec(format!(
                "sound format {}",
                header.sound_format
            )));
        }
        if packet.data.len() < AAC_TAG_PREFIX {
            return Err(MediaError::InvalidAacPacket.into());
        }

        let payload = packet.data.slice(AAC_TAG_PREFIX..);
        match header.aac_packet_type {
            AAC_SEQ_HDR => {
                let config = AudioSpecificConfig::parse(payload)?;
                tracing::debug!(
                    sample_rate = config.sampling_frequency,
                    channels = config.channel_configuration,
                    "AAC config updated"
                );
                self.config = Some(config);
                Ok(())
            }
            AAC_RAW => {
                let config = self.config.as_ref().ok_or(MediaError::MissingAacConfig)?;
                sink.write_all(&config.adts_header(payload.len()))?;
                sink.write_all(&payload)?;
                Ok(())
            }
            _ => Err(MediaError::InvalidAacPacket.into()),
        }
    }
}
