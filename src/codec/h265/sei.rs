//! SEI (Supplemental Enhancement Information) messages
//!
//! Only the messages the decoder consumes are decoded: picture timing
//! (pic_struct, source scan type, duplicate flag) and the recovery point.
//! All other payloads are framed and skipped.

use super::bitstream::BitstreamReader;
use super::headers::Sps;
use super::nal::{NalUnit, NalUnitType};
use crate::error::{Error, Result};

/// payloadType values
pub const SEI_BUFFERING_PERIOD: u32 = 0;
pub const SEI_PIC_TIMING: u32 = 1;
pub const SEI_RECOVERY_POINT: u32 = 6;

/// pic_struct interpretation (Table D.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicStruct {
    Frame = 0,
    TopField = 1,
    BottomField = 2,
    TopBottom = 3,
    BottomTop = 4,
    TopBottomTop = 5,
    BottomTopBottom = 6,
    FrameDoubling = 7,
    FrameTripling = 8,
    TopPairedPreviousBottom = 9,
    BottomPairedPreviousTop = 10,
    TopPairedNextBottom = 11,
    BottomPairedNextTop = 12,
}

impl PicStruct {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Frame,
            1 => Self::TopField,
            2 => Self::BottomField,
            3 => Self::TopBottom,
            4 => Self::BottomTop,
            5 => Self::TopBottomTop,
            6 => Self::BottomTopBottom,
            7 => Self::FrameDoubling,
            8 => Self::FrameTripling,
            9 => Self::TopPairedPreviousBottom,
            10 => Self::BottomPairedPreviousTop,
            11 => Self::TopPairedNextBottom,
            12 => Self::BottomPairedNextTop,
            _ => return None,
        })
    }
}

/// pic_timing()
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PicTiming {
    pub pic_struct: u8,
    pub source_scan_type: u8,
    pub duplicate_flag: bool,
    pub au_cpb_removal_delay_minus1: u32,
    pub pic_dpb_output_delay: u32,
    pub pic_dpb_output_du_delay: u32,
    pub num_decoding_units_minus1: u32,
    pub du_common_cpb_removal_delay_flag: bool,
    pub du_common_cpb_removal_delay_increment_minus1: u32,
    pub num_nalus_in_du_minus1: Vec<u32>,
    pub du_cpb_removal_delay_increment_minus1: Vec<u32>,
}

impl PicTiming {
    /// Parse pic_timing() against the most recently received SPS
    pub fn parse(reader: &mut BitstreamReader, sps: &Sps) -> Result<Self> {
        let ptl = &sps.profile_tier_level;
        let mut timing = PicTiming {
            source_scan_type: default_source_scan_type(
                ptl.general_progressive_source_flag,
                ptl.general_interlaced_source_flag,
            ),
            ..Default::default()
        };

        let vui = match &sps.vui {
            Some(vui) => vui,
            None => return Ok(timing),
        };

        if vui.frame_field_info_present_flag {
            timing.pic_struct = reader.read_u8(4)?;
            timing.source_scan_type = reader.read_u8(2)?;
            timing.duplicate_flag = reader.read_bool()?;
        }

        if let Some(hrd) = &vui.hrd_parameters {
            timing.au_cpb_removal_delay_minus1 =
                reader.read_bits(hrd.au_cpb_removal_delay_length_minus1 as u32 + 1)?;
            timing.pic_dpb_output_delay =
                reader.read_bits(hrd.dpb_output_delay_length_minus1 as u32 + 1)?;

            if hrd.sub_pic_hrd_params_present_flag {
                timing.pic_dpb_output_du_delay =
                    reader.read_bits(hrd.dpb_output_delay_du_length_minus1 as u32 + 1)?;
            }

            if hrd.sub_pic_hrd_params_present_flag && hrd.sub_pic_cpb_params_in_pic_timing_sei_flag {
                let increment_bits = hrd.du_cpb_removal_delay_increment_length_minus1 as u32 + 1;
                timing.num_decoding_units_minus1 = reader.read_ue()?;
                timing.du_common_cpb_removal_delay_flag = reader.read_bool()?;
                if timing.du_common_cpb_removal_delay_flag {
                    timing.du_common_cpb_removal_delay_increment_minus1 =
                        reader.read_bits(increment_bits)?;
                }

                for i in 0..=timing.num_decoding_units_minus1 {
                    timing.num_nalus_in_du_minus1.push(reader.read_ue()?);
                    if !timing.du_common_cpb_removal_delay_flag
                        && i < timing.num_decoding_units_minus1
                    {
                        timing
                            .du_cpb_removal_delay_increment_minus1
                            .push(reader.read_bits(increment_bits)?);
                    }
                }
            }
        }

        Ok(timing)
    }
}

/// source_scan_type inferred from the PTL source flags
///
/// 0 interlaced, 1 progressive, 2 unknown.
pub fn default_source_scan_type(progressive: bool, interlaced: bool) -> u8 {
    match (progressive, interlaced) {
        (false, true) => 0,
        (true, false) => 1,
        _ => 2,
    }
}

/// recovery_point()
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryPoint {
    pub recovery_poc_cnt: i32,
    pub exact_match_flag: bool,
    pub broken_link_flag: bool,
}

/// Decoded SEI payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeiPayload {
    PicTiming(PicTiming),
    RecoveryPoint(RecoveryPoint),
    /// Framed but not decoded
    Other,
}

/// One sei_message()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiMessage {
    pub payload_type: u32,
    /// Payload size in bytes
    pub payload_size: usize,
    pub payload: SeiPayload,
}

/// Parse all messages of an SEI NAL unit
///
/// `last_sps` is the most recently received SPS, needed to interpret
/// picture timing. A picture timing message without it is a parse error.
pub fn parse_sei(nal: &NalUnit, last_sps: Option<&Sps>) -> Result<Vec<SeiMessage>> {
    let is_prefix = match nal.nal_type() {
        NalUnitType::PrefixSeiNut => true,
        NalUnitType::SuffixSeiNut => false,
        other => {
            return Err(Error::invalid_input(format!("{:?} is not an SEI NAL unit", other)));
        }
    };

    let mut reader = BitstreamReader::new(&nal.rbsp);
    let mut messages = Vec::new();

    loop {
        let payload_type = read_ff_coded(&mut reader)?;
        let payload_size = read_ff_coded(&mut reader)? as usize;

        let start = reader.position() / 8;
        let end = (start + payload_size).min(nal.rbsp.len());
        let payload_data = &nal.rbsp[start..end];
        let mut payload_reader = BitstreamReader::new(payload_data);

        let payload = match (is_prefix, payload_type) {
            (true, SEI_PIC_TIMING) => {
                let sps = last_sps.ok_or_else(|| {
                    Error::parse("SEI", "picture timing without a sequence parameter set")
                })?;
                SeiPayload::PicTiming(PicTiming::parse(&mut payload_reader, sps)?)
            }
            (true, SEI_RECOVERY_POINT) => SeiPayload::RecoveryPoint(RecoveryPoint {
                recovery_poc_cnt: payload_reader.read_se()?,
                exact_match_flag: payload_reader.read_bool()?,
                broken_link_flag: payload_reader.read_bool()?,
            }),
            _ => SeiPayload::Other,
        };

        tracing::trace!(payload_type, payload_size, "SEI message");
        messages.push(SeiMessage {
            payload_type,
            payload_size,
            payload,
        });

        reader.skip_bits(((end - start) * 8) as u32)?;
        if !reader.more_rbsp_data() {
            break;
        }
    }

    Ok(messages)
}

/// payloadType / payloadSize coding: 0xFF bytes accumulate
fn read_ff_coded(reader: &mut BitstreamReader) -> Result<u32> {
    let mut value = 0u32;
    loop {
        let byte = reader.read_u8(8)?;
        value = value.saturating_add(byte as u32);
        if byte != 0xFF {
            return Ok(value);
        }
    }
}
