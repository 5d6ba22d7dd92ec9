//! HEVC decoder configuration record (`hvcC`, ISO/IEC 14496-15 8.3.3)
//!
//! Packetized streams (`hvc1`/`hev1`) carry their parameter sets and the size
//! of the NAL length prefix out of band in this record.

use byteorder::{BigEndian, ByteOrder};

use super::nal::{NalUnit, NalUnitType};
use crate::error::{Error, Result};

const MIN_RECORD_SIZE: usize = 23;

/// One array of NAL units of the same type
#[derive(Debug, Clone)]
pub struct NalArray {
    pub array_completeness: bool,
    pub nal_unit_type: NalUnitType,
    pub nal_units: Vec<NalUnit>,
}

/// Parsed `HEVCDecoderConfigurationRecord`
#[derive(Debug, Clone)]
pub struct HevcDecoderConfigurationRecord {
    pub configuration_version: u8,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    /// Size of the length prefix in front of every NAL unit (1, 2 or 4)
    pub nal_length_size: u8,
    pub arrays: Vec<NalArray>,
}

impl HevcDecoderConfigurationRecord {
    /// Parse the record from codec data
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_RECORD_SIZE {
            return Err(Error::invalid_input(format!(
                "hvcC too small: {} bytes",
                data.len()
            )));
        }

        // Some muxers wrote version 0 before the format was finalized
        let configuration_version = data[0];
        if configuration_version > 1 {
            return Err(Error::unsupported(format!(
                "hvcC configurationVersion {}",
                configuration_version
            )));
        }

        let mut record = HevcDecoderConfigurationRecord {
            configuration_version,
            general_profile_space: data[1] >> 6,
            general_tier_flag: (data[1] >> 5) & 1 != 0,
            general_profile_idc: data[1] & 0x1F,
            general_level_idc: data[12],
            chroma_format_idc: data[16] & 0x03,
            bit_depth_luma_minus8: data[17] & 0x07,
            bit_depth_chroma_minus8: data[18] & 0x07,
            nal_length_size: (data[21] & 0x03) + 1,
            arrays: Vec::new(),
        };

        let num_of_arrays = data[22] as usize;
        let mut pos = MIN_RECORD_SIZE;

        for _ in 0..num_of_arrays {
            let header = data
                .get(pos..pos + 3)
                .ok_or_else(|| Error::invalid_input("hvcC truncated in array header"))?;
            let array_completeness = header[0] & 0x80 != 0;
            let nal_unit_type = NalUnitType::from_u8(header[0] & 0x3F);
            let num_nalus = BigEndian::read_u16(&header[1..3]) as usize;
            pos += 3;

            let mut nal_units = Vec::with_capacity(num_nalus);
            for _ in 0..num_nalus {
                let length = data
                    .get(pos..pos + 2)
                    .map(BigEndian::read_u16)
                    .ok_or_else(|| Error::invalid_input("hvcC truncated in NAL length"))?
                    as usize;
                pos += 2;

                let nal_data = data
                    .get(pos..pos + length)
                    .ok_or_else(|| Error::invalid_input("hvcC truncated in NAL unit"))?;
                pos += length;

                nal_units.push(NalUnit::parse(nal_data)?);
            }

            record.arrays.push(NalArray {
                array_completeness,
                nal_unit_type,
                nal_units,
            });
        }

        Ok(record)
    }

    /// All parameter set NAL units of the record, in record order
    pub fn nal_units(&self) -> impl Iterator<Item = &NalUnit> {
        self.arrays.iter().flat_map(|array| array.nal_units.iter())
    }
}
