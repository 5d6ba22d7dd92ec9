//! H.265/HEVC NAL (Network Abstraction Layer) unit parsing
//!
//! NAL units are the fundamental data structures in H.265 bitstreams.
//! Each NAL unit contains a header and payload.
//!
//! ## NAL Unit Structure
//!
//! ```text
//! NAL Unit:
//! +----------------+-------------------+
//! | NAL Header (2) | RBSP Payload (N) |
//! +----------------+-------------------+
//!
//! NAL Header (16 bits):
//! +---+-----+--------+-----+
//! | F | Type | LayerID | TID |
//! +---+-----+--------+-----+
//!   1   6      6        3
//! ```
//!
//! ## Framing
//!
//! NAL units arrive either as an Annex-B byte stream (start code delimited)
//! or length prefixed, as stored in `hvc1`/`hev1` tracks. Both are handled by
//! [`identify_nal_units`].

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// H.265 NAL unit types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NalUnitType {
    /// Coded slice of a non-TSA, non-STSA trailing picture
    TrailN = 0,
    /// Coded slice of a non-TSA, non-STSA trailing picture
    TrailR = 1,

    /// Coded slice of a TSA picture
    TsaN = 2,
    /// Coded slice of a TSA picture
    TsaR = 3,

    /// Coded slice of an STSA picture
    StsaN = 4,
    /// Coded slice of an STSA picture
    StsaR = 5,

    /// Coded slice of a RADL picture
    RadlN = 6,
    /// Coded slice of a RADL picture
    RadlR = 7,

    /// Coded slice of a RASL picture
    RaslN = 8,
    /// Coded slice of a RASL picture
    RaslR = 9,

    /// Reserved non-IRAP sub-layer non-reference VCL types
    RsvVclN10 = 10,
    RsvVclR11 = 11,
    RsvVclN12 = 12,
    RsvVclR13 = 13,
    RsvVclN14 = 14,
    RsvVclR15 = 15,

    /// Coded slice of a BLA picture
    BlaWLp = 16,
    /// Coded slice of a BLA picture
    BlaWRadl = 17,
    /// Coded slice of a BLA picture
    BlaNLp = 18,

    /// Coded slice of an IDR picture
    IdrWRadl = 19,
    /// Coded slice of an IDR picture
    IdrNLp = 20,

    /// Coded slice of a CRA picture
    CraNut = 21,

    /// Reserved IRAP VCL types
    RsvIrapVcl22 = 22,
    RsvIrapVcl23 = 23,

    /// Video Parameter Set
    VpsNut = 32,
    /// Sequence Parameter Set
    SpsNut = 33,
    /// Picture Parameter Set
    PpsNut = 34,

    /// Access unit delimiter
    AudNut = 35,
    /// End of sequence
    EosNut = 36,
    /// End of bitstream
    EobNut = 37,
    /// Filler data
    FdNut = 38,

    /// Supplemental enhancement information prefix
    PrefixSeiNut = 39,
    /// Supplemental enhancement information suffix
    SuffixSeiNut = 40,

    /// Unknown/Invalid NAL unit type
    Unknown = 255,
}

impl NalUnitType {
    /// Create NAL unit type from u8 value
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            10 => Self::RsvVclN10,
            11 => Self::RsvVclR11,
            12 => Self::RsvVclN12,
            13 => Self::RsvVclR13,
            14 => Self::RsvVclN14,
            15 => Self::RsvVclR15,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::CraNut,
            22 => Self::RsvIrapVcl22,
            23 => Self::RsvIrapVcl23,
            32 => Self::VpsNut,
            33 => Self::SpsNut,
            34 => Self::PpsNut,
            35 => Self::AudNut,
            36 => Self::EosNut,
            37 => Self::EobNut,
            38 => Self::FdNut,
            39 => Self::PrefixSeiNut,
            40 => Self::SuffixSeiNut,
            _ => Self::Unknown,
        }
    }

    /// Raw `nal_unit_type` value
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Check if this NAL unit type is a coded slice segment this decoder handles
    pub fn is_slice(&self) -> bool {
        matches!(self.as_u8(), 0..=9 | 16..=21)
    }

    /// Check if this is an IDR (Instantaneous Decoder Refresh) NAL unit
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// Check if this is a BLA (Broken Link Access) NAL unit
    pub fn is_bla(&self) -> bool {
        matches!(self, Self::BlaWLp | Self::BlaWRadl | Self::BlaNLp)
    }

    /// Check if this is a CRA (Clean Random Access) NAL unit
    pub fn is_cra(&self) -> bool {
        matches!(self, Self::CraNut)
    }

    /// Check if this is an IRAP (Intra Random Access Point) NAL unit, reserved types included
    pub fn is_irap(&self) -> bool {
        matches!(self.as_u8(), 16..=23)
    }

    /// Check if this is a RASL (Random Access Skipped Leading) NAL unit
    pub fn is_rasl(&self) -> bool {
        matches!(self, Self::RaslN | Self::RaslR)
    }

    /// Check if this is a RADL (Random Access Decodable Leading) NAL unit
    pub fn is_radl(&self) -> bool {
        matches!(self, Self::RadlN | Self::RadlR)
    }

    /// Check if pictures of this type may be used for reference by the same sub-layer
    ///
    /// The `_N` types and their reserved counterparts are sub-layer non-reference pictures.
    pub fn is_sub_layer_reference(&self) -> bool {
        !matches!(
            self,
            Self::TrailN
                | Self::TsaN
                | Self::StsaN
                | Self::RadlN
                | Self::RaslN
                | Self::RsvVclN10
                | Self::RsvVclN12
                | Self::RsvVclN14
        )
    }

    /// Check if this is a parameter set (VPS/SPS/PPS)
    pub fn is_parameter_set(&self) -> bool {
        matches!(self, Self::VpsNut | Self::SpsNut | Self::PpsNut)
    }
}

/// H.265 NAL unit header (2 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    /// NAL unit type (6 bits)
    pub nal_unit_type: NalUnitType,
    /// Layer ID for scalable extensions (6 bits)
    pub nuh_layer_id: u8,
    /// Temporal ID plus 1 (3 bits)
    pub nuh_temporal_id_plus1: u8,
}

impl NalHeader {
    /// Parse NAL header from 2 bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::parse("NAL header", "requires at least 2 bytes"));
        }

        let byte0 = data[0];
        let byte1 = data[1];

        if byte0 & 0x80 != 0 {
            return Err(Error::parse("NAL header", "forbidden_zero_bit is not 0"));
        }

        let nal_unit_type_raw = (byte0 >> 1) & 0x3F;
        let nuh_layer_id = ((byte0 & 0x01) << 5) | ((byte1 >> 3) & 0x1F);
        let nuh_temporal_id_plus1 = byte1 & 0x07;

        if nuh_temporal_id_plus1 == 0 {
            return Err(Error::parse("NAL header", "nuh_temporal_id_plus1 is 0"));
        }

        Ok(NalHeader {
            nal_unit_type: NalUnitType::from_u8(nal_unit_type_raw),
            nuh_layer_id,
            nuh_temporal_id_plus1,
        })
    }

    /// Get temporal ID (TID)
    pub fn temporal_id(&self) -> u8 {
        self.nuh_temporal_id_plus1.saturating_sub(1)
    }
}

/// H.265 NAL unit (header + RBSP payload)
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// NAL unit header
    pub header: NalHeader,
    /// Offset of the NAL header in the buffer it was identified in
    pub offset: usize,
    /// Size of the NAL unit (header included, emulation prevention included)
    pub size: usize,
    /// RBSP (Raw Byte Sequence Payload) data, header excluded
    pub rbsp: Vec<u8>,
}

impl NalUnit {
    /// Parse NAL unit from bytes
    ///
    /// This function expects data WITHOUT the start code prefix or length prefix.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_at(data, 0)
    }

    fn parse_at(data: &[u8], offset: usize) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::parse("NAL unit", "shorter than 2 bytes"));
        }

        let header = NalHeader::parse(&data[0..2])?;
        let rbsp = remove_emulation_prevention_bytes(&data[2..]);

        Ok(NalUnit {
            header,
            offset,
            size: data.len(),
            rbsp,
        })
    }

    /// Get NAL unit type
    pub fn nal_type(&self) -> NalUnitType {
        self.header.nal_unit_type
    }

    /// Check if this is a slice NAL unit
    pub fn is_slice(&self) -> bool {
        self.header.nal_unit_type.is_slice()
    }

    /// Check if this is an IDR NAL unit
    pub fn is_idr(&self) -> bool {
        self.header.nal_unit_type.is_idr()
    }
}

/// Remove emulation prevention bytes (0x03) from RBSP
///
/// H.265 inserts 0x03 bytes to prevent start code emulation:
/// - 0x000000 → 0x00000300
/// - 0x000001 → 0x00000301
/// - 0x000002 → 0x00000302
/// - 0x000003 → 0x00000303
fn remove_emulation_prevention_bytes(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0x00 { zeros + 1 } else { 0 };
        rbsp.push(byte);
    }

    rbsp
}

/// How NAL units are delimited in an input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalFraming {
    /// Annex-B byte stream, 0x000001 start codes
    AnnexB,
    /// Big-endian length prefix of the given size (1 to 4 bytes)
    LengthPrefixed(u8),
}

/// Iterator over the NAL units of one buffer, see [`identify_nal_units`]
pub struct NalUnitIter<'a> {
    data: &'a [u8],
    pos: usize,
    framing: NalFraming,
    done: bool,
}

impl<'a> Iterator for NalUnitIter<'a> {
    type Item = Result<NalUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.framing {
            NalFraming::AnnexB => {
                let unit = next_annexb_unit(self.data, self.pos);
                match unit {
                    Some(unit) => {
                        self.pos = unit.offset + unit.size;
                        Some(NalUnit::parse_at(
                            &self.data[unit.offset..unit.offset + unit.size],
                            unit.offset,
                        ))
                    }
                    None => {
                        self.done = true;
                        None
                    }
                }
            }
            NalFraming::LengthPrefixed(length_size) => {
                let length_size = length_size as usize;
                if self.pos >= self.data.len() {
                    self.done = true;
                    return None;
                }
                if !(1..=4).contains(&length_size) {
                    self.done = true;
                    return Some(Err(Error::invalid_input(format!(
                        "invalid NAL length size {}",
                        length_size
                    ))));
                }
                if self.pos + length_size > self.data.len() {
                    self.done = true;
                    return Some(Err(Error::parse("NAL unit", "truncated length prefix")));
                }

                let size =
                    BigEndian::read_uint(&self.data[self.pos..], length_size) as usize;
                let offset = self.pos + length_size;
                if offset + size > self.data.len() {
                    self.done = true;
                    return Some(Err(Error::parse(
                        "NAL unit",
                        format!(
                            "length {} exceeds remaining {} bytes",
                            size,
                            self.data.len() - offset
                        ),
                    )));
                }

                self.pos = offset + size;
                Some(NalUnit::parse_at(&self.data[offset..offset + size], offset))
            }
        }
    }
}

/// Split a buffer into NAL units
///
/// Items are per-NAL results: a malformed header yields an error for that unit
/// and iteration continues, while a truncated length prefix ends the iteration.
pub fn identify_nal_units(data: &[u8], framing: NalFraming) -> NalUnitIter<'_> {
    NalUnitIter {
        data,
        pos: 0,
        framing,
        done: false,
    }
}

/// Location of one Annex-B NAL unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AnnexBUnit {
    /// First byte of the start code (the leading zero of a 4-byte code included)
    sc_start: usize,
    /// First byte of the NAL header
    offset: usize,
    /// NAL size, trailing zero bytes excluded
    size: usize,
}

/// Position of the next 0x000001 at or after `from`
fn find_start_code_prefix(data: &[u8], from: usize) -> Option<usize> {
    if data.len() < 3 {
        return None;
    }
    (from..data.len() - 2).find(|&i| data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01)
}

fn next_annexb_unit(data: &[u8], from: usize) -> Option<AnnexBUnit> {
    let sc = find_start_code_prefix(data, from)?;
    let sc_start = if sc > from && data[sc - 1] == 0x00 { sc - 1 } else { sc };
    let offset = sc + 3;
    if offset >= data.len() {
        return None;
    }

    let nal_type = NalUnitType::from_u8((data[offset] >> 1) & 0x3F);
    if matches!(nal_type, NalUnitType::EosNut | NalUnitType::EobNut) && offset + 2 <= data.len() {
        return Some(AnnexBUnit {
            sc_start,
            offset,
            size: 2,
        });
    }

    let end = find_start_code_prefix(data, offset).unwrap_or(data.len());
    let mut size = end - offset;
    while size > 0 && data[offset + size - 1] == 0x00 {
        size -= 1;
    }

    Some(AnnexBUnit {
        sc_start,
        offset,
        size,
    })
}

/// Find NAL unit start codes in a byte stream
///
/// Returns positions of start codes (either 3-byte 0x000001 or 4-byte 0x00000001)
pub fn find_start_codes(data: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut pos = 0;

    while let Some(unit) = next_annexb_unit(data, pos) {
        positions.push(unit.sc_start);
        pos = unit.offset + unit.size;
    }

    positions
}

/// Split an Annex-B byte stream into access units
///
/// A new access unit begins at the first AUD, parameter set, prefix SEI or
/// reserved prefix NAL, or at a slice with `first_slice_segment_in_pic_flag`,
/// that follows a coded slice of the current access unit.
pub fn split_access_units(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut au_start: Option<usize> = None;
    let mut seen_vcl = false;
    let mut pos = 0;

    while let Some(unit) = next_annexb_unit(data, pos) {
        pos = unit.offset + unit.size;
        if unit.size < 2 {
            continue;
        }

        let raw_type = (data[unit.offset] >> 1) & 0x3F;
        let nal_type = NalUnitType::from_u8(raw_type);
        let first_slice = nal_type.is_slice()
            && unit.size > 2
            && data[unit.offset + 2] & 0x80 != 0;
        let starts_au = matches!(raw_type, 32..=35 | 39 | 41..=44 | 48..=55) || first_slice;

        if seen_vcl && starts_au {
            if let Some(start) = au_start {
                units.push(&data[start..unit.sc_start]);
            }
            au_start = None;
            seen_vcl = false;
        }
        if au_start.is_none() {
            au_start = Some(unit.sc_start);
        }
        if raw_type < 32 {
            seen_vcl = true;
        }
    }

    if let Some(start) = au_start {
        units.push(&data[start..]);
    }

    units
}
