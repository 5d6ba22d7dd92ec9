//! Parameter set store and NAL unit parsing entry points
//!
//! Parameter sets are kept in fixed slot tables indexed by their id. A slot
//! holds the last set received with that id; slices resolve their PPS and,
//! through it, their SPS at parse time.

use std::rc::Rc;

use super::headers::{Pps, Sps, Vps, MAX_PPS_ID, MAX_SPS_ID, MAX_VPS_ID};
use super::nal::{NalUnit, NalUnitType};
use super::sei::{self, SeiMessage};
use super::slice::SliceHeader;
use crate::error::{Error, Result};

const NUM_VPS_SLOTS: usize = MAX_VPS_ID as usize + 1;
const NUM_SPS_SLOTS: usize = MAX_SPS_ID as usize + 1;
const NUM_PPS_SLOTS: usize = MAX_PPS_ID as usize + 1;

/// Slot tables for VPS/SPS/PPS
pub struct ParameterSets {
    vps: [Option<Rc<Vps>>; NUM_VPS_SLOTS],
    sps: [Option<Rc<Sps>>; NUM_SPS_SLOTS],
    pps: [Option<Rc<Pps>>; NUM_PPS_SLOTS],
    /// Most recently parsed SPS, committed or not; SEI timing is read against it
    last_sps: Option<Rc<Sps>>,
}

impl Default for ParameterSets {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterSets {
    /// Create an empty store
    pub fn new() -> Self {
        ParameterSets {
            vps: std::array::from_fn(|_| None),
            sps: std::array::from_fn(|_| None),
            pps: std::array::from_fn(|_| None),
            last_sps: None,
        }
    }

    pub fn get_vps(&self, id: u8) -> Option<Rc<Vps>> {
        self.vps.get(id as usize).cloned().flatten()
    }

    pub fn get_sps(&self, id: u8) -> Option<Rc<Sps>> {
        self.sps.get(id as usize).cloned().flatten()
    }

    pub fn get_pps(&self, id: u8) -> Option<Rc<Pps>> {
        self.pps.get(id as usize).cloned().flatten()
    }

    /// The SPS parsed last, accepted or not
    pub fn last_sps(&self) -> Option<&Rc<Sps>> {
        self.last_sps.as_ref()
    }

    /// Number of occupied slots as (vps, sps, pps)
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.vps.iter().flatten().count(),
            self.sps.iter().flatten().count(),
            self.pps.iter().flatten().count(),
        )
    }

    /// Parse a VPS NAL unit and store it
    pub fn parse_vps(&mut self, nal: &NalUnit) -> Result<Rc<Vps>> {
        expect_type(nal, NalUnitType::VpsNut)?;
        let vps = Rc::new(Vps::parse(&nal.rbsp)?);
        tracing::debug!(id = vps.vps_video_parameter_set_id, "VPS parsed");
        self.vps[vps.vps_video_parameter_set_id as usize] = Some(vps.clone());
        Ok(vps)
    }

    /// Parse an SPS NAL unit without storing it
    ///
    /// The caller commits it with [`ParameterSets::insert_sps`]. A missing
    /// VPS is tolerated; it only serves as a frame rate fallback.
    pub fn parse_sps(&mut self, nal: &NalUnit) -> Result<Rc<Sps>> {
        expect_type(nal, NalUnitType::SpsNut)?;
        let mut sps = Sps::parse(&nal.rbsp)?;

        match self.get_vps(sps.sps_video_parameter_set_id) {
            Some(vps) => sps.apply_vps_timing(&vps),
            None => tracing::debug!(
                vps_id = sps.sps_video_parameter_set_id,
                "SPS refers to a VPS that was not received"
            ),
        }

        tracing::debug!(
            id = sps.sps_seq_parameter_set_id,
            width = sps.pic_width_in_luma_samples,
            height = sps.pic_height_in_luma_samples,
            "SPS parsed"
        );

        let sps = Rc::new(sps);
        self.last_sps = Some(sps.clone());
        Ok(sps)
    }

    /// Commit an SPS to its slot
    pub fn insert_sps(&mut self, sps: Rc<Sps>) {
        let id = sps.sps_seq_parameter_set_id as usize;
        self.sps[id] = Some(sps);
    }

    /// Parse a PPS NAL unit and store it
    pub fn parse_pps(&mut self, nal: &NalUnit) -> Result<Rc<Pps>> {
        expect_type(nal, NalUnitType::PpsNut)?;
        let pps = Rc::new(Pps::parse(&nal.rbsp, |id| self.get_sps(id))?);
        tracing::debug!(
            id = pps.pps_pic_parameter_set_id,
            sps_id = pps.pps_seq_parameter_set_id,
            "PPS parsed"
        );
        self.pps[pps.pps_pic_parameter_set_id as usize] = Some(pps.clone());
        Ok(pps)
    }

    /// Parse a slice segment header against the stored parameter sets
    pub fn parse_slice_header(&self, nal: &NalUnit) -> Result<SliceHeader> {
        SliceHeader::parse(nal, |id| self.get_pps(id), |id| self.get_sps(id))
    }

    /// Parse an SEI NAL unit against the last received SPS
    pub fn parse_sei(&self, nal: &NalUnit) -> Result<Vec<SeiMessage>> {
        sei::parse_sei(nal, self.last_sps.as_deref())
    }

    /// Forget every stored parameter set
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

fn expect_type(nal: &NalUnit, expected: NalUnitType) -> Result<()> {
    if nal.nal_type() == expected {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "expected {:?}, got {:?}",
            expected,
            nal.nal_type()
        )))
    }
}
