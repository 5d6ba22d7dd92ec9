//! Slice segment header parsing (7.3.6)
//!
//! The header carries everything the decoding state machine needs from a
//! slice: the POC LSBs, the short and long-term reference picture sets, the
//! number of active references and the list modification entries.

use std::rc::Rc;

use super::bitstream::BitstreamReader;
use super::headers::{Pps, Sps, MAX_PPS_ID};
use super::nal::{NalHeader, NalUnit, NalUnitType};
use super::short_term_rps::ShortTermRefPicSet;
use crate::error::{Error, Result};

/// Slice types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SliceType {
    /// Bi-predictive
    B = 0,
    /// Predictive
    P = 1,
    /// Intra
    #[default]
    I = 2,
}

impl SliceType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::B),
            1 => Some(Self::P),
            2 => Some(Self::I),
            _ => None,
        }
    }

    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I)
    }

    pub fn is_b(&self) -> bool {
        matches!(self, Self::B)
    }
}

/// ref_pic_lists_modification()
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefPicListModification {
    pub ref_pic_list_modification_flag_l0: bool,
    pub list_entry_l0: Vec<u32>,
    pub ref_pic_list_modification_flag_l1: bool,
    pub list_entry_l1: Vec<u32>,
}

/// pred_weight_table()
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    pub delta_chroma_log2_weight_denom: i32,
    pub luma_weight_l0_flag: Vec<bool>,
    pub chroma_weight_l0_flag: Vec<bool>,
    pub delta_luma_weight_l0: Vec<i32>,
    pub luma_offset_l0: Vec<i32>,
    pub delta_chroma_weight_l0: Vec<[i32; 2]>,
    pub delta_chroma_offset_l0: Vec<[i32; 2]>,
    pub luma_weight_l1_flag: Vec<bool>,
    pub chroma_weight_l1_flag: Vec<bool>,
    pub delta_luma_weight_l1: Vec<i32>,
    pub luma_offset_l1: Vec<i32>,
    pub delta_chroma_weight_l1: Vec<[i32; 2]>,
    pub delta_chroma_offset_l1: Vec<[i32; 2]>,
}

/// Weights of one reference list
struct ListWeights {
    luma_flag: Vec<bool>,
    chroma_flag: Vec<bool>,
    luma_weight: Vec<i32>,
    luma_offset: Vec<i32>,
    chroma_weight: Vec<[i32; 2]>,
    chroma_offset: Vec<[i32; 2]>,
}

impl ListWeights {
    fn parse(reader: &mut BitstreamReader, num_active: usize, has_chroma: bool) -> Result<Self> {
        let luma_flag = (0..num_active)
            .map(|_| reader.read_bool())
            .collect::<Result<Vec<_>>>()?;
        let chroma_flag = if has_chroma {
            (0..num_active)
                .map(|_| reader.read_bool())
                .collect::<Result<Vec<_>>>()?
        } else {
            vec![false; num_active]
        };

        let mut weights = ListWeights {
            luma_flag,
            chroma_flag,
            luma_weight: vec![0; num_active],
            luma_offset: vec![0; num_active],
            chroma_weight: vec![[0; 2]; num_active],
            chroma_offset: vec![[0; 2]; num_active],
        };

        for i in 0..num_active {
            if weights.luma_flag[i] {
                weights.luma_weight[i] = reader.read_se_range(-128, 127, "delta_luma_weight")?;
                weights.luma_offset[i] = reader.read_se_range(-128, 127, "luma_offset")?;
            }
            if weights.chroma_flag[i] {
                for j in 0..2 {
                    weights.chroma_weight[i][j] =
                        reader.read_se_range(-128, 127, "delta_chroma_weight")?;
                    weights.chroma_offset[i][j] =
                        reader.read_se_range(-512, 511, "delta_chroma_offset")?;
                }
            }
        }

        Ok(weights)
    }
}

impl PredWeightTable {
    fn parse(reader: &mut BitstreamReader, header: &SliceHeader, sps: &Sps) -> Result<Self> {
        let has_chroma = sps.chroma_array_type != 0;
        let mut table = PredWeightTable {
            luma_log2_weight_denom: reader.read_ue_max(7, "luma_log2_weight_denom")?,
            ..Default::default()
        };
        if has_chroma {
            let denom = table.luma_log2_weight_denom as i32;
            table.delta_chroma_log2_weight_denom =
                reader.read_se_range(-denom, 7 - denom, "delta_chroma_log2_weight_denom")?;
        }

        let l0 = ListWeights::parse(
            reader,
            header.num_ref_idx_l0_active_minus1 as usize + 1,
            has_chroma,
        )?;
        table.luma_weight_l0_flag = l0.luma_flag;
        table.chroma_weight_l0_flag = l0.chroma_flag;
        table.delta_luma_weight_l0 = l0.luma_weight;
        table.luma_offset_l0 = l0.luma_offset;
        table.delta_chroma_weight_l0 = l0.chroma_weight;
        table.delta_chroma_offset_l0 = l0.chroma_offset;

        if header.slice_type.is_b() {
            let l1 = ListWeights::parse(
                reader,
                header.num_ref_idx_l1_active_minus1 as usize + 1,
                has_chroma,
            )?;
            table.luma_weight_l1_flag = l1.luma_flag;
            table.chroma_weight_l1_flag = l1.chroma_flag;
            table.delta_luma_weight_l1 = l1.luma_weight;
            table.luma_offset_l1 = l1.luma_offset;
            table.delta_chroma_weight_l1 = l1.chroma_weight;
            table.delta_chroma_offset_l1 = l1.chroma_offset;
        }

        Ok(table)
    }
}

/// Slice segment header
#[derive(Debug, Clone)]
pub struct SliceHeader {
    pub first_slice_segment_in_pic_flag: bool,
    pub no_output_of_prior_pics_flag: bool,
    pub slice_pic_parameter_set_id: u8,
    pub dependent_slice_segment_flag: bool,
    pub slice_segment_address: u32,

    pub slice_type: SliceType,
    pub pic_output_flag: bool,
    pub colour_plane_id: u8,
    pub slice_pic_order_cnt_lsb: u32,

    pub short_term_ref_pic_set_sps_flag: bool,
    /// The header's own set when `short_term_ref_pic_set_sps_flag` is 0
    pub short_term_ref_pic_set: ShortTermRefPicSet,
    pub short_term_ref_pic_set_idx: u32,
    /// Size in bits of the header's own st_ref_pic_set()
    pub short_term_ref_pic_set_size: usize,

    pub num_long_term_sps: u32,
    pub num_long_term_pics: u32,
    pub lt_idx_sps: Vec<u32>,
    pub poc_lsb_lt: Vec<u32>,
    pub used_by_curr_pic_lt_flag: Vec<bool>,
    pub delta_poc_msb_present_flag: Vec<bool>,
    pub delta_poc_msb_cycle_lt: Vec<u32>,
    /// Size in bits of the long-term syntax
    pub long_term_ref_pic_set_size: usize,

    pub slice_temporal_mvp_enabled_flag: bool,
    pub slice_sao_luma_flag: bool,
    pub slice_sao_chroma_flag: bool,

    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    /// NumPicTotalCurr (7-55)
    pub num_pic_total_curr: u32,
    pub ref_pic_list_modification: RefPicListModification,

    pub mvd_l1_zero_flag: bool,
    pub cabac_init_flag: bool,
    pub collocated_from_l0_flag: bool,
    pub collocated_ref_idx: u32,
    pub pred_weight_table: Option<PredWeightTable>,
    pub five_minus_max_num_merge_cand: u32,
    pub use_integer_mv_flag: bool,

    pub slice_qp_delta: i32,
    pub slice_cb_qp_offset: i32,
    pub slice_cr_qp_offset: i32,
    pub slice_act_y_qp_offset: i32,
    pub slice_act_cb_qp_offset: i32,
    pub slice_act_cr_qp_offset: i32,
    pub cu_chroma_qp_offset_enabled_flag: bool,

    pub deblocking_filter_override_flag: bool,
    pub slice_deblocking_filter_disabled_flag: bool,
    pub slice_beta_offset_div2: i32,
    pub slice_tc_offset_div2: i32,
    pub slice_loop_filter_across_slices_enabled_flag: bool,

    pub num_entry_point_offsets: u32,
    pub offset_len_minus1: u32,
    pub entry_point_offset_minus1: Vec<u32>,

    /// Header size in bits, byte alignment included
    pub header_size: usize,

    /// Parameter sets the header was parsed against
    pub pps: Rc<Pps>,
    pub sps: Rc<Sps>,
}

/// Smallest `k` with `1 << k >= value`
fn ceil_log2(value: u32) -> u32 {
    if value <= 1 {
        0
    } else {
        32 - (value - 1).leading_zeros()
    }
}

impl SliceHeader {
    /// Header of an I slice with every syntax element at its inferred value
    pub fn new(pps: Rc<Pps>, sps: Rc<Sps>) -> Self {
        SliceHeader {
            first_slice_segment_in_pic_flag: false,
            no_output_of_prior_pics_flag: false,
            slice_pic_parameter_set_id: pps.pps_pic_parameter_set_id,
            dependent_slice_segment_flag: false,
            slice_segment_address: 0,
            slice_type: SliceType::I,
            pic_output_flag: true,
            colour_plane_id: 0,
            slice_pic_order_cnt_lsb: 0,
            short_term_ref_pic_set_sps_flag: false,
            short_term_ref_pic_set: ShortTermRefPicSet::default(),
            short_term_ref_pic_set_idx: 0,
            short_term_ref_pic_set_size: 0,
            num_long_term_sps: 0,
            num_long_term_pics: 0,
            lt_idx_sps: Vec::new(),
            poc_lsb_lt: Vec::new(),
            used_by_curr_pic_lt_flag: Vec::new(),
            delta_poc_msb_present_flag: Vec::new(),
            delta_poc_msb_cycle_lt: Vec::new(),
            long_term_ref_pic_set_size: 0,
            slice_temporal_mvp_enabled_flag: false,
            slice_sao_luma_flag: false,
            slice_sao_chroma_flag: false,
            num_ref_idx_active_override_flag: false,
            num_ref_idx_l0_active_minus1: 0,
            num_ref_idx_l1_active_minus1: 0,
            num_pic_total_curr: 0,
            ref_pic_list_modification: RefPicListModification::default(),
            mvd_l1_zero_flag: false,
            cabac_init_flag: false,
            collocated_from_l0_flag: true,
            collocated_ref_idx: 0,
            pred_weight_table: None,
            five_minus_max_num_merge_cand: 0,
            use_integer_mv_flag: false,
            slice_qp_delta: 0,
            slice_cb_qp_offset: 0,
            slice_cr_qp_offset: 0,
            slice_act_y_qp_offset: 0,
            slice_act_cb_qp_offset: 0,
            slice_act_cr_qp_offset: 0,
            cu_chroma_qp_offset_enabled_flag: false,
            deblocking_filter_override_flag: false,
            slice_deblocking_filter_disabled_flag: pps.pps_deblocking_filter_disabled_flag,
            slice_beta_offset_div2: pps.pps_beta_offset_div2,
            slice_tc_offset_div2: pps.pps_tc_offset_div2,
            slice_loop_filter_across_slices_enabled_flag: pps
                .pps_loop_filter_across_slices_enabled_flag,
            num_entry_point_offsets: 0,
            offset_len_minus1: 0,
            entry_point_offset_minus1: Vec::new(),
            header_size: 0,
            pps,
            sps,
        }
    }

    /// Parse the header of a coded slice segment NAL unit
    ///
    /// `get_pps`/`get_sps` resolve the active parameter sets; an unknown id
    /// is reported as a broken link.
    pub fn parse<P, S>(nal: &NalUnit, get_pps: P, get_sps: S) -> Result<Self>
    where
        P: Fn(u8) -> Option<Rc<Pps>>,
        S: Fn(u8) -> Option<Rc<Sps>>,
    {
        let nal_type = nal.nal_type();
        if !nal_type.is_slice() {
            return Err(Error::invalid_input(format!(
                "{:?} is not a coded slice segment",
                nal_type
            )));
        }

        let mut reader = BitstreamReader::new(&nal.rbsp);
        let first_slice_segment_in_pic_flag = reader.read_bool()?;
        let no_output_of_prior_pics_flag = if nal_type.is_irap() {
            reader.read_bool()?
        } else {
            false
        };

        let pps_id = reader.read_ue_max(MAX_PPS_ID, "slice_pic_parameter_set_id")? as u8;
        let pps = get_pps(pps_id)
            .ok_or_else(|| Error::broken_link(format!("slice refers to missing PPS {}", pps_id)))?;
        let sps = get_sps(pps.pps_seq_parameter_set_id).ok_or_else(|| {
            Error::broken_link(format!(
                "PPS {} refers to missing SPS {}",
                pps_id, pps.pps_seq_parameter_set_id
            ))
        })?;

        let mut header = SliceHeader::new(pps.clone(), sps.clone());
        header.first_slice_segment_in_pic_flag = first_slice_segment_in_pic_flag;
        header.no_output_of_prior_pics_flag = no_output_of_prior_pics_flag;

        if !first_slice_segment_in_pic_flag {
            if pps.dependent_slice_segments_enabled_flag {
                header.dependent_slice_segment_flag = reader.read_bool()?;
            }
            let bits = ceil_log2(sps.pic_size_in_ctbs_y());
            header.slice_segment_address = reader.read_bits(bits)?;
            if header.slice_segment_address >= sps.pic_size_in_ctbs_y() {
                return Err(Error::parse("slice header", "slice_segment_address out of range"));
            }
        }

        if !header.dependent_slice_segment_flag {
            header.parse_independent(&mut reader, &nal.header, &pps, &sps)?;
        }

        if pps.tiles_enabled_flag || pps.entropy_coding_sync_enabled_flag {
            let num_tiles = (pps.num_tile_columns_minus1 + 1) * (pps.num_tile_rows_minus1 + 1);
            let height_in_ctbs = sps.pic_height_in_ctbs_y();
            let offset_max = match (pps.tiles_enabled_flag, pps.entropy_coding_sync_enabled_flag) {
                (false, true) => height_in_ctbs.saturating_sub(1),
                (true, false) => num_tiles - 1,
                _ => ((pps.num_tile_columns_minus1 + 1) * height_in_ctbs).saturating_sub(1),
            };

            header.num_entry_point_offsets =
                reader.read_ue_max(offset_max, "num_entry_point_offsets")?;
            if header.num_entry_point_offsets > 0 {
                header.offset_len_minus1 = reader.read_ue_max(31, "offset_len_minus1")?;
                header.entry_point_offset_minus1 = (0..header.num_entry_point_offsets)
                    .map(|_| reader.read_bits(header.offset_len_minus1 + 1))
                    .collect::<Result<Vec<_>>>()?;
            }
        }

        if pps.slice_segment_header_extension_present_flag {
            let length = reader.read_ue_max(256, "slice_segment_header_extension_length")?;
            reader.skip_bits(length * 8)?;
        }

        // byte_alignment(): alignment_bit_equal_to_one then zero bits
        if reader.read_bit()? != 1 {
            return Err(Error::parse("slice header", "missing alignment_bit_equal_to_one"));
        }
        reader.byte_align();
        header.header_size = reader.position();

        Ok(header)
    }

    fn parse_independent(
        &mut self,
        reader: &mut BitstreamReader,
        nal_header: &NalHeader,
        pps: &Pps,
        sps: &Sps,
    ) -> Result<()> {
        reader.skip_bits(pps.num_extra_slice_header_bits as u32)?;

        let slice_type = reader.read_ue_max(63, "slice_type")?;
        self.slice_type = SliceType::from_u32(slice_type)
            .ok_or_else(|| Error::parse("slice header", format!("invalid slice_type {}", slice_type)))?;

        if pps.output_flag_present_flag {
            self.pic_output_flag = reader.read_bool()?;
        }
        if sps.separate_colour_plane_flag {
            self.colour_plane_id = reader.read_u8(2)?;
        }

        let nal_type: NalUnitType = nal_header.nal_unit_type;
        let mut used_by_curr_pic_lt = Vec::new();

        if !nal_type.is_idr() {
            let lsb_bits = sps.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4;
            self.slice_pic_order_cnt_lsb = reader.read_bits(lsb_bits)?;

            let num_sets = sps.num_short_term_ref_pic_sets();
            self.short_term_ref_pic_set_sps_flag = reader.read_bool()?;
            if !self.short_term_ref_pic_set_sps_flag {
                let start = reader.position();
                self.short_term_ref_pic_set = ShortTermRefPicSet::parse(
                    reader,
                    num_sets,
                    num_sets,
                    &sps.short_term_ref_pic_sets,
                    sps.sps_max_dec_pic_buffering_minus1[sps.highest_tid()],
                )?;
                self.short_term_ref_pic_set_size = reader.position() - start;
            } else {
                if num_sets == 0 {
                    return Err(Error::parse(
                        "slice header",
                        "short_term_ref_pic_set_sps_flag set without SPS sets",
                    ));
                }
                if num_sets > 1 {
                    self.short_term_ref_pic_set_idx = reader.read_bits(ceil_log2(num_sets as u32))?;
                    if self.short_term_ref_pic_set_idx as usize >= num_sets {
                        return Err(Error::parse("slice header", "short_term_ref_pic_set_idx out of range"));
                    }
                }
            }

            if sps.long_term_ref_pics_present_flag {
                let start = reader.position();
                let num_lt_sps = sps.num_long_term_ref_pics_sps() as u32;
                if num_lt_sps > 0 {
                    self.num_long_term_sps = reader.read_ue_max(num_lt_sps, "num_long_term_sps")?;
                }
                self.num_long_term_pics = reader.read_ue_max(16, "num_long_term_pics")?;

                for i in 0..(self.num_long_term_sps + self.num_long_term_pics) {
                    if i < self.num_long_term_sps {
                        let idx = if num_lt_sps > 1 {
                            reader.read_bits(ceil_log2(num_lt_sps))?
                        } else {
                            0
                        };
                        if idx >= num_lt_sps {
                            return Err(Error::parse("slice header", "lt_idx_sps out of range"));
                        }
                        self.lt_idx_sps.push(idx);
                        self.poc_lsb_lt.push(0);
                        self.used_by_curr_pic_lt_flag.push(false);
                        used_by_curr_pic_lt.push(sps.used_by_curr_pic_lt_sps_flag[idx as usize]);
                    } else {
                        self.lt_idx_sps.push(0);
                        self.poc_lsb_lt.push(reader.read_bits(lsb_bits)?);
                        let used = reader.read_bool()?;
                        self.used_by_curr_pic_lt_flag.push(used);
                        used_by_curr_pic_lt.push(used);
                    }

                    let msb_present = reader.read_bool()?;
                    self.delta_poc_msb_present_flag.push(msb_present);
                    self.delta_poc_msb_cycle_lt
                        .push(if msb_present { reader.read_ue()? } else { 0 });
                }
                self.long_term_ref_pic_set_size = reader.position() - start;
            }

            if sps.sps_temporal_mvp_enabled_flag {
                self.slice_temporal_mvp_enabled_flag = reader.read_bool()?;
            }
        }

        if sps.sample_adaptive_offset_enabled_flag {
            self.slice_sao_luma_flag = reader.read_bool()?;
            if sps.chroma_array_type != 0 {
                self.slice_sao_chroma_flag = reader.read_bool()?;
            }
        }

        if !self.slice_type.is_intra() {
            self.parse_inter(reader, pps, sps, &used_by_curr_pic_lt)?;
        }

        self.slice_qp_delta = reader.read_se_range(-87, 77, "slice_qp_delta")?;
        if pps.pps_slice_chroma_qp_offsets_present_flag {
            self.slice_cb_qp_offset = reader.read_se_range(-12, 12, "slice_cb_qp_offset")?;
            self.slice_cr_qp_offset = reader.read_se_range(-12, 12, "slice_cr_qp_offset")?;
        }
        if pps.scc_extension.pps_slice_act_qp_offsets_present_flag {
            self.slice_act_y_qp_offset = reader.read_se_range(-12, 12, "slice_act_y_qp_offset")?;
            self.slice_act_cb_qp_offset = reader.read_se_range(-12, 12, "slice_act_cb_qp_offset")?;
            self.slice_act_cr_qp_offset = reader.read_se_range(-12, 12, "slice_act_cr_qp_offset")?;
        }
        if pps.range_extension.chroma_qp_offset_list_enabled_flag {
            self.cu_chroma_qp_offset_enabled_flag = reader.read_bool()?;
        }

        if pps.deblocking_filter_override_enabled_flag {
            self.deblocking_filter_override_flag = reader.read_bool()?;
        }
        if self.deblocking_filter_override_flag {
            self.slice_deblocking_filter_disabled_flag = reader.read_bool()?;
            if !self.slice_deblocking_filter_disabled_flag {
                self.slice_beta_offset_div2 = reader.read_se_range(-6, 6, "slice_beta_offset_div2")?;
                self.slice_tc_offset_div2 = reader.read_se_range(-6, 6, "slice_tc_offset_div2")?;
            }
        }

        if pps.pps_loop_filter_across_slices_enabled_flag
            && (self.slice_sao_luma_flag
                || self.slice_sao_chroma_flag
                || !self.slice_deblocking_filter_disabled_flag)
        {
            self.slice_loop_filter_across_slices_enabled_flag = reader.read_bool()?;
        }

        Ok(())
    }

    fn parse_inter(
        &mut self,
        reader: &mut BitstreamReader,
        pps: &Pps,
        sps: &Sps,
        used_by_curr_pic_lt: &[bool],
    ) -> Result<()> {
        let is_b = self.slice_type.is_b();

        self.num_ref_idx_active_override_flag = reader.read_bool()?;
        if self.num_ref_idx_active_override_flag {
            self.num_ref_idx_l0_active_minus1 = reader.read_ue_max(14, "num_ref_idx_l0_active_minus1")?;
            if is_b {
                self.num_ref_idx_l1_active_minus1 =
                    reader.read_ue_max(14, "num_ref_idx_l1_active_minus1")?;
            }
        } else {
            self.num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1 as u32;
            self.num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1 as u32;
        }

        let st_rps = self.active_short_term_ref_pic_set();
        let mut total = st_rps.num_used_by_curr() as u32
            + used_by_curr_pic_lt.iter().filter(|&&used| used).count() as u32;
        if pps.scc_extension.pps_curr_pic_ref_enabled_flag {
            total += 1;
        }
        self.num_pic_total_curr = total;

        if pps.lists_modification_present_flag && total > 1 {
            self.ref_pic_list_modification = self.parse_list_modification(reader, total)?;
        }

        if is_b {
            self.mvd_l1_zero_flag = reader.read_bool()?;
        }
        if pps.cabac_init_present_flag {
            self.cabac_init_flag = reader.read_bool()?;
        }

        if self.slice_temporal_mvp_enabled_flag {
            if is_b {
                self.collocated_from_l0_flag = reader.read_bool()?;
            }
            let max_idx = if self.collocated_from_l0_flag {
                self.num_ref_idx_l0_active_minus1
            } else {
                self.num_ref_idx_l1_active_minus1
            };
            if max_idx > 0 {
                self.collocated_ref_idx = reader.read_ue_max(max_idx, "collocated_ref_idx")?;
            }
        }

        if (pps.weighted_pred_flag && self.slice_type == SliceType::P)
            || (pps.weighted_bipred_flag && is_b)
        {
            self.pred_weight_table = Some(PredWeightTable::parse(reader, self, sps)?);
        }

        self.five_minus_max_num_merge_cand = reader.read_ue_max(4, "five_minus_max_num_merge_cand")?;
        if sps.scc_extension.motion_vector_resolution_control_idc == 2 {
            self.use_integer_mv_flag = reader.read_bool()?;
        }

        Ok(())
    }

    fn parse_list_modification(
        &self,
        reader: &mut BitstreamReader,
        num_pic_total_curr: u32,
    ) -> Result<RefPicListModification> {
        let bits = ceil_log2(num_pic_total_curr);
        let read_entries = |reader: &mut BitstreamReader, count: u32| -> Result<Vec<u32>> {
            (0..count)
                .map(|_| {
                    let entry = reader.read_bits(bits)?;
                    if entry >= num_pic_total_curr {
                        return Err(Error::parse("slice header", "list_entry out of range"));
                    }
                    Ok(entry)
                })
                .collect()
        };

        let mut modification = RefPicListModification {
            ref_pic_list_modification_flag_l0: reader.read_bool()?,
            ..Default::default()
        };
        if modification.ref_pic_list_modification_flag_l0 {
            modification.list_entry_l0 = read_entries(reader, self.num_ref_idx_l0_active_minus1 + 1)?;
        }

        if self.slice_type.is_b() {
            modification.ref_pic_list_modification_flag_l1 = reader.read_bool()?;
            if modification.ref_pic_list_modification_flag_l1 {
                modification.list_entry_l1 =
                    read_entries(reader, self.num_ref_idx_l1_active_minus1 + 1)?;
            }
        }

        Ok(modification)
    }

    /// The short-term RPS in effect: the SPS entry or the header's own set
    pub fn active_short_term_ref_pic_set(&self) -> &ShortTermRefPicSet {
        if self.short_term_ref_pic_set_sps_flag {
            self.sps
                .short_term_ref_pic_sets
                .get(self.short_term_ref_pic_set_idx as usize)
                .unwrap_or(&self.short_term_ref_pic_set)
        } else {
            &self.short_term_ref_pic_set
        }
    }

    /// Take over the fields a dependent slice segment does not carry
    ///
    /// Everything from `slice_type` up to the entry points is copied from the
    /// preceding independent segment.
    pub fn inherit_from(&mut self, independent: &SliceHeader) {
        *self = SliceHeader {
            first_slice_segment_in_pic_flag: self.first_slice_segment_in_pic_flag,
            no_output_of_prior_pics_flag: self.no_output_of_prior_pics_flag,
            slice_pic_parameter_set_id: self.slice_pic_parameter_set_id,
            dependent_slice_segment_flag: self.dependent_slice_segment_flag,
            slice_segment_address: self.slice_segment_address,
            num_entry_point_offsets: self.num_entry_point_offsets,
            offset_len_minus1: self.offset_len_minus1,
            entry_point_offset_minus1: std::mem::take(&mut self.entry_point_offset_minus1),
            header_size: self.header_size,
            pps: self.pps.clone(),
            sps: self.sps.clone(),
            ..independent.clone()
        };
    }
}

/// A parsed slice segment together with the header of its NAL unit
#[derive(Debug, Clone)]
pub struct H265Slice {
    pub header: SliceHeader,
    pub nal_header: NalHeader,
}

impl H265Slice {
    pub fn nal_unit_type(&self) -> NalUnitType {
        self.nal_header.nal_unit_type
    }
}
