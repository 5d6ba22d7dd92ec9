//! H.265/HEVC parameter set headers (VPS, SPS, PPS)
//!
//! These headers contain critical decoding parameters and are sent before video data.
//! Parsing follows clause 7.3.2 of the H.265 specification; every `ue(v)` with a
//! defined range is checked and reported as a parse error when violated.

use std::rc::Rc;

use serde::Serialize;

use super::bitstream::BitstreamReader;
use super::short_term_rps::ShortTermRefPicSet;
use super::vui::{HrdParameters, Vui};
use crate::error::{Error, Result};
use crate::util::Rational;

/// Highest VPS id
pub const MAX_VPS_ID: u32 = 15;
/// Highest SPS id
pub const MAX_SPS_ID: u32 = 15;
/// Highest PPS id
pub const MAX_PPS_ID: u32 = 63;

/// Profile, tier and level (7.3.3)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileTierLevel {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_progressive_source_flag: bool,
    pub general_interlaced_source_flag: bool,
    pub general_non_packed_constraint_flag: bool,
    pub general_frame_only_constraint_flag: bool,
    pub general_max_12bit_constraint_flag: bool,
    pub general_max_10bit_constraint_flag: bool,
    pub general_max_8bit_constraint_flag: bool,
    pub general_max_422chroma_constraint_flag: bool,
    pub general_max_420chroma_constraint_flag: bool,
    pub general_max_monochrome_constraint_flag: bool,
    pub general_intra_constraint_flag: bool,
    pub general_one_picture_only_constraint_flag: bool,
    pub general_lower_bit_rate_constraint_flag: bool,
    pub general_max_14bit_constraint_flag: bool,
    /// general_level_idc, 30 times the level number
    pub general_level_idc: u8,

    pub sub_layer_profile_present_flag: Vec<bool>,
    pub sub_layer_level_present_flag: Vec<bool>,
    pub sub_layer_profile_idc: Vec<u8>,
    pub sub_layer_level_idc: Vec<u8>,
}

impl ProfileTierLevel {
    /// Parse `profile_tier_level(1, maxNumSubLayersMinus1)`
    pub fn parse(reader: &mut BitstreamReader, max_sub_layers_minus1: u8) -> Result<Self> {
        let mut ptl = ProfileTierLevel {
            general_profile_space: reader.read_u8(2)?,
            general_tier_flag: reader.read_bool()?,
            general_profile_idc: reader.read_u8(5)?,
            general_profile_compatibility_flags: reader.read_bits(32)?,
            general_progressive_source_flag: reader.read_bool()?,
            general_interlaced_source_flag: reader.read_bool()?,
            general_non_packed_constraint_flag: reader.read_bool()?,
            general_frame_only_constraint_flag: reader.read_bool()?,
            general_max_12bit_constraint_flag: reader.read_bool()?,
            general_max_10bit_constraint_flag: reader.read_bool()?,
            general_max_8bit_constraint_flag: reader.read_bool()?,
            general_max_422chroma_constraint_flag: reader.read_bool()?,
            general_max_420chroma_constraint_flag: reader.read_bool()?,
            general_max_monochrome_constraint_flag: reader.read_bool()?,
            general_intra_constraint_flag: reader.read_bool()?,
            general_one_picture_only_constraint_flag: reader.read_bool()?,
            general_lower_bit_rate_constraint_flag: reader.read_bool()?,
            general_max_14bit_constraint_flag: reader.read_bool()?,
            ..Default::default()
        };

        // general_reserved_zero_33bits + general_inbld_flag/reserved bit
        reader.skip_bits(34)?;
        ptl.general_level_idc = reader.read_u8(8)?;

        let sub_layers = max_sub_layers_minus1 as usize;
        for _ in 0..sub_layers {
            ptl.sub_layer_profile_present_flag.push(reader.read_bool()?);
            ptl.sub_layer_level_present_flag.push(reader.read_bool()?);
        }
        if sub_layers > 0 {
            for _ in sub_layers..8 {
                reader.skip_bits(2)?;
            }
        }

        ptl.sub_layer_profile_idc = vec![0; sub_layers];
        ptl.sub_layer_level_idc = vec![0; sub_layers];
        for i in 0..sub_layers {
            if ptl.sub_layer_profile_present_flag[i] {
                // space(2) tier(1)
                reader.skip_bits(3)?;
                ptl.sub_layer_profile_idc[i] = reader.read_u8(5)?;
                // compatibility flags, source/constraint flags and reserved bits
                reader.skip_bits(32 + 4 + 43 + 1)?;
            }
            if ptl.sub_layer_level_present_flag[i] {
                ptl.sub_layer_level_idc[i] = reader.read_u8(8)?;
            }
        }

        Ok(ptl)
    }
}

/// Table 7-5/7-6 default scaling factors, 4x4
const DEFAULT_SCALING_LIST_4X4: [u8; 16] = [16; 16];

/// Table 7-6 default scaling factors for intra matrices (8x8 and larger)
const DEFAULT_SCALING_LIST_INTRA: [u8; 64] = [
    16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 17, 16, 17, 16, 17, 18, 17, 18, 18, 17, 18, 21, 19, 20,
    21, 20, 19, 21, 24, 22, 22, 24, 24, 22, 22, 24, 25, 25, 27, 30, 27, 25, 25, 29, 31, 35, 35, 31,
    29, 36, 41, 44, 41, 36, 47, 54, 54, 47, 65, 70, 65, 88, 88, 115,
];

/// Table 7-6 default scaling factors for inter matrices (8x8 and larger)
const DEFAULT_SCALING_LIST_INTER: [u8; 64] = [
    16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 17, 17, 17, 17, 17, 18, 18, 18, 18, 18, 18, 20, 20, 20,
    20, 20, 20, 20, 24, 24, 24, 24, 24, 24, 24, 24, 25, 25, 25, 25, 25, 25, 25, 28, 28, 28, 28, 28,
    28, 33, 33, 33, 33, 33, 41, 41, 41, 41, 54, 54, 54, 71, 71, 91,
];

/// Scaling factors in up-right diagonal scan order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingList {
    /// `lists[sizeId][matrixId]`; 16 entries for 4x4, 64 otherwise.
    /// 32x32 has two matrices (intra, inter).
    pub lists: [Vec<Vec<u8>>; 4],
    /// scaling_list_dc_coef_minus8 + 8 for 16x16 and 32x32
    pub dc_coef: [Vec<u8>; 2],
}

impl Default for ScalingList {
    /// Default scaling factors (Table 7-6)
    fn default() -> Self {
        let mut lists: [Vec<Vec<u8>>; 4] = Default::default();
        for (size_id, list) in lists.iter_mut().enumerate() {
            for matrix_id in 0..Self::num_matrices(size_id) {
                list.push(Self::default_list(size_id, matrix_id));
            }
        }
        ScalingList {
            lists,
            dc_coef: [vec![16; 6], vec![16; 2]],
        }
    }
}

impl ScalingList {
    fn num_matrices(size_id: usize) -> usize {
        if size_id == 3 {
            2
        } else {
            6
        }
    }

    fn default_list(size_id: usize, matrix_id: usize) -> Vec<u8> {
        let intra = if size_id == 3 { matrix_id == 0 } else { matrix_id <= 2 };
        match size_id {
            0 => DEFAULT_SCALING_LIST_4X4.to_vec(),
            _ if intra => DEFAULT_SCALING_LIST_INTRA.to_vec(),
            _ => DEFAULT_SCALING_LIST_INTER.to_vec(),
        }
    }

    /// Parse `scaling_list_data()`
    pub fn parse(reader: &mut BitstreamReader) -> Result<Self> {
        let mut sl = ScalingList::default();

        for size_id in 0..4 {
            let coef_num = if size_id == 0 { 16 } else { 64 };
            for matrix_id in 0..Self::num_matrices(size_id) {
                let pred_mode_flag = reader.read_bool()?;

                if !pred_mode_flag {
                    let delta = reader
                        .read_ue_max(matrix_id as u32, "scaling_list_pred_matrix_id_delta")?
                        as usize;
                    if delta == 0 {
                        sl.lists[size_id][matrix_id] = Self::default_list(size_id, matrix_id);
                        if size_id > 1 {
                            sl.dc_coef[size_id - 2][matrix_id] = 16;
                        }
                    } else {
                        let ref_matrix_id = matrix_id - delta;
                        sl.lists[size_id][matrix_id] = sl.lists[size_id][ref_matrix_id].clone();
                        if size_id > 1 {
                            sl.dc_coef[size_id - 2][matrix_id] =
                                sl.dc_coef[size_id - 2][ref_matrix_id];
                        }
                    }
                } else {
                    let mut next_coef: i32 = 8;
                    if size_id > 1 {
                        let dc = reader.read_se_range(-7, 247, "scaling_list_dc_coef_minus8")?;
                        next_coef = dc + 8;
                        sl.dc_coef[size_id - 2][matrix_id] = next_coef as u8;
                    }

                    let list = &mut sl.lists[size_id][matrix_id];
                    for coef in list.iter_mut().take(coef_num) {
                        let delta = reader.read_se_range(-128, 127, "scaling_list_delta_coef")?;
                        next_coef = (next_coef + delta + 256) % 256;
                        *coef = next_coef as u8;
                    }
                }
            }
        }

        Ok(sl)
    }
}

/// Video Parameter Set (VPS)
///
/// Contains parameters that apply to multiple sequences
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vps {
    /// VPS ID (0-15)
    pub vps_video_parameter_set_id: u8,
    /// Base layer internal flag
    pub vps_base_layer_internal_flag: bool,
    /// Base layer available flag
    pub vps_base_layer_available_flag: bool,
    /// Maximum number of layers minus 1
    pub vps_max_layers_minus1: u8,
    /// Maximum sub-layers minus 1 (0-6)
    pub vps_max_sub_layers_minus1: u8,
    /// Temporal ID nesting flag
    pub vps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,

    pub vps_sub_layer_ordering_info_present_flag: bool,
    pub vps_max_dec_pic_buffering_minus1: [u32; 7],
    pub vps_max_num_reorder_pics: [u32; 7],
    pub vps_max_latency_increase_plus1: [u32; 7],

    pub vps_max_layer_id: u8,
    pub vps_num_layer_sets_minus1: u32,

    pub vps_timing_info_present_flag: bool,
    pub vps_num_units_in_tick: u32,
    pub vps_time_scale: u32,
    pub vps_poc_proportional_to_timing_flag: bool,
    pub vps_num_ticks_poc_diff_one_minus1: u32,
    pub vps_num_hrd_parameters: u32,
    pub hrd_layer_set_idx: Vec<u32>,
    pub hrd_parameters: Vec<HrdParameters>,

    pub vps_extension_flag: bool,
}

impl Vps {
    /// Parse VPS from RBSP data
    pub fn parse(rbsp: &[u8]) -> Result<Self> {
        let mut reader = BitstreamReader::new(rbsp);
        let mut vps = Vps {
            vps_video_parameter_set_id: reader.read_u8(4)?,
            vps_base_layer_internal_flag: reader.read_bool()?,
            vps_base_layer_available_flag: reader.read_bool()?,
            vps_max_layers_minus1: reader.read_u8(6)?,
            vps_max_sub_layers_minus1: reader.read_u8(3)?,
            vps_temporal_id_nesting_flag: reader.read_bool()?,
            ..Default::default()
        };
        if vps.vps_max_sub_layers_minus1 > 6 {
            return Err(Error::parse("VPS", "vps_max_sub_layers_minus1 > 6"));
        }

        // vps_reserved_0xffff_16bits
        reader.skip_bits(16)?;
        vps.profile_tier_level = ProfileTierLevel::parse(&mut reader, vps.vps_max_sub_layers_minus1)?;

        vps.vps_sub_layer_ordering_info_present_flag = reader.read_bool()?;
        let max = vps.vps_max_sub_layers_minus1 as usize;
        let first = if vps.vps_sub_layer_ordering_info_present_flag { 0 } else { max };
        for i in first..=max {
            vps.vps_max_dec_pic_buffering_minus1[i] =
                reader.read_ue_max(u32::MAX - 1, "vps_max_dec_pic_buffering_minus1")?;
            vps.vps_max_num_reorder_pics[i] = reader
                .read_ue_max(vps.vps_max_dec_pic_buffering_minus1[i], "vps_max_num_reorder_pics")?;
            vps.vps_max_latency_increase_plus1[i] =
                reader.read_ue_max(u32::MAX - 1, "vps_max_latency_increase_plus1")?;
        }
        for i in 0..first {
            vps.vps_max_dec_pic_buffering_minus1[i] = vps.vps_max_dec_pic_buffering_minus1[max];
            vps.vps_max_num_reorder_pics[i] = vps.vps_max_num_reorder_pics[max];
            vps.vps_max_latency_increase_plus1[i] = vps.vps_max_latency_increase_plus1[max];
        }

        vps.vps_max_layer_id = reader.read_u8(6)?;
        vps.vps_num_layer_sets_minus1 = reader.read_ue_max(1023, "vps_num_layer_sets_minus1")?;
        // layer_id_included_flag[i][j]
        let included_bits =
            vps.vps_num_layer_sets_minus1 as u64 * (vps.vps_max_layer_id as u64 + 1);
        for _ in 0..included_bits {
            reader.skip_bits(1)?;
        }

        vps.vps_timing_info_present_flag = reader.read_bool()?;
        if vps.vps_timing_info_present_flag {
            vps.vps_num_units_in_tick = reader.read_bits(32)?;
            vps.vps_time_scale = reader.read_bits(32)?;
            vps.vps_poc_proportional_to_timing_flag = reader.read_bool()?;
            if vps.vps_poc_proportional_to_timing_flag {
                vps.vps_num_ticks_poc_diff_one_minus1 =
                    reader.read_ue_max(u32::MAX - 1, "vps_num_ticks_poc_diff_one_minus1")?;
            }

            vps.vps_num_hrd_parameters = reader
                .read_ue_max(vps.vps_num_layer_sets_minus1 + 1, "vps_num_hrd_parameters")?;
            for i in 0..vps.vps_num_hrd_parameters {
                vps.hrd_layer_set_idx
                    .push(reader.read_ue_max(vps.vps_num_layer_sets_minus1, "hrd_layer_set_idx")?);
                let cprms_present_flag = if i > 0 { reader.read_bool()? } else { true };
                vps.hrd_parameters.push(HrdParameters::parse(
                    &mut reader,
                    cprms_present_flag,
                    vps.vps_max_sub_layers_minus1,
                )?);
            }
        }

        vps.vps_extension_flag = reader.read_bool()?;

        Ok(vps)
    }

    /// Frame rate signalled by the VPS timing info, if any
    pub fn fps(&self) -> Option<Rational> {
        if self.vps_timing_info_present_flag
            && self.vps_num_units_in_tick > 0
            && self.vps_time_scale > 0
        {
            Some(Rational::new(
                self.vps_time_scale as i64,
                self.vps_num_units_in_tick as i64,
            ))
        } else {
            None
        }
    }
}

/// Cropped output rectangle derived from the conformance window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// sps_range_extension()
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpsRangeExtension {
    pub transform_skip_rotation_enabled_flag: bool,
    pub transform_skip_context_enabled_flag: bool,
    pub implicit_rdpcm_enabled_flag: bool,
    pub explicit_rdpcm_enabled_flag: bool,
    pub extended_precision_processing_flag: bool,
    pub intra_smoothing_disabled_flag: bool,
    pub high_precision_offsets_enabled_flag: bool,
    pub persistent_rice_adaptation_enabled_flag: bool,
    pub cabac_bypass_alignment_enabled_flag: bool,
}

/// sps_scc_extension()
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpsSccExtension {
    pub sps_curr_pic_ref_enabled_flag: bool,
    pub palette_mode_enabled_flag: bool,
    pub palette_max_size: u32,
    pub delta_palette_max_predictor_size: u32,
    pub sps_palette_predictor_initializers_present_flag: bool,
    pub sps_num_palette_predictor_initializers_minus1: u32,
    /// Initializers per component
    pub sps_palette_predictor_initializer: Vec<Vec<u32>>,
    pub motion_vector_resolution_control_idc: u8,
    pub intra_boundary_filtering_disabled_flag: bool,
}

/// Sequence Parameter Set (SPS)
///
/// Contains parameters that apply to all slices in a coded video sequence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sps {
    /// VPS ID reference (0-15)
    pub sps_video_parameter_set_id: u8,
    /// Maximum sub-layers minus 1 (0-6)
    pub sps_max_sub_layers_minus1: u8,
    /// Temporal ID nesting flag
    pub sps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,

    /// SPS ID (0-15)
    pub sps_seq_parameter_set_id: u8,

    /// Chroma format (0=Mono, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u8,
    /// Separate color plane flag
    pub separate_colour_plane_flag: bool,

    /// Picture width in luma samples
    pub pic_width_in_luma_samples: u32,
    /// Picture height in luma samples
    pub pic_height_in_luma_samples: u32,

    pub conformance_window_flag: bool,
    pub conf_win_left_offset: u32,
    pub conf_win_right_offset: u32,
    pub conf_win_top_offset: u32,
    pub conf_win_bottom_offset: u32,

    /// Bit depth (luma) minus 8 (0-6, meaning 8-14 bits)
    pub bit_depth_luma_minus8: u8,
    /// Bit depth (chroma) minus 8 (0-6, meaning 8-14 bits)
    pub bit_depth_chroma_minus8: u8,
    pub log2_max_pic_order_cnt_lsb_minus4: u8,

    pub sps_sub_layer_ordering_info_present_flag: bool,
    pub sps_max_dec_pic_buffering_minus1: [u32; 7],
    pub sps_max_num_reorder_pics: [u32; 7],
    pub sps_max_latency_increase_plus1: [u32; 7],

    pub log2_min_luma_coding_block_size_minus3: u8,
    pub log2_diff_max_min_luma_coding_block_size: u8,
    pub log2_min_luma_transform_block_size_minus2: u8,
    pub log2_diff_max_min_luma_transform_block_size: u8,
    pub max_transform_hierarchy_depth_inter: u8,
    pub max_transform_hierarchy_depth_intra: u8,

    pub scaling_list_enabled_flag: bool,
    pub sps_scaling_list_data_present_flag: bool,
    pub scaling_list: Option<ScalingList>,

    pub amp_enabled_flag: bool,
    pub sample_adaptive_offset_enabled_flag: bool,
    pub pcm_enabled_flag: bool,
    pub pcm_sample_bit_depth_luma_minus1: u8,
    pub pcm_sample_bit_depth_chroma_minus1: u8,
    pub log2_min_pcm_luma_coding_block_size_minus3: u8,
    pub log2_diff_max_min_pcm_luma_coding_block_size: u8,
    pub pcm_loop_filter_disabled_flag: bool,

    pub short_term_ref_pic_sets: Vec<ShortTermRefPicSet>,

    pub long_term_ref_pics_present_flag: bool,
    pub lt_ref_pic_poc_lsb_sps: Vec<u32>,
    pub used_by_curr_pic_lt_sps_flag: Vec<bool>,

    pub sps_temporal_mvp_enabled_flag: bool,
    pub strong_intra_smoothing_enabled_flag: bool,

    pub vui_parameters_present_flag: bool,
    pub vui: Option<Vui>,

    pub sps_extension_present_flag: bool,
    pub sps_range_extension_flag: bool,
    pub sps_multilayer_extension_flag: bool,
    pub sps_3d_extension_flag: bool,
    pub sps_scc_extension_flag: bool,
    pub sps_extension_4bits: u8,
    pub range_extension: SpsRangeExtension,
    pub scc_extension: SpsSccExtension,

    /// ChromaArrayType
    pub chroma_array_type: u8,
    /// Output crop rectangle; the full picture when no conformance window
    pub crop_rect: CropRect,
    /// Frame rate from VUI timing (or VPS timing, filled by the store); 0/1 when unknown
    pub fps: Rational,
}

impl Sps {
    /// Parse SPS from RBSP data
    pub fn parse(rbsp: &[u8]) -> Result<Self> {
        let mut reader = BitstreamReader::new(rbsp);
        let mut sps = Sps {
            sps_video_parameter_set_id: reader.read_u8(4)?,
            sps_max_sub_layers_minus1: reader.read_u8(3)?,
            sps_temporal_id_nesting_flag: reader.read_bool()?,
            ..Default::default()
        };
        if sps.sps_max_sub_layers_minus1 > 6 {
            return Err(Error::parse("SPS", "sps_max_sub_layers_minus1 > 6"));
        }

        sps.profile_tier_level = ProfileTierLevel::parse(&mut reader, sps.sps_max_sub_layers_minus1)?;
        sps.sps_seq_parameter_set_id = reader.read_ue_max(MAX_SPS_ID, "sps_seq_parameter_set_id")? as u8;

        sps.chroma_format_idc = reader.read_ue_max(3, "chroma_format_idc")? as u8;
        if sps.chroma_format_idc == 3 {
            sps.separate_colour_plane_flag = reader.read_bool()?;
        }

        sps.pic_width_in_luma_samples = reader.read_ue_max(16888, "pic_width_in_luma_samples")?;
        sps.pic_height_in_luma_samples = reader.read_ue_max(16888, "pic_height_in_luma_samples")?;
        if sps.pic_width_in_luma_samples == 0 || sps.pic_height_in_luma_samples == 0 {
            return Err(Error::parse("SPS", "zero picture dimension"));
        }

        sps.conformance_window_flag = reader.read_bool()?;
        if sps.conformance_window_flag {
            sps.conf_win_left_offset = reader.read_ue()?;
            sps.conf_win_right_offset = reader.read_ue()?;
            sps.conf_win_top_offset = reader.read_ue()?;
            sps.conf_win_bottom_offset = reader.read_ue()?;
        }

        sps.bit_depth_luma_minus8 = reader.read_ue_max(6, "bit_depth_luma_minus8")? as u8;
        sps.bit_depth_chroma_minus8 = reader.read_ue_max(6, "bit_depth_chroma_minus8")? as u8;
        sps.log2_max_pic_order_cnt_lsb_minus4 =
            reader.read_ue_max(12, "log2_max_pic_order_cnt_lsb_minus4")? as u8;

        sps.sps_sub_layer_ordering_info_present_flag = reader.read_bool()?;
        let max = sps.sps_max_sub_layers_minus1 as usize;
        let first = if sps.sps_sub_layer_ordering_info_present_flag { 0 } else { max };
        for i in first..=max {
            sps.sps_max_dec_pic_buffering_minus1[i] =
                reader.read_ue_max(16, "sps_max_dec_pic_buffering_minus1")?;
            sps.sps_max_num_reorder_pics[i] = reader
                .read_ue_max(sps.sps_max_dec_pic_buffering_minus1[i], "sps_max_num_reorder_pics")?;
            sps.sps_max_latency_increase_plus1[i] =
                reader.read_ue_max(u32::MAX - 1, "sps_max_latency_increase_plus1")?;
        }
        for i in 0..first {
            sps.sps_max_dec_pic_buffering_minus1[i] = sps.sps_max_dec_pic_buffering_minus1[max];
            sps.sps_max_num_reorder_pics[i] = sps.sps_max_num_reorder_pics[max];
            sps.sps_max_latency_increase_plus1[i] = sps.sps_max_latency_increase_plus1[max];
        }

        sps.log2_min_luma_coding_block_size_minus3 =
            reader.read_ue_max(3, "log2_min_luma_coding_block_size_minus3")? as u8;
        sps.log2_diff_max_min_luma_coding_block_size =
            reader.read_ue_max(6, "log2_diff_max_min_luma_coding_block_size")? as u8;
        sps.log2_min_luma_transform_block_size_minus2 =
            reader.read_ue_max(3, "log2_min_luma_transform_block_size_minus2")? as u8;
        sps.log2_diff_max_min_luma_transform_block_size =
            reader.read_ue_max(3, "log2_diff_max_min_luma_transform_block_size")? as u8;
        sps.max_transform_hierarchy_depth_inter =
            reader.read_ue_max(4, "max_transform_hierarchy_depth_inter")? as u8;
        sps.max_transform_hierarchy_depth_intra =
            reader.read_ue_max(4, "max_transform_hierarchy_depth_intra")? as u8;

        sps.scaling_list_enabled_flag = reader.read_bool()?;
        if sps.scaling_list_enabled_flag {
            sps.sps_scaling_list_data_present_flag = reader.read_bool()?;
            sps.scaling_list = Some(if sps.sps_scaling_list_data_present_flag {
                ScalingList::parse(&mut reader)?
            } else {
                ScalingList::default()
            });
        }

        sps.amp_enabled_flag = reader.read_bool()?;
        sps.sample_adaptive_offset_enabled_flag = reader.read_bool()?;
        sps.pcm_enabled_flag = reader.read_bool()?;
        if sps.pcm_enabled_flag {
            sps.pcm_sample_bit_depth_luma_minus1 = reader.read_u8(4)?;
            sps.pcm_sample_bit_depth_chroma_minus1 = reader.read_u8(4)?;
            sps.log2_min_pcm_luma_coding_block_size_minus3 =
                reader.read_ue_max(2, "log2_min_pcm_luma_coding_block_size_minus3")? as u8;
            sps.log2_diff_max_min_pcm_luma_coding_block_size =
                reader.read_ue_max(2, "log2_diff_max_min_pcm_luma_coding_block_size")? as u8;
            sps.pcm_loop_filter_disabled_flag = reader.read_bool()?;
        }

        let num_short_term_ref_pic_sets =
            reader.read_ue_max(64, "num_short_term_ref_pic_sets")? as usize;
        let max_dec_minus1 = sps.sps_max_dec_pic_buffering_minus1[max];
        for i in 0..num_short_term_ref_pic_sets {
            let set = ShortTermRefPicSet::parse(
                &mut reader,
                i,
                num_short_term_ref_pic_sets,
                &sps.short_term_ref_pic_sets,
                max_dec_minus1,
            )?;
            sps.short_term_ref_pic_sets.push(set);
        }

        sps.long_term_ref_pics_present_flag = reader.read_bool()?;
        if sps.long_term_ref_pics_present_flag {
            let num_long_term_ref_pics_sps = reader.read_ue_max(32, "num_long_term_ref_pics_sps")?;
            let lsb_bits = sps.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4;
            for _ in 0..num_long_term_ref_pics_sps {
                sps.lt_ref_pic_poc_lsb_sps.push(reader.read_bits(lsb_bits)?);
                sps.used_by_curr_pic_lt_sps_flag.push(reader.read_bool()?);
            }
        }

        sps.sps_temporal_mvp_enabled_flag = reader.read_bool()?;
        sps.strong_intra_smoothing_enabled_flag = reader.read_bool()?;

        sps.vui_parameters_present_flag = reader.read_bool()?;
        if sps.vui_parameters_present_flag {
            let mut vui = Vui::parse(&mut reader, sps.sps_max_sub_layers_minus1)?;
            let ptl = &sps.profile_tier_level;
            if ptl.general_progressive_source_flag && ptl.general_interlaced_source_flag {
                vui.frame_field_info_present_flag = true;
            }
            sps.vui = Some(vui);
        }

        sps.sps_extension_present_flag = reader.read_bool()?;
        if sps.sps_extension_present_flag {
            sps.sps_range_extension_flag = reader.read_bool()?;
            sps.sps_multilayer_extension_flag = reader.read_bool()?;
            sps.sps_3d_extension_flag = reader.read_bool()?;
            sps.sps_scc_extension_flag = reader.read_bool()?;
            sps.sps_extension_4bits = reader.read_u8(4)?;
        }

        if sps.sps_range_extension_flag {
            sps.range_extension = SpsRangeExtension {
                transform_skip_rotation_enabled_flag: reader.read_bool()?,
                transform_skip_context_enabled_flag: reader.read_bool()?,
                implicit_rdpcm_enabled_flag: reader.read_bool()?,
                explicit_rdpcm_enabled_flag: reader.read_bool()?,
                extended_precision_processing_flag: reader.read_bool()?,
                intra_smoothing_disabled_flag: reader.read_bool()?,
                high_precision_offsets_enabled_flag: reader.read_bool()?,
                persistent_rice_adaptation_enabled_flag: reader.read_bool()?,
                cabac_bypass_alignment_enabled_flag: reader.read_bool()?,
            };
        }

        if sps.sps_multilayer_extension_flag || sps.sps_3d_extension_flag {
            tracing::warn!("multilayer/3d SPS extension not supported, skipping remaining bits");
        } else if sps.sps_scc_extension_flag {
            sps.scc_extension = sps.parse_scc_extension(&mut reader)?;
        }

        sps.derive();
        Ok(sps)
    }

    fn parse_scc_extension(&self, reader: &mut BitstreamReader) -> Result<SpsSccExtension> {
        let mut scc = SpsSccExtension {
            sps_curr_pic_ref_enabled_flag: reader.read_bool()?,
            palette_mode_enabled_flag: reader.read_bool()?,
            ..Default::default()
        };

        if scc.palette_mode_enabled_flag {
            scc.palette_max_size = reader.read_ue_max(64, "palette_max_size")?;
            scc.delta_palette_max_predictor_size = reader.read_ue_max(
                128 - scc.palette_max_size,
                "delta_palette_max_predictor_size",
            )?;
            scc.sps_palette_predictor_initializers_present_flag = reader.read_bool()?;
            if scc.sps_palette_predictor_initializers_present_flag {
                let max_size = scc.palette_max_size + scc.delta_palette_max_predictor_size;
                scc.sps_num_palette_predictor_initializers_minus1 = reader.read_ue_max(
                    max_size.saturating_sub(1),
                    "sps_num_palette_predictor_initializers_minus1",
                )?;

                let num_comps = if self.chroma_format_idc == 0 { 1 } else { 3 };
                let num = scc.sps_num_palette_predictor_initializers_minus1 + 1;
                for comp in 0..num_comps {
                    let bits = if comp == 0 {
                        self.bit_depth_luma_minus8 as u32 + 8
                    } else {
                        self.bit_depth_chroma_minus8 as u32 + 8
                    };
                    let values = (0..num)
                        .map(|_| reader.read_bits(bits))
                        .collect::<Result<Vec<_>>>()?;
                    scc.sps_palette_predictor_initializer.push(values);
                }
            }
        }

        scc.motion_vector_resolution_control_idc = reader.read_u8(2)?;
        scc.intra_boundary_filtering_disabled_flag = reader.read_bool()?;
        Ok(scc)
    }

    /// Derive ChromaArrayType, the crop rectangle and the VUI frame rate
    fn derive(&mut self) {
        self.chroma_array_type = if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc
        };

        const SUB_WIDTH_C: [u32; 4] = [1, 2, 2, 1];
        const SUB_HEIGHT_C: [u32; 4] = [1, 2, 1, 1];

        self.crop_rect = CropRect {
            x: 0,
            y: 0,
            width: self.pic_width_in_luma_samples,
            height: self.pic_height_in_luma_samples,
        };
        if self.conformance_window_flag {
            let idc = if self.separate_colour_plane_flag { 0 } else { self.chroma_format_idc };
            let unit_x = SUB_WIDTH_C[idc as usize];
            let unit_y = SUB_HEIGHT_C[idc as usize];
            let crop_w = (self.conf_win_left_offset + self.conf_win_right_offset) * unit_x;
            let crop_h = (self.conf_win_top_offset + self.conf_win_bottom_offset) * unit_y;

            self.crop_rect = CropRect {
                x: self.conf_win_left_offset * unit_x,
                y: self.conf_win_top_offset * unit_y,
                width: self.pic_width_in_luma_samples.saturating_sub(crop_w),
                height: self.pic_height_in_luma_samples.saturating_sub(crop_h),
            };
        }

        self.fps = Rational::new(0, 1);
        if let Some(vui) = &self.vui {
            if vui.timing_info_present_flag
                && !vui.field_seq_flag
                && !vui.frame_field_info_present_flag
                && vui.num_units_in_tick > 0
            {
                self.fps = Rational::new(vui.time_scale as i64, vui.num_units_in_tick as i64);
            }
        }
    }

    /// Fill in the frame rate from the VPS when the VUI carries none
    pub fn apply_vps_timing(&mut self, vps: &Vps) {
        if !self.fps.is_positive() {
            if let Some(fps) = vps.fps() {
                self.fps = fps;
            }
        }
    }

    /// Get actual luma bit depth
    pub fn bit_depth_luma(&self) -> u8 {
        self.bit_depth_luma_minus8 + 8
    }

    /// Get actual chroma bit depth
    pub fn bit_depth_chroma(&self) -> u8 {
        self.bit_depth_chroma_minus8 + 8
    }

    /// MaxPicOrderCntLsb
    pub fn max_pic_order_cnt_lsb(&self) -> i32 {
        1 << (self.log2_max_pic_order_cnt_lsb_minus4 as u32 + 4)
    }

    /// Number of short-term RPS entries carried by the SPS
    pub fn num_short_term_ref_pic_sets(&self) -> usize {
        self.short_term_ref_pic_sets.len()
    }

    /// num_long_term_ref_pics_sps
    pub fn num_long_term_ref_pics_sps(&self) -> usize {
        self.lt_ref_pic_poc_lsb_sps.len()
    }

    /// CtbLog2SizeY
    pub fn ctb_log2_size_y(&self) -> u32 {
        self.log2_min_luma_coding_block_size_minus3 as u32
            + 3
            + self.log2_diff_max_min_luma_coding_block_size as u32
    }

    /// PicWidthInCtbsY
    pub fn pic_width_in_ctbs_y(&self) -> u32 {
        let ctb_size = 1u32 << self.ctb_log2_size_y();
        (self.pic_width_in_luma_samples + ctb_size - 1) / ctb_size
    }

    /// PicHeightInCtbsY
    pub fn pic_height_in_ctbs_y(&self) -> u32 {
        let ctb_size = 1u32 << self.ctb_log2_size_y();
        (self.pic_height_in_luma_samples + ctb_size - 1) / ctb_size
    }

    /// PicSizeInCtbsY
    pub fn pic_size_in_ctbs_y(&self) -> u32 {
        self.pic_width_in_ctbs_y() * self.pic_height_in_ctbs_y()
    }

    /// VUI field_seq_flag, false without VUI
    pub fn field_seq_flag(&self) -> bool {
        self.vui.as_ref().map_or(false, |vui| vui.field_seq_flag)
    }

    /// HighestTid used for DPB sizing
    pub fn highest_tid(&self) -> usize {
        self.sps_max_sub_layers_minus1 as usize
    }

    /// SpsMaxLatencyPictures for the highest sub-layer, 0 when disabled
    pub fn max_latency_pictures(&self) -> u32 {
        let hi = self.highest_tid();
        let plus1 = self.sps_max_latency_increase_plus1[hi];
        if plus1 == 0 {
            0
        } else {
            self.sps_max_num_reorder_pics[hi].saturating_add(plus1 - 1)
        }
    }
}

/// pps_range_extension()
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpsRangeExtension {
    pub log2_max_transform_skip_block_size_minus2: u32,
    pub cross_component_prediction_enabled_flag: bool,
    pub chroma_qp_offset_list_enabled_flag: bool,
    pub diff_cu_chroma_qp_offset_depth: u32,
    pub chroma_qp_offset_list_len_minus1: u32,
    pub cb_qp_offset_list: Vec<i32>,
    pub cr_qp_offset_list: Vec<i32>,
    pub log2_sao_offset_scale_luma: u32,
    pub log2_sao_offset_scale_chroma: u32,
}

/// pps_scc_extension()
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpsSccExtension {
    pub pps_curr_pic_ref_enabled_flag: bool,
    pub residual_adaptive_colour_transform_enabled_flag: bool,
    pub pps_slice_act_qp_offsets_present_flag: bool,
    pub pps_act_y_qp_offset_plus5: i32,
    pub pps_act_cb_qp_offset_plus5: i32,
    pub pps_act_cr_qp_offset_plus3: i32,
    pub pps_palette_predictor_initializers_present_flag: bool,
    pub pps_num_palette_predictor_initializers: u32,
    pub monochrome_palette_flag: bool,
    pub luma_bit_depth_entry_minus8: u32,
    pub chroma_bit_depth_entry_minus8: u32,
    pub pps_palette_predictor_initializer: Vec<Vec<u32>>,
}

/// Picture Parameter Set (PPS)
///
/// Contains parameters that apply to all slices in a coded picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    /// PPS ID (0-63)
    pub pps_pic_parameter_set_id: u8,
    /// SPS ID reference (0-15)
    pub pps_seq_parameter_set_id: u8,

    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,

    pub num_ref_idx_l0_default_active_minus1: u8,
    pub num_ref_idx_l1_default_active_minus1: u8,
    pub init_qp_minus26: i32,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta_enabled_flag: bool,
    pub diff_cu_qp_delta_depth: u32,
    pub pps_cb_qp_offset: i32,
    pub pps_cr_qp_offset: i32,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
    pub tiles_enabled_flag: bool,
    pub entropy_coding_sync_enabled_flag: bool,

    pub num_tile_columns_minus1: u32,
    pub num_tile_rows_minus1: u32,
    pub uniform_spacing_flag: bool,
    /// Column widths in CTBs minus 1, derived when spacing is uniform
    pub column_width_minus1: Vec<u32>,
    /// Row heights in CTBs minus 1, derived when spacing is uniform
    pub row_height_minus1: Vec<u32>,
    pub loop_filter_across_tiles_enabled_flag: bool,

    pub pps_loop_filter_across_slices_enabled_flag: bool,
    pub deblocking_filter_control_present_flag: bool,
    pub deblocking_filter_override_enabled_flag: bool,
    pub pps_deblocking_filter_disabled_flag: bool,
    pub pps_beta_offset_div2: i32,
    pub pps_tc_offset_div2: i32,

    pub pps_scaling_list_data_present_flag: bool,
    pub scaling_list: Option<ScalingList>,

    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u32,
    pub slice_segment_header_extension_present_flag: bool,

    pub pps_extension_present_flag: bool,
    pub pps_range_extension_flag: bool,
    pub pps_multilayer_extension_flag: bool,
    pub pps_3d_extension_flag: bool,
    pub pps_scc_extension_flag: bool,
    pub pps_extension_4bits: u8,
    pub range_extension: PpsRangeExtension,
    pub scc_extension: PpsSccExtension,
}

impl Default for Pps {
    fn default() -> Self {
        Pps {
            pps_pic_parameter_set_id: 0,
            pps_seq_parameter_set_id: 0,
            dependent_slice_segments_enabled_flag: false,
            output_flag_present_flag: false,
            num_extra_slice_header_bits: 0,
            sign_data_hiding_enabled_flag: false,
            cabac_init_present_flag: false,
            num_ref_idx_l0_default_active_minus1: 0,
            num_ref_idx_l1_default_active_minus1: 0,
            init_qp_minus26: 0,
            constrained_intra_pred_flag: false,
            transform_skip_enabled_flag: false,
            cu_qp_delta_enabled_flag: false,
            diff_cu_qp_delta_depth: 0,
            pps_cb_qp_offset: 0,
            pps_cr_qp_offset: 0,
            pps_slice_chroma_qp_offsets_present_flag: false,
            weighted_pred_flag: false,
            weighted_bipred_flag: false,
            transquant_bypass_enabled_flag: false,
            tiles_enabled_flag: false,
            entropy_coding_sync_enabled_flag: false,
            num_tile_columns_minus1: 0,
            num_tile_rows_minus1: 0,
            uniform_spacing_flag: true,
            column_width_minus1: Vec::new(),
            row_height_minus1: Vec::new(),
            loop_filter_across_tiles_enabled_flag: true,
            pps_loop_filter_across_slices_enabled_flag: false,
            deblocking_filter_control_present_flag: false,
            deblocking_filter_override_enabled_flag: false,
            pps_deblocking_filter_disabled_flag: false,
            pps_beta_offset_div2: 0,
            pps_tc_offset_div2: 0,
            pps_scaling_list_data_present_flag: false,
            scaling_list: None,
            lists_modification_present_flag: false,
            log2_parallel_merge_level_minus2: 0,
            slice_segment_header_extension_present_flag: false,
            pps_extension_present_flag: false,
            pps_range_extension_flag: false,
            pps_multilayer_extension_flag: false,
            pps_3d_extension_flag: false,
            pps_scc_extension_flag: false,
            pps_extension_4bits: 0,
            range_extension: PpsRangeExtension::default(),
            scc_extension: PpsSccExtension::default(),
        }
    }
}

impl Pps {
    /// Parse PPS from RBSP data
    ///
    /// `get_sps` resolves `pps_seq_parameter_set_id`; it is only consulted when
    /// tiles or the range/SCC extensions need SPS values, and a failed lookup
    /// is then a broken link.
    pub fn parse<F>(rbsp: &[u8], get_sps: F) -> Result<Self>
    where
        F: Fn(u8) -> Option<Rc<Sps>>,
    {
        let mut reader = BitstreamReader::new(rbsp);
        let mut pps = Pps {
            pps_pic_parameter_set_id: reader.read_ue_max(MAX_PPS_ID, "pps_pic_parameter_set_id")?
                as u8,
            pps_seq_parameter_set_id: reader.read_ue_max(MAX_SPS_ID, "pps_seq_parameter_set_id")?
                as u8,
            ..Default::default()
        };

        let (pps_id, sps_id) = (pps.pps_pic_parameter_set_id, pps.pps_seq_parameter_set_id);
        let resolve_sps = || {
            get_sps(sps_id).ok_or_else(|| {
                Error::broken_link(format!("PPS {} refers to missing SPS {}", pps_id, sps_id))
            })
        };

        pps.dependent_slice_segments_enabled_flag = reader.read_bool()?;
        pps.output_flag_present_flag = reader.read_bool()?;
        pps.num_extra_slice_header_bits = reader.read_u8(3)?;
        pps.sign_data_hiding_enabled_flag = reader.read_bool()?;
        pps.cabac_init_present_flag = reader.read_bool()?;

        pps.num_ref_idx_l0_default_active_minus1 =
            reader.read_ue_max(14, "num_ref_idx_l0_default_active_minus1")? as u8;
        pps.num_ref_idx_l1_default_active_minus1 =
            reader.read_ue_max(14, "num_ref_idx_l1_default_active_minus1")? as u8;
        pps.init_qp_minus26 = reader.read_se_range(-(26 + 6 * 8), 25, "init_qp_minus26")?;

        pps.constrained_intra_pred_flag = reader.read_bool()?;
        pps.transform_skip_enabled_flag = reader.read_bool()?;
        pps.cu_qp_delta_enabled_flag = reader.read_bool()?;
        if pps.cu_qp_delta_enabled_flag {
            pps.diff_cu_qp_delta_depth = reader.read_ue_max(6, "diff_cu_qp_delta_depth")?;
        }

        pps.pps_cb_qp_offset = reader.read_se_range(-12, 12, "pps_cb_qp_offset")?;
        pps.pps_cr_qp_offset = reader.read_se_range(-12, 12, "pps_cr_qp_offset")?;
        pps.pps_slice_chroma_qp_offsets_present_flag = reader.read_bool()?;
        pps.weighted_pred_flag = reader.read_bool()?;
        pps.weighted_bipred_flag = reader.read_bool()?;
        pps.transquant_bypass_enabled_flag = reader.read_bool()?;
        pps.tiles_enabled_flag = reader.read_bool()?;
        pps.entropy_coding_sync_enabled_flag = reader.read_bool()?;

        if pps.tiles_enabled_flag {
            let sps = resolve_sps()?;
            pps.parse_tiles(&mut reader, &sps)?;
        }

        pps.pps_loop_filter_across_slices_enabled_flag = reader.read_bool()?;
        pps.deblocking_filter_control_present_flag = reader.read_bool()?;
        if pps.deblocking_filter_control_present_flag {
            pps.deblocking_filter_override_enabled_flag = reader.read_bool()?;
            pps.pps_deblocking_filter_disabled_flag = reader.read_bool()?;
            if !pps.pps_deblocking_filter_disabled_flag {
                pps.pps_beta_offset_div2 = reader.read_se_range(-6, 6, "pps_beta_offset_div2")?;
                pps.pps_tc_offset_div2 = reader.read_se_range(-6, 6, "pps_tc_offset_div2")?;
            }
        }

        pps.pps_scaling_list_data_present_flag = reader.read_bool()?;
        if pps.pps_scaling_list_data_present_flag {
            pps.scaling_list = Some(ScalingList::parse(&mut reader)?);
        }

        pps.lists_modification_present_flag = reader.read_bool()?;
        pps.log2_parallel_merge_level_minus2 =
            reader.read_ue_max(4, "log2_parallel_merge_level_minus2")?;
        pps.slice_segment_header_extension_present_flag = reader.read_bool()?;

        pps.pps_extension_present_flag = reader.read_bool()?;
        if pps.pps_extension_present_flag {
            pps.pps_range_extension_flag = reader.read_bool()?;
            pps.pps_multilayer_extension_flag = reader.read_bool()?;
            pps.pps_3d_extension_flag = reader.read_bool()?;
            pps.pps_scc_extension_flag = reader.read_bool()?;
            pps.pps_extension_4bits = reader.read_u8(4)?;
        }

        if pps.pps_range_extension_flag {
            let sps = resolve_sps()?;
            pps.range_extension = pps.parse_range_extension(&mut reader, &sps)?;
        }

        if pps.pps_multilayer_extension_flag || pps.pps_3d_extension_flag {
            tracing::warn!("multilayer/3d PPS extension not supported, skipping remaining bits");
            return Ok(pps);
        }

        if pps.pps_scc_extension_flag {
            let sps = resolve_sps()?;
            pps.scc_extension = Self::parse_scc_extension(&mut reader, &sps)?;
        }

        Ok(pps)
    }

    fn parse_tiles(&mut self, reader: &mut BitstreamReader, sps: &Sps) -> Result<()> {
        let width_in_ctbs = sps.pic_width_in_ctbs_y();
        let height_in_ctbs = sps.pic_height_in_ctbs_y();

        self.num_tile_columns_minus1 =
            reader.read_ue_max(width_in_ctbs.saturating_sub(1).min(19), "num_tile_columns_minus1")?;
        self.num_tile_rows_minus1 =
            reader.read_ue_max(height_in_ctbs.saturating_sub(1).min(21), "num_tile_rows_minus1")?;

        let num_cols = self.num_tile_columns_minus1 + 1;
        let num_rows = self.num_tile_rows_minus1 + 1;

        self.uniform_spacing_flag = reader.read_bool()?;
        if self.uniform_spacing_flag {
            self.column_width_minus1 = (0..num_cols)
                .map(|i| ((i + 1) * width_in_ctbs / num_cols - i * width_in_ctbs / num_cols) - 1)
                .collect();
            self.row_height_minus1 = (0..num_rows)
                .map(|i| ((i + 1) * height_in_ctbs / num_rows - i * height_in_ctbs / num_rows) - 1)
                .collect();
        } else {
            self.column_width_minus1 = Self::read_explicit_spacing(
                reader,
                self.num_tile_columns_minus1,
                width_in_ctbs,
                "column_width_minus1",
            )?;
            self.row_height_minus1 = Self::read_explicit_spacing(
                reader,
                self.num_tile_rows_minus1,
                height_in_ctbs,
                "row_height_minus1",
            )?;
        }

        self.loop_filter_across_tiles_enabled_flag = reader.read_bool()?;
        Ok(())
    }

    /// Reads all but the last size; the last one takes the remaining CTBs
    fn read_explicit_spacing(
        reader: &mut BitstreamReader,
        count_minus1: u32,
        total: u32,
        name: &'static str,
    ) -> Result<Vec<u32>> {
        let mut sizes = Vec::with_capacity(count_minus1 as usize + 1);
        let mut remaining = total;
        for _ in 0..count_minus1 {
            let size_minus1 = reader.read_ue()?;
            remaining = remaining
                .checked_sub(size_minus1 + 1)
                .ok_or_else(|| Error::parse("PPS", format!("{} exceeds picture size", name)))?;
            sizes.push(size_minus1);
        }
        if remaining == 0 {
            return Err(Error::parse("PPS", format!("{} leaves no room for last tile", name)));
        }
        sizes.push(remaining - 1);
        Ok(sizes)
    }

    fn parse_range_extension(
        &self,
        reader: &mut BitstreamReader,
        sps: &Sps,
    ) -> Result<PpsRangeExtension> {
        let mut ext = PpsRangeExtension::default();

        if self.transform_skip_enabled_flag {
            ext.log2_max_transform_skip_block_size_minus2 = reader.read_ue()?;
        }
        ext.cross_component_prediction_enabled_flag = reader.read_bool()?;
        ext.chroma_qp_offset_list_enabled_flag = reader.read_bool()?;
        if ext.chroma_qp_offset_list_enabled_flag {
            ext.diff_cu_chroma_qp_offset_depth = reader.read_ue_max(
                sps.log2_diff_max_min_luma_coding_block_size as u32,
                "diff_cu_chroma_qp_offset_depth",
            )?;
            ext.chroma_qp_offset_list_len_minus1 =
                reader.read_ue_max(5, "chroma_qp_offset_list_len_minus1")?;
            for _ in 0..=ext.chroma_qp_offset_list_len_minus1 {
                ext.cb_qp_offset_list
                    .push(reader.read_se_range(-12, 12, "cb_qp_offset_list")?);
                ext.cr_qp_offset_list
                    .push(reader.read_se_range(-12, 12, "cr_qp_offset_list")?);
            }
        }

        let max_luma = (sps.bit_depth_luma_minus8 as u32).saturating_sub(2);
        let max_chroma = (sps.bit_depth_chroma_minus8 as u32).saturating_sub(2);
        ext.log2_sao_offset_scale_luma = reader.read_ue_max(max_luma, "log2_sao_offset_scale_luma")?;
        ext.log2_sao_offset_scale_chroma =
            reader.read_ue_max(max_chroma, "log2_sao_offset_scale_chroma")?;

        Ok(ext)
    }

    fn parse_scc_extension(reader: &mut BitstreamReader, sps: &Sps) -> Result<PpsSccExtension> {
        let mut ext = PpsSccExtension {
            pps_curr_pic_ref_enabled_flag: reader.read_bool()?,
            residual_adaptive_colour_transform_enabled_flag: reader.read_bool()?,
            ..Default::default()
        };

        if ext.residual_adaptive_colour_transform_enabled_flag {
            ext.pps_slice_act_qp_offsets_present_flag = reader.read_bool()?;
            ext.pps_act_y_qp_offset_plus5 = reader.read_se_range(-7, 17, "pps_act_y_qp_offset_plus5")?;
            ext.pps_act_cb_qp_offset_plus5 =
                reader.read_se_range(-7, 17, "pps_act_cb_qp_offset_plus5")?;
            ext.pps_act_cr_qp_offset_plus3 =
                reader.read_se_range(-9, 15, "pps_act_cr_qp_offset_plus3")?;
        }

        ext.pps_palette_predictor_initializers_present_flag = reader.read_bool()?;
        if ext.pps_palette_predictor_initializers_present_flag {
            let scc = &sps.scc_extension;
            ext.pps_num_palette_predictor_initializers = reader.read_ue_max(
                scc.palette_max_size + scc.delta_palette_max_predictor_size,
                "pps_num_palette_predictor_initializers",
            )?;

            if ext.pps_num_palette_predictor_initializers > 0 {
                ext.monochrome_palette_flag = reader.read_bool()?;
                ext.luma_bit_depth_entry_minus8 = reader.read_ue()?;
                if ext.luma_bit_depth_entry_minus8 != sps.bit_depth_luma_minus8 as u32 {
                    return Err(Error::parse("PPS", "luma_bit_depth_entry_minus8 mismatch"));
                }
                if !ext.monochrome_palette_flag {
                    ext.chroma_bit_depth_entry_minus8 = reader.read_ue()?;
                    if ext.chroma_bit_depth_entry_minus8 != sps.bit_depth_chroma_minus8 as u32 {
                        return Err(Error::parse("PPS", "chroma_bit_depth_entry_minus8 mismatch"));
                    }
                }

                let num_comps = if ext.monochrome_palette_flag { 1 } else { 3 };
                for comp in 0..num_comps {
                    let bits = if comp == 0 {
                        ext.luma_bit_depth_entry_minus8 + 8
                    } else {
                        ext.chroma_bit_depth_entry_minus8 + 8
                    };
                    let values = (0..ext.pps_num_palette_predictor_initializers)
                        .map(|_| reader.read_bits(bits))
                        .collect::<Result<Vec<_>>>()?;
                    ext.pps_palette_predictor_initializer.push(values);
                }
            }
        }

        Ok(ext)
    }
}
