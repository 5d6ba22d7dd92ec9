//! VUI (Video Usability Information) and HRD parameters
//!
//! Only a handful of these fields drive the decoder (`field_seq_flag`,
//! `frame_field_info_present_flag`, the timing info), but the full syntax has
//! to be walked to reach the SPS extension flags behind it.

use super::bitstream::BitstreamReader;
use crate::error::Result;

/// Sample aspect ratios for `aspect_ratio_idc` 0..=16 (Table E.1)
const ASPECT_RATIOS: [(u16, u16); 17] = [
    (0, 1),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

const EXTENDED_SAR: u8 = 255;

/// Per-CPB bitrate and size values of one sub-layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubLayerHrd {
    pub bit_rate_value_minus1: Vec<u32>,
    pub cpb_size_value_minus1: Vec<u32>,
    pub cpb_size_du_value_minus1: Vec<u32>,
    pub bit_rate_du_value_minus1: Vec<u32>,
    pub cbr_flag: Vec<bool>,
}

impl SubLayerHrd {
    fn parse(
        reader: &mut BitstreamReader,
        cpb_cnt_minus1: u32,
        sub_pic_hrd_params_present_flag: bool,
    ) -> Result<Self> {
        let mut hrd = SubLayerHrd::default();

        for _ in 0..=cpb_cnt_minus1 {
            hrd.bit_rate_value_minus1
                .push(reader.read_ue_max(u32::MAX - 1, "bit_rate_value_minus1")?);
            hrd.cpb_size_value_minus1
                .push(reader.read_ue_max(u32::MAX - 1, "cpb_size_value_minus1")?);
            if sub_pic_hrd_params_present_flag {
                hrd.cpb_size_du_value_minus1
                    .push(reader.read_ue_max(u32::MAX - 1, "cpb_size_du_value_minus1")?);
                hrd.bit_rate_du_value_minus1
                    .push(reader.read_ue_max(u32::MAX - 1, "bit_rate_du_value_minus1")?);
            }
            hrd.cbr_flag.push(reader.read_bool()?);
        }

        Ok(hrd)
    }
}

/// Hypothetical reference decoder parameters (E.2.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrdParameters {
    pub nal_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters_present_flag: bool,
    pub sub_pic_hrd_params_present_flag: bool,
    pub tick_divisor_minus2: u8,
    pub du_cpb_removal_delay_increment_length_minus1: u8,
    pub sub_pic_cpb_params_in_pic_timing_sei_flag: bool,
    pub dpb_output_delay_du_length_minus1: u8,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub cpb_size_du_scale: u8,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub au_cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,

    pub fixed_pic_rate_general_flag: [bool; 7],
    pub fixed_pic_rate_within_cvs_flag: [bool; 7],
    pub elemental_duration_in_tc_minus1: [u32; 7],
    pub low_delay_hrd_flag: [bool; 7],
    pub cpb_cnt_minus1: [u32; 7],
    pub nal_sub_layer_hrd: Vec<SubLayerHrd>,
    pub vcl_sub_layer_hrd: Vec<SubLayerHrd>,
}

impl Default for HrdParameters {
    fn default() -> Self {
        HrdParameters {
            nal_hrd_parameters_present_flag: false,
            vcl_hrd_parameters_present_flag: false,
            sub_pic_hrd_params_present_flag: false,
            tick_divisor_minus2: 0,
            du_cpb_removal_delay_increment_length_minus1: 0,
            sub_pic_cpb_params_in_pic_timing_sei_flag: false,
            dpb_output_delay_du_length_minus1: 0,
            bit_rate_scale: 0,
            cpb_size_scale: 0,
            cpb_size_du_scale: 0,
            initial_cpb_removal_delay_length_minus1: 23,
            au_cpb_removal_delay_length_minus1: 23,
            dpb_output_delay_length_minus1: 23,
            fixed_pic_rate_general_flag: [false; 7],
            fixed_pic_rate_within_cvs_flag: [false; 7],
            elemental_duration_in_tc_minus1: [0; 7],
            low_delay_hrd_flag: [false; 7],
            cpb_cnt_minus1: [0; 7],
            nal_sub_layer_hrd: Vec::new(),
            vcl_sub_layer_hrd: Vec::new(),
        }
    }
}

impl HrdParameters {
    /// Parse `hrd_parameters(commonInfPresentFlag, maxNumSubLayersMinus1)`
    pub fn parse(
        reader: &mut BitstreamReader,
        common_inf_present_flag: bool,
        max_sub_layers_minus1: u8,
    ) -> Result<Self> {
        let mut hrd = HrdParameters::default();

        if common_inf_present_flag {
            hrd.nal_hrd_parameters_present_flag = reader.read_bool()?;
            hrd.vcl_hrd_parameters_present_flag = reader.read_bool()?;

            if hrd.nal_hrd_parameters_present_flag || hrd.vcl_hrd_parameters_present_flag {
                hrd.sub_pic_hrd_params_present_flag = reader.read_bool()?;
                if hrd.sub_pic_hrd_params_present_flag {
                    hrd.tick_divisor_minus2 = reader.read_u8(8)?;
                    hrd.du_cpb_removal_delay_increment_length_minus1 = reader.read_u8(5)?;
                    hrd.sub_pic_cpb_params_in_pic_timing_sei_flag = reader.read_bool()?;
                    hrd.dpb_output_delay_du_length_minus1 = reader.read_u8(5)?;
                }

                hrd.bit_rate_scale = reader.read_u8(4)?;
                hrd.cpb_size_scale = reader.read_u8(4)?;
                if hrd.sub_pic_hrd_params_present_flag {
                    hrd.cpb_size_du_scale = reader.read_u8(4)?;
                }

                hrd.initial_cpb_removal_delay_length_minus1 = reader.read_u8(5)?;
                hrd.au_cpb_removal_delay_length_minus1 = reader.read_u8(5)?;
                hrd.dpb_output_delay_length_minus1 = reader.read_u8(5)?;
            }
        }

        for i in 0..=max_sub_layers_minus1 as usize {
            hrd.fixed_pic_rate_general_flag[i] = reader.read_bool()?;
            hrd.fixed_pic_rate_within_cvs_flag[i] = if hrd.fixed_pic_rate_general_flag[i] {
                true
            } else {
                reader.read_bool()?
            };

            if hrd.fixed_pic_rate_within_cvs_flag[i] {
                hrd.elemental_duration_in_tc_minus1[i] =
                    reader.read_ue_max(2047, "elemental_duration_in_tc_minus1")?;
            } else {
                hrd.low_delay_hrd_flag[i] = reader.read_bool()?;
            }

            if !hrd.low_delay_hrd_flag[i] {
                hrd.cpb_cnt_minus1[i] = reader.read_ue_max(31, "cpb_cnt_minus1")?;
            }

            if hrd.nal_hrd_parameters_present_flag {
                hrd.nal_sub_layer_hrd.push(SubLayerHrd::parse(
                    reader,
                    hrd.cpb_cnt_minus1[i],
                    hrd.sub_pic_hrd_params_present_flag,
                )?);
            }
            if hrd.vcl_hrd_parameters_present_flag {
                hrd.vcl_sub_layer_hrd.push(SubLayerHrd::parse(
                    reader,
                    hrd.cpb_cnt_minus1[i],
                    hrd.sub_pic_hrd_params_present_flag,
                )?);
            }
        }

        Ok(hrd)
    }
}

/// Video usability information (E.2.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vui {
    pub aspect_ratio_info_present_flag: bool,
    pub aspect_ratio_idc: u8,
    pub sar_width: u16,
    pub sar_height: u16,
    /// Pixel aspect ratio derived from the fields above
    pub par_n: u16,
    pub par_d: u16,

    pub overscan_info_present_flag: bool,
    pub overscan_appropriate_flag: bool,

    pub video_signal_type_present_flag: bool,
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description_present_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,

    pub chroma_loc_info_present_flag: bool,
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,

    pub neutral_chroma_indication_flag: bool,
    pub field_seq_flag: bool,
    pub frame_field_info_present_flag: bool,

    pub default_display_window_flag: bool,
    pub def_disp_win_left_offset: u32,
    pub def_disp_win_right_offset: u32,
    pub def_disp_win_top_offset: u32,
    pub def_disp_win_bottom_offset: u32,

    pub timing_info_present_flag: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub poc_proportional_to_timing_flag: bool,
    pub num_ticks_poc_diff_one_minus1: u32,
    pub hrd_parameters_present_flag: bool,
    pub hrd_parameters: Option<HrdParameters>,

    pub bitstream_restriction_flag: bool,
    pub tiles_fixed_structure_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub restricted_ref_pic_lists_flag: bool,
    pub min_spatial_segmentation_idc: u32,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_min_cu_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
}

impl Default for Vui {
    fn default() -> Self {
        Vui {
            aspect_ratio_info_present_flag: false,
            aspect_ratio_idc: 0,
            sar_width: 0,
            sar_height: 0,
            par_n: 0,
            par_d: 0,
            overscan_info_present_flag: false,
            overscan_appropriate_flag: false,
            video_signal_type_present_flag: false,
            video_format: 5,
            video_full_range_flag: false,
            colour_description_present_flag: false,
            colour_primaries: 2,
            transfer_characteristics: 2,
            matrix_coefficients: 2,
            chroma_loc_info_present_flag: false,
            chroma_sample_loc_type_top_field: 0,
            chroma_sample_loc_type_bottom_field: 0,
            neutral_chroma_indication_flag: false,
            field_seq_flag: false,
            frame_field_info_present_flag: false,
            default_display_window_flag: false,
            def_disp_win_left_offset: 0,
            def_disp_win_right_offset: 0,
            def_disp_win_top_offset: 0,
            def_disp_win_bottom_offset: 0,
            timing_info_present_flag: false,
            num_units_in_tick: 0,
            time_scale: 0,
            poc_proportional_to_timing_flag: false,
            num_ticks_poc_diff_one_minus1: 0,
            hrd_parameters_present_flag: false,
            hrd_parameters: None,
            bitstream_restriction_flag: false,
            tiles_fixed_structure_flag: false,
            motion_vectors_over_pic_boundaries_flag: true,
            restricted_ref_pic_lists_flag: false,
            min_spatial_segmentation_idc: 0,
            max_bytes_per_pic_denom: 2,
            max_bits_per_min_cu_denom: 1,
            log2_max_mv_length_horizontal: 15,
            log2_max_mv_length_vertical: 15,
        }
    }
}

impl Vui {
    /// Parse `vui_parameters()` of an SPS with the given sub-layer count
    pub fn parse(reader: &mut BitstreamReader, max_sub_layers_minus1: u8) -> Result<Self> {
        let mut vui = Vui::default();

        vui.aspect_ratio_info_present_flag = reader.read_bool()?;
        if vui.aspect_ratio_info_present_flag {
            vui.aspect_ratio_idc = reader.read_u8(8)?;
            if vui.aspect_ratio_idc == EXTENDED_SAR {
                vui.sar_width = reader.read_u16(16)?;
                vui.sar_height = reader.read_u16(16)?;
                vui.par_n = vui.sar_width;
                vui.par_d = vui.sar_height;
            } else if let Some(&(n, d)) = ASPECT_RATIOS.get(vui.aspect_ratio_idc as usize) {
                vui.par_n = n;
                vui.par_d = d;
            }
        }

        vui.overscan_info_present_flag = reader.read_bool()?;
        if vui.overscan_info_present_flag {
            vui.overscan_appropriate_flag = reader.read_bool()?;
        }

        vui.video_signal_type_present_flag = reader.read_bool()?;
        if vui.video_signal_type_present_flag {
            vui.video_format = reader.read_u8(3)?;
            vui.video_full_range_flag = reader.read_bool()?;
            vui.colour_description_present_flag = reader.read_bool()?;
            if vui.colour_description_present_flag {
                vui.colour_primaries = reader.read_u8(8)?;
                vui.transfer_characteristics = reader.read_u8(8)?;
                vui.matrix_coefficients = reader.read_u8(8)?;
            }
        }

        vui.chroma_loc_info_present_flag = reader.read_bool()?;
        if vui.chroma_loc_info_present_flag {
            vui.chroma_sample_loc_type_top_field =
                reader.read_ue_max(5, "chroma_sample_loc_type_top_field")?;
            vui.chroma_sample_loc_type_bottom_field =
                reader.read_ue_max(5, "chroma_sample_loc_type_bottom_field")?;
        }

        vui.neutral_chroma_indication_flag = reader.read_bool()?;
        vui.field_seq_flag = reader.read_bool()?;
        vui.frame_field_info_present_flag = reader.read_bool()?;

        vui.default_display_window_flag = reader.read_bool()?;
        if vui.default_display_window_flag {
            vui.def_disp_win_left_offset = reader.read_ue()?;
            vui.def_disp_win_right_offset = reader.read_ue()?;
            vui.def_disp_win_top_offset = reader.read_ue()?;
            vui.def_disp_win_bottom_offset = reader.read_ue()?;
        }

        vui.timing_info_present_flag = reader.read_bool()?;
        if vui.timing_info_present_flag {
            vui.num_units_in_tick = reader.read_bits(32)?;
            if vui.num_units_in_tick == 0 {
                tracing::warn!("num_units_in_tick = 0 in VUI timing info");
            }
            vui.time_scale = reader.read_bits(32)?;
            if vui.time_scale == 0 {
                tracing::warn!("time_scale = 0 in VUI timing info");
            }

            vui.poc_proportional_to_timing_flag = reader.read_bool()?;
            if vui.poc_proportional_to_timing_flag {
                vui.num_ticks_poc_diff_one_minus1 =
                    reader.read_ue_max(u32::MAX - 1, "num_ticks_poc_diff_one_minus1")?;
            }

            vui.hrd_parameters_present_flag = reader.read_bool()?;
            if vui.hrd_parameters_present_flag {
                vui.hrd_parameters =
                    Some(HrdParameters::parse(reader, true, max_sub_layers_minus1)?);
            }
        }

        vui.bitstream_restriction_flag = reader.read_bool()?;
        if vui.bitstream_restriction_flag {
            vui.tiles_fixed_structure_flag = reader.read_bool()?;
            vui.motion_vectors_over_pic_boundaries_flag = reader.read_bool()?;
            vui.restricted_ref_pic_lists_flag = reader.read_bool()?;
            vui.min_spatial_segmentation_idc =
                reader.read_ue_max(4096, "min_spatial_segmentation_idc")?;
            vui.max_bytes_per_pic_denom = reader.read_ue_max(16, "max_bytes_per_pic_denom")?;
            vui.max_bits_per_min_cu_denom =
                reader.read_ue_max(16, "max_bits_per_min_cu_denom")?;
            vui.log2_max_mv_length_horizontal =
                reader.read_ue_max(16, "log2_max_mv_length_horizontal")?;
            vui.log2_max_mv_length_vertical =
                reader.read_ue_max(15, "log2_max_mv_length_vertical")?;
        }

        Ok(vui)
    }
}
