//! Common test utilities for hevcdec integration tests
//!
//! Builds small but syntactically complete HEVC bitstreams (VPS, SPS, PPS
//! and slice segment headers) and provides a backend that records every
//! callback it receives.

#![allow(dead_code)]

use hevcdec_lib::codec::h265::{Dpb, H265Backend, H265Picture, H265Slice, NalUnitType, PictureRef, Sps};
use hevcdec_lib::{Error, Result};

// ============================================================================
// Bit writer
// ============================================================================

/// MSB-first bit writer with Exp-Golomb codes
#[derive(Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    current_byte: u8,
    bit_position: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current_byte |= 1 << (7 - self.bit_position);
        }
        self.bit_position += 1;
        if self.bit_position == 8 {
            self.buffer.push(self.current_byte);
            self.current_byte = 0;
            self.bit_position = 0;
        }
    }

    pub fn write_bits(&mut self, value: u32, num_bits: u8) {
        for i in (0..num_bits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub fn write_ue(&mut self, value: u32) {
        let value_plus1 = value as u64 + 1;
        let len = 64 - value_plus1.leading_zeros() as u8;
        for _ in 0..len - 1 {
            self.write_bit(false);
        }
        for i in (0..len).rev() {
            self.write_bit((value_plus1 >> i) & 1 == 1);
        }
    }

    pub fn write_se(&mut self, value: i32) {
        let mapped = if value <= 0 {
            (-(value as i64) * 2) as u32
        } else {
            (value as i64 * 2 - 1) as u32
        };
        self.write_ue(mapped);
    }

    /// rbsp_trailing_bits() / byte_alignment(): a one bit, then zeros
    pub fn write_trailing_bits(&mut self) {
        self.write_bit(true);
        while self.bit_position != 0 {
            self.write_bit(false);
        }
    }

    pub fn finish(self) -> Vec<u8> {
        assert_eq!(self.bit_position, 0, "RBSP not byte aligned");
        self.buffer
    }
}

/// NAL unit (header plus escaped payload) without start code
pub fn nal_unit(nal_type: NalUnitType, rbsp: &[u8]) -> Vec<u8> {
    let mut nal = vec![nal_type.as_u8() << 1, 0x01];
    let mut zeros = 0;
    for &byte in rbsp {
        if zeros == 2 && byte <= 0x03 {
            nal.push(0x03);
            zeros = 0;
        }
        nal.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }
    nal
}

/// Annex-B byte stream with four byte start codes
pub fn annex_b(nals: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    out
}

/// Length-prefixed (hvc1/hev1) access unit
pub fn length_prefixed(nals: &[Vec<u8>], nal_length_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for nal in nals {
        let len = (nal.len() as u32).to_be_bytes();
        out.extend_from_slice(&len[4 - nal_length_size..]);
        out.extend_from_slice(nal);
    }
    out
}

// ============================================================================
// Parameter sets
// ============================================================================

/// Sequence level knobs of the synthesized stream
#[derive(Debug, Clone)]
pub struct StreamParams {
    pub width: u32,
    pub height: u32,
    pub level_idc: u8,
    pub log2_max_poc_lsb_minus4: u32,
    pub max_dec_pic_buffering_minus1: u32,
    pub max_num_reorder_pics: u32,
    pub max_latency_increase_plus1: u32,
    pub output_flag_present: bool,
}

impl Default for StreamParams {
    fn default() -> Self {
        StreamParams {
            width: 64,
            height: 64,
            // level 3.1
            level_idc: 93,
            log2_max_poc_lsb_minus4: 4,
            max_dec_pic_buffering_minus1: 4,
            max_num_reorder_pics: 2,
            max_latency_increase_plus1: 0,
            output_flag_present: false,
        }
    }
}

fn write_profile_tier_level(w: &mut BitWriter, params: &StreamParams) {
    // profile_space, tier, Main profile
    w.write_bits(0, 2);
    w.write_bit(false);
    w.write_bits(1, 5);
    w.write_bits(0x6000_0000, 32);
    // progressive, interlaced, non_packed, frame_only
    w.write_bit(true);
    w.write_bit(false);
    w.write_bit(false);
    w.write_bit(true);
    // reserved constraint bits
    w.write_bits(0, 32);
    w.write_bits(0, 12);
    w.write_bits(params.level_idc as u32, 8);
}

fn write_ordering_info(w: &mut BitWriter, params: &StreamParams) {
    w.write_bit(true);
    w.write_ue(params.max_dec_pic_buffering_minus1);
    w.write_ue(params.max_num_reorder_pics);
    w.write_ue(params.max_latency_increase_plus1);
}

pub fn vps_nal(params: &StreamParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 4); // vps_video_parameter_set_id
    w.write_bit(true);
    w.write_bit(true);
    w.write_bits(0, 6); // vps_max_layers_minus1
    w.write_bits(0, 3); // vps_max_sub_layers_minus1
    w.write_bit(true);
    w.write_bits(0xFFFF, 16);
    write_profile_tier_level(&mut w, params);
    write_ordering_info(&mut w, params);
    w.write_bits(0, 6); // vps_max_layer_id
    w.write_ue(0); // vps_num_layer_sets_minus1
    w.write_bit(false); // vps_timing_info_present_flag
    w.write_bit(false); // vps_extension_flag
    w.write_trailing_bits();
    nal_unit(NalUnitType::VpsNut, &w.finish())
}

pub fn sps_nal(params: &StreamParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0, 4); // sps_video_parameter_set_id
    w.write_bits(0, 3); // sps_max_sub_layers_minus1
    w.write_bit(true);
    write_profile_tier_level(&mut w, params);
    w.write_ue(0); // sps_seq_parameter_set_id
    w.write_ue(1); // 4:2:0
    w.write_ue(params.width);
    w.write_ue(params.height);
    w.write_bit(false); // conformance_window_flag
    w.write_ue(0);
    w.write_ue(0);
    w.write_ue(params.log2_max_poc_lsb_minus4);
    write_ordering_info(&mut w, params);
    // 8x8 to 16x16 coding blocks, 4x4 to 16x16 transforms
    w.write_ue(0);
    w.write_ue(1);
    w.write_ue(0);
    w.write_ue(2);
    w.write_ue(0);
    w.write_ue(0);
    w.write_bit(false); // scaling_list_enabled_flag
    w.write_bit(false); // amp_enabled_flag
    w.write_bit(false); // sample_adaptive_offset_enabled_flag
    w.write_bit(false); // pcm_enabled_flag
    w.write_ue(0); // num_short_term_ref_pic_sets
    w.write_bit(false); // long_term_ref_pics_present_flag
    w.write_bit(false); // sps_temporal_mvp_enabled_flag
    w.write_bit(false); // strong_intra_smoothing_enabled_flag
    w.write_bit(false); // vui_parameters_present_flag
    w.write_bit(false); // sps_extension_present_flag
    w.write_trailing_bits();
    nal_unit(NalUnitType::SpsNut, &w.finish())
}

pub fn pps_nal(params: &StreamParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_ue(0); // pps_pic_parameter_set_id
    w.write_ue(0); // pps_seq_parameter_set_id
    w.write_bit(false); // dependent_slice_segments_enabled_flag
    w.write_bit(params.output_flag_present);
    w.write_bits(0, 3); // num_extra_slice_header_bits
    w.write_bit(false); // sign_data_hiding_enabled_flag
    w.write_bit(false); // cabac_init_present_flag
    w.write_ue(0);
    w.write_ue(0);
    w.write_se(0); // init_qp_minus26
    w.write_bit(false); // constrained_intra_pred_flag
    w.write_bit(false); // transform_skip_enabled_flag
    w.write_bit(false); // cu_qp_delta_enabled_flag
    w.write_se(0);
    w.write_se(0);
    w.write_bit(false); // pps_slice_chroma_qp_offsets_present_flag
    w.write_bit(false); // weighted_pred_flag
    w.write_bit(false); // weighted_bipred_flag
    w.write_bit(false); // transquant_bypass_enabled_flag
    w.write_bit(false); // tiles_enabled_flag
    w.write_bit(false); // entropy_coding_sync_enabled_flag
    w.write_bit(false); // pps_loop_filter_across_slices_enabled_flag
    w.write_bit(false); // deblocking_filter_control_present_flag
    w.write_bit(false); // pps_scaling_list_data_present_flag
    w.write_bit(false); // lists_modification_present_flag
    w.write_ue(0); // log2_parallel_merge_level_minus2
    w.write_bit(false); // slice_segment_header_extension_present_flag
    w.write_bit(false); // pps_extension_present_flag
    w.write_trailing_bits();
    nal_unit(NalUnitType::PpsNut, &w.finish())
}

/// VPS, SPS and PPS in stream order
pub fn parameter_sets(params: &StreamParams) -> Vec<Vec<u8>> {
    vec![vps_nal(params), sps_nal(params), pps_nal(params)]
}

/// End of sequence NAL unit
pub fn eos_nal() -> Vec<u8> {
    nal_unit(NalUnitType::EosNut, &[])
}

/// hvcC record carrying the parameter sets of `params`
pub fn hvcc(params: &StreamParams, nal_length_size: u8) -> Vec<u8> {
    let mut record = vec![
        1,    // configurationVersion
        0x01, // Main profile
        0x60,
        0x00,
        0x00,
        0x00,
        0x90,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        params.level_idc,
        0xF0,
        0x00,
        0xFC,
        0xFD, // 4:2:0
        0xF8,
        0xF8,
        0x00,
        0x00,
        0x08 | (nal_length_size - 1),
        3, // numOfArrays
    ];

    for nal in parameter_sets(params) {
        record.push(0x80 | (nal[0] >> 1));
        record.extend_from_slice(&1u16.to_be_bytes());
        record.extend_from_slice(&(nal.len() as u16).to_be_bytes());
        record.extend_from_slice(&nal);
    }
    record
}

// ============================================================================
// Slices
// ============================================================================

/// One coded slice segment
#[derive(Debug, Clone)]
pub struct SliceParams {
    pub nal_type: NalUnitType,
    /// 0 = B, 1 = P, 2 = I
    pub slice_type: u32,
    pub poc_lsb: u32,
    /// Short-term reference deltas, all used by the current picture
    pub deltas: Vec<i32>,
    pub no_output_of_prior_pics: bool,
    pub pic_output_flag: bool,
    /// `None` for the first slice segment of a picture
    pub segment_address: Option<u32>,
}

impl SliceParams {
    pub fn new(nal_type: NalUnitType, slice_type: u32, poc_lsb: u32, deltas: &[i32]) -> Self {
        SliceParams {
            nal_type,
            slice_type,
            poc_lsb,
            deltas: deltas.to_vec(),
            no_output_of_prior_pics: false,
            pic_output_flag: true,
            segment_address: None,
        }
    }

    pub fn idr() -> Self {
        Self::new(NalUnitType::IdrWRadl, 2, 0, &[])
    }

    pub fn cra(poc_lsb: u32) -> Self {
        Self::new(NalUnitType::CraNut, 2, poc_lsb, &[])
    }

    pub fn p(poc_lsb: u32, deltas: &[i32]) -> Self {
        Self::new(NalUnitType::TrailR, 1, poc_lsb, deltas)
    }

    pub fn b(poc_lsb: u32, deltas: &[i32]) -> Self {
        Self::new(NalUnitType::TrailN, 0, poc_lsb, deltas)
    }

    pub fn with_nal_type(mut self, nal_type: NalUnitType) -> Self {
        self.nal_type = nal_type;
        self
    }

    pub fn at_address(mut self, address: u32) -> Self {
        self.segment_address = Some(address);
        self
    }
}

pub fn slice_nal(params: &StreamParams, slice: &SliceParams) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bit(slice.segment_address.is_none());
    if (16..=23).contains(&slice.nal_type.as_u8()) {
        w.write_bit(slice.no_output_of_prior_pics);
    }
    w.write_ue(0); // slice_pic_parameter_set_id
    if let Some(address) = slice.segment_address {
        let ctbs = ((params.width + 15) / 16) * ((params.height + 15) / 16);
        let bits = 32 - (ctbs - 1).leading_zeros();
        w.write_bits(address, bits as u8);
    }

    w.write_ue(slice.slice_type);
    if params.output_flag_present {
        w.write_bit(slice.pic_output_flag);
    }

    let is_idr = matches!(slice.nal_type, NalUnitType::IdrWRadl | NalUnitType::IdrNLp);
    let mut negative: Vec<i32> = slice.deltas.iter().copied().filter(|d| *d < 0).collect();
    let mut positive: Vec<i32> = slice.deltas.iter().copied().filter(|d| *d > 0).collect();
    negative.sort_by(|a, b| b.cmp(a));
    positive.sort();

    if !is_idr {
        w.write_bits(slice.poc_lsb, params.log2_max_poc_lsb_minus4 as u8 + 4);
        w.write_bit(false); // short_term_ref_pic_set_sps_flag
        w.write_ue(negative.len() as u32);
        w.write_ue(positive.len() as u32);
        let mut prev = 0;
        for delta in &negative {
            w.write_ue((prev - delta - 1) as u32);
            w.write_bit(true);
            prev = *delta;
        }
        prev = 0;
        for delta in &positive {
            w.write_ue((delta - prev - 1) as u32);
            w.write_bit(true);
            prev = *delta;
        }
    }

    if slice.slice_type != 2 {
        let total = (negative.len() + positive.len()).max(1) as u32;
        w.write_bit(true); // num_ref_idx_active_override_flag
        w.write_ue(total - 1);
        if slice.slice_type == 0 {
            w.write_ue(total - 1);
            w.write_bit(false); // mvd_l1_zero_flag
        }
        w.write_ue(0); // five_minus_max_num_merge_cand
    }

    w.write_se(0); // slice_qp_delta
    w.write_trailing_bits();

    // stand-in for slice data
    let mut rbsp = w.finish();
    rbsp.extend_from_slice(&[0xA5, 0x5A]);
    nal_unit(slice.nal_type, &rbsp)
}

/// Parameter sets followed by one slice, as an Annex-B access unit
pub fn first_access_unit(params: &StreamParams, slice: &SliceParams) -> Vec<u8> {
    let mut nals = parameter_sets(params);
    nals.push(slice_nal(params, slice));
    annex_b(&nals)
}

pub fn access_unit(params: &StreamParams, slice: &SliceParams) -> Vec<u8> {
    annex_b(&[slice_nal(params, slice)])
}

// ============================================================================
// Recording backend
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NewSequence { width: u32, height: u32, max_dpb_size: u32 },
    NewPicture(u32),
    StartPicture(i32),
    DecodeSlice { poc: i32, list0: Vec<Option<i32>>, list1: Vec<Option<i32>> },
    EndPicture(i32),
    Output { frame: u32, poc: i32 },
    Release(u32),
}

/// Backend that records callbacks
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Event>,
    pub output_delay: u32,
    pub fail_new_picture: bool,
}

impl Recorder {
    pub fn with_delay(output_delay: u32) -> Self {
        Recorder {
            output_delay,
            ..Default::default()
        }
    }

    pub fn output_pocs(&self) -> Vec<i32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Output { poc, .. } => Some(*poc),
                _ => None,
            })
            .collect()
    }

    pub fn output_frames(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Output { frame, .. } => Some(*frame),
                _ => None,
            })
            .collect()
    }

    pub fn released(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Release(frame) => Some(*frame),
                _ => None,
            })
            .collect()
    }

    pub fn sequences(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::NewSequence { .. }))
            .count()
    }

    /// Reference lists passed with the slices of `poc`
    pub fn lists_of(&self, poc: i32) -> Vec<(Vec<Option<i32>>, Vec<Option<i32>>)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::DecodeSlice { poc: p, list0, list1 } if *p == poc => {
                    Some((list0.clone(), list1.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

fn pocs(list: &[Option<PictureRef>]) -> Vec<Option<i32>> {
    list.iter()
        .map(|e| e.as_ref().map(|p| p.borrow().pic_order_cnt))
        .collect()
}

impl H265Backend for Recorder {
    fn new_sequence(&mut self, sps: &Sps, max_dpb_size: u32) -> Result<()> {
        self.events.push(Event::NewSequence {
            width: sps.pic_width_in_luma_samples,
            height: sps.pic_height_in_luma_samples,
            max_dpb_size,
        });
        Ok(())
    }

    fn new_picture(&mut self, frame_number: u32, _picture: &mut H265Picture) -> Result<()> {
        if self.fail_new_picture {
            return Err(Error::invalid_state("out of picture buffers"));
        }
        self.events.push(Event::NewPicture(frame_number));
        Ok(())
    }

    fn start_picture(&mut self, picture: &H265Picture, _slice: &H265Slice, _dpb: &Dpb) -> Result<()> {
        self.events.push(Event::StartPicture(picture.pic_order_cnt));
        Ok(())
    }

    fn decode_slice(
        &mut self,
        picture: &H265Picture,
        _slice: &H265Slice,
        ref_pic_list0: &[Option<PictureRef>],
        ref_pic_list1: &[Option<PictureRef>],
    ) -> Result<()> {
        self.events.push(Event::DecodeSlice {
            poc: picture.pic_order_cnt,
            list0: pocs(ref_pic_list0),
            list1: pocs(ref_pic_list1),
        });
        Ok(())
    }

    fn end_picture(&mut self, picture: &H265Picture) -> Result<()> {
        self.events.push(Event::EndPicture(picture.pic_order_cnt));
        Ok(())
    }

    fn output_picture(&mut self, frame_number: u32, picture: PictureRef) -> Result<()> {
        let poc = picture.borrow().pic_order_cnt;
        self.events.push(Event::Output {
            frame: frame_number,
            poc,
        });
        Ok(())
    }

    fn get_preferred_output_delay(&self, _is_live: bool) -> u32 {
        self.output_delay
    }

    fn release_frame(&mut self, frame_number: u32) {
        self.events.push(Event::Release(frame_number));
    }
}
