//! H.265/HEVC decoder state machine
//!
//! [`H265Decoder`] consumes one access unit per [`H265Decoder::decode`] call.
//! It keeps the parameter sets, derives POC and reference picture sets,
//! manages the DPB and decides when pictures are output. Sample decoding is
//! delegated to an [`H265Backend`].
//!
//! # Example
//!
//! ```rust,no_run
//! use hevcdec_lib::codec::h265::{DecoderConfig, H265Backend, H265Decoder};
//!
//! # fn run<B: H265Backend>(backend: B, stream: &[u8]) -> hevcdec_lib::Result<()> {
//! let mut decoder = H265Decoder::new(backend, DecoderConfig::default());
//! for (frame_number, au) in hevcdec_lib::codec::h265::split_access_units(stream)
//!     .into_iter()
//!     .enumerate()
//! {
//!     decoder.decode(frame_number as u32, au)?;
//! }
//! decoder.drain()?;
//! # Ok(())
//! # }
//! ```

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::backend::H265Backend;
use super::config_record::HevcDecoderConfigurationRecord;
use super::dpb::Dpb;
use super::headers::{CropRect, Sps};
use super::level;
use super::nal::{identify_nal_units, NalFraming, NalUnit, NalUnitType};
use super::output::{LatencyInfo, OutputQueue};
use super::parser::ParameterSets;
use super::picture::{BufferFlags, H265Picture, PictureRef};
use super::poc::PocCalculator;
use super::ref_lists::RefPicLists;
use super::rps::ReferencePictureSet;
use super::sei::SeiPayload;
use super::slice::{H265Slice, SliceHeader};
use crate::error::{Error, Result};

/// How NAL units are delimited in the input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamFormat {
    /// Annex-B start codes
    #[default]
    ByteStream,
    /// Length-prefixed, parameter sets only in the codec data
    Hvc1,
    /// Length-prefixed, parameter sets may also be in-band
    Hev1,
}

impl StreamFormat {
    pub fn is_packetized(self) -> bool {
        !matches!(self, StreamFormat::ByteStream)
    }
}

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Input framing
    pub framing: StreamFormat,
    /// Live source, forwarded to `get_preferred_output_delay`
    pub is_live: bool,
    /// Build RefPicList0/1 for every P and B slice
    pub process_ref_pic_lists: bool,
    /// Length prefix size for packetized input without codec data
    pub nal_length_size: u8,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            framing: StreamFormat::ByteStream,
            is_live: false,
            process_ref_pic_lists: true,
            nal_length_size: 4,
        }
    }
}

impl DecoderConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(1..=4).contains(&self.nal_length_size) {
            return Err(Error::Config(format!(
                "nal_length_size must be 1 to 4, got {}",
                self.nal_length_size
            )));
        }
        Ok(())
    }
}

/// SPS properties whose change starts a new sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SequenceState {
    width: u32,
    height: u32,
    max_dpb_size: u32,
    field_seq_flag: bool,
    progressive_source_flag: bool,
    interlaced_source_flag: bool,
    conformance_window_flag: bool,
    crop_rect: CropRect,
}

impl SequenceState {
    fn new(sps: &Sps, max_dpb_size: u32) -> Self {
        SequenceState {
            width: sps.pic_width_in_luma_samples,
            height: sps.pic_height_in_luma_samples,
            max_dpb_size,
            field_seq_flag: sps.field_seq_flag(),
            progressive_source_flag: sps.profile_tier_level.general_progressive_source_flag,
            interlaced_source_flag: sps.profile_tier_level.general_interlaced_source_flag,
            conformance_window_flag: sps.conformance_window_flag,
            crop_rect: sps.crop_rect,
        }
    }
}

/// Picture timing of the access unit being decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameTiming {
    pic_struct: u8,
    source_scan_type: u8,
    duplicate_flag: bool,
}

impl Default for FrameTiming {
    fn default() -> Self {
        FrameTiming {
            pic_struct: 0,
            source_scan_type: 2,
            duplicate_flag: false,
        }
    }
}

/// H.265/HEVC decoder driving an [`H265Backend`]
pub struct H265Decoder<B: H265Backend> {
    backend: B,
    config: DecoderConfig,
    nal_length_size: u8,

    parameter_sets: ParameterSets,
    active_sps: Option<Rc<Sps>>,
    sequence: Option<SequenceState>,
    sps_max_latency_pictures: u32,
    latency: Option<LatencyInfo>,

    dpb: Dpb,
    poc: PocCalculator,
    rps: ReferencePictureSet,
    ref_lists: RefPicLists,
    output_queue: OutputQueue,
    last_output_poc: i32,

    current_picture: Option<PictureRef>,
    /// Header of the last independent slice segment, for dependent ones
    prev_independent_slice: Option<SliceHeader>,
    /// The picture of the current access unit was dropped; ignore its remaining slices
    skipping_picture: bool,

    associated_irap_no_rasl_output_flag: bool,
    new_bitstream: bool,
    prev_nal_is_eos: bool,
    timing: FrameTiming,
}

impl<B: H265Backend> H265Decoder<B> {
    /// Create a decoder
    ///
    /// An out-of-range `nal_length_size` falls back to 4.
    pub fn new(backend: B, config: DecoderConfig) -> Self {
        let nal_length_size = if let Err(err) = config.validate() {
            tracing::warn!(error = %err, "using 4 byte NAL length prefixes");
            4
        } else {
            config.nal_length_size
        };

        H265Decoder {
            backend,
            config,
            nal_length_size,
            parameter_sets: ParameterSets::new(),
            active_sps: None,
            sequence: None,
            sps_max_latency_pictures: 0,
            latency: None,
            dpb: Dpb::new(),
            poc: PocCalculator::new(),
            rps: ReferencePictureSet::new(),
            ref_lists: RefPicLists::new(),
            output_queue: OutputQueue::new(0),
            last_output_poc: i32::MIN,
            current_picture: None,
            prev_independent_slice: None,
            skipping_picture: false,
            associated_irap_no_rasl_output_flag: false,
            new_bitstream: true,
            prev_nal_is_eos: false,
            timing: FrameTiming::default(),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Length prefix size used for packetized input
    pub fn nal_length_size(&self) -> u8 {
        self.nal_length_size
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn dpb(&self) -> &Dpb {
        &self.dpb
    }

    pub fn parameter_sets(&self) -> &ParameterSets {
        &self.parameter_sets
    }

    /// SPS of the current sequence
    pub fn active_sps(&self) -> Option<&Rc<Sps>> {
        self.active_sps.as_ref()
    }

    /// Latency of the current sequence, `None` before the first one
    pub fn latency(&self) -> Option<LatencyInfo> {
        self.latency
    }

    /// Picture in the DPB decoded from `frame_number`
    pub fn get_picture(&self, frame_number: u32) -> Option<PictureRef> {
        self.dpb.get_picture(frame_number)
    }

    fn framing(&self) -> NalFraming {
        if self.config.framing.is_packetized() {
            NalFraming::LengthPrefixed(self.nal_length_size)
        } else {
            NalFraming::AnnexB
        }
    }

    /// Apply an hvcC record
    ///
    /// Switches to length-prefixed input and processes the parameter sets
    /// carried by the record.
    pub fn set_codec_data(&mut self, data: &[u8]) -> Result<()> {
        let record = HevcDecoderConfigurationRecord::parse(data)?;

        tracing::debug!(
            nal_length_size = record.nal_length_size,
            arrays = record.arrays.len(),
            "codec data"
        );

        self.nal_length_size = record.nal_length_size;
        if !self.config.framing.is_packetized() {
            self.config.framing = StreamFormat::Hvc1;
        }

        for nal in record.nal_units() {
            match nal.nal_type() {
                NalUnitType::VpsNut | NalUnitType::SpsNut | NalUnitType::PpsNut => {
                    self.decode_parameter_set(nal)?
                }
                NalUnitType::PrefixSeiNut | NalUnitType::SuffixSeiNut => self.decode_sei(nal),
                other => tracing::debug!(nal_type = ?other, "ignoring NAL unit in codec data"),
            }
        }

        Ok(())
    }

    /// Decode one access unit
    ///
    /// A malformed NAL unit is skipped. When the picture fails, its frame
    /// is released and the error returned; the decoder stays usable unless
    /// [`Error::is_fatal`] says otherwise. A frame that produced no picture
    /// is released before returning.
    pub fn decode(&mut self, frame_number: u32, data: &[u8]) -> Result<()> {
        tracing::trace!(frame_number, size = data.len(), "decode");

        self.timing = FrameTiming::default();
        self.skipping_picture = false;

        let mut result = Ok(());
        for item in identify_nal_units(data, self.framing()) {
            let nal = match item {
                Ok(nal) => nal,
                Err(err) => {
                    tracing::warn!(frame_number, error = %err, "dropping NAL unit");
                    continue;
                }
            };

            if let Err(err) = self.decode_nal(&nal, frame_number) {
                result = Err(err);
                break;
            }
        }

        if let Err(err) = result {
            tracing::warn!(frame_number, error = %err, "dropping picture");
            self.abandon_current_picture(frame_number);
            return Err(err);
        }

        if self.current_picture.is_some() {
            self.finish_current_picture()
        } else {
            self.backend.release_frame(frame_number);
            Ok(())
        }
    }

    /// Output every remaining picture and empty the DPB
    pub fn drain(&mut self) -> Result<()> {
        tracing::debug!(pending = self.dpb.num_needed_for_output(), "drain");

        let mut result = Ok(());
        while let Some(picture) = self.dpb.bump(true) {
            keep_first_error(&mut result, self.do_output_picture(picture));
        }
        self.dpb.clear();
        self.last_output_poc = i32::MIN;

        for entry in self.output_queue.drain() {
            keep_first_error(
                &mut result,
                self.backend
                    .output_picture(entry.frame_number, entry.picture)
                    .map_err(|err| callback_failed("output_picture", err)),
            );
        }

        result
    }

    /// End of stream
    pub fn finish(&mut self) -> Result<()> {
        self.drain()
    }

    /// Discard every picture without output
    ///
    /// Frames that were waiting for output are released. The next CRA picture
    /// is handled as the first of a bitstream.
    pub fn flush(&mut self) {
        tracing::debug!(dpb = self.dpb.len(), queued = self.output_queue.len(), "flush");

        if let Some(picture) = self.current_picture.take() {
            self.backend.release_frame(picture.borrow().frame_number);
        }

        for picture in self.dpb.pictures() {
            let pic = picture.borrow();
            if pic.needed_for_output() {
                self.backend.release_frame(pic.frame_number);
            }
        }
        for entry in self.output_queue.drain() {
            self.backend.release_frame(entry.frame_number);
        }

        self.dpb.clear();
        self.rps.clear();
        self.ref_lists.clear();
        self.poc.reset();
        self.prev_independent_slice = None;
        self.skipping_picture = false;
        self.last_output_poc = i32::MIN;
        self.new_bitstream = true;
    }

    fn decode_nal(&mut self, nal: &NalUnit, frame_number: u32) -> Result<()> {
        let nal_type = nal.nal_type();
        tracing::trace!(nal_type = ?nal_type, size = nal.size, "NAL unit");

        match nal_type {
            NalUnitType::VpsNut | NalUnitType::SpsNut | NalUnitType::PpsNut => {
                self.decode_parameter_set(nal)?
            }
            NalUnitType::PrefixSeiNut | NalUnitType::SuffixSeiNut => self.decode_sei(nal),
            NalUnitType::EobNut => self.new_bitstream = true,
            NalUnitType::EosNut => self.prev_nal_is_eos = true,
            t if t.is_slice() => {
                self.parse_slice(nal, frame_number)?;
                self.new_bitstream = false;
                self.prev_nal_is_eos = false;
            }
            _ => {}
        }

        Ok(())
    }

    /// Store a parameter set; malformed ones are dropped
    fn decode_parameter_set(&mut self, nal: &NalUnit) -> Result<()> {
        let parsed = match nal.nal_type() {
            NalUnitType::VpsNut => self.parameter_sets.parse_vps(nal).map(|_| ()),
            NalUnitType::PpsNut => self.parameter_sets.parse_pps(nal).map(|_| ()),
            _ => return self.decode_sps(nal),
        };

        if let Err(err) = parsed {
            tracing::warn!(nal_type = ?nal.nal_type(), error = %err, "dropping parameter set");
        }
        Ok(())
    }

    /// Store an SPS; it becomes active with the first slice referring to it
    ///
    /// An SPS replacing the active id stays pending until then, so the
    /// activating IRAP decides whether prior pictures are output.
    fn decode_sps(&mut self, nal: &NalUnit) -> Result<()> {
        let sps = match self.parameter_sets.parse_sps(nal) {
            Ok(sps) => sps,
            Err(err) => {
                tracing::warn!(error = %err, "dropping SPS");
                return Ok(());
            }
        };

        let replaces_active = self
            .active_sps
            .as_ref()
            .is_some_and(|active| active.sps_seq_parameter_set_id == sps.sps_seq_parameter_set_id);
        if replaces_active {
            tracing::debug!(id = sps.sps_seq_parameter_set_id, "active SPS replaced");
        }

        self.parameter_sets.insert_sps(sps);
        Ok(())
    }

    fn decode_sei(&mut self, nal: &NalUnit) {
        let messages = match self.parameter_sets.parse_sei(nal) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring SEI");
                return;
            }
        };

        for message in messages {
            if let SeiPayload::PicTiming(timing) = message.payload {
                tracing::trace!(
                    pic_struct = timing.pic_struct,
                    source_scan_type = timing.source_scan_type,
                    duplicate_flag = timing.duplicate_flag,
                    "picture timing"
                );
                self.timing = FrameTiming {
                    pic_struct: timing.pic_struct,
                    source_scan_type: timing.source_scan_type,
                    duplicate_flag: timing.duplicate_flag,
                };
            }
        }
    }

    /// Start a new sequence when `sps` differs from the current one
    ///
    /// Pending pictures are output first, or discarded when
    /// `no_output_of_prior_pics` is set. A rejection by the backend is a
    /// flow error and leaves the previous sequence active.
    fn process_sps(&mut self, sps: &Rc<Sps>, no_output_of_prior_pics: bool) -> Result<()> {
        let max_dpb_size = level::max_dpb_size(sps);
        let state = SequenceState::new(sps, max_dpb_size);

        if self.sequence != Some(state) {
            tracing::debug!(
                previous = ?self.sequence,
                width = state.width,
                height = state.height,
                max_dpb_size,
                "SPS updated"
            );

            if no_output_of_prior_pics {
                self.discard_dpb();
            } else if let Err(err) = self.drain() {
                tracing::warn!(error = %err, "output failed while draining for a new sequence");
            }

            self.latency = None;
            let delay = self.backend.get_preferred_output_delay(self.config.is_live);

            if let Err(err) = self.backend.new_sequence(sps, max_dpb_size + delay) {
                tracing::warn!(error = %err, "backend did not accept the new sequence");
                return Err(Error::flow(format!("new sequence rejected: {}", err)));
            }

            self.sequence = Some(state);
            self.output_queue.set_delay(delay);
            self.dpb.set_max_num_pics(max_dpb_size as usize);

            let reorder = sps.sps_max_num_reorder_pics[sps.highest_tid()];
            let latency = LatencyInfo::compute(reorder, max_dpb_size, delay, Some(sps.fps));
            tracing::info!(
                width = state.width,
                height = state.height,
                max_dpb_size,
                output_delay = delay,
                min_latency = ?latency.min,
                max_latency = ?latency.max,
                "new sequence"
            );
            self.latency = Some(latency);
        }

        self.sps_max_latency_pictures = sps.max_latency_pictures();
        self.active_sps = Some(sps.clone());
        Ok(())
    }

    fn parse_slice(&mut self, nal: &NalUnit, frame_number: u32) -> Result<()> {
        let mut header = match self.parameter_sets.parse_slice_header(nal) {
            Ok(header) => header,
            Err(err) => {
                tracing::warn!(error = %err, "dropping slice segment");
                return Ok(());
            }
        };

        if header.dependent_slice_segment_flag {
            match &self.prev_independent_slice {
                Some(independent) => header.inherit_from(independent),
                None => {
                    tracing::warn!("dependent slice segment without an independent one");
                    return Ok(());
                }
            }
        } else {
            self.prev_independent_slice = Some(header.clone());
        }

        let slice = H265Slice {
            header,
            nal_header: nal.header,
        };
        self.process_slice(&slice, frame_number)
    }

    fn process_slice(&mut self, slice: &H265Slice, frame_number: u32) -> Result<()> {
        if slice.header.first_slice_segment_in_pic_flag {
            if self.current_picture.is_some() {
                return Err(Error::reference(
                    "first slice segment of a picture while another picture is open",
                ));
            }
            self.skipping_picture = false;
        } else if self.skipping_picture {
            tracing::trace!("skipping slice segment of a dropped picture");
            return Ok(());
        }

        if self.current_picture.is_none() {
            let activates_sps = self
                .active_sps
                .as_ref()
                .map_or(true, |active| !Rc::ptr_eq(active, &slice.header.sps));
            if activates_sps {
                let no_output_of_prior_pics =
                    slice.nal_unit_type().is_irap() && slice.header.no_output_of_prior_pics_flag;
                self.process_sps(&slice.header.sps, no_output_of_prior_pics)?;
            }

            if !self.start_current_picture(slice, frame_number)? {
                self.skipping_picture = true;
                return Ok(());
            }
        }

        self.decode_slice(slice)
    }

    /// PicOutputFlag, NoRaslOutputFlag and friends (8.1.3)
    fn fill_picture(&mut self, slice: &H265Slice, picture: &mut H265Picture) {
        let nal_type = slice.nal_unit_type();
        picture.nal_unit_type = nal_type;
        picture.rap_pic_flag = nal_type.is_bla() || nal_type.is_idr() || nal_type.is_cra();

        picture.no_rasl_output_flag = nal_type.is_idr()
            || nal_type.is_bla()
            || (nal_type.is_cra() && self.new_bitstream)
            || self.prev_nal_is_eos;

        if nal_type.is_irap() {
            picture.intra_pic_flag = true;
            self.associated_irap_no_rasl_output_flag = picture.no_rasl_output_flag;
        }

        picture.output_flag = if nal_type.is_rasl() && self.associated_irap_no_rasl_output_flag {
            false
        } else {
            slice.header.pic_output_flag
        };
    }

    fn init_current_picture(&mut self, slice: &H265Slice, picture: &mut H265Picture) {
        self.fill_picture(slice, picture);
        self.poc.calculate(slice, picture);

        picture.pic_struct = self.timing.pic_struct;
        picture.source_scan_type = self.timing.source_scan_type;
        picture.duplicate_flag = self.timing.duplicate_flag;

        let field_seq_flag = slice.header.sps.field_seq_flag();
        match picture.pic_struct {
            0 => {}
            1 | 9 | 11 if field_seq_flag => picture.buffer_flags |= BufferFlags::TOP_FIELD,
            2 | 10 | 12 if field_seq_flag => picture.buffer_flags |= BufferFlags::BOTTOM_FIELD,
            3 if !field_seq_flag => {
                picture.buffer_flags |= BufferFlags::INTERLACED | BufferFlags::TFF
            }
            4 if !field_seq_flag => picture.buffer_flags |= BufferFlags::INTERLACED,
            other => tracing::debug!(pic_struct = other, field_seq_flag, "pic_struct not mapped"),
        }
    }

    /// Set up the picture started by `slice`
    ///
    /// Returns `false` when the picture is a RASL picture that cannot be
    /// decoded and was dropped.
    fn start_current_picture(&mut self, slice: &H265Slice, frame_number: u32) -> Result<bool> {
        let mut picture = H265Picture::new(frame_number);
        self.init_current_picture(slice, &mut picture);

        if slice.nal_unit_type().is_rasl() && self.associated_irap_no_rasl_output_flag {
            tracing::debug!(poc = picture.pic_order_cnt, "dropping RASL picture");
            return Ok(false);
        }

        if let Err(err) = self.rps.prepare(slice, &picture, &mut self.dpb) {
            tracing::warn!(poc = picture.pic_order_cnt, error = %err, "reference picture set");
            return Err(err);
        }
        tracing::trace!(
            poc = picture.pic_order_cnt,
            refs = self.rps.num_curr_refs(),
            dpb = self.dpb.len(),
            "reference picture set"
        );

        self.dpb_init(slice, &mut picture)?;

        self.backend
            .new_picture(frame_number, &mut picture)
            .map_err(|err| callback_failed("new_picture", err))?;

        let picture = picture.into_ref();
        self.current_picture = Some(picture.clone());

        self.backend
            .start_picture(&picture.borrow(), slice, &self.dpb)
            .map_err(|err| callback_failed("start_picture", err))?;

        Ok(true)
    }

    /// C.5.2.2: output and removal of pictures before the current one is decoded
    fn dpb_init(&mut self, slice: &H265Slice, picture: &mut H265Picture) -> Result<()> {
        let nal_type = slice.nal_unit_type();
        let mut result = Ok(());

        if nal_type.is_irap() && picture.no_rasl_output_flag && !self.new_bitstream {
            picture.no_output_of_prior_pics_flag =
                nal_type.is_cra() || slice.header.no_output_of_prior_pics_flag;

            if picture.no_output_of_prior_pics_flag {
                tracing::debug!("discarding DPB");
                self.discard_dpb();
            } else {
                self.dpb.delete_unused();
                while let Some(to_output) = self.dpb.bump(false) {
                    keep_first_error(&mut result, self.do_output_picture(to_output));
                }

                if self.dpb.is_empty() {
                    self.last_output_poc = i32::MIN;
                } else {
                    tracing::warn!(size = self.dpb.len(), "IRAP picture failed to clear the DPB");
                }
            }
        } else {
            let sps = &slice.header.sps;
            let hi = sps.highest_tid();
            let max_num_reorder = sps.sps_max_num_reorder_pics[hi];
            let max_dec_pic_buffering = sps.sps_max_dec_pic_buffering_minus1[hi] + 1;

            self.dpb.delete_unused();
            while self.dpb.needs_bump(
                max_num_reorder,
                self.sps_max_latency_pictures,
                max_dec_pic_buffering,
            ) {
                match self.dpb.bump(false) {
                    Some(to_output) => {
                        keep_first_error(&mut result, self.do_output_picture(to_output))
                    }
                    None => {
                        tracing::warn!("bumping is needed but no picture to output");
                        break;
                    }
                }
            }
        }

        result
    }

    fn decode_slice(&mut self, slice: &H265Slice) -> Result<()> {
        let picture = self
            .current_picture
            .clone()
            .ok_or_else(|| Error::invalid_state("slice without a current picture"))?;

        if self.config.process_ref_pic_lists {
            self.ref_lists.build(&slice.header, &self.rps, &picture);
        }

        let result = self.backend.decode_slice(
            &picture.borrow(),
            slice,
            &self.ref_lists.list0,
            &self.ref_lists.list1,
        );
        self.ref_lists.clear();

        result.map_err(|err| callback_failed("decode_slice", err))
    }

    fn finish_current_picture(&mut self) -> Result<()> {
        let Some(picture) = self.current_picture.take() else {
            return Ok(());
        };

        let mut result = self
            .backend
            .end_picture(&picture.borrow())
            .map_err(|err| callback_failed("end_picture", err));
        if let Err(err) = &result {
            tracing::warn!(error = %err, "end picture failed");
        }

        keep_first_error(&mut result, self.finish_picture(picture));
        self.rps.clear_pictures();
        result
    }

    /// C.5.2.3: store the decoded picture and bump what became ready
    fn finish_picture(&mut self, picture: PictureRef) -> Result<()> {
        let (frame_number, output_flag, poc) = {
            let pic = picture.borrow();
            (pic.frame_number, pic.output_flag, pic.pic_order_cnt)
        };
        tracing::trace!(frame_number, poc, output_flag, "finish picture");

        self.dpb.delete_unused();
        if !output_flag {
            self.backend.release_frame(frame_number);
        }
        self.dpb.add(picture);

        let max_num_reorder = self
            .active_sps
            .as_ref()
            .map_or(0, |sps| sps.sps_max_num_reorder_pics[sps.highest_tid()]);

        let mut result = Ok(());
        while self
            .dpb
            .needs_bump(max_num_reorder, self.sps_max_latency_pictures, 0)
        {
            match self.dpb.bump(false) {
                Some(to_output) => keep_first_error(&mut result, self.do_output_picture(to_output)),
                None => {
                    tracing::warn!("bumping is needed but no picture to output");
                    break;
                }
            }
        }

        result
    }

    fn do_output_picture(&mut self, picture: PictureRef) -> Result<()> {
        let (frame_number, poc) = {
            let pic = picture.borrow();
            (pic.frame_number, pic.pic_order_cnt)
        };

        if poc < self.last_output_poc {
            tracing::warn!(
                last = self.last_output_poc,
                poc,
                "outputting out of order, likely a broken stream"
            );
        }
        self.last_output_poc = poc;

        tracing::trace!(frame_number, poc, "output picture");
        self.output_queue.push(frame_number, picture);

        let mut result = Ok(());
        while let Some(entry) = self.output_queue.pop_ready() {
            keep_first_error(
                &mut result,
                self.backend
                    .output_picture(entry.frame_number, entry.picture)
                    .map_err(|err| callback_failed("output_picture", err)),
            );
        }
        result
    }

    /// Remove every picture without output, releasing frames still waiting
    fn discard_dpb(&mut self) {
        for entry in self.output_queue.drain() {
            self.backend.release_frame(entry.frame_number);
        }
        while let Some(picture) = self.dpb.bump(true) {
            let frame_number = picture.borrow().frame_number;
            self.backend.release_frame(frame_number);
        }
        self.dpb.clear();
        self.last_output_poc = i32::MIN;
    }

    fn abandon_current_picture(&mut self, frame_number: u32) {
        self.current_picture = None;
        self.rps.clear_pictures();
        self.ref_lists.clear();
        self.prev_independent_slice = None;
        self.skipping_picture = false;
        self.backend.release_frame(frame_number);
    }
}

/// Errors of per-picture callbacks keep their kind; anything else becomes a callback error
fn callback_failed(callback: &'static str, err: Error) -> Error {
    match err {
        Error::Callback { .. } | Error::Flow(_) | Error::InvalidState(_) => err,
        other => Error::callback(callback, other.to_string()),
    }
}

fn keep_first_error(result: &mut Result<()>, next: Result<()>) {
    if result.is_ok() {
        *result = next;
    }
}
