//! Picture order count (8.3.1)

use super::nal::NalUnitType;
use super::picture::H265Picture;
use super::slice::H265Slice;

/// POC derivation state carried from picture to picture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PocCalculator {
    /// PicOrderCntVal of the last picture
    pub poc: i32,
    pub poc_msb: i32,
    pub poc_lsb: i32,
    pub prev_poc_msb: i32,
    pub prev_poc_lsb: i32,
    /// POC of the previous TemporalId 0 picture that is not RASL, RADL or a
    /// sub-layer non-reference picture
    pub prev_tid0pic_poc_lsb: i32,
    pub prev_tid0pic_poc_msb: i32,
}

impl PocCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the POC of the picture started by `slice`
    ///
    /// Must run once per picture, on its first slice segment, after
    /// `no_rasl_output_flag` has been set on the picture.
    pub fn calculate(&mut self, slice: &H265Slice, picture: &mut H265Picture) {
        let (poc, poc_lsb) = self.compute(
            slice.nal_unit_type(),
            slice.nal_header.nuh_temporal_id_plus1,
            slice.header.slice_pic_order_cnt_lsb as i32,
            slice.header.sps.max_pic_order_cnt_lsb(),
            picture.no_rasl_output_flag,
        );

        picture.pic_order_cnt = poc;
        picture.pic_order_cnt_lsb = poc_lsb;
    }

    /// Equations 8-1 and 8-2; returns (PicOrderCntVal, pic_order_cnt_lsb)
    pub fn compute(
        &mut self,
        nal_type: NalUnitType,
        temporal_id_plus1: u8,
        pic_order_cnt_lsb: i32,
        max_pic_order_cnt_lsb: i32,
        no_rasl_output_flag: bool,
    ) -> (i32, i32) {
        let irap_with_no_rasl = nal_type.is_irap() && no_rasl_output_flag;

        if irap_with_no_rasl {
            self.prev_poc_lsb = self.poc_lsb;
            self.prev_poc_msb = self.poc_msb;
        } else {
            self.prev_poc_lsb = self.prev_tid0pic_poc_lsb;
            self.prev_poc_msb = self.prev_tid0pic_poc_msb;
        }

        self.poc_msb = if irap_with_no_rasl {
            0
        } else if pic_order_cnt_lsb < self.prev_poc_lsb
            && self.prev_poc_lsb - pic_order_cnt_lsb >= max_pic_order_cnt_lsb / 2
        {
            self.prev_poc_msb + max_pic_order_cnt_lsb
        } else if pic_order_cnt_lsb > self.prev_poc_lsb
            && pic_order_cnt_lsb - self.prev_poc_lsb > max_pic_order_cnt_lsb / 2
        {
            self.prev_poc_msb - max_pic_order_cnt_lsb
        } else {
            self.prev_poc_msb
        };

        self.poc = self.poc_msb + pic_order_cnt_lsb;
        self.poc_lsb = pic_order_cnt_lsb;

        let mut result = (self.poc, pic_order_cnt_lsb);

        if nal_type.is_idr() {
            *self = PocCalculator::default();
            result = (0, 0);
        }

        tracing::debug!(poc = result.0, lsb = result.1, "PicOrderCntVal");

        if temporal_id_plus1 == 1
            && !nal_type.is_rasl()
            && !nal_type.is_radl()
            && nal_type.is_sub_layer_reference()
        {
            self.prev_tid0pic_poc_lsb = pic_order_cnt_lsb;
            self.prev_tid0pic_poc_msb = self.poc_msb;
        }

        result
    }

    pub fn reset(&mut self) {
        *self = PocCalculator::default();
    }
}
