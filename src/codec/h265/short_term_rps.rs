//! Short-term reference picture set syntax (7.3.7) and its derivation
//!
//! A short-term RPS lists POC deltas relative to the current picture, split
//! into pictures preceding (S0, negative deltas) and following (S1, positive
//! deltas) it in output order. Sets may be predicted from a previously coded
//! set, in which case the deltas are derived with equations 7-61/7-62.

use super::bitstream::BitstreamReader;
use crate::error::{Error, Result};

/// Decoded short-term reference picture set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortTermRefPicSet {
    pub inter_ref_pic_set_prediction_flag: bool,
    pub delta_idx_minus1: u32,
    pub delta_rps_sign: bool,
    pub abs_delta_rps_minus1: u32,
    /// NumDeltaPocs of the set this one was predicted from
    pub num_delta_pocs_of_ref_rps_idx: u32,

    /// DeltaPocS0, strictly decreasing negative values
    pub delta_poc_s0: Vec<i32>,
    /// UsedByCurrPicS0
    pub used_by_curr_pic_s0: Vec<bool>,
    /// DeltaPocS1, strictly increasing positive values
    pub delta_poc_s1: Vec<i32>,
    /// UsedByCurrPicS1
    pub used_by_curr_pic_s1: Vec<bool>,
}

impl ShortTermRefPicSet {
    /// NumNegativePics
    pub fn num_negative_pics(&self) -> usize {
        self.delta_poc_s0.len()
    }

    /// NumPositivePics
    pub fn num_positive_pics(&self) -> usize {
        self.delta_poc_s1.len()
    }

    /// NumDeltaPocs
    pub fn num_delta_pocs(&self) -> usize {
        self.delta_poc_s0.len() + self.delta_poc_s1.len()
    }

    /// Number of entries flagged as used by the current picture
    pub fn num_used_by_curr(&self) -> usize {
        self.used_by_curr_pic_s0.iter().filter(|&&u| u).count()
            + self.used_by_curr_pic_s1.iter().filter(|&&u| u).count()
    }

    /// Parse `st_ref_pic_set(stRpsIdx)`
    ///
    /// `previous` holds the sets already decoded from the SPS. A slice header
    /// parses its own set with `st_rps_idx == num_short_term_ref_pic_sets`.
    pub fn parse(
        reader: &mut BitstreamReader,
        st_rps_idx: usize,
        num_short_term_ref_pic_sets: usize,
        previous: &[ShortTermRefPicSet],
        max_dec_pic_buffering_minus1: u32,
    ) -> Result<Self> {
        let mut rps = ShortTermRefPicSet::default();

        if st_rps_idx != 0 {
            rps.inter_ref_pic_set_prediction_flag = reader.read_bool()?;
        }

        if rps.inter_ref_pic_set_prediction_flag {
            if st_rps_idx == num_short_term_ref_pic_sets {
                rps.delta_idx_minus1 =
                    reader.read_ue_max(st_rps_idx as u32 - 1, "delta_idx_minus1")?;
            }
            rps.delta_rps_sign = reader.read_bool()?;
            rps.abs_delta_rps_minus1 = reader.read_ue_max(32767, "abs_delta_rps_minus1")?;

            let ref_rps_idx = st_rps_idx
                .checked_sub(rps.delta_idx_minus1 as usize + 1)
                .and_then(|idx| previous.get(idx))
                .ok_or_else(|| Error::parse("st_ref_pic_set", "RefRpsIdx out of range"))?;
            let delta_rps = (1 - 2 * rps.delta_rps_sign as i32) * (rps.abs_delta_rps_minus1 as i32 + 1);

            let num_ref_deltas = ref_rps_idx.num_delta_pocs();
            rps.num_delta_pocs_of_ref_rps_idx = num_ref_deltas as u32;

            let mut used_by_curr_pic_flag = vec![false; num_ref_deltas + 1];
            let mut use_delta_flag = vec![true; num_ref_deltas + 1];
            for j in 0..=num_ref_deltas {
                used_by_curr_pic_flag[j] = reader.read_bool()?;
                if !used_by_curr_pic_flag[j] {
                    use_delta_flag[j] = reader.read_bool()?;
                }
            }

            rps.derive_from(ref_rps_idx, delta_rps, &used_by_curr_pic_flag, &use_delta_flag);
        } else {
            let num_negative_pics =
                reader.read_ue_max(max_dec_pic_buffering_minus1, "num_negative_pics")?;
            let num_positive_pics = reader.read_ue_max(
                max_dec_pic_buffering_minus1 - num_negative_pics,
                "num_positive_pics",
            )?;

            let mut poc = 0i32;
            for _ in 0..num_negative_pics {
                let delta_poc_s0_minus1 = reader.read_ue_max(32767, "delta_poc_s0_minus1")?;
                poc -= delta_poc_s0_minus1 as i32 + 1;
                rps.delta_poc_s0.push(poc);
                rps.used_by_curr_pic_s0.push(reader.read_bool()?);
            }

            poc = 0;
            for _ in 0..num_positive_pics {
                let delta_poc_s1_minus1 = reader.read_ue_max(32767, "delta_poc_s1_minus1")?;
                poc += delta_poc_s1_minus1 as i32 + 1;
                rps.delta_poc_s1.push(poc);
                rps.used_by_curr_pic_s1.push(reader.read_bool()?);
            }
        }

        Ok(rps)
    }

    /// Inter RPS prediction, equations 7-61 and 7-62
    fn derive_from(
        &mut self,
        reference: &ShortTermRefPicSet,
        delta_rps: i32,
        used_by_curr_pic_flag: &[bool],
        use_delta_flag: &[bool],
    ) {
        let num_negative = reference.num_negative_pics();
        let num_deltas = reference.num_delta_pocs();

        for j in (0..reference.num_positive_pics()).rev() {
            let d_poc = reference.delta_poc_s1[j] + delta_rps;
            if d_poc < 0 && use_delta_flag[num_negative + j] {
                self.delta_poc_s0.push(d_poc);
                self.used_by_curr_pic_s0.push(used_by_curr_pic_flag[num_negative + j]);
            }
        }
        if delta_rps < 0 && use_delta_flag[num_deltas] {
            self.delta_poc_s0.push(delta_rps);
            self.used_by_curr_pic_s0.push(used_by_curr_pic_flag[num_deltas]);
        }
        for j in 0..num_negative {
            let d_poc = reference.delta_poc_s0[j] + delta_rps;
            if d_poc < 0 && use_delta_flag[j] {
                self.delta_poc_s0.push(d_poc);
                self.used_by_curr_pic_s0.push(used_by_curr_pic_flag[j]);
            }
        }

        for j in (0..num_negative).rev() {
            let d_poc = reference.delta_poc_s0[j] + delta_rps;
            if d_poc > 0 && use_delta_flag[j] {
                self.delta_poc_s1.push(d_poc);
                self.used_by_curr_pic_s1.push(used_by_curr_pic_flag[j]);
            }
        }
        if delta_rps > 0 && use_delta_flag[num_deltas] {
            self.delta_poc_s1.push(delta_rps);
            self.used_by_curr_pic_s1.push(used_by_curr_pic_flag[num_deltas]);
        }
        for j in 0..reference.num_positive_pics() {
            let d_poc = reference.delta_poc_s1[j] + delta_rps;
            if d_poc > 0 && use_delta_flag[num_negative + j] {
                self.delta_poc_s1.push(d_poc);
                self.used_by_curr_pic_s1.push(used_by_curr_pic_flag[num_negative + j]);
            }
        }
    }
}
