//! Reference picture set derivation and picture marking (8.3.2)
//!
//! For every picture the RPS names, relative to its POC, which earlier
//! pictures must be kept. The five lists split them into short-term pictures
//! preceding or following the current one, long-term pictures, and pictures
//! only kept for later pictures ("Foll"). Every DPB picture named nowhere is
//! marked unused for reference.

use std::rc::Rc;

use super::dpb::Dpb;
use super::picture::{H265Picture, PictureRef};
use super::slice::H265Slice;
use crate::error::{Error, Result};

/// Capacity of every RPS list
pub const MAX_RPS_ENTRIES: usize = 16;

/// The five reference picture set lists of the current picture
#[derive(Debug, Default, Clone)]
pub struct ReferencePictureSet {
    pub poc_st_curr_before: Vec<i32>,
    pub poc_st_curr_after: Vec<i32>,
    pub poc_st_foll: Vec<i32>,
    pub poc_lt_curr: Vec<i32>,
    pub poc_lt_foll: Vec<i32>,
    /// delta_poc_msb_present_flag of each PocLtCurr entry
    pub curr_delta_poc_msb_present_flag: Vec<bool>,
    /// delta_poc_msb_present_flag of each PocLtFoll entry
    pub foll_delta_poc_msb_present_flag: Vec<bool>,
    /// NumPicTotalCurr, the current picture included when it may reference itself
    pub num_pic_total_curr: u32,

    /// RefPicSetStCurrBefore; `None` marks "no reference picture"
    pub st_curr_before: Vec<Option<PictureRef>>,
    pub st_curr_after: Vec<Option<PictureRef>>,
    pub st_foll: Vec<Option<PictureRef>>,
    pub lt_curr: Vec<Option<PictureRef>>,
    pub lt_foll: Vec<Option<PictureRef>>,
}

impl ReferencePictureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every POC and picture
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Release the picture handles, keeping the POC lists
    pub fn clear_pictures(&mut self) {
        self.st_curr_before.clear();
        self.st_curr_after.clear();
        self.st_foll.clear();
        self.lt_curr.clear();
        self.lt_foll.clear();
    }

    /// Derive the RPS of `picture` from its first slice and mark the DPB
    ///
    /// Fails without touching the DPB when the short-term set cannot be
    /// resolved or a list would exceed [`MAX_RPS_ENTRIES`].
    pub fn prepare(&mut self, slice: &H265Slice, picture: &H265Picture, dpb: &mut Dpb) -> Result<()> {
        let nal_type = slice.nal_unit_type();

        let mut derived = ReferencePictureSet::new();
        if !nal_type.is_idr() {
            derived.derive_pocs(slice, picture)?;
        }
        if slice.header.pps.scc_extension.pps_curr_pic_ref_enabled_flag {
            derived.num_pic_total_curr += 1;
        }

        if nal_type.is_irap() && picture.no_rasl_output_flag {
            tracing::debug!("mark all pictures in DPB as non-ref");
            dpb.mark_all_non_ref();
        }

        *self = derived;

        tracing::trace!(
            st_curr_before = self.poc_st_curr_before.len(),
            st_curr_after = self.poc_st_curr_after.len(),
            st_foll = self.poc_st_foll.len(),
            lt_curr = self.poc_lt_curr.len(),
            lt_foll = self.poc_lt_foll.len(),
            num_pic_total_curr = self.num_pic_total_curr,
            "RPS derived"
        );

        self.derive_and_mark(dpb);
        Ok(())
    }

    /// POC lists of 8.3.2 (8-5), from the slice header and the active SPS
    fn derive_pocs(&mut self, slice: &H265Slice, picture: &H265Picture) -> Result<()> {
        let header = &slice.header;
        let sps = &header.sps;
        let poc = picture.pic_order_cnt;

        if header.short_term_ref_pic_set_sps_flag
            && header.short_term_ref_pic_set_idx as usize >= sps.num_short_term_ref_pic_sets()
        {
            return Err(Error::reference(format!(
                "short_term_ref_pic_set_idx {} with {} sets in the SPS",
                header.short_term_ref_pic_set_idx,
                sps.num_short_term_ref_pic_sets()
            )));
        }
        let st_rps = header.active_short_term_ref_pic_set();

        tracing::trace!(
            num_negative = st_rps.num_negative_pics(),
            num_positive = st_rps.num_positive_pics(),
            "short-term RPS"
        );

        for (delta, used) in st_rps.delta_poc_s0.iter().zip(&st_rps.used_by_curr_pic_s0) {
            if *used {
                self.poc_st_curr_before.push(poc + delta);
                self.num_pic_total_curr += 1;
            } else {
                self.poc_st_foll.push(poc + delta);
            }
        }
        for (delta, used) in st_rps.delta_poc_s1.iter().zip(&st_rps.used_by_curr_pic_s1) {
            if *used {
                self.poc_st_curr_after.push(poc + delta);
                self.num_pic_total_curr += 1;
            } else {
                self.poc_st_foll.push(poc + delta);
            }
        }

        let max_poc_lsb = sps.max_pic_order_cnt_lsb();
        let num_long_term_sps = header.num_long_term_sps as usize;
        let num_long_term = num_long_term_sps + header.num_long_term_pics as usize;
        let mut delta_poc_msb_cycle_lt = 0i32;

        for i in 0..num_long_term {
            let (poc_lsb_lt, used_by_curr_pic_lt) = if i < num_long_term_sps {
                let idx = header.lt_idx_sps.get(i).copied().unwrap_or(0) as usize;
                match (
                    sps.lt_ref_pic_poc_lsb_sps.get(idx),
                    sps.used_by_curr_pic_lt_sps_flag.get(idx),
                ) {
                    (Some(lsb), Some(used)) => (*lsb as i32, *used),
                    _ => {
                        return Err(Error::reference(format!("lt_idx_sps {} out of range", idx)));
                    }
                }
            } else {
                match (header.poc_lsb_lt.get(i), header.used_by_curr_pic_lt_flag.get(i)) {
                    (Some(lsb), Some(used)) => (*lsb as i32, *used),
                    _ => return Err(Error::reference("long-term entry missing")),
                }
            };

            // 7-52: the cycle accumulates within the SPS and the slice entries separately
            let cycle = header.delta_poc_msb_cycle_lt.get(i).copied().unwrap_or(0) as i32;
            delta_poc_msb_cycle_lt = if i == 0 || i == num_long_term_sps {
                cycle
            } else {
                cycle + delta_poc_msb_cycle_lt
            };

            let msb_present = header.delta_poc_msb_present_flag.get(i).copied().unwrap_or(false);
            let mut poc_lt = poc_lsb_lt;
            if msb_present {
                poc_lt += poc
                    - delta_poc_msb_cycle_lt * max_poc_lsb
                    - header.slice_pic_order_cnt_lsb as i32;
            }

            if used_by_curr_pic_lt {
                self.poc_lt_curr.push(poc_lt);
                self.curr_delta_poc_msb_present_flag.push(msb_present);
                self.num_pic_total_curr += 1;
            } else {
                self.poc_lt_foll.push(poc_lt);
                self.foll_delta_poc_msb_present_flag.push(msb_present);
            }
        }

        let lists = [
            ("PocStCurrBefore", self.poc_st_curr_before.len()),
            ("PocStCurrAfter", self.poc_st_curr_after.len()),
            ("PocStFoll", self.poc_st_foll.len()),
            ("PocLtCurr", self.poc_lt_curr.len()),
            ("PocLtFoll", self.poc_lt_foll.len()),
        ];
        for (name, len) in lists {
            if len > MAX_RPS_ENTRIES {
                return Err(Error::reference(format!("{} has {} entries", name, len)));
            }
        }

        Ok(())
    }

    /// Resolve the POC lists to DPB pictures and mark them (8-6, 8-7)
    fn derive_and_mark(&mut self, dpb: &Dpb) {
        self.lt_curr = self
            .poc_lt_curr
            .iter()
            .zip(&self.curr_delta_poc_msb_present_flag)
            .map(|(poc, msb_present)| lookup_long_term(dpb, *poc, *msb_present))
            .collect();
        self.lt_foll = self
            .poc_lt_foll
            .iter()
            .zip(&self.foll_delta_poc_msb_present_flag)
            .map(|(poc, msb_present)| lookup_long_term(dpb, *poc, *msb_present))
            .collect();

        for picture in self.lt_curr.iter().chain(&self.lt_foll).flatten() {
            let mut pic = picture.borrow_mut();
            pic.reference = true;
            pic.long_term = true;
        }

        self.st_curr_before = self
            .poc_st_curr_before
            .iter()
            .map(|poc| dpb.get_short_ref_by_poc(*poc))
            .collect();
        self.st_curr_after = self
            .poc_st_curr_after
            .iter()
            .map(|poc| dpb.get_short_ref_by_poc(*poc))
            .collect();
        self.st_foll = self
            .poc_st_foll
            .iter()
            .map(|poc| dpb.get_short_ref_by_poc(*poc))
            .collect();

        for picture in dpb.pictures() {
            if !self.contains(picture) {
                let mut pic = picture.borrow_mut();
                tracing::trace!(poc = pic.pic_order_cnt, "mark picture as non-ref");
                pic.reference = false;
                pic.long_term = false;
            }
        }
    }

    /// True when any of the five lists holds `picture`
    pub fn contains(&self, picture: &PictureRef) -> bool {
        self.st_curr_before
            .iter()
            .chain(&self.st_curr_after)
            .chain(&self.st_foll)
            .chain(&self.lt_curr)
            .chain(&self.lt_foll)
            .flatten()
            .any(|entry| Rc::ptr_eq(entry, picture))
    }

    /// Number of pictures usable by the current picture (before, after, long-term)
    pub fn num_curr_refs(&self) -> usize {
        self.st_curr_before.len() + self.st_curr_after.len() + self.lt_curr.len()
    }
}

fn lookup_long_term(dpb: &Dpb, poc: i32, msb_present: bool) -> Option<PictureRef> {
    let picture = if msb_present {
        dpb.get_ref_by_poc(poc)
    } else {
        dpb.get_ref_by_poc_lsb(poc)
    };
    if picture.is_none() {
        tracing::debug!(poc, msb_present, "no reference picture for long-term entry");
    }
    picture
}
