//! Reference picture list construction (8.3.4)

use super::picture::PictureRef;
use super::rps::ReferencePictureSet;
use super::slice::SliceHeader;

/// RefPicList0 and RefPicList1 of one slice
///
/// Entries are `None` where the RPS named a picture missing from the DPB.
#[derive(Debug, Default, Clone)]
pub struct RefPicLists {
    pub list0: Vec<Option<PictureRef>>,
    pub list1: Vec<Option<PictureRef>>,
}

impl RefPicLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate both lists, keeping their storage
    pub fn clear(&mut self) {
        self.list0.clear();
        self.list1.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.list0.is_empty() && self.list1.is_empty()
    }

    /// Build the lists of a slice of `current`
    ///
    /// I slices leave both lists empty, P slices only fill list 0.
    pub fn build(&mut self, header: &SliceHeader, rps: &ReferencePictureSet, current: &PictureRef) {
        self.clear();

        if header.slice_type.is_intra() {
            return;
        }

        let curr_pic_ref = header.pps.scc_extension.pps_curr_pic_ref_enabled_flag;
        if rps.st_curr_before.is_empty()
            && rps.st_curr_after.is_empty()
            && rps.lt_curr.is_empty()
            && !curr_pic_ref
        {
            tracing::warn!("expected references for an inter slice, got none");
            return;
        }

        let modification = &header.ref_pic_list_modification;
        let num_active_l0 = header.num_ref_idx_l0_active_minus1 as usize + 1;
        let temp0 = temp_list(
            [&rps.st_curr_before, &rps.st_curr_after, &rps.lt_curr],
            num_active_l0.max(rps.num_pic_total_curr as usize),
            curr_pic_ref.then_some(current),
        );
        self.list0 = select(
            &temp0,
            num_active_l0,
            modification
                .ref_pic_list_modification_flag_l0
                .then_some(&modification.list_entry_l0[..]),
        );

        // With current picture referencing the last entry of an unmodified list is the picture itself
        if curr_pic_ref && !modification.ref_pic_list_modification_flag_l0 && temp0.len() > num_active_l0 {
            if let Some(last) = self.list0.last_mut() {
                *last = Some(current.clone());
            }
        }

        if !header.slice_type.is_b() {
            return;
        }

        let num_active_l1 = header.num_ref_idx_l1_active_minus1 as usize + 1;
        let temp1 = temp_list(
            [&rps.st_curr_after, &rps.st_curr_before, &rps.lt_curr],
            num_active_l1.max(rps.num_pic_total_curr as usize),
            curr_pic_ref.then_some(current),
        );
        self.list1 = select(
            &temp1,
            num_active_l1,
            modification
                .ref_pic_list_modification_flag_l1
                .then_some(&modification.list_entry_l1[..]),
        );
    }
}

/// RefPicListTemp0/1 (8-8, 8-10): the sets repeated until `target` entries
fn temp_list(
    sets: [&Vec<Option<PictureRef>>; 3],
    target: usize,
    current: Option<&PictureRef>,
) -> Vec<Option<PictureRef>> {
    let mut temp = Vec::with_capacity(target + 1);

    while temp.len() < target {
        for set in sets {
            for entry in set.iter() {
                if temp.len() >= target {
                    break;
                }
                temp.push(entry.clone());
            }
        }
        if let Some(current) = current {
            temp.push(Some(current.clone()));
        }
    }

    temp
}

/// Entries 0..num_active of the temporary list, or those named by list_entry_lX
fn select(
    temp: &[Option<PictureRef>],
    num_active: usize,
    list_entry: Option<&[u32]>,
) -> Vec<Option<PictureRef>> {
    (0..num_active)
        .map(|i| {
            let index = match list_entry {
                Some(entries) => entries.get(i).copied().unwrap_or(0) as usize,
                None => i,
            };
            temp.get(index).cloned().flatten()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h265::headers::{Pps, Sps};
    use crate::codec::h265::picture::H265Picture;
    use crate::codec::h265::slice::SliceType;
    use std::rc::Rc;

    fn pic(poc: i32) -> PictureRef {
        let mut pic = H265Picture::new(poc as u32);
        pic.pic_order_cnt = poc;
        pic.into_ref()
    }

    fn poc_of(entry: &Option<PictureRef>) -> Option<i32> {
        entry.as_ref().map(|p| p.borrow().pic_order_cnt)
    }

    fn header(slice_type: SliceType, l0: u32, l1: u32, pps: Pps) -> SliceHeader {
        let mut header = SliceHeader::new(Rc::new(pps), Rc::new(Sps::default()));
        header.slice_type = slice_type;
        header.num_ref_idx_l0_active_minus1 = l0 - 1;
        header.num_ref_idx_l1_active_minus1 = l1 - 1;
        header
    }

    fn rps(before: &[i32], after: &[i32], lt: &[i32]) -> ReferencePictureSet {
        let to_refs = |pocs: &[i32]| pocs.iter().map(|p| Some(pic(*p))).collect::<Vec<_>>();
        ReferencePictureSet {
            st_curr_before: to_refs(before),
            st_curr_after: to_refs(after),
            lt_curr: to_refs(lt),
            num_pic_total_curr: (before.len() + after.len() + lt.len()) as u32,
            ..Default::default()
        }
    }

    #[test]
    fn test_i_slice_has_no_lists() {
        let mut lists = RefPicLists::new();
        let h = header(SliceType::I, 1, 1, Pps::default());
        lists.build(&h, &rps(&[0], &[], &[]), &pic(4));
        assert!(lists.is_empty());
    }

    #[test]
    fn test_p_slice_order() {
        let mut lists = RefPicLists::new();
        let h = header(SliceType::P, 3, 1, Pps::default());
        lists.build(&h, &rps(&[6, 4], &[10], &[0]), &pic(8));

        let pocs: Vec<_> = lists.list0.iter().map(poc_of).collect();
        assert_eq!(pocs, vec![Some(6), Some(4), Some(10)]);
        assert!(lists.list1.is_empty());
    }

    #[test]
    fn test_b_slice_order() {
        let mut lists = RefPicLists::new();
        let h = header(SliceType::B, 2, 2, Pps::default());
        lists.build(&h, &rps(&[4], &[12], &[]), &pic(8));

        let l0: Vec<_> = lists.list0.iter().map(poc_of).collect();
        let l1: Vec<_> = lists.list1.iter().map(poc_of).collect();
        assert_eq!(l0, vec![Some(4), Some(12)]);
        assert_eq!(l1, vec![Some(12), Some(4)]);
    }

    #[test]
    fn test_short_sets_repeat() {
        let mut lists = RefPicLists::new();
        let h = header(SliceType::P, 4, 1, Pps::default());
        lists.build(&h, &rps(&[6], &[10], &[]), &pic(8));

        let pocs: Vec<_> = lists.list0.iter().map(poc_of).collect();
        assert_eq!(pocs, vec![Some(6), Some(10), Some(6), Some(10)]);
    }

    #[test]
    fn test_modification_table() {
        let mut lists = RefPicLists::new();
        let mut h = header(SliceType::B, 2, 1, Pps::default());
        h.ref_pic_list_modification.ref_pic_list_modification_flag_l0 = true;
        h.ref_pic_list_modification.list_entry_l0 = vec![2, 0];
        h.ref_pic_list_modification.ref_pic_list_modification_flag_l1 = true;
        h.ref_pic_list_modification.list_entry_l1 = vec![1];
        lists.build(&h, &rps(&[6, 4], &[10], &[]), &pic(8));

        let l0: Vec<_> = lists.list0.iter().map(poc_of).collect();
        let l1: Vec<_> = lists.list1.iter().map(poc_of).collect();
        // temp0 = [6, 4, 10], temp1 = [10, 6, 4]
        assert_eq!(l0, vec![Some(10), Some(6)]);
        assert_eq!(l1, vec![Some(6)]);
    }

    #[test]
    fn test_no_references_warns_and_stays_empty() {
        let mut lists = RefPicLists::new();
        let h = header(SliceType::P, 1, 1, Pps::default());
        lists.build(&h, &rps(&[], &[], &[]), &pic(8));
        assert!(lists.is_empty());
    }

    #[test]
    fn test_missing_reference_stays_none() {
        let mut lists = RefPicLists::new();
        let h = header(SliceType::P, 1, 1, Pps::default());
        let mut set = rps(&[], &[], &[]);
        set.st_curr_before = vec![None];
        set.num_pic_total_curr = 1;
        lists.build(&h, &set, &pic(8));

        assert_eq!(lists.list0.len(), 1);
        assert!(lists.list0[0].is_none());
    }

    #[test]
    fn test_current_picture_referencing() {
        let mut pps = Pps::default();
        pps.scc_extension.pps_curr_pic_ref_enabled_flag = true;
        let current = pic(8);

        let mut lists = RefPicLists::new();
        let h = header(SliceType::P, 2, 1, pps);
        let mut set = rps(&[6, 4], &[], &[]);
        set.num_pic_total_curr = 3;
        lists.build(&h, &set, &current);

        // temp0 = [6, 4, cur]; longer than the 2 active entries
        assert_eq!(lists.list0.len(), 2);
        assert_eq!(poc_of(&lists.list0[0]), Some(6));
        assert!(Rc::ptr_eq(lists.list0[1].as_ref().unwrap(), &current));
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut lists = RefPicLists::new();
        let h = header(SliceType::B, 2, 2, Pps::default());
        lists.build(&h, &rps(&[4], &[12], &[]), &pic(8));
        let capacity = lists.list0.capacity();

        lists.clear();
        assert!(lists.is_empty());
        assert_eq!(lists.list0.capacity(), capacity);
    }
}
