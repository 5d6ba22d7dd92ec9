//! Decoded Picture Buffer for H.265/HEVC
//!
//! This module implements the DPB and its "bumping" process as described in
//! Annex C.5.2 of the H.265/HEVC specification.
//!
//! # Overview
//!
//! The DPB holds decoded pictures that are still needed, either as
//! references for inter prediction or because they wait to be output.
//! A picture leaves the buffer once it is neither.
//!
//! # Bumping
//!
//! - A picture is "bumped" when it is the lowest-POC picture waiting for output
//! - Bumping is needed when too many pictures wait for output, when a picture
//!   waited too long, or when the buffer is full
//! - Pictures with equal POC are bumped in insertion order

use super::picture::{H265Picture, PictureRef};

/// Decoded Picture Buffer (DPB)
#[derive(Debug, Default)]
pub struct Dpb {
    /// Pictures in insertion order
    pictures: Vec<PictureRef>,
    /// Capacity derived from the active SPS
    max_num_pics: usize,
}

impl Dpb {
    /// Create an empty DPB with no capacity set yet
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_num_pics(&mut self, max_num_pics: usize) {
        self.max_num_pics = max_num_pics;
    }

    pub fn max_num_pics(&self) -> usize {
        self.max_num_pics
    }

    /// Number of pictures held
    pub fn len(&self) -> usize {
        self.pictures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pictures.is_empty()
    }

    /// All pictures in insertion order
    pub fn pictures(&self) -> &[PictureRef] {
        &self.pictures
    }

    /// Store a decoded picture
    ///
    /// The picture becomes a short-term reference. If it is to be output,
    /// every other picture waiting for output ages by one (PicLatencyCount).
    pub fn add(&mut self, picture: PictureRef) {
        {
            let mut pic = picture.borrow_mut();
            if pic.output_flag {
                for other in &self.pictures {
                    let mut other = other.borrow_mut();
                    if other.needed_for_output() {
                        other.pic_latency_cnt += 1;
                    }
                }
                pic.outputted = false;
                pic.pic_latency_cnt = 0;
            }

            pic.reference = true;
            pic.long_term = false;
        }

        if self.max_num_pics > 0 && self.pictures.len() >= self.max_num_pics {
            tracing::debug!(
                size = self.pictures.len(),
                max = self.max_num_pics,
                "DPB over capacity after insertion"
            );
        }

        self.pictures.push(picture);
    }

    /// Remove every picture that is neither referenced nor waiting for output
    pub fn delete_unused(&mut self) {
        self.pictures.retain(|picture| {
            let pic = picture.borrow();
            let keep = pic.reference || pic.needed_for_output();
            if !keep {
                tracing::trace!(poc = pic.pic_order_cnt, "remove picture from DPB");
            }
            keep
        });
    }

    /// Mark every picture as unused for reference
    pub fn mark_all_non_ref(&mut self) {
        for picture in &self.pictures {
            let mut pic = picture.borrow_mut();
            pic.reference = false;
            pic.long_term = false;
        }
    }

    /// Number of pictures waiting for output
    pub fn num_needed_for_output(&self) -> usize {
        self.pictures
            .iter()
            .filter(|p| p.borrow().needed_for_output())
            .count()
    }

    /// C.5.2.2 bumping condition
    ///
    /// A `max_latency_pictures` or `max_dec_pic_buffering` of 0 disables
    /// the corresponding check.
    pub fn needs_bump(
        &self,
        max_num_reorder_pics: u32,
        max_latency_pictures: u32,
        max_dec_pic_buffering: u32,
    ) -> bool {
        let num_needed = self.num_needed_for_output();

        if num_needed > max_num_reorder_pics as usize {
            tracing::trace!(
                num_needed,
                max_num_reorder_pics,
                "bumping needed: reorder limit"
            );
            return true;
        }

        if max_latency_pictures != 0 {
            let too_late = self.pictures.iter().any(|p| {
                let pic = p.borrow();
                pic.needed_for_output() && pic.pic_latency_cnt >= max_latency_pictures
            });
            if too_late {
                tracing::trace!(max_latency_pictures, "bumping needed: latency limit");
                return true;
            }
        }

        if max_dec_pic_buffering != 0 && self.pictures.len() >= max_dec_pic_buffering as usize {
            tracing::trace!(
                size = self.pictures.len(),
                max_dec_pic_buffering,
                "bumping needed: DPB full"
            );
            return true;
        }

        false
    }

    /// Take the lowest-POC picture waiting for output
    ///
    /// The picture is marked as output; it is removed from the buffer when
    /// it is no longer a reference, or unconditionally when `drain` is set.
    pub fn bump(&mut self, drain: bool) -> Option<PictureRef> {
        let mut lowest: Option<(usize, i32)> = None;
        for (index, picture) in self.pictures.iter().enumerate() {
            let pic = picture.borrow();
            if !pic.needed_for_output() {
                continue;
            }
            match lowest {
                Some((_, poc)) if poc <= pic.pic_order_cnt => {}
                _ => lowest = Some((index, pic.pic_order_cnt)),
            }
        }

        let (index, _) = lowest?;
        let picture = self.pictures[index].clone();

        let remove = {
            let mut pic = picture.borrow_mut();
            pic.outputted = true;
            !pic.reference || drain
        };

        if remove {
            self.pictures.remove(index);
        }

        Some(picture)
    }

    /// Drop every picture
    pub fn clear(&mut self) {
        self.pictures.clear();
    }

    /// Reference picture with the given PicOrderCntVal
    pub fn get_ref_by_poc(&self, poc: i32) -> Option<PictureRef> {
        self.find(|p| p.reference && p.pic_order_cnt == poc)
    }

    /// Reference picture whose POC LSBs match
    pub fn get_ref_by_poc_lsb(&self, poc_lsb: i32) -> Option<PictureRef> {
        self.find(|p| p.reference && p.pic_order_cnt_lsb == poc_lsb)
    }

    /// Short-term reference picture with the given PicOrderCntVal
    pub fn get_short_ref_by_poc(&self, poc: i32) -> Option<PictureRef> {
        self.find(|p| p.is_short_term_ref() && p.pic_order_cnt == poc)
    }

    /// Picture decoded from the given input frame
    pub fn get_picture(&self, frame_number: u32) -> Option<PictureRef> {
        self.find(|p| p.frame_number == frame_number)
    }

    fn find<F>(&self, predicate: F) -> Option<PictureRef>
    where
        F: Fn(&H265Picture) -> bool,
    {
        self.pictures
            .iter()
            .find(|p| predicate(&p.borrow()))
            .cloned()
    }
}
