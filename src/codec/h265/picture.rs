//! Decoded picture state shared by the DPB, the RPS and the output queue

use std::cell::RefCell;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;

use super::nal::NalUnitType;

/// Shared handle to a picture
///
/// The DPB, the reference picture sets, the reference lists and the output
/// queue all point at the same picture.
pub type PictureRef = Rc<RefCell<H265Picture>>;

/// Interlacing flags attached to an output picture
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    pub const INTERLACED: BufferFlags = BufferFlags(1 << 0);
    /// Top field first
    pub const TFF: BufferFlags = BufferFlags(1 << 1);
    pub const TOP_FIELD: BufferFlags = BufferFlags(1 << 2);
    pub const BOTTOM_FIELD: BufferFlags = BufferFlags(1 << 3);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: BufferFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (BufferFlags::INTERLACED, "INTERLACED"),
            (BufferFlags::TFF, "TFF"),
            (BufferFlags::TOP_FIELD, "TOP_FIELD"),
            (BufferFlags::BOTTOM_FIELD, "BOTTOM_FIELD"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        if set.is_empty() {
            write!(f, "BufferFlags(NONE)")
        } else {
            write!(f, "BufferFlags({})", set.join(" | "))
        }
    }
}

/// One coded picture
#[derive(Debug, Clone)]
pub struct H265Picture {
    /// PicOrderCntVal
    pub pic_order_cnt: i32,
    /// slice_pic_order_cnt_lsb, 0 for IDR pictures
    pub pic_order_cnt_lsb: i32,
    /// Caller-supplied handle of the input frame this picture was coded in
    pub frame_number: u32,

    pub nal_unit_type: NalUnitType,

    /// Used for reference
    pub reference: bool,
    /// Used for long-term reference
    pub long_term: bool,

    /// PicOutputFlag
    pub output_flag: bool,
    /// Already bumped out of the DPB
    pub outputted: bool,
    /// Number of pictures added to the DPB since this one, while it waited
    /// for output (PicLatencyCount)
    pub pic_latency_cnt: u32,

    pub no_rasl_output_flag: bool,
    pub rap_pic_flag: bool,
    pub intra_pic_flag: bool,
    pub no_output_of_prior_pics_flag: bool,

    /// From the picture timing SEI of the access unit
    pub pic_struct: u8,
    pub source_scan_type: u8,
    pub duplicate_flag: bool,
    pub buffer_flags: BufferFlags,
}

impl H265Picture {
    pub fn new(frame_number: u32) -> Self {
        H265Picture {
            pic_order_cnt: 0,
            pic_order_cnt_lsb: 0,
            frame_number,
            nal_unit_type: NalUnitType::Unknown,
            reference: false,
            long_term: false,
            output_flag: false,
            outputted: false,
            pic_latency_cnt: 0,
            no_rasl_output_flag: false,
            rap_pic_flag: false,
            intra_pic_flag: false,
            no_output_of_prior_pics_flag: false,
            pic_struct: 0,
            source_scan_type: 2,
            duplicate_flag: false,
            buffer_flags: BufferFlags::NONE,
        }
    }

    /// Wrap into a shared handle
    pub fn into_ref(self) -> PictureRef {
        Rc::new(RefCell::new(self))
    }

    /// Waiting in the DPB to be output
    pub fn needed_for_output(&self) -> bool {
        self.output_flag && !self.outputted
    }

    /// Used for short-term reference
    pub fn is_short_term_ref(&self) -> bool {
        self.reference && !self.long_term
    }

    /// Used for long-term reference
    pub fn is_long_term_ref(&self) -> bool {
        self.reference && self.long_term
    }
}
