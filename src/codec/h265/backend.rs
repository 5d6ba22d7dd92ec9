//! Backend interface driven by the decoder state machine
//!
//! [`super::H265Decoder`] decides when sequences and pictures start, which
//! references a slice uses and when a picture is output. A backend does the
//! actual sample decoding (in software or on an accelerator) and receives the
//! output. Every callback runs synchronously on the thread calling
//! [`super::H265Decoder::decode`].

use super::dpb::Dpb;
use super::headers::Sps;
use super::picture::{H265Picture, PictureRef};
use super::slice::H265Slice;
use crate::error::Result;

/// Callbacks of an H.265 decoding backend
///
/// Errors returned by the per-picture callbacks drop the picture being
/// decoded; an error from [`H265Backend::new_sequence`] is returned to the
/// caller of `decode`.
pub trait H265Backend {
    /// A new sequence starts
    ///
    /// `max_dpb_size` includes the preferred output delay, so it is the
    /// number of picture buffers the backend has to provide.
    fn new_sequence(&mut self, sps: &Sps, max_dpb_size: u32) -> Result<()>;

    /// A picture is about to be decoded into the buffer of `frame_number`
    fn new_picture(&mut self, frame_number: u32, picture: &mut H265Picture) -> Result<()>;

    /// The reference picture set of `picture` is known and the DPB is ready
    fn start_picture(&mut self, picture: &H265Picture, slice: &H265Slice, dpb: &Dpb) -> Result<()>;

    /// Decode one slice segment
    ///
    /// The reference lists are only valid for the duration of the call.
    fn decode_slice(
        &mut self,
        picture: &H265Picture,
        slice: &H265Slice,
        ref_pic_list0: &[Option<PictureRef>],
        ref_pic_list1: &[Option<PictureRef>],
    ) -> Result<()>;

    /// All slices of `picture` were submitted
    fn end_picture(&mut self, picture: &H265Picture) -> Result<()>;

    /// `picture` is ready for display
    fn output_picture(&mut self, frame_number: u32, picture: PictureRef) -> Result<()>;

    /// Number of pictures to keep queued before the first output
    fn get_preferred_output_delay(&self, _is_live: bool) -> u32 {
        0
    }

    /// `frame_number` will never be output
    fn release_frame(&mut self, _frame_number: u32) {}
}

impl<B: H265Backend + ?Sized> H265Backend for Box<B> {
    fn new_sequence(&mut self, sps: &Sps, max_dpb_size: u32) -> Result<()> {
        (**self).new_sequence(sps, max_dpb_size)
    }

    fn new_picture(&mut self, frame_number: u32, picture: &mut H265Picture) -> Result<()> {
        (**self).new_picture(frame_number, picture)
    }

    fn start_picture(&mut self, picture: &H265Picture, slice: &H265Slice, dpb: &Dpb) -> Result<()> {
        (**self).start_picture(picture, slice, dpb)
    }

    fn decode_slice(
        &mut self,
        picture: &H265Picture,
        slice: &H265Slice,
        ref_pic_list0: &[Option<PictureRef>],
        ref_pic_list1: &[Option<PictureRef>],
    ) -> Result<()> {
        (**self).decode_slice(picture, slice, ref_pic_list0, ref_pic_list1)
    }

    fn end_picture(&mut self, picture: &H265Picture) -> Result<()> {
        (**self).end_picture(picture)
    }

    fn output_picture(&mut self, frame_number: u32, picture: PictureRef) -> Result<()> {
        (**self).output_picture(frame_number, picture)
    }

    fn get_preferred_output_delay(&self, is_live: bool) -> u32 {
        (**self).get_preferred_output_delay(is_live)
    }

    fn release_frame(&mut self, frame_number: u32) {
        (**self).release_frame(frame_number)
    }
}
