//! Codec implementations
//!
//! Only the H.265/HEVC decoding state machine lives here.

pub mod h265;

pub use h265::{DecoderConfig, H265Backend, H265Decoder};
