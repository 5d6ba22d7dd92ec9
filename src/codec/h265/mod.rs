//! H.265/HEVC (High Efficiency Video Coding) decoding state machine
//!
//! Everything an HEVC decoder decides before and after the sample decoding
//! of a picture lives here:
//!
//! - NAL unit framing (Annex-B and length-prefixed) and hvcC codec data
//! - VPS/SPS/PPS, slice segment header and SEI parsing
//! - Picture order count (8.3.1)
//! - Reference picture sets and reference marking (8.3.2)
//! - Reference picture lists (8.3.4)
//! - The decoded picture buffer with its bumping process (C.5.2)
//! - Output scheduling with a backend-selected output delay
//!
//! Pixels are produced by an [`H265Backend`]. [`H265Decoder`] calls it for
//! every sequence, picture and slice, and hands it pictures in output order.
//!
//! ## Module layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `nal`, `bitstream` | NAL units, emulation prevention, Exp-Golomb reader |
//! | `headers`, `vui`, `short_term_rps`, `slice`, `sei` | syntax structures |
//! | `parser` | parameter set slot tables |
//! | `config_record` | `HEVCDecoderConfigurationRecord` |
//! | `level` | per-level limits and DPB size |
//! | `picture`, `poc`, `rps`, `dpb`, `ref_lists`, `output` | decoding process state |
//! | `backend`, `decoder` | callbacks and the state machine driving them |

pub mod backend;
pub mod bitstream;
pub mod config_record;
pub mod decoder;
pub mod dpb;
pub mod headers;
pub mod level;
pub mod nal;
pub mod output;
pub mod parser;
pub mod picture;
pub mod poc;
pub mod ref_lists;
pub mod rps;
pub mod sei;
pub mod short_term_rps;
pub mod slice;
pub mod vui;

pub use backend::H265Backend;
pub use config_record::HevcDecoderConfigurationRecord;
pub use decoder::{DecoderConfig, H265Decoder, StreamFormat};
pub use dpb::Dpb;
pub use headers::{Pps, Sps, Vps};
pub use nal::{identify_nal_units, split_access_units, NalFraming, NalHeader, NalUnit, NalUnitType};
pub use output::{LatencyInfo, OutputQueue};
pub use parser::ParameterSets;
pub use picture::{BufferFlags, H265Picture, PictureRef};
pub use poc::PocCalculator;
pub use ref_lists::RefPicLists;
pub use rps::ReferencePictureSet;
pub use slice::{H265Slice, SliceHeader, SliceType};
