//! hevcdec - the H.265/HEVC decoding state machine in Rust
//!
//! hevcdec implements the bitstream-driven part of an HEVC decoder: it
//! decides when a picture starts and ends, which reference pictures it may
//! use, and when decoded pictures become ready for display. Pixel
//! reconstruction is left to a backend implementing
//! [`codec::h265::H265Backend`].
//!
//! # Architecture
//!
//! - `codec::h265`: NAL parsing, parameter sets, POC, RPS, DPB, reference
//!   lists, output scheduling and the decoder state machine
//! - `util`: Common utilities and data structures
//!
//! # Example
//!
//! ```rust,no_run
//! use hevcdec_lib::codec::h265::{DecoderConfig, H265Backend, H265Decoder};
//! # fn run<B: H265Backend>(backend: B, access_units: Vec<Vec<u8>>) -> hevcdec_lib::Result<()> {
//! let mut decoder = H265Decoder::new(backend, DecoderConfig::default());
//! for (frame_number, au) in access_units.iter().enumerate() {
//!     decoder.decode(frame_number as u32, au)?;
//! }
//! decoder.drain()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod util;

pub use error::{Error, Result};

/// hevcdec version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Configuration for the hevcdec library
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug output
    pub debug: bool,
}

/// Initialize the hevcdec library with the given configuration
pub fn init(config: Config) -> Result<()> {
    if config.verbose || config.debug {
        let level = if config.debug { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(level)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION_MAJOR, 0);
        assert_eq!(VERSION_MINOR, 1);
        assert_eq!(VERSION_PATCH, 0);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.verbose);
        assert!(!config.debug);
    }

    #[test]
    fn test_init() {
        let config = Config::default();
        assert!(init(config).is_ok());
    }
}
