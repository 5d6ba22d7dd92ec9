//! hevcdec CLI - inspect and run the HEVC decoding state machine
//!
//! `info` prints the sequence parameters of an Annex-B stream, `decode`
//! runs the decoder over it with a backend that only records the output
//! order.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use hevcdec_lib::codec::h265::{
    identify_nal_units, level, split_access_units, DecoderConfig, Dpb, H265Backend, H265Decoder,
    H265Picture, H265Slice, NalFraming, NalUnitType, ParameterSets, PictureRef, Sps, StreamFormat,
};
use hevcdec_lib::{init, Config};

#[derive(Parser)]
#[command(name = "hevcdec")]
#[command(about = "hevcdec - H.265/HEVC decoding state machine", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the sequence parameter sets of an H.265 stream
    Info {
        /// Input file path (Annex-B byte stream)
        input: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the decoding state machine and print the output order
    Decode {
        /// Input file path
        input: PathBuf,

        /// hvcC codec data; the input is then read as length-prefixed NAL units
        #[arg(long)]
        hvcc: Option<PathBuf>,

        /// Pictures the backend keeps queued before the first output
        #[arg(long, default_value = "0")]
        output_delay: u32,

        /// Treat the input as a live source
        #[arg(long)]
        live: bool,

        /// Do not build reference picture lists
        #[arg(long)]
        no_ref_lists: bool,

        /// Decoder configuration file (JSON); flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config {
        verbose: cli.verbose,
        debug: cli.debug,
    };

    init(config)?;

    info!("hevcdec v{}", hevcdec_lib::VERSION);

    match cli.command {
        Commands::Info { input, json } => {
            info!("Getting info for: {}", input.display());
            cmd_info(&input, json)?;
        }
        Commands::Decode {
            input,
            hvcc,
            output_delay,
            live,
            no_ref_lists,
            config,
            json,
        } => {
            let mut decoder_config = match config {
                Some(path) => load_config(&path)?,
                None => DecoderConfig::default(),
            };
            if live {
                decoder_config.is_live = true;
            }
            if no_ref_lists {
                decoder_config.process_ref_pic_lists = false;
            }
            decoder_config
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

            cmd_decode(&input, hvcc.as_deref(), output_delay, decoder_config, json)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<DecoderConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let config = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    debug!(?config, "loaded decoder configuration");
    Ok(config)
}

#[derive(Serialize)]
struct SpsSummary {
    id: u8,
    width: u32,
    height: u32,
    crop_width: u32,
    crop_height: u32,
    level_idc: u8,
    bit_depth_luma: u8,
    chroma_format_idc: u8,
    max_dpb_size: u32,
    max_dec_pic_buffering: u32,
    max_num_reorder_pics: u32,
    max_latency_pictures: u32,
    field_seq_flag: bool,
    framerate: Option<String>,
}

impl SpsSummary {
    fn new(sps: &Sps) -> Self {
        let hi = sps.highest_tid();
        SpsSummary {
            id: sps.sps_seq_parameter_set_id,
            width: sps.pic_width_in_luma_samples,
            height: sps.pic_height_in_luma_samples,
            crop_width: sps.crop_rect.width,
            crop_height: sps.crop_rect.height,
            level_idc: sps.profile_tier_level.general_level_idc,
            bit_depth_luma: sps.bit_depth_luma(),
            chroma_format_idc: sps.chroma_format_idc,
            max_dpb_size: level::max_dpb_size(sps),
            max_dec_pic_buffering: sps.sps_max_dec_pic_buffering_minus1[hi] + 1,
            max_num_reorder_pics: sps.sps_max_num_reorder_pics[hi],
            max_latency_pictures: sps.max_latency_pictures(),
            field_seq_flag: sps.field_seq_flag(),
            framerate: sps
                .fps
                .is_positive()
                .then(|| sps.fps.to_string()),
        }
    }
}

fn cmd_info(input: &Path, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read(input)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", input.display(), e))?;

    let mut parameter_sets = ParameterSets::new();
    let mut summaries: Vec<SpsSummary> = Vec::new();
    let mut num_nal_units = 0usize;
    let mut num_slices = 0usize;

    for item in identify_nal_units(&data, NalFraming::AnnexB) {
        let nal = match item {
            Ok(nal) => nal,
            Err(e) => {
                warn!("Skipping NAL unit: {}", e);
                continue;
            }
        };
        num_nal_units += 1;

        let parsed = match nal.nal_type() {
            NalUnitType::VpsNut => parameter_sets.parse_vps(&nal).map(|_| ()),
            NalUnitType::SpsNut => parameter_sets.parse_sps(&nal).map(|sps| {
                if !summaries
                    .iter()
                    .any(|s| s.id == sps.sps_seq_parameter_set_id && s.width == sps.pic_width_in_luma_samples)
                {
                    summaries.push(SpsSummary::new(&sps));
                }
                parameter_sets.insert_sps(sps);
            }),
            NalUnitType::PpsNut => parameter_sets.parse_pps(&nal).map(|_| ()),
            t if t.is_slice() => {
                num_slices += 1;
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(e) = parsed {
            warn!("Failed to parse {:?}: {}", nal.nal_type(), e);
        }
    }

    let (num_vps, num_sps, num_pps) = parameter_sets.counts();

    if json {
        let result = serde_json::json!({
            "file": input.display().to_string(),
            "nal_units": num_nal_units,
            "slices": num_slices,
            "vps": num_vps,
            "sps": num_sps,
            "pps": num_pps,
            "sequences": summaries,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("File: {}", input.display());
    println!("NAL units: {} ({} slice segments)", num_nal_units, num_slices);
    println!("Parameter sets: {} VPS, {} SPS, {} PPS", num_vps, num_sps, num_pps);
    for sps in &summaries {
        println!();
        println!("SPS {}:", sps.id);
        println!("  Resolution: {}x{}", sps.width, sps.height);
        if sps.crop_width != sps.width || sps.crop_height != sps.height {
            println!("  Cropped: {}x{}", sps.crop_width, sps.crop_height);
        }
        println!(
            "  Level: {}.{}",
            sps.level_idc / 30,
            (sps.level_idc % 30) / 3
        );
        println!("  Bit depth: {}", sps.bit_depth_luma);
        println!("  Max DPB size: {}", sps.max_dpb_size);
        println!("  Max reorder: {}", sps.max_num_reorder_pics);
        if let Some(framerate) = &sps.framerate {
            println!("  Framerate: {}", framerate);
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct OutputRecord {
    frame_number: u32,
    poc: i32,
    pic_struct: u8,
    buffer_flags: u32,
}

/// Backend that decodes nothing and remembers the output order
#[derive(Default)]
struct LoggingBackend {
    output_delay: u32,
    sequences: usize,
    pictures: usize,
    slices: usize,
    released: Vec<u32>,
    outputs: Vec<OutputRecord>,
}

impl H265Backend for LoggingBackend {
    fn new_sequence(&mut self, sps: &Sps, max_dpb_size: u32) -> hevcdec_lib::Result<()> {
        info!(
            "New sequence: {}x{}, {} picture buffers",
            sps.pic_width_in_luma_samples, sps.pic_height_in_luma_samples, max_dpb_size
        );
        self.sequences += 1;
        Ok(())
    }

    fn new_picture(&mut self, frame_number: u32, picture: &mut H265Picture) -> hevcdec_lib::Result<()> {
        debug!(frame_number, poc = picture.pic_order_cnt, "new picture");
        self.pictures += 1;
        Ok(())
    }

    fn start_picture(&mut self, picture: &H265Picture, _slice: &H265Slice, dpb: &Dpb) -> hevcdec_lib::Result<()> {
        debug!(poc = picture.pic_order_cnt, dpb = dpb.len(), "start picture");
        Ok(())
    }

    fn decode_slice(
        &mut self,
        picture: &H265Picture,
        slice: &H265Slice,
        ref_pic_list0: &[Option<PictureRef>],
        ref_pic_list1: &[Option<PictureRef>],
    ) -> hevcdec_lib::Result<()> {
        debug!(
            poc = picture.pic_order_cnt,
            slice_type = ?slice.header.slice_type,
            l0 = ref_pic_list0.len(),
            l1 = ref_pic_list1.len(),
            "decode slice"
        );
        self.slices += 1;
        Ok(())
    }

    fn end_picture(&mut self, _picture: &H265Picture) -> hevcdec_lib::Result<()> {
        Ok(())
    }

    fn output_picture(&mut self, frame_number: u32, picture: PictureRef) -> hevcdec_lib::Result<()> {
        let picture = picture.borrow();
        self.outputs.push(OutputRecord {
            frame_number,
            poc: picture.pic_order_cnt,
            pic_struct: picture.pic_struct,
            buffer_flags: picture.buffer_flags.bits(),
        });
        Ok(())
    }

    fn get_preferred_output_delay(&self, _is_live: bool) -> u32 {
        self.output_delay
    }

    fn release_frame(&mut self, frame_number: u32) {
        self.released.push(frame_number);
    }
}

/// Group length-prefixed NAL units into access units at every first slice segment
fn split_packetized_access_units(data: &[u8], nal_length_size: u8) -> Vec<&[u8]> {
    let prefix = nal_length_size as usize;
    let mut units = Vec::new();
    let mut au_start = 0usize;
    let mut seen_vcl = false;

    for nal in identify_nal_units(data, NalFraming::LengthPrefixed(nal_length_size)).flatten() {
        let start = nal.offset.saturating_sub(prefix);
        let nal_type = nal.nal_type();
        let first_slice = nal_type.is_slice() && nal.rbsp.first().is_some_and(|b| b & 0x80 != 0);
        let starts_au = first_slice
            || nal_type.is_parameter_set()
            || matches!(nal_type, NalUnitType::AudNut | NalUnitType::PrefixSeiNut);

        if seen_vcl && starts_au {
            units.push(&data[au_start..start]);
            au_start = start;
            seen_vcl = false;
        }
        if nal_type.is_slice() {
            seen_vcl = true;
        }
    }

    if au_start < data.len() {
        units.push(&data[au_start..]);
    }
    units
}

fn cmd_decode(
    input: &Path,
    hvcc: Option<&Path>,
    output_delay: u32,
    config: DecoderConfig,
    json: bool,
) -> anyhow::Result<()> {
    let data = std::fs::read(input)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", input.display(), e))?;

    let backend = LoggingBackend {
        output_delay,
        ..Default::default()
    };
    let mut decoder = H265Decoder::new(backend, config);

    if let Some(path) = hvcc {
        let codec_data = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?;
        decoder
            .set_codec_data(&codec_data)
            .map_err(|e| anyhow::anyhow!("Invalid codec data: {}", e))?;
    }

    let access_units = match decoder.config().framing {
        StreamFormat::ByteStream => split_access_units(&data),
        StreamFormat::Hvc1 | StreamFormat::Hev1 => {
            split_packetized_access_units(&data, decoder.nal_length_size())
        }
    };
    info!("Decoding {} access units", access_units.len());

    let mut dropped = 0usize;
    for (frame_number, au) in access_units.iter().enumerate() {
        if let Err(e) = decoder.decode(frame_number as u32, au) {
            if e.is_fatal() {
                return Err(anyhow::anyhow!("Decoding stopped at frame {}: {}", frame_number, e));
            }
            warn!("Frame {} dropped: {}", frame_number, e);
            dropped += 1;
        }
    }
    decoder
        .finish()
        .map_err(|e| anyhow::anyhow!("Failed to drain decoder: {}", e))?;

    let latency = decoder.latency();
    let backend = decoder.into_backend();

    if json {
        let result = serde_json::json!({
            "access_units": access_units.len(),
            "sequences": backend.sequences,
            "pictures": backend.pictures,
            "slices": backend.slices,
            "dropped": dropped,
            "released": backend.released,
            "min_latency_ms": latency.map(|l| l.min.as_secs_f64() * 1000.0),
            "max_latency_ms": latency.map(|l| l.max.as_secs_f64() * 1000.0),
            "outputs": backend.outputs,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "Access units: {}, pictures: {}, slices: {}, dropped: {}",
        access_units.len(),
        backend.pictures,
        backend.slices,
        dropped
    );
    if let Some(latency) = latency {
        println!("Latency: {:?} - {:?}", latency.min, latency.max);
    }
    println!("Output order:");
    for record in &backend.outputs {
        println!("  frame {:>5}  poc {:>6}", record.frame_number, record.poc);
    }

    Ok(())
}
