//! CLI integration tests for hevcdec
//!
//! Runs the hevcdec binary on synthesized streams and checks its output.

mod common;

use common::*;
use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

// ============================================================================
// Helper Functions
// ============================================================================

fn run_hevcdec(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hevcdec"))
        .args(args)
        .output()
        .expect("Failed to execute hevcdec")
}

fn stdout_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn write_temp(data: &[u8], suffix: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(suffix).expect("Failed to create temp file");
    file.write_all(data).expect("Failed to write temp file");
    file.flush().expect("Failed to flush temp file");
    file
}

fn path_str(file: &NamedTempFile) -> &str {
    file.path().to_str().expect("temp path is not UTF-8")
}

/// IDR, P(12), B(4), B(8) with two reorder pictures
fn ibbp_stream(params: &StreamParams) -> Vec<u8> {
    let mut nals = parameter_sets(params);
    nals.push(slice_nal(params, &SliceParams::idr()));
    nals.push(slice_nal(params, &SliceParams::p(12, &[-12])));
    nals.push(slice_nal(params, &SliceParams::b(4, &[-4, 8])));
    nals.push(slice_nal(params, &SliceParams::b(8, &[-8, 4])));
    annex_b(&nals)
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_str(&stdout_string(output)).expect("stdout is not JSON")
}

fn output_pocs(value: &serde_json::Value) -> Vec<i64> {
    value["outputs"]
        .as_array()
        .expect("outputs array")
        .iter()
        .map(|o| o["poc"].as_i64().unwrap())
        .collect()
}

// ============================================================================
// General
// ============================================================================

#[test]
fn test_help() {
    let output = run_hevcdec(&["--help"]);
    assert!(output.status.success());
    let stdout = stdout_string(&output);
    assert!(stdout.contains("info"));
    assert!(stdout.contains("decode"));
}

#[test]
fn test_version() {
    let output = run_hevcdec(&["--version"]);
    assert!(output.status.success());
    assert!(stdout_string(&output).contains("hevcdec"));
}

#[test]
fn test_unknown_subcommand() {
    let output = run_hevcdec(&["transcode"]);
    assert!(!output.status.success());
}

// ============================================================================
// info
// ============================================================================

#[test]
fn test_info_text() {
    let params = StreamParams::default();
    let file = write_temp(&ibbp_stream(&params), ".265");

    let output = run_hevcdec(&["info", path_str(&file)]);
    assert!(output.status.success(), "stderr: {}", stderr_string(&output));

    let stdout = stdout_string(&output);
    assert!(stdout.contains("NAL units: 7 (4 slice segments)"));
    assert!(stdout.contains("Parameter sets: 1 VPS, 1 SPS, 1 PPS"));
    assert!(stdout.contains("Resolution: 64x64"));
    assert!(stdout.contains("Max reorder: 2"));
}

#[test]
fn test_info_json() {
    let params = StreamParams {
        width: 1920,
        height: 1080,
        level_idc: 123,
        ..Default::default()
    };
    let file = write_temp(&ibbp_stream(&params), ".265");

    let output = run_hevcdec(&["info", path_str(&file), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr_string(&output));

    let value = json(&output);
    assert_eq!(value["slices"], 4);
    let sequence = &value["sequences"][0];
    assert_eq!(sequence["width"], 1920);
    assert_eq!(sequence["height"], 1080);
    assert_eq!(sequence["level_idc"], 123);
    // level 4.1 holds six 1080p pictures
    assert_eq!(sequence["max_dpb_size"], 6);
    assert_eq!(sequence["max_dec_pic_buffering"], 5);
}

#[test]
fn test_info_missing_file() {
    let output = run_hevcdec(&["info", "/nonexistent/stream.265"]);
    assert!(!output.status.success());
    assert!(stderr_string(&output).contains("Failed to open"));
}

// ============================================================================
// decode
// ============================================================================

#[test]
fn test_decode_output_order() {
    let params = StreamParams::default();
    let file = write_temp(&ibbp_stream(&params), ".265");

    let output = run_hevcdec(&["decode", path_str(&file), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr_string(&output));

    let value = json(&output);
    assert_eq!(value["access_units"], 4);
    assert_eq!(value["pictures"], 4);
    assert_eq!(value["dropped"], 0);
    assert_eq!(output_pocs(&value), vec![0, 4, 8, 12]);
}

#[test]
fn test_decode_text_output() {
    let params = StreamParams::default();
    let file = write_temp(&ibbp_stream(&params), ".265");

    let output = run_hevcdec(&["decode", path_str(&file)]);
    assert!(output.status.success(), "stderr: {}", stderr_string(&output));

    let stdout = stdout_string(&output);
    assert!(stdout.contains("Access units: 4, pictures: 4, slices: 4, dropped: 0"));
    assert!(stdout.contains("Output order:"));
    assert!(stdout.contains("poc     12"));
}

#[test]
fn test_decode_with_output_delay() {
    let params = StreamParams::default();
    let file = write_temp(&ibbp_stream(&params), ".265");

    let output = run_hevcdec(&["decode", path_str(&file), "--output-delay", "2", "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr_string(&output));

    let value = json(&output);
    // the delay only shifts output, drain still emits everything
    assert_eq!(output_pocs(&value), vec![0, 4, 8, 12]);
    assert!(value["max_latency_ms"].as_f64().unwrap() > value["min_latency_ms"].as_f64().unwrap());
}

#[test]
fn test_decode_hvcc_input() {
    let params = StreamParams::default();
    let record = write_temp(&hvcc(&params, 4), ".hvcc");
    let nals = vec![
        slice_nal(&params, &SliceParams::idr()),
        slice_nal(&params, &SliceParams::p(4, &[-4])),
        slice_nal(&params, &SliceParams::p(8, &[-4])),
    ];
    let stream = write_temp(&length_prefixed(&nals, 4), ".hvc");

    let output = run_hevcdec(&[
        "decode",
        path_str(&stream),
        "--hvcc",
        path_str(&record),
        "--json",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr_string(&output));

    let value = json(&output);
    assert_eq!(value["access_units"], 3);
    assert_eq!(output_pocs(&value), vec![0, 4, 8]);
}

#[test]
fn test_decode_config_file() {
    let params = StreamParams::default();
    let mut nals = parameter_sets(&params);
    nals.push(slice_nal(&params, &SliceParams::idr()));
    nals.push(slice_nal(&params, &SliceParams::p(4, &[-4])));
    let stream = write_temp(&length_prefixed(&nals, 2), ".hev");
    let config = write_temp(br#"{"framing": "hev1", "nal_length_size": 2}"#, ".json");

    let output = run_hevcdec(&[
        "decode",
        path_str(&stream),
        "--config",
        path_str(&config),
        "--json",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr_string(&output));
    assert_eq!(output_pocs(&json(&output)), vec![0, 4]);
}

#[test]
fn test_decode_invalid_config() {
    let params = StreamParams::default();
    let stream = write_temp(&ibbp_stream(&params), ".265");
    let config = write_temp(br#"{"nal_length_size": 7}"#, ".json");

    let output = run_hevcdec(&["decode", path_str(&stream), "--config", path_str(&config)]);
    assert!(!output.status.success());
    assert!(stderr_string(&output).contains("Invalid configuration"));
}

#[test]
fn test_decode_drops_leading_rasl() {
    let params = StreamParams {
        max_num_reorder_pics: 0,
        ..Default::default()
    };
    let mut nals = parameter_sets(&params);
    nals.push(slice_nal(&params, &SliceParams::cra(8)));
    nals.push(slice_nal(
        &params,
        &SliceParams::new(hevcdec_lib::codec::h265::NalUnitType::RaslN, 0, 4, &[-4, 4]),
    ));
    nals.push(slice_nal(&params, &SliceParams::p(12, &[-4])));
    let file = write_temp(&annex_b(&nals), ".265");

    let output = run_hevcdec(&["decode", path_str(&file), "--json"]);
    assert!(output.status.success(), "stderr: {}", stderr_string(&output));

    let value = json(&output);
    assert_eq!(value["pictures"], 2);
    assert_eq!(value["released"], serde_json::json!([1]));
    assert_eq!(output_pocs(&value), vec![8, 12]);
}
