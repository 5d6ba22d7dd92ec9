//! End-to-end tests of the H.265 decoding state machine
//!
//! Streams are synthesized by `common` and fed through the public API; the
//! recording backend captures the callback sequence.

mod common;

use common::*;
use hevcdec_lib::codec::h265::{DecoderConfig, H265Decoder, NalUnitType, StreamFormat};
use std::time::Duration;

fn decoder(backend: Recorder) -> H265Decoder<Recorder> {
    H265Decoder::new(backend, DecoderConfig::default())
}

fn params(reorder: u32, max_dec_minus1: u32) -> StreamParams {
    StreamParams {
        max_num_reorder_pics: reorder,
        max_dec_pic_buffering_minus1: max_dec_minus1,
        ..Default::default()
    }
}

fn output_count(dec: &H265Decoder<Recorder>) -> usize {
    dec.backend().output_pocs().len()
}

// ============================================================================
// Basic decoding order
// ============================================================================

#[test]
fn test_ippp_outputs_immediately() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0]);

    dec.decode(1, &access_unit(&params, &SliceParams::p(4, &[-4]))).unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 4]);

    dec.decode(2, &access_unit(&params, &SliceParams::p(8, &[-4]))).unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 4, 8]);
    assert_eq!(dec.backend().output_frames(), vec![0, 1, 2]);

    assert_eq!(dec.backend().lists_of(8), vec![(vec![Some(4)], vec![])]);
}

#[test]
fn test_ibbp_outputs_in_poc_order() {
    let params = params(2, 4);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(12, &[-12]))).unwrap();
    dec.decode(2, &access_unit(&params, &SliceParams::b(4, &[-4, 8]))).unwrap();
    dec.decode(3, &access_unit(&params, &SliceParams::b(8, &[-8, 4]))).unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 4]);

    dec.finish().unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 4, 8, 12]);
    assert!(dec.dpb().is_empty());

    // L0 is before then after, L1 after then before
    assert_eq!(
        dec.backend().lists_of(4),
        vec![(vec![Some(0), Some(12)], vec![Some(12), Some(0)])]
    );
}

#[test]
fn test_callback_order_for_one_picture() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::default());
    dec.decode(7, &first_access_unit(&params, &SliceParams::idr())).unwrap();

    assert_eq!(
        dec.backend().events,
        vec![
            Event::NewSequence {
                width: 64,
                height: 64,
                max_dpb_size: 16
            },
            Event::NewPicture(7),
            Event::StartPicture(0),
            Event::DecodeSlice {
                poc: 0,
                list0: vec![],
                list1: vec![]
            },
            Event::EndPicture(0),
            Event::Output { frame: 7, poc: 0 },
        ]
    );
}

#[test]
fn test_multiple_slices_share_one_picture() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::default());
    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();

    let au = annex_b(&[
        slice_nal(&params, &SliceParams::p(4, &[-4])),
        slice_nal(&params, &SliceParams::p(4, &[-4]).at_address(8)),
    ]);
    dec.decode(1, &au).unwrap();

    let events = &dec.backend().events;
    let starts = events
        .iter()
        .filter(|e| matches!(e, Event::StartPicture(4)))
        .count();
    assert_eq!(starts, 1);
    assert_eq!(dec.backend().lists_of(4).len(), 2);
    assert_eq!(dec.backend().output_pocs(), vec![0, 4]);
}

#[test]
fn test_ref_lists_can_be_disabled() {
    let params = params(0, 1);
    let config = DecoderConfig {
        process_ref_pic_lists: false,
        ..Default::default()
    };
    let mut dec = H265Decoder::new(Recorder::default(), config);

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(4, &[-4]))).unwrap();
    assert_eq!(dec.backend().lists_of(4), vec![(vec![], vec![])]);
}

// ============================================================================
// Picture order count
// ============================================================================

#[test]
fn test_poc_lsb_wraps() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(100, &[-100]))).unwrap();
    dec.decode(2, &access_unit(&params, &SliceParams::p(200, &[-100]))).unwrap();
    // 300 mod 256
    dec.decode(3, &access_unit(&params, &SliceParams::p(44, &[-100]))).unwrap();

    assert_eq!(dec.backend().output_pocs(), vec![0, 100, 200, 300]);
}

#[test]
fn test_idr_outputs_prior_pictures() {
    let params = params(2, 4);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(4, &[-4]))).unwrap();
    assert!(dec.backend().output_pocs().is_empty());

    dec.decode(2, &access_unit(&params, &SliceParams::idr())).unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 4]);

    dec.finish().unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 4, 0]);
    assert_eq!(dec.backend().output_frames(), vec![0, 1, 2]);
}

#[test]
fn test_idr_no_output_of_prior_pics_discards() {
    let params = params(2, 4);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(4, &[-4]))).unwrap();

    let mut idr = SliceParams::idr();
    idr.no_output_of_prior_pics = true;
    dec.decode(2, &access_unit(&params, &idr)).unwrap();
    dec.finish().unwrap();

    assert_eq!(dec.backend().output_frames(), vec![2]);
    assert_eq!(dec.backend().released(), vec![0, 1]);
}

// ============================================================================
// Random access
// ============================================================================

#[test]
fn test_rasl_after_leading_cra_dropped() {
    let params = params(0, 2);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::cra(8))).unwrap();
    let rasl = SliceParams::new(NalUnitType::RaslN, 0, 4, &[-4, 4]);
    dec.decode(1, &access_unit(&params, &rasl)).unwrap();
    dec.decode(2, &access_unit(&params, &SliceParams::p(12, &[-4]))).unwrap();

    assert_eq!(dec.backend().output_pocs(), vec![8, 12]);
    assert_eq!(dec.backend().released(), vec![1]);
    assert!(!dec.backend().events.contains(&Event::NewPicture(1)));
}

#[test]
fn test_rasl_after_mid_stream_cra_decoded() {
    let params = params(0, 2);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    // keeps the IDR as a reference for the leading picture
    let cra = SliceParams::new(NalUnitType::CraNut, 2, 8, &[-8]);
    dec.decode(1, &access_unit(&params, &cra)).unwrap();
    let rasl = SliceParams::new(NalUnitType::RaslN, 0, 4, &[-4, 4]);
    dec.decode(2, &access_unit(&params, &rasl)).unwrap();

    assert!(dec.backend().events.contains(&Event::NewPicture(2)));
    assert_eq!(
        dec.backend().lists_of(4),
        vec![(vec![Some(0), Some(8)], vec![Some(8), Some(0)])]
    );
}

#[test]
fn test_cra_after_eos_starts_over() {
    let params = params(0, 2);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &annex_b(&[eos_nal()])).unwrap();
    dec.decode(2, &access_unit(&params, &SliceParams::cra(16))).unwrap();
    let rasl = SliceParams::new(NalUnitType::RaslN, 0, 12, &[-12, 4]);
    dec.decode(3, &access_unit(&params, &rasl)).unwrap();

    assert_eq!(dec.backend().output_pocs(), vec![0, 16]);
    assert!(dec.backend().released().contains(&3));
}

// ============================================================================
// Sequence changes
// ============================================================================

#[test]
fn test_resolution_change_drains_first() {
    let params_a = params(4, 4);
    let params_b = StreamParams {
        width: 128,
        ..params_a.clone()
    };
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params_a, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params_a, &SliceParams::p(4, &[-4]))).unwrap();
    dec.decode(2, &access_unit(&params_a, &SliceParams::p(8, &[-4]))).unwrap();
    assert_eq!(output_count(&dec), 0);

    dec.decode(3, &first_access_unit(&params_b, &SliceParams::idr())).unwrap();

    let events = &dec.backend().events;
    let second_sequence = events
        .iter()
        .rposition(|e| matches!(e, Event::NewSequence { width: 128, .. }))
        .unwrap();
    let outputs_before: Vec<i32> = events[..second_sequence]
        .iter()
        .filter_map(|e| match e {
            Event::Output { poc, .. } => Some(*poc),
            _ => None,
        })
        .collect();
    assert_eq!(outputs_before, vec![0, 4, 8]);
    assert_eq!(dec.backend().sequences(), 2);
    assert_eq!(dec.active_sps().unwrap().pic_width_in_luma_samples, 128);
}

#[test]
fn test_resolution_change_with_no_output_of_prior_pics_discards() {
    let params_a = params(4, 4);
    let params_b = StreamParams {
        width: 128,
        ..params_a.clone()
    };
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params_a, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params_a, &SliceParams::p(4, &[-4]))).unwrap();
    dec.decode(2, &access_unit(&params_a, &SliceParams::p(8, &[-4]))).unwrap();

    // same SPS id, new resolution; the IDR drops what the old sequence left
    let mut idr = SliceParams::idr();
    idr.no_output_of_prior_pics = true;
    dec.decode(3, &first_access_unit(&params_b, &idr)).unwrap();

    assert_eq!(output_count(&dec), 0);
    assert_eq!(dec.backend().released(), vec![0, 1, 2]);
    assert_eq!(dec.backend().sequences(), 2);

    dec.finish().unwrap();
    assert_eq!(dec.backend().output_frames(), vec![3]);
}

#[test]
fn test_repeated_parameter_sets_keep_sequence() {
    let params = params(2, 4);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(4, &[-4]))).unwrap();
    dec.decode(2, &first_access_unit(&params, &SliceParams::p(8, &[-4]))).unwrap();

    assert_eq!(dec.backend().sequences(), 1);
    assert_eq!(dec.backend().output_pocs(), vec![0]);
}

#[test]
fn test_latency_reported() {
    let params = params(2, 4);
    let mut dec = decoder(Recorder::with_delay(1));
    assert!(dec.latency().is_none());

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    let latency = dec.latency().unwrap();
    // no timing info: 25 fps
    assert_eq!(latency.min, Duration::from_millis(120));
    assert_eq!(latency.max, Duration::from_millis(680));
}

#[test]
fn test_output_delay_holds_pictures() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::with_delay(2));

    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(4, &[-4]))).unwrap();
    assert_eq!(output_count(&dec), 0);

    dec.decode(2, &access_unit(&params, &SliceParams::p(8, &[-4]))).unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0]);

    dec.drain().unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 4, 8]);
    assert!(matches!(
        dec.backend().events[0],
        Event::NewSequence { max_dpb_size: 18, .. }
    ));
}

// ============================================================================
// Flush and drain
// ============================================================================

fn three_pending() -> H265Decoder<Recorder> {
    let params = params(4, 4);
    let mut dec = decoder(Recorder::default());
    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(8, &[-8]))).unwrap();
    dec.decode(2, &access_unit(&params, &SliceParams::p(4, &[-4, 4]))).unwrap();
    assert_eq!(dec.dpb().num_needed_for_output(), 3);
    dec
}

#[test]
fn test_flush_outputs_nothing() {
    let mut dec = three_pending();
    dec.flush();

    assert_eq!(output_count(&dec), 0);
    assert!(dec.dpb().is_empty());
    assert_eq!(dec.backend().released(), vec![0, 1, 2]);
}

#[test]
fn test_drain_outputs_in_poc_order() {
    let mut dec = three_pending();
    dec.drain().unwrap();

    assert_eq!(dec.backend().output_pocs(), vec![0, 4, 8]);
    assert_eq!(dec.backend().output_frames(), vec![0, 2, 1]);
    assert!(dec.dpb().is_empty());
}

#[test]
fn test_flush_then_cra_treated_as_first() {
    let params = params(4, 4);
    let mut dec = three_pending();
    dec.flush();

    dec.decode(3, &access_unit(&params, &SliceParams::cra(32))).unwrap();
    let rasl = SliceParams::new(NalUnitType::RaslN, 0, 28, &[-4, 4]);
    dec.decode(4, &access_unit(&params, &rasl)).unwrap();
    dec.finish().unwrap();

    assert_eq!(dec.backend().output_pocs(), vec![32]);
    assert!(dec.backend().released().contains(&4));
}

// ============================================================================
// Error handling
// ============================================================================

#[test]
fn test_slice_without_parameter_sets_dropped() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::default());

    dec.decode(0, &access_unit(&params, &SliceParams::idr())).unwrap();
    assert_eq!(dec.backend().released(), vec![0]);
    assert_eq!(dec.backend().sequences(), 0);

    dec.decode(1, &first_access_unit(&params, &SliceParams::idr())).unwrap();
    assert_eq!(dec.backend().output_frames(), vec![1]);
}

#[test]
fn test_truncated_nal_skipped() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::default());
    let mut nals = parameter_sets(&params);
    nals.push(vec![0x42]);
    nals.push(slice_nal(&params, &SliceParams::idr()));

    dec.decode(0, &annex_b(&nals)).unwrap();
    assert_eq!(dec.backend().output_frames(), vec![0]);
}

#[test]
fn test_two_first_slices_in_access_unit() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::default());
    dec.decode(0, &first_access_unit(&params, &SliceParams::idr())).unwrap();

    let au = annex_b(&[
        slice_nal(&params, &SliceParams::p(4, &[-4])),
        slice_nal(&params, &SliceParams::p(4, &[-4])),
    ]);
    let err = dec.decode(1, &au).unwrap_err();
    assert!(err.is_picture_error());
    assert_eq!(dec.backend().released(), vec![1]);
    assert!(dec.get_picture(1).is_none());

    dec.decode(2, &access_unit(&params, &SliceParams::p(8, &[-8]))).unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 8]);
}

#[test]
fn test_new_picture_failure_is_fatal() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder {
        fail_new_picture: true,
        ..Default::default()
    });

    let err = dec
        .decode(0, &first_access_unit(&params, &SliceParams::idr()))
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(dec.backend().released(), vec![0]);
}

#[test]
fn test_hidden_picture_released() {
    let params = StreamParams {
        output_flag_present: true,
        ..params(0, 1)
    };
    let mut dec = decoder(Recorder::default());
    let mut idr = SliceParams::idr();
    idr.pic_output_flag = false;

    dec.decode(0, &first_access_unit(&params, &idr)).unwrap();
    dec.decode(1, &access_unit(&params, &SliceParams::p(4, &[-4]))).unwrap();

    assert_eq!(dec.backend().output_pocs(), vec![4]);
    assert_eq!(dec.backend().released(), vec![0]);
    assert_eq!(dec.backend().lists_of(4), vec![(vec![Some(0)], vec![])]);
}

// ============================================================================
// Packetized input
// ============================================================================

#[test]
fn test_codec_data_switches_to_length_prefixed() {
    let params = params(0, 1);
    let mut dec = decoder(Recorder::default());
    dec.set_codec_data(&hvcc(&params, 2)).unwrap();

    assert_eq!(dec.config().framing, StreamFormat::Hvc1);
    assert_eq!(dec.nal_length_size(), 2);
    assert_eq!(dec.parameter_sets().counts(), (1, 1, 1));

    dec.decode(0, &length_prefixed(&[slice_nal(&params, &SliceParams::idr())], 2))
        .unwrap();
    dec.decode(1, &length_prefixed(&[slice_nal(&params, &SliceParams::p(4, &[-4]))], 2))
        .unwrap();
    assert_eq!(dec.backend().output_pocs(), vec![0, 4]);
}

#[test]
fn test_hev1_inline_parameter_sets() {
    let params = params(0, 1);
    let config = DecoderConfig {
        framing: StreamFormat::Hev1,
        ..Default::default()
    };
    let mut dec = H265Decoder::new(Recorder::default(), config);

    let mut nals = parameter_sets(&params);
    nals.push(slice_nal(&params, &SliceParams::idr()));
    dec.decode(0, &length_prefixed(&nals, 4)).unwrap();

    assert_eq!(dec.backend().output_pocs(), vec![0]);
}

#[test]
fn test_bad_codec_data_rejected() {
    let mut dec = decoder(Recorder::default());
    assert!(dec.set_codec_data(&[1, 2, 3]).is_err());
    assert_eq!(dec.config().framing, StreamFormat::ByteStream);
}
