//! Decoding state machine benchmarks
//!
//! Covers the per-picture bookkeeping: DPB bumping, POC derivation, RPS
//! marking with reference list construction, and NAL unit identification.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::rc::Rc;

use hevcdec_lib::codec::h265::headers::{Pps, Sps};
use hevcdec_lib::codec::h265::short_term_rps::ShortTermRefPicSet;
use hevcdec_lib::codec::h265::{
    identify_nal_units, Dpb, H265Picture, H265Slice, NalFraming, NalHeader, NalUnitType,
    PocCalculator, RefPicLists, ReferencePictureSet, SliceHeader, SliceType,
};

fn picture(frame_number: u32, poc: i32) -> H265Picture {
    let mut pic = H265Picture::new(frame_number);
    pic.pic_order_cnt = poc;
    pic.output_flag = true;
    pic
}

/// POC of the picture decoded at `index` in a hierarchical GOP of `gop` pictures
fn gop_poc(index: u32, gop: u32) -> i32 {
    let base = (index / gop * gop) as i32;
    match index % gop {
        0 => base,
        k => base + (gop - k) as i32,
    }
}

/// Add pictures in decode order and bump with the reorder limit
fn bench_dpb_bumping(c: &mut Criterion) {
    let mut group = c.benchmark_group("dpb_bumping");
    const PICTURES: u32 = 256;
    group.throughput(Throughput::Elements(PICTURES as u64));

    for &reorder in &[0u32, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(reorder), &reorder, |b, &reorder| {
            b.iter(|| {
                let mut dpb = Dpb::new();
                dpb.set_max_num_pics(16);
                let mut outputs = 0u32;

                for frame in 0..PICTURES {
                    dpb.add(picture(frame, gop_poc(frame, reorder + 1)).into_ref());
                    // sliding window: only the newest picture stays a reference
                    for old in dpb.pictures().iter().rev().skip(1) {
                        old.borrow_mut().reference = false;
                    }
                    dpb.delete_unused();
                    while dpb.needs_bump(reorder, 0, 16) {
                        if dpb.bump(false).is_some() {
                            outputs += 1;
                        }
                    }
                }
                while dpb.bump(true).is_some() {
                    outputs += 1;
                }
                black_box(outputs)
            });
        });
    }

    group.finish();
}

fn bench_poc(c: &mut Criterion) {
    c.bench_function("poc_wrapping_1000", |b| {
        b.iter(|| {
            let mut poc = PocCalculator::new();
            let mut last = 0;
            poc.compute(NalUnitType::IdrWRadl, 1, 0, 256, true);
            for i in 1..1000i32 {
                let lsb = (i * 4) % 256;
                let (value, _) = poc.compute(NalUnitType::TrailR, 1, lsb, 256, false);
                last = value;
            }
            black_box(last)
        });
    });
}

fn sps() -> Rc<Sps> {
    let mut sps = Sps {
        pic_width_in_luma_samples: 1920,
        pic_height_in_luma_samples: 1080,
        log2_max_pic_order_cnt_lsb_minus4: 4,
        ..Default::default()
    };
    sps.sps_max_num_reorder_pics[0] = 4;
    sps.sps_max_dec_pic_buffering_minus1[0] = 8;
    Rc::new(sps)
}

fn b_slice(sps: &Rc<Sps>, poc_lsb: u32, before: &[i32], after: &[i32]) -> H265Slice {
    let mut header = SliceHeader::new(Rc::new(Pps::default()), sps.clone());
    header.first_slice_segment_in_pic_flag = true;
    header.slice_type = SliceType::B;
    header.slice_pic_order_cnt_lsb = poc_lsb;
    header.short_term_ref_pic_set = ShortTermRefPicSet {
        delta_poc_s0: before.to_vec(),
        used_by_curr_pic_s0: vec![true; before.len()],
        delta_poc_s1: after.to_vec(),
        used_by_curr_pic_s1: vec![true; after.len()],
        ..Default::default()
    };
    header.num_ref_idx_l0_active_minus1 = (before.len() + after.len()) as u32 - 1;
    header.num_ref_idx_l1_active_minus1 = header.num_ref_idx_l0_active_minus1;
    header.num_pic_total_curr = (before.len() + after.len()) as u32;

    H265Slice {
        header,
        nal_header: NalHeader {
            nal_unit_type: NalUnitType::TrailN,
            nuh_layer_id: 0,
            nuh_temporal_id_plus1: 1,
        },
    }
}

/// RPS marking against a full DPB followed by list construction
fn bench_rps_ref_lists(c: &mut Criterion) {
    let sps = sps();
    let slice = b_slice(&sps, 16, &[-2, -4, -8, -16], &[2, 4, 8]);

    let mut dpb = Dpb::new();
    for (frame, poc) in [0, 8, 12, 14, 18, 20, 24].iter().enumerate() {
        let mut pic = picture(frame as u32, *poc);
        pic.outputted = true;
        dpb.add(pic.into_ref());
    }

    let mut current = picture(99, 16);
    current.pic_order_cnt_lsb = 16;
    let current = current.into_ref();

    c.bench_function("rps_and_ref_lists", |b| {
        let mut rps = ReferencePictureSet::new();
        let mut lists = RefPicLists::new();
        b.iter(|| {
            rps.prepare(&slice, &current.borrow(), &mut dpb).unwrap();
            lists.build(&slice.header, &rps, &current);
            black_box(lists.list0.len() + lists.list1.len());
            lists.clear();
            rps.clear_pictures();
        });
    });
}

fn bench_nal_identify(c: &mut Criterion) {
    let mut group = c.benchmark_group("nal_identify");

    let mut stream = Vec::new();
    for i in 0..1000u32 {
        stream.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x02, 0x01]);
        stream.extend((0..64).map(|j| ((i + j) % 255 + 1) as u8));
    }
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("annex_b", |b| {
        b.iter(|| {
            let count = identify_nal_units(black_box(&stream), NalFraming::AnnexB)
                .filter(|nal| nal.is_ok())
                .count();
            black_box(count)
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets =
        bench_dpb_bumping,
        bench_poc,
        bench_rps_ref_lists,
        bench_nal_identify,
}

criterion_main!(benches);
