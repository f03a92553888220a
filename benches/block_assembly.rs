//! Benchmarks for data block operations
//!
//! Covers the per-block work a consumer does after a read:
//! - cloning a block (aliased storage)
//! - detaching a clone on first write
//! - complex views over interleaved samples
//! - drift queries over many time stamps

use bulkflow::test_utils::packet_time;
use bulkflow::{DataBlock, SampleTimestamp, SharedBuffer, StreamSri};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

const BLOCK_LEN: usize = 8192;

fn block(complex: bool) -> DataBlock<f32> {
    let sri = Arc::new(StreamSri::new("bench").with_xdelta(0.5).with_complex(complex));
    let data: Vec<f32> = (0..BLOCK_LEN).map(|v| v as f32).collect();
    let mut block = DataBlock::new(sri, SharedBuffer::from_vec(data));
    block.add_timestamp(SampleTimestamp::new(packet_time(0, 64), 0));
    block
}

fn bench_copy_on_write(c: &mut Criterion) {
    let original = block(false);
    let mut group = c.benchmark_group("copy_on_write");
    group.throughput(Throughput::Elements(BLOCK_LEN as u64));

    group.bench_function("clone", |b| b.iter(|| black_box(original.clone())));

    group.bench_function("clone_then_write", |b| {
        b.iter(|| {
            let mut copy = original.clone();
            copy.data_mut()[0] = -1.0;
            black_box(copy)
        })
    });

    group.finish();
}

fn bench_complex_view(c: &mut Criterion) {
    let block = block(true);
    c.bench_function("cxdata_sum", |b| {
        b.iter(|| {
            let cx = block.cxdata().expect("even length");
            black_box(cx.iter().map(|s| s.norm_sqr()).sum::<f32>())
        })
    });
}

fn bench_drift(c: &mut Criterion) {
    let mut block = block(false);
    for index in 1..128 {
        block.add_timestamp(SampleTimestamp::new(packet_time(index, 64), index * 64));
    }

    let mut group = c.benchmark_group("drift");
    group.bench_function("net_time_drift", |b| b.iter(|| black_box(block.net_time_drift())));
    group.bench_function("max_time_drift", |b| b.iter(|| black_box(block.max_time_drift())));
    group.finish();
}

criterion_group!(benches, bench_copy_on_write, bench_complex_view, bench_drift);
criterion_main!(benches);
