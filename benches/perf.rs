use std::hint::black_box;

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use monoio_ws_session::assembler::Assembler;
use monoio_ws_session::codec::{decode_frame, encode_frame};
use monoio_ws_session::frame::{Frame, OpCode, apply_mask};

const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];
const SIZES: [(&str, usize); 3] = [("32b", 32), ("1kb", 1024), ("64kb", 64 * 1024)];

fn bench_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask");
    for (label, size) in SIZES {
        let mut payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| apply_mask(black_box(&mut payload), KEY));
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_masked");
    for (label, size) in SIZES {
        let payload = vec![b'x'; size];
        let mut dst = BytesMut::with_capacity(size + 14);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| {
                dst.clear();
                encode_frame(&mut dst, OpCode::Binary, black_box(&payload), true, Some(KEY));
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_unmasked");
    for (label, size) in SIZES {
        let mut wire = BytesMut::new();
        encode_frame(&mut wire, OpCode::Binary, &vec![b'x'; size], true, None);
        let wire = wire.freeze();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| {
                let mut src = BytesMut::from(&wire[..]);
                let frame = decode_frame(&mut src, u64::MAX)
                    .expect("decode")
                    .expect("complete frame");
                black_box(frame);
            });
        });
    }
    group.finish();
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_text");
    let chunk = "x".repeat(1024);
    for fragments in [1usize, 16, 64] {
        group.throughput(Throughput::Bytes((fragments * chunk.len()) as u64));
        group.bench_function(BenchmarkId::from_parameter(fragments), |b| {
            b.iter(|| {
                let mut assembler = Assembler::new(usize::MAX, usize::MAX);
                for i in 0..fragments {
                    let opcode = if i == 0 { OpCode::Text } else { OpCode::Continuation };
                    let frame = Frame::new(opcode, chunk.clone(), i + 1 == fragments);
                    black_box(assembler.push(frame).expect("assemble"));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mask, bench_encode, bench_decode, bench_assemble);
criterion_main!(benches);
