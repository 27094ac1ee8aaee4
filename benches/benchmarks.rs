use criterion::measurement::WallTime;
use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};
use digest::Digest;

use cryptonight_miner::{
    cn_double_hash, cn_hash, CnContext, CryptoNight, MemoryPolicy, Variant,
};

fn bench_buffer_reuse(b: &mut Bencher<WallTime>) {
    let mut scratchpad = CryptoNight::allocate_scratchpad();

    b.iter(|| CryptoNight::digest_with_buffer(black_box(b""), scratchpad.as_mut()));
}

fn bench_variant(b: &mut Bencher<WallTime>, variant: Variant) {
    let mut ctx = CnContext::new(MemoryPolicy::NeverUse).unwrap();
    let input = [0x0Fu8; 76];

    b.iter(|| cn_hash(black_box(&input[..]), variant, &mut ctx));
}

fn bench_double(b: &mut Bencher<WallTime>) {
    let mut ctx0 = CnContext::new(MemoryPolicy::NeverUse).unwrap();
    let mut ctx1 = CnContext::new(MemoryPolicy::NeverUse).unwrap();
    let input0 = [0x0Fu8; 76];
    let input1 = [0xF0u8; 76];

    b.iter(|| {
        cn_double_hash(
            black_box(&input0[..]),
            black_box(&input1[..]),
            Variant::V2,
            &mut ctx0,
            &mut ctx1,
        )
    });
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Hash with allocator", |b| {
        b.iter(|| CryptoNight::digest(black_box(b"")));
    });

    c.bench_function("Hash with external buffer", bench_buffer_reuse);

    c.bench_function("Variant 0", |b| bench_variant(b, Variant::V0));
    c.bench_function("Variant 1", |b| bench_variant(b, Variant::V1));
    c.bench_function("Variant 2", |b| bench_variant(b, Variant::V2));
    c.bench_function("Variant 2 double", bench_double);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
