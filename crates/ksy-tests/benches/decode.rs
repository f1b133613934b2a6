use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ksy_runtime::{self as rt, DecodeError, KStream};

fn bench_int_reads(c: &mut Criterion) {
    let data = vec![0xA5u8; 64 * 1024];
    let mut group = c.benchmark_group("read_u4");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for endian in [rt::Endian::Little, rt::Endian::Big] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{endian:?}")),
            &endian,
            |b, &endian| {
                b.iter(|| {
                    let mut io = KStream::new(data.clone());
                    rt::repeat_eos(&mut io, |io, _| Ok(io.read_u4(endian)?)).unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_terminated(c: &mut Criterion) {
    let mut data = Vec::new();
    for i in 0..4096u32 {
        data.extend_from_slice(format!("entry-{i}").as_bytes());
        data.push(0);
    }
    let mut group = c.benchmark_group("strz");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("repeat_eos", |b| {
        b.iter(|| {
            let mut io = KStream::new(data.clone());
            rt::repeat_eos(&mut io, |io, _| -> Result<String, DecodeError> {
                let raw = io.read_bytes_term(0, rt::Terminator::default())?;
                rt::decode_text(raw, rt::TextEncoding::Utf8)
            })
            .unwrap()
        });
    });
    group.finish();
}

fn bench_process(c: &mut Criterion) {
    let data = b"fn placeholder() {}\n".repeat(512);
    let mut group = c.benchmark_group("process");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("xor_many", |b| {
        b.iter(|| rt::process_xor_many(&data, &[0x13, 0x37, 0x42]));
    });
    group.bench_function("rotate_left", |b| {
        b.iter(|| rt::process_rotate_left(&data, 3));
    });
    let packed = zstd::encode_all(&data[..], 3).unwrap();
    group.bench_function("zstd", |b| {
        b.iter(|| rt::process_zstd(&packed).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_int_reads, bench_terminated, bench_process);
criterion_main!(benches);
