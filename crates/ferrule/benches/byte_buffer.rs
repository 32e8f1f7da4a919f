use criterion::{Bencher, Criterion, black_box, criterion_group, criterion_main};
use ferrule::ByteBuffer;

const EDITS: usize = 10_000;

/// Appends one byte at a time; exercises the right-hand spare space.
fn append_bytes(bench: &mut Bencher) {
    bench.iter(|| {
        let mut buffer = ByteBuffer::new_mutable();
        for i in 0..EDITS {
            buffer.append(i as u8).unwrap();
        }
        black_box(buffer.len());
    });
}

/// Inserts at the front; a flat vector would shift everything on every insert.
fn prepend_bytes(bench: &mut Bencher) {
    bench.iter(|| {
        let mut buffer = ByteBuffer::new_mutable();
        for i in 0..EDITS {
            buffer.insert(0, i as u8).unwrap();
        }
        black_box(buffer.len());
    });
}

/// Drains from the front, as a FIFO queue would.
fn pop_front(bench: &mut Bencher) {
    let filled = ByteBuffer::mutable_from(&vec![1u8; EDITS]);
    bench.iter(|| {
        let mut buffer = filled.clone();
        while !buffer.is_empty() {
            black_box(buffer.pop(0).unwrap());
        }
    });
}

fn strided_delete(bench: &mut Bencher) {
    let filled = ByteBuffer::mutable_from(&vec![7u8; EDITS]);
    bench.iter(|| {
        let mut buffer = filled.clone();
        buffer.delete_slice(0, EDITS as isize, 3).unwrap();
        black_box(buffer.len());
    });
}

/// Baseline for `prepend_bytes`.
fn prepend_vec(bench: &mut Bencher) {
    bench.iter(|| {
        let mut data: Vec<u8> = Vec::new();
        for i in 0..EDITS {
            data.insert(0, i as u8);
        }
        black_box(data.len());
    });
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("append__byte_buffer", append_bytes);
    c.bench_function("prepend__byte_buffer", prepend_bytes);
    c.bench_function("prepend__vec", prepend_vec);
    c.bench_function("pop_front__byte_buffer", pop_front);
    c.bench_function("strided_delete__byte_buffer", strided_delete);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
