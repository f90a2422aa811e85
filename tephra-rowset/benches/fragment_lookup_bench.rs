//! Fragment lookup under many fragments: the O(1) uniform shortcut against
//! the generic reverse-scan path over ragged fragment sizes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tephra_rowset::FragmentOffsets;

fn sweep(offsets: &FragmentOffsets, total_rows: u64) -> u64 {
    let mut acc = 0u64;
    let mut idx = 0u64;
    while idx < total_rows {
        let (frag, local) = offsets.locate(black_box(idx));
        acc = acc.wrapping_add(frag as u64).wrapping_add(local);
        idx += 4_097;
    }
    acc
}

fn bench_fragment_lookup(c: &mut Criterion) {
    for frag_count in [16usize, 512, 4_096] {
        let uniform_counts = vec![1_000u64; frag_count];
        let uniform = FragmentOffsets::from_row_counts(&uniform_counts);
        let uniform_total: u64 = uniform_counts.iter().sum();

        let ragged_counts: Vec<u64> = (0..frag_count)
            .map(|i| 500 + (i as u64 * 37) % 1_000)
            .collect();
        let ragged = FragmentOffsets::from_row_counts(&ragged_counts);
        let ragged_total: u64 = ragged_counts.iter().sum();

        c.bench_function(&format!("locate/uniform/{frag_count}"), |b| {
            b.iter(|| sweep(&uniform, uniform_total))
        });
        c.bench_function(&format!("locate/ragged/{frag_count}"), |b| {
            b.iter(|| sweep(&ragged, ragged_total))
        });
    }
}

criterion_group!(benches, bench_fragment_lookup);
criterion_main!(benches);
