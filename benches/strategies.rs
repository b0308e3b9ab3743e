//! Criterion benchmarks of the fill-then-drain workload on each built-in strategy.

use arenalloc::{Arena, Registry, Workload};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const ARENA_SIZE: usize = 1 << 20;
const OPS: usize = 4096;

fn bench_workload(c: &mut Criterion) {
  let registry = Registry::builtin();
  let mut buffer = vec![0u8; ARENA_SIZE];
  let mut group = c.benchmark_group("workload");

  for block_size in [16, 32, 128] {
    let workload = Workload {
      ops: OPS,
      block_size,
    };

    for name in registry.names() {
      group.bench_with_input(BenchmarkId::new(name, block_size), &workload, |b, workload| {
        b.iter(|| {
          let mut strategy = registry
            .create(name, Arena::from_slice(&mut buffer))
            .unwrap();
          black_box(workload.run(strategy.as_mut()))
        });
      });
    }
  }

  group.finish();
}

criterion_group!(benches, bench_workload);
criterion_main!(benches);
