use criterion::*;
use rsao::{Builder, ElectricField, FromBuilder, Pyramid};

pub fn pyramid_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pyramid");
    group.sample_size(10);
    for steps in [24usize, 48] {
        let mut pym = Pyramid::builder()
            .modulation(3., Some(steps))
            .build()
            .unwrap();
        let ef = ElectricField::new(160, 0.05, 1e6);
        group.bench_with_input(BenchmarkId::new("trigger", steps), &steps, |b, _| {
            let mut t = 0;
            b.iter(|| {
                t += 1;
                pym.trigger(t, &ef).unwrap().total()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, pyramid_benchmark);
criterion_main!(benches);
