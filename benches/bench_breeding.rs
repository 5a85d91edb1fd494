use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use morphevo::{
    candidate::{Candidate, EvaluationResult, SegmentDomain},
    report::{average_trace_by_segments, population_distribution},
    rng::RandomNumberGenerator,
    selection::{BreedStrategy, TruncationBreeder},
};

fn results(size: usize, rng: &mut RandomNumberGenerator) -> Vec<EvaluationResult> {
    let domain = SegmentDomain::default();
    (0..size)
        .map(|_| {
            let candidate = Candidate::new(domain.sample(rng), 0);
            let loss = (candidate.segments() as f64 - 8.0).abs();
            EvaluationResult::from_trace(candidate, (0..20).map(|i| loss + 20.0 - i as f64).collect())
        })
        .collect()
}

fn bench_select_and_breed(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_and_breed");
    let domain = SegmentDomain::default();
    let breeder = TruncationBreeder::default();
    let mut rng = RandomNumberGenerator::from_seed(0);

    for size in [10, 100, 1000].iter() {
        let evaluated = results(*size, &mut rng);
        group.bench_with_input(BenchmarkId::from_parameter(size), &evaluated, |b, evaluated| {
            b.iter(|| {
                breeder
                    .select_and_breed(black_box(evaluated), *size, &domain, &mut rng)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_report_series(c: &mut Criterion) {
    use morphevo::population::{Population, RunHistory};

    let mut group = c.benchmark_group("report_series");
    let domain = SegmentDomain::default();
    let mut rng = RandomNumberGenerator::from_seed(1);

    let mut history = RunHistory::new();
    let mut population = Population::initialize(100, domain, &mut rng).unwrap();
    for _ in 0..10 {
        let evaluated: Vec<EvaluationResult> = population
            .candidates()
            .iter()
            .map(|c| EvaluationResult::from_trace(*c, vec![c.segments() as f64; 20]))
            .collect();
        let next = TruncationBreeder::default()
            .select_and_breed(&evaluated, 100, &domain, &mut rng)
            .unwrap();
        history.push(population.complete(evaluated).unwrap());
        population = population.replace(next).unwrap();
    }

    group.bench_function("average_trace_by_segments", |b| {
        b.iter(|| average_trace_by_segments(black_box(&history)))
    });
    group.bench_function("population_distribution", |b| {
        b.iter(|| population_distribution(black_box(&history)))
    });

    group.finish();
}

criterion_group!(benches, bench_select_and_breed, bench_report_series);
criterion_main!(benches);
