use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mdp_prctl::environment::{Environment, MinMaxMethod};
use mdp_prctl::model_checking::hint::ModelCheckerHint;
use mdp_prctl::model_checking::lra::compute_long_run_average_rewards;
use mdp_prctl::model_checking::reachability::{compute_reachability_rewards, compute_until_probabilities};
use mdp_prctl::model_checking::rewards::StandardRewardModel;
use mdp_prctl::storage::{BitVector, SparseMatrix};
use mdp_prctl::{OptimizationDirection, SolveGoal};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A `size` x `size` grid robot. Every move slips to a random neighbour with a
/// cell dependent probability. Cell 0 is the target, the last cell a trap.
fn grid(size: usize, seed: u64) -> (SparseMatrix, SparseMatrix, BitVector) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = size * size;
    let mut choices = Vec::with_capacity(n);
    for cell in 0..n {
        if cell == 0 || cell == n - 1 {
            choices.push(vec![vec![(cell, 1.0)]]);
            continue;
        }
        let (x, y) = (cell % size, cell / size);
        let mut neighbours = Vec::new();
        if x > 0 {
            neighbours.push(cell - 1);
        }
        if x + 1 < size {
            neighbours.push(cell + 1);
        }
        if y > 0 {
            neighbours.push(cell - size);
        }
        if y + 1 < size {
            neighbours.push(cell + size);
        }
        let slip: f64 = rng.gen_range(0.05, 0.3);
        let cell_choices = neighbours
            .iter()
            .map(|intended| {
                let mut distribution = vec![(*intended, 1.0 - slip)];
                let other = neighbours[rng.gen_range(0, neighbours.len())];
                distribution.push((other, slip));
                distribution
            })
            .collect();
        choices.push(cell_choices);
    }
    let matrix = SparseMatrix::from_choices(&choices);
    let backward = matrix.transpose();
    (matrix, backward, BitVector::from_indices(n, vec![0]))
}

fn reachability_benchmark(c: &mut Criterion) {
    let (matrix, backward, target) = grid(30, 7);
    let n = matrix.row_group_count();
    let all = BitVector::new(n, true);
    let hint = ModelCheckerHint::empty();
    let rewards = StandardRewardModel::from_state_rewards(vec![1.0; n]);

    for (name, method) in [
        ("until max value iteration", MinMaxMethod::ValueIteration),
        ("until max policy iteration", MinMaxMethod::PolicyIteration),
        ("until max topological", MinMaxMethod::Topological),
    ] {
        let env = Environment::default().with_min_max_method(method);
        c.bench_function(name, |b| {
            b.iter(|| {
                compute_until_probabilities(
                    &env,
                    SolveGoal::new(OptimizationDirection::Maximize),
                    black_box(&matrix),
                    &backward,
                    &all,
                    &target,
                    false,
                    false,
                    &hint,
                )
            })
        });
    }

    let env = Environment::default();
    c.bench_function("reward min", |b| {
        b.iter(|| {
            compute_reachability_rewards(
                &env,
                SolveGoal::new(OptimizationDirection::Minimize),
                black_box(&matrix),
                &backward,
                &rewards,
                &target,
                false,
                true,
                &hint,
            )
        })
    });
    c.bench_function("long-run average max", |b| {
        b.iter(|| compute_long_run_average_rewards(&env, &SolveGoal::new(OptimizationDirection::Maximize), black_box(&matrix), &rewards))
    });
}

criterion_group!(benches, reachability_benchmark);
criterion_main!(benches);
