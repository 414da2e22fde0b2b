//! Long-run average rewards.
//!
//! The average reward is constant on every maximal end component, so it is
//! computed per MEC first. What remains is the choice of which MEC to end up
//! in, a stochastic shortest path problem over the states outside the MECs
//! plus one auxiliary state per MEC that collects the MEC's value.

use log::{debug, trace, warn};

use crate::environment::{Environment, LraMethod, MultiplicationStyle};
use crate::error::{CheckError, Result};
use crate::model_checking::rewards::{RewardModel, StandardRewardModel};
use crate::solver::helper_methods::min_max;
use crate::solver::lp::{LpModel, Relation};
use crate::solver::{GeneralMinMaxSolverFactory, Multiplier, OptimizationDirection, SolveGoal};
use crate::storage::{BitVector, MaximalEndComponent, MaximalEndComponentDecomposition, SparseMatrix, SparseMatrixBuilder};
use crate::termination::is_termination_requested;

/// Fraction of the time spent in `psi` states in the long run.
pub fn compute_long_run_average_probabilities(
    env: &Environment,
    goal: &SolveGoal,
    matrix: &SparseMatrix,
    psi: &BitVector,
) -> Result<Vec<f64>> {
    let n = matrix.row_group_count();
    if psi.empty() {
        return Ok(vec![0.0; n]);
    }
    if psi.full() {
        return Ok(vec![1.0; n]);
    }
    let state_rewards = (0..n).map(|s| if psi.get(s) { 1.0 } else { 0.0 }).collect();
    let reward_model = StandardRewardModel::from_state_rewards(state_rewards);
    compute_long_run_average_rewards(env, goal, matrix, &reward_model)
}

pub fn compute_long_run_average_rewards<R: RewardModel>(
    env: &Environment,
    goal: &SolveGoal,
    matrix: &SparseMatrix,
    reward_model: &R,
) -> Result<Vec<f64>> {
    if reward_model.is_empty() {
        return Err(CheckError::InvalidProperty("the reward model is empty".to_string()));
    }
    let n = matrix.row_group_count();
    let dir = goal.direction();
    let mecs = MaximalEndComponentDecomposition::new(matrix);
    debug!("Computing long-run average values for {} MEC(s)", mecs.len());

    let mut lra_values = vec![0.0; mecs.len()];
    for (i, mec) in mecs.iter().enumerate() {
        if is_termination_requested() {
            warn!("Termination requested, {} MEC value(s) were not computed", mecs.len() - i);
            break;
        }
        lra_values[i] = compute_lra_for_maximal_end_component(env, dir, matrix, reward_model, mec)?;
    }

    let states_in_mecs = mecs.states(n);
    let state_to_mec = mecs.state_to_mec_index(n);
    let states_not_in_mecs = !&states_in_mecs;
    let not_in_mecs_before = states_not_in_mecs.number_of_set_bits_before_indices();
    let first_auxiliary_state = states_not_in_mecs.number_of_set_bits();
    let ssp_state_count = first_auxiliary_state + mecs.len();

    // successors inside a MEC are redirected to the MEC's auxiliary state
    let add_redirected_row = |builder: &mut SparseMatrixBuilder, current_row: usize, row: usize| {
        for entry in matrix.row(row) {
            match state_to_mec[entry.column] {
                Some(mec_index) => builder.add_next_value(current_row, first_auxiliary_state + mec_index, entry.value),
                None => builder.add_next_value(current_row, not_in_mecs_before[entry.column], entry.value),
            }
        }
    };

    let mut builder = SparseMatrixBuilder::new();
    let mut b = Vec::new();
    let mut current_row = 0;
    for state in states_not_in_mecs.iter() {
        builder.new_row_group(current_row);
        for row in matrix.row_group(state) {
            add_redirected_row(&mut builder, current_row, row);
            b.push(0.0);
            current_row += 1;
        }
    }
    for (mec_index, mec) in mecs.iter().enumerate() {
        builder.new_row_group(current_row);
        for (state, choices_in_mec) in mec.iter() {
            for row in matrix.row_group(state).filter(|r| !choices_in_mec.contains(r)) {
                add_redirected_row(&mut builder, current_row, row);
                b.push(0.0);
                current_row += 1;
            }
        }
        // stay in the MEC forever and collect its average
        b.push(lra_values[mec_index]);
        current_row += 1;
    }
    let ssp_matrix = builder.build(current_row, ssp_state_count);
    trace!("SSP for long-run averages has {} states and {} choices", ssp_state_count, current_row);

    let factory = GeneralMinMaxSolverFactory::new();
    let mut requirements = factory.requirements(env, true, Some(dir), false);
    requirements.clear_bounds();
    if requirements.has_enabled_critical_requirement() {
        return Err(CheckError::UncheckedRequirement(requirements.enabled_requirements_as_string()));
    }

    let (lowest, highest) = min_max(&lra_values);
    let lower_bound = f64::min(0.0, lowest);
    let upper_bound = f64::max(lower_bound, highest);
    let mut solver = factory.create(env, ssp_matrix);
    solver.set_lower_bound(lower_bound);
    solver.set_upper_bound(upper_bound);
    solver.set_has_unique_solution(true);
    solver.set_requirements_checked(true);
    let mut ssp_result = vec![lower_bound; ssp_state_count];
    if !solver.solve(env, dir, &mut ssp_result, &b)? {
        warn!("Choosing among {} MEC(s) did not converge, long-run averages may be imprecise.", mecs.len());
    }

    let mut result = vec![0.0; n];
    for (state, value) in states_not_in_mecs.iter().zip(ssp_result.iter()) {
        result[state] = *value;
    }
    for state in states_in_mecs.iter() {
        if let Some(mec_index) = state_to_mec[state] {
            result[state] = ssp_result[first_auxiliary_state + mec_index];
        }
    }
    Ok(result)
}

/// The optimal long-run average reward inside one MEC.
pub fn compute_lra_for_maximal_end_component<R: RewardModel>(
    env: &Environment,
    dir: OptimizationDirection,
    matrix: &SparseMatrix,
    reward_model: &R,
    mec: &MaximalEndComponent,
) -> Result<f64> {
    if mec.size() == 1 {
        let mut values = mec
            .iter()
            .flat_map(|(state, choices)| choices.iter().map(move |row| reward_model.total_state_action_reward(state, *row)));
        let first = values
            .next()
            .ok_or_else(|| CheckError::InvalidModel("end component state without choices".to_string()))?;
        return Ok(values.fold(first, |acc, v| dir.best(acc, v)));
    }
    match env.lra_method {
        LraMethod::ValueIteration => Ok(compute_lra_for_maximal_end_component_vi(env, dir, matrix, reward_model, mec)),
        LraMethod::LinearProgramming => compute_lra_for_maximal_end_component_lp(dir, matrix, reward_model, mec),
    }
}

/// Value iteration on the MEC with every transition mixed with a self-loop,
/// which makes the chain aperiodic. The difference of two iterates then
/// converges to the (scaled) average reward.
fn compute_lra_for_maximal_end_component_vi<R: RewardModel>(
    env: &Environment,
    dir: OptimizationDirection,
    matrix: &SparseMatrix,
    reward_model: &R,
    mec: &MaximalEndComponent,
) -> f64 {
    let self_loop_probability = env.lra_self_loop_probability;
    let scaling_factor = 1.0 - self_loop_probability;
    let mec_states = mec.state_set(matrix.row_group_count());
    let local_index = mec_states.number_of_set_bits_before_indices();

    let mut builder = SparseMatrixBuilder::new();
    let mut choice_rewards = Vec::new();
    let mut current_row = 0;
    for (state, choices) in mec.iter() {
        builder.new_row_group(current_row);
        for row in choices.iter() {
            builder.add_next_value(current_row, local_index[state], self_loop_probability);
            for entry in matrix.row(*row) {
                builder.add_next_value(current_row, local_index[entry.column], scaling_factor * entry.value);
            }
            choice_rewards.push(scaling_factor * reward_model.total_state_action_reward(state, *row));
            current_row += 1;
        }
    }
    let mec_matrix = builder.build(current_row, mec.size());

    let precision = env.precision / scaling_factor;
    let multiplier = Multiplier::new(&mec_matrix, MultiplicationStyle::Regular);
    let mut x = vec![0.0; mec.size()];
    let mut x_prime = x.clone();
    let mut next = x.clone();
    let (mut max_diff, mut min_diff) = (0.0, 0.0);
    let mut iterations = 0u64;
    let mut converged = false;
    while iterations < env.max_iterations {
        iterations += 1;
        multiplier.multiply_and_reduce(dir, &mut x, Some(&choice_rewards), &mut next, None);
        std::mem::swap(&mut x, &mut next);

        // subtract a reference value to keep the iterates small
        let reference = x[0];
        max_diff = x[0] - x_prime[0];
        min_diff = max_diff;
        for (value, previous) in x.iter_mut().zip(x_prime.iter_mut()) {
            let diff = *value - *previous;
            max_diff = f64::max(max_diff, diff);
            min_diff = f64::min(min_diff, diff);
            *value -= reference;
            *previous = *value;
        }

        let bound = if env.relative_termination { precision * min_diff } else { precision };
        if max_diff - min_diff <= bound {
            converged = true;
            break;
        }
        if is_termination_requested() {
            warn!("Termination requested after {} LRA iterations", iterations);
            break;
        }
    }
    if converged {
        trace!("LRA computation converged after {} iterations.", iterations);
    } else {
        warn!("LRA computation did not converge within {} iterations.", iterations);
    }
    (max_diff + min_diff) / (2.0 * scaling_factor)
}

/// The classic LP: one bias variable per state and the gain `L`. Biases are
/// only determined up to a constant and are kept non-negative, the gain lies
/// between the smallest and the largest choice reward.
fn compute_lra_for_maximal_end_component_lp<R: RewardModel>(
    dir: OptimizationDirection,
    matrix: &SparseMatrix,
    reward_model: &R,
    mec: &MaximalEndComponent,
) -> Result<f64> {
    let choice_rewards: Vec<f64> = mec
        .iter()
        .flat_map(|(state, choices)| choices.iter().map(move |row| reward_model.total_state_action_reward(state, *row)))
        .collect();
    let (lowest, highest) = min_max(&choice_rewards);

    let mut model = LpModel::new(dir.invert());
    for state in mec.states() {
        model.add_var(&format!("h{}", state), 0.0, Some(0.0), None)?;
    }
    model.add_var("L", 1.0, Some(lowest), Some(highest))?;

    let relation = if dir.minimize() { Relation::Less } else { Relation::Greater };
    for (state, choices) in mec.iter() {
        let own = format!("h{}", state);
        for row in choices.iter() {
            // h_s - sum_t P(s, t) h_t + L  (<=|>=)  r(s, a)
            let successors: Vec<String> = matrix.row(*row).iter().map(|e| format!("h{}", e.column)).collect();
            let mut vars: Vec<&str> = vec![own.as_str(), "L"];
            let mut coefs = vec![1.0, 1.0];
            for (entry, name) in matrix.row(*row).iter().zip(successors.iter()) {
                vars.push(name.as_str());
                coefs.push(-entry.value);
            }
            model.add_constr(&coefs, &vars, relation, reward_model.total_state_action_reward(state, *row))?;
        }
    }
    let solution = model.optimize()?;
    let gain = solution.value("L")?;
    if !gain.is_finite() {
        return Err(CheckError::Lp(format!("the LP returned the non-finite gain {}", gain)));
    }
    Ok(gain)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    // 0 -> {1 or 3}; 1 <-> 2 cycle (reward 1 each); 3 self-loop (reward 2)
    fn two_mecs() -> (SparseMatrix, StandardRewardModel) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(3, 1.0)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(1, 1.0)]],
            vec![vec![(3, 1.0)]],
        ]);
        let rewards = StandardRewardModel::from_state_rewards(vec![0.0, 1.0, 1.0, 2.0]);
        (m, rewards)
    }

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn per_mec_values_agree() {
        let (m, rewards) = two_mecs();
        let mecs = MaximalEndComponentDecomposition::new(&m);
        assert_eq!(mecs.len(), 2);
        for method in [LraMethod::ValueIteration, LraMethod::LinearProgramming] {
            let env = Environment::default().with_lra_method(method);
            for mec in mecs.iter() {
                let value = compute_lra_for_maximal_end_component(&env, OptimizationDirection::Maximize, &m, &rewards, mec).unwrap();
                let expected = if mec.contains_state(3) { 2.0 } else { 1.0 };
                assert!((value - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn ssp_picks_the_best_mec() {
        let (m, rewards) = two_mecs();
        let env = Environment::default();
        let max = compute_long_run_average_rewards(&env, &SolveGoal::new(OptimizationDirection::Maximize), &m, &rewards).unwrap();
        assert!(close(&max, &[2.0, 1.0, 1.0, 2.0]));
        let min = compute_long_run_average_rewards(&env, &SolveGoal::new(OptimizationDirection::Minimize), &m, &rewards).unwrap();
        assert!(close(&min, &[1.0, 1.0, 1.0, 2.0]));
    }

    #[test]
    fn mec_with_choices_and_exits() {
        // 0: [-> 1], [-> 0 (reward 3)]; 1: [-> 0] (reward 1), [-> 2]; 2 absorbing (reward 0)
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(0, 1.0)]],
            vec![vec![(0, 1.0)], vec![(2, 1.0)]],
            vec![vec![(2, 1.0)]],
        ]);
        let rewards = StandardRewardModel::from_state_action_rewards(vec![1.0, 3.0, 1.0, 0.0, 0.0]);
        for method in [LraMethod::ValueIteration, LraMethod::LinearProgramming] {
            let env = Environment::default().with_lra_method(method);
            let max = compute_long_run_average_rewards(&env, &SolveGoal::new(OptimizationDirection::Maximize), &m, &rewards).unwrap();
            assert!(close(&max, &[3.0, 3.0, 0.0]));
            let min = compute_long_run_average_rewards(&env, &SolveGoal::new(OptimizationDirection::Minimize), &m, &rewards).unwrap();
            assert!(close(&min, &[0.0, 0.0, 0.0]));
        }
    }

    #[test]
    fn methods_agree_on_a_mec_with_a_branching_choice() {
        // 0: [-> 0 .5, 1 .5] (r 3), [-> 0] (r 0); 1: [-> 1] (r 1), [-> 0] (r 0)
        let m = SparseMatrix::from_choices(&[
            vec![vec![(0, 0.5), (1, 0.5)], vec![(0, 1.0)]],
            vec![vec![(1, 1.0)], vec![(0, 1.0)]],
        ]);
        let rewards = StandardRewardModel::from_state_action_rewards(vec![3.0, 0.0, 1.0, 0.0]);
        let mecs = MaximalEndComponentDecomposition::new(&m);
        assert_eq!(mecs.len(), 1);
        for method in [LraMethod::ValueIteration, LraMethod::LinearProgramming] {
            let env = Environment::default().with_lra_method(method);
            let mec = mecs.iter().next().unwrap();
            let value = compute_lra_for_maximal_end_component(&env, OptimizationDirection::Maximize, &m, &rewards, mec).unwrap();
            assert!((value - 2.0).abs() < 1e-4, "{:?}: {}", method, value);
            let max = compute_long_run_average_rewards(&env, &SolveGoal::new(OptimizationDirection::Maximize), &m, &rewards).unwrap();
            assert!(close(&max, &[2.0, 2.0]), "{:?}: {:?}", method, max);
            let min = compute_long_run_average_rewards(&env, &SolveGoal::new(OptimizationDirection::Minimize), &m, &rewards).unwrap();
            assert!(close(&min, &[0.0, 0.0]), "{:?}: {:?}", method, min);
        }
    }

    #[test]
    fn long_run_probabilities() {
        let (m, _) = two_mecs();
        let env = Environment::default();
        let goal = SolveGoal::new(OptimizationDirection::Maximize);
        let psi = BitVector::from_indices(4, vec![3]);
        let max = compute_long_run_average_probabilities(&env, &goal, &m, &psi).unwrap();
        assert!(close(&max, &[1.0, 0.0, 0.0, 1.0]));
        // half of the time in 1 <-> 2 is spent in 1
        let psi = BitVector::from_indices(4, vec![1]);
        let max = compute_long_run_average_probabilities(&env, &goal, &m, &psi).unwrap();
        assert!(close(&max, &[0.5, 0.5, 0.5, 0.0]));
        assert_eq!(compute_long_run_average_probabilities(&env, &goal, &m, &BitVector::new(4, false)).unwrap(), vec![0.0; 4]);
        assert_eq!(compute_long_run_average_probabilities(&env, &goal, &m, &BitVector::new(4, true)).unwrap(), vec![1.0; 4]);
        let err = compute_long_run_average_rewards(&env, &goal, &m, &StandardRewardModel::default()).unwrap_err();
        assert!(matches!(err, CheckError::InvalidProperty(_)));
    }
}
