//! Queries with a step bound: next, bounded until, instantaneous and
//! cumulative rewards. All of them are a fixed number of Bellman steps.

use log::info;

use crate::environment::MultiplicationStyle;
use crate::error::{CheckError, Result};
use crate::model_checking::graph;
use crate::model_checking::hint::ModelCheckerHint;
use crate::model_checking::rewards::RewardModel;
use crate::solver::{Multiplier, OptimizationDirection, SolveGoal};
use crate::storage::{BitVector, SparseMatrix};

pub fn compute_next_probabilities(dir: OptimizationDirection, matrix: &SparseMatrix, next_states: &BitVector) -> Vec<f64> {
    let mut result: Vec<f64> = (0..matrix.row_group_count()).map(|s| if next_states.get(s) { 1.0 } else { 0.0 }).collect();
    Multiplier::new(matrix, MultiplicationStyle::Regular).repeated_multiply_and_reduce(dir, &mut result, None, 1);
    result
}

/// Probabilities of reaching `psi` via `phi` states within `step_bound` steps.
pub fn compute_step_bounded_until_probabilities(
    goal: &SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    phi: &BitVector,
    psi: &BitVector,
    step_bound: usize,
    hint: &ModelCheckerHint,
) -> Result<Vec<f64>> {
    let n = matrix.row_group_count();
    let mut result = vec![0.0; n];
    let maybe_states = if hint.compute_only_maybe_states() {
        hint.maybe_states()
            .cloned()
            .ok_or_else(|| CheckError::IllegalArgument("hint asks to compute only maybe states but has none".to_string()))?
    } else {
        let mut maybe_states = if goal.minimize() {
            graph::prob_greater0_a(matrix, backward, phi, psi, Some(step_bound))
        } else {
            graph::prob_greater0_e(backward, phi, psi, Some(step_bound))
        };
        maybe_states &= &!psi;
        maybe_states
    };
    info!("Preprocessing: {} non-target states with probability greater 0.", maybe_states.number_of_set_bits());

    if !maybe_states.empty() {
        let submatrix = matrix.submatrix(&maybe_states, &maybe_states);
        let b = matrix.constrained_row_group_sum_vector(&maybe_states, psi);
        let mut subresult = vec![0.0; maybe_states.number_of_set_bits()];
        Multiplier::new(&submatrix, MultiplicationStyle::Regular).repeated_multiply_and_reduce(
            goal.direction(),
            &mut subresult,
            Some(&b),
            step_bound,
        );
        for (state, value) in maybe_states.iter().zip(subresult) {
            result[state] = value;
        }
    }
    for state in psi.iter() {
        result[state] = 1.0;
    }
    Ok(result)
}

/// Expected state reward after exactly `step_count` steps.
pub fn compute_instantaneous_rewards<R: RewardModel>(
    goal: &SolveGoal,
    matrix: &SparseMatrix,
    reward_model: &R,
    step_count: usize,
) -> Result<Vec<f64>> {
    if !reward_model.has_state_rewards() {
        return Err(CheckError::InvalidProperty("instantaneous rewards need state rewards".to_string()));
    }
    let mut result = reward_model.state_reward_vector(matrix.row_group_count());
    Multiplier::new(matrix, MultiplicationStyle::Regular).repeated_multiply_and_reduce(goal.direction(), &mut result, None, step_count);
    Ok(result)
}

/// Expected reward collected in the first `step_bound` steps.
pub fn compute_cumulative_rewards<R: RewardModel>(
    goal: &SolveGoal,
    matrix: &SparseMatrix,
    reward_model: &R,
    step_bound: usize,
) -> Result<Vec<f64>> {
    if reward_model.is_empty() {
        return Err(CheckError::InvalidProperty("the reward model is empty".to_string()));
    }
    let total_reward_vector = reward_model.total_reward_vector(matrix);
    let mut result = vec![0.0; matrix.row_group_count()];
    Multiplier::new(matrix, MultiplicationStyle::Regular).repeated_multiply_and_reduce(
        goal.direction(),
        &mut result,
        Some(&total_reward_vector),
        step_bound,
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::model_checking::rewards::StandardRewardModel;

    // 0: [-> 1], [-> 0 .5, 2 .5]; 1 -> 2; 2 target
    fn chain() -> (SparseMatrix, SparseMatrix) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(0, 0.5), (2, 0.5)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(2, 1.0)]],
        ]);
        let b = m.transpose();
        (m, b)
    }

    #[test]
    fn next_is_one_step() {
        let (m, _) = chain();
        let next = BitVector::from_indices(3, vec![2]);
        assert_eq!(compute_next_probabilities(OptimizationDirection::Maximize, &m, &next), vec![0.5, 1.0, 1.0]);
        assert_eq!(compute_next_probabilities(OptimizationDirection::Minimize, &m, &next), vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn bounded_until_counts_steps() {
        let (m, b) = chain();
        let all = BitVector::new(3, true);
        let psi = BitVector::from_indices(3, vec![2]);
        let max = SolveGoal::new(OptimizationDirection::Maximize);
        let min = SolveGoal::new(OptimizationDirection::Minimize);
        let hint = ModelCheckerHint::empty();
        assert_eq!(compute_step_bounded_until_probabilities(&max, &m, &b, &all, &psi, 0, &hint).unwrap(), vec![0.0, 0.0, 1.0]);
        assert_eq!(compute_step_bounded_until_probabilities(&max, &m, &b, &all, &psi, 1, &hint).unwrap(), vec![0.5, 1.0, 1.0]);
        assert_eq!(compute_step_bounded_until_probabilities(&max, &m, &b, &all, &psi, 2, &hint).unwrap(), vec![1.0, 1.0, 1.0]);
        assert_eq!(compute_step_bounded_until_probabilities(&min, &m, &b, &all, &psi, 1, &hint).unwrap(), vec![0.0, 1.0, 1.0]);
        // a failed gamble at 0 leaves no time for the detour through 1
        assert_eq!(compute_step_bounded_until_probabilities(&min, &m, &b, &all, &psi, 2, &hint).unwrap(), vec![0.5, 1.0, 1.0]);
    }

    #[test]
    fn step_bounded_rewards() {
        let (m, _) = chain();
        let min = SolveGoal::new(OptimizationDirection::Minimize);
        let max = SolveGoal::new(OptimizationDirection::Maximize);
        let rewards = StandardRewardModel::from_state_rewards(vec![1.0, 2.0, 0.0]);
        assert_eq!(compute_instantaneous_rewards(&max, &m, &rewards, 1).unwrap(), vec![2.0, 0.0, 0.0]);
        assert_eq!(compute_instantaneous_rewards(&min, &m, &rewards, 0).unwrap(), vec![1.0, 2.0, 0.0]);
        assert_eq!(compute_cumulative_rewards(&max, &m, &rewards, 2).unwrap(), vec![3.0, 2.0, 0.0]);
        assert_eq!(compute_cumulative_rewards(&min, &m, &rewards, 2).unwrap(), vec![1.5, 2.0, 0.0]);

        let choice_rewards = StandardRewardModel::from_state_action_rewards(vec![1.0, 0.0, 0.0, 0.0]);
        let err = compute_instantaneous_rewards(&max, &m, &choice_rewards, 1).unwrap_err();
        assert!(matches!(err, CheckError::InvalidProperty(_)));
        let err = compute_cumulative_rewards(&max, &m, &StandardRewardModel::default(), 1).unwrap_err();
        assert!(matches!(err, CheckError::InvalidProperty(_)));
    }
}
