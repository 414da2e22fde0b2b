//! Conditional reachability `P(F target | F condition)`.
//!
//! The query is reduced to plain maximal reachability on a transformed MDP.
//! Runs that settle the target first are sent to a fresh goal state with the
//! probability of still meeting the condition (or to a fail state), runs that
//! settle the condition first go to goal with the probability of still
//! reaching the target (or to a stop state). Runs that can no longer meet the
//! condition are restarted from the initial state.

use log::{debug, trace};

use crate::environment::Environment;
use crate::error::{CheckError, Result};
use crate::model_checking::graph;
use crate::model_checking::hint::ModelCheckerHint;
use crate::model_checking::reachability::compute_until_probabilities;
use crate::solver::{OptimizationDirection, SolveGoal};
use crate::storage::{BitVector, MaximalEndComponentDecomposition, SparseMatrix, SparseMatrixBuilder};

/// The conditional probability is only defined for the single initial state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionalProbability {
    pub initial_state: usize,
    /// `f64::INFINITY` if the condition cannot be met from the initial state.
    pub value: f64,
}

/// `goal` must carry exactly one relevant value, the initial state.
pub fn compute_conditional_probabilities(
    env: &Environment,
    goal: &SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    target: &BitVector,
    condition: &BitVector,
) -> Result<ConditionalProbability> {
    let n = matrix.row_group_count();
    let initial_state = match goal.relevant_values() {
        Some(initial) if initial.number_of_set_bits() == 1 => initial.iter().next(),
        _ => None,
    }
    .ok_or_else(|| {
        CheckError::NotSupported(
            "conditional probabilities are only supported for models with exactly one initial state".to_string(),
        )
    })?;

    // The minimum is one minus the maximal probability of avoiding the
    // target, which a scheduler achieves by staying in a non-target MEC.
    let fixed_target = if goal.minimize() {
        MaximalEndComponentDecomposition::for_subsystem(matrix, &!target, None).states(n)
    } else {
        target.clone()
    };
    let all_states = BitVector::new(n, true);
    let fixed_target = graph::prob1_a(matrix, backward, &all_states, &fixed_target);
    let extended_condition = graph::prob1_a(matrix, backward, &all_states, condition);

    debug!("Computing probabilities to satisfy condition.");
    let max = SolveGoal::new(OptimizationDirection::Maximize);
    let no_hint = ModelCheckerHint::empty();
    let condition_probabilities =
        compute_until_probabilities(env, max.clone(), matrix, backward, &all_states, &extended_condition, false, false, &no_hint)?
            .values;
    if condition_probabilities[initial_state] == 0.0 {
        debug!("Condition cannot be met from the initial state {}.", initial_state);
        return Ok(ConditionalProbability { initial_state, value: f64::INFINITY });
    }

    debug!("Computing probabilities to reach target.");
    let target_probabilities =
        compute_until_probabilities(env, max, matrix, backward, &all_states, &fixed_target, false, false, &no_hint)?.values;

    let pure_reset_states = graph::prob0_a(backward, &all_states, &extended_condition);
    let settled = &extended_condition | &fixed_target;
    let problematic_states = graph::prob0_e(matrix, backward, &all_states, &settled);

    let initial = BitVector::from_indices(n, vec![initial_state]);
    let relevant_states = graph::reachable_states(matrix, &initial, &all_states, &(&settled | &pure_reset_states));
    trace!("Found {} relevant states for conditional probability computation.", relevant_states.number_of_set_bits());
    let new_index = relevant_states.number_of_set_bits_before_indices();
    let new_initial_state = new_index[initial_state];
    let new_goal_state = relevant_states.number_of_set_bits();
    let new_stop_state = new_goal_state + 1;
    let new_fail_state = new_stop_state + 1;
    let new_state_count = new_fail_state + 1;

    let mut builder = SparseMatrixBuilder::new();
    let mut current_row = 0;
    let add_split = |builder: &mut SparseMatrixBuilder, row: usize, p: f64, otherwise: usize| {
        if p != 0.0 {
            builder.add_next_value(row, new_goal_state, p);
        }
        if p != 1.0 {
            builder.add_next_value(row, otherwise, 1.0 - p);
        }
    };
    for state in relevant_states.iter() {
        builder.new_row_group(current_row);
        if fixed_target.get(state) {
            add_split(&mut builder, current_row, condition_probabilities[state], new_fail_state);
            current_row += 1;
        } else if extended_condition.get(state) {
            add_split(&mut builder, current_row, target_probabilities[state], new_stop_state);
            current_row += 1;
        } else if pure_reset_states.get(state) {
            builder.add_next_value(current_row, new_initial_state, 1.0);
            current_row += 1;
        } else {
            for row in matrix.row_group(state) {
                for entry in matrix.row(row) {
                    builder.add_next_value(current_row, new_index[entry.column], entry.value);
                }
                current_row += 1;
            }
            if problematic_states.get(state) {
                builder.add_next_value(current_row, new_initial_state, 1.0);
                current_row += 1;
            }
        }
    }
    // goal and stop are absorbing, fail restarts
    for successor in [new_goal_state, new_stop_state, new_initial_state] {
        builder.new_row_group(current_row);
        builder.add_next_value(current_row, successor, 1.0);
        current_row += 1;
    }
    let new_matrix = builder.build(current_row, new_state_count);
    let new_backward = new_matrix.transpose();
    debug!("Transformed model has {} states and {} choices.", new_state_count, current_row);

    let mut new_goal = SolveGoal::new(goal.direction())
        .with_relevant_values(BitVector::from_indices(new_state_count, vec![new_initial_state]));
    if goal.minimize() {
        new_goal.one_minus();
    }
    let goal_states = BitVector::from_indices(new_state_count, vec![new_goal_state]);
    let goal_probabilities = compute_until_probabilities(
        env,
        new_goal,
        &new_matrix,
        &new_backward,
        &BitVector::new(new_state_count, true),
        &goal_states,
        false,
        false,
        &no_hint,
    )?
    .values;
    let value = goal_probabilities[new_initial_state];
    Ok(ConditionalProbability {
        initial_state,
        value: if goal.minimize() { 1.0 - value } else { value },
    })
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn goal(dir: OptimizationDirection, n: usize) -> SolveGoal {
        SolveGoal::new(dir).with_relevant_values(BitVector::from_indices(n, vec![0]))
    }

    // 0: [-> 1 .5, 2 .5], [-> 1 .2, 2 .8]; 1 target and condition; 2 condition
    fn split() -> (SparseMatrix, SparseMatrix, BitVector, BitVector) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 0.5), (2, 0.5)], vec![(1, 0.2), (2, 0.8)]],
            vec![vec![(1, 1.0)]],
            vec![vec![(2, 1.0)]],
        ]);
        let b = m.transpose();
        (m, b, BitVector::from_indices(3, vec![1]), BitVector::from_indices(3, vec![1, 2]))
    }

    #[test]
    fn min_and_max_conditional_probabilities() {
        let (m, b, target, condition) = split();
        let env = Environment::default();
        let max = compute_conditional_probabilities(&env, &goal(OptimizationDirection::Maximize, 3), &m, &b, &target, &condition).unwrap();
        assert_eq!(max.initial_state, 0);
        assert!((max.value - 0.5).abs() < 1e-6);
        let min = compute_conditional_probabilities(&env, &goal(OptimizationDirection::Minimize, 3), &m, &b, &target, &condition).unwrap();
        assert!((min.value - 0.2).abs() < 1e-6);
    }

    #[test]
    fn runs_missing_the_condition_are_restarted() {
        // choice 1 of state 0 leads to 3, where the condition is lost for good
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 0.5), (2, 0.5)], vec![(3, 1.0)]],
            vec![vec![(1, 1.0)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(3, 1.0)]],
        ]);
        let b = m.transpose();
        let target = BitVector::from_indices(4, vec![1]);
        let condition = BitVector::from_indices(4, vec![1, 2]);
        let env = Environment::default();
        for dir in [OptimizationDirection::Maximize, OptimizationDirection::Minimize] {
            let result = compute_conditional_probabilities(&env, &goal(dir, 4), &m, &b, &target, &condition).unwrap();
            assert!((result.value - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn unreachable_condition_is_undefined() {
        let m = SparseMatrix::from_choices(&[vec![vec![(1, 1.0)]], vec![vec![(1, 1.0)]], vec![vec![(2, 1.0)]]]);
        let b = m.transpose();
        let result = compute_conditional_probabilities(
            &Environment::default(),
            &goal(OptimizationDirection::Maximize, 3),
            &m,
            &b,
            &BitVector::from_indices(3, vec![1]),
            &BitVector::from_indices(3, vec![2]),
        )
        .unwrap();
        assert_eq!(result.value, f64::INFINITY);
    }

    #[test]
    fn needs_exactly_one_initial_state() {
        let (m, b, target, condition) = split();
        let env = Environment::default();
        let err = compute_conditional_probabilities(&env, &SolveGoal::new(OptimizationDirection::Maximize), &m, &b, &target, &condition)
            .unwrap_err();
        assert!(matches!(err, CheckError::NotSupported(_)));
        let two = SolveGoal::new(OptimizationDirection::Maximize).with_relevant_values(BitVector::from_indices(3, vec![0, 1]));
        assert!(compute_conditional_probabilities(&env, &two, &m, &b, &target, &condition).is_err());
    }
}
