//! Unbounded reachability on MDPs: until and globally probabilities and
//! expected rewards until reaching a target.
//!
//! Every query follows the same pipeline. A graph analysis first splits the
//! states into those whose value is known (probability 0 or 1, reward 0 or
//! infinity) and the maybe states. For the maybe states a min-max equation
//! system `x = b + A x` is built, end components are eliminated from it if the
//! configured solver cannot deal with them, and the system is handed to the
//! solver. Solutions and, on request, schedulers are then mapped back onto the
//! full state space.

use log::{debug, info, warn};

use crate::environment::Environment;
use crate::error::{CheckError, Result};
use crate::model_checking::graph;
use crate::model_checking::hint::ModelCheckerHint;
use crate::model_checking::rewards::{IntervalRewardModel, RewardModel};
use crate::solver::{
    BaierUpperRewardBounds, DsMpiUpperRewardBounds, GeneralMinMaxSolverFactory, OptimizationDirection, SolveGoal,
};
use crate::storage::{
    BitVector, MaximalEndComponentDecomposition, Scheduler, SparseMatrix, SparseMdpEndComponentInformation,
};

/// Values for all states and, if requested, an optimal scheduler.
#[derive(Debug, Clone)]
pub struct MdpModelCheckingResult {
    pub values: Vec<f64>,
    pub scheduler: Option<Scheduler>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualitativeStateSetsUntilProbabilities {
    pub maybe_states: BitVector,
    pub states_with_probability0: BitVector,
    pub states_with_probability1: BitVector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualitativeStateSetsReachabilityRewards {
    pub maybe_states: BitVector,
    pub infinity_states: BitVector,
    pub reward_zero_states: BitVector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolutionType {
    UntilProbabilities,
    ExpectedRewards,
}

/// What is known about the equation system before it is solved.
#[derive(Debug, Clone, Default)]
struct SparseMdpHintType {
    // local choices per row group of the (non-eliminated) system
    scheduler_hint: Option<Vec<usize>>,
    value_hint: Option<Vec<f64>>,
    lower_result_bound: Option<f64>,
    upper_result_bound: Option<f64>,
    upper_result_bounds: Option<Vec<f64>>,
    eliminate_end_components: bool,
    compute_upper_bounds: bool,
    unique_solution: bool,
}

struct MaybeStateResult {
    values: Vec<f64>,
    scheduler: Option<Vec<usize>>,
}

/// The equation system over the maybe states. `information` is set if end
/// components were collapsed.
struct FixedPointSystem {
    submatrix: SparseMatrix,
    b: Vec<f64>,
    one_step_target_probabilities: Option<Vec<f64>>,
    information: Option<SparseMdpEndComponentInformation>,
}

pub fn compute_qualitative_state_sets_until_probabilities(
    goal: &SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    phi: &BitVector,
    psi: &BitVector,
    hint: &ModelCheckerHint,
) -> Result<QualitativeStateSetsUntilProbabilities> {
    if hint.compute_only_maybe_states() {
        return qualitative_state_sets_until_probabilities_from_hint(matrix.row_group_count(), hint);
    }
    let (prob0, prob1) = if goal.minimize() {
        graph::prob01_min(matrix, backward, phi, psi)
    } else {
        graph::prob01_max(matrix, backward, phi, psi)
    };
    let maybe_states = !(&prob0 | &prob1);
    info!(
        "Preprocessing: {} states with probability 1, {} with probability 0 ({} states remaining).",
        prob1.number_of_set_bits(),
        prob0.number_of_set_bits(),
        maybe_states.number_of_set_bits()
    );
    Ok(QualitativeStateSetsUntilProbabilities {
        maybe_states,
        states_with_probability0: prob0,
        states_with_probability1: prob1,
    })
}

fn qualitative_state_sets_until_probabilities_from_hint(
    number_of_states: usize,
    hint: &ModelCheckerHint,
) -> Result<QualitativeStateSetsUntilProbabilities> {
    let (maybe_states, values) = maybe_states_and_values_from_hint(number_of_states, hint)?;
    let mut prob0 = BitVector::new(number_of_states, false);
    let mut prob1 = BitVector::new(number_of_states, false);
    for state in (!maybe_states).iter() {
        if values[state] == 1.0 {
            prob1.set(state, true);
        } else if values[state] == 0.0 {
            prob0.set(state, true);
        } else {
            return Err(CheckError::IllegalArgument(format!(
                "expected the result hint to specify probabilities in {{0, 1}} for non-maybe states, found {} for state {}",
                values[state], state
            )));
        }
    }
    Ok(QualitativeStateSetsUntilProbabilities {
        maybe_states: maybe_states.clone(),
        states_with_probability0: prob0,
        states_with_probability1: prob1,
    })
}

fn maybe_states_and_values_from_hint(number_of_states: usize, hint: &ModelCheckerHint) -> Result<(&BitVector, &[f64])> {
    let maybe_states = hint
        .maybe_states()
        .ok_or_else(|| CheckError::IllegalArgument("hint asks to compute only maybe states but has none".to_string()))?;
    let values = hint
        .result_hint()
        .ok_or_else(|| CheckError::IllegalArgument("hint asks to compute only maybe states but has no result".to_string()))?;
    if maybe_states.size() != number_of_states || values.len() != number_of_states {
        return Err(CheckError::IllegalArgument(format!(
            "hint covers {} / {} states, the model has {}",
            maybe_states.size(),
            values.len(),
            number_of_states
        )));
    }
    Ok((maybe_states, values))
}

pub fn compute_qualitative_state_sets_reachability_rewards<R: RewardModel>(
    env: &Environment,
    goal: &SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    reward_model: &R,
    target: &BitVector,
    hint: &ModelCheckerHint,
) -> Result<QualitativeStateSetsReachabilityRewards> {
    let n = matrix.row_group_count();
    if hint.compute_only_maybe_states() {
        let (maybe_states, values) = maybe_states_and_values_from_hint(n, hint)?;
        let mut infinity_states = BitVector::new(n, false);
        let mut reward_zero_states = BitVector::new(n, false);
        for state in (!maybe_states).iter() {
            if values[state] == 0.0 {
                reward_zero_states.set(state, true);
            } else if values[state] == f64::INFINITY {
                infinity_states.set(state, true);
            } else {
                return Err(CheckError::IllegalArgument(format!(
                    "expected the result hint to specify rewards in {{0, infinity}} for non-maybe states, found {} for state {}",
                    values[state], state
                )));
            }
        }
        return Ok(QualitativeStateSetsReachabilityRewards {
            maybe_states: maybe_states.clone(),
            infinity_states,
            reward_zero_states,
        });
    }

    let all = BitVector::new(n, true);
    let infinity_states = if goal.minimize() {
        !graph::prob1_e(matrix, backward, &all, target, None)
    } else {
        !graph::prob1_a(matrix, backward, &all, target)
    };
    let reward_zero_states = if env.filter_reward_zero {
        if goal.minimize() {
            let zero_reward_choices = reward_model.choices_with_zero_reward(matrix);
            graph::prob1_e(matrix, backward, &all, target, Some(&zero_reward_choices))
        } else {
            graph::prob1_a(matrix, backward, &reward_model.states_with_zero_reward(matrix), target)
        }
    } else {
        target.clone()
    };
    let maybe_states = !(&reward_zero_states | &infinity_states);
    info!(
        "Preprocessing: {} states with reward infinity, {} with reward zero ({} states remaining).",
        infinity_states.number_of_set_bits(),
        reward_zero_states.number_of_set_bits(),
        maybe_states.number_of_set_bits()
    );
    Ok(QualitativeStateSetsReachabilityRewards { maybe_states, infinity_states, reward_zero_states })
}

/// Local index of `choice` among the selected rows of `state`.
fn selected_choice_offset(matrix: &SparseMatrix, selected_choices: &BitVector, state: usize, choice: usize) -> usize {
    let start = matrix.row_group_indices()[state];
    (start..start + choice).filter(|row| selected_choices.get(*row)).count()
}

/// Inverse of [`selected_choice_offset`].
fn original_choice(matrix: &SparseMatrix, selected_choices: &BitVector, state: usize, sub_choice: usize) -> usize {
    let start = matrix.row_group_indices()[state];
    matrix.row_group(state).filter(|row| selected_choices.get(*row)).nth(sub_choice).map_or(0, |row| row - start)
}

/// A scheduler for the maybe states under which the solver's iteration is
/// well defined: the target is reached with positive probability (until) or
/// almost surely (rewards).
pub fn compute_valid_scheduler_hint(
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    maybe_states: &BitVector,
    phi: &BitVector,
    target: &BitVector,
    expected_rewards: bool,
    selected_choices: Option<&BitVector>,
) -> Vec<usize> {
    let mut scheduler = Scheduler::new(matrix.row_group_count());
    if expected_rewards {
        graph::compute_scheduler_prob1_e(&(maybe_states | target), matrix, backward, phi, target, &mut scheduler, selected_choices);
    } else {
        graph::compute_scheduler_prob_greater0_e(matrix, backward, phi, target, &mut scheduler, None);
    }
    maybe_states
        .iter()
        .map(|state| {
            let choice = scheduler.deterministic_choice(state).unwrap_or(0);
            match selected_choices {
                Some(selected) => selected_choice_offset(matrix, selected, state, choice),
                None => choice,
            }
        })
        .collect()
}

/// Moves the maybe states onto value-optimal choices that make progress
/// towards `prob1_states`. Inside an end component of the maybe states the
/// internal choices tie with the exits, so the greedy choices of the solver
/// may never leave it.
fn reach_target_with_optimal_choices(
    env: &Environment,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    maybe_states: &BitVector,
    prob1_states: &BitVector,
    values: &[f64],
    scheduler: &mut Scheduler,
) {
    let tolerance = 10.0 * env.precision;
    let optimal_choices = BitVector::from_indices(
        matrix.row_count(),
        maybe_states.iter().flat_map(|state| {
            matrix.row_group(state).filter(move |row| {
                let value: f64 = matrix.row(*row).iter().map(|e| e.value * values[e.column]).sum();
                value >= values[state] - tolerance
            })
        }),
    );
    graph::compute_scheduler_prob_greater0_e(matrix, backward, maybe_states, prob1_states, scheduler, Some(&optimal_choices));
}

/// Choices of `scheduler` for all states, or `None` if some maybe state has no
/// usable choice.
fn scheduler_hint_choices(
    scheduler: &Scheduler,
    matrix: &SparseMatrix,
    maybe_states: &BitVector,
    selected_choices: Option<&BitVector>,
) -> Option<Vec<usize>> {
    if scheduler.number_of_states() != matrix.row_group_count() {
        return None;
    }
    let mut choices = Vec::with_capacity(matrix.row_group_count());
    for state in 0..matrix.row_group_count() {
        let choice = scheduler.deterministic_choice(state).filter(|c| *c < matrix.row_group_size(state));
        if maybe_states.get(state) {
            let choice = choice?;
            if let Some(selected) = selected_choices {
                if !selected.get(matrix.row_group_indices()[state] + choice) {
                    return None;
                }
            }
            choices.push(choice);
        } else {
            choices.push(choice.unwrap_or(0));
        }
    }
    Some(choices)
}

fn extract_value_and_scheduler_hint(
    result: &mut SparseMdpHintType,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    maybe_states: &BitVector,
    selected_choices: Option<&BitVector>,
    hint: &ModelCheckerHint,
    skip_ec_within_maybe_states_check: bool,
) -> Result<()> {
    if let Some(scheduler_hint) = hint.scheduler_hint() {
        if result.scheduler_hint.is_some() {
            warn!("A scheduler hint was provided, but the solver requires a specific one. The provided scheduler hint will be ignored.");
        } else {
            match scheduler_hint_choices(scheduler_hint, matrix, maybe_states, selected_choices) {
                None => warn!("The scheduler hint has no valid choice for some maybe state and will be ignored."),
                Some(choices) => {
                    // the hint must not induce a bottom SCC consisting of maybe states
                    let applicable = skip_ec_within_maybe_states_check
                        || graph::prob1(&matrix.transpose_selected_rows_from_row_groups(&choices), maybe_states, &!maybe_states)
                            .full();
                    if applicable {
                        let local = maybe_states
                            .iter()
                            .map(|state| match selected_choices {
                                Some(selected) => selected_choice_offset(matrix, selected, state, choices[state]),
                                None => choices[state],
                            })
                            .collect();
                        result.scheduler_hint = Some(local);
                    } else {
                        warn!("The scheduler hint induces an end component within the maybe states and will be ignored.");
                    }
                }
            }
        }
    }

    if let Some(values) = hint.result_hint() {
        if values.len() != maybe_states.size() {
            return Err(CheckError::IllegalArgument(format!(
                "result hint has {} values, the model has {} states",
                values.len(),
                maybe_states.size()
            )));
        }
        if skip_ec_within_maybe_states_check
            || result.scheduler_hint.is_some()
            || graph::prob1_a(matrix, backward, maybe_states, &!maybe_states).full()
        {
            result.value_hint = Some(maybe_states.filter(values));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn compute_hints(
    env: &Environment,
    solution_type: SolutionType,
    hint: &ModelCheckerHint,
    dir: OptimizationDirection,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    maybe_states: &BitVector,
    phi: &BitVector,
    target: &BitVector,
    selected_choices: Option<&BitVector>,
) -> Result<SparseMdpHintType> {
    let mut result = SparseMdpHintType {
        unique_solution: (dir.minimize() && solution_type == SolutionType::UntilProbabilities)
            || (dir.maximize() && solution_type == SolutionType::ExpectedRewards)
            || hint.no_end_components_in_maybe_states(),
        ..Default::default()
    };
    let expected_rewards = solution_type == SolutionType::ExpectedRewards;

    let has_scheduler_hint = hint.scheduler_hint().is_some();
    let factory = GeneralMinMaxSolverFactory::new();
    let mut requirements = factory.requirements(env, result.unique_solution, Some(dir), has_scheduler_hint);
    if requirements.has_enabled_requirement() {
        if requirements.requires_no_end_components() {
            debug!("Scheduling EC elimination, because the solver requires a unique solution.");
            result.eliminate_end_components = true;
            result.unique_solution = true;
            requirements.clear_no_end_components();
        }
        if requirements.requires_valid_initial_scheduler() {
            debug!("Computing valid scheduler, because the solver requires it.");
            result.scheduler_hint = Some(compute_valid_scheduler_hint(
                matrix,
                backward,
                maybe_states,
                phi,
                target,
                expected_rewards,
                selected_choices,
            ));
            requirements.clear_valid_initial_scheduler();
        }
        match solution_type {
            SolutionType::UntilProbabilities => requirements.clear_bounds(),
            SolutionType::ExpectedRewards => requirements.clear_lower_bounds(),
        }
        if requirements.requires_upper_bounds() {
            result.compute_upper_bounds = true;
            requirements.clear_upper_bounds();
        }
        if requirements.has_enabled_critical_requirement() {
            return Err(CheckError::UncheckedRequirement(requirements.enabled_requirements_as_string()));
        }
    } else {
        debug!("Solver has no requirements.");
    }

    if !result.eliminate_end_components {
        let unique_solution = result.unique_solution;
        extract_value_and_scheduler_hint(&mut result, matrix, backward, maybe_states, selected_choices, hint, unique_solution)?;
        // a rejected scheduler hint leaves the solver without the one it relied on
        if result.scheduler_hint.is_none()
            && has_scheduler_hint
            && factory.requirements(env, unique_solution, Some(dir), false).requires_valid_initial_scheduler()
        {
            debug!("Computing valid scheduler, because the provided one was rejected.");
            result.scheduler_hint = Some(compute_valid_scheduler_hint(
                matrix,
                backward,
                maybe_states,
                phi,
                target,
                expected_rewards,
                selected_choices,
            ));
        }
    } else {
        if !hint.is_empty() {
            warn!("A non-empty hint was provided, but its information will be disregarded.");
        }
        // choices of the original system do not survive the elimination
        result.scheduler_hint = None;
    }

    if result.lower_result_bound.is_none() {
        result.lower_result_bound = Some(0.0);
    }
    if result.upper_result_bound.is_none() && solution_type == SolutionType::UntilProbabilities {
        result.upper_result_bound = Some(1.0);
    }
    if result.upper_result_bound.is_some() {
        result.compute_upper_bounds = false;
    }
    Ok(result)
}

fn compute_values_for_maybe_states(
    env: &Environment,
    goal: &SolveGoal,
    submatrix: SparseMatrix,
    b: &[f64],
    produce_scheduler: bool,
    hint: SparseMdpHintType,
) -> Result<MaybeStateResult> {
    let row_groups = submatrix.row_group_count();
    let mut x = match hint.value_hint {
        Some(values) => values,
        None => vec![hint.lower_result_bound.unwrap_or(0.0); row_groups],
    };

    let mut solver = GeneralMinMaxSolverFactory::new().create(env, submatrix);
    solver.set_requirements_checked(true);
    solver.set_has_unique_solution(hint.unique_solution);
    if let Some(lower) = hint.lower_result_bound {
        solver.set_lower_bound(lower);
    }
    if let Some(upper) = hint.upper_result_bound {
        solver.set_upper_bound(upper);
    }
    let local_upper_bounds = hint.upper_result_bounds.clone();
    if let Some(bounds) = hint.upper_result_bounds {
        solver.set_upper_bounds(bounds);
    }
    if let Some(choices) = hint.scheduler_hint {
        solver.set_initial_scheduler(choices);
    }
    solver.set_track_scheduler(produce_scheduler);

    if !solver.solve(env, goal.direction(), &mut x, b)? {
        warn!("The equation system over {} row group(s) did not converge, results may be imprecise.", row_groups);
    }

    if let Some(bounds) = local_upper_bounds {
        if x.iter().zip(bounds.iter()).any(|(v, u)| *v > u + env.precision) {
            warn!("Expected the result to lie below the computed upper bounds.");
        }
    }

    let scheduler = if produce_scheduler {
        let choices = solver
            .scheduler_choices()
            .ok_or_else(|| CheckError::NotSupported("the solver did not produce a scheduler".to_string()))?;
        Some(choices.to_vec())
    } else {
        None
    };
    Ok(MaybeStateResult { values: x, scheduler })
}

/// Moves the relevant values of `goal` onto the row groups of the reduced system.
fn relevant_values_after_elimination(
    goal: &mut SolveGoal,
    information: &SparseMdpEndComponentInformation,
    maybe_states: &BitVector,
) {
    let new_relevant_values = goal.relevant_values().map(|relevant| {
        BitVector::from_indices(
            information.row_group_count(),
            relevant.iter().filter(|s| maybe_states.get(*s)).map(|s| information.row_group_after_elimination(s)),
        )
    });
    if let Some(values) = new_relevant_values {
        if !values.empty() {
            goal.set_relevant_values(values);
        }
    }
}

fn fixed_point_system_until_probabilities(
    goal: &mut SolveGoal,
    matrix: &SparseMatrix,
    sets: &QualitativeStateSetsUntilProbabilities,
) -> FixedPointSystem {
    let submatrix = matrix.submatrix(&sets.maybe_states, &sets.maybe_states);
    let b = matrix.constrained_row_group_sum_vector(&sets.maybe_states, &sets.states_with_probability1);
    goal.restrict_relevant_values(&sets.maybe_states);
    FixedPointSystem { submatrix, b, one_step_target_probabilities: None, information: None }
}

fn fixed_point_system_until_probabilities_eliminate_end_components(
    goal: &mut SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    sets: &QualitativeStateSetsUntilProbabilities,
) -> FixedPointSystem {
    // states that can stay among the maybe states forever
    let candidate_states = graph::prob0_e(matrix, backward, &sets.maybe_states, &!&sets.maybe_states);
    let mecs = if candidate_states.empty() {
        MaximalEndComponentDecomposition::default()
    } else {
        MaximalEndComponentDecomposition::for_subsystem(matrix, &candidate_states, None)
    };
    if mecs.is_empty() {
        debug!("Not eliminating ECs as there are none.");
        return fixed_point_system_until_probabilities(goal, matrix, sets);
    }

    debug!("Eliminating {} EC(s).", mecs.len());
    let elimination = SparseMdpEndComponentInformation::eliminate_end_components(
        &mecs,
        matrix,
        &sets.maybe_states,
        Some(&sets.states_with_probability1),
        None,
        None,
    );
    relevant_values_after_elimination(goal, &elimination.information, &sets.maybe_states);
    FixedPointSystem {
        submatrix: elimination.submatrix,
        b: elimination.column_sums,
        one_step_target_probabilities: None,
        information: Some(elimination.information),
    }
}

fn check_scheduler(scheduler: &Scheduler) -> Result<()> {
    if scheduler.is_partial() || !scheduler.is_deterministic() || !scheduler.is_memoryless() {
        return Err(CheckError::IllegalArgument(
            "the constructed scheduler is not total, deterministic and memoryless".to_string(),
        ));
    }
    Ok(())
}

/// Probabilities of `phi U psi` under the optimizing scheduler of `goal`.
#[allow(clippy::too_many_arguments)]
pub fn compute_until_probabilities(
    env: &Environment,
    mut goal: SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    phi: &BitVector,
    psi: &BitVector,
    qualitative: bool,
    produce_scheduler: bool,
    hint: &ModelCheckerHint,
) -> Result<MdpModelCheckingResult> {
    if qualitative && produce_scheduler {
        return Err(CheckError::InvalidSettings(
            "cannot produce scheduler when performing qualitative model checking only".to_string(),
        ));
    }
    let n = matrix.row_group_count();
    let mut result = vec![0.0; n];
    let sets = compute_qualitative_state_sets_until_probabilities(&goal, matrix, backward, phi, psi, hint)?;
    for state in sets.states_with_probability1.iter() {
        result[state] = 1.0;
    }

    let maybe_states_not_relevant = goal.relevant_values().map_or(false, |r| r.is_disjoint_from(&sets.maybe_states));
    let mut scheduler = if produce_scheduler { Some(Scheduler::new(n)) } else { None };

    if qualitative || (maybe_states_not_relevant && !produce_scheduler) {
        // neither 0 nor 1
        for state in sets.maybe_states.iter() {
            result[state] = 0.5;
        }
    } else if !sets.maybe_states.empty() {
        let hint_information = compute_hints(
            env,
            SolutionType::UntilProbabilities,
            hint,
            goal.direction(),
            matrix,
            backward,
            &sets.maybe_states,
            phi,
            &sets.states_with_probability1,
            None,
        )?;

        let system = if hint_information.eliminate_end_components {
            fixed_point_system_until_probabilities_eliminate_end_components(&mut goal, matrix, backward, &sets)
        } else {
            fixed_point_system_until_probabilities(&mut goal, matrix, &sets)
        };
        if produce_scheduler && system.information.as_ref().map_or(false, |i| i.eliminated_end_components()) {
            return Err(CheckError::NotSupported(
                "cannot produce a scheduler after end components were eliminated".to_string(),
            ));
        }

        let maybe_result =
            compute_values_for_maybe_states(env, &goal, system.submatrix, &system.b, produce_scheduler, hint_information)?;
        match &system.information {
            Some(information) if information.eliminated_end_components() => {
                information.set_values(&mut result, &sets.maybe_states, &maybe_result.values);
            }
            _ => {
                for (state, value) in sets.maybe_states.iter().zip(maybe_result.values.iter()) {
                    result[state] = *value;
                }
                if let (Some(scheduler), Some(choices)) = (scheduler.as_mut(), maybe_result.scheduler.as_ref()) {
                    for (state, choice) in sets.maybe_states.iter().zip(choices.iter()) {
                        scheduler.set_choice(state, *choice);
                    }
                    if goal.maximize() {
                        reach_target_with_optimal_choices(
                            env,
                            matrix,
                            backward,
                            &sets.maybe_states,
                            &sets.states_with_probability1,
                            &result,
                            scheduler,
                        );
                    }
                }
            }
        }
    }

    if let Some(scheduler) = scheduler.as_mut() {
        if goal.minimize() {
            graph::compute_scheduler_prob0_e(&sets.states_with_probability0, matrix, scheduler);
            for state in sets.states_with_probability1.iter() {
                scheduler.set_choice(state, 0);
            }
        } else {
            graph::compute_scheduler_prob1_e(&sets.states_with_probability1, matrix, backward, phi, psi, scheduler, None);
            for state in sets.states_with_probability0.iter() {
                scheduler.set_choice(state, 0);
            }
        }
        check_scheduler(scheduler)?;
    }

    Ok(MdpModelCheckingResult { values: result, scheduler })
}

/// Probabilities of staying in `psi` forever. The end-component technique
/// reaches the `psi`-MECs instead of complementing, which is only exact for
/// maximizing goals.
#[allow(clippy::too_many_arguments)]
pub fn compute_globally_probabilities(
    env: &Environment,
    mut goal: SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    psi: &BitVector,
    qualitative: bool,
    use_mec_based_technique: bool,
) -> Result<Vec<f64>> {
    let n = matrix.row_group_count();
    if use_mec_based_technique {
        if goal.minimize() {
            warn!("The end-component technique for globally probabilities is only exact for maximizing goals.");
        }
        let mecs = MaximalEndComponentDecomposition::for_subsystem(matrix, psi, None);
        let states_in_psi_mecs = mecs.states(n);
        let result = compute_until_probabilities(
            env,
            goal,
            matrix,
            backward,
            psi,
            &states_in_psi_mecs,
            qualitative,
            false,
            &ModelCheckerHint::empty(),
        )?;
        Ok(result.values)
    } else {
        goal.one_minus();
        let all = BitVector::new(n, true);
        let result =
            compute_until_probabilities(env, goal, matrix, backward, &all, &!psi, qualitative, false, &ModelCheckerHint::empty())?;
        Ok(result.values.into_iter().map(|v| 1.0 - v).collect())
    }
}

fn fixed_point_system_reachability_rewards<R: RewardModel>(
    goal: &mut SolveGoal,
    matrix: &SparseMatrix,
    sets: &QualitativeStateSetsReachabilityRewards,
    selected_choices: Option<&BitVector>,
    reward_model: &R,
    compute_one_step_probabilities: bool,
) -> FixedPointSystem {
    let (submatrix, b, one_step) = match selected_choices {
        None => {
            let one_step = if compute_one_step_probabilities {
                Some(matrix.constrained_row_group_sum_vector(&sets.maybe_states, &sets.reward_zero_states))
            } else {
                None
            };
            (
                matrix.submatrix(&sets.maybe_states, &sets.maybe_states),
                reward_model.total_reward_vector_for_states(matrix, &sets.maybe_states),
                one_step,
            )
        }
        Some(selected) => {
            // choices into infinity states are dropped
            let one_step = if compute_one_step_probabilities {
                Some(matrix.constrained_row_sum_vector(selected, &sets.reward_zero_states))
            } else {
                None
            };
            (
                matrix.submatrix_from_rows(selected, &sets.maybe_states),
                selected.filter(&reward_model.total_reward_vector(matrix)),
                one_step,
            )
        }
    };
    goal.restrict_relevant_values(&sets.maybe_states);
    FixedPointSystem { submatrix, b, one_step_target_probabilities: one_step, information: None }
}

fn fixed_point_system_reachability_rewards_eliminate_end_components<R: RewardModel>(
    goal: &mut SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    sets: &QualitativeStateSetsReachabilityRewards,
    selected_choices: Option<&BitVector>,
    reward_model: &R,
    compute_one_step_probabilities: bool,
) -> FixedPointSystem {
    // only end components of zero-reward choices are collapsed
    let reward_vector = reward_model.total_reward_vector(matrix);
    let zero_reward_choices =
        BitVector::from_indices(matrix.row_count(), reward_vector.iter().enumerate().filter(|(_, r)| **r == 0.0).map(|(i, _)| i));
    let candidate_states = BitVector::from_indices(
        matrix.row_group_count(),
        sets.maybe_states.iter().filter(|s| matrix.row_group(*s).any(|row| zero_reward_choices.get(row))),
    );
    let candidate_states = graph::prob0_e(matrix, backward, &candidate_states, &!&candidate_states);

    let mecs = if candidate_states.empty() {
        MaximalEndComponentDecomposition::default()
    } else {
        MaximalEndComponentDecomposition::for_subsystem(matrix, &candidate_states, Some(&zero_reward_choices))
    };
    if mecs.is_empty() {
        debug!("Not eliminating ECs as there are none.");
        return fixed_point_system_reachability_rewards(
            goal,
            matrix,
            sets,
            selected_choices,
            reward_model,
            compute_one_step_probabilities,
        );
    }

    debug!("Eliminating {} EC(s).", mecs.len());
    let elimination = SparseMdpEndComponentInformation::eliminate_end_components(
        &mecs,
        matrix,
        &sets.maybe_states,
        if compute_one_step_probabilities { Some(&sets.reward_zero_states) } else { None },
        selected_choices,
        Some(&reward_vector),
    );
    relevant_values_after_elimination(goal, &elimination.information, &sets.maybe_states);
    FixedPointSystem {
        submatrix: elimination.submatrix,
        b: elimination.summands,
        one_step_target_probabilities: if compute_one_step_probabilities { Some(elimination.column_sums) } else { None },
        information: Some(elimination.information),
    }
}

fn compute_upper_reward_bounds(
    hint: &mut SparseMdpHintType,
    dir: OptimizationDirection,
    submatrix: &SparseMatrix,
    choice_rewards: &[f64],
    one_step_target_probabilities: &[f64],
) -> Result<()> {
    if dir.minimize() {
        let ds_mpi = DsMpiUpperRewardBounds::new(submatrix, choice_rewards, one_step_target_probabilities);
        hint.upper_result_bounds = Some(ds_mpi.compute_upper_bounds()?);
    } else {
        let baier = BaierUpperRewardBounds::new(submatrix, choice_rewards, one_step_target_probabilities);
        hint.upper_result_bound = Some(baier.compute_upper_bound()?);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn compute_reachability_rewards_helper<R: RewardModel>(
    env: &Environment,
    mut goal: SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    reward_model: &R,
    target: &BitVector,
    qualitative: bool,
    produce_scheduler: bool,
    hint: &ModelCheckerHint,
) -> Result<MdpModelCheckingResult> {
    if qualitative && produce_scheduler {
        return Err(CheckError::InvalidSettings(
            "cannot produce scheduler when performing qualitative model checking only".to_string(),
        ));
    }
    let n = matrix.row_group_count();
    let mut result = vec![0.0; n];
    let sets =
        compute_qualitative_state_sets_reachability_rewards(env, &goal, matrix, backward, reward_model, target, hint)?;
    for state in sets.infinity_states.iter() {
        result[state] = f64::INFINITY;
    }

    let maybe_states_not_relevant = goal.relevant_values().map_or(false, |r| r.is_disjoint_from(&sets.maybe_states));
    let mut scheduler = if produce_scheduler { Some(Scheduler::new(n)) } else { None };
    // choices of maybe states that avoid the infinity states
    let selected_choices = if sets.infinity_states.empty() {
        None
    } else {
        Some(matrix.row_filter(&sets.maybe_states, &!&sets.infinity_states))
    };

    if qualitative || (maybe_states_not_relevant && !produce_scheduler) {
        info!("The rewards for the initial states were determined in a preprocessing step. No exact rewards were computed.");
        // neither 0 nor infinity
        for state in sets.maybe_states.iter() {
            result[state] = 1.0;
        }
    } else if !sets.maybe_states.empty() {
        let mut hint_information = compute_hints(
            env,
            SolutionType::ExpectedRewards,
            hint,
            goal.direction(),
            matrix,
            backward,
            &sets.maybe_states,
            &!&sets.reward_zero_states,
            &sets.reward_zero_states,
            selected_choices.as_ref(),
        )?;

        let compute_upper_bounds = hint_information.compute_upper_bounds;
        let system = if hint_information.eliminate_end_components {
            fixed_point_system_reachability_rewards_eliminate_end_components(
                &mut goal,
                matrix,
                backward,
                &sets,
                selected_choices.as_ref(),
                reward_model,
                compute_upper_bounds,
            )
        } else {
            fixed_point_system_reachability_rewards(
                &mut goal,
                matrix,
                &sets,
                selected_choices.as_ref(),
                reward_model,
                compute_upper_bounds,
            )
        };
        if produce_scheduler && system.information.as_ref().map_or(false, |i| i.eliminated_end_components()) {
            return Err(CheckError::NotSupported(
                "cannot produce a scheduler after end components were eliminated".to_string(),
            ));
        }
        if let Some(one_step) = system.one_step_target_probabilities.as_ref() {
            compute_upper_reward_bounds(&mut hint_information, goal.direction(), &system.submatrix, &system.b, one_step)?;
        }

        let maybe_result =
            compute_values_for_maybe_states(env, &goal, system.submatrix, &system.b, produce_scheduler, hint_information)?;
        match &system.information {
            Some(information) if information.eliminated_end_components() => {
                information.set_values(&mut result, &sets.maybe_states, &maybe_result.values);
            }
            _ => {
                for (state, value) in sets.maybe_states.iter().zip(maybe_result.values.iter()) {
                    result[state] = *value;
                }
                if let (Some(scheduler), Some(choices)) = (scheduler.as_mut(), maybe_result.scheduler.as_ref()) {
                    for (state, choice) in sets.maybe_states.iter().zip(choices.iter()) {
                        let choice = match selected_choices.as_ref() {
                            Some(selected) => original_choice(matrix, selected, state, *choice),
                            None => *choice,
                        };
                        scheduler.set_choice(state, choice);
                    }
                }
            }
        }
    }

    if let Some(scheduler) = scheduler.as_mut() {
        if goal.minimize() {
            let zero_reward_choices = reward_model.choices_with_zero_reward(matrix);
            graph::compute_scheduler_prob1_e(
                &sets.reward_zero_states,
                matrix,
                backward,
                &sets.reward_zero_states,
                target,
                scheduler,
                Some(&zero_reward_choices),
            );
            for state in sets.infinity_states.iter() {
                scheduler.set_choice(state, 0);
            }
        } else {
            graph::compute_scheduler_rew_inf(&sets.infinity_states, matrix, backward, scheduler);
            for state in sets.reward_zero_states.iter() {
                scheduler.set_choice(state, 0);
            }
        }
        check_scheduler(scheduler)?;
    }

    Ok(MdpModelCheckingResult { values: result, scheduler })
}

/// Expected reward accumulated until reaching `target`; infinite where the
/// target is missed with positive probability.
#[allow(clippy::too_many_arguments)]
pub fn compute_reachability_rewards<R: RewardModel>(
    env: &Environment,
    goal: SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    reward_model: &R,
    target: &BitVector,
    qualitative: bool,
    produce_scheduler: bool,
    hint: &ModelCheckerHint,
) -> Result<MdpModelCheckingResult> {
    if reward_model.is_empty() {
        return Err(CheckError::InvalidProperty("the reward model is empty".to_string()));
    }
    compute_reachability_rewards_helper(env, goal, matrix, backward, reward_model, target, qualitative, produce_scheduler, hint)
}

/// Reachability rewards over the lower (or upper) ends of interval rewards.
#[allow(clippy::too_many_arguments)]
pub fn compute_reachability_rewards_interval(
    env: &Environment,
    goal: SolveGoal,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    reward_model: &IntervalRewardModel,
    lower_bound_of_intervals: bool,
    target: &BitVector,
    qualitative: bool,
    produce_scheduler: bool,
) -> Result<Vec<f64>> {
    if produce_scheduler {
        return Err(CheckError::NotSupported(
            "computing reachability rewards with interval rewards does not support scheduler production".to_string(),
        ));
    }
    let bound = reward_model.bound(lower_bound_of_intervals);
    if bound.is_empty() {
        return Err(CheckError::InvalidProperty("the reward model is empty".to_string()));
    }
    let result = compute_reachability_rewards_helper(
        env,
        goal,
        matrix,
        backward,
        &bound,
        target,
        qualitative,
        false,
        &ModelCheckerHint::empty(),
    )?;
    Ok(result.values)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::environment::MinMaxMethod;
    use crate::model_checking::rewards::{Interval, StandardRewardModel};

    const EPS: f64 = 1e-5;

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y || (x - y).abs() < EPS)
    }

    // 0: [-> 1], [-> 0]; 1 target; 2 absorbing
    fn three_states() -> (SparseMatrix, SparseMatrix) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(0, 1.0)]],
            vec![vec![(1, 1.0)]],
            vec![vec![(2, 1.0)]],
        ]);
        let b = m.transpose();
        (m, b)
    }

    // 0 <-> 1 cycle; 0 gambles (2 target w.p. .5, else trap 3), 1 falls into 3
    fn cycle_with_exits() -> (SparseMatrix, SparseMatrix) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(2, 0.5), (3, 0.5)]],
            vec![vec![(0, 1.0)], vec![(3, 1.0)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(3, 1.0)]],
        ]);
        let b = m.transpose();
        (m, b)
    }

    // 0: [-> 1 .6, 3 .4], [-> 2 .5, 3 .5]; 1 -> 2 .5, 3 .5; 2 target; 3 trap
    fn gamble() -> (SparseMatrix, SparseMatrix) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 0.6), (3, 0.4)], vec![(2, 0.5), (3, 0.5)]],
            vec![vec![(2, 0.5), (3, 0.5)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(3, 1.0)]],
        ]);
        let b = m.transpose();
        (m, b)
    }

    fn all(n: usize) -> BitVector {
        BitVector::new(n, true)
    }

    #[test]
    fn max_reachability_with_self_loop() {
        let (m, b) = three_states();
        let psi = BitVector::from_indices(3, vec![1]);
        let env = Environment::default();
        let result = compute_until_probabilities(
            &env,
            SolveGoal::new(OptimizationDirection::Maximize),
            &m,
            &b,
            &all(3),
            &psi,
            false,
            true,
            &ModelCheckerHint::empty(),
        )
        .unwrap();
        assert_eq!(result.values, vec![1.0, 1.0, 0.0]);
        let scheduler = result.scheduler.unwrap();
        assert_eq!(scheduler.deterministic_choice(0), Some(0));

        let result = compute_until_probabilities(
            &env,
            SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &all(3),
            &psi,
            false,
            true,
            &ModelCheckerHint::empty(),
        )
        .unwrap();
        assert_eq!(result.values, vec![0.0, 1.0, 0.0]);
        assert_eq!(result.scheduler.unwrap().deterministic_choice(0), Some(1));
    }

    #[test]
    fn numeric_maybe_states_are_solved() {
        let (m, b) = gamble();
        let psi = BitVector::from_indices(4, vec![2]);
        for method in [MinMaxMethod::ValueIteration, MinMaxMethod::PolicyIteration, MinMaxMethod::Topological] {
            let env = Environment::default().with_precision(1e-8).with_min_max_method(method);
            let max = compute_until_probabilities(
                &env,
                SolveGoal::new(OptimizationDirection::Maximize),
                &m,
                &b,
                &all(4),
                &psi,
                false,
                true,
                &ModelCheckerHint::empty(),
            )
            .unwrap();
            assert!(close(&max.values, &[0.5, 0.5, 1.0, 0.0]));
            assert_eq!(max.scheduler.unwrap().deterministic_choice(0), Some(1));

            let min = compute_until_probabilities(
                &env,
                SolveGoal::new(OptimizationDirection::Minimize),
                &m,
                &b,
                &all(4),
                &psi,
                false,
                false,
                &ModelCheckerHint::empty(),
            )
            .unwrap();
            assert!(close(&min.values, &[0.3, 0.5, 1.0, 0.0]));
        }
    }

    #[test]
    fn end_components_under_maximization() {
        let (m, b) = cycle_with_exits();
        let psi = BitVector::from_indices(4, vec![2]);
        for method in [MinMaxMethod::ValueIteration, MinMaxMethod::PolicyIteration] {
            let env = Environment::default().with_precision(1e-8).with_min_max_method(method);
            let result = compute_until_probabilities(
                &env,
                SolveGoal::new(OptimizationDirection::Maximize),
                &m,
                &b,
                &all(4),
                &psi,
                false,
                false,
                &ModelCheckerHint::empty(),
            )
            .unwrap();
            assert!(close(&result.values, &[0.5, 0.5, 1.0, 0.0]));
        }
    }

    #[test]
    fn max_schedulers_leave_end_components() {
        let (m, b) = cycle_with_exits();
        let psi = BitVector::from_indices(4, vec![2]);
        for method in [MinMaxMethod::ValueIteration, MinMaxMethod::PolicyIteration, MinMaxMethod::Topological] {
            let env = Environment::default().with_precision(1e-8).with_min_max_method(method);
            let result = compute_until_probabilities(
                &env,
                SolveGoal::new(OptimizationDirection::Maximize),
                &m,
                &b,
                &all(4),
                &psi,
                false,
                true,
                &ModelCheckerHint::empty(),
            )
            .unwrap();
            assert!(close(&result.values, &[0.5, 0.5, 1.0, 0.0]));
            // 0 gambles, 1 moves to 0
            let scheduler = result.scheduler.unwrap();
            assert_eq!(scheduler.deterministic_choice(0), Some(1), "{:?}", method);
            assert_eq!(scheduler.deterministic_choice(1), Some(0), "{:?}", method);
        }
    }

    #[test]
    fn scheduler_hints_inducing_end_components_are_ignored() {
        let (m, b) = cycle_with_exits();
        let psi = BitVector::from_indices(4, vec![2]);
        // the 0 <-> 1 cycle never leaves the maybe states
        let mut cycling = Scheduler::new(4);
        for state in 0..4 {
            cycling.set_choice(state, 0);
        }
        let hint = ModelCheckerHint::empty().with_scheduler_hint(cycling);
        for method in [MinMaxMethod::ValueIteration, MinMaxMethod::PolicyIteration] {
            let env = Environment::default().with_precision(1e-8).with_min_max_method(method);
            let result = compute_until_probabilities(
                &env,
                SolveGoal::new(OptimizationDirection::Maximize),
                &m,
                &b,
                &all(4),
                &psi,
                false,
                true,
                &hint,
            )
            .unwrap();
            assert!(close(&result.values, &[0.5, 0.5, 1.0, 0.0]), "{:?}: {:?}", method, result.values);
            assert_eq!(result.scheduler.unwrap().deterministic_choice(0), Some(1), "{:?}", method);
        }
    }

    #[test]
    fn qualitative_mode_marks_maybe_states() {
        let (m, b) = gamble();
        let psi = BitVector::from_indices(4, vec![2]);
        let env = Environment::default();
        let result = compute_until_probabilities(
            &env,
            SolveGoal::new(OptimizationDirection::Maximize),
            &m,
            &b,
            &all(4),
            &psi,
            true,
            false,
            &ModelCheckerHint::empty(),
        )
        .unwrap();
        assert_eq!(result.values, vec![0.5, 0.5, 1.0, 0.0]);

        let err = compute_until_probabilities(
            &env,
            SolveGoal::new(OptimizationDirection::Maximize),
            &m,
            &b,
            &all(4),
            &psi,
            true,
            true,
            &ModelCheckerHint::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::InvalidSettings(_)));
    }

    #[test]
    fn hints_are_checked_and_reused() {
        let (m, b) = gamble();
        let psi = BitVector::from_indices(4, vec![2]);
        let env = Environment::default().with_precision(1e-8);
        let goal = SolveGoal::new(OptimizationDirection::Maximize);
        let first = compute_until_probabilities(&env, goal.clone(), &m, &b, &all(4), &psi, false, true, &ModelCheckerHint::empty())
            .unwrap();
        let sets =
            compute_qualitative_state_sets_until_probabilities(&goal, &m, &b, &all(4), &psi, &ModelCheckerHint::empty()).unwrap();

        let hint = ModelCheckerHint::empty()
            .with_result_hint(first.values.clone())
            .with_scheduler_hint(first.scheduler.clone().unwrap())
            .with_compute_only_maybe_states(sets.maybe_states.clone());
        let from_hint = compute_qualitative_state_sets_until_probabilities(&goal, &m, &b, &all(4), &psi, &hint).unwrap();
        assert_eq!(from_hint, sets);
        let second = compute_until_probabilities(&env, goal.clone(), &m, &b, &all(4), &psi, false, false, &hint).unwrap();
        assert!(close(&first.values, &second.values));

        let mut bad = first.values.clone();
        bad[3] = 0.25;
        let hint = ModelCheckerHint::empty().with_result_hint(bad).with_compute_only_maybe_states(sets.maybe_states);
        let err = compute_until_probabilities(&env, goal.clone(), &m, &b, &all(4), &psi, false, false, &hint).unwrap_err();
        assert!(matches!(err, CheckError::IllegalArgument(_)));

        let hint = ModelCheckerHint::empty().with_result_hint(vec![0.0; 3]);
        let err = compute_until_probabilities(&env, goal, &m, &b, &all(4), &psi, false, false, &hint).unwrap_err();
        assert!(matches!(err, CheckError::IllegalArgument(_)));
    }

    #[test]
    fn globally_by_complement_and_by_end_components() {
        // 0: [-> 0], [-> 1]; 1 -> 1; psi = {0}
        let m = SparseMatrix::from_choices(&[vec![vec![(0, 1.0)], vec![(1, 1.0)]], vec![vec![(1, 1.0)]]]);
        let b = m.transpose();
        let psi = BitVector::from_indices(2, vec![0]);
        let env = Environment::default();
        for mec_based in [false, true] {
            let max = compute_globally_probabilities(
                &env,
                SolveGoal::new(OptimizationDirection::Maximize),
                &m,
                &b,
                &psi,
                false,
                mec_based,
            )
            .unwrap();
            assert_eq!(max, vec![1.0, 0.0]);
        }
        let min =
            compute_globally_probabilities(&env, SolveGoal::new(OptimizationDirection::Minimize), &m, &b, &psi, false, false)
                .unwrap();
        assert_eq!(min, vec![0.0, 0.0]);
    }

    // 0 <-> 1 with zero reward; 0 leaves to target 2 at cost 2, 1 at cost 5
    fn zero_reward_cycle() -> (SparseMatrix, SparseMatrix, StandardRewardModel) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(2, 1.0)]],
            vec![vec![(0, 1.0)], vec![(2, 1.0)]],
            vec![vec![(2, 1.0)]],
        ]);
        let b = m.transpose();
        let rewards = StandardRewardModel::from_state_action_rewards(vec![0.0, 2.0, 0.0, 5.0, 0.0]);
        (m, b, rewards)
    }

    #[test]
    fn min_rewards_eliminate_zero_reward_end_components() {
        let (m, b, rewards) = zero_reward_cycle();
        let target = BitVector::from_indices(3, vec![2]);
        let env = Environment::default().with_precision(1e-8);
        let result = compute_reachability_rewards(
            &env,
            SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &rewards,
            &target,
            false,
            false,
            &ModelCheckerHint::empty(),
        )
        .unwrap();
        assert!(close(&result.values, &[2.0, 2.0, 0.0]));

        let err = compute_reachability_rewards(
            &env,
            SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &rewards,
            &target,
            false,
            true,
            &ModelCheckerHint::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::NotSupported(_)));

        // under maximization the cycle is never taken forever: infinite reward
        let result = compute_reachability_rewards(
            &env,
            SolveGoal::new(OptimizationDirection::Maximize),
            &m,
            &b,
            &rewards,
            &target,
            false,
            true,
            &ModelCheckerHint::empty(),
        )
        .unwrap();
        assert_eq!(result.values, vec![f64::INFINITY, f64::INFINITY, 0.0]);
        let scheduler = result.scheduler.unwrap();
        assert_eq!(scheduler.deterministic_choice(0), Some(0));
        assert_eq!(scheduler.deterministic_choice(1), Some(0));
    }

    #[test]
    fn rewards_avoid_infinity_choices() {
        // 0: [-> 1 (r 1)], [-> 3 (r 0)]; 1: [-> 2 .5, 1 .5] (r 1); 2 target; 3 trap
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(3, 1.0)]],
            vec![vec![(2, 0.5), (1, 0.5)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(3, 1.0)]],
        ]);
        let b = m.transpose();
        let rewards = StandardRewardModel::from_state_action_rewards(vec![1.0, 0.0, 1.0, 0.0, 0.0]);
        let target = BitVector::from_indices(4, vec![2]);
        let env = Environment::default().with_precision(1e-9);
        let sets = compute_qualitative_state_sets_reachability_rewards(
            &env,
            &SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &rewards,
            &target,
            &ModelCheckerHint::empty(),
        )
        .unwrap();
        assert_eq!(sets.infinity_states, BitVector::from_indices(4, vec![3]));
        assert_eq!(sets.maybe_states, BitVector::from_indices(4, vec![0, 1]));

        let result = compute_reachability_rewards(
            &env,
            SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &rewards,
            &target,
            false,
            true,
            &ModelCheckerHint::empty(),
        )
        .unwrap();
        assert!(close(&result.values, &[3.0, 2.0, 0.0, f64::INFINITY]));
        assert_eq!(result.scheduler.unwrap().deterministic_choice(0), Some(0));

        let empty = StandardRewardModel::default();
        let err = compute_reachability_rewards(
            &env,
            SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &empty,
            &target,
            false,
            false,
            &ModelCheckerHint::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::InvalidProperty(_)));
    }

    #[test]
    fn sound_rewards_compute_upper_bounds() {
        let (m, b) = gamble();
        // every step costs one; 3 is made a target too so that everything terminates
        let rewards = StandardRewardModel::from_state_rewards(vec![1.0, 1.0, 0.0, 0.0]);
        let target = BitVector::from_indices(4, vec![2, 3]);
        let mut env = Environment::default().with_precision(1e-8);
        env.force_soundness = true;
        for dir in [OptimizationDirection::Minimize, OptimizationDirection::Maximize] {
            let result = compute_reachability_rewards(
                &env,
                SolveGoal::new(dir),
                &m,
                &b,
                &rewards,
                &target,
                false,
                false,
                &ModelCheckerHint::empty(),
            )
            .unwrap();
            let expected = if dir.minimize() { 1.0 } else { 1.6 };
            assert!((result.values[0] - expected).abs() < 1e-6);
            assert!((result.values[1] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn interval_rewards_use_one_end() {
        let (m, b) = three_states();
        let rewards = IntervalRewardModel::new(Some(vec![Interval::new(1.0, 3.0), Interval::new(0.0, 0.0), Interval::new(0.0, 0.0)]), None);
        let target = BitVector::from_indices(3, vec![1]);
        let env = Environment::default().with_precision(1e-8);
        let lower = compute_reachability_rewards_interval(
            &env,
            SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &rewards,
            true,
            &target,
            false,
            false,
        )
        .unwrap();
        assert!(close(&lower, &[1.0, 0.0, f64::INFINITY]));
        let upper = compute_reachability_rewards_interval(
            &env,
            SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &rewards,
            false,
            &target,
            false,
            false,
        )
        .unwrap();
        assert!(close(&upper, &[3.0, 0.0, f64::INFINITY]));
        let err = compute_reachability_rewards_interval(
            &env,
            SolveGoal::new(OptimizationDirection::Minimize),
            &m,
            &b,
            &rewards,
            false,
            &target,
            false,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::NotSupported(_)));
    }
}
