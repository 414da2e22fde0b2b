//! Qualitative graph analysis: the states that satisfy `phi U psi` with
//! probability 0, 1 or greater 0 under some or under all schedulers, and
//! schedulers witnessing these properties.
//!
//! `backward` is always the transposed matrix returned by
//! [`SparseMatrix::transpose`], i.e. row `s` lists the predecessors of `s`.

use crate::storage::{BitVector, Scheduler, SparseMatrix};

/// States reaching `psi` with positive probability via `phi` states in at most
/// `step_bound` steps. The search is layered so that the step count is exact.
pub fn prob_greater0(backward: &SparseMatrix, phi: &BitVector, psi: &BitVector, step_bound: Option<usize>) -> BitVector {
    let mut result = psi.clone();
    let mut frontier: Vec<usize> = psi.iter().collect();
    let mut steps = 0;
    while !frontier.is_empty() && step_bound.map_or(true, |k| steps < k) {
        let mut next = Vec::new();
        for state in frontier {
            for entry in backward.row_of_group(state) {
                let predecessor = entry.column;
                if phi.get(predecessor) && !result.get(predecessor) {
                    result.set(predecessor, true);
                    next.push(predecessor);
                }
            }
        }
        frontier = next;
        steps += 1;
    }
    result
}

/// Existential variant for MDPs: some scheduler reaches `psi` with positive probability.
pub fn prob_greater0_e(backward: &SparseMatrix, phi: &BitVector, psi: &BitVector, step_bound: Option<usize>) -> BitVector {
    prob_greater0(backward, phi, psi, step_bound)
}

/// States from which every scheduler reaches `psi` with positive probability
/// via `phi` states (within `step_bound` steps, if given).
pub fn prob_greater0_a(
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    phi: &BitVector,
    psi: &BitVector,
    step_bound: Option<usize>,
) -> BitVector {
    let mut result = psi.clone();
    let mut frontier: Vec<usize> = psi.iter().collect();
    let mut steps = 0;
    while !frontier.is_empty() && step_bound.map_or(true, |k| steps < k) {
        // membership is checked against the previous layer only
        let previous = result.clone();
        let mut next = Vec::new();
        for state in frontier {
            for entry in backward.row_of_group(state) {
                let predecessor = entry.column;
                if !phi.get(predecessor) || result.get(predecessor) {
                    continue;
                }
                let every_choice_hits = matrix
                    .row_group(predecessor)
                    .all(|row| matrix.row(row).iter().any(|e| previous.get(e.column)));
                if every_choice_hits {
                    result.set(predecessor, true);
                    next.push(predecessor);
                }
            }
        }
        frontier = next;
        steps += 1;
    }
    result
}

pub fn prob0(backward: &SparseMatrix, phi: &BitVector, psi: &BitVector) -> BitVector {
    !prob_greater0(backward, phi, psi, None)
}

/// States with probability 0 under some scheduler.
pub fn prob0_e(matrix: &SparseMatrix, backward: &SparseMatrix, phi: &BitVector, psi: &BitVector) -> BitVector {
    !prob_greater0_a(matrix, backward, phi, psi, None)
}

/// States with probability 0 under all schedulers.
pub fn prob0_a(backward: &SparseMatrix, phi: &BitVector, psi: &BitVector) -> BitVector {
    !prob_greater0_e(backward, phi, psi, None)
}

/// States with probability 1 in a Markov chain (`backward` has trivial grouping).
pub fn prob1(backward: &SparseMatrix, phi: &BitVector, psi: &BitVector) -> BitVector {
    let greater0 = prob_greater0(backward, phi, psi, None);
    !prob_greater0(backward, &!psi, &!&greater0, None)
}

/// States with probability 1 under some scheduler. Only rows in
/// `choice_constraint` may be used, if it is given.
pub fn prob1_e(
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    phi: &BitVector,
    psi: &BitVector,
    choice_constraint: Option<&BitVector>,
) -> BitVector {
    let mut current = BitVector::new(matrix.row_group_count(), true);
    loop {
        let mut next = psi.clone();
        let mut stack: Vec<usize> = psi.iter().collect();
        while let Some(state) = stack.pop() {
            for entry in backward.row_of_group(state) {
                let predecessor = entry.column;
                if !phi.get(predecessor) || next.get(predecessor) {
                    continue;
                }
                let has_good_choice = matrix
                    .row_group(predecessor)
                    .filter(|row| choice_constraint.map_or(true, |c| c.get(*row)))
                    .any(|row| {
                        let successors = matrix.row(row);
                        successors.iter().all(|e| current.get(e.column)) && successors.iter().any(|e| next.get(e.column))
                    });
                if has_good_choice {
                    next.set(predecessor, true);
                    stack.push(predecessor);
                }
            }
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

/// States with probability 1 under all schedulers.
pub fn prob1_a(matrix: &SparseMatrix, backward: &SparseMatrix, phi: &BitVector, psi: &BitVector) -> BitVector {
    let mut current = BitVector::new(matrix.row_group_count(), true);
    loop {
        let mut next = psi.clone();
        let mut stack: Vec<usize> = psi.iter().collect();
        while let Some(state) = stack.pop() {
            for entry in backward.row_of_group(state) {
                let predecessor = entry.column;
                if !phi.get(predecessor) || next.get(predecessor) {
                    continue;
                }
                let every_choice_good = matrix.row_group(predecessor).all(|row| {
                    let successors = matrix.row(row);
                    successors.iter().all(|e| current.get(e.column)) && successors.iter().any(|e| next.get(e.column))
                });
                if every_choice_good {
                    next.set(predecessor, true);
                    stack.push(predecessor);
                }
            }
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

/// `(prob0, prob1)` for the minimizing scheduler.
pub fn prob01_min(matrix: &SparseMatrix, backward: &SparseMatrix, phi: &BitVector, psi: &BitVector) -> (BitVector, BitVector) {
    (prob0_e(matrix, backward, phi, psi), prob1_a(matrix, backward, phi, psi))
}

/// `(prob0, prob1)` for the maximizing scheduler.
pub fn prob01_max(matrix: &SparseMatrix, backward: &SparseMatrix, phi: &BitVector, psi: &BitVector) -> (BitVector, BitVector) {
    (prob0_a(backward, phi, psi), prob1_e(matrix, backward, phi, psi, None))
}

/// Forward search from `initial`. Successors are always reported, but only
/// explored further if they satisfy `constraint` and are not in `target`.
pub fn reachable_states(matrix: &SparseMatrix, initial: &BitVector, constraint: &BitVector, target: &BitVector) -> BitVector {
    let mut reachable = initial.clone();
    let mut stack: Vec<usize> = initial.iter().collect();
    while let Some(state) = stack.pop() {
        for row in matrix.row_group(state) {
            for entry in matrix.row(row) {
                let successor = entry.column;
                if entry.value != 0.0 && !reachable.get(successor) {
                    reachable.set(successor, true);
                    if constraint.get(successor) && !target.get(successor) {
                        stack.push(successor);
                    }
                }
            }
        }
    }
    reachable
}

/// Backward search from `target` through `states`: every state of `states`
/// that is found gets a choice (from `row_filter`, if given) that stays in
/// `states ∪ target` and moves to an already found state.
pub fn compute_scheduler_reach_target(
    states: &BitVector,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    target: &BitVector,
    scheduler: &mut Scheduler,
    row_filter: Option<&BitVector>,
) {
    let mut reached = target.clone();
    let mut stack: Vec<usize> = target.iter().collect();
    while let Some(state) = stack.pop() {
        for entry in backward.row_of_group(state) {
            let predecessor = entry.column;
            if !states.get(predecessor) || reached.get(predecessor) {
                continue;
            }
            let start = matrix.row_group_indices()[predecessor];
            let choice = matrix.row_group(predecessor).filter(|row| row_filter.map_or(true, |f| f.get(*row))).find(|row| {
                let successors = matrix.row(*row);
                successors.iter().all(|e| states.get(e.column) || target.get(e.column))
                    && successors.iter().any(|e| reached.get(e.column))
            });
            if let Some(row) = choice {
                scheduler.set_choice(predecessor, row - start);
                reached.set(predecessor, true);
                stack.push(predecessor);
            }
        }
    }
}

/// For every `phi` state with positive probability to reach `psi`, a choice
/// moving closer to `psi`.
pub fn compute_scheduler_prob_greater0_e(
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    phi: &BitVector,
    psi: &BitVector,
    scheduler: &mut Scheduler,
    row_filter: Option<&BitVector>,
) {
    let mut reached = psi.clone();
    let mut stack: Vec<usize> = psi.iter().collect();
    while let Some(state) = stack.pop() {
        for entry in backward.row_of_group(state) {
            let predecessor = entry.column;
            if !phi.get(predecessor) || reached.get(predecessor) {
                continue;
            }
            let start = matrix.row_group_indices()[predecessor];
            let choice = matrix
                .row_group(predecessor)
                .filter(|row| row_filter.map_or(true, |f| f.get(*row)))
                .find(|row| matrix.row(*row).iter().any(|e| reached.get(e.column)));
            if let Some(row) = choice {
                scheduler.set_choice(predecessor, row - start);
                reached.set(predecessor, true);
                stack.push(predecessor);
            }
        }
    }
}

/// Choices for the states of `prob1_states` that keep reaching `psi` almost
/// surely. `psi` states without a choice get their first one.
pub fn compute_scheduler_prob1_e(
    prob1_states: &BitVector,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    phi: &BitVector,
    psi: &BitVector,
    scheduler: &mut Scheduler,
    row_filter: Option<&BitVector>,
) {
    for state in psi.iter() {
        if !scheduler.choice(state).is_defined() {
            scheduler.set_choice(state, 0);
        }
    }
    let states = prob1_states & phi;
    compute_scheduler_reach_target(&states, matrix, backward, psi, scheduler, row_filter);
}

/// Choices for the states of `prob0_states` that avoid leaving the set. States
/// without such a choice get one that stays with positive probability, or
/// their first choice.
pub fn compute_scheduler_prob0_e(prob0_states: &BitVector, matrix: &SparseMatrix, scheduler: &mut Scheduler) {
    for state in prob0_states.iter() {
        let start = matrix.row_group_indices()[state];
        let staying = matrix.row_group(state).find(|row| matrix.row(*row).iter().all(|e| prob0_states.get(e.column)));
        let choice = staying
            .or_else(|| matrix.row_group(state).find(|row| matrix.row(*row).iter().any(|e| prob0_states.get(e.column))))
            .map_or(0, |row| row - start);
        scheduler.set_choice(state, choice);
    }
}

/// Choices for the states of `rew_inf_states` under which the target (outside
/// the set) is missed with positive probability: states that can stay in the
/// set forever do so, all others move towards them.
pub fn compute_scheduler_rew_inf(
    rew_inf_states: &BitVector,
    matrix: &SparseMatrix,
    backward: &SparseMatrix,
    scheduler: &mut Scheduler,
) {
    let trap_states = prob0_e(matrix, backward, rew_inf_states, &!rew_inf_states);
    compute_scheduler_prob0_e(&trap_states, matrix, scheduler);
    compute_scheduler_prob_greater0_e(matrix, backward, rew_inf_states, &trap_states, scheduler, None);
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    // 0: [-> 1], [-> 0]; 1 target (absorbing); 2 absorbing
    fn scenario() -> (SparseMatrix, SparseMatrix) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(0, 1.0)]],
            vec![vec![(1, 1.0)]],
            vec![vec![(2, 1.0)]],
        ]);
        let b = m.transpose();
        (m, b)
    }

    // 0: [-> 1 .5, 2 .5], [-> 3]; 1 target; 2 trap; 3: [-> 0], [-> 1]
    fn branching() -> (SparseMatrix, SparseMatrix) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 0.5), (2, 0.5)], vec![(3, 1.0)]],
            vec![vec![(1, 1.0)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(0, 1.0)], vec![(1, 1.0)]],
        ]);
        let b = m.transpose();
        (m, b)
    }

    #[test]
    fn prob01_max_and_min_on_self_loop() {
        let (m, b) = scenario();
        let all = BitVector::new(3, true);
        let psi = BitVector::from_indices(3, vec![1]);
        let (p0, p1) = prob01_max(&m, &b, &all, &psi);
        assert_eq!(p1, BitVector::from_indices(3, vec![0, 1]));
        assert_eq!(p0, BitVector::from_indices(3, vec![2]));
        let (p0, p1) = prob01_min(&m, &b, &all, &psi);
        assert_eq!(p1, BitVector::from_indices(3, vec![1]));
        assert_eq!(p0, BitVector::from_indices(3, vec![0, 2]));
    }

    #[test]
    fn universal_and_existential_probability_one() {
        let (m, b) = branching();
        let all = BitVector::new(4, true);
        let psi = BitVector::from_indices(4, vec![1]);
        assert_eq!(prob1_e(&m, &b, &all, &psi, None), BitVector::from_indices(4, vec![0, 1, 3]));
        // 3 may loop back to 0 and 0 may gamble, so only the target itself is certain
        assert_eq!(prob1_a(&m, &b, &all, &psi), BitVector::from_indices(4, vec![1]));
        // forbidding 3 -> 1 leaves no sure way from 0
        let mut constraint = BitVector::new(m.row_count(), true);
        constraint.set(m.row_group_indices()[3] + 1, false);
        assert_eq!(prob1_e(&m, &b, &all, &psi, Some(&constraint)), BitVector::from_indices(4, vec![1]));
    }

    #[test]
    fn step_bounded_probability_greater_zero() {
        let (m, b) = branching();
        let all = BitVector::new(4, true);
        let psi = BitVector::from_indices(4, vec![1]);
        assert_eq!(prob_greater0_e(&b, &all, &psi, Some(1)), BitVector::from_indices(4, vec![0, 1, 3]));
        assert_eq!(prob_greater0_e(&b, &all, &psi, Some(0)), psi);
        // 0 and 3 can cycle forever without ever seeing the target
        assert_eq!(prob_greater0_a(&m, &b, &all, &psi, None), psi);
        assert_eq!(prob0_e(&m, &b, &all, &psi), BitVector::from_indices(4, vec![0, 2, 3]));

        // chain 0 -> 1 -> 2 with a choice at 0 that also ends in 2
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 1.0)], vec![(2, 0.5), (1, 0.5)]],
            vec![vec![(2, 1.0)]],
            vec![vec![(2, 1.0)]],
        ]);
        let b = m.transpose();
        let all = BitVector::new(3, true);
        let psi = BitVector::from_indices(3, vec![2]);
        assert_eq!(prob_greater0_a(&m, &b, &all, &psi, Some(1)), BitVector::from_indices(3, vec![1, 2]));
        assert!(prob_greater0_a(&m, &b, &all, &psi, Some(2)).full());
    }

    #[test]
    fn markov_chain_probability_one() {
        // 0 -> 1 .5, 0 .5; 1 absorbing; 2 -> 2
        let m = SparseMatrix::from_choices(&[vec![vec![(1, 0.5), (0, 0.5)]], vec![vec![(1, 1.0)]], vec![vec![(2, 1.0)]]]);
        let b = m.transpose();
        let all = BitVector::new(3, true);
        let psi = BitVector::from_indices(3, vec![1]);
        assert_eq!(prob1(&b, &all, &psi), BitVector::from_indices(3, vec![0, 1]));
        assert_eq!(prob0(&b, &all, &psi), BitVector::from_indices(3, vec![2]));
    }

    #[test]
    fn reachability_stops_at_target() {
        let (m, _) = branching();
        let initial = BitVector::from_indices(4, vec![0]);
        let all = BitVector::new(4, true);
        assert!(reachable_states(&m, &initial, &all, &BitVector::new(4, false)).full());
        // 3 is found but not expanded, 1 is only reachable through it or 0
        let reach = reachable_states(&m, &initial, &all, &BitVector::from_indices(4, vec![3]));
        assert!(reach.get(3) && reach.get(1) && reach.get(2));
    }

    #[test]
    fn witness_schedulers() {
        let (m, b) = branching();
        let all = BitVector::new(4, true);
        let psi = BitVector::from_indices(4, vec![1]);
        let prob1 = prob1_e(&m, &b, &all, &psi, None);
        let mut scheduler = Scheduler::new(4);
        compute_scheduler_prob1_e(&prob1, &m, &b, &all, &psi, &mut scheduler, None);
        assert_eq!(scheduler.deterministic_choice(3), Some(1));
        assert_eq!(scheduler.deterministic_choice(0), Some(1));
        assert_eq!(scheduler.deterministic_choice(1), Some(0));

        let mut scheduler = Scheduler::new(4);
        compute_scheduler_prob_greater0_e(&m, &b, &all, &psi, &mut scheduler, None);
        assert!(scheduler.choice(0).is_defined() && scheduler.choice(3).is_defined());

        // 0 and 3 can circle forever, so the target is missed
        let mut scheduler = Scheduler::new(4);
        compute_scheduler_rew_inf(&BitVector::from_indices(4, vec![0, 2, 3]), &m, &b, &mut scheduler);
        assert_eq!(scheduler.deterministic_choice(0), Some(1));
        assert_eq!(scheduler.deterministic_choice(3), Some(0));
        assert_eq!(scheduler.deterministic_choice(2), Some(0));

        let (m, _) = scenario();
        let mut scheduler = Scheduler::new(3);
        compute_scheduler_prob0_e(&BitVector::from_indices(3, vec![0, 2]), &m, &mut scheduler);
        assert_eq!(scheduler.deterministic_choice(0), Some(1));
        assert_eq!(scheduler.deterministic_choice(2), Some(0));
    }
}
