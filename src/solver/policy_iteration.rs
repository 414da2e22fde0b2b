use log::{debug, trace, warn};

use crate::environment::Environment;
use crate::error::{CheckError, Result};
use crate::solver::helper_methods::equal_modulo_precision;
use crate::solver::{MinMaxRequirements, MinMaxSolver, OptimizationDirection, SolverData};
use crate::storage::SparseMatrix;
use crate::termination::is_termination_requested;

/// Alternates policy evaluation and greedy improvement until the policy is stable.
pub struct PolicyIterationSolver {
    data: SolverData,
}

impl PolicyIterationSolver {
    pub fn new(matrix: SparseMatrix) -> PolicyIterationSolver {
        PolicyIterationSolver { data: SolverData::new(matrix) }
    }

    pub fn method_requirements(
        _env: &Environment,
        unique_solution: bool,
        direction: Option<OptimizationDirection>,
        has_initial_scheduler: bool,
    ) -> MinMaxRequirements {
        let mut requirements = MinMaxRequirements::new();
        if !unique_solution {
            match direction {
                Some(OptimizationDirection::Minimize) => requirements.require_no_end_components(),
                Some(OptimizationDirection::Maximize) => {
                    if !has_initial_scheduler {
                        requirements.require_valid_initial_scheduler();
                    }
                }
                None => {
                    requirements.require_no_end_components();
                    if !has_initial_scheduler {
                        requirements.require_valid_initial_scheduler();
                    }
                }
            }
        }
        requirements
    }

    /// Iterates `x = b_pi + A_pi x` for the fixed local choices `policy`.
    fn evaluate(&self, env: &Environment, policy: &[usize], x: &mut [f64], b: &[f64]) -> bool {
        let matrix = &self.data.matrix;
        let indices = matrix.row_group_indices();
        let precision = env.precision / 10.0;
        let mut previous = x.to_vec();
        for _ in 0..env.max_iterations {
            for (group, choice) in policy.iter().enumerate() {
                let row = indices[group] + choice;
                x[group] = matrix.multiply_row_with_vector(row, x, Some(b));
            }
            if equal_modulo_precision(&previous, x, precision, env.relative_termination) {
                return true;
            }
            if is_termination_requested() {
                return false;
            }
            previous.copy_from_slice(x);
        }
        false
    }
}

impl MinMaxSolver for PolicyIterationSolver {
    fn data(&self) -> &SolverData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut SolverData {
        &mut self.data
    }

    fn requirements(
        &self,
        env: &Environment,
        unique_solution: bool,
        direction: Option<OptimizationDirection>,
        has_initial_scheduler: bool,
    ) -> MinMaxRequirements {
        PolicyIterationSolver::method_requirements(env, unique_solution, direction, has_initial_scheduler)
    }

    fn solve(&mut self, env: &Environment, dir: OptimizationDirection, x: &mut Vec<f64>, b: &[f64]) -> Result<bool> {
        let n = self.data.matrix.row_group_count();
        if x.len() != n || b.len() != self.data.matrix.row_count() {
            return Err(CheckError::IllegalArgument(format!(
                "system has {} row groups and {} rows, got x of size {} and b of size {}",
                n,
                self.data.matrix.row_count(),
                x.len(),
                b.len()
            )));
        }
        let has_initial_scheduler = self.data.initial_scheduler.is_some();
        self.data.warn_if_unchecked(self.requirements(env, self.data.has_unique_solution, Some(dir), has_initial_scheduler));

        let mut policy = self.data.initial_scheduler.clone().unwrap_or_else(|| vec![0; n]);
        if policy.len() != n {
            return Err(CheckError::IllegalArgument(format!(
                "initial scheduler has {} choices for {} row groups",
                policy.len(),
                n
            )));
        }
        self.data.clip_to_bounds(x);

        let mut converged = false;
        let mut iterations = 0u64;
        while iterations < env.max_iterations {
            iterations += 1;
            if !self.evaluate(env, &policy, x, b) {
                warn!("Policy evaluation did not converge in iteration {}", iterations);
            }

            let matrix = &self.data.matrix;
            let mut changed = false;
            for group in 0..n {
                let start = matrix.row_group_indices()[group];
                let current = matrix.multiply_row_with_vector(start + policy[group], x, Some(b));
                let (best, choice) = matrix.reduce_row_group(dir, group, x, Some(b));
                // only switch on a clear improvement, otherwise evaluation noise can cycle
                if choice != policy[group] && dir.is_better(best, current) && (best - current).abs() > env.precision {
                    policy[group] = choice;
                    changed = true;
                }
            }
            trace!("Policy iteration {}: policy changed = {}", iterations, changed);
            if !changed {
                converged = true;
                break;
            }
            if is_termination_requested() {
                warn!("Termination requested after {} policy iterations", iterations);
                break;
            }
        }

        if converged {
            debug!("Policy iteration converged in {} iterations", iterations);
        } else {
            warn!("Policy iteration did not converge in {} iterations", iterations);
        }
        if self.data.track_scheduler {
            self.data.scheduler_choices = Some(policy);
        }
        Ok(converged)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn finds_optimal_policy_from_initial_scheduler() {
        // two maybe states: 0 -a-> exit(b=0.2), 0 -b-> 1; 1 -a-> exit(b=0.9)
        let m = SparseMatrix::from_choices(&[vec![vec![], vec![(1, 1.0)]], vec![vec![]]]);
        let b = vec![0.2, 0.0, 0.9];
        let mut solver = PolicyIterationSolver::new(m);
        solver.set_initial_scheduler(vec![0, 0]);
        solver.set_track_scheduler(true);
        let mut x = vec![0.0, 0.0];
        let env = Environment::default().with_precision(1e-10);
        assert!(solver.solve(&env, OptimizationDirection::Maximize, &mut x, &b).unwrap());
        assert!((x[0] - 0.9).abs() < 1e-9);
        assert_eq!(solver.scheduler_choices(), Some(&[1usize, 0][..]));
    }

    #[test]
    fn requirements_depend_on_direction() {
        let env = Environment::default();
        let req = PolicyIterationSolver::method_requirements(&env, false, Some(OptimizationDirection::Minimize), false);
        assert!(req.requires_no_end_components() && !req.requires_valid_initial_scheduler());
        let req = PolicyIterationSolver::method_requirements(&env, true, Some(OptimizationDirection::Maximize), false);
        assert!(req.empty());
    }
}
