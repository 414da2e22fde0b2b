use log::{debug, trace, warn};

use crate::environment::{Environment, MultiplicationStyle};
use crate::error::{CheckError, Result};
use crate::solver::helper_methods::{equal_modulo_precision, max_absolute_difference, max_relative_difference};
use crate::solver::{MinMaxRequirements, MinMaxSolver, Multiplier, OptimizationDirection, SolverData};
use crate::storage::SparseMatrix;
use crate::termination::is_termination_requested;

/// Bellman iteration until two successive iterates differ by less than the
/// precision. With `force_soundness` a lower and an upper sequence are
/// iterated instead (interval iteration) and the result is their midpoint.
pub struct ValueIterationSolver {
    data: SolverData,
}

impl ValueIterationSolver {
    pub fn new(matrix: SparseMatrix) -> ValueIterationSolver {
        ValueIterationSolver { data: SolverData::new(matrix) }
    }

    pub fn method_requirements(
        env: &Environment,
        unique_solution: bool,
        direction: Option<OptimizationDirection>,
    ) -> MinMaxRequirements {
        let mut requirements = MinMaxRequirements::new();
        if !unique_solution {
            // iterating from below converges to the least fixpoint, which is
            // wrong for minimizing rewards inside zero-reward end components
            if direction.map_or(true, |d| d.minimize()) || env.force_soundness {
                requirements.require_no_end_components();
            }
        }
        if env.force_soundness {
            requirements.require_bounds(true);
        }
        requirements
    }

    fn solve_value_iteration(&self, env: &Environment, dir: OptimizationDirection, x: &mut Vec<f64>, b: &[f64]) -> bool {
        let n = self.data.matrix.row_group_count();
        let multiplier = Multiplier::new(&self.data.matrix, env.multiplication_style);
        let mut previous = x.clone();
        let mut next = vec![0.0; n];
        let mut iterations = 0u64;
        let mut converged = false;

        while iterations < env.max_iterations {
            multiplier.multiply_and_reduce(dir, x, Some(b), &mut next, None);
            if multiplier.style() == MultiplicationStyle::Regular {
                std::mem::swap(x, &mut next);
            }
            iterations += 1;
            if equal_modulo_precision(&previous, x, env.precision, env.relative_termination) {
                converged = true;
                break;
            }
            if is_termination_requested() {
                warn!("Termination requested after {} value iterations", iterations);
                break;
            }
            trace!("Iteration {}: difference {}", iterations, max_absolute_difference(&previous, x));
            previous.copy_from_slice(x);
        }

        if converged {
            debug!("Value iteration converged in {} iterations", iterations);
        } else {
            warn!("Value iteration did not converge in {} iterations", iterations);
        }
        converged
    }

    fn solve_interval_iteration(&self, env: &Environment, dir: OptimizationDirection, x: &mut Vec<f64>, b: &[f64]) -> Result<bool> {
        let (mut lower, mut upper) = match (self.data.lower_bounds_vector(), self.data.upper_bounds_vector()) {
            (Some(l), Some(u)) => (l, u),
            _ => {
                return Err(CheckError::UncheckedRequirement(
                    "interval iteration needs a lower and an upper bound".to_string(),
                ))
            }
        };
        let n = self.data.matrix.row_group_count();
        let multiplier = Multiplier::new(&self.data.matrix, MultiplicationStyle::Regular);
        let mut tmp = vec![0.0; n];
        let mut iterations = 0u64;
        let mut converged = false;

        while iterations < env.max_iterations {
            multiplier.multiply_and_reduce(dir, &mut lower, Some(b), &mut tmp, None);
            for (l, t) in lower.iter_mut().zip(tmp.iter()) {
                *l = l.max(*t);
            }
            multiplier.multiply_and_reduce(dir, &mut upper, Some(b), &mut tmp, None);
            for (u, t) in upper.iter_mut().zip(tmp.iter()) {
                *u = u.min(*t);
            }
            iterations += 1;
            let gap = if env.relative_termination {
                max_relative_difference(&lower, &upper)
            } else {
                max_absolute_difference(&lower, &upper)
            };
            if gap <= 2.0 * env.precision {
                converged = true;
                break;
            }
            if is_termination_requested() {
                warn!("Termination requested after {} interval iterations", iterations);
                break;
            }
        }

        *x = lower.iter().zip(upper.iter()).map(|(l, u)| (l + u) / 2.0).collect();
        if converged {
            debug!("Interval iteration converged in {} iterations", iterations);
        } else {
            warn!("Interval iteration did not converge in {} iterations", iterations);
        }
        Ok(converged)
    }
}

impl MinMaxSolver for ValueIterationSolver {
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
        _has_initial_scheduler: bool,
    ) -> MinMaxRequirements {
        ValueIterationSolver::method_requirements(env, unique_solution, direction)
    }

    fn solve(&mut self, env: &Environment, dir: OptimizationDirection, x: &mut Vec<f64>, b: &[f64]) -> Result<bool> {
        if x.len() != self.data.matrix.row_group_count() || b.len() != self.data.matrix.row_count() {
            return Err(CheckError::IllegalArgument(format!(
                "system has {} row groups and {} rows, got x of size {} and b of size {}",
                self.data.matrix.row_group_count(),
                self.data.matrix.row_count(),
                x.len(),
                b.len()
            )));
        }
        self.data.warn_if_unchecked(self.requirements(env, self.data.has_unique_solution, Some(dir), false));
        let converged = if env.force_soundness {
            self.solve_interval_iteration(env, dir, x, b)?
        } else {
            self.data.clip_to_bounds(x);
            self.solve_value_iteration(env, dir, x, b)
        };
        self.data.extract_scheduler(dir, x, b);
        Ok(converged)
    }
}
