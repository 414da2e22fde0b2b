//! The min-max equation solver service: `x = min/max_a (b_a + A_a x)`.

use log::warn;

use crate::environment::{Environment, MinMaxMethod};
use crate::error::Result;
use crate::solver::policy_iteration::PolicyIterationSolver;
use crate::solver::topological::TopologicalSolver;
use crate::solver::value_iteration::ValueIterationSolver;
use crate::solver::{MinMaxRequirements, OptimizationDirection};
use crate::storage::SparseMatrix;

/// Settings shared by every solver implementation.
#[derive(Debug, Clone, Default)]
pub struct SolverData {
    pub matrix: SparseMatrix,
    pub has_unique_solution: bool,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub lower_bounds: Option<Vec<f64>>,
    pub upper_bounds: Option<Vec<f64>>,
    pub initial_scheduler: Option<Vec<usize>>,
    pub track_scheduler: bool,
    pub scheduler_choices: Option<Vec<usize>>,
    pub caching_enabled: bool,
    pub requirements_checked: bool,
}

impl SolverData {
    pub fn new(matrix: SparseMatrix) -> SolverData {
        SolverData { matrix, ..Default::default() }
    }

    pub fn has_lower_bound(&self) -> bool {
        self.lower_bound.is_some() || self.lower_bounds.is_some()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.upper_bound.is_some() || self.upper_bounds.is_some()
    }

    /// Per-row-group lower bounds, combining the global and the local ones.
    pub fn lower_bounds_vector(&self) -> Option<Vec<f64>> {
        let n = self.matrix.row_group_count();
        match (&self.lower_bounds, self.lower_bound) {
            (Some(local), Some(global)) => Some(local.iter().map(|l| l.max(global)).collect()),
            (Some(local), None) => Some(local.clone()),
            (None, Some(global)) => Some(vec![global; n]),
            (None, None) => None,
        }
    }

    pub fn upper_bounds_vector(&self) -> Option<Vec<f64>> {
        let n = self.matrix.row_group_count();
        match (&self.upper_bounds, self.upper_bound) {
            (Some(local), Some(global)) => Some(local.iter().map(|u| u.min(global)).collect()),
            (Some(local), None) => Some(local.clone()),
            (None, Some(global)) => Some(vec![global; n]),
            (None, None) => None,
        }
    }

    /// Moves `x` into the bounds, if any are known.
    pub fn clip_to_bounds(&self, x: &mut [f64]) {
        if let Some(lower) = self.lower_bounds_vector() {
            for (v, l) in x.iter_mut().zip(lower.iter()) {
                *v = v.max(*l);
            }
        }
        if let Some(upper) = self.upper_bounds_vector() {
            for (v, u) in x.iter_mut().zip(upper.iter()) {
                *v = v.min(*u);
            }
        }
    }

    /// Records the optimal local choices for `x` if scheduler tracking is on.
    pub fn extract_scheduler(&mut self, dir: OptimizationDirection, x: &[f64], b: &[f64]) {
        if self.track_scheduler {
            let mut choices = vec![0; self.matrix.row_group_count()];
            let mut tmp = vec![0.0; self.matrix.row_group_count()];
            self.matrix.multiply_and_reduce(dir, x, Some(b), &mut tmp, Some(&mut choices));
            self.scheduler_choices = Some(choices);
        }
    }

    pub fn warn_if_unchecked(&self, requirements: MinMaxRequirements) {
        if !self.requirements_checked && requirements.has_enabled_requirement() {
            warn!(
                "Solver requirements ({}) were not checked before solving",
                requirements.enabled_requirements_as_string()
            );
        }
    }
}

pub trait MinMaxSolver {
    fn data(&self) -> &SolverData;

    fn data_mut(&mut self) -> &mut SolverData;

    /// What the caller must establish before [`solve`](Self::solve) is sound.
    fn requirements(
        &self,
        env: &Environment,
        unique_solution: bool,
        direction: Option<OptimizationDirection>,
        has_initial_scheduler: bool,
    ) -> MinMaxRequirements;

    /// Solves the system in place, starting from the values in `x`. Returns
    /// whether the method converged.
    fn solve(&mut self, env: &Environment, dir: OptimizationDirection, x: &mut Vec<f64>, b: &[f64]) -> Result<bool>;

    fn clear_cache(&mut self) {}

    fn set_matrix(&mut self, matrix: SparseMatrix) {
        self.data_mut().matrix = matrix;
        self.clear_cache();
    }

    fn matrix(&self) -> &SparseMatrix {
        &self.data().matrix
    }

    fn set_has_unique_solution(&mut self, unique: bool) {
        self.data_mut().has_unique_solution = unique;
    }

    fn has_unique_solution(&self) -> bool {
        self.data().has_unique_solution
    }

    fn set_lower_bound(&mut self, bound: f64) {
        self.data_mut().lower_bound = Some(bound);
    }

    fn set_upper_bound(&mut self, bound: f64) {
        self.data_mut().upper_bound = Some(bound);
    }

    fn set_lower_bounds(&mut self, bounds: Vec<f64>) {
        self.data_mut().lower_bounds = Some(bounds);
    }

    fn set_upper_bounds(&mut self, bounds: Vec<f64>) {
        self.data_mut().upper_bounds = Some(bounds);
    }

    fn set_initial_scheduler(&mut self, choices: Vec<usize>) {
        self.data_mut().initial_scheduler = Some(choices);
    }

    fn has_initial_scheduler(&self) -> bool {
        self.data().initial_scheduler.is_some()
    }

    fn set_track_scheduler(&mut self, track: bool) {
        self.data_mut().track_scheduler = track;
    }

    fn set_caching_enabled(&mut self, enabled: bool) {
        self.data_mut().caching_enabled = enabled;
        if !enabled {
            self.clear_cache();
        }
    }

    fn set_requirements_checked(&mut self, checked: bool) {
        self.data_mut().requirements_checked = checked;
    }

    /// Local choice per row group of the last solve, if tracking was enabled.
    fn scheduler_choices(&self) -> Option<&[usize]> {
        self.data().scheduler_choices.as_deref()
    }
}

/// Creates the solver selected by [`Environment::min_max_method`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralMinMaxSolverFactory;

impl GeneralMinMaxSolverFactory {
    pub fn new() -> GeneralMinMaxSolverFactory {
        GeneralMinMaxSolverFactory
    }

    pub fn create(&self, env: &Environment, matrix: SparseMatrix) -> Box<dyn MinMaxSolver> {
        self.create_with_method(env.min_max_method, env, matrix)
    }

    pub fn create_with_method(&self, method: MinMaxMethod, env: &Environment, matrix: SparseMatrix) -> Box<dyn MinMaxSolver> {
        let mut solver: Box<dyn MinMaxSolver> = match method {
            MinMaxMethod::ValueIteration => Box::new(ValueIterationSolver::new(matrix)),
            MinMaxMethod::PolicyIteration => Box::new(PolicyIterationSolver::new(matrix)),
            MinMaxMethod::Topological => Box::new(TopologicalSolver::new(matrix)),
        };
        solver.set_caching_enabled(env.caching_enabled);
        solver
    }

    /// Requirements of the solver [`create`](Self::create) would return.
    pub fn requirements(
        &self,
        env: &Environment,
        unique_solution: bool,
        direction: Option<OptimizationDirection>,
        has_initial_scheduler: bool,
    ) -> MinMaxRequirements {
        self.requirements_for_method(env.min_max_method, env, unique_solution, direction, has_initial_scheduler)
    }

    pub fn requirements_for_method(
        &self,
        method: MinMaxMethod,
        env: &Environment,
        unique_solution: bool,
        direction: Option<OptimizationDirection>,
        has_initial_scheduler: bool,
    ) -> MinMaxRequirements {
        match method {
            MinMaxMethod::ValueIteration => ValueIterationSolver::method_requirements(env, unique_solution, direction),
            MinMaxMethod::PolicyIteration => {
                PolicyIterationSolver::method_requirements(env, unique_solution, direction, has_initial_scheduler)
            }
            MinMaxMethod::Topological => {
                let underlying = env.topological_underlying_method;
                if underlying == MinMaxMethod::Topological {
                    // nested topological solving has nothing to add
                    self.requirements_for_method(MinMaxMethod::ValueIteration, env, unique_solution, direction, has_initial_scheduler)
                } else {
                    self.requirements_for_method(underlying, env, unique_solution, direction, has_initial_scheduler)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn factory_requirements_follow_method() {
        let factory = GeneralMinMaxSolverFactory::new();
        let env = Environment::default();
        let req = factory.requirements(&env, false, Some(OptimizationDirection::Minimize), false);
        assert!(req.requires_no_end_components());
        let req = factory.requirements(&env, true, Some(OptimizationDirection::Minimize), false);
        assert!(req.empty());

        let pi = Environment::default().with_min_max_method(MinMaxMethod::PolicyIteration);
        let req = factory.requirements(&pi, false, Some(OptimizationDirection::Maximize), false);
        assert!(req.requires_valid_initial_scheduler());
        let req = factory.requirements(&pi, false, Some(OptimizationDirection::Maximize), true);
        assert!(!req.requires_valid_initial_scheduler());

        let mut sound = Environment::default();
        sound.force_soundness = true;
        let req = factory.requirements(&sound, true, Some(OptimizationDirection::Maximize), false);
        assert!(req.requires_lower_bounds() && req.requires_upper_bounds());
        assert!(req.has_enabled_critical_requirement());
    }

    #[test]
    fn bounds_vectors_combine_global_and_local() {
        let matrix = SparseMatrix::from_choices(&[vec![vec![(0, 1.0)]], vec![vec![(1, 1.0)]]]);
        let mut data = SolverData::new(matrix);
        data.upper_bound = Some(5.0);
        data.upper_bounds = Some(vec![3.0, 7.0]);
        assert_eq!(data.upper_bounds_vector(), Some(vec![3.0, 5.0]));
        data.lower_bound = Some(0.0);
        let mut x = vec![-1.0, 10.0];
        data.clip_to_bounds(&mut x);
        assert_eq!(x, vec![0.0, 5.0]);
    }
}
