//! Solves the system SCC by SCC in topological order. Trivial SCCs are solved
//! in closed form, the others by the underlying method of the environment.

use log::{info, trace};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;

use crate::environment::{Environment, MinMaxMethod};
use crate::error::{CheckError, Result};
use crate::solver::{GeneralMinMaxSolverFactory, MinMaxRequirements, MinMaxSolver, OptimizationDirection, SolverData};
use crate::storage::{BitVector, SparseMatrix};

pub struct TopologicalSolver {
    data: SolverData,
    // sink SCCs first
    sorted_scc_decomposition: Option<Vec<Vec<usize>>>,
    longest_scc_chain_size: Option<usize>,
}

impl TopologicalSolver {
    pub fn new(matrix: SparseMatrix) -> TopologicalSolver {
        TopologicalSolver { data: SolverData::new(matrix), sorted_scc_decomposition: None, longest_scc_chain_size: None }
    }

    fn underlying_method(env: &Environment) -> MinMaxMethod {
        match env.topological_underlying_method {
            MinMaxMethod::Topological => MinMaxMethod::ValueIteration,
            m => m,
        }
    }

    fn environment_for_underlying_solver(&self, env: &Environment, adapt_precision: bool) -> Environment {
        let mut sub_env = env.clone();
        sub_env.min_max_method = Self::underlying_method(env);
        if adapt_precision {
            if let Some(chain) = self.longest_scc_chain_size {
                sub_env.precision = env.precision / chain.max(1) as f64;
            }
        }
        sub_env
    }

    fn create_sorted_scc_decomposition(&mut self, need_longest_chain_size: bool) {
        let matrix = &self.data.matrix;
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(matrix.row_group_count(), matrix.entry_count());
        let nodes: Vec<_> = (0..matrix.row_group_count()).map(|s| graph.add_node(s)).collect();
        for group in 0..matrix.row_group_count() {
            for entry in matrix.row_of_group(group) {
                graph.update_edge(nodes[group], nodes[entry.column], ());
            }
        }
        let sccs: Vec<Vec<usize>> = tarjan_scc(&graph)
            .into_iter()
            .map(|scc| {
                let mut states: Vec<usize> = scc.into_iter().map(|n| graph[n]).collect();
                states.sort_unstable();
                states
            })
            .collect();

        if need_longest_chain_size {
            let mut scc_of = vec![0; matrix.row_group_count()];
            for (i, scc) in sccs.iter().enumerate() {
                for s in scc.iter() {
                    scc_of[*s] = i;
                }
            }
            // successors of an SCC always come earlier in the list
            let mut chain = vec![1usize; sccs.len()];
            for (i, scc) in sccs.iter().enumerate() {
                for s in scc.iter() {
                    for entry in matrix.row_of_group(*s) {
                        let j = scc_of[entry.column];
                        if j != i {
                            chain[i] = chain[i].max(chain[j] + 1);
                        }
                    }
                }
            }
            self.longest_scc_chain_size = chain.iter().copied().max();
        }
        self.sorted_scc_decomposition = Some(sccs);
    }

    fn solve_trivial_scc(&self, state: usize, dir: OptimizationDirection, x: &mut [f64], b: &[f64]) -> usize {
        let matrix = &self.data.matrix;
        let start = matrix.row_group_indices()[state];
        let mut best: Option<(f64, usize)> = None;
        for row in matrix.row_group(state) {
            let mut value = b[row];
            let mut diagonal = None;
            for entry in matrix.row(row) {
                if entry.column == state {
                    diagonal = Some(entry.value);
                } else {
                    value += entry.value * x[entry.column];
                }
            }
            if let Some(d) = diagonal {
                value = if d < 1.0 {
                    value / (1.0 - d)
                } else if value == 0.0 {
                    0.0
                } else {
                    f64::INFINITY
                };
            }
            if best.map_or(true, |(v, _)| dir.is_better(value, v)) {
                best = Some((value, row - start));
            }
        }
        let (value, choice) = best.unwrap_or((0.0, 0));
        x[state] = value;
        choice
    }

    fn configure_sub_solver(&self, sub_solver: &mut dyn MinMaxSolver, scc: Option<&BitVector>) {
        sub_solver.set_has_unique_solution(self.data.has_unique_solution);
        sub_solver.set_track_scheduler(self.data.track_scheduler);
        let filter = |v: &Vec<f64>| scc.map_or_else(|| v.clone(), |s| s.filter(v));
        if let Some(l) = self.data.lower_bound {
            sub_solver.set_lower_bound(l);
        }
        if let Some(l) = &self.data.lower_bounds {
            sub_solver.set_lower_bounds(filter(l));
        }
        if let Some(u) = self.data.upper_bound {
            sub_solver.set_upper_bound(u);
        }
        if let Some(u) = &self.data.upper_bounds {
            sub_solver.set_upper_bounds(filter(u));
        }
        if let Some(choices) = &self.data.initial_scheduler {
            sub_solver.set_initial_scheduler(scc.map_or_else(|| choices.clone(), |s| s.filter(choices)));
        }
    }

    fn check_sub_solver_requirements(&self, env: &Environment, sub_solver: &mut dyn MinMaxSolver, dir: OptimizationDirection) -> Result<()> {
        let mut req = sub_solver.requirements(env, self.data.has_unique_solution, Some(dir), self.data.initial_scheduler.is_some());
        if req.requires_lower_bounds() && self.data.has_lower_bound() {
            req.clear_lower_bounds();
        }
        if req.requires_upper_bounds() && self.data.has_upper_bound() {
            req.clear_upper_bounds();
        }
        if req.requires_valid_initial_scheduler() && self.data.initial_scheduler.is_some() {
            req.clear_valid_initial_scheduler();
        }
        if !req.empty() {
            return Err(CheckError::UncheckedRequirement(format!(
                "requirements of underlying solver not met: {}",
                req.enabled_requirements_as_string()
            )));
        }
        sub_solver.set_requirements_checked(true);
        Ok(())
    }

    fn solve_scc(&self, env: &Environment, dir: OptimizationDirection, scc: &BitVector, x: &mut [f64], b: &[f64], choices: &mut [usize]) -> Result<bool> {
        let matrix = &self.data.matrix;
        let scc_matrix = matrix.submatrix(scc, scc);
        let mut scc_x = scc.filter(x);
        let mut scc_b = Vec::with_capacity(scc_matrix.row_count());
        for group in scc.iter() {
            for row in matrix.row_group(group) {
                let mut value = b[row];
                for entry in matrix.row(row) {
                    if !scc.get(entry.column) {
                        value += entry.value * x[entry.column];
                    }
                }
                scc_b.push(value);
            }
        }

        let mut sub_solver = GeneralMinMaxSolverFactory::new().create(env, scc_matrix);
        self.configure_sub_solver(sub_solver.as_mut(), Some(scc));
        self.check_sub_solver_requirements(env, sub_solver.as_mut(), dir)?;
        let converged = sub_solver.solve(env, dir, &mut scc_x, &scc_b)?;

        for (i, state) in scc.iter().enumerate() {
            x[state] = scc_x[i];
        }
        if let Some(sub_choices) = sub_solver.scheduler_choices() {
            for (i, state) in scc.iter().enumerate() {
                choices[state] = sub_choices[i];
            }
        }
        Ok(converged)
    }
}

impl MinMaxSolver for TopologicalSolver {
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
        GeneralMinMaxSolverFactory::new().requirements_for_method(
            Self::underlying_method(env),
            env,
            unique_solution,
            direction,
            has_initial_scheduler,
        )
    }

    fn clear_cache(&mut self) {
        self.sorted_scc_decomposition = None;
        self.longest_scc_chain_size = None;
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
        let mut need_adapt_precision = env.force_soundness;
        if self.sorted_scc_decomposition.is_none() || (need_adapt_precision && self.longest_scc_chain_size.is_none()) {
            trace!("Creating SCC decomposition.");
            self.create_sorted_scc_decomposition(need_adapt_precision);
        }
        let sccs = self.sorted_scc_decomposition.clone().unwrap_or_default();
        // an acyclic system is solved exactly
        need_adapt_precision = need_adapt_precision && sccs.len() != n;
        let sub_env = self.environment_for_underlying_solver(env, need_adapt_precision);
        info!(
            "Found {} SCC(s). Average size is {}.",
            sccs.len(),
            if sccs.is_empty() { 0.0 } else { n as f64 / sccs.len() as f64 }
        );
        if let Some(chain) = self.longest_scc_chain_size {
            info!("Longest SCC chain size is {}", chain);
        }

        let mut converged = true;
        if sccs.len() == 1 && sccs[0].len() > 1 {
            let mut sub_solver = GeneralMinMaxSolverFactory::new().create(&sub_env, self.data.matrix.clone());
            self.configure_sub_solver(sub_solver.as_mut(), None);
            self.check_sub_solver_requirements(&sub_env, sub_solver.as_mut(), dir)?;
            converged = sub_solver.solve(&sub_env, dir, x, b)?;
            if self.data.track_scheduler {
                self.data.scheduler_choices = sub_solver.scheduler_choices().map(|c| c.to_vec());
            }
        } else {
            let mut choices = vec![0; n];
            let mut scc_states = BitVector::new(n, false);
            for scc in sccs.iter() {
                if scc.len() == 1 {
                    choices[scc[0]] = self.solve_trivial_scc(scc[0], dir, x, b);
                } else {
                    scc_states.clear();
                    for s in scc.iter() {
                        scc_states.set(*s, true);
                    }
                    converged = self.solve_scc(&sub_env, dir, &scc_states, x, b, &mut choices)? && converged;
                }
            }
            if self.data.track_scheduler {
                self.data.scheduler_choices = Some(choices);
            }
        }

        if !self.data.caching_enabled {
            self.clear_cache();
        }
        Ok(converged)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    // 0 -> {1: .5, exit: .5} | 0 -> exit(0); 1 <-> 2 cycle with exits; acyclic prefix
    fn system() -> (SparseMatrix, Vec<f64>) {
        let m = SparseMatrix::from_choices(&[
            vec![vec![(1, 0.5)], vec![]],
            vec![vec![(2, 0.5)]],
            vec![vec![(1, 0.5)], vec![]],
        ]);
        // rows: 0a, 0b, 1a, 2a, 2b
        (m, vec![0.5, 0.1, 0.5, 0.0, 0.2])
    }

    #[test]
    fn matches_value_iteration() {
        let (m, b) = system();
        let env = Environment::default().with_precision(1e-12);
        let mut vi = GeneralMinMaxSolverFactory::new().create_with_method(MinMaxMethod::ValueIteration, &env, m.clone());
        let mut topo = TopologicalSolver::new(m);
        topo.set_track_scheduler(true);
        for dir in [OptimizationDirection::Minimize, OptimizationDirection::Maximize] {
            let mut x = vec![0.0; 3];
            let mut y = vec![0.0; 3];
            vi.set_has_unique_solution(true);
            topo.set_has_unique_solution(true);
            vi.solve(&env, dir, &mut x, &b).unwrap();
            assert!(topo.solve(&env, dir, &mut y, &b).unwrap());
            for (a, c) in x.iter().zip(y.iter()) {
                assert!((a - c).abs() < 1e-9, "{:?} vs {:?}", x, y);
            }
        }
        assert_eq!(topo.scheduler_choices().map(|c| c.len()), Some(3));
    }

    #[test]
    fn trivial_scc_divides_out_self_loop() {
        // x = 0.5 + 0.5 x  ->  x = 1
        let m = SparseMatrix::from_choices(&[vec![vec![(0, 0.5)]]]);
        let mut solver = TopologicalSolver::new(m);
        let mut x = vec![0.0];
        solver.solve(&Environment::default(), OptimizationDirection::Minimize, &mut x, &[0.5]).unwrap();
        assert_eq!(x, vec![1.0]);
    }

    #[test]
    fn caches_decomposition_only_when_enabled() {
        let (m, b) = system();
        let mut solver = TopologicalSolver::new(m);
        let mut x = vec![0.0; 3];
        solver.solve(&Environment::default(), OptimizationDirection::Maximize, &mut x, &b).unwrap();
        assert!(solver.sorted_scc_decomposition.is_none());
        solver.set_caching_enabled(true);
        solver.solve(&Environment::default(), OptimizationDirection::Maximize, &mut x, &b).unwrap();
        assert_eq!(solver.sorted_scc_decomposition.as_ref().map(|s| s.len()), Some(2));
    }
}
