use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MinMaxMethod {
    ValueIteration,
    PolicyIteration,
    Topological,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MultiplicationStyle {
    Regular,
    GaussSeidel,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LraMethod {
    ValueIteration,
    LinearProgramming,
}

/// Solver and engine options. Passed by reference to every query; nothing is
/// read from global state.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Environment {
    pub min_max_method: MinMaxMethod,
    /// Method used inside non-trivial SCCs by the topological solver.
    pub topological_underlying_method: MinMaxMethod,
    pub max_iterations: u64,
    pub precision: f64,
    pub relative_termination: bool,
    pub multiplication_style: MultiplicationStyle,
    /// Use interval iteration; solvers then ask for lower and upper bounds.
    pub force_soundness: bool,
    pub lra_method: LraMethod,
    /// Self-loop probability mixed into every MEC transition for LRA value iteration.
    pub lra_self_loop_probability: f64,
    /// Extend the reward-zero states backward through zero-reward choices.
    pub filter_reward_zero: bool,
    pub caching_enabled: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            min_max_method: MinMaxMethod::ValueIteration,
            topological_underlying_method: MinMaxMethod::ValueIteration,
            max_iterations: 1_000_000,
            precision: 1e-6,
            relative_termination: false,
            multiplication_style: MultiplicationStyle::GaussSeidel,
            force_soundness: false,
            lra_method: LraMethod::ValueIteration,
            lra_self_loop_probability: 0.1,
            filter_reward_zero: false,
            caching_enabled: false,
        }
    }
}

impl Environment {
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_min_max_method(mut self, method: MinMaxMethod) -> Self {
        self.min_max_method = method;
        self
    }

    pub fn with_lra_method(mut self, method: LraMethod) -> Self {
        self.lra_method = method;
        self
    }
}

pub fn read_environment_json<P: AsRef<Path>>(path: P) -> std::result::Result<Environment, Box<dyn Error>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let env = serde_json::from_reader(reader)?;
    Ok(env)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let env: Environment = serde_json::from_str(
            r#"{"precision": 1e-9, "min_max_method": "PolicyIteration", "lra_method": "LinearProgramming"}"#,
        )
        .unwrap();
        assert_eq!(env.precision, 1e-9);
        assert_eq!(env.min_max_method, MinMaxMethod::PolicyIteration);
        assert_eq!(env.lra_method, LraMethod::LinearProgramming);
        assert_eq!(env.max_iterations, 1_000_000);
        assert_eq!(env.multiplication_style, MultiplicationStyle::GaussSeidel);
        assert_eq!(env.lra_self_loop_probability, 0.1);
    }
}
