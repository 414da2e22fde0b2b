extern crate serde_json;

pub mod environment;
pub mod error;
pub mod model_checking;
pub mod solver;
pub mod storage;
pub mod termination;

pub use environment::{read_environment_json, Environment};
pub use error::{CheckError, Result};
pub use model_checking::mdp::{read_mdp_json, SparseModel, MDP};
pub use solver::{OptimizationDirection, SolveGoal};
