extern crate serde_json;

use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::error::{CheckError, Result};
use crate::model_checking::rewards::StandardRewardModel;
use crate::storage::{BitVector, SparseMatrix, SparseMatrixBuilder};

/// An MDP as a list of transitions, e.g.
/// ```json
/// {
///   "states": [0, 1],
///   "initial": 0,
///   "transitions": [
///     {"s": 0, "a": "go", "s_prime": [{"s": 0, "p": 0.1}, {"s": 1, "p": 0.9}], "rewards": 1.0},
///     {"s": 1, "a": "stay", "s_prime": [{"s": 1, "p": 1.0}], "rewards": 0.0}
///   ],
///   "labelling": [{"s": 1, "w": "done"}]
/// }
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct MDP {
    pub states: Vec<u32>,
    pub initial: u32,
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub labelling: Vec<MDPLabellingPair>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MDPLabellingPair {
    pub s: u32,
    pub w: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Transition {
    pub s: u32,
    pub a: String,
    pub s_prime: Vec<TransitionPair>,
    #[serde(default)]
    pub rewards: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransitionPair {
    pub s: u32,
    pub p: f64,
}

/// The flattened model. State `i` is the `i`-th entry of `MDP::states`, its
/// choices are its transitions in file order.
#[derive(Debug, Clone)]
pub struct SparseModel {
    pub matrix: SparseMatrix,
    pub backward: SparseMatrix,
    pub rewards: StandardRewardModel,
    pub initial: usize,
    pub state_names: Vec<u32>,
    pub actions: Vec<String>,
    pub labels: Vec<Vec<String>>,
}

impl SparseModel {
    pub fn number_of_states(&self) -> usize {
        self.state_names.len()
    }

    /// States with at least one label matching `re`.
    pub fn states_matching(&self, re: &Regex) -> BitVector {
        BitVector::from_indices(
            self.number_of_states(),
            self.labels
                .iter()
                .enumerate()
                .filter(|(_, labels)| labels.iter().any(|w| re.is_match(w)))
                .map(|(s, _)| s),
        )
    }

    pub fn initial_states(&self) -> BitVector {
        BitVector::from_indices(self.number_of_states(), vec![self.initial])
    }
}

impl MDP {
    pub fn to_sparse_model(&self) -> Result<SparseModel> {
        let index: HashMap<u32, usize> = self.states.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        if index.len() != self.states.len() {
            return Err(CheckError::InvalidModel("duplicate state in state list".to_string()));
        }
        let lookup = |s: u32| {
            index
                .get(&s)
                .copied()
                .ok_or_else(|| CheckError::InvalidModel(format!("transition refers to unknown state {}", s)))
        };

        let mut choices: Vec<Vec<&Transition>> = vec![Vec::new(); self.states.len()];
        for t in self.transitions.iter() {
            choices[lookup(t.s)?].push(t);
        }

        let mut builder = SparseMatrixBuilder::new();
        let mut rewards = Vec::with_capacity(self.transitions.len());
        let mut actions = Vec::with_capacity(self.transitions.len());
        let mut row = 0;
        for (state, transitions) in choices.iter().enumerate() {
            if transitions.is_empty() {
                return Err(CheckError::InvalidModel(format!("state {} has no transitions", self.states[state])));
            }
            builder.new_row_group(row);
            for t in transitions.iter() {
                for pair in t.s_prime.iter() {
                    builder.add_next_value(row, lookup(pair.s)?, pair.p);
                }
                rewards.push(t.rewards);
                actions.push(t.a.clone());
                row += 1;
            }
        }
        let matrix = builder.build(row, self.states.len());
        matrix.check_stochastic(1e-6)?;

        let mut labels = vec![Vec::new(); self.states.len()];
        for pair in self.labelling.iter() {
            labels[lookup(pair.s)?].push(pair.w.clone());
        }
        let initial = lookup(self.initial)?;
        debug!("Model has {} states and {} choices", self.states.len(), row);

        let backward = matrix.transpose();
        let rewards = StandardRewardModel::from_state_action_rewards(rewards);
        Ok(SparseModel { matrix, backward, rewards, initial, state_names: self.states.clone(), actions, labels })
    }
}

pub fn read_mdp_json<P: AsRef<Path>>(path: P) -> std::result::Result<MDP, Box<dyn Error>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let u = serde_json::from_reader(reader)?;
    Ok(u)
}
