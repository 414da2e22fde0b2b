//! Reward structures. Rewards are earned per state (on every visit) and per
//! choice (whenever the choice is taken).

use crate::storage::{BitVector, SparseMatrix};

/// What the reward engines need to know about a reward structure.
pub trait RewardModel {
    fn is_empty(&self) -> bool;

    fn has_state_rewards(&self) -> bool;

    fn state_reward(&self, state: usize) -> f64;

    fn state_action_reward(&self, row: usize) -> f64;

    fn state_reward_vector(&self, number_of_states: usize) -> Vec<f64> {
        (0..number_of_states).map(|s| self.state_reward(s)).collect()
    }

    /// Reward of taking `row` in `state`.
    fn total_state_action_reward(&self, state: usize, row: usize) -> f64 {
        self.state_reward(state) + self.state_action_reward(row)
    }

    /// One entry per row of `matrix`.
    fn total_reward_vector(&self, matrix: &SparseMatrix) -> Vec<f64> {
        let mut result = Vec::with_capacity(matrix.row_count());
        for state in 0..matrix.row_group_count() {
            for row in matrix.row_group(state) {
                result.push(self.total_state_action_reward(state, row));
            }
        }
        result
    }

    /// One entry per row of the row groups in `states`.
    fn total_reward_vector_for_states(&self, matrix: &SparseMatrix, states: &BitVector) -> Vec<f64> {
        let mut result = Vec::new();
        for state in states.iter() {
            for row in matrix.row_group(state) {
                result.push(self.total_state_action_reward(state, row));
            }
        }
        result
    }

    /// States whose state reward and all choice rewards are zero.
    fn states_with_zero_reward(&self, matrix: &SparseMatrix) -> BitVector {
        BitVector::from_indices(
            matrix.row_group_count(),
            (0..matrix.row_group_count())
                .filter(|s| self.state_reward(*s) == 0.0 && matrix.row_group(*s).all(|r| self.state_action_reward(r) == 0.0)),
        )
    }

    fn choices_with_zero_reward(&self, matrix: &SparseMatrix) -> BitVector {
        let mut result = BitVector::new(matrix.row_count(), false);
        for state in 0..matrix.row_group_count() {
            for row in matrix.row_group(state) {
                if self.state_reward(state) == 0.0 && self.state_action_reward(row) == 0.0 {
                    result.set(row, true);
                }
            }
        }
        result
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardRewardModel {
    pub state_rewards: Option<Vec<f64>>,
    pub state_action_rewards: Option<Vec<f64>>,
}

impl StandardRewardModel {
    pub fn new(state_rewards: Option<Vec<f64>>, state_action_rewards: Option<Vec<f64>>) -> StandardRewardModel {
        StandardRewardModel { state_rewards, state_action_rewards }
    }

    pub fn from_state_rewards(state_rewards: Vec<f64>) -> StandardRewardModel {
        StandardRewardModel::new(Some(state_rewards), None)
    }

    pub fn from_state_action_rewards(state_action_rewards: Vec<f64>) -> StandardRewardModel {
        StandardRewardModel::new(None, Some(state_action_rewards))
    }
}

impl RewardModel for StandardRewardModel {
    fn is_empty(&self) -> bool {
        self.state_rewards.is_none() && self.state_action_rewards.is_none()
    }

    fn has_state_rewards(&self) -> bool {
        self.state_rewards.is_some()
    }

    fn state_reward(&self, state: usize) -> f64 {
        self.state_rewards.as_ref().map_or(0.0, |r| r[state])
    }

    fn state_action_reward(&self, row: usize) -> f64 {
        self.state_action_rewards.as_ref().map_or(0.0, |r| r[row])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Interval {
        Interval { lower, upper }
    }

    pub fn end(&self, lower: bool) -> f64 {
        if lower {
            self.lower
        } else {
            self.upper
        }
    }
}

/// Rewards only known up to an interval. The engines work on one end of the
/// intervals at a time, see [`IntervalRewardModel::bound`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalRewardModel {
    pub state_rewards: Option<Vec<Interval>>,
    pub state_action_rewards: Option<Vec<Interval>>,
}

impl IntervalRewardModel {
    pub fn new(state_rewards: Option<Vec<Interval>>, state_action_rewards: Option<Vec<Interval>>) -> IntervalRewardModel {
        IntervalRewardModel { state_rewards, state_action_rewards }
    }

    /// The scalar reward model of the lower (or upper) interval ends.
    pub fn bound(&self, lower: bool) -> IntervalBound<'_> {
        IntervalBound { model: self, lower }
    }
}

pub struct IntervalBound<'a> {
    model: &'a IntervalRewardModel,
    lower: bool,
}

impl<'a> RewardModel for IntervalBound<'a> {
    fn is_empty(&self) -> bool {
        self.model.state_rewards.is_none() && self.model.state_action_rewards.is_none()
    }

    fn has_state_rewards(&self) -> bool {
        self.model.state_rewards.is_some()
    }

    fn state_reward(&self, state: usize) -> f64 {
        self.model.state_rewards.as_ref().map_or(0.0, |r| r[state].end(self.lower))
    }

    fn state_action_reward(&self, row: usize) -> f64 {
        self.model.state_action_rewards.as_ref().map_or(0.0, |r| r[row].end(self.lower))
    }
}
