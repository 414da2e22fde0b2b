pub mod bounds;
pub mod helper_methods;
pub mod lp;
pub mod min_max;
pub mod multiplier;
pub mod policy_iteration;
pub mod requirements;
pub mod topological;
pub mod value_iteration;

use std::fmt;

use serde::Deserialize;

use crate::storage::BitVector;

pub use bounds::{BaierUpperRewardBounds, DsMpiUpperRewardBounds};
pub use min_max::{GeneralMinMaxSolverFactory, MinMaxSolver, SolverData};
pub use multiplier::Multiplier;
pub use requirements::MinMaxRequirements;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizationDirection {
    Minimize,
    Maximize,
}

impl OptimizationDirection {
    pub fn minimize(self) -> bool {
        self == OptimizationDirection::Minimize
    }

    pub fn maximize(self) -> bool {
        self == OptimizationDirection::Maximize
    }

    pub fn invert(self) -> OptimizationDirection {
        match self {
            OptimizationDirection::Minimize => OptimizationDirection::Maximize,
            OptimizationDirection::Maximize => OptimizationDirection::Minimize,
        }
    }

    /// `true` if `candidate` is strictly better than `current` in this direction.
    #[inline]
    pub fn is_better(self, candidate: f64, current: f64) -> bool {
        match self {
            OptimizationDirection::Minimize => candidate < current,
            OptimizationDirection::Maximize => candidate > current,
        }
    }

    #[inline]
    pub fn best(self, a: f64, b: f64) -> f64 {
        if self.is_better(b, a) {
            b
        } else {
            a
        }
    }
}

impl fmt::Display for OptimizationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationDirection::Minimize => write!(f, "min"),
            OptimizationDirection::Maximize => write!(f, "max"),
        }
    }
}

/// Optimization direction of a query plus the states whose values the caller
/// actually needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveGoal {
    direction: Option<OptimizationDirection>,
    relevant_values: Option<BitVector>,
}

impl SolveGoal {
    pub fn new(direction: OptimizationDirection) -> SolveGoal {
        SolveGoal { direction: Some(direction), relevant_values: None }
    }

    /// A goal for deterministic models, where no optimization takes place.
    pub fn without_direction() -> SolveGoal {
        SolveGoal { direction: None, relevant_values: None }
    }

    pub fn with_relevant_values(mut self, relevant_values: BitVector) -> SolveGoal {
        self.relevant_values = Some(relevant_values);
        self
    }

    pub fn has_direction(&self) -> bool {
        self.direction.is_some()
    }

    /// Direction of the goal; goals without one are treated as minimizing.
    pub fn direction(&self) -> OptimizationDirection {
        self.direction.unwrap_or(OptimizationDirection::Minimize)
    }

    pub fn minimize(&self) -> bool {
        self.direction().minimize()
    }

    pub fn maximize(&self) -> bool {
        self.direction().maximize()
    }

    pub fn has_relevant_values(&self) -> bool {
        self.relevant_values.is_some()
    }

    pub fn relevant_values(&self) -> Option<&BitVector> {
        self.relevant_values.as_ref()
    }

    pub fn set_relevant_values(&mut self, relevant_values: BitVector) {
        self.relevant_values = Some(relevant_values);
    }

    /// Re-indexes the relevant values onto the compacted space of `filter`.
    pub fn restrict_relevant_values(&mut self, filter: &BitVector) {
        if let Some(relevant) = self.relevant_values.take() {
            let restricted = BitVector::from_indices(
                filter.number_of_set_bits(),
                filter.iter().enumerate().filter(|(_, s)| relevant.get(*s)).map(|(i, _)| i),
            );
            self.relevant_values = Some(restricted);
        }
    }

    /// The goal of the complementary query `1 - x`.
    pub fn one_minus(&mut self) {
        self.direction = self.direction.map(|d| d.invert());
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn restrict_relevant_values_compacts() {
        let mut goal = SolveGoal::new(OptimizationDirection::Maximize)
            .with_relevant_values(BitVector::from_indices(5, vec![1, 4]));
        goal.restrict_relevant_values(&BitVector::from_indices(5, vec![0, 1, 3]));
        let relevant = goal.relevant_values().unwrap();
        assert_eq!(relevant.size(), 3);
        assert_eq!(relevant.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn one_minus_flips_direction() {
        let mut goal = SolveGoal::new(OptimizationDirection::Minimize);
        goal.one_minus();
        assert!(goal.maximize());
        assert!(OptimizationDirection::Maximize.is_better(2.0, 1.0));
        assert_eq!(OptimizationDirection::Minimize.best(2.0, 1.0), 1.0);
    }
}
