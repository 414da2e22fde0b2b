use std::fmt;

/// The choice a scheduler makes in one (state, memory state) pair. Choices are
/// local indices into the state's row group.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerChoice {
    Undefined,
    Deterministic(usize),
    Randomized(Vec<(usize, f64)>),
}

impl SchedulerChoice {
    pub fn is_defined(&self) -> bool {
        !matches!(self, SchedulerChoice::Undefined)
    }

    pub fn deterministic_choice(&self) -> Option<usize> {
        match self {
            SchedulerChoice::Deterministic(c) => Some(*c),
            SchedulerChoice::Randomized(d) if d.len() == 1 => Some(d[0].0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scheduler {
    // indexed by memory state, then model state
    choices: Vec<Vec<SchedulerChoice>>,
}

impl Scheduler {
    /// Memoryless scheduler over `number_of_states` states, all choices undefined.
    pub fn new(number_of_states: usize) -> Scheduler {
        Scheduler::with_memory(number_of_states, 1)
    }

    pub fn with_memory(number_of_states: usize, number_of_memory_states: usize) -> Scheduler {
        Scheduler { choices: vec![vec![SchedulerChoice::Undefined; number_of_states]; number_of_memory_states.max(1)] }
    }

    pub fn from_choices(choices: &[usize]) -> Scheduler {
        Scheduler { choices: vec![choices.iter().map(|c| SchedulerChoice::Deterministic(*c)).collect()] }
    }

    pub fn number_of_states(&self) -> usize {
        self.choices[0].len()
    }

    pub fn number_of_memory_states(&self) -> usize {
        self.choices.len()
    }

    pub fn set_choice(&mut self, state: usize, choice: usize) {
        self.set_choice_with_memory(state, 0, SchedulerChoice::Deterministic(choice));
    }

    pub fn set_choice_with_memory(&mut self, state: usize, memory_state: usize, choice: SchedulerChoice) {
        self.choices[memory_state][state] = choice;
    }

    pub fn choice(&self, state: usize) -> &SchedulerChoice {
        &self.choices[0][state]
    }

    pub fn choice_with_memory(&self, state: usize, memory_state: usize) -> &SchedulerChoice {
        &self.choices[memory_state][state]
    }

    /// The local choice for `state` if the scheduler picks exactly one there.
    pub fn deterministic_choice(&self, state: usize) -> Option<usize> {
        self.choices[0][state].deterministic_choice()
    }

    /// Deterministic local choices of a memoryless scheduler, one per state.
    pub fn deterministic_choices(&self) -> Option<Vec<usize>> {
        if !self.is_memoryless() {
            return None;
        }
        self.choices[0].iter().map(|c| c.deterministic_choice()).collect()
    }

    pub fn is_partial(&self) -> bool {
        self.choices.iter().flatten().any(|c| !c.is_defined())
    }

    pub fn is_deterministic(&self) -> bool {
        self.choices.iter().flatten().all(|c| !matches!(c, SchedulerChoice::Randomized(d) if d.len() != 1))
    }

    pub fn is_memoryless(&self) -> bool {
        self.choices.len() == 1
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (m, memory) in self.choices.iter().enumerate() {
            for (s, choice) in memory.iter().enumerate() {
                if self.is_memoryless() {
                    write!(f, "{}: ", s)?;
                } else {
                    write!(f, "({}, {}): ", s, m)?;
                }
                match choice {
                    SchedulerChoice::Undefined => writeln!(f, "undefined")?,
                    SchedulerChoice::Deterministic(c) => writeln!(f, "{}", c)?,
                    SchedulerChoice::Randomized(d) => writeln!(f, "{:?}", d)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn partial_until_all_choices_set() {
        let mut s = Scheduler::new(3);
        assert!(s.is_partial());
        s.set_choice(0, 1);
        s.set_choice(1, 0);
        assert!(s.is_partial());
        s.set_choice(2, 0);
        assert!(!s.is_partial());
        assert!(s.is_deterministic() && s.is_memoryless());
        assert_eq!(s.deterministic_choices(), Some(vec![1, 0, 0]));
    }

    #[test]
    fn randomized_and_memory() {
        let mut s = Scheduler::with_memory(1, 2);
        assert!(!s.is_memoryless());
        s.set_choice_with_memory(0, 1, SchedulerChoice::Randomized(vec![(0, 0.5), (1, 0.5)]));
        assert!(!s.is_deterministic());
        assert_eq!(s.deterministic_choices(), None);
    }
}
