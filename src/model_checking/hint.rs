use crate::storage::{BitVector, Scheduler};

/// Prior knowledge about a query, typically the result of an earlier run on
/// the same model. Every part is optional and only ever used to save work.
#[derive(Debug, Clone, Default)]
pub struct ModelCheckerHint {
    result_hint: Option<Vec<f64>>,
    scheduler_hint: Option<Scheduler>,
    maybe_states: Option<BitVector>,
    compute_only_maybe_states: bool,
    no_end_components_in_maybe_states: bool,
}

impl ModelCheckerHint {
    pub fn empty() -> ModelCheckerHint {
        ModelCheckerHint::default()
    }

    pub fn is_empty(&self) -> bool {
        self.result_hint.is_none()
            && self.scheduler_hint.is_none()
            && self.maybe_states.is_none()
            && !self.compute_only_maybe_states
            && !self.no_end_components_in_maybe_states
    }

    pub fn with_result_hint(mut self, values: Vec<f64>) -> ModelCheckerHint {
        self.result_hint = Some(values);
        self
    }

    pub fn with_scheduler_hint(mut self, scheduler: Scheduler) -> ModelCheckerHint {
        self.scheduler_hint = Some(scheduler);
        self
    }

    /// Only the values of `maybe_states` are computed; all other states take
    /// their (qualitative) value from the result hint.
    pub fn with_compute_only_maybe_states(mut self, maybe_states: BitVector) -> ModelCheckerHint {
        self.maybe_states = Some(maybe_states);
        self.compute_only_maybe_states = true;
        self
    }

    pub fn with_no_end_components_in_maybe_states(mut self) -> ModelCheckerHint {
        self.no_end_components_in_maybe_states = true;
        self
    }

    pub fn result_hint(&self) -> Option<&[f64]> {
        self.result_hint.as_deref()
    }

    pub fn scheduler_hint(&self) -> Option<&Scheduler> {
        self.scheduler_hint.as_ref()
    }

    pub fn maybe_states(&self) -> Option<&BitVector> {
        self.maybe_states.as_ref()
    }

    pub fn compute_only_maybe_states(&self) -> bool {
        self.compute_only_maybe_states
    }

    pub fn no_end_components_in_maybe_states(&self) -> bool {
        self.no_end_components_in_maybe_states
    }
}
