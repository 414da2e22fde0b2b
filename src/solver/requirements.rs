//! What a min-max solver needs before it can be called soundly.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Requirement {
    enabled: bool,
    critical: bool,
}

impl Requirement {
    fn enable(critical: bool) -> Requirement {
        Requirement { enabled: true, critical }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinMaxRequirements {
    no_end_components: Requirement,
    valid_initial_scheduler: Requirement,
    lower_bounds: Requirement,
    upper_bounds: Requirement,
}

impl MinMaxRequirements {
    pub fn new() -> MinMaxRequirements {
        MinMaxRequirements::default()
    }

    pub fn require_no_end_components(&mut self) {
        self.no_end_components = Requirement::enable(true);
    }

    pub fn require_valid_initial_scheduler(&mut self) {
        self.valid_initial_scheduler = Requirement::enable(true);
    }

    pub fn require_lower_bounds(&mut self, critical: bool) {
        self.lower_bounds = Requirement::enable(critical);
    }

    pub fn require_upper_bounds(&mut self, critical: bool) {
        self.upper_bounds = Requirement::enable(critical);
    }

    pub fn require_bounds(&mut self, critical: bool) {
        self.require_lower_bounds(critical);
        self.require_upper_bounds(critical);
    }

    pub fn requires_no_end_components(&self) -> bool {
        self.no_end_components.enabled
    }

    pub fn requires_valid_initial_scheduler(&self) -> bool {
        self.valid_initial_scheduler.enabled
    }

    pub fn requires_lower_bounds(&self) -> bool {
        self.lower_bounds.enabled
    }

    pub fn requires_upper_bounds(&self) -> bool {
        self.upper_bounds.enabled
    }

    pub fn clear_no_end_components(&mut self) {
        self.no_end_components = Requirement::default();
    }

    pub fn clear_valid_initial_scheduler(&mut self) {
        self.valid_initial_scheduler = Requirement::default();
    }

    pub fn clear_lower_bounds(&mut self) {
        self.lower_bounds = Requirement::default();
    }

    pub fn clear_upper_bounds(&mut self) {
        self.upper_bounds = Requirement::default();
    }

    pub fn clear_bounds(&mut self) {
        self.clear_lower_bounds();
        self.clear_upper_bounds();
    }

    fn all(&self) -> [(&'static str, Requirement); 4] {
        [
            ("NoEndComponents", self.no_end_components),
            ("ValidInitialScheduler", self.valid_initial_scheduler),
            ("LowerBounds", self.lower_bounds),
            ("UpperBounds", self.upper_bounds),
        ]
    }

    pub fn has_enabled_requirement(&self) -> bool {
        self.all().iter().any(|(_, r)| r.enabled)
    }

    pub fn has_enabled_critical_requirement(&self) -> bool {
        self.all().iter().any(|(_, r)| r.enabled && r.critical)
    }

    pub fn empty(&self) -> bool {
        !self.has_enabled_requirement()
    }

    /// Names of the enabled requirements, critical ones marked with `(critical)`.
    pub fn enabled_requirements_as_string(&self) -> String {
        self.all()
            .iter()
            .filter(|(_, r)| r.enabled)
            .map(|(name, r)| if r.critical { format!("{} (critical)", name) } else { name.to_string() })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn critical_requirements() {
        let mut req = MinMaxRequirements::new();
        assert!(req.empty());
        req.require_bounds(false);
        assert!(req.has_enabled_requirement());
        assert!(!req.has_enabled_critical_requirement());
        req.require_no_end_components();
        assert!(req.has_enabled_critical_requirement());
        assert_eq!(req.enabled_requirements_as_string(), "NoEndComponents (critical), LowerBounds, UpperBounds");
        req.clear_no_end_components();
        req.clear_bounds();
        assert!(req.empty());
    }
}
