use super::config::{ConvergenceConfig, RayEscalation};
use super::error::EngineError;
use tracing::debug;

/// States of the outer fixed-point iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergenceState {
    Initializing,
    /// `pass` passes completed so far (including passes of a resumed run); `streak`
    /// consecutive passes met the goal fraction.
    Iterating { pass: usize, streak: usize },
    Converged { passes: usize },
    MaxIterExceeded { passes: usize },
}

impl ConvergenceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged { .. } | Self::MaxIterExceeded { .. })
    }
}

/// Decides after every pass whether to stop, continue, or escalate ray counts.
///
/// The controller only sees per-pass statistics, so it can be driven without running any
/// transport.
#[derive(Debug, Clone)]
pub struct ConvergenceController {
    config: ConvergenceConfig,
    state: ConvergenceState,
    /// Passes completed before this run started.
    offset: usize,
}

impl ConvergenceController {
    pub fn new(config: &ConvergenceConfig) -> Self {
        Self {
            config: config.clone(),
            state: ConvergenceState::Initializing,
            offset: 0,
        }
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    /// Leaves `Initializing`, counting `completed_passes` already done by an earlier run.
    pub fn start(&mut self, completed_passes: usize) -> Result<ConvergenceState, EngineError> {
        if self.state != ConvergenceState::Initializing {
            return Err(EngineError::Internal(format!(
                "convergence controller started from state {:?}",
                self.state
            )));
        }
        self.offset = completed_passes;
        self.state = ConvergenceState::Iterating {
            pass: completed_passes,
            streak: 0,
        };
        Ok(self.state)
    }

    /// Records the converged fraction of a finished pass and returns the new state.
    pub fn record_pass(
        &mut self,
        fraction_converged: f64,
    ) -> Result<ConvergenceState, EngineError> {
        let ConvergenceState::Iterating { pass, streak } = self.state else {
            return Err(EngineError::Internal(format!(
                "pass recorded in state {:?}",
                self.state
            )));
        };
        let pass = pass + 1;
        let streak = if fraction_converged > self.config.goal_fraction {
            streak + 1
        } else {
            0
        };
        self.state = if streak >= self.config.required_streak {
            ConvergenceState::Converged { passes: pass }
        } else if pass - self.offset >= self.config.max_iterations {
            ConvergenceState::MaxIterExceeded { passes: pass }
        } else {
            ConvergenceState::Iterating { pass, streak }
        };
        debug!(pass, streak, fraction_converged, state = ?self.state, "Pass recorded");
        Ok(self.state)
    }

    /// Whether a point should receive more rays in the next pass.
    pub fn should_escalate(&self, point_converged: bool) -> bool {
        match self.config.escalation {
            RayEscalation::UnconvergedOnly => !point_converged,
            RayEscalation::Always => true,
            RayEscalation::Never => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_iterations: usize) -> ConvergenceConfig {
        ConvergenceConfig {
            max_iterations,
            tolerance: 1e-6,
            goal_fraction: 0.5,
            required_streak: 2,
            escalation: RayEscalation::UnconvergedOnly,
        }
    }

    #[test]
    fn converges_after_two_consecutive_passes_above_goal() {
        let mut controller = ConvergenceController::new(&config(10));
        controller.start(0).unwrap();
        assert_eq!(
            controller.record_pass(0.6).unwrap(),
            ConvergenceState::Iterating { pass: 1, streak: 1 }
        );
        assert_eq!(
            controller.record_pass(0.3).unwrap(),
            ConvergenceState::Iterating { pass: 2, streak: 0 }
        );
        controller.record_pass(0.9).unwrap();
        assert_eq!(
            controller.record_pass(0.9).unwrap(),
            ConvergenceState::Converged { passes: 4 }
        );
        assert!(controller.state().is_terminal());
    }

    #[test]
    fn goal_fraction_must_be_strictly_exceeded() {
        let mut controller = ConvergenceController::new(&config(10));
        controller.start(0).unwrap();
        controller.record_pass(0.5).unwrap();
        assert_eq!(
            controller.record_pass(0.5).unwrap(),
            ConvergenceState::Iterating { pass: 2, streak: 0 }
        );
    }

    #[test]
    fn stops_at_iteration_limit() {
        let mut controller = ConvergenceController::new(&config(3));
        controller.start(0).unwrap();
        controller.record_pass(0.0).unwrap();
        controller.record_pass(0.0).unwrap();
        assert_eq!(
            controller.record_pass(0.0).unwrap(),
            ConvergenceState::MaxIterExceeded { passes: 3 }
        );
        assert!(controller.record_pass(1.0).is_err());
    }

    #[test]
    fn resumed_run_counts_limit_from_resume_point() {
        let mut controller = ConvergenceController::new(&config(2));
        controller.start(5).unwrap();
        controller.record_pass(0.0).unwrap();
        assert_eq!(
            controller.record_pass(0.0).unwrap(),
            ConvergenceState::MaxIterExceeded { passes: 7 }
        );
    }

    #[test]
    fn cannot_record_before_start_or_start_twice() {
        let mut controller = ConvergenceController::new(&config(2));
        assert!(controller.record_pass(1.0).is_err());
        controller.start(0).unwrap();
        assert!(controller.start(0).is_err());
    }

    #[test]
    fn escalation_policy_selects_points() {
        let mut cfg = config(2);
        let controller = ConvergenceController::new(&cfg);
        assert!(controller.should_escalate(false));
        assert!(!controller.should_escalate(true));
        cfg.escalation = RayEscalation::Always;
        assert!(ConvergenceController::new(&cfg).should_escalate(true));
        cfg.escalation = RayEscalation::Never;
        assert!(!ConvergenceController::new(&cfg).should_escalate(false));
    }
}
