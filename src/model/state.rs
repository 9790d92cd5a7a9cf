//! Totally-ordered pilot and unit state machines (spec.md §4.9).
//!
//! A transition `current -> target` is applied only if
//! `value(target) > value(current)`; otherwise it is silently dropped.
//! When applied, every skipped intermediate state is also announced, in
//! order, so subscribers observe every state exactly once. Final states
//! are terminal: no transition leaves them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    New,
    UmgrSchedulingPending,
    UmgrScheduling,
    UmgrStagingInputPending,
    UmgrStagingInput,
    AgentStagingInputPending,
    AgentStagingInput,
    AgentSchedulingPending,
    AgentScheduling,
    AgentExecutingPending,
    AgentExecuting,
    AgentStagingOutputPending,
    AgentStagingOutput,
    UmgrStagingOutputPending,
    UmgrStagingOutput,
    Done,
    Failed,
    Canceled,
}

impl UnitState {
    /// Non-terminal states in pipeline order.
    const CHAIN: &'static [UnitState] = &[
        UnitState::New,
        UnitState::UmgrSchedulingPending,
        UnitState::UmgrScheduling,
        UnitState::UmgrStagingInputPending,
        UnitState::UmgrStagingInput,
        UnitState::AgentStagingInputPending,
        UnitState::AgentStagingInput,
        UnitState::AgentSchedulingPending,
        UnitState::AgentScheduling,
        UnitState::AgentExecutingPending,
        UnitState::AgentExecuting,
        UnitState::AgentStagingOutputPending,
        UnitState::AgentStagingOutput,
        UnitState::UmgrStagingOutputPending,
        UnitState::UmgrStagingOutput,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Done | UnitState::Failed | UnitState::Canceled)
    }

    /// Position in the total order. All three terminal states share the
    /// value one past the end of the chain: a transition into any of
    /// them from a non-terminal state is always "forward".
    pub fn value(self) -> u8 {
        if self.is_terminal() {
            Self::CHAIN.len() as u8
        } else {
            Self::CHAIN.iter().position(|s| *s == self).unwrap() as u8
        }
    }

    /// Every state strictly after `from`, up to and including `to`,
    /// announced in pipeline order. If `to` is terminal, every
    /// remaining chain state is announced first, then `to` itself.
    pub fn ordered_between(from: UnitState, to: UnitState) -> Vec<UnitState> {
        let from_val = from.value();
        let mut result: Vec<UnitState> = Self::CHAIN
            .iter()
            .copied()
            .filter(|s| s.value() > from_val)
            .collect();
        if to.is_terminal() {
            result.push(to);
        } else {
            result.retain(|s| s.value() <= to.value());
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PilotState {
    New,
    PmgrLaunchingPending,
    PmgrLaunching,
    PmgrActivePending,
    PmgrActive,
    Done,
    Failed,
    Canceled,
}

impl PilotState {
    const CHAIN: &'static [PilotState] = &[
        PilotState::New,
        PilotState::PmgrLaunchingPending,
        PilotState::PmgrLaunching,
        PilotState::PmgrActivePending,
        PilotState::PmgrActive,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, PilotState::Done | PilotState::Failed | PilotState::Canceled)
    }

    pub fn value(self) -> u8 {
        if self.is_terminal() {
            Self::CHAIN.len() as u8
        } else {
            Self::CHAIN.iter().position(|s| *s == self).unwrap() as u8
        }
    }

    pub fn ordered_between(from: PilotState, to: PilotState) -> Vec<PilotState> {
        let from_val = from.value();
        let mut result: Vec<PilotState> = Self::CHAIN
            .iter()
            .copied()
            .filter(|s| s.value() > from_val)
            .collect();
        if to.is_terminal() {
            result.push(to);
        } else {
            result.retain(|s| s.value() <= to.value());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unit_state_values_strictly_increase_along_chain() {
        let values: Vec<u8> = UnitState::CHAIN.iter().map(|s| s.value()).collect();
        for w in values.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn terminal_states_share_max_value() {
        assert_eq!(UnitState::Done.value(), UnitState::Failed.value());
        assert_eq!(UnitState::Failed.value(), UnitState::Canceled.value());
        assert!(UnitState::Done.value() > UnitState::UmgrStagingOutput.value());
    }

    #[test]
    fn ordered_between_announces_every_skipped_state() {
        let path = UnitState::ordered_between(UnitState::New, UnitState::AgentExecuting);
        assert_eq!(
            path,
            vec![
                UnitState::UmgrSchedulingPending,
                UnitState::UmgrScheduling,
                UnitState::UmgrStagingInputPending,
                UnitState::UmgrStagingInput,
                UnitState::AgentStagingInputPending,
                UnitState::AgentStagingInput,
                UnitState::AgentSchedulingPending,
                UnitState::AgentScheduling,
                UnitState::AgentExecutingPending,
                UnitState::AgentExecuting,
            ]
        );
    }

    #[test]
    fn ordered_between_to_terminal_drains_the_chain() {
        let path = UnitState::ordered_between(UnitState::AgentExecuting, UnitState::Failed);
        assert_eq!(path.last(), Some(&UnitState::Failed));
        assert!(path.iter().all(|s| s.value() > UnitState::AgentExecuting.value() || s.is_terminal()));
    }

    #[test]
    fn backward_transition_is_empty() {
        let path = UnitState::ordered_between(UnitState::AgentExecuting, UnitState::New);
        assert!(path.is_empty());
    }

    #[test]
    fn pilot_state_chain_increases() {
        let values: Vec<u8> = PilotState::CHAIN.iter().map(|s| s.value()).collect();
        for w in values.windows(2) {
            assert!(w[0] < w[1]);
        }
        assert!(PilotState::Done.value() > PilotState::PmgrActive.value());
    }

    const ALL_UNIT_STATES: &[UnitState] = &[
        UnitState::New,
        UnitState::UmgrSchedulingPending,
        UnitState::UmgrScheduling,
        UnitState::UmgrStagingInputPending,
        UnitState::UmgrStagingInput,
        UnitState::AgentStagingInputPending,
        UnitState::AgentStagingInput,
        UnitState::AgentSchedulingPending,
        UnitState::AgentScheduling,
        UnitState::AgentExecutingPending,
        UnitState::AgentExecuting,
        UnitState::AgentStagingOutputPending,
        UnitState::AgentStagingOutput,
        UnitState::UmgrStagingOutputPending,
        UnitState::UmgrStagingOutput,
        UnitState::Done,
        UnitState::Failed,
        UnitState::Canceled,
    ];

    proptest! {
        // Testable property #3 (spec.md §8): for any `from`/`to` pair a CU
        // can legally be advanced between (`from` non-terminal — terminal
        // states never advance further, per `ComputeUnit::advance_to`), the
        // path `ordered_between` emits is strictly increasing in `value()`,
        // contains no state twice, and (when non-empty) ends at `to`.
        #[test]
        fn ordered_between_is_strictly_increasing_and_ends_at_to(
            from_idx in 0usize..UnitState::CHAIN.len(),
            to_idx in 0usize..ALL_UNIT_STATES.len(),
        ) {
            let from = UnitState::CHAIN[from_idx];
            let to = ALL_UNIT_STATES[to_idx];
            let path = UnitState::ordered_between(from, to);

            let values: Vec<u8> = path.iter().map(|s| s.value()).collect();
            for w in values.windows(2) {
                prop_assert!(w[0] < w[1]);
            }

            let unique: std::collections::HashSet<_> = path.iter().collect();
            prop_assert_eq!(unique.len(), path.len());

            if to.value() > from.value() {
                prop_assert_eq!(path.last().copied(), Some(to));
            } else {
                prop_assert!(path.is_empty());
            }
        }
    }
}
