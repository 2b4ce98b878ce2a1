//! Provision State Machine
//!
//! This module is the single source of truth for which provisioning events a
//! node accepts in which state. The whole graph lives in [`TRANSITIONS`]; no
//! other code decides transition validity.
//!
//! # Design Principles
//!
//! - **Explicit Table**: every legal `(state, event)` pair is listed once
//! - **Reject By Default**: a pair missing from the table is an error, never a no-op
//! - **Target Tracking**: entering a transitional state records the stable
//!   state it is heading to; reaching a stable state clears it
//!
//! # State Flow
//!
//! ```text
//! enroll --manage--> verifying --done--> manageable
//!                         \--fail--> enroll
//!
//! manageable --provide--> cleaning --done--> available
//!                              \--fail--> clean failed --manage--> manageable
//!
//! manageable --inspect--> inspecting --done--> manageable
//!                              \--fail--> inspect failed
//!
//! available --deploy--> deploying --done--> active
//!                            \--fail--> deploy failed
//!
//! active --delete--> deleting --done--> cleaning
//!                        \--fail--> error
//! ```

use std::fmt::Write as _;

use thiserror::Error;

use crate::states::{Event, ProvisionState};

use ProvisionState as S;

/// The complete transition graph: `(from, event, to)`.
pub const TRANSITIONS: &[(ProvisionState, Event, ProvisionState)] = &[
    (S::Enroll, Event::Manage, S::Verifying),
    (S::Verifying, Event::Done, S::Manageable),
    (S::Verifying, Event::Fail, S::Enroll),
    (S::Manageable, Event::Provide, S::Cleaning),
    (S::Manageable, Event::Inspect, S::Inspecting),
    (S::Inspecting, Event::Done, S::Manageable),
    (S::Inspecting, Event::Fail, S::InspectFail),
    (S::InspectFail, Event::Manage, S::Manageable),
    (S::InspectFail, Event::Inspect, S::Inspecting),
    (S::Cleaning, Event::Done, S::Available),
    (S::Cleaning, Event::Fail, S::CleanFail),
    (S::CleanFail, Event::Manage, S::Manageable),
    (S::Available, Event::Manage, S::Manageable),
    (S::Available, Event::Deploy, S::Deploying),
    (S::Deploying, Event::Done, S::Active),
    (S::Deploying, Event::Fail, S::DeployFail),
    (S::DeployFail, Event::Deploy, S::Deploying),
    (S::DeployFail, Event::Rebuild, S::Deploying),
    (S::DeployFail, Event::Delete, S::Deleting),
    (S::Active, Event::Rebuild, S::Deploying),
    (S::Active, Event::Delete, S::Deleting),
    (S::Deleting, Event::Done, S::Cleaning),
    (S::Deleting, Event::Fail, S::Error),
    (S::Error, Event::Rebuild, S::Deploying),
    (S::Error, Event::Delete, S::Deleting),
];

/// Look up the destination of `event` fired in `from`.
pub fn next_state(from: ProvisionState, event: Event) -> Option<ProvisionState> {
    TRANSITIONS
        .iter()
        .find(|(start, ev, _)| *start == from && *ev == event)
        .map(|(_, _, end)| *end)
}

/// Events accepted in `state`, in table order.
pub fn events_from(state: ProvisionState) -> Vec<Event> {
    TRANSITIONS
        .iter()
        .filter(|(start, _, _)| *start == state)
        .map(|(_, ev, _)| *ev)
        .collect()
}

/// Errors raised by the state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The event has no edge out of the current state
    #[error("Cannot transition from state '{from}' on event '{event}' (no defined transition)")]
    NoTransition { from: ProvisionState, event: Event },
}

/// Result of a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ProvisionState,
    pub event: Event,
    pub to: ProvisionState,
    /// Target after the transition (None once a stable state is reached)
    pub target: Option<ProvisionState>,
}

/// A node's provisioning position plus its in-flight target.
///
/// # Example
///
/// ```
/// use provisiond::fsm::ProvisionMachine;
/// use provisiond::states::{Event, ProvisionState};
///
/// let mut machine = ProvisionMachine::new(ProvisionState::Enroll);
/// machine.process_event(Event::Manage).unwrap();
/// assert_eq!(machine.current(), ProvisionState::Verifying);
/// assert_eq!(machine.target(), Some(ProvisionState::Manageable));
///
/// // Inspection is not reachable from here
/// assert!(machine.process_event(Event::Inspect).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionMachine {
    current: ProvisionState,
    target: Option<ProvisionState>,
}

impl ProvisionMachine {
    /// Start a machine resting in `state`.
    pub fn new(state: ProvisionState) -> Self {
        Self {
            current: state,
            target: state.target(),
        }
    }

    /// Rebuild a machine from persisted node fields.
    pub fn resume(current: ProvisionState, target: Option<ProvisionState>) -> Self {
        Self { current, target }
    }

    #[inline]
    pub fn current(&self) -> ProvisionState {
        self.current
    }

    #[inline]
    pub fn target(&self) -> Option<ProvisionState> {
        self.target
    }

    /// Check whether the event can be processed, without processing it.
    pub fn can_process(&self, event: Event) -> bool {
        next_state(self.current, event).is_some()
    }

    /// Fire `event`, moving to the table's destination state.
    ///
    /// # Errors
    ///
    /// - `NoTransition` if the table has no `(current, event)` entry; the
    ///   machine is left untouched.
    pub fn process_event(&mut self, event: Event) -> Result<Transition, TransitionError> {
        let to = next_state(self.current, event).ok_or(TransitionError::NoTransition {
            from: self.current,
            event,
        })?;

        let from = self.current;
        self.current = to;

        if self.target == Some(to) || to.is_stable() {
            self.target = None;
        }
        if self.target.is_none() {
            self.target = to.target();
        }

        Ok(Transition {
            from,
            event,
            to,
            target: self.target,
        })
    }
}

/// Render the transition table as aligned text.
pub fn render_table() -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<16} {:<10} {:<16}", "FROM", "EVENT", "TO");
    for (from, event, to) in TRANSITIONS {
        let _ = writeln!(
            out,
            "{:<16} {:<10} {:<16}",
            from.to_string(),
            event.to_string(),
            to.to_string()
        );
    }
    out
}

/// Render the transition graph as a Graphviz digraph.
///
/// Stable states are drawn as boxes, failure states in red.
pub fn render_dot() -> String {
    use strum::IntoEnumIterator;

    let mut out = String::from("digraph provision_states {\n");
    for state in ProvisionState::iter() {
        let shape = if state.is_stable() { "box" } else { "ellipse" };
        let color = if state.is_failure() { "red" } else { "black" };
        let _ = writeln!(
            out,
            "  \"{}\" [shape={}, color={}];",
            state, shape, color
        );
    }
    for (from, event, to) in TRANSITIONS {
        let _ = writeln!(out, "  \"{}\" -> \"{}\" [label=\"{}\"];", from, to, event);
    }
    out.push_str("}\n");
    out
}
