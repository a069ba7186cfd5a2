//! Workflow engine for status transitions
//!
//! Every record family drives its status through one [`StateMachine`], a
//! static table of `(action, from-states, to-state)` rules. Entity transition
//! methods ask the machine for the next state first and only mutate once the
//! move is known to be legal, so a refused transition leaves the record
//! untouched.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::entity::Entity;

/// A status enum that can be driven by a [`StateMachine`]
pub trait State: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn as_str(&self) -> &'static str;
}

/// Named transitions shared by every family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    Close,
    Submit,
    Investigate,
    RequireCapa,
    Cancel,
    Approve,
    Reject,
    Implement,
    RequestVerification,
    Verify,
    Schedule,
    Complete,
    Acknowledge,
    Activate,
    Deactivate,
    Obsolete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Close => "close",
            Action::Submit => "submit",
            Action::Investigate => "investigate",
            Action::RequireCapa => "require_capa",
            Action::Cancel => "cancel",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Implement => "implement",
            Action::RequestVerification => "request_verification",
            Action::Verify => "verify",
            Action::Schedule => "schedule",
            Action::Complete => "complete",
            Action::Acknowledge => "acknowledge",
            Action::Activate => "activate",
            Action::Deactivate => "deactivate",
            Action::Obsolete => "obsolete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge group of a transition table
#[derive(Debug)]
pub struct Rule<S: 'static> {
    pub action: Action,
    pub from: &'static [S],
    pub to: S,
}

impl<S> Rule<S> {
    pub const fn on(action: Action, from: &'static [S], to: S) -> Self {
        Self { action, from, to }
    }
}

/// Transition table for one record family
#[derive(Debug)]
pub struct StateMachine<S: 'static> {
    family: &'static str,
    initial: S,
    rules: &'static [Rule<S>],
}

impl<S> StateMachine<S> {
    pub const fn new(family: &'static str, initial: S, rules: &'static [Rule<S>]) -> Self {
        Self {
            family,
            initial,
            rules,
        }
    }
}

impl<S: State> StateMachine<S> {
    /// Family name used in error messages
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// State every new record starts in
    pub fn initial(&self) -> S {
        self.initial
    }

    /// Resolve the state reached by applying `action` in `current`
    pub fn next(&self, current: S, action: Action) -> Result<S, WorkflowError> {
        self.rules
            .iter()
            .find(|rule| rule.action == action && rule.from.contains(&current))
            .map(|rule| rule.to)
            .ok_or_else(|| WorkflowError::InvalidTransition {
                family: self.family,
                action,
                from: current.as_str(),
                allowed: join_actions(&self.allowed_actions(current)),
            })
    }

    /// Check whether `action` is legal in `current`
    pub fn can(&self, current: S, action: Action) -> bool {
        self.next(current, action).is_ok()
    }

    /// Actions available from the current state, in table order
    pub fn allowed_actions(&self, current: S) -> Vec<Action> {
        let mut actions: Vec<Action> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.from.contains(&current)) {
            if !actions.contains(&rule.action) {
                actions.push(rule.action);
            }
        }
        actions
    }

    /// A state with no outgoing rule
    pub fn is_terminal(&self, state: S) -> bool {
        !self.rules.iter().any(|r| r.from.contains(&state))
    }

    /// Every state named by the table, initial first
    pub fn states(&self) -> Vec<S> {
        let mut states = vec![self.initial];
        for rule in self.rules {
            for s in rule.from.iter().copied().chain(std::iter::once(rule.to)) {
                if !states.contains(&s) {
                    states.push(s);
                }
            }
        }
        states
    }

    /// Look a state up by name, accepting `-` for `_` and any case
    pub fn parse(&self, name: &str) -> Result<S, String> {
        let wanted = name.trim().to_lowercase().replace('-', "_");
        let states = self.states();
        states
            .iter()
            .copied()
            .find(|s| s.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "Invalid {} status: {}. Use {}",
                    self.family,
                    name,
                    states.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                )
            })
    }
}

fn join_actions(actions: &[Action]) -> String {
    if actions.is_empty() {
        return "none".to_string();
    }
    actions
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A record whose status is owned by a [`StateMachine`]
pub trait Lifecycle: Entity {
    type State: State;

    /// The family's transition table
    fn machine() -> &'static StateMachine<Self::State>;

    /// Current state
    fn state(&self) -> Self::State;

    /// Overwrite the state; only [`advance`] should call this
    fn set_state(&mut self, state: Self::State);

    /// Whether Delete is allowed in the current state
    fn is_deletable(&self) -> bool {
        self.state() == Self::machine().initial()
    }

    /// Whether content fields may change in the current state
    ///
    /// Checked before the configured update policy; families whose records
    /// freeze once in use narrow this.
    fn accepts_edits(&self) -> bool {
        true
    }

    /// Whether the record can no longer move
    fn is_terminal(&self) -> bool {
        Self::machine().is_terminal(self.state())
    }
}

/// Move `record` through `action`, returning the new state
pub fn advance<R: Lifecycle>(record: &mut R, action: Action) -> Result<R::State, WorkflowError> {
    let next = R::machine().next(record.state(), action)?;
    record.set_state(next);
    Ok(next)
}

/// Errors that can occur during workflow operations
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("cannot {action} a {family} in '{from}' status")]
    #[diagnostic(
        code(qms::workflow::invalid_transition),
        help("allowed from '{from}': {allowed}")
    )]
    InvalidTransition {
        family: &'static str,
        action: Action,
        from: &'static str,
        allowed: String,
    },

    #[error("{family} in '{status}' status cannot be deleted")]
    #[diagnostic(
        code(qms::workflow::not_deletable),
        help("only records still in their initial status may be deleted")
    )]
    NotDeletable {
        family: &'static str,
        status: String,
    },

    #[error("{family} must be in '{expected}' status (current: {current})")]
    #[diagnostic(code(qms::workflow::wrong_status))]
    WrongStatus {
        family: &'static str,
        expected: String,
        current: String,
    },

    #[error("{family} in '{status}' status is closed to edits")]
    #[diagnostic(
        code(qms::workflow::locked),
        help("check the update_policy setting in .qms/config.yaml; released QC templates change through a new version")
    )]
    Locked {
        family: &'static str,
        status: String,
    },
}
