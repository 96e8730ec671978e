use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::domain::value_objects::ConnectionState;

/// Number of transitions kept for inspection; the run loop never ends, so
/// older entries are dropped.
const HISTORY_CAPACITY: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// Domain entity representing the broker connection lifecycle
#[derive(Debug)]
pub struct ConnectionLifecycle {
    current_state: ConnectionState,
    history: VecDeque<StateTransition>,
    transition_count: usize,
    connected_since: Option<Instant>,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: ConnectionState::Disconnected,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            transition_count: 0,
            connected_since: None,
        }
    }

    pub fn current_state(&self) -> &ConnectionState {
        &self.current_state
    }

    /// Time spent in the current `Connected` stretch
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_since.map(|since| since.elapsed())
    }

    pub fn transition_count(&self) -> usize {
        self.transition_count
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    pub fn transition_to_connecting(&mut self) {
        self.record_transition(ConnectionState::Connecting, None);
    }

    pub fn transition_to_connected(&mut self) {
        self.record_transition(ConnectionState::Connected, None);
        self.connected_since = Some(Instant::now());
    }

    pub fn transition_to_reconnecting(&mut self, attempt: u32, reason: Option<String>) {
        self.record_transition(ConnectionState::Reconnecting { attempt }, reason);
    }

    pub fn transition_to_disconnected(&mut self, reason: Option<String>) {
        self.record_transition(ConnectionState::Disconnected, reason);
    }

    fn record_transition(&mut self, new_state: ConnectionState, reason: Option<String>) {
        if !new_state.is_connected() {
            self.connected_since = None;
        }

        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        });
        self.transition_count += 1;
        self.current_state = new_state;
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
