//! N-of-N completion barrier.
//!
//! Waits for every backend taking part in a fan-out operation and yields the
//! originating request's tag exactly once when the last one reports in.
//! Participants are named, so a completion from a backend that was never
//! asked, or a second one from the same backend, cannot end the wait early.
//! Rescan and creation both use it.

use std::collections::BTreeSet;

/// Result of [`Barrier::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin<T> {
    /// Waiting for the given participants.
    Started,
    /// Nobody takes part. The request is complete already; the barrier stays
    /// idle.
    Immediate(T),
    /// Another request is still pending. Its participants are untouched.
    Rejected(T),
}

/// Result of [`Barrier::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    /// That was the last participant.
    Done(T),
    /// Still waiting for this many participants.
    Waiting(usize),
    /// Not pending, not a participant, or already reported.
    Ignored,
}

#[derive(Debug)]
enum State<T> {
    Idle,
    Pending { tag: T, waiting: BTreeSet<String> },
}

#[derive(Debug)]
pub struct Barrier<T> {
    state: State<T>,
}

impl<T> Barrier<T> {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    pub fn begin<I, S>(&mut self, tag: T, participants: I) -> Begin<T>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let State::Pending { .. } = self.state {
            return Begin::Rejected(tag);
        }
        let waiting: BTreeSet<String> = participants.into_iter().map(Into::into).collect();
        if waiting.is_empty() {
            return Begin::Immediate(tag);
        }
        self.state = State::Pending { tag, waiting };
        Begin::Started
    }

    /// `participant` finished.
    pub fn complete(&mut self, participant: &str) -> Completion<T> {
        let State::Pending { waiting, .. } = &mut self.state else {
            return Completion::Ignored;
        };
        if !waiting.remove(participant) {
            return Completion::Ignored;
        }
        if !waiting.is_empty() {
            return Completion::Waiting(waiting.len());
        }
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Pending { tag, .. } => Completion::Done(tag),
            State::Idle => Completion::Ignored,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending { .. })
    }

    pub fn remaining(&self) -> usize {
        match &self.state {
            State::Idle => 0,
            State::Pending { waiting, .. } => waiting.len(),
        }
    }

    pub fn is_waiting_for(&self, participant: &str) -> bool {
        match &self.state {
            State::Idle => false,
            State::Pending { waiting, .. } => waiting.contains(participant),
        }
    }
}

impl<T> Default for Barrier<T> {
    fn default() -> Self {
        Self::new()
    }
}
