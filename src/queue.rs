use std::cell::{Ref, RefCell};

use serde::Serialize;
use thiserror::Error;
use tracing::*;

use crate::{
    collaborators::{Command, Dispatcher, Parameters},
    plan::Phase,
    store::Store,
    MutationPlan,
};

/// Where one mutation is in its lifecycle. Building happens before a request
/// reaches the queue, so queued requests start out optimistically applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationState {
    OptimisticApplied,
    Confirmed,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuedRequest {
    pub id: usize,
    pub command: Command,
    pub parameters: Parameters,
    pub plan: MutationPlan,
    pub state: MutationState,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("no queued request {0}")]
    Unknown(usize),
    #[error("request {0} already resolved")]
    AlreadyResolved(usize),
}

/// A dispatcher that applies each optimistic patch to its store as soon as
/// the request is written, and holds the rest until the authority answers.
#[derive(Debug)]
pub struct OfflineQueue<S: Store> {
    store: RefCell<S>,
    requests: RefCell<Vec<QueuedRequest>>,
}

impl<S: Store> OfflineQueue<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: RefCell::new(store),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn store(&self) -> Ref<'_, S> {
        self.store.borrow()
    }

    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    pub fn requests(&self) -> Ref<'_, Vec<QueuedRequest>> {
        self.requests.borrow()
    }

    pub fn pending(&self) -> Vec<usize> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.state == MutationState::OptimisticApplied)
            .map(|r| r.id)
            .collect()
    }

    /// The authority accepted request `id`.
    pub fn confirm(&self, id: usize) -> Result<(), QueueError> {
        self.resolve(id, MutationState::Confirmed, Phase::Success)
    }

    /// The authority rejected request `id`, or it can never complete.
    pub fn reject(&self, id: usize) -> Result<(), QueueError> {
        self.resolve(id, MutationState::Rejected, Phase::Failure)
    }

    fn resolve(&self, id: usize, state: MutationState, phase: Phase) -> Result<(), QueueError> {
        let mut requests = self.requests.borrow_mut();
        let request = requests.get_mut(id).ok_or(QueueError::Unknown(id))?;
        if request.state != MutationState::OptimisticApplied {
            return Err(QueueError::AlreadyResolved(id));
        }

        info!("{} {} -> {:?}", request.command, id, state);
        self.store.borrow_mut().apply_phase(&request.plan, phase);
        request.state = state;
        Ok(())
    }
}

impl<S: Store> Dispatcher for OfflineQueue<S> {
    fn write(&self, command: Command, parameters: Parameters, plan: MutationPlan) {
        let mut requests = self.requests.borrow_mut();
        let id = requests.len();
        debug!("queueing {} as {}", command, id);

        self.store
            .borrow_mut()
            .apply_phase(&plan, Phase::Optimistic);
        requests.push(QueuedRequest {
            id,
            command,
            parameters,
            plan,
            state: MutationState::OptimisticApplied,
        });
    }
}
