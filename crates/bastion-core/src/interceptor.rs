//! The decision interceptor chain.
//!
//! Every check builds a `DecisionRecord` and hands it to the chain. Each
//! registered interceptor sees the record as left by the one before it, in
//! registration order, and may overwrite `allowed`.

use std::sync::{Arc, PoisonError, RwLock};

use bastion_contracts::decision::DecisionRecord;

use crate::traits::DecisionInterceptor;

/// An ordered, shareable list of interceptors.
///
/// Registration takes a write lock; dispatch clones the current list out of a
/// read lock and runs it unlocked, so an interceptor may register another one
/// without deadlocking (the new one applies from the next check).
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: RwLock<Vec<Arc<dyn DecisionInterceptor>>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor. Returns its position in the chain.
    pub fn register(&self, interceptor: Arc<dyn DecisionInterceptor>) -> usize {
        let mut interceptors = self
            .interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        interceptors.push(interceptor);
        interceptors.len() - 1
    }

    /// Run `record` through every interceptor and return the result.
    ///
    /// With no interceptors this is the identity.
    pub fn dispatch(&self, mut record: DecisionRecord) -> DecisionRecord {
        let interceptors = self
            .interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for interceptor in &interceptors {
            interceptor.intercept(&mut record);
        }
        record
    }

    pub fn len(&self) -> usize {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.len())
            .finish()
    }
}
