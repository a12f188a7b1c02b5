//! # Loader Collaborator
//!
//! The engine never fetches or executes code. When a module's code is
//! needed it asks a [`Loader`], exactly once per module. The loader later
//! reports back through the context:
//!
//! ```text
//! load(id) ──► fetch ──► ctx.announce(id)
//!                        execute unit code   (may call ctx.define once)
//!                        ctx.finish_load(id) (implicit define if it didn't)
//!              failure ► ctx.fail_load(id, reason)
//! ```
//!
//! The [`Announcement`] slot is how loaded code, which does not know its own
//! identifier, is matched to the module that triggered the load.

use crate::types::{Identifier, ResolveError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Fetches and executes a module's code.
///
/// `load` must not call back into the context synchronously; completion is
/// reported later via `announce`/`finish_load` or `fail_load`.
pub trait Loader {
    /// Start loading `id`.
    fn load(&mut self, id: &Identifier);
}

/// A loader that only queues requests, for drivers that poll.
///
/// Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct LoadQueue {
    requests: Rc<RefCell<VecDeque<Identifier>>>,
}

impl LoadQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest outstanding request.
    pub fn pop(&self) -> Option<Identifier> {
        self.requests.borrow_mut().pop_front()
    }

    /// Take every outstanding request, oldest first.
    pub fn drain(&self) -> Vec<Identifier> {
        self.requests.borrow_mut().drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.borrow().is_empty()
    }
}

impl Loader for LoadQueue {
    fn load(&mut self, id: &Identifier) {
        self.requests.borrow_mut().push_back(id.clone());
    }
}

/// The single process-wide "pending announcement" slot.
#[derive(Debug, Default)]
pub struct Announcement {
    pending: Option<Identifier>,
}

impl Announcement {
    /// Fill the slot. Fails if another announcement is unclaimed.
    pub fn offer(&mut self, id: Identifier) -> Result<(), ResolveError> {
        if let Some(pending) = &self.pending {
            return Err(ResolveError::AnnouncementBusy {
                pending: pending.clone(),
                requested: id,
            });
        }
        self.pending = Some(id);
        Ok(())
    }

    /// Take the announced identifier, emptying the slot.
    pub fn claim(&mut self) -> Option<Identifier> {
        self.pending.take()
    }

    /// Empty the slot if it still holds `id`. True if it did.
    pub fn release(&mut self, id: &Identifier) -> bool {
        if self.pending.as_ref() == Some(id) {
            self.pending = None;
            return true;
        }
        false
    }

    #[must_use]
    pub fn pending(&self) -> Option<&Identifier> {
        self.pending.as_ref()
    }
}
