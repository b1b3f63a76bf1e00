//! Shared state between a self-play worker's training thread and the
//! observers that read its published snapshots (the tournament engine, a
//! worker's own baseline-competition thread, a UI-like caller). Clone-on-
//! read is the contract throughout: a reader clones the model under the
//! lock and releases it immediately, never holding the mutex across any
//! work of its own.
//!
//! Grounded on `shared/worker.h`'s `Worker` (the `m_mutex`-guarded
//! `m_model`/`m_past_models`/`m_replace_model` triple) and `bin/main.cpp`'s
//! `Tournament_Group::Worker` (the `restart`/`paused`/`updated` flag set
//! plus condition variable).

use std::sync::{Arc, Condvar, Mutex};

use crate::model::Model;

/// One worker's published state: its current model, a fixed-size ring of
/// recently published snapshots (for the tournament/baseline subsystems to
/// sample from), and a pending-replacement slot an external caller can use
/// to force the worker to adopt a different model on its next publish.
pub struct ModelSlot {
    inner: Mutex<ModelSlotInner>,
}

struct ModelSlotInner {
    name: String,
    generation: u64,
    model: Model,
    /// Fixed-size ring of recent snapshots, indexed by publication count
    /// modulo its length (spec.md §4.6's `past_models[i_compete]`).
    ring: Vec<Option<Arc<Model>>>,
    ring_next: usize,
    pending_replacement: Option<Model>,
}

impl ModelSlot {
    pub fn new(name: impl Into<String>, model: Model, ring_size: usize) -> ModelSlot {
        ModelSlot {
            inner: Mutex::new(ModelSlotInner {
                name: name.into(),
                generation: 0,
                model,
                ring: vec![None; ring_size],
                ring_next: 0,
                pending_replacement: None,
            }),
        }
    }

    /// `root#generation`, matching spec.md §3's model identity.
    pub fn name(&self) -> String {
        let inner = self.inner.lock().unwrap();
        format!("{}#{}", inner.name, inner.generation)
    }

    /// Clones the current model under the lock. Never holds the lock past
    /// the clone.
    pub fn clone_model(&self) -> Model {
        self.inner.lock().unwrap().model.clone()
    }

    /// Installs `model` to be adopted by the worker at its next publication
    /// point, instead of the worker's own trained weights.
    pub fn request_replacement(&self, model: Model) {
        self.inner.lock().unwrap().pending_replacement = Some(model);
    }

    /// Called by the owning worker at its publish cadence. If a replacement
    /// was requested, it is adopted (and the generation counter is left
    /// unchanged, per spec.md §4.6: "adopt it (and reset)"); otherwise the
    /// worker's own `trained` model is published and the generation counter
    /// bumps. Either way, a clone of the resulting model is inserted into
    /// the recent-snapshot ring.
    pub fn publish(&self, trained: &Model) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(replacement) = inner.pending_replacement.take() {
            inner.model = replacement;
        } else {
            inner.generation += 1;
            inner.model = trained.clone();
        }
        let idx = inner.ring_next;
        let ring_len = inner.ring.len();
        let snapshot = Arc::new(inner.model.clone());
        inner.ring[idx] = Some(snapshot);
        inner.ring_next = (idx + 1) % ring_len.max(1);
    }

    /// Clones of every populated ring slot, oldest-to-newest as stored (not
    /// reordered by publish recency).
    pub fn ring_snapshot(&self) -> Vec<Arc<Model>> {
        self.inner.lock().unwrap().ring.iter().flatten().cloned().collect()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().unwrap().generation
    }
}

/// Shared pause/resume and restart signalling for a background thread
/// (the tournament engine or a baseline-competition loop), matching
/// `bin/main.cpp`'s `Tournament_Group::Worker` flag set.
#[derive(Default)]
pub struct ThreadControl {
    state: Mutex<ThreadControlState>,
    cv: Condvar,
}

#[derive(Default)]
struct ThreadControlState {
    paused: bool,
    restart: bool,
    exit: bool,
}

impl ThreadControl {
    pub fn new() -> ThreadControl {
        ThreadControl::default()
    }

    pub fn request_exit(&self) {
        let mut state = self.state.lock().unwrap();
        state.exit = true;
        self.cv.notify_all();
    }

    pub fn should_exit(&self) -> bool {
        self.state.lock().unwrap().exit
    }

    pub fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        state.paused = false;
        self.cv.notify_all();
    }

    pub fn request_restart(&self) {
        self.state.lock().unwrap().restart = true;
    }

    /// Blocks until not paused or exit is requested. Returns `false` if the
    /// caller should exit.
    pub fn wait_until_runnable(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        while state.paused && !state.exit {
            state = self.cv.wait(state).unwrap();
        }
        !state.exit
    }

    /// Consumes a pending restart request, if any.
    pub fn take_restart(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.restart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;

    fn tiny_model() -> Model {
        Model::new(&ModelConfig { board_in: 2, board_out: 2, card_in: 2, card_out: 2, trunk_hidden: vec![2], trunk_out: 2, card_head_hidden: vec![2] })
    }

    #[test]
    fn publish_bumps_generation_unless_replacement_pending() {
        let slot = ModelSlot::new("duel", tiny_model(), 4);
        assert_eq!(slot.name(), "duel#0");
        slot.publish(&tiny_model());
        assert_eq!(slot.name(), "duel#1");

        slot.request_replacement(tiny_model());
        slot.publish(&tiny_model());
        assert_eq!(slot.name(), "duel#1", "replacement adoption must not bump generation");
    }

    #[test]
    fn ring_wraps_at_configured_size() {
        let slot = ModelSlot::new("duel", tiny_model(), 2);
        slot.publish(&tiny_model());
        slot.publish(&tiny_model());
        slot.publish(&tiny_model());
        assert_eq!(slot.ring_snapshot().len(), 2);
    }

    #[test]
    fn thread_control_wait_returns_false_after_exit() {
        let ctl = ThreadControl::new();
        ctl.pause();
        ctl.request_exit();
        assert!(!ctl.wait_until_runnable());
    }
}
