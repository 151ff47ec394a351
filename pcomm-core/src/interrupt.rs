//!
//! Process-wide shutdown signalling.
//!
//! An interrupt can be cloned freely and handed to every component that
//! needs to stop.  Triggering any clone drops the shared sender so every
//! receiver observes a disconnect, which makes the interrupt usable inside
//! `crossbeam::select!` alongside data channels.
//!

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

/// A cloneable, one-shot shutdown flag.
#[derive(Clone)]
pub struct Interrupt {
    /// Whether the interrupt has been triggered
    triggered: Arc<AtomicBool>,
    /// The sending half that is dropped when the interrupt is triggered
    tx: Arc<Mutex<Option<Sender<()>>>>,
    /// A receiver that disconnects when the interrupt is triggered
    rx: Receiver<()>,
}

impl Default for Interrupt {
    fn default() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }
}

impl Interrupt {
    /// Create a new untriggered interrupt
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the interrupt.  Triggering more than once has no further effect.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.tx.lock().take();
    }

    /// Check whether the interrupt has been triggered
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// A receiver that never yields a value and disconnects once the
    /// interrupt is triggered
    pub fn receiver(&self) -> Receiver<()> {
        self.rx.clone()
    }
}
