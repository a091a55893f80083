use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::models::{FileMetadata, TransferredFile};
use crate::sync::message::Payload;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("counterpart not reachable")]
    NotReachable,
    #[error("send failed: {0}")]
    Send(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
}

/// Plattformkanalen mellom enhetene.
///
/// `send_message` er den direkte lav-latens kanalen. `update_context` er
/// "siste verdi vinner"-kanalen som leveres når det passer plattformen.
/// `transfer_file` overleverer en fil til plattformens egen kø.
pub trait Link: Send + Sync {
    fn send_message(&self, payload: &Payload) -> Result<(), LinkError>;
    fn update_context(&self, payload: &Payload) -> Result<(), LinkError>;
    fn transfer_file(&self, file: &TransferredFile, metadata: &FileMetadata) -> Result<(), LinkError>;
}

/// Delt reachability-flagg; oppdateres fra plattform-callbacks.
#[derive(Debug, Clone, Default)]
pub struct Reachability(Arc<AtomicBool>);

impl Reachability {
    pub fn new(initial: bool) -> Self {
        Self(Arc::new(AtomicBool::new(initial)))
    }

    pub fn is_reachable(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returnerer forrige verdi.
    pub fn set(&self, reachable: bool) -> bool {
        self.0.swap(reachable, Ordering::AcqRel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unreachable,
    Reachable,
}

impl From<bool> for LinkState {
    fn from(reachable: bool) -> Self {
        if reachable { LinkState::Reachable } else { LinkState::Unreachable }
    }
}
