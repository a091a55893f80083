//! In-prosess link: klokke og telefon i samme prosess (CLI-replay og tester).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::models::{FileMetadata, TransferredFile};
use crate::sync::link::{Link, LinkError, Reachability};
use crate::sync::message::{encode_payload, keys, Payload, SyncMessage};
use crate::sync::receiver::{IncomingFile, SyncReceiver};

pub struct LoopbackLink {
    receiver: Arc<Mutex<SyncReceiver>>,
    reachability: Reachability,
    // siste context per meldingstype
    held_context: Mutex<BTreeMap<String, Payload>>,
    replies: Mutex<Vec<SyncMessage>>,
    fail_sends: AtomicBool,
    fail_transfers: AtomicU32,
}

impl LoopbackLink {
    pub fn new(receiver: Arc<Mutex<SyncReceiver>>, reachability: Reachability) -> Self {
        Self {
            receiver,
            reachability,
            held_context: Mutex::new(BTreeMap::new()),
            replies: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_transfers: AtomicU32::new(0),
        }
    }

    /// Direkte sendinger feiler så lenge flagget er satt.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Release);
    }

    /// De neste `n` overføringene feiler.
    pub fn fail_next_transfers(&self, n: u32) {
        self.fail_transfers.store(n, Ordering::Release);
    }

    /// Svar mottakeren har sendt tilbake (f.eks. SettingsUpdate).
    pub fn take_replies(&self) -> Vec<SyncMessage> {
        std::mem::take(&mut *self.replies.lock())
    }

    pub fn has_held_context(&self) -> bool {
        !self.held_context.lock().is_empty()
    }

    /// Leverer context som ble lagt igjen mens linken var nede.
    pub fn deliver_context(&self) -> bool {
        if !self.reachability.is_reachable() {
            return false;
        }
        let held = std::mem::take(&mut *self.held_context.lock());
        let any = !held.is_empty();
        for p in held.values() {
            self.deliver(p);
        }
        any
    }

    fn deliver(&self, payload: &Payload) {
        // via tråd-formatet, som på ekte
        let bytes = match encode_payload(payload) {
            Ok(b) => b,
            Err(e) => {
                debug!("loopback encode failed: {}", e);
                return;
            }
        };
        let reply = self.receiver.lock().on_bytes(&bytes);
        if let Some(r) = reply {
            self.replies.lock().push(r);
        }
    }
}

impl Link for LoopbackLink {
    fn send_message(&self, payload: &Payload) -> Result<(), LinkError> {
        if !self.reachability.is_reachable() {
            return Err(LinkError::NotReachable);
        }
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(LinkError::Send("injected failure".into()));
        }
        self.deliver_context();
        self.deliver(payload);
        Ok(())
    }

    fn update_context(&self, payload: &Payload) -> Result<(), LinkError> {
        // siste verdi vinner; leveres straks hvis mulig
        let tag = payload.get(keys::TYPE).cloned().unwrap_or_default();
        self.held_context.lock().insert(tag, payload.clone());
        self.deliver_context();
        Ok(())
    }

    fn transfer_file(&self, file: &TransferredFile, metadata: &FileMetadata) -> Result<(), LinkError> {
        if !self.reachability.is_reachable() {
            return Err(LinkError::NotReachable);
        }
        let injected = self
            .fail_transfers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(LinkError::Transfer("injected failure".into()));
        }
        let incoming = IncomingFile { path: file.local_path.clone(), metadata: metadata.clone() };
        self.receiver
            .lock()
            .on_file(&incoming)
            .map(|_| ())
            .map_err(|e| LinkError::Transfer(e.to_string()))
    }
}
