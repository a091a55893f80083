//! Avsendersiden av synken.
//!
//! Nåbar link → direkte melding. Feiler den, eller linken er nede, går
//! meldingen til application context (siste verdi per nøkkel vinner).
//! Filer køes separat og prøves på nytt; avsender venter aldri på kvittering.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::models::{FileMetadata, SessionSummary, TransferredFile};
use crate::recorder::FinalizedRecord;
use crate::sync::link::{Link, LinkState, Reachability};
use crate::sync::message::{Payload, SessionPatch, SyncMessage};
use crate::telemetry::SyncCounters;

/// Hvordan en melding ble levert (for UI: "tilkoblet" / "ikke tilkoblet").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Direct,
    Context,
    /// Ligger i context-køen til linken kommer tilbake
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// "Forbereder fil…" i UI
    Preparing { attempts: u32 },
    Delivered,
    NotQueued,
}

#[derive(Debug, Clone)]
struct QueuedTransfer {
    file: TransferredFile,
    metadata: FileMetadata,
    attempts: u32,
}

#[derive(Debug, Default)]
struct ContextEntry {
    latest: Payload,
    pending: bool,
}

/// Hvor mange leverte filnavn vi husker for `transfer_status`.
pub const DELIVERED_HISTORY: usize = 64;

#[derive(Debug, Default)]
struct TransferQueue {
    queue: VecDeque<QueuedTransfer>,
    // filnavn → forsøk, mens linken holder på med fila
    in_flight: HashMap<String, u32>,
    // eldste først, maks DELIVERED_HISTORY
    delivered: VecDeque<String>,
}

impl TransferQueue {
    /// Tar ut alt som ikke allerede er under overføring, og merker det.
    fn take_ready(&mut self, skip: &HashSet<String>) -> Vec<QueuedTransfer> {
        let mut ready = Vec::new();
        let mut waiting = VecDeque::new();
        for q in self.queue.drain(..) {
            let name = &q.metadata.file_name;
            if self.in_flight.contains_key(name) || skip.contains(name) {
                waiting.push_back(q);
            } else {
                self.in_flight.insert(name.clone(), q.attempts + 1);
                ready.push(q);
            }
        }
        self.queue = waiting;
        ready
    }

    fn mark_delivered(&mut self, name: &str) {
        self.delivered.retain(|n| n != name);
        self.delivered.push_back(name.to_string());
        while self.delivered.len() > DELIVERED_HISTORY {
            self.delivered.pop_front();
        }
    }
}

pub struct SyncTransport {
    link: Arc<dyn Link>,
    reachability: Reachability,
    // én entry per meldingstype, nøkkelvis merget
    context: Mutex<BTreeMap<&'static str, ContextEntry>>,
    transfers: Mutex<TransferQueue>,
    counters: SyncCounters,
}

impl SyncTransport {
    pub fn new(link: Arc<dyn Link>, reachability: Reachability) -> Self {
        Self {
            link,
            reachability,
            context: Mutex::new(BTreeMap::new()),
            transfers: Mutex::new(TransferQueue::default()),
            counters: SyncCounters::new(),
        }
    }

    pub fn reachability(&self) -> Reachability {
        self.reachability.clone()
    }

    pub fn link_state(&self) -> LinkState {
        self.reachability.is_reachable().into()
    }

    pub fn counters(&self) -> &SyncCounters {
        &self.counters
    }

    /// Plattform-callback. Ved overgang til nåbar prøves køene på nytt.
    pub fn on_reachability_changed(&self, reachable: bool) {
        let was = self.reachability.set(reachable);
        info!("link {:?} -> {:?}", LinkState::from(was), LinkState::from(reachable));
        if reachable && !was {
            self.pump();
        }
    }

    pub fn send(&self, message: &SyncMessage) -> Delivery {
        let payload = message.to_payload();

        if self.reachability.is_reachable() {
            match self.link.send_message(&payload) {
                Ok(()) => {
                    self.counters.direct_sent.inc();
                    debug!("sent {} directly", message.type_tag());
                    return Delivery::Direct;
                }
                Err(e) => {
                    self.counters.send_failures.inc();
                    warn!("direct send of {} failed, falling back to context: {}", message.type_tag(), e);
                }
            }
        } else {
            debug!("link unreachable, {} goes to context", message.type_tag());
        }

        self.fallback(message.type_tag(), payload)
    }

    fn fallback(&self, tag: &'static str, payload: Payload) -> Delivery {
        self.counters.context_fallback.inc();
        let merged = {
            let mut ctx = self.context.lock();
            let entry = ctx.entry(tag).or_default();
            entry.latest.extend(payload);
            entry.pending = true;
            entry.latest.clone()
        };
        self.push_context(tag, merged)
    }

    fn push_context(&self, tag: &'static str, merged: Payload) -> Delivery {
        match self.link.update_context(&merged) {
            Ok(()) => {
                let mut ctx = self.context.lock();
                if let Some(entry) = ctx.get_mut(tag) {
                    // nyere verdier kan ha kommet inn mens vi sendte
                    if entry.latest == merged {
                        entry.pending = false;
                    }
                }
                Delivery::Context
            }
            Err(e) => {
                self.counters.send_failures.inc();
                warn!("context update for {} deferred: {}", tag, e);
                Delivery::Deferred
            }
        }
    }

    /// Har vi context som ennå ikke er levert?
    pub fn has_pending_context(&self) -> bool {
        self.context.lock().values().any(|e| e.pending)
    }

    /// Køer fila for overføring. Samme filnavn erstatter en ventende overføring.
    /// Er fila under overføring nå, venter den nye versjonen til den forrige
    /// er levert; det er aldri mer enn én overføring per fil om gangen.
    pub fn send_file(&self, path: &Path, metadata: FileMetadata) -> TransferStatus {
        let size_bytes = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) => {
                warn!("cannot queue {}: {}", path.display(), e);
                return TransferStatus::NotQueued;
            }
        };
        let file = TransferredFile {
            local_path: path.to_path_buf(),
            size_bytes,
            origin_file_name: metadata.file_name.clone(),
        };

        {
            let mut t = self.transfers.lock();
            t.delivered.retain(|n| *n != metadata.file_name);
            t.queue.retain(|q| q.metadata.file_name != metadata.file_name);
            t.queue.push_back(QueuedTransfer { file, metadata: metadata.clone(), attempts: 0 });
        }
        self.counters.transfers_queued.inc();
        info!("queued transfer of {} ({} bytes)", metadata.file_name, size_bytes);

        self.pump_transfers();
        self.transfer_status(&metadata.file_name)
    }

    pub fn transfer_status(&self, file_name: &str) -> TransferStatus {
        let t = self.transfers.lock();
        if let Some(q) = t.queue.iter().find(|q| q.metadata.file_name == file_name) {
            TransferStatus::Preparing { attempts: q.attempts }
        } else if let Some(&attempts) = t.in_flight.get(file_name) {
            TransferStatus::Preparing { attempts }
        } else if t.delivered.iter().any(|n| n == file_name) {
            TransferStatus::Delivered
        } else {
            TransferStatus::NotQueued
        }
    }

    pub fn queued_transfers(&self) -> usize {
        self.transfers.lock().queue.len()
    }

    /// Prøver ventende context og filer på nytt.
    pub fn pump(&self) {
        let pending: Vec<(&'static str, Payload)> = self
            .context
            .lock()
            .iter()
            .filter(|(_, e)| e.pending)
            .map(|(tag, e)| (*tag, e.latest.clone()))
            .collect();
        for (tag, payload) in pending {
            self.push_context(tag, payload);
        }
        self.pump_transfers();
    }

    /// Overfører alt som er klart. Linken kalles uten lås. En fil som ble
    /// køet på nytt mens den var under overføring tas i neste runde;
    /// en fil som feilet i denne runden venter til neste `pump()`.
    fn pump_transfers(&self) {
        let mut failed_now = HashSet::new();
        loop {
            if !self.reachability.is_reachable() {
                return;
            }
            let batch = self.transfers.lock().take_ready(&failed_now);
            if batch.is_empty() {
                return;
            }

            for mut q in batch {
                q.attempts += 1;
                self.counters.transfer_attempts.inc();
                let result = self.link.transfer_file(&q.file, &q.metadata);

                let mut t = self.transfers.lock();
                t.in_flight.remove(&q.metadata.file_name);
                match result {
                    Ok(()) => {
                        self.counters.transfers_delivered.inc();
                        info!("transfer of {} handed to link", q.metadata.file_name);
                        t.mark_delivered(&q.metadata.file_name);
                    }
                    Err(e) => {
                        self.counters.transfer_failures.inc();
                        warn!("transfer of {} failed (attempt {}): {}", q.metadata.file_name, q.attempts, e);
                        failed_now.insert(q.metadata.file_name.clone());
                        // en nyere versjon kan ha blitt køet i mellomtiden
                        if !t.queue.iter().any(|n| n.metadata.file_name == q.metadata.file_name) {
                            t.queue.push_front(q);
                        }
                    }
                }
            }
        }
    }

    /// Sender sammendraget som melding og køer fila (hvis vi har en).
    pub fn publish_session(&self, summary: &SessionSummary, record: Option<&FinalizedRecord>) -> Delivery {
        let delivery = self.send(&SyncMessage::SessionUpdate(SessionPatch::from_summary(summary)));
        if let Some(rec) = record {
            let status = self.send_file(&rec.file_path, FileMetadata { file_name: rec.file_name() });
            debug!("session file status: {:?}", status);
        }
        delivery
    }
}
