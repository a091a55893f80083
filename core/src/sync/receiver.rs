//! Mottakersiden (telefonen, eller klokka for innstillinger).
//!
//! All tilstand eies av én `SyncReceiver`; kall serialiseres av eieren.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::metrics::{swing_stats, SwingStats};
use crate::models::{FileMetadata, SessionSummary, SwingRecord};
use crate::recorder::read_swing_records;
use crate::sync::message::{decode_payload, Payload, SettingsPatch, SyncMessage};
use crate::telemetry::SyncCounters;
use crate::types::UserSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Inactive,
    Connected,
    Reachable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileState {
    Empty,
    Ready { file_name: String, path: PathBuf, rows: Vec<SwingRecord> },
    /// Fila kom fram men kunne ikke leses
    Unreadable { file_name: String, reason: String },
}

/// Fil levert av plattformen (ligger på et midlertidig sted).
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub path: PathBuf,
    pub metadata: FileMetadata,
}

pub struct SyncReceiver {
    dest_dir: PathBuf,
    live: SessionSummary,
    session_active: bool,
    settings: UserSettings,
    file: FileState,
    connectivity: ConnectivityState,
    counters: SyncCounters,
}

impl SyncReceiver {
    pub fn new(dest_dir: impl Into<PathBuf>, settings: UserSettings) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            live: SessionSummary::default(),
            session_active: false,
            settings,
            file: FileState::Empty,
            connectivity: ConnectivityState::Inactive,
            counters: SyncCounters::new(),
        }
    }

    pub fn live_summary(&self) -> &SessionSummary {
        &self.live
    }

    pub fn session_active(&self) -> bool {
        self.session_active
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    pub fn file_state(&self) -> &FileState {
        &self.file
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
    }

    pub fn counters(&self) -> &SyncCounters {
        &self.counters
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Ren informasjon; blokkerer aldri meldinger eller filer.
    pub fn on_connectivity(&mut self, state: ConnectivityState) {
        if state != self.connectivity {
            info!("connectivity {:?} -> {:?}", self.connectivity, state);
            self.connectivity = state;
        }
    }

    /// Rå bytes fra linken. Ugyldig payload logges og ignoreres.
    pub fn on_bytes(&mut self, bytes: &[u8]) -> Option<SyncMessage> {
        match decode_payload(bytes) {
            Ok(p) => self.on_payload(&p),
            Err(e) => {
                self.reject(e);
                None
            }
        }
    }

    pub fn on_payload(&mut self, payload: &Payload) -> Option<SyncMessage> {
        match SyncMessage::from_payload(payload) {
            Ok(msg) => self.on_message(msg),
            Err(e) => {
                self.reject(e);
                None
            }
        }
    }

    fn reject(&mut self, e: CoreError) {
        self.counters.payloads_rejected.inc();
        warn!("ignoring payload: {}", e);
    }

    /// Returnerer et eventuelt svar til motparten.
    pub fn on_message(&mut self, message: SyncMessage) -> Option<SyncMessage> {
        match message {
            SyncMessage::SessionStart => {
                self.session_active = true;
                info!("companion session started");
                None
            }
            SyncMessage::SessionUpdate(patch) => {
                patch.apply_to(&mut self.live);
                debug!("live summary now {:?}", self.live);
                None
            }
            SyncMessage::SettingsRequest => {
                Some(SyncMessage::SettingsUpdate(SettingsPatch::from_settings(&self.settings)))
            }
            SyncMessage::SettingsUpdate(patch) => {
                patch.apply_to(&mut self.settings);
                info!("settings updated: {:?}", self.settings);
                None
            }
        }
    }

    /// Installerer fila (kopier → bytt), og parser den.
    /// Feil i installasjonen returneres slik at avsender kan prøve igjen;
    /// parsefeil gir `FileState::Unreadable`.
    pub fn on_file(&mut self, incoming: &IncomingFile) -> Result<&FileState> {
        let name = sanitize_file_name(&incoming.metadata.file_name)?;
        fs::create_dir_all(&self.dest_dir)?;

        let dest = self.dest_dir.join(&name);
        let tmp = self.dest_dir.join(format!(".{name}.incoming"));

        if let Err(e) = fs::copy(&incoming.path, &tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(CoreError::TransferFailed(format!("copy {}: {}", incoming.path.display(), e)));
        }
        // rename bytter ut en eksisterende fil i ett steg; feiler den står
        // den gamle fila urørt
        if let Err(e) = fs::rename(&tmp, &dest) {
            let _ = fs::remove_file(&tmp);
            return Err(CoreError::TransferFailed(format!("install {}: {}", dest.display(), e)));
        }
        info!("installed {}", dest.display());

        self.file = match read_swing_records(&dest) {
            Ok(rows) => FileState::Ready { file_name: name, path: dest, rows },
            Err(e) => {
                warn!("{} unreadable: {}", name, e);
                FileState::Unreadable { file_name: name, reason: e.to_string() }
            }
        };
        Ok(&self.file)
    }

    /// Aggregater over siste leste fil; `None` hvis ingen lesbar fil.
    pub fn stats(&self) -> Option<SwingStats> {
        match &self.file {
            FileState::Ready { rows, .. } => Some(swing_stats(rows, self.settings.height_in_inches)),
            _ => None,
        }
    }
}

/// Kun én path-komponent; ingen `..` eller kataloger.
fn sanitize_file_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0');
    if ok {
        Ok(name.to_string())
    } else {
        Err(CoreError::PayloadUnparseable(format!("bad file name '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_like_names() {
        assert!(sanitize_file_name("../etc/passwd").is_err());
        assert!(sanitize_file_name("  ").is_err());
        assert_eq!(sanitize_file_name(" swings_1.csv ").unwrap(), "swings_1.csv");
    }

    #[test]
    fn settings_request_gets_reply() {
        let mut r = SyncReceiver::new("unused", UserSettings { height_in_inches: 66.0, ..Default::default() });
        match r.on_message(SyncMessage::SettingsRequest) {
            Some(SyncMessage::SettingsUpdate(p)) => assert_eq!(p.height_in_inches, Some(66.0)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
