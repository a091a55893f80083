//! Meldinger mellom klokke og telefon.
//!
//! Internt en lukket enum med typede felt; på tråden et flatt
//! streng→streng-kart. Ukjente nøkler ignoreres og manglende nøkler gir
//! `None`, så eldre og nyere versjoner kan snakke sammen.

use std::collections::BTreeMap;

use log::debug;
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::models::SessionSummary;
use crate::types::UserSettings;

pub type Payload = BTreeMap<String, String>;

pub mod keys {
    pub const TYPE: &str = "type";

    pub const SHOT_COUNT: &str = "shotCount";
    pub const DURATION_SEC: &str = "durationSec";
    pub const HEART_RATE: &str = "heartRate";
    pub const AVG_HEART_RATE: &str = "avgHeartRate";
    pub const TIMESTAMP_ISO: &str = "timestampISO";
    pub const FOREHAND_COUNT: &str = "forehandCount";
    pub const BACKHAND_COUNT: &str = "backhandCount";
    pub const UNCLASSIFIED_COUNT: &str = "unclassifiedCount";
    pub const FASTEST_SWING: &str = "fastestSwing";

    pub const SENSITIVITY: &str = "sensitivity";
    pub const COOLDOWN: &str = "cooldown";
    pub const HAPTICS_ENABLED: &str = "hapticsEnabled";
    pub const HR_ENABLED: &str = "hrEnabled";
    pub const HEIGHT_IN_INCHES: &str = "heightInInches";

    pub const SESSION_KEYS: [&str; 9] = [
        SHOT_COUNT, DURATION_SEC, HEART_RATE, AVG_HEART_RATE, TIMESTAMP_ISO,
        FOREHAND_COUNT, BACKHAND_COUNT, UNCLASSIFIED_COUNT, FASTEST_SWING,
    ];
    pub const SETTINGS_KEYS: [&str; 5] = [SENSITIVITY, COOLDOWN, HAPTICS_ENABLED, HR_ENABLED, HEIGHT_IN_INCHES];
}

/// Delvis sammendrag; `None` betyr "ikke med i meldingen".
///
/// Pulsfeltene kan også nullstilles: `Some(None)` går over tråden som tom
/// streng, så en økt uten puls ikke arver forrige økts verdi hos mottaker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionPatch {
    pub timestamp_iso: Option<String>,
    pub duration_sec: Option<f64>,
    pub heart_rate: Option<Option<f64>>,
    pub avg_heart_rate: Option<Option<f64>>,
    pub shot_count: Option<u32>,
    pub forehand_count: Option<u32>,
    pub backhand_count: Option<u32>,
    pub unclassified_count: Option<u32>,
    pub fastest_swing: Option<f64>,
}

impl SessionPatch {
    pub fn from_summary(s: &SessionSummary) -> Self {
        Self {
            timestamp_iso: Some(s.timestamp_iso.clone()),
            duration_sec: Some(s.duration_sec),
            heart_rate: Some(s.heart_rate),
            avg_heart_rate: Some(s.avg_heart_rate),
            shot_count: Some(s.shot_count),
            forehand_count: Some(s.forehand_count),
            backhand_count: Some(s.backhand_count),
            unclassified_count: Some(s.unclassified_count),
            fastest_swing: Some(s.fastest_swing),
        }
    }

    /// Felt-for-felt merge; manglende felt beholder forrige verdi.
    pub fn apply_to(&self, s: &mut SessionSummary) {
        if let Some(v) = &self.timestamp_iso { s.timestamp_iso = v.clone(); }
        if let Some(v) = self.duration_sec { s.duration_sec = v; }
        if let Some(v) = self.heart_rate { s.heart_rate = v; }
        if let Some(v) = self.avg_heart_rate { s.avg_heart_rate = v; }
        if let Some(v) = self.shot_count { s.shot_count = v; }
        if let Some(v) = self.forehand_count { s.forehand_count = v; }
        if let Some(v) = self.backhand_count { s.backhand_count = v; }
        if let Some(v) = self.unclassified_count { s.unclassified_count = v; }
        if let Some(v) = self.fastest_swing { s.fastest_swing = v; }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettingsPatch {
    pub sensitivity: Option<f64>,
    pub cooldown_sec: Option<f64>,
    pub haptics_enabled: Option<bool>,
    pub hr_enabled: Option<bool>,
    pub height_in_inches: Option<f64>,
}

impl SettingsPatch {
    pub fn from_settings(s: &UserSettings) -> Self {
        Self {
            sensitivity: Some(s.sensitivity),
            cooldown_sec: Some(s.cooldown_sec),
            haptics_enabled: Some(s.haptics_enabled),
            hr_enabled: Some(s.hr_enabled),
            height_in_inches: Some(s.height_in_inches),
        }
    }

    pub fn apply_to(&self, s: &mut UserSettings) {
        if let Some(v) = self.sensitivity { s.sensitivity = v; }
        if let Some(v) = self.cooldown_sec { s.cooldown_sec = v; }
        if let Some(v) = self.haptics_enabled { s.haptics_enabled = v; }
        if let Some(v) = self.hr_enabled { s.hr_enabled = v; }
        if let Some(v) = self.height_in_inches { s.height_in_inches = v; }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    SessionStart,
    SessionUpdate(SessionPatch),
    SettingsRequest,
    SettingsUpdate(SettingsPatch),
}

impl SyncMessage {
    pub fn type_tag(&self) -> &'static str {
        match self {
            SyncMessage::SessionStart => "sessionStart",
            SyncMessage::SessionUpdate(_) => "sessionUpdate",
            SyncMessage::SettingsRequest => "settingsRequest",
            SyncMessage::SettingsUpdate(_) => "settingsUpdate",
        }
    }

    pub fn to_payload(&self) -> Payload {
        let mut p = Payload::new();
        p.insert(keys::TYPE.into(), self.type_tag().into());
        match self {
            SyncMessage::SessionStart | SyncMessage::SettingsRequest => {}
            SyncMessage::SessionUpdate(u) => {
                put(&mut p, keys::TIMESTAMP_ISO, u.timestamp_iso.clone());
                put(&mut p, keys::DURATION_SEC, u.duration_sec);
                put_clearable(&mut p, keys::HEART_RATE, u.heart_rate);
                put_clearable(&mut p, keys::AVG_HEART_RATE, u.avg_heart_rate);
                put(&mut p, keys::SHOT_COUNT, u.shot_count);
                put(&mut p, keys::FOREHAND_COUNT, u.forehand_count);
                put(&mut p, keys::BACKHAND_COUNT, u.backhand_count);
                put(&mut p, keys::UNCLASSIFIED_COUNT, u.unclassified_count);
                put(&mut p, keys::FASTEST_SWING, u.fastest_swing);
            }
            SyncMessage::SettingsUpdate(s) => {
                put(&mut p, keys::SENSITIVITY, s.sensitivity);
                put(&mut p, keys::COOLDOWN, s.cooldown_sec);
                put(&mut p, keys::HAPTICS_ENABLED, s.haptics_enabled);
                put(&mut p, keys::HR_ENABLED, s.hr_enabled);
                put(&mut p, keys::HEIGHT_IN_INCHES, s.height_in_inches);
            }
        }
        p
    }

    /// Tolerant mapping fra tråd-kart. Mangler `type` utledes typen fra kjente nøkler.
    pub fn from_payload(p: &Payload) -> Result<Self> {
        let tag = match p.get(keys::TYPE) {
            Some(t) => t.trim().to_string(),
            None if keys::SESSION_KEYS.iter().any(|k| p.contains_key(*k)) => "sessionUpdate".into(),
            None if keys::SETTINGS_KEYS.iter().any(|k| p.contains_key(*k)) => "settingsUpdate".into(),
            None => return Err(CoreError::PayloadUnparseable("no type and no recognized keys".into())),
        };

        match tag.as_str() {
            "sessionStart" => Ok(SyncMessage::SessionStart),
            "settingsRequest" => Ok(SyncMessage::SettingsRequest),
            "sessionUpdate" => Ok(SyncMessage::SessionUpdate(SessionPatch {
                timestamp_iso: p.get(keys::TIMESTAMP_ISO).cloned(),
                duration_sec: get_f64(p, keys::DURATION_SEC),
                heart_rate: get_clearable_f64(p, keys::HEART_RATE),
                avg_heart_rate: get_clearable_f64(p, keys::AVG_HEART_RATE),
                shot_count: get_u32(p, keys::SHOT_COUNT),
                forehand_count: get_u32(p, keys::FOREHAND_COUNT),
                backhand_count: get_u32(p, keys::BACKHAND_COUNT),
                unclassified_count: get_u32(p, keys::UNCLASSIFIED_COUNT),
                fastest_swing: get_f64(p, keys::FASTEST_SWING),
            })),
            "settingsUpdate" => Ok(SyncMessage::SettingsUpdate(SettingsPatch {
                sensitivity: get_f64(p, keys::SENSITIVITY),
                cooldown_sec: get_f64(p, keys::COOLDOWN),
                haptics_enabled: get_bool(p, keys::HAPTICS_ENABLED),
                hr_enabled: get_bool(p, keys::HR_ENABLED),
                height_in_inches: get_f64(p, keys::HEIGHT_IN_INCHES),
            })),
            other => Err(CoreError::PayloadUnparseable(format!("unknown message type '{other}'"))),
        }
    }
}

fn put<T: ToString>(p: &mut Payload, key: &str, value: Option<T>) {
    if let Some(v) = value {
        p.insert(key.to_string(), v.to_string());
    }
}

fn put_clearable(p: &mut Payload, key: &str, value: Option<Option<f64>>) {
    match value {
        Some(Some(v)) => p.insert(key.to_string(), v.to_string()),
        Some(None) => p.insert(key.to_string(), String::new()),
        None => None,
    };
}

/// Tom streng nullstiller feltet; ugyldig tall ignoreres som før.
fn get_clearable_f64(p: &Payload, key: &str) -> Option<Option<f64>> {
    if p.get(key)?.trim().is_empty() {
        return Some(None);
    }
    get_f64(p, key).map(Some)
}

fn get_f64(p: &Payload, key: &str) -> Option<f64> {
    let raw = p.get(key)?;
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            debug!("ignoring {}={:?}", key, raw);
            None
        }
    }
}

fn get_u32(p: &Payload, key: &str) -> Option<u32> {
    let raw = p.get(key)?.trim();
    // telleren kan komme som "12.0" fra eldre klienter
    raw.parse::<u32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
            .map(|v| v as u32)
    })
}

fn get_bool(p: &Payload, key: &str) -> Option<bool> {
    match p.get(key)?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Payload → JSON-bytes for linken.
pub fn encode_payload(p: &Payload) -> Result<Vec<u8>> {
    serde_json::to_vec(p).map_err(|e| CoreError::PayloadUnparseable(e.to_string()))
}

/// JSON-objekt → Payload. Tall og bool gjøres om til strenger; null og
/// nøstede verdier hoppes over.
pub fn decode_payload(bytes: &[u8]) -> Result<Payload> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    let map: Map<String, Value> = serde_path_to_error::deserialize(de)
        .map_err(|e| CoreError::PayloadUnparseable(format!("{} at {}", e.inner(), e.path())))?;

    let mut out = Payload::new();
    for (k, v) in map {
        let s = match v {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => continue,
        };
        out.insert(k, s);
    }
    Ok(out)
}
