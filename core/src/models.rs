use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euklidsk norm
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Rå avlesning fra bevegelsessensorene (uten puls).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub t: f64,    // sek fra øktstart
    pub acc: Vec3, // lineær akselerasjon (g)
    pub gyro: Vec3, // rotasjonshastighet (rad/s)
}

/// Ett bevegelsessample slik det lagres. Immutabelt når det først er laget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub t: f64,
    pub magnitude: f64,
    pub acc: Vec3,
    pub gyro: Vec3,
    pub heart_rate: Option<f64>, // bpm
}

impl MotionSample {
    pub fn from_reading(reading: RawReading, heart_rate: Option<f64>) -> Self {
        Self {
            t: reading.t,
            magnitude: reading.acc.norm(),
            acc: reading.acc,
            gyro: reading.gyro,
            heart_rate,
        }
    }

    pub fn angular_velocity(&self) -> f64 {
        self.gyro.norm()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotKind {
    Forehand,
    Backhand,
    Unclassified,
}

impl ShotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotKind::Forehand => "forehand",
            ShotKind::Backhand => "backhand",
            ShotKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ShotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ett detektert slag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotEvent {
    pub t: f64,                     // tidspunkt for trigger (sek)
    pub peak_magnitude: f64,        // g
    pub peak_angular_velocity: f64, // rad/s
    pub duration: f64,              // sek i Swinging
    pub kind: ShotKind,
}

impl ShotEvent {
    pub fn to_record(&self) -> SwingRecord {
        SwingRecord {
            timestamp: self.t,
            kind: self.kind,
            peak_magnitude: self.peak_magnitude,
            peak_angular_velocity: self.peak_angular_velocity,
            duration: self.duration,
        }
    }
}

/// Rad i den ferdige slag-fila. Skrives én gang, endres aldri.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingRecord {
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub kind: ShotKind,
    #[serde(rename = "peakMagnitude")]
    pub peak_magnitude: f64,
    #[serde(rename = "peakAngularVelocity")]
    pub peak_angular_velocity: f64,
    pub duration: f64,
}

/// Sammendrag for en ferdig økt. Bygges én gang ved stopp.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub timestamp_iso: String,
    pub duration_sec: f64,
    pub heart_rate: Option<f64>,
    pub avg_heart_rate: Option<f64>,
    pub shot_count: u32,
    pub forehand_count: u32,
    pub backhand_count: u32,
    pub unclassified_count: u32,
    pub fastest_swing: f64, // mph
}

/// Metadata som følger en filoverføring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredFile {
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub origin_file_name: String,
}
