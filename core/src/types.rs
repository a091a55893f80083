use serde::{Deserialize, Serialize};

/// Nedre/øvre grense for følsomhetsskalaen (g).
pub const SENSITIVITY_MIN: f64 = 0.1;
pub const SENSITIVITY_MAX: f64 = 3.0;

/// Rader per buffer før flush til disk. Ca. 5 s rådata ved 50 Hz.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub sensitivity: f64,       // trigger-terskel (g)
    pub min_sensitivity: f64,
    pub max_sensitivity: f64,
    pub cooldown_sec: f64,      // min. avstand mellom slag
    pub hysteresis_factor: f64, // fall-terskel = sensitivity * faktor
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sensitivity: (SENSITIVITY_MIN + SENSITIVITY_MAX) / 2.0,
            min_sensitivity: SENSITIVITY_MIN,
            max_sensitivity: SENSITIVITY_MAX,
            cooldown_sec: 0.3,
            hysteresis_factor: 0.7,
        }
    }
}

impl DetectorConfig {
    /// Følsomhet klemt til konfigurerte grenser.
    pub fn clamped_sensitivity(&self, value: f64) -> f64 {
        let (lo, hi) = if self.min_sensitivity <= self.max_sensitivity {
            (self.min_sensitivity, self.max_sensitivity)
        } else {
            (SENSITIVITY_MIN, SENSITIVITY_MAX)
        };
        if value.is_finite() {
            value.clamp(lo, hi)
        } else {
            (lo + hi) / 2.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub buffer_capacity: usize,
    pub record_raw_samples: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            record_raw_samples: true,
        }
    }
}

/// Brukerinnstillinger fra innstillingslageret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub height_in_inches: f64,
    pub sensitivity: f64,
    pub cooldown_sec: f64,
    pub haptics_enabled: bool,
    pub hr_enabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        let d = DetectorConfig::default();
        Self {
            height_in_inches: 70.0,
            sensitivity: d.sensitivity,
            cooldown_sec: d.cooldown_sec,
            haptics_enabled: true,
            hr_enabled: true,
        }
    }
}

impl UserSettings {
    /// Detektor-konfig der brukerens følsomhet og cooldown overstyrer basen.
    pub fn detector_config(&self, base: &DetectorConfig) -> DetectorConfig {
        let mut cfg = *base;
        cfg.sensitivity = base.clamped_sensitivity(self.sensitivity);
        if self.cooldown_sec.is_finite() && self.cooldown_sec >= 0.0 {
            cfg.cooldown_sec = self.cooldown_sec;
        }
        cfg
    }
}

/// Samlet kjernekonfig. Alle felt er valgfrie; manglende gir default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreCfg {
    pub detector: Option<DetectorConfig>,
    pub recorder: Option<RecorderConfig>,
    pub channel_capacity: Option<usize>,
}

impl CoreCfg {
    pub fn detector(&self) -> DetectorConfig {
        self.detector.unwrap_or_default()
    }

    pub fn recorder(&self) -> RecorderConfig {
        self.recorder.unwrap_or_default()
    }

    /// Kapasitet på sensor-kanalen (produsent → konsument).
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(512).max(1)
    }
}
