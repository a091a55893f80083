//! Slagdeteksjon med hysterese.
//!
//! Idle → Swinging når magnitude > terskel og cooldown er ute.
//! Swinging → Idle når magnitude < terskel * hysterese; da sendes ett
//! `ShotEvent` med toppverdier for vinduet.

use log::debug;

use crate::models::{MotionSample, ShotEvent, ShotKind};
use crate::types::DetectorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Swinging,
}

/// Det klassifiseringen får se av ett slag.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwingWindow {
    pub start: f64,
    pub end: f64,
    pub peak_magnitude: f64,
    pub peak_angular_velocity: f64,
    /// Summert fortegnsgyro per akse over vinduet
    pub gyro_sum: [f64; 3],
    pub samples: u32,
}

/// Strategi for forehand/backhand. Regelen er ikke fastsatt, så den plugges inn.
pub trait SwingClassifier: Send {
    fn classify(&self, window: &SwingWindow) -> ShotKind;
}

/// Default: klassifiserer ingenting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unclassified;

impl SwingClassifier for Unclassified {
    fn classify(&self, _window: &SwingWindow) -> ShotKind {
        ShotKind::Unclassified
    }
}

impl<F> SwingClassifier for F
where
    F: Fn(&SwingWindow) -> ShotKind + Send,
{
    fn classify(&self, window: &SwingWindow) -> ShotKind {
        self(window)
    }
}

/// Haptisk "tick" når et slag starter.
pub trait Haptics: Send {
    fn tick(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn tick(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShotCounters {
    pub shots: u32,
    pub forehand: u32,
    pub backhand: u32,
    pub unclassified: u32,
}

impl ShotCounters {
    fn count(&mut self, kind: ShotKind) {
        self.shots += 1;
        match kind {
            ShotKind::Forehand => self.forehand += 1,
            ShotKind::Backhand => self.backhand += 1,
            ShotKind::Unclassified => self.unclassified += 1,
        }
    }
}

pub struct ShotDetector {
    config: DetectorConfig,
    state: DetectorState,
    last_shot_time: Option<f64>,
    window: SwingWindow,
    counters: ShotCounters,
    classifier: Box<dyn SwingClassifier>,
    haptics: Box<dyn Haptics>,
    haptics_enabled: bool,
}

impl ShotDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_strategy(config, Box::new(Unclassified), Box::new(NoHaptics))
    }

    pub fn with_strategy(
        mut config: DetectorConfig,
        classifier: Box<dyn SwingClassifier>,
        haptics: Box<dyn Haptics>,
    ) -> Self {
        config.sensitivity = config.clamped_sensitivity(config.sensitivity);
        Self {
            config,
            state: DetectorState::Idle,
            last_shot_time: None,
            window: SwingWindow::default(),
            counters: ShotCounters::default(),
            classifier,
            haptics,
            haptics_enabled: true,
        }
    }

    pub fn set_haptics_enabled(&mut self, enabled: bool) {
        self.haptics_enabled = enabled;
    }

    /// Ny følsomhet; verdier utenfor skalaen klemmes.
    pub fn set_sensitivity(&mut self, value: f64) {
        self.config.sensitivity = self.config.clamped_sensitivity(value);
    }

    pub fn sensitivity(&self) -> f64 {
        self.config.sensitivity
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn counters(&self) -> ShotCounters {
        self.counters
    }

    pub fn last_shot_time(&self) -> Option<f64> {
        self.last_shot_time
    }

    /// Kun magnitude (uten gyro). Toppvinkelhastighet blir 0.
    pub fn observe(&mut self, magnitude: f64, now: f64) -> Option<ShotEvent> {
        self.step(magnitude, None, now)
    }

    pub fn observe_sample(&mut self, sample: &MotionSample) -> Option<ShotEvent> {
        self.step(sample.magnitude, Some(sample), sample.t)
    }

    /// Lukker et åpent slag ved øktslutt.
    pub fn finish(&mut self, now: f64) -> Option<ShotEvent> {
        match self.state {
            DetectorState::Swinging => Some(self.close_swing(now)),
            DetectorState::Idle => None,
        }
    }

    /// Nullstiller mellom økter (beholder konfig og strategi).
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.last_shot_time = None;
        self.window = SwingWindow::default();
        self.counters = ShotCounters::default();
    }

    fn step(&mut self, magnitude: f64, sample: Option<&MotionSample>, now: f64) -> Option<ShotEvent> {
        // NaN fra sensoren behandles som hvile
        let magnitude = if magnitude.is_finite() { magnitude } else { 0.0 };

        match self.state {
            DetectorState::Idle => {
                let cooled = match self.last_shot_time {
                    Some(last) => now - last > self.config.cooldown_sec,
                    None => true,
                };
                if magnitude > self.config.sensitivity && cooled {
                    self.state = DetectorState::Swinging;
                    self.last_shot_time = Some(now);
                    self.window = SwingWindow { start: now, end: now, ..Default::default() };
                    self.accumulate(magnitude, sample);
                    if self.haptics_enabled {
                        self.haptics.tick();
                    }
                    debug!("swing start t={:.3} mag={:.2}", now, magnitude);
                }
                None
            }
            DetectorState::Swinging => {
                if magnitude < self.config.sensitivity * self.config.hysteresis_factor {
                    Some(self.close_swing(now))
                } else {
                    self.accumulate(magnitude, sample);
                    self.window.end = now;
                    None
                }
            }
        }
    }

    fn accumulate(&mut self, magnitude: f64, sample: Option<&MotionSample>) {
        let w = &mut self.window;
        w.peak_magnitude = w.peak_magnitude.max(magnitude);
        if let Some(s) = sample {
            let omega = s.angular_velocity();
            if omega.is_finite() {
                w.peak_angular_velocity = w.peak_angular_velocity.max(omega);
            }
            w.gyro_sum[0] += s.gyro.x;
            w.gyro_sum[1] += s.gyro.y;
            w.gyro_sum[2] += s.gyro.z;
        }
        w.samples += 1;
    }

    fn close_swing(&mut self, now: f64) -> ShotEvent {
        self.state = DetectorState::Idle;
        self.window.end = now;
        let w = self.window;
        let kind = self.classifier.classify(&w);
        self.counters.count(kind);

        let event = ShotEvent {
            t: w.start,
            peak_magnitude: w.peak_magnitude,
            peak_angular_velocity: w.peak_angular_velocity,
            duration: (now - w.start).max(0.0),
            kind,
        };
        debug!(
            "swing end t={:.3} kind={} peak={:.2} dur={:.3}",
            now, kind, event.peak_magnitude, event.duration
        );
        event
    }
}
