//! Økt-løkka: produsenter → begrenset kanal → én konsument.
//!
//! Konsument-tråden eier detektor, recorder og pulsstatus alene, så ingen
//! sample eller tilstand muteres fra to tråder.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, SecondsFormat, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;

use crate::detector::{Haptics, NoHaptics, ShotDetector, SwingClassifier, Unclassified};
use crate::error::{CoreError, Result};
use crate::metrics::estimated_racket_head_speed;
use crate::models::{MotionSample, SessionSummary, ShotEvent};
use crate::recorder::{FinalizedRecord, SessionRecorder};
use crate::source::{Reading, SampleSource, Sampler, SamplerStats};
use crate::types::{CoreCfg, UserSettings};

/// Antall forsøk på å ferdigstille fila før vi gir opp og sender kun melding.
pub const FINALIZE_ATTEMPTS: u32 = 3;

enum SensorEvent {
    Reading(Reading),
    Stop,
}

/// Utfall av en ikke-blokkerende send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// Kanalen var full; avlesningen er tapt
    Dropped,
    /// Økta er stoppet; produsenten bør avslutte
    Closed,
}

/// Produsent-håndtak. Kan klones til timer- og puls-callbacks.
#[derive(Clone)]
pub struct SessionFeed {
    tx: Sender<SensorEvent>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl SessionFeed {
    fn new(tx: Sender<SensorEvent>) -> Self {
        Self { tx, dropped: Arc::new(AtomicU64::new(0)), closed: Arc::new(AtomicBool::new(false)) }
    }

    /// Blokkerende send. `false` hvis økta er stoppet eller konsumenten er borte.
    pub fn send(&self, reading: Reading) -> bool {
        !self.is_closed() && self.tx.send(SensorEvent::Reading(reading)).is_ok()
    }

    /// Ikke-blokkerende send for sampling-løkka; full kanal teller som drop.
    pub fn offer(&self, reading: Reading) -> Offer {
        if self.is_closed() {
            return Offer::Closed;
        }
        match self.tx.try_send(SensorEvent::Reading(reading)) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Offer::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Offer::Closed,
        }
    }

    /// Sann fra det øyeblikket `stop()` er kalt.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct SessionOptions {
    pub dir: PathBuf,
    pub cfg: CoreCfg,
    pub settings: UserSettings,
    pub classifier: Box<dyn SwingClassifier>,
    pub haptics: Box<dyn Haptics>,
    pub start_time: DateTime<Utc>,
}

impl SessionOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cfg: CoreCfg::default(),
            settings: UserSettings::default(),
            classifier: Box::new(Unclassified),
            haptics: Box::new(NoHaptics),
            start_time: Utc::now(),
        }
    }

    pub fn with_cfg(mut self, cfg: CoreCfg) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_settings(mut self, settings: UserSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn SwingClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_haptics(mut self, haptics: Box<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }
}

/// Resultatet av en ferdig økt. Bygges nøyaktig én gang.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub summary: SessionSummary,
    /// `None` hvis fila ikke kunne ferdigstilles; sammendraget er likevel gyldig
    pub record: Option<FinalizedRecord>,
    pub storage_error: Option<String>,
    pub dropped_readings: u64,
    /// Summert over samplere koblet til økta
    pub sampler: SamplerStats,
}

#[derive(Debug, Default)]
struct HeartRate {
    latest: Option<f64>,
    sum: f64,
    count: u32,
}

impl HeartRate {
    fn update(&mut self, bpm: f64) {
        if bpm.is_finite() && bpm > 0.0 {
            self.latest = Some(bpm);
            self.sum += bpm;
            self.count += 1;
        }
    }

    fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

struct Consumer {
    detector: ShotDetector,
    recorder: SessionRecorder,
    settings: UserSettings,
    started_at: DateTime<Utc>,
    heart_rate: HeartRate,
    last_t: f64,
    max_angular_velocity: f64,
}

impl Consumer {
    fn run(mut self, rx: Receiver<SensorEvent>) -> ConsumerOutput {
        for event in rx.iter() {
            match event {
                SensorEvent::Reading(Reading::Motion(raw)) => {
                    let hr = if self.settings.hr_enabled { self.heart_rate.latest } else { None };
                    let sample = MotionSample::from_reading(raw, hr);
                    if sample.t.is_finite() {
                        self.last_t = self.last_t.max(sample.t);
                    }
                    self.recorder.append_sample(&sample);
                    if let Some(ev) = self.detector.observe_sample(&sample) {
                        self.on_shot(&ev);
                    }
                }
                SensorEvent::Reading(Reading::HeartRate { bpm, .. }) => {
                    if self.settings.hr_enabled {
                        self.heart_rate.update(bpm);
                    }
                }
                SensorEvent::Stop => break,
            }
        }

        if let Some(ev) = self.detector.finish(self.last_t) {
            self.on_shot(&ev);
        }

        let mut result = self.recorder.stop();
        for attempt in 2..=FINALIZE_ATTEMPTS {
            match &result {
                Ok(_) => break,
                Err(e) => warn!("finalize attempt {} failed: {}", attempt - 1, e),
            }
            result = self.recorder.stop();
        }

        let summary = self.summary();
        (summary, result)
    }

    fn on_shot(&mut self, ev: &ShotEvent) {
        self.recorder.append_event(ev);
        if ev.peak_angular_velocity.is_finite() {
            self.max_angular_velocity = self.max_angular_velocity.max(ev.peak_angular_velocity);
        }
    }

    fn summary(&self) -> SessionSummary {
        let c = self.recorder.counters();
        SessionSummary {
            timestamp_iso: self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            duration_sec: c.duration_sec.max(self.last_t),
            heart_rate: self.heart_rate.latest,
            avg_heart_rate: self.heart_rate.average(),
            shot_count: c.shot_count,
            forehand_count: c.forehand_count,
            backhand_count: c.backhand_count,
            unclassified_count: c.unclassified_count,
            fastest_swing: estimated_racket_head_speed(self.max_angular_velocity, self.settings.height_in_inches),
        }
    }
}

type ConsumerOutput = (SessionSummary, std::result::Result<FinalizedRecord, CoreError>);

/// Eksplisitt konstruert økt; ingen globale managere.
pub struct SessionController {
    feed: SessionFeed,
    consumer: Option<JoinHandle<ConsumerOutput>>,
    samplers: Vec<Sampler>,
    started_at: DateTime<Utc>,
    outcome: OnceCell<SessionOutcome>,
}

impl SessionController {
    /// Starter en økt. Eneste fatale feil er at sensoren ikke er tilgjengelig.
    pub fn start<S: SampleSource + ?Sized>(source: &S, options: SessionOptions) -> Result<Self> {
        if !source.is_available() {
            return Err(CoreError::SensorUnavailable("motion sensors not available".into()));
        }

        let SessionOptions { dir, cfg, settings, classifier, haptics, start_time } = options;

        let detector_cfg = settings.detector_config(&cfg.detector());
        let mut detector = ShotDetector::with_strategy(detector_cfg, classifier, haptics);
        detector.set_haptics_enabled(settings.haptics_enabled);

        let mut recorder = SessionRecorder::new(&dir, cfg.recorder(), start_time);
        if let Err(e) = recorder.start() {
            // tellere og melding fungerer fortsatt uten fil
            warn!("recorder could not open storage, continuing without file: {}", e);
        }

        let (tx, rx) = bounded(cfg.channel_capacity());
        let consumer = Consumer {
            detector,
            recorder,
            settings,
            started_at: start_time,
            heart_rate: HeartRate::default(),
            last_t: 0.0,
            max_angular_velocity: 0.0,
        };

        let handle = thread::Builder::new()
            .name("session-consumer".into())
            .spawn(move || consumer.run(rx))?;

        info!("session started at {}", start_time);
        Ok(Self {
            feed: SessionFeed::new(tx),
            consumer: Some(handle),
            samplers: Vec::new(),
            started_at: start_time,
            outcome: OnceCell::new(),
        })
    }

    pub fn feed(&self) -> SessionFeed {
        self.feed.clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_stopped(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Knytter en sampling-timer til økta; `stop()` kansellerer den.
    /// Etter stopp kanselleres den med en gang.
    pub fn attach_sampler(&mut self, mut sampler: Sampler) {
        if self.is_stopped() {
            sampler.stop();
            return;
        }
        self.samplers.push(sampler);
    }

    /// Stopper økta, venter til recorderen har flushet, og returnerer utfallet.
    /// Timere stoppes før konsumenten, så ingen avlesning kommer etter stopp.
    /// Gjentatte kall gir samme utfall.
    pub fn stop(&mut self) -> &SessionOutcome {
        let feed = &self.feed;
        let consumer = &mut self.consumer;
        let samplers = &mut self.samplers;
        let started_at = self.started_at;

        self.outcome.get_or_init(|| {
            feed.close();
            let sampler = samplers.drain(..).fold(SamplerStats::default(), |acc, mut s| {
                let st = s.stop();
                SamplerStats { delivered: acc.delivered + st.delivered, dropped: acc.dropped + st.dropped }
            });
            // feiler bare hvis konsumenten allerede er ferdig
            let _ = feed.tx.send(SensorEvent::Stop);
            let joined = consumer.take().map(|h| h.join());
            let dropped_readings = feed.dropped();

            match joined {
                Some(Ok((summary, Ok(record)))) => {
                    debug!("session outcome: {:?}", summary);
                    SessionOutcome { summary, record: Some(record), storage_error: None, dropped_readings, sampler }
                }
                Some(Ok((summary, Err(e)))) => {
                    warn!("session file not finalized, summary only: {}", e);
                    SessionOutcome {
                        summary,
                        record: None,
                        storage_error: Some(e.to_string()),
                        dropped_readings,
                        sampler,
                    }
                }
                Some(Err(_)) | None => {
                    warn!("session consumer did not finish cleanly");
                    SessionOutcome {
                        summary: SessionSummary {
                            timestamp_iso: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                            ..Default::default()
                        },
                        record: None,
                        storage_error: Some("session consumer failed".into()),
                        dropped_readings,
                        sampler,
                    }
                }
            }
        })
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.outcome.get().is_none() {
            self.feed.close();
            let _ = self.feed.tx.send(SensorEvent::Stop);
        }
    }
}
