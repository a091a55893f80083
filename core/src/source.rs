//! Sensorkilder og sampling-løkka.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::models::RawReading;
use crate::recorder::{read_record, ParsedRecord};
use crate::session::{Offer, SessionFeed};

/// Én avlesning fra plattformen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Motion(RawReading),
    HeartRate { t: f64, bpm: f64 },
}

/// Rå sensorstrøm. `None` fra `next_reading` betyr at strømmen er slutt.
pub trait SampleSource: Send {
    fn is_available(&self) -> bool {
        true
    }

    fn next_reading(&mut self) -> Option<Reading>;
}

/// Spiller av ferdige avlesninger (tester, CLI-replay).
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    readings: VecDeque<Reading>,
}

impl ReplaySource {
    pub fn new(readings: impl IntoIterator<Item = Reading>) -> Self {
        Self { readings: readings.into_iter().collect() }
    }

    /// Leser en rådata-fil (ni kolonner). Puls sendes kun når den endrer seg.
    pub fn from_samples_csv(path: &Path) -> Result<Self> {
        let samples = match read_record(path)? {
            ParsedRecord::Samples(s) => s,
            ParsedRecord::Swings(_) => {
                return Err(CoreError::PayloadUnparseable(format!(
                    "{} is a swing file, expected raw samples",
                    path.display()
                )))
            }
        };

        let mut readings = VecDeque::with_capacity(samples.len());
        let mut last_hr: Option<f64> = None;
        for s in samples {
            if let Some(bpm) = s.heart_rate {
                if last_hr != Some(bpm) {
                    readings.push_back(Reading::HeartRate { t: s.t, bpm });
                    last_hr = Some(bpm);
                }
            }
            readings.push_back(Reading::Motion(RawReading { t: s.t, acc: s.acc, gyro: s.gyro }));
        }
        info!("replay source: {} readings from {}", readings.len(), path.display());
        Ok(Self { readings })
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl SampleSource for ReplaySource {
    fn next_reading(&mut self) -> Option<Reading> {
        self.readings.pop_front()
    }
}

/// Kilde som ikke finnes på enheten (f.eks. simulator uten gyro).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableSource;

impl SampleSource for UnavailableSource {
    fn is_available(&self) -> bool {
        false
    }

    fn next_reading(&mut self) -> Option<Reading> {
        None
    }
}

/// Mater hele kilden inn i økta med blokkerende send. Returnerer antall avlesninger.
pub fn replay<S: SampleSource + ?Sized>(source: &mut S, feed: &SessionFeed) -> Result<usize> {
    if !source.is_available() {
        return Err(CoreError::SensorUnavailable("source reports unavailable".into()));
    }
    let mut n = 0usize;
    while let Some(r) = source.next_reading() {
        if !feed.send(r) {
            warn!("session consumer gone after {} readings", n);
            break;
        }
        n += 1;
    }
    Ok(n)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub delivered: u64,
    pub dropped: u64,
}

/// Fast-rate sampling-tråd. Blokkerer aldri: full kanal → avlesningen droppes.
/// Tråden avslutter selv når økta den mater stoppes.
pub struct Sampler {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<SamplerStats>>,
}

impl Sampler {
    pub fn spawn<S: SampleSource + 'static>(mut source: S, feed: SessionFeed, interval: Duration) -> Result<Self> {
        if !source.is_available() {
            return Err(CoreError::SensorUnavailable("source reports unavailable".into()));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = thread::Builder::new()
            .name("sampler".into())
            .spawn(move || {
                let mut stats = SamplerStats::default();
                while !flag.load(Ordering::Acquire) {
                    match source.next_reading() {
                        Some(r) => match feed.offer(r) {
                            Offer::Accepted => stats.delivered += 1,
                            Offer::Dropped => stats.dropped += 1,
                            Offer::Closed => {
                                debug!("session closed, sampler stops");
                                break;
                            }
                        },
                        None => break,
                    }
                    if !interval.is_zero() {
                        thread::sleep(interval);
                    }
                }
                debug!("sampler exit: {:?}", stats);
                stats
            })?;

        Ok(Self { stop, handle: Some(handle) })
    }

    /// Sann når kilden er tom og tråden har avsluttet.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Kansellerer timeren og venter på tråden.
    pub fn stop(&mut self) -> SamplerStats {
        self.stop.store(true, Ordering::Release);
        match self.handle.take().map(|h| h.join()) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                warn!("sampler thread panicked");
                SamplerStats::default()
            }
            None => SamplerStats::default(),
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
