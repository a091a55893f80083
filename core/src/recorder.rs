//! Strømmende øktopptak.
//!
//! Hver sink holder en liten buffer med fast kapasitet som skrives til en
//! append-only CSV-fil når den er full. Minnebruken er dermed uavhengig av
//! øktlengden. `stop()` tømmer resten og returnerer en `FinalizedRecord`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::models::{MotionSample, ShotEvent, ShotKind, SwingRecord, TransferredFile, Vec3};
use crate::types::RecorderConfig;

pub const SWING_HEADER: [&str; 5] = ["timestamp", "type", "peakMagnitude", "peakAngularVelocity", "duration"];

pub const SAMPLE_HEADER: [&str; 9] = [
    "timestamp", "magnitude", "accX", "accY", "accZ", "gyroX", "gyroY", "gyroZ", "heartRate",
];

/// Rad i rådata-fila (ni kolonner).
#[derive(Debug, Clone, Copy, Serialize)]
struct SampleRow {
    timestamp: f64,
    magnitude: f64,
    acc_x: f64,
    acc_y: f64,
    acc_z: f64,
    gyro_x: f64,
    gyro_y: f64,
    gyro_z: f64,
    heart_rate: Option<f64>,
}

impl From<&MotionSample> for SampleRow {
    fn from(s: &MotionSample) -> Self {
        Self {
            timestamp: s.t,
            magnitude: s.magnitude,
            acc_x: s.acc.x,
            acc_y: s.acc.y,
            acc_z: s.acc.z,
            gyro_x: s.gyro.x,
            gyro_y: s.gyro.y,
            gyro_z: s.gyro.z,
            heart_rate: s.heart_rate,
        }
    }
}

type RowWriter = csv::Writer<Gate>;

/// Skriver gjennom til porten stenges. Etter det forkastes alt, også det
/// csv-writeren prøver å flushe når den droppes, så ingen halve rader
/// havner i fila etter en feil.
struct Gate {
    inner: Box<dyn Write + Send>,
    closed: Arc<AtomicBool>,
}

impl Write for Gate {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(buf.len());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.inner.flush()
    }
}

/// Buffer med fast kapasitet foran en CSV-writer.
struct BufferedSink<R: Serialize> {
    path: PathBuf,
    writer: Option<RowWriter>,
    gate: Arc<AtomicBool>,
    buffer: Vec<R>,
    capacity: usize,
    written: u64,
    // rader gitt til csv-writeren, men ikke bekreftet av flush
    unflushed: u64,
    dropped: u64,
    failed: Option<String>,
}

impl<R: Serialize> BufferedSink<R> {
    fn new(path: PathBuf, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            path,
            writer: None,
            gate: Arc::new(AtomicBool::new(false)),
            buffer: Vec::with_capacity(capacity),
            capacity,
            written: 0,
            unflushed: 0,
            dropped: 0,
            failed: None,
        }
    }

    fn gated(&mut self, sink: Box<dyn Write + Send>) -> RowWriter {
        self.gate = Arc::new(AtomicBool::new(false));
        let gate = Gate { inner: sink, closed: Arc::clone(&self.gate) };
        csv::WriterBuilder::new().has_headers(false).from_writer(gate)
    }

    fn attach(&mut self, sink: Box<dyn Write + Send>, header: &[&str]) -> Result<()> {
        let mut writer = self.gated(sink);
        writer.write_record(header)?;
        writer.flush().map_err(storage_err)?;
        self.writer = Some(writer);
        Ok(())
    }

    /// Legger til en rad; flusher når bufferen er full.
    fn push(&mut self, row: R) {
        if self.writer.is_none() {
            // minne-modus: vi teller bare
            self.dropped += 1;
            return;
        }
        self.buffer.push(row);
        if self.buffer.len() >= self.capacity {
            if let Err(e) = self.flush() {
                self.abandon(e);
            }
        }
    }

    /// Etter en feilet flush vet vi ikke hva som står i fila. Vi stenger
    /// porten, kaster bufferen og går over til minne-modus. `dropped` teller
    /// alle rader som ikke ble bekreftet skrevet.
    fn abandon(&mut self, e: CoreError) {
        self.gate.store(true, Ordering::Relaxed);
        self.writer = None;
        let lost = self.buffer.len() as u64 + self.unflushed;
        self.buffer.clear();
        self.unflushed = 0;
        self.dropped += lost;
        warn!("flush to {} failed, {} rows lost, no further writes: {}", self.path.display(), lost, e);
        self.failed = Some(e.to_string());
    }

    fn flush(&mut self) -> Result<()> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => return Err(CoreError::StorageWriteFailed(format!("{} is not open", self.path.display()))),
        };

        let mut done = 0usize;
        let mut result = Ok(());
        for row in &self.buffer {
            if let Err(e) = writer.serialize(row) {
                result = Err(CoreError::from(e));
                break;
            }
            done += 1;
        }
        self.buffer.drain(..done);
        self.unflushed += done as u64;
        result?;
        writer.flush().map_err(storage_err)?;
        self.written += self.unflushed;
        self.unflushed = 0;
        Ok(())
    }

    /// Siste flush + lukking. Feiler den kan kallet gjentas.
    fn close(&mut self) -> Result<()> {
        if let Some(reason) = &self.failed {
            return Err(CoreError::StorageWriteFailed(format!("{}: {}", self.path.display(), reason)));
        }
        if self.writer.is_none() {
            return Err(CoreError::StorageWriteFailed(format!("{} was never opened", self.path.display())));
        }
        self.flush()?;
        self.writer = None;
        debug!("closed {} ({} rows)", self.path.display(), self.written);
        Ok(())
    }
}

/// Ny fil; finnes navnet fra før feiler vi med `AlreadyExists` i stedet for å
/// tømme en annen økts fil.
fn create_new(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

fn open_err(path: &Path, e: io::Error) -> CoreError {
    CoreError::StorageWriteFailed(format!("{}: {}", path.display(), e))
}

fn storage_err(e: std::io::Error) -> CoreError {
    CoreError::StorageWriteFailed(e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Ready,
    Recording,
    Finalized,
}

/// Løpende tellere; gyldige selv om disk-skriving feiler.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecorderCounters {
    pub shot_count: u32,
    pub forehand_count: u32,
    pub backhand_count: u32,
    pub unclassified_count: u32,
    pub duration_sec: f64,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedRecord {
    pub file_path: PathBuf,
    pub samples_path: Option<PathBuf>,
    pub shot_count: u32,
    pub forehand_count: u32,
    pub backhand_count: u32,
    pub unclassified_count: u32,
    pub duration_sec: f64,
    pub start_timestamp: DateTime<Utc>,
    pub rows_written: u64,
    pub dropped_rows: u64,
}

impl FinalizedRecord {
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Klar til overføring; størrelsen leses fra disk.
    pub fn transferred_file(&self) -> Result<TransferredFile> {
        let size_bytes = std::fs::metadata(&self.file_path)?.len();
        Ok(TransferredFile {
            local_path: self.file_path.clone(),
            size_bytes,
            origin_file_name: self.file_name(),
        })
    }
}

/// Høyeste suffiks vi prøver før vi gir opp å finne et ledig filnavn.
pub const MAX_NAME_SUFFIX: u32 = 99;

pub struct SessionRecorder {
    dir: PathBuf,
    config: RecorderConfig,
    start_timestamp: DateTime<Utc>,
    swings: BufferedSink<SwingRecord>,
    samples: Option<BufferedSink<SampleRow>>,
    counters: RecorderCounters,
    state: RecorderState,
    finalized: Option<FinalizedRecord>,
}

impl SessionRecorder {
    pub fn new(dir: &Path, config: RecorderConfig, start_timestamp: DateTime<Utc>) -> Self {
        // endelig navn velges i start(), når vi vet hva som er ledig
        let stem = session_stem(&start_timestamp);
        let swings = BufferedSink::new(dir.join(format!("swings_{stem}.csv")), config.buffer_capacity);
        let samples = config
            .record_raw_samples
            .then(|| BufferedSink::new(dir.join(format!("samples_{stem}.csv")), config.buffer_capacity));
        Self {
            dir: dir.to_path_buf(),
            config,
            start_timestamp,
            swings,
            samples,
            counters: RecorderCounters::default(),
            state: RecorderState::Ready,
            finalized: None,
        }
    }

    /// Åpner filene. Ved feil går recorderen i minne-modus: tellere
    /// oppdateres fortsatt, men rader forkastes.
    pub fn start(&mut self) -> Result<()> {
        if self.state != RecorderState::Ready {
            return Ok(());
        }
        self.state = RecorderState::Recording;
        let (swings_file, samples_file) = self.claim_files()?;
        self.swings.attach(Box::new(swings_file), &SWING_HEADER)?;
        if let (Some(s), Some(f)) = (self.samples.as_mut(), samples_file) {
            s.attach(Box::new(f), &SAMPLE_HEADER)?;
        }
        info!("recording to {}", self.swings.path.display());
        Ok(())
    }

    /// Finner en stamme der begge filene er ledige og oppretter dem.
    /// En tidligere økt med samme starttid får beholde filene sine; vi legger
    /// på `_1`, `_2`, … i stedet.
    fn claim_files(&mut self) -> Result<(File, Option<File>)> {
        let base = session_stem(&self.start_timestamp);
        for n in 0..=MAX_NAME_SUFFIX {
            let stem = if n == 0 { base.clone() } else { format!("{base}_{n}") };
            let swings_path = self.dir.join(format!("swings_{stem}.csv"));
            let swings_file = match create_new(&swings_path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(open_err(&swings_path, e)),
            };

            let samples = match self.samples.as_ref() {
                None => None,
                Some(_) => {
                    let path = self.dir.join(format!("samples_{stem}.csv"));
                    match create_new(&path) {
                        Ok(f) => Some((path, f)),
                        Err(e) => {
                            // begge filene skal ha samme stamme
                            drop(swings_file);
                            let _ = fs::remove_file(&swings_path);
                            if e.kind() == io::ErrorKind::AlreadyExists {
                                continue;
                            }
                            return Err(open_err(&path, e));
                        }
                    }
                }
            };

            if n > 0 {
                debug!("session name {} taken, using {}", base, stem);
            }
            self.swings.path = swings_path;
            let samples_file = match (self.samples.as_mut(), samples) {
                (Some(sink), Some((path, f))) => {
                    sink.path = path;
                    Some(f)
                }
                _ => None,
            };
            return Ok((swings_file, samples_file));
        }
        Err(CoreError::StorageWriteFailed(format!(
            "no free file name for session {} in {}",
            base,
            self.dir.display()
        )))
    }

    pub fn append_sample(&mut self, sample: &MotionSample) {
        if self.state != RecorderState::Recording {
            return;
        }
        self.counters.samples += 1;
        if sample.t.is_finite() {
            self.counters.duration_sec = self.counters.duration_sec.max(sample.t);
        }
        if let Some(s) = self.samples.as_mut() {
            s.push(SampleRow::from(sample));
        }
    }

    pub fn append_event(&mut self, event: &ShotEvent) {
        if self.state != RecorderState::Recording {
            return;
        }
        let c = &mut self.counters;
        c.shot_count += 1;
        match event.kind {
            ShotKind::Forehand => c.forehand_count += 1,
            ShotKind::Backhand => c.backhand_count += 1,
            ShotKind::Unclassified => c.unclassified_count += 1,
        }
        let end = event.t + event.duration;
        if end.is_finite() {
            c.duration_sec = c.duration_sec.max(end);
        }
        self.swings.push(event.to_record());
    }

    /// Tømmer buffere og lukker filene. Kan kalles på nytt etter feil.
    pub fn stop(&mut self) -> Result<FinalizedRecord> {
        if let Some(done) = &self.finalized {
            return Ok(done.clone());
        }
        if self.state == RecorderState::Ready {
            return Err(CoreError::StorageWriteFailed("recorder was never started".into()));
        }

        if let Some(s) = self.samples.as_mut() {
            if s.writer.is_some() {
                s.close()?;
            }
        }
        self.swings.close()?;

        self.state = RecorderState::Finalized;
        let c = self.counters;
        let record = FinalizedRecord {
            file_path: self.swings.path.clone(),
            samples_path: self.samples.as_ref().map(|s| s.path.clone()),
            shot_count: c.shot_count,
            forehand_count: c.forehand_count,
            backhand_count: c.backhand_count,
            unclassified_count: c.unclassified_count,
            duration_sec: c.duration_sec,
            start_timestamp: self.start_timestamp,
            rows_written: self.swings.written + self.samples.as_ref().map_or(0, |s| s.written),
            dropped_rows: self.dropped_rows(),
        };
        info!(
            "session finalized: {} shots, {:.1}s, {} rows dropped",
            record.shot_count, record.duration_sec, record.dropped_rows
        );
        self.finalized = Some(record.clone());
        Ok(record)
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn counters(&self) -> RecorderCounters {
        self.counters
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Antall rader som ligger i minnet nå (alle sinks).
    pub fn buffered_len(&self) -> usize {
        self.swings.buffer.len() + self.samples.as_ref().map_or(0, |s| s.buffer.len())
    }

    /// Største mulige buffer per sink.
    pub fn capacity(&self) -> usize {
        self.swings.capacity
    }

    pub fn dropped_rows(&self) -> u64 {
        self.swings.dropped + self.samples.as_ref().map_or(0, |s| s.dropped)
    }

    pub fn file_path(&self) -> &Path {
        &self.swings.path
    }
}

/// Filnavn-stamme for en økt, f.eks. `20260319_141502_250`.
pub fn session_stem(start: &DateTime<Utc>) -> String {
    start.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/* -------------------------------------------------------------------------
   Lesing av ferdige filer (begge skjemavarianter)
   ------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRecord {
    Swings(Vec<SwingRecord>),
    Samples(Vec<MotionSample>),
}

impl ParsedRecord {
    pub fn len(&self) -> usize {
        match self {
            ParsedRecord::Swings(v) => v.len(),
            ParsedRecord::Samples(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize(h: &str) -> String {
    h.trim().to_ascii_lowercase()
}

fn column_indices(headers: &csv::StringRecord, wanted: &[&str]) -> Option<Vec<usize>> {
    let names: Vec<String> = headers.iter().map(normalize).collect();
    wanted
        .iter()
        .map(|w| {
            let w = normalize(w);
            names.iter().position(|n| *n == w)
        })
        .collect()
}

fn parse_f64(rec: &csv::StringRecord, idx: usize, line: u64) -> Result<f64> {
    let raw = rec.get(idx).unwrap_or("").trim();
    raw.parse::<f64>()
        .map_err(|_| CoreError::PayloadUnparseable(format!("line {line}: bad number '{raw}'")))
}

fn parse_opt_f64(rec: &csv::StringRecord, idx: usize, line: u64) -> Result<Option<f64>> {
    match rec.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(_) => parse_f64(rec, idx, line).map(Some),
    }
}

fn parse_kind(raw: &str, line: u64) -> Result<ShotKind> {
    match normalize(raw).as_str() {
        "forehand" => Ok(ShotKind::Forehand),
        "backhand" => Ok(ShotKind::Backhand),
        "unclassified" | "" => Ok(ShotKind::Unclassified),
        other => Err(CoreError::PayloadUnparseable(format!("line {line}: unknown shot type '{other}'"))),
    }
}

/// Leser en øktfil. Header avgjør skjema; kolonnerekkefølge og
/// store/små bokstaver i header spiller ingen rolle.
pub fn read_record(path: &Path) -> Result<ParsedRecord> {
    let file = File::open(path)?;
    read_record_from(file)
}

pub fn read_record_from<R: std::io::Read>(reader: R) -> Result<ParsedRecord> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| CoreError::PayloadUnparseable(e.to_string()))?
        .clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CoreError::PayloadUnparseable("missing header".into()));
    }

    if let Some(idx) = column_indices(&headers, &SWING_HEADER) {
        let mut out = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.map_err(|e| CoreError::PayloadUnparseable(e.to_string()))?;
            let line = i as u64 + 2;
            out.push(SwingRecord {
                timestamp: parse_f64(&rec, idx[0], line)?,
                kind: parse_kind(rec.get(idx[1]).unwrap_or(""), line)?,
                peak_magnitude: parse_f64(&rec, idx[2], line)?,
                peak_angular_velocity: parse_f64(&rec, idx[3], line)?,
                duration: parse_f64(&rec, idx[4], line)?,
            });
        }
        return Ok(ParsedRecord::Swings(out));
    }

    if let Some(idx) = column_indices(&headers, &SAMPLE_HEADER) {
        let mut out = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.map_err(|e| CoreError::PayloadUnparseable(e.to_string()))?;
            let line = i as u64 + 2;
            out.push(MotionSample {
                t: parse_f64(&rec, idx[0], line)?,
                magnitude: parse_f64(&rec, idx[1], line)?,
                acc: Vec3::new(
                    parse_f64(&rec, idx[2], line)?,
                    parse_f64(&rec, idx[3], line)?,
                    parse_f64(&rec, idx[4], line)?,
                ),
                gyro: Vec3::new(
                    parse_f64(&rec, idx[5], line)?,
                    parse_f64(&rec, idx[6], line)?,
                    parse_f64(&rec, idx[7], line)?,
                ),
                heart_rate: parse_opt_f64(&rec, idx[8], line)?,
            });
        }
        return Ok(ParsedRecord::Samples(out));
    }

    Err(CoreError::PayloadUnparseable(format!(
        "unrecognized header: {}",
        headers.iter().collect::<Vec<_>>().join(",")
    )))
}

/// Kun slag-rader; rådata-fil gir feil.
pub fn read_swing_records(path: &Path) -> Result<Vec<SwingRecord>> {
    match read_record(path)? {
        ParsedRecord::Swings(rows) => Ok(rows),
        ParsedRecord::Samples(_) => Err(CoreError::PayloadUnparseable(format!(
            "{} holds raw samples, not swings",
            path.display()
        ))),
    }
}
