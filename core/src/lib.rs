pub mod cli;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod models;
pub mod recorder;
pub mod session;
pub mod source;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub mod types;

#[cfg(feature = "python")]
mod py;

pub use detector::{DetectorState, Haptics, NoHaptics, ShotCounters, ShotDetector, SwingClassifier, SwingWindow, Unclassified};
pub use error::{CoreError, Result};
pub use metrics::{estimated_racket_head_speed, fastest_swing, swing_stats, SwingStats};
pub use models::{
    FileMetadata, MotionSample, RawReading, SessionSummary, ShotEvent, ShotKind, SwingRecord, TransferredFile, Vec3,
};
pub use recorder::{read_record, read_swing_records, FinalizedRecord, ParsedRecord, RecorderState, SessionRecorder};
pub use session::{Offer, SessionController, SessionFeed, SessionOptions, SessionOutcome};
pub use source::{replay, Reading, ReplaySource, SampleSource, Sampler, SamplerStats, UnavailableSource};
pub use storage::{load_cfg, load_settings, save_settings, JsonSettingsStore, SettingsStore};
pub use telemetry::SyncCounters;
pub use types::{CoreCfg, DetectorConfig, RecorderConfig, UserSettings};
