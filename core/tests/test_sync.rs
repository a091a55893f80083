use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use swingsync_core::sync::transport::DELIVERED_HISTORY;
use swingsync_core::sync::{
    ConnectivityState, Delivery, FileState, IncomingFile, Link, LinkError, LoopbackLink, Payload, Reachability,
    SessionPatch, SettingsPatch, SyncMessage, SyncReceiver, SyncTransport, TransferStatus,
};
use swingsync_core::{FileMetadata, SessionSummary, TransferredFile, UserSettings};

const SWINGS: &str = "timestamp,type,peakMagnitude,peakAngularVelocity,duration\n\
                      1.0,forehand,2.5,9.0,0.2\n\
                      2.5,backhand,3.1,12.0,0.25\n";

struct Pair {
    receiver: Arc<Mutex<SyncReceiver>>,
    link: Arc<LoopbackLink>,
    transport: SyncTransport,
}

fn pair(companion_dir: &Path, reachable: bool) -> Pair {
    let reachability = Reachability::new(reachable);
    let receiver = Arc::new(Mutex::new(SyncReceiver::new(companion_dir, UserSettings::default())));
    let link = Arc::new(LoopbackLink::new(receiver.clone(), reachability.clone()));
    let transport = SyncTransport::new(link.clone(), reachability);
    Pair { receiver, link, transport }
}

fn update(shots: u32) -> SyncMessage {
    SyncMessage::SessionUpdate(SessionPatch {
        shot_count: Some(shots),
        forehand_count: Some(shots),
        backhand_count: Some(0),
        duration_sec: Some(60.0),
        timestamp_iso: Some("2026-03-19T14:15:02Z".into()),
        ..Default::default()
    })
}

fn swing_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p
}

#[test]
fn test_direct_send_when_reachable() {
    let dir = tempfile::tempdir().unwrap();
    let p = pair(dir.path(), true);

    assert_eq!(p.transport.send(&SyncMessage::SessionStart), Delivery::Direct);
    assert_eq!(p.transport.send(&update(7)), Delivery::Direct);

    let rx = p.receiver.lock();
    assert!(rx.session_active());
    assert_eq!(rx.live_summary().shot_count, 7);
    assert_eq!(rx.live_summary().timestamp_iso, "2026-03-19T14:15:02Z");
    assert_eq!(p.transport.counters().direct_sent.get(), 2);
}

#[test]
fn test_failed_send_falls_back_to_context() {
    let dir = tempfile::tempdir().unwrap();
    let p = pair(dir.path(), true);
    p.link.set_fail_sends(true);

    assert_eq!(p.transport.send(&update(3)), Delivery::Context);
    assert_eq!(p.receiver.lock().live_summary().shot_count, 3);
    assert_eq!(p.transport.counters().send_failures.get(), 1);
    assert_eq!(p.transport.counters().context_fallback.get(), 1);
}

#[test]
fn test_context_keeps_latest_value_until_reachable() {
    let dir = tempfile::tempdir().unwrap();
    let p = pair(dir.path(), false);

    p.transport.send(&update(3));
    p.transport.send(&update(5));
    p.transport.send(&SyncMessage::SettingsUpdate(SettingsPatch { sensitivity: Some(2.0), ..Default::default() }));
    assert!(p.link.has_held_context());
    assert_eq!(p.receiver.lock().live_summary().shot_count, 0);

    p.transport.on_reachability_changed(true);
    assert!(p.link.deliver_context());

    let rx = p.receiver.lock();
    assert_eq!(rx.live_summary().shot_count, 5);
    assert_eq!(rx.settings().sensitivity, 2.0);
    assert!(!p.link.has_held_context());
}

#[test]
fn test_settings_request_gets_reply() {
    let dir = tempfile::tempdir().unwrap();
    let p = pair(dir.path(), true);

    p.transport.send(&SyncMessage::SettingsRequest);
    let replies = p.link.take_replies();
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        SyncMessage::SettingsUpdate(s) => {
            assert_eq!(s.height_in_inches, Some(70.0));
            assert_eq!(s.haptics_enabled, Some(true));
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[test]
fn test_transfer_is_retried() {
    let src = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let p = pair(dest.path(), true);
    let path = swing_file(src.path(), "swings_1.csv", SWINGS);
    let meta = FileMetadata { file_name: "swings_1.csv".into() };

    p.link.fail_next_transfers(1);
    assert_eq!(p.transport.send_file(&path, meta), TransferStatus::Preparing { attempts: 1 });
    assert_eq!(p.transport.queued_transfers(), 1);
    assert_eq!(*p.receiver.lock().file_state(), FileState::Empty);

    p.transport.pump();
    assert_eq!(p.transport.transfer_status("swings_1.csv"), TransferStatus::Delivered);
    assert_eq!(p.transport.queued_transfers(), 0);
    assert_eq!(p.transport.counters().transfer_attempts.get(), 2);
    assert_eq!(p.transport.counters().transfer_failures.get(), 1);

    let rx = p.receiver.lock();
    match rx.file_state() {
        FileState::Ready { rows, .. } => assert_eq!(rows.len(), 2),
        other => panic!("unexpected {:?}", other),
    }
    let stats = rx.stats().unwrap();
    assert_eq!((stats.forehand, stats.backhand), (1, 1));
}

#[test]
fn test_one_queued_transfer_per_file() {
    let src = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let p = pair(dest.path(), false);
    let path = swing_file(src.path(), "swings_2.csv", SWINGS);

    for _ in 0..3 {
        let status = p.transport.send_file(&path, FileMetadata { file_name: "swings_2.csv".into() });
        assert_eq!(status, TransferStatus::Preparing { attempts: 0 });
    }
    assert_eq!(p.transport.queued_transfers(), 1);

    p.transport.on_reachability_changed(true);
    assert_eq!(p.transport.transfer_status("swings_2.csv"), TransferStatus::Delivered);
    assert_eq!(p.transport.counters().transfer_attempts.get(), 1);
    assert!(dest.path().join("swings_2.csv").exists());
}

#[test]
fn test_missing_file_is_not_queued() {
    let dest = tempfile::tempdir().unwrap();
    let p = pair(dest.path(), true);
    let status = p.transport.send_file(Path::new("/definitely/not/here.csv"), FileMetadata { file_name: "here.csv".into() });
    assert_eq!(status, TransferStatus::NotQueued);
}

#[test]
fn test_receiver_is_idempotent() {
    let src = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let mut rx = SyncReceiver::new(dest.path(), UserSettings::default());

    rx.on_message(update(4));
    let once: SessionSummary = rx.live_summary().clone();
    rx.on_message(update(4));
    assert_eq!(*rx.live_summary(), once);

    let incoming = IncomingFile {
        path: swing_file(src.path(), "tmp_upload", SWINGS),
        metadata: FileMetadata { file_name: "swings_3.csv".into() },
    };
    let first = rx.on_file(&incoming).unwrap().clone();
    let second = rx.on_file(&incoming).unwrap().clone();
    assert_eq!(first, second);

    let names: Vec<_> = fs::read_dir(dest.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(names.len(), 1, "kun den installerte fila skal ligge igjen: {:?}", names);
}

#[test]
fn test_newer_file_replaces_stale() {
    let src = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let mut rx = SyncReceiver::new(dest.path(), UserSettings::default());
    let meta = FileMetadata { file_name: "swings_4.csv".into() };

    rx.on_file(&IncomingFile { path: swing_file(src.path(), "a", SWINGS), metadata: meta.clone() }).unwrap();
    let shorter = "timestamp,type,peakMagnitude,peakAngularVelocity,duration\n4.0,forehand,2.0,8.0,0.2\n";
    rx.on_file(&IncomingFile { path: swing_file(src.path(), "b", shorter), metadata: meta }).unwrap();

    match rx.file_state() {
        FileState::Ready { rows, .. } => assert_eq!(rows.len(), 1),
        other => panic!("unexpected {:?}", other),
    }
    let names: Vec<_> = fs::read_dir(dest.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(names, vec![std::ffi::OsString::from("swings_4.csv")]);
}

#[test]
fn test_failed_install_leaves_old_entry_and_no_temp_file() {
    let src = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let mut rx = SyncReceiver::new(dest.path(), UserSettings::default());

    // en katalog med samme navn: rename kan ikke erstatte den
    let blocker = dest.path().join("swings_7.csv");
    fs::create_dir(&blocker).unwrap();
    fs::write(blocker.join("keep"), "x").unwrap();

    let incoming = IncomingFile {
        path: swing_file(src.path(), "up", SWINGS),
        metadata: FileMetadata { file_name: "swings_7.csv".into() },
    };
    assert!(rx.on_file(&incoming).is_err());
    assert!(blocker.join("keep").exists());
    assert!(!dest.path().join(".swings_7.csv.incoming").exists());
    assert_eq!(*rx.file_state(), FileState::Empty);
}

#[test]
fn test_unreadable_file_does_not_crash() {
    let src = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let mut rx = SyncReceiver::new(dest.path(), UserSettings::default());

    let incoming = IncomingFile {
        path: swing_file(src.path(), "junk", "hello\nworld\n"),
        metadata: FileMetadata { file_name: "swings_5.csv".into() },
    };
    let state = rx.on_file(&incoming).unwrap().clone();
    assert!(matches!(state, FileState::Unreadable { ref file_name, .. } if file_name == "swings_5.csv"));
    assert!(rx.stats().is_none());

    let bad_name = IncomingFile { path: incoming.path.clone(), metadata: FileMetadata { file_name: "../x.csv".into() } };
    assert!(rx.on_file(&bad_name).is_err());
}

#[test]
fn test_payload_merge_is_tolerant() {
    let dest = tempfile::tempdir().unwrap();
    let mut rx = SyncReceiver::new(dest.path(), UserSettings::default());

    let mut p = Payload::new();
    p.insert("type".into(), "sessionUpdate".into());
    p.insert("shotCount".into(), "4".into());
    p.insert("futureField".into(), "whatever".into());
    rx.on_payload(&p);
    assert_eq!(rx.live_summary().shot_count, 4);

    // uten type: utledes fra nøklene; manglende felt beholdes
    let mut partial = Payload::new();
    partial.insert("durationSec".into(), "95.5".into());
    rx.on_payload(&partial);
    assert_eq!(rx.live_summary().shot_count, 4);
    assert_eq!(rx.live_summary().duration_sec, 95.5);

    let before = rx.live_summary().clone();
    assert!(rx.on_bytes(b"not json at all").is_none());
    assert!(rx.on_bytes(br#"{"type":"teleport"}"#).is_none());
    assert_eq!(*rx.live_summary(), before);
    assert_eq!(rx.counters().payloads_rejected.get(), 2);
}

#[test]
fn test_connectivity_is_informational() {
    let src = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let mut rx = SyncReceiver::new(dest.path(), UserSettings::default());

    rx.on_connectivity(ConnectivityState::Inactive);
    rx.on_message(update(2));
    let incoming = IncomingFile {
        path: swing_file(src.path(), "up", SWINGS),
        metadata: FileMetadata { file_name: "swings_6.csv".into() },
    };
    assert!(matches!(rx.on_file(&incoming).unwrap(), FileState::Ready { .. }));
    assert_eq!(rx.live_summary().shot_count, 2);

    rx.on_connectivity(ConnectivityState::Reachable);
    assert_eq!(rx.connectivity(), ConnectivityState::Reachable);
}

fn summary(ts: &str, hr: Option<f64>, avg: Option<f64>) -> SessionSummary {
    SessionSummary {
        timestamp_iso: ts.into(),
        duration_sec: 30.0,
        heart_rate: hr,
        avg_heart_rate: avg,
        shot_count: 3,
        ..Default::default()
    }
}

#[test]
fn test_next_session_without_heart_rate_clears_it() {
    let dir = tempfile::tempdir().unwrap();
    let p = pair(dir.path(), true);

    p.transport.send(&SyncMessage::SessionStart);
    p.transport.publish_session(&summary("2026-03-19T14:15:02Z", Some(150.0), Some(140.0)), None);
    assert_eq!(p.receiver.lock().live_summary().heart_rate, Some(150.0));

    p.transport.send(&SyncMessage::SessionStart);
    p.transport.publish_session(&summary("2026-03-19T15:00:00Z", None, None), None);

    let rx = p.receiver.lock();
    let live = rx.live_summary();
    assert_eq!(live.timestamp_iso, "2026-03-19T15:00:00Z");
    assert_eq!(live.heart_rate, None);
    assert_eq!(live.avg_heart_rate, None);
}

#[test]
fn test_context_does_not_carry_heart_rate_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let p = pair(dir.path(), false);

    p.transport.publish_session(&summary("2026-03-19T14:15:02Z", Some(150.0), Some(140.0)), None);
    p.transport.publish_session(&summary("2026-03-19T15:00:00Z", None, None), None);
    p.transport.on_reachability_changed(true);
    assert!(p.link.deliver_context());

    let rx = p.receiver.lock();
    assert_eq!(rx.live_summary().timestamp_iso, "2026-03-19T15:00:00Z");
    assert_eq!(rx.live_summary().heart_rate, None);
    assert_eq!(rx.live_summary().avg_heart_rate, None);
}

/// Holder hver filoverføring til testen slipper den.
struct GatedLink {
    started: Sender<String>,
    release: Receiver<()>,
    active: AtomicU32,
    max_active: AtomicU32,
    transfers: AtomicU32,
}

impl Link for GatedLink {
    fn send_message(&self, _payload: &Payload) -> Result<(), LinkError> {
        Ok(())
    }

    fn update_context(&self, _payload: &Payload) -> Result<(), LinkError> {
        Ok(())
    }

    fn transfer_file(&self, _file: &TransferredFile, metadata: &FileMetadata) -> Result<(), LinkError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _ = self.started.send(metadata.file_name.clone());
        let released = self.release.recv_timeout(Duration::from_secs(5));
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.transfers.fetch_add(1, Ordering::SeqCst);
        released.map_err(|e| LinkError::Transfer(e.to_string()))
    }
}

#[test]
fn test_resend_during_transfer_waits_for_it() {
    let src = tempfile::tempdir().unwrap();
    let path = swing_file(src.path(), "swings_8.csv", SWINGS);
    let meta = FileMetadata { file_name: "swings_8.csv".into() };

    let (started_tx, started_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let link = Arc::new(GatedLink {
        started: started_tx,
        release: release_rx,
        active: AtomicU32::new(0),
        max_active: AtomicU32::new(0),
        transfers: AtomicU32::new(0),
    });
    let transport = Arc::new(SyncTransport::new(link.clone(), Reachability::new(true)));

    let first = {
        let transport = transport.clone();
        let (path, meta) = (path.clone(), meta.clone());
        thread::spawn(move || transport.send_file(&path, meta))
    };
    assert_eq!(started_rx.recv_timeout(Duration::from_secs(5)).unwrap(), "swings_8.csv");
    assert_eq!(transport.transfer_status("swings_8.csv"), TransferStatus::Preparing { attempts: 1 });

    // ny versjon mens den forrige er hos linken: køes, men starter ikke
    assert_eq!(transport.send_file(&path, meta), TransferStatus::Preparing { attempts: 0 });
    assert_eq!(link.active.load(Ordering::SeqCst), 1);

    release_tx.send(()).unwrap();
    release_tx.send(()).unwrap();
    assert_eq!(first.join().unwrap(), TransferStatus::Delivered);

    assert_eq!(link.transfers.load(Ordering::SeqCst), 2);
    assert_eq!(link.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(transport.transfer_status("swings_8.csv"), TransferStatus::Delivered);
    assert_eq!(transport.queued_transfers(), 0);
}

#[test]
fn test_delivered_history_is_bounded() {
    let src = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let p = pair(dest.path(), true);

    for i in 0..=DELIVERED_HISTORY {
        let name = format!("swings_h{i}.csv");
        let path = swing_file(src.path(), &name, SWINGS);
        assert_eq!(p.transport.send_file(&path, FileMetadata { file_name: name }), TransferStatus::Delivered);
    }
    assert_eq!(p.transport.transfer_status("swings_h0.csv"), TransferStatus::NotQueued);
    assert_eq!(p.transport.transfer_status("swings_h1.csv"), TransferStatus::Delivered);
    let last = format!("swings_h{DELIVERED_HISTORY}.csv");
    assert_eq!(p.transport.transfer_status(&last), TransferStatus::Delivered);
}
