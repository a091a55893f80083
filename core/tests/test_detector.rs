use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use swingsync_core::{DetectorConfig, DetectorState, Haptics, ShotDetector, ShotKind, SwingWindow};

fn cfg(sensitivity: f64, cooldown_sec: f64) -> DetectorConfig {
    DetectorConfig { sensitivity, cooldown_sec, ..Default::default() }
}

fn run(d: &mut ShotDetector, seq: &[(f64, f64)]) -> usize {
    seq.iter().filter(|(t, mag)| d.observe(*mag, *t).is_some()).count()
}

#[test]
fn test_counts_always_add_up() {
    // enkel LCG, deterministisk
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) as f64 / (1u64 << 31) as f64
    };

    let classifier = |w: &SwingWindow| match w.samples % 3 {
        0 => ShotKind::Forehand,
        1 => ShotKind::Backhand,
        _ => ShotKind::Unclassified,
    };
    let mut d = ShotDetector::with_strategy(
        cfg(1.2, 0.05),
        Box::new(classifier),
        Box::new(swingsync_core::NoHaptics),
    );

    let mut t = 0.0;
    for _ in 0..20_000 {
        t += 0.02;
        d.observe(next() * 4.0, t);
        let c = d.counters();
        assert_eq!(c.shots, c.forehand + c.backhand + c.unclassified);
    }
    assert!(d.counters().shots > 0, "sekvensen skal gi slag");
    assert!(d.counters().forehand > 0 && d.counters().backhand > 0);
}

#[test]
fn test_cooldown_blocks_second_trigger() {
    let mut d = ShotDetector::new(cfg(1.55, 0.3));
    let seq = [(0.0, 3.0), (0.05, 0.5), (0.1, 3.0), (0.15, 3.0), (0.2, 0.5), (0.25, 0.2)];
    assert_eq!(run(&mut d, &seq), 1);
    assert_eq!(d.state(), DetectorState::Idle);
    assert_eq!(d.counters().shots, 1);
}

#[test]
fn test_hysteresis_holds_swing_open() {
    let mut d = ShotDetector::new(cfg(2.0, 0.3));
    // faller til 0.8 * terskel (over 0.7-grensen) og stiger igjen
    let seq = [(0.0, 3.0), (0.1, 1.6), (0.2, 3.0), (0.3, 1.6), (0.4, 0.5)];
    assert_eq!(run(&mut d, &seq), 1);
    assert!(d.finish(0.5).is_none());
}

#[test]
fn test_two_swing_scenario() {
    let mut d = ShotDetector::new(cfg(2.2, 0.3));

    assert!(d.observe(3.0, 0.0).is_none());
    assert_eq!(d.state(), DetectorState::Swinging);
    assert!(d.observe(3.0, 0.1).is_none());

    let first = d.observe(1.0, 0.2).expect("første slag");
    assert!((first.duration - 0.2).abs() < 1e-9);
    assert!((first.peak_magnitude - 3.0).abs() < 1e-12);
    assert_eq!(first.kind, ShotKind::Unclassified);

    assert!(d.observe(3.0, 0.5).is_none());
    assert_eq!(d.state(), DetectorState::Swinging);
    let second = d.observe(0.0, 0.6).expect("andre slag");
    assert!((second.t - 0.5).abs() < 1e-12);

    assert_eq!(d.counters().shots, 2);
}

#[test]
fn test_sensitivity_is_clamped() {
    let mut d = ShotDetector::new(DetectorConfig::default());
    d.set_sensitivity(10.0);
    assert_eq!(d.sensitivity(), 3.0);
    d.set_sensitivity(-1.0);
    assert_eq!(d.sensitivity(), 0.1);
    d.set_sensitivity(f64::NAN);
    assert!((d.sensitivity() - 1.55).abs() < 1e-12);
}

struct CountingHaptics(Arc<AtomicU32>);

impl Haptics for CountingHaptics {
    fn tick(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_haptic_tick_on_swing_start() {
    let ticks = Arc::new(AtomicU32::new(0));
    let mut d = ShotDetector::with_strategy(
        cfg(1.55, 0.3),
        Box::new(swingsync_core::Unclassified),
        Box::new(CountingHaptics(ticks.clone())),
    );
    run(&mut d, &[(0.0, 3.0), (0.1, 0.2), (1.0, 3.0), (1.1, 0.2)]);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);

    d.set_haptics_enabled(false);
    run(&mut d, &[(2.0, 3.0), (2.1, 0.2)]);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);
    assert_eq!(d.counters().shots, 3);
}

#[test]
fn test_reset_between_sessions() {
    let mut d = ShotDetector::new(cfg(1.55, 0.3));
    run(&mut d, &[(0.0, 3.0), (0.1, 0.2)]);
    d.reset();
    assert_eq!(d.counters().shots, 0);
    assert_eq!(d.last_shot_time(), None);
    // ny økt starter på t=0 igjen; cooldown fra forrige økt gjelder ikke
    assert!(d.observe(3.0, 0.05).is_none());
    assert_eq!(d.state(), DetectorState::Swinging);
}
