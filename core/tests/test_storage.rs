use swingsync_core::{load_cfg, load_settings, save_settings, CoreError, JsonSettingsStore, SettingsStore, UserSettings};

#[test]
fn test_save_and_load_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs").join("settings.json");

    let settings = UserSettings {
        height_in_inches: 66.0,
        sensitivity: 2.2,
        cooldown_sec: 0.25,
        haptics_enabled: false,
        hr_enabled: true,
    };

    save_settings(&settings, &path).expect("kunne ikke lagre innstillinger");
    let loaded = load_settings(&path).expect("kunne ikke laste innstillinger");
    assert_eq!(loaded, settings);
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = load_settings(&dir.path().join("nope.json")).unwrap();
    assert_eq!(loaded, UserSettings::default());
    assert!((loaded.sensitivity - 1.55).abs() < 1e-12);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "height_in_inches": 74.0 }"#).unwrap();

    let loaded = load_settings(&path).unwrap();
    assert_eq!(loaded.height_in_inches, 74.0);
    assert!(loaded.haptics_enabled);
}

#[test]
fn test_bad_value_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{ "sensitivity": "high" }"#).unwrap();

    match load_settings(&path) {
        Err(CoreError::Settings(msg)) => assert!(msg.contains("sensitivity"), "{msg}"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_store_trait_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonSettingsStore::new(dir.path().join("s.json"));
    let mut s = store.load().unwrap();
    s.hr_enabled = false;
    store.save(&s).unwrap();
    assert!(!store.load().unwrap().hr_enabled);
}

#[test]
fn test_core_cfg_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("core.json");
    std::fs::write(&path, r#"{ "recorder": { "buffer_capacity": 64 }, "detector": { "cooldown_sec": 0.5 } }"#).unwrap();

    let cfg = load_cfg(&path).unwrap();
    assert_eq!(cfg.recorder().buffer_capacity, 64);
    assert!(cfg.recorder().record_raw_samples);
    assert_eq!(cfg.detector().cooldown_sec, 0.5);
    assert_eq!(cfg.detector().hysteresis_factor, 0.7);
    assert_eq!(cfg.channel_capacity(), 512);

    assert_eq!(load_cfg(&dir.path().join("none.json")).unwrap().channel_capacity(), 512);
}
