use std::path::Path;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::metrics::{estimated_racket_head_speed, swing_stats};
use crate::recorder::read_swing_records;

#[pyfunction]
fn racket_head_speed(angular_velocity: f64, height_in_inches: f64) -> f64 {
    estimated_racket_head_speed(angular_velocity, height_in_inches)
}

/// Leser en swing-fil og returnerer aggregater som JSON-streng.
#[pyfunction]
fn swing_stats_from_file(path: &str, height_in_inches: f64) -> PyResult<String> {
    let rows = read_swing_records(Path::new(path)).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let stats = swing_stats(&rows, height_in_inches);
    serde_json::to_string(&stats).map_err(|e| PyValueError::new_err(format!("serialize stats: {e}")))
}

// ──────────────────────────────────────────────────────────────────────────────
// PyO3-MODUL
// ──────────────────────────────────────────────────────────────────────────────

#[pymodule]
fn swingsync_core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(racket_head_speed, m)?)?;
    m.add_function(wrap_pyfunction!(swing_stats_from_file, m)?)?;
    Ok(())
}
