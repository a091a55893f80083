use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::models::{ShotEvent, ShotKind, SwingRecord};

/// Koeffisienter i racket-head-modellen (armlengde-proxy fra høyde).
pub const HEIGHT_COEFF: f64 = 0.38;
pub const ARM_OFFSET: f64 = 11.5;
pub const SPEED_DIVISOR: f64 = 17.6;

/// Felles tilgang til toppverdier for både live-slag og fil-rader.
pub trait Peaks {
    fn peak_magnitude(&self) -> f64;
    fn peak_angular_velocity(&self) -> f64;
    fn kind(&self) -> ShotKind;
}

impl Peaks for ShotEvent {
    fn peak_magnitude(&self) -> f64 { self.peak_magnitude }
    fn peak_angular_velocity(&self) -> f64 { self.peak_angular_velocity }
    fn kind(&self) -> ShotKind { self.kind }
}

impl Peaks for SwingRecord {
    fn peak_magnitude(&self) -> f64 { self.peak_magnitude }
    fn peak_angular_velocity(&self) -> f64 { self.peak_angular_velocity }
    fn kind(&self) -> ShotKind { self.kind }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0f64;
    let mut cnt = 0usize;
    for v in values {
        sum += v;
        cnt += 1;
    }
    if cnt == 0 { 0.0 } else { sum / cnt as f64 }
}

/// NaN-sikker max; tom input → 0.
fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values
        .filter(|v| !v.is_nan())
        .map(OrderedFloat)
        .max()
        .map(|v| v.into_inner())
        .unwrap_or(0.0)
}

pub fn avg_peak_acceleration<P: Peaks>(events: &[P]) -> f64 {
    mean(events.iter().map(Peaks::peak_magnitude))
}

pub fn max_peak_acceleration<P: Peaks>(events: &[P]) -> f64 {
    max_of(events.iter().map(Peaks::peak_magnitude))
}

pub fn avg_angular_velocity<P: Peaks>(events: &[P]) -> f64 {
    mean(events.iter().map(Peaks::peak_angular_velocity))
}

pub fn max_angular_velocity<P: Peaks>(events: &[P]) -> f64 {
    max_of(events.iter().map(Peaks::peak_angular_velocity))
}

/// Racket-head speed (mph) = ω * ((høyde * 0.38) + 11.5) / 17.6
pub fn estimated_racket_head_speed(angular_velocity: f64, height_in_inches: f64) -> f64 {
    angular_velocity * ((height_in_inches * HEIGHT_COEFF) + ARM_OFFSET) / SPEED_DIVISOR
}

/// Raskeste slag i økta (mph).
pub fn fastest_swing<P: Peaks>(events: &[P], height_in_inches: f64) -> f64 {
    estimated_racket_head_speed(max_angular_velocity(events), height_in_inches)
}

/// Visningsklare aggregater for én økt.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SwingStats {
    pub count: usize,
    pub forehand: usize,
    pub backhand: usize,
    pub unclassified: usize,
    pub avg_peak_acceleration: f64,
    pub max_peak_acceleration: f64,
    pub avg_angular_velocity: f64,
    pub max_angular_velocity: f64,
    pub avg_speed_mph: f64,
    pub max_speed_mph: f64,
}

pub fn swing_stats<P: Peaks>(events: &[P], height_in_inches: f64) -> SwingStats {
    let by_kind = |k: ShotKind| events.iter().filter(|e| e.kind() == k).count();
    let avg_w = avg_angular_velocity(events);
    let max_w = max_angular_velocity(events);
    SwingStats {
        count: events.len(),
        forehand: by_kind(ShotKind::Forehand),
        backhand: by_kind(ShotKind::Backhand),
        unclassified: by_kind(ShotKind::Unclassified),
        avg_peak_acceleration: avg_peak_acceleration(events),
        max_peak_acceleration: max_peak_acceleration(events),
        avg_angular_velocity: avg_w,
        max_angular_velocity: max_w,
        avg_speed_mph: estimated_racket_head_speed(avg_w, height_in_inches),
        max_speed_mph: estimated_racket_head_speed(max_w, height_in_inches),
    }
}
