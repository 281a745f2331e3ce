//! Analog IR distance sensor model.
//!
//! The sensor's output voltage falls off roughly with the inverse of distance.
//! Readings outside the usable band are pinned to its edges, so every voltage
//! (including noise at or below zero) maps to a finite distance.

/// Closest distance the sensor resolves, in centimeters.
pub const MIN_DISTANCE_CM: f64 = 4.0;

/// Farthest distance the sensor resolves, in centimeters.
pub const MAX_DISTANCE_CM: f64 = 30.0;

const K: f64 = 12.0;
const EPSILON: f64 = 0.05;

/// Convert a sensor voltage to a distance in `[MIN_DISTANCE_CM, MAX_DISTANCE_CM]`.
pub fn estimate(voltage: f64) -> f64 {
    if voltage.is_nan() {
        return MAX_DISTANCE_CM;
    }
    let raw = K / (voltage + EPSILON);
    if raw.is_nan() {
        // inf / inf style inputs; treat as no echo
        return MAX_DISTANCE_CM;
    }
    if raw < MIN_DISTANCE_CM {
        MIN_DISTANCE_CM
    } else if raw > MAX_DISTANCE_CM {
        MAX_DISTANCE_CM
    } else {
        raw
    }
}
