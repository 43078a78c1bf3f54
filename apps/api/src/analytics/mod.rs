// Admin reporting: cohort activation metrics, the daily completion trend and
// a per-learner activity breakdown. Reads only; never writes to the store.

pub mod activation;
pub mod handlers;
pub mod learners;
pub mod trend;

/// Rounds half away from zero to `digits` decimal places.
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Fractional hours from `start` to `end`.
pub(crate) fn hours_between(
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}
