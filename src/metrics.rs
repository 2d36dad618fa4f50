use std::time::Duration;

/// Output progress as a whole percentage; `None` when the total is unknown or
/// the counters are inconsistent.
pub fn progress_percent(done: i64, total: i64) -> Option<u8> {
    if total <= 0 {
        return None;
    }
    let bar = (100.0 * done as f64 / total as f64) as i64;
    u8::try_from(bar).ok().filter(|b| *b <= 100)
}

/// Shapes finished per second over a job's lifetime.
pub fn shape_rate(shapes: i64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if shapes <= 0 || secs <= 0.0 {
        return None;
    }
    Some(shapes as f64 / secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_within_range() {
        assert_eq!(progress_percent(0, 10), Some(0));
        assert_eq!(progress_percent(5, 10), Some(50));
        assert_eq!(progress_percent(10, 10), Some(100));
    }

    #[test]
    fn percent_rejects_unknown_or_overflowing_totals() {
        assert_eq!(progress_percent(1, 0), None);
        assert_eq!(progress_percent(11, 10), None);
        assert_eq!(progress_percent(-1, 10), None);
    }

    #[test]
    fn rate_needs_shapes_and_time() {
        assert_eq!(shape_rate(100, Duration::from_secs(2)), Some(50.0));
        assert_eq!(shape_rate(0, Duration::from_secs(2)), None);
        assert_eq!(shape_rate(10, Duration::ZERO), None);
    }
}
