use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// Millisecond samples rendered as `850us`, `12.34ms` or `1.50s`.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() {
        return "-".to_string();
    }
    if ms >= 1000.0 {
        return format!("{:.2}s", ms / 1000.0);
    }
    if ms >= 1.0 {
        return format!("{ms:.2}ms");
    }
    format!("{:.0}us", ms * 1000.0)
}

/// Single rounded component in one of s, ms or us, for progress lines.
pub(crate) fn format_duration(d: Duration) -> String {
    let total_us = d.as_micros();

    const US_PER_MS: u128 = 1_000;
    const US_PER_S: u128 = 1_000_000;

    // Ties round up.
    fn round_div(value: u128, unit: u128) -> u128 {
        (value + (unit / 2)) / unit
    }

    if total_us >= US_PER_S {
        return format!("{}s", round_div(total_us, US_PER_S));
    }
    if total_us >= US_PER_MS {
        return format!("{}ms", round_div(total_us, US_PER_MS));
    }
    format!("{total_us}us")
}

/// Trend values named `*duration` are milliseconds; anything else is a plain number.
pub(crate) fn format_trend_value(metric: &str, v: f64) -> String {
    if metric.ends_with("duration") {
        format_ms(v)
    } else {
        format!("{v:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_in_a_single_unit() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "2s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_micros(40)), "40us");
    }

    #[test]
    fn millisecond_samples_pick_a_readable_unit() {
        assert_eq!(format_ms(0.5), "500us");
        assert_eq!(format_ms(12.346), "12.35ms");
        assert_eq!(format_ms(2500.0), "2.50s");
        assert_eq!(format_trend_value("notifications_count", 2.0), "2.00");
        assert_eq!(format_trend_value("http_req_duration", 2.0), "2.00ms");
        assert_eq!(format_percent(0.75), "75.00%");
    }
}
