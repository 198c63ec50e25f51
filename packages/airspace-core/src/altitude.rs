// Altitude band strings ("5000ft", "FL100") and their conversion.
//
// Conversions are total: anything unreadable is 0.

pub const FEET_TO_METERS: f64 = 0.3048;

/// GeoJSON `unit` code for flight levels.
pub const UNIT_FLIGHT_LEVEL: i64 = 6;

/// Altitude band in feet.
pub fn parse_feet(band: &str) -> f64 {
    let band = band.trim();
    let upper = band.to_ascii_uppercase();

    let feet = if let Some(level) = upper.strip_prefix("FL") {
        level.trim().parse::<f64>().map(|fl| fl * 100.0)
    } else {
        upper
            .strip_suffix("FT")
            .unwrap_or(&upper)
            .trim()
            .parse::<f64>()
    };

    match feet {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Altitude band in meters.
pub fn parse_meters(band: &str) -> f64 {
    parse_feet(band) * FEET_TO_METERS
}

pub fn feet_to_meters(feet: f64) -> f64 {
    feet * FEET_TO_METERS
}

// Format a GeoJSON {value, unit} limit the way records store it
pub fn format_limit(value: i64, unit: i64) -> String {
    if unit == UNIT_FLIGHT_LEVEL {
        format!("FL{}", value)
    } else {
        format!("{}ft", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn flight_levels_are_hundreds_of_feet() {
        assert!(close(parse_meters("FL100"), 3048.0));
        assert!(close(parse_meters("fl 45"), 4500.0 * FEET_TO_METERS));
        assert!(close(parse_feet("FL100"), 10000.0));
    }

    #[test]
    fn plain_values_are_feet() {
        assert!(close(parse_meters("5000ft"), 1524.0));
        assert!(close(parse_meters(" 5000 FT "), 1524.0));
        assert!(close(parse_meters("5000"), 1524.0));
    }

    #[test]
    fn malformed_bands_are_zero() {
        for band in ["", "SFC", "FL", "ftft", "12m", "FLxyz", "NaN", "inf"] {
            assert_eq!(parse_meters(band), 0.0, "{band:?}");
        }
    }

    #[test]
    fn limits_format_round_trip() {
        assert_eq!(format_limit(100, UNIT_FLIGHT_LEVEL), "FL100");
        assert_eq!(format_limit(5000, 1), "5000ft");
        assert!(close(parse_meters(&format_limit(100, UNIT_FLIGHT_LEVEL)), 3048.0));
    }
}
