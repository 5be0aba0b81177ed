//! Raw ADC sample to physical unit conversion.
//!
//! Both functions reproduce the calibration the ESP boards were tuned
//! against, operation for operation. Do not simplify the arithmetic: the
//! relay thresholds users configure depend on the exact floating point
//! results.

use crate::types::RawReading;

/// Thermistor divider supply voltage
const THERM_VCC: f64 = 5.0;
/// Fixed divider resistor (10kΩ)
const THERM_R: f64 = 10_000.0;
/// Thermistor resistance at `THERM_T0` (100kΩ)
const THERM_R0: f64 = 100_000.0;
/// Thermistor Beta coefficient (K)
const THERM_B: f64 = 3950.0;
/// Reference temperature from the datasheet, 30°C in Kelvin
const THERM_T0: f64 = 30.0 + 273.15;
const KELVIN_OFFSET: f64 = 273.15;
const MAX_CELSIUS: f64 = 100.0;

/// LDR divider supply voltage
const LDR_VIN: f64 = 3.3;
/// Fixed divider resistor (1MΩ)
const LDR_R: f64 = 1_000_000.0;
const MIN_LUX: f64 = 0.001;
const MAX_LUX: f64 = 100_000.0;

/// Convert a thermistor sample to degrees Celsius.
///
/// Uses the Beta parameter equation over a 10kΩ / 100kΩ NTC divider. The
/// result is capped at 100°C; there is no lower bound, and both ends of the
/// ADC range (0 and 1023) come out as absolute zero.
///
/// ```
/// let c = analogreader::to_celsius(900);
/// assert!((c - 37.446).abs() < 0.001);
/// ```
pub fn to_celsius(raw: RawReading) -> f64 {
    let vrt = (THERM_VCC / 1023.0) * f64::from(raw);
    let vr = THERM_VCC - vrt;
    let rt = vrt / (vr / THERM_R);

    let ln = (rt / THERM_R0).ln();
    let tx = 1.0 / ((ln / THERM_B) + (1.0 / THERM_T0));

    let celsius = tx - KELVIN_OFFSET;
    if celsius > MAX_CELSIUS {
        MAX_CELSIUS
    } else {
        celsius
    }
}

/// Convert a photoresistor sample to a lux-like brightness value.
///
/// Not a calibrated lux reading (the LDR is non-linear), but monotonic
/// enough to threshold on. Clamped to `[0.001, 100000.0]`.
///
/// Rough guide: dark indoors ~125, normal indoors ~700, bright indoors
/// ~3000, outdoors saturates the sensor.
pub fn to_lux(raw: RawReading) -> f64 {
    let vout = f64::from(raw) * (LDR_VIN / 1024.0);
    let rldr = (LDR_R * (LDR_VIN - vout)) / LDR_VIN;

    let lux = (LDR_R - rldr) / LDR_R * 10_000.0 / (LDR_VIN - vout);
    if lux > MAX_LUX {
        return MAX_LUX;
    }
    if lux < MIN_LUX {
        return MIN_LUX;
    }
    lux
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn celsius_never_exceeds_cap() {
        for raw in 0..=1023 {
            assert!(to_celsius(raw) <= 100.0, "raw {raw}");
        }
    }

    #[test]
    fn celsius_reference_points() {
        assert_close(to_celsius(512), 95.00340168077054);
        assert_close(to_celsius(700), 70.30747043885981);
        assert_close(to_celsius(900), 37.44616046331106);
        assert_close(to_celsius(1000), -0.7273612027407239);
    }

    #[test]
    fn celsius_low_samples_hit_the_cap() {
        assert_eq!(to_celsius(1), 100.0);
        assert_eq!(to_celsius(100), 100.0);
    }

    #[test]
    fn celsius_range_ends_are_absolute_zero() {
        assert_close(to_celsius(0), -273.15);
        assert_close(to_celsius(1023), -273.15);
    }

    #[test]
    fn celsius_threshold_boundary_is_between_929_and_930() {
        assert!(to_celsius(929) >= 30.0);
        assert!(to_celsius(930) < 30.0);
    }

    #[test]
    fn lux_stays_in_range() {
        for raw in 0..=1023 {
            let lux = to_lux(raw);
            assert!((0.001..=100_000.0).contains(&lux), "raw {raw} -> {lux}");
        }
    }

    #[test]
    fn lux_reference_points() {
        assert_eq!(to_lux(0), 0.001);
        assert_close(to_lux(1), 2.9621730501499437);
        assert_close(to_lux(100), 327.9548734094189);
        assert_close(to_lux(512), 3030.3030303030305);
        assert_close(to_lux(900), 21994.134897360713);
    }

    #[test]
    fn lux_saturates_near_full_scale() {
        assert_eq!(to_lux(994), 100_000.0);
        assert_eq!(to_lux(1023), 100_000.0);
        assert!(to_lux(993) < 100_000.0);
    }
}
