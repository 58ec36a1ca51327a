//! Utility functions for the isdt-air-ble crate.

use std::time::Duration;

/// Convert a fixed-point milli-unit reading (mV, mA, mWh) to base units.
///
/// # Example
///
/// ```
/// use isdt_air_ble::milli_to_unit;
///
/// let volts = milli_to_unit(4200);
/// assert!((volts - 4.2).abs() < 0.0001);
/// ```
#[inline]
pub fn milli_to_unit(milli: u32) -> f64 {
    milli as f64 / 1000.0
}

/// Convert a raw internal resistance reading (0.1 mΩ units) to mΩ.
///
/// # Example
///
/// ```
/// use isdt_air_ble::raw_ir_to_milliohm;
///
/// assert!((raw_ir_to_milliohm(425) - 42.5).abs() < 0.0001);
/// ```
#[inline]
pub fn raw_ir_to_milliohm(raw: u16) -> f64 {
    raw as f64 / 10.0
}

/// Format a duration as `HH:MM:SS`, truncating sub-second precision.
///
/// Hours are not wrapped, so long charges read e.g. `27:03:09`.
///
/// # Example
///
/// ```
/// use isdt_air_ble::format_work_period;
/// use std::time::Duration;
///
/// assert_eq!(format_work_period(Duration::from_millis(3_723_999)), "01:02:03");
/// ```
pub fn format_work_period(period: Duration) -> String {
    let total = period.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milli_to_unit() {
        assert_eq!(milli_to_unit(0), 0.0);
        assert!((milli_to_unit(1500) - 1.5).abs() < 0.0001);
        assert!((milli_to_unit(12_345) - 12.345).abs() < 0.0001);
    }

    #[test]
    fn test_raw_ir_to_milliohm() {
        assert!((raw_ir_to_milliohm(1) - 0.1).abs() < 0.0001);
        assert!((raw_ir_to_milliohm(9999) - 999.9).abs() < 0.0001);
    }

    #[test]
    fn test_format_work_period() {
        assert_eq!(format_work_period(Duration::ZERO), "00:00:00");
        assert_eq!(format_work_period(Duration::from_secs(59)), "00:00:59");
        assert_eq!(format_work_period(Duration::from_secs(3600)), "01:00:00");
        assert_eq!(format_work_period(Duration::from_secs(97_389)), "27:03:09");
    }
}
