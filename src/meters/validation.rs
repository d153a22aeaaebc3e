use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

use super::RawMeter;

lazy_static! {
    static ref SERIAL_NUMBER: Regex = Regex::new(r"^[0-9]{12}$").unwrap();
    static ref PASSWORD: Regex = Regex::new(r"^[0-9]{8}$").unwrap();
}

pub const MIN_VERSION: i64 = 3;
pub const MAX_VERSION: i64 = 4;
pub const MIN_CT_RATIO: i64 = 100;
pub const MAX_CT_RATIO: i64 = 5000;

/// One rule a meter entry of the batch file broke
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub index: usize,
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "meters[{}].{} {}", self.index, self.field, self.reason)
    }
}

pub fn validate_meter(index: usize, meter: &RawMeter) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut violation = |field: &'static str, reason: String| {
        violations.push(Violation { index, field, reason });
    };

    if !SERIAL_NUMBER.is_match(&meter.serial_number) {
        violation("serialNumber", format!("must be exactly 12 decimal digits, got {:?}", meter.serial_number));
    }

    if meter.rs485_hub_id.chars().count() != 4 {
        violation("rs485HubId", format!("must be exactly 4 characters, got {:?}", meter.rs485_hub_id));
    }

    if !(MIN_VERSION..=MAX_VERSION).contains(&meter.version) {
        violation("version", format!("must be {} or {}, got {}", MIN_VERSION, MAX_VERSION, meter.version));
    }

    if let Some(password) = &meter.password {
        if !PASSWORD.is_match(password) {
            violation("password", "must be exactly 8 decimal digits".to_string());
        }
    }

    if let Some(ratio) = meter.ct_ratio {
        if !(MIN_CT_RATIO..=MAX_CT_RATIO).contains(&ratio) {
            violation("ctRatio", format!("must be between {} and {}, got {}", MIN_CT_RATIO, MAX_CT_RATIO, ratio));
        }
    }

    return violations;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawMeter {
        RawMeter {
            serial_number: "000300012345".to_string(),
            rs485_hub_id: "1a2b".to_string(),
            version: 4,
            password: Some("12345678".to_string()),
            ct_ratio: Some(400),
        }
    }

    #[test]
    fn test_valid_meter() {
        assert!(validate_meter(0, &raw()).is_empty());

        let mut m = raw();
        m.password = None;
        m.ct_ratio = None;
        assert!(validate_meter(0, &m).is_empty());
    }

    #[test]
    fn test_short_serial_number() {
        let mut m = raw();
        m.serial_number = "0003000123".to_string();
        let violations = validate_meter(7, &m);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].index, 7);
        assert_eq!(violations[0].field, "serialNumber");
        assert!(violations[0].to_string().starts_with("meters[7].serialNumber"));
    }

    #[test]
    fn test_reports_every_field() {
        let m = RawMeter {
            serial_number: "00030001234x".to_string(),
            rs485_hub_id: "1a2b3".to_string(),
            version: 5,
            password: Some("1234abcd".to_string()),
            ct_ratio: Some(5001),
        };
        let fields: Vec<&str> = validate_meter(0, &m).iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["serialNumber", "rs485HubId", "version", "password", "ctRatio"]);
    }

    #[test]
    fn test_ct_ratio_bounds() {
        let mut m = raw();
        m.ct_ratio = Some(100);
        assert!(validate_meter(0, &m).is_empty());
        m.ct_ratio = Some(5000);
        assert!(validate_meter(0, &m).is_empty());
        m.ct_ratio = Some(99);
        assert_eq!(validate_meter(0, &m).len(), 1);
    }
}
