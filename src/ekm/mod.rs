use std::fmt;
use thiserror::Error;

use crate::meters::MeterConfig;

pub mod crc;
pub mod encoding;

/// Status code of a positive acknowledgment in an RS485 response
pub const ACK: &str = "06";

const IDENTIFY_PREFIX: &str = "2F3F";
const IDENTIFY_V4_SUFFIX: &str = "3030";
const IDENTIFY_SUFFIX: &str = "210D0A";

const PASSWORD_PREFIX: &str = "0150310228";
const PASSWORD_SUFFIX: &str = "2903";

const CT_RATIO_PREFIX: &str = "01573102";
const CT_RATIO_FIELD: &str = "30304430";
const CT_RATIO_MIDDLE: &str = "28";
const CT_RATIO_SUFFIX: &str = "2903";

/* Close the programming session, CRC already included */
const TERMINATE: &str = "0142300375";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EkmMessageError {
    #[error("Meter has no password configured")]
    MissingPassword,
    #[error("Meter has no CT ratio configured")]
    MissingCtRatio,
    #[error("Message body is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// The four requests of the configuration handshake, in the order they are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Identify,
    Password,
    CtRatio,
    Terminate,
}

impl MessageKind {
    /// The request that follows an accepted acknowledgment of this one
    pub fn next(self) -> Option<MessageKind> {
        match self {
            MessageKind::Identify => Some(MessageKind::Password),
            MessageKind::Password => Some(MessageKind::CtRatio),
            MessageKind::CtRatio => Some(MessageKind::Terminate),
            MessageKind::Terminate => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Identify => "identify",
            MessageKind::Password => "set password",
            MessageKind::CtRatio => "set CT ratio",
            MessageKind::Terminate => "terminate",
        };
        write!(f, "{}", name)
    }
}

pub fn identify_message(meter: &MeterConfig) -> String {
    let suffix = if meter.version == 4 { IDENTIFY_V4_SUFFIX } else { "" };
    return format!("{}{}{}{}", IDENTIFY_PREFIX, meter.encoded_serial, suffix, IDENTIFY_SUFFIX);
}

pub fn password_message(meter: &MeterConfig) -> Result<String, EkmMessageError> {
    let password = meter.encoded_password.as_ref().ok_or(EkmMessageError::MissingPassword)?;
    return crc::append_crc(&format!("{}{}{}", PASSWORD_PREFIX, password, PASSWORD_SUFFIX));
}

pub fn ct_ratio_message(meter: &MeterConfig) -> Result<String, EkmMessageError> {
    let ratio = meter.encoded_ct_ratio.as_ref().ok_or(EkmMessageError::MissingCtRatio)?;
    return crc::append_crc(&format!("{}{}{}{}{}",
                                    CT_RATIO_PREFIX, CT_RATIO_FIELD, CT_RATIO_MIDDLE, ratio, CT_RATIO_SUFFIX));
}

pub fn terminate_message() -> String {
    return TERMINATE.to_string();
}

/// Builds the body for any step of the handshake
pub fn build_message(kind: MessageKind, meter: &MeterConfig) -> Result<String, EkmMessageError> {
    match kind {
        MessageKind::Identify => Ok(identify_message(meter)),
        MessageKind::Password => password_message(meter),
        MessageKind::CtRatio => ct_ratio_message(meter),
        MessageKind::Terminate => Ok(terminate_message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meters::RawMeter;

    fn meter(version: i64, password: Option<&str>, ct_ratio: Option<i64>) -> MeterConfig {
        MeterConfig::prepare(RawMeter {
            serial_number: "000300012345".to_string(),
            rs485_hub_id: "1a2b".to_string(),
            version,
            password: password.map(|p| p.to_string()),
            ct_ratio,
        })
    }

    #[test]
    fn test_identify_message_v3() {
        let m = meter(3, None, None);
        assert_eq!(identify_message(&m), "2F3F303030333030303132333435210D0A");
    }

    #[test]
    fn test_identify_message_v4_suffix() {
        let m = meter(4, None, None);
        assert_eq!(identify_message(&m), "2F3F3030303330303031323334353030210D0A");
    }

    #[test]
    fn test_password_message() {
        let m = meter(4, Some("12345678"), Some(250));
        assert_eq!(password_message(&m).unwrap(), "0150310228313233343536373829037757");
    }

    #[test]
    fn test_ct_ratio_message() {
        let m = meter(4, Some("12345678"), Some(250));
        assert_eq!(ct_ratio_message(&m).unwrap(), "0157310230304430283032353029037C2C");

        let m = meter(3, Some("12345678"), Some(1200));
        assert_eq!(ct_ratio_message(&m).unwrap(), "0157310230304430283132303029037D31");
    }

    #[test]
    fn test_messages_are_deterministic() {
        let m = meter(3, Some("00000000"), Some(5000));
        for kind in [MessageKind::Identify, MessageKind::Password, MessageKind::CtRatio, MessageKind::Terminate] {
            assert_eq!(build_message(kind, &m), build_message(kind, &m));
        }
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let m = meter(3, None, None);
        assert_eq!(password_message(&m), Err(EkmMessageError::MissingPassword));
        assert_eq!(ct_ratio_message(&m), Err(EkmMessageError::MissingCtRatio));
        assert_eq!(build_message(MessageKind::Terminate, &m).unwrap(), "0142300375");
    }
}
