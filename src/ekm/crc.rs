use crc16::{State, MODBUS};
use log::debug;

use super::EkmMessageError;

/// CRC as the EKM meters want it: CRC-16/MODBUS, bytes swapped and the
/// high bit of both bytes cleared so the checksum stays printable.
pub fn calculate_crc(data: &[u8]) -> u16 {
    let mut state = State::<MODBUS>::new();
    state.update(data);

    return state.get().swap_bytes() & 0x7F7F;
}

/* The body is the hex string sent to the gateway, the leading SOH byte is not part of the CRC */
pub fn append_crc(body: &str) -> Result<String, EkmMessageError> {
    let bytes = hex::decode(body)?;
    let crc = match bytes.split_first() {
        Some((_, rest)) => calculate_crc(rest),
        None => calculate_crc(&[]),
    };

    debug!("CRC for {body} is {crc:04X}");
    return Ok(format!("{}{:04X}", body, crc));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_crc_password_message() {
        let body = "015031022831323334353637382903";
        assert_eq!(append_crc(body).unwrap(), format!("{body}7757"));
    }

    #[test]
    fn test_append_crc_ct_messages() {
        let body = "015731023030443028303235302903";
        assert_eq!(append_crc(body).unwrap(), format!("{body}7C2C"));

        let body = "015731023030443028313230302903";
        assert_eq!(append_crc(body).unwrap(), format!("{body}7D31"));
    }

    #[test]
    fn test_crc_is_printable() {
        let crc = calculate_crc(&[0xFF, 0x00, 0x12, 0x80, 0x7F]);
        assert_eq!(crc & 0x8080, 0);
    }

    #[test]
    fn test_append_crc_rejects_non_hex() {
        assert!(matches!(append_crc("01zz"), Err(EkmMessageError::InvalidHex(_))));
    }
}
