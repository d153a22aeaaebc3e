/* EKM meters expect every decimal digit as its ASCII code in hex, "7" goes out as "37" */
pub fn encode_digits(digits: &str) -> String {
    let mut encoded = String::with_capacity(digits.len() * 2);

    for digit in digits.chars() {
        encoded.push('3');
        encoded.push(digit);
    }

    return encoded;
}

/// Encodes a current transformer ratio into the 4 digit field of the CT
/// message. Three digit ratios get a leading "30" so the field is always
/// 8 characters wide.
pub fn encode_ct_ratio(ratio: u16) -> String {
    let encoded = encode_digits(&ratio.to_string());

    if encoded.len() == 6 {
        return format!("30{}", encoded);
    }

    return encoded;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_digits() {
        assert_eq!(encode_digits("12"), "3132");
        assert_eq!(encode_digits("000000000042"), "303030303030303030303432");
        assert_eq!(encode_digits(""), "");
    }

    #[test]
    fn test_encode_digits_marks_every_position() {
        let input = "9081726354";
        let encoded = encode_digits(input);
        assert_eq!(encoded.len(), input.len() * 2);

        let bytes = encoded.as_bytes();
        for (i, digit) in input.bytes().enumerate() {
            assert_eq!(bytes[2 * i], b'3');
            assert_eq!(bytes[2 * i + 1], digit);
        }
    }

    #[test]
    fn test_encode_ct_ratio_pads_three_digits() {
        let encoded = encode_ct_ratio(250);
        assert_eq!(encoded, "30323530");
        assert_eq!(encoded.len(), 8);
        assert!(encoded.starts_with("30"));

        assert_eq!(encode_ct_ratio(100), "30313030");
    }

    #[test]
    fn test_encode_ct_ratio_four_digits() {
        assert_eq!(encode_ct_ratio(1200), "31323030");
        assert_eq!(encode_ct_ratio(5000), "35303030");
    }
}
