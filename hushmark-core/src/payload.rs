//! Payload representations and conversions.
//!
//! The engine carries exactly five bytes. Callers supply them in one of three
//! views: a list of five decimal bytes, a short UTF-8 text, or a 40-character
//! bit string. Everything here is pure and allocation-light.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Payload size in bytes.
pub const PAYLOAD_BYTES: usize = 5;
/// Payload size in bits.
pub const PAYLOAD_BITS: usize = PAYLOAD_BYTES * 8;

/// A 40-bit watermark payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Payload {
    data: [u8; PAYLOAD_BYTES],
}

impl Payload {
    /// Create a payload from a 5-byte array.
    pub fn new(data: [u8; PAYLOAD_BYTES]) -> Self {
        Self { data }
    }

    /// Create a payload from unchecked integer values.
    ///
    /// Fails with [`Error::InvalidPayload`] unless there are exactly five
    /// values, each in `0..=255`.
    pub fn from_values(values: &[i64]) -> Result<Self> {
        check_values(values)
            .map(Self::new)
            .map_err(Error::InvalidPayload)
    }

    /// Pack UTF-8 text into a payload, zero-padding or truncating to 5 bytes.
    pub fn from_text(text: &str) -> Self {
        let mut data = [0u8; PAYLOAD_BYTES];
        for (slot, byte) in data.iter_mut().zip(text.bytes()) {
            *slot = byte;
        }
        Self { data }
    }

    /// Parse a 40-bit string (MSB first per byte). Spaces and underscores are
    /// ignored.
    pub fn from_binary(bits: &str) -> Result<Self> {
        let clean = strip_separators(bits);
        check_bits(&clean).map_err(Error::InvalidFormat)?;

        let mut data = [0u8; PAYLOAD_BYTES];
        for (byte, group) in data.iter_mut().zip(clean.as_bytes().chunks_exact(8)) {
            *byte = group
                .iter()
                .fold(0u8, |acc, &bit| (acc << 1) | (bit - b'0'));
        }
        Ok(Self { data })
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; PAYLOAD_BYTES] {
        &self.data
    }

    /// Bytes widened to the integer form the engine protocol uses.
    pub fn to_values(&self) -> [i64; PAYLOAD_BYTES] {
        self.data.map(i64::from)
    }

    /// Decode as UTF-8, dropping invalid sequences and trailing NUL bytes.
    pub fn to_text(&self) -> String {
        let text = decode_utf8_skipping_invalid(&self.data);
        text.trim_end_matches('\0').to_string()
    }

    /// Render as a 40-character bit string.
    pub fn to_binary(&self) -> String {
        self.data.iter().map(|b| format!("{b:08b}")).collect()
    }
}

impl From<[u8; PAYLOAD_BYTES]> for Payload {
    fn from(data: [u8; PAYLOAD_BYTES]) -> Self {
        Self::new(data)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e] = self.data;
        write!(f, "[{a}, {b}, {c}, {d}, {e}]")
    }
}

/// The three human-facing payload views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Five comma-separated decimal bytes, e.g. `72,101,108,108,111`.
    Numeric,
    /// UTF-8 text, at most five bytes are kept.
    Text,
    /// 40 characters of `0`/`1`, spaces and underscores allowed as separators.
    Binary,
}

impl PayloadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadFormat::Numeric => "numeric",
            PayloadFormat::Text => "text",
            PayloadFormat::Binary => "binary",
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "numeric" => Ok(PayloadFormat::Numeric),
            "text" => Ok(PayloadFormat::Text),
            "binary" => Ok(PayloadFormat::Binary),
            other => Err(Error::InvalidFormat(format!(
                "invalid format type: {other}. Must be 'numeric', 'text', or 'binary'"
            ))),
        }
    }
}

/// Convert text to its numeric payload. Never fails.
pub fn text_to_numeric(text: &str) -> Payload {
    Payload::from_text(text)
}

/// Convert a 40-bit string to its numeric payload.
pub fn binary_to_numeric(bits: &str) -> Result<Payload> {
    Payload::from_binary(bits)
}

/// Convert five byte values to text.
pub fn numeric_to_text(values: &[i64]) -> Result<String> {
    let data = check_values(values).map_err(Error::InvalidFormat)?;
    Ok(Payload::new(data).to_text())
}

/// Convert five byte values to a 40-bit string.
pub fn numeric_to_binary(values: &[i64]) -> Result<String> {
    let data = check_values(values).map_err(Error::InvalidFormat)?;
    Ok(Payload::new(data).to_binary())
}

/// Check a message against its declared format without converting it.
///
/// Numeric messages are the comma-separated form front ends accept. The
/// first problem found is reported as [`Error::InvalidFormat`].
pub fn validate(message: &str, format: PayloadFormat) -> Result<()> {
    let outcome = match format {
        PayloadFormat::Numeric => parse_numeric(message).map(|_| ()),
        PayloadFormat::Text => {
            if message.is_empty() {
                Err("text message cannot be empty".to_string())
            } else {
                Ok(())
            }
        }
        PayloadFormat::Binary => check_bits(&strip_separators(message)),
    };
    outcome.map_err(Error::InvalidFormat)
}

/// Validate a message and convert it to a payload.
pub fn parse_message(message: &str, format: PayloadFormat) -> Result<Payload> {
    validate(message, format)?;
    match format {
        PayloadFormat::Numeric => parse_numeric(message)
            .map(Payload::new)
            .map_err(Error::InvalidFormat),
        PayloadFormat::Text => Ok(text_to_numeric(message)),
        PayloadFormat::Binary => binary_to_numeric(message),
    }
}

fn strip_separators(bits: &str) -> String {
    bits.chars().filter(|c| *c != ' ' && *c != '_').collect()
}

fn check_bits(clean: &str) -> std::result::Result<(), String> {
    let len = clean.chars().count();
    if len != PAYLOAD_BITS {
        return Err(format!(
            "binary message must be exactly {PAYLOAD_BITS} bits, got {len}"
        ));
    }
    if !clean.chars().all(|c| c == '0' || c == '1') {
        return Err("binary message must contain only '0' and '1' characters".to_string());
    }
    Ok(())
}

fn check_values(values: &[i64]) -> std::result::Result<[u8; PAYLOAD_BYTES], String> {
    if values.len() != PAYLOAD_BYTES {
        return Err(format!(
            "numeric message must have exactly {PAYLOAD_BYTES} integers, got {}",
            values.len()
        ));
    }
    let mut data = [0u8; PAYLOAD_BYTES];
    for (i, (slot, &value)) in data.iter_mut().zip(values).enumerate() {
        *slot = u8::try_from(value)
            .map_err(|_| format!("value at index {i} must be between 0 and 255, got {value}"))?;
    }
    Ok(data)
}

fn parse_numeric(message: &str) -> std::result::Result<[u8; PAYLOAD_BYTES], String> {
    let parts: Vec<&str> = message.split(',').map(str::trim).collect();
    if parts.len() != PAYLOAD_BYTES {
        return Err(format!(
            "numeric message must have exactly {PAYLOAD_BYTES} integers, got {}",
            parts.len()
        ));
    }
    let mut values = [0i64; PAYLOAD_BYTES];
    for (i, (slot, part)) in values.iter_mut().zip(&parts).enumerate() {
        *slot = part
            .parse::<i64>()
            .map_err(|_| format!("value at index {i} must be an integer, got '{part}'"))?;
    }
    check_values(&values)
}

/// UTF-8 decode that silently drops invalid or truncated sequences.
fn decode_utf8_skipping_invalid(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    out.push_str(valid);
                }
                let skip = e.error_len().unwrap_or(rest.len());
                bytes = &rest[skip..];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn text_to_numeric_known_values() {
        assert_eq!(text_to_numeric("hello").as_bytes(), &[104, 101, 108, 108, 111]);
        assert_eq!(text_to_numeric("hi").as_bytes(), &[104, 105, 0, 0, 0]);
        assert_eq!(text_to_numeric("").as_bytes(), &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn text_to_numeric_truncates_long_text() {
        assert_eq!(
            text_to_numeric("hello world").as_bytes(),
            &[104, 101, 108, 108, 111]
        );
    }

    #[test]
    fn text_to_numeric_truncates_mid_character() {
        // "é" is two bytes; the fifth slot takes only its first byte.
        let payload = text_to_numeric("abcdé");
        assert_eq!(payload.as_bytes(), &[97, 98, 99, 100, 0xC3]);
        // The orphaned lead byte is dropped on decode.
        assert_eq!(payload.to_text(), "abcd");
    }

    #[test]
    fn binary_to_numeric_extremes() {
        assert_eq!(binary_to_numeric(&"0".repeat(40)).unwrap().as_bytes(), &[0; 5]);
        assert_eq!(
            binary_to_numeric(&"1".repeat(40)).unwrap().as_bytes(),
            &[255; 5]
        );
    }

    #[test]
    fn binary_to_numeric_ignores_separators() {
        let bits = "00000001 00000010_00000011 0000_0100 00000101";
        assert_eq!(binary_to_numeric(bits).unwrap().as_bytes(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn binary_to_numeric_rejects_bad_input() {
        assert!(matches!(
            binary_to_numeric(&"0".repeat(39)),
            Err(Error::InvalidFormat(_))
        ));
        let mut bits = "0".repeat(39);
        bits.push('2');
        assert!(matches!(binary_to_numeric(&bits), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn numeric_to_binary_known_value() {
        assert_eq!(
            numeric_to_binary(&[1, 2, 3, 4, 5]).unwrap(),
            "0000000100000010000000110000010000000101"
        );
    }

    #[test]
    fn numeric_conversions_validate_input() {
        assert!(matches!(
            numeric_to_binary(&[1, 2, 3, 4]),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            numeric_to_text(&[1, 2, 3, 4, 256]),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            numeric_to_text(&[-1, 2, 3, 4, 5]),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn numeric_to_text_strips_only_trailing_nul() {
        assert_eq!(numeric_to_text(&[104, 105, 0, 0, 0]).unwrap(), "hi");
        assert_eq!(numeric_to_text(&[104, 0, 105, 0, 0]).unwrap(), "h\0i");
    }

    #[test]
    fn binary_round_trip() {
        let samples = [
            "0101010101010101010101010101010101010101",
            "1111000011001100101010100000000111111110",
            "0000000100000010000000110000010000000101",
        ];
        for bits in samples {
            let payload = binary_to_numeric(bits).unwrap();
            assert_eq!(numeric_to_binary(&payload.to_values()).unwrap(), bits);
        }
    }

    #[test]
    fn text_round_trip() {
        for text in ["hello", "hi", "a", "é", "日", "a\0b", "€u"] {
            let payload = text_to_numeric(text);
            assert_eq!(numeric_to_text(&payload.to_values()).unwrap(), text);
        }
    }

    /// Up to five bytes of valid UTF-8 mixing one-, two- and multi-byte
    /// characters, without trailing NULs.
    fn random_text(rng: &mut StdRng) -> String {
        let mut text = String::new();
        loop {
            let c = match rng.random_range(0..4) {
                0 => char::from(rng.random_range(0u8..0x80)),
                1 => char::from_u32(rng.random_range(0x80u32..0x800)).unwrap_or('é'),
                _ => rng.random::<char>(),
            };
            if text.len() + c.len_utf8() > PAYLOAD_BYTES {
                break;
            }
            text.push(c);
        }
        while text.ends_with('\0') {
            text.pop();
        }
        text
    }

    #[test]
    fn binary_round_trip_random() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..2000 {
            let bits: String = (0..PAYLOAD_BYTES * 8)
                .map(|_| if rng.random::<bool>() { '1' } else { '0' })
                .collect();
            let payload = binary_to_numeric(&bits).unwrap();
            assert_eq!(numeric_to_binary(&payload.to_values()).unwrap(), bits);
        }
    }

    #[test]
    fn text_round_trip_random() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2000 {
            let text = random_text(&mut rng);
            assert!(text.len() <= PAYLOAD_BYTES);
            let payload = text_to_numeric(&text);
            assert_eq!(
                numeric_to_text(&payload.to_values()).unwrap(),
                text,
                "bytes {:?}",
                text.as_bytes()
            );
        }
    }

    #[test]
    fn from_values_reports_invalid_payload() {
        assert_eq!(
            Payload::from_values(&[72, 101, 108, 108, 111]).unwrap(),
            Payload::new(*b"Hello")
        );
        assert!(matches!(
            Payload::from_values(&[72, 101, 108]),
            Err(Error::InvalidPayload(_))
        ));
        match Payload::from_values(&[0, 0, 300, 0, -4]) {
            Err(Error::InvalidPayload(msg)) => assert!(msg.contains("index 2"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn validate_numeric_messages() {
        assert!(validate("100,150,200,50,75", PayloadFormat::Numeric).is_ok());
        assert!(validate(" 1, 2 ,3,4 , 5 ", PayloadFormat::Numeric).is_ok());

        let err = validate("1,2,3,4", PayloadFormat::Numeric).unwrap_err();
        assert!(err.to_string().contains("got 4"), "{err}");

        let err = validate("1,2,x,4,5", PayloadFormat::Numeric).unwrap_err();
        assert!(err.to_string().contains("index 2"), "{err}");

        let err = validate("1,2,3,999,5", PayloadFormat::Numeric).unwrap_err();
        assert!(err.to_string().contains("index 3"), "{err}");
    }

    #[test]
    fn validate_text_and_binary_messages() {
        assert!(validate("Hello", PayloadFormat::Text).is_ok());
        assert!(validate("", PayloadFormat::Text).is_err());

        assert!(validate(&"01".repeat(20), PayloadFormat::Binary).is_ok());
        assert!(validate("0101 0101", PayloadFormat::Binary).is_err());
        assert!(validate(&"0a".repeat(20), PayloadFormat::Binary).is_err());
    }

    #[test]
    fn parse_message_per_format() {
        let expected = Payload::new(*b"Hello");
        assert_eq!(
            parse_message("72,101,108,108,111", PayloadFormat::Numeric).unwrap(),
            expected
        );
        assert_eq!(parse_message("Hello", PayloadFormat::Text).unwrap(), expected);
        assert_eq!(
            parse_message(&expected.to_binary(), PayloadFormat::Binary).unwrap(),
            expected
        );
    }

    #[test]
    fn format_names_parse() {
        for format in [
            PayloadFormat::Numeric,
            PayloadFormat::Text,
            PayloadFormat::Binary,
        ] {
            assert_eq!(format.as_str().parse::<PayloadFormat>().unwrap(), format);
        }
        assert!("hex".parse::<PayloadFormat>().is_err());
    }

    #[test]
    fn display_lists_bytes() {
        assert_eq!(Payload::new([1, 2, 3, 4, 5]).to_string(), "[1, 2, 3, 4, 5]");
    }
}
