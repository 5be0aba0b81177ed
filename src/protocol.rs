use crate::types::{RawReading, RelayId, MAX_RAW_READING};

/// Command sent to switch relay 3 on
pub const RELAY_ON: &str = "R31\n";

/// Command sent to switch relay 3 off
pub const RELAY_OFF: &str = "R30\n";

/// A decoded line from the ESP peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLine {
    /// `A<marker><int> ...` analog sample
    Reading { raw: RawReading },
    /// `R<relay><0|1>` relay state echo
    RelayEcho { relay: RelayId, state: bool },
    /// Empty line or bare line terminator
    Blank,
}

/// Decode one line received from the peer.
///
/// Returns `None` for anything that is not understood: unknown command tags,
/// readings without digits or outside the ADC range, truncated relay echoes.
/// Those lines are ignored by callers.
pub fn decode(line: &str) -> Option<DeviceLine> {
    let mut chars = line.chars();
    let tag = match chars.next() {
        None | Some('\n') | Some('\r') => return Some(DeviceLine::Blank),
        Some(tag) => tag,
    };
    let payload = chars.as_str();

    match tag {
        'A' => decode_reading(payload),
        'R' => decode_relay(payload),
        _ => None,
    }
}

/// Encode a relay command for the accessory's relay channel
pub fn encode_relay(on: bool) -> &'static str {
    if on {
        RELAY_ON
    } else {
        RELAY_OFF
    }
}

fn decode_reading(payload: &str) -> Option<DeviceLine> {
    let token = payload.split(' ').next().unwrap_or_default();
    // first character is a unit marker
    let mut digits = token.chars();
    digits.next()?;

    let raw = parse_leading_int(digits.as_str())?;
    if !(0..=MAX_RAW_READING).contains(&raw) {
        return None;
    }
    Some(DeviceLine::Reading { raw })
}

fn decode_relay(payload: &str) -> Option<DeviceLine> {
    let mut chars = payload.chars();
    let relay = chars.next()?;
    let state = chars.next()?;
    Some(DeviceLine::RelayEcho {
        relay,
        state: state == '1',
    })
}

/// Parse an integer prefix, ignoring anything after the digits.
///
/// The firmware sometimes glues a unit or carriage return to the number, so
/// `"512\r"` and `"512mV"` both read as 512.
fn parse_leading_int(s: &str) -> Option<RawReading> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }

    let value: RawReading = rest[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_analog_reading() {
        assert_eq!(
            decode("AV512 3.3 ok"),
            Some(DeviceLine::Reading { raw: 512 })
        );
        assert_eq!(decode("A0930"), Some(DeviceLine::Reading { raw: 930 }));
    }

    #[test]
    fn reading_tolerates_trailing_garbage() {
        assert_eq!(decode("AV512\r"), Some(DeviceLine::Reading { raw: 512 }));
        assert_eq!(decode("AV77mV x"), Some(DeviceLine::Reading { raw: 77 }));
    }

    #[test]
    fn reading_without_digits_is_ignored() {
        assert_eq!(decode("A"), None);
        assert_eq!(decode("AV"), None);
        assert_eq!(decode("AVxyz 1"), None);
    }

    #[test]
    fn reading_outside_adc_range_is_ignored() {
        assert_eq!(decode("AV1024"), None);
        assert_eq!(decode("AV-1"), None);
        assert_eq!(decode("AV1023"), Some(DeviceLine::Reading { raw: 1023 }));
        assert_eq!(decode("AV0"), Some(DeviceLine::Reading { raw: 0 }));
    }

    #[test]
    fn decodes_relay_echo() {
        assert_eq!(
            decode("R31"),
            Some(DeviceLine::RelayEcho {
                relay: '3',
                state: true
            })
        );
        assert_eq!(
            decode("R30"),
            Some(DeviceLine::RelayEcho {
                relay: '3',
                state: false
            })
        );
        assert_eq!(
            decode("R11"),
            Some(DeviceLine::RelayEcho {
                relay: '1',
                state: true
            })
        );
    }

    #[test]
    fn relay_state_other_than_one_is_off() {
        assert_eq!(
            decode("R3x"),
            Some(DeviceLine::RelayEcho {
                relay: '3',
                state: false
            })
        );
    }

    #[test]
    fn truncated_relay_echo_is_ignored() {
        assert_eq!(decode("R"), None);
        assert_eq!(decode("R3"), None);
    }

    #[test]
    fn blank_lines() {
        assert_eq!(decode(""), Some(DeviceLine::Blank));
        assert_eq!(decode("\n"), Some(DeviceLine::Blank));
        assert_eq!(decode("\r"), Some(DeviceLine::Blank));
        assert_eq!(decode("\r\n"), Some(DeviceLine::Blank));
    }

    #[test]
    fn unknown_tags_are_ignored() {
        assert_eq!(decode("X123"), None);
        assert_eq!(decode("hello"), None);
        assert_eq!(decode(" AV512"), None);
    }

    #[test]
    fn relay_commands() {
        assert_eq!(encode_relay(true), "R31\n");
        assert_eq!(encode_relay(false), "R30\n");
    }
}
