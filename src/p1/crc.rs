/// Reflected form of the CRC-16 polynomial 0x8005 used by DSMR P1 telegrams.
const POLYNOMIAL: u16 = 0xA001;

/// Folds the bytes into a running CRC-16 state, one bit at a time.
///
/// The caller keeps the state between calls, a telegram starts from 0.
pub fn crc16_update(mut crc: u16, bytes: &[u8]) -> u16 {
    for byte in bytes {
        crc ^= *byte as u16;

        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }
    return crc;
}

/// Parses the four hex digits after the end marker.
///
/// Anything else than exactly four hex digits at the start of `trailer`
/// is treated as no checksum at all.
pub fn parse_trailer(trailer: &[u8]) -> Option<u16> {
    let digits = trailer.get(..4)?;

    let mut value: u16 = 0;
    for digit in digits {
        let nibble = (*digit as char).to_digit(16)?;
        value = (value << 4) | nibble as u16;
    }
    Some(value)
}

/// Compares the accumulated state against the trailer sent by the meter.
/// A malformed trailer never validates.
pub fn verify_trailer(crc: u16, trailer: &[u8]) -> bool {
    match parse_trailer(trailer) {
        Some(expected) => expected == crc,
        None => false,
    }
}
