use log::trace;

/// End delimiter marking a value with a unit suffix, e.g. `(000992.992*kWh)`.
/// Such values are kept as milli-units.
pub const UNIT_DELIMITER: u8 = b'*';

const MILLI_DIGITS: usize = 3;

/// Extracts the numeric value enclosed by `start` and `end`.
///
/// Both delimiters are searched from the right, a line like
/// `0-1:24.2.3(150531200000S)(00811.923*m3)` carries a timestamp field in
/// front of the value. Everything that does not look like a plain decimal
/// number yields 0.
pub fn extract_value(line: &[u8], start: u8, end: u8) -> i64 {
    let line = trim_line_end(line);

    // We need at least both delimiters
    if line.len() < 2 {
        return 0;
    }

    let (Some(s), Some(e)) = (rfind(line, start), rfind(line, end)) else {
        return 0;
    };

    if s >= e {
        trace!("Delimiters out of order in {:?}", String::from_utf8_lossy(line));
        return 0;
    }

    let candidate = &line[s + 1..e];
    let parsed = if end == UNIT_DELIMITER {
        parse_milli(candidate)
    } else {
        parse_whole(candidate)
    };

    return parsed.unwrap_or(0);
}

fn rfind(line: &[u8], needle: u8) -> Option<usize> {
    line.iter().rposition(|c| *c == needle)
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Splits `123.456` into its integer and fraction digits.
/// Only digits and a single dot are accepted.
fn split_decimal(text: &[u8]) -> Option<(&[u8], &[u8])> {
    if !text.iter().all(|c| c.is_ascii_digit() || *c == b'.') {
        return None;
    }

    let mut parts = text.splitn(2, |c| *c == b'.');
    let integer = parts.next().unwrap_or(&[]);
    let fraction = parts.next().unwrap_or(&[]);

    if fraction.contains(&b'.') {
        return None;
    }
    Some((integer, fraction))
}

fn digits_to_i64(digits: &[u8]) -> Option<i64> {
    let mut value: i64 = 0;
    for d in digits {
        value = value.checked_mul(10)?.checked_add((d - b'0') as i64)?;
    }
    Some(value)
}

fn parse_whole(text: &[u8]) -> Option<i64> {
    let (integer, _) = split_decimal(text)?;
    digits_to_i64(integer)
}

fn parse_milli(text: &[u8]) -> Option<i64> {
    let (integer, fraction) = split_decimal(text)?;

    let mut milli = digits_to_i64(integer)?.checked_mul(1000)?;

    let mut scale = 100;
    for d in fraction.iter().take(MILLI_DIGITS) {
        milli = milli.checked_add((d - b'0') as i64 * scale)?;
        scale /= 10;
    }

    // round half up on the first dropped digit
    if let Some(d) = fraction.get(MILLI_DIGITS) {
        if *d >= b'5' {
            milli = milli.checked_add(1)?;
        }
    }

    Some(milli)
}
