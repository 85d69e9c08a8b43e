use super::crc::{crc16_update, verify_trailer};
use super::field::extract_value;
use super::registry::{MetricId, MetricRegistry};
use log::{debug, trace, warn};

/// Longest line we accept without its CR LF, anything above is cut off.
pub const MAX_LINE_LENGTH: usize = 1050;

pub const START_MARKER: u8 = b'/';
pub const END_MARKER: u8 = b'!';

#[derive(Debug, Clone, Copy, PartialEq)]
enum DecoderState {
    Idle,
    InTelegram,
}

/// Result of feeding a single line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineOutcome {
    /// Telegram still in progress, or line outside of any telegram
    Continue,
    /// End marker seen and the checksum matched, readings were committed
    Valid,
    /// End marker seen but the telegram did not check out, readings dropped
    Invalid,
}

/// Feeds telegram lines through the checksum and picks out the readings.
///
/// Readings are staged while the telegram is in progress and only handed to
/// the registry once the checksum validated. Checksum and staged readings
/// survive between calls, so a telegram may arrive spread over several polls.
pub struct LineDecoder {
    state: DecoderState,
    crc: u16,
    staged: Vec<(MetricId, i64)>,
    buffer: Vec<u8>,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            crc: 0,
            staged: Vec::new(),
            buffer: Vec::with_capacity(MAX_LINE_LENGTH + 2),
        }
    }

    pub fn in_telegram(&self) -> bool {
        self.state == DecoderState::InTelegram
    }

    pub fn decode_line(&mut self, registry: &mut MetricRegistry, line: &[u8]) -> LineOutcome {
        self.fill_buffer(line);
        trace!("P1 line: {:?}", String::from_utf8_lossy(&self.buffer));

        if let Some(start) = start_marker(&self.buffer) {
            if self.state == DecoderState::InTelegram {
                warn!("Start of a new telegram before the end of the last one, dropping {} readings", self.staged.len());
            }
            self.staged.clear();
            self.crc = crc16_update(0, &self.buffer[start..]);
            self.state = DecoderState::InTelegram;
            return LineOutcome::Continue;
        }

        if let Some(end) = self.buffer.iter().rposition(|c| *c == END_MARKER) {
            return self.finish_telegram(registry, end);
        }

        if self.state == DecoderState::Idle {
            trace!("Ignoring line outside of a telegram");
            return LineOutcome::Continue;
        }

        self.crc = crc16_update(self.crc, &self.buffer);

        if let Some(id) = registry.match_line(&self.buffer) {
            if let Some(definition) = registry.definition(id) {
                let (start, end) = definition.delimiter_bytes();
                let value = extract_value(&self.buffer, start, end);
                debug!("Found {} value: {}", definition.name, value);
                self.staged.push((id, value));
            }
        }

        LineOutcome::Continue
    }

    fn finish_telegram(&mut self, registry: &mut MetricRegistry, end: usize) -> LineOutcome {
        if self.state == DecoderState::Idle {
            debug!("End of telegram without a start, ignoring it");
            return LineOutcome::Invalid;
        }

        let crc = crc16_update(self.crc, &self.buffer[end..end + 1]);
        let valid = verify_trailer(crc, &self.buffer[end + 1..]);

        self.state = DecoderState::Idle;
        self.crc = 0;

        if !valid {
            debug!("CRC invalid, calculated {:04X}, telegram says {:?}",
                   crc, String::from_utf8_lossy(&self.buffer[end + 1..]).trim_end());
            self.staged.clear();
            return LineOutcome::Invalid;
        }

        debug!("CRC valid, committing {} readings", self.staged.len());
        for (id, value) in self.staged.drain(..) {
            registry.set(id, value);
        }
        LineOutcome::Valid
    }

    /// Copies the line into our own buffer, cut to the maximum length and
    /// terminated by exactly one newline, which is what the checksum covers.
    /// A carriage return before the newline is kept and not counted.
    fn fill_buffer(&mut self, line: &[u8]) {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let (content, cr) = match line.strip_suffix(b"\r") {
            Some(content) => (content, true),
            None => (line, false),
        };

        self.buffer.clear();
        if content.len() > MAX_LINE_LENGTH {
            warn!("Line of {} bytes truncated to {}", content.len(), MAX_LINE_LENGTH);
            self.buffer.extend_from_slice(&content[..MAX_LINE_LENGTH]);
        } else {
            self.buffer.extend_from_slice(content);
        }
        if cr {
            self.buffer.push(b'\r');
        }
        self.buffer.push(b'\n');
    }
}

/// Position of the start marker if it opens the line. Whitespace and
/// control bytes in front of it are line noise and get skipped.
fn start_marker(line: &[u8]) -> Option<usize> {
    line.iter()
        .position(|c| c.is_ascii_graphic())
        .filter(|&i| line[i] == START_MARKER)
}
