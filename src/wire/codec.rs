use crate::config::{AXIS_COUNT, BUTTON_COUNT, DISPATCH, MAX_LINE_LEN};
use crate::joystick::{Axes, Snapshot};
use std::fmt::{self, Write};
use std::str::FromStr;

/// Dispatch tag, timestamp, buttons, axes
pub const FIELD_COUNT: usize = 2 + BUTTON_COUNT + AXIS_COUNT;

/// Longest line [`encode`] can produce: every field at its widest plus its separator
pub const fn max_encoded_len() -> usize {
    let dispatch = 11 + 1; // "-2147483648 "
    let timestamp = 10 + 1; // "4294967295 "
    let button = 1 + 1;
    let axis = 6 + 1; // "-32768 "
    dispatch + timestamp + BUTTON_COUNT * button + AXIS_COUNT * axis
}

const _: () = assert!(
    max_encoded_len() <= MAX_LINE_LEN,
    "MAX_LINE_LEN is too small for the configured BUTTON_COUNT"
);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Wrong dispatch tag {}, expected {}", .0, DISPATCH)]
    WrongDispatch(i32),

    #[error("Stale packet at {received}, already holding {current}")]
    StaleTimestamp { received: u32, current: u32 },

    #[error("Button {slot} has value {value}, expected 0 or 1")]
    InvalidButtonValue { slot: usize, value: i16 },
}

/// Appends space-terminated fields to a line sized for the largest packet
#[derive(Debug)]
pub struct FieldWriter {
    line: String,
}

impl Default for FieldWriter {
    fn default() -> Self {
        Self {
            line: String::with_capacity(MAX_LINE_LEN),
        }
    }
}

impl FieldWriter {
    pub fn field(&mut self, value: impl fmt::Display) -> &mut Self {
        // Writing into a String cannot fail.
        let _ = write!(self.line, "{value} ");
        self
    }

    pub fn fields<T: fmt::Display>(&mut self, values: impl IntoIterator<Item = T>) -> &mut Self {
        for value in values {
            self.field(value);
        }
        self
    }

    pub fn finish(self) -> String {
        self.line
    }
}

pub fn encode(snapshot: &Snapshot) -> String {
    let mut writer = FieldWriter::default();
    writer
        .field(DISPATCH)
        .field(snapshot.timestamp)
        .fields(snapshot.buttons)
        .fields(snapshot.axes.to_array());
    writer.finish()
}

/// Parses a received datagram against the snapshot currently held.
///
/// Returns the complete replacement snapshot; `current` is only read. A packet
/// carrying the same timestamp as `current` is accepted.
pub fn decode(packet: &[u8], current: &Snapshot) -> Result<Snapshot, DecodeError> {
    if packet.len() > MAX_LINE_LEN {
        return Err(DecodeError::MalformedPacket(format!(
            "{} bytes exceeds the {MAX_LINE_LEN} byte limit",
            packet.len()
        )));
    }

    let text = std::str::from_utf8(packet)
        .map_err(|e| DecodeError::MalformedPacket(format!("not valid UTF-8: {e}")))?;

    let fields: Vec<&str> = text.split_ascii_whitespace().collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::MalformedPacket(format!(
            "expected {FIELD_COUNT} fields, got {}",
            fields.len()
        )));
    }

    let dispatch: i32 = parse_field(fields[0], "dispatch")?;
    let timestamp: u32 = parse_field(fields[1], "timestamp")?;

    let mut raw_buttons = [0i16; BUTTON_COUNT];
    for (slot, field) in raw_buttons.iter_mut().zip(&fields[2..2 + BUTTON_COUNT]) {
        *slot = parse_field(field, "button")?;
    }

    let mut axes = [0i16; AXIS_COUNT];
    for (slot, field) in axes.iter_mut().zip(&fields[2 + BUTTON_COUNT..]) {
        *slot = parse_field(field, "axis")?;
    }

    if dispatch != DISPATCH {
        return Err(DecodeError::WrongDispatch(dispatch));
    }

    if timestamp < current.timestamp {
        return Err(DecodeError::StaleTimestamp {
            received: timestamp,
            current: current.timestamp,
        });
    }

    let mut buttons = [0u8; BUTTON_COUNT];
    for (slot, (bit, &value)) in buttons.iter_mut().zip(&raw_buttons).enumerate() {
        *bit = match value {
            0 => 0,
            1 => 1,
            _ => return Err(DecodeError::InvalidButtonValue { slot, value }),
        };
    }

    Ok(Snapshot {
        timestamp,
        initialized: true,
        buttons,
        axes: Axes::from_array(axes),
    })
}

fn parse_field<T: FromStr>(field: &str, name: &str) -> Result<T, DecodeError> {
    field
        .parse()
        .map_err(|_| DecodeError::MalformedPacket(format!("invalid {name} field {field:?}")))
}

impl Snapshot {
    /// Replaces this snapshot with a decoded packet, or leaves it untouched on error
    pub fn apply_packet(&mut self, packet: &[u8]) -> Result<(), DecodeError> {
        *self = decode(packet, self)?;
        Ok(())
    }
}

/// Maps an axis value linearly onto [-1.0, 1.0]: `i16::MIN` to -1.0, `i16::MAX` to 1.0.
/// The range is asymmetric, so 0 lands slightly above 0.0.
pub fn normalize(value: i16) -> f64 {
    let min = f64::from(i16::MIN);
    let max = f64::from(i16::MAX);
    -1.0 + 2.0 * (f64::from(value) - min) / (max - min)
}
