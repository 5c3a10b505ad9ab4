//! Joystick events in the shape of the kernel joystick API's `struct js_event`.

pub const JS_EVENT_BUTTON: u8 = 0x01;
pub const JS_EVENT_AXIS: u8 = 0x02;
pub const JS_EVENT_INIT: u8 = 0x80;

/// Size of one raw `js_event` record: u32 time, i16 value, u8 type, u8 number
pub const JS_EVENT_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Button,
    Axis,
    /// Type byte (init bit cleared) that is neither button nor axis
    Unknown(u8),
}

impl EventKind {
    pub fn from_type(raw: u8) -> Self {
        match raw & !JS_EVENT_INIT {
            JS_EVENT_BUTTON => EventKind::Button,
            JS_EVENT_AXIS => EventKind::Axis,
            other => EventKind::Unknown(other),
        }
    }

    pub fn to_type(self) -> u8 {
        match self {
            EventKind::Button => JS_EVENT_BUTTON,
            EventKind::Axis => JS_EVENT_AXIS,
            EventKind::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsEvent {
    /// Device time in milliseconds
    pub time: u32,
    pub value: i16,
    pub kind: EventKind,
    /// Axis or button number, depending on `kind`
    pub index: u8,
    /// Synthetic replay of the device state at open time
    pub is_init: bool,
}

impl JsEvent {
    pub fn button(time: u32, index: u8, pressed: bool) -> Self {
        Self {
            time,
            value: i16::from(pressed),
            kind: EventKind::Button,
            index,
            is_init: false,
        }
    }

    pub fn axis(time: u32, index: u8, value: i16) -> Self {
        Self {
            time,
            value,
            kind: EventKind::Axis,
            index,
            is_init: false,
        }
    }

    pub fn into_init(self) -> Self {
        Self {
            is_init: true,
            ..self
        }
    }

    /// Decodes a native-endian `js_event` record
    pub fn from_bytes(raw: &[u8; JS_EVENT_SIZE]) -> Self {
        let time = u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let value = i16::from_ne_bytes([raw[4], raw[5]]);
        let kind_byte = raw[6];
        Self {
            time,
            value,
            kind: EventKind::from_type(kind_byte),
            index: raw[7],
            is_init: kind_byte & JS_EVENT_INIT != 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; JS_EVENT_SIZE] {
        let mut raw = [0u8; JS_EVENT_SIZE];
        raw[0..4].copy_from_slice(&self.time.to_ne_bytes());
        raw[4..6].copy_from_slice(&self.value.to_ne_bytes());
        raw[6] = self.kind.to_type() | (if self.is_init { JS_EVENT_INIT } else { 0 });
        raw[7] = self.index;
        raw
    }
}
