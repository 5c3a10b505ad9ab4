use crate::config::{AXIS_COUNT, BUTTON_COUNT};
use crate::wire::normalize;

/// Button slots in PlayStation layout, valued as their index in [`Snapshot::buttons`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonSlot {
    Square = 0,
    Triangle = 1,
    Cross = 2,
    Circle = 3,
    L1 = 4,
    R1 = 5,
    L2 = 6,
    R2 = 7,
    LeftThumb = 8,
    RightThumb = 9,
    Select = 10,
    Start = 11,
}

impl ButtonSlot {
    pub const ALL: [ButtonSlot; BUTTON_COUNT] = [
        ButtonSlot::Square,
        ButtonSlot::Triangle,
        ButtonSlot::Cross,
        ButtonSlot::Circle,
        ButtonSlot::L1,
        ButtonSlot::R1,
        ButtonSlot::L2,
        ButtonSlot::R2,
        ButtonSlot::LeftThumb,
        ButtonSlot::RightThumb,
        ButtonSlot::Select,
        ButtonSlot::Start,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }
}

/// The six analog axes. The directional pad reports through `cross_x`/`cross_y`
/// as axis values, never as buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Axes {
    pub l_stick_x: i16,
    pub l_stick_y: i16,
    pub r_stick_x: i16,
    pub r_stick_y: i16,
    pub cross_x: i16,
    pub cross_y: i16,
}

impl Axes {
    /// Axes in wire order: lsx, lsy, rsx, rsy, cross_x, cross_y
    pub fn to_array(self) -> [i16; AXIS_COUNT] {
        [
            self.l_stick_x,
            self.l_stick_y,
            self.r_stick_x,
            self.r_stick_y,
            self.cross_x,
            self.cross_y,
        ]
    }

    pub fn from_array(values: [i16; AXIS_COUNT]) -> Self {
        let [l_stick_x, l_stick_y, r_stick_x, r_stick_y, cross_x, cross_y] = values;
        Self {
            l_stick_x,
            l_stick_y,
            r_stick_x,
            r_stick_y,
            cross_x,
            cross_y,
        }
    }

    /// Joystick API axis number to slot. Numbers past 5 have no slot.
    pub fn slot_mut(&mut self, index: u8) -> Option<&mut i16> {
        match index {
            0 => Some(&mut self.l_stick_x),
            1 => Some(&mut self.l_stick_y),
            2 => Some(&mut self.r_stick_x),
            3 => Some(&mut self.r_stick_y),
            4 => Some(&mut self.cross_x),
            5 => Some(&mut self.cross_y),
            _ => None,
        }
    }

    /// All axes mapped onto [-1.0, 1.0], in wire order
    pub fn normalized(self) -> [f64; AXIS_COUNT] {
        self.to_array().map(normalize)
    }
}

/// Mirror of one controller.
///
/// A sender's snapshot changes only through [`Snapshot::merge`], a receiver's only
/// through [`Snapshot::apply_packet`]. Both replace or leave the whole value, so a
/// reader never sees a half-applied update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Device time in milliseconds of the last event that contributed
    pub timestamp: u32,
    pub initialized: bool,
    /// Each slot is 0 or 1
    pub buttons: [u8; BUTTON_COUNT],
    pub axes: Axes,
}

impl Snapshot {
    pub fn is_pressed(&self, slot: ButtonSlot) -> bool {
        self.buttons[slot as usize] == 1
    }

    pub fn pressed(&self) -> impl Iterator<Item = ButtonSlot> + '_ {
        ButtonSlot::ALL
            .into_iter()
            .filter(move |slot| self.is_pressed(*slot))
    }
}
