//! gilrs-backed event source for gamepads without a kernel joystick node.
//!
//! gilrs reports normalized floats and named buttons; this module turns them back
//! into joystick-API events so the rest of the pipeline cannot tell the
//! difference. Sticks and the directional pad are scaled to `i16`, Y axes are
//! flipped to the joystick API's "down is positive" convention, and the current
//! state of a newly selected gamepad is replayed as init-flagged events.
//!
//! Event times are wall-clock milliseconds truncated to `u32`, so a restarted
//! sender keeps counting forward from where the receiver last saw it.

use super::{SourceError, SourceSettings};
use crate::config::CROSS_MAX;
use crate::joystick::{ButtonSlot, JsEvent};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use statum::{machine, state};
use chrono::{DateTime, Local};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const STICK_AXES: [Axis; 4] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::RightStickX,
    Axis::RightStickY,
];

const SLOT_BUTTONS: [Button; 12] = [
    Button::West,
    Button::North,
    Button::South,
    Button::East,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::LeftThumb,
    Button::RightThumb,
    Button::Select,
    Button::Start,
];

const CROSS_X: u8 = 4;
const CROSS_Y: u8 = 5;

#[state]
#[derive(Debug, Clone)]
pub enum CollectorState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct GamepadCollector<S: CollectorState> {
    gilrs: Gilrs,

    active_gamepad: Option<GamepadId>,

    settings: SourceSettings,
}

impl GamepadCollector<Initializing> {
    pub fn create(settings: SourceSettings) -> Result<Self, SourceError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(SourceError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, settings))
    }

    /// Picks the first connected gamepad. Without one the collector idles until a
    /// gamepad connects.
    pub fn initialize(mut self) -> GamepadCollector<Collecting> {
        let first = self
            .gilrs
            .gamepads()
            .next()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()));

        match first {
            Some((id, name)) => {
                info!("Selected gamepad: {} ({})", name, id);
                self.active_gamepad = Some(id);
            }
            None => warn!("No gamepad connected, waiting for one"),
        }

        self.transition()
    }
}

impl GamepadCollector<Collecting> {
    pub fn run_collection_loop(
        &mut self,
        sender: &mpsc::Sender<JsEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        info!("Starting gamepad collection loop");

        if let Some(id) = self.active_gamepad {
            self.replay_state(id, sender)?;
        }

        while !cancel.is_cancelled() {
            while let Some(Event {
                id, event, time, ..
            }) = self.gilrs.next_event()
            {
                if matches!(event, EventType::Connected) && self.active_gamepad.is_none() {
                    info!("Gamepad {} connected, selecting it", id);
                    self.active_gamepad = Some(id);
                    self.replay_state(id, sender)?;
                    continue;
                }

                if self.active_gamepad != Some(id) {
                    debug!("Skipping event from non-active gamepad: {:?}", id);
                    continue;
                }

                if matches!(event, EventType::Disconnected) {
                    warn!("Active gamepad {} disconnected", id);
                    self.active_gamepad = None;
                    continue;
                }

                debug!("Processing gilrs event: {:?}", event);
                if let Some(js_event) = self.convert(id, event, time) {
                    send(sender, js_event)?;
                }
            }

            std::thread::sleep(self.settings.poll_interval);
        }

        Ok(())
    }

    // gilrs has already applied the event to the gamepad state when it is returned
    fn convert(&self, id: GamepadId, event: EventType, time: SystemTime) -> Option<JsEvent> {
        let time = event_millis(time);
        let gamepad = self.gilrs.gamepad(id);
        let held = |button: Button| gamepad.is_pressed(button);
        match event {
            EventType::AxisChanged(axis, value, _) => {
                axis_index(axis).map(|index| JsEvent::axis(time, index, scale_axis(index, value)))
            }
            EventType::ButtonPressed(button, _) => button_event(button, true, time, held),
            EventType::ButtonReleased(button, _) => button_event(button, false, time, held),
            _ => None,
        }
    }

    /// Sends the gamepad's current state as init-flagged events
    fn replay_state(&self, id: GamepadId, sender: &mpsc::Sender<JsEvent>) -> Result<(), SourceError> {
        let gamepad = self.gilrs.gamepad(id);
        let time = event_millis(SystemTime::now());
        debug!("Replaying state of {} at {}", gamepad.name(), time);

        for (slot, button) in ButtonSlot::ALL.iter().zip(SLOT_BUTTONS) {
            let event = JsEvent::button(time, slot.index(), gamepad.is_pressed(button));
            send(sender, event.into_init())?;
        }

        for axis in STICK_AXES {
            if let Some(index) = axis_index(axis) {
                let value = scale_axis(index, gamepad.value(axis));
                send(sender, JsEvent::axis(time, index, value).into_init())?;
            }
        }

        for index in [CROSS_X, CROSS_Y] {
            let value = cross_axis_value(index, |button| gamepad.is_pressed(button));
            send(sender, JsEvent::axis(time, index, value).into_init())?;
        }
        Ok(())
    }
}

/// Wall-clock milliseconds, wrapping at `u32::MAX` like the joystick API's clock
pub fn event_millis(time: SystemTime) -> u32 {
    DateTime::<Local>::from(time).timestamp_millis() as u32
}

fn send(sender: &mpsc::Sender<JsEvent>, event: JsEvent) -> Result<(), SourceError> {
    sender
        .blocking_send(event)
        .map_err(|_| SourceError::ChannelClosed)
}

pub fn button_slot(button: Button) -> Option<ButtonSlot> {
    SLOT_BUTTONS
        .iter()
        .position(|candidate| *candidate == button)
        .map(|index| ButtonSlot::ALL[index])
}

pub fn axis_index(axis: Axis) -> Option<u8> {
    match axis {
        Axis::LeftStickX => Some(0),
        Axis::LeftStickY => Some(1),
        Axis::RightStickX => Some(2),
        Axis::RightStickY => Some(3),
        Axis::DPadX => Some(CROSS_X),
        Axis::DPadY => Some(CROSS_Y),
        _ => None,
    }
}

/// gilrs float to joystick-API value. Odd axes are vertical and get flipped.
pub fn scale_axis(index: u8, value: f32) -> i16 {
    let scaled = (value.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
    if index % 2 == 1 {
        -scaled
    } else {
        scaled
    }
}

/// Cross axis a directional pad button drives
pub fn dpad_axis(button: Button) -> Option<u8> {
    match button {
        Button::DPadLeft | Button::DPadRight => Some(CROSS_X),
        Button::DPadUp | Button::DPadDown => Some(CROSS_Y),
        _ => None,
    }
}

/// Cross axis value for the directional pad buttons `held` reports as pressed
pub fn cross_axis_value(index: u8, held: impl Fn(Button) -> bool) -> i16 {
    if index == CROSS_X {
        cross_value(held(Button::DPadLeft), held(Button::DPadRight))
    } else {
        cross_value(held(Button::DPadUp), held(Button::DPadDown))
    }
}

/// Slot buttons map directly. Directional pad buttons become the cross axis
/// value of everything still held, so releasing one direction keeps the other.
pub fn button_event(
    button: Button,
    pressed: bool,
    time: u32,
    held: impl Fn(Button) -> bool,
) -> Option<JsEvent> {
    if let Some(slot) = button_slot(button) {
        return Some(JsEvent::button(time, slot.index(), pressed));
    }
    dpad_axis(button).map(|index| JsEvent::axis(time, index, cross_axis_value(index, held)))
}

fn cross_value(negative: bool, positive: bool) -> i16 {
    match (negative, positive) {
        (true, false) => -CROSS_MAX,
        (false, true) => CROSS_MAX,
        _ => 0,
    }
}
