//! Button polling and debounce.
//!
//! All buttons are pulled up, so a pressed button reads low. Every pin is
//! sampled each [`POLL_INTERVAL`]; a press is accepted only if the same pin
//! has not been accepted within [`DEBOUNCE_WINDOW`]. Holding a button
//! therefore repeats roughly every window.

use embedded_hal::digital::{self, InputPin};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Everything a button press can ask the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SelectPrev,
    SelectNext,
    PlaySelected,
    Stop,
    PowerOff,
}

/// Physical buttons on the HAT: three keys and a five-way joystick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Key1,
    Key2,
    Key3,
    Up,
    Down,
    Left,
    Right,
    Press,
}

impl Button {
    /// Sampling order.
    pub const ALL: [Button; 8] = [
        Button::Key1,
        Button::Key2,
        Button::Key3,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::Press,
    ];

    /// BCM line number.
    pub fn gpio(self) -> u32 {
        match self {
            Button::Key1 => 21,
            Button::Key2 => 20,
            Button::Key3 => 16,
            Button::Up => 6,
            Button::Down => 19,
            Button::Left => 5,
            Button::Right => 26,
            Button::Press => 13,
        }
    }

    pub fn action(self) -> Option<Action> {
        match self {
            Button::Key1 => Some(Action::PlaySelected),
            Button::Key2 => Some(Action::Stop),
            Button::Key3 => Some(Action::PowerOff),
            Button::Up => Some(Action::SelectPrev),
            Button::Down => Some(Action::SelectNext),
            Button::Left | Button::Right | Button::Press => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Button::Key1 => "key1",
            Button::Key2 => "key2",
            Button::Key3 => "key3",
            Button::Up => "up",
            Button::Down => "down",
            Button::Left => "left",
            Button::Right => "right",
            Button::Press => "press",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("reading button {button:?} failed: {kind:?}")]
    Pin {
        button: Button,
        kind: digital::ErrorKind,
    },
}

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Per-button last accepted press.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: HashMap<Button, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// True if a press of `button` at `now` counts. Accepted presses restart
    /// that button's window; rejected ones do not.
    pub fn accept(&mut self, button: Button, now: Instant) -> bool {
        if let Some(&last) = self.last_accepted.get(&button) {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted.insert(button, now);
        true
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

pub struct InputDispatcher<P, C> {
    pins: Vec<(Button, P)>,
    debouncer: Debouncer,
    clock: C,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<P, C> InputDispatcher<P, C>
where
    P: InputPin,
    C: Clock,
{
    pub fn new(pins: Vec<(Button, P)>, clock: C) -> Self {
        Self {
            pins,
            debouncer: Debouncer::default(),
            clock,
            shutdown: None,
        }
    }

    /// Let [`wait_for_action`](Self::wait_for_action) return `None` once
    /// `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Sample every pin once. Returns the first accepted press that maps to
    /// an action.
    pub fn poll(&mut self) -> Result<Option<Action>, InputError> {
        let now = self.clock.now();
        for (button, pin) in self.pins.iter_mut() {
            let button = *button;
            let pressed = pin
                .is_low()
                .map_err(|e| InputError::Pin {
                    button,
                    kind: digital::Error::kind(&e),
                })?;
            if !pressed || !self.debouncer.accept(button, now) {
                continue;
            }
            debug!("Pressed {}", button.label());
            if let Some(action) = button.action() {
                return Ok(Some(action));
            }
        }
        Ok(None)
    }

    /// Block until a mapped button is pressed. `None` means shutdown was
    /// requested while waiting.
    pub fn wait_for_action(&mut self) -> Result<Option<Action>, InputError> {
        loop {
            self.clock.sleep(POLL_INTERVAL);
            if self.shutdown_requested() {
                return Ok(None);
            }
            if let Some(action) = self.poll()? {
                return Ok(Some(action));
            }
        }
    }
}
