//! Test doubles for the hardware and backend seams.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::spi::{self, Operation, SpiDevice};

use radia_core::app::{ActionSource, PowerControl, PowerError};
use radia_core::catalog::{Station, StationCatalog};
use radia_core::display::{Bitmap, DisplayError, Panel};
use radia_core::input::{Action, Clock, InputError};
use radia_core::playback::{BackendError, PlaybackBackend};

pub fn station(id: u32, name: &str, url: &str) -> Station {
    Station {
        id,
        name: name.to_string(),
        stream_url: url.to_string(),
    }
}

pub fn catalog(names: &[&str]) -> StationCatalog {
    StationCatalog::from_stations(
        names
            .iter()
            .enumerate()
            .map(|(i, n)| station(i as u32 + 1, n, &format!("http://stream.example/{}", i + 1))),
    )
}

// ── SPI / GPIO wire log ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    Pin(&'static str, bool),
    Write(Vec<u8>),
    DelayMs(u32),
}

#[derive(Clone, Default)]
pub struct WireLog(Rc<RefCell<Vec<Wire>>>);

impl WireLog {
    pub fn push(&self, w: Wire) {
        self.0.borrow_mut().push(w);
    }

    pub fn take(&self) -> Vec<Wire> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    /// Bytes written while the data/command line was high.
    pub fn data_bytes(events: &[Wire]) -> Vec<u8> {
        let mut dc = false;
        let mut out = Vec::new();
        for e in events {
            match e {
                Wire::Pin("dc", level) => dc = *level,
                Wire::Write(bytes) if dc => out.extend_from_slice(bytes),
                _ => {}
            }
        }
        out
    }
}

pub struct FakeSpi(pub WireLog);

impl spi::ErrorType for FakeSpi {
    type Error = Infallible;
}

impl SpiDevice for FakeSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
        for op in operations.iter() {
            if let Operation::Write(bytes) = op {
                self.0.push(Wire::Write(bytes.to_vec()));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct BusFault;

impl spi::Error for BusFault {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// SPI device whose every write fails.
pub struct DeadSpi;

impl spi::ErrorType for DeadSpi {
    type Error = BusFault;
}

impl SpiDevice for DeadSpi {
    fn transaction(&mut self, _operations: &mut [Operation<'_, u8>]) -> Result<(), BusFault> {
        Err(BusFault)
    }
}

pub struct FakeOutput {
    pub name: &'static str,
    pub log: WireLog,
}

impl digital::ErrorType for FakeOutput {
    type Error = Infallible;
}

impl OutputPin for FakeOutput {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.log.push(Wire::Pin(self.name, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.log.push(Wire::Pin(self.name, true));
        Ok(())
    }
}

pub struct FakeDelay(pub WireLog);

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.push(Wire::DelayMs(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.push(Wire::DelayMs(ms));
    }
}

pub type FakeSh1106 = radia_core::display::Sh1106<
    FakeSpi,
    FakeOutput,
    FakeOutput,
    FakeOutput,
    FakeOutput,
    FakeDelay,
>;

pub fn fake_sh1106(log: &WireLog) -> FakeSh1106 {
    let pin = |name| FakeOutput {
        name,
        log: log.clone(),
    };
    radia_core::display::Sh1106::new(
        FakeSpi(log.clone()),
        pin("dc"),
        pin("rst"),
        pin("cs"),
        pin("bl"),
        FakeDelay(log.clone()),
    )
}

// ── clock and buttons ─────────────────────────────────────────────────────────

/// Clock that only moves when slept on or advanced.
#[derive(Clone)]
pub struct ManualClock {
    start: Instant,
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let start = Instant::now();
        Self {
            start,
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get() + d);
    }

    pub fn elapsed_ms(&self) -> u64 {
        (self.now.get() - self.start).as_millis() as u64
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Active-low button held during `[start, start + len)` windows (ms on the
/// shared clock).
pub struct ScriptedButton {
    pub clock: ManualClock,
    pub presses: Vec<(u64, u64)>,
}

impl ScriptedButton {
    pub fn new(clock: &ManualClock, presses: &[(u64, u64)]) -> Self {
        Self {
            clock: clock.clone(),
            presses: presses.to_vec(),
        }
    }

    fn held(&self) -> bool {
        let t = self.clock.elapsed_ms();
        self.presses
            .iter()
            .any(|&(start, len)| t >= start && t < start + len)
    }
}

impl digital::ErrorType for ScriptedButton {
    type Error = Infallible;
}

impl InputPin for ScriptedButton {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(!self.held())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(self.held())
    }
}

// ── playback backend ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingBackend {
    pub calls: Rc<RefCell<Vec<String>>>,
    pub fail_start: Rc<Cell<bool>>,
}

impl RecordingBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl PlaybackBackend for RecordingBackend {
    type Instance = ();
    type Media = String;
    type Player = String;

    fn new_instance(&mut self) -> Result<(), BackendError> {
        self.record("instance".to_string());
        Ok(())
    }

    fn new_media(
        &mut self,
        _instance: &mut (),
        url: &str,
        network_caching: Duration,
    ) -> Result<String, BackendError> {
        self.record(format!("media {} {}ms", url, network_caching.as_millis()));
        Ok(url.to_string())
    }

    fn start_player(&mut self, _instance: &mut (), media: &String) -> Result<String, BackendError> {
        if self.fail_start.get() {
            return Err(BackendError::new("stream refused"));
        }
        self.record(format!("play {}", media));
        Ok(media.clone())
    }

    fn release_player(&mut self, player: String) -> Result<(), BackendError> {
        self.record(format!("release player {}", player));
        Ok(())
    }

    fn release_media(&mut self, media: String) -> Result<(), BackendError> {
        self.record(format!("release media {}", media));
        Ok(())
    }

    fn release_instance(&mut self, _instance: ()) -> Result<(), BackendError> {
        self.record("release instance".to_string());
        Ok(())
    }
}

// ── controller seams ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakePanel {
    pub frames: Rc<RefCell<Vec<Bitmap>>>,
}

impl FakePanel {
    pub fn frames(&self) -> Vec<Bitmap> {
        self.frames.borrow().clone()
    }

    pub fn last(&self) -> Option<Bitmap> {
        self.frames.borrow().last().cloned()
    }
}

impl Panel for FakePanel {
    fn render(&mut self, bitmap: &Bitmap) -> Result<(), DisplayError> {
        self.frames.borrow_mut().push(bitmap.clone());
        Ok(())
    }
}

pub struct ScriptedActions(pub VecDeque<Action>);

impl ScriptedActions {
    pub fn new(actions: &[Action]) -> Self {
        Self(actions.iter().copied().collect())
    }
}

impl ActionSource for ScriptedActions {
    fn next_action(&mut self) -> Result<Option<Action>, InputError> {
        Ok(self.0.pop_front())
    }
}

#[derive(Clone, Default)]
pub struct RecordingPower {
    pub requests: Rc<Cell<u32>>,
}

impl PowerControl for RecordingPower {
    fn power_off(&mut self) -> Result<(), PowerError> {
        self.requests.set(self.requests.get() + 1);
        Ok(())
    }
}
