//! Controller loop: wait for a button, apply it, redraw.

use tracing::{debug, error, info, warn};

use crate::catalog::{Cursor, StationCatalog};
use crate::display::{DisplayError, Panel};
use crate::input::{Action, Clock, InputDispatcher, InputError};
use crate::playback::{PlaybackBackend, PlaybackError, Player};
use crate::view;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error(transparent)]
    Input(#[from] InputError),
}

#[derive(Debug, thiserror::Error)]
#[error("power-off request failed: {0}")]
pub struct PowerError(pub String);

/// Host power control.
pub trait PowerControl {
    fn power_off(&mut self) -> Result<(), PowerError>;
}

/// Source of user actions. `None` ends the loop.
pub trait ActionSource {
    fn next_action(&mut self) -> Result<Option<Action>, InputError>;
}

impl<P, C> ActionSource for InputDispatcher<P, C>
where
    P: embedded_hal::digital::InputPin,
    C: Clock,
{
    fn next_action(&mut self) -> Result<Option<Action>, InputError> {
        self.wait_for_action()
    }
}

pub struct App<D, B, S, W>
where
    D: Panel,
    B: PlaybackBackend,
    S: ActionSource,
    W: PowerControl,
{
    catalog: StationCatalog,
    cursor: Cursor,
    player: Player<B>,
    display: D,
    input: S,
    power: W,
    autoplay: Option<String>,
    cleared: bool,
}

impl<D, B, S, W> App<D, B, S, W>
where
    D: Panel,
    B: PlaybackBackend,
    S: ActionSource,
    W: PowerControl,
{
    pub fn new(catalog: StationCatalog, player: Player<B>, display: D, input: S, power: W) -> Self {
        Self {
            catalog,
            cursor: Cursor::new(),
            player,
            display,
            input,
            power,
            autoplay: None,
            cleared: false,
        }
    }

    /// Station started after the first frame. Empty names are ignored.
    pub fn with_autoplay(mut self, name: Option<String>) -> Self {
        self.autoplay = name.filter(|n| !n.is_empty());
        self
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn player(&self) -> &Player<B> {
        &self.player
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn render(&mut self) -> Result<(), DisplayError> {
        let bitmap = view::render(
            &self.catalog,
            &self.cursor,
            self.player.current_station_name(),
        );
        self.cleared = false;
        self.display.render(&bitmap)
    }

    /// Clear, draw the browser, then start the autoplay station if any.
    pub fn start(&mut self) -> Result<(), DisplayError> {
        self.display.clear()?;
        self.render()?;
        if let Some(name) = self.autoplay.clone() {
            match self.player.play(&self.catalog, &name) {
                Ok(()) => info!("Autoplay: {}", name),
                Err(e) => warn!("Autoplay of {:?} skipped: {}", name, e),
            }
            self.render()?;
        }
        Ok(())
    }

    /// Apply one action. Playback and power failures are logged and never
    /// end the loop.
    pub fn handle(&mut self, action: Action) {
        debug!("Action {:?}", action);
        match action {
            Action::SelectPrev => {
                if !self.cursor.prev() {
                    debug!("Selection already at top");
                }
            }
            Action::SelectNext => {
                if !self.cursor.next(self.catalog.len()) {
                    debug!("Selection already at bottom");
                }
            }
            Action::PlaySelected => match self.player.play_selected(&self.catalog, &self.cursor) {
                Ok(()) => {}
                Err(PlaybackError::Backend(e)) => error!("Playback failed: {}", e),
                Err(e) => warn!("Nothing to play: {}", e),
            },
            Action::Stop => {
                if let Err(e) = self.player.stop() {
                    error!("Stop failed: {}", e);
                }
            }
            Action::PowerOff => {
                info!("Power-off requested");
                if let Err(e) = self.power.power_off() {
                    error!("{}", e);
                }
            }
        }
    }

    /// Run until the action source ends or a hardware error occurs. The
    /// display is cleared on the way out either way.
    pub fn run(&mut self) -> Result<(), AppError> {
        let result = self.run_loop();
        if let Err(e) = self.clear() {
            warn!("Final display clear failed: {}", e);
        }
        result
    }

    fn run_loop(&mut self) -> Result<(), AppError> {
        self.start()?;
        while let Some(action) = self.input.next_action()? {
            self.handle(action);
            self.render()?;
        }
        info!("Input loop finished");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.display.clear()?;
        self.cleared = true;
        Ok(())
    }
}

impl<D, B, S, W> Drop for App<D, B, S, W>
where
    D: Panel,
    B: PlaybackBackend,
    S: ActionSource,
    W: PowerControl,
{
    fn drop(&mut self) {
        if !self.cleared {
            if let Err(e) = self.clear() {
                warn!("Display clear on drop failed: {}", e);
            }
        }
    }
}
