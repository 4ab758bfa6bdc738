//! Playback state machine over an opaque streaming backend.
//!
//! A session is built from three backend resources acquired in order:
//! instance, media, player. They are released in the reverse order. Each
//! handle is taken out of the session before it is released, so a release
//! sweep that fails half-way can never release the same handle twice.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::catalog::{Cursor, Station, StationCatalog};

/// Buffering hint handed to the backend for every stream.
pub const NETWORK_CACHING: Duration = Duration::from_millis(7000);

#[derive(Debug, thiserror::Error)]
#[error("playback backend: {0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("no station named {0:?}")]
    StationNotFound(String),
    #[error("station catalog is empty")]
    EmptyCatalog,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// The external media engine. Handles are opaque to the state machine.
pub trait PlaybackBackend {
    type Instance;
    type Media;
    type Player;

    fn new_instance(&mut self) -> Result<Self::Instance, BackendError>;

    fn new_media(
        &mut self,
        instance: &mut Self::Instance,
        url: &str,
        network_caching: Duration,
    ) -> Result<Self::Media, BackendError>;

    /// Create a player bound to `media` and start it.
    fn start_player(
        &mut self,
        instance: &mut Self::Instance,
        media: &Self::Media,
    ) -> Result<Self::Player, BackendError>;

    /// Stop and release the player.
    fn release_player(&mut self, player: Self::Player) -> Result<(), BackendError>;

    fn release_media(&mut self, media: Self::Media) -> Result<(), BackendError>;

    fn release_instance(&mut self, instance: Self::Instance) -> Result<(), BackendError>;
}

struct Session<B: PlaybackBackend> {
    station: Station,
    instance: Option<B::Instance>,
    media: Option<B::Media>,
    player: Option<B::Player>,
}

impl<B: PlaybackBackend> Session<B> {
    /// Release whatever is still held: player, media, instance. Every step
    /// runs even if an earlier one fails; the first failure is returned.
    fn release(&mut self, backend: &mut B) -> Result<(), BackendError> {
        let mut first_err = None;
        if let Some(player) = self.player.take() {
            if let Err(e) = backend.release_player(player) {
                warn!("release player: {}", e);
                first_err.get_or_insert(e);
            }
        }
        if let Some(media) = self.media.take() {
            if let Err(e) = backend.release_media(media) {
                warn!("release media: {}", e);
                first_err.get_or_insert(e);
            }
        }
        if let Some(instance) = self.instance.take() {
            if let Err(e) = backend.release_instance(instance) {
                warn!("release instance: {}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState<'a> {
    Idle,
    Playing(&'a Station),
}

/// Idle/Playing over one backend. Owns the only session.
pub struct Player<B: PlaybackBackend> {
    backend: B,
    network_caching: Duration,
    session: Option<Session<B>>,
}

impl<B: PlaybackBackend> Player<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            network_caching: NETWORK_CACHING,
            session: None,
        }
    }

    pub fn with_network_caching(mut self, network_caching: Duration) -> Self {
        self.network_caching = network_caching;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> PlaybackState<'_> {
        match &self.session {
            Some(session) => PlaybackState::Playing(&session.station),
            None => PlaybackState::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_station_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.station.name.as_str())
    }

    /// Start `name`, replacing any running session.
    ///
    /// An unknown name is rejected before anything is torn down. A failed
    /// teardown of the running session is returned without starting the new
    /// one; the machine is idle either way. When a backend step fails the
    /// resources acquired so far are released and the machine is left idle.
    pub fn play(&mut self, catalog: &StationCatalog, name: &str) -> Result<(), PlaybackError> {
        let station = catalog
            .find_by_name(name)
            .cloned()
            .ok_or_else(|| PlaybackError::StationNotFound(name.to_string()))?;

        self.stop()?;

        debug!("Playing: {}", station.stream_url);
        let mut session = Session::<B> {
            station,
            instance: None,
            media: None,
            player: None,
        };
        if let Err(e) = self.acquire(&mut session) {
            error!("Failed to start {:?}: {}", session.station.name, e);
            if let Err(release_err) = session.release(&mut self.backend) {
                warn!("Cleanup after failed start: {}", release_err);
            }
            return Err(e.into());
        }

        info!("Playing station {:?}", session.station.name);
        self.session = Some(session);
        Ok(())
    }

    fn acquire(&mut self, session: &mut Session<B>) -> Result<(), BackendError> {
        let instance = session.instance.insert(self.backend.new_instance()?);
        let media = self
            .backend
            .new_media(instance, &session.station.stream_url, self.network_caching)?;
        let media = session.media.insert(media);
        let player = self.backend.start_player(instance, media)?;
        session.player = Some(player);
        Ok(())
    }

    /// Return to idle. The transition happens even when a release step
    /// fails; the failure is still reported. Idle stays idle.
    pub fn stop(&mut self) -> Result<(), BackendError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        info!("Stopping station {:?}", session.station.name);
        session.release(&mut self.backend)
    }

    /// `stop` followed by playing the station under the cursor.
    pub fn play_selected(
        &mut self,
        catalog: &StationCatalog,
        cursor: &Cursor,
    ) -> Result<(), PlaybackError> {
        self.stop()?;
        let name = catalog
            .selected(cursor)
            .map(|s| s.name.clone())
            .ok_or(PlaybackError::EmptyCatalog)?;
        self.play(catalog, &name)
    }
}

impl<B: PlaybackBackend> Drop for Player<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Release on shutdown failed: {}", e);
        }
    }
}
