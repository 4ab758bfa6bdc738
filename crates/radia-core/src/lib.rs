//! Internet radio appliance core: station catalog, playback state, SH1106
//! display driver, button input and the controller loop tying them together.

pub mod app;
pub mod catalog;
pub mod config;
pub mod display;
pub mod input;
pub mod platform;
pub mod playback;
pub mod view;
