//! Application simulator.
//!
//! Plays the part of the page under test: an account page with a sign-out
//! button, a dropdown, enabled/disabled buttons, data buttons that fetch
//! through the test's network channel and a location button backed by a
//! replaceable `navigator.geolocation` object. A matching in-memory backend
//! answers the data requests.

pub mod app;
pub mod backend;
pub mod config;
pub mod page;

pub use app::{AccountApp, SimFactory};
pub use backend::FakeBackend;
pub use config::SimConfig;
