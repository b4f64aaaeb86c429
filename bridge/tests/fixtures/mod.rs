//! Test Fixtures Module
//!
//! Shared fixtures for the bridge integration tests:
//! - Audio fixtures (programmatically generated)
//! - Telephony message fixtures and a scripted telephony stream
//! - A recording in-memory media room

// Not every test binary uses every fixture
#![allow(dead_code)]

pub mod audio_fixtures;
pub mod mock_room;
pub mod telephony_fixtures;

pub use audio_fixtures::*;
pub use mock_room::*;
pub use telephony_fixtures::*;
