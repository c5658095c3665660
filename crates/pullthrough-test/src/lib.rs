//! # Pullthrough Test
//!
//! Shared test support for the Pullthrough crates.
//!
//! - [`fixtures`] - deterministic manifests, descriptors and repository names
//! - [`mocks`] - recording doubles for [`AuthChallenger`](pullthrough_core::AuthChallenger)
//!   and [`EvictionScheduler`](pullthrough_core::EvictionScheduler), call-counting
//!   wrappers around storage services, and fixed-behavior remotes

pub mod fixtures;
pub mod mocks;

pub use mocks::{
    CallCounts, CountingManifestService, CountingTagService, FixtureManifestStore,
    RecordingChallenger, RecordingScheduler, UnreachableRemote,
};
