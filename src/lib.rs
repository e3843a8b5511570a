//! A library for driving firmware builds: component registration gated by a
//! configuration option store, build-attribute merging, target assembly and
//! minimized project export.
//!
//! The build step registers components into an [`build::Environment`] and
//! dumps a [`build::BuildInfo`] next to its outputs; the packager picks the
//! dump up later and derives a self-contained project from the recorded
//! dependency graph.

pub mod backend;
pub mod build;
pub mod cmd;
pub mod config;
pub mod dist;
pub mod fs;
pub mod graph;
pub mod registry;
pub mod utils;
