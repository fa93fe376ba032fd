//! ardu_configurator_core - Pure business logic for flight controller configuration
//!
//! This crate contains the parameter data model and configuration step
//! domain types. It performs no I/O and can be tested on the host
//! without a flight controller.
//!
//! # Design Principles
//!
//! - **No I/O**: files, links and clocks are reached only through traits
//! - **Zero cfg**: No `#[cfg(feature = ...)]` directives
//! - **Trait abstractions**: The link and time are injected via traits
//!
//! # Modules
//!
//! - [`parameters`]: ParameterRecord, ParameterSet, tolerance, file dialects
//! - [`configuration`]: ArduPilotParameter, change tracking, reset policy, workflow state
//! - [`traits`]: Flight controller link and time abstractions

pub mod configuration;
pub mod parameters;
pub mod traits;
