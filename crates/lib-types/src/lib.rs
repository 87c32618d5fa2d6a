//! # lib-types
//!
//! Core type definitions for the IBIS-AMI kernel.
//!
//! This crate provides the types shared by the parsers and the native
//! model bridge:
//! - The AMI parameter tree (`Parameter`, `ParamKind`, `ParameterTree`)
//! - Corner-resolved parameter values (`ResolvedParameters`)
//! - Physical units with compile-time safety
//! - Impulse matrices and waveforms exchanged with native models

pub mod ami;
pub mod resolved;
pub mod units;
pub mod waveform;

pub use ami::*;
pub use resolved::*;
pub use units::*;
pub use waveform::*;
