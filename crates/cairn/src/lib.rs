//! Cairn CLI - shared-store coordination for autonomous agent fleets.
//!
//! Binary name: `cairn`

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod cli;
