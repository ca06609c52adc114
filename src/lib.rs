// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Data-wrangling toolbelt for conda environments and JSON payloads.
//!
//! - [`flatten`] turns nested JSON documents into flat, tabular records.
//! - [`packages`] lists what conda and pip installed into an environment,
//!   reconciles the two listings, and produces reproducible
//!   `environment.yml` snapshots.
//! - [`release`] inspects flattened GitHub release listings to locate
//!   release versions and assets.

pub mod config;
pub mod flatten;
pub mod packages;
pub mod path;
pub mod release;
