// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Overlay files from a pinned upstream repository into a working tree.
//!
//! Oxilay exposes a selected set of files from an upstream source tree inside
//! a target tree through symbolic links, hard links, or copies. Everything it
//! creates is recorded in a registry, so the overlay can be removed again
//! without ever touching custom content placed into the target tree by hand.
//!
//! # Entry Points
//!
//! - [`Overlay::materialize`] creates managed entries from mappings.
//! - [`Overlay::clean`] removes every managed entry.
//! - [`Overlay::validate`] checks that a path stays inside the target tree.
//!
//! The source tree itself is retrieved through [`upstream::Git2Upstream`].

pub mod config;
pub mod overlay;
pub mod path;
pub mod store;
pub mod upstream;

pub use config::{LinkMode, MappingSpec, OverlayConfig};
pub use overlay::{Layout, Overlay, OverlayError};
pub use store::{ManagedEntry, Registry, StateStore};
