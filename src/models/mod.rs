//! Domain models for chore-sync.
//!
//! # Core Concepts
//!
//! - [`Profile`]: The local member's identity (display name, family code, role).
//!   Held by the identity store and replaced or cleared explicitly.
//! - [`Chore`]: A unit of work scoped to a family code. Status only ever moves
//!   from pending to completed, optionally carrying a photo proof URL.
//! - [`ChoreDocument`]: The raw, schema-less record as the remote collection
//!   delivers it. Converted into a [`Chore`] by [`Chore::from_document`].

mod chore;
mod profile;

pub use chore::*;
pub use profile::*;
