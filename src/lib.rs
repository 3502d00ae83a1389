//! Family chore lists with live sync and photo proof of completion.
//!
//! Profiles are held by the [`identity`] store, chores live in a remote
//! collection behind [`repository::ChoreRepository`], the [`sync`] engine
//! keeps a live snapshot for the active profile, [`view`] projects it per
//! role, and [`proof`] drives the "complete with photo" pipeline.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod evidence;
pub mod household;
pub mod identity;
pub mod models;
pub mod proof;
pub mod repository;
pub mod storage;
pub mod sync;
pub mod view;

pub use error::ChoreError;
