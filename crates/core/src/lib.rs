#![warn(clippy::all, missing_docs)]

//! Core data layer for GameVault.
//!
//! This crate hosts the game models, record validation, the remote catalog
//! and local collection clients, and the incremental result merger and pager
//! that drive infinite scrolling in the terminal UI.

pub mod config;
pub mod error;
pub mod merger;
pub mod models;
pub mod pager;
pub mod source;
pub mod validate;

pub use config::AppConfig;
pub use error::{CatalogError, ValidationFailure};
pub use merger::{MergeReport, PageOutcome, PageRequest, PageResponse, RequestTag, ResultMerger};
pub use models::{Context, Game, GamePatch, Platform, Source};
pub use pager::{Pager, PagerState};
pub use source::{GameSource, LocalSource, LocalStore, RemoteSource, Sources};
#[cfg(any(test, feature = "testing"))]
pub use source::MemoryStore;
pub use validate::{FieldErrors, GameDraft};
