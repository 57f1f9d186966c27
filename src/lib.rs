//! Populate + optimize pipeline for a scientific-name verification
//! database. See `README`/`DESIGN.md` for the full module map; in short:
//!
//! - [`fetch`] resolves and opens an SFGA archive.
//! - [`sfga`] reads it (taxa, names, synonyms, vernaculars, metadata).
//! - [`names`], [`hierarchy`], [`classification`], [`index`],
//!   [`vernacular`], [`metadata`] turn one source's archive into rows in
//!   the ten core tables.
//! - [`orchestrator`] drives one populate run across every configured
//!   source.
//! - [`optimize`] runs after populate: reparse, word index, verification
//!   view, vacuum/analyze.
//!
//! Configuration loading, CLI wiring, and logging initialization are
//! deliberately out of scope for this crate (spec §1 Non-goals) -- see
//! `src/bin/run.rs` for a minimal harness that supplies them.

pub mod cancel;
pub mod classification;
pub mod config;
pub mod db;
pub mod errors;
pub mod fetch;
pub mod hierarchy;
pub mod ids;
pub mod index;
pub mod metadata;
pub mod names;
pub mod optimize;
pub mod orchestrator;
pub mod parser;
pub mod progress;
pub mod sfga;
pub mod vernacular;

pub use cancel::CancellationToken;
pub use config::Config;
pub use db::Operator;
pub use errors::Error;
pub use optimize::Optimizer;
pub use orchestrator::{PopulateOrchestrator, PopulateSummary};
pub use parser::{NameParser, NomenclaturalCode, ParsedName, RegexNameParser};
pub use progress::{ProgressEvent, ProgressReporter};
