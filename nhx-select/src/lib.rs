//! # nhx-select
//!
//! Picks the best structural (T1-weighted) series per subject and session
//! from a raw acquisition tree and converts each pick to a canonically named
//! volume under `sub-{id}/ses-{key}/anat/`.
//!
//! **Pipeline:** classify series labels, rank survivors against a priority
//! table, group by session key, keep the minimum rank per session (run
//! numbers only on ties), hand each pick to a [`services::Transcoder`].

pub mod config;
pub mod models;
pub mod rules;
pub mod services;

pub use config::{SelectConfig, SelectToolConfig};
pub use models::{canonical_stem, CandidateSequence, SelectedSequence, SubjectSelection};
pub use services::{ConversionRun, ConversionRunner, SequenceSelector, Transcoder};
