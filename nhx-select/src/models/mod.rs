//! Data models for sequence selection

pub mod sequence;

pub use sequence::{canonical_stem, CandidateSequence, SelectedSequence, SubjectSelection};
