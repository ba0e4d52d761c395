//! Transcript text processing: normalization, fuzzy matching and shared word lists

pub mod fuzzy;
pub mod normalizer;
pub mod vocab;

pub use normalizer::TextNormalizer;
