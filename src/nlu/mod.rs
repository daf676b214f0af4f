//! Utterance understanding
//!
//! Normalization, compound splitting, the three resolution stages and the
//! pipeline that chains them.

pub mod anaphora;
pub mod classifier;
pub mod compound;
pub mod entities;
pub mod normalizer;
pub mod patterns;
pub mod pipeline;
pub mod stages;

pub use classifier::{Classification, ClassifierError, IntentClassifier, OllamaClassifier};
pub use normalizer::{normalize, Normalized};
pub use patterns::{PatternRules, Required};
pub use pipeline::IntentPipeline;
pub use stages::{Candidate, EntityStage, GenerativeStage, PatternStage, ResolutionStage, StageInput};
