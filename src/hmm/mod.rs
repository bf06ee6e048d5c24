//! Discrete hidden Markov models: validated model, per-sequence inference
//! context, and supervised estimation.

mod context;
pub mod model;
pub mod tagger;
pub mod trainer;
