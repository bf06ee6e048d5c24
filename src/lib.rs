pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod hmm;
pub mod ngram;
pub mod quark;

pub use dataset::{Dataset, Sequence};
pub use error::{Error, Result};
pub use evaluation::{evaluate_model, Estimation, Evaluation};
pub use hmm::{
    model::{Decoding, Format, HmmModel, ModelDef},
    tagger::{HmmTagger, Tagger},
    trainer::{HmmTrainer, TrainerOpt},
};
pub use ngram::NgramClassifier;
pub use quark::Quark;
