//! Tokenize/train/predict capabilities invoked by the executor.
//!
//! The executor only depends on the traits. [`NaiveBayes`] and
//! [`WordTokenizer`] are a small baseline so the binary works end to end.

mod baseline;
mod traits;

pub use baseline::{NaiveBayes, WordTokenizer};
pub use traits::{
    CapabilityError, Predictor, ScoredPrediction, TokenizedDocument, Tokenizer, TrainedModel,
    Trainer,
};
