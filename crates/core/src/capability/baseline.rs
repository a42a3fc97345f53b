//! Baseline capabilities: a word tokenizer and multinomial naive Bayes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::{
    CapabilityError, Predictor, ScoredPrediction, TokenizedDocument, Tokenizer, TrainedModel,
    Trainer,
};
use crate::{ClassId, DocumentId};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Lowercased runs of word characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        WORD.find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Vocabulary {
    terms: Vec<String>,
}

impl Vocabulary {
    fn index(&self) -> HashMap<&str, usize> {
        self.terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NaiveBayesModel {
    classes: Vec<ClassId>,
    log_priors: Vec<f64>,
    /// `log_likelihoods[class][term]`
    log_likelihoods: Vec<Vec<f64>>,
}

impl NaiveBayesModel {
    /// Class index and softmax confidence of the best class.
    fn classify(&self, term_ids: &[usize]) -> (usize, f64) {
        let scores: Vec<f64> = self
            .log_priors
            .iter()
            .zip(&self.log_likelihoods)
            .map(|(prior, likelihoods)| {
                prior
                    + term_ids
                        .iter()
                        .filter_map(|&t| likelihoods.get(t))
                        .sum::<f64>()
            })
            .collect();

        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }

        let max = scores[best];
        let total: f64 = scores.iter().map(|s| (s - max).exp()).sum();
        (best, 1.0 / total)
    }
}

/// Multinomial naive Bayes with Laplace smoothing. Blobs are JSON.
#[derive(Debug, Clone, Copy)]
pub struct NaiveBayes {
    alpha: f64,
}

impl Default for NaiveBayes {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl NaiveBayes {
    pub fn with_smoothing(alpha: f64) -> Self {
        Self { alpha }
    }
}

fn term_ids(index: &HashMap<&str, usize>, tokens: &[String]) -> Vec<usize> {
    tokens
        .iter()
        .filter_map(|t| index.get(t.as_str()).copied())
        .collect()
}

/// Accuracy plus macro-averaged precision, recall and F1.
fn evaluate(classes: &[ClassId], pairs: &[(ClassId, ClassId)]) -> BTreeMap<String, f64> {
    let correct = pairs.iter().filter(|(truth, guess)| truth == guess).count();
    let accuracy = correct as f64 / pairs.len() as f64;

    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for class in classes {
        let tp = pairs.iter().filter(|(t, g)| t == class && g == class).count() as f64;
        let predicted = pairs.iter().filter(|(_, g)| g == class).count() as f64;
        let actual = pairs.iter().filter(|(t, _)| t == class).count() as f64;

        let p = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let r = if actual > 0.0 { tp / actual } else { 0.0 };
        precision += p;
        recall += r;
        if p + r > 0.0 {
            f1 += 2.0 * p * r / (p + r);
        }
    }
    let n = classes.len() as f64;

    BTreeMap::from([
        ("accuracy".to_string(), accuracy),
        ("precision".to_string(), precision / n),
        ("recall".to_string(), recall / n),
        ("f1".to_string(), f1 / n),
        ("training_samples".to_string(), pairs.len() as f64),
        ("num_classes".to_string(), n),
    ])
}

impl Trainer for NaiveBayes {
    fn train(
        &self,
        corpus: &[TokenizedDocument],
        labels: &HashMap<DocumentId, ClassId>,
    ) -> Result<TrainedModel, CapabilityError> {
        let labelled: Vec<(&TokenizedDocument, ClassId)> = corpus
            .iter()
            .filter_map(|doc| labels.get(&doc.document_id).map(|c| (doc, *c)))
            .collect();

        if labelled.len() < 2 {
            return Err(CapabilityError::InsufficientData(format!(
                "need at least 2 labelled documents, got {}",
                labelled.len()
            )));
        }

        let vocabulary = Vocabulary {
            terms: labelled
                .iter()
                .flat_map(|(doc, _)| doc.tokens.iter().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        let index = vocabulary.index();
        let classes: Vec<ClassId> = labelled
            .iter()
            .map(|(_, c)| *c)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let vocab_size = vocabulary.terms.len();
        let mut doc_counts = vec![0usize; classes.len()];
        let mut term_counts = vec![vec![0.0f64; vocab_size]; classes.len()];

        for (doc, class) in &labelled {
            // classes is sorted and contains every label
            let c = classes.binary_search(class).unwrap_or_default();
            doc_counts[c] += 1;
            for t in term_ids(&index, &doc.tokens) {
                term_counts[c][t] += 1.0;
            }
        }

        let total_docs = labelled.len() as f64;
        let log_priors = doc_counts
            .iter()
            .map(|&n| (n as f64 / total_docs).ln())
            .collect();
        let log_likelihoods = term_counts
            .iter()
            .map(|counts| {
                let denom = counts.iter().sum::<f64>() + self.alpha * vocab_size as f64;
                counts
                    .iter()
                    .map(|&n| ((n + self.alpha) / denom).ln())
                    .collect()
            })
            .collect();

        let model = NaiveBayesModel {
            classes: classes.clone(),
            log_priors,
            log_likelihoods,
        };

        let pairs: Vec<(ClassId, ClassId)> = labelled
            .iter()
            .map(|(doc, truth)| {
                let (best, _) = model.classify(&term_ids(&index, &doc.tokens));
                (*truth, model.classes[best])
            })
            .collect();
        let mut metrics = evaluate(&classes, &pairs);
        metrics.insert("vocabulary_size".to_string(), vocab_size as f64);

        let classifier =
            serde_json::to_vec(&model).map_err(|e| CapabilityError::Failed(e.to_string()))?;
        let vectorizer =
            serde_json::to_vec(&vocabulary).map_err(|e| CapabilityError::Failed(e.to_string()))?;

        Ok(TrainedModel {
            classifier,
            vectorizer,
            metrics,
        })
    }
}

impl Predictor for NaiveBayes {
    fn predict(
        &self,
        classifier: &[u8],
        vectorizer: &[u8],
        corpus: &[TokenizedDocument],
    ) -> Result<Vec<ScoredPrediction>, CapabilityError> {
        let model: NaiveBayesModel = serde_json::from_slice(classifier)
            .map_err(|e| CapabilityError::MalformedModel(format!("classifier: {}", e)))?;
        let vocabulary: Vocabulary = serde_json::from_slice(vectorizer)
            .map_err(|e| CapabilityError::MalformedModel(format!("vectorizer: {}", e)))?;

        if model.classes.is_empty() || model.classes.len() != model.log_priors.len() {
            return Err(CapabilityError::MalformedModel(
                "class table does not match priors".to_string(),
            ));
        }

        let index = vocabulary.index();
        Ok(corpus
            .iter()
            .map(|doc| {
                let (best, confidence) = model.classify(&term_ids(&index, &doc.tokens));
                ScoredPrediction {
                    document_id: doc.document_id,
                    class_id: model.classes[best],
                    confidence,
                }
            })
            .collect())
    }
}
