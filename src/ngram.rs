//! Bigram intent classifier.
//!
//! Each intent keeps counts of the adjacent word pairs in its examples. A
//! message is scored against an intent as the product over its word pairs of
//! `(count + 1) / (total + distinct)`, where `total` and `distinct` are the
//! intent's total and distinct pair counts. An intent whose examples hold no
//! word pairs is never a candidate.

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{error::Result, quark::Quark};

/// One intent and its example utterances, as read from an intents file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDef {
    pub intent: String,
    pub examples: Vec<String>,
}

#[derive(Debug, Default, Clone)]
struct Bigrams {
    counts: HashMap<String, usize>,
    total: usize,
}

#[derive(Debug, Default, Clone)]
pub struct NgramClassifier {
    intents: Quark,
    bigrams: Vec<Bigrams>,
}

fn words(s: &str) -> Vec<String> {
    s.to_lowercase().split_whitespace().map(str::to_string).collect()
}

fn bigram_keys(words: &[String]) -> impl Iterator<Item = String> + '_ {
    words.windows(2).map(|w| format!("{} {}", w[0], w[1]))
}

impl NgramClassifier {
    /// Counts the bigrams of every example. Intents keep their first-seen
    /// order, which decides ties in [`predict`](Self::predict).
    pub fn train<I, S, E>(intents: I) -> Self
    where
        I: IntoIterator<Item = (S, E)>,
        S: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let mut this = Self::default();
        for (intent, examples) in intents {
            let id = this.intents.find_or_insert(intent.as_ref());
            if id == this.bigrams.len() {
                this.bigrams.push(Bigrams::default());
            }
            let b = &mut this.bigrams[id];
            for example in examples {
                for key in bigram_keys(&words(example.as_ref())) {
                    *b.counts.entry(key).or_default() += 1;
                    b.total += 1;
                }
            }
        }
        log::debug!("trained bigram counts for {} intents", this.intents.len());
        this
    }

    pub fn from_defs(defs: Vec<IntentDef>) -> Self {
        Self::train(defs.into_iter().map(|d| (d.intent, d.examples)))
    }

    /// Reads a JSON array of `{"intent": ..., "examples": [...]}` objects.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defs: Vec<IntentDef> = serde_json::from_slice(&fs::read(path)?)?;
        Ok(Self::from_defs(defs))
    }

    pub fn intents(&self) -> &Quark {
        &self.intents
    }

    /// Log score of `message` under intent `id`. Negative infinity when the
    /// intent has no bigrams.
    pub fn log_score(&self, id: usize, message: &str) -> f64 {
        let b = &self.bigrams[id];
        if b.total == 0 {
            return f64::NEG_INFINITY;
        }
        let denominator = (b.total + b.counts.len()) as f64;
        let words = words(message);
        let mut score = 0.0;
        for key in bigram_keys(&words) {
            let count = b.counts.get(&key).copied().unwrap_or_default();
            score += ((count + 1) as f64 / denominator).ln();
        }
        score
    }

    /// The first intent with the highest score, or `None` when no intent can
    /// score the message.
    pub fn predict(&self, message: &str) -> Option<&str> {
        let mut best: Option<(usize, f64)> = None;
        for id in 0..self.intents.len() {
            let score = self.log_score(id, message);
            if score == f64::NEG_INFINITY {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((id, score));
            }
        }
        best.and_then(|(id, _)| self.intents.to_str(id))
    }
}
