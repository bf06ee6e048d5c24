use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use super::{
    context::CtxOpt,
    tagger::{HmmTagger, Tagger},
};
use crate::{
    error::{Error, Result},
    quark::Quark,
};

/// Largest accepted distance between a probability row sum and 1.0.
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Serialized form of a model, as stored in JSON or BSON files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    pub states: Vec<String>,
    pub observations: Vec<String>,
    pub initial: Vec<f64>,
    pub transition: Vec<Vec<f64>>,
    pub emission: Vec<Vec<f64>>,
}

/// On-disk encoding of a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Bson,
}

impl Format {
    /// `.bson` files are BSON, everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bson") => Format::Bson,
            _ => Format::Json,
        }
    }
}

/// Result of decoding one observation sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoding {
    /// Most likely label index at each position.
    pub path: Vec<usize>,
    /// Log probability of `path` jointly with the observations.
    pub log_prob: f64,
}

impl Decoding {
    pub fn terminal(&self) -> usize {
        // decoded sequences are never empty
        self.path[self.path.len() - 1]
    }
}

/// A discrete hidden Markov model.
///
/// Validated once at construction and immutable afterwards, so a single
/// instance can be shared by any number of threads decoding concurrently.
/// Matrices are stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct HmmModel {
    states: Quark,
    alphabet: Quark,
    initial: Vec<f64>,
    transition: Vec<f64>,
    emission: Vec<f64>,
    log_initial: Vec<f64>,
    log_transition: Vec<f64>,
    log_emission: Vec<f64>,
}

impl HmmModel {
    pub fn new<S, O>(
        states: impl IntoIterator<Item = S>,
        observations: impl IntoIterator<Item = O>,
        initial: Vec<f64>,
        transition: Vec<Vec<f64>>,
        emission: Vec<Vec<f64>>,
    ) -> Result<Self>
    where
        S: Into<String>,
        O: Into<String>,
    {
        Self::try_from(ModelDef {
            states: states.into_iter().map(Into::into).collect(),
            observations: observations.into_iter().map(Into::into).collect(),
            initial,
            transition,
            emission,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let buffer = fs::read(path)?;
        let model = Self::from_memory(&buffer, Format::from_path(path))?;
        log::info!(
            "loaded model from {} (states: {}, symbols: {})",
            path.display(),
            model.num_states(),
            model.num_symbols()
        );
        Ok(model)
    }

    pub fn from_memory(buffer: &[u8], format: Format) -> Result<Self> {
        let def: ModelDef = match format {
            Format::Json => serde_json::from_slice(buffer)?,
            Format::Bson => bson::from_slice(buffer)?,
        };
        Self::try_from(def)
    }

    /// Writes the model to `path`, encoded according to its extension.
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let def = self.to_def();
        let buffer = match Format::from_path(path) {
            Format::Json => serde_json::to_vec_pretty(&def)?,
            Format::Bson => bson::to_vec(&def)?,
        };
        fs::write(path, buffer)?;
        log::info!("wrote model to {}", path.display());
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_def())?)
    }

    pub fn to_def(&self) -> ModelDef {
        let n = self.num_states();
        let m = self.num_symbols();
        ModelDef {
            states: self.states.as_slice().to_vec(),
            observations: self.alphabet.as_slice().to_vec(),
            initial: self.initial.clone(),
            transition: self.transition.chunks(n).map(<[f64]>::to_vec).collect(),
            emission: self.emission.chunks(m).map(<[f64]>::to_vec).collect(),
        }
    }

    /// Number of hidden states (N).
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Size of the observation alphabet (M).
    pub fn num_symbols(&self) -> usize {
        self.alphabet.len()
    }

    pub fn states(&self) -> &Quark {
        &self.states
    }

    pub fn alphabet(&self) -> &Quark {
        &self.alphabet
    }

    /// Label of state `i`. Panics if `i` is not below `num_states()`.
    pub fn label(&self, i: usize) -> &str {
        &self.states.as_slice()[i]
    }

    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    pub fn transition(&self, i: usize, j: usize) -> f64 {
        self.transition[self.num_states() * i + j]
    }

    pub fn emission(&self, i: usize, k: usize) -> f64 {
        self.emission[self.num_symbols() * i + k]
    }

    pub(crate) fn log_initial(&self) -> &[f64] {
        &self.log_initial
    }

    pub(crate) fn log_transition(&self) -> &[f64] {
        &self.log_transition
    }

    pub(crate) fn log_emission(&self, i: usize, k: usize) -> f64 {
        self.log_emission[self.num_symbols() * i + k]
    }

    /// Maps observation symbols to their alphabet indices.
    pub fn encode<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Vec<usize>> {
        symbols
            .iter()
            .enumerate()
            .map(|(t, s)| {
                let s = s.as_ref();
                self.alphabet.to_id(s).ok_or_else(|| {
                    Error::InvalidObservation(format!("unknown symbol {s:?} at position {t}"))
                })
            })
            .collect()
    }

    pub fn check_observations(&self, observations: &[usize]) -> Result<()> {
        if observations.is_empty() {
            return Err(Error::InvalidObservation("empty observation sequence".into()));
        }
        let m = self.num_symbols();
        if let Some((t, o)) = observations.iter().enumerate().find(|&(_, &o)| o >= m) {
            return Err(Error::InvalidObservation(format!(
                "symbol index {o} at position {t} is out of range (alphabet size {m})"
            )));
        }
        Ok(())
    }

    /// A tagger with forward-backward support, for marginals and scoring.
    pub fn tagger(&self) -> HmmTagger<'_> {
        HmmTagger::new(self, CtxOpt::VITERBI | CtxOpt::MARGINALS)
    }

    /// Most likely state path and its log probability.
    pub fn decode(&self, observations: &[usize]) -> Result<Decoding> {
        let mut tagger = HmmTagger::new(self, CtxOpt::VITERBI);
        tagger.set_seq(observations)?;
        let mut path = vec![0; observations.len()];
        let log_prob = tagger.viterbi(&mut path);
        Ok(Decoding { path, log_prob })
    }

    /// Label of the most likely terminal state.
    pub fn predict(&self, observations: &[usize]) -> Result<&str> {
        let decoding = self.decode(observations)?;
        Ok(self.label(decoding.terminal()))
    }

    /// Labels of the most likely state path.
    pub fn predict_path(&self, observations: &[usize]) -> Result<Vec<&str>> {
        let decoding = self.decode(observations)?;
        Ok(decoding.path.into_iter().map(|i| self.label(i)).collect())
    }
}

impl TryFrom<ModelDef> for HmmModel {
    type Error = Error;

    fn try_from(def: ModelDef) -> Result<Self> {
        let ModelDef { states, observations, initial, transition, emission } = def;
        if states.is_empty() {
            return Err(Error::InvalidModel("the state set is empty".into()));
        }
        if observations.is_empty() {
            return Err(Error::InvalidModel("the observation alphabet is empty".into()));
        }
        let states = Quark::try_from(states)?;
        let alphabet = Quark::try_from(observations)?;
        let n = states.len();
        let m = alphabet.len();

        if initial.len() != n {
            return Err(Error::InvalidModel(format!(
                "initial distribution has {} entries, expected {n}",
                initial.len()
            )));
        }
        check_row("initial distribution", &initial)?;
        let transition = flatten("transition", transition, n, n)?;
        let emission = flatten("emission", emission, n, m)?;

        let ln = |v: &[f64]| v.iter().map(|p| p.ln()).collect::<Vec<_>>();
        Ok(Self {
            log_initial: ln(&initial),
            log_transition: ln(&transition),
            log_emission: ln(&emission),
            states,
            alphabet,
            initial,
            transition,
            emission,
        })
    }
}

fn flatten(name: &str, rows: Vec<Vec<f64>>, n: usize, m: usize) -> Result<Vec<f64>> {
    if rows.len() != n {
        return Err(Error::InvalidModel(format!(
            "{name} matrix has {} rows, expected {n}",
            rows.len()
        )));
    }
    let mut flat = Vec::with_capacity(n * m);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != m {
            return Err(Error::InvalidModel(format!(
                "{name} row {i} has {} columns, expected {m}",
                row.len()
            )));
        }
        check_row(&format!("{name} row {i}"), row)?;
        flat.extend_from_slice(row);
    }
    Ok(flat)
}

fn check_row(what: &str, row: &[f64]) -> Result<()> {
    if let Some((k, p)) = row.iter().enumerate().find(|(_, p)| !(0.0..=1.0).contains(*p)) {
        return Err(Error::InvalidModel(format!(
            "{what} has probability {p} at index {k}, outside [0, 1]"
        )));
    }
    let sum: f64 = row.iter().sum();
    if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(Error::InvalidModel(format!("{what} sums to {sum}, expected 1")));
    }
    Ok(())
}
