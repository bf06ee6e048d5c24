use std::{collections::BTreeMap, fmt::Display, iter::zip};

use crate::{dataset::Dataset, error::Result, hmm::model::HmmModel};

/// Label-wise performance values.
#[derive(Debug, Default)]
struct LabelMeasure {
    /// Number of correct predictions.
    num_correct: usize,
    /** Number of occurrences of the label in the gold-standard data. */
    num_observation: usize,
    /** Number of predictions. */
    num_prediction: usize,
    precision: f64,
    recall: f64,
    /** F1 score. */
    fmeasure: f64,
}

/// An overall performance values.
#[derive(Debug, Default)]
pub struct Evaluation {
    /** Number of labels; the denominator of the macro averages. */
    pub num_labels: usize,
    /** Label-wise evaluations. */
    tbl: BTreeMap<String, LabelMeasure>,

    /** Number of correctly predicted items. */
    item_total_correct: usize,
    /** Total number of items. */
    item_total_num: usize,
    /** Total number of occurrences of labels in the gold-standard data. */
    item_total_observation: usize,
    /** Total number of predictions. */
    item_total_prediction: usize,
    /** Item-level accuracy. */
    item_accuracy: f64,

    /** Number of correctly predicted sequences. */
    inst_total_correct: usize,
    /** Total number of sequences. */
    inst_total_num: usize,
    /** Sequence-level accuracy. */
    inst_accuracy: f64,

    macro_precision: f64,
    macro_recall: f64,
    macro_fmeasure: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimation {
    pub precision: f64,
    pub recall: f64,
    pub fmeasure: f64,
    pub item_accuracy: f64,
    pub sequence_accuracy: f64,
}

impl Evaluation {
    pub fn new(num_labels: usize) -> Self {
        Self { num_labels, ..Default::default() }
    }

    /// Adds one sequence of reference labels and the predicted labels for it.
    pub fn accumulate<R: AsRef<str>, P: AsRef<str>>(&mut self, reference: &[R], prediction: &[P]) {
        debug_assert_eq!(reference.len(), prediction.len());
        let mut matched = 0;
        for (r, p) in zip(reference, prediction) {
            let (r, p) = (r.as_ref(), p.as_ref());
            self.tbl.entry(r.to_string()).or_default().num_observation += 1;
            self.tbl.entry(p.to_string()).or_default().num_prediction += 1;
            if r == p {
                self.tbl.entry(r.to_string()).or_default().num_correct += 1;
                matched += 1;
            }
            self.item_total_num += 1;
        }

        if matched == prediction.len() {
            self.inst_total_correct += 1;
        }
        self.inst_total_num += 1;
    }

    pub fn evaluate(&mut self) -> Estimation {
        self.item_total_correct = 0;
        self.item_total_prediction = 0;
        self.item_total_observation = 0;
        self.macro_precision = 0.0;
        self.macro_recall = 0.0;
        self.macro_fmeasure = 0.0;

        for lev in self.tbl.values_mut() {
            if lev.num_observation == 0 {
                continue;
            }
            self.item_total_correct += lev.num_correct;
            self.item_total_prediction += lev.num_prediction;
            self.item_total_observation += lev.num_observation;

            lev.precision = 0.0;
            lev.recall = 0.0;
            lev.fmeasure = 0.0;

            if lev.num_prediction > 0 {
                lev.precision = lev.num_correct as f64 / lev.num_prediction as f64;
            }
            lev.recall = lev.num_correct as f64 / lev.num_observation as f64;
            if lev.precision + lev.recall > 0.0 {
                lev.fmeasure = lev.precision * lev.recall * 2.0 / (lev.precision + lev.recall);
            }
            self.macro_precision += lev.precision;
            self.macro_recall += lev.recall;
            self.macro_fmeasure += lev.fmeasure;
        }

        let n = if self.num_labels > 0 { self.num_labels } else { self.tbl.len().max(1) };
        self.macro_precision /= n as f64;
        self.macro_recall /= n as f64;
        self.macro_fmeasure /= n as f64;

        if self.item_total_num > 0 {
            self.item_accuracy = self.item_total_correct as f64 / self.item_total_num as f64;
        }
        if self.inst_total_num > 0 {
            self.inst_accuracy = self.inst_total_correct as f64 / self.inst_total_num as f64;
        }
        Estimation {
            precision: self.macro_precision,
            recall: self.macro_recall,
            fmeasure: self.macro_fmeasure,
            item_accuracy: self.item_accuracy,
            sequence_accuracy: self.inst_accuracy,
        }
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Performance by label (#match, #model, #ref) (precision, recall, F1):")?;
        for (label, lev) in &self.tbl {
            if lev.num_observation == 0 {
                writeln!(
                    f,
                    "\t{}: ({}, {}, {}) (******, ******, ******)",
                    label, lev.num_correct, lev.num_prediction, lev.num_observation
                )?;
            } else {
                writeln!(
                    f,
                    "\t{}: ({}, {}, {}) ({:.4}, {:.4}, {:.4})",
                    label,
                    lev.num_correct,
                    lev.num_prediction,
                    lev.num_observation,
                    lev.precision,
                    lev.recall,
                    lev.fmeasure
                )?;
            }
        }
        writeln!(
            f,
            "Macro-average precision, recall, F1: ({:.6}, {:.6}, {:.6})",
            self.macro_precision, self.macro_recall, self.macro_fmeasure
        )?;
        writeln!(
            f,
            "Item accuracy: {} / {} ({:.4})",
            self.item_total_correct, self.item_total_num, self.item_accuracy
        )?;
        write!(
            f,
            "Sequence accuracy: {} / {} ({:.4})",
            self.inst_total_correct, self.inst_total_num, self.inst_accuracy
        )
    }
}

/// Tags the sequences of `ds` (only those of `group`, when given) with
/// `model` and compares the result against their labels. Sequences holding
/// symbols outside the model's alphabet are skipped with a warning.
pub fn evaluate_model(model: &HmmModel, ds: &Dataset, group: Option<usize>) -> Result<Evaluation> {
    let mut evaluation = Evaluation::new(model.num_states());
    for seq in ds.seqs.iter().filter(|s| group.map_or(true, |g| s.group == g)) {
        let symbols: Vec<&str> = seq.items.iter().map(|&a| ds.symbol(a)).collect();
        let observations = match model.encode(&symbols) {
            Ok(observations) => observations,
            Err(e) => {
                log::warn!("skipping sequence: {e}");
                continue;
            }
        };
        let prediction = model.predict_path(&observations)?;
        let reference: Vec<&str> = seq.labels.iter().map(|&l| ds.label(l)).collect();
        evaluation.accumulate(&reference, &prediction);
    }
    evaluation.evaluate();
    Ok(evaluation)
}
