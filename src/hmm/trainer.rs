use std::time::Instant;

use super::model::HmmModel;
use crate::{
    dataset::Dataset,
    error::{Error, Result},
    evaluation::evaluate_model,
};

/// Estimation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerOpt {
    /// Additive pseudo-count for every initial, transition and emission cell.
    pub smoothing: f64,
}

impl Default for TrainerOpt {
    fn default() -> Self {
        Self { smoothing: 1.0 }
    }
}

impl TrainerOpt {
    /// Sets a parameter from its `name` and textual `value`.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "smoothing" => {
                let v: f64 = value
                    .parse()
                    .map_err(|e| Error::InvalidArgument(format!("smoothing={value}: {e}")))?;
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::InvalidArgument(format!(
                        "smoothing must be a non-negative number, got {value}"
                    )));
                }
                self.smoothing = v;
            }
            _ => return Err(Error::InvalidArgument(format!("unknown parameter: {name}"))),
        }
        Ok(())
    }
}

/// Supervised maximum likelihood estimation of an [`HmmModel`] from labeled
/// sequences.
#[derive(Debug, Default)]
pub struct HmmTrainer {
    opt: TrainerOpt,
}

impl HmmTrainer {
    pub fn new(opt: TrainerOpt) -> Self {
        Self { opt }
    }

    pub fn opt(&self) -> &TrainerOpt {
        &self.opt
    }

    /// Estimates a model from every sequence not in the `holdout` group, then
    /// logs the evaluation of the model on the holdout sequences.
    pub fn train(&self, ds: &Dataset, holdout: Option<usize>) -> Result<HmmModel> {
        let n_labels = ds.num_labels();
        let n_attrs = ds.num_attrs();
        let alpha = self.opt.smoothing;
        let begin = Instant::now();

        let mut initial = vec![0.0; n_labels];
        let mut transition = vec![vec![0.0; n_labels]; n_labels];
        let mut emission = vec![vec![0.0; n_attrs]; n_labels];

        let mut n = 0;
        for seq in ds.seqs.iter().filter(|s| Some(s.group) != holdout) {
            initial[seq.labels[0]] += 1.0;
            for w in seq.labels.windows(2) {
                transition[w[0]][w[1]] += 1.0;
            }
            for (&a, &l) in seq.items.iter().zip(&seq.labels) {
                emission[l][a] += 1.0;
            }
            n += 1;
        }
        if n == 0 {
            return Err(Error::InvalidArgument("no training sequences".into()));
        }
        log::info!("estimate (L: {n_labels}, A: {n_attrs}, N: {n}, smoothing: {alpha})");

        let initial = normalize(&initial, alpha, || "initial distribution".to_string())?;
        let transition = transition
            .iter()
            .enumerate()
            .map(|(i, row)| normalize(row, alpha, || format!("transitions from {:?}", ds.label(i))))
            .collect::<Result<Vec<_>>>()?;
        let emission = emission
            .iter()
            .enumerate()
            .map(|(i, row)| normalize(row, alpha, || format!("emissions of {:?}", ds.label(i))))
            .collect::<Result<Vec<_>>>()?;

        let model = HmmModel::new(ds.labels.iter(), ds.attrs.iter(), initial, transition, emission)?;
        log::info!("time cost: {:?}", begin.elapsed());

        if let Some(g) = holdout {
            let evaluation = evaluate_model(&model, ds, Some(g))?;
            log::info!("holdout evaluation (group {g}):\n{evaluation}");
        }
        Ok(model)
    }
}

fn normalize<F: Fn() -> String>(counts: &[f64], alpha: f64, what: F) -> Result<Vec<f64>> {
    let total = counts.iter().sum::<f64>() + alpha * counts.len() as f64;
    if total == 0.0 {
        return Err(Error::InvalidModel(format!(
            "{} were never observed; use a positive smoothing",
            what()
        )));
    }
    Ok(counts.iter().map(|c| (c + alpha) / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = "greeting\thi\ngreeting\thello\n\ngoodbye\tbye\ngoodbye\tsee\n\ngreeting\they\nthanks\tthanks\n";

    #[test]
    fn unsmoothed_counts() {
        let ds = Dataset::from_text(DATA).unwrap();
        let mut opt = TrainerOpt::default();
        opt.set("smoothing", "0").unwrap();
        // "thanks" only ends a sequence, so its transition row is empty
        match HmmTrainer::new(opt).train(&ds, None) {
            Err(Error::InvalidModel(msg)) => assert!(msg.contains("\"thanks\""), "{msg}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn smoothed_counts() {
        let ds = Dataset::from_text(DATA).unwrap();
        let model = HmmTrainer::default().train(&ds, None).unwrap();
        // states: greeting, goodbye, thanks; symbols: hi, hello, bye, see, hey, thanks
        assert_eq!(model.states().iter().collect::<Vec<_>>(), ["greeting", "goodbye", "thanks"]);
        let close = |a: f64, b: f64| (a - b).abs() < 1e-12;
        // two of three sequences start with greeting
        assert!(close(model.initial()[0], 3.0 / 6.0));
        assert!(close(model.initial()[2], 1.0 / 6.0));
        // greeting -> greeting once, greeting -> thanks once
        assert!(close(model.transition(0, 0), 2.0 / 5.0));
        assert!(close(model.transition(0, 1), 1.0 / 5.0));
        assert!(close(model.transition(2, 2), 1.0 / 3.0));
        // greeting emits hi, hello, hey
        assert!(close(model.emission(0, 4), 2.0 / 9.0));
        assert!(close(model.emission(0, 2), 1.0 / 9.0));
    }

    #[test]
    fn holdout_group_is_excluded() {
        let mut ds = Dataset::default();
        ds.read("a\tx\na\tx\n".as_bytes(), 0).unwrap();
        ds.read("b\ty\n".as_bytes(), 1).unwrap();
        let model = HmmTrainer::default().train(&ds, Some(1)).unwrap();
        assert!((model.initial()[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((model.emission(1, 1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn only_holdout_sequences() {
        let mut ds = Dataset::default();
        ds.read("a\tx\n".as_bytes(), 3).unwrap();
        match HmmTrainer::default().train(&ds, Some(3)) {
            Err(Error::InvalidArgument(..)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn set_parameters() {
        let mut opt = TrainerOpt::default();
        opt.set("smoothing", "0.25").unwrap();
        assert_eq!(opt.smoothing, 0.25);
        assert!(matches!(opt.set("smoothing", "-1"), Err(Error::InvalidArgument(..))));
        assert!(matches!(opt.set("smoothing", "abc"), Err(Error::InvalidArgument(..))));
        assert!(matches!(opt.set("c2", "1.0"), Err(Error::InvalidArgument(..))));
        assert_eq!(opt.smoothing, 0.25);
    }
}
