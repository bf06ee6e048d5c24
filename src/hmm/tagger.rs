use super::{
    context::{CtxOpt, HmmContext, ResetOpt},
    model::HmmModel,
};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    None,
    Set,
    AlphaBeta,
}

/// Inference over one observation sequence at a time.
///
/// Methods other than `set_seq` panic when no sequence has been set, and
/// when a position or label lies outside the loaded sequence or the model.
pub trait Tagger {
    /// Loads an observation sequence, replacing the previous one. On error the
    /// previous sequence stays loaded.
    fn set_seq(&mut self, observations: &[usize]) -> Result<()>;
    /// Number of items (T) of the loaded sequence.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Writes the most likely label path into `labels` and returns its log
    /// probability.
    fn viterbi(&mut self, labels: &mut [usize]) -> f64;
    /// Log probability of the observation sequence.
    fn lognorm(&mut self) -> f64;
    /// Probability of label `l` at position `t` given the observations.
    fn marginal_point(&mut self, l: usize, t: usize) -> f64;
    /// Probability of `path[begin..end]` at positions `begin..end` given the
    /// observations.
    fn marginal_path(&mut self, path: &[usize], begin: usize, end: usize) -> f64;
    /// Log joint probability of `path` and the observations.
    fn score(&self, path: &[usize]) -> f64;
}

#[derive(Debug)]
pub struct HmmTagger<'a> {
    model: &'a HmmModel,
    ctx: HmmContext,
    level: Level,
}

impl<'a> HmmTagger<'a> {
    pub(crate) fn new(model: &'a HmmModel, flag: CtxOpt) -> Self {
        let mut ctx = HmmContext::new(flag, model.num_states(), 0);
        ctx.reset(ResetOpt::TRANS);
        /* Transition scores do not depend on the sequence. */
        ctx.trans.copy_from_slice(model.log_transition());
        if flag.contains(CtxOpt::MARGINALS) {
            ctx.exp_transition();
        }
        Self { model, ctx, level: Level::None }
    }

    pub fn model(&self) -> &'a HmmModel {
        self.model
    }

    fn ensure_set(&self) {
        assert!(self.level >= Level::Set, "no observation sequence has been set");
    }

    fn check_labels(&self, labels: &[usize]) {
        let n = self.model.num_states();
        if let Some(l) = labels.iter().find(|&&l| l >= n) {
            panic!("label {l} out of range for {n} states");
        }
    }

    fn ensure_alphabeta(&mut self) {
        self.ensure_set();
        if self.level < Level::AlphaBeta {
            self.ctx.exp_state();
            self.ctx.alpha_score();
            self.ctx.beta_score();
            self.ctx.marginals();
            self.level = Level::AlphaBeta;
        }
    }
}

impl<'a> Tagger for HmmTagger<'a> {
    fn set_seq(&mut self, observations: &[usize]) -> Result<()> {
        self.model.check_observations(observations)?;
        let l = self.ctx.num_labels;
        self.ctx.set_num_items(observations.len());
        self.ctx.reset(ResetOpt::STATE);

        for (t, &o) in observations.iter().enumerate() {
            for j in 0..l {
                self.ctx.state[l * t + j] = self.model.log_emission(j, o);
            }
        }
        /* The first row also carries the initial distribution. */
        for (s, p) in self.ctx.state[..l].iter_mut().zip(self.model.log_initial()) {
            *s += p;
        }
        self.level = Level::Set;
        Ok(())
    }

    fn len(&self) -> usize {
        self.ctx.num_items()
    }

    fn viterbi(&mut self, labels: &mut [usize]) -> f64 {
        self.ensure_set();
        assert!(labels.len() >= self.len(), "label buffer is shorter than the sequence");
        self.ctx.viterbi(labels)
    }

    fn lognorm(&mut self) -> f64 {
        self.ensure_alphabeta();
        self.ctx.lognorm()
    }

    fn marginal_point(&mut self, l: usize, t: usize) -> f64 {
        self.ensure_alphabeta();
        assert!(
            t < self.len() && l < self.model.num_states(),
            "invalid point (label {l}, position {t})"
        );
        self.ctx.marginal_point(l, t)
    }

    fn marginal_path(&mut self, path: &[usize], begin: usize, end: usize) -> f64 {
        self.ensure_alphabeta();
        assert!(
            begin < end && end <= self.len() && end <= path.len(),
            "invalid range {begin}..{end}"
        );
        self.check_labels(&path[begin..end]);
        self.ctx.marginal_path(path, begin, end)
    }

    fn score(&self, path: &[usize]) -> f64 {
        self.ensure_set();
        assert_eq!(path.len(), self.len(), "path length differs from the sequence");
        self.check_labels(path);
        self.ctx.score(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn weather() -> HmmModel {
        HmmModel::new(
            ["rainy", "sunny"],
            ["walk", "shop", "clean"],
            vec![0.6, 0.4],
            vec![vec![0.7, 0.3], vec![0.4, 0.6]],
            vec![vec![0.1, 0.4, 0.5], vec![0.6, 0.3, 0.1]],
        )
        .unwrap()
    }

    /// Sum of the joint probability over every label path.
    fn brute_force_norm(model: &HmmModel, obs: &[usize]) -> f64 {
        let n = model.num_states();
        let total = n.pow(obs.len() as u32);
        (0..total)
            .map(|mut code| {
                let mut path = Vec::with_capacity(obs.len());
                for _ in 0..obs.len() {
                    path.push(code % n);
                    code /= n;
                }
                let mut p = model.initial()[path[0]] * model.emission(path[0], obs[0]);
                for t in 1..obs.len() {
                    p *= model.transition(path[t - 1], path[t]) * model.emission(path[t], obs[t]);
                }
                p
            })
            .sum()
    }

    #[test]
    fn lognorm_matches_brute_force() {
        let model = weather();
        let mut tagger = model.tagger();
        let obs = [0, 1, 2, 2, 0];
        tagger.set_seq(&obs).unwrap();
        let expected = brute_force_norm(&model, &obs).ln();
        assert!((tagger.lognorm() - expected).abs() < 1e-10, "{} != {}", tagger.lognorm(), expected);
    }

    #[test]
    fn marginals_sum_to_one() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[2, 2, 0, 1]).unwrap();
        for t in 0..tagger.len() {
            let sum: f64 = (0..2).map(|l| tagger.marginal_point(l, t)).sum();
            assert!((sum - 1.0).abs() < 1e-10, "t={t}: {sum}");
        }
    }

    #[test]
    fn marginal_path_of_single_point() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 2, 1]).unwrap();
        let path = [1, 0, 0];
        for t in 0..3 {
            let a = tagger.marginal_path(&path, t, t + 1);
            let b = tagger.marginal_point(path[t], t);
            assert!((a - b).abs() < 1e-12, "t={t}: {a} != {b}");
        }
    }

    #[test]
    fn full_marginal_path_is_posterior() {
        let model = weather();
        let mut tagger = model.tagger();
        let obs = [0, 2, 1];
        tagger.set_seq(&obs).unwrap();
        let path = [1, 0, 0];
        let posterior = (tagger.score(&path) - tagger.lognorm()).exp();
        let p = tagger.marginal_path(&path, 0, 3);
        assert!((p - posterior).abs() < 1e-12, "{p} != {posterior}");
    }

    #[test]
    fn viterbi_score_agrees() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 0, 2, 1, 2]).unwrap();
        let mut labels = vec![0; 5];
        let best = tagger.viterbi(&mut labels);
        assert!((tagger.score(&labels) - best).abs() < 1e-12);
        assert!(best <= tagger.lognorm());
    }

    #[test]
    fn marginals_after_viterbi() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[1, 2]).unwrap();
        let before = tagger.marginal_point(0, 1);
        let mut labels = vec![0; 2];
        tagger.viterbi(&mut labels);
        assert_eq!(tagger.marginal_point(0, 1), before);
    }

    #[test]
    fn failed_set_keeps_previous_sequence() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 1]).unwrap();
        match tagger.set_seq(&[0, 3, 1]) {
            Err(Error::InvalidObservation(..)) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(tagger.len(), 2);
    }

    #[test]
    #[should_panic(expected = "no observation sequence")]
    fn score_without_sequence() {
        let model = weather();
        let tagger = model.tagger();
        tagger.score(&[0]);
    }

    #[test]
    #[should_panic(expected = "invalid point")]
    fn marginal_point_past_shorter_sequence() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 1, 2, 2, 0]).unwrap();
        tagger.lognorm();
        tagger.set_seq(&[0, 1]).unwrap();
        assert_eq!(tagger.len(), 2);
        tagger.marginal_point(0, 4);
    }

    #[test]
    #[should_panic(expected = "invalid point")]
    fn marginal_point_unknown_label() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 1]).unwrap();
        tagger.marginal_point(2, 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn marginal_path_unknown_label() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 1, 2]).unwrap();
        tagger.marginal_path(&[0, 2, 1], 0, 2);
    }

    #[test]
    #[should_panic(expected = "invalid range")]
    fn marginal_path_shorter_than_range() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 1, 2]).unwrap();
        tagger.marginal_path(&[0, 1], 0, 3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn score_unknown_label() {
        let model = weather();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 1]).unwrap();
        tagger.score(&[1, 5]);
    }

    #[test]
    fn impossible_sequence_has_no_mass() {
        let model = HmmModel::new(
            ["a", "b"],
            ["x", "y", "z"],
            vec![0.5, 0.5],
            vec![vec![0.5, 0.5], vec![0.5, 0.5]],
            vec![vec![0.5, 0.5, 0.0], vec![0.5, 0.5, 0.0]],
        )
        .unwrap();
        let mut tagger = model.tagger();
        tagger.set_seq(&[0, 2, 1]).unwrap();
        assert_eq!(tagger.lognorm(), f64::NEG_INFINITY);
        assert_eq!(tagger.marginal_point(0, 0), 0.0);
        assert_eq!(tagger.marginal_path(&[0, 0, 0], 0, 3), 0.0);
    }
}
