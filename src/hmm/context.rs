#![allow(non_snake_case)]

use bitflags::bitflags;

bitflags! {
    /// Functionality a context allocates work space for.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct CtxOpt: u32 {
        const VITERBI = 0x01;
        const MARGINALS = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ResetOpt: u32 {
        const STATE = 0x01;
        const TRANS = 0x02;
    }
}

/// Work space for one observation sequence at a time (the trellis).
///
/// Scores are kept twice: in the logarithm domain for Viterbi decoding and
/// path scoring, and exponentiated for the scaled forward-backward pass.
#[derive(Debug, Default)]
pub(crate) struct HmmContext {
    /// Flag specifying the functionality.
    flag: CtxOpt,
    /**
     * The total number of distinct labels (L).
     */
    pub num_labels: usize,

    /**
     * The number of items (T) in the sequence.
     */
    num_items: usize,

    /**
     * The number of items the buffers can hold.
     */
    cap_items: usize,

    /**
     * Logarithm of the probability of the observation sequence.
     *  Negative infinity if no state path can produce the sequence.
     */
    log_norm: f64,

    /**
     * State scores.
     *  This is a [T][L] matrix whose element [t][l] is the log emission
     *  probability of the symbol observed at #t from label #l. Row 0 also
     *  includes the log initial probability of #l.
     */
    pub state: Vec<f64>,

    /**
     * Transition scores.
     *  This is a [L][L] matrix whose element [i][j] is the log probability
     *  of moving from label #i to label #j.
     */
    pub trans: Vec<f64>,

    /**
     * Best path scores (delta).
     *  This is a [T][L] matrix whose element [t][j] is the log probability
     *  of the best path arriving at (t, j).
     *  This member is available only with the VITERBI flag.
     */
    delta: Vec<f64>,

    /**
     * Backward edges (psi).
     *  This is a [T][L] matrix whose element [t][j] represents the label #i
     *  that yields the maximum score to arrive at (t, j).
     *  This member is available only with the VITERBI flag.
     */
    backward_edge: Vec<usize>,

    /**
     * Alpha score matrix (scaled forward probabilities).
     *  This is a [T][L] matrix whose element [t][l] presents the total
     *  probability of paths starting at BOS and arriving at (t, l).
     *  This member is available only with the MARGINALS flag.
     */
    alpha_score: Vec<f64>,

    /**
     * Beta score matrix (scaled backward probabilities).
     *  This is a [T][L] matrix whose element [t][l] presents the total
     *  probability of paths starting at (t, l) and arriving at EOS.
     *  This member is available only with the MARGINALS flag.
     */
    beta_score: Vec<f64>,

    /**
     * Scale factor vector.
     *  This is a [T] vector whose element [t] presents the scaling
     *  coefficient for the alpha_score and beta_score.
     */
    scale_factor: Vec<f64>,

    /// Row vector (work space), [L].
    row: Vec<f64>,

    /// Exponents of state scores, [T][L]. MARGINALS only.
    exp_state: Vec<f64>,

    /// Exponents of transition scores, [L][L]. MARGINALS only.
    exp_trans: Vec<f64>,

    /**
     * Model expectations of states.
     *  This is a [T][L] matrix whose element [t][l] presents the marginal
     *  probability of the state (t, l).
     *  This member is available only with the MARGINALS flag.
     */
    pub mexp_state: Vec<f64>,
}

impl HmmContext {
    pub fn new(flag: CtxOpt, L: usize, T: usize) -> Self {
        let mut this = Self {
            flag,
            trans: vec![0.0; L * L],
            num_labels: L,
            row: vec![0.0; L],
            ..Default::default()
        };
        if this.flag.contains(CtxOpt::MARGINALS) {
            this.exp_trans.resize(L * L, 0.0);
        }
        this.set_num_items(T);
        this.num_items = 0;
        this
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn set_num_items(&mut self, T: usize) {
        let L = self.num_labels;
        self.num_items = T;
        if self.cap_items < T {
            self.state.resize(T * L, 0.0);
            if self.flag.contains(CtxOpt::VITERBI) {
                self.delta.resize(T * L, 0.0);
                self.backward_edge.resize(T * L, 0);
            }
            if self.flag.contains(CtxOpt::MARGINALS) {
                self.alpha_score.resize(T * L, 0.0);
                self.beta_score.resize(T * L, 0.0);
                self.scale_factor.resize(T, 0.0);
                self.exp_state.resize(T * L, 0.0);
                self.mexp_state.resize(T * L, 0.0);
            }
            self.cap_items = T;
        }
    }

    pub fn reset(&mut self, opts: ResetOpt) {
        let T = self.num_items;
        let L = self.num_labels;

        if opts.contains(ResetOpt::STATE) {
            self.state[..T * L].fill(0.0);
        }
        if opts.contains(ResetOpt::TRANS) {
            self.trans.fill(0.0);
        }
        if self.flag.contains(CtxOpt::MARGINALS) {
            self.mexp_state[..T * L].fill(0.0);
        }
        self.log_norm = 0.0;
    }

    pub fn exp_transition(&mut self) {
        for (e, s) in self.exp_trans.iter_mut().zip(&self.trans) {
            *e = s.exp();
        }
    }

    pub fn exp_state(&mut self) {
        let n = self.num_items * self.num_labels;
        for (e, s) in self.exp_state[..n].iter_mut().zip(&self.state[..n]) {
            *e = s.exp();
        }
    }

    /// Fills `labels` with the most likely label path and returns its log
    /// probability. Ties go to the smallest label index, at every step.
    pub fn viterbi(&mut self, labels: &mut [usize]) -> f64 {
        let T = self.num_items;
        let L = self.num_labels;
        debug_assert!(T > 0 && labels.len() >= T);

        /* Compute the scores at (0, *). */
        self.delta[..L].copy_from_slice(&self.state[..L]);

        /* Compute the scores at (t, *). */
        for t in 1..T {
            for j in 0..L {
                /* Transit from (t-1, i) to (t, j); keep the first maximum. */
                let mut max_score = f64::NEG_INFINITY;
                let mut argmax_score = 0;
                for i in 0..L {
                    let score = self.delta[L * (t - 1) + i] + self.trans[L * i + j];
                    if max_score < score {
                        max_score = score;
                        argmax_score = i;
                    }
                }
                /* Backward link (#t, #j) -> (#t-1, #i). */
                self.backward_edge[L * t + j] = argmax_score;
                self.delta[L * t + j] = max_score + self.state[L * t + j];
            }
        }

        /* Find the node (#T-1, #i) that reaches EOS with the maximum score.
        When every score is -inf, label #0 is kept. */
        let mut max_score = f64::NEG_INFINITY;
        labels[T - 1] = 0;
        for i in 0..L {
            let score = self.delta[L * (T - 1) + i];
            if max_score < score {
                max_score = score;
                labels[T - 1] = i;
            }
        }

        /* Tag labels by tracing the backward links. */
        for t in (0..T - 1).rev() {
            let i = labels[t + 1];
            labels[t] = self.backward_edge[L * (t + 1) + i];
        }

        max_score
    }

    pub fn lognorm(&self) -> f64 {
        self.log_norm
    }

    pub fn alpha_score(&mut self) {
        let L = self.num_labels;
        let T = self.num_items;
        let mut impossible = false;

        /* alpha[0][j] = state[0][j] */
        self.alpha_score[..L].copy_from_slice(&self.exp_state[..L]);
        impossible |= self.normalize_alpha(0);

        /* alpha[t][j] = state[t][j] * \sum_{i} alpha[t-1][i] * trans[i][j] */
        for t in 1..T {
            self.alpha_score[L * t..L * (t + 1)].fill(0.0);
            for i in 0..L {
                let a = self.alpha_score[L * (t - 1) + i];
                if a == 0.0 {
                    continue;
                }
                for j in 0..L {
                    self.alpha_score[L * t + j] += a * self.exp_trans[L * i + j];
                }
            }
            for j in 0..L {
                self.alpha_score[L * t + j] *= self.exp_state[L * t + j];
            }
            impossible |= self.normalize_alpha(t);
        }

        /* norm = 1. / (C[0] * C[1] ... * C[T-1])
        log(norm) = - \sum_{t = 0}^{T-1} log(C[t]). */
        self.log_norm = if impossible {
            f64::NEG_INFINITY
        } else {
            -self.scale_factor[..T].iter().map(|c| c.ln()).sum::<f64>()
        };
    }

    /// Scales alpha[t] to sum to one. Returns true when alpha[t] is all zero.
    fn normalize_alpha(&mut self, t: usize) -> bool {
        let L = self.num_labels;
        let row = &mut self.alpha_score[L * t..L * (t + 1)];
        let sum: f64 = row.iter().sum();
        self.scale_factor[t] = if sum != 0.0 { 1.0 / sum } else { 1.0 };
        for a in row.iter_mut() {
            *a *= self.scale_factor[t];
        }
        sum == 0.0
    }

    pub fn beta_score(&mut self) {
        let T = self.num_items;
        let L = self.num_labels;

        /* Compute the beta scores at (T-1, *). */
        self.beta_score[L * (T - 1)..L * T].fill(self.scale_factor[T - 1]);

        /* Compute the beta scores at (t, *). */
        for t in (0..T - 1).rev() {
            /* row[j] = state[t+1][j] * beta[t+1][j] */
            for j in 0..L {
                self.row[j] = self.beta_score[L * (t + 1) + j] * self.exp_state[L * (t + 1) + j];
            }
            for i in 0..L {
                let s: f64 = (0..L).map(|j| self.exp_trans[L * i + j] * self.row[j]).sum();
                self.beta_score[L * t + i] = s * self.scale_factor[t];
            }
        }
    }

    /// Requires `alpha_score` and `beta_score` to be computed first.
    pub fn marginals(&mut self) {
        let L = self.num_labels;
        let T = self.num_items;

        if self.log_norm == f64::NEG_INFINITY {
            self.mexp_state[..T * L].fill(0.0);
            return;
        }

        /*
        p(t,i) = fwd[t][i] * bwd[t][i] / norm
               = (1. / C[t]) * fwd'[t][i] * bwd'[t][i]
        */
        for t in 0..T {
            let c = 1.0 / self.scale_factor[t];
            for i in 0..L {
                let k = L * t + i;
                self.mexp_state[k] = self.alpha_score[k] * self.beta_score[k] * c;
            }
        }
    }

    pub fn marginal_point(&self, l: usize, t: usize) -> f64 {
        self.mexp_state[self.num_labels * t + l]
    }

    /// Marginal probability of the labels `path[begin..end]` at positions
    /// `begin..end`. Requires `alpha_score` and `beta_score`.
    pub fn marginal_path(&self, path: &[usize], begin: usize, end: usize) -> f64 {
        let L = self.num_labels;
        if self.log_norm == f64::NEG_INFINITY {
            return 0.0;
        }

        /*
        Compute the marginal probability of a partial path.
            a : the alpha score of the first node.
            b : the beta score of the last node.
            s : the product of state scores on the path.
            e : the product of transition scores on the path.
            c : the product of the scaling factors.
        */
        let a = self.alpha_score[L * begin + path[begin]];
        let b = self.beta_score[L * (end - 1) + path[end - 1]];
        let mut prob = a * b;
        for t in begin + 1..end {
            let (i, j) = (path[t - 1], path[t]);
            prob *= self.exp_trans[L * i + j] * self.exp_state[L * t + j] * self.scale_factor[t];
        }
        prob / self.scale_factor[end - 1]
    }

    /// Log joint probability of `labels` and the loaded observations.
    pub fn score(&self, labels: &[usize]) -> f64 {
        let L = self.num_labels;
        let T = self.num_items;

        /* Stay at (0, labels[0]). */
        let mut i = labels[0];
        let mut r = self.state[i];

        /* Loop over the rest of items. */
        for t in 1..T {
            let j = labels[t];
            /* Transit from (t-1, i) to (t, j). */
            r += self.trans[L * i + j];
            r += self.state[L * t + j];
            i = j;
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state_context(state: &[f64], T: usize) -> HmmContext {
        let mut ctx = HmmContext::new(CtxOpt::VITERBI | CtxOpt::MARGINALS, 2, T);
        ctx.set_num_items(T);
        ctx.reset(ResetOpt::STATE | ResetOpt::TRANS);
        ctx.trans.copy_from_slice(&[0.7f64.ln(), 0.3f64.ln(), 0.4f64.ln(), 0.6f64.ln()]);
        ctx.state[..state.len()].copy_from_slice(state);
        ctx.exp_transition();
        ctx.exp_state();
        ctx
    }

    #[test]
    fn init() {
        let ctx = HmmContext::new(CtxOpt::VITERBI | CtxOpt::MARGINALS, 3, 12);
        assert_eq!(ctx.num_items, 0);
        assert_eq!(ctx.cap_items, 12);
        assert_eq!(ctx.delta.len(), 36);
        assert_eq!(ctx.exp_trans.len(), 9);
    }

    #[test]
    fn viterbi_only_context_skips_marginal_buffers() {
        let ctx = HmmContext::new(CtxOpt::VITERBI, 3, 4);
        assert!(ctx.exp_state.is_empty());
        assert!(ctx.mexp_state.is_empty());
        assert!(ctx.alpha_score.is_empty());
        assert!(ctx.beta_score.is_empty());
        assert!(ctx.scale_factor.is_empty());
        assert_eq!(ctx.backward_edge.len(), 12);
    }

    #[test]
    fn buffers_grow_but_never_shrink() {
        let mut ctx = HmmContext::new(CtxOpt::VITERBI, 2, 2);
        ctx.set_num_items(5);
        assert_eq!(ctx.cap_items, 5);
        ctx.set_num_items(3);
        assert_eq!(ctx.cap_items, 5);
        assert_eq!(ctx.num_items(), 3);
        assert_eq!(ctx.state.len(), 10);
        assert!(ctx.alpha_score.is_empty());
    }

    #[test]
    fn forward_mass_matches_viterbi_bound() {
        let state = [
            (0.5f64 * 0.9).ln(),
            (0.5f64 * 0.2).ln(),
            0.1f64.ln(),
            0.8f64.ln(),
        ];
        let mut ctx = two_state_context(&state, 2);
        let mut labels = [0; 2];
        let best = ctx.viterbi(&mut labels);
        ctx.alpha_score();
        ctx.beta_score();
        ctx.marginals();
        assert!(best <= ctx.lognorm());
        for t in 0..2 {
            let sum = ctx.marginal_point(0, t) + ctx.marginal_point(1, t);
            assert!((sum - 1.0).abs() < 1e-12, "t={t}: {sum}");
        }
        assert!((ctx.score(&labels) - best).abs() < 1e-12);
    }

    #[test]
    fn reset_clears_log_norm() {
        let state = [0.2f64.ln(), 0.3f64.ln()];
        let mut ctx = two_state_context(&state, 1);
        ctx.alpha_score();
        assert!((ctx.lognorm() - 0.5f64.ln()).abs() < 1e-12);
        ctx.reset(ResetOpt::STATE);
        assert_eq!(ctx.lognorm(), 0.0);
        assert_eq!(ctx.state[0], 0.0);
    }
}
