//! Baum-Welch training of a context HMM.
//!
//! The expectation step runs forward-backward on each subject of a block and
//! accumulates the expected number of transitions, and the posterior-weighted
//! residue counts of each context window, into block statistics.
//! Subjects are processed in parallel, each thread keeping its own statistics,
//! which are summed up afterwards.
//! The maximization step re-estimates priors, profiles, and transitions from the
//! global statistics, adding pseudocounts and pruning weak transitions.
use crate::em::{self, EmOptions, EmState, ExpectationMaximization, ProgressReporter};
use crate::emission::Emission;
use crate::error::{Error, Result};
use crate::forward_backward::{forward_backward, ForwardBackwardMatrices};
use crate::hmm::Hmm;
use crate::profile::ContextProfile;
use crate::pseudocounts::Admixture;
use crate::subject::{CountProfile, Subject};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaumWelchOptions {
    pub em: EmOptions,
    /// Added to the expected count of every existing transition.
    pub transition_pseudocounts: f64,
    /// Weight of the pseudocount admixture into each profile column.
    pub state_pseudocounts: f64,
    /// Maximum number of out-transitions per state. Zero means unconstrained.
    pub max_connectivity: usize,
    /// Admixture of pseudocounts into the training profiles, in [0,1].
    pub data_pseudocounts: f64,
    pub weight_center: f64,
    pub weight_decay: f64,
}

impl std::default::Default for BaumWelchOptions {
    fn default() -> Self {
        Self {
            em: EmOptions::default(),
            transition_pseudocounts: 1f64,
            state_pseudocounts: 1f64,
            max_connectivity: 0,
            data_pseudocounts: 0.01,
            weight_center: 1.3,
            weight_decay: 0.9,
        }
    }
}

impl BaumWelchOptions {
    pub fn validate(&self) -> Result<()> {
        self.em.validate()?;
        let is_pseudocount = |x: f64| x.is_finite() && 0f64 <= x;
        if !is_pseudocount(self.transition_pseudocounts) {
            return Err(Error::Config(format!(
                "invalid transition pseudocounts:{}",
                self.transition_pseudocounts
            )));
        }
        if !is_pseudocount(self.state_pseudocounts) {
            return Err(Error::Config(format!(
                "invalid state pseudocounts:{}",
                self.state_pseudocounts
            )));
        }
        if !(0f64..=1f64).contains(&self.data_pseudocounts) {
            return Err(Error::Config(format!(
                "data pseudocounts should be in [0,1], got {}",
                self.data_pseudocounts
            )));
        }
        // Checks the window weights.
        Emission::new(1, self.weight_center, self.weight_decay).map(|_| ())
    }
}

/// Expected sufficient statistics of a context HMM.
#[derive(Debug, Clone, PartialEq)]
pub struct SufficientStatistics {
    /// `transitions[k][l]` is the expected number of `k -> l` transitions.
    pub transitions: Vec<BTreeMap<usize, f64>>,
    /// Posterior-weighted residue counts of each state, in linear space.
    pub profiles: Vec<ContextProfile>,
    /// Expected number of positions emitted by each state.
    pub priors: Vec<f64>,
}

impl SufficientStatistics {
    /// Zero statistics shaped after `hmm`, keyed by its current transitions.
    pub fn zeros(hmm: &Hmm) -> Self {
        let transitions = hmm
            .states()
            .iter()
            .map(|s| s.out_transitions().keys().map(|&l| (l, 0f64)).collect())
            .collect();
        let size = hmm.alphabet().size();
        let profiles = (0..hmm.num_states())
            .map(|_| ContextProfile::zeros(hmm.num_cols(), size))
            .collect();
        Self {
            transitions,
            profiles,
            priors: vec![0f64; hmm.num_states()],
        }
    }
    pub fn add(&mut self, other: &Self) {
        assert_eq!(self.priors.len(), other.priors.len());
        for (xs, ys) in self.transitions.iter_mut().zip(other.transitions.iter()) {
            for (&l, y) in ys.iter() {
                *xs.entry(l).or_default() += y;
            }
        }
        for (xs, ys) in self.profiles.iter_mut().zip(other.profiles.iter()) {
            for j in 0..xs.num_cols() {
                xs.column_mut(j)
                    .iter_mut()
                    .zip(ys.column(j))
                    .for_each(|(x, y)| *x += y);
            }
        }
        self.priors
            .iter_mut()
            .zip(other.priors.iter())
            .for_each(|(x, y)| *x += y);
    }
    pub fn merge(mut self, other: Self) -> Self {
        self.add(&other);
        self
    }
    /// self <- gamma * self + block
    pub fn decay_and_add(&mut self, block: &Self, gamma: f64) {
        self.scale(gamma);
        self.add(block);
    }
    pub fn scale(&mut self, gamma: f64) {
        for xs in self.transitions.iter_mut() {
            xs.values_mut().for_each(|x| *x *= gamma);
        }
        for prof in self.profiles.iter_mut() {
            for j in 0..prof.num_cols() {
                prof.column_mut(j).iter_mut().for_each(|x| *x *= gamma);
            }
        }
        self.priors.iter_mut().for_each(|x| *x *= gamma);
    }
    pub fn clear(&mut self) {
        self.scale(0f64);
    }
    /// Add the contribution of one subject, given its forward-backward matrices.
    pub fn add_subject(&mut self, hmm: &Hmm, subject: &Subject, fb: &ForwardBackwardMatrices) {
        let (len, states) = (fb.len(), hmm.num_states());
        assert_eq!(len, subject.len());
        for i in 0..len.saturating_sub(1) {
            for k in 0..states {
                let fk = fb.f[(i, k)];
                if fk == 0f64 {
                    continue;
                }
                let acc = &mut self.transitions[k];
                for (&l, &w) in hmm.out_transitions(k).iter() {
                    let post = fk * w * fb.e[(i + 1, l)] * fb.b[(i + 1, l)] / fb.s[i + 1];
                    *acc.entry(l).or_default() += post;
                }
            }
        }
        let (num_cols, center) = (hmm.num_cols(), hmm.center());
        let size = hmm.alphabet().size();
        for i in 0..len {
            let mut post = fb.posterior(i);
            let sum: f64 = post.iter().sum();
            if !(0f64 < sum) {
                continue;
            }
            post.iter_mut().for_each(|x| *x /= sum);
            let window = center.saturating_sub(i)..(center + len - i).min(num_cols);
            for (k, &p) in post.iter().enumerate().filter(|&(_, &p)| 0f64 < p) {
                self.priors[k] += p;
                let profile = &mut self.profiles[k];
                for j in window.clone() {
                    let h = i + j - center;
                    let column = profile.column_mut(j);
                    match subject {
                        Subject::Sequence(seq) => {
                            let code = seq.codes()[h] as usize;
                            if code < size {
                                column[code] += p;
                            }
                        }
                        Subject::CountProfile(prof) => column
                            .iter_mut()
                            .zip(prof.column(h))
                            .for_each(|(x, c)| *x += p * c),
                    }
                }
            }
        }
    }
}

/// Keep the `max_connectivity` heaviest transitions and renormalize them.
/// Ties are broken by the smaller target index.
pub fn prune_transitions(
    weights: &BTreeMap<usize, f64>,
    max_connectivity: usize,
) -> BTreeMap<usize, f64> {
    let mut sorted: Vec<_> = weights.iter().map(|(&l, &w)| (l, w)).collect();
    sorted.sort_by(|(l1, w1), (l2, w2)| {
        w2.partial_cmp(w1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(l1.cmp(l2))
    });
    sorted.truncate(max_connectivity);
    let sum: f64 = sorted.iter().map(|x| x.1).sum();
    sorted.into_iter().map(|(l, w)| (l, w / sum)).collect()
}

/// Turn `subjects` into count profiles smoothed by `admixture`.
/// Each column becomes `(1 - tau) * frequencies + tau * pseudocounts`, and then is scaled by its neff.
pub fn add_data_pseudocounts(
    subjects: &mut [Subject],
    alphabet_size: usize,
    admixture: &dyn Admixture,
    tau: f64,
) {
    for subject in subjects.iter_mut() {
        if let Subject::Sequence(seq) = subject {
            *subject = Subject::from(CountProfile::from_sequence(seq, alphabet_size));
        }
        if let Subject::CountProfile(prof) = subject {
            prof.admix(admixture, tau);
            prof.convert_to_counts();
        }
    }
    debug!("Added pseudocounts to {} subjects({})", subjects.len(), tau);
}

/// Baum-Welch training of `hmm` on `subjects`. The model is updated in place.
pub struct BaumWelchTraining<'a> {
    options: BaumWelchOptions,
    hmm: &'a mut Hmm,
    subjects: &'a [Subject],
    admixture: &'a dyn Admixture,
    emission: Emission,
    global: SufficientStatistics,
    block: SufficientStatistics,
    num_eff_cols: f64,
}

impl<'a> BaumWelchTraining<'a> {
    pub fn new(
        options: BaumWelchOptions,
        hmm: &'a mut Hmm,
        subjects: &'a [Subject],
        admixture: &'a dyn Admixture,
    ) -> Result<Self> {
        options.validate()?;
        hmm.check_consistency()?;
        let emission = Emission::new(hmm.num_cols(), options.weight_center, options.weight_decay)?;
        let size = hmm.alphabet().size();
        for subject in subjects.iter() {
            match subject {
                _ if subject.is_empty() => return Err(Error::EmptySubject),
                Subject::CountProfile(prof) if prof.alphabet_size() != size => {
                    return Err(Error::Dimension(format!(
                        "count profile over {} residues, but the model has {}",
                        prof.alphabet_size(),
                        size
                    )));
                }
                Subject::Sequence(seq) => {
                    let endgap = hmm.alphabet().endgap();
                    if let Some(&code) = seq.codes().iter().find(|&&c| endgap < c) {
                        return Err(Error::Dimension(format!(
                            "residue code {} in {}, but the model has {} residues",
                            code,
                            seq.header,
                            size
                        )));
                    }
                }
                _ => {}
            }
        }
        let global = SufficientStatistics::zeros(hmm);
        let block = global.clone();
        Ok(Self {
            options,
            hmm,
            subjects,
            admixture,
            emission,
            global,
            block,
            num_eff_cols: 0f64,
        })
    }
    pub fn hmm(&self) -> &Hmm {
        &*self.hmm
    }
    pub fn emission(&self) -> &Emission {
        &self.emission
    }
    pub fn num_eff_cols(&self) -> f64 {
        self.num_eff_cols
    }
    pub fn global_statistics(&self) -> &SufficientStatistics {
        &self.global
    }
    /// Run EM until convergence.
    pub fn train<P: ProgressReporter>(&mut self, reporter: &mut P) -> Result<EmState> {
        em::run(self, reporter)
    }
    // New transitions of state `k`, or an error if none survives.
    fn estimate_transitions(&self, k: usize) -> Result<BTreeMap<usize, f64>> {
        let acc = &self.global.transitions[k];
        let pseudocount = self.options.transition_pseudocounts;
        let weights: BTreeMap<_, _> = self
            .hmm
            .out_transitions(k)
            .keys()
            .map(|l| (*l, acc.get(l).copied().unwrap_or(0f64) + pseudocount))
            .filter(|&(_, w)| 0f64 < w)
            .collect();
        let weights = match self.options.max_connectivity {
            0 => weights,
            max => prune_transitions(&weights, max),
        };
        let sum: f64 = weights.values().sum();
        if !(0f64 < sum && sum.is_finite()) {
            return Err(Error::EmptyTransitions { state: k });
        }
        Ok(weights.into_iter().map(|(l, w)| (l, w / sum)).collect())
    }
    fn estimate_profile(&self, k: usize) -> Result<ContextProfile> {
        let mut profile = self.global.profiles[k].clone();
        for j in 0..profile.num_cols() {
            self.admixture
                .admix(profile.column_mut(j), self.options.state_pseudocounts);
        }
        if let Some(column) = profile.first_empty_column() {
            return Err(Error::DegenerateProfile { state: k, column });
        }
        profile.normalize();
        Ok(profile)
    }
    fn estimate_priors(&self) -> Result<Vec<f64>> {
        let sum: f64 = self.global.priors.iter().sum();
        if !(0f64 < sum && sum.is_finite()) {
            return Err(Error::DegeneratePriors);
        }
        Ok(self.global.priors.iter().map(|x| x / sum).collect())
    }
}

impl<'a> ExpectationMaximization for BaumWelchTraining<'a> {
    fn options(&self) -> &EmOptions {
        &self.options.em
    }
    fn num_subjects(&self) -> usize {
        self.subjects.len()
    }
    fn init(&mut self) -> Result<()> {
        self.global = SufficientStatistics::zeros(&*self.hmm);
        self.block = self.global.clone();
        let cols: f64 = self.subjects.iter().map(|s| s.effective_columns()).sum();
        self.num_eff_cols = self.emission.sum_weights() * cols;
        if !(0f64 < self.num_eff_cols) {
            return Err(Error::Config("training data has no columns".to_string()));
        }
        info!(
            "Training {} states with {} columns on {} subjects({:.1} effective columns)",
            self.hmm.num_states(),
            self.hmm.num_cols(),
            self.subjects.len(),
            self.num_eff_cols
        );
        Ok(())
    }
    fn expectation_step(&mut self, block: &[usize]) -> Result<f64> {
        let hmm: &Hmm = &*self.hmm;
        let (subjects, emission) = (self.subjects, &self.emission);
        let zeros = || (SufficientStatistics::zeros(hmm), 0f64);
        let (stats, lk) = block
            .par_iter()
            .map(|&i| &subjects[i])
            .try_fold(zeros, |(mut stats, lk), subject| {
                let fb = forward_backward(hmm, subject, emission)?;
                trace!("{}", fb);
                stats.add_subject(hmm, subject, &fb);
                Ok::<_, Error>((stats, lk + fb.log_likelihood))
            })
            .try_reduce(zeros, |(xs, x), (ys, y)| Ok((xs.merge(ys), x + y)))?;
        self.block.add(&stats);
        debug!(
            "E-step on {} subjects. LK:{:.4}",
            block.len(),
            lk / self.num_eff_cols
        );
        Ok(lk / self.num_eff_cols)
    }
    fn update_sufficient_statistics(&mut self, epsilon: f64) {
        self.global.decay_and_add(&self.block, 1f64 - epsilon);
        self.block.clear();
    }
    fn maximization_step(&mut self) -> Result<()> {
        let priors = self.estimate_priors()?;
        let profiles = (0..self.hmm.num_states())
            .map(|k| self.estimate_profile(k))
            .collect::<Result<Vec<_>>>()?;
        let transitions = (0..self.hmm.num_states())
            .map(|k| self.estimate_transitions(k))
            .collect::<Result<Vec<_>>>()?;
        let states = priors.into_iter().zip(profiles).zip(transitions);
        for (k, ((prior, profile), trans)) in states.enumerate() {
            self.hmm.set_prior(k, prior);
            self.hmm.set_profile(k, profile);
            self.hmm.set_out_transitions(k, &trans);
        }
        self.hmm.increment_iterations();
        debug!(
            "M-step {}. Connectivity:{:.2}",
            self.hmm.iterations(),
            self.hmm.connectivity()
        );
        Ok(())
    }
    fn has_converged(&self, state: &EmState) -> bool {
        let max_conn = self.options.max_connectivity;
        let sparse = max_conn == 0 || self.hmm.connectivity() <= max_conn as f64;
        self.options.em.has_converged(state) && sparse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::pseudocounts::BackgroundAdmixture;
    use crate::subject::{CountProfile, Sequence};
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_xoshiro::Xoroshiro128PlusPlus;
    fn two_state_model() -> Hmm {
        let alphabet = Alphabet::new(b"AB").unwrap();
        let profiles: Vec<_> = [[0.9, 0.1], [0.1, 0.9]]
            .iter()
            .map(|p| ContextProfile::from_columns(&[p.to_vec()]).unwrap())
            .collect();
        let mut hmm = Hmm::new(alphabet, profiles, vec![0.5, 0.5]).unwrap();
        hmm.set_transition(0, 0, 0.5);
        hmm.set_transition(0, 1, 0.5);
        hmm.set_transition(1, 0, 0.5);
        hmm.set_transition(1, 1, 0.5);
        hmm
    }
    fn options(pseudocounts: f64) -> BaumWelchOptions {
        BaumWelchOptions {
            transition_pseudocounts: pseudocounts,
            state_pseudocounts: pseudocounts,
            weight_center: 1f64,
            ..BaumWelchOptions::default()
        }
    }
    #[test]
    fn prune_test() {
        let weights: BTreeMap<_, _> = vec![(1, 0.6), (2, 0.3), (3, 0.1)].into_iter().collect();
        let pruned = prune_transitions(&weights, 1);
        assert_eq!(pruned.len(), 1);
        assert!((pruned[&1] - 1.).abs() < 0.00001);
        let pruned = prune_transitions(&weights, 2);
        assert!((pruned[&1] - 2. / 3.).abs() < 0.00001);
        assert!((pruned[&2] - 1. / 3.).abs() < 0.00001);
        let ties: BTreeMap<_, _> = vec![(4, 0.5), (2, 0.5)].into_iter().collect();
        let pruned = prune_transitions(&ties, 1);
        assert_eq!(pruned.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(prune_transitions(&weights, 5).len(), 3);
    }
    #[test]
    fn statistics_arithmetic() {
        let hmm = two_state_model();
        let mut xs = SufficientStatistics::zeros(&hmm);
        assert_eq!(xs.transitions[0].len(), 2);
        let mut ys = SufficientStatistics::zeros(&hmm);
        ys.priors = vec![1., 2.];
        ys.transitions[1].insert(0, 4.);
        ys.profiles[0].column_mut(0)[1] = 2.;
        xs.decay_and_add(&ys, 0.5);
        xs.decay_and_add(&ys, 0.5);
        assert!((xs.priors[1] - 3.).abs() < 0.00001);
        assert!((xs.transitions[1][&0] - 6.).abs() < 0.00001);
        assert!((xs.profiles[0].column(0)[1] - 3.).abs() < 0.00001);
        let zs = xs.clone().merge(ys);
        assert!((zs.priors[0] - 2.5).abs() < 0.00001);
        xs.clear();
        assert_eq!(xs, SufficientStatistics::zeros(&hmm));
    }
    #[test]
    fn transition_posteriors_sum_to_length() {
        let mut hmm = two_state_model();
        let subjects: Vec<Subject> = vec![Subject::from(Sequence::from_codes("", vec![0, 1, 0, 1, 1]))];
        let admixture = BackgroundAdmixture::uniform(2);
        let mut bw = BaumWelchTraining::new(options(1.), &mut hmm, &subjects, &admixture).unwrap();
        bw.init().unwrap();
        let lk = bw.expectation_step(&[0]).unwrap();
        assert!(lk < 0f64);
        let stats = &bw.block;
        let trans: f64 = stats.transitions.iter().flat_map(|x| x.values()).sum();
        assert!((trans - 4.).abs() < 0.00001, "{}", trans);
        let occupancy: f64 = stats.priors.iter().sum();
        assert!((occupancy - 5.).abs() < 0.00001, "{}", occupancy);
        let counts: f64 = stats.profiles.iter().flat_map(|p| p.column(0).to_vec()).sum();
        assert!((counts - 5.).abs() < 0.00001, "{}", counts);
    }
    #[test]
    fn window_statistics_are_clipped() {
        let alphabet = Alphabet::new(b"AB").unwrap();
        let prof = ContextProfile::from_columns(&[vec![0.5, 0.5], vec![0.5, 0.5], vec![0.5, 0.5]])
            .unwrap();
        let mut hmm = Hmm::new(alphabet, vec![prof], vec![1.]).unwrap();
        hmm.set_transition(0, 0, 1.);
        let subjects = vec![Subject::from(Sequence::from_codes("", vec![0, 1, 1]))];
        let admixture = BackgroundAdmixture::uniform(2);
        let mut bw = BaumWelchTraining::new(options(0.), &mut hmm, &subjects, &admixture).unwrap();
        bw.init().unwrap();
        assert!((bw.num_eff_cols() - 3. * (1. + 2. * 0.9)).abs() < 0.00001);
        bw.expectation_step(&[0]).unwrap();
        let prof = &bw.block.profiles[0];
        // Left column sees positions 0 and 1, the center all, the right column 1 and 2.
        assert_eq!(prof.column(0), &[1., 1.]);
        assert_eq!(prof.column(1), &[1., 2.]);
        assert_eq!(prof.column(2), &[0., 2.]);
    }
    #[test]
    fn maximization_is_idempotent() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(349);
        let mut hmm = two_state_model();
        let alphabet = hmm.alphabet().clone();
        let subjects: Vec<Subject> = (0..4)
            .map(|_| Subject::from(crate::gen_seq::generate_seq(&mut rng, &alphabet, 50)))
            .collect();
        let admixture = BackgroundAdmixture::uniform(2);
        let mut bw = BaumWelchTraining::new(options(0.), &mut hmm, &subjects, &admixture).unwrap();
        bw.init().unwrap();
        bw.expectation_step(&[0, 1, 2, 3]).unwrap();
        bw.update_sufficient_statistics(1.);
        bw.maximization_step().unwrap();
        let first = bw.hmm().clone();
        bw.maximization_step().unwrap();
        bw.update_sufficient_statistics(0.5);
        bw.maximization_step().unwrap();
        let second = bw.hmm();
        assert_eq!(first.iterations() + 2, second.iterations());
        for (x, y) in first.states().iter().zip(second.states()) {
            assert!((x.prior() - y.prior()).abs() < 0.00001);
            for (&l, w) in x.out_transitions() {
                let v = y.out_transitions()[&l];
                assert!((w - v).abs() < 0.00001, "{},{}", w, v);
            }
            for (c1, c2) in x.profile().columns().zip(y.profile().columns()) {
                for (a, b) in c1.iter().zip(c2.iter()) {
                    assert!((a - b).abs() < 0.00001, "{},{}", a, b);
                }
            }
        }
        assert!(second.check_consistency().is_ok());
    }
    #[test]
    fn transitions_are_normalized_and_pruned() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(9);
        let mut hmm = two_state_model();
        let alphabet = hmm.alphabet().clone();
        let subjects: Vec<Subject> = (0..3)
            .map(|_| Subject::from(crate::gen_seq::generate_seq(&mut rng, &alphabet, 40)))
            .collect();
        let admixture = BackgroundAdmixture::uniform(2);
        let mut opts = options(1.);
        opts.max_connectivity = 1;
        let mut bw = BaumWelchTraining::new(opts, &mut hmm, &subjects, &admixture).unwrap();
        bw.init().unwrap();
        bw.expectation_step(&[0, 1, 2]).unwrap();
        bw.update_sufficient_statistics(1.);
        bw.maximization_step().unwrap();
        for state in bw.hmm().states() {
            assert_eq!(state.out_transitions().len(), 1);
            let sum: f64 = state.out_transitions().values().sum();
            assert!((sum - 1.).abs() < 0.00001);
            let prof_sum: f64 = state.profile().column(0).iter().map(|x| x.exp2()).sum();
            assert!((prof_sum - 1.).abs() < 0.00001);
        }
        assert!(bw.hmm().check_consistency().is_ok());
        assert!((bw.hmm().connectivity() - 1.).abs() < 0.00001);
    }
    #[test]
    fn degenerate_statistics() {
        let mut hmm = two_state_model();
        let original = hmm.clone();
        let subjects = vec![Subject::from(Sequence::from_codes("", vec![0, 1]))];
        let admixture = BackgroundAdmixture::uniform(2);
        let mut bw = BaumWelchTraining::new(options(0.), &mut hmm, &subjects, &admixture).unwrap();
        bw.init().unwrap();
        assert!(matches!(bw.maximization_step(), Err(Error::DegeneratePriors)));
        bw.global.priors = vec![1., 1.];
        bw.global.profiles[0].column_mut(0)[0] = 1.;
        match bw.maximization_step() {
            Err(Error::DegenerateProfile { state, column }) => assert_eq!((state, column), (1, 0)),
            x => panic!("{:?}", x),
        }
        bw.global.profiles[1].column_mut(0)[0] = 1.;
        match bw.maximization_step() {
            Err(Error::EmptyTransitions { state }) => assert_eq!(state, 0),
            x => panic!("{:?}", x),
        }
        assert_eq!(bw.hmm(), &original);
    }
    #[test]
    fn invalid_inputs() {
        let mut hmm = two_state_model();
        let admixture = BackgroundAdmixture::uniform(2);
        let subjects = vec![Subject::from(Sequence::from_codes("", vec![]))];
        assert!(BaumWelchTraining::new(options(1.), &mut hmm, &subjects, &admixture).is_err());
        let prof = CountProfile::new(&[vec![1., 0., 0.]], vec![1.], false, 3).unwrap();
        let subjects = vec![Subject::from(prof)];
        assert!(BaumWelchTraining::new(options(1.), &mut hmm, &subjects, &admixture).is_err());
        let mut opts = options(1.);
        opts.weight_decay = 2.;
        let subjects = vec![Subject::from(Sequence::from_codes("", vec![0]))];
        assert!(BaumWelchTraining::new(opts, &mut hmm, &subjects, &admixture).is_err());
        let mut opts = options(1.);
        opts.data_pseudocounts = 1.5;
        assert!(BaumWelchTraining::new(opts, &mut hmm, &subjects, &admixture).is_err());
        // Codes beyond the end-gap of an AB alphabet come from another alphabet.
        let subjects = vec![Subject::from(Sequence::from_codes("", vec![0, 2, 4]))];
        assert!(BaumWelchTraining::new(options(1.), &mut hmm, &subjects, &admixture).is_ok());
        let subjects = vec![Subject::from(Sequence::from_codes("", vec![0, 7]))];
        match BaumWelchTraining::new(options(1.), &mut hmm, &subjects, &admixture) {
            Err(Error::Dimension(_)) => {}
            Err(x) => panic!("{:?}", x),
            Ok(_) => panic!(),
        }
    }
    #[test]
    fn options_round_trip() {
        let mut opts = options(0.5);
        opts.max_connectivity = 4;
        opts.em.mode = crate::em::TrainingMode::Batch;
        opts.em.schedule = crate::em::Schedule::Harmonic;
        let json = serde_json::to_string(&opts).unwrap();
        let loaded: BaumWelchOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, opts);
        let json = r#"{"max_connectivity":3,"em":{"num_blocks":4}}"#;
        let loaded: BaumWelchOptions = serde_json::from_str(json).unwrap();
        assert_eq!(loaded.max_connectivity, 3);
        assert_eq!(loaded.em.num_blocks, 4);
        assert_eq!(loaded.em.max_scans, EmOptions::default().max_scans);
        assert!((loaded.weight_center - 1.3).abs() < 0.00001);
    }
    #[test]
    fn data_pseudocounts_smooth_emissions() {
        let mut subjects = vec![Subject::from(Sequence::from_codes("", vec![0, 1]))];
        let admixture = BackgroundAdmixture::uniform(2);
        add_data_pseudocounts(&mut subjects, 2, &admixture, 0.2);
        let prof = match &subjects[0] {
            Subject::CountProfile(prof) => prof,
            x => panic!("{:?}", x),
        };
        assert!(prof.has_counts());
        assert!((prof.column(0)[0] - 0.9).abs() < 0.00001);
        assert!((prof.column(1)[1] - 0.9).abs() < 0.00001);
        let emission = Emission::new(1, 1., 0.9).unwrap();
        let mut profile = ContextProfile::from_columns(&[vec![0.25, 0.75]]).unwrap();
        profile.transform_to_logspace();
        let lk = emission.log_emission(&profile, &subjects[0], 0);
        let answer = 0.9 * 0.25f64.log2() + 0.1 * 0.75f64.log2();
        assert!((lk - answer).abs() < 0.00001, "{},{}", lk, answer);
    }
    #[test]
    fn counts_mode_statistics() {
        let alphabet = Alphabet::new(b"AB").unwrap();
        let prof = ContextProfile::from_columns(&[vec![0.5, 0.5]]).unwrap();
        let mut hmm = Hmm::new(alphabet, vec![prof], vec![1.]).unwrap();
        hmm.set_transition(0, 0, 1.);
        let columns = vec![vec![0.5, 0.5], vec![1., 0.]];
        let mut counts = CountProfile::new(&columns, vec![2., 4.], false, 2).unwrap();
        counts.convert_to_counts();
        let subjects = vec![Subject::from(counts)];
        let admixture = BackgroundAdmixture::uniform(2);
        let mut bw = BaumWelchTraining::new(options(1.), &mut hmm, &subjects, &admixture).unwrap();
        bw.init().unwrap();
        assert!((bw.num_eff_cols() - 6.).abs() < 0.00001);
        // Emissions are 2^-2 and 2^-4, so log2 L = -6 over six effective columns.
        let lk = bw.expectation_step(&[0]).unwrap();
        assert!((lk + 1.).abs() < 0.00001, "{}", lk);
        let stats = &bw.block;
        assert!((stats.priors[0] - 2.).abs() < 0.00001);
        assert!((stats.transitions[0][&0] - 1.).abs() < 0.00001);
        assert!((stats.profiles[0].column(0)[0] - 5.).abs() < 0.00001);
        assert!((stats.profiles[0].column(0)[1] - 1.).abs() < 0.00001);
    }
    #[test]
    fn zero_decay_training() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(21);
        let alphabet = Alphabet::new(b"AB").unwrap();
        let columns = vec![vec![1., 0.], vec![0.5, 0.5], vec![1., 0.]];
        let prof = ContextProfile::from_columns(&columns).unwrap();
        let mut hmm = Hmm::new(alphabet.clone(), vec![prof], vec![1.]).unwrap();
        hmm.set_transition(0, 0, 1.);
        let subjects: Vec<Subject> = (0..2)
            .map(|_| Subject::from(crate::gen_seq::generate_seq(&mut rng, &alphabet, 20)))
            .collect();
        let admixture = BackgroundAdmixture::uniform(2);
        let mut opts = options(0.);
        opts.weight_decay = 0.;
        let mut bw = BaumWelchTraining::new(opts, &mut hmm, &subjects, &admixture).unwrap();
        bw.init().unwrap();
        // The outer columns forbid B but carry no weight.
        let lk = bw.expectation_step(&[0, 1]).unwrap();
        assert!((lk + 1.).abs() < 0.00001, "{}", lk);
        bw.update_sufficient_statistics(1.);
        bw.maximization_step().unwrap();
        let lk = bw.expectation_step(&[0, 1]).unwrap();
        assert!(lk.is_finite() && lk < 0f64, "{}", lk);
    }
    #[test]
    fn recover_single_state() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(4324);
        let alphabet = Alphabet::dna();
        let dist = [0.1, 0.2, 0.3, 0.4];
        let codes: Vec<u8> = (0..20_000)
            .map(|_| *[0u8, 1, 2, 3].choose_weighted(&mut rng, |&a| dist[a as usize]).unwrap())
            .collect();
        let subjects = vec![Subject::from(Sequence::from_codes("", codes))];
        let prof = ContextProfile::from_columns(&[vec![0.25; 4]]).unwrap();
        let mut hmm = Hmm::new(alphabet, vec![prof], vec![1.]).unwrap();
        hmm.set_transition(0, 0, 1.);
        let admixture = BackgroundAdmixture::uniform(4);
        let mut bw = BaumWelchTraining::new(options(0.), &mut hmm, &subjects, &admixture).unwrap();
        bw.init().unwrap();
        bw.expectation_step(&[0]).unwrap();
        bw.update_sufficient_statistics(1.);
        bw.maximization_step().unwrap();
        let column = bw.hmm().state(0).profile().column(0);
        for (x, y) in column.iter().map(|x| x.exp2()).zip(dist.iter()) {
            assert!((x - y).abs() < 0.02, "{},{}", x, y);
        }
    }
    #[test]
    fn count_profiles_match_sequences() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(12);
        let alphabet = Alphabet::new(b"AB").unwrap();
        let seqs: Vec<_> = (0..3)
            .map(|_| crate::gen_seq::generate_seq(&mut rng, &alphabet, 30))
            .collect();
        let as_seqs: Vec<_> = seqs.iter().cloned().map(Subject::from).collect();
        let as_counts: Vec<_> = seqs
            .iter()
            .map(|s| Subject::from(CountProfile::from_sequence(s, 2)))
            .collect();
        let admixture = BackgroundAdmixture::uniform(2);
        let mut models = vec![];
        for subjects in [&as_seqs, &as_counts].iter() {
            let mut hmm = two_state_model();
            let mut bw = BaumWelchTraining::new(options(1.), &mut hmm, subjects, &admixture).unwrap();
            bw.init().unwrap();
            bw.expectation_step(&[0, 1, 2]).unwrap();
            bw.update_sufficient_statistics(1.);
            bw.maximization_step().unwrap();
            models.push(hmm);
        }
        for (x, y) in models[0].states().iter().zip(models[1].states()) {
            assert!((x.prior() - y.prior()).abs() < 0.00001);
            assert!((x.profile().column(0)[0] - y.profile().column(0)[0]).abs() < 0.00001);
        }
    }
    fn sampled_data(seed: u64) -> (Hmm, Vec<Subject>) {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(seed);
        let alphabet = Alphabet::dna();
        let profiles: Vec<_> = [[0.7, 0.1, 0.1, 0.1], [0.1, 0.1, 0.1, 0.7], [0.1, 0.4, 0.4, 0.1]]
            .iter()
            .map(|p| ContextProfile::from_columns(&[p.to_vec()]).unwrap())
            .collect();
        let mut truth = Hmm::new(alphabet, profiles, vec![0.4, 0.3, 0.3]).unwrap();
        for (from, to, w) in vec![(0, 0, 0.8), (0, 1, 0.2), (1, 1, 0.7), (1, 2, 0.3), (2, 0, 1.)] {
            truth.set_transition(from, to, w);
        }
        let subjects: Vec<_> = (0..30)
            .map(|_| Subject::from(crate::gen_seq::sample_sequence(&mut rng, &truth, 100).unwrap()))
            .collect();
        (truth, subjects)
    }
    fn initial_model(subjects: &[Subject], admixture: &BackgroundAdmixture) -> Hmm {
        use crate::hmm::{HomogeneousTransitionInitializer, SamplingStateInitializer};
        let rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(5);
        let mut state_init = SamplingStateInitializer::new(subjects, 0.5, 5., admixture, rng);
        Hmm::with_initializers(
            Alphabet::dna(),
            3,
            3,
            &mut state_init,
            &HomogeneousTransitionInitializer,
        )
        .unwrap()
    }
    #[test]
    fn batch_training_improves_likelihood() {
        let (_, subjects) = sampled_data(32);
        let admixture = BackgroundAdmixture::uniform(4);
        let mut hmm = initial_model(&subjects, &admixture);
        let mut opts = options(1.);
        opts.em.min_scans = 3;
        opts.em.max_scans = 30;
        opts.em.num_blocks = 1;
        opts.em.mode = crate::em::TrainingMode::Batch;
        let mut bw = BaumWelchTraining::new(opts, &mut hmm, &subjects, &admixture).unwrap();
        let mut reports: Vec<crate::em::Progress> = vec![];
        let state = bw.train(&mut reports).unwrap();
        assert_eq!(reports.len(), state.scan);
        assert_eq!(state.iterations, state.scan);
        let first = reports.first().unwrap().log_likelihood;
        let last = reports.last().unwrap().log_likelihood;
        assert!(first < last, "{},{}", first, last);
        assert!(reports.iter().all(|r| r.epsilon == 1.));
        assert!(hmm.check_consistency().is_ok());
        for state in hmm.states() {
            let sum: f64 = state.out_transitions().values().sum();
            assert!((sum - 1.).abs() < 0.00001);
        }
        let prior_sum: f64 = hmm.priors().iter().sum();
        assert!((prior_sum - 1.).abs() < 0.00001);
    }
    #[test]
    fn online_training_with_pruning() {
        let (_, subjects) = sampled_data(10);
        let admixture = BackgroundAdmixture::uniform(4);
        let mut hmm = initial_model(&subjects, &admixture);
        let mut opts = BaumWelchOptions::default();
        opts.em.min_scans = 2;
        opts.em.max_scans = 8;
        opts.em.num_blocks = 3;
        opts.max_connectivity = 2;
        let mut bw = BaumWelchTraining::new(opts, &mut hmm, &subjects, &admixture).unwrap();
        let mut reports: Vec<crate::em::Progress> = vec![];
        let state = bw.train(&mut reports).unwrap();
        assert!(state.scan <= 8);
        assert_eq!(state.iterations, 1 + 3 * (state.scan - 1));
        assert!(reports[1..].iter().all(|r| r.num_blocks == 3 && r.epsilon < 1.));
        assert!(hmm.connectivity() <= 2.);
        assert!(hmm.states().iter().all(|s| s.out_transitions().len() <= 2));
        assert!(hmm.check_consistency().is_ok());
        assert_eq!(hmm.iterations(), state.iterations);
    }
}
