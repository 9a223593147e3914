//! Initial parameters of a fresh model.
use super::Hmm;
use crate::alphabet::Alphabet;
use crate::error::{Error, Result};
use crate::profile::ContextProfile;
use crate::pseudocounts::Admixture;
use crate::subject::Subject;
use rand::seq::SliceRandom;
use rand::Rng;

/// Produces one profile (in linear space) per state.
pub trait StateInitializer {
    fn init(
        &mut self,
        num_states: usize,
        num_cols: usize,
        alphabet: &Alphabet,
    ) -> Result<Vec<ContextProfile>>;
}

/// Sets up the transition graph of a model whose states are already in place.
/// The weights need not be normalized.
pub trait TransitionInitializer {
    fn init(&self, hmm: &mut Hmm);
}

/// Picks profiles from full context windows sampled out of the training subjects.
pub struct SamplingStateInitializer<'a, R: Rng> {
    subjects: &'a [Subject],
    // Fraction of windows of each subject to be sampled.
    sample_rate: f64,
    pseudocount: f64,
    admixture: &'a dyn Admixture,
    rng: R,
}

impl<'a, R: Rng> SamplingStateInitializer<'a, R> {
    pub fn new(
        subjects: &'a [Subject],
        sample_rate: f64,
        pseudocount: f64,
        admixture: &'a dyn Admixture,
        rng: R,
    ) -> Self {
        Self {
            subjects,
            sample_rate,
            pseudocount,
            admixture,
            rng,
        }
    }
    // The window of `subject` centered at `index` as a frequency profile.
    fn window(subject: &Subject, index: usize, num_cols: usize, size: usize) -> ContextProfile {
        let center = (num_cols - 1) / 2;
        let mut profile = ContextProfile::zeros(num_cols, size);
        for j in 0..num_cols {
            let column = profile.column_mut(j);
            match subject {
                Subject::Sequence(seq) => {
                    let code = seq.codes()[index + j - center] as usize;
                    if code < size {
                        column[code] = 1f64;
                    }
                }
                Subject::CountProfile(prof) => {
                    let counts = prof.column(index + j - center);
                    let sum: f64 = counts.iter().sum();
                    if 0f64 < sum {
                        column
                            .iter_mut()
                            .zip(counts.iter())
                            .for_each(|(x, c)| *x = c / sum);
                    }
                }
            }
        }
        profile
    }
}

impl<'a, R: Rng> StateInitializer for SamplingStateInitializer<'a, R> {
    fn init(
        &mut self,
        num_states: usize,
        num_cols: usize,
        alphabet: &Alphabet,
    ) -> Result<Vec<ContextProfile>> {
        if !(0f64 < self.sample_rate && self.sample_rate <= 1f64) {
            return Err(Error::Config(format!(
                "sample rate should be in (0,1], got {}",
                self.sample_rate
            )));
        }
        let size = alphabet.size();
        let center = (num_cols - 1) / 2;
        let mut sampled = vec![];
        for subject in self.subjects.iter() {
            if subject.len() < num_cols {
                continue;
            }
            for index in center..subject.len() - center {
                if !self.rng.gen_bool(self.sample_rate) {
                    continue;
                }
                let mut profile = Self::window(subject, index, num_cols, size);
                for j in 0..num_cols {
                    self.admixture.admix(profile.column_mut(j), self.pseudocount);
                }
                if profile.first_empty_column().is_none() {
                    profile.normalize();
                    sampled.push(profile);
                }
            }
        }
        debug!("Sampled {} windows for {} states", sampled.len(), num_states);
        if sampled.len() < num_states {
            return Err(Error::Config(format!(
                "only {} context windows sampled, but {} states requested",
                sampled.len(),
                num_states
            )));
        }
        sampled.shuffle(&mut self.rng);
        sampled.truncate(num_states);
        Ok(sampled)
    }
}

/// Connects every pair of states, including self loops, with the same weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomogeneousTransitionInitializer;

impl TransitionInitializer for HomogeneousTransitionInitializer {
    fn init(&self, hmm: &mut Hmm) {
        let num_states = hmm.num_states();
        let weight = 1f64 / num_states as f64;
        hmm.clear_transitions();
        for from in 0..num_states {
            for to in 0..num_states {
                hmm.set_transition(from, to, weight);
            }
        }
    }
}
