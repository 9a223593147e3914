//! Window-weighted emission of a context profile.
//! Column `j` of the window is weighted by `center * decay^|j - c|`.
//! Near either end of a subject only the in-bounds part of the window contributes.
use crate::error::{Error, Result};
use crate::profile::ContextProfile;
use crate::subject::{CountProfile, Sequence, Subject};

#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    num_cols: usize,
    center: usize,
    weights: Vec<f64>,
}

impl Emission {
    pub fn new(num_cols: usize, weight_center: f64, weight_decay: f64) -> Result<Self> {
        if num_cols % 2 == 0 {
            return Err(Error::EvenWindowLength(num_cols));
        }
        if !(weight_center.is_finite() && 0f64 < weight_center) {
            return Err(Error::Config(format!(
                "weight_center should be positive, got {}",
                weight_center
            )));
        }
        if !(0f64..=1f64).contains(&weight_decay) {
            return Err(Error::Config(format!(
                "weight_decay should be in [0,1], got {}",
                weight_decay
            )));
        }
        let center = (num_cols - 1) / 2;
        let weights = (0..num_cols)
            .map(|j| {
                let dist = (j as isize - center as isize).abs() as i32;
                weight_center * weight_decay.powi(dist)
            })
            .collect();
        Ok(Self {
            num_cols,
            center,
            weights,
        })
    }
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }
    pub fn center(&self) -> usize {
        self.center
    }
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
    pub fn sum_weights(&self) -> f64 {
        self.weights.iter().sum()
    }
    // Range of window columns `j` such that `index + j - center` is inside `0..len`.
    fn window(&self, len: usize, index: usize) -> std::ops::Range<usize> {
        let begin = self.center.saturating_sub(index);
        let end = (self.center + len - index).min(self.num_cols);
        begin..end
    }
    /// Log2 emission of `profile` (in log space) at `index` of `subject`.
    pub fn log_emission(&self, profile: &ContextProfile, subject: &Subject, index: usize) -> f64 {
        match subject {
            Subject::Sequence(seq) => self.log_emission_sequence(profile, seq, index),
            Subject::CountProfile(prof) => self.log_emission_counts(profile, prof, index),
        }
    }
    pub fn log_emission_sequence(
        &self,
        profile: &ContextProfile,
        seq: &Sequence,
        index: usize,
    ) -> f64 {
        assert_eq!(profile.num_cols(), self.num_cols);
        assert!(profile.is_logspace());
        assert!(index < seq.len());
        let size = profile.alphabet_size();
        let codes = seq.codes();
        self.window(seq.len(), index)
            .filter(|&j| 0f64 < self.weights[j])
            .filter_map(|j| {
                let code = codes[index + j - self.center] as usize;
                (code < size).then(|| self.weights[j] * profile.column(j)[code])
            })
            .sum()
    }
    pub fn log_emission_counts(
        &self,
        profile: &ContextProfile,
        counts: &CountProfile,
        index: usize,
    ) -> f64 {
        assert_eq!(profile.num_cols(), self.num_cols);
        assert_eq!(profile.alphabet_size(), counts.alphabet_size());
        assert!(profile.is_logspace());
        assert!(index < counts.len());
        self.window(counts.len(), index)
            .filter(|&j| 0f64 < self.weights[j])
            .map(|j| {
                let dot: f64 = counts
                    .column(index + j - self.center)
                    .iter()
                    .zip(profile.column(j))
                    .filter(|(&c, _)| 0f64 < c)
                    .map(|(c, p)| c * p)
                    .sum();
                self.weights[j] * dot
            })
            .sum()
    }
}
