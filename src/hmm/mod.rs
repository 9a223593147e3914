//! Context hidden Markov model.
//! Each state emits a context window through its profile, and states are connected
//! by a sparse graph of weighted transitions.
//! The in-transitions of a state mirror the out-transitions pointing to it.
//! They are only changed through `set_transition`, `remove_transition`, and `set_out_transitions`,
//! so the two tables can not drift apart.
use crate::alphabet::Alphabet;
use crate::error::{Error, Result};
use crate::profile::ContextProfile;
use std::collections::BTreeMap;
pub mod initializer;
pub use initializer::{
    HomogeneousTransitionInitializer, SamplingStateInitializer, StateInitializer,
    TransitionInitializer,
};

// Tolerance to check whether weights sum up to one.
const TOLERANCE: f64 = 0.0001;

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    index: usize,
    prior: f64,
    // Log space.
    profile: ContextProfile,
    out_transitions: BTreeMap<usize, f64>,
    in_transitions: BTreeMap<usize, f64>,
}

impl State {
    pub fn index(&self) -> usize {
        self.index
    }
    pub fn prior(&self) -> f64 {
        self.prior
    }
    pub fn profile(&self) -> &ContextProfile {
        &self.profile
    }
    pub fn out_transitions(&self) -> &BTreeMap<usize, f64> {
        &self.out_transitions
    }
    pub fn in_transitions(&self) -> &BTreeMap<usize, f64> {
        &self.in_transitions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hmm {
    alphabet: Alphabet,
    num_cols: usize,
    states: Vec<State>,
    // Number of training iterations this model went through.
    iterations: usize,
}

impl Hmm {
    /// Create a model without any transitions.
    /// `profiles` may be either in linear space or in log space.
    pub fn new(alphabet: Alphabet, profiles: Vec<ContextProfile>, priors: Vec<f64>) -> Result<Self> {
        let num_cols = match profiles.first() {
            Some(prof) => prof.num_cols(),
            None => return Err(Error::Config("the model needs at least one state".to_string())),
        };
        if num_cols % 2 == 0 {
            return Err(Error::EvenWindowLength(num_cols));
        }
        if profiles.len() != priors.len() {
            return Err(Error::Dimension(format!(
                "{} profiles but {} priors",
                profiles.len(),
                priors.len()
            )));
        }
        for (k, prof) in profiles.iter().enumerate() {
            if prof.num_cols() != num_cols || prof.alphabet_size() != alphabet.size() {
                return Err(Error::Dimension(format!(
                    "profile of state {} is {}x{}, expected {}x{}",
                    k,
                    prof.num_cols(),
                    prof.alphabet_size(),
                    num_cols,
                    alphabet.size()
                )));
            }
        }
        if priors.iter().any(|x| !(x.is_finite() && 0f64 <= *x)) {
            return Err(Error::Config(format!("invalid priors:{:?}", priors)));
        }
        if (priors.iter().sum::<f64>() - 1f64).abs() > TOLERANCE {
            return Err(Error::Config("priors should sum up to one".to_string()));
        }
        let states = profiles
            .into_iter()
            .zip(priors)
            .enumerate()
            .map(|(index, (mut profile, prior))| {
                profile.transform_to_logspace();
                State {
                    index,
                    prior,
                    profile,
                    out_transitions: BTreeMap::new(),
                    in_transitions: BTreeMap::new(),
                }
            })
            .collect();
        Ok(Self {
            alphabet,
            num_cols,
            states,
            iterations: 0,
        })
    }
    /// Create a model with `num_states` states of window length `num_cols`.
    /// Priors start uniform.
    pub fn with_initializers<S: StateInitializer, T: TransitionInitializer>(
        alphabet: Alphabet,
        num_states: usize,
        num_cols: usize,
        state_init: &mut S,
        transition_init: &T,
    ) -> Result<Self> {
        if num_states == 0 {
            return Err(Error::Config("number of states should be positive".to_string()));
        }
        if num_cols % 2 == 0 {
            return Err(Error::EvenWindowLength(num_cols));
        }
        let profiles = state_init.init(num_states, num_cols, &alphabet)?;
        let priors = vec![1f64 / num_states as f64; num_states];
        let mut hmm = Self::new(alphabet, profiles, priors)?;
        transition_init.init(&mut hmm);
        hmm.normalize_transitions()?;
        Ok(hmm)
    }
    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }
    pub fn num_states(&self) -> usize {
        self.states.len()
    }
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }
    pub fn center(&self) -> usize {
        (self.num_cols - 1) / 2
    }
    pub fn states(&self) -> &[State] {
        &self.states
    }
    pub fn state(&self, k: usize) -> &State {
        &self.states[k]
    }
    pub fn iterations(&self) -> usize {
        self.iterations
    }
    pub fn increment_iterations(&mut self) {
        self.iterations += 1;
    }
    pub fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations;
    }
    pub fn priors(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.prior).collect()
    }
    pub fn set_prior(&mut self, k: usize, prior: f64) {
        self.states[k].prior = prior;
    }
    /// Replace the profile of state `k`. The profile is stored in log space.
    pub fn set_profile(&mut self, k: usize, mut profile: ContextProfile) {
        assert_eq!(profile.num_cols(), self.num_cols);
        assert_eq!(profile.alphabet_size(), self.alphabet.size());
        profile.transform_to_logspace();
        self.states[k].profile = profile;
    }
    pub fn out_transitions(&self, k: usize) -> &BTreeMap<usize, f64> {
        &self.states[k].out_transitions
    }
    pub fn in_transitions(&self, k: usize) -> &BTreeMap<usize, f64> {
        &self.states[k].in_transitions
    }
    pub fn transition(&self, from: usize, to: usize) -> Option<f64> {
        self.states[from].out_transitions.get(&to).copied()
    }
    /// Add or overwrite the transition `from -> to` in both tables.
    pub fn set_transition(&mut self, from: usize, to: usize, weight: f64) {
        assert!(from < self.states.len() && to < self.states.len());
        self.states[from].out_transitions.insert(to, weight);
        self.states[to].in_transitions.insert(from, weight);
    }
    pub fn remove_transition(&mut self, from: usize, to: usize) -> Option<f64> {
        let removed = self.states[from].out_transitions.remove(&to);
        if removed.is_some() {
            self.states[to].in_transitions.remove(&from);
        }
        removed
    }
    /// Replace every out-transition of `from` by `transitions`.
    pub fn set_out_transitions(&mut self, from: usize, transitions: &BTreeMap<usize, f64>) {
        let old: Vec<_> = self.states[from].out_transitions.keys().copied().collect();
        for to in old {
            self.remove_transition(from, to);
        }
        for (&to, &weight) in transitions.iter() {
            self.set_transition(from, to, weight);
        }
    }
    pub fn clear_transitions(&mut self) {
        for state in self.states.iter_mut() {
            state.out_transitions.clear();
            state.in_transitions.clear();
        }
    }
    pub fn num_transitions(&self) -> usize {
        self.states.iter().map(|s| s.out_transitions.len()).sum()
    }
    /// Average out-degree.
    pub fn connectivity(&self) -> f64 {
        self.num_transitions() as f64 / self.num_states() as f64
    }
    /// Scale the out-transitions of each state to sum up to one.
    pub fn normalize_transitions(&mut self) -> Result<()> {
        for k in 0..self.num_states() {
            let sum: f64 = self.states[k].out_transitions.values().sum();
            if !(0f64 < sum && sum.is_finite()) {
                return Err(Error::EmptyTransitions { state: k });
            }
            let normed: BTreeMap<_, _> = self.states[k]
                .out_transitions
                .iter()
                .map(|(&to, w)| (to, w / sum))
                .collect();
            self.set_out_transitions(k, &normed);
        }
        Ok(())
    }
    /// Check that every out-transition has an identical in-transition and vice versa.
    pub fn check_consistency(&self) -> Result<()> {
        for (from, state) in self.states.iter().enumerate() {
            for (&to, w) in state.out_transitions.iter() {
                match self.states.get(to).and_then(|s| s.in_transitions.get(&from)) {
                    Some(v) if v == w => {}
                    _ => return Err(Error::AsymmetricTransitions { from, to }),
                }
            }
            for (&src, w) in state.in_transitions.iter() {
                match self.states.get(src).and_then(|s| s.out_transitions.get(&from)) {
                    Some(v) if v == w => {}
                    _ => return Err(Error::AsymmetricTransitions { from: src, to: from }),
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Hmm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "States:{}", self.num_states())?;
        writeln!(f, "Columns:{}", self.num_cols)?;
        writeln!(f, "Iterations:{}", self.iterations)?;
        writeln!(f, "Connectivity:{:.2}", self.connectivity())?;
        let priors: Vec<_> = self.states.iter().map(|s| format!("{:.3}", s.prior)).collect();
        writeln!(f, "Initial:{}", priors.join("\t"))?;
        for state in self.states.iter() {
            let trans: Vec<_> = state
                .out_transitions
                .iter()
                .map(|(to, w)| format!("{}:{:.3}", to, w))
                .collect();
            writeln!(f, "State {}\t{}", state.index, trans.join("\t"))?;
            write!(f, "{}", state.profile)?;
        }
        Ok(())
    }
}
