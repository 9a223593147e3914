//! JSON serialization of context HMMs.
//! Only out-transitions are written. In-transitions are rebuilt when a model is loaded.
use crate::alphabet::Alphabet;
use crate::error::{Error, Result};
use crate::hmm::Hmm;
use crate::profile::ContextProfile;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HmmRecord {
    alphabet: String,
    num_cols: usize,
    iterations: usize,
    states: Vec<StateRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateRecord {
    prior: f64,
    // Linear-space probabilities, one vector per column.
    profile: Vec<Vec<f64>>,
    transitions: Vec<(usize, f64)>,
}

impl std::convert::From<&Hmm> for HmmRecord {
    fn from(hmm: &Hmm) -> Self {
        let states = hmm
            .states()
            .iter()
            .map(|state| {
                let mut profile = state.profile().clone();
                profile.transform_to_linspace();
                StateRecord {
                    prior: state.prior(),
                    profile: profile.columns().map(|c| c.to_vec()).collect(),
                    transitions: state
                        .out_transitions()
                        .iter()
                        .map(|(&l, &w)| (l, w))
                        .collect(),
                }
            })
            .collect();
        Self {
            alphabet: String::from_utf8_lossy(hmm.alphabet().symbols()).to_string(),
            num_cols: hmm.num_cols(),
            iterations: hmm.iterations(),
            states,
        }
    }
}

impl std::convert::TryFrom<HmmRecord> for Hmm {
    type Error = Error;
    fn try_from(record: HmmRecord) -> Result<Self> {
        let alphabet = Alphabet::new(record.alphabet.as_bytes())?;
        let num_states = record.states.len();
        let mut profiles = Vec::with_capacity(num_states);
        let mut priors = Vec::with_capacity(num_states);
        for state in record.states.iter() {
            let profile = ContextProfile::from_columns(&state.profile)?;
            if profile.num_cols() != record.num_cols {
                return Err(Error::Dimension(format!(
                    "profile with {} columns in a model of {} columns",
                    profile.num_cols(),
                    record.num_cols
                )));
            }
            profiles.push(profile);
            priors.push(state.prior);
        }
        let mut hmm = Hmm::new(alphabet, profiles, priors)?;
        for (from, state) in record.states.iter().enumerate() {
            for &(to, weight) in state.transitions.iter() {
                if num_states <= to || !(weight.is_finite() && 0f64 <= weight) {
                    return Err(Error::Config(format!(
                        "invalid transition {}->{}:{}",
                        from, to, weight
                    )));
                }
                hmm.set_transition(from, to, weight);
            }
        }
        hmm.set_iterations(record.iterations);
        Ok(hmm)
    }
}

pub fn write_hmm<W: Write>(hmm: &Hmm, mut wtr: W) -> Result<()> {
    let record = HmmRecord::from(hmm);
    serde_json::to_writer(&mut wtr, &record)?;
    wtr.flush()?;
    Ok(())
}

pub fn read_hmm<R: Read>(rdr: R) -> Result<Hmm> {
    use std::convert::TryFrom;
    let record: HmmRecord = serde_json::from_reader(rdr)?;
    let hmm = Hmm::try_from(record)?;
    debug!(
        "Loaded {} states, {} transitions",
        hmm.num_states(),
        hmm.num_transitions()
    );
    Ok(hmm)
}
