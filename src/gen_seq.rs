//! This module is to generate some random sequences to assess the training.
//! Usually, it would not be used in the real-applications.
use crate::alphabet::Alphabet;
use crate::error::{Error, Result};
use crate::hmm::Hmm;
use crate::subject::Sequence;
use rand::seq::SliceRandom;

/// Uniformly random sequence.
pub fn generate_seq<T: rand::Rng>(rng: &mut T, alphabet: &Alphabet, len: usize) -> Sequence {
    let codes: Vec<u8> = (0..alphabet.size() as u8).collect();
    let seq = (0..len).filter_map(|_| codes.choose(rng)).copied().collect();
    Sequence::from_codes("random", seq)
}

/// Sequence emitted by walking along `hmm`.
/// Each visited state emits a residue from the center column of its profile.
pub fn sample_sequence<T: rand::Rng>(rng: &mut T, hmm: &Hmm, len: usize) -> Result<Sequence> {
    let center = hmm.center();
    let states: Vec<usize> = (0..hmm.num_states()).collect();
    let codes: Vec<u8> = (0..hmm.alphabet().size() as u8).collect();
    let mut seq = Vec::with_capacity(len);
    let mut current = *states
        .choose_weighted(rng, |&k| hmm.state(k).prior())
        .map_err(|e| Error::Config(format!("cannot draw the first state:{}", e)))?;
    for i in 0..len {
        let column = hmm.state(current).profile().column(center);
        let code = codes
            .choose_weighted(rng, |&a| column[a as usize].exp2())
            .map_err(|e| Error::Config(format!("cannot emit from state {}:{}", current, e)))?;
        seq.push(*code);
        if i + 1 < len {
            let trans: Vec<_> = hmm.out_transitions(current).iter().collect();
            current = match trans.choose_weighted(rng, |x| *x.1) {
                Ok(&(&next, _)) => next,
                Err(_) => {
                    return Err(Error::DeadEndState {
                        state: current,
                        position: i,
                    })
                }
            };
        }
    }
    Ok(Sequence::from_codes("sampled", seq))
}
