//! Training context hidden Markov models by expectation-maximization.
//!
//! A context HMM has states emitting a window of residues through a context profile,
//! connected by a sparse transition graph. The models are trained on sequences or
//! count profiles by Baum-Welch with block-wise online updates, and then used to
//! compute context-specific pseudocounts.
//!
//! ```no_run
//! use csem::*;
//! use rand::SeedableRng;
//! let alphabet = Alphabet::amino_acid();
//! let subjects: Vec<Subject> = vec![];
//! let admixture = BackgroundAdmixture::uniform(alphabet.size());
//! let rng = rand_xoshiro::Xoshiro256StarStar::seed_from_u64(0);
//! let mut state_init = SamplingStateInitializer::new(&subjects, 0.1, 1.0, &admixture, rng);
//! let mut hmm = Hmm::with_initializers(
//!     alphabet,
//!     100,
//!     13,
//!     &mut state_init,
//!     &HomogeneousTransitionInitializer,
//! )
//! .unwrap();
//! let options = BaumWelchOptions::default();
//! let mut training = BaumWelchTraining::new(options, &mut hmm, &subjects, &admixture).unwrap();
//! training.train(&mut TableReporter::new(std::io::stdout())).unwrap();
//! ```
#[macro_use]
extern crate log;
pub mod alphabet;
pub mod baum_welch;
pub mod em;
pub mod emission;
pub mod error;
pub mod forward_backward;
pub mod gen_seq;
pub mod hmm;
pub mod persist;
pub mod profile;
pub mod pseudocounts;
pub mod subject;

pub use alphabet::Alphabet;
pub use baum_welch::{BaumWelchOptions, BaumWelchTraining};
pub use em::{
    EmOptions, EmState, EmStatus, LogReporter, Progress, ProgressReporter, Schedule,
    TableReporter, TrainingMode,
};
pub use emission::Emission;
pub use error::{Error, Result};
pub use forward_backward::{forward_backward, ForwardBackwardMatrices};
pub use hmm::{
    HomogeneousTransitionInitializer, Hmm, SamplingStateInitializer, StateInitializer,
    TransitionInitializer,
};
pub use persist::{read_hmm, write_hmm};
pub use profile::ContextProfile;
pub use pseudocounts::{Admixture, BackgroundAdmixture};
pub use subject::{CountProfile, Sequence, Subject};
