//! Generalized expectation-maximization driver with block-wise online updates.
//!
//! A training run consists of scans over the whole data.
//! The first scan is a plain batch step: every subject is visited once, and the
//! accumulated statistics replace the global ones.
//! From the second scan on, subjects are shuffled and split into blocks.
//! After each block, the global statistics decay by `1 - epsilon` and the block
//! statistics are added to them. In online mode, the parameters are re-estimated
//! after every block. In batch mode, they are re-estimated once per scan.
use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

/// How the learning rate decays over scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    /// `epsilon_null * exp(-beta * (scan - 2))`
    Exponential,
    /// `epsilon_null / (1 + beta * (scan - 2))`
    Harmonic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingMode {
    /// Maximization step after each block.
    Online,
    /// Maximization step after each scan.
    Batch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmOptions {
    pub min_scans: usize,
    /// Inclusive upper bound on the number of scans.
    pub max_scans: usize,
    /// Convergence threshold on the change of the log-likelihood per effective column.
    pub log_likelihood_change: f64,
    /// Number of blocks per scan. Zero means `round(N^(3/8))` for N subjects.
    pub num_blocks: usize,
    /// Learning rate of the second scan.
    pub epsilon_null: f64,
    /// Decay parameter of the learning rate.
    pub beta: f64,
    pub schedule: Schedule,
    pub mode: TrainingMode,
    /// Seed to shuffle subjects into blocks.
    pub seed: u64,
}

impl std::default::Default for EmOptions {
    fn default() -> Self {
        Self {
            min_scans: 10,
            max_scans: 500,
            log_likelihood_change: 2e-4,
            num_blocks: 0,
            epsilon_null: 0.5,
            beta: 0.2,
            schedule: Schedule::Exponential,
            mode: TrainingMode::Online,
            seed: 0,
        }
    }
}

impl EmOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_scans == 0 {
            return Err(Error::Config("max_scans should be positive".to_string()));
        }
        if self.max_scans < self.min_scans {
            return Err(Error::Config(format!(
                "min_scans({}) exceeds max_scans({})",
                self.min_scans, self.max_scans
            )));
        }
        if !(0f64 < self.log_likelihood_change && self.log_likelihood_change.is_finite()) {
            return Err(Error::Config(format!(
                "log_likelihood_change should be positive, got {}",
                self.log_likelihood_change
            )));
        }
        if !(0f64 < self.epsilon_null && self.epsilon_null <= 1f64) {
            return Err(Error::Config(format!(
                "epsilon_null should be in (0,1], got {}",
                self.epsilon_null
            )));
        }
        if !(0f64 <= self.beta && self.beta.is_finite()) {
            return Err(Error::Config(format!(
                "beta should be non-negative, got {}",
                self.beta
            )));
        }
        Ok(())
    }
    /// Number of blocks for `num_subjects` subjects.
    pub fn blocks_for(&self, num_subjects: usize) -> usize {
        let blocks = match self.num_blocks {
            0 => (num_subjects as f64).powf(3f64 / 8f64).round() as usize,
            x => x,
        };
        blocks.max(1).min(num_subjects.max(1))
    }
    /// Learning rate of the `scan`-th scan (1-origin).
    pub fn epsilon(&self, scan: usize, num_blocks: usize) -> f64 {
        if scan <= 1 || num_blocks <= 1 {
            return 1f64;
        }
        let t = (scan - 2) as f64;
        match self.schedule {
            Schedule::Exponential => self.epsilon_null * (-self.beta * t).exp(),
            Schedule::Harmonic => self.epsilon_null / (1f64 + self.beta * t),
        }
    }
    /// True if the log-likelihood is settled after `min_scans`.
    pub fn has_converged(&self, state: &EmState) -> bool {
        self.min_scans <= state.scan
            && state
                .log_likelihood_change()
                .map(|d| d.abs() < self.log_likelihood_change)
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmStatus {
    NotStarted,
    Scanning,
    Converged,
    MaxScansReached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmState {
    pub status: EmStatus,
    /// Number of completed scans.
    pub scan: usize,
    /// Number of maximization steps.
    pub iterations: usize,
    pub num_blocks: usize,
    pub epsilon: f64,
    /// Log-likelihood per effective column of the last scan.
    pub log_likelihood: f64,
    pub log_likelihood_prev: Option<f64>,
}

impl EmState {
    fn new(num_blocks: usize) -> Self {
        Self {
            status: EmStatus::NotStarted,
            scan: 0,
            iterations: 0,
            num_blocks,
            epsilon: 1f64,
            log_likelihood: std::f64::NEG_INFINITY,
            log_likelihood_prev: None,
        }
    }
    pub fn log_likelihood_change(&self) -> Option<f64> {
        self.log_likelihood_prev
            .map(|prev| self.log_likelihood - prev)
    }
    pub fn progress(&self) -> Progress {
        Progress {
            scan: self.scan,
            iterations: self.iterations,
            num_blocks: if self.scan <= 1 { 1 } else { self.num_blocks },
            epsilon: self.epsilon,
            log_likelihood: self.log_likelihood,
            log_likelihood_change: self.log_likelihood_change(),
        }
    }
}

/// One row of the progress report, emitted after each scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub scan: usize,
    pub iterations: usize,
    pub num_blocks: usize,
    pub epsilon: f64,
    pub log_likelihood: f64,
    pub log_likelihood_change: Option<f64>,
}

pub trait ProgressReporter {
    fn header(&mut self) -> Result<()> {
        Ok(())
    }
    fn report(&mut self, progress: &Progress) -> Result<()>;
}

/// Report each scan through the `log` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&mut self, p: &Progress) -> Result<()> {
        let change = match p.log_likelihood_change {
            Some(d) => format!("{:+.5}", d),
            None => "-".to_string(),
        };
        info!(
            "Scan:{}\tItrs:{}\tBlks:{}\tEps:{:.4}\tLK:{:.5}\tDiff:{}",
            p.scan, p.iterations, p.num_blocks, p.epsilon, p.log_likelihood, change
        );
        Ok(())
    }
}

/// Fixed-width table written to any sink.
#[derive(Debug)]
pub struct TableReporter<W: std::io::Write> {
    wtr: W,
}

impl<W: std::io::Write> TableReporter<W> {
    pub fn new(wtr: W) -> Self {
        Self { wtr }
    }
    pub fn into_inner(self) -> W {
        self.wtr
    }
}

impl<W: std::io::Write> ProgressReporter for TableReporter<W> {
    fn header(&mut self) -> Result<()> {
        writeln!(
            self.wtr,
            "{:<4} {:>6} {:>4} {:>7} {:>10} {:>10}",
            "Scan", "Itrs", "Blks", "Epsilon", "log(L)", "+/-"
        )?;
        writeln!(self.wtr, "{}", "-".repeat(46))?;
        Ok(())
    }
    fn report(&mut self, p: &Progress) -> Result<()> {
        let change = match p.log_likelihood_change {
            Some(d) => format!("{:+10.5}", d),
            None => format!("{:>10}", ""),
        };
        writeln!(
            self.wtr,
            "{:<4} {:>6} {:>4} {:>7.4} {:>10.5} {}",
            p.scan, p.iterations, p.num_blocks, p.epsilon, p.log_likelihood, change
        )?;
        self.wtr.flush()?;
        Ok(())
    }
}

impl ProgressReporter for Vec<Progress> {
    fn report(&mut self, p: &Progress) -> Result<()> {
        self.push(p.clone());
        Ok(())
    }
}

/// Hooks of an EM specialization.
pub trait ExpectationMaximization {
    fn options(&self) -> &EmOptions;
    fn num_subjects(&self) -> usize;
    /// Allocate statistics. Called once before the first scan.
    fn init(&mut self) -> Result<()>;
    /// Accumulate the block statistics of the subjects in `block`
    /// and return their log-likelihood per effective column of the whole data.
    fn expectation_step(&mut self, block: &[usize]) -> Result<f64>;
    /// global <- (1 - epsilon) * global + block. Then clear the block statistics.
    fn update_sufficient_statistics(&mut self, epsilon: f64);
    /// Re-estimate the parameters from the global statistics.
    fn maximization_step(&mut self) -> Result<()>;
    /// True if the model has settled. A run stopping here is reported as converged.
    fn has_converged(&self, state: &EmState) -> bool {
        self.options().has_converged(state)
    }
    fn is_done(&self, state: &EmState) -> bool {
        self.options().max_scans <= state.scan || self.has_converged(state)
    }
}

// Split `indices` into `num_blocks` blocks of nearly equal sizes.
fn split_into_blocks(indices: &[usize], num_blocks: usize) -> Vec<&[usize]> {
    let len = indices.len();
    (0..num_blocks)
        .map(|b| &indices[b * len / num_blocks..(b + 1) * len / num_blocks])
        .filter(|block| !block.is_empty())
        .collect()
}

/// Train `model` until it converges or reaches the scan limit.
/// A fatal error aborts the run. Statistics of a failed scan are not rolled back.
pub fn run<M, P>(model: &mut M, reporter: &mut P) -> Result<EmState>
where
    M: ExpectationMaximization,
    P: ProgressReporter,
{
    let options = model.options().clone();
    options.validate()?;
    let num_subjects = model.num_subjects();
    if num_subjects == 0 {
        return Err(Error::Config("no training subjects".to_string()));
    }
    model.init()?;
    let mut state = EmState::new(options.blocks_for(num_subjects));
    let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(options.seed);
    let mut indices: Vec<usize> = (0..num_subjects).collect();
    reporter.header()?;
    state.status = EmStatus::Scanning;
    while state.status == EmStatus::Scanning {
        let scan = state.scan + 1;
        let mut log_likelihood = 0f64;
        if scan == 1 {
            state.epsilon = 1f64;
            log_likelihood += model.expectation_step(&indices)?;
            model.update_sufficient_statistics(1f64);
            model.maximization_step()?;
            state.iterations += 1;
        } else {
            let epsilon = options.epsilon(scan, state.num_blocks);
            state.epsilon = epsilon;
            indices.shuffle(&mut rng);
            let blocks = split_into_blocks(&indices, state.num_blocks);
            for (b, block) in blocks.iter().enumerate() {
                log_likelihood += model.expectation_step(block)?;
                match options.mode {
                    TrainingMode::Online => {
                        model.update_sufficient_statistics(epsilon);
                        model.maximization_step()?;
                        state.iterations += 1;
                    }
                    TrainingMode::Batch if b == 0 => model.update_sufficient_statistics(1f64),
                    TrainingMode::Batch => model.update_sufficient_statistics(0f64),
                }
                debug!("Scan {} block {}/{} done", scan, b + 1, blocks.len());
            }
            if options.mode == TrainingMode::Batch {
                model.maximization_step()?;
                state.iterations += 1;
            }
        }
        state.scan = scan;
        if state.scan > 1 {
            state.log_likelihood_prev = Some(state.log_likelihood);
        }
        state.log_likelihood = log_likelihood;
        reporter.report(&state.progress())?;
        if model.is_done(&state) {
            state.status = if model.has_converged(&state) {
                EmStatus::Converged
            } else {
                EmStatus::MaxScansReached
            };
        }
    }
    Ok(state)
}
