//! Scaled forward-backward algorithm on a context HMM.
//! The forward column at every position is divided by its sum `s[i]`,
//! and the backward column at `i` is divided by `s[i+1]`.
//! Thus, `f[i][k] * b[i][k]` is the posterior probability of state `k` at position `i`,
//! and the log-likelihood of a subject is `sum_i log2(s[i])`.
//! Both passes only visit the defined transitions, so they run in O(N * number of transitions).
use crate::emission::Emission;
use crate::error::{Error, Result};
use crate::hmm::Hmm;
use crate::subject::Subject;

/// (position x state) table.
#[derive(Debug, Clone, PartialEq)]
pub struct DPTable {
    rows: usize,
    states: usize,
    data: Vec<f64>,
}

impl DPTable {
    pub fn new(rows: usize, states: usize, default: f64) -> Self {
        Self {
            rows,
            states,
            data: vec![default; rows * states],
        }
    }
    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn states(&self) -> usize {
        self.states
    }
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.states..(i + 1) * self.states]
    }
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.states..(i + 1) * self.states]
    }
    // Sum dp[i][s] over s.
    pub fn total(&self, i: usize) -> f64 {
        self.row(i).iter().sum()
    }
    // Divide dp[i] by `by`
    pub fn div(&mut self, i: usize, by: f64) {
        self.row_mut(i).iter_mut().for_each(|x| *x /= by);
    }
}

impl std::ops::Index<(usize, usize)> for DPTable {
    type Output = f64;
    fn index(&self, (i, k): (usize, usize)) -> &Self::Output {
        &self.data[i * self.states + k]
    }
}

impl std::ops::IndexMut<(usize, usize)> for DPTable {
    fn index_mut(&mut self, (i, k): (usize, usize)) -> &mut Self::Output {
        &mut self.data[i * self.states + k]
    }
}

/// Output of one forward-backward pass over a subject.
#[derive(Debug, Clone)]
pub struct ForwardBackwardMatrices {
    /// Scaled forward probabilities.
    pub f: DPTable,
    /// Scaled backward probabilities.
    pub b: DPTable,
    /// Emission probabilities in linear space.
    pub e: DPTable,
    /// Scale factors, i.e., the forward column sums before rescaling.
    pub s: Vec<f64>,
    /// log2 likelihood of the subject.
    pub log_likelihood: f64,
}

impl ForwardBackwardMatrices {
    pub fn len(&self) -> usize {
        self.s.len()
    }
    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }
    /// Posterior probability of each state at position `i`.
    pub fn posterior(&self, i: usize) -> Vec<f64> {
        self.f
            .row(i)
            .iter()
            .zip(self.b.row(i))
            .map(|(f, b)| f * b)
            .collect()
    }
}

impl std::fmt::Display for ForwardBackwardMatrices {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "LK:{:.4}", self.log_likelihood)?;
        for i in 0..self.len() {
            let dump = |table: &DPTable| -> String {
                let row: Vec<_> = table.row(i).iter().map(|x| format!("{:.3}", x)).collect();
                row.join(",")
            };
            writeln!(
                f,
                "{}\t{:.3}\tF[{}]\tB[{}]\tE[{}]",
                i,
                self.s[i],
                dump(&self.f),
                dump(&self.b),
                dump(&self.e),
            )?;
        }
        Ok(())
    }
}

/// Linear-space emission probabilities of every state at every position.
pub fn emission_table(hmm: &Hmm, subject: &Subject, emission: &Emission) -> DPTable {
    assert_eq!(hmm.num_cols(), emission.num_cols());
    let mut table = DPTable::new(subject.len(), hmm.num_states(), 0f64);
    for i in 0..subject.len() {
        for (k, state) in hmm.states().iter().enumerate() {
            table[(i, k)] = emission.log_emission(state.profile(), subject, i).exp2();
        }
    }
    table
}

// Rescale f[i], returning the scale factor.
fn rescale(f: &mut DPTable, i: usize) -> Result<f64> {
    let scale = f.total(i);
    if !(0f64 < scale && scale.is_finite()) {
        return Err(Error::ZeroLikelihood { position: i });
    }
    f.div(i, scale);
    Ok(scale)
}

/// Scaled forward pass. Return the forward table and the scale factors.
pub fn forward(hmm: &Hmm, e: &DPTable) -> Result<(DPTable, Vec<f64>)> {
    let (len, states) = (e.rows(), hmm.num_states());
    if len == 0 {
        return Err(Error::EmptySubject);
    }
    assert_eq!(e.states(), states);
    let mut f = DPTable::new(len, states, 0f64);
    let mut scales = Vec::with_capacity(len);
    for (k, state) in hmm.states().iter().enumerate() {
        f[(0, k)] = state.prior() * e[(0, k)];
    }
    scales.push(rescale(&mut f, 0)?);
    for i in 1..len {
        for k in 0..states {
            if 0f64 < f[(i - 1, k)] && hmm.out_transitions(k).is_empty() {
                return Err(Error::DeadEndState {
                    state: k,
                    position: i - 1,
                });
            }
        }
        for l in 0..states {
            let incoming: f64 = hmm
                .in_transitions(l)
                .iter()
                .map(|(&k, w)| f[(i - 1, k)] * w)
                .sum();
            f[(i, l)] = e[(i, l)] * incoming;
        }
        scales.push(rescale(&mut f, i)?);
    }
    Ok((f, scales))
}

/// Backward pass scaled by the factors of the forward pass.
pub fn backward(hmm: &Hmm, e: &DPTable, scales: &[f64]) -> DPTable {
    let (len, states) = (e.rows(), hmm.num_states());
    assert_eq!(len, scales.len());
    let mut b = DPTable::new(len, states, 0f64);
    if len == 0 {
        return b;
    }
    b.row_mut(len - 1).iter_mut().for_each(|x| *x = 1f64);
    for i in (0..len - 1).rev() {
        for k in 0..states {
            let outgoing: f64 = hmm
                .out_transitions(k)
                .iter()
                .map(|(&l, w)| w * e[(i + 1, l)] * b[(i + 1, l)])
                .sum();
            b[(i, k)] = outgoing / scales[i + 1];
        }
    }
    b
}

pub fn forward_backward(
    hmm: &Hmm,
    subject: &Subject,
    emission: &Emission,
) -> Result<ForwardBackwardMatrices> {
    if subject.is_empty() {
        return Err(Error::EmptySubject);
    }
    let e = emission_table(hmm, subject, emission);
    let (f, s) = forward(hmm, &e)?;
    let b = backward(hmm, &e, &s);
    let log_likelihood = s.iter().map(|x| x.log2()).sum();
    Ok(ForwardBackwardMatrices {
        f,
        b,
        e,
        s,
        log_likelihood,
    })
}

/// log2 likelihood of `subject` by the forward pass alone.
pub fn log_likelihood(hmm: &Hmm, subject: &Subject, emission: &Emission) -> Result<f64> {
    if subject.is_empty() {
        return Err(Error::EmptySubject);
    }
    let e = emission_table(hmm, subject, emission);
    let (_, s) = forward(hmm, &e)?;
    Ok(s.iter().map(|x| x.log2()).sum())
}
