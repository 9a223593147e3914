//! Context profiles: one residue distribution per column of a context window.
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ContextProfile {
    num_cols: usize,
    alphabet_size: usize,
    // Flattened [column * alphabet_size + residue].
    data: Vec<f64>,
    // If true, `data` holds log2 probabilities.
    logspace: bool,
}

impl ContextProfile {
    /// All-zero profile in linear space.
    pub fn zeros(num_cols: usize, alphabet_size: usize) -> Self {
        Self {
            num_cols,
            alphabet_size,
            data: vec![0f64; num_cols * alphabet_size],
            logspace: false,
        }
    }
    /// Linear-space profile from its columns.
    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self> {
        let alphabet_size = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.is_empty() || alphabet_size == 0 {
            return Err(Error::Dimension("empty context profile".to_string()));
        }
        if columns.iter().any(|c| c.len() != alphabet_size) {
            return Err(Error::Dimension(
                "profile columns differ in length".to_string(),
            ));
        }
        if columns.len() % 2 == 0 {
            return Err(Error::EvenWindowLength(columns.len()));
        }
        Ok(Self {
            num_cols: columns.len(),
            alphabet_size,
            data: columns.iter().flat_map(|c| c.iter().copied()).collect(),
            logspace: false,
        })
    }
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }
    pub fn center(&self) -> usize {
        (self.num_cols - 1) / 2
    }
    pub fn is_logspace(&self) -> bool {
        self.logspace
    }
    pub fn column(&self, j: usize) -> &[f64] {
        &self.data[j * self.alphabet_size..(j + 1) * self.alphabet_size]
    }
    pub fn column_mut(&mut self, j: usize) -> &mut [f64] {
        &mut self.data[j * self.alphabet_size..(j + 1) * self.alphabet_size]
    }
    pub fn columns(&self) -> std::slice::ChunksExact<'_, f64> {
        self.data.chunks_exact(self.alphabet_size)
    }
    /// Index of the first column without any mass, if any. Only meaningful in linear space.
    pub fn first_empty_column(&self) -> Option<usize> {
        self.columns().position(|col| col.iter().sum::<f64>() <= 0f64)
    }
    /// Normalize every column to one. Columns without mass are left untouched.
    pub fn normalize(&mut self) {
        assert!(!self.logspace);
        for col in self.data.chunks_exact_mut(self.alphabet_size) {
            let sum: f64 = col.iter().sum();
            if 0f64 < sum {
                col.iter_mut().for_each(|x| *x /= sum);
            }
        }
    }
    pub fn transform_to_logspace(&mut self) {
        if !self.logspace {
            self.data.iter_mut().for_each(|x| *x = x.log2());
            self.logspace = true;
        }
    }
    pub fn transform_to_linspace(&mut self) {
        if self.logspace {
            self.data.iter_mut().for_each(|x| *x = x.exp2());
            self.logspace = false;
        }
    }
}

impl std::fmt::Display for ContextProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for col in self.columns() {
            let probs: Vec<_> = col
                .iter()
                .map(|&x| if self.logspace { x.exp2() } else { x })
                .map(|x| format!("{:.3}", x))
                .collect();
            writeln!(f, "{}", probs.join("\t"))?;
        }
        Ok(())
    }
}
