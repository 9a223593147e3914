//! Training data. A subject is either a plain sequence or a count profile.
use crate::alphabet::Alphabet;
use crate::error::{Error, Result};
use crate::pseudocounts::Admixture;

/// Encoded sequence. Codes at or above `Alphabet::any()` are non-informative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub header: String,
    codes: Vec<u8>,
}

impl Sequence {
    pub fn new(header: &str, seq: &[u8], alphabet: &Alphabet) -> Self {
        let codes = seq.iter().map(|&x| alphabet.encode(x)).collect();
        Self {
            header: header.to_string(),
            codes,
        }
    }
    pub fn from_codes(header: &str, codes: Vec<u8>) -> Self {
        Self {
            header: header.to_string(),
            codes,
        }
    }
    pub fn len(&self) -> usize {
        self.codes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }
    pub fn to_bytes(&self, alphabet: &Alphabet) -> Vec<u8> {
        self.codes.iter().map(|&c| alphabet.decode(c)).collect()
    }
}

/// Profile of `len` columns over an alphabet of `alphabet_size`.
/// Each column is either a frequency vector or, if `has_counts`, the frequencies scaled by `neff`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountProfile {
    alphabet_size: usize,
    // Flattened [column * alphabet_size + residue].
    data: Vec<f64>,
    neff: Vec<f64>,
    has_counts: bool,
}

impl CountProfile {
    pub fn new(
        columns: &[Vec<f64>],
        neff: Vec<f64>,
        has_counts: bool,
        alphabet_size: usize,
    ) -> Result<Self> {
        if columns.len() != neff.len() {
            return Err(Error::Dimension(format!(
                "{} columns but {} neff values",
                columns.len(),
                neff.len()
            )));
        }
        if let Some((i, col)) = columns
            .iter()
            .enumerate()
            .find(|(_, col)| col.len() != alphabet_size)
        {
            return Err(Error::Dimension(format!(
                "column {} has {} entries, expected {}",
                i,
                col.len(),
                alphabet_size
            )));
        }
        let data: Vec<f64> = columns.iter().flat_map(|col| col.iter().copied()).collect();
        let is_valid = |x: &f64| x.is_finite() && 0f64 <= *x;
        if !data.iter().all(is_valid) || !neff.iter().all(is_valid) {
            return Err(Error::Config(
                "counts and neff should be finite and non-negative".to_string(),
            ));
        }
        Ok(Self {
            alphabet_size,
            data,
            neff,
            has_counts,
        })
    }
    /// One-hot profile with neff of one at every column.
    /// Non-informative residues give all-zero columns.
    pub fn from_sequence(seq: &Sequence, alphabet_size: usize) -> Self {
        let mut data = vec![0f64; seq.len() * alphabet_size];
        for (i, &code) in seq.codes().iter().enumerate() {
            if (code as usize) < alphabet_size {
                data[i * alphabet_size + code as usize] = 1f64;
            }
        }
        Self {
            alphabet_size,
            data,
            neff: vec![1f64; seq.len()],
            has_counts: false,
        }
    }
    pub fn len(&self) -> usize {
        self.neff.len()
    }
    pub fn is_empty(&self) -> bool {
        self.neff.is_empty()
    }
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }
    pub fn column(&self, i: usize) -> &[f64] {
        &self.data[i * self.alphabet_size..(i + 1) * self.alphabet_size]
    }
    pub fn neff(&self) -> &[f64] {
        &self.neff
    }
    pub fn has_counts(&self) -> bool {
        self.has_counts
    }
    pub fn convert_to_counts(&mut self) {
        if !self.has_counts {
            let size = self.alphabet_size;
            for (col, neff) in self.data.chunks_mut(size).zip(self.neff.iter()) {
                col.iter_mut().for_each(|x| *x *= neff);
            }
            self.has_counts = true;
        }
    }
    /// Mix `tau` of pseudocounts into the frequencies of each column. The counts mode is kept.
    pub fn admix(&mut self, admixture: &dyn Admixture, tau: f64) {
        let has_counts = self.has_counts;
        self.convert_to_frequencies();
        for col in self.data.chunks_mut(self.alphabet_size) {
            col.iter_mut().for_each(|x| *x *= 1f64 - tau);
            admixture.admix(col, tau);
        }
        if has_counts {
            self.convert_to_counts();
        }
    }
    /// Normalize each column. All-zero columns stay zero.
    pub fn convert_to_frequencies(&mut self) {
        if self.has_counts {
            for col in self.data.chunks_mut(self.alphabet_size) {
                let sum: f64 = col.iter().sum();
                if 0f64 < sum {
                    col.iter_mut().for_each(|x| *x /= sum);
                }
            }
            self.has_counts = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Sequence(Sequence),
    CountProfile(CountProfile),
}

impl Subject {
    pub fn len(&self) -> usize {
        match self {
            Subject::Sequence(seq) => seq.len(),
            Subject::CountProfile(prof) => prof.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Total column weight. Columns of a count profile in counts mode weigh their neff.
    pub fn effective_columns(&self) -> f64 {
        match self {
            Subject::CountProfile(prof) if prof.has_counts() => prof.neff().iter().sum(),
            _ => self.len() as f64,
        }
    }
}

impl From<Sequence> for Subject {
    fn from(seq: Sequence) -> Self {
        Subject::Sequence(seq)
    }
}

impl From<CountProfile> for Subject {
    fn from(prof: CountProfile) -> Self {
        Subject::CountProfile(prof)
    }
}
