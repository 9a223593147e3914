//! Pseudocount admixture for accumulated profile columns.
use crate::error::{Error, Result};

/// Blends prior mass into a column of accumulated (unnormalized) counts.
/// Implementations should keep every entry non-negative.
pub trait Admixture: Send + Sync {
    fn admix(&self, column: &mut [f64], pseudocount: f64);
}

/// Adds `pseudocount * background[a]` to each residue `a`, i.e. a Dirichlet prior
/// with concentration `pseudocount` centered at the background distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundAdmixture {
    background: Vec<f64>,
}

impl BackgroundAdmixture {
    pub fn new(background: Vec<f64>) -> Result<Self> {
        let sum: f64 = background.iter().sum();
        if background.is_empty() || background.iter().any(|x| !(0f64..=1f64).contains(x)) {
            return Err(Error::Config(format!(
                "invalid background distribution:{:?}",
                background
            )));
        }
        if (sum - 1f64).abs() > 0.001 {
            return Err(Error::Config(format!(
                "background distribution sums to {}",
                sum
            )));
        }
        Ok(Self { background })
    }
    pub fn uniform(alphabet_size: usize) -> Self {
        Self {
            background: vec![1f64 / alphabet_size as f64; alphabet_size],
        }
    }
    pub fn background(&self) -> &[f64] {
        &self.background
    }
}

impl Admixture for BackgroundAdmixture {
    fn admix(&self, column: &mut [f64], pseudocount: f64) {
        assert_eq!(column.len(), self.background.len());
        column
            .iter_mut()
            .zip(self.background.iter())
            .for_each(|(x, bg)| *x += pseudocount * bg);
    }
}
