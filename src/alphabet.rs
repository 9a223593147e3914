//! Finite symbol tables.
//! Residues are encoded as `0..size`. Three sentinel codes follow them:
//! `any = size`, `gap = size + 1`, and `endgap = size + 2`.
//! Every code at or above `any` carries no information about the residue.
use crate::error::{Error, Result};

const DNA: &[u8] = b"ACGT";
const AMINO_ACID: &[u8] = b"ARNDCQEGHILKMFPSTWYV";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<u8>,
    // byte -> code. Bytes not in the table map to `any`.
    table: Vec<u8>,
}

impl Alphabet {
    /// Build an alphabet from distinct symbols. Symbols are stored upper-case.
    /// Lower-case input is accepted by `encode` as well.
    pub fn new(symbols: &[u8]) -> Result<Self> {
        if symbols.is_empty() || symbols.len() > 250 {
            return Err(Error::Config(format!(
                "alphabet size must be in 1..=250, got {}",
                symbols.len()
            )));
        }
        let symbols: Vec<u8> = symbols.iter().map(|x| x.to_ascii_uppercase()).collect();
        for (i, sym) in symbols.iter().enumerate() {
            if *sym == b'-' || *sym == b'.' || symbols[..i].contains(sym) {
                return Err(Error::Config(format!(
                    "invalid or duplicated symbol {:?}",
                    *sym as char
                )));
            }
        }
        Ok(Self::from_symbols(&symbols))
    }
    pub fn dna() -> Self {
        Self::from_symbols(DNA)
    }
    pub fn amino_acid() -> Self {
        Self::from_symbols(AMINO_ACID)
    }
    fn from_symbols(symbols: &[u8]) -> Self {
        let size = symbols.len() as u8;
        let mut table = vec![size; 256];
        for (code, &sym) in symbols.iter().enumerate() {
            table[sym as usize] = code as u8;
            table[sym.to_ascii_lowercase() as usize] = code as u8;
        }
        table[b'-' as usize] = size + 1;
        table[b'.' as usize] = size + 1;
        Self {
            symbols: symbols.to_vec(),
            table,
        }
    }
    /// Number of informative residues.
    pub fn size(&self) -> usize {
        self.symbols.len()
    }
    pub fn any(&self) -> u8 {
        self.symbols.len() as u8
    }
    pub fn gap(&self) -> u8 {
        self.any() + 1
    }
    pub fn endgap(&self) -> u8 {
        self.any() + 2
    }
    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }
    pub fn encode(&self, byte: u8) -> u8 {
        self.table[byte as usize]
    }
    pub fn decode(&self, code: u8) -> u8 {
        match self.symbols.get(code as usize) {
            Some(&sym) => sym,
            None if code == self.gap() || code == self.endgap() => b'-',
            None => b'X',
        }
    }
    pub fn is_informative(&self, code: u8) -> bool {
        code < self.any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn encode_decode() {
        let alph = Alphabet::dna();
        assert_eq!(alph.size(), 4);
        let codes: Vec<_> = b"ACgtN-".iter().map(|&x| alph.encode(x)).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 5]);
        let decoded: Vec<_> = codes.iter().map(|&c| alph.decode(c)).collect();
        assert_eq!(decoded, b"ACGTX-".to_vec());
        assert!(alph.is_informative(3));
        assert!(!alph.is_informative(alph.any()));
        assert!(!alph.is_informative(alph.endgap()));
    }
    #[test]
    fn custom_alphabet() {
        let alph = Alphabet::new(b"ab").unwrap();
        assert_eq!(alph.encode(b'B'), 1);
        assert_eq!(alph.encode(b'z'), alph.any());
        assert_eq!(alph, Alphabet::new(b"AB").unwrap());
        assert!(Alphabet::new(b"aa").is_err());
        assert!(Alphabet::new(b"").is_err());
        assert_eq!(Alphabet::amino_acid().size(), 20);
    }
}
