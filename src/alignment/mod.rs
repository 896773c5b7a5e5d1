//! Pattern-compressed nucleotide alignments and the read interface shared by
//! a concrete alignment and the indexed container.

pub mod list;

pub use list::AlignmentList;

use std::collections::HashMap;

use crate::error::{AdequacyError, PpResult};

/// Number of concrete nucleotide states.
pub const STATE_COUNT: usize = 4;

/// State code for a fully ambiguous site (gap / unknown).
pub const UNKNOWN_STATE: u8 = 4;

const DECODE: [u8; 7] = [b'A', b'C', b'G', b'T', b'-', b'R', b'Y'];

/// Encode one nucleotide character. IUPAC two-state ambiguities map to
/// dedicated codes; gaps and anything unrecognized map to fully ambiguous.
pub fn encode_state(c: u8) -> u8 {
    match c.to_ascii_uppercase() {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' | b'U' => 3,
        b'R' => 5, // A/G
        b'Y' => 6, // C/T
        _ => UNKNOWN_STATE,
    }
}

/// The set of concrete states a state code can represent.
pub fn state_set(state: u8) -> [bool; STATE_COUNT] {
    match state {
        0 => [true, false, false, false],
        1 => [false, true, false, false],
        2 => [false, false, true, false],
        3 => [false, false, false, true],
        5 => [true, false, true, false],
        6 => [false, true, false, true],
        _ => [true; STATE_COUNT],
    }
}

pub fn is_ambiguous(state: u8) -> bool {
    state >= STATE_COUNT as u8
}

/// The read surface of an alignment-shaped data source.
///
/// Implemented by [`Alignment`] and by [`AlignmentList`], whose
/// implementation is pure delegation to whichever alignment is currently
/// selected.
pub trait AlignmentSource {
    fn taxon_count(&self) -> usize;
    fn taxon_names(&self) -> &[String];
    fn taxon_index(&self, name: &str) -> Option<usize>;
    fn site_count(&self) -> usize;
    fn pattern_count(&self) -> usize;
    /// States of all taxa at one site pattern.
    fn pattern(&self, pattern: usize) -> &[u8];
    fn state_at(&self, taxon: usize, pattern: usize) -> u8;
    fn pattern_weight(&self, pattern: usize) -> u32;
    fn weights(&self) -> &[u32];
    /// Pattern index of a site.
    fn pattern_index(&self, site: usize) -> usize;
    fn max_state_count(&self) -> usize;
    /// Ambiguity set of a state code.
    fn state_lookup(&self, state: u8) -> [bool; STATE_COUNT];
    /// Tip partial-likelihood vector for one taxon at one pattern.
    fn tip_partials(&self, taxon: usize, pattern: usize) -> [f64; STATE_COUNT];
    /// Reconstructed sequence of the named taxon.
    fn sequence_string(&self, taxon: &str) -> Option<String>;
    /// FASTA rendering of the whole alignment.
    fn render(&self) -> String;
}

/// A pattern-compressed sequence alignment.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub id: String,
    taxa: Vec<String>,
    taxon_index: HashMap<String, usize>,
    site_count: usize,
    /// `patterns[p][taxon]` is a state code.
    patterns: Vec<Vec<u8>>,
    weights: Vec<u32>,
    pattern_of_site: Vec<usize>,
}

impl Alignment {
    /// Build from raw sequences, compressing identical site columns into
    /// weighted patterns (first-occurrence order).
    pub fn from_sequences(id: &str, sequences: &[(String, String)]) -> PpResult<Self> {
        if sequences.is_empty() {
            return Err(AdequacyError::Validation(format!(
                "alignment '{}' has no sequences",
                id
            )));
        }
        let site_count = sequences[0].1.len();
        if site_count == 0 {
            return Err(AdequacyError::Validation(format!(
                "alignment '{}' has zero-length sequences",
                id
            )));
        }
        let mut taxa = Vec::with_capacity(sequences.len());
        let mut taxon_index = HashMap::new();
        let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(sequences.len());
        for (taxon, seq) in sequences {
            if seq.len() != site_count {
                return Err(AdequacyError::Validation(format!(
                    "sequence length mismatch in '{}': '{}' has {} sites, expected {}",
                    id,
                    taxon,
                    seq.len(),
                    site_count
                )));
            }
            if taxon_index.insert(taxon.clone(), taxa.len()).is_some() {
                return Err(AdequacyError::Validation(format!(
                    "duplicate taxon '{}' in alignment '{}'",
                    taxon, id
                )));
            }
            taxa.push(taxon.clone());
            encoded.push(seq.bytes().map(encode_state).collect());
        }

        let mut patterns: Vec<Vec<u8>> = Vec::new();
        let mut weights: Vec<u32> = Vec::new();
        let mut pattern_of_site = Vec::with_capacity(site_count);
        let mut seen: HashMap<Vec<u8>, usize> = HashMap::new();
        for site in 0..site_count {
            let column: Vec<u8> = encoded.iter().map(|row| row[site]).collect();
            let p = *seen.entry(column.clone()).or_insert_with(|| {
                patterns.push(column);
                weights.push(0);
                patterns.len() - 1
            });
            weights[p] += 1;
            pattern_of_site.push(p);
        }

        Ok(Self {
            id: id.to_string(),
            taxa,
            taxon_index,
            site_count,
            patterns,
            weights,
            pattern_of_site,
        })
    }
}

impl AlignmentSource for Alignment {
    fn taxon_count(&self) -> usize {
        self.taxa.len()
    }

    fn taxon_names(&self) -> &[String] {
        &self.taxa
    }

    fn taxon_index(&self, name: &str) -> Option<usize> {
        self.taxon_index.get(name).copied()
    }

    fn site_count(&self) -> usize {
        self.site_count
    }

    fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn pattern(&self, pattern: usize) -> &[u8] {
        &self.patterns[pattern]
    }

    fn state_at(&self, taxon: usize, pattern: usize) -> u8 {
        self.patterns[pattern][taxon]
    }

    fn pattern_weight(&self, pattern: usize) -> u32 {
        self.weights[pattern]
    }

    fn weights(&self) -> &[u32] {
        &self.weights
    }

    fn pattern_index(&self, site: usize) -> usize {
        self.pattern_of_site[site]
    }

    fn max_state_count(&self) -> usize {
        STATE_COUNT
    }

    fn state_lookup(&self, state: u8) -> [bool; STATE_COUNT] {
        state_set(state)
    }

    fn tip_partials(&self, taxon: usize, pattern: usize) -> [f64; STATE_COUNT] {
        let set = state_set(self.state_at(taxon, pattern));
        let mut partials = [0.0; STATE_COUNT];
        for (p, allowed) in partials.iter_mut().zip(set) {
            if allowed {
                *p = 1.0;
            }
        }
        partials
    }

    fn sequence_string(&self, taxon: &str) -> Option<String> {
        let t = self.taxon_index(taxon)?;
        let seq: String = self
            .pattern_of_site
            .iter()
            .map(|&p| {
                let state = self.patterns[p][t];
                DECODE.get(state as usize).copied().unwrap_or(b'-') as char
            })
            .collect();
        Some(seq)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for taxon in &self.taxa {
            out.push('>');
            out.push_str(taxon);
            out.push('\n');
            if let Some(seq) = self.sequence_string(taxon) {
                out.push_str(&seq);
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Alignment {
        Alignment::from_sequences(
            "toy",
            &[
                ("A".to_string(), "ACGTAC".to_string()),
                ("B".to_string(), "ACGTAC".to_string()),
                ("C".to_string(), "TCGTTC".to_string()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn compresses_repeated_columns() {
        let a = toy();
        // Columns: ATC repeats at sites 0 and 4; CCC at 1 and 5.
        assert_eq!(a.site_count(), 6);
        assert_eq!(a.pattern_count(), 4);
        assert_eq!(a.pattern_weight(a.pattern_index(0)), 2);
        assert_eq!(a.pattern_index(0), a.pattern_index(4));
        assert_eq!(a.weights().iter().sum::<u32>() as usize, a.site_count());
    }

    #[test]
    fn sequences_round_trip() {
        let a = toy();
        assert_eq!(a.sequence_string("A").unwrap(), "ACGTAC");
        assert_eq!(a.sequence_string("C").unwrap(), "TCGTTC");
        assert!(a.sequence_string("nope").is_none());
    }

    #[test]
    fn ambiguity_state_sets() {
        assert_eq!(state_set(0), [true, false, false, false]);
        assert_eq!(state_set(encode_state(b'R')), [true, false, true, false]);
        assert_eq!(state_set(encode_state(b'-')), [true; 4]);
        assert!(is_ambiguous(encode_state(b'N')));
        assert!(!is_ambiguous(encode_state(b'g')));
    }

    #[test]
    fn tip_partials_match_state_sets() {
        let a = Alignment::from_sequences(
            "amb",
            &[
                ("A".to_string(), "AN".to_string()),
                ("B".to_string(), "CC".to_string()),
            ],
        )
        .unwrap();
        assert_eq!(a.tip_partials(0, a.pattern_index(0)), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(a.tip_partials(0, a.pattern_index(1)), [1.0; 4]);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let err = Alignment::from_sequences(
            "bad",
            &[
                ("A".to_string(), "ACGT".to_string()),
                ("B".to_string(), "ACG".to_string()),
            ],
        );
        assert!(err.is_err());
    }

    #[test]
    fn render_is_fasta() {
        let a = toy();
        let text = a.render();
        assert!(text.starts_with(">A\nACGTAC\n"));
        assert_eq!(text.matches('>').count(), 3);
    }
}
