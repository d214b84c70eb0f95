/*!
Aggregates point observations into per-point letter distributions.
Aggregation is a plain sum, so tables built from disjoint read sets can be merged in any order with identical results.
*/

use std::collections::BTreeMap;

use crate::point_projection::{GlobalPoint, PointObservation};

/// The letters tracked at each point, indexed by `letter_index`
pub const NUCLEOTIDES: [u8; 4] = *b"ACGT";

/// Converts a base to its index in `NUCLEOTIDES`, None for anything else
pub fn letter_index(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None
    }
}

/// Accumulated evidence for one letter at one point
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LetterEvidence {
    quality_sum: u64,
    count: u64,
    non_edge_count: u64
}

impl LetterEvidence {
    // Getters
    pub fn quality_sum(&self) -> u64 {
        self.quality_sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn non_edge_count(&self) -> u64 {
        self.non_edge_count
    }

    /// Fraction of this letter's observations that did not come from an edge, 0.0 when unobserved
    pub fn non_edge_fraction(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.non_edge_count as f64 / self.count as f64
        }
    }
}

/// Letter distribution at one point
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PointEvidence {
    letters: [LetterEvidence; 4]
}

impl PointEvidence {
    /// Adds a single observation
    pub fn add(&mut self, observation: &PointObservation) {
        let letter = &mut self.letters[observation.letter() as usize];
        letter.quality_sum += observation.quality() as u64;
        letter.count += 1;
        if !observation.is_edge() {
            letter.non_edge_count += 1;
        }
    }

    /// Adds all evidence from another point
    pub fn merge(&mut self, other: &PointEvidence) {
        for (letter, other_letter) in self.letters.iter_mut().zip(other.letters.iter()) {
            letter.quality_sum += other_letter.quality_sum;
            letter.count += other_letter.count;
            letter.non_edge_count += other_letter.non_edge_count;
        }
    }

    pub fn letter(&self, letter: u8) -> &LetterEvidence {
        &self.letters[letter as usize]
    }

    pub fn total_quality(&self) -> u64 {
        self.letters.iter().map(|l| l.quality_sum).sum()
    }

    pub fn total_count(&self) -> u64 {
        self.letters.iter().map(|l| l.count).sum()
    }

    /// A point with no quality at all is treated as uncovered
    pub fn is_uncovered(&self) -> bool {
        self.total_quality() == 0
    }

    /// The letter with the highest quality sum, lowest index on ties; None when uncovered
    pub fn best_letter(&self) -> Option<u8> {
        if self.is_uncovered() {
            return None;
        }
        let mut best = 0;
        for letter in 1..self.letters.len() {
            if self.letters[letter].quality_sum > self.letters[best].quality_sum {
                best = letter;
            }
        }
        Some(best as u8)
    }

    /// Share of the point quality carried by `letter`, 0.0 when uncovered
    pub fn quality_share(&self, letter: u8) -> f64 {
        let total = self.total_quality();
        if total == 0 {
            0.0
        } else {
            self.letters[letter as usize].quality_sum as f64 / total as f64
        }
    }

    /// Fraction of all observations at this point that did not come from an edge
    pub fn non_edge_fraction(&self) -> f64 {
        let count = self.total_count();
        if count == 0 {
            0.0
        } else {
            self.letters.iter().map(|l| l.non_edge_count).sum::<u64>() as f64 / count as f64
        }
    }
}

/// Per-point evidence for a set of reads, ordered by point
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvidenceTable {
    points: BTreeMap<GlobalPoint, PointEvidence>
}

impl EvidenceTable {
    /// Aggregates the observations of the selected reads.
    /// # Arguments
    /// * `observations` - projected observations for every read of the clonotype
    /// * `reads` - indices into `observations` to include
    pub fn aggregate(observations: &[Vec<PointObservation>], reads: &[usize]) -> EvidenceTable {
        let mut table = EvidenceTable::default();
        for &read_index in reads.iter() {
            table.add_read(&observations[read_index]);
        }
        table
    }

    /// Adds all observations of a single read
    pub fn add_read(&mut self, read_observations: &[PointObservation]) {
        for observation in read_observations.iter() {
            self.points.entry(observation.point())
                .or_default()
                .add(observation);
        }
    }

    /// Merges another table into this one
    pub fn merge(&mut self, other: &EvidenceTable) {
        for (point, evidence) in other.points.iter() {
            self.points.entry(*point)
                .or_default()
                .merge(evidence);
        }
    }

    pub fn get(&self, point: &GlobalPoint) -> Option<&PointEvidence> {
        self.points.get(point)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GlobalPoint, &PointEvidence)> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
