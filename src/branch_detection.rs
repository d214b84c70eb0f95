/*!
Decides, point by point, whether the evidence is a single call or a genuine split between molecules.
Each point resolves to one `PointState`:
* `Uncovered` - no quality at all
* `Decisive` - one letter reached the decisive quality sum and is the sole call
* `Branching` - two or more letters independently passed the significance test
* `Undetermined` - anything else, left to the consensus caller

A letter is significant when its quality sum reaches the mean-normalized requirement for the clonotype, enough of its observations are away from read edges, and it passes either the branching sum or the branching share threshold.
Only reference points (not insertions) inside the sub-cloning regions can branch; without sub-cloning regions nothing branches.

# Example usage
```rust
use clono_contig::assembler_config::AssemblerConfig;
use clono_contig::branch_detection::{BranchDetector, PointState};
use clono_contig::point_evidence::PointEvidence;
use clono_contig::point_projection::{GlobalPoint, PointObservation};

let detector = BranchDetector::new(&AssemblerConfig::default(), Some(vec![0..100]), 20);
let point = GlobalPoint::reference(50);
let mut evidence = PointEvidence::default();
for i in 0..20 {
    // 10 reads with G and 10 reads with T
    let letter = if i < 10 { 2 } else { 3 };
    evidence.add(&PointObservation::new(point, letter, 30, false));
}
assert_eq!(detector.classify(&point, &evidence), PointState::Branching { letters: vec![2, 3] });
```
*/

use log::{debug, trace};
use rustc_hash::FxHashMap as HashMap;
use std::ops::Range;

use crate::assembler_config::AssemblerConfig;
use crate::point_evidence::{EvidenceTable, PointEvidence};
use crate::point_projection::{GlobalPoint, PointObservation};

/// Resolution of a single point
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PointState {
    /// No quality at this point
    Uncovered,
    /// One letter dominates with at least the decisive quality sum
    Decisive { letter: u8 },
    /// Two or more significant letters, ordered by letter index
    Branching { letters: Vec<u8> },
    /// Not a branch; the consensus caller decides
    Undetermined
}

/// A point that splits the reads into sub-populations
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BranchPoint {
    point: GlobalPoint,
    /// Accepted letters, ordered by letter index
    letters: Vec<u8>,
    /// For each accepted letter, the reads observing it at this point
    supporting_reads: Vec<Vec<usize>>
}

impl BranchPoint {
    pub fn new(point: GlobalPoint, letters: Vec<u8>) -> BranchPoint {
        let supporting_reads = vec![vec![]; letters.len()];
        BranchPoint {
            point,
            letters,
            supporting_reads
        }
    }

    // Getters
    pub fn point(&self) -> GlobalPoint {
        self.point
    }

    pub fn letters(&self) -> &[u8] {
        &self.letters
    }

    pub fn supporting_reads(&self) -> &[Vec<usize>] {
        &self.supporting_reads
    }

    /// True if `letter` is one of the accepted letters
    pub fn accepts(&self, letter: u8) -> bool {
        self.letters.contains(&letter)
    }
}

/// Applies the branching thresholds to per-point evidence
#[derive(Clone, Debug)]
pub struct BranchDetector {
    minimal_quality_share: f64,
    minimal_sum_quality: u64,
    decisive_sum_quality: u64,
    minimal_non_edge_fraction: f64,
    /// minimal mean normalized quality times the clonotype read weight
    required_minimal_sum_quality: f64,
    /// None disables branching
    sub_cloning_ranges: Option<Vec<Range<i64>>>
}

impl BranchDetector {
    /// Creates a detector for one clonotype.
    /// # Arguments
    /// * `config` - the branching thresholds
    /// * `sub_cloning_ranges` - resolved global ranges that may branch, None to disable branching
    /// * `total_read_weight` - the read weight of the whole clonotype
    pub fn new(config: &AssemblerConfig, sub_cloning_ranges: Option<Vec<Range<i64>>>, total_read_weight: usize) -> BranchDetector {
        BranchDetector {
            minimal_quality_share: config.branching_minimal_quality_share,
            minimal_sum_quality: config.branching_minimal_sum_quality,
            decisive_sum_quality: config.decisive_branching_sum_quality_threshold,
            minimal_non_edge_fraction: config.minimal_non_edge_points_fraction,
            required_minimal_sum_quality: config.minimal_mean_normalized_quality * total_read_weight as f64,
            sub_cloning_ranges
        }
    }

    /// True if the point is allowed to become a branch point.
    /// Insertion points are never eligible; variation in inserted bases is called as a consensus letter or an ambiguity code instead.
    pub fn is_eligible(&self, point: &GlobalPoint) -> bool {
        if point.is_insertion() {
            return false;
        }
        match self.sub_cloning_ranges.as_ref() {
            Some(ranges) => ranges.iter().any(|r| r.contains(&point.position())),
            None => false
        }
    }

    /// Returns the letter that reached the decisive threshold, if any
    pub fn decisive_letter(&self, evidence: &PointEvidence) -> Option<u8> {
        let best = evidence.best_letter()?;
        if evidence.letter(best).quality_sum() >= self.decisive_sum_quality {
            Some(best)
        } else {
            None
        }
    }

    /// The sum-or-share part of the significance test
    /// # Arguments
    /// * `quality_sum` - the quality sum of the letter
    /// * `total_quality` - the quality sum of the whole point
    pub fn passes_branching_thresholds(&self, quality_sum: u64, total_quality: u64) -> bool {
        let share = if total_quality == 0 {
            0.0
        } else {
            quality_sum as f64 / total_quality as f64
        };
        quality_sum >= self.minimal_sum_quality || (quality_sum > 0 && share >= self.minimal_quality_share)
    }

    /// Full significance test of one letter at one point
    pub fn is_significant(&self, evidence: &PointEvidence, letter: u8) -> bool {
        let letter_evidence = evidence.letter(letter);
        letter_evidence.count() > 0 &&
            letter_evidence.quality_sum() as f64 >= self.required_minimal_sum_quality &&
            letter_evidence.non_edge_fraction() >= self.minimal_non_edge_fraction &&
            self.passes_branching_thresholds(letter_evidence.quality_sum(), evidence.total_quality())
    }

    /// All significant letters, ordered by letter index
    pub fn significant_letters(&self, evidence: &PointEvidence) -> Vec<u8> {
        (0..4_u8)
            .filter(|&l| self.is_significant(evidence, l))
            .collect()
    }

    /// Resolves the state of one point
    pub fn classify(&self, point: &GlobalPoint, evidence: &PointEvidence) -> PointState {
        if evidence.is_uncovered() {
            return PointState::Uncovered;
        }
        if let Some(letter) = self.decisive_letter(evidence) {
            return PointState::Decisive { letter };
        }
        if !self.is_eligible(point) {
            return PointState::Undetermined;
        }

        let letters = self.significant_letters(evidence);
        if letters.len() >= 2 {
            PointState::Branching { letters }
        } else {
            PointState::Undetermined
        }
    }

    /// Finds every branch point of a clonotype, ordered by point.
    /// # Arguments
    /// * `table` - evidence over `reads`
    /// * `observations` - projected observations for every read
    /// * `reads` - the reads that built `table`, used to collect supporting reads
    pub fn detect(&self, table: &EvidenceTable, observations: &[Vec<PointObservation>], reads: &[usize]) -> Vec<BranchPoint> {
        if self.sub_cloning_ranges.is_none() {
            debug!("Sub-cloning disabled, skipping branch detection");
            return vec![];
        }

        let mut branch_points: Vec<BranchPoint> = table.iter()
            .filter_map(|(point, evidence)| {
                match self.classify(point, evidence) {
                    PointState::Branching { letters } => {
                        trace!("Branch point at {point:?} with letters {letters:?}");
                        Some(BranchPoint::new(*point, letters))
                    },
                    _ => None
                }
            })
            .collect();

        let lookup: HashMap<GlobalPoint, usize> = branch_points.iter()
            .enumerate()
            .map(|(i, bp)| (bp.point, i))
            .collect();
        for &read_index in reads.iter() {
            for observation in observations[read_index].iter() {
                if let Some(&bp_index) = lookup.get(&observation.point()) {
                    let branch_point = &mut branch_points[bp_index];
                    if let Some(letter_index) = branch_point.letters.iter().position(|&l| l == observation.letter()) {
                        branch_point.supporting_reads[letter_index].push(read_index);
                    }
                }
            }
        }

        debug!("Found {} branch points over {} points", branch_points.len(), table.len());
        branch_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::assembler_config::AssemblerConfigBuilder;

    fn evidence_from(counts: &[(u8, usize, u8, bool)]) -> PointEvidence {
        let mut evidence = PointEvidence::default();
        for &(letter, count, quality, is_edge) in counts.iter() {
            for _ in 0..count {
                evidence.add(&PointObservation::new(GlobalPoint::reference(0), letter, quality, is_edge));
            }
        }
        evidence
    }

    #[test]
    fn test_classify() {
        let config = AssemblerConfig::default();
        let detector = BranchDetector::new(&config, Some(vec![0..10]), 20);
        let point = GlobalPoint::reference(0);

        assert_eq!(detector.classify(&point, &PointEvidence::default()), PointState::Uncovered);

        // clean single letter
        let single = evidence_from(&[(1, 20, 30, false)]);
        assert_eq!(detector.classify(&point, &single), PointState::Undetermined);

        // one read of noise is below both thresholds
        let noisy = evidence_from(&[(1, 19, 30, false), (0, 1, 30, false)]);
        assert_eq!(detector.classify(&point, &noisy), PointState::Undetermined);

        // balanced split
        let split = evidence_from(&[(1, 10, 30, false), (0, 10, 30, false)]);
        assert_eq!(detector.classify(&point, &split), PointState::Branching { letters: vec![0, 1] });

        // outside the sub-cloning ranges
        assert_eq!(detector.classify(&GlobalPoint::reference(10), &split), PointState::Undetermined);

        // insertions never branch
        assert_eq!(detector.classify(&GlobalPoint::new(5, 1), &split), PointState::Undetermined);
    }

    #[test]
    fn test_edge_gate() {
        let config = AssemblerConfig::default();
        let detector = BranchDetector::new(&config, Some(vec![0..10]), 20);
        let point = GlobalPoint::reference(0);

        // the T letter is only seen at read edges
        let edge_split = evidence_from(&[(1, 10, 30, false), (3, 10, 30, true)]);
        assert_eq!(detector.classify(&point, &edge_split), PointState::Undetermined);

        // 3 of 10 away from edges passes the default 0.25
        let mostly_edge = evidence_from(&[(1, 10, 30, false), (3, 7, 30, true), (3, 3, 30, false)]);
        assert_eq!(detector.classify(&point, &mostly_edge), PointState::Branching { letters: vec![1, 3] });
    }

    #[test]
    fn test_mean_normalized_gate() {
        let config = AssemblerConfig::default();
        let point = GlobalPoint::reference(0);
        // 3 reads of T with quality 30 is 90, which passes the sum threshold of 80
        let evidence = evidence_from(&[(1, 20, 30, false), (3, 3, 30, false)]);

        // 30 reads requires 90
        let detector = BranchDetector::new(&config, Some(vec![0..10]), 30);
        assert_eq!(detector.classify(&point, &evidence), PointState::Branching { letters: vec![1, 3] });

        // 31 reads requires 93
        let detector = BranchDetector::new(&config, Some(vec![0..10]), 31);
        assert_eq!(detector.classify(&point, &evidence), PointState::Undetermined);
    }

    #[test]
    fn test_decisive_override() {
        let config = AssemblerConfigBuilder::default()
            .decisive_branching_sum_quality_threshold(600)
            .build()
            .unwrap();
        let detector = BranchDetector::new(&config, Some(vec![0..10]), 20);
        let point = GlobalPoint::reference(0);

        // both letters would branch, but C reached the decisive sum
        let evidence = evidence_from(&[(1, 20, 30, false), (0, 10, 30, false)]);
        assert_eq!(detector.classify(&point, &evidence), PointState::Decisive { letter: 1 });

        // decisive applies outside the sub-cloning region too
        assert_eq!(detector.classify(&GlobalPoint::reference(50), &evidence), PointState::Decisive { letter: 1 });
    }

    #[test]
    fn test_threshold_monotonicity() {
        let evidences = [
            evidence_from(&[(1, 10, 30, false), (0, 10, 30, false)]),
            evidence_from(&[(1, 18, 30, false), (0, 2, 30, false)]),
            evidence_from(&[(1, 15, 20, false), (0, 3, 25, false), (2, 2, 30, false)]),
            evidence_from(&[(2, 30, 35, false), (3, 1, 40, false)])
        ];
        let point = GlobalPoint::reference(0);
        let count_branches = |config: &AssemblerConfig| {
            let detector = BranchDetector::new(config, Some(vec![0..10]), 10);
            evidences.iter()
                .filter(|e| matches!(detector.classify(&point, e), PointState::Branching { .. }))
                .count()
        };

        let mut previous = usize::MAX;
        for (sum, share) in [(10, 0.01), (40, 0.05), (80, 0.1), (200, 0.3), (1000, 0.9)] {
            let config = AssemblerConfigBuilder::default()
                .branching_minimal_sum_quality(sum)
                .branching_minimal_quality_share(share)
                .output_minimal_sum_quality(0)
                .build()
                .unwrap();
            let count = count_branches(&config);
            assert!(count <= previous);
            previous = count;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_detect() {
        let config = AssemblerConfig::default();
        let detector = BranchDetector::new(&config, Some(vec![0..100]), 20);

        // 10 reads with G at point 5, 10 reads with T; all share A at point 4
        let observations: Vec<Vec<PointObservation>> = (0..20)
            .map(|i| {
                let letter = if i % 2 == 0 { 2 } else { 3 };
                vec![
                    PointObservation::new(GlobalPoint::reference(4), 0, 30, false),
                    PointObservation::new(GlobalPoint::reference(5), letter, 30, false)
                ]
            })
            .collect();
        let reads: Vec<usize> = (0..20).collect();
        let table = EvidenceTable::aggregate(&observations, &reads);
        let branch_points = detector.detect(&table, &observations, &reads);
        assert_eq!(branch_points.len(), 1);
        assert_eq!(branch_points[0].point(), GlobalPoint::reference(5));
        assert_eq!(branch_points[0].letters(), &[2, 3]);
        assert_eq!(branch_points[0].supporting_reads()[0], (0..20).step_by(2).collect::<Vec<usize>>());
        assert_eq!(branch_points[0].supporting_reads()[1], (1..20).step_by(2).collect::<Vec<usize>>());

        // without sub-cloning there is nothing to detect
        let disabled = BranchDetector::new(&config, None, 20);
        assert!(disabled.detect(&table, &observations, &reads).is_empty());
    }
}
