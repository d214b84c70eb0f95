/*!
Calls the contig sequence of one sub-population from its own evidence.
Points chosen at branch points keep their chosen letter; every other point is called by the highest quality letter, replaced by the ambiguity code when the output thresholds are not met, or left out entirely when the point has too little quality for the clonotype.
A sub-population whose reads leave reference positions uncovered gives a contig of several blocks, one per contiguous stretch.
Each block loses its untrusted (edge dominated) ends, is quality trimmed, and is dropped if it ends up shorter than the minimal contig length.

# Example usage
```rust
use clono_contig::assembler_config::AssemblerConfig;
use clono_contig::consensus_caller::{ConsensusCaller, AMBIGUITY_CODE};
use clono_contig::point_evidence::PointEvidence;
use clono_contig::point_projection::{GlobalPoint, PointObservation};

let caller = ConsensusCaller::new(&AssemblerConfig::default(), 10);
let point = GlobalPoint::reference(0);

// 10 reads agree on C
let mut evidence = PointEvidence::default();
for _ in 0..10 {
    evidence.add(&PointObservation::new(point, 1, 30, false));
}
assert_eq!(caller.call_point(&evidence), Some((b'C', 50)));

// 1 read at quality 40 passes the mean normalized quality of 3 x 10 reads, but not the output sum of 50
let mut weak = PointEvidence::default();
weak.add(&PointObservation::new(point, 1, 40, false));
assert_eq!(caller.call_point(&weak), Some((AMBIGUITY_CODE, 0)));
```
*/

use log::{debug, trace};
use rustc_hash::FxHashMap as HashMap;
use std::ops::Range;

use crate::assembler_config::AssemblerConfig;
use crate::point_evidence::{EvidenceTable, PointEvidence, NUCLEOTIDES};
use crate::point_projection::{GlobalPoint, PointObservation};
use crate::quality_trimmer::QualityTrimmer;
use crate::read_partition::SubPopulation;

/// Symbol written where no letter meets the output thresholds
pub const AMBIGUITY_CODE: u8 = b'N';
/// Upper bound on the phred quality of a called base
pub const MAX_CALLED_QUALITY: u8 = 50;
/// Absorbs floating point error before truncating a phred value
const PHRED_TOLERANCE: f64 = 1e-9;

/// True if `next` directly follows `previous` with no reference base missing in between
fn is_contiguous(previous: GlobalPoint, next: GlobalPoint) -> bool {
    if next.is_insertion() {
        next.position() == previous.position()
    } else {
        next.position() == previous.position() + 1
    }
}

/// Splits bases ordered by point into runs with no missing reference base
fn contiguous_blocks(bases: &[CalledBase]) -> Vec<Range<usize>> {
    let mut blocks: Vec<Range<usize>> = vec![];
    for (i, base) in bases.iter().enumerate() {
        match blocks.last_mut() {
            Some(last) if is_contiguous(bases[i - 1].point, base.point) => last.end = i + 1,
            _ => blocks.push(i..i + 1)
        };
    }
    blocks
}

/// One base of a contig
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CalledBase {
    point: GlobalPoint,
    /// ASCII base or `AMBIGUITY_CODE`
    base: u8,
    quality: u8,
    /// True if enough of the evidence came from away from read edges
    trusted: bool
}

impl CalledBase {
    pub fn new(point: GlobalPoint, base: u8, quality: u8, trusted: bool) -> CalledBase {
        CalledBase {
            point,
            base,
            quality,
            trusted
        }
    }

    // Getters
    pub fn point(&self) -> GlobalPoint {
        self.point
    }

    pub fn base(&self) -> u8 {
        self.base
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    pub fn is_ambiguous(&self) -> bool {
        self.base == AMBIGUITY_CODE
    }
}

/// An assembled sequence from one sub-population
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateContig {
    /// Called bases, ordered by point
    bases: Vec<CalledBase>,
    /// The reads of the originating sub-population
    read_indices: Vec<usize>,
    /// The fraction of all partitioned reads that belong to this contig
    fraction: f64,
    /// The branch point letters defining the sub-population, as ASCII
    branch_choices: Vec<(GlobalPoint, u8)>
}

impl CandidateContig {
    /// General constructor
    /// # Arguments
    /// * `bases` - called bases ordered by point
    /// * `read_indices` - the contributing reads
    /// * `fraction` - the contig share of the partitioned reads
    /// * `branch_choices` - the defining branch point letters
    pub fn new(bases: Vec<CalledBase>, read_indices: Vec<usize>, fraction: f64, branch_choices: Vec<(GlobalPoint, u8)>) -> CandidateContig {
        CandidateContig {
            bases,
            read_indices,
            fraction,
            branch_choices
        }
    }

    // Getters
    pub fn bases(&self) -> &[CalledBase] {
        &self.bases
    }

    pub fn read_indices(&self) -> &[usize] {
        &self.read_indices
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn branch_choices(&self) -> &[(GlobalPoint, u8)] {
        &self.branch_choices
    }

    /// The read weight of the contig
    pub fn weight(&self) -> usize {
        self.read_indices.len()
    }

    /// Every called base including ambiguity codes, with the blocks concatenated.
    /// Use `sequences` when the contig has more than one block.
    pub fn sequence(&self) -> Vec<u8> {
        self.bases.iter().map(|b| b.base).collect()
    }

    /// Index ranges into `bases` of the contiguous blocks, each one a separate stretch of the molecule
    pub fn blocks(&self) -> Vec<Range<usize>> {
        contiguous_blocks(&self.bases)
    }

    /// The called sequence of each block, aligned with `regions`
    pub fn sequences(&self) -> Vec<Vec<u8>> {
        self.blocks().into_iter()
            .map(|block| self.bases[block].iter().map(|b| b.base).collect())
            .collect()
    }

    pub fn qualities(&self) -> Vec<u8> {
        self.bases.iter().map(|b| b.quality).collect()
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn ambiguous_count(&self) -> usize {
        self.bases.iter().filter(|b| b.is_ambiguous()).count()
    }

    /// Fraction of bases that are trusted, 0.0 for an empty contig
    pub fn trusted_fraction(&self) -> f64 {
        if self.bases.is_empty() {
            0.0
        } else {
            self.bases.iter().filter(|b| b.trusted).count() as f64 / self.bases.len() as f64
        }
    }

    /// The global reference range of each block, aligned with `sequences`
    pub fn regions(&self) -> Vec<Range<i64>> {
        self.blocks().into_iter()
            .map(|block| {
                let first = self.bases[block.start].point;
                let last = self.bases[block.end - 1].point;
                // a leading insertion sits after its anchor base
                let start = if first.is_insertion() { first.position() + 1 } else { first.position() };
                start..(last.position() + 1).max(start)
            })
            .collect()
    }

    /// True if every reference position of `range` is called (ambiguity codes included)
    pub fn covers(&self, range: &Range<i64>) -> bool {
        let called = self.bases.iter()
            .filter(|b| !b.point.is_insertion() && range.contains(&b.point.position()))
            .count();
        called as i64 == range.end - range.start
    }

    /// True if `range` is covered and nothing inside it is an ambiguity code
    pub fn covers_unambiguously(&self, range: &Range<i64>) -> bool {
        self.covers(range) &&
            !self.bases.iter().any(|b| range.contains(&b.point.position()) && b.is_ambiguous())
    }
}

/// Applies the output thresholds to sub-population evidence
#[derive(Clone, Debug)]
pub struct ConsensusCaller {
    /// minimal mean normalized quality times the clonotype read weight
    required_minimal_sum_quality: f64,
    output_minimal_quality_share: f64,
    output_minimal_sum_quality: u64,
    decisive_sum_quality: u64,
    minimal_non_edge_fraction: f64,
    minimal_contig_length: usize,
    trimmer: Option<QualityTrimmer>
}

impl ConsensusCaller {
    /// Creates a caller for one clonotype.
    /// # Arguments
    /// * `config` - the output thresholds and trimming parameters
    /// * `total_read_weight` - the read weight of the whole clonotype
    pub fn new(config: &AssemblerConfig, total_read_weight: usize) -> ConsensusCaller {
        ConsensusCaller {
            required_minimal_sum_quality: config.minimal_mean_normalized_quality * total_read_weight as f64,
            output_minimal_quality_share: config.output_minimal_quality_share,
            output_minimal_sum_quality: config.output_minimal_sum_quality,
            decisive_sum_quality: config.decisive_branching_sum_quality_threshold,
            minimal_non_edge_fraction: config.minimal_non_edge_points_fraction,
            minimal_contig_length: config.minimal_contig_length,
            trimmer: config.trimming.as_ref().map(QualityTrimmer::from)
        }
    }

    /// Calls a single non-branch point.
    /// Returns the ASCII base and its quality, or None if the point should not be part of the contig.
    pub fn call_point(&self, evidence: &PointEvidence) -> Option<(u8, u8)> {
        let best = evidence.best_letter()?;
        if (evidence.total_quality() as f64) < self.required_minimal_sum_quality {
            return None;
        }

        let best_sum = evidence.letter(best).quality_sum();
        if best_sum < self.decisive_sum_quality &&
            (evidence.quality_share(best) < self.output_minimal_quality_share || best_sum < self.output_minimal_sum_quality) {
            return Some((AMBIGUITY_CODE, 0));
        }
        Some((NUCLEOTIDES[best as usize], Self::phred_quality(evidence, best)))
    }

    /// Phred scaled confidence of `letter`, bounded by its quality sum and `MAX_CALLED_QUALITY`.
    /// Fractional values are truncated.
    pub fn phred_quality(evidence: &PointEvidence, letter: u8) -> u8 {
        let letter_sum = evidence.letter(letter).quality_sum() as f64;
        let error_probability = 1.0 - evidence.quality_share(letter);
        let quality = if error_probability <= 0.0 {
            letter_sum
        } else {
            (-10.0 * error_probability.log10()).min(letter_sum)
        };
        (quality.min(MAX_CALLED_QUALITY as f64).max(0.0) + PHRED_TOLERANCE).floor() as u8
    }

    /// Builds the contig of one sub-population.
    /// # Arguments
    /// * `sub_population` - the reads and branch choices
    /// * `observations` - projected observations for every read of the clonotype
    /// * `partitioned_reads` - the number of reads across all sub-populations, used for the contig fraction
    pub fn call(&self, sub_population: &SubPopulation, observations: &[Vec<PointObservation>], partitioned_reads: usize) -> CandidateContig {
        let table = EvidenceTable::aggregate(observations, sub_population.reads());
        let choices: HashMap<GlobalPoint, u8> = sub_population.choices().iter().copied().collect();

        let called: Vec<CalledBase> = table.iter()
            .filter_map(|(point, evidence)| {
                let (base, quality) = match choices.get(point) {
                    Some(&letter) => (NUCLEOTIDES[letter as usize], Self::phred_quality(evidence, letter)),
                    None => self.call_point(evidence)?
                };
                let trusted = evidence.non_edge_fraction() >= self.minimal_non_edge_fraction;
                Some(CalledBase::new(*point, base, quality, trusted))
            })
            .collect();

        let mut bases: Vec<CalledBase> = Vec::with_capacity(called.len());
        for block in contiguous_blocks(&called) {
            let offset = block.start;
            match self.clean_block(&called[block]) {
                Some(kept) if kept.len() >= self.minimal_contig_length => {
                    bases.extend_from_slice(&called[offset + kept.start..offset + kept.end]);
                },
                Some(kept) => trace!("Dropping block at {:?}, {} bases is below the minimal length", called[offset].point, kept.len()),
                None => trace!("Dropping block at {:?}, nothing trusted survives trimming", called[offset].point)
            };
        }

        let fraction = if partitioned_reads == 0 {
            0.0
        } else {
            sub_population.reads().len() as f64 / partitioned_reads as f64
        };
        let branch_choices: Vec<(GlobalPoint, u8)> = sub_population.choices().iter()
            .map(|&(point, letter)| (point, NUCLEOTIDES[letter as usize]))
            .collect();
        debug!("Called contig of length {} from {} reads ({} points evaluated)", bases.len(), sub_population.reads().len(), table.len());

        CandidateContig::new(bases, sub_population.reads().to_vec(), fraction, branch_choices)
    }

    /// Strips the untrusted ends of one block and trims it, returning the kept range within the block
    fn clean_block(&self, block: &[CalledBase]) -> Option<Range<usize>> {
        // ends that only edge evidence reaches are not confidently extended
        let first_trusted = block.iter().position(|b| b.trusted)?;
        let last_trusted = block.iter().rposition(|b| b.trusted)? + 1;
        let kept = match self.trimmer.as_ref() {
            Some(trimmer) => {
                let qualities: Vec<u8> = block[first_trusted..last_trusted].iter().map(|b| b.quality).collect();
                let trimmed = trimmer.trim_range(&qualities)?;
                first_trusted + trimmed.start..first_trusted + trimmed.end
            },
            None => first_trusted..last_trusted
        };

        if block[kept.clone()].iter().any(|b| !b.point.is_insertion()) {
            Some(kept)
        } else {
            None
        }
    }
}
