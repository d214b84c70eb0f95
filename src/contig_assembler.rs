/*!
This module provides the ContigAssembler, which runs the full branching assembly for one clonotype.
The reads are projected onto the clonotype reference frame, evidence is aggregated per point, branch points are detected, the reads are partitioned into sub-populations, and each sub-population is called into a candidate contig that then faces the post-filter.

# Example usage
```rust
use clono_contig::aligned_read::{AlignedRead, ReadTarget, SegmentAlignment};
use clono_contig::assembler_config::AssemblerConfig;
use clono_contig::contig_assembler::ContigAssembler;
use clono_contig::reference_frame::{GeneType, ReferenceFrame};

let frame = ReferenceFrame::builder()
    .segment(GeneType::Variable, "V1", 20)
    .segment(GeneType::Joining, "J1", 20)
    .build()
    .unwrap();

// 20 reads over the full frame; half carry G at point 20 and half carry T
let molecule = b"ACGTACGTACGTACGTACGTCAGTCAGTCAGTCAGTCAGT".to_vec();
let reads: Vec<AlignedRead> = (0..20)
    .map(|i| {
        let mut sequence = molecule.clone();
        sequence[20] = if i % 2 == 0 { b'G' } else { b'T' };
        let alignments = vec![
            SegmentAlignment::ungapped(GeneType::Variable, 0, 0, 20),
            SegmentAlignment::ungapped(GeneType::Joining, 0, 20, 20)
        ];
        AlignedRead::single(ReadTarget::new(sequence, vec![30; 40], alignments).unwrap())
    })
    .collect();

let assembler = ContigAssembler::new(AssemblerConfig::default(), &frame).unwrap();
let result = assembler.assemble(&reads);
assert_eq!(result.branch_points().len(), 1);
assert_eq!(result.contigs().len(), 2);

// contigs are ordered by weight, then sequence, so the G contig comes first
assert_eq!(result.read_assignments()[0], Some(0));
assert_eq!(result.read_assignments()[1], Some(1));
```
*/

use log::debug;
use std::cmp::Reverse;
use std::ops::Range;

use crate::aligned_read::AlignedRead;
use crate::assembler_config::AssemblerConfig;
use crate::branch_detection::{BranchDetector, BranchPoint};
use crate::consensus_caller::{CandidateContig, ConsensusCaller};
use crate::point_evidence::EvidenceTable;
use crate::point_projection::{PointObservation, PointProjector};
use crate::post_filter::PostFilter;
use crate::read_partition::ReadPartitioner;
use crate::reference_frame::ReferenceFrame;

/// Contains the final result for one clonotype
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssembledContigs {
    /// The kept contigs, ordered by descending weight and then sequence
    contigs: Vec<CandidateContig>,
    /// For each input read, the index of the contig it was assigned to
    read_assignments: Vec<Option<usize>>,
    /// The branch points found across the whole clonotype
    branch_points: Vec<BranchPoint>
}

impl AssembledContigs {
    /// General constructor for AssembledContigs.
    /// Of note, this will re-order the contigs by descending weight and then sequence, allowing for predictable outputs.
    /// This re-ordering will alter the read_assignments to match the new order.
    /// # Arguments
    /// * `contigs` - the kept contigs
    /// * `read_assignments` - for each read, the index into `contigs` it belongs to
    /// * `branch_points` - the branch points of the clonotype
    pub fn new(mut contigs: Vec<CandidateContig>, read_assignments: Vec<Option<usize>>, branch_points: Vec<BranchPoint>) -> AssembledContigs {
        // sort the contigs
        let sort_key = |c: &CandidateContig| (Reverse(c.weight()), c.sequence());
        let mut ordered_indices = (0..contigs.len()).collect::<Vec<usize>>();
        ordered_indices.sort_by_cached_key(|&i| sort_key(&contigs[i]));

        // now create the reverse lookup table
        let mut reverse_lookup = vec![usize::MAX; contigs.len()];
        for (new_index, &old_index) in ordered_indices.iter().enumerate() {
            reverse_lookup[old_index] = new_index;
        }

        contigs.sort_by_cached_key(sort_key);

        // re-map the read assignments
        let read_assignments: Vec<Option<usize>> = read_assignments.iter()
            .map(|a| a.map(|ci| reverse_lookup[ci]))
            .collect();

        AssembledContigs {
            contigs,
            read_assignments,
            branch_points
        }
    }

    /// A result with no contigs where every read is unassigned
    pub fn empty(num_reads: usize) -> AssembledContigs {
        AssembledContigs {
            contigs: vec![],
            read_assignments: vec![None; num_reads],
            branch_points: vec![]
        }
    }

    // Getters
    pub fn contigs(&self) -> &[CandidateContig] {
        &self.contigs
    }

    pub fn read_assignments(&self) -> &[Option<usize>] {
        &self.read_assignments
    }

    pub fn branch_points(&self) -> &[BranchPoint] {
        &self.branch_points
    }
}

/// Assembles the reads of one clonotype against its reference frame
#[derive(Debug)]
pub struct ContigAssembler<'a> {
    config: AssemblerConfig,
    projector: PointProjector<'a>,
    /// Resolved sub-cloning ranges, None disables branching
    sub_cloning_ranges: Option<Vec<Range<i64>>>,
    post_filter: PostFilter
}

impl<'a> ContigAssembler<'a> {
    /// Creates a new assembler, resolving every configured feature against `frame`.
    /// # Arguments
    /// * `config` - the assembly parameters
    /// * `frame` - the clonotype reference frame
    /// # Errors
    /// * if the config fails validation
    /// * if any configured feature cannot be resolved against the frame
    pub fn new(config: AssemblerConfig, frame: &'a ReferenceFrame) -> Result<ContigAssembler<'a>, Box<dyn std::error::Error>> {
        config.validate()?;
        let projector = PointProjector::new(frame, &config)?;
        let sub_cloning_ranges = match config.sub_cloning_regions.as_ref() {
            Some(features) => Some(frame.resolve_features(features)?),
            None => None
        };
        let post_filter = PostFilter::new(&config, frame)?;
        Ok(ContigAssembler {
            config,
            projector,
            sub_cloning_ranges,
            post_filter
        })
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Runs the full assembly.
    /// Degenerate input (no reads, or no read reaching the assembling regions) gives an empty result.
    /// # Arguments
    /// * `reads` - every read of the clonotype; each read has a weight of 1
    pub fn assemble(&self, reads: &[AlignedRead]) -> AssembledContigs {
        let observations: Vec<Vec<PointObservation>> = reads.iter()
            .map(|r| self.projector.project(r))
            .collect();
        let covered: Vec<usize> = (0..reads.len())
            .filter(|&i| !observations[i].is_empty())
            .collect();
        if covered.is_empty() {
            debug!("No evidence from {} reads, nothing to assemble", reads.len());
            return AssembledContigs::empty(reads.len());
        }

        let total_read_weight = reads.len();
        let table = EvidenceTable::aggregate(&observations, &covered);
        debug!("Aggregated {} points from {} of {} reads", table.len(), covered.len(), reads.len());

        let detector = BranchDetector::new(&self.config, self.sub_cloning_ranges.clone(), total_read_weight);
        let branch_points = detector.detect(&table, &observations, &covered);
        let partition = ReadPartitioner::new(&detector)
            .partition(&branch_points, &observations, &table, &covered);

        let partitioned_reads: usize = partition.sub_populations().iter()
            .map(|s| s.reads().len())
            .sum();
        let caller = ConsensusCaller::new(&self.config, total_read_weight);
        let candidates: Vec<CandidateContig> = partition.sub_populations().iter()
            .map(|s| caller.call(s, &observations, partitioned_reads))
            .collect();

        let num_candidates = candidates.len();
        let (kept, dropped) = self.post_filter.apply(candidates);
        debug!("Kept {} of {} candidate contigs ({} dropped)", kept.len(), num_candidates, dropped.len());

        let mut read_assignments: Vec<Option<usize>> = vec![None; reads.len()];
        for (contig_index, contig) in kept.iter().enumerate() {
            for &read_index in contig.read_indices().iter() {
                read_assignments[read_index] = Some(contig_index);
            }
        }

        AssembledContigs::new(kept, read_assignments, branch_points)
    }
}
