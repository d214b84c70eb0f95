/*!
# clono_contig
This library assembles full-length contigs for a clonotype from reads already aligned against the clonotype's V, D, J, and C reference segments.

Key benefits:
* Splits a clonotype into sub-populations when reads reliably disagree inside the sub-cloning regions, producing one contig per sub-population
* Reads are linked across branch points, so variants far apart along the frame are phased together
* Every contig base carries a quality and a trust flag, with untrusted and low quality ends removed

Performance notes:
* Work scales with the number of projected points, which is roughly the total aligned read length
* The number of sub-populations per clonotype is capped, so many branch points reduce to following the strongest letters

# Example usage
```rust
use clono_contig::aligned_read::{AlignedRead, ReadTarget, SegmentAlignment};
use clono_contig::assembler_config::AssemblerConfig;
use clono_contig::contig_assembler::ContigAssembler;
use clono_contig::reference_frame::{GeneType, ReferenceFrame};

let frame = ReferenceFrame::builder()
    .segment(GeneType::Variable, "V1", 12)
    .segment(GeneType::Joining, "J1", 12)
    .build()
    .unwrap();

// ten identical full length reads
let reads: Vec<AlignedRead> = (0..10)
    .map(|_i| {
        let alignments = vec![
            SegmentAlignment::ungapped(GeneType::Variable, 0, 0, 12),
            SegmentAlignment::ungapped(GeneType::Joining, 0, 12, 12)
        ];
        AlignedRead::single(ReadTarget::new(b"ACGTTGCAACGTTGCAGGATCCTA".to_vec(), vec![30; 24], alignments).unwrap())
    })
    .collect();

// turn off edge marking so that every base is trusted
let mut config = AssemblerConfig::default();
config.alignment_edge_region_size = 0;

let assembler = ContigAssembler::new(config, &frame).unwrap();
let result = assembler.assemble(&reads);
assert_eq!(result.contigs().len(), 1);
assert_eq!(result.contigs()[0].sequence(), b"ACGTTGCAACGTTGCAGGATCCTA".to_vec());
assert!(result.read_assignments().iter().all(|&a| a == Some(0)));
```
*/

/// Read and alignment input types
pub mod aligned_read;
/// Configuration for ContigAssembler
pub mod assembler_config;
/// Parallel assembly of many clonotypes
pub mod batch_assembly;
/// Classification of points and detection of branch points
pub mod branch_detection;
/// Calls the consensus of a sub-population into a candidate contig
pub mod consensus_caller;
/// Main functionality for assembling one clonotype
pub mod contig_assembler;
/// Utility for generating examples
pub mod example_gen;
/// Per-point letter evidence
pub mod point_evidence;
/// Projection of read bases onto global points
pub mod point_projection;
/// Final filtering of candidate contigs
pub mod post_filter;
/// Sliding window end trimming
pub mod quality_trimmer;
/// Splits reads into sub-populations at branch points
pub mod read_partition;
/// The per-clonotype coordinate system
pub mod reference_frame;
