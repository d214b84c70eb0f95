/*!
Contains the read boundary type handed to the assembler by an upstream aligner.
A read is one or more targets (e.g. paired mates), each a sequence with per-base qualities and zero or more gene segment alignments.

# Example usage
```rust
use clono_contig::aligned_read::{AlignedRead, AlignmentOp, ReadTarget, SegmentAlignment};
use clono_contig::reference_frame::GeneType;

// 10 bases, the first 6 align to V at offset 94 with one inserted base
let alignment = SegmentAlignment::new(
    GeneType::Variable, 94, 0,
    vec![AlignmentOp::Match(3), AlignmentOp::Insertion(1), AlignmentOp::Match(2)]
);
assert_eq!(alignment.read_end(), 6);
assert_eq!(alignment.reference_end(), 99);

let target = ReadTarget::new(b"ACGTACGTAC".to_vec(), vec![30; 10], vec![alignment]).unwrap();
let read = AlignedRead::single(target);
assert_eq!(read.targets().len(), 1);
```
*/

use simple_error::bail;

use crate::reference_frame::GeneType;

/// One CIGAR-like operation of a segment alignment
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlignmentOp {
    /// Bases consumed on both the read and the reference, mismatches included
    Match(usize),
    /// Bases present in the read but not in the reference
    Insertion(usize),
    /// Reference bases missing from the read
    Deletion(usize)
}

/// The alignment of a stretch of a read to one gene segment
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SegmentAlignment {
    /// The segment aligned against
    gene_type: GeneType,
    /// Offset of the first aligned reference base, local to the segment
    reference_start: usize,
    /// Offset of the first aligned read base
    read_start: usize,
    /// Operations from left to right
    ops: Vec<AlignmentOp>
}

impl SegmentAlignment {
    /// General constructor
    /// # Arguments
    /// * `gene_type` - the aligned segment
    /// * `reference_start` - segment-local offset of the first aligned reference base
    /// * `read_start` - offset of the first aligned read base
    /// * `ops` - the alignment operations
    pub fn new(gene_type: GeneType, reference_start: usize, read_start: usize, ops: Vec<AlignmentOp>) -> SegmentAlignment {
        SegmentAlignment {
            gene_type,
            reference_start,
            read_start,
            ops
        }
    }

    /// Convenience constructor for an alignment without indels
    pub fn ungapped(gene_type: GeneType, reference_start: usize, read_start: usize, length: usize) -> SegmentAlignment {
        SegmentAlignment::new(gene_type, reference_start, read_start, vec![AlignmentOp::Match(length)])
    }

    // Getters
    pub fn gene_type(&self) -> GeneType {
        self.gene_type
    }

    pub fn reference_start(&self) -> usize {
        self.reference_start
    }

    pub fn read_start(&self) -> usize {
        self.read_start
    }

    pub fn ops(&self) -> &[AlignmentOp] {
        &self.ops
    }

    /// One past the last read base consumed by this alignment
    pub fn read_end(&self) -> usize {
        self.read_start + self.ops.iter()
            .map(|op| match op {
                AlignmentOp::Match(l) | AlignmentOp::Insertion(l) => *l,
                AlignmentOp::Deletion(_) => 0
            })
            .sum::<usize>()
    }

    /// One past the last reference base consumed by this alignment, local to the segment
    pub fn reference_end(&self) -> usize {
        self.reference_start + self.ops.iter()
            .map(|op| match op {
                AlignmentOp::Match(l) | AlignmentOp::Deletion(l) => *l,
                AlignmentOp::Insertion(_) => 0
            })
            .sum::<usize>()
    }
}

/// One physical sequence of a read
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadTarget {
    sequence: Vec<u8>,
    qualities: Vec<u8>,
    alignments: Vec<SegmentAlignment>
}

impl ReadTarget {
    /// Creates a target after checking that the alignments fit the sequence.
    /// # Arguments
    /// * `sequence` - the read bases
    /// * `qualities` - raw phred scores, one per base
    /// * `alignments` - segment alignments, ordered and non-overlapping on the read
    /// # Errors
    /// * if sequence and qualities differ in length
    /// * if an alignment extends past the read end
    /// * if alignments overlap or are out of order on the read
    pub fn new(sequence: Vec<u8>, qualities: Vec<u8>, alignments: Vec<SegmentAlignment>) -> Result<ReadTarget, Box<dyn std::error::Error>> {
        if sequence.len() != qualities.len() {
            bail!("Sequence length ({}) does not match quality length ({})", sequence.len(), qualities.len());
        }

        let mut previous_end = 0;
        for alignment in alignments.iter() {
            if alignment.read_start < previous_end {
                bail!("Alignments must be ordered and non-overlapping on the read, {:?} starts at {} before {}", alignment.gene_type, alignment.read_start, previous_end);
            }
            let read_end = alignment.read_end();
            if read_end > sequence.len() {
                bail!("Alignment to {:?} ends at {} past the read length {}", alignment.gene_type, read_end, sequence.len());
            }
            previous_end = read_end;
        }

        Ok(ReadTarget {
            sequence,
            qualities,
            alignments
        })
    }

    // Getters
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn qualities(&self) -> &[u8] {
        &self.qualities
    }

    pub fn alignments(&self) -> &[SegmentAlignment] {
        &self.alignments
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// A read made of one or more targets
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AlignedRead {
    targets: Vec<ReadTarget>
}

impl AlignedRead {
    /// A read with exactly one target
    pub fn single(target: ReadTarget) -> AlignedRead {
        AlignedRead {
            targets: vec![target]
        }
    }

    /// A read with several targets, e.g. paired mates
    /// # Errors
    /// * if `targets` is empty
    pub fn with_targets(targets: Vec<ReadTarget>) -> Result<AlignedRead, Box<dyn std::error::Error>> {
        if targets.is_empty() {
            bail!("An aligned read requires at least one target");
        }
        Ok(AlignedRead {
            targets
        })
    }

    pub fn targets(&self) -> &[ReadTarget] {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_ends() {
        let alignment = SegmentAlignment::new(
            GeneType::Joining, 5, 2,
            vec![AlignmentOp::Match(4), AlignmentOp::Deletion(2), AlignmentOp::Match(3), AlignmentOp::Insertion(1)]
        );
        assert_eq!(alignment.read_end(), 10);
        assert_eq!(alignment.reference_end(), 14);

        let ungapped = SegmentAlignment::ungapped(GeneType::Variable, 0, 0, 12);
        assert_eq!(ungapped.read_end(), 12);
        assert_eq!(ungapped.reference_end(), 12);
    }

    #[test]
    fn test_target_validation() {
        // mismatched qualities
        assert!(ReadTarget::new(b"ACGT".to_vec(), vec![30; 3], vec![]).is_err());

        // alignment past the end
        let too_long = SegmentAlignment::ungapped(GeneType::Variable, 0, 1, 4);
        assert!(ReadTarget::new(b"ACGT".to_vec(), vec![30; 4], vec![too_long]).is_err());

        // overlapping alignments
        let v = SegmentAlignment::ungapped(GeneType::Variable, 10, 0, 3);
        let j = SegmentAlignment::ungapped(GeneType::Joining, 0, 2, 2);
        assert!(ReadTarget::new(b"ACGT".to_vec(), vec![30; 4], vec![v, j]).is_err());

        // fine
        let v = SegmentAlignment::ungapped(GeneType::Variable, 10, 0, 2);
        let j = SegmentAlignment::ungapped(GeneType::Joining, 0, 2, 2);
        let target = ReadTarget::new(b"ACGT".to_vec(), vec![30; 4], vec![v, j]).unwrap();
        assert_eq!(target.len(), 4);
        assert_eq!(target.alignments().len(), 2);
    }

    #[test]
    fn test_read_targets() {
        assert!(AlignedRead::with_targets(vec![]).is_err());
        let t1 = ReadTarget::new(b"AC".to_vec(), vec![30; 2], vec![]).unwrap();
        let t2 = ReadTarget::new(b"GT".to_vec(), vec![30; 2], vec![]).unwrap();
        let read = AlignedRead::with_targets(vec![t1, t2]).unwrap();
        assert_eq!(read.targets()[1].sequence(), b"GT");
    }
}
