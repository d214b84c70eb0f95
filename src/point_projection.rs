/*!
Projects the bases of an aligned read onto the global points of a clonotype reference frame.
Aligned bases map through their segment alignment, inserted bases get a secondary insertion index after the preceding reference base, and deleted reference bases are simply skipped.
Unaligned flanks are extended linearly outwards unless the projector is restricted to aligned regions.

# Example usage
```rust
use clono_contig::aligned_read::{AlignedRead, ReadTarget, SegmentAlignment};
use clono_contig::assembler_config::AssemblerConfig;
use clono_contig::point_projection::{GlobalPoint, PointProjector};
use clono_contig::reference_frame::{GeneType, ReferenceFrame};

let frame = ReferenceFrame::builder()
    .segment(GeneType::Variable, "V1", 20)
    .segment(GeneType::Joining, "J1", 20)
    .build()
    .unwrap();
let projector = PointProjector::new(&frame, &AssemblerConfig::default()).unwrap();

// 4 bases aligned to J offset 2, plus one unaligned flank base on the left
let alignment = SegmentAlignment::ungapped(GeneType::Joining, 2, 1, 4);
let target = ReadTarget::new(b"TACGT".to_vec(), vec![30; 5], vec![alignment]).unwrap();
let observations = projector.project(&AlignedRead::single(target));
assert_eq!(observations.len(), 5);
assert_eq!(observations[0].point(), GlobalPoint::new(21, 0));
assert_eq!(observations[4].point(), GlobalPoint::new(25, 0));
```
*/

use log::trace;
use rustc_hash::FxHashMap as HashMap;
use simple_error::SimpleError;
use std::ops::Range;

use crate::aligned_read::{AlignedRead, AlignmentOp, ReadTarget, SegmentAlignment};
use crate::assembler_config::AssemblerConfig;
use crate::point_evidence::letter_index;
use crate::reference_frame::ReferenceFrame;

/// A coordinate on the global axis.
/// Reference bases have `insertion == 0`; the k-th base inserted after reference position `p` is `(p, k)`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GlobalPoint {
    position: i64,
    insertion: u32
}

impl GlobalPoint {
    pub fn new(position: i64, insertion: u32) -> GlobalPoint {
        GlobalPoint {
            position,
            insertion
        }
    }

    /// A point on a reference base
    pub fn reference(position: i64) -> GlobalPoint {
        GlobalPoint::new(position, 0)
    }

    // Getters
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn insertion(&self) -> u32 {
        self.insertion
    }

    pub fn is_insertion(&self) -> bool {
        self.insertion > 0
    }
}

/// One read base placed on a global point
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PointObservation {
    point: GlobalPoint,
    /// Index into `NUCLEOTIDES`
    letter: u8,
    quality: u8,
    is_edge: bool
}

impl PointObservation {
    pub fn new(point: GlobalPoint, letter: u8, quality: u8, is_edge: bool) -> PointObservation {
        PointObservation {
            point,
            letter,
            quality,
            is_edge
        }
    }

    // Getters
    pub fn point(&self) -> GlobalPoint {
        self.point
    }

    pub fn letter(&self) -> u8 {
        self.letter
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn is_edge(&self) -> bool {
        self.is_edge
    }
}

/// Which ends of a target are close enough to an alignment boundary to be edges
struct EdgeMarks {
    left: bool,
    right: bool,
    read_len: usize,
    region_size: usize
}

impl EdgeMarks {
    fn is_edge(&self, read_pos: usize) -> bool {
        (self.left && read_pos < self.region_size) ||
            (self.right && self.read_len - 1 - read_pos < self.region_size)
    }
}

/// Maps reads of one clonotype onto its reference frame
#[derive(Debug)]
pub struct PointProjector<'a> {
    frame: &'a ReferenceFrame,
    /// Merged global ranges that observations must fall in, None for unrestricted
    assembling_ranges: Option<Vec<Range<i64>>>,
    aligned_regions_only: bool,
    edge_delta: usize,
    edge_region_size: usize
}

impl<'a> PointProjector<'a> {
    /// Creates a projector for one frame.
    /// # Arguments
    /// * `frame` - the clonotype reference frame
    /// * `config` - provides the assembling regions, the aligned-only flag, and the edge parameters
    /// # Errors
    /// * if an assembling region cannot be resolved against the frame
    pub fn new(frame: &'a ReferenceFrame, config: &AssemblerConfig) -> Result<PointProjector<'a>, SimpleError> {
        let assembling_ranges = match config.assembling_regions.as_ref() {
            Some(features) => Some(frame.resolve_features(features)?),
            None => None
        };
        Ok(PointProjector {
            frame,
            assembling_ranges,
            aligned_regions_only: config.aligned_regions_only,
            edge_delta: config.aligned_sequence_edge_delta,
            edge_region_size: config.alignment_edge_region_size
        })
    }

    pub fn assembling_ranges(&self) -> Option<&[Range<i64>]> {
        self.assembling_ranges.as_deref()
    }

    /// Projects every base of a read, returning at most one observation per global point sorted by point.
    /// When several targets reach the same point, the highest quality observation wins.
    /// Bases that are not A, C, G, or T produce no observation.
    pub fn project(&self, read: &AlignedRead) -> Vec<PointObservation> {
        let mut best: HashMap<GlobalPoint, PointObservation> = Default::default();
        for target in read.targets().iter() {
            self.project_target(target, &mut best);
        }

        let mut observations: Vec<PointObservation> = best.into_values().collect();
        observations.sort_unstable_by_key(|o| o.point);
        observations
    }

    fn project_target(&self, target: &ReadTarget, best: &mut HashMap<GlobalPoint, PointObservation>) {
        // keep only the alignments that fit inside a segment of this frame, paired with that segment start
        let placed: Vec<(&SegmentAlignment, i64)> = target.alignments().iter()
            .filter_map(|alignment| {
                let segment = match self.frame.segment(alignment.gene_type()) {
                    Some(s) => s,
                    None => {
                        trace!("Skipping alignment to {:?}, segment is absent from the frame", alignment.gene_type());
                        return None;
                    }
                };
                if alignment.reference_end() > segment.length() {
                    trace!("Skipping alignment to {:?} ending at {} past the segment length {}", alignment.gene_type(), alignment.reference_end(), segment.length());
                    return None;
                }
                Some((alignment, segment.start()))
            })
            .collect();

        let (first, first_start) = match placed.first() {
            Some(&p) => p,
            None => return
        };
        let (last, last_start) = placed[placed.len() - 1];

        let read_len = target.len();
        let span_start = first.read_start();
        let span_end = last.read_end();
        let edges = EdgeMarks {
            left: span_start < self.edge_delta,
            right: read_len - span_end < self.edge_delta,
            read_len,
            region_size: self.edge_region_size
        };

        // aligned stretches
        for &(alignment, segment_start) in placed.iter() {
            let mut reference_pos = segment_start + alignment.reference_start() as i64;
            let mut read_pos = alignment.read_start();
            // inserted bases since the last reference base, shared by back-to-back insertion ops
            let mut inserted: u32 = 0;
            for op in alignment.ops().iter() {
                match *op {
                    AlignmentOp::Match(l) => {
                        for i in 0..l {
                            self.observe(target, read_pos + i, GlobalPoint::reference(reference_pos + i as i64), &edges, best);
                        }
                        reference_pos += l as i64;
                        read_pos += l;
                        inserted = 0;
                    },
                    AlignmentOp::Insertion(l) => {
                        // inserted bases hang off the previous reference base
                        for k in 0..l {
                            inserted += 1;
                            self.observe(target, read_pos + k, GlobalPoint::new(reference_pos - 1, inserted), &edges, best);
                        }
                        read_pos += l;
                    },
                    AlignmentOp::Deletion(l) => {
                        reference_pos += l as i64;
                        inserted = 0;
                    }
                };
            }
        }

        // bases between alignments, only when the read gap matches the frame gap
        for pair in placed.windows(2) {
            let (left, left_start) = pair[0];
            let (right, right_start) = pair[1];
            let read_gap = right.read_start() - left.read_end();
            let anchor = left_start + left.reference_end() as i64;
            let frame_gap = right_start + right.reference_start() as i64 - anchor;
            if read_gap as i64 == frame_gap {
                for (i, read_pos) in (left.read_end()..right.read_start()).enumerate() {
                    self.observe(target, read_pos, GlobalPoint::reference(anchor + i as i64), &edges, best);
                }
            } else {
                trace!("Skipping {read_gap} unaligned bases between {:?} and {:?}, frame gap is {frame_gap}", left.gene_type(), right.gene_type());
            }
        }

        if !self.aligned_regions_only {
            let left_anchor = first_start + first.reference_start() as i64;
            for read_pos in 0..span_start {
                let offset = (span_start - read_pos) as i64;
                self.observe(target, read_pos, GlobalPoint::reference(left_anchor - offset), &edges, best);
            }

            let right_anchor = last_start + last.reference_end() as i64;
            for read_pos in span_end..read_len {
                let offset = (read_pos - span_end) as i64;
                self.observe(target, read_pos, GlobalPoint::reference(right_anchor + offset), &edges, best);
            }
        }
    }

    fn observe(&self, target: &ReadTarget, read_pos: usize, point: GlobalPoint, edges: &EdgeMarks, best: &mut HashMap<GlobalPoint, PointObservation>) {
        if let Some(ranges) = self.assembling_ranges.as_ref() {
            if !ranges.iter().any(|r| r.contains(&point.position)) {
                return;
            }
        }

        let letter = match letter_index(target.sequence()[read_pos]) {
            Some(l) => l,
            None => return
        };
        let observation = PointObservation::new(point, letter, target.qualities()[read_pos], edges.is_edge(read_pos));
        best.entry(point)
            .and_modify(|existing| {
                if observation.quality > existing.quality {
                    *existing = observation;
                }
            })
            .or_insert(observation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::assembler_config::AssemblerConfigBuilder;
    use crate::reference_frame::{GeneFeature, GeneType};

    fn frame() -> ReferenceFrame {
        ReferenceFrame::builder()
            .segment(GeneType::Variable, "V1", 30)
            .spacer(4)
            .segment(GeneType::Joining, "J1", 30)
            .build()
            .unwrap()
    }

    fn no_edges() -> AssemblerConfig {
        AssemblerConfigBuilder::default()
            .alignment_edge_region_size(0)
            .build()
            .unwrap()
    }

    fn positions(observations: &[PointObservation]) -> Vec<(i64, u32)> {
        observations.iter().map(|o| (o.point().position(), o.point().insertion())).collect()
    }

    #[test]
    fn test_indels() {
        let frame = frame();
        let config = no_edges();
        let projector = PointProjector::new(&frame, &config).unwrap();

        // V offsets 10..16 with a 2 base deletion and a 1 base insertion
        let alignment = SegmentAlignment::new(
            GeneType::Variable, 10, 0,
            vec![AlignmentOp::Match(2), AlignmentOp::Deletion(2), AlignmentOp::Match(1), AlignmentOp::Insertion(1), AlignmentOp::Match(1)]
        );
        let target = ReadTarget::new(b"ACGTA".to_vec(), vec![30; 5], vec![alignment]).unwrap();
        let observations = PointProjector::new(&frame, &AssemblerConfigBuilder::default().aligned_regions_only(true).alignment_edge_region_size(0).build().unwrap())
            .unwrap()
            .project(&AlignedRead::single(target.clone()));
        assert_eq!(positions(&observations), vec![(10, 0), (11, 0), (14, 0), (14, 1), (15, 0)]);
        assert_eq!(observations.iter().map(|o| o.letter()).collect::<Vec<u8>>(), vec![0, 1, 2, 3, 0]);

        // the same read with flanks enabled has no flanks to add
        assert_eq!(projector.project(&AlignedRead::single(target)).len(), 5);
    }

    #[test]
    fn test_split_insertions() {
        let frame = frame();
        let projector = PointProjector::new(&frame, &no_edges()).unwrap();

        // back-to-back insertion ops keep counting off the same reference base
        let alignment = SegmentAlignment::new(
            GeneType::Variable, 10, 0,
            vec![AlignmentOp::Match(2), AlignmentOp::Insertion(1), AlignmentOp::Insertion(2), AlignmentOp::Match(1)]
        );
        let target = ReadTarget::new(b"ACGTAC".to_vec(), vec![30; 6], vec![alignment]).unwrap();
        let observations = projector.project(&AlignedRead::single(target));
        assert_eq!(positions(&observations), vec![(10, 0), (11, 0), (11, 1), (11, 2), (11, 3), (12, 0)]);
        assert_eq!(observations.iter().map(|o| o.letter()).collect::<Vec<u8>>(), vec![0, 1, 2, 3, 0, 1]);

        // the count restarts after the next reference base
        let alignment = SegmentAlignment::new(
            GeneType::Variable, 10, 0,
            vec![AlignmentOp::Match(1), AlignmentOp::Insertion(1), AlignmentOp::Match(1), AlignmentOp::Insertion(1), AlignmentOp::Match(1)]
        );
        let target = ReadTarget::new(b"ACGTA".to_vec(), vec![30; 5], vec![alignment]).unwrap();
        let observations = projector.project(&AlignedRead::single(target));
        assert_eq!(positions(&observations), vec![(10, 0), (10, 1), (11, 0), (11, 1), (12, 0)]);
    }

    #[test]
    fn test_junction_and_flanks() {
        let frame = frame();
        let config = no_edges();
        let projector = PointProjector::new(&frame, &config).unwrap();

        // 1 flank base, V 27..30, 4 junction bases, J 0..3, 2 flank bases
        let v = SegmentAlignment::ungapped(GeneType::Variable, 27, 1, 3);
        let j = SegmentAlignment::ungapped(GeneType::Joining, 0, 8, 3);
        let target = ReadTarget::new(b"AAAACCCCGGGTT".to_vec(), vec![30; 13], vec![v.clone(), j.clone()]).unwrap();
        let observations = projector.project(&AlignedRead::single(target));
        let expected: Vec<(i64, u32)> = (26..39).map(|p| (p, 0)).collect();
        assert_eq!(positions(&observations), expected);

        // junction length disagrees with the frame, those bases get skipped
        let j_shifted = SegmentAlignment::ungapped(GeneType::Joining, 0, 7, 3);
        let target = ReadTarget::new(b"AAAACCCGGGTT".to_vec(), vec![30; 12], vec![v, j_shifted]).unwrap();
        let observations = projector.project(&AlignedRead::single(target));
        assert_eq!(observations.len(), 12 - 3);

        // aligned only drops the flanks but keeps the junction
        let aligned_only = AssemblerConfigBuilder::default()
            .aligned_regions_only(true)
            .build()
            .unwrap();
        let projector = PointProjector::new(&frame, &aligned_only).unwrap();
        let v = SegmentAlignment::ungapped(GeneType::Variable, 27, 1, 3);
        let target = ReadTarget::new(b"AAAACCCCGGGTT".to_vec(), vec![30; 13], vec![v, j]).unwrap();
        let observations = projector.project(&AlignedRead::single(target));
        let expected: Vec<(i64, u32)> = (27..37).map(|p| (p, 0)).collect();
        assert_eq!(positions(&observations), expected);
    }

    #[test]
    fn test_assembling_region() {
        let frame = frame();
        let config = AssemblerConfigBuilder::default()
            .assembling_regions(Some(vec![GeneFeature::region(GeneType::Joining)]))
            .build()
            .unwrap();
        let projector = PointProjector::new(&frame, &config).unwrap();

        let v = SegmentAlignment::ungapped(GeneType::Variable, 0, 0, 10);
        let target = ReadTarget::new(vec![b'A'; 10], vec![30; 10], vec![v]).unwrap();
        assert!(projector.project(&AlignedRead::single(target)).is_empty());

        let j = SegmentAlignment::ungapped(GeneType::Joining, 0, 0, 10);
        let target = ReadTarget::new(vec![b'A'; 10], vec![30; 10], vec![j]).unwrap();
        assert_eq!(projector.project(&AlignedRead::single(target)).len(), 10);

        // regions naming a missing gene fail at construction
        let config = AssemblerConfigBuilder::default()
            .assembling_regions(Some(vec![GeneFeature::region(GeneType::Constant)]))
            .build()
            .unwrap();
        assert!(PointProjector::new(&frame, &config).is_err());
    }

    #[test]
    fn test_edges() {
        let frame = frame();
        // defaults: delta 3, region 7
        let config = AssemblerConfig::default();
        let projector = PointProjector::new(&frame, &config).unwrap();

        // alignment covers the whole read, so both ends are edges
        let v = SegmentAlignment::ungapped(GeneType::Variable, 0, 0, 20);
        let target = ReadTarget::new(vec![b'C'; 20], vec![30; 20], vec![v]).unwrap();
        let observations = projector.project(&AlignedRead::single(target));
        let edge_flags: Vec<bool> = observations.iter().map(|o| o.is_edge()).collect();
        let mut expected = vec![true; 7];
        expected.extend(vec![false; 6]);
        expected.extend(vec![true; 7]);
        assert_eq!(edge_flags, expected);

        // alignment stops 5 bases short of the right end, only the left end is an edge
        let v = SegmentAlignment::ungapped(GeneType::Variable, 0, 0, 15);
        let target = ReadTarget::new(vec![b'C'; 20], vec![30; 20], vec![v]).unwrap();
        let observations = projector.project(&AlignedRead::single(target));
        assert_eq!(observations.iter().filter(|o| o.is_edge()).count(), 7);
    }

    #[test]
    fn test_mates_and_bad_bases() {
        let frame = frame();
        let config = no_edges();
        let projector = PointProjector::new(&frame, &config).unwrap();

        // overlapping mates, the higher quality base wins at the shared points
        let m1 = ReadTarget::new(b"ACGTN".to_vec(), vec![20; 5], vec![SegmentAlignment::ungapped(GeneType::Variable, 0, 0, 5)]).unwrap();
        let m2 = ReadTarget::new(b"TTAC".to_vec(), vec![35; 4], vec![SegmentAlignment::ungapped(GeneType::Variable, 2, 0, 4)]).unwrap();
        let read = AlignedRead::with_targets(vec![m1, m2]).unwrap();
        let observations = projector.project(&read);
        assert_eq!(positions(&observations), vec![(0, 0), (1, 0), (2, 0), (3, 0), (4, 0), (5, 0)]);
        let qualities: Vec<u8> = observations.iter().map(|o| o.quality()).collect();
        assert_eq!(qualities, vec![20, 20, 35, 35, 35, 35]);
        assert_eq!(observations[2].letter(), 3);

        // unplaced alignments contribute nothing
        let d = ReadTarget::new(b"ACGT".to_vec(), vec![30; 4], vec![SegmentAlignment::ungapped(GeneType::Diversity, 0, 0, 4)]).unwrap();
        assert!(projector.project(&AlignedRead::single(d)).is_empty());
        let past_end = ReadTarget::new(b"ACGT".to_vec(), vec![30; 4], vec![SegmentAlignment::ungapped(GeneType::Joining, 28, 0, 4)]).unwrap();
        assert!(projector.project(&AlignedRead::single(past_end)).is_empty());
    }
}
