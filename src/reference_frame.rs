/*!
Contains the shared coordinate system for a clonotype.
All gene segments of the clonotype (and any unaligned spacer between them, such as non-templated junction nucleotides) are laid out left-to-right on one integer axis.
Every read base of the clonotype gets projected onto this axis, so reads covering different windows become directly comparable.

# Example usage
```rust
use clono_contig::reference_frame::{GeneFeature, GeneType, ReferenceFrame, ReferencePoint};

let frame = ReferenceFrame::builder()
    .segment(GeneType::Variable, "IGHV3-23", 300)
    .spacer(12)
    .segment(GeneType::Joining, "IGHJ4", 48)
    .build()
    .unwrap();

// V starts at 0, the spacer occupies 300..312, J starts at 312
assert_eq!(frame.global_position(GeneType::Joining, 0), Some(312));
assert_eq!(frame.resolve_feature(&GeneFeature::vdj_region()).unwrap(), 0..360);

// features that name missing genes are configuration errors
let c_start = GeneFeature::new("CStart", ReferencePoint::Begin(GeneType::Constant), ReferencePoint::Offset(GeneType::Constant, 10));
assert!(frame.resolve_feature(&c_start).is_err());
```
*/

use simple_error::{bail, SimpleError};
use std::ops::Range;

/// The gene segment types that can make up a clonotype frame, in their genomic order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GeneType {
    Variable,
    Diversity,
    Joining,
    Constant
}

impl GeneType {
    /// Single letter label, e.g. 'V'
    pub fn letter(&self) -> char {
        match self {
            GeneType::Variable => 'V',
            GeneType::Diversity => 'D',
            GeneType::Joining => 'J',
            GeneType::Constant => 'C'
        }
    }
}

/// A position inside one gene segment.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ReferencePoint {
    /// The first base of the segment
    Begin(GeneType),
    /// One past the last base of the segment
    End(GeneType),
    /// A zero-based offset into the segment; an offset equal to the segment length is the segment end
    Offset(GeneType, usize)
}

impl ReferencePoint {
    pub fn gene_type(&self) -> GeneType {
        match self {
            ReferencePoint::Begin(gt) |
            ReferencePoint::End(gt) |
            ReferencePoint::Offset(gt, _) => *gt
        }
    }
}

/// A named region of the reference, from `begin` (inclusive) to `end` (exclusive).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GeneFeature {
    name: String,
    begin: ReferencePoint,
    end: ReferencePoint
}

impl GeneFeature {
    /// General constructor
    /// # Arguments
    /// * `name` - a label used in logging and filtering decisions
    /// * `begin` - the first point of the feature
    /// * `end` - the point just past the feature
    pub fn new(name: &str, begin: ReferencePoint, end: ReferencePoint) -> GeneFeature {
        GeneFeature {
            name: name.to_string(),
            begin,
            end
        }
    }

    /// The full extent of a single gene segment, e.g. "VRegion"
    pub fn region(gene_type: GeneType) -> GeneFeature {
        GeneFeature::new(
            &format!("{}Region", gene_type.letter()),
            ReferencePoint::Begin(gene_type),
            ReferencePoint::End(gene_type)
        )
    }

    /// Everything from the start of V to the end of J
    pub fn vdj_region() -> GeneFeature {
        GeneFeature::new(
            "VDJRegion",
            ReferencePoint::Begin(GeneType::Variable),
            ReferencePoint::End(GeneType::Joining)
        )
    }

    // Getters
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn begin(&self) -> ReferencePoint {
        self.begin
    }

    pub fn end(&self) -> ReferencePoint {
        self.end
    }
}

/// One gene segment placed on the global axis
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSegment {
    gene_type: GeneType,
    gene_name: String,
    start: i64,
    length: usize
}

impl FrameSegment {
    // Getters
    pub fn gene_type(&self) -> GeneType {
        self.gene_type
    }

    pub fn gene_name(&self) -> &str {
        &self.gene_name
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Global coordinate one past the last base
    pub fn end(&self) -> i64 {
        self.start + self.length as i64
    }
}

/// The clonotype coordinate system.
/// It is immutable once built and can be shared between concurrently assembling clonotypes.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceFrame {
    segments: Vec<FrameSegment>
}

impl ReferenceFrame {
    /// Starts a new builder with the cursor at global coordinate 0
    pub fn builder() -> ReferenceFrameBuilder {
        ReferenceFrameBuilder::default()
    }

    /// Returns the segment for a gene type, if present in this frame
    pub fn segment(&self, gene_type: GeneType) -> Option<&FrameSegment> {
        self.segments.iter().find(|s| s.gene_type == gene_type)
    }

    pub fn segments(&self) -> &[FrameSegment] {
        &self.segments
    }

    /// Maps a segment-local offset onto the global axis.
    /// Returns None if the gene is absent or the offset is past the segment end.
    /// # Arguments
    /// * `gene_type` - the segment to look in
    /// * `local_offset` - zero-based offset, `length` is allowed and maps to the segment end
    pub fn global_position(&self, gene_type: GeneType, local_offset: usize) -> Option<i64> {
        let segment = self.segment(gene_type)?;
        if local_offset > segment.length {
            None
        } else {
            Some(segment.start + local_offset as i64)
        }
    }

    /// Resolves a reference point to its global coordinate.
    /// # Errors
    /// * if the gene is not part of this frame
    /// * if an explicit offset lies past the segment end
    pub fn resolve_point(&self, point: &ReferencePoint) -> Result<i64, SimpleError> {
        let gene_type = point.gene_type();
        let segment = match self.segment(gene_type) {
            Some(s) => s,
            None => bail!("Reference point {point:?} requires gene type {gene_type:?}, which is absent from the frame")
        };
        match point {
            ReferencePoint::Begin(_) => Ok(segment.start),
            ReferencePoint::End(_) => Ok(segment.end()),
            ReferencePoint::Offset(_, offset) => {
                if *offset > segment.length {
                    bail!("Reference point {point:?} is beyond the end of {} (length {})", segment.gene_name, segment.length);
                }
                Ok(segment.start + *offset as i64)
            }
        }
    }

    /// Resolves a feature to a half-open global range.
    /// # Errors
    /// * if either point cannot be resolved
    /// * if the feature resolves to an inverted range
    pub fn resolve_feature(&self, feature: &GeneFeature) -> Result<Range<i64>, SimpleError> {
        let begin = self.resolve_point(&feature.begin)?;
        let end = self.resolve_point(&feature.end)?;
        if end < begin {
            bail!("Feature {} resolves to an inverted range {begin}..{end}", feature.name);
        }
        Ok(begin..end)
    }

    /// Resolves a set of features into sorted, non-overlapping global ranges.
    /// Touching or overlapping ranges are merged.
    /// # Errors
    /// * if any feature fails to resolve
    pub fn resolve_features(&self, features: &[GeneFeature]) -> Result<Vec<Range<i64>>, SimpleError> {
        let mut ranges: Vec<Range<i64>> = features.iter()
            .map(|f| self.resolve_feature(f))
            .collect::<Result<_, _>>()?;
        ranges.sort_by_key(|r| (r.start, r.end));

        let mut merged: Vec<Range<i64>> = Vec::with_capacity(ranges.len());
        for range in ranges.into_iter().filter(|r| !r.is_empty()) {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => {
                    last.end = last.end.max(range.end);
                },
                _ => merged.push(range)
            }
        }
        Ok(merged)
    }

    /// Global range from the first segment start to the last segment end
    pub fn span(&self) -> Range<i64> {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => first.start..last.end(),
            _ => 0..0
        }
    }
}

/// Incremental constructor for a ReferenceFrame.
/// Segments and spacers are placed left to right starting at coordinate 0.
#[derive(Debug, Default)]
pub struct ReferenceFrameBuilder {
    segments: Vec<FrameSegment>,
    cursor: i64
}

impl ReferenceFrameBuilder {
    /// Appends a gene segment at the current cursor
    /// # Arguments
    /// * `gene_type` - the type of the segment
    /// * `gene_name` - the gene (allele) name, informational
    /// * `length` - the number of reference bases in the segment
    pub fn segment(mut self, gene_type: GeneType, gene_name: &str, length: usize) -> Self {
        self.segments.push(FrameSegment {
            gene_type,
            gene_name: gene_name.to_string(),
            start: self.cursor,
            length
        });
        self.cursor += length as i64;
        self
    }

    /// Advances the cursor without adding a segment, e.g. for non-templated junction bases
    pub fn spacer(mut self, length: usize) -> Self {
        self.cursor += length as i64;
        self
    }

    /// Finalizes the frame.
    /// # Errors
    /// * if no segments were added
    /// * if a gene type is repeated or segments are not in V, D, J, C order
    pub fn build(self) -> Result<ReferenceFrame, Box<dyn std::error::Error>> {
        if self.segments.is_empty() {
            bail!("A reference frame requires at least one gene segment");
        }
        for pair in self.segments.windows(2) {
            if pair[0].gene_type >= pair[1].gene_type {
                bail!("Frame segments must be unique and ordered V, D, J, C; found {:?} before {:?}", pair[0].gene_type, pair[1].gene_type);
            }
        }
        Ok(ReferenceFrame {
            segments: self.segments
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vjc_frame() -> ReferenceFrame {
        ReferenceFrame::builder()
            .segment(GeneType::Variable, "V1", 100)
            .spacer(10)
            .segment(GeneType::Joining, "J1", 40)
            .segment(GeneType::Constant, "C1", 60)
            .build()
            .unwrap()
    }

    #[test]
    fn test_layout() {
        let frame = vjc_frame();
        assert_eq!(frame.segment(GeneType::Variable).unwrap().start(), 0);
        assert_eq!(frame.segment(GeneType::Joining).unwrap().start(), 110);
        assert_eq!(frame.segment(GeneType::Constant).unwrap().start(), 150);
        assert_eq!(frame.span(), 0..210);
        assert!(frame.segment(GeneType::Diversity).is_none());
    }

    #[test]
    fn test_global_position() {
        let frame = vjc_frame();
        assert_eq!(frame.global_position(GeneType::Variable, 5), Some(5));
        assert_eq!(frame.global_position(GeneType::Joining, 40), Some(150));
        assert_eq!(frame.global_position(GeneType::Joining, 41), None);
        assert_eq!(frame.global_position(GeneType::Diversity, 0), None);
    }

    #[test]
    fn test_resolve_features() {
        let frame = vjc_frame();
        assert_eq!(frame.resolve_feature(&GeneFeature::region(GeneType::Joining)).unwrap(), 110..150);
        assert_eq!(frame.resolve_feature(&GeneFeature::vdj_region()).unwrap(), 0..150);

        // J and C touch, so they merge; V stays separate because of the spacer
        let merged = frame.resolve_features(&[
            GeneFeature::region(GeneType::Constant),
            GeneFeature::region(GeneType::Variable),
            GeneFeature::region(GeneType::Joining)
        ]).unwrap();
        assert_eq!(merged, vec![0..100, 110..210]);
    }

    #[test]
    fn test_resolve_errors() {
        let frame = vjc_frame();
        assert!(frame.resolve_feature(&GeneFeature::region(GeneType::Diversity)).is_err());
        assert!(frame.resolve_point(&ReferencePoint::Offset(GeneType::Variable, 101)).is_err());

        let inverted = GeneFeature::new("Inverted", ReferencePoint::End(GeneType::Joining), ReferencePoint::Begin(GeneType::Variable));
        assert!(frame.resolve_feature(&inverted).is_err());
    }

    #[test]
    fn test_builder_errors() {
        assert!(ReferenceFrame::builder().build().is_err());
        assert!(ReferenceFrame::builder()
            .segment(GeneType::Joining, "J1", 40)
            .segment(GeneType::Variable, "V1", 100)
            .build()
            .is_err());
        assert!(ReferenceFrame::builder()
            .segment(GeneType::Variable, "V1", 100)
            .segment(GeneType::Variable, "V2", 100)
            .build()
            .is_err());
    }
}
