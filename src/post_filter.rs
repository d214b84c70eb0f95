/*!
Final acceptance policy for candidate contigs.
Every contig first passes a baseline check (minimal contig length and the trusted base fraction), then exactly one named policy decides whether it is kept.
Decisions are pure functions of the contig, so applying a filter twice gives the same result.

# Example usage
```rust
use clono_contig::assembler_config::AssemblerConfigBuilder;
use clono_contig::consensus_caller::{CalledBase, CandidateContig};
use clono_contig::point_projection::GlobalPoint;
use clono_contig::post_filter::{DropReason, FilterDecision, PostFilter, PostFiltering};
use clono_contig::reference_frame::{GeneType, ReferenceFrame};

let frame = ReferenceFrame::builder()
    .segment(GeneType::Variable, "V1", 60)
    .segment(GeneType::Joining, "J1", 40)
    .build()
    .unwrap();
let config = AssemblerConfigBuilder::default()
    .post_filtering(PostFiltering::MinimalContigLength(50))
    .build()
    .unwrap();
let filter = PostFilter::new(&config, &frame).unwrap();

let bases: Vec<CalledBase> = (0..40)
    .map(|p| CalledBase::new(GlobalPoint::reference(p), b'A', 40, true))
    .collect();
let contig = CandidateContig::new(bases, vec![0, 1, 2], 1.0, vec![]);
assert_eq!(filter.evaluate(&contig), FilterDecision::Drop(DropReason::BelowMinimalLength));
```
*/

use log::debug;
use simple_error::SimpleError;
use std::ops::Range;

use crate::assembler_config::AssemblerConfig;
use crate::consensus_caller::CandidateContig;
use crate::reference_frame::{GeneFeature, ReferenceFrame};

/// The named acceptance policies; exactly one is active per assembler
#[derive(Clone, Debug, Default, PartialEq)]
pub enum PostFiltering {
    /// Keep everything that passes the baseline
    #[default]
    NoFiltering,
    /// Keep contigs that call every position of the assembling regions
    OnlyFullyAssembled,
    /// Keep contigs that call every position of the assembling regions without ambiguity codes
    OnlyFullyDefined,
    /// Keep contigs that call every position of the given features
    OnlyCovering(Vec<GeneFeature>),
    /// Keep contigs that call every position of the given features without ambiguity codes
    OnlyUnambiguouslyCovering(Vec<GeneFeature>),
    /// Keep contigs with at least this many called bases
    MinimalContigLength(usize)
}

/// Why a contig was dropped
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropReason {
    /// Shorter than the assembler-wide minimal contig length
    TooShort,
    /// Too few bases backed by non-edge evidence
    Untrusted,
    /// A required region has uncalled positions
    NotCovering,
    /// A required region contains ambiguity codes
    Ambiguous,
    /// Shorter than the `MinimalContigLength` policy
    BelowMinimalLength
}

/// Terminal decision for one contig
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterDecision {
    Keep,
    Drop(DropReason)
}

/// The resolved form of a policy
#[derive(Clone, Debug, PartialEq)]
enum ResolvedPolicy {
    KeepAll,
    Covering(Vec<Range<i64>>),
    UnambiguouslyCovering(Vec<Range<i64>>),
    MinimalLength(usize)
}

/// A post-filtering policy resolved against one reference frame
#[derive(Clone, Debug)]
pub struct PostFilter {
    policy: ResolvedPolicy,
    minimal_contig_length: usize,
    minimal_trusted_fraction: f64
}

impl PostFilter {
    /// Resolves the configured policy.
    /// # Arguments
    /// * `config` - provides the policy, the minimal contig length, and the non-edge fraction
    /// * `frame` - the frame the policy features resolve against
    /// # Errors
    /// * if a full-assembly policy is set without assembling regions
    /// * if a feature cannot be resolved against the frame
    pub fn new(config: &AssemblerConfig, frame: &ReferenceFrame) -> Result<PostFilter, SimpleError> {
        let assembling = || -> Result<Vec<Range<i64>>, SimpleError> {
            match config.assembling_regions.as_ref() {
                Some(features) => frame.resolve_features(features),
                None => Err(SimpleError::new(format!("{:?} requires assembling regions", config.post_filtering)))
            }
        };
        let policy = match &config.post_filtering {
            PostFiltering::NoFiltering => ResolvedPolicy::KeepAll,
            PostFiltering::OnlyFullyAssembled => ResolvedPolicy::Covering(assembling()?),
            PostFiltering::OnlyFullyDefined => ResolvedPolicy::UnambiguouslyCovering(assembling()?),
            PostFiltering::OnlyCovering(features) => ResolvedPolicy::Covering(frame.resolve_features(features)?),
            PostFiltering::OnlyUnambiguouslyCovering(features) => ResolvedPolicy::UnambiguouslyCovering(frame.resolve_features(features)?),
            PostFiltering::MinimalContigLength(length) => ResolvedPolicy::MinimalLength(*length)
        };
        Ok(PostFilter {
            policy,
            minimal_contig_length: config.minimal_contig_length,
            minimal_trusted_fraction: config.minimal_non_edge_points_fraction
        })
    }

    /// Decides the fate of a single contig
    pub fn evaluate(&self, contig: &CandidateContig) -> FilterDecision {
        if contig.len() < self.minimal_contig_length || contig.is_empty() {
            return FilterDecision::Drop(DropReason::TooShort);
        }
        if contig.trusted_fraction() < self.minimal_trusted_fraction {
            return FilterDecision::Drop(DropReason::Untrusted);
        }

        match &self.policy {
            ResolvedPolicy::KeepAll => FilterDecision::Keep,
            ResolvedPolicy::Covering(ranges) => {
                if ranges.iter().all(|r| contig.covers(r)) {
                    FilterDecision::Keep
                } else {
                    FilterDecision::Drop(DropReason::NotCovering)
                }
            },
            ResolvedPolicy::UnambiguouslyCovering(ranges) => {
                if !ranges.iter().all(|r| contig.covers(r)) {
                    FilterDecision::Drop(DropReason::NotCovering)
                } else if !ranges.iter().all(|r| contig.covers_unambiguously(r)) {
                    FilterDecision::Drop(DropReason::Ambiguous)
                } else {
                    FilterDecision::Keep
                }
            },
            ResolvedPolicy::MinimalLength(length) => {
                if contig.len() >= *length {
                    FilterDecision::Keep
                } else {
                    FilterDecision::Drop(DropReason::BelowMinimalLength)
                }
            }
        }
    }

    /// Splits contigs into kept and dropped, preserving order
    pub fn apply(&self, contigs: Vec<CandidateContig>) -> (Vec<CandidateContig>, Vec<(CandidateContig, DropReason)>) {
        let mut kept = vec![];
        let mut dropped = vec![];
        for contig in contigs.into_iter() {
            match self.evaluate(&contig) {
                FilterDecision::Keep => kept.push(contig),
                FilterDecision::Drop(reason) => {
                    debug!("Dropping contig of length {} from {} reads: {reason:?}", contig.len(), contig.weight());
                    dropped.push((contig, reason));
                }
            };
        }
        (kept, dropped)
    }
}
