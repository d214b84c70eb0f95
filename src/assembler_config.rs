/*!
Contains configuration information for the branching contig assembler.
Typical usage is to the use the builder to construct the config, e.g.
```
use clono_contig::assembler_config::{AssemblerConfig, AssemblerConfigBuilder};
use clono_contig::post_filter::PostFiltering;
let config: AssemblerConfig = AssemblerConfigBuilder::default()
    .branching_minimal_sum_quality(60)
    .post_filtering(PostFiltering::MinimalContigLength(50))
    .build()
    .unwrap();
assert!(config.validate().is_ok());
```
*/

use simple_error::bail;

use crate::post_filter::PostFiltering;
use crate::reference_frame::GeneFeature;

/// Parameters for the sliding window quality trimmer applied to finished contigs.
#[derive(derive_builder::Builder, Clone, Debug, PartialEq)]
#[builder(default)]
pub struct TrimmingConfig {
    /// Windows with a mean quality below this value get trimmed from the contig ends
    pub average_quality_threshold: f32,
    /// Number of bases in each window
    pub window_size: usize
}

impl Default for TrimmingConfig {
    fn default() -> Self {
        Self {
            average_quality_threshold: 20.0,
            window_size: 8
        }
    }
}

/**
Contains every parameter of one assembler invocation.
Quality sums are sums of per-base phred values, so they scale with read depth.
```
use clono_contig::assembler_config::{AssemblerConfig, AssemblerConfigBuilder};
let config: AssemblerConfig = AssemblerConfigBuilder::default()
    .sub_cloning_regions(None)
    .build()
    .unwrap();
assert_eq!(config.output_minimal_sum_quality, 50);
```
*/
#[derive(derive_builder::Builder, Clone, Debug, PartialEq)]
#[builder(default)]
pub struct AssemblerConfig {
    /// A letter passes the branching test if its share of the point quality is at least this
    pub branching_minimal_quality_share: f64,
    /// A letter passes the branching test if its quality sum is at least this
    pub branching_minimal_sum_quality: u64,
    /// A letter with at least this quality sum is the sole call at its point
    pub decisive_branching_sum_quality_threshold: u64,
    /// An alignment reaching within this many bases of a read end marks that end as an edge
    pub aligned_sequence_edge_delta: usize,
    /// Number of bases at a marked read end that are treated as edge bases
    pub alignment_edge_region_size: usize,
    /// Minimal fraction of non-edge observations for a letter to branch, for a point to be trusted, and for a contig to be kept
    pub minimal_non_edge_points_fraction: f64,
    /// Points whose quality sum divided by the clonotype read count is below this are not called
    pub minimal_mean_normalized_quality: f64,
    /// The winning letter needs at least this share of the point quality to avoid an ambiguity code
    pub output_minimal_quality_share: f64,
    /// The winning letter needs at least this quality sum to avoid an ambiguity code
    pub output_minimal_sum_quality: u64,
    /// Only points inside these features can branch; None disables branching entirely
    pub sub_cloning_regions: Option<Vec<GeneFeature>>,
    /// Only points inside these features are assembled; None assembles everything reads reach
    pub assembling_regions: Option<Vec<GeneFeature>>,
    /// The acceptance policy applied to finished contigs
    pub post_filtering: PostFiltering,
    /// Optional flank trimming of finished contigs
    pub trimming: Option<TrimmingConfig>,
    /// Contigs shorter than this are always dropped
    pub minimal_contig_length: usize,
    /// If true, read bases outside of the aligned segments are not projected
    pub aligned_regions_only: bool
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            branching_minimal_quality_share: 0.1,
            branching_minimal_sum_quality: 80,
            // high enough that deep clonotypes still branch on a balanced split
            decisive_branching_sum_quality_threshold: 120_000,
            aligned_sequence_edge_delta: 3,
            alignment_edge_region_size: 7,
            minimal_non_edge_points_fraction: 0.25,
            minimal_mean_normalized_quality: 3.0,
            output_minimal_quality_share: 0.5,
            output_minimal_sum_quality: 50,
            sub_cloning_regions: Some(vec![GeneFeature::vdj_region()]),
            assembling_regions: None,
            post_filtering: PostFiltering::NoFiltering,
            trimming: Some(TrimmingConfig::default()),
            minimal_contig_length: 20,
            aligned_regions_only: false
        }
    }
}

impl AssemblerConfig {
    /// Checks the parameters for internal consistency.
    /// Features are only resolved later against a specific reference frame.
    /// # Errors
    /// * if any share or fraction is outside [0, 1]
    /// * if `output_minimal_sum_quality` exceeds `branching_minimal_sum_quality`
    /// * if the trimming window is empty or the threshold is negative
    /// * if a full-assembly policy is set without `assembling_regions`
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let fractions = [
            ("branching_minimal_quality_share", self.branching_minimal_quality_share),
            ("minimal_non_edge_points_fraction", self.minimal_non_edge_points_fraction),
            ("output_minimal_quality_share", self.output_minimal_quality_share)
        ];
        for (label, value) in fractions.iter() {
            if !(0.0..=1.0).contains(value) {
                bail!("{label} must be in [0, 1], found {value}");
            }
        }

        if self.minimal_mean_normalized_quality.is_nan() || self.minimal_mean_normalized_quality < 0.0 {
            bail!("minimal_mean_normalized_quality must be non-negative, found {}", self.minimal_mean_normalized_quality);
        }

        if self.output_minimal_sum_quality > self.branching_minimal_sum_quality {
            bail!(
                "output_minimal_sum_quality ({}) must not exceed branching_minimal_sum_quality ({})",
                self.output_minimal_sum_quality, self.branching_minimal_sum_quality
            );
        }

        if let Some(trimming) = self.trimming.as_ref() {
            if trimming.window_size == 0 {
                bail!("Trimming window_size must be greater than 0");
            }
            if trimming.average_quality_threshold.is_nan() || trimming.average_quality_threshold < 0.0 {
                bail!("Trimming average_quality_threshold must be non-negative, found {}", trimming.average_quality_threshold);
            }
        }

        match &self.post_filtering {
            PostFiltering::OnlyFullyAssembled | PostFiltering::OnlyFullyDefined => {
                if self.assembling_regions.is_none() {
                    bail!("{:?} requires assembling_regions to be set", self.post_filtering);
                }
            },
            PostFiltering::OnlyCovering(features) | PostFiltering::OnlyUnambiguouslyCovering(features) => {
                if features.is_empty() {
                    bail!("{:?} requires at least one feature", self.post_filtering);
                }
            },
            PostFiltering::NoFiltering | PostFiltering::MinimalContigLength(_) => {}
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AssemblerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sub_cloning_regions, Some(vec![GeneFeature::vdj_region()]));
        assert_eq!(config.trimming, Some(TrimmingConfig { average_quality_threshold: 20.0, window_size: 8 }));
    }

    #[test]
    fn test_builder_defaults() {
        let config = AssemblerConfigBuilder::default()
            .minimal_contig_length(5)
            .build()
            .unwrap();
        assert_eq!(config.minimal_contig_length, 5);
        assert_eq!(config.branching_minimal_sum_quality, 80);
        assert_eq!(config.decisive_branching_sum_quality_threshold, 120_000);
    }

    #[test]
    fn test_bad_share() {
        let config = AssemblerConfigBuilder::default()
            .branching_minimal_quality_share(1.5)
            .build()
            .unwrap();
        assert!(config.validate().is_err());

        let config = AssemblerConfigBuilder::default()
            .output_minimal_quality_share(-0.1)
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_sum_above_branching_sum() {
        let config = AssemblerConfigBuilder::default()
            .branching_minimal_sum_quality(40)
            .output_minimal_sum_quality(50)
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_trimming() {
        let trimming = TrimmingConfigBuilder::default()
            .window_size(0)
            .build()
            .unwrap();
        let config = AssemblerConfigBuilder::default()
            .trimming(Some(trimming))
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_full_assembly_needs_regions() {
        let config = AssemblerConfigBuilder::default()
            .post_filtering(PostFiltering::OnlyFullyAssembled)
            .build()
            .unwrap();
        assert!(config.validate().is_err());

        let config = AssemblerConfigBuilder::default()
            .post_filtering(PostFiltering::OnlyFullyDefined)
            .assembling_regions(Some(vec![GeneFeature::vdj_region()]))
            .build()
            .unwrap();
        assert!(config.validate().is_ok());

        let config = AssemblerConfigBuilder::default()
            .post_filtering(PostFiltering::OnlyCovering(vec![]))
            .build()
            .unwrap();
        assert!(config.validate().is_err());
    }
}
