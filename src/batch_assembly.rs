/*!
Runs the contig assembler over many independent clonotypes on a shared thread pool.
Each clonotype is fully self-contained, so a failure in one only affects that clonotype.

# Example usage
```rust
use clono_contig::assembler_config::AssemblerConfig;
use clono_contig::batch_assembly::{assemble_batch, Clonotype};
use clono_contig::example_gen::generate_clonotype;

let first = generate_clonotype(1, 100, 200, 0.0, 0).unwrap();
let second = generate_clonotype(2, 200, 200, 0.0, 1).unwrap();
let clonotypes = [
    Clonotype::new(&first.frame, first.reads.clone()),
    Clonotype::new(&second.frame, second.reads.clone())
];

let results = assemble_batch(&AssemblerConfig::default(), &clonotypes, 2, None).unwrap();
assert_eq!(results.len(), 2);
assert!(results.iter().all(|r| r.is_some()));
```
*/

use itertools::Itertools;
use log::{debug, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::aligned_read::AlignedRead;
use crate::assembler_config::AssemblerConfig;
use crate::contig_assembler::{AssembledContigs, ContigAssembler};
use crate::reference_frame::ReferenceFrame;

/// One unit of batch work: a reference frame and the reads assigned to it
#[derive(Clone, Debug)]
pub struct Clonotype<'a> {
    frame: &'a ReferenceFrame,
    reads: Vec<AlignedRead>
}

impl<'a> Clonotype<'a> {
    pub fn new(frame: &'a ReferenceFrame, reads: Vec<AlignedRead>) -> Clonotype<'a> {
        Clonotype {
            frame,
            reads
        }
    }

    // Getters
    pub fn frame(&self) -> &ReferenceFrame {
        self.frame
    }

    pub fn reads(&self) -> &[AlignedRead] {
        &self.reads
    }
}

/// Assembles every clonotype in parallel, returning results in input order.
/// A clonotype whose assembler cannot be built is logged and reported with every read unassigned.
/// A clonotype that had not started when `cancel` was raised is reported as None.
/// # Arguments
/// * `config` - assembly parameters shared by all clonotypes
/// * `clonotypes` - the independent work units
/// * `num_threads` - worker count, 0 lets the pool pick
/// * `cancel` - optional flag checked before each clonotype starts
/// # Errors
/// * if the thread pool cannot be created
pub fn assemble_batch(
    config: &AssemblerConfig, clonotypes: &[Clonotype], num_threads: usize, cancel: Option<&AtomicBool>
) -> Result<Vec<Option<AssembledContigs>>, Box<dyn std::error::Error>> {
    debug!("Initializing thread pool with {} threads...", num_threads);
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("clono-{i}"))
        .build()?;

    let results: Vec<Option<AssembledContigs>> = pool.install(|| {
        clonotypes.par_iter()
            .enumerate()
            .map(|(index, clonotype)| {
                if cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false) {
                    return None;
                }
                Some(assemble_clonotype(index, config, clonotype))
            })
            .collect()
    });

    debug!(
        "Batch contig counts: [{}]",
        results.iter()
            .map(|r| r.as_ref().map(|a| a.contigs().len().to_string()).unwrap_or_else(|| "-".to_string()))
            .join(", ")
    );
    Ok(results)
}

fn assemble_clonotype(index: usize, config: &AssemblerConfig, clonotype: &Clonotype) -> AssembledContigs {
    let assembler = match ContigAssembler::new(config.clone(), clonotype.frame()) {
        Ok(a) => a,
        Err(e) => {
            warn!("Clonotype {index}: failed to configure assembler: {e}");
            return AssembledContigs::empty(clonotype.reads().len());
        }
    };
    let result = assembler.assemble(clonotype.reads());
    if result.contigs().is_empty() {
        warn!("Clonotype {index}: no contigs assembled from {} reads", clonotype.reads().len());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::assembler_config::AssemblerConfigBuilder;
    use crate::example_gen::generate_clonotype;
    use crate::reference_frame::{GeneFeature, GeneType};

    #[test_log::test]
    fn test_batch_matches_serial() {
        let simulations: Vec<_> = (0..4)
            .map(|seed| generate_clonotype(1 + (seed as usize % 2), 200, 200, 0.0, seed).unwrap())
            .collect();
        let clonotypes: Vec<Clonotype> = simulations.iter()
            .map(|s| Clonotype::new(&s.frame, s.reads.clone()))
            .collect();
        let config = AssemblerConfig::default();

        let results = assemble_batch(&config, &clonotypes, 2, None).unwrap();
        assert_eq!(results.len(), 4);
        for (result, simulation) in results.iter().zip(simulations.iter()) {
            let serial = ContigAssembler::new(config.clone(), &simulation.frame).unwrap()
                .assemble(&simulation.reads);
            assert_eq!(result.as_ref(), Some(&serial));
        }
    }

    #[test_log::test]
    fn test_failure_is_isolated() {
        let good = generate_clonotype(1, 100, 200, 0.0, 7).unwrap();
        let v_only = ReferenceFrame::builder()
            .segment(GeneType::Variable, "V1", 100)
            .build()
            .unwrap();

        // the J feature resolves on the good frame but not on the V-only frame
        let config = AssemblerConfigBuilder::default()
            .sub_cloning_regions(Some(vec![GeneFeature::region(GeneType::Joining)]))
            .build()
            .unwrap();
        let clonotypes = [
            Clonotype::new(&good.frame, good.reads.clone()),
            Clonotype::new(&v_only, good.reads[0..3].to_vec()),
            Clonotype::new(&good.frame, good.reads.clone())
        ];

        let results = assemble_batch(&config, &clonotypes, 3, None).unwrap();
        let bad = results[1].as_ref().unwrap();
        assert!(bad.contigs().is_empty());
        assert_eq!(bad.read_assignments(), &[None, None, None]);
        assert_eq!(results[0], results[2]);
        assert_eq!(results[0].as_ref().unwrap().contigs().len(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let simulation = generate_clonotype(1, 50, 200, 0.0, 2).unwrap();
        let clonotypes = vec![Clonotype::new(&simulation.frame, simulation.reads.clone()); 3];
        let cancel = AtomicBool::new(true);
        let results = assemble_batch(&AssemblerConfig::default(), &clonotypes, 2, Some(&cancel)).unwrap();
        assert_eq!(results, vec![None, None, None]);
    }

    #[test]
    fn test_empty_batch() {
        let results = assemble_batch(&AssemblerConfig::default(), &[], 1, None).unwrap();
        assert!(results.is_empty());
    }
}
