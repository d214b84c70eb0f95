use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};

use crate::aligned_read::{AlignedRead, ReadTarget, SegmentAlignment};
use crate::reference_frame::{GeneType, ReferenceFrame};

/// Length of the simulated V segment
pub const SIM_V_LENGTH: usize = 300;
/// Length of the simulated junction between V and J
pub const SIM_JUNCTION_LENGTH: usize = 15;
/// Length of the simulated J segment
pub const SIM_J_LENGTH: usize = 45;
/// Per-base quality of simulated reads
pub const SIM_QUALITY: u8 = 30;

/// A simulated clonotype with its ground truth
#[derive(Debug)]
pub struct ClonotypeSimulation {
    /// V, junction spacer, J
    pub frame: ReferenceFrame,
    /// The true molecules, all of frame length
    pub haplotypes: Vec<Vec<u8>>,
    /// Simulated reads
    pub reads: Vec<AlignedRead>,
    /// The haplotype each read was drawn from
    pub read_haplotypes: Vec<usize>
}

/// Creates a clonotype we can verify the assembler against.
/// Every haplotype after the first differs from the first at 2 positions in the middle of V, so that full-length reads link them.
/// # Arguments
/// * `num_haplotypes` - the number of distinct molecules
/// * `num_reads` - total number of reads, assigned round-robin to haplotypes
/// * `read_length` - length of each read window
/// * `error_rate` - substitution rate applied to read bases
/// * `seed` - seed for the generator
/// # Errors
/// * if a simulated read fails validation
pub fn generate_clonotype(num_haplotypes: usize, num_reads: usize, read_length: usize, error_rate: f64, seed: u64) -> Result<ClonotypeSimulation, Box<dyn std::error::Error>> {
    let total_length = SIM_V_LENGTH + SIM_JUNCTION_LENGTH + SIM_J_LENGTH;
    assert!(num_haplotypes > 0);
    assert!(read_length > 0 && read_length <= total_length);
    assert!((0.0..=1.0).contains(&error_rate));

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let base_distribution = Uniform::new(0, 4_usize);
    let basem1_distribution = Uniform::new(1, 4_usize);
    let error_distribution = Uniform::new(0.0, 1.0);
    let variant_distribution = Uniform::new(150, 210_usize);
    let start_distribution = Uniform::new_inclusive(0, total_length - read_length);
    let alphabet = b"ACGT";

    let frame = ReferenceFrame::builder()
        .segment(GeneType::Variable, "SIM-V", SIM_V_LENGTH)
        .spacer(SIM_JUNCTION_LENGTH)
        .segment(GeneType::Joining, "SIM-J", SIM_J_LENGTH)
        .build()?;

    let base: Vec<usize> = (0..total_length)
        .map(|_i| rng.sample(base_distribution))
        .collect();
    let mut haplotypes: Vec<Vec<usize>> = vec![base.clone()];
    while haplotypes.len() < num_haplotypes {
        let mut haplotype = base.clone();
        let first = rng.sample(variant_distribution);
        let mut second = rng.sample(variant_distribution);
        while second == first {
            second = rng.sample(variant_distribution);
        }
        for position in [first, second] {
            haplotype[position] = (haplotype[position] + rng.sample(basem1_distribution)) % 4;
        }
        if !haplotypes.contains(&haplotype) {
            haplotypes.push(haplotype);
        }
    }

    let j_start = SIM_V_LENGTH + SIM_JUNCTION_LENGTH;
    let mut reads = Vec::with_capacity(num_reads);
    let mut read_haplotypes = Vec::with_capacity(num_reads);
    for read_index in 0..num_reads {
        let haplotype_index = read_index % num_haplotypes;
        let start = rng.sample(start_distribution);
        let end = start + read_length;

        let sequence: Vec<u8> = haplotypes[haplotype_index][start..end].iter()
            .map(|&c| {
                let is_error = rng.sample(error_distribution) < error_rate;
                if is_error {
                    alphabet[(c + rng.sample(basem1_distribution)) % 4]
                } else {
                    alphabet[c]
                }
            })
            .collect();

        let mut alignments = vec![];
        if start < SIM_V_LENGTH {
            alignments.push(SegmentAlignment::ungapped(GeneType::Variable, start, 0, end.min(SIM_V_LENGTH) - start));
        }
        if end > j_start {
            let aligned_start = start.max(j_start);
            alignments.push(SegmentAlignment::ungapped(GeneType::Joining, aligned_start - j_start, aligned_start - start, end - aligned_start));
        }

        let target = ReadTarget::new(sequence, vec![SIM_QUALITY; read_length], alignments)?;
        reads.push(AlignedRead::single(target));
        read_haplotypes.push(haplotype_index);
    }

    let haplotypes: Vec<Vec<u8>> = haplotypes.iter()
        .map(|h| h.iter().map(|&c| alphabet[c]).collect())
        .collect();

    Ok(ClonotypeSimulation {
        frame,
        haplotypes,
        reads,
        read_haplotypes
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_clonotype() {
        let simulation = generate_clonotype(3, 30, 100, 0.0, 0).unwrap();
        assert_eq!(simulation.frame.span(), 0..360);
        assert_eq!(simulation.haplotypes.len(), 3);
        assert_eq!(simulation.reads.len(), 30);
        assert_eq!(simulation.read_haplotypes[4], 1);

        // haplotypes only differ in the variant window
        for haplotype in simulation.haplotypes.iter().skip(1) {
            let differences: Vec<usize> = (0..360).filter(|&i| haplotype[i] != simulation.haplotypes[0][i]).collect();
            assert_eq!(differences.len(), 2);
            assert!(differences.iter().all(|&d| (150..210).contains(&d)));
        }

        // error free reads are exact windows of their haplotype
        for (read, &h) in simulation.reads.iter().zip(simulation.read_haplotypes.iter()) {
            let target = &read.targets()[0];
            assert_eq!(target.len(), 100);
            let window = std::str::from_utf8(target.sequence()).unwrap();
            assert!(std::str::from_utf8(&simulation.haplotypes[h]).unwrap().contains(window));
        }
    }
}
