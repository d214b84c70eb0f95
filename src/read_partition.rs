/*!
Splits the reads of a clonotype into disjoint sub-populations, one per supported combination of branch point letters.

The partitioner walks the branch points in coordinate order and grows a tree of partial combinations, best-supported node first.
At each node the current branch point is re-tested using only the reads anchored to that node (reads that explicitly agree with at least one of its choices), so a combination is only created when its letters are actually observed together.
Finished combinations are then populated: every read goes to the compatible combination it matches most explicitly, and combinations whose assigned support turns out negligible are pruned with their reads reassigned.

# Example usage
```rust
use clono_contig::assembler_config::AssemblerConfig;
use clono_contig::branch_detection::BranchDetector;
use clono_contig::point_evidence::EvidenceTable;
use clono_contig::point_projection::{GlobalPoint, PointObservation};
use clono_contig::read_partition::ReadPartitioner;

// 10 reads with G at point 7 and 10 reads with T
let observations: Vec<Vec<PointObservation>> = (0..20)
    .map(|i| vec![PointObservation::new(GlobalPoint::reference(7), if i < 10 { 2 } else { 3 }, 30, false)])
    .collect();
let reads: Vec<usize> = (0..20).collect();
let table = EvidenceTable::aggregate(&observations, &reads);
let detector = BranchDetector::new(&AssemblerConfig::default(), Some(vec![0..100]), reads.len());
let branch_points = detector.detect(&table, &observations, &reads);

let partition = ReadPartitioner::new(&detector).partition(&branch_points, &observations, &table, &reads);
assert_eq!(partition.sub_populations().len(), 2);
assert_eq!(partition.sub_populations()[0].reads(), &(0..10).collect::<Vec<usize>>());
assert!(partition.dropped_reads().is_empty());
```
*/

use log::{debug, trace};
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap as HashMap;
use std::cmp::Reverse;

use crate::branch_detection::{BranchDetector, BranchPoint};
use crate::point_evidence::{EvidenceTable, PointEvidence};
use crate::point_projection::{GlobalPoint, PointObservation};

/// Default cap on the number of combinations explored for one clonotype
pub const DEFAULT_MAX_SUB_POPULATIONS: usize = 64;

/// Priority is the number of reads in a node, lower node id breaks ties
type NodePriority = (usize, Reverse<usize>);

/// A consistent group of reads sharing one letter choice per branch point
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubPopulation {
    /// The letter chosen at each branch point this group is defined by, ordered by point
    choices: Vec<(GlobalPoint, u8)>,
    /// Read indices, ascending
    reads: Vec<usize>
}

impl SubPopulation {
    pub fn new(choices: Vec<(GlobalPoint, u8)>, reads: Vec<usize>) -> SubPopulation {
        SubPopulation {
            choices,
            reads
        }
    }

    // Getters
    pub fn choices(&self) -> &[(GlobalPoint, u8)] {
        &self.choices
    }

    pub fn reads(&self) -> &[usize] {
        &self.reads
    }

    /// The chosen letter at a point, if this group is defined there
    pub fn choice_at(&self, point: &GlobalPoint) -> Option<u8> {
        self.choices.iter()
            .find(|(p, _)| p == point)
            .map(|(_, l)| *l)
    }
}

/// The result of partitioning one clonotype
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadPartition {
    sub_populations: Vec<SubPopulation>,
    /// Reads that fit no sub-population, ascending
    dropped_reads: Vec<usize>
}

impl ReadPartition {
    // Getters
    pub fn sub_populations(&self) -> &[SubPopulation] {
        &self.sub_populations
    }

    pub fn dropped_reads(&self) -> &[usize] {
        &self.dropped_reads
    }
}

/// A partial combination in the exploration arena
#[derive(Debug)]
struct PartitionNode {
    /// One entry per branch point processed so far, None for "no split here"
    choices: Vec<Option<u8>>,
    /// Positions into the partitioned read list
    members: Vec<usize>
}

/// Builds sub-populations from branch points
#[derive(Debug)]
pub struct ReadPartitioner<'a> {
    detector: &'a BranchDetector,
    max_sub_populations: usize
}

impl<'a> ReadPartitioner<'a> {
    /// Creates a partitioner that re-uses the significance test of `detector`
    pub fn new(detector: &'a BranchDetector) -> ReadPartitioner<'a> {
        ReadPartitioner {
            detector,
            max_sub_populations: DEFAULT_MAX_SUB_POPULATIONS
        }
    }

    /// Overrides the combination cap; once reached, nodes stop splitting and follow their strongest letter
    pub fn with_max_sub_populations(mut self, max_sub_populations: usize) -> ReadPartitioner<'a> {
        self.max_sub_populations = max_sub_populations.max(1);
        self
    }

    /// Partitions the reads.
    /// Every read in `reads` ends up in exactly one sub-population or in the dropped list.
    /// # Arguments
    /// * `branch_points` - branch points ordered by point
    /// * `observations` - projected observations for every read of the clonotype
    /// * `table` - evidence over all reads, used to scale pruning shares
    /// * `reads` - indices into `observations` to partition
    pub fn partition(&self, branch_points: &[BranchPoint], observations: &[Vec<PointObservation>], table: &EvidenceTable, reads: &[usize]) -> ReadPartition {
        if reads.is_empty() {
            return ReadPartition::default();
        }

        // the observation each read has at each branch point
        let lookup: HashMap<GlobalPoint, usize> = branch_points.iter()
            .enumerate()
            .map(|(i, bp)| (bp.point(), i))
            .collect();
        let mut signatures: Vec<Vec<Option<PointObservation>>> = vec![vec![None; branch_points.len()]; reads.len()];
        for (member, &read_index) in reads.iter().enumerate() {
            for observation in observations[read_index].iter() {
                if let Some(&bp_index) = lookup.get(&observation.point()) {
                    signatures[member][bp_index] = Some(*observation);
                }
            }
        }
        // the accepted letter of a read at a branch point, noise letters count as not covering
        let accepted_letter = |member: usize, bp_index: usize| -> Option<u8> {
            signatures[member][bp_index]
                .map(|o| o.letter())
                .filter(|&l| branch_points[bp_index].accepts(l))
        };

        let leaves = self.explore(branch_points, &signatures, &accepted_letter, reads.len());

        // populate and prune until every surviving combination carries real support
        let leaf_sizes: Vec<usize> = leaves.iter().map(|n| n.members.len()).collect();
        let assignments = populate_and_prune(
            leaves.len(),
            |alive| {
                (0..reads.len())
                    .map(|member| self.best_leaf(member, &leaves, &leaf_sizes, alive, branch_points.len(), &accepted_letter))
                    .collect()
            },
            |li, assigned| self.is_negligible(&leaves[li], assigned, branch_points, &signatures, table)
        );

        // collect the output in arena order
        let mut sub_populations = vec![];
        let mut dropped_reads = vec![];
        let mut grouped: Vec<Vec<usize>> = vec![vec![]; leaves.len()];
        for (member, assignment) in assignments.iter().enumerate() {
            match assignment {
                Some(li) => grouped[*li].push(reads[member]),
                None => dropped_reads.push(reads[member])
            };
        }
        for (leaf, mut group) in leaves.iter().zip(grouped.into_iter()) {
            if group.is_empty() {
                continue;
            }
            group.sort_unstable();
            let choices: Vec<(GlobalPoint, u8)> = leaf.choices.iter()
                .enumerate()
                .filter_map(|(bp_index, choice)| choice.map(|l| (branch_points[bp_index].point(), l)))
                .collect();
            sub_populations.push(SubPopulation::new(choices, group));
        }
        dropped_reads.sort_unstable();

        debug!(
            "Partitioned {} reads over {} branch points into {} sub-populations ({} combinations explored, {} reads dropped)",
            reads.len(), branch_points.len(), sub_populations.len(), leaves.len(), dropped_reads.len()
        );
        ReadPartition {
            sub_populations,
            dropped_reads
        }
    }

    /// Best-first expansion of the combination tree, returns the finished combinations in completion order
    fn explore<F>(&self, branch_points: &[BranchPoint], signatures: &[Vec<Option<PointObservation>>], accepted_letter: &F, num_members: usize) -> Vec<PartitionNode>
    where
        F: Fn(usize, usize) -> Option<u8>
    {
        let mut arena: Vec<Option<PartitionNode>> = vec![];
        let mut pqueue: PriorityQueue<usize, NodePriority> = PriorityQueue::new();
        let mut leaves: Vec<PartitionNode> = vec![];

        arena.push(Some(PartitionNode {
            choices: vec![],
            members: (0..num_members).collect()
        }));
        pqueue.push(0, (num_members, Reverse(0)));

        while let Some((node_id, _priority)) = pqueue.pop() {
            let node = match arena[node_id].take() {
                Some(n) => n,
                None => continue
            };
            let bp_index = node.choices.len();
            if bp_index == branch_points.len() {
                leaves.push(node);
                continue;
            }

            // re-test the branch point on the reads anchored to this node
            let anchored: Vec<usize> = if node.choices.iter().all(|c| c.is_none()) {
                node.members.clone()
            } else {
                node.members.iter()
                    .copied()
                    .filter(|&m| {
                        node.choices.iter()
                            .enumerate()
                            .any(|(b, c)| c.is_some() && accepted_letter(m, b) == *c)
                    })
                    .collect()
            };
            let mut evidence = PointEvidence::default();
            for &member in anchored.iter() {
                if let Some(observation) = signatures[member][bp_index].as_ref() {
                    evidence.add(observation);
                }
            }

            let mut letters: Vec<u8> = match self.detector.decisive_letter(&evidence) {
                Some(letter) => vec![letter],
                None => self.detector.significant_letters(&evidence)
            };
            letters.retain(|&l| branch_points[bp_index].accepts(l));
            letters.sort_by_key(|&l| (Reverse(evidence.letter(l).quality_sum()), l));

            let open = leaves.len() + pqueue.len();
            if letters.len() > 1 && open + letters.len() > self.max_sub_populations {
                debug!("Combination cap of {} reached at {:?}, following the strongest letter only", self.max_sub_populations, branch_points[bp_index].point());
                letters.truncate(1);
            }

            let mut children: Vec<PartitionNode> = vec![];
            if letters.is_empty() {
                let mut choices = node.choices;
                choices.push(None);
                children.push(PartitionNode {
                    choices,
                    members: node.members
                });
            } else {
                for &letter in letters.iter() {
                    let members: Vec<usize> = node.members.iter()
                        .copied()
                        .filter(|&m| accepted_letter(m, bp_index).map_or(true, |l| l == letter))
                        .collect();
                    let mut choices = node.choices.clone();
                    choices.push(Some(letter));
                    children.push(PartitionNode {
                        choices,
                        members
                    });
                }
            }

            for child in children.into_iter() {
                let child_id = arena.len();
                pqueue.push(child_id, (child.members.len(), Reverse(child_id)));
                arena.push(Some(child));
            }
        }

        leaves
    }

    /// Picks the alive combination a read matches most explicitly, then the largest, then the earliest
    fn best_leaf<F>(&self, member: usize, leaves: &[PartitionNode], leaf_sizes: &[usize], alive: &[bool], num_branch_points: usize, accepted_letter: &F) -> Option<usize>
    where
        F: Fn(usize, usize) -> Option<u8>
    {
        let mut best: Option<(usize, usize, usize)> = None;
        for (li, leaf) in leaves.iter().enumerate() {
            if !alive[li] {
                continue;
            }
            let mut matches = 0;
            let mut compatible = true;
            for bp_index in 0..num_branch_points {
                if let (Some(read_letter), Some(choice)) = (accepted_letter(member, bp_index), leaf.choices[bp_index]) {
                    if read_letter == choice {
                        matches += 1;
                    } else {
                        compatible = false;
                        break;
                    }
                }
            }
            if !compatible {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_matches, best_size, _)) => (matches, leaf_sizes[li]) > (best_matches, best_size)
            };
            if better {
                best = Some((matches, leaf_sizes[li], li));
            }
        }
        best.map(|(_, _, li)| li)
    }

    /// A combination is negligible if nothing was assigned to it, or if at any of its defining points the assigned reads fail the branching thresholds for the chosen letter
    fn is_negligible(&self, leaf: &PartitionNode, assigned: &[usize], branch_points: &[BranchPoint], signatures: &[Vec<Option<PointObservation>>], table: &EvidenceTable) -> bool {
        if assigned.is_empty() {
            return true;
        }
        leaf.choices.iter()
            .enumerate()
            .any(|(bp_index, choice)| {
                let letter = match choice {
                    Some(l) => *l,
                    None => return false
                };
                let support: u64 = assigned.iter()
                    .filter_map(|&m| signatures[m][bp_index])
                    .filter(|o| o.letter() == letter)
                    .map(|o| o.quality() as u64)
                    .sum();
                let point_total = table.get(&branch_points[bp_index].point())
                    .map(|e| e.total_quality())
                    .unwrap_or(0);
                !self.detector.passes_branching_thresholds(support, point_total)
            })
    }
}

/// Assigns reads to the alive combinations, then removes the weakest negligible one and repeats.
/// The last alive combination is never removed. Returns the final assignment of each read.
/// # Arguments
/// * `num_leaves` - the number of combinations
/// * `assign` - maps the alive flags to one optional combination index per read
/// * `is_negligible` - tests a combination index against the reads assigned to it
fn populate_and_prune<A, N>(num_leaves: usize, assign: A, is_negligible: N) -> Vec<Option<usize>>
where
    A: Fn(&[bool]) -> Vec<Option<usize>>,
    N: Fn(usize, &[usize]) -> bool
{
    let mut alive = vec![true; num_leaves];
    loop {
        let assignments = assign(&alive);
        if alive.iter().filter(|&&a| a).count() <= 1 {
            return assignments;
        }

        let mut assigned: Vec<Vec<usize>> = vec![vec![]; num_leaves];
        for (member, assignment) in assignments.iter().enumerate() {
            if let Some(leaf_index) = assignment {
                assigned[*leaf_index].push(member);
            }
        }

        let weakest = (0..num_leaves)
            .filter(|&li| alive[li] && is_negligible(li, &assigned[li]))
            .min_by_key(|&li| (assigned[li].len(), Reverse(li)));
        match weakest {
            Some(li) => {
                trace!("Pruning combination {li} with {} assigned reads", assigned[li].len());
                alive[li] = false;
            },
            None => return assignments
        };
    }
}
