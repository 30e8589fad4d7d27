//! Gene-alignment crossover.
//!
//! Genes are identified by their `(begin, end)` pair; no lineage markers are
//! tracked. Genes present in both parents are blended, the rest are dealt out
//! to the two children. A gene touching a node the other parent cannot have
//! travels together with every other gene touching that node, so a child never
//! receives half of a foreign substructure.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use tracing::trace;

use crate::error::Result;
use crate::gene::{Edge, NodeId};
use crate::genome::Genome;

/// BLX-alpha blend of two values: a uniform draw from
/// `[lo - alpha * d, hi + alpha * d]` where `d = hi - lo`.
pub fn blx_blend<R: Rng>(x: f32, y: f32, alpha: f32, rng: &mut R) -> f32 {
    let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
    let spread = hi - lo;
    let lower = alpha.mul_add(-spread, lo);
    let upper = alpha.mul_add(spread, hi);
    rng.random::<f32>().mul_add(upper - lower, lower)
}

/// Node-index boundary of a parent: every id it knows is below this value.
fn boundary(genome: &Genome) -> NodeId {
    genome.max_node_id().map_or(NodeId(0), NodeId::next)
}

/// Recombine two genomes into two children.
///
/// The parent with more edges (the first one on ties) becomes the source of
/// the first child. Children inherit I/O ids and structural defaults from
/// their source parent and are returned without a built phenotype.
///
/// # Errors
///
/// Returns [`EvoError::StructuralInvariantViolation`](crate::EvoError::StructuralInvariantViolation)
/// if a child would break a genome invariant, which happens when the parents
/// disagree on their I/O ids.
pub fn crossover<R: Rng>(a: &Genome, b: &Genome, rng: &mut R) -> Result<(Genome, Genome)> {
    let (p1, p2) = if b.edge_count() > a.edge_count() {
        (b, a)
    } else {
        (a, b)
    };
    let bound1 = boundary(p1);
    let bound2 = boundary(p2);

    let index2 = p2.edge_index();
    let mut matched2 = vec![false; p2.edge_count()];
    let mut rest1 = Vec::new();
    let mut c1 = Vec::with_capacity(p1.edge_count());
    let mut c2 = Vec::with_capacity(p2.edge_count());

    for edge in p1.edges() {
        match index2.get(&edge.key()) {
            Some(&j) => {
                matched2[j] = true;
                let other = &p2.edges()[j];
                c1.push(Edge {
                    weight: blx_blend(edge.weight, other.weight, p1.config.blx_alpha, rng),
                    ..edge.clone()
                });
                c2.push(Edge {
                    weight: blx_blend(edge.weight, other.weight, p2.config.blx_alpha, rng),
                    ..other.clone()
                });
            }
            None => rest1.push(edge.clone()),
        }
    }
    let rest2: Vec<Edge> = p2
        .edges()
        .iter()
        .zip(&matched2)
        .filter(|&(_, &matched)| !matched)
        .map(|(edge, _)| edge.clone())
        .collect();

    trace!(
        matching = c1.len(),
        rest1 = rest1.len(),
        rest2 = rest2.len(),
        "aligned parents"
    );

    gamble_edges(rest1, bound2, rng, &mut c1, &mut c2);
    gamble_edges(rest2, bound1, rng, &mut c1, &mut c2);

    let next_node_id = p1.next_node_id().max(p2.next_node_id());
    let child1 = assemble(p1, p2, c1, next_node_id)?;
    let child2 = assemble(p2, p1, c2, next_node_id)?;
    Ok((child1, child2))
}

/// Deal non-matching genes to the children.
///
/// Nodes at or past `other_bound` are visited in ascending order; the genes
/// touching each one that have not been dealt yet form a cluster given to a
/// single child. Remaining genes are flipped one by one.
fn gamble_edges<R: Rng>(
    rest: Vec<Edge>,
    other_bound: NodeId,
    rng: &mut R,
    c1: &mut Vec<Edge>,
    c2: &mut Vec<Edge>,
) {
    let foreign: BTreeSet<NodeId> = rest
        .iter()
        .flat_map(|e| [e.begin, e.end])
        .filter(|&id| id >= other_bound)
        .collect();

    let mut taken = vec![false; rest.len()];
    for node in foreign {
        let cluster: Vec<usize> = (0..rest.len())
            .filter(|&i| !taken[i] && rest[i].touches(node))
            .collect();
        if cluster.is_empty() {
            continue;
        }
        let target = if rng.random_bool(0.5) { &mut *c1 } else { &mut *c2 };
        for i in cluster {
            taken[i] = true;
            target.push(rest[i].clone());
        }
    }

    for (edge, taken) in rest.into_iter().zip(taken) {
        if taken {
            continue;
        }
        if rng.random_bool(0.5) {
            c1.push(edge);
        } else {
            c2.push(edge);
        }
    }
}

fn assemble(source: &Genome, other: &Genome, edges: Vec<Edge>, next_node_id: NodeId) -> Result<Genome> {
    let mut activations: BTreeMap<_, _> = source
        .output_ids()
        .iter()
        .map(|&id| {
            let activation = source
                .activations()
                .get(&id)
                .copied()
                .unwrap_or(source.config.output_activation);
            (id, activation)
        })
        .collect();

    for edge in &edges {
        for id in [edge.begin, edge.end] {
            if source.is_input(id) || activations.contains_key(&id) {
                continue;
            }
            let activation = source
                .activations()
                .get(&id)
                .or_else(|| other.activations().get(&id))
                .copied()
                .unwrap_or(source.config.hidden_activation);
            activations.insert(id, activation);
        }
    }

    let child = Genome {
        edges,
        activations,
        input_ids: source.input_ids().to_vec(),
        output_ids: source.output_ids().to_vec(),
        next_node_id,
        config: source.config.clone(),
        phenotype: None,
    };
    child.validate()?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::genome::GenomeConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn ids(raw: &[u32]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId).collect()
    }

    fn genome(edges: Vec<Edge>, hidden: &[u32]) -> Genome {
        Genome::from_edges(
            &ids(&[1]),
            &ids(&[2]),
            edges,
            hidden.iter().map(|&h| (NodeId(h), Activation::Tanh)),
            GenomeConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_blx_blend_range() {
        let mut rng = test_rng();
        for _ in 0..500 {
            let w = blx_blend(0.2, 0.8, 0.5, &mut rng);
            assert!((-0.11..=1.11).contains(&w), "{}", w);
        }
        assert_eq!(blx_blend(0.4, 0.4, 0.5, &mut rng), 0.4);
    }

    #[test]
    fn test_matching_gene_is_blended_once_per_child() {
        let a = genome(vec![Edge::new(1, 2, 0.2)], &[]);
        let b = genome(vec![Edge::new(1, 2, 0.8)], &[]);
        let mut rng = test_rng();

        let (c1, c2) = crossover(&a, &b, &mut rng).unwrap();
        for child in [&c1, &c2] {
            assert_eq!(child.edge_count(), 1);
            let edge = &child.edges()[0];
            assert_eq!(edge.key(), (NodeId(1), NodeId(2)));
            assert!((-0.11..=1.11).contains(&edge.weight));
            assert!(child.is_dirty());
        }
    }

    #[test]
    fn test_every_gene_is_inherited_once() {
        let a = genome(
            vec![Edge::new(1, 2, 0.1), Edge::new(1, 3, 0.2), Edge::new(3, 2, 0.3)],
            &[3],
        );
        let b = genome(
            vec![Edge::new(1, 2, 0.4), Edge::new(1, 4, 0.5), Edge::new(4, 2, 0.6)],
            &[4],
        );
        let mut rng = test_rng();

        for _ in 0..50 {
            let (c1, c2) = crossover(&a, &b, &mut rng).unwrap();
            // (1,2) is in both children; the other four genes are split
            assert_eq!(c1.edge_count() + c2.edge_count(), 6);
            for child in [&c1, &c2] {
                let keys: HashSet<_> = child.edges().iter().map(Edge::key).collect();
                assert_eq!(keys.len(), child.edge_count());
                assert!(keys.contains(&(NodeId(1), NodeId(2))));
                assert!(child.validate().is_ok());
            }
        }
    }

    #[test]
    fn test_foreign_node_cluster_stays_together() {
        // Node 5 is past the smaller parent's boundary
        let big = genome(
            vec![
                Edge::new(1, 2, 0.1),
                Edge::new(1, 5, 0.2),
                Edge::new(5, 2, 0.3),
                Edge::new(5, 5, 0.4),
            ],
            &[5],
        );
        let small = genome(vec![Edge::new(1, 2, 0.9)], &[]);
        let mut rng = test_rng();

        for _ in 0..50 {
            let (c1, c2) = crossover(&big, &small, &mut rng).unwrap();
            for child in [&c1, &c2] {
                let touching = child.edges().iter().filter(|e| e.touches(NodeId(5))).count();
                assert!(touching == 0 || touching == 3, "split cluster: {}", touching);
                if touching == 3 {
                    assert_eq!(child.activations()[&NodeId(5)], Activation::Tanh);
                }
            }
        }
    }

    #[test]
    fn test_children_inherit_source_defaults() {
        let config = GenomeConfig {
            hidden_activation: Activation::ReLU,
            ..GenomeConfig::default()
        };
        let mut rng = test_rng();
        let a = Genome::fully_connected(&ids(&[1, 2]), &ids(&[3]), config.clone(), &mut rng)
            .add_node_between(NodeId(1), NodeId(3), 0.5, 0.5)
            .unwrap();
        let b = Genome::fully_connected(&ids(&[1, 2]), &ids(&[3]), GenomeConfig::default(), &mut rng);

        let (c1, c2) = crossover(&b, &a, &mut rng).unwrap();
        // a has more edges, so it sources the first child
        assert_eq!(c1.config, config);
        assert_eq!(c2.config, GenomeConfig::default());
        assert_eq!(c1.next_node_id(), NodeId(5));
        assert_eq!(c2.next_node_id(), NodeId(5));
    }

    #[test]
    fn test_crossover_is_deterministic() {
        let mut rng = test_rng();
        let a = Genome::fully_connected(&ids(&[1, 2]), &ids(&[3, 4]), GenomeConfig::default(), &mut rng);
        let b = a
            .add_node_between(NodeId(2), NodeId(4), 0.1, 0.2)
            .unwrap();

        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let (c1, c2) = crossover(&a, &b, &mut rng).unwrap();
            (c1.edges().to_vec(), c2.edges().to_vec())
        };
        assert_eq!(run(3), run(3));
    }
}
