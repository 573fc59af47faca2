//! Product properties
//!
//! A chain must yield every combination of its links exactly once, with the
//! first link varying slowest.

use crate::seeded;
use forkcase::*;
use rand::Rng;

/// All combinations of `0..n` per size, outer positions slowest.
fn nested_loops(sizes: &[usize]) -> Vec<Vec<usize>> {
    sizes.iter().fold(vec![Vec::new()], |acc, &n| {
        acc.into_iter()
            .flat_map(|prefix| {
                (0..n).map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v);
                    next
                })
            })
            .collect()
    })
}

fn random_sizes(rng: &mut impl Rng) -> Vec<usize> {
    let links = rng.gen_range(0..5);
    (0..links).map(|_| rng.gen_range(0..4)).collect()
}

/// Property: the chain equals nested loops, including empty links
pub fn test_product_completeness() {
    let mut rng = seeded(0x5eed);
    for _ in 0..50 {
        let sizes = random_sizes(&mut rng);
        let forkers: Vec<Forker<usize>> = sizes.iter().map(|&n| Forker::range(0..n)).collect();
        let combos = Chain::of(forkers).build().collect_values().unwrap();
        assert_eq!(combos, nested_loops(&sizes), "sizes {:?}", sizes);
    }
}

/// Property: enumerating twice gives the same sequence
pub fn test_product_is_restartable() {
    let mut rng = seeded(7);
    for _ in 0..20 {
        let sizes = random_sizes(&mut rng);
        let forkers: Vec<Forker<usize>> = sizes.iter().map(|&n| Forker::range(0..n)).collect();
        let forker = Chain::of(forkers).build();
        assert_eq!(forker.collect_values().unwrap(), forker.collect_values().unwrap());
    }
}

/// Property: a dependent link sees exactly the values chosen before it
pub fn test_dependent_links_see_prefix() {
    let mut rng = seeded(11);
    for _ in 0..20 {
        let first = rng.gen_range(1..5);
        let forker = Chain::new(vec![
            Link::Fixed(Forker::range(0..first)),
            Link::dependent(|acc: &Vec<usize>| Forker::range(0..acc[0] + 1)),
        ])
        .build();
        let combos = forker.collect_values().unwrap();
        assert_eq!(combos.len(), (1..=first).sum::<usize>());
        assert!(combos.iter().all(|c| c[1] <= c[0]));
    }
}
