//! Reaction properties
//!
//! Re-forking nested forker-valued items must look like one flat forker.

use crate::seeded;
use forkcase::*;
use rand::Rng;

/// A random tree of plain values and nested forkers.
#[derive(Debug, Clone)]
enum Tree {
    Leaf(u32),
    Node(Vec<Tree>),
}

fn random_tree(rng: &mut impl Rng, depth: u32, next: &mut u32) -> Tree {
    if depth == 0 || rng.gen_bool(0.4) {
        *next += 1;
        return Tree::Leaf(*next);
    }
    let width = rng.gen_range(0..4);
    Tree::Node((0..width).map(|_| random_tree(rng, depth - 1, next)).collect())
}

fn to_react(tree: &Tree) -> React<u32> {
    match tree {
        Tree::Leaf(value) => React::Done(*value),
        Tree::Node(children) => React::Fork(Forker::of(children.iter().map(to_react))),
    }
}

fn depth_first(tree: &Tree, out: &mut Vec<u32>) {
    match tree {
        Tree::Leaf(value) => out.push(*value),
        Tree::Node(children) => children.iter().for_each(|child| depth_first(child, out)),
    }
}

/// Property: reacting a nested forker lists the leaves depth first
pub fn test_reaction_matches_depth_first_walk() {
    let mut rng = seeded(0xfeed);
    for _ in 0..50 {
        let mut next = 0;
        let tree = random_tree(&mut rng, 4, &mut next);
        let mut expected = Vec::new();
        depth_first(&tree, &mut expected);

        let seed = Forker::of([to_react(&tree)]);
        assert_eq!(seed.react().collect_values().unwrap(), expected, "{:?}", tree);
    }
}

/// Property: a forked if only forks the branch its condition selects
pub fn test_branch_forks_only_taken_arm() {
    let mut rng = seeded(3);
    for _ in 0..20 {
        let then_len = rng.gen_range(0..4);
        let else_len = rng.gen_range(0..4);
        let forker = if_fork(Forker::bool())
            .then(Forker::range(0..then_len))
            .else_then(Forker::range(100..100 + else_len));
        let values = forker.collect_values().unwrap();
        let expected: Vec<i32> = (100..100 + else_len).chain(0..then_len).collect();
        assert_eq!(values, expected);
    }
}
