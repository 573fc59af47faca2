//! Explorer properties
//!
//! On a finite model the explorer must terminate and take every reachable
//! transition. Each path replays the prefix it shares with the path before
//! it; every step after that prefix must be a transition no path took before.

use crate::seeded;
use forkcase::*;
use rand::Rng;
use std::collections::HashSet;

/// A counter modulo `size` moved by `move1`, `move2` and `move3`.
#[derive(Debug, Clone)]
struct Dial {
    size: u8,
    at: u8,
}

impl Signature for Dial {
    type Value = u8;

    fn signature(&self) -> u8 {
        self.at
    }
}

impl State for Dial {}

fn driver(blocked: u8) -> StateDriver<Dial> {
    let open = Condition::new("open", move |d: &Dial| d.at != blocked);
    let actions = ActionSet::new().generate(
        open,
        (1..=3u8).map(|step| (format!("move{}", step), step)),
        |dial: &mut Dial, _: &Step, step: &u8| {
            dial.at = (dial.at + step) % dial.size;
            Ok(())
        },
    );
    StateDriver::new(actions).unwrap()
}

/// Number of leading steps `path` shares with `previous`.
fn shared_prefix(previous: &[(u8, String)], path: &[(u8, String)]) -> usize {
    previous
        .iter()
        .zip(path)
        .take_while(|(a, b)| a == b)
        .count()
}

/// Property: past its shared prefix, no path repeats a (signature, action) pair
pub fn test_each_transition_taken_once() {
    let mut rng = seeded(0xd1a1);
    for _ in 0..20 {
        let size = rng.gen_range(2..8u8);
        let blocked = rng.gen_range(0..size + 2);
        let paths = driver(blocked)
            .explore(move || Dial { size, at: 0 })
            .collect_values()
            .unwrap();
        let mut seen = HashSet::new();
        let mut previous: &[(u8, String)] = &[];
        for path in &paths {
            let shared = shared_prefix(previous, &path.trail);
            for step in &path.trail[..shared] {
                assert!(seen.contains(step), "{:?} replayed before it was taken", step);
            }
            for step in &path.trail[shared..] {
                assert!(seen.insert(step.clone()), "{:?} taken twice", step);
            }
            previous = &path.trail;
        }
    }
}

/// Property: every transition out of a reachable unblocked cell is taken
pub fn test_reachable_transitions_are_covered() {
    let mut rng = seeded(0xd1a2);
    for _ in 0..20 {
        let size = rng.gen_range(2..8u8);
        let paths = driver(u8::MAX)
            .explore(move || Dial { size, at: 0 })
            .collect_values()
            .unwrap();
        let taken: HashSet<(u8, String)> = paths
            .iter()
            .flat_map(|path| path.trail.iter().cloned())
            .collect();
        assert_eq!(taken.len(), size as usize * 3);
        for at in 0..size {
            for step in 1..=3 {
                assert!(taken.contains(&(at, format!("move{}", step))));
            }
        }
    }
}

/// Property: replaying a path on a fresh state ends where exploring ended
pub fn test_paths_replay_to_same_state() {
    let mut rng = seeded(0xd1a3);
    for _ in 0..10 {
        let size = rng.gen_range(2..8u8);
        let driver = driver(rng.gen_range(0..size))
            .with_config(ExploreConfig::default().with_max_depth(3));
        let paths = driver
            .explore(move || Dial { size, at: 0 })
            .collect_values()
            .unwrap();
        assert!(!paths.is_empty());
        for path in paths {
            let replayed = path.replay(Dial { size, at: 0 }).unwrap();
            assert_eq!(replayed.at, path.state.at, "{:?}", path);
        }
    }
}
