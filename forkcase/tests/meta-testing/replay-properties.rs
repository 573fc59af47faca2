//! Build/replay properties
//!
//! The execute phase must run each materialized combination exactly once and
//! hand every side effect the values of its own case.

use forkcase::*;
use std::cell::RefCell;
use std::rc::Rc;

/// Property: every (a, b) pair runs exactly once, in case order
pub fn test_each_combination_executes_once() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let report = ForkTest::new("pairs", move |kit: &mut TestKit| {
        let a = kit.pick_enum([1, 3, 5])?;
        let b = kit.pick_enum([2, 4, 6])?;
        let sink = sink.clone();
        kit.execute(move |env| {
            sink.borrow_mut().push((env.get(&a)?, env.get(&b)?));
            Ok(())
        })?;
        Ok(())
    })
    .run()
    .unwrap();

    assert_eq!(report.passed(), 9);
    let expected: Vec<(i32, i32)> = [1, 3, 5]
        .iter()
        .flat_map(|&a| [2, 4, 6].iter().map(move |&b| (a, b)))
        .collect();
    assert_eq!(*seen.borrow(), expected);
}

/// Property: a side effect result feeds the later side effects of its case only
pub fn test_results_bind_to_their_case() {
    let report = ForkTest::new("products", |kit: &mut TestKit| {
        let a = kit.pick_enum([1, 3, 5])?;
        let b = kit.pick_enum([2, 4, 6])?;
        let (x, y) = (a.clone(), b.clone());
        let product = kit.execute(move |env| Ok(env.get(&x)? * env.get(&y)?))?;
        kit.assert_eq(product, a * b)
    })
    .run()
    .unwrap();
    assert!(report.is_success(), "{}", report);
    assert_eq!(report.outcomes.len(), 9);
}
