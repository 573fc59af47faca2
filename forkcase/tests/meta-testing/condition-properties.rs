//! Condition properties
//!
//! Composed conditions must evaluate like the boolean formulas they spell.

use crate::seeded;
use forkcase::*;
use rand::Rng;

fn above(threshold: i32) -> Condition<i32> {
    Condition::new(format!("above_{}", threshold), move |v: &i32| *v > threshold)
}

/// Property: !(a & b) == !a | !b and !(a | b) == !a & !b
pub fn test_de_morgan() {
    let mut rng = seeded(42);
    for _ in 0..100 {
        let (x, y, v) = (
            rng.gen_range(-10..10),
            rng.gen_range(-10..10),
            rng.gen_range(-20..20),
        );
        let (a, b) = (above(x), above(y));
        assert_eq!(
            (!(a.clone() & b.clone())).evaluate(&v),
            (!a.clone() | !b.clone()).evaluate(&v)
        );
        assert_eq!((!(a.clone() | b.clone())).evaluate(&v), (!a & !b).evaluate(&v));
    }
}

/// Property: regrouping same-operator chains changes neither truth nor shape
pub fn test_flattening_keeps_meaning() {
    let mut rng = seeded(43);
    for _ in 0..100 {
        let t: Vec<i32> = (0..3).map(|_| rng.gen_range(-10..10)).collect();
        let v = rng.gen_range(-20..20);
        let left = (above(t[0]) & above(t[1])) & above(t[2]);
        let right = above(t[0]) & (above(t[1]) & above(t[2]));
        assert_eq!(left.evaluate(&v), right.evaluate(&v));
        assert_eq!(left.evaluate(&v), t.iter().all(|&x| v > x));
        assert_eq!(left.to_string(), right.to_string());
        assert_eq!(left.children().len(), 3);

        let any = (above(t[0]) | above(t[1])) | above(t[2]);
        assert_eq!(any.evaluate(&v), t.iter().any(|&x| v > x));
    }
}
