use super::{PoolStats, WorkerPool};
use crate::error::Error;

fn pool(n: usize) -> WorkerPool<&'static str> {
    WorkerPool::new(["a", "b", "c", "d", "e", "f"].into_iter().take(n))
}

#[test]
fn new_pool_attaches_every_worker_at_zero() {
    let pool = pool(4);
    assert_eq!(pool.len(), 4);
    assert_eq!(pool.total_load(), 0);
    assert!(pool.is_consistent());
    for id in 0..4 {
        assert!(pool.position(id).is_some());
        assert_eq!(pool.load(id), Some(0));
    }
    assert_eq!(pool.get(2), Some(&"c"));
}

#[test]
fn least_on_empty_pool_is_an_invariant_violation() {
    let mut pool = WorkerPool::<()>::new([]);
    assert!(matches!(
        pool.least(),
        Err(Error::InvariantViolation { .. })
    ));
}

#[test]
fn least_detaches_until_reinserted() {
    let mut pool = pool(2);
    let id = pool.least().unwrap();
    assert_eq!(pool.position(id), None);
    assert!(!pool.is_consistent());

    pool.increment_load(id).unwrap();
    pool.insert(id).unwrap();
    assert!(pool.is_consistent());
    assert_ne!(pool.peek_least(), Some(id));
}

#[test]
fn load_cannot_change_while_attached() {
    let mut pool = pool(2);
    assert!(matches!(
        pool.increment_load(0),
        Err(Error::InvariantViolation { .. })
    ));
    assert_eq!(pool.load(0), Some(0));
}

#[test]
fn load_never_goes_negative() {
    let mut pool = pool(1);
    let id = pool.least().unwrap();
    let err = pool.decrement_load(id).unwrap_err();
    assert!(matches!(err, Error::InvariantViolation { .. }));
    assert_eq!(pool.load(id), Some(0));
}

#[test]
fn remove_at_unknown_position_fails() {
    let mut pool = pool(2);
    assert!(pool.remove_at(7).is_err());
    assert!(pool.insert(9).is_err());
}

#[test]
fn stats_report_mean_and_variance() {
    let stats = PoolStats::from_loads(vec![1, 2, 3]);
    assert_eq!(stats.total, 6);
    assert!((stats.mean - 2.0).abs() < f64::EPSILON);
    assert!((stats.variance - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(stats.to_string(), "1 2 3  2.00 0.67");
}

#[test]
fn stats_of_empty_pool_are_zero() {
    let stats = PoolStats::from_loads(Vec::new());
    assert_eq!(stats.total, 0);
    assert_eq!(stats.mean, 0.0);
    assert_eq!(stats.variance, 0.0);
}
