use super::Balancer;
use crate::{
    config::{Backpressure, BalancerConfig},
    error::Error,
    task::TaskError,
};
use core::time::Duration;
use futures::future::join_all;
use std::time::Instant;
use tokio::{sync::oneshot, time::timeout};

fn config(worker_count: usize) -> BalancerConfig {
    BalancerConfig {
        worker_count,
        queue_capacity: 256,
        intake_capacity: 256,
        backpressure: Backpressure::Reject,
        shutdown_timeout: Duration::from_secs(1),
    }
}

fn doubler(x: u64) -> Result<u64, TaskError> {
    Ok(x * 2)
}

/// Polls until the dispatcher has processed every completion.
async fn wait_until_idle<I: Send + 'static, O: Send + 'static>(balancer: &Balancer<I, O>) {
    for _ in 0..200 {
        if balancer.snapshot().await.unwrap().total == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("pool never went idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submit_returns_the_task_result() {
    let balancer = Balancer::spawn(config(3), |x: i32| -> Result<f64, TaskError> {
        Ok(f64::from(x).sin())
    })
    .unwrap();

    assert_eq!(balancer.submit(30).await, Ok(30_f64.sin()));
    balancer.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clients_each_get_exactly_their_result() {
    let balancer = Balancer::spawn(config(8), doubler).unwrap();

    let clients = (0..500_u64).map(|x| {
        let balancer = balancer.clone();
        tokio::spawn(async move { (x, balancer.submit(x).await) })
    });

    for joined in join_all(clients).await {
        let (x, result) = joined.unwrap();
        assert_eq!(result, Ok(x * 2));
    }

    wait_until_idle(&balancer).await;
    let stats = balancer.snapshot().await.unwrap();
    assert_eq!(stats.loads, vec![0; 8]);
    assert_eq!(balancer.inflight(), 0);

    balancer.shutdown().await.unwrap();
}

#[tokio::test]
async fn enqueued_tickets_resolve_independently() {
    let balancer = Balancer::spawn(config(2), doubler).unwrap();

    let first = balancer.enqueue(1).await.unwrap();
    let second = balancer.enqueue(2).await.unwrap();
    assert_eq!(balancer.inflight(), 2);

    assert_eq!(second.await, Ok(4));
    assert_eq!(first.await, Ok(2));
    assert_eq!(balancer.inflight(), 0);

    balancer.shutdown().await.unwrap();
}

#[tokio::test]
async fn task_failures_reach_the_client_and_the_pool_keeps_serving() {
    let balancer = Balancer::spawn(config(1), |x: u64| -> Result<u64, TaskError> {
        match x {
            0 => Err(TaskError::new("division by zero")),
            1 => panic!("worker task blew up"),
            _ => Ok(100 / x),
        }
    })
    .unwrap();

    assert_eq!(
        balancer.submit(0).await,
        Err(Error::TaskFailed {
            reason: "division by zero".to_string()
        })
    );
    assert!(matches!(
        balancer.submit(1).await,
        Err(Error::TaskFailed { .. })
    ));
    assert_eq!(balancer.submit(4).await, Ok(25));

    wait_until_idle(&balancer).await;
    balancer.shutdown().await.unwrap();
}

#[tokio::test]
async fn submit_after_shutdown_is_refused() {
    let balancer = Balancer::spawn(config(2), doubler).unwrap();
    balancer.shutdown().await.unwrap();

    assert!(!balancer.is_accepting());
    assert_eq!(balancer.submit(1).await, Err(Error::ServiceShutdown));
    assert_eq!(balancer.snapshot().await, Err(Error::ServiceShutdown));

    // A second shutdown has nothing left to join.
    balancer.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_config_is_rejected_before_spawning() {
    let result = Balancer::<u64, u64>::spawn(
        BalancerConfig {
            worker_count: 0,
            ..config(1)
        },
        doubler,
    );
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_drains_requests_already_in_flight() {
    let balancer = Balancer::spawn(config(2), |x: u64| -> Result<u64, TaskError> {
        std::thread::sleep(Duration::from_millis(20));
        Ok(x)
    })
    .unwrap();

    let tickets = join_all((0..4_u64).map(|x| balancer.enqueue(x))).await;
    let tickets: Vec<_> = tickets.into_iter().map(Result::unwrap).collect();

    let waiter = tokio::spawn(join_all(tickets));
    balancer.shutdown().await.unwrap();

    let results = waiter.await.unwrap();
    assert_eq!(results, vec![Ok(0), Ok(1), Ok(2), Ok(3)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn full_queues_wait_instead_of_refusing() {
    let balancer = Balancer::spawn(
        BalancerConfig {
            queue_capacity: 1,
            backpressure: Backpressure::Wait,
            ..config(2)
        },
        |x: u64| -> Result<u64, TaskError> {
            std::thread::sleep(Duration::from_micros(200));
            Ok(x + 1)
        },
    )
    .unwrap();

    let clients = (0..300_u64).map(|x| {
        let balancer = balancer.clone();
        tokio::spawn(async move { (x, balancer.submit(x).await) })
    });

    let joined = timeout(Duration::from_secs(10), join_all(clients))
        .await
        .expect("waiting dispatcher deadlocked");
    for result in joined {
        let (x, result) = result.unwrap();
        assert_eq!(result, Ok(x + 1));
    }

    wait_until_idle(&balancer).await;
    assert_eq!(balancer.snapshot().await.unwrap().loads, vec![0, 0]);
    balancer.shutdown().await.unwrap();
}

#[tokio::test]
async fn resolved_ticket_no_longer_holds_up_shutdown() {
    let balancer = Balancer::spawn(config(2), doubler).unwrap();

    let mut ticket = balancer.enqueue(1).await.unwrap();
    assert_eq!((&mut ticket).await, Ok(2));
    assert_eq!(balancer.inflight(), 0);

    let started = Instant::now();
    balancer.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    drop(ticket);
}

#[tokio::test]
async fn dropping_every_handle_stops_the_workers() {
    let (alive, stopped) = oneshot::channel::<()>();
    let balancer = Balancer::spawn(config(2), move |x: u64| -> Result<u64, TaskError> {
        let _ = &alive;
        Ok(x)
    })
    .unwrap();
    assert_eq!(balancer.submit(3).await, Ok(3));

    drop(balancer);

    // The task, and the sender it owns, is dropped once every worker exits.
    let closed = timeout(Duration::from_secs(1), stopped).await;
    assert!(matches!(closed, Ok(Err(_))));
}
