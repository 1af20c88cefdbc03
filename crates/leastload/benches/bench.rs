use core::hint::black_box;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use leastload::{
    Backpressure, Balancer, BalancerConfig, Dispatcher, IndexedHeap, TaskError, WorkRequest,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::time::Instant;
use tokio::{runtime::Builder, sync::mpsc};
use tokio_util::sync::CancellationToken;

// Number of dispatch/complete cycles per benchmark iteration.
const TOTAL_REQUESTS: usize = 4096;

/// Pops the least entry and re-inserts it with a larger key, the way the
/// dispatcher does on every request.
fn bench_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap/least_then_insert");
    group.throughput(Throughput::Elements(TOTAL_REQUESTS as u64));

    for workers in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    let mut heap = IndexedHeap::with_capacity(workers);
                    for id in 0..workers {
                        heap.insert(id, 0_usize).unwrap();
                    }
                    for _ in 0..TOTAL_REQUESTS {
                        let entry = heap.least().unwrap();
                        heap.insert(entry.id, entry.key + 1).unwrap();
                    }
                    black_box(&heap);
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

/// Drives a dispatcher directly with a random mix of requests and
/// completions. Worker queues are held by the bench, never drained.
fn bench_dispatcher(c: &mut Criterion) {
    let rt = Builder::new_current_thread().build().unwrap();
    let mut group = c.benchmark_group("dispatcher/dispatch_complete");
    group.throughput(Throughput::Elements(TOTAL_REQUESTS as u64));

    for workers in [10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let start = Instant::now();
                for _ in 0..iters {
                    let (queues, _receivers): (Vec<_>, Vec<_>) = (0..workers)
                        .map(|_| mpsc::channel(TOTAL_REQUESTS))
                        .unzip();
                    let mut dispatcher =
                        Dispatcher::<u32, u32>::new(queues, Backpressure::Reject, CancellationToken::new());
                    let mut rng = StdRng::seed_from_u64(42);
                    let mut busy = Vec::with_capacity(TOTAL_REQUESTS);

                    for payload in 0..TOTAL_REQUESTS as u32 {
                        if busy.is_empty() || rng.random_bool(0.6) {
                            let (request, _reply) = WorkRequest::new(payload);
                            if let Some(worker) = dispatcher.dispatch(request).await.unwrap() {
                                busy.push(worker);
                            }
                        } else {
                            let worker = busy.swap_remove(rng.random_range(0..busy.len()));
                            dispatcher.completed(worker).unwrap();
                        }
                    }
                    black_box(dispatcher.stats());
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

/// End-to-end submit latency through the balancer, workers included.
fn bench_balancer(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();
    let balancer = rt.block_on(async {
        Balancer::spawn(
            BalancerConfig {
                worker_count: num_workers(),
                ..BalancerConfig::default()
            },
            |x: i32| -> Result<f64, TaskError> { Ok(f64::from(x).sin()) },
        )
        .unwrap()
    });

    let mut group = c.benchmark_group("balancer/submit");
    group.throughput(Throughput::Elements(TOTAL_REQUESTS as u64));
    group.bench_function(format!("elems/{TOTAL_REQUESTS}"), |b| {
        b.to_async(&rt).iter(|| {
            let balancer = balancer.clone();
            async move {
                let tickets = futures::future::join_all(
                    (0..TOTAL_REQUESTS as i32).map(|x| balancer.submit(x % 90)),
                )
                .await;
                black_box(tickets);
            }
        });
    });
    group.finish();

    rt.block_on(balancer.shutdown()).unwrap();
}

fn num_workers() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}

criterion_group!(benches, bench_heap, bench_dispatcher, bench_balancer);
criterion_main!(benches);
