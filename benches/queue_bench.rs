use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use flume::bounded as flume_bounded;
use std::sync::mpsc::sync_channel;
use turnstile::Queue;

const MESSAGES: usize = 100_000;
const CAPACITY: usize = 1024;

fn run_queue(producers: usize, consumers: usize) {
    let queue = Arc::new(Queue::new(CAPACITY).unwrap());
    let per_producer = MESSAGES / producers;
    let per_consumer = MESSAGES / consumers;
    let mut handles = Vec::new();

    for p in 0..producers {
        let q = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                q.send(black_box(p * per_producer + i));
            }
        }));
    }

    for _ in 0..consumers {
        let q = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for _ in 0..per_consumer {
                black_box(q.recv());
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}

fn run_crossbeam(producers: usize, consumers: usize) {
    let (tx, rx) = bounded::<usize>(CAPACITY);
    let per_producer = MESSAGES / producers;
    let per_consumer = MESSAGES / consumers;
    let mut handles = Vec::new();

    for p in 0..producers {
        let tx = tx.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                tx.send(black_box(p * per_producer + i)).unwrap();
            }
        }));
    }
    drop(tx);

    for _ in 0..consumers {
        let rx = rx.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..per_consumer {
                black_box(rx.recv().unwrap());
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}

fn run_flume(producers: usize, consumers: usize) {
    let (tx, rx) = flume_bounded::<usize>(CAPACITY);
    let per_producer = MESSAGES / producers;
    let per_consumer = MESSAGES / consumers;
    let mut handles = Vec::new();

    for p in 0..producers {
        let tx = tx.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                tx.send(black_box(p * per_producer + i)).unwrap();
            }
        }));
    }
    drop(tx);

    for _ in 0..consumers {
        let rx = rx.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..per_consumer {
                black_box(rx.recv().unwrap());
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}

// std's Receiver cannot be cloned, so the std comparison stays 1p/1c.
fn run_std_spsc() {
    let (tx, rx) = sync_channel::<usize>(CAPACITY);

    let producer = thread::spawn(move || {
        for i in 0..MESSAGES {
            tx.send(black_box(i)).unwrap();
        }
    });

    let consumer = thread::spawn(move || {
        for _ in 0..MESSAGES {
            black_box(rx.recv().unwrap());
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}

fn bench_1p_1c(c: &mut Criterion) {
    let mut group = c.benchmark_group("1p_1c");
    group.throughput(Throughput::Elements(MESSAGES as u64));

    group.bench_function("turnstile", |b| b.iter(|| run_queue(1, 1)));
    group.bench_function("crossbeam_channel", |b| b.iter(|| run_crossbeam(1, 1)));
    group.bench_function("flume", |b| b.iter(|| run_flume(1, 1)));
    group.bench_function("std_mpsc", |b| b.iter(run_std_spsc));

    group.finish();
}

fn bench_4p_4c(c: &mut Criterion) {
    let mut group = c.benchmark_group("4p_4c");
    group.throughput(Throughput::Elements(MESSAGES as u64));

    group.bench_function("turnstile", |b| b.iter(|| run_queue(4, 4)));
    group.bench_function("crossbeam_channel", |b| b.iter(|| run_crossbeam(4, 4)));
    group.bench_function("flume", |b| b.iter(|| run_flume(4, 4)));

    group.finish();
}

criterion_group!(benches, bench_1p_1c, bench_4p_4c);
criterion_main!(benches);
