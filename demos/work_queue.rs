//! Fan a batch of jobs out to worker threads and collect the results.
//!
//! A `None` job tells a worker to shut down; the feeder enqueues one per
//! worker after the real jobs.

use std::sync::Arc;
use std::thread;
use turnstile::Queue;

const NUM_WORKERS: usize = 4;
const NUM_JOBS: usize = 20;

fn main() {
    let jobs: Arc<Queue<Option<usize>>> = Arc::new(Queue::new(8).expect("queue construction"));
    let results: Arc<Queue<String>> = Arc::new(Queue::new(8).expect("queue construction"));

    let mut workers = Vec::new();
    for worker_id in 0..NUM_WORKERS {
        let jobs = Arc::clone(&jobs);
        let results = Arc::clone(&results);
        workers.push(thread::spawn(move || {
            let mut processed = 0;
            while let Some(job) = jobs.recv() {
                results.send(format!("job {job:02} done by worker {worker_id}"));
                processed += 1;
            }
            println!("worker {worker_id} finished ({processed} jobs)");
        }));
    }

    let feeder = {
        let jobs = Arc::clone(&jobs);
        thread::spawn(move || {
            for i in 0..NUM_JOBS {
                jobs.send(Some(i));
            }
            for _ in 0..NUM_WORKERS {
                jobs.send(None);
            }
        })
    };

    for _ in 0..NUM_JOBS {
        println!("{}", results.recv());
    }

    feeder.join().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }
    println!("all jobs processed");
}
