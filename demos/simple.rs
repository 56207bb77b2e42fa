//! Simple usage example: one producer, one consumer.

use std::sync::Arc;
use std::thread;
use turnstile::Queue;

fn main() {
    let queue = Arc::new(Queue::new(16).expect("queue construction"));

    let producer_queue = Arc::clone(&queue);
    let producer = thread::spawn(move || {
        for i in 0..10 {
            let message = format!("message {i}");
            println!("sending: {message}");
            producer_queue.send(message);
        }
        println!("producer finished");
    });

    let consumer_queue = Arc::clone(&queue);
    let consumer = thread::spawn(move || {
        for _ in 0..10 {
            let message = consumer_queue.recv();
            println!("received: {message}");
        }
        println!("consumer finished");
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}
