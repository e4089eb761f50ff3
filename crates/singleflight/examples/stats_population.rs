// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Demonstrates using `SingleFlight` to keep a burst of grade requests from re-running the same
//! course-score aggregate.
//!
//! Five requests for the same course arrive almost together; the first one (leader) runs the
//! aggregate while the others (followers) wait and receive a copy of its result.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use singleflight::SingleFlight;

#[tokio::main]
async fn main() {
    let group = Arc::new(SingleFlight::<String, Vec<i64>>::new());
    let execution_count = Arc::new(AtomicUsize::new(0));

    println!("Starting 5 concurrent requests for course 01FH...\n");

    let mut handles = Vec::new();
    for i in 1..=5 {
        let group = Arc::clone(&group);
        let counter = Arc::clone(&execution_count);
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now();

            let totals = group
                .work("01FH".to_string(), || async {
                    let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    println!("  [Request {i}] leader: summing registrant scores (execution #{count})");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    vec![180, 240, 95, 300]
                })
                .await;

            println!("  [Request {i}] got {totals:?} in {:?}", start.elapsed());
        });

        handles.push(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    for handle in handles {
        handle.await.expect("Task panicked");
    }

    let total_executions = execution_count.load(Ordering::SeqCst);
    println!("\nAggregate executed {total_executions} time(s) for 5 requests.");
}
