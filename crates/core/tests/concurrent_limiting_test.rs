use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use vencoder_core::runner::JobExecutor;

/// No matter how many jobs are queued, the executor never runs more than
/// `max_concurrent_jobs` of them at once, and does reach that limit
#[tokio::test]
async fn test_concurrent_job_limiting() {
    for max_concurrent in 1..=4 {
        let executor = Arc::new(JobExecutor::new(max_concurrent));
        let concurrent_count = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));

        let num_jobs = max_concurrent * 3;
        let mut handles = Vec::new();

        for job_id in 0..num_jobs {
            let executor = executor.clone();
            let concurrent_count = concurrent_count.clone();
            let max_observed = max_observed.clone();

            handles.push(tokio::spawn(async move {
                executor
                    .execute_job(|| async move {
                        let current = concurrent_count.fetch_add(1, Ordering::SeqCst) + 1;
                        max_observed.fetch_max(current, Ordering::SeqCst);

                        sleep(Duration::from_millis(50)).await;

                        concurrent_count.fetch_sub(1, Ordering::SeqCst);
                        Ok(job_id)
                    })
                    .await
            }));
        }

        for handle in handles {
            handle
                .await
                .expect("Job task panicked")
                .expect("Job failed");
        }

        let observed = max_observed.load(Ordering::SeqCst);
        assert!(
            observed <= max_concurrent,
            "Concurrent job limit violated: max_concurrent={}, observed={}",
            max_concurrent,
            observed
        );
        assert!(
            observed >= max_concurrent.min(num_jobs),
            "Did not utilize available concurrency: max_concurrent={}, observed={}",
            max_concurrent,
            observed
        );
    }
}

#[tokio::test]
async fn test_serial_by_default_keeps_order() {
    let executor = Arc::new(JobExecutor::new(1));
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    for job_id in 0..5 {
        let order = order.clone();
        executor
            .execute_job(|| async move {
                order.lock().unwrap().push(job_id);
                Ok(())
            })
            .await
            .unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(executor.available_slots(), 1);
}
