//! # Example: Shared dashboard
//!
//! Two widgets bound to the same key share one result: the second widget never calls the
//! action while the cached value is fresh, a superseded request is discarded, and a flaky
//! metrics endpoint is retried and polled.
//!
//! Run with:
//! ```text
//! RUST_LOG=debug cargo run --example shared_dashboard --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tasksync::{
    ActionFn, ActionRef, Bus, ExecutionContext, KeyedStore, LogWriter, RetryPolicy, Subscribe,
    SubscriberSet, TaskConfig, TaskController, TaskError, TaskKey,
};

fn load_profile(calls: Arc<AtomicU32>) -> ActionRef<u32, String> {
    ActionFn::arc("load-profile", move |id: u32, ctx: ExecutionContext| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::select! {
                _ = ctx.cancelled() => Err(TaskError::Canceled),
                _ = tokio::time::sleep(Duration::from_millis(100 * u64::from(id))) => {
                    Ok(format!("profile #{id}"))
                }
            }
        }
    })
}

fn load_metrics() -> ActionRef<(), u64> {
    let ticks = Arc::new(AtomicU32::new(0));
    ActionFn::arc("load-metrics", move |_: (), _ctx: ExecutionContext| {
        let n = ticks.fetch_add(1, Ordering::SeqCst);
        async move {
            if n % 3 == 0 {
                Err(TaskError::fail("metrics endpoint unavailable"))
            } else {
                Ok(u64::from(n) * 42)
            }
        }
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bus = Bus::new(256);
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let set = Arc::new(SubscriberSet::new(subs, bus.clone()));
    let token = CancellationToken::new();
    let listener = set.listen(token.clone());

    // Profile widgets share one store entry per user.
    let profiles = KeyedStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let profile_cfg = || {
        TaskConfig::default()
            .with_immediate(false)
            .with_cache_time(Duration::from_secs(10))
            .with_task_key(TaskKey::derive(|id: &u32| format!("profile:{id}")))
    };
    let header = TaskController::builder(load_profile(Arc::clone(&calls)))
        .with_config(profile_cfg())
        .with_store(profiles.clone())
        .with_bus(bus.clone())
        .build();
    let sidebar = TaskController::builder(load_profile(Arc::clone(&calls)))
        .with_config(profile_cfg())
        .with_store(profiles.clone())
        .with_bus(bus.clone())
        .build();

    sidebar.mount(1)?;
    let slow = tokio::spawn({
        let header = header.clone();
        async move { header.execute(3).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let fresh = header.execute(1).await?;
    println!("header  -> {fresh:?}");
    println!("slow    -> {:?} (superseded)", slow.await??);
    println!("sidebar -> {:?}", sidebar.state().data);
    println!("sidebar cached -> {:?}", sidebar.execute(1).await?);
    println!("profile action calls: {}", calls.load(Ordering::SeqCst));

    // Metrics widget polls and retries.
    let metrics = TaskController::builder(load_metrics())
        .with_config(
            TaskConfig::default()
                .with_retry(RetryPolicy::new(1).with_delay(Duration::from_millis(50)))
                .with_polling_interval(Duration::from_millis(200))
                .with_task_key("metrics"),
        )
        .with_store(KeyedStore::new())
        .with_bus(bus.clone())
        .build();
    let mut watch = metrics.watch();
    metrics.mount(())?;

    for _ in 0..4 {
        watch.changed().await?;
        let state = watch.borrow_and_update().clone();
        println!(
            "metrics -> data={:?} loading={} retries={} error={:?}",
            state.data, state.loading, state.retry_count, state.error
        );
    }
    metrics.unmount();
    header.reset();
    println!("after reset: {:?}", profiles.get_state("profile:1").map(|s| s.state.data));

    token.cancel();
    listener.await?;
    if let Ok(set) = Arc::try_unwrap(set) {
        set.shutdown().await;
    }
    Ok(())
}
