use lodestar_core::config::ThreadPoolConfig;
use lodestar_core::threadpool::{KernelDispatcher, ThreadPoolBackend};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn dispatcher(backend: ThreadPoolBackend) -> KernelDispatcher {
    KernelDispatcher::new(&ThreadPoolConfig {
        backend: Some(backend),
        kernel_arena_width: 3,
        ..Default::default()
    })
    .unwrap()
}

fn backends() -> impl Strategy<Value = ThreadPoolBackend> {
    prop_oneof![
        Just(ThreadPoolBackend::Futures),
        Just(ThreadPoolBackend::WorkStealing),
        Just(ThreadPoolBackend::Inline),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_join_returns_spawn_order(backend in backends(), k in 0usize..48, jitter in proptest::collection::vec(0u64..200, 48)) {
        let dispatcher = dispatcher(backend);
        let mut pool = dispatcher.pool::<usize>();
        for i in 0..k {
            let spin = jitter[i];
            pool.spawn(move || {
                std::thread::sleep(std::time::Duration::from_micros(spin));
                i
            })
            .unwrap();
        }
        prop_assert_eq!(pool.join().unwrap(), (0..k).collect::<Vec<_>>());
    }

    #[test]
    fn prop_unit_join_waits_for_all(backend in backends(), k in 0usize..48) {
        let dispatcher = dispatcher(backend);
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pool = dispatcher.pool::<()>();
        for _ in 0..k {
            let counter = counter.clone();
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.join().unwrap();
        prop_assert_eq!(counter.load(Ordering::SeqCst), k);
    }
}

#[test]
fn test_interleaved_pools_share_arena() -> anyhow::Result<()> {
    let dispatcher = dispatcher(ThreadPoolBackend::WorkStealing);
    let mut outer = dispatcher.pool::<usize>();
    for i in 0..4 {
        outer.spawn(move || i * 10)?;
    }
    let mut second = dispatcher.pool::<usize>();
    second.spawn(|| 99)?;
    assert_eq!(second.join()?, vec![99]);
    assert_eq!(outer.join()?, vec![0, 10, 20, 30]);
    Ok(())
}
