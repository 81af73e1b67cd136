//! 回调定时器集成测试
//!
//! 验证：
//! 1. tick 计数严格递增、无空洞
//! 2. 长时间运行无漂移
//! 3. 回调超时后不会突发补偿
//! 4. 回调内部调用 stop() 不会死锁

use cyclic_timing::{CallbackTimer, TimerStrategy};
use parking_lot::Mutex;
use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn test_tick_monotonic_without_gaps() {
    let timer = CallbackTimer::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    timer.set_callback(move |tick| {
        seen_cb.lock().push(tick);
        0
    });

    timer.start(1000).unwrap();
    thread::sleep(Duration::from_millis(200));
    timer.stop();

    let seen = seen.lock();
    assert!(seen.len() > 50, "only {} ticks in 200ms", seen.len());
    for (i, tick) in seen.iter().enumerate() {
        assert_eq!(*tick, i as u64 + 1, "gap or reorder at index {}", i);
    }
}

#[test]
#[serial]
fn test_drift_free_over_one_second() {
    for strategy in [TimerStrategy::Auto, TimerStrategy::SleepHybrid] {
        let timer = CallbackTimer::new();
        timer.set_strategy(strategy);
        let done_at = Arc::new(Mutex::new(None::<Instant>));
        let done_cb = done_at.clone();
        timer.set_callback(move |tick| {
            if tick == 500 {
                *done_cb.lock() = Some(Instant::now());
                return 1;
            }
            0
        });

        let start = Instant::now();
        timer.start(1000).unwrap();
        thread::sleep(Duration::from_millis(800));
        timer.stop();

        let done = done_at.lock().expect("timer did not reach 500 ticks");
        let elapsed = done - start;
        // 500 个 1ms tick：不早于 500ms，且没有明显累积漂移
        assert!(elapsed >= Duration::from_millis(499), "{:?}: {:?}", strategy, elapsed);
        assert!(elapsed < Duration::from_millis(600), "{:?}: {:?}", strategy, elapsed);
    }
}

#[test]
#[serial]
fn test_overrun_does_not_burst() {
    let timer = CallbackTimer::new();
    let times = Arc::new(Mutex::new(Vec::new()));
    let times_cb = times.clone();
    timer.set_callback(move |tick| {
        times_cb.lock().push(Instant::now());
        if tick == 5 {
            // 阻塞 20 个 tick
            thread::sleep(Duration::from_millis(20));
        }
        0
    });

    timer.start(1000).unwrap();
    thread::sleep(Duration::from_millis(60));
    timer.stop();

    assert!(timer.overruns() >= 10, "overruns = {}", timer.overruns());

    // 超时后的背靠背 tick 最多一个
    let times = times.lock();
    let back_to_back = times[5..]
        .windows(2)
        .take(5)
        .filter(|w| w[1] - w[0] < Duration::from_micros(200))
        .count();
    assert!(back_to_back <= 1, "burst of {} back-to-back ticks", back_to_back);
}

#[test]
#[serial]
fn test_stop_from_inside_callback() {
    let timer = Arc::new(CallbackTimer::new());
    let calls = Arc::new(AtomicU64::new(0));

    let weak = Arc::downgrade(&timer);
    let calls_cb = calls.clone();
    timer.set_callback(move |tick| {
        calls_cb.fetch_add(1, Ordering::SeqCst);
        if tick == 3 {
            if let Some(timer) = weak.upgrade() {
                timer.stop();
            }
        }
        0
    });

    timer.start(1000).unwrap();
    thread::sleep(Duration::from_millis(50));

    assert!(!timer.is_running());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // 外部再次 stop 回收线程句柄
    timer.stop();
}

#[test]
#[serial]
fn test_strategy_switch_while_running() {
    let timer = CallbackTimer::new();
    let count = Arc::new(AtomicU64::new(0));
    let count_cb = count.clone();
    timer.set_callback(move |_| {
        count_cb.fetch_add(1, Ordering::Relaxed);
        0
    });

    timer.set_strategy(TimerStrategy::Kernel);
    timer.start(1000).unwrap();
    thread::sleep(Duration::from_millis(30));
    timer.set_strategy(TimerStrategy::BusyWait);
    thread::sleep(Duration::from_millis(30));
    timer.stop();

    assert_eq!(timer.strategy(), TimerStrategy::BusyWait);
    assert!(count.load(Ordering::Relaxed) > 20);
}

#[test]
#[serial]
fn test_timer_with_cpu_affinity() {
    let timer = CallbackTimer::with_name("pinned-timer");
    timer.set_cpu_affinity(true);
    timer.set_callback(|tick| if tick >= 10 { 1 } else { 0 });

    timer.start(1000).unwrap();
    // 亲和性采样约 200ms
    thread::sleep(Duration::from_millis(500));
    assert!(!timer.is_running());
    assert_eq!(timer.tick_count(), 10);
    timer.stop();
}

#[test]
#[serial]
fn test_concurrent_start_stop_does_not_hang() {
    let timer = Arc::new(CallbackTimer::with_name("start-stop-race"));
    timer.set_callback(|_| 0);

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(2);
    let barrier = Arc::new(std::sync::Barrier::new(2));
    let rounds = 500;

    let starter = {
        let timer = timer.clone();
        let barrier = barrier.clone();
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            for _ in 0..rounds {
                barrier.wait();
                let _ = timer.start(1000);
            }
            let _ = done_tx.send(());
        })
    };
    let stopper = {
        let timer = timer.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            for _ in 0..rounds {
                barrier.wait();
                timer.stop();
            }
            let _ = done_tx.send(());
        })
    };

    for _ in 0..2 {
        done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("start/stop loop deadlocked");
    }
    starter.join().unwrap();
    stopper.join().unwrap();

    // 最后一次 stop 必须回收所有线程
    timer.stop();
    assert!(!timer.is_running());
    assert!(timer.start(1000).is_ok());
    timer.stop();
    assert!(!timer.is_running());
}
