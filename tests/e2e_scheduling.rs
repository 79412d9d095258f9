//! End-to-end scheduling scenarios: work produced on one thread, executed
//! on the thread that owns it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use renderloop::test_utils::{init_test_logging, wait_until};
use renderloop::{Actor, RunLoop, Scheduler, Signal, Timer, MAX_DELIVERY_BATCH};

#[test]
fn rapid_cross_thread_sends_fire_once_on_the_owner() {
    init_test_logging();
    let rl = RunLoop::new().expect("fresh thread has no loop");

    let owner = thread::current().id();
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_on = Arc::new(Mutex::new(None));

    let counter = Arc::clone(&fired);
    let observed = Arc::clone(&fired_on);
    let signal = Arc::new(Signal::bound(rl.handle(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        *observed.lock().expect("observer poisoned") = Some(thread::current().id());
    }));

    let sender = Arc::clone(&signal);
    thread::spawn(move || {
        sender.send();
        sender.send();
        sender.send();
    })
    .join()
    .expect("sender thread panicked");

    // All three sends landed before this pass; they coalesce into one.
    rl.run_once();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(
        *fired_on.lock().expect("observer poisoned"),
        Some(owner),
        "the callback must run on the owning thread"
    );

    rl.run_once();
    assert_eq!(fired.load(Ordering::SeqCst), 1, "no send, no firing");
}

#[test]
fn posted_work_executes_on_the_running_loop_thread() {
    init_test_logging();
    let published = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&published);
    let loop_thread = thread::spawn(move || {
        let rl = RunLoop::new().expect("fresh thread has no loop");
        let handle = rl.handle();

        // Hand the handle out through the sink while the loop runs.
        sink.lock()
            .expect("sink poisoned")
            .push((thread::current().id(), handle));
        rl.run();
    });

    // Wait for the loop thread to publish its handle.
    assert!(wait_until(Duration::from_secs(2), || {
        !published.lock().expect("sink poisoned").is_empty()
    }));
    let (owner, handle) = published.lock().expect("sink poisoned")[0].clone();

    let ran_on = Arc::new(Mutex::new(None));
    let observed = Arc::clone(&ran_on);
    handle.post(move || {
        *observed.lock().expect("observer poisoned") = Some(thread::current().id());
    });

    assert!(wait_until(Duration::from_secs(2), || {
        ran_on.lock().expect("observer poisoned").is_some()
    }));
    assert_eq!(*ran_on.lock().expect("observer poisoned"), Some(owner));

    handle.stop();
    loop_thread.join().expect("loop thread panicked");
}

#[test]
fn timer_fires_during_a_blocking_run() {
    init_test_logging();
    let rl = RunLoop::new().expect("fresh thread has no loop");
    let handle = rl.handle();
    let fired = Arc::new(AtomicUsize::new(0));

    let timer = Timer::bound(rl.handle());
    let counter = Arc::clone(&fired);
    timer.start(Duration::from_millis(5), None, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        handle.stop();
    });

    // run() blocks until the timer's callback stops the loop.
    rl.run();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn many_producers_one_consumer() {
    init_test_logging();
    let rl = RunLoop::new().expect("fresh thread has no loop");
    let scheduler: Arc<dyn Scheduler> = Arc::new(rl.handle());

    let actor = Actor::new(scheduler, 0u64);
    let actor_ref = actor.actor_ref();

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let actor_ref = actor_ref.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    actor_ref.post(|total| *total += 1);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer panicked");
    }

    // Drain every batch the trampoline re-arms.
    let deadline = Instant::now() + Duration::from_secs(2);
    while actor.with(|total| *total) < 100 {
        assert!(Instant::now() < deadline, "posts were lost");
        rl.run_once();
    }
    assert_eq!(actor.with(|total| *total), 100);
}

#[test]
fn delivery_batches_do_not_starve_a_pass() {
    init_test_logging();
    let rl = RunLoop::new().expect("fresh thread has no loop");
    let scheduler: Arc<dyn Scheduler> = Arc::new(rl.handle());

    let actor = Actor::new(scheduler, 0usize);
    let actor_ref = actor.actor_ref();
    let total = 2 * MAX_DELIVERY_BATCH + 8;
    for _ in 0..total {
        actor_ref.post(|count| *count += 1);
    }

    rl.run_once();
    assert_eq!(actor.with(|count| *count), MAX_DELIVERY_BATCH);
    rl.run_once();
    assert_eq!(actor.with(|count| *count), 2 * MAX_DELIVERY_BATCH);
    rl.run_once();
    assert_eq!(actor.with(|count| *count), total);
}

#[test]
fn post_to_a_destroyed_actor_from_another_thread_is_silent() {
    init_test_logging();
    let rl = RunLoop::new().expect("fresh thread has no loop");
    let scheduler: Arc<dyn Scheduler> = Arc::new(rl.handle());

    let actor = Actor::new(scheduler, 0u64);
    let actor_ref = actor.actor_ref();
    drop(actor);

    let prober = actor_ref.clone();
    thread::spawn(move || {
        assert!(!prober.is_connected());
        prober.post(|total| *total += 1);
    })
    .join()
    .expect("prober thread panicked");

    rl.run_once();
    assert!(!actor_ref.is_connected());
}

#[test]
fn loop_drop_discards_pending_work() {
    init_test_logging();
    let fired = Arc::new(AtomicUsize::new(0));

    let handle = {
        let rl = RunLoop::new().expect("fresh thread has no loop");
        let counter = Arc::clone(&fired);
        rl.handle().post(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        rl.handle()
    };

    assert!(!handle.is_alive());
    handle.post(|| unreachable!("posted to a dead loop"));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}
