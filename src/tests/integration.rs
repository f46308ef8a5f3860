//! End-to-end scheduling and synchronization scenarios.

use crate::{Runtime, ThreadError};
use core::cell::{Cell, RefCell};
use std::rc::Rc;
use std::vec::Vec;

#[test]
fn threads_first_run_in_creation_order() {
    let rt = Runtime::new();
    let order = Rc::new(RefCell::new(Vec::new()));

    let rt2 = rt.clone();
    let order2 = order.clone();
    rt.start(move || {
        for i in 1..=3 {
            let order = order2.clone();
            rt2.spawn(move || order.borrow_mut().push(i)).unwrap();
        }
    })
    .unwrap();

    assert_eq!(*order.borrow(), [1, 2, 3]);
}

#[test]
fn yielding_children_drain_to_fifteen() {
    let rt = Runtime::new();
    let counter = Rc::new(Cell::new(0));
    let failures = Rc::new(Cell::new(0));

    let rt_parent = rt.clone();
    let c = counter.clone();
    let f = failures.clone();
    rt.start(move || {
        for _ in 0..3 {
            let rt_child = rt_parent.clone();
            let c = c.clone();
            let f = f.clone();
            rt_parent
                .spawn(move || {
                    for _ in 0..5 {
                        c.set(c.get() + 1);
                        if rt_child.yield_now().is_err() {
                            f.set(f.get() + 1);
                        }
                    }
                })
                .unwrap();
        }
    })
    .unwrap();

    assert_eq!(counter.get(), 15);
    assert_eq!(failures.get(), 0, "no operation may fail in this scenario");
}

#[test]
fn wait_resumes_after_signal_with_lock_held() {
    const L: u64 = 1;
    const C: u64 = 2;

    let rt = Runtime::new();
    let counter = Rc::new(Cell::new(0));
    let observed = Rc::new(Cell::new(-1));
    let log = Rc::new(RefCell::new(Vec::new()));

    let rt_p = rt.clone();
    let counter_p = counter.clone();
    let observed_p = observed.clone();
    let log_p = log.clone();
    rt.start(move || {
        // Thread A: waits on C while holding L.
        let rt_a = rt_p.clone();
        let counter_a = counter_p.clone();
        let observed_a = observed_p.clone();
        let log_a = log_p.clone();
        rt_p.spawn(move || {
            rt_a.lock(L).unwrap();
            log_a.borrow_mut().push("a:locked");
            rt_a.wait(L, C).unwrap();
            // Mesa invariant: the lock is held again on return.
            observed_a.set(counter_a.get());
            counter_a.set(counter_a.get() + 1);
            log_a.borrow_mut().push("a:resumed");
            rt_a.unlock(L).unwrap();
        })
        .unwrap();

        // Thread B: takes the lock A released through wait, signals.
        let rt_b = rt_p.clone();
        let counter_b = counter_p.clone();
        let log_b = log_p.clone();
        rt_p.spawn(move || {
            rt_b.lock(L).unwrap();
            counter_b.set(counter_b.get() + 1);
            rt_b.signal(L, C).unwrap();
            log_b.borrow_mut().push("b:signalled");
            rt_b.unlock(L).unwrap();
        })
        .unwrap();
    })
    .unwrap();

    assert_eq!(counter.get(), 2);
    assert_eq!(observed.get(), 1, "A must observe B's increment");
    assert_eq!(*log.borrow(), ["a:locked", "b:signalled", "a:resumed"]);
}

#[test]
fn signal_wakes_only_the_fifo_head() {
    const L: u64 = 3;
    const C: u64 = 4;

    let rt = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let rt_p = rt.clone();
    let log_p = log.clone();
    rt.start(move || {
        for name in ["w1", "w2", "w3"] {
            let rt_w = rt_p.clone();
            let log_w = log_p.clone();
            rt_p.spawn(move || {
                rt_w.lock(L).unwrap();
                rt_w.wait(L, C).unwrap();
                log_w.borrow_mut().push(name);
                rt_w.unlock(L).unwrap();
            })
            .unwrap();
        }
        // Let all three park on the condition variable.
        rt_p.yield_now().unwrap();

        for sig in ["sig1", "sig2", "sig3"] {
            log_p.borrow_mut().push(sig);
            rt_p.signal(L, C).unwrap();
            rt_p.yield_now().unwrap();
        }
    })
    .unwrap();

    assert_eq!(
        *log.borrow(),
        ["sig1", "w1", "sig2", "w2", "sig3", "w3"],
        "each signal wakes exactly the longest waiter"
    );
}

#[test]
fn broadcast_wakes_all_current_waiters_but_not_later_ones() {
    const L: u64 = 5;
    const C: u64 = 6;

    let rt = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let late_resumed = Rc::new(Cell::new(false));

    let rt_p = rt.clone();
    let log_p = log.clone();
    let late_p = late_resumed.clone();
    rt.start(move || {
        for name in ["w1", "w2"] {
            let rt_w = rt_p.clone();
            let log_w = log_p.clone();
            rt_p.spawn(move || {
                rt_w.lock(L).unwrap();
                rt_w.wait(L, C).unwrap();
                log_w.borrow_mut().push(name);
                rt_w.unlock(L).unwrap();
            })
            .unwrap();
        }
        rt_p.yield_now().unwrap();

        rt_p.broadcast(L, C).unwrap();

        // A waiter arriving after the broadcast stays parked.
        let rt_late = rt_p.clone();
        let late = late_p.clone();
        rt_p.spawn(move || {
            rt_late.lock(L).unwrap();
            rt_late.wait(L, C).unwrap();
            late.set(true);
        })
        .unwrap();

        rt_p.yield_now().unwrap();
    })
    .unwrap();

    assert_eq!(*log.borrow(), ["w1", "w2"], "broadcast wakes in wait order");
    assert!(
        !late_resumed.get(),
        "a wait issued after the broadcast must not be woken by it"
    );
}

#[test]
fn unlock_hands_off_ownership_without_switching() {
    const L: u64 = 7;

    let rt = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let rt_p = rt.clone();
    let log_p = log.clone();
    rt.start(move || {
        rt_p.lock(L).unwrap();

        let rt_w = rt_p.clone();
        let log_w = log_p.clone();
        rt_p.spawn(move || {
            log_w.borrow_mut().push("w:locking");
            rt_w.lock(L).unwrap();
            log_w.borrow_mut().push("w:got-lock");
            rt_w.unlock(L).unwrap();
        })
        .unwrap();

        // Let the worker block on the lock.
        rt_p.yield_now().unwrap();

        rt_p.unlock(L).unwrap();
        // Unlock readied the worker but did not switch to it.
        log_p.borrow_mut().push("p:after-unlock");
        rt_p.yield_now().unwrap();
    })
    .unwrap();

    assert_eq!(*log.borrow(), ["w:locking", "p:after-unlock", "w:got-lock"]);
}

#[test]
fn lock_provides_mutual_exclusion_across_yields() {
    const L: u64 = 8;

    let rt = Runtime::new();
    let in_critical = Rc::new(Cell::new(false));
    let violations = Rc::new(Cell::new(0));

    let rt_p = rt.clone();
    let in_critical_p = in_critical.clone();
    let violations_p = violations.clone();
    rt.start(move || {
        for _ in 0..3 {
            let rt_w = rt_p.clone();
            let in_critical = in_critical_p.clone();
            let violations = violations_p.clone();
            rt_p.spawn(move || {
                for _ in 0..3 {
                    rt_w.lock(L).unwrap();
                    if in_critical.get() {
                        violations.set(violations.get() + 1);
                    }
                    in_critical.set(true);
                    // Yield inside the critical section; the lock must keep
                    // every other worker out.
                    rt_w.yield_now().unwrap();
                    rt_w.yield_now().unwrap();
                    in_critical.set(false);
                    rt_w.unlock(L).unwrap();
                    rt_w.yield_now().unwrap();
                }
            })
            .unwrap();
        }
    })
    .unwrap();

    assert_eq!(violations.get(), 0);
}

#[test]
fn second_start_fails_and_does_not_reset_state() {
    let rt = Runtime::new();
    let second = Rc::new(Cell::new(None));
    let child_ran = Rc::new(Cell::new(false));

    let rt_p = rt.clone();
    let second_p = second.clone();
    let child_ran_p = child_ran.clone();
    rt.start(move || {
        let child_ran = child_ran_p.clone();
        rt_p.spawn(move || child_ran.set(true)).unwrap();

        second_p.set(rt_p.start(|| {}).err());
    })
    .unwrap();

    assert_eq!(second.get(), Some(ThreadError::AlreadyInitialized));
    assert!(
        child_ran.get(),
        "the failed re-init must not disturb the ready queue"
    );
}

#[test]
fn signalled_waiter_recontends_for_the_lock() {
    const L: u64 = 9;
    const C: u64 = 10;

    let rt = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let rt_p = rt.clone();
    let log_p = log.clone();
    rt.start(move || {
        rt_p.lock(L).unwrap();

        let rt_h = rt_p.clone();
        let log_h = log_p.clone();
        rt_p.spawn(move || {
            rt_h.lock(L).unwrap();
            rt_h.signal(L, C).unwrap();
            log_h.borrow_mut().push("h:signalled");
            // The woken waiter must block again on L until we unlock.
            rt_h.yield_now().unwrap();
            log_h.borrow_mut().push("h:unlocking");
            rt_h.unlock(L).unwrap();
        })
        .unwrap();

        rt_p.wait(L, C).unwrap();
        log_p.borrow_mut().push("p:resumed");
        rt_p.unlock(L).unwrap();
    })
    .unwrap();

    assert_eq!(*log.borrow(), ["h:signalled", "h:unlocking", "p:resumed"]);
}
