// This file is part of weft, a cooperative fiber scheduling library.
// See the LICENSE file included in this distribution.

//! Recursive stress scenario: fibers that schedule fibers, generators whose
//! producers run nested schedulers that call back into the same machinery,
//! endless producers consumed up to a bound, and plain yields interleaved
//! with generator pulls.

use std::cell::Cell;
use std::rc::Rc;

use weft::{schedule, scheduler_run, yield_now, FiberScheduler, Generator, Yielder};

#[derive(Clone, Default)]
struct Counters {
    calls: Rc<Cell<usize>>,
    exits: Rc<Cell<usize>>,
}

fn producer(x: u32, y: &Yielder<u32>, counters: &Counters) {
    if x == 0 {
        return;
    }
    if x % 2 == 0 {
        let result = Rc::new(Cell::new(0));
        let local = FiberScheduler::new();
        {
            let result = Rc::clone(&result);
            let counters = counters.clone();
            local
                .schedule(move || result.set(process(x / 2, &counters)))
                .unwrap();
        }
        scheduler_run(&local);
        y.yield_value(result.get());
        return;
    }
    loop {
        y.yield_value(x);
    }
}

fn process(x: u32, counters: &Counters) -> u32 {
    counters.calls.set(counters.calls.get() + 1);

    if x != 0 {
        let counters = counters.clone();
        schedule(move || {
            process(x - 1, &counters);
        })
        .unwrap();
    }
    yield_now().unwrap();

    let mut sum = 0;
    let generator = {
        let counters = counters.clone();
        Generator::new(move |y| producer(x, y, &counters))
    };
    for elem in generator {
        yield_now().unwrap();
        if x % 2 == 1 {
            assert_eq!(elem, x);
        }
        sum += elem;
        if sum > 100 {
            break;
        }
    }

    yield_now().unwrap();

    counters.exits.set(counters.exits.get() + 1);
    sum
}

#[test]
fn stress() {
    let req = 6;
    let counters = Counters::default();

    let sched = FiberScheduler::new();
    for _ in 0..2 {
        let counters = counters.clone();
        sched
            .schedule(move || {
                process(req, &counters);
            })
            .unwrap();
    }
    scheduler_run(&sched);

    // Every process invocation, however deeply nested under generators and
    // local schedulers, ran to completion.
    assert_eq!(counters.calls.get(), counters.exits.get());
    assert!(counters.calls.get() >= 2 * (req as usize + 1));
}
