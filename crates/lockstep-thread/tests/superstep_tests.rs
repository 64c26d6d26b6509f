//! End-to-end superstep semantics over the thread backend: delivery
//! conservation, put/get ordering across the barrier, and the degenerate
//! worlds every contract must still hold in.

use lockstep_core::{Coarray, CoreResult, Queue, Var, World};
use lockstep_thread::{ThreadEnvironment, ThreadWorld};

fn run<R: Send>(
    processors: usize,
    program: impl Fn(&ThreadWorld) -> CoreResult<R> + Sync,
) -> Vec<R> {
    ThreadEnvironment::new()
        .spawn(processors, program)
        .expect("collective run")
}

/// Each processor appends its id to a queue on processor 0. After one
/// sync, processor 0 holds exactly both ids and processor 1 holds none.
#[test]
fn hello_processor() {
    let results = run(2, |world| {
        let q = Queue::<u32>::new(world)?;
        q.sender(0).send(world.processor_id() as u32)?;
        world.sync()?;
        let mut got = q.messages().to_vec();
        got.sort_unstable();
        Ok(got)
    });
    assert_eq!(results[0], vec![0, 1]);
    assert!(results[1].is_empty());
}

/// Both processors put their id into the other's variable; after the
/// barrier the values have swapped.
#[test]
fn swap_via_variables() {
    let finals = run(2, |world| {
        let me = world.processor_id();
        let x = Var::new(world, me as u64)?;
        x.image(1 - me).put(me as u64)?;
        world.sync()?;
        let result = *x.value();
        Ok(result)
    });
    assert_eq!(finals, vec![1, 0]);
}

/// A get issued in the same superstep as a put observes the pre-put
/// value, while the put still lands.
#[test]
fn get_reads_pre_put_state() {
    let outcomes = run(2, |world| {
        let me = world.processor_id();
        let other = 1 - me;
        let x = Var::new(world, me as i64)?;
        x.image(other).put(me as i64 * 10)?;
        let f = x.image(other).get()?;
        assert!(f.try_value().is_none());
        world.sync()?;
        let result = (*x.value(), f.value());
        Ok(result)
    });
    assert_eq!(outcomes[0], (10, 1));
    assert_eq!(outcomes[1], (0, 0));
}

/// A bulk send arrives as a single message whose content is the whole
/// element vector.
#[test]
fn vector_message() {
    run(2, |world| {
        let q = Queue::<Vec<i32>>::new(world)?;
        if world.processor_id() == 1 {
            q.sender(0).send_many(&[10, 20, 30])?;
        }
        world.sync()?;
        if world.processor_id() == 0 {
            assert_eq!(q.len(), 1);
            assert_eq!(q.messages().to_vec(), vec![vec![10, 20, 30]]);
        } else {
            assert!(q.is_empty());
        }
        Ok(())
    });
}

/// All processors send one message to processor 0; its queue holds P
/// messages, every other queue none.
#[test]
fn fan_in() {
    let counts = run(4, |world| {
        let q = Queue::<usize>::new(world)?;
        q.sender(0).send(world.processor_id())?;
        world.sync()?;
        Ok(q.len())
    });
    assert_eq!(counts, vec![4, 0, 0, 0]);
}

/// Messages delivered to a queue at barrier k equal the messages sent to
/// it during superstep k-1, across every destination.
#[test]
fn message_conservation() {
    let counts = run(3, |world| {
        let q = Queue::<(usize, usize)>::new(world)?;
        let me = world.processor_id();
        for dst in 0..world.active_processors() {
            for k in 0..=dst {
                q.sender(dst).send((me, k))?;
            }
        }
        world.sync()?;
        Ok(q.len())
    });
    assert_eq!(counts, vec![3, 6, 9]);
}

/// Two syncs with no communication in between change nothing observable:
/// queues stay empty and variables keep their last written value.
#[test]
fn double_barrier_is_idempotent() {
    run(2, |world| {
        let me = world.processor_id() as u32;
        let x = Var::new(world, me)?;
        let q = Queue::<u32>::new(world)?;
        q.sender(world.next_processor()).send(me)?;
        x.image(world.next_processor()).put(me)?;
        world.sync()?;
        assert_eq!(q.len(), 1);

        world.sync()?;
        world.sync()?;
        assert!(q.is_empty());
        assert_eq!(*x.value(), world.prev_processor() as u32);
        Ok(())
    });
}

/// A plain barrier synchronises without resolving communication: the
/// delivery buffer survives it untouched.
#[test]
fn barrier_leaves_queues_alone() {
    run(2, |world| {
        let q = Queue::<u8>::new(world)?;
        q.sender(world.processor_id()).send(1)?;
        world.sync()?;
        assert_eq!(q.len(), 1);

        world.barrier()?;
        assert_eq!(q.len(), 1);

        world.sync()?;
        assert!(q.is_empty());
        Ok(())
    });
}

/// With one processor every contract degenerates to local moves and
/// still holds.
#[test]
fn single_processor_world() {
    run(1, |world| {
        assert_eq!(world.active_processors(), 1);
        assert_eq!(world.next_processor(), 0);

        let x = Var::new(world, 5i32)?;
        let q = Queue::<(i32, String)>::new(world)?;
        q.sender(0).send((1, "self".to_string()))?;
        x.image(0).put(7)?;
        let f = x.image(0).get()?;
        world.sync()?;

        assert_eq!(*x.value(), 7);
        assert_eq!(f.value(), 5);
        assert_eq!(q.messages().to_vec(), vec![(1, "self".to_string())]);
        Ok(())
    });
}

/// An empty delivery leaves the queue with size zero.
#[test]
fn empty_queue_delivery() {
    run(2, |world| {
        let q = Queue::<u64>::new(world)?;
        world.sync()?;
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
        Ok(())
    });
}

/// Zero-sized puts and gets are legal no-ops.
#[test]
fn zero_sized_transfers() {
    run(2, |world| {
        let other = 1 - world.processor_id();
        let arr = Coarray::new(world, 4, 0u64)?;
        arr.image(other).slice(2..2).put(&[])?;
        let f = arr.image(other).slice(1..1).get()?;
        world.sync()?;
        assert_eq!(f.value(), Vec::<u64>::new());
        assert!(arr.local().iter().all(|&v| v == 0));
        Ok(())
    });
}
