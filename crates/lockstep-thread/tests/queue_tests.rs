//! Queue delivery semantics: ordering, bulk sends, buffer reuse and
//! call-site rejection.

use lockstep_core::{CoreError, CoreResult, Queue, World};
use lockstep_thread::{ThreadEnvironment, ThreadWorld};

fn run<R: Send>(
    processors: usize,
    program: impl Fn(&ThreadWorld) -> CoreResult<R> + Sync,
) -> Vec<R> {
    ThreadEnvironment::new()
        .spawn(processors, program)
        .expect("collective run")
}

/// Messages from one sender to one destination arrive in send order.
#[test]
fn same_sender_order_is_preserved() {
    let results = run(2, |world| {
        let q = Queue::<u32>::new(world)?;
        if world.processor_id() == 1 {
            for k in 0..10 {
                q.sender(0).send(k)?;
            }
        }
        world.sync()?;
        let result = q.messages().to_vec();
        Ok(result)
    });
    assert_eq!(results[0], (0..10).collect::<Vec<_>>());
}

/// Messages from different senders interleave in source-rank order, with
/// each sender's run kept intact.
#[test]
fn cross_sender_interleave_is_source_major() {
    let results = run(3, |world| {
        let q = Queue::<(usize, u32)>::new(world)?;
        let me = world.processor_id();
        q.sender(0).send((me, 0))?;
        q.sender(0).send((me, 1))?;
        world.sync()?;
        let result = q.messages().to_vec();
        Ok(result)
    });
    assert_eq!(
        results[0],
        vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1)]
    );
}

/// Sending a batch is exactly a sequence of individual sends.
#[test]
fn send_all_is_a_sequence_of_sends() {
    let results = run(2, |world| {
        let q = Queue::<u32>::new(world)?;
        if world.processor_id() == 1 {
            q.sender(0).send(1)?;
            q.sender(0).send_all(vec![2, 3, 4])?;
            q.sender(0).send(5)?;
        }
        world.sync()?;
        let result = q.messages().to_vec();
        Ok(result)
    });
    assert_eq!(results[0], vec![1, 2, 3, 4, 5]);
}

/// A bulk send fills the array content and sets the trailing fields from
/// the given tail.
#[test]
fn send_many_carries_tail_fields() {
    let results = run(2, |world| {
        let q = Queue::<(Vec<u32>, i64)>::new(world)?;
        if world.processor_id() == 1 {
            q.sender(0).send((vec![9], 1))?;
            q.sender(0).send_many_with(&[8, 8], 2)?;
        }
        world.sync()?;
        let result = q.messages().to_vec();
        Ok(result)
    });
    assert_eq!(results[0], vec![(vec![9], 1), (vec![8, 8], 2)]);
}

/// Variable-length message fields survive the trip through the wire
/// format.
#[test]
fn string_messages_roundtrip() {
    let results = run(2, |world| {
        let q = Queue::<(String, u32)>::new(world)?;
        let me = world.processor_id();
        q.sender(1 - me).send((format!("from p{me}"), me as u32))?;
        world.sync()?;
        let result = q.messages().to_vec();
        Ok(result)
    });
    assert_eq!(results[0], vec![("from p1".to_string(), 1)]);
    assert_eq!(results[1], vec![("from p0".to_string(), 0)]);
}

/// The delivery buffer holds only the previous superstep's messages.
#[test]
fn buffer_is_replaced_each_superstep() {
    run(2, |world| {
        let q = Queue::<u32>::new(world)?;
        if world.processor_id() == 1 {
            q.sender(0).send(1)?;
        }
        world.sync()?;
        if world.processor_id() == 1 {
            q.sender(0).send(2)?;
        }
        world.sync()?;
        if world.processor_id() == 0 {
            assert_eq!(q.messages().to_vec(), vec![2]);
        }
        Ok(())
    });
}

/// Queues registered in the same world deliver independently.
#[test]
fn queues_deliver_independently() {
    run(2, |world| {
        let a = Queue::<u8>::new(world)?;
        let b = Queue::<u8>::new(world)?;
        if world.processor_id() == 1 {
            a.sender(0).send(1)?;
            b.sender(0).send(2)?;
            b.sender(0).send(3)?;
        }
        world.sync()?;
        if world.processor_id() == 0 {
            assert_eq!(a.messages().to_vec(), vec![1]);
            assert_eq!(b.messages().to_vec(), vec![2, 3]);
        }
        Ok(())
    });
}

/// A send naming a processor outside the world is rejected at the call
/// site; nothing is scheduled.
#[test]
fn send_to_invalid_processor_is_rejected() {
    run(1, |world| {
        let q = Queue::<u8>::new(world)?;
        let err = q.sender(7).send(1).unwrap_err();
        assert!(matches!(err, CoreError::InvalidProcessor { processor: 7, count: 1 }));
        world.sync()?;
        assert!(q.is_empty());
        Ok(())
    });
}

/// Dense ids: a dropped queue's id is reused by the next registration,
/// identically on every processor.
#[test]
fn ids_are_dense_and_collective() {
    let ids = run(2, |world| {
        let a = Queue::<u8>::new(world)?;
        let first = a.registration_id();
        drop(a);
        let b = Queue::<u8>::new(world)?;
        Ok((first, b.registration_id()))
    });
    assert_eq!(ids[0], ids[1]);
    assert_eq!(ids[0].0, ids[0].1);
}

#[cfg(feature = "proptest")]
mod prop {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Every message sent anywhere arrives exactly once at its
        /// destination, for arbitrary fan-out patterns.
        #[test]
        fn conservation_under_random_fanout(
            dsts in proptest::collection::vec(0usize..3, 1..24)
        ) {
            let dsts = std::sync::Arc::new(dsts);
            let counts = {
                let dsts = std::sync::Arc::clone(&dsts);
                run(3, move |world| {
                    let q = Queue::<u64>::new(world)?;
                    for (k, &dst) in dsts.iter().enumerate() {
                        q.sender(dst).send(k as u64)?;
                    }
                    world.sync()?;
                    Ok(q.len())
                })
            };
            for dst in 0..3 {
                let expected = 3 * dsts.iter().filter(|&&d| d == dst).count();
                prop_assert_eq!(counts[dst], expected);
            }
        }
    }
}
