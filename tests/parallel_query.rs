#![cfg(feature = "parallel")]

use std::sync::atomic::{AtomicUsize, Ordering};

use relation_ecs::{Match, Target, World};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Count(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[test]
fn job_touches_every_row_exactly_once() {
    let mut world = World::new();
    for _ in 0..10_000 {
        world.spawn_with((Count(0),));
    }

    let invocations = AtomicUsize::new(0);
    world.query::<(Count,)>().job(|(count,)| {
        count.0 += 1;
        invocations.fetch_add(1, Ordering::Relaxed);
    });

    assert_eq!(invocations.load(Ordering::Relaxed), 10_000);

    let mut rows = 0;
    world.query::<(Count,)>().for_each(|(count,)| {
        assert_eq!(*count, Count(1));
        rows += 1;
    });
    assert_eq!(rows, 10_000);
}

#[test]
fn job_runs_across_multiple_archetypes() {
    let mut world = World::new();

    for i in 0..5000 {
        world.spawn_with((
            Position {
                x: i as f32,
                y: 0.0,
            },
            Velocity { x: 1.0, y: 1.0 },
        ));
    }
    for i in 0..5000 {
        let e = world.spawn_with((
            Position {
                x: i as f32,
                y: 100.0,
            },
            Velocity { x: 2.0, y: 2.0 },
        ));
        world.add_component(e, Target::Plain, Count(0)).unwrap();
    }

    world.query::<(Position, Velocity)>().job(|(pos, vel)| {
        pos.x += vel.x;
        pos.y += vel.y;
    });

    let mut count = 0;
    world.query::<(Position, Velocity)>().for_each(|(pos, _)| {
        if pos.y < 50.0 {
            assert_eq!(pos.y, 1.0);
        } else {
            assert_eq!(pos.y, 102.0);
        }
        count += 1;
    });
    assert_eq!(count, 10_000);
}

#[test]
fn job_with_shares_the_uniform() {
    let mut world = World::new();
    for _ in 0..128 {
        world.spawn_with((Count(0),));
    }

    let seen = AtomicUsize::new(0);
    world
        .query::<(Count,)>()
        .job_with(&seen, |seen, (_count,)| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
    assert_eq!(seen.load(Ordering::Relaxed), 128);
}

#[test]
fn warmup_then_job_still_correct() {
    let mut world = World::new();
    for _ in 0..64 {
        world.spawn_with((Count(0),));
    }

    let mut query = world.query::<(Count,)>();
    query.warmup();
    query.job(|(count,)| count.0 += 1);

    let mut all_one = true;
    world
        .query::<(Count,)>()
        .for_each(|(count,)| all_one &= *count == Count(1));
    assert!(all_one);

    // Warmup left the data untouched before the real pass.
    assert_eq!(world.query::<(Count,)>().matching(0, Match::Plain).count(), 64);
}
