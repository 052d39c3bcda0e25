#![allow(dead_code)]
//! Benchmarks for core ECS operations
//!
//! Run with: cargo bench
//!
//! Measures entity spawning, sequential iteration, relation wildcard
//! iteration, and parallel jobs.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relation_ecs::{Match, Target, World};

#[derive(Debug, Copy, Clone)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Copy, Clone)]
struct Likes(u32);

fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_1k_single_component", |b| {
        b.iter(|| {
            let mut world = World::new();
            for i in 0..1_000 {
                let _ = world.spawn_with((Position {
                    x: i as f32,
                    y: 0.0,
                    z: 0.0,
                },));
            }
            black_box(world.entity_count())
        });
    });

    group.bench_function("spawn_batch_10k_two_components", |b| {
        b.iter(|| {
            let mut world = World::new();
            let ids = world.spawn_batch((0..10_000).map(|i| {
                (
                    Position {
                        x: i as f32,
                        y: 0.0,
                        z: 0.0,
                    },
                    Velocity {
                        x: 1.0,
                        y: 1.0,
                        z: 1.0,
                    },
                )
            }));
            black_box(ids.len())
        });
    });

    group.finish();
}

fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("iteration");

    let mut world = World::new();
    world.spawn_batch((0..100_000).map(|i| {
        (
            Position {
                x: i as f32,
                y: 0.0,
                z: 0.0,
            },
            Velocity {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
        )
    }));

    group.bench_function("for_each_100k_two_streams", |b| {
        b.iter(|| {
            world
                .query::<(Position, Velocity)>()
                .for_each(|(pos, vel)| {
                    pos.x += vel.x;
                    pos.y += vel.y;
                    pos.z += vel.z;
                });
        });
    });

    group.bench_function("raw_100k_two_streams", |b| {
        b.iter(|| {
            let mut total = 0.0f32;
            world.query::<(Position, Velocity)>().raw(|(ps, vs)| {
                for (p, v) in ps.iter().zip(vs.iter()) {
                    total += p.x * v.x;
                }
            });
            black_box(total)
        });
    });

    #[cfg(feature = "parallel")]
    group.bench_function("job_100k_two_streams", |b| {
        b.iter(|| {
            world
                .query::<(Position, Velocity)>()
                .job(|(pos, vel)| {
                    pos.x += vel.x;
                });
        });
    });

    group.finish();
}

fn bench_relations(c: &mut Criterion) {
    let mut group = c.benchmark_group("relations");

    let mut world = World::new();
    let targets: Vec<_> = (0..4).map(|_| world.spawn()).collect();
    for i in 0..10_000u32 {
        let e = world.spawn();
        let target = targets[(i % 4) as usize];
        world
            .add_component(e, Target::Entity(target), Likes(i))
            .unwrap();
    }

    group.bench_function("wildcard_10k_four_targets", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            world
                .query::<(Likes,)>()
                .matching(0, Match::AnyEntity)
                .for_each(|(likes,)| sum += likes.0 as u64);
            black_box(sum)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_spawn, bench_iteration, bench_relations);
criterion_main!(benches);
