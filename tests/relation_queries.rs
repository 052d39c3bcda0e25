use relation_ecs::{EcsError, Match, ObjectId, Target, World};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Likes(u32);

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Strength(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tag;

#[test]
fn relations_build_a_join_key() {
    let mut world = World::new();
    let alice = world.spawn();
    let bob = world.spawn();

    // Three fans of alice, one of bob.
    for i in 0..3 {
        let fan = world.spawn();
        world
            .add_component(fan, Target::Entity(alice), Likes(i))
            .unwrap();
    }
    let fan = world.spawn();
    world
        .add_component(fan, Target::Entity(bob), Likes(9))
        .unwrap();

    let mut alice_fans = 0;
    world
        .query::<(Likes,)>()
        .matching(0, Match::Entity(alice))
        .for_each(|_| alice_fans += 1);
    assert_eq!(alice_fans, 3);

    let mut all_fans = 0;
    world
        .query::<(Likes,)>()
        .matching(0, Match::AnyEntity)
        .for_each(|_| all_fans += 1);
    assert_eq!(all_fans, 4);
}

#[test]
fn mixed_targets_resolve_by_family() {
    let mut world = World::new();
    let friend = world.spawn();

    let e = world.spawn();
    world.add_component(e, Target::Plain, Strength(1)).unwrap();
    world
        .add_component(e, Target::Entity(friend), Strength(2))
        .unwrap();
    world
        .add_component(e, Target::Object(ObjectId::new(7)), Strength(3))
        .unwrap();

    assert_eq!(
        world.get_component::<Strength>(e, Match::Plain).unwrap(),
        &Strength(1)
    );
    assert_eq!(
        world
            .get_component::<Strength>(e, Match::Entity(friend))
            .unwrap(),
        &Strength(2)
    );
    assert_eq!(
        world
            .get_component::<Strength>(e, Match::AnyObject)
            .unwrap(),
        &Strength(3)
    );

    // One entity, three columns of the same type: the any-wildcard query
    // visits each column once.
    let mut visits = 0;
    world
        .query::<(Strength,)>()
        .matching(0, Match::Any)
        .for_each(|_| visits += 1);
    assert_eq!(visits, 3);
}

#[test]
fn entity_streams_pair_components_with_ids() {
    let mut world = World::new();
    let mut spawned = Vec::new();
    for i in 0..32 {
        spawned.push(world.spawn_with((Likes(i),)));
    }

    let mut seen = Vec::new();
    world
        .query::<(Likes,)>()
        .for_each_entity(|entity, (likes,)| seen.push((entity, likes.0)));

    seen.sort_by_key(|(e, _)| *e);
    spawned.sort();
    assert_eq!(seen.len(), 32);
    for ((entity, value), expected) in seen.iter().zip(&spawned) {
        assert_eq!(entity, expected);
        let stored = world.get_component::<Likes>(*entity, Match::Plain).unwrap();
        assert_eq!(stored.0, *value);
    }
}

#[test]
fn get_or_create_relation_components() {
    let mut world = World::new();
    let target = world.spawn();
    let e = world.spawn_with((Tag,));

    // Wildcards cannot create.
    assert!(matches!(
        world
            .get_or_create_component::<Strength>(e, Match::AnyEntity)
            .map(|_| ()),
        Err(EcsError::InvalidMatch)
    ));

    {
        let strength = world
            .get_or_create_component::<Strength>(e, Match::Entity(target))
            .unwrap();
        assert_eq!(*strength, Strength(0));
        strength.0 = 11;
    }

    // Second call resolves the existing column, including via wildcard.
    let strength = world
        .get_or_create_component::<Strength>(e, Match::AnyEntity)
        .unwrap();
    assert_eq!(*strength, Strength(11));

    assert!(world.has_component::<Tag>(e, Match::Plain));
}

#[test]
fn removal_by_exact_target_only() {
    let mut world = World::new();
    let t1 = world.spawn();
    let t2 = world.spawn();
    let e = world.spawn();
    world.add_component(e, Target::Entity(t1), Likes(1)).unwrap();
    world.add_component(e, Target::Entity(t2), Likes(2)).unwrap();

    world
        .remove_component::<Likes>(e, Target::Entity(t1))
        .unwrap();
    assert!(!world.has_component::<Likes>(e, Match::Entity(t1)));
    assert!(world.has_component::<Likes>(e, Match::Entity(t2)));

    assert_eq!(
        world.remove_component::<Likes>(e, Target::Entity(t1)),
        Err(EcsError::ComponentNotFound)
    );
}
