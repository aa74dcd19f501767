use particle_accelerator_2d::{config::LINEAR_SLOP, *};

fn world() -> PhysicsWorld {
    PhysicsWorld::new(WorldConfig::default()).expect("default config is valid")
}

fn ground(world: &mut PhysicsWorld) -> EntityId {
    let id = world
        .build_body(RigidBodyBuilder::fixed().translation(Vec2::new(0.0, -0.5)))
        .expect("ground body");
    world
        .create_collider(id, ColliderBuilder::new().cuboid(Vec2::new(20.0, 0.5)).build())
        .expect("ground collider");
    id
}

fn crate_box(world: &mut PhysicsWorld, position: Vec2) -> EntityId {
    let id = world
        .build_body(RigidBodyBuilder::dynamic().translation(position))
        .expect("box body");
    world
        .create_collider(id, ColliderBuilder::new().cuboid(Vec2::splat(0.5)).build())
        .expect("box collider");
    id
}

#[test]
fn bodies_fall_under_gravity() {
    let mut world = world();
    let body_id = world
        .build_body(RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 10.0)))
        .expect("body");

    world.step(1.0 / 60.0);

    let position_y = world.body(body_id).expect("body should exist").position().y;
    assert!(position_y < 10.0, "body should start falling, y = {}", position_y);
}

#[test]
fn static_bodies_never_move() {
    let mut world = world();
    let ground = ground(&mut world);
    let before = world.body(ground).expect("ground").transform();
    for i in 0..4 {
        crate_box(&mut world, Vec2::new(i as f32 * 0.3, 1.0 + i as f32 * 1.2));
    }

    for _ in 0..180 {
        world.step_fixed();
    }

    let after = world.body(ground).expect("ground");
    assert_eq!(after.transform(), before);
    assert_eq!(after.linear_velocity(), Vec2::ZERO);
    assert_eq!(after.angular_velocity(), 0.0);
}

#[test]
fn resting_stack_sleeps_and_stops_solver_work() {
    let mut world = world();
    ground(&mut world);
    let boxes: Vec<EntityId> = (0..3)
        .map(|i| crate_box(&mut world, Vec2::new(0.0, 0.5 + i as f32)))
        .collect();

    let mut asleep = false;
    for _ in 0..600 {
        world.step_fixed();
        if boxes
            .iter()
            .all(|id| world.body(*id).is_some_and(|b| !b.is_awake()))
        {
            asleep = true;
            break;
        }
    }
    assert!(asleep, "stack never fell asleep");

    world.step_fixed();
    assert_eq!(world.profile().solver.islands_solved, 0);
    assert_eq!(world.profile().awake_body_count, 0);
    for (i, id) in boxes.iter().enumerate() {
        let y = world.body(*id).expect("box").position().y;
        assert!((y - (0.5 + i as f32)).abs() < 0.05, "box {i} drifted to {y}");
    }
}

#[test]
fn touching_a_sleeping_body_wakes_it() {
    let mut world = world();
    ground(&mut world);
    let sleeper = world
        .build_body(RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 0.5)).awake(false))
        .expect("sleeper");
    world
        .create_collider(sleeper, ColliderBuilder::new().cuboid(Vec2::splat(0.5)).build())
        .expect("collider");
    world.step_fixed();
    // Adding a collider wakes the body; let it settle and sleep again.
    for _ in 0..300 {
        world.step_fixed();
    }
    assert!(world.body(sleeper).is_some_and(|b| !b.is_awake()));

    crate_box(&mut world, Vec2::new(0.0, 3.0));
    let mut woke = false;
    for _ in 0..120 {
        world.step_fixed();
        woke |= world.body(sleeper).is_some_and(|b| b.is_awake());
    }
    assert!(woke);
}

#[test]
fn bouncing_ball_never_gains_energy() {
    let config = WorldConfig::default();
    let g = -config.gravity.y;
    let mut world = PhysicsWorld::new(config).expect("world");
    ground(&mut world);
    let ball = world
        .build_body(RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 3.0)))
        .expect("ball");
    world
        .create_collider(ball, ColliderBuilder::new().circle(0.5).restitution(0.8).build())
        .expect("collider");

    let energy = |world: &PhysicsWorld| {
        let body = world.body(ball).expect("ball");
        let v = body.linear_velocity();
        0.5 * body.mass() * v.length_squared()
            + 0.5 * body.inertia() * body.angular_velocity().powi(2)
            + body.mass() * g * body.world_center().y
    };
    let initial = energy(&world);
    for step in 0..600 {
        world.step_fixed();
        let current = energy(&world);
        assert!(
            current <= initial * 1.01 + 0.05,
            "energy rose to {current} from {initial} at step {step}"
        );
    }
}

#[test]
fn kinematic_body_follows_its_velocity() {
    let mut world = world();
    let platform = world
        .build_body(RigidBodyBuilder::kinematic().linear_velocity(Vec2::new(1.0, 0.0)))
        .expect("platform");
    world
        .create_collider(platform, ColliderBuilder::new().cuboid(Vec2::new(2.0, 0.1)).build())
        .expect("collider");

    for _ in 0..60 {
        world.step_fixed();
    }
    let body = world.body(platform).expect("platform");
    assert!((body.position().x - 1.0).abs() < 1e-3);
    assert_eq!(body.position().y, 0.0);
}

#[test]
fn warm_starting_reaches_same_rest_state() {
    let settle = |warm: bool| {
        let config = WorldConfig {
            enable_warm_starting: warm,
            enable_sleep: false,
            ..WorldConfig::default()
        };
        let mut world = PhysicsWorld::new(config).expect("world");
        ground(&mut world);
        let id = crate_box(&mut world, Vec2::new(0.0, 0.5));
        for _ in 0..240 {
            world.step_fixed();
        }
        world.body(id).expect("box").position()
    };
    let warm = settle(true);
    let cold = settle(false);
    assert!((warm - cold).length() < 0.01, "warm {warm} cold {cold}");
}

#[test]
fn converged_stack_is_a_solver_fixed_point() {
    let config = WorldConfig::default().with_sleep(false);
    let mut world = PhysicsWorld::new(config).expect("world");
    ground(&mut world);
    let ids: Vec<EntityId> = (0..3)
        .map(|level| crate_box(&mut world, Vec2::new(0.0, 0.5 + level as f32)))
        .collect();
    for _ in 0..300 {
        world.step_fixed();
    }

    let velocities = |world: &PhysicsWorld| -> Vec<(Vec2, f32)> {
        ids.iter()
            .map(|id| {
                let body = world.body(*id).expect("box");
                (body.linear_velocity(), body.angular_velocity())
            })
            .collect()
    };

    // Each further step re-solves the island from its stored impulses.
    for _ in 0..30 {
        let before = velocities(&world);
        world.step_fixed();
        let after = velocities(&world);
        assert_eq!(world.profile().solver.contacts_solved, 3);
        for ((v0, w0), (v1, w1)) in before.iter().zip(&after) {
            assert!((*v1 - *v0).length() < 1e-4, "linear change {}", (*v1 - *v0).length());
            assert!((w1 - w0).abs() < 1e-4, "angular change {}", (w1 - w0).abs());
        }
    }
}

#[test]
fn box_rides_descending_kinematic_platform() {
    let config = WorldConfig::default().with_sleep(false);
    let mut world = PhysicsWorld::new(config).expect("world");
    let platform = world
        .build_body(RigidBodyBuilder::kinematic().linear_velocity(Vec2::new(0.0, -3.0)))
        .expect("platform");
    world
        .create_collider(platform, ColliderBuilder::new().cuboid(Vec2::new(2.0, 0.25)).build())
        .expect("platform collider");
    let rider = crate_box(&mut world, Vec2::new(0.0, 0.75));

    for step in 0..240 {
        world.step_fixed();
        if step < 90 {
            continue;
        }
        let top = world.body(platform).expect("platform").position().y + 0.25;
        let body = world.body(rider).expect("rider");
        let gap = body.position().y - 0.5 - top;
        assert!(gap < LINEAR_SLOP && gap > -3.0 * LINEAR_SLOP, "step {step}: gap {gap}");
        assert!(
            (body.linear_velocity().y + 3.0).abs() < 0.05,
            "step {step}: rider vy {}",
            body.linear_velocity().y
        );
    }
}

#[test]
fn force_generators_run_each_step() {
    let config = WorldConfig::default().with_gravity(Vec2::ZERO);
    let mut world = PhysicsWorld::new(config).expect("world");
    let body = world
        .build_body(RigidBodyBuilder::dynamic().translation(Vec2::new(3.0, 0.0)))
        .expect("body");
    world.force_registry_mut().add_force(SpringForce {
        anchor: Vec2::ZERO,
        rest_length: 0.0,
        spring_constant: 20.0,
        damping: 2.0,
    });
    for _ in 0..30 {
        world.step_fixed();
    }
    let x = world.body(body).expect("body").position().x;
    assert!(x < 3.0, "spring did not pull, x = {x}");
}

#[test]
fn profile_counts_match_world() {
    let mut world = world();
    ground(&mut world);
    crate_box(&mut world, Vec2::new(0.0, 0.5));
    crate_box(&mut world, Vec2::new(5.0, 0.5));
    world.step_fixed();

    let profile = world.profile();
    assert_eq!(profile.body_count, 3);
    assert_eq!(profile.proxy_count, 3);
    assert_eq!(profile.island_count, 2);
    assert_eq!(profile.solver.islands_solved, 2);
    assert_eq!(profile.contact_count, 2);
    assert!(profile.total >= profile.solve);
}
