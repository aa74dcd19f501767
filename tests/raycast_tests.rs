use approx::assert_relative_eq;
use particle_accelerator_2d::*;

fn world_with_boxes(xs: &[f32]) -> (PhysicsWorld, Vec<EntityId>) {
    let mut world = PhysicsWorld::new(WorldConfig::default()).expect("world");
    let mut colliders = Vec::new();
    for &x in xs {
        let body = world
            .build_body(RigidBodyBuilder::fixed().translation(Vec2::new(x, 0.0)))
            .expect("body");
        colliders.push(
            world
                .create_collider(body, ColliderBuilder::new().cuboid(Vec2::splat(0.5)).build())
                .expect("collider"),
        );
    }
    (world, colliders)
}

#[test]
fn closest_hit_reports_point_normal_and_distance() {
    let (world, colliders) = world_with_boxes(&[5.0, 10.0]);
    let query = RaycastQuery::new(Vec2::ZERO, Vec2::X, 20.0);
    let hit = world.raycast_closest(&query).expect("hit");

    assert_eq!(hit.collider_id, colliders[0]);
    assert_relative_eq!(hit.point.x, 4.5, epsilon = 1e-4);
    assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-4);
    assert_relative_eq!(hit.distance, 4.5, epsilon = 1e-4);
    assert_relative_eq!(hit.fraction, 4.5 / 20.0, epsilon = 1e-5);
}

#[test]
fn all_hits_are_sorted_nearest_first() {
    let (world, colliders) = world_with_boxes(&[10.0, 5.0, 15.0]);
    let query = RaycastQuery::new(Vec2::ZERO, Vec2::X, 20.0);
    let hits = world.raycast(&query);
    let order: Vec<EntityId> = hits.iter().map(|hit| hit.collider_id).collect();
    assert_eq!(order, vec![colliders[1], colliders[0], colliders[2]]);
}

#[test]
fn ray_shorter_than_gap_misses() {
    let (world, _) = world_with_boxes(&[5.0]);
    let query = RaycastQuery::new(Vec2::ZERO, Vec2::X, 4.0);
    assert!(world.raycast_closest(&query).is_none());
    assert!(world.raycast(&query).is_empty());
}

#[test]
fn degenerate_rays_hit_nothing() {
    let (world, _) = world_with_boxes(&[5.0]);
    assert!(world
        .raycast_closest(&RaycastQuery::new(Vec2::ZERO, Vec2::ZERO, 10.0))
        .is_none());
    assert!(world
        .raycast_closest(&RaycastQuery::new(Vec2::ZERO, Vec2::X, 0.0))
        .is_none());
}

#[test]
fn mask_and_sensor_flags_filter_hits() {
    let mut world = PhysicsWorld::new(WorldConfig::default()).expect("world");
    let near = world
        .build_body(RigidBodyBuilder::fixed().translation(Vec2::new(3.0, 0.0)))
        .expect("near");
    world
        .create_collider(near, ColliderBuilder::new().circle(0.5).sensor(true).build())
        .expect("sensor");
    let middle = world
        .build_body(RigidBodyBuilder::fixed().translation(Vec2::new(6.0, 0.0)))
        .expect("middle");
    world
        .create_collider(middle, ColliderBuilder::new().circle(0.5).filter(0b10, u32::MAX).build())
        .expect("layer two");
    let far = world
        .build_body(RigidBodyBuilder::fixed().translation(Vec2::new(9.0, 0.0)))
        .expect("far");
    let far_collider = world
        .create_collider(far, ColliderBuilder::new().circle(0.5).build())
        .expect("layer one");

    let query = RaycastQuery::new(Vec2::ZERO, Vec2::X, 20.0).with_mask(0b01);
    let hit = world.raycast_closest(&query).expect("hit");
    assert_eq!(hit.collider_id, far_collider);

    let with_sensors = RaycastQuery::new(Vec2::ZERO, Vec2::X, 20.0).with_sensors(true);
    let hit = world.raycast_closest(&with_sensors).expect("hit");
    assert_eq!(hit.body_id, near);
}

#[test]
fn rotated_box_is_hit_on_its_corner() {
    let mut world = PhysicsWorld::new(WorldConfig::default()).expect("world");
    let body = world
        .build_body(
            RigidBodyBuilder::fixed()
                .translation(Vec2::new(5.0, 0.0))
                .rotation(std::f32::consts::FRAC_PI_4),
        )
        .expect("body");
    world
        .create_collider(body, ColliderBuilder::new().cuboid(Vec2::splat(0.5)).build())
        .expect("collider");

    let hit = world
        .raycast_closest(&RaycastQuery::new(Vec2::ZERO, Vec2::X, 10.0))
        .expect("hit");
    assert_relative_eq!(hit.point.x, 5.0 - 0.5 * std::f32::consts::SQRT_2, epsilon = 1e-3);
}
