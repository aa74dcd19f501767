use particle_accelerator_2d::*;

fn main() -> Result<(), PhysicsError> {
    let mut world = PhysicsWorld::new(WorldConfig::default().with_gravity(Vec2::ZERO))?;

    for i in 0..5 {
        let id = world.build_body(RigidBodyBuilder::fixed().translation(Vec2::new(i as f32 * 3.0, 0.0)))?;
        let shape = if i % 2 == 0 {
            ColliderBuilder::new().circle(1.0)
        } else {
            ColliderBuilder::new().cuboid(Vec2::new(0.5, 1.0))
        };
        world.create_collider(id, shape.build())?;
    }

    let query = RaycastQuery::new(Vec2::new(-5.0, 0.25), Vec2::X, 30.0);
    for hit in world.raycast(&query) {
        println!(
            "hit collider {:?} at {:?} (normal {:?}, distance {:.3})",
            hit.collider_id, hit.point, hit.normal, hit.distance
        );
    }

    let down = RaycastQuery::new(Vec2::new(3.0, 5.0), Vec2::NEG_Y, 10.0);
    match world.raycast_closest(&down) {
        Some(hit) => println!("downward ray stopped at {:?}", hit.point),
        None => println!("downward ray missed"),
    }
    Ok(())
}
