use particle_accelerator_2d::*;

fn main() -> Result<(), PhysicsError> {
    let mut world = PhysicsWorld::new(WorldConfig::default())?;

    let ground = world.build_body(RigidBodyBuilder::fixed().translation(Vec2::new(0.0, -0.5)))?;
    world.create_collider(ground, ColliderBuilder::new().cuboid(Vec2::new(20.0, 0.5)).build())?;

    let mut boxes = Vec::new();
    for level in 0..10 {
        let id = world.build_body(RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 0.5 + level as f32)))?;
        world.create_collider(id, ColliderBuilder::new().cuboid(Vec2::splat(0.5)).friction(0.6).build())?;
        boxes.push(id);
    }

    for second in 1..=5 {
        for _ in 0..60 {
            world.step_fixed();
        }
        let profile = world.profile();
        println!(
            "t={second}s islands={} contacts={} awake={} solve={:?}",
            world.island_count(),
            world.contact_count(),
            profile.awake_body_count,
            profile.solve,
        );
    }

    if let Some(top) = boxes.last().and_then(|id| world.body(*id)) {
        println!("Top box rests at {:?}", top.position());
    }
    Ok(())
}
