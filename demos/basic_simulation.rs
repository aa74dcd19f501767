use particle_accelerator_2d::*;

fn main() -> Result<(), PhysicsError> {
    let mut engine = PhysicsEngine::new(1.0 / 60.0)?;
    engine.set_parallel_enabled(true);

    let ground = engine.add_body(RigidBodyBuilder::fixed().translation(Vec2::new(0.0, -0.5)).build())?;
    engine.add_collider(ground, ColliderBuilder::new().cuboid(Vec2::new(10.0, 0.5)).build())?;

    let ball = engine.add_body(RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 4.0)).build())?;
    engine.add_collider(
        ball,
        ColliderBuilder::new().circle(0.5).restitution(0.5).build(),
    )?;

    for frame in 0..180 {
        engine.step(1.0 / 60.0);
        for event in engine.world().contact_events() {
            println!("frame {frame}: {:?} between {:?} and {:?}", event.kind, event.collider_a, event.collider_b);
        }
    }

    if let Some(body) = engine.get_body(ball) {
        println!(
            "Ball after three seconds: position {:?}, asleep: {}",
            body.position(),
            !body.is_awake()
        );
    }
    Ok(())
}
