use blox_server::server::bind_ephemeral;

/// Smoke test: server can run a few ticks without panicking.
#[tokio::test]
async fn server_runs_few_ticks() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(64).await?;
    server.run_for_ticks(3).await?;
    assert_eq!(server.tick(), 3);
    Ok(())
}

/// The sample vehicle gets its hull collider once the mesh fetch lands.
#[tokio::test]
async fn vehicle_collider_is_attached_after_a_few_ticks() -> anyhow::Result<()> {
    use blox_shared::ecs::{ConvexHullCollider, Vehicle};

    let (mut server, _cfg) = bind_ephemeral(64).await?;
    server.run_for_ticks(5).await?;
    let world = &server.simulation().world;
    let vehicle = world.with::<Vehicle>()[0];
    assert!(world
        .get::<ConvexHullCollider>(vehicle)
        .is_some_and(|c| c.collider.is_some()));
    Ok(())
}
