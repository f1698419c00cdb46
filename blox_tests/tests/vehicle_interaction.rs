//! Boarding and leaving through the server's message path, without sockets.

use blox_server::{server::bind_ephemeral, transport::ConnectionHandle};
use blox_shared::{
    ecs::{EntityId, PhysicsBody, Position, Text, Vehicle, VehicleOccupancy},
    math::Vec3,
    protocol::{ClientId, ClientMessage, InputMessage, ServerMessage},
};

fn interact() -> Vec<u8> {
    ClientMessage::Input(InputMessage {
        interact: true,
        ..InputMessage::default()
    })
    .encode()
    .unwrap()
}

#[tokio::test]
async fn board_by_proximity_then_disconnect_empties_the_seat() -> anyhow::Result<()> {
    let (mut server, _cfg) = bind_ephemeral(20).await?;
    let (conn, mut rx) = ConnectionHandle::in_memory(ClientId(50_000), usize::MAX);
    server.on_connect(conn);
    let frame = rx.try_recv()?;
    let ServerMessage::FirstConnection(hello) = ServerMessage::decode(&frame[4..])? else {
        panic!("expected FirstConnection");
    };
    let player: EntityId = hello.id;

    let sim = server.simulation_mut();
    let vehicle = sim.world.with::<Vehicle>()[0];
    let beside = sim.world.get::<Position>(vehicle).unwrap().to_vec3().add(Vec3::new(1.0, 0.0, 0.0));
    let body = sim.world.get::<PhysicsBody>(player).unwrap().handle;
    sim.physics.set_translation(body, beside);
    *sim.world.get_mut::<Position>(player).unwrap() = Position::from(beside);

    server.on_message(ClientId(50_000), &interact());
    server.step(0.05);

    let world = &server.simulation().world;
    assert_eq!(world.get::<VehicleOccupancy>(player).map(|o| o.vehicle), Some(vehicle));
    assert_eq!(world.get::<Vehicle>(vehicle).unwrap().driver, Some(player));
    assert_eq!(world.get::<Text>(vehicle).unwrap().text, "Driver: Yes | Passengers: 0");

    server.on_close(ClientId(50_000), 1000, "");
    server.step(0.05);
    let world = &server.simulation().world;
    assert_eq!(world.get::<Vehicle>(vehicle).unwrap().driver, None);
    assert_eq!(world.get::<Text>(vehicle).unwrap().text, "Driver: No | Passengers: 0");
    Ok(())
}
