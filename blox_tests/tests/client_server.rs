//! Full socket-based integration tests for client <-> server communication.

use std::time::Duration;

use blox_client::client::ClientState;
use blox_shared::{
    config::EngineConfig,
    ecs::{ChatList, Player, Text},
    protocol::{ChatMessage, ClientMessage},
};
use blox_tests::{init_tracing, RunningServer};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_mirrors_snapshot_with_own_player() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(64).await?;
    let mut client = server.connect().await?;

    let player = client.player().expect("player assigned on connect");
    assert!(client.wait_for(WAIT, |m| m.world.contains(player)).await?);

    let world = &client.mirror.world;
    assert!(world.get::<Player>(player).is_some());
    assert_eq!(
        world.get::<Text>(player).map(|t| t.text.clone()),
        Some(format!("Player {}", player.0))
    );
    assert_eq!(world.with::<ChatList>().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chat_reaches_every_client() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(64).await?;
    let mut alice = server.connect().await?;
    let mut bob = server.connect().await?;
    let author = alice.player().expect("player");

    alice.say("  hello there  ").await?;

    let said = |m: &blox_client::mirror::Mirror| {
        m.world
            .iter::<ChatList>()
            .any(|(_, list)| list.messages.iter().any(|e| e.content == "hello there" && e.author == author))
    };
    assert!(bob.wait_for(WAIT, said).await?);
    assert!(alice.wait_for(WAIT, said).await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_messages_do_not_drop_the_connection() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(64).await?;
    let mut client = server.connect().await?;

    client.send_raw(&[0xff, 0x00, 0x01]).await?;
    client.send_raw(&[]).await?;
    client
        .send(&ClientMessage::Chat(ChatMessage {
            content: "still here".into(),
        }))
        .await?;

    assert!(
        client
            .wait_for(WAIT, |m| m
                .world
                .iter::<ChatList>()
                .any(|(_, l)| l.messages.iter().any(|e| e.content == "still here")))
            .await?
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_is_seen_by_other_clients() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(64).await?;
    let mut watcher = server.connect().await?;
    let leaver = server.connect().await?;
    let gone = leaver.player().expect("player");

    assert!(watcher.wait_for(WAIT, |m| m.world.contains(gone)).await?);
    drop(leaver);
    assert!(watcher.wait_for(WAIT, |m| !m.world.contains(gone)).await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quiet_client_outlives_the_idle_timeout() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start_with(EngineConfig {
        tick_hz: 64,
        idle_timeout_secs: 1,
        ..EngineConfig::default()
    })
    .await?;
    let mut client = server.connect().await?;
    let player = client.player().expect("player");

    let vanished = client
        .wait_for(Duration::from_secs(3), |m| {
            m.last_tick().is_some() && !m.world.contains(player)
        })
        .await?;
    assert!(!vanished);
    assert_eq!(client.state, ClientState::Playing);
    assert!(client.mirror.world.contains(player));
    Ok(())
}
