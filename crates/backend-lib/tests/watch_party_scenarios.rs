// ============================
// crates/backend-lib/tests/watch_party_scenarios.rs
// ============================
//! Multi-participant scenarios driven through the room registry.

use backend_lib::registry::RoomRegistry;
use backend_lib::room_actor::RoomHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;
use watchparty_common::{ConnectionId, ServerEvent, SyncVideo};

/// A simulated viewer: its connection id and the events the room sent it
struct Viewer {
    id: ConnectionId,
    name: String,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    room: RoomHandle,
}

impl Viewer {
    async fn join(registry: &RoomRegistry, room_id: &str, name: &str, user_id: Option<&str>) -> Self {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let room = registry
            .join_room(room_id, name.to_string(), user_id.map(str::to_string), id, tx)
            .await
            .expect("join should succeed");
        Viewer {
            id,
            name: name.to_string(),
            rx,
            room,
        }
    }

    async fn next(&mut self) -> ServerEvent {
        timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .unwrap_or_else(|_| panic!("{} timed out waiting for an event", self.name))
            .unwrap_or_else(|| panic!("{} channel closed", self.name))
    }

    /// Everything delivered so far. Callers flush the room with a snapshot first.
    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn sync(&self, current_time: f64, is_playing: bool) {
        self.room
            .sync_video(
                self.id,
                SyncVideo {
                    current_time,
                    is_playing,
                    playback_speed: None,
                },
            )
            .unwrap();
    }
}

async fn flush(registry: &RoomRegistry, room_id: &str) {
    // Snapshot is answered after every earlier command has run
    registry.get_room(room_id).unwrap().snapshot().await.unwrap();
}

#[tokio::test]
async fn test_party_42_end_to_end() {
    let registry = RoomRegistry::default();
    let mut alice = Viewer::join(&registry, "party-42", "Alice", None).await;
    let mut bob = Viewer::join(&registry, "party-42", "Bob", None).await;
    let mut carol = Viewer::join(&registry, "party-42", "Carol", None).await;

    let snapshot = registry.get_room("party-42").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.host_connection_id, Some(alice.id));
    alice.drain();
    bob.drain();
    carol.drain();

    // Host sync reaches followers only
    alice.sync(120.5, true);
    flush(&registry, "party-42").await;
    let expected = ServerEvent::VideoSync {
        current_time: 120.5,
        is_playing: true,
        playback_speed: None,
    };
    assert_eq!(bob.drain(), vec![expected.clone()]);
    assert_eq!(carol.drain(), vec![expected]);
    assert!(alice.drain().is_empty());

    // Host disconnects: left, then host-changed naming Bob
    assert!(registry.leave_room("party-42", alice.id).await);
    let bob_id = bob.id;
    for viewer in [&mut bob, &mut carol] {
        assert_eq!(
            viewer.next().await,
            ServerEvent::ParticipantLeft {
                participant_id: alice.id,
                nickname: "Alice".to_string(),
            }
        );
        assert_eq!(
            viewer.next().await,
            ServerEvent::HostChanged {
                new_host_id: bob_id,
                new_host_nickname: "Bob".to_string(),
            }
        );
    }
    let snapshot = registry.get_room("party-42").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.host_connection_id, Some(bob.id));

    // Bob is host now
    bob.sync(125.0, false);
    flush(&registry, "party-42").await;
    assert_eq!(
        carol.drain(),
        vec![ServerEvent::VideoSync {
            current_time: 125.0,
            is_playing: false,
            playback_speed: None,
        }]
    );

    // Carol is not host: ignored, no broadcast, clock untouched
    carol.sync(125.0, false);
    carol.sync(999.0, true);
    let snapshot = registry.get_room("party-42").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.playback.current_time, 125.0);
    assert!(!snapshot.playback.is_playing);
    assert!(bob.drain().is_empty());
    assert!(carol.drain().is_empty());
}

#[tokio::test]
async fn test_reconnect_as_host() {
    let registry = RoomRegistry::default();
    let alice = Viewer::join(&registry, "party-7", "Alice", Some("u1")).await;
    let mut bob = Viewer::join(&registry, "party-7", "Bob", Some("u2")).await;

    registry.leave_room("party-7", alice.id).await;
    let snapshot = registry.get_room("party-7").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.host_connection_id, Some(bob.id));
    bob.drain();

    let returning = Viewer::join(&registry, "party-7", "Alice again", Some("u1")).await;
    let snapshot = registry.get_room("party-7").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.host_connection_id, Some(returning.id));
    let bob_info = snapshot
        .participants
        .iter()
        .find(|p| p.id == bob.id)
        .unwrap();
    assert!(!bob_info.is_host);

    let events = bob.drain();
    assert!(events.contains(&ServerEvent::HostChanged {
        new_host_id: returning.id,
        new_host_nickname: "Alice again".to_string(),
    }));
}

#[tokio::test]
async fn test_duplicate_display_name_eviction() {
    let registry = RoomRegistry::default();
    let mut host = Viewer::join(&registry, "party-9", "Host", None).await;
    let mut c1 = Viewer::join(&registry, "party-9", "Alice", None).await;
    host.drain();
    c1.drain();

    let c2 = Viewer::join(&registry, "party-9", "Alice", None).await;
    let snapshot = registry.get_room("party-9").unwrap().snapshot().await.unwrap();
    let alices: Vec<_> = snapshot
        .participants
        .iter()
        .filter(|p| p.nickname == "Alice")
        .collect();
    assert_eq!(alices.len(), 1);
    assert_eq!(alices[0].id, c2.id);

    let events = host.drain();
    assert!(matches!(
        &events[0],
        ServerEvent::ParticipantLeft { participant_id, .. } if *participant_id == c1.id
    ));
    assert!(matches!(
        &events[1],
        ServerEvent::ParticipantJoined { participant } if participant.id == c2.id
    ));

    // The stale connection is cut off and its later leave is a no-op
    assert!(c1.rx.recv().await.is_none());
    assert!(!registry.leave_room("party-9", c1.id).await);
}

#[tokio::test]
async fn test_chat_fan_out_includes_sender() {
    let registry = RoomRegistry::default();
    let mut alice = Viewer::join(&registry, "party-3", "Alice", None).await;
    let mut bob = Viewer::join(&registry, "party-3", "Bob", None).await;
    let mut carol = Viewer::join(&registry, "party-3", "Carol", None).await;
    flush(&registry, "party-3").await;
    alice.drain();
    bob.drain();
    carol.drain();

    bob.room
        .send_message(bob.id, "this scene!".to_string())
        .unwrap();
    bob.room.send_reaction(bob.id, "😱".to_string()).unwrap();
    flush(&registry, "party-3").await;

    let seen_by_bob = bob.drain();
    assert_eq!(seen_by_bob.len(), 2);
    assert_eq!(alice.drain(), seen_by_bob);
    assert_eq!(carol.drain(), seen_by_bob);
    assert!(matches!(
        &seen_by_bob[0],
        ServerEvent::NewMessage { nickname, message, .. } if nickname == "Bob" && message == "this scene!"
    ));
    assert!(matches!(
        &seen_by_bob[1],
        ServerEvent::NewReaction { emoji, from, .. } if emoji == "😱" && from == "Bob"
    ));
}

#[tokio::test]
async fn test_request_sync_forwarded_to_host() {
    let registry = RoomRegistry::default();
    let mut alice = Viewer::join(&registry, "party-5", "Alice", None).await;
    let mut bob = Viewer::join(&registry, "party-5", "Bob", None).await;
    flush(&registry, "party-5").await;
    alice.drain();
    bob.drain();

    bob.room.request_sync(bob.id).unwrap();
    flush(&registry, "party-5").await;
    assert_eq!(
        alice.drain(),
        vec![ServerEvent::RequestSync {
            requester_id: bob.id,
            nickname: "Bob".to_string(),
        }]
    );
    assert!(bob.drain().is_empty());
}

#[tokio::test]
async fn test_idempotent_teardown_and_empty_room_unobservable() {
    let registry = RoomRegistry::default();
    let alice = Viewer::join(&registry, "party-1", "Alice", None).await;
    let bob = Viewer::join(&registry, "party-1", "Bob", None).await;
    let mut carol = Viewer::join(&registry, "party-1", "Carol", None).await;
    flush(&registry, "party-1").await;
    carol.drain();

    assert!(registry.leave_room("party-1", bob.id).await);
    assert!(!registry.leave_room("party-1", bob.id).await);
    flush(&registry, "party-1").await;
    assert_eq!(carol.drain().len(), 1);

    registry.leave_room("party-1", alice.id).await;
    registry.leave_room("party-1", carol.id).await;
    assert!(!registry.contains("party-1"));
    assert!(registry.get_room("party-1").is_none());
}

#[tokio::test]
async fn test_party_ended_reaches_everyone() {
    let registry = RoomRegistry::default();
    let mut alice = Viewer::join(&registry, "party-8", "Alice", None).await;
    let mut bob = Viewer::join(&registry, "party-8", "Bob", None).await;
    flush(&registry, "party-8").await;
    alice.drain();
    bob.drain();

    let notified = registry
        .end_party(
            "party-8",
            "party-deleted".to_string(),
            "The host deleted this party".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(notified, 2);
    assert!(!registry.contains("party-8"));

    for viewer in [&mut alice, &mut bob] {
        assert_eq!(
            viewer.next().await,
            ServerEvent::PartyEnded {
                reason: "party-deleted".to_string(),
                message: "The host deleted this party".to_string(),
            }
        );
        assert!(viewer.rx.recv().await.is_none());
    }
}
