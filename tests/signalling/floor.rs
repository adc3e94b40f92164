//! PTT floor arbitration tests.

use std::time::Duration;

use stentor_client_api_proto::{
    now_ms, ClientMsg, RoomId, ServerMsg, UserId, DENIED_FLOOR_HELD,
    DENIED_NOT_MEMBER,
};

use crate::{start_server, test_conf, TestClient};

/// Authenticates `a` and `b` and joins both into `r1`, draining the join
/// deltas.
async fn roster_of_two(
    addr: std::net::SocketAddr,
) -> (TestClient, TestClient) {
    let mut a = TestClient::auth(addr, "a", "Alice").await;
    let mut b = TestClient::auth(addr, "b", "Bob").await;
    a.join("r1").await;
    b.join("r1").await;
    a.recv().await;
    a.recv().await;
    (a, b)
}

#[actix_rt::test]
async fn grant_answers_the_speaker_and_informs_the_roster() {
    let addr = start_server(test_conf());
    let (mut a, mut b) = roster_of_two(addr).await;

    let before = now_ms();
    a.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;

    match a.recv().await {
        ServerMsg::FloorGranted {
            room_id,
            expires_at,
        } => {
            assert_eq!(room_id, RoomId::from("r1"));
            assert!(expires_at >= before + 120_000);
            assert!(expires_at <= now_ms() + 120_000);
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    match b.recv().await {
        ServerMsg::FloorTaken {
            speaker,
            expires_at,
            ..
        } => {
            assert_eq!(speaker.user_id, UserId::from("a"));
            assert_eq!(speaker.display_name, "Alice");
            assert!(expires_at >= before + 120_000);
        }
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[actix_rt::test]
async fn contending_request_is_denied_with_the_current_speaker() {
    let addr = start_server(test_conf());
    let (mut a, mut b) = roster_of_two(addr).await;

    a.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;
    a.recv().await;
    b.recv().await;

    b.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;

    match b.recv().await {
        ServerMsg::FloorDenied {
            reason,
            current_speaker,
            ..
        } => {
            assert_eq!(reason, DENIED_FLOOR_HELD);
            assert_eq!(
                current_speaker.unwrap().user_id,
                UserId::from("a"),
            );
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    a.expect_silence().await;
}

#[actix_rt::test]
async fn request_without_membership_is_denied() {
    let addr = start_server(test_conf());
    let mut a = TestClient::auth(addr, "a", "Alice").await;

    a.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;

    match a.recv().await {
        ServerMsg::FloorDenied { reason, .. } => {
            assert_eq!(reason, DENIED_NOT_MEMBER);
        }
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[actix_rt::test]
async fn re_request_extends_the_lease() {
    let addr = start_server(test_conf());
    let (mut a, mut b) = roster_of_two(addr).await;

    a.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;
    let first = match a.recv().await {
        ServerMsg::FloorGranted { expires_at, .. } => expires_at,
        other => panic!("unexpected frame: {:?}", other),
    };
    b.recv().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    a.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;

    let second = match a.recv().await {
        ServerMsg::FloorGranted { expires_at, .. } => expires_at,
        other => panic!("unexpected frame: {:?}", other),
    };
    assert!(second > first);
    // The rest of the roster does not observe an extension.
    b.expect_silence().await;
}

#[actix_rt::test]
async fn release_reaches_the_whole_roster_and_frees_the_floor() {
    let addr = start_server(test_conf());
    let (mut a, mut b) = roster_of_two(addr).await;

    a.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;
    a.recv().await;
    b.recv().await;

    a.send(ClientMsg::ReleaseFloor {
        room_id: "r1".into(),
    })
    .await;

    assert!(matches!(a.recv().await, ServerMsg::FloorReleased { .. }));
    assert!(matches!(b.recv().await, ServerMsg::FloorReleased { .. }));

    b.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;
    assert!(matches!(b.recv().await, ServerMsg::FloorGranted { .. }));
}

#[actix_rt::test]
async fn expired_hold_times_out_for_the_speaker_and_releases_for_all() {
    let mut conf = test_conf();
    conf.floor.max_duration = Duration::from_millis(300);
    let addr = start_server(conf);
    let (mut a, mut b) = roster_of_two(addr).await;

    a.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;
    a.recv().await;
    b.recv().await;

    assert!(matches!(a.recv().await, ServerMsg::FloorTimeout { .. }));
    assert!(matches!(a.recv().await, ServerMsg::FloorReleased { .. }));
    assert!(matches!(b.recv().await, ServerMsg::FloorReleased { .. }));
}

#[actix_rt::test]
async fn speaker_disconnect_releases_the_floor_and_the_roster_slot() {
    let addr = start_server(test_conf());
    let (mut a, mut b) = roster_of_two(addr).await;

    a.send(ClientMsg::RequestFloor {
        room_id: "r1".into(),
    })
    .await;
    a.recv().await;
    b.recv().await;

    a.close().await;

    assert!(matches!(b.recv().await, ServerMsg::FloorReleased { .. }));
    match b.recv().await {
        ServerMsg::MemberLeft { user_id, .. } => {
            assert_eq!(user_id, UserId::from("a"));
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    match b.recv().await {
        ServerMsg::RoomMembers { members, .. } => {
            assert_eq!(members.len(), 1);
        }
        other => panic!("unexpected frame: {:?}", other),
    }
}
