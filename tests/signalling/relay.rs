//! WebRTC signalling relay tests.

use stentor_client_api_proto::{ClientMsg, IceCandidate, ServerMsg, UserId};

use crate::{start_server, test_conf, TestClient};

/// Authenticates `a`, `b` and `c` and joins them all into `r1`, draining the
/// join deltas.
async fn roster_of_three(
    addr: std::net::SocketAddr,
) -> (TestClient, TestClient, TestClient) {
    let mut a = TestClient::auth(addr, "a", "Alice").await;
    let mut b = TestClient::auth(addr, "b", "Bob").await;
    let mut c = TestClient::auth(addr, "c", "Carol").await;
    a.join("r1").await;
    b.join("r1").await;
    c.join("r1").await;
    for _ in 0..4 {
        a.recv().await;
    }
    b.recv().await;
    b.recv().await;
    (a, b, c)
}

#[actix_rt::test]
async fn targeted_offer_reaches_the_target_only() {
    let addr = start_server(test_conf());
    let (mut a, mut b, mut c) = roster_of_three(addr).await;

    a.send(ClientMsg::WebrtcOffer {
        room_id: "r1".into(),
        sdp: "S".to_owned(),
        target_user_id: Some("b".into()),
    })
    .await;

    match b.recv().await {
        ServerMsg::WebrtcOffer {
            sdp, from_user_id, ..
        } => {
            assert_eq!(sdp, "S");
            assert_eq!(from_user_id, UserId::from("a"));
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    c.expect_silence().await;
    a.expect_silence().await;
}

#[actix_rt::test]
async fn untargeted_offer_broadcasts_to_everyone_but_the_sender() {
    let addr = start_server(test_conf());
    let (mut a, mut b, mut c) = roster_of_three(addr).await;

    a.send(ClientMsg::WebrtcOffer {
        room_id: "r1".into(),
        sdp: "S".to_owned(),
        target_user_id: None,
    })
    .await;

    for peer in &mut [&mut b, &mut c] {
        match peer.recv().await {
            ServerMsg::WebrtcOffer { from_user_id, .. } => {
                assert_eq!(from_user_id, UserId::from("a"));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
    a.expect_silence().await;
}

#[actix_rt::test]
async fn answer_is_stamped_with_the_authenticated_sender() {
    let addr = start_server(test_conf());
    let (mut a, mut b, _c) = roster_of_three(addr).await;

    // A forged `fromUserId` is ignored: identity is stamped server-side.
    b.send_raw(
        "{\"type\":\"webrtc_answer\",\"roomId\":\"r1\",\"sdp\":\"A\",\
         \"targetUserId\":\"a\",\"fromUserId\":\"mallory\"}",
    )
    .await;

    match a.recv().await {
        ServerMsg::WebrtcAnswer {
            sdp, from_user_id, ..
        } => {
            assert_eq!(sdp, "A");
            assert_eq!(from_user_id, UserId::from("b"));
        }
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[actix_rt::test]
async fn ice_batch_preserves_candidate_order() {
    let addr = start_server(test_conf());
    let (mut a, mut b, _c) = roster_of_three(addr).await;

    let candidates: Vec<IceCandidate> = (0..3)
        .map(|i| IceCandidate {
            candidate: format!("candidate:{}", i),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
        })
        .collect();
    a.send(ClientMsg::WebrtcIceBatch {
        room_id: "r1".into(),
        candidates: candidates.clone(),
        target_user_id: Some("b".into()),
    })
    .await;

    match b.recv().await {
        ServerMsg::WebrtcIceBatch {
            candidates: received,
            from_user_id,
            ..
        } => {
            assert_eq!(received, candidates);
            assert_eq!(from_user_id, UserId::from("a"));
        }
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[actix_rt::test]
async fn relay_to_an_absent_target_is_dropped_silently() {
    let addr = start_server(test_conf());
    let (mut a, mut b, mut c) = roster_of_three(addr).await;

    a.send(ClientMsg::WebrtcIce {
        room_id: "r1".into(),
        candidate: IceCandidate {
            candidate: "candidate:0".to_owned(),
            sdp_mid: None,
            sdp_m_line_index: None,
        },
        target_user_id: Some("ghost".into()),
    })
    .await;

    a.expect_silence().await;
    b.expect_silence().await;
    c.expect_silence().await;
}

#[actix_rt::test]
async fn relay_into_an_unjoined_room_is_dropped() {
    let addr = start_server(test_conf());
    let (_a, mut b, _c) = roster_of_three(addr).await;
    let mut outsider = TestClient::auth(addr, "x", "Xan").await;

    outsider
        .send(ClientMsg::WebrtcOffer {
            room_id: "r1".into(),
            sdp: "S".to_owned(),
            target_user_id: Some("b".into()),
        })
        .await;

    b.expect_silence().await;
    outsider.expect_silence().await;
}
