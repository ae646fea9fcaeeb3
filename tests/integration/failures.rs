use crate::*;

use mosaic_core::{Hole, WireField};

// ══════════════════════════════════════════════════════════════════════════════
//  Loss & malformed input
// ══════════════════════════════════════════════════════════════════════════════

/// Drop two interior fragments and let the cleanup deadline fire.
#[tokio::test]
async fn test_lost_fragments_reported_as_holes() -> Result<()> {
    let mut node = Node::start(Duration::from_millis(300), 2).await?;

    let payload = vec![1u8; 500];
    let mut fragments = split(5, &payload, 100);
    fragments.remove(3);
    fragments.remove(1);
    send_all(node.addr, &fragments).await?;

    let mut holes = Vec::new();
    for _ in 0..2 {
        match node.next_event().await? {
            RegistryEvent::Hole(h) => holes.push(h),
            other => panic!("expected hole, got {other:?}"),
        }
    }
    assert_eq!(
        holes,
        vec![
            Hole {
                transaction_id: 5,
                offset: 100
            },
            Hole {
                transaction_id: 5,
                offset: 300
            },
        ]
    );
    assert!(!node.registry.is_tracked(5));
    assert_eq!(node.registry.stats().abandoned, 1);

    node.stop().await
}

#[tokio::test]
async fn test_holes_visible_before_deadline() -> Result<()> {
    let node = Node::start(Duration::from_secs(30), 1).await?;

    let fragments = split(9, &[0u8; 300], 100);
    send_all(node.addr, &[fragments[0].clone(), fragments[2].clone()]).await?;

    let mut holes = None;
    for _ in 0..100 {
        holes = node.registry.list_holes(9).filter(|h| !h.is_empty());
        if holes.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let holes = holes.context("transaction never showed a hole")?;
    assert_eq!(holes.len(), 1);
    assert_eq!(holes[0].offset, 100);

    node.stop().await
}

#[tokio::test]
async fn test_truncated_datagram_reports_field() -> Result<()> {
    let mut node = Node::start(Duration::from_secs(30), 1).await?;

    // Flags + data length + half a transaction id.
    let client = UdpSocket::bind("127.0.0.1:0").await?;
    client.send_to(&[0, 1, 0, 8, 0, 0], node.addr).await?;

    match node.next_error().await? {
        ListenerError::Decode { source, .. } => {
            assert_eq!(source.field(), WireField::TransactionId)
        }
        other => panic!("expected decode error, got {other:?}"),
    }
    assert!(node.registry.is_empty());

    node.stop().await
}

#[tokio::test]
async fn test_short_payload_reports_payload_field() -> Result<()> {
    let mut node = Node::start(Duration::from_secs(30), 1).await?;

    let fragment = Fragment::new(true, 4, 0, vec![9u8; 10])?;
    let encoded = fragment.encode();
    let client = UdpSocket::bind("127.0.0.1:0").await?;
    client.send_to(&encoded[..encoded.len() - 3], node.addr).await?;

    match node.next_error().await? {
        ListenerError::Decode { source, .. } => assert_eq!(source.field(), WireField::Payload),
        other => panic!("expected decode error, got {other:?}"),
    }

    node.stop().await
}
