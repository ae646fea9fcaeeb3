use crate::*;

use mosaic_services::Completion;

// ══════════════════════════════════════════════════════════════════════════════
//  End-to-end reassembly
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_shuffled_message_completes_with_digest() -> Result<()> {
    let mut node = Node::start(Duration::from_secs(30), 4).await?;

    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    send_all(node.addr, &shuffled(split(7, &payload, 100))).await?;

    match node.next_event().await? {
        RegistryEvent::Completed(Completion {
            transaction_id,
            total_bytes,
            digest,
        }) => {
            assert_eq!(transaction_id, 7);
            assert_eq!(total_bytes, payload.len() as u64);
            assert_eq!(digest, sha256_hex(&payload));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(!node.registry.is_tracked(7));

    node.stop().await
}

#[tokio::test]
async fn test_interleaved_transactions_complete_independently() -> Result<()> {
    let mut node = Node::start(Duration::from_secs(30), 2).await?;

    let a = vec![0xAAu8; 700];
    let b: Vec<u8> = b"the quick brown fox jumps over the lazy dog".repeat(10);
    let mut fragments = split(1, &a, 64);
    fragments.extend(split(2, &b, 32));
    send_all(node.addr, &shuffled(fragments)).await?;

    let mut seen = Vec::new();
    for _ in 0..2 {
        match node.next_event().await? {
            RegistryEvent::Completed(c) => seen.push((c.transaction_id, c.digest)),
            other => panic!("expected completion, got {other:?}"),
        }
    }
    seen.sort();
    assert_eq!(seen, vec![(1, sha256_hex(&a)), (2, sha256_hex(&b))]);
    assert!(node.registry.is_empty());

    node.stop().await
}

#[tokio::test]
async fn test_duplicate_datagrams_do_not_change_result() -> Result<()> {
    let mut node = Node::start(Duration::from_secs(30), 1).await?;

    let payload = b"duplicated over the wire".to_vec();
    let fragments = split(11, &payload, 5);
    let mut resent: Vec<Fragment> = fragments[..fragments.len() - 1].to_vec();
    resent.extend(fragments[..2].iter().cloned());
    send_all(node.addr, &resent).await?;
    send_all(node.addr, &fragments[fragments.len() - 1..]).await?;

    match node.next_event().await? {
        RegistryEvent::Completed(c) => {
            assert_eq!(c.transaction_id, 11);
            assert_eq!(c.digest, sha256_hex(&payload));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(node.registry.stats().duplicates, 2);

    node.stop().await
}
