//! TransferManager tests: transfer-id assignment and reception accounting.
use alloc::vec;
use alloc::vec::Vec;

use super::*;
use crate::protocol::transport::can_frame::TailByte;
use crate::protocol::transport::transfer::MAX_TRANSFER_PAYLOAD;

const SIGNATURE: u64 = 0x0F08_68D0_C1A7_C6F1;

fn transfer(kind: TransferKind, destination: Option<u8>, payload: Vec<u8>) -> Transfer {
    Transfer {
        priority: 16,
        kind,
        data_type_id: if kind.is_service() { 1 } else { 341 },
        source: 42,
        destination,
        transfer_id: TransferId::default(),
        payload,
    }
}

fn manager() -> TransferManager {
    TransferManager::new(Duration::from_secs(2))
}

#[test]
/// Broadcasts start at 0, advance by one and wrap after 31.
fn test_message_transfer_ids_wrap() {
    let mut manager = manager();
    let ids: Vec<u8> = (0..34)
        .map(|_| {
            manager
                .send(transfer(TransferKind::Message, None, vec![0]), SIGNATURE)
                .unwrap()
                .transfer_id()
                .value()
        })
        .collect();
    assert_eq!(&ids[..3], &[0, 1, 2]);
    assert_eq!(&ids[31..], &[31, 0, 1]);
}

#[test]
/// Each destination of a service has its own counter.
fn test_request_counters_per_destination() {
    let mut manager = manager();
    let send = |manager: &mut TransferManager, destination| {
        manager
            .send(
                transfer(TransferKind::Request, Some(destination), Vec::new()),
                SIGNATURE,
            )
            .unwrap()
            .transfer_id()
            .value()
    };
    assert_eq!(send(&mut manager, 10), 0);
    assert_eq!(send(&mut manager, 10), 1);
    assert_eq!(send(&mut manager, 11), 0);
    assert_eq!(
        manager.next_transfer_id(TransferKind::Request, 1, Some(10)),
        TransferId::new(2)
    );
}

#[test]
/// Responses reuse the request's id and leave the counters alone.
fn test_response_keeps_transfer_id() {
    let mut manager = manager();
    let mut response = transfer(TransferKind::Response, Some(10), vec![1, 2]);
    response.transfer_id = TransferId::new(17);

    let frames = manager.send(response, SIGNATURE).unwrap();
    assert_eq!(frames.transfer_id(), TransferId::new(17));
    assert_eq!(
        manager.next_transfer_id(TransferKind::Response, 1, Some(10)),
        TransferId::new(0)
    );
}

#[test]
/// A failed send does not consume a transfer id.
fn test_failed_send_keeps_counter() {
    let mut manager = manager();
    let mut bad = transfer(TransferKind::Message, None, vec![0]);
    bad.priority = 40;
    assert!(manager.send(bad, SIGNATURE).is_err());
    assert_eq!(
        manager.next_transfer_id(TransferKind::Message, 341, None),
        TransferId::new(0)
    );
}

#[test]
/// Frames sent by one manager are reassembled by another.
fn test_send_then_receive() {
    let mut sender = manager();
    let mut receiver = manager();
    let payload: Vec<u8> = (0..50).collect();

    let mut delivered = None;
    for frame in sender
        .send(transfer(TransferKind::Message, None, payload.clone()), SIGNATURE)
        .unwrap()
    {
        delivered = receiver.receive(&frame, SIGNATURE, Instant::from_millis(5));
    }
    let delivered = delivered.unwrap();
    assert_eq!(delivered.payload, payload);
    assert_eq!(delivered.source, 42);
    assert_eq!(receiver.stats().transfers, 1);
}

#[test]
/// Drops are counted by reason.
fn test_drops_are_counted() {
    let mut sender = manager();
    let mut receiver = manager();
    let mut frames: Vec<_> = sender
        .send(transfer(TransferKind::Message, None, vec![7; 20]), SIGNATURE)
        .unwrap()
        .collect();
    frames[2].data[0] ^= 0x01;

    let now = Instant::from_millis(0);
    for frame in &frames {
        assert!(receiver.receive(frame, SIGNATURE, now).is_none());
    }
    receiver.receive(&frames[1], SIGNATURE, now);

    let stats = receiver.stats();
    assert_eq!(stats.crc_errors, 1);
    assert_eq!(stats.stale, 1);
    assert_eq!(stats.transfers, 0);
}

#[test]
/// Skipped transfer ids are counted without blocking delivery.
fn test_transfer_id_gaps() {
    let mut sender = manager();
    let mut receiver = manager();
    let now = Instant::from_millis(0);

    let mut frames = Vec::new();
    for _ in 0..4 {
        frames.extend(
            sender
                .send(transfer(TransferKind::Message, None, vec![1]), SIGNATURE)
                .unwrap(),
        );
    }
    assert!(receiver.receive(&frames[0], SIGNATURE, now).is_some());
    assert!(receiver.receive(&frames[1], SIGNATURE, now).is_some());
    assert!(receiver.receive(&frames[3], SIGNATURE, now).is_some());

    let stats = receiver.stats();
    assert_eq!(stats.transfers, 3);
    assert_eq!(stats.gaps, 1);
}

#[test]
/// Cleanup counts expired sessions as stale.
fn test_cleanup_counts_stale() {
    let mut sender = manager();
    let mut receiver = manager();
    let first = sender
        .send(transfer(TransferKind::Message, None, vec![0; 10]), SIGNATURE)
        .unwrap()
        .next()
        .unwrap();
    receiver.receive(&first, SIGNATURE, Instant::from_millis(0));
    receiver.cleanup(Instant::from_millis(1_000));
    assert_eq!(receiver.stats().stale, 0);
    receiver.cleanup(Instant::from_millis(2_001));
    assert_eq!(receiver.stats().stale, 1);
}

#[test]
/// Oversized transfers are refused on send and counted on reception.
fn test_oversized_transfers() {
    let mut sender = manager();
    let too_large = transfer(TransferKind::Message, None, vec![0; MAX_TRANSFER_PAYLOAD + 1]);
    assert!(matches!(
        sender.send(too_large, SIGNATURE),
        Err(ProtocolError::FieldOutOfRange { field: "payload" })
    ));

    let frames: Vec<_> = sender
        .send(transfer(TransferKind::Message, None, vec![0; MAX_TRANSFER_PAYLOAD]), SIGNATURE)
        .unwrap()
        .collect();
    let (last, body) = frames.split_last().unwrap();
    let tail = last.tail().unwrap();
    let overflow = CanFrame::with_tail(
        last.id,
        &[0; 7],
        TailByte::new(false, false, tail.toggle(), tail.transfer_id()),
    );

    let mut receiver = manager();
    let now = Instant::from_millis(0);
    for frame in body.iter().chain([&overflow]) {
        assert!(receiver.receive(frame, SIGNATURE, now).is_none());
    }
    let stats = receiver.stats();
    assert_eq!(stats.oversized, 1);
    assert_eq!(stats.transfers, 0);
}
