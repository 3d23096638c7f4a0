//! Fragmentation tests: frame counts, tail bytes and the CRC prefix.
use alloc::vec;
use alloc::vec::Vec;

use super::*;
use crate::protocol::transport::transfer::TransferKind;

fn message(payload: Vec<u8>, transfer_id: u8) -> Transfer {
    Transfer {
        priority: 16,
        kind: TransferKind::Message,
        data_type_id: 341,
        source: 42,
        destination: None,
        transfer_id: TransferId::new(transfer_id),
        payload,
    }
}

#[test]
/// Seven bytes or less travel in one frame with start and end set.
fn test_single_frame() {
    let frames: Vec<_> = TransferBuilder::new(message(vec![1, 2, 3, 4, 5, 6, 7], 5), 0)
        .unwrap()
        .build()
        .collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].len, 8);
    assert_eq!(frames[0].payload(), &[1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(frames[0].data[7], 0b1100_0101);
}

#[test]
/// An empty payload still produces a frame holding only the tail byte.
fn test_empty_payload() {
    let frames: Vec<_> = TransferBuilder::new(message(Vec::new(), 0), 0)
        .unwrap()
        .build()
        .collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].bytes(), &[0b1100_0000]);
}

#[test]
/// Eight payload bytes plus the CRC need two frames with alternating toggles.
fn test_multi_frame_layout() {
    let payload: Vec<u8> = (1..=8).collect();
    let signature = 0x0F08_68D0_C1A7_C6F1;
    let crc = transfer_crc(signature, &payload).to_le_bytes();

    let iterator = TransferBuilder::new(message(payload, 3), signature)
        .unwrap()
        .build();
    assert_eq!(iterator.len(), 2);
    let frames: Vec<_> = iterator.collect();

    assert_eq!(
        frames[0].bytes(),
        &[crc[0], crc[1], 1, 2, 3, 4, 5, 0b1000_0011]
    );
    assert_eq!(frames[1].bytes(), &[6, 7, 8, 0b0110_0011]);
}

#[test]
/// Frame count is ceil((payload + 2) / 7) with toggles 0,1,0,...
fn test_multi_frame_count_and_toggles() {
    let frames: Vec<_> = TransferBuilder::new(message(vec![0xAA; 40], 31), 7)
        .unwrap()
        .build()
        .collect();
    assert_eq!(frames.len(), 6);
    for (index, frame) in frames.iter().enumerate() {
        let tail = frame.tail().unwrap();
        assert_eq!(tail.start_of_transfer(), index == 0);
        assert_eq!(tail.end_of_transfer(), index == frames.len() - 1);
        assert_eq!(tail.toggle(), index % 2 == 1);
        assert_eq!(tail.transfer_id(), TransferId::new(31));
    }
    let carried: usize = frames.iter().map(|f| f.payload().len()).sum();
    assert_eq!(carried, 42);
}

#[test]
/// Identifier errors surface before any frame is produced.
fn test_invalid_identifier() {
    let mut transfer = message(vec![1], 0);
    transfer.source = 200;
    assert!(matches!(
        TransferBuilder::new(transfer, 0),
        Err(ProtocolError::InvalidIdentifier { field: "source", .. })
    ));
}

#[test]
/// Payloads above the transfer limit are refused on the sending side.
fn test_payload_too_large() {
    assert!(TransferBuilder::new(message(vec![0; MAX_TRANSFER_PAYLOAD], 0), 0).is_ok());
    assert!(matches!(
        TransferBuilder::new(message(vec![0; MAX_TRANSFER_PAYLOAD + 1], 0), 0),
        Err(ProtocolError::FieldOutOfRange { field: "payload" })
    ));
}
