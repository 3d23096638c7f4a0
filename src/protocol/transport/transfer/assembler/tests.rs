//! Reassembly tests covering sequencing, CRC validation, timeouts and sessions.
use alloc::vec;
use alloc::vec::Vec;

use super::*;
use crate::protocol::transport::can_frame::TailByte;
use crate::protocol::transport::transfer::builder::TransferBuilder;

const SIGNATURE: u64 = 0xEE46_8A81_21C4_6A9E;

fn response(source: u8, transfer_id: u8, payload: Vec<u8>) -> Transfer {
    Transfer {
        priority: 16,
        kind: TransferKind::Response,
        data_type_id: 1,
        source,
        destination: Some(10),
        transfer_id: TransferId::new(transfer_id),
        payload,
    }
}

fn frames(transfer: &Transfer) -> Vec<CanFrame> {
    TransferBuilder::new(transfer.clone(), SIGNATURE)
        .unwrap()
        .build()
        .collect()
}

fn at(millis: u64) -> Instant {
    Instant::from_millis(millis)
}

#[test]
/// A single frame completes immediately.
fn test_single_frame_transfer() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let transfer = response(20, 4, vec![1, 2, 3]);
    let frames = frames(&transfer);
    assert_eq!(
        assembler.process_frame(&frames[0], SIGNATURE, at(0)),
        ProcessResult::TransferComplete(transfer)
    );
}

#[test]
/// Rebuild a complete transfer from several valid fragments.
fn test_multi_frame_reassembly() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let transfer = response(20, 7, (0..30).collect());
    let frames = frames(&transfer);
    let last = frames.len() - 1;

    for frame in &frames[..last] {
        assert_eq!(
            assembler.process_frame(frame, SIGNATURE, at(1)),
            ProcessResult::FragmentConsumed
        );
    }
    assert_eq!(assembler.open_sessions(), 1);
    assert_eq!(
        assembler.process_frame(&frames[last], SIGNATURE, at(2)),
        ProcessResult::TransferComplete(transfer)
    );
    assert_eq!(assembler.open_sessions(), 0);
}

#[test]
/// One flipped payload bit fails the CRC.
fn test_crc_mismatch() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let mut frames = frames(&response(20, 0, (0..20).collect()));
    frames[1].data[3] ^= 0x10;

    let mut results: Vec<_> = frames
        .iter()
        .map(|frame| assembler.process_frame(frame, SIGNATURE, at(0)))
        .collect();
    assert_eq!(
        results.pop(),
        Some(ProcessResult::Dropped(TransferError::CrcMismatch))
    );
}

#[test]
/// The wrong signature fails the CRC too.
fn test_crc_depends_on_signature() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let frames = frames(&response(20, 0, (0..10).collect()));
    assembler.process_frame(&frames[0], SIGNATURE + 1, at(0));
    assert_eq!(
        assembler.process_frame(&frames[1], SIGNATURE + 1, at(0)),
        ProcessResult::Dropped(TransferError::CrcMismatch)
    );
}

#[test]
/// Repeating a frame breaks the toggle sequence and discards the session.
fn test_toggle_mismatch() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let frames = frames(&response(20, 0, (0..20).collect()));
    assembler.process_frame(&frames[0], SIGNATURE, at(0));
    assembler.process_frame(&frames[1], SIGNATURE, at(0));
    assert_eq!(
        assembler.process_frame(&frames[1], SIGNATURE, at(0)),
        ProcessResult::Dropped(TransferError::ToggleMismatch)
    );
    assert_eq!(assembler.open_sessions(), 0);
}

#[test]
/// A start frame with the toggle set is rejected.
fn test_start_frame_with_toggle() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let mut frame = frames(&response(20, 0, vec![1]))[0].clone();
    frame.data[1] |= 0x20;
    assert_eq!(
        assembler.process_frame(&frame, SIGNATURE, at(0)),
        ProcessResult::Dropped(TransferError::ToggleMismatch)
    );
}

#[test]
/// Continuations without an open session, or from another transfer, are stale.
fn test_stale_continuation() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let first = frames(&response(20, 1, (0..20).collect()));
    let second = frames(&response(20, 2, (0..20).collect()));

    assert_eq!(
        assembler.process_frame(&first[1], SIGNATURE, at(0)),
        ProcessResult::Dropped(TransferError::StaleTransfer)
    );

    assembler.process_frame(&first[0], SIGNATURE, at(0));
    assert_eq!(
        assembler.process_frame(&second[1], SIGNATURE, at(0)),
        ProcessResult::Dropped(TransferError::StaleTransfer)
    );
    assert_eq!(assembler.open_sessions(), 0);
}

#[test]
/// A continuation arriving after the timeout discards the session.
fn test_reassembly_timeout() {
    let mut assembler = TransferAssembler::new(Duration::from_millis(100));
    let frames = frames(&response(20, 0, (0..10).collect()));
    assembler.process_frame(&frames[0], SIGNATURE, at(0));
    assert_eq!(
        assembler.process_frame(&frames[1], SIGNATURE, at(101)),
        ProcessResult::Dropped(TransferError::StaleTransfer)
    );
}

#[test]
/// `cleanup` only drops sessions older than the timeout.
fn test_cleanup() {
    let mut assembler = TransferAssembler::new(Duration::from_millis(100));
    assembler.process_frame(&frames(&response(20, 0, (0..10).collect()))[0], SIGNATURE, at(0));
    assembler.process_frame(&frames(&response(21, 0, (0..10).collect()))[0], SIGNATURE, at(80));

    assert_eq!(assembler.cleanup(at(100)), 0);
    assert_eq!(assembler.cleanup(at(150)), 1);
    assert_eq!(assembler.open_sessions(), 1);
}

#[test]
/// Interleaved transfers from two sources reassemble independently.
fn test_interleaved_sources() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let a = response(20, 3, (0..12).collect());
    let b = response(21, 3, (100..112).collect());
    let frames_a = frames(&a);
    let frames_b = frames(&b);

    assembler.process_frame(&frames_a[0], SIGNATURE, at(0));
    assembler.process_frame(&frames_b[0], SIGNATURE, at(0));
    assert_eq!(
        assembler.process_frame(&frames_b[1], SIGNATURE, at(0)),
        ProcessResult::TransferComplete(b)
    );
    assert_eq!(
        assembler.process_frame(&frames_a[1], SIGNATURE, at(0)),
        ProcessResult::TransferComplete(a)
    );
}

#[test]
/// Empty frames are malformed.
fn test_empty_frame() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let frame = CanFrame {
        id: crate::protocol::transport::can_id::CanId(0x1001_552A),
        data: [0; 8],
        len: 0,
    };
    assert_eq!(
        assembler.process_frame(&frame, SIGNATURE, at(0)),
        ProcessResult::Dropped(TransferError::MalformedFrame)
    );
}

#[test]
/// A session growing past the transfer limit is dropped before its end frame.
fn test_payload_too_large() {
    let mut assembler = TransferAssembler::new(Duration::from_secs(2));
    let frames = frames(&response(20, 5, vec![0xAB; MAX_TRANSFER_PAYLOAD]));
    let (last, body) = frames.split_last().unwrap();
    for frame in body {
        assert_eq!(
            assembler.process_frame(frame, SIGNATURE, at(0)),
            ProcessResult::FragmentConsumed
        );
    }

    // Full continuation in place of the short end frame.
    let tail = last.tail().unwrap();
    let overflow = CanFrame::with_tail(
        last.id,
        &[0xAB; 7],
        TailByte::new(false, false, tail.toggle(), tail.transfer_id()),
    );
    assert_eq!(
        assembler.process_frame(&overflow, SIGNATURE, at(0)),
        ProcessResult::Dropped(TransferError::PayloadTooLarge)
    );
    assert_eq!(assembler.open_sessions(), 0);
}
