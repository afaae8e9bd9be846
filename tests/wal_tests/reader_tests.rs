//! Tests for WAL Reader
//!
//! These tests verify:
//! - Round trips through the writer, including fragmented records
//! - Checksum failures are reported and skipped
//! - Truncated tails read as a clean end of log
//! - Zero-filled regions are skipped quietly
//! - Starting at an initial offset

use scrollkv::wal::{Reporter, WalReader, WalWriter, BLOCK_SIZE, HEADER_SIZE};

// =============================================================================
// Helper Functions
// =============================================================================

#[derive(Default)]
struct CollectingReporter {
    dropped: usize,
    reasons: Vec<String>,
}

impl Reporter for CollectingReporter {
    fn corruption(&mut self, bytes: usize, reason: &str) {
        self.dropped += bytes;
        self.reasons.push(reason.to_string());
    }
}

fn write_log(payloads: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = WalWriter::new(Vec::new());
    for payload in payloads {
        writer.add_record(payload).unwrap();
    }
    writer.into_inner()
}

fn read_all(log: &[u8]) -> (Vec<Vec<u8>>, CollectingReporter) {
    read_from(log, 0)
}

fn read_from(log: &[u8], initial_offset: u64) -> (Vec<Vec<u8>>, CollectingReporter) {
    let mut reader =
        WalReader::with_reporter(log, CollectingReporter::default(), true, initial_offset);
    let mut records = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        records.push(record);
    }
    (records, reader.into_reporter())
}

fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_empty_log() {
    let (records, reporter) = read_all(&[]);
    assert!(records.is_empty());
    assert_eq!(reporter.dropped, 0);
}

#[test]
fn test_read_small_records() {
    let payloads = vec![b"foo".to_vec(), b"bar".to_vec(), Vec::new(), b"xxxx".to_vec()];
    let (records, reporter) = read_all(&write_log(&payloads));
    assert_eq!(records, payloads);
    assert!(reporter.reasons.is_empty());
}

#[test]
fn test_read_fragmented_records() {
    let payloads = vec![
        payload(10, 1),
        payload(BLOCK_SIZE - HEADER_SIZE, 2),
        payload(40_000, 3),
        payload(3 * BLOCK_SIZE, 4),
        payload(1, 5),
    ];
    let (records, reporter) = read_all(&write_log(&payloads));
    assert_eq!(records, payloads);
    assert_eq!(reporter.dropped, 0);
}

#[test]
fn test_read_across_trailers() {
    let payloads = vec![
        payload(BLOCK_SIZE - HEADER_SIZE - 3, 1),
        payload(100, 2),
        payload(BLOCK_SIZE - 2 * HEADER_SIZE - 107, 3),
        Vec::new(),
        payload(5, 4),
    ];
    let (records, _) = read_all(&write_log(&payloads));
    assert_eq!(records, payloads);
}

#[test]
fn test_last_record_offset() {
    let payloads = vec![payload(100, 1), payload(40_000, 2), payload(7, 3)];
    let log = write_log(&payloads);

    let mut reader = WalReader::new(&log[..]);
    reader.read_record().unwrap().unwrap();
    assert_eq!(reader.last_record_offset(), 0);
    reader.read_record().unwrap().unwrap();
    assert_eq!(reader.last_record_offset(), (HEADER_SIZE + 100) as u64);
    reader.read_record().unwrap().unwrap();
    // The 40000-byte record ends in the second block
    let second_end = BLOCK_SIZE + HEADER_SIZE + (40_000 - (BLOCK_SIZE - 2 * HEADER_SIZE - 100));
    assert_eq!(reader.last_record_offset(), second_end as u64);
    assert_eq!(reader.consumed_offset(), log.len() as u64);
    assert!(reader.read_record().unwrap().is_none());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_checksum_mismatch_drops_rest_of_block() {
    let r1 = payload(100, 1);
    let r2 = payload(100, 2);
    // Fills the rest of block 0 exactly
    let r3 = payload(BLOCK_SIZE - 3 * HEADER_SIZE - 200, 3);
    let r4 = payload(50, 4);
    let mut log = write_log(&[r1.clone(), r2, r3, r4.clone()]);
    assert_eq!(log.len(), BLOCK_SIZE + HEADER_SIZE + 50);

    // Flip a payload byte of r2
    log[HEADER_SIZE + 100 + HEADER_SIZE + 10] ^= 0xff;

    let (records, reporter) = read_all(&log);
    assert_eq!(records, vec![r1, r4]);
    assert_eq!(reporter.dropped, BLOCK_SIZE - (HEADER_SIZE + 100));
    assert_eq!(reporter.reasons, vec!["checksum mismatch".to_string()]);
}

#[test]
fn test_checksum_disabled_accepts_damaged_payload() {
    let mut log = write_log(&[b"hello".to_vec()]);
    log[HEADER_SIZE] = b'j';

    let mut reader = WalReader::with_reporter(&log[..], CollectingReporter::default(), false, 0);
    assert_eq!(reader.read_record().unwrap(), Some(b"jello".to_vec()));
    assert!(reader.read_record().unwrap().is_none());
    assert_eq!(reader.reporter().dropped, 0);
}

#[test]
fn test_bad_record_length_in_middle_of_log() {
    let r1 = payload(10, 1);
    let r2 = payload(10, 2);
    let filler = payload(BLOCK_SIZE - 3 * HEADER_SIZE - 20, 3);
    let r4 = payload(10, 4);
    let mut log = write_log(&[r1.clone(), r2, filler, r4.clone()]);

    // Claim r2 is far longer than its block
    let r2_header = HEADER_SIZE + 10;
    log[r2_header + 4] = 0xff;
    log[r2_header + 5] = 0xff;

    let (records, reporter) = read_all(&log);
    assert_eq!(records, vec![r1, r4]);
    assert_eq!(reporter.reasons, vec!["bad record length".to_string()]);
}

#[test]
fn test_unknown_record_type_is_reported() {
    let mut log = write_log(&[b"one".to_vec(), b"two".to_vec()]);
    // Read without checksums so the bad type byte is what gets noticed
    log[HEADER_SIZE + 3 + 6] = 9;

    let mut reader = WalReader::with_reporter(&log[..], CollectingReporter::default(), false, 0);
    assert_eq!(reader.read_record().unwrap(), Some(b"one".to_vec()));
    assert!(reader.read_record().unwrap().is_none());
    let reporter = reader.into_reporter();
    assert_eq!(reporter.dropped, 3);
    assert_eq!(reporter.reasons, vec!["unknown record type 9".to_string()]);
}

#[test]
fn test_damaged_first_fragment_drops_whole_record() {
    let big = payload(40_000, 7);
    let after = payload(20, 8);
    let mut log = write_log(&[big, after.clone()]);
    log[HEADER_SIZE + 5] ^= 1;

    let (records, reporter) = read_all(&log);
    assert_eq!(records, vec![after]);
    assert!(reporter.dropped >= BLOCK_SIZE);
    assert!(reporter
        .reasons
        .iter()
        .any(|r| r.starts_with("missing start of fragmented record")));
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_truncated_payload_is_eof() {
    let log = write_log(&[b"complete".to_vec(), b"torn record".to_vec()]);
    let torn = &log[..log.len() - 3];

    let (records, reporter) = read_all(torn);
    assert_eq!(records, vec![b"complete".to_vec()]);
    assert_eq!(reporter.dropped, 0);
}

#[test]
fn test_truncated_header_is_eof() {
    let log = write_log(&[b"complete".to_vec(), b"torn".to_vec()]);
    let torn = &log[..HEADER_SIZE + 8 + 4];

    let (records, reporter) = read_all(torn);
    assert_eq!(records, vec![b"complete".to_vec()]);
    assert!(reporter.reasons.is_empty());
}

#[test]
fn test_truncated_fragmented_record_is_eof() {
    let log = write_log(&[b"small".to_vec(), payload(50_000, 1)]);
    let torn = &log[..BLOCK_SIZE + 100];

    let (records, reporter) = read_all(torn);
    assert_eq!(records, vec![b"small".to_vec()]);
    assert!(reporter.reasons.is_empty());
}

#[test]
fn test_zero_filled_tail_is_skipped() {
    let mut log = write_log(&[b"data".to_vec()]);
    log.extend_from_slice(&[0u8; 1000]);

    let (records, reporter) = read_all(&log);
    assert_eq!(records, vec![b"data".to_vec()]);
    assert_eq!(reporter.dropped, 0);
}

// =============================================================================
// Initial Offset Tests
// =============================================================================

fn offset_log() -> (Vec<u8>, Vec<Vec<u8>>) {
    let payloads: Vec<Vec<u8>> = (0..5).map(|i| payload(10_000, i as u8)).collect();
    (write_log(&payloads), payloads)
}

#[test]
fn test_initial_offset_at_record_start() {
    let (log, payloads) = offset_log();
    let (records, _) = read_from(&log, (HEADER_SIZE + 10_000) as u64);
    assert_eq!(records, payloads[1..].to_vec());
}

#[test]
fn test_initial_offset_inside_record() {
    let (log, payloads) = offset_log();
    let (records, _) = read_from(&log, (HEADER_SIZE + 10_000 + 1) as u64);
    assert_eq!(records, payloads[2..].to_vec());
}

#[test]
fn test_initial_offset_skips_fragments_of_earlier_record() {
    let (log, payloads) = offset_log();
    // Record 3 starts at 30021 and continues into block 1
    let record3 = 3 * (HEADER_SIZE + 10_000);
    let (records, reporter) = read_from(&log, record3 as u64 + 1);
    assert_eq!(records, payloads[4..].to_vec());
    assert!(reporter.reasons.is_empty());
}

#[test]
fn test_initial_offset_in_later_block() {
    let (log, payloads) = offset_log();
    let mut reader = WalReader::new(&log[..]);
    let mut offsets = Vec::new();
    while reader.read_record().unwrap().is_some() {
        offsets.push(reader.last_record_offset());
    }

    let mut reader = WalReader::with_reporter(
        &log[..],
        CollectingReporter::default(),
        true,
        offsets[4],
    );
    assert_eq!(reader.read_record().unwrap(), Some(payloads[4].clone()));
    assert_eq!(reader.last_record_offset(), offsets[4]);
}

#[test]
fn test_initial_offset_past_end() {
    let (log, _) = offset_log();
    let (records, _) = read_from(&log, log.len() as u64 + 10);
    assert!(records.is_empty());
}
