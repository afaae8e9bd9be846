//! Internal key encoding
//!
//! An internal key is `user_key ++ fixed64(sequence << 8 | value_type)`.
//! Internal keys sort by ascending user key, then by descending tag, so the
//! newest version of a user key comes first.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ user key (n)     │ sequence (7) │ value type (1)│
//! └──────────────────┴──────────────────────────────┘
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, ScrollError};
use crate::util::coding::{decode_fixed64, put_fixed64, put_varint32};

use super::comparator::Comparator;

/// Monotonically increasing write counter; only the low 56 bits are usable
pub type SequenceNumber = u64;

/// Largest sequence number that fits next to the value type in a tag
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Width of the packed sequence/type trailer
pub const TAG_SIZE: usize = 8;

/// Kind of mutation an entry records. The values are part of the on-disk
/// format.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
}

/// Value type used when building seek targets.
///
/// Tags sort in descending order, so the highest type places the target
/// before every entry with the same user key and sequence.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl TryFrom<u8> for ValueType {
    type Error = ScrollError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(ValueType::Deletion),
            1 => Ok(ValueType::Value),
            other => Err(ScrollError::corruption(format!(
                "unknown value type {}",
                other
            ))),
        }
    }
}

pub fn pack_sequence_and_type(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    (sequence << 8) | value_type as u64
}

/// Borrowed, decoded view of an internal key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn new(user_key: &'a [u8], sequence: SequenceNumber, value_type: ValueType) -> Self {
        Self {
            user_key,
            sequence,
            value_type,
        }
    }

    /// Length of this key once encoded
    pub fn encoded_len(&self) -> usize {
        self.user_key.len() + TAG_SIZE
    }
}

impl fmt::Display for ParsedInternalKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' @ {} : {:?}",
            self.user_key.escape_ascii(),
            self.sequence,
            self.value_type
        )
    }
}

/// Append the encoding of `key` to `dst`
pub fn append_internal_key(dst: &mut Vec<u8>, key: &ParsedInternalKey<'_>) {
    dst.extend_from_slice(key.user_key);
    put_fixed64(dst, pack_sequence_and_type(key.sequence, key.value_type));
}

/// Decode an internal key, rejecting short input and unknown value types
pub fn parse_internal_key(internal_key: &[u8]) -> Result<ParsedInternalKey<'_>> {
    if internal_key.len() < TAG_SIZE {
        return Err(ScrollError::corruption(format!(
            "internal key too short: {} bytes",
            internal_key.len()
        )));
    }
    let split = internal_key.len() - TAG_SIZE;
    let tag = decode_fixed64(&internal_key[split..]);
    Ok(ParsedInternalKey {
        user_key: &internal_key[..split],
        sequence: tag >> 8,
        value_type: ValueType::try_from((tag & 0xff) as u8)?,
    })
}

/// User key portion of a well-formed internal key
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    debug_assert!(internal_key.len() >= TAG_SIZE);
    &internal_key[..internal_key.len() - TAG_SIZE]
}

fn extract_tag(internal_key: &[u8]) -> u64 {
    decode_fixed64(&internal_key[internal_key.len() - TAG_SIZE..])
}

/// Decode a key this crate encoded itself. Any type byte other than a
/// deletion reads as a value.
pub(crate) fn split_internal_key(internal_key: &[u8]) -> ParsedInternalKey<'_> {
    let tag = extract_tag(internal_key);
    ParsedInternalKey {
        user_key: extract_user_key(internal_key),
        sequence: tag >> 8,
        value_type: if tag & 0xff == ValueType::Deletion as u64 {
            ValueType::Deletion
        } else {
            ValueType::Value
        },
    }
}

// =============================================================================
// InternalKey
// =============================================================================

/// Owned internal key.
///
/// Kept as a distinct type so internal keys are not compared with a plain
/// byte-wise ordering by accident.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> Self {
        let mut rep = Vec::with_capacity(user_key.len() + TAG_SIZE);
        append_internal_key(
            &mut rep,
            &ParsedInternalKey::new(user_key, sequence, value_type),
        );
        Self { rep }
    }

    pub fn decode_from(encoded: &[u8]) -> Result<Self> {
        parse_internal_key(encoded)?;
        Ok(Self {
            rep: encoded.to_vec(),
        })
    }

    pub fn encode(&self) -> &[u8] {
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }

    pub fn parsed(&self) -> ParsedInternalKey<'_> {
        split_internal_key(&self.rep)
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rep.len() < TAG_SIZE {
            return write!(f, "(bad){}", self.rep.escape_ascii());
        }
        write!(f, "{}", self.parsed())
    }
}

// =============================================================================
// InternalKeyComparator
// =============================================================================

/// Orders internal keys by user key (via the user comparator), breaking ties
/// by decreasing sequence number and type.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user_comparator: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    pub fn new(user_comparator: Arc<dyn Comparator>) -> Self {
        Self { user_comparator }
    }

    pub fn user_comparator(&self) -> &dyn Comparator {
        self.user_comparator.as_ref()
    }
}

impl Comparator for InternalKeyComparator {
    fn name(&self) -> &'static str {
        "scrollkv.InternalKeyComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self
            .user_comparator
            .compare(extract_user_key(a), extract_user_key(b))
        {
            Ordering::Equal => extract_tag(b).cmp(&extract_tag(a)),
            unequal => unequal,
        }
    }
}

impl fmt::Debug for InternalKeyComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalKeyComparator")
            .field("user_comparator", &self.user_comparator.name())
            .finish()
    }
}

// =============================================================================
// LookupKey
// =============================================================================

/// Seek target for point lookups, holding every encoding a lookup needs.
///
/// ```text
/// ┌──────────────────────┬──────────┬───────────────┐
/// │ varint32(klen + 8)   │ user key │ tag (seek)    │
/// └──────────────────────┴──────────┴───────────────┘
/// ^ memtable_key         ^ internal_key / user_key
/// ```
#[derive(Debug, Clone)]
pub struct LookupKey {
    data: Vec<u8>,
    key_start: usize,
}

impl LookupKey {
    /// Target for the newest version of `user_key` visible at `sequence`
    pub fn new(user_key: &[u8], sequence: SequenceNumber) -> Self {
        let mut data = Vec::with_capacity(user_key.len() + TAG_SIZE + 5);
        put_varint32(&mut data, (user_key.len() + TAG_SIZE) as u32);
        let key_start = data.len();
        data.extend_from_slice(user_key);
        put_fixed64(
            &mut data,
            pack_sequence_and_type(sequence, VALUE_TYPE_FOR_SEEK),
        );
        Self { data, key_start }
    }

    /// Length-prefixed internal key, the form stored in memtable entries
    pub fn memtable_key(&self) -> &[u8] {
        &self.data
    }

    pub fn internal_key(&self) -> &[u8] {
        &self.data[self.key_start..]
    }

    pub fn user_key(&self) -> &[u8] {
        &self.data[self.key_start..self.data.len() - TAG_SIZE]
    }
}
