//! Key Module
//!
//! User key ordering and the versioned internal key format shared by the
//! memtable, the write batch and lookups.

mod comparator;
mod internal;

pub use comparator::{BytewiseComparator, Comparator};
pub use internal::{
    append_internal_key, extract_user_key, pack_sequence_and_type, parse_internal_key,
    InternalKey, InternalKeyComparator, LookupKey, ParsedInternalKey, SequenceNumber,
    ValueType, MAX_SEQUENCE_NUMBER, TAG_SIZE, VALUE_TYPE_FOR_SEEK,
};

pub(crate) use internal::split_internal_key;
