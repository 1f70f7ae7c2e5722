//! Sortable index encoding: field slots, indexable strings, bound strings,
//! and the scan shapes derived from them.

mod encode;
mod field;
mod range;


pub use encode::{
    INDEX_NAME_SEPARATOR, IndexBound, IndexDefinition, IndexSet, IndexableString, STRING_MAX,
    STRING_PAD, indexable_string_length, primary_key_from_indexable_string,
    start_string_from_lower_bound, start_string_from_upper_bound,
};
pub use field::{FieldSlot, SlotKind};
pub use range::{IndexScan, QuantumDirection, QuantumError, change_by_one_quantum};
