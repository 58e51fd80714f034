pub mod records;

pub use records::{JsonlRecordStore, MemoryRecordStore, RecordStore};
