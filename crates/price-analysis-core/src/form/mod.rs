//! Host form model: typed field paths and the in-memory form store rules read and write.

mod path;
mod state;

pub use path::{FieldPath, PathError, PathTemplate, Segment};
pub use state::{
    coerce_number, is_blank, read_number, FormChange, FormError, FormReader, FormState,
    FormStore, RecordId, SetValueOptions, RECORD_ID,
};
