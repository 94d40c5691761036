pub mod code_record;

pub use code_record::{CodeRecord, CodeSource};
