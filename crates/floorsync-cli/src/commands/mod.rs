pub mod common;
pub mod records;
pub mod status;
pub mod sync;
