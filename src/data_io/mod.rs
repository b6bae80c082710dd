pub mod common;
pub mod reader;
pub mod writer;

pub use common::*;
pub use reader::*;
pub use writer::*;
