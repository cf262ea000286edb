pub mod conv;

pub use conv::*;
