pub mod line;
pub mod tags;

pub use line::{ComposeOutcome, compose};
pub use tags::{TagSet, encode_tags, merge_tags};
