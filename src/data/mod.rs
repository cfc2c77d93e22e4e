pub mod flags;
pub mod header;
pub mod item;
pub mod value;
