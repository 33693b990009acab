pub mod records;

pub use records::{Collection, Group, Record, User};
