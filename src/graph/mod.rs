pub mod definition;
pub mod description;
mod validate;

pub use definition::*;
pub use description::*;
