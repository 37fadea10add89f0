mod entry;
mod outcome;
mod primitives;

pub use entry::*;
pub use outcome::*;
pub use primitives::*;
