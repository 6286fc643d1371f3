mod primitives;
mod schedule;

pub use primitives::*;
pub use schedule::*;
