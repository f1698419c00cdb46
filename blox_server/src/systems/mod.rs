//! Tick systems, in the order the default scheduler runs them.

pub mod destroy;
pub mod input;
pub mod physics;
pub mod boundary;
pub mod randomize;
pub mod convex_hull;
pub mod vehicle;
pub mod sync;
