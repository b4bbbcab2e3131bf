//! Zone-aware deletion-cost allocation.

mod allocator;
mod resolver;

pub use allocator::ZoneAllocator;
pub use resolver::resolve_zone;
