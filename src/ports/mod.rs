//! Published ports: protocol and port identity, host port allocation and
//! the per-container binding table.

mod allocator;
mod bindings;
mod protocol;

pub use allocator::{Allocation, DirectPortAllocator, PortAllocator, RandomPortAllocator};
pub use bindings::{Binding, PortBindings};
pub use protocol::{HostPort, PortSpec, Protocol};
