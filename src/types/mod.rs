//! Core scan types: validated ports, resolved port sets, and targets.
//!
//! Parsing happens once at the edge; everything past these types works
//! with values that are already known to be valid.

mod port;
mod target;

pub use port::{Port, PortError, PortRange, PortSet, PortSpec};
pub use target::{resolve_host, HostResolver, ScanTarget, TargetError, TargetSpec};
