//! The `AutoScalingHealth` probe: a short-timeout reachability check against
//! an alias's currently bound instance (spec.md §4.E). Circuit breaking and
//! passive request monitoring have no counterpart here — health is a single
//! point-in-time probe triggered by the bastion's health endpoint, not a
//! background subsystem.

pub mod checker;

pub use checker::{probe, ProbeOutcome};
