//! Process lifecycle helpers shared by the bastion and node binaries.

pub mod signals;
