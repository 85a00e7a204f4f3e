//! HomeBox client bootstrap
//!
//! Takes a freshly installed Mac, Fedora or CentOS machine to the point
//! where Puppet can manage it: SSH keys protected by a diceware passphrase,
//! a package manager where the platform needs one, the Puppet agent, and the
//! HomeBox Puppet environment.

pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod logging;
pub mod orchestrator;
pub mod secret;

pub use error::{BootstrapError, Result};
