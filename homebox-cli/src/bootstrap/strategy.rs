//! One provisioning strategy per OS family
//!
//! The prober's `OsFamily` picks a strategy once; the orchestrator threads it
//! through the package manager and agent stages instead of re-checking OS
//! names at every step.

use super::agent;
use super::package_manager::ensure_homebrew;
use super::platform::{OsDescriptor, OsFamily};
use super::{StageContext, StageResult};
use crate::config::AgentSource;
use crate::error::UnsupportedPlatformSnafu;
use crate::secret::Secret;

pub trait ProvisioningStrategy {
    fn family(&self) -> OsFamily;

    /// Whether this family needs a package manager bootstrapped first.
    fn manages_packages(&self) -> bool {
        false
    }

    fn ensure_package_manager(&self, _ctx: &StageContext<'_>, _password: &Secret) -> StageResult {
        StageResult::Skipped(format!("no package manager bootstrap on {}", self.family()))
    }

    /// Install the agent; only called once the presence check has failed.
    fn install_agent(&self, ctx: &StageContext<'_>, password: &Secret) -> StageResult;
}

/// Homebrew, then the agent cask (or the vendor disk image).
pub struct MacStrategy;

impl ProvisioningStrategy for MacStrategy {
    fn family(&self) -> OsFamily {
        OsFamily::MacLike
    }

    fn manages_packages(&self) -> bool {
        true
    }

    fn ensure_package_manager(&self, ctx: &StageContext<'_>, password: &Secret) -> StageResult {
        ensure_homebrew(ctx, password)
    }

    fn install_agent(&self, ctx: &StageContext<'_>, password: &Secret) -> StageResult {
        let result = match ctx.config.agent_source {
            AgentSource::Homebrew => agent::brew_install(ctx),
            AgentSource::Download => agent::disk_image_install(ctx, password),
        };
        StageResult::from_result(result)
    }
}

/// Fedora and CentOS: Ruby gem install through RVM.
pub struct RedHatStrategy {
    family: OsFamily,
    package_tool: &'static str,
}

impl RedHatStrategy {
    pub fn fedora() -> Self {
        Self {
            family: OsFamily::FedoraLike,
            package_tool: "dnf",
        }
    }

    pub fn centos() -> Self {
        Self {
            family: OsFamily::CentOsLike,
            package_tool: "yum",
        }
    }
}

impl ProvisioningStrategy for RedHatStrategy {
    fn family(&self) -> OsFamily {
        self.family
    }

    fn install_agent(&self, ctx: &StageContext<'_>, password: &Secret) -> StageResult {
        StageResult::from_result(agent::gem_install(ctx, self.package_tool, password))
    }
}

pub struct UnsupportedStrategy;

impl ProvisioningStrategy for UnsupportedStrategy {
    fn family(&self) -> OsFamily {
        OsFamily::Unsupported
    }

    fn install_agent(&self, ctx: &StageContext<'_>, _password: &Secret) -> StageResult {
        StageResult::Failed(
            UnsupportedPlatformSnafu {
                detail: format!("{} is not supported!", ctx.os),
            }
            .build(),
        )
    }
}

pub fn strategy_for(os: &OsDescriptor) -> Box<dyn ProvisioningStrategy> {
    match os.family {
        OsFamily::MacLike => Box::new(MacStrategy),
        OsFamily::FedoraLike => Box::new(RedHatStrategy::fedora()),
        OsFamily::CentOsLike => Box::new(RedHatStrategy::centos()),
        OsFamily::Unsupported => Box::new(UnsupportedStrategy),
    }
}
