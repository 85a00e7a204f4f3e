//! Puppet agent installation
//!
//! A working `puppet --version` short-circuits everything. Otherwise the
//! host's strategy installs the agent:
//! - Mac: `brew install --cask puppet-agent`, or the vendor disk image
//!   located with the version probe
//! - Fedora/CentOS: system Ruby, RVM, an RVM Ruby, then `gem install puppet`

use snafu::{OptionExt, ResultExt};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::strategy::ProvisioningStrategy;
use super::version_probe::{VersionProbe, probe_download};
use super::{StageContext, StageResult};
use crate::error::{
    AgentStepSnafu, ChainStep, NoInstallerPackageSnafu, NoRuntimeSnafu, Result,
};
use crate::exec::{Invocation, require_success, succeeds};
use crate::fetch::download;
use crate::secret::Secret;

pub const AGENT: &str = "puppet";
pub const AGENT_CASK: &str = "puppet-agent";
pub const AGENT_GEM: &str = "puppet";

/// Exit 0 from `puppet --version`.
pub fn agent_present(ctx: &StageContext<'_>) -> bool {
    let present = succeeds(ctx.runner, &Invocation::new(AGENT).arg("--version"));
    if present {
        debug!("Puppet check exited with \"0\".");
    }
    present
}

pub fn install_agent(
    ctx: &StageContext<'_>,
    strategy: &dyn ProvisioningStrategy,
    password: &Secret,
) -> StageResult {
    if agent_present(ctx) {
        return StageResult::Skipped("Puppet is already installed".to_string());
    }

    info!("Installing Puppet for {}.", strategy.family());
    strategy.install_agent(ctx, password)
}

pub(crate) fn brew_install(ctx: &StageContext<'_>) -> Result<()> {
    info!("Installing Puppet with Homebrew.");
    require_success(
        ctx.runner,
        &Invocation::new("brew").args(["install", "--cask", AGENT_CASK]),
    )
}

/// Download the newest published disk image for this macOS release, install
/// its package, then clean up.
pub(crate) fn disk_image_install(ctx: &StageContext<'_>, password: &Secret) -> Result<()> {
    let start = VersionProbe::parse(&ctx.os.version)?;
    let dmg = ctx.paths.home.join("puppet-agent.dmg");
    let hit = probe_download(ctx.fetcher, &ctx.config.agent_download_template, start, &dmg)?;
    info!("Found Puppet for Mac {} after {} attempt(s)", hit.version, hit.attempts);

    let mount = ctx.paths.config_dir.join("puppet-agent-volume");
    let installed = install_from_image(ctx, password, &dmg, &mount);

    if let Err(e) = fs::remove_file(&dmg) {
        warn!("Error deleting file \"{}\": {e}", dmg.display());
    }

    installed
}

/// Mount `dmg`, run the package inside it and detach again.
fn install_from_image(
    ctx: &StageContext<'_>,
    password: &Secret,
    dmg: &Path,
    mount: &Path,
) -> Result<()> {
    require_success(
        ctx.runner,
        &Invocation::new("hdiutil")
            .args(["attach", "-nobrowse", "-quiet", "-mountpoint"])
            .arg(mount.to_string_lossy())
            .arg(dmg.to_string_lossy()),
    )?;

    let installed = find_package(mount).and_then(|pkg| {
        require_success(
            ctx.runner,
            &Invocation::new("sudo")
                .args(["-S", "-p", "", "installer", "-pkg"])
                .arg(pkg.to_string_lossy())
                .args(["-target", "/"])
                .stdin(password.as_stdin_line()),
        )
    });

    let detach = Invocation::new("hdiutil")
        .args(["detach", "-quiet"])
        .arg(mount.to_string_lossy());
    if !succeeds(ctx.runner, &detach) {
        warn!("Unable to detach {}", mount.display());
    }

    installed
}

fn find_package(mount: &Path) -> Result<PathBuf> {
    let mut packages: Vec<PathBuf> = fs::read_dir(mount)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "pkg"))
        .collect();
    packages.sort();
    packages
        .into_iter()
        .next()
        .context(NoInstallerPackageSnafu { dir: mount })
}

/// Newest `ruby-*` directory by reverse lexicographic order.
pub fn newest_runtime(rubies_dir: &Path) -> Option<PathBuf> {
    let mut rubies: Vec<PathBuf> = fs::read_dir(rubies_dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("ruby-"))
        })
        .collect();
    rubies.sort_by(|a, b| b.cmp(a));
    rubies.into_iter().next()
}

/// Puppet as a Ruby gem: RVM keys, system Ruby, RVM, RVM Ruby, gem.
pub(crate) fn gem_install(
    ctx: &StageContext<'_>,
    package_tool: &str,
    password: &Secret,
) -> Result<()> {
    let config = ctx.config;
    info!("Installing Puppet for Linux as a Ruby gem.");

    info!("Importing GPG key.");
    let gpg = Invocation::new("gpg")
        .arg("--keyserver")
        .arg(&config.gpg_keyserver)
        .arg("--recv-keys")
        .args(config.rvm_gpg_keys.iter().cloned());
    require_success(ctx.runner, &gpg).context(AgentStepSnafu {
        step: ChainStep::GpgImport,
    })?;

    info!("Installing system Ruby.");
    let system_ruby = Invocation::new("sudo")
        .args(["-S", "-p", "", package_tool, "install", "-qy", "ruby"])
        .stdin(password.as_stdin_line());
    require_success(ctx.runner, &system_ruby).context(AgentStepSnafu {
        step: ChainStep::RuntimeInstall,
    })?;

    info!("Installing RVM.");
    download(ctx.fetcher, "RVM script", &config.rvm_url)
        .and_then(|script| {
            require_success(
                ctx.runner,
                &Invocation::new("bash").stdin(script).passthrough(),
            )
        })
        .context(AgentStepSnafu {
            step: ChainStep::VersionManagerInstall,
        })?;
    info!("Installed RVM successfully.");

    info!("Installing RVM Ruby.");
    let rvm_home = ctx.paths.home.join(".rvm");
    let rvm = rvm_home.join("bin/rvm");
    debug!("rvm path is: \"{}\"", rvm.display());
    let rubies_dir = rvm_home.join("rubies");
    require_success(
        ctx.runner,
        &Invocation::new(rvm.to_string_lossy())
            .arg("install")
            .arg(&config.ruby_version)
            .passthrough(),
    )
    .and_then(|()| newest_runtime(&rubies_dir).context(NoRuntimeSnafu { dir: &rubies_dir }))
    .context(AgentStepSnafu {
        step: ChainStep::RuntimeBuild,
    })
    .and_then(|ruby| {
        info!("Installed RVM Ruby successfully.");
        info!("Installing Puppet.");
        let gem = ruby.join("bin/gem");
        debug!("gem path is: \"{}\"", gem.display());
        require_success(
            ctx.runner,
            &Invocation::new(gem.to_string_lossy()).args(["install", AGENT_GEM]),
        )
        .context(AgentStepSnafu {
            step: ChainStep::AgentGemInstall,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::platform::{OsDescriptor, OsFamily};
    use crate::bootstrap::strategy::{MacStrategy, RedHatStrategy};
    use crate::bootstrap::testing::Fixture;
    use crate::config::{AgentSource, HomeboxConfig};
    use crate::error::BootstrapError;
    use crate::exec::testing::{ScriptedRunner, exit};
    use crate::fetch::testing::FakeFetcher;
    use std::cell::Cell;

    struct SpyStrategy {
        installs: Cell<u32>,
    }

    impl ProvisioningStrategy for SpyStrategy {
        fn family(&self) -> OsFamily {
            OsFamily::FedoraLike
        }

        fn install_agent(&self, _ctx: &StageContext<'_>, _password: &Secret) -> StageResult {
            self.installs.set(self.installs.get() + 1);
            StageResult::Succeeded
        }
    }

    fn fedora() -> Fixture {
        Fixture::new(OsDescriptor::new(OsFamily::FedoraLike, "39"))
    }

    fn chain_step(result: StageResult) -> ChainStep {
        match result {
            StageResult::Failed(BootstrapError::AgentStep { step, .. }) => step,
            other => panic!("expected chain failure, got {other:?}"),
        }
    }

    #[test]
    fn test_presence_short_circuits_strategy() {
        let fixture = fedora();
        let runner = ScriptedRunner::always(0);
        let fetcher = FakeFetcher::new();
        let spy = SpyStrategy {
            installs: Cell::new(0),
        };

        let result = install_agent(&fixture.ctx(&runner, &fetcher), &spy, &Secret::new("pw"));

        assert!(matches!(result, StageResult::Skipped(_)));
        assert_eq!(spy.installs.get(), 0);
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(runner.calls()[0].display(), "puppet --version");
    }

    #[test]
    fn test_missing_agent_runs_strategy_once() {
        let fixture = fedora();
        let runner = ScriptedRunner::always(127);
        let fetcher = FakeFetcher::new();
        let spy = SpyStrategy {
            installs: Cell::new(0),
        };

        let result = install_agent(&fixture.ctx(&runner, &fetcher), &spy, &Secret::new("pw"));

        assert!(matches!(result, StageResult::Succeeded));
        assert_eq!(spy.installs.get(), 1);
    }

    #[test]
    fn test_mac_installs_cask() {
        let fixture = Fixture::new(OsDescriptor::new(OsFamily::MacLike, "14.5"));
        let runner = ScriptedRunner::new(|inv| exit(if inv.program() == AGENT { 1 } else { 0 }));
        let fetcher = FakeFetcher::new();

        let result = install_agent(&fixture.ctx(&runner, &fetcher), &MacStrategy, &Secret::new("pw"));

        assert!(matches!(result, StageResult::Succeeded));
        assert_eq!(runner.calls()[1].display(), "brew install --cask puppet-agent");
    }

    #[test]
    fn test_mac_disk_image_install() {
        let config = HomeboxConfig {
            agent_source: AgentSource::Download,
            agent_download_template: "https://dl.example.test/{major}.{minor}/agent.dmg".to_string(),
            ..HomeboxConfig::default()
        };
        let fixture = Fixture::with_config(OsDescriptor::new(OsFamily::MacLike, "14.2"), config);
        let mount = fixture.paths.config_dir.join("puppet-agent-volume");
        let runner = ScriptedRunner::new(move |inv| {
            if inv.program() == "hdiutil" && inv.arguments()[0] == "attach" {
                fs::create_dir_all(&mount).unwrap();
                fs::write(mount.join("puppet-agent-8.6.0-1-installer.pkg"), "pkg").unwrap();
            }
            exit(if inv.program() == AGENT { 1 } else { 0 })
        });
        let fetcher = FakeFetcher::new().serve("https://dl.example.test/14.0/agent.dmg", "DMG");

        let result = install_agent(&fixture.ctx(&runner, &fetcher), &MacStrategy, &Secret::new("pw"));

        assert!(matches!(result, StageResult::Succeeded), "{result:?}");
        let sudo = runner
            .calls()
            .into_iter()
            .find(|c| c.program() == "sudo")
            .unwrap();
        assert!(sudo.display().contains("installer -pkg"));
        assert!(sudo.display().ends_with("puppet-agent-8.6.0-1-installer.pkg -target /"));
        assert_eq!(sudo.stdin_bytes(), Some(&b"pw\n"[..]));
        assert!(!fixture.home().join("puppet-agent.dmg").exists());
        assert_eq!(runner.programs().last().unwrap(), "hdiutil");
    }

    #[test]
    fn test_disk_image_removed_when_attach_fails() {
        let config = HomeboxConfig {
            agent_source: AgentSource::Download,
            agent_download_template: "https://dl.example.test/{major}.{minor}/agent.dmg".to_string(),
            ..HomeboxConfig::default()
        };
        let fixture = Fixture::with_config(OsDescriptor::new(OsFamily::MacLike, "14.2"), config);
        let runner = ScriptedRunner::new(|inv| {
            let attach = inv.program() == "hdiutil" && inv.arguments()[0] == "attach";
            exit(if inv.program() == AGENT || attach { 1 } else { 0 })
        });
        let fetcher = FakeFetcher::new().serve("https://dl.example.test/14.0/agent.dmg", "DMG");

        let result = install_agent(&fixture.ctx(&runner, &fetcher), &MacStrategy, &Secret::new("pw"));

        assert!(
            matches!(result, StageResult::Failed(BootstrapError::ToolFailed { .. })),
            "{result:?}"
        );
        assert!(!fixture.home().join("puppet-agent.dmg").exists());
        assert!(!runner.programs().contains(&"sudo".to_string()));
        let detached = runner
            .calls()
            .iter()
            .any(|c| c.program() == "hdiutil" && c.arguments()[0] == "detach");
        assert!(!detached);
    }

    #[test]
    fn test_gem_chain_happy_path() {
        let fixture = fedora();
        let rubies = fixture.home().join(".rvm/rubies");
        let runner = ScriptedRunner::new(move |inv| {
            if inv.program().ends_with("/rvm") {
                fs::create_dir_all(rubies.join("ruby-3.2.2")).unwrap();
                fs::create_dir_all(rubies.join("ruby-3.3.0")).unwrap();
            }
            exit(if inv.program() == AGENT { 1 } else { 0 })
        });
        let fetcher = FakeFetcher::new().serve("https://get.rvm.io", "#!/bin/bash\necho rvm");

        let result = install_agent(
            &fixture.ctx(&runner, &fetcher),
            &RedHatStrategy::fedora(),
            &Secret::new("pw"),
        );

        assert!(matches!(result, StageResult::Succeeded), "{result:?}");
        let calls = runner.calls();
        let programs = runner.programs();
        assert_eq!(programs[1], "gpg");
        assert_eq!(calls[2].display(), "sudo -S -p  dnf install -qy ruby");
        assert_eq!(calls[2].stdin_bytes(), Some(&b"pw\n"[..]));
        assert_eq!(programs[3], "bash");
        assert_eq!(calls[3].stdin_bytes(), Some(&b"#!/bin/bash\necho rvm"[..]));
        assert!(programs[5].ends_with(".rvm/rubies/ruby-3.3.0/bin/gem"));
        assert_eq!(calls[5].arguments(), ["install", "puppet"]);
    }

    #[test]
    fn test_gpg_failure_aborts_chain() {
        let fixture = fedora();
        let runner = ScriptedRunner::always(2);
        let fetcher = FakeFetcher::new();

        let result = install_agent(
            &fixture.ctx(&runner, &fetcher),
            &RedHatStrategy::centos(),
            &Secret::new("pw"),
        );

        assert_eq!(chain_step(result), ChainStep::GpgImport);
        assert_eq!(runner.programs(), vec!["puppet", "gpg"]);
        assert!(fetcher.requests().is_empty());
    }

    #[test]
    fn test_runtime_install_uses_yum_on_centos() {
        let fixture = Fixture::new(OsDescriptor::new(OsFamily::CentOsLike, "7"));
        let runner = ScriptedRunner::new(|inv| exit(if inv.program() == "sudo" || inv.program() == AGENT { 1 } else { 0 }));
        let fetcher = FakeFetcher::new();

        let result = install_agent(
            &fixture.ctx(&runner, &fetcher),
            &RedHatStrategy::centos(),
            &Secret::new("pw"),
        );

        assert_eq!(chain_step(result), ChainStep::RuntimeInstall);
        assert!(runner.calls()[2].display().contains("yum install"));
    }

    #[test]
    fn test_rvm_download_failure() {
        let fixture = fedora();
        let runner = ScriptedRunner::new(|inv| exit(if inv.program() == AGENT { 1 } else { 0 }));
        let fetcher = FakeFetcher::new();

        let result = install_agent(
            &fixture.ctx(&runner, &fetcher),
            &RedHatStrategy::fedora(),
            &Secret::new("pw"),
        );

        assert_eq!(chain_step(result), ChainStep::VersionManagerInstall);
    }

    #[test]
    fn test_missing_runtime_is_build_failure() {
        let fixture = fedora();
        let runner = ScriptedRunner::new(|inv| exit(if inv.program() == AGENT { 1 } else { 0 }));
        let fetcher = FakeFetcher::new().serve("https://get.rvm.io", "echo rvm");

        let result = install_agent(
            &fixture.ctx(&runner, &fetcher),
            &RedHatStrategy::fedora(),
            &Secret::new("pw"),
        );

        assert_eq!(chain_step(result), ChainStep::RuntimeBuild);
    }

    #[test]
    fn test_gem_failure() {
        let fixture = fedora();
        let rubies = fixture.home().join(".rvm/rubies");
        fs::create_dir_all(rubies.join("ruby-3.3.0")).unwrap();
        let runner = ScriptedRunner::new(|inv| {
            exit(if inv.program() == AGENT || inv.program().ends_with("/gem") { 1 } else { 0 })
        });
        let fetcher = FakeFetcher::new().serve("https://get.rvm.io", "echo rvm");

        let result = install_agent(
            &fixture.ctx(&runner, &fetcher),
            &RedHatStrategy::fedora(),
            &Secret::new("pw"),
        );

        assert_eq!(chain_step(result), ChainStep::AgentGemInstall);
    }

    #[test]
    fn test_newest_runtime_ordering() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["ruby-2.7.8", "ruby-3.3.0", "ruby-3.2.2", "jruby-9.4"] {
            fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("ruby-9.9.9"), "not a dir").unwrap();

        assert_eq!(newest_runtime(dir.path()), Some(dir.path().join("ruby-3.3.0")));
        assert_eq!(newest_runtime(&dir.path().join("missing")), None);
    }
}
