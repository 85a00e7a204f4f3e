//! Puppet environment: extension modules plus the HomeBox manifests

use flate2::read::GzDecoder;
use snafu::ResultExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::agent::AGENT;
use super::{StageContext, StageResult};
use crate::error::{ArchiveSnafu, CreateDirectorySnafu, Result};
use crate::exec::{Invocation, succeeds};
use crate::fetch::download_to;

/// Where modules are installed, and the extra `puppet module install`
/// arguments needed to put them there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTarget {
    pub path: PathBuf,
    pub install_args: Vec<String>,
}

/// First user-owned entry of `puppet config print modulepath`, else the
/// HomeBox config directory passed explicitly with `--modulepath`.
pub fn module_target(ctx: &StageContext<'_>) -> ModuleTarget {
    let query = Invocation::new(AGENT).args(["config", "print", "modulepath"]);
    let reported = match ctx.runner.output(&query) {
        Ok(out) if out.success() => out.stdout,
        Ok(out) => {
            debug!(code = out.code, "modulepath query failed");
            String::new()
        }
        Err(e) => {
            debug!(error = %e, "modulepath query failed");
            String::new()
        }
    };

    let user_owned = reported
        .trim()
        .split(':')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .find(|p| p.contains(&ctx.identity.user) || Path::new(p).starts_with(&ctx.paths.home));

    match user_owned {
        Some(path) => ModuleTarget {
            path: PathBuf::from(path),
            install_args: Vec::new(),
        },
        None => {
            let path = ctx.paths.config_dir.clone();
            ModuleTarget {
                install_args: vec!["--modulepath".to_string(), path.to_string_lossy().into_owned()],
                path,
            }
        }
    }
}

/// `puppet module install` each module; failures only warn. Returns how
/// many installed.
pub fn install_modules<'m>(
    ctx: &StageContext<'_>,
    target: &ModuleTarget,
    modules: impl IntoIterator<Item = &'m String>,
) -> usize {
    let mut installed = 0;
    for module in modules {
        let install = Invocation::new(AGENT)
            .args(["module", "install"])
            .arg(module)
            .args(target.install_args.iter().cloned());
        if succeeds(ctx.runner, &install) {
            info!("Installed Puppet module: {module}");
            installed += 1;
        } else {
            warn!("Error installing Puppet module: {module}");
        }
    }
    installed
}

/// Unpack a `.tar.gz` into `target`.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive).context(ArchiveSnafu { archive, target })?;
    tar::Archive::new(GzDecoder::new(file))
        .unpack(target)
        .context(ArchiveSnafu { archive, target })
}

fn install_manifests(ctx: &StageContext<'_>, target: &ModuleTarget) -> Result<()> {
    let config = ctx.config;
    let filename = format!("{}.tar.gz", config.manifest_branch);
    let remote = format!("{}/{}", config.manifest_url.trim_end_matches('/'), filename);
    let local = target.path.join(&filename);
    debug!("Local file: {}", local.display());
    debug!("Remote file: {remote}");

    fs::create_dir_all(&target.path).context(CreateDirectorySnafu { path: &target.path })?;
    download_to(ctx.fetcher, "HomeBox archive", &remote, &local)?;
    let extracted = extract_archive(&local, &target.path);

    if let Err(e) = fs::remove_file(&local) {
        warn!("Error deleting file \"{}\": {e}", local.display());
    }
    extracted?;
    info!("Extracted HomeBox manifests into {}", target.path.display());
    Ok(())
}

pub fn build_environment(ctx: &StageContext<'_>, advanced_setup: bool) -> StageResult {
    let target = module_target(ctx);
    info!("Puppet modulepath: {}", target.path.display());

    install_modules(ctx, &target, &ctx.config.modules);
    if advanced_setup {
        install_modules(ctx, &target, &ctx.config.optional_modules);
    }

    StageResult::from_result(install_manifests(ctx, &target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::platform::{OsDescriptor, OsFamily};
    use crate::bootstrap::testing::Fixture;
    use crate::error::BootstrapError;
    use crate::exec::testing::{ScriptedRunner, exit, printed};
    use crate::fetch::testing::FakeFetcher;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    const ARCHIVE_URL: &str = "https://github.com/bradleyfrank/HomeBox/archive/alpha.tar.gz";

    fn manifest_archive() -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let body = b"class homebox {}\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "HomeBox-alpha/manifests/init.pp", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn fixture() -> Fixture {
        Fixture::new(OsDescriptor::new(OsFamily::FedoraLike, "39"))
    }

    #[test]
    fn test_module_target_prefers_user_path() {
        let fixture = fixture();
        let user_dir = fixture.home().join(".puppetlabs/etc/code/modules");
        let reported = format!("{}:/etc/puppetlabs/code/modules\n", user_dir.display());
        let runner = ScriptedRunner::new(move |_| printed(&reported));
        let fetcher = FakeFetcher::new();

        let target = module_target(&fixture.ctx(&runner, &fetcher));

        assert_eq!(target.path, user_dir);
        assert!(target.install_args.is_empty());
    }

    #[test]
    fn test_module_target_falls_back_to_config_dir() {
        let fixture = fixture();
        let runner = ScriptedRunner::new(|_| printed("/etc/puppetlabs/code/modules:/opt/puppetlabs/puppet/modules\n"));
        let fetcher = FakeFetcher::new();

        let target = module_target(&fixture.ctx(&runner, &fetcher));

        assert_eq!(target.path, fixture.paths.config_dir);
        assert_eq!(target.install_args[0], "--modulepath");
    }

    #[test]
    fn test_module_failures_only_warn() {
        let fixture = fixture();
        let runner = ScriptedRunner::new(|inv| {
            if inv.arguments().iter().any(|a| a == "puppetlabs-vcsrepo") {
                exit(1)
            } else {
                exit(0)
            }
        });
        let fetcher = FakeFetcher::new().serve(ARCHIVE_URL, manifest_archive());

        let result = build_environment(&fixture.ctx(&runner, &fetcher), false);

        assert!(matches!(result, StageResult::Succeeded), "{result:?}");
        let target = fixture.paths.config_dir.clone();
        assert!(target.join("HomeBox-alpha/manifests/init.pp").is_file());
        assert!(!target.join("alpha.tar.gz").exists());
    }

    #[test]
    fn test_optional_modules_need_setup_flag() {
        let fixture = fixture();
        let fetcher = FakeFetcher::new().serve(ARCHIVE_URL, manifest_archive());

        let plain = ScriptedRunner::always(0);
        build_environment(&fixture.ctx(&plain, &fetcher), false);
        let advanced = ScriptedRunner::always(0);
        build_environment(&fixture.ctx(&advanced, &fetcher), true);

        let mentions_stdlib = |runner: &ScriptedRunner| {
            runner
                .calls()
                .iter()
                .any(|c| c.arguments().iter().any(|a| a == "puppetlabs-stdlib"))
        };
        assert!(!mentions_stdlib(&plain));
        assert!(mentions_stdlib(&advanced));
    }

    #[test]
    fn test_corrupt_archive_fails_stage() {
        let fixture = fixture();
        let runner = ScriptedRunner::always(0);
        let fetcher = FakeFetcher::new().serve(ARCHIVE_URL, "not a tarball");

        let result = build_environment(&fixture.ctx(&runner, &fetcher), false);

        assert!(matches!(result, StageResult::Failed(BootstrapError::Archive { .. })));
        assert!(!fixture.paths.config_dir.join("alpha.tar.gz").exists());
    }

    #[test]
    fn test_missing_archive_fails_stage() {
        let fixture = fixture();
        let runner = ScriptedRunner::always(0);
        let fetcher = FakeFetcher::new();

        let result = build_environment(&fixture.ctx(&runner, &fetcher), false);

        assert!(matches!(result, StageResult::Failed(BootstrapError::HttpStatus { .. })));
    }
}
