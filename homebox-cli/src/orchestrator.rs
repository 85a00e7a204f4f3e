//! Bootstrap orchestrator - runs every provisioning stage in order
//!
//! Probe, credentials, package manager (only where the OS family has one),
//! agent, environment. Probe, agent and environment failures end the run;
//! credential and package manager failures are reported and the run goes on.

use snafu::IntoError;
use tracing::{error, info, warn};

use crate::bootstrap::credentials::any_created;
use crate::bootstrap::passphrase::load_dictionary;
use crate::bootstrap::report::{Console, Outcome, RunReport};
use crate::bootstrap::skeleton::create_skeleton;
use crate::bootstrap::{
    CredentialResult, Identity, OsDescriptor, OsFamily, PlatformProber, Stage, StageContext,
    StageResult, build_environment, generate, install_agent, persist_passphrase, provision,
    strategy_for,
};
use crate::config::{HomePaths, HomeboxConfig};
use crate::error::{
    BootstrapError, KeyGenerationSnafu, Result, StageFailedSnafu, UnsupportedPlatformSnafu,
};
use crate::exec::CommandRunner;
use crate::fetch::Fetcher;
use crate::secret::PasswordPrompt;

/// Everything a run needs, wired up once by the caller.
pub struct Orchestrator<'a> {
    pub prober: &'a dyn PlatformProber,
    pub runner: &'a dyn CommandRunner,
    pub fetcher: &'a dyn Fetcher,
    pub prompt: &'a dyn PasswordPrompt,
    pub config: HomeboxConfig,
    pub paths: HomePaths,
    pub identity: Identity,
    pub console: Console,
    /// Install `optional_modules` too (`--setup`).
    pub advanced_setup: bool,
}

fn fatal(report: &mut RunReport, stage: Stage, error: BootstrapError) -> BootstrapError {
    error!("{stage} failed: {error}");
    report.record(stage, Outcome::Failed(error.to_string()));
    StageFailedSnafu { stage }.into_error(error)
}

impl Orchestrator<'_> {
    fn context<'c>(&'c self, os: &'c OsDescriptor) -> StageContext<'c> {
        StageContext {
            runner: self.runner,
            fetcher: self.fetcher,
            config: &self.config,
            paths: &self.paths,
            identity: &self.identity,
            os,
        }
    }

    fn probe(&self) -> Result<OsDescriptor> {
        let os = self.prober.probe()?;
        if os.family == OsFamily::Unsupported {
            return UnsupportedPlatformSnafu {
                detail: format!("{os} is not supported"),
            }
            .fail();
        }
        Ok(os)
    }

    fn prepare_directories(&self) {
        let skeleton = create_skeleton(&[
            (self.paths.config_dir.clone(), 0o755),
            (self.paths.ssh_dir.clone(), 0o700),
        ]);
        for dir in &skeleton.created {
            self.console.line(format!("Created: {}", dir.display()));
        }
        for dir in &skeleton.already_existed {
            self.console.line(format!("Exists:  {}", dir.display()));
        }
        if !skeleton.is_success() {
            for (path, e) in &skeleton.errors {
                warn!("Unable to prepare {}: {e}", path.display());
                self.console.line(format!("Unable to create: {}", path.display()));
            }
        }
    }

    /// Passphrase, key generation, and persistence when anything was created.
    fn credentials(&self) -> StageResult {
        let config = &self.config;
        let dictionary =
            match load_dictionary(&config.word_source, config.min_word_length, config.max_word_length) {
                Ok(dictionary) => dictionary,
                Err(e) => return StageResult::Failed(e),
            };
        let passphrase = match generate(&dictionary, config.passphrase_words) {
            Ok(passphrase) => passphrase,
            Err(e) => return StageResult::Failed(e),
        };

        let results = provision(
            self.runner,
            &config.key_types,
            &self.paths.ssh_dir,
            &passphrase,
            &self.identity.key_comment(),
        );

        if !any_created(&results) {
            self.console.line("No SSH keys created.");
            let failed: Vec<String> = results
                .iter()
                .filter(|(_, r)| **r == CredentialResult::Failed)
                .map(|(kind, _)| kind.to_string())
                .collect();
            if failed.is_empty() {
                return StageResult::Skipped("SSH keys already exist".to_string());
            }
            return StageResult::Failed(
                KeyGenerationSnafu {
                    key_types: failed.join(", "),
                }
                .build(),
            );
        }

        self.console.section("Saving & Securing SSH Passphrase");
        match persist_passphrase(&self.paths.ssh_dir, &passphrase) {
            Ok(path) => {
                self.console
                    .line(format!("Your passphrase was saved to: {}\n", path.display()));
                StageResult::Succeeded
            }
            Err(e) => {
                self.console.line("Unable to save passphrase to file.");
                StageResult::Failed(e)
            }
        }
    }

    /// Run every stage, recording outcomes into `report`. The returned error
    /// is the fatal stage failure, wrapped in `StageFailed`.
    pub fn run(&self, report: &mut RunReport) -> Result<()> {
        self.console.section(Stage::Probe.title());
        let os = match self.probe() {
            Ok(os) => os,
            Err(e) => {
                self.console.line("Operating System not supported.");
                return Err(fatal(report, Stage::Probe, e));
            }
        };
        info!("Detected {os}");
        self.console.line(format!("Found: {os}"));
        report.record(Stage::Probe, Outcome::Succeeded);

        self.prepare_directories();

        self.console.section(Stage::Credentials.title());
        let credentials = self.credentials();
        if let StageResult::Failed(e) = &credentials {
            warn!("Credential stage failed, continuing: {e}");
        }
        report.record_result(Stage::Credentials, &credentials, false);

        let password = self.prompt.prompt()?;
        let strategy = strategy_for(&os);
        let ctx = self.context(&os);

        if strategy.manages_packages() {
            self.console.section(Stage::PackageManager.title());
            let result = strategy.ensure_package_manager(&ctx, &password);
            match &result {
                StageResult::Skipped(_) => self.console.line("Package manager appears to be installed already."),
                StageResult::Succeeded => self.console.line("Package manager successfully installed."),
                StageResult::Failed(e) => {
                    warn!("Package manager install failed, continuing: {e}");
                    self.console.line("Package manager failed to install.");
                }
            }
            report.record_result(Stage::PackageManager, &result, false);
        }

        self.console.section(Stage::Agent.title());
        match install_agent(&ctx, strategy.as_ref(), &password) {
            StageResult::Failed(e) => {
                self.console.line("Encountered an error installing Puppet.");
                return Err(fatal(report, Stage::Agent, e));
            }
            result => {
                if matches!(result, StageResult::Skipped(_)) {
                    self.console.line("Puppet appears to be installed already.");
                } else {
                    self.console.line("Puppet successfully installed.");
                }
                report.record_result(Stage::Agent, &result, true);
            }
        }

        self.console.section(Stage::Environment.title());
        match build_environment(&ctx, self.advanced_setup) {
            StageResult::Failed(e) => {
                self.console.line("Puppet environment bootstrap failed.");
                Err(fatal(report, Stage::Environment, e))
            }
            result => {
                self.console.line("Puppet environment successfully bootstrapped.");
                report.record_result(Stage::Environment, &result, true);
                Ok(())
            }
        }
    }
}
