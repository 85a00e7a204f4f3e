//! Homebrew bootstrap for Mac hosts
//!
//! `brew update` doubles as the health check: if it works Homebrew is
//! installed and now current. Otherwise the official install script is
//! downloaded and run, with the user's password on stdin for its sudo
//! prompts.

use tracing::info;

use super::{StageContext, StageResult};
use crate::error::ToolFailedSnafu;
use crate::exec::{Invocation, succeeds};
use crate::fetch::download;
use crate::secret::Secret;

pub const BREW: &str = "brew";

pub fn ensure_homebrew(ctx: &StageContext<'_>, password: &Secret) -> StageResult {
    if succeeds(ctx.runner, &Invocation::new(BREW).arg("update")) {
        info!("Brew updated successfully.");
        return StageResult::Skipped("Homebrew is already installed".to_string());
    }
    info!("Brew update failed, attempting install.");

    let script = match download(ctx.fetcher, "Homebrew install script", &ctx.config.homebrew_url) {
        Ok(body) => String::from_utf8_lossy(&body).into_owned(),
        Err(e) => return StageResult::Failed(e),
    };

    let install = Invocation::new(&ctx.config.homebrew_interpreter)
        .arg("-c")
        .arg(script)
        .stdin(password.as_stdin_line())
        .passthrough();

    match ctx.runner.status(&install) {
        Ok(0) => StageResult::Succeeded,
        Ok(code) => StageResult::Failed(
            ToolFailedSnafu {
                command: format!("{} -c <homebrew install script>", ctx.config.homebrew_interpreter),
                code,
            }
            .build(),
        ),
        Err(e) => StageResult::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BootstrapError;
    use crate::bootstrap::{Identity, OsDescriptor, OsFamily};
    use crate::config::{HomePaths, HomeboxConfig};
    use crate::exec::testing::{ScriptedRunner, exit};
    use crate::fetch::testing::FakeFetcher;

    fn run(runner: &ScriptedRunner, fetcher: &FakeFetcher) -> StageResult {
        let config = HomeboxConfig::default();
        let paths = HomePaths::rooted("/home/alice", &config);
        let identity = Identity {
            user: "alice".to_string(),
            fqdn: "mbp.local".to_string(),
        };
        let os = OsDescriptor::new(OsFamily::MacLike, "14.5");
        let ctx = StageContext {
            runner,
            fetcher,
            config: &config,
            paths: &paths,
            identity: &identity,
            os: &os,
        };
        ensure_homebrew(&ctx, &Secret::new("hunter2"))
    }

    #[test]
    fn test_healthy_brew_is_skipped() {
        let runner = ScriptedRunner::always(0);
        let fetcher = FakeFetcher::new();

        assert!(matches!(run(&runner, &fetcher), StageResult::Skipped(_)));
        assert_eq!(runner.programs(), vec!["brew"]);
        assert!(fetcher.requests().is_empty());
    }

    #[test]
    fn test_install_script_gets_password_on_stdin() {
        let runner = ScriptedRunner::new(|inv| exit(if inv.program() == BREW { 1 } else { 0 }));
        let fetcher = FakeFetcher::new().serve(&HomeboxConfig::default().homebrew_url, "echo brew");

        assert!(matches!(run(&runner, &fetcher), StageResult::Succeeded));
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].program(), "/bin/bash");
        assert_eq!(calls[1].arguments(), ["-c", "echo brew"]);
        assert_eq!(calls[1].stdin_bytes(), Some(&b"hunter2\n"[..]));
        assert!(!calls[1].arguments().iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn test_download_failure_fails_stage() {
        let runner = ScriptedRunner::always(1);
        let fetcher = FakeFetcher::new();

        let result = run(&runner, &fetcher);
        assert!(matches!(result, StageResult::Failed(BootstrapError::HttpStatus { .. })));
    }

    #[test]
    fn test_script_exit_code_fails_stage() {
        let runner = ScriptedRunner::always(1);
        let fetcher = FakeFetcher::new().serve(&HomeboxConfig::default().homebrew_url, "exit 1");

        let result = run(&runner, &fetcher);
        assert!(matches!(result, StageResult::Failed(BootstrapError::ToolFailed { code: 1, .. })));
    }
}
