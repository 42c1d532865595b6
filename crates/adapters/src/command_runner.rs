// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `%`-escape template expansion and shell invocation for the failover,
//! failback and follow-primary commands (§4.9).

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn shell: {0}")]
    Spawn(std::io::Error),
    #[error("command exited with status {0}")]
    NonZeroExit(i32),
    #[error("command terminated by signal")]
    Signaled,
}

/// Node metadata available for template expansion. Any field may be
/// absent (e.g. no old primary existed); absent fields substitute `""`
/// per §4.9.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub failed_id: Option<String>,
    pub failed_host: Option<String>,
    pub failed_port: Option<String>,
    pub failed_data_dir: Option<String>,
    pub new_main_id: Option<String>,
    pub new_main_host: Option<String>,
    pub new_main_port: Option<String>,
    pub new_main_data_dir: Option<String>,
    pub old_main_id: Option<String>,
    pub old_primary_id: Option<String>,
    pub old_primary_host: Option<String>,
    pub old_primary_port: Option<String>,
}

/// Expand a `%`-escaped template against `ctx`. Unknown `%x` escapes are
/// dropped with a log line rather than treated as an error (§7:
/// configuration errors during template expansion are non-fatal).
pub fn expand_template(template: &str, ctx: &CommandContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let field = |f: &Option<String>| f.clone().unwrap_or_default();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('d') => out.push_str(&field(&ctx.failed_id)),
            Some('h') => out.push_str(&field(&ctx.failed_host)),
            Some('p') => out.push_str(&field(&ctx.failed_port)),
            Some('D') => out.push_str(&field(&ctx.failed_data_dir)),
            Some('m') => out.push_str(&field(&ctx.new_main_id)),
            Some('H') => out.push_str(&field(&ctx.new_main_host)),
            Some('r') => out.push_str(&field(&ctx.new_main_port)),
            Some('R') => out.push_str(&field(&ctx.new_main_data_dir)),
            Some('M') => out.push_str(&field(&ctx.old_main_id)),
            Some('P') => out.push_str(&field(&ctx.old_primary_id)),
            Some('N') => out.push_str(&field(&ctx.old_primary_host)),
            Some('S') => out.push_str(&field(&ctx.old_primary_port)),
            Some('%') => out.push('%'),
            Some(other) => {
                tracing::warn!(escape = %other, "unknown template escape, dropping");
            }
            None => out.push('%'),
        }
    }
    out
}

#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Expand `template` against `ctx` and run it via `sh -c`. The exit
    /// status is returned to the caller but never interpreted for retry
    /// (§4.9: "return value propagated but not interpreted for retry").
    async fn run(&self, template: &str, ctx: &CommandContext) -> Result<(), CommandError>;
}

/// Real implementation: `sh -c <expanded template>` via `tokio::process`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellCommandRunner;

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, template: &str, ctx: &CommandContext) -> Result<(), CommandError> {
        let expanded = expand_template(template, ctx);
        if expanded.trim().is_empty() {
            return Ok(());
        }
        tracing::info!(command = %expanded, "invoking external command");
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&expanded)
            .status()
            .await
            .map_err(CommandError::Spawn)?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(CommandError::NonZeroExit(code)),
            None => Err(CommandError::Signaled),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{CommandContext, CommandError, CommandRunner};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct RecordedRun {
        pub template: String,
        pub expanded: String,
    }

    #[derive(Clone, Default)]
    pub struct FakeCommandRunner {
        runs: Arc<Mutex<Vec<RecordedRun>>>,
        fail_next: Arc<Mutex<bool>>,
    }

    impl FakeCommandRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn runs(&self) -> Vec<RecordedRun> {
            self.runs.lock().clone()
        }

        pub fn fail_next(&self) {
            *self.fail_next.lock() = true;
        }
    }

    #[async_trait]
    impl CommandRunner for FakeCommandRunner {
        async fn run(&self, template: &str, ctx: &CommandContext) -> Result<(), CommandError> {
            let expanded = super::expand_template(template, ctx);
            self.runs.lock().push(RecordedRun {
                template: template.to_string(),
                expanded,
            });
            let mut fail = self.fail_next.lock();
            if *fail {
                *fail = false;
                return Err(CommandError::NonZeroExit(1));
            }
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeCommandRunner, RecordedRun};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_escapes() {
        let ctx = CommandContext {
            failed_id: Some("0".into()),
            new_main_id: Some("1".into()),
            old_primary_id: Some("0".into()),
            ..Default::default()
        };
        let out = expand_template("degen %d, main now %m, old primary %P, literal %%", &ctx);
        assert_eq!(out, "degen 0, main now 1, old primary 0, literal %");
    }

    #[test]
    fn missing_fields_substitute_empty_string() {
        let ctx = CommandContext::default();
        assert_eq!(expand_template("[%h]", &ctx), "[]");
    }

    #[test]
    fn unknown_escape_is_dropped() {
        let ctx = CommandContext::default();
        assert_eq!(expand_template("a%xb", &ctx), "ab");
    }

    #[test]
    fn trailing_percent_is_preserved() {
        let ctx = CommandContext::default();
        assert_eq!(expand_template("abc%", &ctx), "abc%");
    }
}
