//! Replay engine: executes a build log against the target toolchain.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::builder::rewrite::{Rewritten, RewriteRules};
use crate::core::errors::CrossBuildError;
use crate::core::invocation::{BuildLog, Invocation};
use crate::util::process::exit_code;

/// Outcome of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Records rewritten and run (or printed, in a dry run)
    pub replayed: usize,
    /// Records dropped as native-build probes
    pub skipped: usize,
    /// Shared objects produced, under their final names
    pub shared_objects: Vec<PathBuf>,
}

/// Replays recorded invocations in a package's working directory.
pub struct ReplayEngine<'a> {
    rules: &'a RewriteRules,
    cwd: PathBuf,
    dry_run: bool,
}

impl<'a> ReplayEngine<'a> {
    /// Create an engine that runs commands in `cwd`.
    pub fn new(rules: &'a RewriteRules, cwd: impl Into<PathBuf>) -> Self {
        ReplayEngine {
            rules,
            cwd: cwd.into(),
            dry_run: false,
        }
    }

    /// Print rewritten commands instead of running them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Replay every record of a build log. An absent log replays nothing.
    pub fn replay_log(&self, log: &BuildLog) -> Result<ReplaySummary> {
        if !log.exists() {
            tracing::info!("no build log at {}, nothing to replay", log.path().display());
            return Ok(ReplaySummary::default());
        }
        let records = log.read()?;
        self.replay(&records)
    }

    /// Replay records in order, stopping at the first failure.
    ///
    /// Outputs of records replayed before a failure are left in place.
    pub fn replay(&self, records: &[Invocation]) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();

        for record in records {
            let Some(rewritten) = self.rules.rewrite(record) else {
                tracing::debug!("skipping probe `{}`", record);
                summary.skipped += 1;
                continue;
            };

            summary.replayed += 1;

            if self.dry_run {
                println!("{}", rewritten.command);
                continue;
            }

            self.run(&rewritten)?;

            if let Some(ref produced) = rewritten.output {
                let renamed = self.finish_shared(produced)?;
                summary.shared_objects.push(renamed);
            }
        }

        Ok(summary)
    }

    fn run(&self, rewritten: &Rewritten) -> Result<()> {
        tracing::info!("{}", rewritten.command);

        let pb = rewritten.command.to_process().cwd(&self.cwd);
        let status = pb.status()?;

        if !status.success() {
            return Err(CrossBuildError::ReplayFailed {
                command: pb.display_command(),
                code: Some(exit_code(&status)),
            }
            .into());
        }
        Ok(())
    }

    /// Rename a produced shared object to the name the loader expects.
    fn finish_shared(&self, produced: &Path) -> Result<PathBuf> {
        let from = self.cwd.join(produced);
        let to = self.cwd.join(self.rules.final_shared_name(produced));

        if !from.is_file() {
            bail!(
                "shared link reported success but {} was not written",
                from.display()
            );
        }

        std::fs::rename(&from, &to).with_context(|| {
            format!("failed to rename {} to {}", from.display(), to.display())
        })?;
        tracing::debug!("renamed {} -> {}", from.display(), to.display());

        Ok(to)
    }
}
