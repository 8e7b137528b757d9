//! Rebuilds the game project and swaps the freshly built assembly into the managed runtime.

use crate::config::{BuildConfig, ScriptingConfig};
use crate::error::{ScriptError, ScriptResult};
use crate::host::ScriptHost;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// How many trailing diagnostic lines a failed build keeps.
const DIAGNOSTIC_TAIL: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl BuildCommand {
    pub fn from_config(build: &BuildConfig, base_dir: &Path) -> Self {
        let mut args = vec![
            "build".to_string(),
            build.project.display().to_string(),
            "-c".to_string(),
            build.configuration.as_str().to_string(),
        ];
        args.extend(build.extra_args.iter().cloned());
        let working_dir = match &build.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base_dir.join(dir),
            None => base_dir.to_path_buf(),
        };
        Self { program: build.program.clone(), args, working_dir: Some(working_dir) }
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl BuildOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn status_label(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }

    /// Last non-empty lines of stderr, or stdout when stderr is empty (msbuild reports errors on stdout).
    pub fn diagnostics(&self, limit: usize) -> Vec<String> {
        let source = if self.stderr.trim().is_empty() { &self.stdout } else { &self.stderr };
        let lines: Vec<&str> = source.lines().map(str::trim_end).filter(|line| !line.is_empty()).collect();
        let start = lines.len().saturating_sub(limit);
        lines[start..].iter().map(|line| line.to_string()).collect()
    }
}

pub trait BuildRunner {
    /// Runs the command to completion. `Err` only when it could not be launched.
    fn run(&mut self, command: &BuildCommand) -> std::io::Result<BuildOutput>;
}

/// Spawns the build directly (no shell) and captures its output.
#[derive(Debug, Default)]
pub struct ProcessBuildRunner;

impl BuildRunner for ProcessBuildRunner {
    fn run(&mut self, command: &BuildCommand) -> std::io::Result<BuildOutput> {
        let mut process = Command::new(&command.program);
        process.args(&command.args);
        if let Some(dir) = &command.working_dir {
            process.current_dir(dir);
        }
        let started = Instant::now();
        let output = process.output()?;
        Ok(BuildOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: started.elapsed(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub assembly: PathBuf,
    pub build: BuildOutput,
}

pub struct AssemblyReloader {
    command: BuildCommand,
    output: PathBuf,
    base_dir: PathBuf,
    runner: Box<dyn BuildRunner>,
}

impl AssemblyReloader {
    pub fn from_config(config: &ScriptingConfig) -> Self {
        Self::with_runner(config, Box::new(ProcessBuildRunner))
    }

    pub fn with_runner(config: &ScriptingConfig, runner: Box<dyn BuildRunner>) -> Self {
        let base_dir = config.base_dir();
        Self {
            command: BuildCommand::from_config(&config.build, &base_dir),
            output: config.build.output.clone(),
            base_dir,
            runner,
        }
    }

    pub fn command(&self) -> &BuildCommand {
        &self.command
    }

    /// Absolute candidates for the built assembly: rooted at the base directory, then at the
    /// build's working directory when that differs. The process working directory is never consulted.
    pub fn probe_paths(&self) -> Vec<PathBuf> {
        let mut probes = vec![self.base_dir.join(&self.output)];
        if let Some(working_dir) = &self.command.working_dir {
            let rooted = working_dir.join(&self.output);
            if !probes.contains(&rooted) {
                probes.push(rooted);
            }
        }
        probes
    }

    pub fn locate_output(&self) -> ScriptResult<PathBuf> {
        let probes = self.probe_paths();
        for probe in &probes {
            debug!(path = %probe.display(), "probing build output");
            if probe.is_file() {
                return Ok(probe.clone());
            }
        }
        Err(ScriptError::AssemblyNotFound { probed: probes })
    }

    pub fn build(&mut self) -> ScriptResult<BuildOutput> {
        let command = self.command.to_string();
        info!(%command, "building game assembly");
        let output = self
            .runner
            .run(&self.command)
            .map_err(|source| {
                error!(%command, "could not launch build: {source}");
                ScriptError::BuildLaunch { command: command.clone(), source }
            })?;
        for line in output.stdout.lines() {
            debug!(target: "build", "{line}");
        }
        if !output.success() {
            let diagnostics = output.diagnostics(DIAGNOSTIC_TAIL);
            error!(%command, status = %output.status_label(), "game assembly build failed");
            for line in &diagnostics {
                error!(target: "build", "{line}");
            }
            return Err(ScriptError::BuildFailed { command, status: output.status_label(), diagnostics });
        }
        info!(elapsed_ms = output.elapsed.as_millis() as u64, "game assembly built");
        Ok(output)
    }

    /// Build, locate, load. Any failure leaves the previously loaded game assembly in place.
    pub fn reload_assembly(&mut self, host: &mut ScriptHost) -> ScriptResult<ReloadReport> {
        let build = self.build()?;
        let assembly = self.locate_output().inspect_err(|err| error!("{err}"))?;
        host.load_app_assembly(&assembly)?;
        Ok(ReloadReport { assembly, build })
    }
}
