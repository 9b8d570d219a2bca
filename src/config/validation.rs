use super::defaults::{MAX_HOST_LEN, MAX_RECOGNIZER_ARGS, MAX_RECOGNIZER_ARG_BYTES};
use super::{
    AppConfig, MAX_CONNECT_TIMEOUT_MS, MAX_RESTART_DELAY_MS, MIN_CONNECT_TIMEOUT_MS,
    MIN_RESTART_DELAY_MS,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use regex::Regex;
use std::{fs, path::Path, sync::OnceLock};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and split the recognizer command.
    pub fn validate(&mut self) -> Result<()> {
        self.host = self.host.trim().to_string();
        if !is_valid_host(&self.host) {
            bail!(
                "--host must be a hostname or IP address (<= {MAX_HOST_LEN} chars), got '{}'",
                self.host
            );
        }
        if self.port == 0 {
            bail!("--port must be between 1 and 65535");
        }
        if !(MIN_CONNECT_TIMEOUT_MS..=MAX_CONNECT_TIMEOUT_MS).contains(&self.connect_timeout_ms) {
            bail!(
                "--connect-timeout-ms must be between {MIN_CONNECT_TIMEOUT_MS} and {MAX_CONNECT_TIMEOUT_MS}, got {}",
                self.connect_timeout_ms
            );
        }
        if !(8_000..=48_000).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between 8000 and 48000 Hz, got {}",
                self.sample_rate
            );
        }
        if !(MIN_RESTART_DELAY_MS..=MAX_RESTART_DELAY_MS).contains(&self.restart_delay_ms) {
            bail!(
                "--restart-delay-ms must be between {MIN_RESTART_DELAY_MS} and {MAX_RESTART_DELAY_MS}, got {}",
                self.restart_delay_ms
            );
        }
        if self.max_engine_restarts == Some(0) {
            bail!("--max-engine-restarts must be at least 1 when set");
        }
        if self.model_path.as_os_str().is_empty() {
            bail!("--model-path cannot be empty");
        }

        self.recognizer_argv = match self.recognizer_cmd.as_deref() {
            Some(cmd) => split_recognizer_cmd(cmd)?,
            None => Vec::new(),
        };
        Ok(())
    }
}

fn host_pattern() -> &'static Regex {
    static HOST_RE: OnceLock<Regex> = OnceLock::new();
    HOST_RE.get_or_init(|| {
        // Hostnames, dotted IPv4, and bracket-free IPv6 literals.
        Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*$|^[0-9A-Fa-f:.]+:[0-9A-Fa-f:.]*$")
            .expect("host regex should compile")
    })
}

pub(crate) fn is_valid_host(host: &str) -> bool {
    !host.is_empty() && host.len() <= MAX_HOST_LEN && host_pattern().is_match(host)
}

/// Split the recognizer command line and check the program part.
pub(super) fn split_recognizer_cmd(cmd: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(cmd)
        .with_context(|| format!("--recognizer-cmd could not be parsed: '{cmd}'"))?;
    let Some(program) = argv.first() else {
        bail!("--recognizer-cmd cannot be empty");
    };
    if argv.len() > MAX_RECOGNIZER_ARGS {
        bail!(
            "--recognizer-cmd has too many arguments (max {MAX_RECOGNIZER_ARGS}, got {})",
            argv.len()
        );
    }
    let total_bytes: usize = argv.iter().map(|arg| arg.len()).sum();
    if total_bytes > MAX_RECOGNIZER_ARG_BYTES {
        bail!("--recognizer-cmd exceeds {MAX_RECOGNIZER_ARG_BYTES} bytes");
    }
    let program = sanitize_program(program, "--recognizer-cmd")?;
    let mut resolved = vec![program];
    resolved.extend(argv.into_iter().skip(1));
    Ok(resolved)
}

/// Allow either a bare program name (resolved through PATH) or an existing executable path.
pub(super) fn sanitize_program(value: &str, flag: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    if !trimmed
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-' | '+'))
    {
        bail!("{flag} program name '{trimmed}' contains unsupported characters");
    }
    Ok(trimmed.to_string())
}
