//! apt-backed package manager

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use super::command::{CommandRunner, SystemCommandRunner};
use super::{HostError, PackageManager};

const APT_GET: &str = "/usr/bin/apt-get";
const APT_CACHE: &str = "/usr/bin/apt-cache";
const APT_KEY: &str = "/usr/bin/apt-key";
const ENV: &str = "/usr/bin/env";
const KEYSERVER: &str = "hkp://keyserver.ubuntu.com:80";
const OS_RELEASE: &str = "/etc/os-release";

/// Versions known to the package index for one package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    /// Installed version, `None` when not installed
    pub installed: Option<String>,
    /// Version apt would install without a pin
    pub candidate: Option<String>,
    /// Every version listed in the version table
    pub available: Vec<String>,
}

/// Package manager shelling out to `apt-get` and `apt-cache`
pub struct AptPackageManager {
    runner: Box<dyn CommandRunner>,
    sources_dir: PathBuf,
    keyring_dir: PathBuf,
}

impl Default for AptPackageManager {
    fn default() -> Self {
        Self::new(Box::new(SystemCommandRunner))
    }
}

impl AptPackageManager {
    pub fn new(runner: Box<dyn CommandRunner>) -> Self {
        Self {
            runner,
            sources_dir: PathBuf::from("/etc/apt/sources.list.d"),
            keyring_dir: PathBuf::from("/etc/apt/trusted.gpg.d"),
        }
    }
}

impl PackageManager for AptPackageManager {
    fn update(&self) -> Result<(), HostError> {
        self.runner.run_checked(APT_GET, &["--quiet", "update"])?;
        Ok(())
    }

    fn add_source(&self, line: &str, key: Option<&str>) -> Result<(), HostError> {
        if let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) {
            if key.starts_with("-----BEGIN PGP") {
                fs::create_dir_all(&self.keyring_dir)?;
                fs::write(self.keyring_dir.join("gitlab.asc"), key)?;
            } else {
                self.runner.run_checked(
                    APT_KEY,
                    &["adv", "--keyserver", KEYSERVER, "--recv-keys", key],
                )?;
            }
        }

        fs::create_dir_all(&self.sources_dir)?;
        fs::write(self.sources_dir.join("gitlab.list"), format!("{}\n", line))?;
        info!(source = line, "Configured apt source");
        Ok(())
    }

    fn install(&self, spec: &str) -> Result<(), HostError> {
        info!(package = spec, "Installing package");
        self.runner.run_checked(
            ENV,
            &[
                "DEBIAN_FRONTEND=noninteractive",
                APT_GET,
                "--assume-yes",
                "--option=Dpkg::Options::=--force-confold",
                "install",
                spec,
            ],
        )?;
        Ok(())
    }

    fn package_info(&self, name: &str) -> Result<Option<PackageInfo>, HostError> {
        let output = self.runner.run_checked(APT_CACHE, &["policy", name])?;
        let info = parse_policy(&output.stdout);
        debug!(package = name, info = ?info, "Parsed apt-cache policy");
        Ok(info)
    }

    fn distro_codename(&self) -> Result<String, HostError> {
        let contents = fs::read_to_string(OS_RELEASE)?;
        parse_os_release_codename(&contents).ok_or_else(|| HostError::ParseError {
            command: OS_RELEASE.to_string(),
            message: "no VERSION_CODENAME entry".to_string(),
        })
    }
}

fn policy_value(line: &str, field: &str) -> Option<Option<String>> {
    let value = line.trim().strip_prefix(field)?.trim();
    if value.is_empty() || value == "(none)" {
        Some(None)
    } else {
        Some(Some(value.to_string()))
    }
}

/// Parse `apt-cache policy <pkg>` output.
///
/// Returns `None` when the output does not describe a package (apt prints
/// nothing for unknown names).
pub fn parse_policy(output: &str) -> Option<PackageInfo> {
    let mut info = PackageInfo::default();
    let mut seen_candidate = false;
    let mut in_table = false;

    for line in output.lines() {
        if let Some(installed) = policy_value(line, "Installed:") {
            info.installed = installed;
            continue;
        }
        if let Some(candidate) = policy_value(line, "Candidate:") {
            info.candidate = candidate;
            seen_candidate = true;
            continue;
        }
        if line.trim() == "Version table:" {
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }

        // Version rows look like " *** 13.2.3-ce.0 500" or "     13.1.0-ce.0 500";
        // priority rows look like "        500 https://packages.gitlab.com/...".
        let row = line.trim().trim_start_matches("***").trim();
        if let Some(version) = row.split_whitespace().next()
            && version.contains('.')
            && version.starts_with(|c: char| c.is_ascii_digit())
            && !info.available.iter().any(|v| v == version)
        {
            info.available.push(version.to_string());
        }
    }

    seen_candidate.then_some(info)
}

/// Extract `VERSION_CODENAME` from `/etc/os-release` contents
pub fn parse_os_release_codename(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let value = line.trim().strip_prefix("VERSION_CODENAME=")?;
        let value = value.trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}
