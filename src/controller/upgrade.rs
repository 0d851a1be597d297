//! Staged GitLab package upgrades
//!
//! GitLab only supports upgrading one major release at a time, running the
//! database migrations (`gitlab-ctl reconfigure`) at every stop. Each round
//! of the loop looks at the package index and plans a single step:
//!
//! ```text
//! not installed ──────────────────────────────→ Install
//! installed == desired ───────────────────────→ Converged
//! same major ─────────────────────────────────→ MinorUpgrade
//! desired major > installed major ────────────→ MajorStep → (next round)
//! desired major < installed major ────────────→ error (downgrade)
//! ```
//!
//! The loop is bounded by [`MAX_UPGRADE_ROUNDS`] and stops as soon as a
//! major step leaves the installed version where it was.

use std::cmp::Ordering;
use std::fmt;

use semver::Version;
use tracing::{debug, info, instrument, warn};

use crate::controller::error::{Error, Result};
use crate::controller::reconciler::GitlabReconciler;
use crate::controller::status::{self, messages};
use crate::host::{PackageInfo, Status};

/// Upper bound on planning rounds in a single `upgrade_gitlab` call
pub const MAX_UPGRADE_ROUNDS: usize = 64;

/// A Debian package version reduced to major.minor.patch
///
/// `1:13.2.3-ce.0` parses as 13.2.3 with the raw string kept for apt pins.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    raw: String,
    version: Version,
}

impl PackageVersion {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidVersion {
            version: raw.to_string(),
            message: message.to_string(),
        };

        let trimmed = raw.trim();
        let without_epoch = trimmed.split_once(':').map_or(trimmed, |(_, rest)| rest);
        let upstream = without_epoch
            .split_once('-')
            .map_or(without_epoch, |(upstream, _)| upstream);

        if upstream.is_empty() {
            return Err(invalid("empty version"));
        }

        let parts: Vec<&str> = upstream.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid("expected at most major.minor.patch"));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| invalid(&format!("component {part:?} is not a number")))?;
        }
        let [major, minor, patch] = numbers;

        Ok(Self {
            raw: trimmed.to_string(),
            version: Version::new(major, minor, patch),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn major(&self) -> u64 {
        self.version.major
    }

    pub fn version(&self) -> &Version {
        &self.version
    }
}

/// Versions are equal when major, minor and patch agree
impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for PackageVersion {}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The `version` charm option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredVersion {
    /// Track the package candidate
    Latest,
    /// Latest release within a major version (`13.*` or `13`)
    Major(u64),
    /// One specific release
    Exact(PackageVersion),
}

impl DesiredVersion {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(DesiredVersion::Latest);
        }

        let major = raw.strip_suffix(".*").unwrap_or(raw);
        if !major.is_empty() && major.chars().all(|c| c.is_ascii_digit()) {
            let major = major.parse().map_err(|_| Error::InvalidVersion {
                version: raw.to_string(),
                message: "major version out of range".to_string(),
            })?;
            return Ok(DesiredVersion::Major(major));
        }

        if raw.contains('*') {
            return Err(Error::InvalidVersion {
                version: raw.to_string(),
                message: "only a whole major version may be wildcarded".to_string(),
            });
        }

        PackageVersion::parse(raw).map(DesiredVersion::Exact)
    }

    /// Resolve against the package index; `None` when the index has no
    /// candidate to track
    pub fn resolve(&self, info: &PackageInfo) -> Result<Option<PackageVersion>> {
        match self {
            DesiredVersion::Latest => info
                .candidate
                .as_deref()
                .map(PackageVersion::parse)
                .transpose(),
            DesiredVersion::Major(major) => Ok(available_versions(info)
                .into_iter()
                .filter(|v| v.major() == *major)
                .max()),
            DesiredVersion::Exact(version) => Ok(Some(
                available_versions(info)
                    .into_iter()
                    .find(|v| v == version)
                    .unwrap_or_else(|| version.clone()),
            )),
        }
    }
}

fn available_versions(info: &PackageInfo) -> Vec<PackageVersion> {
    info.available
        .iter()
        .filter_map(|raw| match PackageVersion::parse(raw) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable package version");
                None
            }
        })
        .collect()
}

/// Package spec for an initial installation
pub fn install_spec(package: &str, desired: &DesiredVersion, info: Option<&PackageInfo>) -> String {
    match desired {
        DesiredVersion::Latest => package.to_string(),
        DesiredVersion::Major(major) => format!("{package}={major}.*"),
        DesiredVersion::Exact(version) => {
            let pinned = info
                .and_then(|info| available_versions(info).into_iter().find(|v| v == version))
                .unwrap_or_else(|| version.clone());
            format!("{package}={}", pinned.raw())
        }
    }
}

/// One step of the upgrade loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeStep {
    Install { spec: String },
    Converged,
    MinorUpgrade { spec: String },
    /// Latest of the current major, then `next_spec`: the next major's
    /// latest, or the exact pin when that major is the target's
    MajorStep {
        current: u64,
        next: u64,
        next_spec: String,
    },
}

impl fmt::Display for UpgradeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeStep::Install { spec } => write!(f, "Install({spec})"),
            UpgradeStep::Converged => write!(f, "Converged"),
            UpgradeStep::MinorUpgrade { spec } => write!(f, "MinorUpgrade({spec})"),
            UpgradeStep::MajorStep { current, next, .. } => {
                write!(f, "MajorStep({current} -> {next})")
            }
        }
    }
}

/// Decide the next step; `None` when the index cannot tell us what to install
pub fn plan_step(
    package: &str,
    desired: &DesiredVersion,
    info: &PackageInfo,
) -> Result<Option<UpgradeStep>> {
    let Some(installed) = info.installed.as_deref() else {
        return Ok(Some(UpgradeStep::Install {
            spec: install_spec(package, desired, Some(info)),
        }));
    };
    let installed = PackageVersion::parse(installed)?;

    let Some(target) = desired.resolve(info)? else {
        return Ok(None);
    };

    if installed == target {
        return Ok(Some(UpgradeStep::Converged));
    }

    match target.major().cmp(&installed.major()) {
        Ordering::Less => Err(Error::ValidationError(format!(
            "downgrading GitLab from {installed} to {target} is not supported"
        ))),
        Ordering::Equal if target < installed => match desired {
            DesiredVersion::Exact(_) => Err(Error::ValidationError(format!(
                "downgrading GitLab from {installed} to {target} is not supported"
            ))),
            // Nothing newer in this major than what is installed
            _ => Ok(Some(UpgradeStep::Converged)),
        },
        Ordering::Equal => {
            let spec = match desired {
                DesiredVersion::Exact(_) => format!("{package}={}", target.raw()),
                _ => format!("{package}={}.*", target.major()),
            };
            Ok(Some(UpgradeStep::MinorUpgrade { spec }))
        }
        Ordering::Greater => {
            let next = installed.major() + 1;
            let next_spec = match desired {
                DesiredVersion::Exact(_) if target.major() == next => {
                    format!("{package}={}", target.raw())
                }
                _ => format!("{package}={next}.*"),
            };
            Ok(Some(UpgradeStep::MajorStep {
                current: installed.major(),
                next,
                next_spec,
            }))
        }
    }
}

impl GitlabReconciler {
    /// Refresh the index and read package metadata; failures are logged and
    /// reported as `None`
    fn lookup_package(&self) -> Option<PackageInfo> {
        let package = self.ctx.config.package_name();
        if let Err(e) = self.ctx.packages.update() {
            warn!(error = %e, "Failed to refresh package index");
            return None;
        }
        match self.ctx.packages.package_info(package) {
            Ok(Some(info)) => Some(info),
            Ok(None) => {
                warn!(package, "Package index has no entry for GitLab");
                None
            }
            Err(e) => {
                warn!(package, error = %e, "Error getting package information");
                None
            }
        }
    }

    fn install_package(&self, spec: &str) -> Result<()> {
        info!(spec, "Installing GitLab package");
        self.ctx.packages.install(spec)?;
        Ok(())
    }

    /// Bring the installed package to the desired version, one major
    /// release at a time. Returns whether any step ran.
    #[instrument(skip(self), fields(package = self.ctx.config.package_name()))]
    pub fn upgrade_gitlab(&mut self) -> Result<bool> {
        info!("Processing pending package upgrades for GitLab");
        let package = self.ctx.config.package_name();
        let desired = DesiredVersion::parse(&self.ctx.config.version)?;
        let mut progressed = false;
        // Installed version a major step started from
        let mut stepped_from: Option<Option<String>> = None;

        for round in 0..MAX_UPGRADE_ROUNDS {
            let Some(info) = self.lookup_package() else {
                return Ok(false);
            };
            if stepped_from.as_ref() == Some(&info.installed) {
                warn!(round, installed = ?info.installed, "Major upgrade step left the package unchanged");
                return Err(Error::UpgradeDidNotConverge(round));
            }
            let installed_before = info.installed.clone();
            let Some(step) = plan_step(package, &desired, &info)? else {
                warn!("No candidate version for GitLab in the package index");
                return Ok(false);
            };
            debug!(round, %step, "Planned upgrade step");

            match step {
                UpgradeStep::Install { spec } => {
                    status::report(self.ctx.status.as_ref(), Status::maintenance(messages::INSTALLING))?;
                    self.install_package(&spec)?;
                    return Ok(true);
                }
                UpgradeStep::Converged => {
                    info!(version = %self.ctx.config.version, "GitLab is already at the configured version");
                    return Ok(progressed);
                }
                UpgradeStep::MinorUpgrade { spec } => {
                    status::report(self.ctx.status.as_ref(), Status::maintenance(messages::UPGRADING))?;
                    self.install_package(&spec)?;
                    self.gitlab_reconfigure_run()?;
                    return Ok(true);
                }
                UpgradeStep::MajorStep {
                    current,
                    next,
                    next_spec,
                } => {
                    status::report(self.ctx.status.as_ref(), Status::maintenance(messages::UPGRADING))?;
                    info!(major = current, "Upgrading GitLab to latest in current major release");
                    self.install_package(&format!("{package}={current}.*"))?;
                    self.gitlab_reconfigure_run()?;
                    info!(major = next, "Upgrading GitLab to latest in next major release");
                    self.install_package(&next_spec)?;
                    self.gitlab_reconfigure_run()?;
                    progressed = true;
                    stepped_from = Some(installed_before);
                }
            }
        }

        Err(Error::UpgradeDidNotConverge(MAX_UPGRADE_ROUNDS))
    }
}
