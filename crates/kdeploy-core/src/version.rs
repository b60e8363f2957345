//! Version gate: decides whether an upgrade may proceed.
//!
//! Ordering follows semantic-version precedence as implemented by the
//! `semver` crate. Version strings are normalized first so that the
//! looser forms found on deployed labels (`v1.2`, `1`) still compare.

use semver::Version;
use thiserror::Error;

/// Reasons an upgrade is refused before touching the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("kubeware is not deployed and thus it can't be upgraded")]
    NotDeployed,

    #[error("cannot upgrade to version '{target}' since version '{deployed}' is already deployed")]
    DowngradeRejected { deployed: String, target: String },

    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },
}

/// Authorize an upgrade from `deployed` to `target`.
///
/// Re-applying the deployed version is allowed; only a strictly lower
/// target is rejected.
pub fn authorize(deployed: Option<&str>, target: &str) -> Result<(), GateError> {
    let deployed = match deployed.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return Err(GateError::NotDeployed),
    };

    let current = parse_version(deployed)?;
    let next = parse_version(target)?;

    if next < current {
        return Err(GateError::DowngradeRejected {
            deployed: deployed.to_string(),
            target: target.trim().to_string(),
        });
    }
    Ok(())
}

/// Parse a version string, tolerating a leading `v` and missing
/// minor/patch components.
pub fn parse_version(raw: &str) -> Result<Version, GateError> {
    let normalized = normalize(raw);
    Version::parse(&normalized).map_err(|e| GateError::InvalidVersion {
        version: raw.to_string(),
        reason: e.to_string(),
    })
}

fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    // Split off "-pre" / "+build" so only the numeric core is padded.
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);

    let mut parts: Vec<&str> = core.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    format!("{}{}", parts.join("."), suffix)
}
