//! Kubernetes version strings as the cluster API reports them.
//!
//! Versions are `major.minor[.patch][_suffix]`; OpenShift versions carry an
//! `_openshift` suffix.

use serde::Deserialize;

use crate::error::{ClientError, ClientResult};

pub const OPENSHIFT_SUFFIX: &str = "_openshift";

pub fn trim_openshift(version: &str) -> &str {
    version.trim_end_matches(OPENSHIFT_SUFFIX)
}

fn major_minor(version: &str) -> Option<(u32, u32)> {
    let mut parts = trim_openshift(version).split(['.', '_']);
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Next version to upgrade `current` to on the way to `target`.
///
/// Masters are moved at most one minor version per cycle. A change of major
/// version is not stepped; the target is returned as is.
pub fn upgrade_step(current: &str, target: &str, openshift: bool) -> String {
    let (Some((cur_major, cur_minor)), Some((target_major, target_minor))) =
        (major_minor(current), major_minor(target))
    else {
        tracing::warn!(current = %current, target = %target, "Unparseable kube version");
        return target.to_string();
    };

    if cur_major != target_major {
        tracing::warn!(
            current = %current,
            target = %target,
            "Unlikely to upgrade due to change in major version"
        );
        return target.to_string();
    }

    if cur_minor + 1 < target_minor {
        let step = format!("{}.{}", target_major, cur_minor + 1);
        return if openshift {
            format!("{}{}", step, OPENSHIFT_SUFFIX)
        } else {
            step
        };
    }
    target.to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct VersionEntry {
    major: u32,
    minor: u32,
    #[serde(default)]
    default: bool,
}

#[derive(Debug, Deserialize)]
struct VersionsBody {
    #[serde(default)]
    kubernetes: Vec<VersionEntry>,
    #[serde(default)]
    openshift: Vec<VersionEntry>,
}

/// Default and next-newer `major.minor` versions offered by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubeVersions {
    pub default: String,
    /// Empty when nothing newer than the default is offered
    pub next: String,
}

impl KubeVersions {
    /// Parse a GetVersions body. Patch levels are dropped since they may be
    /// withdrawn while a run is in progress.
    pub fn parse(body: &[u8], openshift: bool) -> ClientResult<Self> {
        let parsed: VersionsBody =
            serde_json::from_slice(body).map_err(|e| ClientError::MalformedBody(e.to_string()))?;
        let entries = if openshift {
            parsed.openshift
        } else {
            parsed.kubernetes
        };
        let format = |major: u32, minor: u32| {
            let v = format!("{}.{}", major, minor);
            if openshift {
                format!("{}{}", v, OPENSHIFT_SUFFIX)
            } else {
                v
            }
        };

        let mut versions = KubeVersions::default();
        let mut default: Option<(u32, u32)> = None;
        for entry in entries {
            match default {
                None if entry.default => {
                    versions.default = format(entry.major, entry.minor);
                    default = Some((entry.major, entry.minor));
                }
                Some(d) if (entry.major, entry.minor) > d => {
                    versions.next = format(entry.major, entry.minor);
                    break;
                }
                _ => {}
            }
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_advances_one_minor_at_a_time() {
        assert_eq!(upgrade_step("1.28.5_1540", "1.31", false), "1.29");
        assert_eq!(upgrade_step("1.30.2", "1.31", false), "1.31");
        assert_eq!(upgrade_step("4.12.9_openshift", "4.15_openshift", true), "4.13_openshift");
    }

    #[test]
    fn test_upgrade_across_major_returns_target() {
        assert_eq!(upgrade_step("1.31.0", "2.0", false), "2.0");
    }

    #[test]
    fn test_step_never_skips_minor_versions() {
        let target = "1.35";
        let mut current = "1.27.3".to_string();
        let mut steps = 0;
        while !current.starts_with(target) {
            let next = upgrade_step(&current, target, false);
            let (_, cur_minor) = major_minor(&current).unwrap();
            let (_, next_minor) = major_minor(&next).unwrap();
            assert_eq!(next_minor, cur_minor + 1);
            current = next;
            steps += 1;
        }
        assert_eq!(steps, 8);
    }

    #[test]
    fn test_trim_openshift() {
        assert_eq!(trim_openshift("4.14_openshift"), "4.14");
        assert_eq!(trim_openshift("1.30"), "1.30");
    }

    #[test]
    fn test_parse_versions() {
        let body = br#"{
            "kubernetes": [
                {"major": 1, "minor": 29, "default": false},
                {"major": 1, "minor": 30, "default": true},
                {"major": 1, "minor": 30, "default": false},
                {"major": 1, "minor": 31, "default": false}
            ],
            "openshift": [
                {"major": 4, "minor": 14, "default": true}
            ]
        }"#;
        let kube = KubeVersions::parse(body, false).unwrap();
        assert_eq!(kube.default, "1.30");
        assert_eq!(kube.next, "1.31");

        let openshift = KubeVersions::parse(body, true).unwrap();
        assert_eq!(openshift.default, "4.14_openshift");
        assert!(openshift.next.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            KubeVersions::parse(b"<html>", false),
            Err(ClientError::MalformedBody(_))
        ));
    }
}
