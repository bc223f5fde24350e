//! Build-of-materials change markers for dashboards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Which half of a cluster a BOM version describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BomType {
    Master,
    Worker,
}

impl BomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BomType::Master => "Master",
            BomType::Worker => "Worker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Some(BomType::Master),
            "worker" => Some(BomType::Worker),
            _ => None,
        }
    }
}

impl fmt::Display for BomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A BOM version observed on a freshly created cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BomAnnotation {
    pub carrier_name: String,
    /// Full version string, e.g. `1.30.4_1536`
    pub bom: String,
    pub kind: BomType,
    pub timestamp: DateTime<Utc>,
}

impl BomAnnotation {
    /// `major_minor` of the BOM; dashboards key on this with `_` as separator.
    pub fn kube_major_minor(&self) -> String {
        self.bom
            .split('.')
            .take(2)
            .collect::<Vec<_>>()
            .join("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kube_major_minor() {
        let annotation = BomAnnotation {
            carrier_name: "carrier1".to_string(),
            bom: "1.30.4_1536".to_string(),
            kind: BomType::Master,
            timestamp: Utc::now(),
        };
        assert_eq!(annotation.kube_major_minor(), "1_30");
    }

    #[test]
    fn test_parse_bom_type() {
        assert_eq!(BomType::parse("WORKER"), Some(BomType::Worker));
        assert_eq!(BomType::parse("etcd"), None);
    }
}
