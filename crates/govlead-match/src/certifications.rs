//! Which set-aside restrictions each company certification qualifies for.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use govlead_core::SetAsideType;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct CertificationRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    certifications: Vec<CertificationRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct CertificationRule {
    code: String,
    set_asides: Vec<SetAsideType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationMatrix {
    entries: BTreeMap<String, BTreeSet<SetAsideType>>,
}

impl Default for CertificationMatrix {
    fn default() -> Self {
        use SetAsideType::*;

        let rows: [(&str, &[SetAsideType]); 8] = [
            ("SB", &[SmallBusiness]),
            ("8A", &[EightA, SmallBusiness]),
            ("HUBZONE", &[HubZone]),
            ("SDVOSB", &[ServiceDisabledVeteranOwned, VeteranOwned]),
            ("VOSB", &[VeteranOwned]),
            ("WOSB", &[WomenOwned]),
            ("EDWOSB", &[EconomicallyDisadvantagedWomenOwned, WomenOwned]),
            ("ISBEE", &[IndianSmallBusiness]),
        ];
        Self {
            entries: rows
                .into_iter()
                .map(|(code, set_asides)| (code.to_string(), set_asides.iter().copied().collect()))
                .collect(),
        }
    }
}

impl CertificationMatrix {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: CertificationRulesFile = serde_yaml::from_str(text)?;
        let mut entries: BTreeMap<String, BTreeSet<SetAsideType>> = BTreeMap::new();
        for rule in file.certifications {
            entries
                .entry(normalize_code(&rule.code))
                .or_default()
                .extend(rule.set_asides);
        }
        Ok(Self { entries })
    }

    /// Loads `rules/certifications.yaml` under `root`, or the built-in matrix
    /// when the file does not exist.
    pub fn from_workspace_root(root: &Path) -> Result<Self> {
        let path = root.join("rules").join("certifications.yaml");
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no certification rules file; using built-in matrix");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).context("reading rules/certifications.yaml")?;
        Self::from_yaml_str(&text).context("parsing rules/certifications.yaml")
    }

    /// First certification (in code order) among `held` that qualifies for
    /// `set_aside`.
    pub fn qualifying_certification<'a, I>(&self, held: I, set_aside: SetAsideType) -> Option<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let held: BTreeSet<String> = held.into_iter().map(|code| normalize_code(code)).collect();
        held.into_iter().find(|code| {
            self.entries
                .get(code)
                .is_some_and(|set_asides| set_asides.contains(&set_aside))
        })
    }

    pub fn set_asides_for(&self, certification: &str) -> Option<&BTreeSet<SetAsideType>> {
        self.entries.get(&normalize_code(certification))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_matrix_covers_common_certifications() {
        let matrix = CertificationMatrix::default();
        assert_eq!(matrix.len(), 8);
        let held = vec!["edwosb".to_string()];
        assert_eq!(
            matrix.qualifying_certification(&held, SetAsideType::WomenOwned),
            Some("EDWOSB".to_string())
        );
        assert_eq!(matrix.qualifying_certification(&held, SetAsideType::HubZone), None);
    }

    #[test]
    fn rules_file_replaces_built_in_matrix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("rules")).unwrap();
        std::fs::write(
            dir.path().join("rules/certifications.yaml"),
            "version: 1\ncertifications:\n  - code: mbe\n    set_asides: [SBA, OTHER]\n",
        )
        .unwrap();

        let matrix = CertificationMatrix::from_workspace_root(dir.path()).unwrap();
        assert_eq!(matrix.len(), 1);
        assert!(matrix.set_asides_for("MBE").unwrap().contains(&SetAsideType::Other));
        assert!(matrix.set_asides_for("WOSB").is_none());
    }

    #[test]
    fn missing_rules_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = CertificationMatrix::from_workspace_root(dir.path()).unwrap();
        assert_eq!(matrix, CertificationMatrix::default());
    }

    #[test]
    fn unknown_set_aside_codes_are_rejected() {
        let err = CertificationMatrix::from_yaml_str(
            "version: 1\ncertifications:\n  - code: X\n    set_asides: [NOPE]\n",
        );
        assert!(err.is_err());
    }
}
