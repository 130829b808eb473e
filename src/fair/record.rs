//! Typed view of a parser archive.
//!
//! Every known section is wrapped in [`Field`] so a missing section is an
//! explicit `Absent` rather than a default value. Keys the crate does not model
//! are carried through untouched in the flattened `extra` maps, which keeps the
//! record structurally intact when it is written back out. A known key whose
//! value has an unexpected JSON type (including `null`) is kept verbatim as
//! [`Field::Unmodeled`] and read as missing.

use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::FairError;

#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Absent,
    Present(T),
    Unmodeled(Value),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent | Self::Unmodeled(_) => None,
        }
    }

    pub fn as_option_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent | Self::Unmodeled(_) => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent | Self::Unmodeled(_) => None,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Present(v) => v.serialize(serializer),
            Self::Unmodeled(raw) => raw.serialize(serializer),
            Self::Absent => serializer.serialize_none(),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        if raw.is_null() {
            return Ok(Self::Unmodeled(raw));
        }
        match serde_json::from_value::<T>(raw.clone()) {
            Ok(v) => Ok(Self::Present(v)),
            Err(err) => {
                log::debug!("keeping section with unexpected shape verbatim: {err}");
                Ok(Self::Unmodeled(raw))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ArchiveRecord {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub metadata: Field<Metadata>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub run: Field<Vec<Run>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub results: Field<Results>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub fair_parse_time: Field<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Run {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub method: Field<Vec<Method>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub calculation: Field<Vec<Calculation>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub system: Field<Vec<System>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Method {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub k_mesh: Field<KMesh>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct KMesh {
    /// Complex grid, usually `{ "re": [...], "im": [...] }`.
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub points: Field<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Calculation {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub energy: Field<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub scf_iteration: Field<Vec<ScfIteration>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub band_gap: Field<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub dos_electronic: Field<Value>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub eigenvalues: Field<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ScfIteration {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub energy: Field<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct System {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub atoms: Field<Atoms>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Atomic description in SI units. The payloads stay untyped here; shape
/// checks happen when a structure is derived so a malformed block only
/// disables derivation instead of rejecting the whole archive.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Atoms {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub labels: Field<Value>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub lattice_vectors: Field<Value>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub positions: Field<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Results {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub material: Field<Material>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Material {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub topology: Field<Vec<TopologyEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct TopologyEntry {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub label: Field<Value>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub cell: Field<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub atoms: Field<Atoms>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TopologyEntry {
    /// Trimmed, lower-cased label; `None` when missing or not a string.
    pub fn normalized_label(&self) -> Option<String> {
        self.label
            .as_option()
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_lowercase())
    }
}

impl ArchiveRecord {
    pub fn from_map(map: Map<String, Value>) -> Result<Self, FairError> {
        serde_json::from_value(Value::Object(map))
            .map_err(|err| FairError::ArchiveShape(err.to_string()))
    }

    pub fn first_run(&self) -> Option<&Run> {
        self.run.as_option().and_then(|runs| runs.first())
    }

    pub fn first_calculation(&self) -> Option<&Calculation> {
        self.first_run()
            .and_then(|run| run.calculation.as_option())
            .and_then(|calcs| calcs.first())
    }

    /// `run[0].system[0].atoms`, the primitive cell as reported by the parser.
    pub fn primitive_atoms(&self) -> Option<&Atoms> {
        self.first_run()
            .and_then(|run| run.system.as_option())
            .and_then(|systems| systems.first())
            .and_then(|system| system.atoms.as_option())
    }

    pub fn topology(&self) -> &[TopologyEntry] {
        self.results
            .as_option()
            .and_then(|results| results.material.as_option())
            .and_then(|material| material.topology.as_option())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn parse_time(&self) -> Option<f64> {
        self.metadata
            .as_option()
            .and_then(|metadata| metadata.fair_parse_time.as_option())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let raw = json!({
            "metadata": {"entry_type": "VASP", "fair_parse_time": 12.5},
            "run": [{"program": {"name": "VASP"}, "calculation": [{"energy": {"total": {"value": -1.0}}}]}],
            "results": {"material": {"topology": [{"label": "original", "n_atoms": 2}]}},
            "upload_id": "abc"
        });
        let record: ArchiveRecord = serde_json::from_value(raw.clone()).expect("decode");
        assert_eq!(record.parse_time(), Some(12.5));
        assert_eq!(record.topology().len(), 1);
        let back = serde_json::to_value(&record).expect("encode");
        assert_eq!(back, raw);
    }

    #[test]
    fn missing_sections_are_absent_and_not_serialized() {
        let record: ArchiveRecord = serde_json::from_value(json!({"x": 1})).expect("decode");
        assert!(record.metadata.is_absent());
        assert!(record.run.is_absent());
        assert!(record.first_calculation().is_none());
        assert!(record.topology().is_empty());
        assert_eq!(serde_json::to_value(&record).expect("encode"), json!({"x": 1}));
    }

    #[test]
    fn wrong_section_type_is_kept_verbatim() {
        let raw = json!({"run": {"not": "a list"}, "metadata": {"fair_parse_time": "yesterday"}});
        let Value::Object(map) = raw.clone() else { unreachable!() };
        let record = ArchiveRecord::from_map(map).expect("tolerated");
        assert!(record.first_run().is_none());
        assert_eq!(record.parse_time(), None);
        assert_eq!(serde_json::to_value(&record).expect("encode"), raw);
    }

    #[test]
    fn null_sections_read_as_missing() {
        let raw = json!({
            "metadata": {"fair_parse_time": null},
            "run": [{
                "calculation": [{"energy": null, "band_gap": null, "scf_iteration": [{"energy": null}]}],
                "system": [{"atoms": null}],
            }],
            "results": null,
        });
        let Value::Object(map) = raw.clone() else { unreachable!() };
        let record = ArchiveRecord::from_map(map).expect("tolerated");
        let calc = record.first_calculation().expect("calculation");
        assert!(calc.energy.as_option().is_none());
        assert!(calc.band_gap.as_option().is_none());
        assert_eq!(calc.scf_iteration.as_option().map(Vec::len), Some(1));
        assert!(record.primitive_atoms().is_none());
        assert!(record.topology().is_empty());
        assert_eq!(record.parse_time(), None);
        assert_eq!(serde_json::to_value(&record).expect("encode"), raw);
    }

    #[test]
    fn topology_label_is_normalized() {
        let entry: TopologyEntry =
            serde_json::from_value(json!({"label": "  Conventional Cell "})).expect("decode");
        assert_eq!(entry.normalized_label().as_deref(), Some("conventional cell"));
        let unlabeled: TopologyEntry = serde_json::from_value(json!({"label": null})).expect("decode");
        assert_eq!(unlabeled.normalized_label(), None);
    }
}
