//! Canonical crystal structure derived from a filtered record.
//!
//! Strategies, first success wins:
//! 1. the "conventional cell" entry of `results.material.topology`,
//! 2. the primitive cell in `run[0].system[0].atoms`, standardized by a
//!    [`SymmetryAnalyzer`].
//!
//! Failure of both is not an error for the caller; the record is still
//! persisted without a structure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::fair::lattice::{Lattice, Mat3, Vec3};
use crate::fair::record::{ArchiveRecord, Atoms};

pub const METER_TO_ANGSTROM: f64 = 1e10;
/// Position tolerance, in ångström, handed to the symmetry analyzer.
pub const SYMPREC: f64 = 1e-3;

const CONVENTIONAL_LABEL: &str = "conventional cell";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DerivationError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("{labels} species labels but {positions} positions")]
    LengthMismatch { labels: usize, positions: usize },
    #[error("lattice vectors are degenerate")]
    DegenerateLattice,
    #[error("symmetry analysis failed: {0}")]
    Symmetry(String),
}

/// Both strategies failed; carries each reason for the log line.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationSkipped {
    pub conventional: DerivationError,
    pub primitive: DerivationError,
}

impl fmt::Display for DerivationSkipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conventional cell: {}; primitive cell: {}",
            self.conventional, self.primitive
        )
    }
}

/// Atoms in ångström with positions in Cartesian coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicCell {
    pub lattice: Lattice,
    pub species: Vec<String>,
    pub positions: Vec<Vec3>,
}

/// Standardizes a primitive cell to its conventional cell.
pub trait SymmetryAnalyzer: Sync {
    fn conventional_standard(
        &self,
        primitive: &AtomicCell,
        tolerance: f64,
    ) -> Result<AtomicCell, DerivationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureSource {
    ConventionalCellTopology,
    SymmetrizedPrimitiveCell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeInfo {
    pub matrix: Mat3,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub element: String,
    pub cartesian_xyz: Vec3,
    pub fractional_xyz: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalStructure {
    pub lattice: LatticeInfo,
    pub sites: Vec<Site>,
    pub formula: String,
    pub source: StructureSource,
}

impl CanonicalStructure {
    pub fn from_cell(cell: &AtomicCell, source: StructureSource) -> Self {
        let [a, b, c] = cell.lattice.abc();
        let [alpha, beta, gamma] = cell.lattice.angles();
        let sites = cell
            .species
            .iter()
            .zip(&cell.positions)
            .map(|(element, cart)| Site {
                element: element.clone(),
                cartesian_xyz: *cart,
                fractional_xyz: cell.lattice.to_fractional(*cart),
            })
            .collect();
        Self {
            lattice: LatticeInfo {
                matrix: *cell.lattice.matrix(),
                a,
                b,
                c,
                alpha,
                beta,
                gamma,
                volume: cell.lattice.volume(),
            },
            sites,
            formula: hill_formula(&cell.species),
            source,
        }
    }
}

/// Hill order: C, then H, then the rest alphabetically. Without carbon
/// everything is alphabetical. Counts of one are omitted.
pub fn hill_formula(species: &[String]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for s in species {
        *counts.entry(s.as_str()).or_default() += 1;
    }
    let mut out = String::new();
    let mut push = |element: &str, count: usize| {
        out.push_str(element);
        if count > 1 {
            out.push_str(&count.to_string());
        }
    };
    if let Some(carbon) = counts.remove("C") {
        push("C", carbon);
        if let Some(hydrogen) = counts.remove("H") {
            push("H", hydrogen);
        }
    }
    for (element, count) in counts {
        push(element, count);
    }
    out
}

fn number(value: &Value, field: &'static str) -> Result<f64, DerivationError> {
    value.as_f64().ok_or_else(|| DerivationError::Malformed {
        field,
        reason: format!("expected a number, found {value}"),
    })
}

fn vec3_angstrom(value: &Value, field: &'static str) -> Result<Vec3, DerivationError> {
    let items = value.as_array().ok_or_else(|| DerivationError::Malformed {
        field,
        reason: "expected a 3-vector".to_string(),
    })?;
    if items.len() != 3 {
        return Err(DerivationError::Malformed {
            field,
            reason: format!("expected 3 components, found {}", items.len()),
        });
    }
    Ok([
        number(&items[0], field)? * METER_TO_ANGSTROM,
        number(&items[1], field)? * METER_TO_ANGSTROM,
        number(&items[2], field)? * METER_TO_ANGSTROM,
    ])
}

fn vectors_angstrom(value: &Value, field: &'static str) -> Result<Vec<Vec3>, DerivationError> {
    let rows = value.as_array().ok_or_else(|| DerivationError::Malformed {
        field,
        reason: "expected a list of vectors".to_string(),
    })?;
    rows.iter().map(|row| vec3_angstrom(row, field)).collect()
}

/// Convert a parser atoms block (meters) into an [`AtomicCell`] (ångström).
pub fn atomic_cell_from(atoms: &Atoms) -> Result<AtomicCell, DerivationError> {
    let labels = atoms
        .labels
        .as_option()
        .ok_or(DerivationError::Missing("atoms.labels"))?;
    let species = labels
        .as_array()
        .ok_or_else(|| DerivationError::Malformed {
            field: "atoms.labels",
            reason: "expected a list of element symbols".to_string(),
        })?
        .iter()
        .map(|label| {
            label
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| DerivationError::Malformed {
                    field: "atoms.labels",
                    reason: format!("expected a string, found {label}"),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let lattice_value = atoms
        .lattice_vectors
        .as_option()
        .ok_or(DerivationError::Missing("atoms.lattice_vectors"))?;
    let rows = vectors_angstrom(lattice_value, "atoms.lattice_vectors")?;
    let matrix: Mat3 = rows
        .try_into()
        .map_err(|rows: Vec<Vec3>| DerivationError::Malformed {
            field: "atoms.lattice_vectors",
            reason: format!("expected 3 lattice vectors, found {}", rows.len()),
        })?;

    let positions_value = atoms
        .positions
        .as_option()
        .ok_or(DerivationError::Missing("atoms.positions"))?;
    let positions = vectors_angstrom(positions_value, "atoms.positions")?;

    if species.len() != positions.len() {
        return Err(DerivationError::LengthMismatch {
            labels: species.len(),
            positions: positions.len(),
        });
    }
    if species.is_empty() {
        return Err(DerivationError::Missing("atoms.positions"));
    }

    let lattice = Lattice::new(matrix).ok_or(DerivationError::DegenerateLattice)?;
    Ok(AtomicCell {
        lattice,
        species,
        positions,
    })
}

fn from_conventional_topology(record: &ArchiveRecord) -> Result<CanonicalStructure, DerivationError> {
    let atoms = record
        .topology()
        .iter()
        .filter(|entry| entry.normalized_label().as_deref() == Some(CONVENTIONAL_LABEL))
        .find_map(|entry| entry.atoms.as_option())
        .ok_or(DerivationError::Missing(
            "results.material.topology[conventional cell].atoms",
        ))?;
    let cell = atomic_cell_from(atoms)?;
    Ok(CanonicalStructure::from_cell(
        &cell,
        StructureSource::ConventionalCellTopology,
    ))
}

fn from_primitive_cell(
    record: &ArchiveRecord,
    analyzer: &dyn SymmetryAnalyzer,
) -> Result<CanonicalStructure, DerivationError> {
    let atoms = record
        .primitive_atoms()
        .ok_or(DerivationError::Missing("run[0].system[0].atoms"))?;
    let primitive = atomic_cell_from(atoms)?;
    let conventional = analyzer.conventional_standard(&primitive, SYMPREC)?;
    Ok(CanonicalStructure::from_cell(
        &conventional,
        StructureSource::SymmetrizedPrimitiveCell,
    ))
}

pub fn derive(
    record: &ArchiveRecord,
    analyzer: &dyn SymmetryAnalyzer,
) -> Result<CanonicalStructure, DerivationSkipped> {
    let conventional = match from_conventional_topology(record) {
        Ok(structure) => return Ok(structure),
        Err(err) => err,
    };
    log::debug!("conventional cell unavailable ({conventional}); symmetrizing primitive cell");

    match from_primitive_cell(record, analyzer) {
        Ok(structure) => Ok(structure),
        Err(primitive) => Err(DerivationSkipped {
            conventional,
            primitive,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair::lattice::{norm, sub};
    use crate::fair::symmetry::CentringAnalyzer;
    use serde_json::json;

    fn record(value: Value) -> ArchiveRecord {
        serde_json::from_value(value).expect("record")
    }

    fn assert_consistent(structure: &CanonicalStructure) {
        let lattice = Lattice::new(structure.lattice.matrix).expect("lattice");
        for site in &structure.sites {
            let cart = lattice.to_cartesian(site.fractional_xyz);
            assert!(norm(sub(cart, site.cartesian_xyz)) < 1e-9, "{site:?}");
        }
    }

    fn fcc_primitive_atoms() -> Value {
        let a = 4.0e-10;
        json!({
            "labels": ["Cu"],
            "lattice_vectors": [[0.0, a / 2.0, a / 2.0], [a / 2.0, 0.0, a / 2.0], [a / 2.0, a / 2.0, 0.0]],
            "positions": [[0.0, 0.0, 0.0]]
        })
    }

    #[test]
    fn conventional_topology_entry_wins() {
        let rec = record(json!({
            "results": {"material": {"topology": [
                {"label": "original"},
                {"label": "Conventional Cell", "atoms": {
                    "labels": ["Na", "Cl"],
                    "lattice_vectors": [[5.6e-10, 0.0, 0.0], [0.0, 5.6e-10, 0.0], [0.0, 0.0, 5.6e-10]],
                    "positions": [[0.0, 0.0, 0.0], [2.8e-10, 2.8e-10, 2.8e-10]]
                }}
            ]}},
            "run": [{"system": [{"atoms": fcc_primitive_atoms()}]}]
        }));
        let structure = derive(&rec, &CentringAnalyzer).expect("structure");
        assert_eq!(structure.source, StructureSource::ConventionalCellTopology);
        assert_eq!(structure.formula, "ClNa");
        assert_eq!(structure.sites.len(), 2);
        assert!((structure.lattice.a - 5.6).abs() < 1e-9);
        assert!((structure.sites[1].fractional_xyz[0] - 0.5).abs() < 1e-9);
        assert_consistent(&structure);
    }

    #[test]
    fn falls_back_to_symmetrized_primitive_cell() {
        let rec = record(json!({
            "results": {"material": {"topology": [{"label": "original"}]}},
            "run": [{"system": [{"atoms": fcc_primitive_atoms()}]}]
        }));
        let structure = derive(&rec, &CentringAnalyzer).expect("structure");
        assert_eq!(structure.source, StructureSource::SymmetrizedPrimitiveCell);
        assert_eq!(structure.sites.len(), 4);
        assert_eq!(structure.formula, "Cu4");
        assert!((structure.lattice.a - 4.0).abs() < 1e-6);
        assert!((structure.lattice.alpha - 90.0).abs() < 1e-6);
        assert_consistent(&structure);
    }

    #[test]
    fn mismatched_conventional_entry_falls_through() {
        let rec = record(json!({
            "results": {"material": {"topology": [{"label": "conventional cell", "atoms": {
                "labels": ["Cu", "Cu"],
                "lattice_vectors": [[4e-10, 0.0, 0.0], [0.0, 4e-10, 0.0], [0.0, 0.0, 4e-10]],
                "positions": [[0.0, 0.0, 0.0]]
            }}]}},
            "run": [{"system": [{"atoms": fcc_primitive_atoms()}]}]
        }));
        let structure = derive(&rec, &CentringAnalyzer).expect("structure");
        assert_eq!(structure.source, StructureSource::SymmetrizedPrimitiveCell);
    }

    #[test]
    fn nothing_derivable_reports_both_reasons() {
        let skipped = derive(&record(json!({"run": [{}]})), &CentringAnalyzer)
            .expect_err("no structure");
        assert_eq!(
            skipped.conventional,
            DerivationError::Missing("results.material.topology[conventional cell].atoms")
        );
        assert_eq!(skipped.primitive, DerivationError::Missing("run[0].system[0].atoms"));
    }

    #[test]
    fn atoms_block_shape_errors() {
        let bad_lattice: Atoms = serde_json::from_value(json!({
            "labels": ["X"],
            "lattice_vectors": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            "positions": [[0.0, 0.0, 0.0]]
        }))
        .expect("atoms");
        assert!(matches!(
            atomic_cell_from(&bad_lattice),
            Err(DerivationError::Malformed { field: "atoms.lattice_vectors", .. })
        ));

        let flat: Atoms = serde_json::from_value(json!({
            "labels": ["X"],
            "lattice_vectors": [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [3.0, 0.0, 0.0]],
            "positions": [[0.0, 0.0, 0.0]]
        }))
        .expect("atoms");
        assert_eq!(atomic_cell_from(&flat), Err(DerivationError::DegenerateLattice));

        let unavailable: Atoms = serde_json::from_value(json!({
            "labels": ["X"],
            "lattice_vectors": "unavailable",
            "positions": [[0.0, 0.0, 0.0]]
        }))
        .expect("atoms");
        assert!(atomic_cell_from(&unavailable).is_err());
    }

    #[test]
    fn hill_formula_orders_carbon_and_hydrogen_first() {
        let species: Vec<String> = ["O", "H", "C", "H", "C", "N"].iter().map(|s| s.to_string()).collect();
        assert_eq!(hill_formula(&species), "C2H2NO");
        let salts: Vec<String> = ["Cs", "Cl", "Ag", "Cl"].iter().map(|s| s.to_string()).collect();
        assert_eq!(hill_formula(&salts), "AgCl2Cs");
    }
}
