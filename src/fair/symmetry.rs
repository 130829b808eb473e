//! Built-in conventional-cell standardization.
//!
//! The analyzer reduces the primitive basis and searches integer transforms
//! with entries in {-1, 0, 1} and determinant 1..=4. A candidate cell is
//! accepted for a crystal class only when the decorated sites are invariant
//! under that class's characteristic rotations (or their products with
//! inversion), so atom placement can demote a high-symmetry metric to a lower
//! class. Sites are generated by translating the primitive sites through the
//! supercell, so the conventional cell always holds `det × primitive` sites.

use crate::fair::lattice::{Lattice, Mat3, Vec3, add, det, dot, mat_mul, norm, scale, sub, wrap_unit};
use crate::fair::structure::{AtomicCell, DerivationError, SymmetryAnalyzer};

const MAX_DETERMINANT: i32 = 4;
const MAX_REDUCTION_ROUNDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetricClass {
    Triclinic,
    Monoclinic,
    Orthorhombic,
    Tetragonal,
    Hexagonal,
    Cubic,
}

impl MetricClass {
    const DESCENDING: [MetricClass; 5] = [
        Self::Cubic,
        Self::Hexagonal,
        Self::Tetragonal,
        Self::Orthorhombic,
        Self::Monoclinic,
    ];

    /// Whether a cell with this metric can carry the rotations of `target`
    /// along its own axes.
    fn supports(self, target: MetricClass) -> bool {
        match self {
            Self::Hexagonal => matches!(target, Self::Hexagonal | Self::Triclinic),
            Self::Triclinic => target == Self::Triclinic,
            _ => target <= self && target != Self::Hexagonal,
        }
    }

    /// Rotations, in fractional coordinates of the conventional basis, that
    /// every crystal of the class has.
    fn characteristic_ops(self) -> &'static [IMat3] {
        match self {
            Self::Cubic => &[THREEFOLD_DIAGONAL, TWOFOLD_C],
            Self::Hexagonal => &[THREEFOLD_HEXAGONAL],
            Self::Tetragonal => &[FOURFOLD_C],
            Self::Orthorhombic => &[TWOFOLD_A, TWOFOLD_C],
            Self::Monoclinic => &[TWOFOLD_B],
            Self::Triclinic => &[],
        }
    }
}

type IMat3 = [[i32; 3]; 3];

const IDENTITY: IMat3 = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];
const TWOFOLD_A: IMat3 = [[1, 0, 0], [0, -1, 0], [0, 0, -1]];
const TWOFOLD_B: IMat3 = [[-1, 0, 0], [0, 1, 0], [0, 0, -1]];
const TWOFOLD_C: IMat3 = [[-1, 0, 0], [0, -1, 0], [0, 0, 1]];
const FOURFOLD_C: IMat3 = [[0, -1, 0], [1, 0, 0], [0, 0, 1]];
const THREEFOLD_HEXAGONAL: IMat3 = [[0, -1, 0], [1, -1, 0], [0, 0, 1]];
const THREEFOLD_DIAGONAL: IMat3 = [[0, 0, 1], [1, 0, 0], [0, 1, 0]];

#[derive(Debug, Clone, Copy, Default)]
pub struct CentringAnalyzer;

/// Supercell of the reduced primitive basis with its generated sites, in
/// fractional coordinates.
struct Supercell {
    lattice: Lattice,
    sites: Vec<(String, Vec3)>,
}

impl SymmetryAnalyzer for CentringAnalyzer {
    fn conventional_standard(
        &self,
        primitive: &AtomicCell,
        tolerance: f64,
    ) -> Result<AtomicCell, DerivationError> {
        let reduced = reduce_basis(*primitive.lattice.matrix());
        let candidates: Vec<(IMat3, MetricClass)> = candidate_transforms()
            .map(|p| (p, classify(&mat_mul(&to_f64(&p), &reduced), tolerance)))
            .collect();

        let mut expanded: Vec<Option<Option<Supercell>>> = candidates.iter().map(|_| None).collect();

        for target in MetricClass::DESCENDING {
            let mut eligible: Vec<usize> = (0..candidates.len())
                .filter(|&idx| candidates[idx].1.supports(target))
                .collect();
            eligible.sort_by_key(|&idx| (int_det(&candidates[idx].0), candidates[idx].1 != target));

            for idx in eligible {
                let (transform, metric) = &candidates[idx];
                let cell = expanded[idx].get_or_insert_with(|| {
                    expand(primitive, &reduced, transform, tolerance)
                        .map_err(|err| log::debug!("skipping transform {transform:?}: {err}"))
                        .ok()
                });
                let Some(cell) = cell else {
                    continue;
                };
                if has_class(cell, target, tolerance) {
                    log::debug!(
                        "crystal class {target:?} on {metric:?} metric with transform {transform:?}"
                    );
                    return Ok(into_atomic_cell(cell));
                }
            }
        }

        log::debug!("no symmetry beyond translations; keeping the reduced cell");
        expand(primitive, &reduced, &IDENTITY, tolerance).map(|cell| into_atomic_cell(&cell))
    }
}

fn expand(
    primitive: &AtomicCell,
    reduced: &Mat3,
    transform: &IMat3,
    tolerance: f64,
) -> Result<Supercell, DerivationError> {
    let n = int_det(transform);
    let lattice = Lattice::new(mat_mul(&to_f64(transform), reduced))
        .ok_or_else(|| DerivationError::Symmetry("conventional lattice is degenerate".to_string()))?;

    let mut sites: Vec<(String, Vec3)> = Vec::with_capacity(primitive.species.len() * n as usize);
    let range = 0..MAX_DETERMINANT;
    for (element, cart) in primitive.species.iter().zip(&primitive.positions) {
        for i in range.clone() {
            for j in range.clone() {
                for k in range.clone() {
                    let shift = [
                        scale(reduced[0], f64::from(i)),
                        scale(reduced[1], f64::from(j)),
                        scale(reduced[2], f64::from(k)),
                    ];
                    let p = add(add(add(*cart, shift[0]), shift[1]), shift[2]);
                    let f = lattice.to_fractional(p);
                    let frac = [snap(wrap_unit(f[0])), snap(wrap_unit(f[1])), snap(wrap_unit(f[2]))];
                    if !occupied(&lattice, &sites, frac, tolerance) {
                        sites.push((element.clone(), frac));
                    }
                }
            }
        }
    }

    let expected = primitive.species.len() * n as usize;
    if sites.len() != expected {
        return Err(DerivationError::Symmetry(format!(
            "expected {expected} sites in the conventional cell, generated {}",
            sites.len()
        )));
    }
    Ok(Supercell { lattice, sites })
}

fn into_atomic_cell(cell: &Supercell) -> AtomicCell {
    let lattice = cell.lattice.clone();
    let mut sites = cell.sites.clone();
    sites.sort_by(|a, b| {
        a.0.cmp(&b.0).then_with(|| {
            a.1.iter()
                .zip(b.1.iter())
                .map(|(x, y)| x.total_cmp(y))
                .find(|ord| ord.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    let (species, positions) = sites
        .into_iter()
        .map(|(element, frac)| (element, lattice.to_cartesian(frac)))
        .unzip();
    AtomicCell {
        lattice,
        species,
        positions,
    }
}

fn has_class(cell: &Supercell, target: MetricClass, tolerance: f64) -> bool {
    target
        .characteristic_ops()
        .iter()
        .all(|op| is_symmetry(cell, op, tolerance) || is_symmetry(cell, &negate(op), tolerance))
}

/// Whether `x -> op·x + t` maps the site set onto itself for some `t`.
/// Candidate translations send the first site onto each site of its species.
fn is_symmetry(cell: &Supercell, op: &IMat3, tolerance: f64) -> bool {
    let Some((anchor, x0)) = cell.sites.first() else {
        return true;
    };
    let moved = apply(op, *x0);
    cell.sites
        .iter()
        .filter(|(element, _)| element == anchor)
        .any(|(_, target)| {
            let t = sub(*target, moved);
            cell.sites.iter().all(|(element, x)| {
                let image = add(apply(op, *x), t);
                cell.sites
                    .iter()
                    .any(|(other, y)| other == element && same_site(&cell.lattice, image, *y, tolerance))
            })
        })
}

fn apply(op: &IMat3, x: Vec3) -> Vec3 {
    op.map(|row| row.iter().zip(x).map(|(w, xi)| f64::from(*w) * xi).sum())
}

fn negate(op: &IMat3) -> IMat3 {
    op.map(|row| row.map(|w| -w))
}

fn snap(x: f64) -> f64 {
    if (1.0 - x).abs() < 1e-9 || x.abs() < 1e-12 { 0.0 } else { x }
}

fn same_site(lattice: &Lattice, a: Vec3, b: Vec3, tolerance: f64) -> bool {
    let d = sub(a, b);
    let d = [d[0] - d[0].round(), d[1] - d[1].round(), d[2] - d[2].round()];
    norm(lattice.to_cartesian(d)) <= tolerance
}

fn occupied(lattice: &Lattice, sites: &[(String, Vec3)], frac: Vec3, tolerance: f64) -> bool {
    sites.iter().any(|(_, other)| same_site(lattice, frac, *other, tolerance))
}

/// Pairwise Gauss reduction: shorten each vector by adding or subtracting the
/// others until nothing gets shorter, then order by length and make the basis
/// right-handed.
pub fn reduce_basis(mut m: Mat3) -> Mat3 {
    for _ in 0..MAX_REDUCTION_ROUNDS {
        let mut changed = false;
        for i in 0..3 {
            for j in 0..3 {
                if i == j {
                    continue;
                }
                for sign in [1.0, -1.0] {
                    let candidate = add(m[i], scale(m[j], sign));
                    if dot(candidate, candidate) < dot(m[i], m[i]) * (1.0 - 1e-9) {
                        m[i] = candidate;
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
    m.sort_by(|a, b| dot(*a, *a).total_cmp(&dot(*b, *b)));
    if det(&m) < 0.0 {
        m[2] = scale(m[2], -1.0);
    }
    m
}

fn int_det(p: &IMat3) -> i32 {
    p[0][0] * (p[1][1] * p[2][2] - p[1][2] * p[2][1]) - p[0][1] * (p[1][0] * p[2][2] - p[1][2] * p[2][0])
        + p[0][2] * (p[1][0] * p[2][1] - p[1][1] * p[2][0])
}

fn to_f64(p: &IMat3) -> Mat3 {
    p.map(|row| row.map(f64::from))
}

fn candidate_transforms() -> impl Iterator<Item = IMat3> {
    (0..3i32.pow(9)).filter_map(|mut code| {
        let mut p = [[0i32; 3]; 3];
        for row in p.iter_mut() {
            for entry in row.iter_mut() {
                *entry = code % 3 - 1;
                code /= 3;
            }
        }
        let d = int_det(&p);
        (1..=MAX_DETERMINANT).contains(&d).then_some(p)
    })
}

pub fn classify(m: &Mat3, tolerance: f64) -> MetricClass {
    let [a, b, c] = *m;
    let (la, lb, lc) = (norm(a), norm(b), norm(c));
    let same = |x: f64, y: f64| (x - y).abs() <= tolerance;
    let right = |u: Vec3, v: Vec3| dot(u, v).abs() <= tolerance * norm(u).max(norm(v));
    let obtuse_120 = |u: Vec3, v: Vec3| (dot(u, v) + 0.5 * norm(u) * norm(v)).abs() <= tolerance * norm(u).max(norm(v));

    let alpha_right = right(b, c);
    let beta_right = right(a, c);
    let gamma_right = right(a, b);

    if alpha_right && beta_right && gamma_right {
        if same(la, lb) && same(lb, lc) {
            return MetricClass::Cubic;
        }
        if same(la, lb) {
            return MetricClass::Tetragonal;
        }
        return MetricClass::Orthorhombic;
    }
    if alpha_right && beta_right && same(la, lb) && obtuse_120(a, b) {
        return MetricClass::Hexagonal;
    }
    if alpha_right && gamma_right {
        return MetricClass::Monoclinic;
    }
    MetricClass::Triclinic
}
