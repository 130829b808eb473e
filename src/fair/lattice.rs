//! Minimal 3×3 lattice algebra. Rows of the matrix are the lattice vectors,
//! so `cartesian = fractional · matrix`.

pub type Vec3 = [f64; 3];
pub type Mat3 = [[f64; 3]; 3];

pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

pub fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn det(m: &Mat3) -> f64 {
    dot(m[0], cross(m[1], m[2]))
}

/// Row vector times matrix.
pub fn vec_mat(v: Vec3, m: &Mat3) -> Vec3 {
    let mut out = [0.0; 3];
    for (i, row) in m.iter().enumerate() {
        out = add(out, scale(*row, v[i]));
    }
    out
}

pub fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    [vec_mat(a[0], b), vec_mat(a[1], b), vec_mat(a[2], b)]
}

pub fn inverse(m: &Mat3) -> Option<Mat3> {
    let d = det(m);
    if d.abs() < 1e-12 {
        return None;
    }
    // Columns of the inverse are the reciprocal vectors.
    let c0 = scale(cross(m[1], m[2]), 1.0 / d);
    let c1 = scale(cross(m[2], m[0]), 1.0 / d);
    let c2 = scale(cross(m[0], m[1]), 1.0 / d);
    Some([
        [c0[0], c1[0], c2[0]],
        [c0[1], c1[1], c2[1]],
        [c0[2], c1[2], c2[2]],
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    matrix: Mat3,
    inverse: Mat3,
}

impl Lattice {
    /// `None` when the vectors are (numerically) coplanar.
    pub fn new(matrix: Mat3) -> Option<Self> {
        let inverse = inverse(&matrix)?;
        Some(Self { matrix, inverse })
    }

    pub fn matrix(&self) -> &Mat3 {
        &self.matrix
    }

    pub fn volume(&self) -> f64 {
        det(&self.matrix).abs()
    }

    pub fn abc(&self) -> Vec3 {
        [
            norm(self.matrix[0]),
            norm(self.matrix[1]),
            norm(self.matrix[2]),
        ]
    }

    /// (alpha, beta, gamma) in degrees.
    pub fn angles(&self) -> Vec3 {
        let [a, b, c] = self.matrix;
        [angle_deg(b, c), angle_deg(a, c), angle_deg(a, b)]
    }

    pub fn to_fractional(&self, cartesian: Vec3) -> Vec3 {
        vec_mat(cartesian, &self.inverse)
    }

    pub fn to_cartesian(&self, fractional: Vec3) -> Vec3 {
        vec_mat(fractional, &self.matrix)
    }
}

fn angle_deg(u: Vec3, v: Vec3) -> f64 {
    let cos = (dot(u, v) / (norm(u) * norm(v))).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Wrap a fractional coordinate into [0, 1).
pub fn wrap_unit(x: f64) -> f64 {
    let w = x - x.floor();
    if w >= 1.0 { 0.0 } else { w }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_and_cartesian_are_inverse() {
        let lattice = Lattice::new([[3.0, 0.0, 0.0], [1.0, 2.0, 0.0], [0.5, 0.5, 4.0]]).expect("lattice");
        let frac = [0.25, 0.5, 0.75];
        let cart = lattice.to_cartesian(frac);
        let back = lattice.to_fractional(cart);
        for i in 0..3 {
            assert!((back[i] - frac[i]).abs() < 1e-12);
        }
        assert!((lattice.volume() - 24.0).abs() < 1e-12);
    }

    #[test]
    fn cubic_cell_has_right_angles() {
        let lattice = Lattice::new([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]]).expect("lattice");
        assert_eq!(lattice.abc(), [2.0, 2.0, 2.0]);
        for angle in lattice.angles() {
            assert!((angle - 90.0).abs() < 1e-9);
        }
    }

    #[test]
    fn coplanar_vectors_have_no_lattice() {
        assert!(Lattice::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]]).is_none());
    }

    #[test]
    fn wrap_unit_stays_in_range() {
        assert_eq!(wrap_unit(1.25), 0.25);
        assert_eq!(wrap_unit(-0.25), 0.75);
        assert_eq!(wrap_unit(-1e-18), 0.0);
    }
}
