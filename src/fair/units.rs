//! Display-unit conversion for cell quantities reported in SI units.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field `{field}`; known fields: {known}")]
pub struct UnknownField {
    pub field: String,
    pub known: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    /// Fixed-point with the given number of decimals (`.3f`).
    Fixed(usize),
    /// Scientific with the given mantissa decimals and an exponent of at
    /// least two digits (`.3e`, e.g. `4.730e-03`).
    Scientific(usize),
}

impl NumberFormat {
    pub fn render(self, value: f64) -> String {
        match self {
            Self::Fixed(decimals) => format_fixed(value, decimals),
            Self::Scientific(decimals) => format_scientific(value, decimals),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDescriptor {
    pub source_unit: &'static str,
    pub display_unit: &'static str,
    pub symbol: &'static str,
    pub format: NumberFormat,
    /// Multiplier taking a source-unit value to the display unit.
    pub factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellField {
    A,
    B,
    C,
    Alpha,
    Beta,
    Gamma,
    Volume,
    AtomicDensity,
    MassDensity,
}

const METER_TO_ANGSTROM: f64 = 1e10;
const CUBIC_METER_TO_CUBIC_ANGSTROM: f64 = 1e30;

impl CellField {
    pub const ALL: [CellField; 9] = [
        Self::A,
        Self::B,
        Self::C,
        Self::Alpha,
        Self::Beta,
        Self::Gamma,
        Self::Volume,
        Self::AtomicDensity,
        Self::MassDensity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
            Self::C => "c",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Gamma => "gamma",
            Self::Volume => "volume",
            Self::AtomicDensity => "atomic_density",
            Self::MassDensity => "mass_density",
        }
    }

    pub fn descriptor(self) -> UnitDescriptor {
        match self {
            Self::A | Self::B | Self::C => UnitDescriptor {
                source_unit: "m",
                display_unit: "angstrom",
                symbol: "Å",
                format: NumberFormat::Fixed(3),
                factor: METER_TO_ANGSTROM,
            },
            Self::Alpha | Self::Beta | Self::Gamma => UnitDescriptor {
                source_unit: "radian",
                display_unit: "degree",
                symbol: "°",
                format: NumberFormat::Fixed(0),
                factor: 180.0 / std::f64::consts::PI,
            },
            Self::Volume => UnitDescriptor {
                source_unit: "m^3",
                display_unit: "angstrom^3",
                symbol: "Å^3",
                format: NumberFormat::Fixed(3),
                factor: CUBIC_METER_TO_CUBIC_ANGSTROM,
            },
            Self::AtomicDensity => UnitDescriptor {
                source_unit: "1/m^3",
                display_unit: "1/angstrom^3",
                symbol: "Å^-3",
                format: NumberFormat::Fixed(3),
                factor: 1.0 / CUBIC_METER_TO_CUBIC_ANGSTROM,
            },
            Self::MassDensity => UnitDescriptor {
                source_unit: "kg/m^3",
                display_unit: "kg/angstrom^3",
                symbol: "kg/Å^3",
                format: NumberFormat::Scientific(3),
                factor: 1.0 / CUBIC_METER_TO_CUBIC_ANGSTROM,
            },
        }
    }

    /// Inverse of the display conversion, back to the SI source unit.
    pub fn to_source(self, display_value: f64) -> f64 {
        display_value / self.descriptor().factor
    }
}

impl fmt::Display for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_unit, self.display_unit)
    }
}

impl fmt::Display for CellField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CellField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| UnknownField {
                field: s.to_string(),
                known: known_field_names(),
            })
    }
}

fn known_field_names() -> String {
    let mut names: Vec<&str> = CellField::ALL.iter().map(|f| f.name()).collect();
    names.sort_unstable();
    names.join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Converted {
    pub value: f64,
    pub display: String,
}

impl Converted {
    /// The number alone, formatted per the field's display contract.
    pub fn number(&self) -> &str {
        self.display
            .split_once(' ')
            .map(|(num, _)| num)
            .unwrap_or(&self.display)
    }
}

/// Read a raw SI scalar. A length-1 array is unwrapped one level only; `null`,
/// the `"unavailable"` sentinel and anything non-numeric yield `None`.
pub fn raw_scalar(value: &Value) -> Option<f64> {
    match value {
        Value::Array(items) if items.len() == 1 => scalar_leaf(&items[0]),
        other => scalar_leaf(other),
    }
}

fn scalar_leaf(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s == UNAVAILABLE => None,
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn convert(value: &Value, field: CellField) -> Option<Converted> {
    let raw = raw_scalar(value)?;
    let spec = field.descriptor();
    let num = raw * spec.factor;
    Some(Converted {
        value: num,
        display: format!("{} {}", spec.format.render(num), spec.symbol),
    })
}

fn format_fixed(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    format!("{value:.decimals$}")
}

fn format_scientific(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return format_fixed(value, decimals);
    }
    let rendered = format!("{value:.decimals$e}");
    let Some((mantissa, exponent)) = rendered.split_once('e') else {
        return rendered;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lengths_convert_meters_to_angstrom() {
        let got = convert(&json!(5.0e-10), CellField::A).expect("value");
        assert!((got.value - 5.0).abs() < 1e-12);
        assert_eq!(got.display, "5.000 Å");
        assert_eq!(got.number(), "5.000");
    }

    #[test]
    fn single_element_lists_are_unwrapped() {
        let scalar = convert(&json!(5.0e-10), CellField::A);
        let wrapped = convert(&json!([5.0e-10]), CellField::A);
        assert_eq!(scalar, wrapped);
    }

    #[test]
    fn angles_render_without_decimals() {
        let got = convert(&json!(1.0471975512), CellField::Alpha).expect("value");
        assert_eq!(got.display, "60 °");
        let right = convert(&json!(std::f64::consts::FRAC_PI_2), CellField::Gamma).expect("value");
        assert_eq!(right.display, "90 °");
    }

    #[test]
    fn volume_and_densities_use_cubic_relations() {
        let vol = convert(&json!(276.268e-30), CellField::Volume).expect("value");
        assert_eq!(vol.display, "276.268 Å^3");

        let atomic = convert(&json!(0.036e30), CellField::AtomicDensity).expect("value");
        assert_eq!(atomic.display, "0.036 Å^-3");

        let mass = convert(&json!(4730.0), CellField::MassDensity).expect("value");
        assert_eq!(mass.display, "4.730e-27 kg/Å^3");
    }

    #[test]
    fn scientific_format_matches_python_exponents() {
        assert_eq!(format_scientific(0.00473, 3), "4.730e-03");
        assert_eq!(format_scientific(12346.0, 3), "1.235e+04");
        assert_eq!(format_scientific(1.0, 3), "1.000e+00");
        assert_eq!(format_scientific(-2.5e-120, 2), "-2.50e-120");
    }

    #[test]
    fn sentinels_and_garbage_have_no_value() {
        assert_eq!(convert(&json!("unavailable"), CellField::B), None);
        assert_eq!(convert(&Value::Null, CellField::B), None);
        assert_eq!(convert(&json!({"x": 1}), CellField::B), None);
        assert_eq!(convert(&json!([1.0, 2.0]), CellField::B), None);
        assert_eq!(convert(&json!([]), CellField::B), None);
        assert_eq!(convert(&json!([[5.0e-10]]), CellField::B), None);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let got = convert(&json!("3.5e-10"), CellField::C).expect("value");
        assert_eq!(got.display, "3.500 Å");
    }

    #[test]
    fn unknown_field_is_an_error() {
        let err = "density".parse::<CellField>().expect_err("unknown");
        assert_eq!(err.field, "density");
        assert!(err.known.contains("mass_density"));
        let volume = "volume".parse::<CellField>().expect("known");
        assert!(convert(&json!(1.0), volume).is_some());
    }

    #[test]
    fn displayed_values_round_trip_to_si_within_precision() {
        let cases = [
            (CellField::A, 7.311e-10, 1e-3),
            (CellField::Volume, 1105.074e-30, 1e-3),
            (CellField::AtomicDensity, 0.036e30, 1e-3),
            (CellField::Alpha, 1.0471975512, 1.0),
        ];
        for (field, si, precision) in cases {
            let got = convert(&json!(si), field).expect("value");
            let shown: f64 = got.number().parse().expect("numeric display");
            let back = field.to_source(shown);
            let tolerance = field.to_source(precision).abs();
            assert!(
                (back - si).abs() <= tolerance,
                "{field}: {back} vs {si} (tolerance {tolerance})"
            );
        }
    }

    #[test]
    fn every_field_name_parses_back() {
        for field in CellField::ALL {
            assert_eq!(field.name().parse::<CellField>(), Ok(field));
        }
    }
}
