use std::collections::HashMap;

/// Linear unit conversions keyed by unit string.
///
/// Each unit is stored as a factor relative to a base unit; two units convert
/// into each other only when they share the base.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRegistry {
    units: HashMap<String, UnitDef>,
}

#[derive(Debug, Clone, PartialEq)]
struct UnitDef {
    base: String,
    factor: f64,
}

const SI_PREFIXES: [(&str, f64); 8] = [
    ("", 1.0),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
    ("m", 1e-3),
];

const SPECIES: [&str; 12] = [
    "CO2", "CH4", "N2O", "CO", "NOx", "SO2", "BC", "OC", "NH3", "VOC", "C", "CO2-equiv",
];

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::iamc()
    }
}

impl UnitRegistry {
    pub fn empty() -> Self {
        UnitRegistry {
            units: HashMap::new(),
        }
    }

    /// Units commonly found in IAMC reporting templates: energy and power,
    /// emissions per species, counts and currency.
    pub fn iamc() -> Self {
        let mut reg = Self::empty();
        for (prefix, factor) in SI_PREFIXES {
            reg.register(format!("{prefix}J/yr"), "J/yr", factor);
            reg.register(format!("{prefix}Wh/yr"), "J/yr", factor * 3600.0);
            reg.register(format!("{prefix}W"), "W", factor);
            reg.register(format!("{prefix}t/yr"), "t/yr", factor);
        }
        for species in SPECIES {
            let base = format!("t {species}/yr");
            for (prefix, factor) in [("", 1.0), ("k", 1e3), ("M", 1e6), ("G", 1e9)] {
                reg.register(format!("{prefix}t {species}/yr"), &base, factor);
            }
        }
        for (name, factor) in [("thousand", 1e3), ("million", 1e6), ("billion", 1e9)] {
            reg.register(name, "1", factor);
        }
        reg.register("1", "1", 1.0);
        reg.register("%", "1", 0.01);
        for (name, factor) in [("million", 1e6), ("billion", 1e9)] {
            for year in [2005, 2010, 2015, 2020] {
                let base = format!("US${year}/yr");
                reg.register(format!("{name} US${year}/yr"), &base, factor);
                reg.register(base.clone(), &base, 1.0);
            }
        }
        reg
    }

    /// Add or replace a unit as `factor` times `base`.
    pub fn register(&mut self, unit: impl AsRef<str>, base: &str, factor: f64) -> &mut Self {
        self.units.insert(
            normalize_unit(unit.as_ref()),
            UnitDef {
                base: normalize_unit(base),
                factor,
            },
        );
        self
    }

    /// Multiplier turning a value in `from` into a value in `to`. Identical
    /// unit strings always convert with factor 1.
    pub fn conversion_factor(&self, from: &str, to: &str) -> Option<f64> {
        let (from, to) = (normalize_unit(from), normalize_unit(to));
        if from == to {
            return Some(1.0);
        }
        let a = self.units.get(&from)?;
        let b = self.units.get(&to)?;
        (a.base == b.base).then(|| a.factor / b.factor)
    }
}

/// Collapse runs of whitespace so "Mt  CO2/yr" and "Mt CO2/yr" match.
pub(crate) fn normalize_unit(unit: &str) -> String {
    unit.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// How the unit dimension is treated during alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPolicy {
    /// Dimension holding unit labels. `None` treats units as ordinary labels.
    pub dim: Option<String>,
    /// Convert model values into the reference unit instead of failing.
    pub convert: bool,
    pub registry: UnitRegistry,
}

impl Default for UnitPolicy {
    fn default() -> Self {
        UnitPolicy {
            dim: Some("unit".to_string()),
            convert: false,
            registry: UnitRegistry::iamc(),
        }
    }
}

impl UnitPolicy {
    pub fn converting() -> Self {
        UnitPolicy {
            convert: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs())
    }

    #[test]
    fn energy_prefixes_convert() {
        let reg = UnitRegistry::iamc();
        assert!(approx(reg.conversion_factor("EJ/yr", "PJ/yr").unwrap(), 1e3));
        assert!(approx(reg.conversion_factor("TWh/yr", "PJ/yr").unwrap(), 3.6));
    }

    #[test]
    fn emissions_convert_within_species_only() {
        let reg = UnitRegistry::iamc();
        assert!(approx(
            reg.conversion_factor("Gt CO2/yr", "Mt CO2/yr").unwrap(),
            1e3
        ));
        assert_eq!(reg.conversion_factor("Mt CO2/yr", "Mt CH4/yr"), None);
    }

    #[test]
    fn identical_units_need_no_registry_entry() {
        let reg = UnitRegistry::empty();
        assert_eq!(reg.conversion_factor("widgets", "widgets"), Some(1.0));
        assert_eq!(reg.conversion_factor("widgets", "gadgets"), None);
    }

    #[test]
    fn whitespace_is_normalized() {
        let reg = UnitRegistry::iamc();
        assert_eq!(reg.conversion_factor("Mt  CO2/yr", "Mt CO2/yr"), Some(1.0));
    }

    #[test]
    fn custom_units_can_be_registered() {
        let mut reg = UnitRegistry::empty();
        reg.register("Mha", "ha", 1e6).register("ha", "ha", 1.0);
        assert_eq!(reg.conversion_factor("Mha", "ha"), Some(1e6));
    }
}
