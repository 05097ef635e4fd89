//! Display-unit conversions for global-mean variables.

/// A linear conversion applied as `value * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub scale: f64,
    pub offset: f64,
    pub units: &'static str,
}

/// Returns the conventional display conversion for a global-mean variable,
/// or `None` if the variable is reported in its native units.
pub fn conversion_for(variable: &str) -> Option<Conversion> {
    let conversion = match variable {
        // Precipitation fluxes, kg m-2 s-1 to mm/day
        "pr" | "prsn" | "precip" | "evspsbl" => Conversion {
            scale: 86400.0,
            offset: 0.0,
            units: "mm/day",
        },
        // Temperatures, K to degC
        "tas" | "ts" | "tos" | "t_ref" | "t_surf" => Conversion {
            scale: 1.0,
            offset: -273.15,
            units: "degC",
        },
        // CO2 mole fraction to ppm
        "co2mass" | "xco2" | "co2" => Conversion {
            scale: 1.0e6,
            offset: 0.0,
            units: "ppm",
        },
        _ => return None,
    };

    Some(conversion)
}

impl Conversion {
    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

// -- Tests -------------------------------------------------------------------
