// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::f32::consts::FRAC_PI_4;
use std::fmt;
use std::str::FromStr;

/// Maps a master volume and a pan position onto left/right gains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanLaw {
    /// Gains fall linearly across the field; centre is -6 dB per side.
    Linear,
    /// Centre is unity on both sides; panning only attenuates the far side.
    #[default]
    CenterLinear,
    /// Sine/cosine law; centre is -3 dB per side.
    ConstantPower,
}

impl PanLaw {
    /// Returns (left, right) gains for `volume` at `pan` in [-1, 1] (-1 is hard left).
    pub fn gains(self, volume: f32, pan: f32) -> (f32, f32) {
        let pan = pan.clamp(-1.0, 1.0);
        let (left, right) = match self {
            PanLaw::Linear => ((1.0 - pan) / 2.0, (1.0 + pan) / 2.0),
            PanLaw::CenterLinear => ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0)),
            PanLaw::ConstantPower => {
                let angle = (pan + 1.0) * FRAC_PI_4;
                (angle.cos(), angle.sin())
            }
        };
        (left * volume, right * volume)
    }
}

impl FromStr for PanLaw {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(PanLaw::Linear),
            "center" | "center-linear" => Ok(PanLaw::CenterLinear),
            "power" | "constant-power" => Ok(PanLaw::ConstantPower),
            other => Err(format!("unknown pan law {}", other)),
        }
    }
}

impl fmt::Display for PanLaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PanLaw::Linear => "linear",
            PanLaw::CenterLinear => "center-linear",
            PanLaw::ConstantPower => "constant-power",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: (f32, f32), expected: (f32, f32)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-6 && (actual.1 - expected.1).abs() < 1e-6,
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn test_linear() {
        approx(PanLaw::Linear.gains(1.0, -1.0), (1.0, 0.0));
        approx(PanLaw::Linear.gains(1.0, 0.0), (0.5, 0.5));
        approx(PanLaw::Linear.gains(0.5, 1.0), (0.0, 0.5));
    }

    #[test]
    fn test_center_linear() {
        approx(PanLaw::CenterLinear.gains(1.0, 0.0), (1.0, 1.0));
        approx(PanLaw::CenterLinear.gains(1.0, 0.5), (0.5, 1.0));
        approx(PanLaw::CenterLinear.gains(0.8, -1.0), (0.8, 0.0));
    }

    #[test]
    fn test_constant_power_keeps_energy() {
        for pan in [-1.0, -0.3, 0.0, 0.6, 1.0] {
            let (l, r) = PanLaw::ConstantPower.gains(1.0, pan);
            assert!((l * l + r * r - 1.0).abs() < 1e-5, "pan {}", pan);
        }
        approx(PanLaw::ConstantPower.gains(1.0, -1.0), (1.0, 0.0));
    }

    #[test]
    fn test_out_of_range_pan_is_clamped() {
        approx(PanLaw::Linear.gains(1.0, 4.0), (0.0, 1.0));
    }

    #[test]
    fn test_parse() {
        assert_eq!("Linear".parse::<PanLaw>(), Ok(PanLaw::Linear));
        assert_eq!("power".parse::<PanLaw>(), Ok(PanLaw::ConstantPower));
        assert!("stereo".parse::<PanLaw>().is_err());
        assert_eq!(PanLaw::default().to_string(), "center-linear");
    }
}
