//! Small value types shared across the composition graph

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A rational rate such as an edit rate of `24 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    /// Creates a new fraction
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Returns this fraction with the numerator multiplied by `factor`
    pub fn scaled(&self, factor: u32) -> Self {
        Self::new(self.numerator * factor, self.denominator)
    }

    /// True when `self` is exactly twice `other` (cross-multiplied, no rounding)
    pub fn is_double_of(&self, other: &Fraction) -> bool {
        u64::from(self.numerator) * u64::from(other.denominator)
            == 2 * u64::from(other.numerator) * u64::from(self.denominator)
    }

    /// Returns the rate as a float
    pub fn as_f64(&self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }
}

/// Formats as the space-separated pair used by CPL `EditRate`/`FrameRate`
impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.numerator, self.denominator)
    }
}

impl FromStr for Fraction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let parse = |part: Option<&str>| -> Result<u32> {
            part.and_then(|p| p.parse().ok())
                .ok_or_else(|| Error::Xml(format!("malformed fraction '{s}'")))
        };
        let numerator = parse(parts.next())?;
        let denominator = parse(parts.next())?;
        if parts.next().is_some() {
            return Err(Error::Xml(format!("malformed fraction '{s}'")));
        }
        Ok(Self::new(numerator, denominator))
    }
}

/// Picture dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Aspect ratio written to `ScreenAspectRatio`, e.g. `1998 1080`
    pub fn aspect_ratio(&self) -> Fraction {
        Fraction::new(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_parse_and_display() {
        let f: Fraction = "24 1".parse().unwrap();
        assert_eq!(f, Fraction::new(24, 1));
        assert_eq!(f.to_string(), "24 1");
        assert!("24".parse::<Fraction>().is_err());
        assert!("24 1 1".parse::<Fraction>().is_err());
        assert!("a b".parse::<Fraction>().is_err());
    }

    #[test]
    fn test_is_double_of() {
        let edit = Fraction::new(24, 1);
        assert!(Fraction::new(48, 1).is_double_of(&edit));
        assert!(Fraction::new(96, 2).is_double_of(&edit));
        assert!(!Fraction::new(24, 1).is_double_of(&edit));
        assert!(!Fraction::new(72, 1).is_double_of(&edit));
    }
}
