//! Map colors
//!
//! Orienteering maps are printed with a small ordered table of spot colors.
//! Each color carries CMYK components for screen display and process
//! printing, plus overprint/knockout behavior.

/// CMYK components, each in 0.0 ..= 1.0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorCmyk {
    pub c: f32,
    pub m: f32,
    pub y: f32,
    pub k: f32,
}

impl ColorCmyk {
    pub fn new(c: f32, m: f32, y: f32, k: f32) -> Self {
        Self { c, m, y, k }
    }
}

/// A printable map color
///
/// Colors are owned by the map in priority order (lower index prints on
/// top). During a legacy file import they are addressed by a per-file
/// numeric id; after import only table indices remain.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapColor {
    pub name: String,
    pub cmyk: ColorCmyk,
    /// Spot color name, empty for pure process colors
    pub spot_color_name: String,
    /// Halftone screen frequency in lines per inch, 0 if unset
    pub screen_frequency: f32,
    /// Print on top of lower colors instead of knocking them out
    pub overprint: bool,
    pub knockout: bool,
    pub opacity: f32,
}

impl MapColor {
    pub fn new(name: impl Into<String>, cmyk: ColorCmyk) -> Self {
        Self {
            name: name.into(),
            cmyk,
            spot_color_name: String::new(),
            screen_frequency: 0.0,
            overprint: false,
            knockout: true,
            opacity: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_color_defaults() {
        let color = MapColor::new("Black", ColorCmyk::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(color.name, "Black");
        assert_eq!(color.cmyk.k, 1.0);
        assert!(!color.overprint);
        assert!(color.knockout);
        assert_eq!(color.opacity, 1.0);
    }
}
