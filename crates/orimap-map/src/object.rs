//! Drawn map objects
//!
//! An object is a single drawn feature: a point marker, a path (line or
//! area outline) or a text. Objects reference their symbol by a table
//! handle; the reference is non-owning and may be absent for objects whose
//! symbol could not be resolved during import.

use crate::map::SymbolRef;
use crate::MapCoord;

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HorizontalAlignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VerticalAlignment {
    #[default]
    Baseline,
    Top,
    Center,
    Bottom,
}

/// Variant payload of an object
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectKind {
    /// A single point marker at `anchor`
    Point { anchor: MapCoord },
    /// A path; `closed` distinguishes area outlines from open lines
    Path {
        coords: Vec<MapCoord>,
        closed: bool,
    },
    /// A text anchored at the first coordinate; a second coordinate, when
    /// present, spans a layout box
    Text {
        coords: Vec<MapCoord>,
        text: String,
        halign: HorizontalAlignment,
        valign: VerticalAlignment,
    },
}

/// A drawn map feature
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Object {
    /// Symbol table handle; `None` when the symbol is unresolved or was
    /// deleted. Shared with the map's symbol table, never owning.
    pub symbol: Option<SymbolRef>,
    /// Rotation in radians, counterclockwise, in [0, 2*pi)
    pub rotation: f64,
    pub kind: ObjectKind,
}

impl Object {
    pub fn new(symbol: Option<SymbolRef>, kind: ObjectKind) -> Self {
        Self {
            symbol,
            rotation: 0.0,
            kind,
        }
    }

    /// Create an (open) path object without coordinates; the importer
    /// fills them in from raw point records
    pub fn new_path(symbol: Option<SymbolRef>) -> Self {
        Self::new(
            symbol,
            ObjectKind::Path {
                coords: Vec::new(),
                closed: false,
            },
        )
    }

    /// All coordinates of the object
    pub fn coords(&self) -> &[MapCoord] {
        match &self.kind {
            ObjectKind::Point { anchor } => std::slice::from_ref(anchor),
            ObjectKind::Path { coords, .. } => coords,
            ObjectKind::Text { coords, .. } => coords,
        }
    }

    /// Number of coordinates
    #[inline]
    pub fn num_coords(&self) -> usize {
        self.coords().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_object_coords() {
        let object = Object::new(
            Some(3),
            ObjectKind::Point {
                anchor: MapCoord::from_raw(100, 200),
            },
        );
        assert_eq!(object.num_coords(), 1);
        assert_eq!(object.coords()[0].x, 100);
    }

    #[test]
    fn test_new_path_is_empty_and_open() {
        let object = Object::new_path(None);
        assert_eq!(object.num_coords(), 0);
        match &object.kind {
            ObjectKind::Path { closed, .. } => assert!(!closed),
            _ => panic!("expected path"),
        }
        assert!(object.symbol.is_none());
    }
}
