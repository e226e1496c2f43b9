//! Map symbols
//!
//! A symbol describes how objects referencing it are drawn. The original
//! editor modeled this as a class hierarchy; here it is a shared base
//! struct with a tagged variant payload, dispatched by matching.
//!
//! Combined symbols hold up to five part slots referencing other symbols in
//! the map's symbol table. These are back-references, not ownership: the
//! referenced symbols live in (and are shared with) the master symbol list.

use crate::map::{ColorRef, SymbolRef};
use crate::object::{HorizontalAlignment, VerticalAlignment};
use crate::MapCoord;

use smallvec::SmallVec;

/// Bitmask of symbol kinds, used to report which kinds a (possibly
/// combined) symbol draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymbolTypeFlags(pub u8);

impl SymbolTypeFlags {
    pub const POINT: u8 = 1 << 0;
    pub const LINE: u8 = 1 << 1;
    pub const AREA: u8 = 1 << 2;
    pub const TEXT: u8 = 1 << 3;
    pub const COMBINED: u8 = 1 << 4;

    #[inline]
    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    #[inline]
    pub fn insert(&mut self, other: SymbolTypeFlags) {
        self.0 |= other.0;
    }
}

/// Line cap style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineCap {
    #[default]
    Flat,
    Round,
    Square,
    Pointed,
}

/// Line join style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Kind of a point-symbol stipple element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PointElementKind {
    Line,
    Area,
    Circle,
    Dot,
}

/// One element of a point symbol's stipple pattern
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointElement {
    pub kind: PointElementKind,
    pub color: Option<ColorRef>,
    /// Line width in 1/1000 mm (line and circle elements)
    pub line_width: i64,
    /// Diameter in 1/1000 mm (circle and dot elements)
    pub diameter: i64,
    pub coords: Vec<MapCoord>,
}

/// A hatch fill pattern of an area symbol
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HatchPattern {
    pub color: Option<ColorRef>,
    /// Hatch rotation in radians, always in [0, 2*pi)
    pub angle: f64,
    /// Hatch line width in 1/1000 mm
    pub line_width: i64,
    /// Distance between hatch lines in 1/1000 mm
    pub spacing: i64,
}

/// Dash scheme of a line symbol, lengths in 1/1000 mm
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DashScheme {
    pub dashed: bool,
    pub main_length: i64,
    pub end_length: i64,
    pub main_gap: i64,
    pub secondary_gap: i64,
}

/// Variant payload of a symbol
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SymbolKind {
    Point {
        inner_color: Option<ColorRef>,
        /// Radius of the base dot in 1/1000 mm, 0 for none
        inner_radius: i64,
        elements: Vec<PointElement>,
    },
    Line {
        color: Option<ColorRef>,
        /// Line width in 1/1000 mm
        line_width: i64,
        cap: LineCap,
        join: LineJoin,
        dash: DashScheme,
    },
    Area {
        fill_color: Option<ColorRef>,
        hatch: Vec<HatchPattern>,
    },
    Text {
        color: Option<ColorRef>,
        font_family: String,
        /// Font size in 1/1000 mm
        font_size: i64,
        bold: bool,
        italic: bool,
        underline: bool,
        /// Baseline distance as a factor of the font size
        line_spacing: f64,
        /// Additional space between characters in 1/1000 mm
        char_spacing: i64,
        halign: HorizontalAlignment,
        valign: VerticalAlignment,
    },
    Combined {
        /// Part slots referencing other symbols in the map's symbol table.
        /// An empty slot draws nothing.
        parts: SmallVec<[Option<SymbolRef>; 5]>,
    },
}

impl SymbolKind {
    /// Type flag for this variant alone, ignoring combined parts
    pub fn type_flag(&self) -> SymbolTypeFlags {
        SymbolTypeFlags(match self {
            SymbolKind::Point { .. } => SymbolTypeFlags::POINT,
            SymbolKind::Line { .. } => SymbolTypeFlags::LINE,
            SymbolKind::Area { .. } => SymbolTypeFlags::AREA,
            SymbolKind::Text { .. } => SymbolTypeFlags::TEXT,
            SymbolKind::Combined { .. } => SymbolTypeFlags::COMBINED,
        })
    }
}

/// A cached rendering of a symbol for list views
///
/// Computing the icon requires the renderer, which lives outside this
/// crate; the map model only stores and invalidates it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymbolIcon {
    pub size: u32,
    pub rgba: Vec<u8>,
}

/// A map symbol: shared base attributes plus a variant payload
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symbol {
    pub name: String,
    /// Numeric id from the source file. Only meaningful for diagnostics;
    /// ids are not stable across sessions.
    pub source_number: i32,
    pub description: String,
    pub is_helper: bool,
    pub is_hidden: bool,
    pub is_protected: bool,
    icon: Option<SymbolIcon>,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            source_number: -1,
            description: String::new(),
            is_helper: false,
            is_hidden: false,
            is_protected: false,
            icon: None,
            kind,
        }
    }

    /// Create a combined symbol with `num_parts` empty slots (2 ..= 5)
    pub fn new_combined(name: impl Into<String>, num_parts: usize) -> Self {
        let num_parts = num_parts.clamp(2, 5);
        let mut parts = SmallVec::new();
        parts.resize(num_parts, None);
        Self::new(name, SymbolKind::Combined { parts })
    }

    #[inline]
    pub fn icon(&self) -> Option<&SymbolIcon> {
        self.icon.as_ref()
    }

    /// Store a freshly rendered icon
    pub fn set_icon(&mut self, icon: SymbolIcon) {
        self.icon = Some(icon);
    }

    /// Drop the cached icon; called on any structural change
    pub fn reset_icon(&mut self) {
        self.icon = None;
    }

    /// Number of part slots, 0 for non-combined symbols
    pub fn num_parts(&self) -> usize {
        match &self.kind {
            SymbolKind::Combined { parts } => parts.len(),
            _ => 0,
        }
    }

    /// Part slot `i`, flattened: `None` for empty slots and non-combined symbols
    pub fn part(&self, i: usize) -> Option<SymbolRef> {
        match &self.kind {
            SymbolKind::Combined { parts } => parts.get(i).copied().flatten(),
            _ => None,
        }
    }

    /// Set part slot `i` of a combined symbol. Invalidates the icon.
    ///
    /// Does nothing on non-combined symbols or out-of-range slots.
    pub fn set_part(&mut self, i: usize, part: Option<SymbolRef>) {
        if let SymbolKind::Combined { parts } = &mut self.kind {
            if let Some(slot) = parts.get_mut(i) {
                *slot = part;
                self.icon = None;
            }
        }
    }

    /// Replace every part slot holding `old` with `new`. Returns whether
    /// any slot matched. The icon is always invalidated since part
    /// contents may have changed.
    pub fn replace_part_symbol(&mut self, old: SymbolRef, new: Option<SymbolRef>) -> bool {
        let mut had_symbol = false;
        if let SymbolKind::Combined { parts } = &mut self.kind {
            for slot in parts.iter_mut() {
                if *slot == Some(old) {
                    had_symbol = true;
                    *slot = new;
                }
            }
        }
        self.icon = None;
        had_symbol
    }

    /// Whether this symbol directly uses the given color, ignoring
    /// combined parts (the map resolves those with cycle protection)
    pub fn uses_color_directly(&self, color: ColorRef) -> bool {
        let some = Some(color);
        match &self.kind {
            SymbolKind::Point {
                inner_color,
                elements,
                ..
            } => *inner_color == some || elements.iter().any(|e| e.color == some),
            SymbolKind::Line { color: c, .. } => *c == some,
            SymbolKind::Area { fill_color, hatch } => {
                *fill_color == some || hatch.iter().any(|h| h.color == some)
            }
            SymbolKind::Text { color: c, .. } => *c == some,
            SymbolKind::Combined { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_combined_clamps_part_count() {
        assert_eq!(Symbol::new_combined("c", 0).num_parts(), 2);
        assert_eq!(Symbol::new_combined("c", 3).num_parts(), 3);
        assert_eq!(Symbol::new_combined("c", 9).num_parts(), 5);
    }

    #[test]
    fn test_set_part_resets_icon() {
        let mut symbol = Symbol::new_combined("c", 2);
        symbol.set_icon(SymbolIcon {
            size: 4,
            rgba: vec![0; 64],
        });
        assert!(symbol.icon().is_some());
        symbol.set_part(0, Some(7));
        assert!(symbol.icon().is_none());
        assert_eq!(symbol.part(0), Some(7));
        assert_eq!(symbol.part(1), None);
    }

    #[test]
    fn test_set_part_ignores_non_combined() {
        let mut symbol = Symbol::new(
            "line",
            SymbolKind::Line {
                color: None,
                line_width: 100,
                cap: LineCap::Flat,
                join: LineJoin::Miter,
                dash: DashScheme::default(),
            },
        );
        symbol.set_part(0, Some(1));
        assert_eq!(symbol.part(0), None);
    }

    #[test]
    fn test_replace_part_symbol() {
        let mut symbol = Symbol::new_combined("c", 3);
        symbol.set_part(0, Some(1));
        symbol.set_part(2, Some(1));
        assert!(symbol.replace_part_symbol(1, Some(4)));
        assert_eq!(symbol.part(0), Some(4));
        assert_eq!(symbol.part(2), Some(4));
        assert!(!symbol.replace_part_symbol(1, None));
    }

    #[test]
    fn test_uses_color_directly() {
        let symbol = Symbol::new(
            "area",
            SymbolKind::Area {
                fill_color: Some(2),
                hatch: vec![HatchPattern {
                    color: Some(5),
                    angle: 0.0,
                    line_width: 100,
                    spacing: 500,
                }],
            },
        );
        assert!(symbol.uses_color_directly(2));
        assert!(symbol.uses_color_directly(5));
        assert!(!symbol.uses_color_directly(3));
    }

    #[test]
    fn test_type_flags() {
        let combined = Symbol::new_combined("c", 2);
        assert!(combined
            .kind
            .type_flag()
            .contains(SymbolTypeFlags::COMBINED));
        let mut flags = SymbolTypeFlags::default();
        flags.insert(SymbolTypeFlags(SymbolTypeFlags::LINE));
        flags.insert(SymbolTypeFlags(SymbolTypeFlags::AREA));
        assert!(flags.contains(SymbolTypeFlags::LINE));
        assert!(!flags.contains(SymbolTypeFlags::TEXT));
    }
}
