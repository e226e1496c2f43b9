//! Map - Top-level owner of colors, symbols, parts and georeferencing
//!
//! The map owns all entity tables. Entities reference each other through
//! plain table handles (`ColorRef`, `SymbolRef`), so cross-entity queries
//! that have to follow combined-symbol parts live here, where the tables
//! are in reach. Those queries carry a visited set: a corrupt or hostile
//! import can produce a combined symbol containing itself, and traversal
//! must terminate anyway.

use crate::color::MapColor;
use crate::coord::MapCoord;
use crate::georef::Georeferencing;
use crate::object::Object;
use crate::symbol::{Symbol, SymbolKind, SymbolTypeFlags};
use crate::{MapError, Result};

use std::collections::HashSet;

/// Handle into the map's color table
pub type ColorRef = usize;
/// Handle into the map's symbol table
pub type SymbolRef = usize;
/// Handle into the map's part list
pub type PartRef = usize;

/// One drawing layer of the map
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapPart {
    pub name: String,
    pub objects: Vec<Object>,
}

impl MapPart {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
        }
    }
}

/// A background template image or map, positioned on the map plane
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Template {
    pub path: String,
    pub offset: MapCoord,
    /// Scale factor from template units to map millimeters
    pub scale: f64,
    /// Rotation in radians, counterclockwise
    pub rotation: f64,
}

/// Presentation state restored from a map file: zoom and view center
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapView {
    pub zoom: f64,
    pub center: MapCoord,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            center: MapCoord::default(),
        }
    }
}

/// The in-memory orienteering map
#[derive(Debug, Default)]
pub struct Map {
    colors: Vec<MapColor>,
    symbols: Vec<Symbol>,
    parts: Vec<MapPart>,
    templates: Vec<Template>,
    georeferencing: Georeferencing,
    view: Option<MapView>,
}

impl Map {
    /// Create an empty map with one default part
    pub fn new() -> Self {
        Self {
            colors: Vec::new(),
            symbols: Vec::new(),
            parts: vec![MapPart::new("default part")],
            templates: Vec::new(),
            georeferencing: Georeferencing::new(),
            view: None,
        }
    }

    // === Mutation API (consumed by importers) ===

    /// Append a color to the table, returning its handle
    pub fn add_color(&mut self, color: MapColor) -> ColorRef {
        self.colors.push(color);
        self.colors.len() - 1
    }

    /// Append a symbol to the table, returning its handle
    pub fn add_symbol(&mut self, symbol: Symbol) -> SymbolRef {
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }

    /// Append an object to the given part
    pub fn add_object(&mut self, part: PartRef, object: Object) -> Result<()> {
        let part = self
            .parts
            .get_mut(part)
            .ok_or(MapError::InvalidPart(part))?;
        part.objects.push(object);
        Ok(())
    }

    pub fn set_georeferencing(&mut self, georeferencing: Georeferencing) {
        self.georeferencing = georeferencing;
    }

    pub fn add_template(&mut self, template: Template) {
        self.templates.push(template);
    }

    pub fn set_view(&mut self, view: MapView) {
        self.view = Some(view);
    }

    // === Accessors ===

    #[inline]
    pub fn colors(&self) -> &[MapColor] {
        &self.colors
    }

    #[inline]
    pub fn color(&self, r: ColorRef) -> Option<&MapColor> {
        self.colors.get(r)
    }

    #[inline]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    #[inline]
    pub fn symbol(&self, r: SymbolRef) -> Option<&Symbol> {
        self.symbols.get(r)
    }

    #[inline]
    pub fn symbol_mut(&mut self, r: SymbolRef) -> Option<&mut Symbol> {
        self.symbols.get_mut(r)
    }

    #[inline]
    pub fn parts(&self) -> &[MapPart] {
        &self.parts
    }

    #[inline]
    pub fn part(&self, r: PartRef) -> Option<&MapPart> {
        self.parts.get(r)
    }

    /// Total object count over all parts
    pub fn num_objects(&self) -> usize {
        self.parts.iter().map(|p| p.objects.len()).sum()
    }

    #[inline]
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    #[inline]
    pub fn georeferencing(&self) -> &Georeferencing {
        &self.georeferencing
    }

    #[inline]
    pub fn georeferencing_mut(&mut self) -> &mut Georeferencing {
        &mut self.georeferencing
    }

    #[inline]
    pub fn view(&self) -> Option<&MapView> {
        self.view.as_ref()
    }

    // === Combined-symbol queries (cycle safe) ===

    /// Whether `symbol` draws with `target`, either directly or through
    /// combined parts. A symbol contains itself.
    pub fn symbol_contains_symbol(&self, symbol: SymbolRef, target: SymbolRef) -> bool {
        let mut visited = HashSet::new();
        self.contains_symbol_inner(symbol, target, &mut visited)
    }

    fn contains_symbol_inner(
        &self,
        symbol: SymbolRef,
        target: SymbolRef,
        visited: &mut HashSet<SymbolRef>,
    ) -> bool {
        if symbol == target {
            return true;
        }
        if !visited.insert(symbol) {
            // Already traversed; a cycle in the part graph
            return false;
        }
        if let Some(Symbol {
            kind: SymbolKind::Combined { parts },
            ..
        }) = self.symbols.get(symbol)
        {
            for part in parts.iter().flatten() {
                if self.contains_symbol_inner(*part, target, visited) {
                    return true;
                }
            }
        }
        false
    }

    /// Whether `symbol` uses `color`, following combined parts
    pub fn symbol_contains_color(&self, symbol: SymbolRef, color: ColorRef) -> bool {
        let mut visited = HashSet::new();
        self.contains_color_inner(symbol, color, &mut visited)
    }

    fn contains_color_inner(
        &self,
        symbol: SymbolRef,
        color: ColorRef,
        visited: &mut HashSet<SymbolRef>,
    ) -> bool {
        if !visited.insert(symbol) {
            return false;
        }
        let Some(s) = self.symbols.get(symbol) else {
            return false;
        };
        if s.uses_color_directly(color) {
            return true;
        }
        if let SymbolKind::Combined { parts } = &s.kind {
            for part in parts.iter().flatten() {
                if self.contains_color_inner(*part, color, visited) {
                    return true;
                }
            }
        }
        false
    }

    /// The set of symbol kinds `symbol` draws with, following combined parts
    pub fn symbol_contained_types(&self, symbol: SymbolRef) -> SymbolTypeFlags {
        let mut visited = HashSet::new();
        let mut flags = SymbolTypeFlags::default();
        self.contained_types_inner(symbol, &mut visited, &mut flags);
        flags
    }

    fn contained_types_inner(
        &self,
        symbol: SymbolRef,
        visited: &mut HashSet<SymbolRef>,
        flags: &mut SymbolTypeFlags,
    ) {
        if !visited.insert(symbol) {
            return;
        }
        let Some(s) = self.symbols.get(symbol) else {
            return;
        };
        flags.insert(s.kind.type_flag());
        if let SymbolKind::Combined { parts } = &s.kind {
            for part in parts.iter().flatten().copied().collect::<Vec<_>>() {
                self.contained_types_inner(part, visited, flags);
            }
        }
    }

    /// Replace `old` with `new` in every combined symbol's part slots and
    /// every object's symbol reference. Returns whether anything changed.
    pub fn symbol_changed(&mut self, old: SymbolRef, new: Option<SymbolRef>) -> bool {
        let mut changed = false;
        for symbol in &mut self.symbols {
            changed |= symbol.replace_part_symbol(old, new);
        }
        for part in &mut self.parts {
            for object in &mut part.objects {
                if object.symbol == Some(old) {
                    object.symbol = new;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Invalidate icons of every symbol that uses `color`; called by the
    /// color editor when a color is deleted or redefined
    pub fn color_changed(&mut self, color: ColorRef) {
        let affected: Vec<SymbolRef> = (0..self.symbols.len())
            .filter(|&s| self.symbol_contains_color(s, color))
            .collect();
        for s in affected {
            self.symbols[s].reset_icon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorCmyk, MapColor};
    use crate::symbol::{DashScheme, LineCap, LineJoin};

    fn line_symbol(color: Option<ColorRef>) -> Symbol {
        Symbol::new(
            "line",
            SymbolKind::Line {
                color,
                line_width: 100,
                cap: LineCap::Flat,
                join: LineJoin::Miter,
                dash: DashScheme::default(),
            },
        )
    }

    #[test]
    fn test_add_and_lookup() {
        let mut map = Map::new();
        let black = map.add_color(MapColor::new("Black", ColorCmyk::new(0.0, 0.0, 0.0, 1.0)));
        let line = map.add_symbol(line_symbol(Some(black)));
        assert_eq!(map.colors().len(), 1);
        assert_eq!(map.symbol(line).unwrap().name, "line");
        assert!(map.symbol(99).is_none());
    }

    #[test]
    fn test_add_object_invalid_part() {
        let mut map = Map::new();
        let object = Object::new_path(None);
        assert!(map.add_object(0, object.clone()).is_ok());
        assert!(map.add_object(7, object).is_err());
        assert_eq!(map.num_objects(), 1);
    }

    #[test]
    fn test_contains_symbol_through_parts() {
        let mut map = Map::new();
        let line = map.add_symbol(line_symbol(None));
        let other = map.add_symbol(line_symbol(None));
        let combined = map.add_symbol(Symbol::new_combined("c", 2));
        map.symbol_mut(combined).unwrap().set_part(0, Some(line));

        assert!(map.symbol_contains_symbol(combined, line));
        assert!(!map.symbol_contains_symbol(combined, other));
        assert!(map.symbol_contains_symbol(line, line));
    }

    #[test]
    fn test_contains_symbol_self_cycle_terminates() {
        let mut map = Map::new();
        let other = map.add_symbol(line_symbol(None));
        let combined = map.add_symbol(Symbol::new_combined("c", 2));
        // A hostile file can make a combined symbol reference itself
        map.symbol_mut(combined)
            .unwrap()
            .set_part(0, Some(combined));

        assert!(map.symbol_contains_symbol(combined, combined));
        assert!(!map.symbol_contains_symbol(combined, other));
    }

    #[test]
    fn test_contains_symbol_transitive_cycle_terminates() {
        let mut map = Map::new();
        let a = map.add_symbol(Symbol::new_combined("a", 2));
        let b = map.add_symbol(Symbol::new_combined("b", 2));
        let line = map.add_symbol(line_symbol(None));
        map.symbol_mut(a).unwrap().set_part(0, Some(b));
        map.symbol_mut(b).unwrap().set_part(0, Some(a));
        map.symbol_mut(b).unwrap().set_part(1, Some(line));

        assert!(map.symbol_contains_symbol(a, line));
        let other = map.add_symbol(line_symbol(None));
        assert!(!map.symbol_contains_symbol(a, other));
    }

    #[test]
    fn test_contained_types_with_cycle() {
        let mut map = Map::new();
        let line = map.add_symbol(line_symbol(None));
        let combined = map.add_symbol(Symbol::new_combined("c", 2));
        map.symbol_mut(combined).unwrap().set_part(0, Some(line));
        map.symbol_mut(combined)
            .unwrap()
            .set_part(1, Some(combined));

        let types = map.symbol_contained_types(combined);
        assert!(types.contains(SymbolTypeFlags::COMBINED));
        assert!(types.contains(SymbolTypeFlags::LINE));
        assert!(!types.contains(SymbolTypeFlags::AREA));
    }

    #[test]
    fn test_contains_color_through_parts() {
        let mut map = Map::new();
        let black = map.add_color(MapColor::new("Black", ColorCmyk::new(0.0, 0.0, 0.0, 1.0)));
        let line = map.add_symbol(line_symbol(Some(black)));
        let combined = map.add_symbol(Symbol::new_combined("c", 2));
        map.symbol_mut(combined).unwrap().set_part(0, Some(line));

        assert!(map.symbol_contains_color(combined, black));
        assert!(!map.symbol_contains_color(combined, black + 1));
    }

    #[test]
    fn test_symbol_changed_rewires_objects_and_parts() {
        let mut map = Map::new();
        let old = map.add_symbol(line_symbol(None));
        let new = map.add_symbol(line_symbol(None));
        let combined = map.add_symbol(Symbol::new_combined("c", 2));
        map.symbol_mut(combined).unwrap().set_part(0, Some(old));
        map.add_object(0, Object::new_path(Some(old))).unwrap();

        assert!(map.symbol_changed(old, Some(new)));
        assert_eq!(map.symbol(combined).unwrap().part(0), Some(new));
        assert_eq!(map.parts()[0].objects[0].symbol, Some(new));
        assert!(!map.symbol_changed(old, None));
    }
}
