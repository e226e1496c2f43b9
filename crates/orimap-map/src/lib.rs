//! OriMap Map Model - Core Data Structures for Orienteering Maps
//!
//! This library provides the in-memory model of an orienteering map:
//! colors, symbols, drawn objects, map parts, templates and the
//! georeferencing transform between map-local and projected/geographic
//! coordinates.
//!
//! # Architecture
//!
//! - **[`MapCoord`]**: Fixed-point map coordinate (1/1000 mm) with path flags
//! - **[`MapColor`]**: A spot/CMYK print color owned by the map
//! - **[`Symbol`]**: Tagged-variant symbol (point, line, area, text, combined)
//! - **[`Object`]**: A drawn map feature referencing a symbol
//! - **[`Map`]**: Top-level owner of all tables and parts
//! - **[`Georeferencing`]**: Map ↔ projected ↔ geographic coordinate transforms

mod color;
mod coord;
mod georef;
mod map;
mod object;
mod symbol;

// Public API exports
pub use color::{ColorCmyk, MapColor};
pub use coord::{CoordFlags, LatLon, MapCoord, MapCoordF};
pub use georef::{Georeferencing, GEOGRAPHIC_CRS_SPEC};
pub use map::{ColorRef, Map, MapPart, MapView, PartRef, SymbolRef, Template};
pub use object::{HorizontalAlignment, Object, ObjectKind, VerticalAlignment};
pub use symbol::{
    DashScheme, HatchPattern, LineCap, LineJoin, PointElement, PointElementKind, Symbol,
    SymbolIcon, SymbolKind, SymbolTypeFlags,
};

/// Error types for the map model
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Invalid part index: {0}")]
    InvalidPart(usize),
}

pub type Result<T> = std::result::Result<T, MapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that the main entry points are accessible
        let _: fn() -> Map = Map::new;
        let _: fn() -> Georeferencing = Georeferencing::new;
    }
}
