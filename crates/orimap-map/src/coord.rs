//! Map coordinates and geographic positions
//!
//! Map-local coordinates are stored as 64-bit fixed-point values in units of
//! 1/1000 mm on the map plane, with the Y axis growing downwards. Geographic
//! positions are stored in radians, matching the projection library's native
//! unit.

use geo::Coord;

/// Per-coordinate path flags
///
/// A coordinate inside a path can start a cubic curve (the following two
/// coordinates are control points), open a hole in an area, mark a gap in a
/// line, or close the current sub-path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoordFlags(pub u8);

impl CoordFlags {
    pub const NONE: CoordFlags = CoordFlags(0);
    pub const CURVE_START: u8 = 1 << 0;
    pub const HOLE_POINT: u8 = 1 << 1;
    pub const GAP_POINT: u8 = 1 << 2;
    pub const CLOSE_POINT: u8 = 1 << 3;

    #[inline]
    pub fn is_curve_start(self) -> bool {
        self.0 & Self::CURVE_START != 0
    }

    #[inline]
    pub fn is_hole_point(self) -> bool {
        self.0 & Self::HOLE_POINT != 0
    }

    #[inline]
    pub fn is_gap_point(self) -> bool {
        self.0 & Self::GAP_POINT != 0
    }

    #[inline]
    pub fn is_close_point(self) -> bool {
        self.0 & Self::CLOSE_POINT != 0
    }

    #[inline]
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }
}

/// A fixed-point map coordinate in 1/1000 mm
///
/// The Y axis grows downwards (towards the bottom edge of the printed map).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapCoord {
    pub x: i64,
    pub y: i64,
    pub flags: CoordFlags,
}

impl MapCoord {
    /// Create a coordinate from raw 1/1000 mm values
    #[inline]
    pub fn from_raw(x: i64, y: i64) -> Self {
        Self {
            x,
            y,
            flags: CoordFlags::NONE,
        }
    }

    /// Create a coordinate from millimeters
    #[inline]
    pub fn from_mm(x: f64, y: f64) -> Self {
        Self::from_raw((x * 1000.0).round() as i64, (y * 1000.0).round() as i64)
    }

    /// X position in millimeters
    #[inline]
    pub fn x_mm(&self) -> f64 {
        self.x as f64 / 1000.0
    }

    /// Y position in millimeters
    #[inline]
    pub fn y_mm(&self) -> f64 {
        self.y as f64 / 1000.0
    }

    /// Convert to a floating-point coordinate in millimeters
    #[inline]
    pub fn to_coord_f(&self) -> MapCoordF {
        Coord {
            x: self.x_mm(),
            y: self.y_mm(),
        }
    }

    /// Build a coordinate from a floating-point position in millimeters,
    /// dropping any flags
    #[inline]
    pub fn from_coord_f(c: MapCoordF) -> Self {
        Self::from_mm(c.x, c.y)
    }

    #[inline]
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags.set(flags);
        self
    }
}

/// A floating-point map coordinate in millimeters
pub type MapCoordF = Coord<f64>;

/// A geographic position in radians (WGS84 latitude/longitude)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatLon {
    /// Latitude in radians, positive north
    pub latitude: f64,
    /// Longitude in radians, positive east
    pub longitude: f64,
}

impl LatLon {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build from degrees
    #[inline]
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: latitude.to_radians(),
            longitude: longitude.to_radians(),
        }
    }

    #[inline]
    pub fn latitude_degrees(&self) -> f64 {
        self.latitude.to_degrees()
    }

    #[inline]
    pub fn longitude_degrees(&self) -> f64 {
        self.longitude.to_degrees()
    }
}
