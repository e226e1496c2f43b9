//! Georeferencing - Transforms between map, projected and geographic coordinates
//!
//! A georeferenced map carries an affine transform between map-local
//! millimeter coordinates and a projected coordinate reference system
//! (CRS), plus a projection context for converting projected coordinates to
//! WGS84 latitude/longitude. Without a projected CRS the map is "local":
//! the affine transform still works, geographic conversions fail.
//!
//! Every setter keeps two invariants:
//! - `grivation == declination - convergence(geographic_ref_point)`
//! - the affine transform and its inverse match the current reference
//!   points, scale and grivation.
//!
//! Change notification is done with monotonic revision counters instead of
//! callbacks; `transformation_rev` only advances when the rebuilt transform
//! actually differs from the previous one.

use crate::coord::{LatLon, MapCoord, MapCoordF};

use geo::Coord;
use proj4rs::proj::Proj;
use std::f64::consts::PI;
use std::fmt;

/// Spec of the fixed geographic CRS used for all lat/lon conversions
pub const GEOGRAPHIC_CRS_SPEC: &str = "+proj=latlong +datum=WGS84 +no_defs";

/// Latitude perturbation used by the numeric convergence estimate,
/// roughly 1 km on the meridian
const CONVERGENCE_DELTA_PHI: f64 = PI / 20000.0;

/// Northing differences below this are treated as degenerate
const CONVERGENCE_EPSILON: f64 = 1e-11;

/// A 2D affine transform (2x3 matrix):
/// `x' = a*x + b*y + tx`, `y' = d*x + e*y + ty`
#[derive(Debug, Clone, Copy, PartialEq)]
struct AffineTransform {
    a: f64,
    b: f64,
    tx: f64,
    d: f64,
    e: f64,
    ty: f64,
}

impl AffineTransform {
    const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        d: 0.0,
        e: 1.0,
        ty: 0.0,
    };

    #[inline]
    fn apply(&self, p: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.a * p.x + self.b * p.y + self.tx,
            y: self.d * p.x + self.e * p.y + self.ty,
        }
    }

    /// Inverse transform; identity when singular (e.g. zero scale)
    fn inverted(&self) -> AffineTransform {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::MIN_POSITIVE {
            return Self::IDENTITY;
        }
        let inv_det = 1.0 / det;
        AffineTransform {
            a: self.e * inv_det,
            b: -self.b * inv_det,
            d: -self.d * inv_det,
            e: self.a * inv_det,
            tx: (self.b * self.ty - self.e * self.tx) * inv_det,
            ty: (self.d * self.tx - self.a * self.ty) * inv_det,
        }
    }
}

/// Georeferencing state of one map
pub struct Georeferencing {
    scale_denominator: u32,
    /// Angle between true north and magnetic north, degrees
    declination: f64,
    /// Angle between grid north and magnetic north, degrees
    grivation: f64,
    map_ref_point: MapCoord,
    /// Reference point in projected coordinates (meters)
    projected_ref_point: Coord<f64>,
    /// Reference point in geographic coordinates (radians)
    geographic_ref_point: LatLon,
    projected_crs_id: String,
    projected_crs_spec: String,
    /// Projection context for the projected CRS. `None` means the map is
    /// local (or the PROJ string failed to initialize). Replacing the context
    /// drops the old one first; there is exactly one live context here.
    projected_crs: Option<Proj>,
    /// Fixed WGS84 context for geographic conversions
    geographic_crs: Option<Proj>,
    projection_error: Option<String>,
    to_projected: AffineTransform,
    from_projected: AffineTransform,
    transformation_rev: u64,
    projection_rev: u64,
}

impl Georeferencing {
    /// Create an unreferenced ("local coordinates") instance
    pub fn new() -> Self {
        let mut georef = Self {
            scale_denominator: 0,
            declination: 0.0,
            grivation: 0.0,
            map_ref_point: MapCoord::default(),
            projected_ref_point: Coord { x: 0.0, y: 0.0 },
            geographic_ref_point: LatLon::default(),
            projected_crs_id: String::from("Local coordinates"),
            projected_crs_spec: String::new(),
            projected_crs: None,
            geographic_crs: Proj::from_proj_string(GEOGRAPHIC_CRS_SPEC).ok(),
            projection_error: None,
            to_projected: AffineTransform::IDENTITY,
            from_projected: AffineTransform::IDENTITY,
            transformation_rev: 0,
            projection_rev: 0,
        };
        georef.to_projected = georef.compute_transformation();
        georef.from_projected = georef.to_projected.inverted();
        georef
    }

    /// Whether no projected CRS is configured
    #[inline]
    pub fn is_local(&self) -> bool {
        self.projected_crs.is_none()
    }

    // === Accessors ===

    #[inline]
    pub fn scale_denominator(&self) -> u32 {
        self.scale_denominator
    }

    /// Declination in degrees
    #[inline]
    pub fn declination(&self) -> f64 {
        self.declination
    }

    /// Grivation in degrees
    #[inline]
    pub fn grivation(&self) -> f64 {
        self.grivation
    }

    #[inline]
    pub fn map_ref_point(&self) -> MapCoord {
        self.map_ref_point
    }

    #[inline]
    pub fn projected_ref_point(&self) -> Coord<f64> {
        self.projected_ref_point
    }

    #[inline]
    pub fn geographic_ref_point(&self) -> LatLon {
        self.geographic_ref_point
    }

    #[inline]
    pub fn projected_crs_id(&self) -> &str {
        &self.projected_crs_id
    }

    #[inline]
    pub fn projected_crs_spec(&self) -> &str {
        &self.projected_crs_spec
    }

    /// Error text of the last failed CRS initialization, empty otherwise
    pub fn error_text(&self) -> &str {
        self.projection_error.as_deref().unwrap_or("")
    }

    /// Revision counter advanced whenever the affine transform changes
    #[inline]
    pub fn transformation_rev(&self) -> u64 {
        self.transformation_rev
    }

    /// Revision counter advanced whenever the projected CRS changes
    #[inline]
    pub fn projection_rev(&self) -> u64 {
        self.projection_rev
    }

    // === Setters ===

    pub fn set_scale_denominator(&mut self, value: u32) {
        self.scale_denominator = value;
        self.update_transformation();
    }

    /// Set the declination (degrees); grivation shifts by the same amount
    /// so that their difference stays the local convergence
    pub fn set_declination(&mut self, value: f64) {
        self.grivation += value - self.declination;
        self.declination = value;
        self.update_transformation();
    }

    /// Set the grivation (degrees); declination shifts by the same amount
    pub fn set_grivation(&mut self, value: f64) {
        self.declination += value - self.grivation;
        self.grivation = value;
        self.update_transformation();
    }

    pub fn set_map_ref_point(&mut self, point: MapCoord) {
        self.map_ref_point = point;
        self.update_transformation();
    }

    /// Set the projected reference point, re-deriving the geographic
    /// reference point when the projection is available
    pub fn set_projected_ref_point(&mut self, point: Coord<f64>) {
        self.projected_ref_point = point;
        let (new_geo_ref, ok) = self.to_geographic_coords(point);
        if ok {
            self.geographic_ref_point = new_geo_ref;
        }
        self.update_grivation();
        self.update_transformation();
    }

    /// Set the geographic reference point, re-deriving the projected
    /// reference point when the projection is available
    pub fn set_geographic_ref_point(&mut self, lat_lon: LatLon) {
        let (new_projected_ref, ok) = self.to_projected_coords_from_geographic(lat_lon);
        if ok {
            self.projected_ref_point = new_projected_ref;
        }
        self.geographic_ref_point = lat_lon;
        if ok {
            self.update_grivation();
            self.update_transformation();
        }
    }

    /// Install a projected CRS from a PROJ specification string.
    ///
    /// The stored id/spec are always updated and the projection revision
    /// always advances, even when initialization fails; a failed context
    /// leaves the map effectively local and geographic conversions
    /// reporting failure. Returns whether initialization succeeded.
    pub fn set_projected_crs(&mut self, id: &str, spec: &str) -> bool {
        // Release the old context before installing a new one
        self.projected_crs = None;
        self.projection_error = None;

        self.projected_crs_id = String::from(id);
        self.projected_crs_spec = String::from(spec);
        match Proj::from_proj_string(spec) {
            Ok(proj) => self.projected_crs = Some(proj),
            Err(err) => {
                tracing::warn!("Failed to initialize projected CRS '{}': {}", id, err);
                self.projection_error = Some(err.to_string());
            }
        }
        if self.update_grivation() {
            self.update_transformation();
        }
        self.projection_rev += 1;
        self.projected_crs.is_some()
    }

    /// Recover the declination from a stored grivation, e.g. after
    /// loading a legacy file that only carries grid-relative angles
    pub fn init_declination(&mut self) {
        if self.is_local() && !self.projected_crs_spec.is_empty() {
            // Maybe not yet initialized
            self.projected_crs = Proj::from_proj_string(&self.projected_crs_spec).ok();
            if self.projected_crs.is_some() {
                self.projection_rev += 1;
            }
        }
        self.declination = self.grivation + self.convergence();
    }

    // === Transformation ===

    fn compute_transformation(&self) -> AffineTransform {
        // translate(projected ref) * rotate(-grivation) * scale(s, -s)
        //   * translate(-map ref)
        let scale = f64::from(self.scale_denominator) / 1000.0;
        let theta = -self.grivation.to_radians();
        let (sin, cos) = theta.sin_cos();
        let a = scale * cos;
        let b = scale * sin;
        let d = scale * sin;
        let e = -scale * cos;
        let map_ref = self.map_ref_point.to_coord_f();
        AffineTransform {
            a,
            b,
            d,
            e,
            tx: self.projected_ref_point.x - (a * map_ref.x + b * map_ref.y),
            ty: self.projected_ref_point.y - (d * map_ref.x + e * map_ref.y),
        }
    }

    /// Rebuild the affine transform from the current parameters. The
    /// revision counter only advances when the result differs.
    fn update_transformation(&mut self) {
        let new_transform = self.compute_transformation();
        if new_transform != self.to_projected {
            self.to_projected = new_transform;
            self.from_projected = new_transform.inverted();
            self.transformation_rev += 1;
        }
    }

    /// Recompute `grivation = declination - convergence()`; returns
    /// whether the value changed
    fn update_grivation(&mut self) -> bool {
        let old_value = self.grivation;
        self.grivation = self.declination - self.convergence();
        old_value != self.grivation
    }

    /// Meridian convergence at the geographic reference point, in degrees.
    ///
    /// Estimated numerically: a second point on the same meridian, offset
    /// towards the equator, is projected, and the convergence is the angle
    /// of the easting/northing difference. Returns 0 for local maps and
    /// for degenerate northing differences.
    pub fn convergence(&self) -> f64 {
        if self.is_local() {
            return 0.0;
        }

        let mut geographic_other = self.geographic_ref_point;
        geographic_other.latitude += if geographic_other.latitude < 0.0 {
            CONVERGENCE_DELTA_PHI
        } else {
            -CONVERGENCE_DELTA_PHI
        };
        let (projected_other, ok) = self.to_projected_coords_from_geographic(geographic_other);
        if !ok {
            return 0.0;
        }

        let denominator = projected_other.y - self.projected_ref_point.y;
        if denominator.abs() < CONVERGENCE_EPSILON {
            return 0.0;
        }

        ((self.projected_ref_point.x - projected_other.x) / denominator)
            .atan()
            .to_degrees()
    }

    // === Coordinate conversions ===

    /// Map (millimeters) to projected coordinates; always succeeds
    #[inline]
    pub fn to_projected_coords(&self, map_coords: MapCoordF) -> Coord<f64> {
        self.to_projected.apply(map_coords)
    }

    /// Projected coordinates to map (fixed point); always succeeds
    #[inline]
    pub fn to_map_coords(&self, projected_coords: Coord<f64>) -> MapCoord {
        MapCoord::from_coord_f(self.from_projected.apply(projected_coords))
    }

    /// Projected coordinates to map millimeters; always succeeds
    #[inline]
    pub fn to_map_coord_f(&self, projected_coords: Coord<f64>) -> MapCoordF {
        self.from_projected.apply(projected_coords)
    }

    /// Projected coordinates to geographic (radians).
    ///
    /// The success flag must be checked: on failure the returned value is
    /// computed from possibly untransformed input.
    pub fn to_geographic_coords(&self, projected_coords: Coord<f64>) -> (LatLon, bool) {
        let mut point = (projected_coords.x, projected_coords.y, 0.0);
        let mut ok = false;
        if let (Some(projected), Some(geographic)) = (&self.projected_crs, &self.geographic_crs) {
            ok = proj4rs::transform::transform(projected, geographic, &mut point).is_ok();
        }
        (LatLon::new(point.1, point.0), ok)
    }

    /// Map millimeters to geographic (radians); check the success flag
    pub fn map_to_geographic_coords(&self, map_coords: MapCoordF) -> (LatLon, bool) {
        self.to_geographic_coords(self.to_projected_coords(map_coords))
    }

    /// Geographic (radians) to projected coordinates; check the success flag
    pub fn to_projected_coords_from_geographic(&self, lat_lon: LatLon) -> (Coord<f64>, bool) {
        let mut point = (lat_lon.longitude, lat_lon.latitude, 0.0);
        let mut ok = false;
        if let (Some(projected), Some(geographic)) = (&self.projected_crs, &self.geographic_crs) {
            ok = proj4rs::transform::transform(geographic, projected, &mut point).is_ok();
        }
        (Coord {
            x: point.0,
            y: point.1,
        }, ok)
    }

    /// Geographic (radians) to map coordinates; check the success flag
    pub fn geographic_to_map_coords(&self, lat_lon: LatLon) -> (MapCoord, bool) {
        let (projected, ok) = self.to_projected_coords_from_geographic(lat_lon);
        (self.to_map_coords(projected), ok)
    }

    /// Format a radian angle as degrees-minutes-seconds with two-decimal
    /// seconds, e.g. `51°30'26.00"`
    pub fn radians_to_dms(value: f64) -> String {
        let ticks = (value.to_degrees() * 360000.0).round() as i64;
        let csec = ticks % 6000;
        let ticks = ticks / 6000;
        let min = ticks % 60;
        let deg = ticks / 60;
        format!("{}\u{00b0}{}'{:.2}\"", deg, min, csec as f64 / 100.0)
    }
}

impl Default for Georeferencing {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Georeferencing {
    fn clone(&self) -> Self {
        let mut clone = Self::new();
        clone.scale_denominator = self.scale_denominator;
        clone.declination = self.declination;
        clone.grivation = self.grivation;
        clone.map_ref_point = self.map_ref_point;
        clone.projected_ref_point = self.projected_ref_point;
        clone.geographic_ref_point = self.geographic_ref_point;
        clone.projected_crs_id = self.projected_crs_id.clone();
        clone.projected_crs_spec = self.projected_crs_spec.clone();
        // A fresh projection context is acquired for the clone
        clone.projected_crs = Proj::from_proj_string(&self.projected_crs_spec).ok();
        clone.to_projected = clone.compute_transformation();
        clone.from_projected = clone.to_projected.inverted();
        clone
    }
}

impl fmt::Debug for Georeferencing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Georeferencing")
            .field("scale", &format_args!("1:{}", self.scale_denominator))
            .field("declination", &self.declination)
            .field("grivation", &self.grivation)
            .field("projected_crs_id", &self.projected_crs_id)
            .field("projected_crs_spec", &self.projected_crs_spec)
            .field("projected_ref_point", &self.projected_ref_point)
            .field("local", &self.is_local())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UTM32_SPEC: &str = "+proj=utm +zone=32 +datum=WGS84 +units=m +no_defs";

    fn utm_georef() -> Georeferencing {
        let mut georef = Georeferencing::new();
        georef.set_scale_denominator(15000);
        assert!(georef.set_projected_crs("UTM 32N", UTM32_SPEC));
        // Somewhere in northern Germany, east of the central meridian
        georef.set_projected_ref_point(Coord {
            x: 600000.0,
            y: 5800000.0,
        });
        georef
    }

    #[test]
    fn test_local_by_default() {
        let georef = Georeferencing::new();
        assert!(georef.is_local());
        assert_eq!(georef.convergence(), 0.0);
        assert_eq!(georef.projected_crs_id(), "Local coordinates");
    }

    #[test]
    fn test_affine_roundtrip() {
        let mut georef = Georeferencing::new();
        georef.set_scale_denominator(10000);
        georef.set_grivation(3.5);
        georef.set_projected_ref_point(Coord {
            x: 1000.0,
            y: 2000.0,
        });
        georef.set_map_ref_point(MapCoord::from_mm(50.0, -30.0));

        let map_point = MapCoordF { x: 12.5, y: 40.25 };
        let projected = georef.to_projected_coords(map_point);
        let back = georef.to_map_coord_f(projected);
        assert!((back.x - map_point.x).abs() < 1e-6);
        assert!((back.y - map_point.y).abs() < 1e-6);
    }

    #[test]
    fn test_map_ref_point_maps_to_projected_ref_point() {
        let mut georef = Georeferencing::new();
        georef.set_scale_denominator(15000);
        georef.set_map_ref_point(MapCoord::from_mm(10.0, 20.0));
        georef.set_projected_ref_point(Coord { x: 500.0, y: 900.0 });

        let projected = georef.to_projected_coords(MapCoordF { x: 10.0, y: 20.0 });
        assert!((projected.x - 500.0).abs() < 1e-9);
        assert!((projected.y - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_y_axis_inversion_and_scale() {
        let mut georef = Georeferencing::new();
        georef.set_scale_denominator(10000);
        // 1 mm on a 1:10000 map is 10 m on the ground; map y grows down,
        // projected northing grows up
        let projected = georef.to_projected_coords(MapCoordF { x: 1.0, y: 1.0 });
        assert!((projected.x - 10.0).abs() < 1e-9);
        assert!((projected.y + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_transformation_rev_only_on_change() {
        let mut georef = Georeferencing::new();
        georef.set_scale_denominator(15000);
        let rev = georef.transformation_rev();
        // Same value again: transform identical, revision must not move
        georef.set_scale_denominator(15000);
        assert_eq!(georef.transformation_rev(), rev);
        georef.set_scale_denominator(10000);
        assert_eq!(georef.transformation_rev(), rev + 1);
    }

    #[test]
    fn test_declination_grivation_coupling_local() {
        let mut georef = Georeferencing::new();
        georef.set_declination(2.0);
        // Local map: convergence is 0, so grivation == declination
        assert!((georef.grivation() - 2.0).abs() < 1e-12);
        georef.set_grivation(-1.5);
        assert!((georef.declination() + 1.5).abs() < 1e-12);
        // Invariant: grivation == declination - convergence (== 0 here)
        assert!((georef.grivation() - georef.declination()).abs() < 1e-12);
    }

    #[test]
    fn test_grivation_invariant_with_projection() {
        let mut georef = utm_georef();
        for value in [0.0, 1.25, -3.0, 10.5] {
            georef.set_declination(value);
            let expected = georef.declination() - georef.convergence();
            assert!(
                (georef.grivation() - expected).abs() < 1e-9,
                "grivation {} != declination {} - convergence {}",
                georef.grivation(),
                georef.declination(),
                georef.convergence()
            );
        }
    }

    #[test]
    fn test_convergence_nonzero_off_central_meridian() {
        let georef = utm_georef();
        // 600 km false easting puts the point east of the central
        // meridian, convergence must be clearly nonzero
        assert!(georef.convergence().abs() > 0.01);
    }

    #[test]
    fn test_set_projected_crs_failure_keeps_spec() {
        let mut georef = Georeferencing::new();
        let rev = georef.projection_rev();
        assert!(!georef.set_projected_crs("bad", "+proj=no_such_projection"));
        assert!(georef.is_local());
        assert_eq!(georef.projected_crs_spec(), "+proj=no_such_projection");
        // The projection revision advances even on failure
        assert_eq!(georef.projection_rev(), rev + 1);
        assert!(!georef.error_text().is_empty());
    }

    #[test]
    fn test_geographic_roundtrip() {
        let georef = utm_georef();
        let (geo, ok) = georef.to_geographic_coords(Coord {
            x: 600000.0,
            y: 5800000.0,
        });
        assert!(ok);
        // UTM zone 32 around 52.3N 10.5E
        assert!((geo.latitude_degrees() - 52.0).abs() < 1.0);
        assert!((geo.longitude_degrees() - 10.5).abs() < 1.0);

        let (projected, ok) = georef.to_projected_coords_from_geographic(geo);
        assert!(ok);
        assert!((projected.x - 600000.0).abs() < 0.01);
        assert!((projected.y - 5800000.0).abs() < 0.01);
    }

    #[test]
    fn test_geographic_conversion_fails_when_local() {
        let georef = Georeferencing::new();
        let (_, ok) = georef.to_geographic_coords(Coord { x: 0.0, y: 0.0 });
        assert!(!ok);
        let (_, ok) = georef.to_projected_coords_from_geographic(LatLon::from_degrees(50.0, 8.0));
        assert!(!ok);
    }

    #[test]
    fn test_set_geographic_ref_point_updates_projected() {
        let mut georef = utm_georef();
        let lat_lon = LatLon::from_degrees(52.0, 10.0);
        georef.set_geographic_ref_point(lat_lon);
        let (expected, ok) = georef.to_projected_coords_from_geographic(lat_lon);
        assert!(ok);
        assert!((georef.projected_ref_point().x - expected.x).abs() < 1e-6);
        assert!((georef.projected_ref_point().y - expected.y).abs() < 1e-6);
    }

    #[test]
    fn test_init_declination() {
        let mut georef = utm_georef();
        georef.set_grivation(4.0);
        georef.init_declination();
        let expected = georef.grivation() + georef.convergence();
        assert!((georef.declination() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_radians_to_dms() {
        let value = (51.0_f64 + 30.0 / 60.0 + 26.0 / 3600.0).to_radians();
        assert_eq!(Georeferencing::radians_to_dms(value), "51°30'26.00\"");
        assert_eq!(Georeferencing::radians_to_dms(0.0), "0°0'0.00\"");
    }

    #[test]
    fn test_clone_reacquires_projection() {
        let georef = utm_georef();
        let clone = georef.clone();
        assert!(!clone.is_local());
        assert_eq!(clone.projected_crs_spec(), georef.projected_crs_spec());
        let (_, ok) = clone.to_geographic_coords(Coord {
            x: 600000.0,
            y: 5800000.0,
        });
        assert!(ok);
    }
}
