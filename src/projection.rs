//! Target CRS handling and corner-mesh reprojection.

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

use crate::coords::CoordinateAxes;
use crate::error::{GribError, Result};
use crate::model::ReprojectedCornerMesh;

/// Allowed CRS input kinds, matching the constructors the geodesy library
/// exposes. The tag is matched exactly, payload interpretation per kind.
pub const CRS_KINDS: [&str; 4] = ["EPSG", "Wkt", "Proj4", "ESRI"];

/// A user-supplied target CRS in one of the accepted encodings.
///
/// The payload is validated eagerly: constructing a `TargetCrs` builds the
/// spatial reference once to reject unusable definitions with the offending
/// value named.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetCrs {
    Epsg(u32),
    Wkt(String),
    Proj4(String),
    Esri(String),
}

impl TargetCrs {
    /// Parses a `(kind, payload)` pair, e.g. `("EPSG", "4326")`.
    pub fn from_kind(kind: &str, payload: &str) -> Result<Self> {
        let crs = match kind {
            "EPSG" => {
                let code = payload.parse::<u32>().map_err(|_| GribError::InvalidSetting {
                    value: payload.to_string(),
                    allowed: "a numeric EPSG code".to_string(),
                })?;
                Self::Epsg(code)
            }
            "Wkt" => Self::Wkt(payload.to_string()),
            "Proj4" => Self::Proj4(payload.to_string()),
            "ESRI" => Self::Esri(payload.to_string()),
            other => {
                return Err(GribError::InvalidSetting {
                    value: other.to_string(),
                    allowed: CRS_KINDS.join(", "),
                })
            }
        };

        // Reject definitions the geodesy library cannot use.
        crs.spatial_ref()?;

        Ok(crs)
    }

    /// Builds the spatial reference, with the axis mapping pinned to
    /// x-then-y so transforms never reorder into lat/lon-first.
    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        let result = match self {
            Self::Epsg(code) => SpatialRef::from_epsg(*code),
            Self::Wkt(wkt) => SpatialRef::from_wkt(wkt),
            Self::Proj4(def) => SpatialRef::from_proj4(def),
            Self::Esri(def) => SpatialRef::from_esri(def),
        };

        let srs = result.map_err(|e| GribError::InvalidSetting {
            value: self.payload_string(),
            allowed: format!("a CRS definition usable by GDAL ({e})"),
        })?;
        Ok(traditional_order(srs))
    }

    fn payload_string(&self) -> String {
        match self {
            Self::Epsg(code) => format!("EPSG:{code}"),
            Self::Wkt(s) | Self::Proj4(s) | Self::Esri(s) => s.clone(),
        }
    }
}

/// Transforms the native corner axes into a 2D mesh in `target`.
///
/// The whole `(n_rows + 1) x (n_cols + 1)` meshgrid goes through one batched
/// transform call; this step dominates conversion cost on large grids and
/// per-point calls would drown it in call overhead. Any non-finite output
/// coordinate is fatal.
pub fn transform_corners(
    native_wkt: &str,
    target: &SpatialRef,
    axes: &CoordinateAxes,
) -> Result<ReprojectedCornerMesh> {
    let native = traditional_order(SpatialRef::from_wkt(native_wkt)?);

    let n_x = axes.x_corners.len();
    let n_y = axes.y_corners.len();
    let total = n_x * n_y;

    // Row-major meshgrid of the corner axes.
    let mut xs = Vec::with_capacity(total);
    let mut ys = Vec::with_capacity(total);
    for &y in &axes.y_corners {
        for &x in &axes.x_corners {
            xs.push(x);
            ys.push(y);
        }
    }
    let mut zs = vec![0.0; total];

    let transform = CoordTransform::new(&native, target)?;
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

    let bad = xs
        .iter()
        .chain(ys.iter())
        .filter(|v| !v.is_finite())
        .count();
    if bad > 0 {
        return Err(GribError::InvalidProjection {
            count: bad,
            total: total * 2,
        });
    }

    Ok(ReprojectedCornerMesh {
        x: xs,
        y: ys,
        shape: (n_y, n_x),
        projection: target.to_wkt()?,
    })
}

fn traditional_order(mut srs: SpatialRef) -> SpatialRef {
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    srs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RasterEnvelope;

    /// PROJ's EPSG database may be absent in minimal environments; skip the
    /// transform tests there, as the GTiff-driver tests upstream do.
    fn epsg_available() -> bool {
        SpatialRef::from_epsg(4326).is_ok()
    }

    fn axes() -> CoordinateAxes {
        let env = RasterEnvelope::new(10.0, 50.0, 3, 2, 0.5, 0.5, String::new(), 1);
        CoordinateAxes::from_envelope(&env)
    }

    #[test]
    fn unknown_kind_lists_allowed_set() {
        let err = TargetCrs::from_kind("Bogus", "4326").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Bogus"));
        assert!(msg.contains("EPSG"));
        assert!(msg.contains("Proj4"));
    }

    #[test]
    fn epsg_payload_must_be_numeric() {
        let err = TargetCrs::from_kind("EPSG", "not-a-code").unwrap_err();
        assert!(err.to_string().contains("not-a-code"));
    }

    #[test]
    fn identity_transform_preserves_corners() {
        if !epsg_available() {
            eprintln!("Skipping test: EPSG database not available");
            return;
        }

        let axes = axes();
        let wgs84 = TargetCrs::Epsg(4326).spatial_ref().unwrap();
        let native_wkt = wgs84.to_wkt().unwrap();

        let mesh = transform_corners(&native_wkt, &wgs84, &axes).unwrap();
        assert_eq!(mesh.shape, (3, 4));
        // First row of the mesh is the x corner axis at the top y corner.
        for (i, &x) in axes.x_corners.iter().enumerate() {
            assert!((mesh.x[i] - x).abs() < 1e-9);
            assert!((mesh.y[i] - axes.y_corners[0]).abs() < 1e-9);
        }
    }

    #[test]
    fn round_trip_reproduces_corners() {
        if !epsg_available() || SpatialRef::from_epsg(3857).is_err() {
            eprintln!("Skipping test: EPSG database not available");
            return;
        }

        let axes = axes();
        let wgs84 = TargetCrs::Epsg(4326).spatial_ref().unwrap();
        let mercator = TargetCrs::Epsg(3857).spatial_ref().unwrap();
        let wgs84_wkt = wgs84.to_wkt().unwrap();
        let mercator_wkt = mercator.to_wkt().unwrap();

        let forward = transform_corners(&wgs84_wkt, &mercator, &axes).unwrap();

        // Feed the projected mesh back through the inverse transform.
        let inverse = CoordTransform::new(&mercator, &wgs84).unwrap();
        let mut xs = forward.x.clone();
        let mut ys = forward.y.clone();
        let mut zs = vec![0.0; xs.len()];
        inverse.transform_coords(&mut xs, &mut ys, &mut zs).unwrap();

        let mut i = 0;
        for &y in &axes.y_corners {
            for &x in &axes.x_corners {
                assert!((xs[i] - x).abs() < 1e-6, "x mismatch at {i}");
                assert!((ys[i] - y).abs() < 1e-6, "y mismatch at {i}");
                i += 1;
            }
        }
    }
}
