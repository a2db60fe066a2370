//! Coordinate entry for the monitoring region: geographic and UTM (WGS84).
//!
//! Entry validation bounds cover the program's territory:
//!
//! - latitude in [-20, 0], longitude in [-82, -67]
//! - UTM zones 17S, 18S, 19S with easting in [100 000, 1 000 000] and
//!   northing in [8 000 000, 10 000 000]
//!
//! The bounds only apply to user-entered values. Converted values are
//! returned as computed; a valid latitude near -20 maps below the UTM
//! northing bound.

use std::fmt;
use std::str::FromStr;

use proj4rs::Proj;
use thiserror::Error;

pub const LATITUDE_RANGE: (f64, f64) = (-20.0, 0.0);
pub const LONGITUDE_RANGE: (f64, f64) = (-82.0, -67.0);
pub const EASTING_RANGE: (f64, f64) = (100_000.0, 1_000_000.0);
pub const NORTHING_RANGE: (f64, f64) = (8_000_000.0, 10_000_000.0);

const WGS84_GEOGRAPHIC: &str = "+proj=longlat +datum=WGS84 +no_defs";

#[derive(Debug, Error, PartialEq)]
pub enum CoordError {
    #[error("{axis} {value} outside [{min}, {max}]")]
    OutOfRange {
        axis: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{0} is not a finite number")]
    NotFinite(&'static str),

    #[error("unsupported UTM zone: {0} (expected 17S, 18S or 19S)")]
    UnknownZone(String),

    #[error("projection failed: {0}")]
    Projection(String),
}

fn check(axis: &'static str, value: f64, (min, max): (f64, f64)) -> Result<f64, CoordError> {
    if !value.is_finite() {
        return Err(CoordError::NotFinite(axis));
    }
    if value < min || value > max {
        return Err(CoordError::OutOfRange {
            axis,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Southern-hemisphere UTM zones covering the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtmZone {
    Z17S,
    Z18S,
    Z19S,
}

impl UtmZone {
    pub const ALL: [UtmZone; 3] = [UtmZone::Z17S, UtmZone::Z18S, UtmZone::Z19S];

    pub fn number(self) -> u8 {
        match self {
            UtmZone::Z17S => 17,
            UtmZone::Z18S => 18,
            UtmZone::Z19S => 19,
        }
    }

    /// Central meridian in degrees.
    pub fn central_meridian(self) -> f64 {
        f64::from(self.number()) * 6.0 - 183.0
    }

    /// PROJ definition of the WGS84 / UTM south zone.
    pub fn proj_string(self) -> String {
        format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs", self.number())
    }

    /// EPSG code of the WGS84 / UTM south zone.
    pub fn epsg(self) -> u32 {
        32700 + u32::from(self.number())
    }

    /// Zone containing the longitude (standard 6° bands).
    pub fn from_longitude(lon: f64) -> Result<Self, CoordError> {
        let lon = check("longitude", lon, LONGITUDE_RANGE)?;
        let number = ((lon + 180.0) / 6.0).floor() as u8 + 1;
        match number {
            17 => Ok(UtmZone::Z17S),
            18 => Ok(UtmZone::Z18S),
            19 => Ok(UtmZone::Z19S),
            n => Err(CoordError::UnknownZone(format!("{n}S"))),
        }
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}S", self.number())
    }
}

impl FromStr for UtmZone {
    type Err = CoordError;

    /// Accepts "18S", "18s", "18" and "18 S".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = cleaned
            .strip_suffix(['S', 's'])
            .unwrap_or(cleaned.as_str());
        match digits {
            "17" => Ok(UtmZone::Z17S),
            "18" => Ok(UtmZone::Z18S),
            "19" => Ok(UtmZone::Z19S),
            _ => Err(CoordError::UnknownZone(s.trim().to_string())),
        }
    }
}

/// Geographic WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Validated constructor for user-entered coordinates.
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoordError> {
        Ok(Self {
            lat: check("latitude", lat, LATITUDE_RANGE)?,
            lon: check("longitude", lon, LONGITUDE_RANGE)?,
        })
    }

    /// Project into the zone containing this longitude.
    pub fn to_utm(&self) -> Result<UtmPoint, CoordError> {
        self.to_utm_in(UtmZone::from_longitude(self.lon)?)
    }

    /// Project into a given zone.
    pub fn to_utm_in(&self, zone: UtmZone) -> Result<UtmPoint, CoordError> {
        let mut point = (self.lon.to_radians(), self.lat.to_radians(), 0.0);
        project(WGS84_GEOGRAPHIC, &zone.proj_string(), &mut point)?;
        Ok(UtmPoint {
            zone,
            easting: point.0,
            northing: point.1,
        })
    }

    /// As a `geo` point (x = longitude, y = latitude).
    pub fn to_point(&self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }
}

/// UTM position in one of the region's southern zones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmPoint {
    pub zone: UtmZone,
    pub easting: f64,
    pub northing: f64,
}

impl UtmPoint {
    /// Validated constructor for user-entered coordinates.
    pub fn new(zone: UtmZone, easting: f64, northing: f64) -> Result<Self, CoordError> {
        Ok(Self {
            zone,
            easting: check("easting", easting, EASTING_RANGE)?,
            northing: check("northing", northing, NORTHING_RANGE)?,
        })
    }

    /// Unproject back to WGS84 degrees.
    pub fn to_geographic(&self) -> Result<GeoPoint, CoordError> {
        let mut point = (self.easting, self.northing, 0.0);
        project(&self.zone.proj_string(), WGS84_GEOGRAPHIC, &mut point)?;
        Ok(GeoPoint {
            lat: point.1.to_degrees(),
            lon: point.0.to_degrees(),
        })
    }
}

/// Transform one point in place; geographic coordinates are radians.
fn project(from: &str, to: &str, point: &mut (f64, f64, f64)) -> Result<(), CoordError> {
    let src = Proj::from_proj_string(from).map_err(|e| CoordError::Projection(format!("{e:?}")))?;
    let dst = Proj::from_proj_string(to).map_err(|e| CoordError::Projection(format!("{e:?}")))?;
    proj4rs::transform::transform(&src, &dst, point)
        .map_err(|e| CoordError::Projection(format!("{e:?}")))?;
    if !point.0.is_finite() || !point.1.is_finite() {
        return Err(CoordError::Projection(format!("non-finite result from {to}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEG_TOLERANCE: f64 = 1e-6;

    #[test]
    fn equator_on_central_meridian() {
        let p = GeoPoint::new(0.0, -75.0).unwrap().to_utm().unwrap();
        assert_eq!(p.zone, UtmZone::Z18S);
        assert!((p.easting - 500_000.0).abs() < 1e-3);
        assert!((p.northing - 10_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn central_meridian_keeps_false_easting() {
        let p = GeoPoint::new(-10.0, -75.0).unwrap().to_utm().unwrap();
        assert!((p.easting - 500_000.0).abs() < 1e-3);
        // WGS84 meridian arc to 10° is 1 105 854.833 m, scaled by k0 = 0.9996.
        let expected = 10_000_000.0 - 1_105_854.833 * 0.9996;
        assert!((p.northing - expected).abs() < 0.05, "northing {}", p.northing);
    }

    #[test]
    fn eastings_mirror_across_central_meridian() {
        let west = GeoPoint::new(-14.0, -77.0).unwrap().to_utm_in(UtmZone::Z18S).unwrap();
        let east = GeoPoint::new(-14.0, -73.0).unwrap().to_utm_in(UtmZone::Z18S).unwrap();
        assert!(((500_000.0 - west.easting) - (east.easting - 500_000.0)).abs() < 1e-3);
        assert!((west.northing - east.northing).abs() < 1e-3);
    }

    #[test]
    fn explicit_zone_outside_band() {
        // -76.5 lies in 18S; forcing 17S still projects, east of its false easting.
        let p = GeoPoint::new(-6.0, -76.5).unwrap().to_utm_in(UtmZone::Z17S).unwrap();
        assert_eq!(p.zone, UtmZone::Z17S);
        assert!(p.easting > 900_000.0);
        let back = p.to_geographic().unwrap();
        assert!((back.lon + 76.5).abs() < 1e-5);
    }

    #[test]
    fn roundtrip_lima() {
        let lima = GeoPoint::new(-12.0464, -77.0428).unwrap();
        let utm = lima.to_utm().unwrap();
        assert_eq!(utm.zone, UtmZone::Z18S);
        assert!(utm.easting > 270_000.0 && utm.easting < 290_000.0);
        assert!(utm.northing > 8_660_000.0 && utm.northing < 8_675_000.0);

        let back = utm.to_geographic().unwrap();
        assert!((back.lat - lima.lat).abs() < DEG_TOLERANCE);
        assert!((back.lon - lima.lon).abs() < DEG_TOLERANCE);
    }

    #[test]
    fn roundtrip_every_zone() {
        for (lat, lon) in [(-4.5, -80.6), (-6.03, -76.97), (-13.52, -71.97), (-18.0, -70.25)] {
            let p = GeoPoint::new(lat, lon).unwrap();
            let back = p.to_utm().unwrap().to_geographic().unwrap();
            assert!((back.lat - lat).abs() < DEG_TOLERANCE, "lat {lat} -> {}", back.lat);
            assert!((back.lon - lon).abs() < DEG_TOLERANCE, "lon {lon} -> {}", back.lon);
        }
    }

    #[test]
    fn zone_bands() {
        assert_eq!(UtmZone::from_longitude(-81.0).unwrap(), UtmZone::Z17S);
        assert_eq!(UtmZone::from_longitude(-78.0).unwrap(), UtmZone::Z18S);
        assert_eq!(UtmZone::from_longitude(-72.5).unwrap(), UtmZone::Z18S);
        assert_eq!(UtmZone::from_longitude(-70.0).unwrap(), UtmZone::Z19S);
        assert!(UtmZone::from_longitude(-60.0).is_err());
    }

    #[test]
    fn zone_parsing_and_codes() {
        assert_eq!("18S".parse::<UtmZone>().unwrap(), UtmZone::Z18S);
        assert_eq!("17s".parse::<UtmZone>().unwrap(), UtmZone::Z17S);
        assert_eq!(" 19 S ".parse::<UtmZone>().unwrap(), UtmZone::Z19S);
        assert!("20S".parse::<UtmZone>().is_err());
        assert_eq!(UtmZone::Z18S.to_string(), "18S");
        assert_eq!(UtmZone::Z19S.epsg(), 32719);
        assert_eq!(UtmZone::Z17S.central_meridian(), -81.0);
        assert_eq!(
            UtmZone::Z18S.proj_string(),
            "+proj=utm +zone=18 +south +datum=WGS84 +units=m +no_defs"
        );
    }

    #[test]
    fn geographic_bounds() {
        assert!(GeoPoint::new(-20.0, -82.0).is_ok());
        assert!(GeoPoint::new(0.0, -67.0).is_ok());
        assert!(matches!(
            GeoPoint::new(0.5, -75.0),
            Err(CoordError::OutOfRange { axis: "latitude", .. })
        ));
        assert!(matches!(
            GeoPoint::new(-10.0, -66.9),
            Err(CoordError::OutOfRange { axis: "longitude", .. })
        ));
        assert_eq!(
            GeoPoint::new(f64::NAN, -75.0),
            Err(CoordError::NotFinite("latitude"))
        );
    }

    #[test]
    fn utm_bounds() {
        assert!(UtmPoint::new(UtmZone::Z18S, 100_000.0, 8_000_000.0).is_ok());
        assert!(UtmPoint::new(UtmZone::Z18S, 1_000_000.0, 10_000_000.0).is_ok());
        assert!(matches!(
            UtmPoint::new(UtmZone::Z18S, 99_999.0, 9_000_000.0),
            Err(CoordError::OutOfRange { axis: "easting", .. })
        ));
        assert!(matches!(
            UtmPoint::new(UtmZone::Z18S, 500_000.0, 7_999_999.0),
            Err(CoordError::OutOfRange { axis: "northing", .. })
        ));
    }

    #[test]
    fn to_point_is_lon_lat() {
        let p = GeoPoint::new(-12.0, -77.0).unwrap().to_point();
        assert_eq!(p.x(), -77.0);
        assert_eq!(p.y(), -12.0);
    }
}
