//! Geometry engine seam: the spatial predicates the overlay analysis needs.

use async_trait::async_trait;
use geo::{BooleanOps, CoordsIter, Intersects, MultiPolygon};
use geovisor_core::Geometry;

use crate::EngineError;

/// Spatial predicates used by the overlay detector.
///
/// Async so that remote geometry services fit behind the same interface.
#[async_trait]
pub trait GeometryEngine: Send + Sync {
    async fn intersects(&self, a: &Geometry, b: &Geometry) -> Result<bool, EngineError>;

    /// Merge polygonal geometries into one (multi)polygon.
    async fn union(&self, geometries: &[Geometry]) -> Result<Geometry, EngineError>;
}

/// Planar engine backed by `geo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

fn is_finite(geometry: &Geometry) -> bool {
    geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
}

#[async_trait]
impl GeometryEngine for PlanarEngine {
    async fn intersects(&self, a: &Geometry, b: &Geometry) -> Result<bool, EngineError> {
        if !is_finite(a) {
            return Err(EngineError::NonFinite { index: 0 });
        }
        if !is_finite(b) {
            return Err(EngineError::NonFinite { index: 1 });
        }
        Ok(a.intersects(b))
    }

    async fn union(&self, geometries: &[Geometry]) -> Result<Geometry, EngineError> {
        let mut parts = Vec::with_capacity(geometries.len());
        for (index, geometry) in geometries.iter().enumerate() {
            if !is_finite(geometry) {
                return Err(EngineError::NonFinite { index });
            }
            match geometry {
                Geometry::Polygon(p) => parts.push(MultiPolygon::new(vec![p.clone()])),
                Geometry::MultiPolygon(mp) => parts.push(mp.clone()),
                _ => return Err(EngineError::NotPolygonal { index }),
            }
        }

        // Pairwise reduction keeps the operands of each union balanced.
        while parts.len() > 1 {
            parts = parts
                .chunks(2)
                .map(|pair| match pair {
                    [a, b] => a.union(b),
                    [a] => a.clone(),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
        }
        parts
            .pop()
            .map(Geometry::MultiPolygon)
            .ok_or(EngineError::EmptyUnion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Point, Rect};

    fn square(x: f64, y: f64, size: f64) -> Geometry {
        Rect::new((x, y), (x + size, y + size)).to_polygon().into()
    }

    #[tokio::test]
    async fn intersects_and_disjoint() {
        let engine = PlanarEngine;
        let a = square(0.0, 0.0, 2.0);
        assert!(engine.intersects(&a, &square(1.0, 1.0, 2.0)).await.unwrap());
        assert!(!engine.intersects(&a, &square(5.0, 5.0, 1.0)).await.unwrap());
        // Shared edge counts as intersecting.
        assert!(engine.intersects(&a, &square(2.0, 0.0, 1.0)).await.unwrap());
    }

    #[tokio::test]
    async fn union_merges_overlap() {
        let engine = PlanarEngine;
        let merged = engine
            .union(&[square(0.0, 0.0, 2.0), square(1.0, 0.0, 2.0)])
            .await
            .unwrap();
        assert!((merged.unsigned_area() - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn union_keeps_disjoint_parts() {
        let engine = PlanarEngine;
        let merged = engine
            .union(&[
                square(0.0, 0.0, 1.0),
                square(10.0, 0.0, 1.0),
                square(20.0, 0.0, 1.0),
            ])
            .await
            .unwrap();
        match merged {
            Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 3),
            other => panic!("expected multipolygon, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn union_rejects_bad_input() {
        let engine = PlanarEngine;
        assert!(matches!(
            engine.union(&[]).await,
            Err(EngineError::EmptyUnion)
        ));
        assert!(matches!(
            engine
                .union(&[square(0.0, 0.0, 1.0), Point::new(0.0, 0.0).into()])
                .await,
            Err(EngineError::NotPolygonal { index: 1 })
        ));
        assert!(matches!(
            engine.union(&[square(f64::NAN, 0.0, 1.0)]).await,
            Err(EngineError::NonFinite { index: 0 })
        ));
    }

    #[tokio::test]
    async fn intersects_rejects_nan() {
        let engine = PlanarEngine;
        let err = engine
            .intersects(&square(0.0, 0.0, 1.0), &square(f64::NAN, 0.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NonFinite { index: 1 }));
    }
}
