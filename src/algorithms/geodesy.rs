//! 地理坐标与局部平面坐标之间的转换
//!
//! 使用等距圆柱（equirectangular）近似：以参考点为原点，
//! x 轴指向东，y 轴指向北，单位为米。蜂窝网络覆盖范围（几十公里以内）
//! 的投影畸变可以忽略。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 地球平均半径（米）
pub const EARTH_RADIUS_M: f64 = 6_371_009.0;

/// 地理坐标（度）
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    /// 坐标是否为有限值且在合法范围内
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }

    /// 两点在纬度或经度任一方向上的差值是否达到容差（度）
    pub fn differs_from(&self, other: &GeoPoint, tolerance_deg: f64) -> bool {
        (self.latitude - other.latitude).abs() >= tolerance_deg
            || (self.longitude - other.longitude).abs() >= tolerance_deg
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// 局部平面坐标（米）
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub fn new(x: f64, y: f64) -> Self {
        PlanarPoint { x, y }
    }

    pub fn distance_to(&self, other: &PlanarPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn scale(&self, factor: f64) -> PlanarPoint {
        PlanarPoint::new(self.x * factor, self.y * factor)
    }

    /// 点集质心，空集返回 None
    pub fn centroid(points: &[PlanarPoint]) -> Option<PlanarPoint> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let x = points.iter().map(|p| p.x).sum::<f64>() / n;
        let y = points.iter().map(|p| p.y).sum::<f64>() / n;
        Some(PlanarPoint::new(x, y))
    }
}

impl fmt::Display for PlanarPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3} m, {:.3} m)", self.x, self.y)
    }
}

/// 以参考点为原点的局部平面投影
///
/// 经度方向按 cos(φ₀) 缩放，参考点不能位于极点（见 `supports_reference`）。
#[derive(Clone, Copy, Debug)]
pub struct LocalProjection {
    reference: GeoPoint,
    ref_lat_rad: f64,
    ref_lon_rad: f64,
    cos_ref_lat: f64,
}

impl LocalProjection {
    pub fn new(reference: GeoPoint) -> Self {
        let ref_lat_rad = reference.latitude.to_radians();
        LocalProjection {
            reference,
            ref_lat_rad,
            ref_lon_rad: reference.longitude.to_radians(),
            cos_ref_lat: ref_lat_rad.cos(),
        }
    }

    /// 参考点是否可用于投影：|φ₀| = 90° 时 cos(φ₀) 退化为零
    pub fn supports_reference(reference: &GeoPoint) -> bool {
        reference.is_valid() && reference.latitude.abs() < 90.0
    }

    pub fn reference(&self) -> GeoPoint {
        self.reference
    }

    /// 地理坐标 → 平面坐标
    ///
    /// x = R · Δλ · cos(φ₀)，y = R · Δφ
    pub fn to_planar(&self, point: &GeoPoint) -> PlanarPoint {
        let d_lat = (point.latitude - self.reference.latitude).to_radians();
        let d_lon = (point.longitude - self.reference.longitude).to_radians();
        PlanarPoint::new(
            EARTH_RADIUS_M * d_lon * self.cos_ref_lat,
            EARTH_RADIUS_M * d_lat,
        )
    }

    /// 平面坐标 → 地理坐标
    pub fn to_geographic(&self, point: &PlanarPoint) -> GeoPoint {
        let lat = self.ref_lat_rad + point.y / EARTH_RADIUS_M;
        let lon = self.ref_lon_rad + point.x / (EARTH_RADIUS_M * self.cos_ref_lat);
        GeoPoint::new(lat.to_degrees(), lon.to_degrees())
    }
}
