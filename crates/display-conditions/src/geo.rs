//! 地理位置记录类事实
//!
//! 记录的每个子字段各自解析、各自比较，再由这里按目标语义合并，
//! 而不是做一次标量比较。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::operators::Comparator;

const EARTH_RADIUS_KM: f64 = 6371.0;
const EARTH_RADIUS_MI: f64 = 3958.8;

/// 访客地理位置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl GeoLocation {
    pub fn point(&self) -> Option<GeoPoint> {
        Some(GeoPoint {
            lat: self.latitude?,
            lng: self.longitude?,
        })
    }
}

/// 经纬度坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// 距离单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceUnit {
    #[default]
    Kilometers,
    Miles,
}

impl DistanceUnit {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("mi") | Some("miles") => Self::Miles,
            _ => Self::Kilometers,
        }
    }

    fn earth_radius(&self) -> f64 {
        match self {
            Self::Kilometers => EARTH_RADIUS_KM,
            Self::Miles => EARTH_RADIUS_MI,
        }
    }
}

/// 两点间大圆距离（haversine）
pub fn distance(a: GeoPoint, b: GeoPoint, unit: DistanceUnit) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * unit.earth_radius() * h.sqrt().asin()
}

/// 配置值可能被包在单元素数组里，取第一个元素
fn record(authored: &Value) -> &Value {
    match authored {
        Value::Array(items) => items.first().unwrap_or(authored),
        other => other,
    }
}

/// 按国家/地区/城市匹配
///
/// 每个非空的配置子字段都必须与访客位置大小写不敏感地相等；`is_not` 对合并结果取反。
/// 位置未知的访客在两个方向上都不满足。
pub fn match_place(location: Option<&GeoLocation>, comparator: Comparator, authored: &Value) -> bool {
    let authored = record(authored);
    let wanted: Vec<(&str, &str)> = ["country", "region", "city"]
        .into_iter()
        .filter_map(|field| {
            authored
                .get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (field, v))
        })
        .collect();

    if wanted.is_empty() {
        warn!(values = %authored, "geo_location row has no sub-field to compare, passing");
        return true;
    }

    let Some(location) = location else {
        return false;
    };

    let matched = wanted.iter().all(|(field, expected)| {
        let actual = match *field {
            "country" => location.country.as_deref(),
            "region" => location.region.as_deref(),
            _ => location.city.as_deref(),
        };
        actual.is_some_and(|actual| actual.trim().to_lowercase() == expected.to_lowercase())
    });

    match comparator {
        Comparator::IsNot => !matched,
        _ => matched,
    }
}

/// 按到指定点的距离匹配
///
/// 配置值形如 `{distance, units, lat, lng}`，数值既可以是数字也可以是字符串。
/// 距离比较使用行上的排序比较符，非排序比较符按 `less_than` 处理。
pub fn match_radius(position: Option<GeoPoint>, comparator: Comparator, authored: &Value) -> bool {
    let authored = record(authored);
    let limit = number(authored, "distance");
    let lat = number(authored, "lat");
    let lng = number(authored, "lng");

    let (Some(limit), Some(lat), Some(lng)) = (limit, lat, lng) else {
        warn!(values = %authored, "geo_radius row is incomplete, passing");
        return true;
    };

    let Some(position) = position else {
        return false;
    };

    let unit = DistanceUnit::parse(authored.get("units").and_then(Value::as_str));
    let actual = distance(position, GeoPoint { lat, lng }, unit);

    match comparator {
        Comparator::GreaterThan => actual > limit,
        Comparator::Equals => actual.trunc() == limit.trunc(),
        _ => actual < limit,
    }
}

fn number(authored: &Value, key: &str) -> Option<f64> {
    match authored.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
