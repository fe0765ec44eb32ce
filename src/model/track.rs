//! Track points and the telemetry fix contract.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

/// One recorded position sample inside a track.
///
/// `ts` is kept as the verbatim RFC 3339 string it arrived with so CSV
/// round-trips are lossless; it is only parsed when two instants must be
/// compared. `segment_id` starts at 1 and is monotonically non-decreasing
/// within one track's point list; an increment marks a recording gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub ts: String,
    pub lat: f64,
    pub lon: f64,
    pub segment_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sog_mps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cog_deg: Option<f64>,
}

impl TrackPoint {
    /// Coordinate sanity check: both lat and lon must be finite.
    #[must_use]
    pub fn has_finite_position(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// One timestamped position/motion reading from the telemetry subsystem.
///
/// The recorder only reads this shape; how it was decoded (USBL, NMEA, …)
/// is the acquisition layer's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub entity_id: String,
    pub ts: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
}

impl Fix {
    /// Build the track point this fix contributes, at the given segment.
    #[must_use]
    pub fn to_point(&self, segment_id: u32) -> TrackPoint {
        TrackPoint {
            ts: self.ts.clone(),
            lat: self.lat,
            lon: self.lon,
            segment_id,
            depth_m: self.depth,
            sog_mps: self.speed,
            cog_deg: self.course,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_maps_onto_point_fields() {
        let fix = Fix {
            entity_id: "diver-1".to_string(),
            ts: "2026-03-01T10:00:00.000Z".to_string(),
            lat: 59.934,
            lon: 30.335,
            speed: Some(0.4),
            course: Some(182.0),
            depth: Some(12.5),
        };
        let point = fix.to_point(2);
        assert_eq!(point.ts, fix.ts);
        assert_eq!(point.segment_id, 2);
        assert_eq!(point.depth_m, Some(12.5));
        assert_eq!(point.sog_mps, Some(0.4));
        assert_eq!(point.cog_deg, Some(182.0));
        assert!(point.has_finite_position());
    }

    #[test]
    fn non_finite_position_detected() {
        let point = TrackPoint {
            ts: "2026-03-01T10:00:00.000Z".to_string(),
            lat: f64::NAN,
            lon: 30.335,
            segment_id: 1,
            depth_m: None,
            sog_mps: None,
            cog_deg: None,
        };
        assert!(!point.has_finite_position());
    }
}
