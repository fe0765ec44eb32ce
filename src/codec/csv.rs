//! Lossless track CSV codec.
//!
//! Fixed header `timestamp,lat,lon,segment_id,depth_m,sog_mps,cog_deg`;
//! absent optional fields serialize as empty strings. Parsing resolves
//! columns by header name (order-independent), drops rows whose required
//! fields fail to parse, and fails the whole file only when a required
//! header column is missing. No field ever contains a comma (numbers and
//! RFC 3339 timestamps only), so no quoting layer is needed.

use std::path::Path;

use crate::core::errors::{MstError, Result};
use crate::model::track::TrackPoint;

/// Column order written by [`to_csv`].
pub const CSV_HEADER: &str = "timestamp,lat,lon,segment_id,depth_m,sog_mps,cog_deg";

const REQUIRED_COLUMNS: [&str; 4] = ["timestamp", "lat", "lon", "segment_id"];

/// Serialize a point list to CSV text (header included, `\n` line ends).
#[must_use]
pub fn to_csv(points: &[TrackPoint]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + points.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for p in points {
        out.push_str(&p.ts);
        out.push(',');
        out.push_str(&format_f64(p.lat));
        out.push(',');
        out.push_str(&format_f64(p.lon));
        out.push(',');
        out.push_str(&p.segment_id.to_string());
        out.push(',');
        out.push_str(&format_opt(p.depth_m));
        out.push(',');
        out.push_str(&format_opt(p.sog_mps));
        out.push(',');
        out.push_str(&format_opt(p.cog_deg));
        out.push('\n');
    }
    out
}

/// Parse CSV text back into a point list.
///
/// `path` is only used for error reporting.
pub fn parse_csv(text: &str, path: &Path) -> Result<Vec<TrackPoint>> {
    let mut lines = text.lines();
    let header_line = lines.next().unwrap_or("");
    let columns: Vec<&str> = header_line.split(',').map(str::trim).collect();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.contains(required))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(MstError::CsvHeader {
            path: path.to_path_buf(),
            missing: missing.join(", "),
        });
    }

    let col = |name: &str| columns.iter().position(|c| *c == name);
    // Required columns are present — checked above.
    let ts_idx = col("timestamp").unwrap_or(0);
    let lat_idx = col("lat").unwrap_or(0);
    let lon_idx = col("lon").unwrap_or(0);
    let seg_idx = col("segment_id").unwrap_or(0);
    let depth_idx = col("depth_m");
    let sog_idx = col("sog_mps");
    let cog_idx = col("cog_deg");

    let mut points = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let Some(point) = parse_row(&fields, ts_idx, lat_idx, lon_idx, seg_idx, depth_idx, sog_idx, cog_idx)
        else {
            // Malformed data row: dropped, not fatal. One corrupt sample must
            // not cost the rest of the recording.
            continue;
        };
        points.push(point);
    }
    Ok(points)
}

#[allow(clippy::too_many_arguments)]
fn parse_row(
    fields: &[&str],
    ts_idx: usize,
    lat_idx: usize,
    lon_idx: usize,
    seg_idx: usize,
    depth_idx: Option<usize>,
    sog_idx: Option<usize>,
    cog_idx: Option<usize>,
) -> Option<TrackPoint> {
    let ts = fields.get(ts_idx)?.trim();
    if ts.is_empty() {
        return None;
    }
    let lat: f64 = fields.get(lat_idx)?.trim().parse().ok()?;
    let lon: f64 = fields.get(lon_idx)?.trim().parse().ok()?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    let segment_id: u32 = fields.get(seg_idx)?.trim().parse().ok()?;
    if segment_id == 0 {
        return None;
    }
    Some(TrackPoint {
        ts: ts.to_string(),
        lat,
        lon,
        segment_id,
        depth_m: parse_opt(fields, depth_idx),
        sog_mps: parse_opt(fields, sog_idx),
        cog_deg: parse_opt(fields, cog_idx),
    })
}

fn parse_opt(fields: &[&str], idx: Option<usize>) -> Option<f64> {
    let raw = fields.get(idx?)?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_opt(value: Option<f64>) -> String {
    value.map(format_f64).unwrap_or_default()
}

/// Shortest round-trip decimal form (Rust's default float Display).
fn format_f64(value: f64) -> String {
    format!("{value}")
}
