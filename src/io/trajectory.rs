//! Camera trajectory files for replay.
//!
//! Rows are `timestamp_ns, px, py, pz, qw, qx, qy, qz` (EuRoC ground-truth
//! column order, extra columns ignored). Lines starting with `#` are
//! comments.

use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use nalgebra::Vector3;
use tracing::warn;

use crate::geometry::SE3;

#[derive(Debug, Clone)]
pub struct PoseEntry {
    pub timestamp_ns: u64,
    /// Camera-to-world transform (T_wc).
    pub pose: SE3,
}

/// Load a pose CSV. Short rows are skipped with a warning; unparsable
/// numbers are an error.
pub fn load_pose_csv<P: AsRef<Path>>(csv_path: P) -> Result<Vec<PoseEntry>> {
    let csv_path = csv_path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("Bad record in {}", csv_path.display()))?;
        if rec.len() < 8 {
            warn!("Skipping short row {} in {}", line + 1, csv_path.display());
            continue;
        }

        let field = |i: usize| -> Result<f64> {
            rec[i]
                .trim()
                .parse()
                .with_context(|| format!("Row {}: bad value {:?}", line + 1, &rec[i]))
        };

        let timestamp_ns: u64 = rec[0]
            .trim()
            .parse()
            .with_context(|| format!("Row {}: bad timestamp {:?}", line + 1, &rec[0]))?;
        let position = Vector3::new(field(1)?, field(2)?, field(3)?);

        // w-first quaternion
        let (qw, qx, qy, qz) = (field(4)?, field(5)?, field(6)?, field(7)?);
        if qw == 0.0 && qx == 0.0 && qy == 0.0 && qz == 0.0 {
            bail!("Row {}: zero quaternion", line + 1);
        }

        entries.push(PoseEntry {
            timestamp_ns,
            pose: SE3::from_quaternion(qw, qx, qy, qz, position),
        });
    }

    if entries.windows(2).any(|w| w[1].timestamp_ns < w[0].timestamp_ns) {
        warn!("{} is not sorted by timestamp, sorting", csv_path.display());
        entries.sort_by_key(|e| e.timestamp_ns);
    }

    Ok(entries)
}
