//! # Export モジュール
//!
//! 軌道とステップ記録を CSV で出力します。
//!
//! - 軌道: `route_id,step,x,y,z`（経路ごと・サンプルごとに1行）
//! - 記録: `timestamp,step,agent_id,profile,pos_x,pos_y,decision,threat_level,needs_help,speed`
//!
//! 出力の失敗は `ExportError` として返し、呼び出し側はログに残して処理を継続します。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::ExportError;
use crate::geometry::Trajectory;
use crate::metrics::StepRecord;

pub const TRAJECTORY_HEADER: &str = "route_id,step,x,y,z";
pub const METRICS_HEADER: &str = "timestamp,step,agent_id,profile,pos_x,pos_y,decision,threat_level,needs_help,speed";

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// 出力先ディレクトリを作成
pub fn ensure_parent(path: &Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir).map_err(io_error(path)),
        _ => Ok(()),
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, ExportError> {
    ensure_parent(path)?;
    File::create(path).map(BufWriter::new).map_err(io_error(path))
}

/// 軌道 CSV を書き出す
///
/// # 引数
///
/// * `routes` - (経路ID, 軌道) の組
pub fn write_trajectory_csv<'a, I>(path: &Path, routes: I) -> Result<usize, ExportError>
where
    I: IntoIterator<Item = (usize, &'a Trajectory)>,
{
    let mut out = create(path)?;
    write_trajectory_rows(&mut out, routes).map_err(io_error(path))
}

fn write_trajectory_rows<'a, W, I>(out: &mut W, routes: I) -> std::io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = (usize, &'a Trajectory)>,
{
    let mut rows = 0;
    writeln!(out, "{}", TRAJECTORY_HEADER)?;
    for (route_id, trajectory) in routes {
        for (step, p) in trajectory.points.iter().enumerate() {
            writeln!(out, "{},{},{:.6},{:.6},{:.6}", route_id, step, p.x, p.y, p.z)?;
            rows += 1;
        }
    }
    out.flush()?;
    Ok(rows)
}

/// ステップ記録 CSV を書き出す
pub fn write_metrics_csv(path: &Path, records: &[StepRecord]) -> Result<usize, ExportError> {
    let mut out = create(path)?;
    write_metric_rows(&mut out, records).map_err(io_error(path))?;
    Ok(records.len())
}

fn write_metric_rows<W: Write>(out: &mut W, records: &[StepRecord]) -> std::io::Result<()> {
    writeln!(out, "{}", METRICS_HEADER)?;
    for r in records {
        writeln!(
            out,
            "{},{},{},{},{:.3},{:.3},{},{:.3},{},{:.3}",
            r.timestamp, r.step, r.agent_id, r.profile, r.pos_x, r.pos_y, r.decision, r.threat_level, r.needs_help, r.speed
        )?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3;
    use crate::models::Profile;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("swarmsim-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_trajectory_csv_rows() {
        let path = temp_path("trajectory.csv");
        let a = Trajectory {
            points: vec![Vector3::ZERO, Vector3::new(1.0, 2.0, 3.0)],
        };
        let b = Trajectory { points: vec![Vector3::UNIT_Z] };
        let rows = write_trajectory_csv(&path, [(0, &a), (1, &b)]).unwrap();
        assert_eq!(rows, 3);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], TRAJECTORY_HEADER);
        assert_eq!(lines[2], "0,1,1.000000,2.000000,3.000000");
        assert_eq!(lines[3], "1,0,0.000000,0.000000,1.000000");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_metrics_csv_columns() {
        let path = temp_path("metrics.csv");
        let record = StepRecord {
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            step: 3,
            agent_id: 2,
            profile: Profile::Explorer,
            pos_x: 1.0,
            pos_y: 2.0,
            pos_z: 0.0,
            decision: "explore_active".to_string(),
            threat_level: 0.25,
            needs_help: false,
            speed: 1.0,
            energy: 90.0,
            operational: true,
        };
        write_metrics_csv(&path, &[record]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert_eq!(row.split(',').count(), METRICS_HEADER.split(',').count());
        assert!(row.contains(",explorer,"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unwritable_path_reports_error() {
        let dir = temp_path("as-dir");
        std::fs::create_dir_all(&dir).unwrap();
        // ディレクトリにはファイルとして書き込めない
        assert!(matches!(write_metrics_csv(&dir, &[]), Err(ExportError::Io { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
