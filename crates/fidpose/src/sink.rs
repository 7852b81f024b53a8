//! Result sinks: the `id,tx,ty,tz,rx,ry,rz` CSV table and the JSON report.

use std::io::{self, BufRead, Write};

use crate::result::{FrameResult, PoseRecord, RunReport};

pub const CSV_HEADER: &str = "id,tx,ty,tz,rx,ry,rz";

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Streams pose rows as CSV; the header is written on construction.
pub struct CsvSink<W: Write> {
    out: W,
    rows: usize,
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "{CSV_HEADER}")?;
        Ok(Self { out, rows: 0 })
    }

    pub fn write_record(&mut self, r: &PoseRecord) -> io::Result<()> {
        let [tx, ty, tz] = r.tvec;
        let [rx, ry, rz] = r.rvec;
        writeln!(self.out, "{},{tx},{ty},{tz},{rx},{ry},{rz}", r.id)?;
        self.rows += 1;
        Ok(())
    }

    pub fn write_frame(&mut self, frame: &FrameResult) -> io::Result<()> {
        frame.records().try_for_each(|r| self.write_record(&r))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Read pose rows written by [`CsvSink`]. Extra columns after the seventh
/// are ignored.
pub fn read_pose_csv<R: BufRead>(input: R) -> Result<Vec<PoseRecord>, SinkError> {
    let mut records = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 7 {
            return Err(SinkError::Parse {
                line: line_no,
                message: format!("expected 7 columns, got {}", fields.len()),
            });
        }
        let id = fields[0].parse::<u32>().map_err(|e| SinkError::Parse {
            line: line_no,
            message: format!("id `{}`: {e}", fields[0]),
        })?;
        let mut values = [0.0; 6];
        for (v, field) in values.iter_mut().zip(&fields[1..7]) {
            *v = field.parse::<f64>().map_err(|e| SinkError::Parse {
                line: line_no,
                message: format!("value `{field}`: {e}"),
            })?;
        }
        records.push(PoseRecord {
            id,
            tvec: [values[0], values[1], values[2]],
            rvec: [values[3], values[4], values[5]],
        });
    }
    Ok(records)
}

pub fn write_report_json<W: Write>(out: W, report: &RunReport) -> Result<(), SinkError> {
    serde_json::to_writer_pretty(out, report)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_round_trips_rows() {
        let rows = [
            PoseRecord {
                id: 3,
                tvec: [0.15, -0.002, 1.0],
                rvec: [3.1, 0.01, -0.02],
            },
            PoseRecord {
                id: 41,
                tvec: [-0.15, 0.0, 0.998],
                rvec: [-3.13, 0.0, 0.0],
            },
        ];
        let mut sink = CsvSink::new(Vec::new()).expect("header");
        for r in &rows {
            sink.write_record(r).expect("row");
        }
        assert_eq!(sink.rows(), 2);
        let bytes = sink.finish().expect("flush");
        let text = String::from_utf8(bytes).expect("utf8");
        assert!(text.starts_with("id,tx,ty,tz,rx,ry,rz\n3,0.15,-0.002,1,"));

        let back = read_pose_csv(text.as_bytes()).expect("parse");
        assert_eq!(back, rows);
    }

    #[test]
    fn malformed_row_reports_line() {
        let text = "id,tx,ty,tz,rx,ry,rz\n1,0,0,1,0,0,0\n2,0,0\n";
        match read_pose_csv(text.as_bytes()) {
            Err(SinkError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
