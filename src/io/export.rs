//! CSV export for dispatch hourly step records.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::dispatch::StepRecord;

/// Schema v1 column header for hourly dispatch CSV export.
const HEADER: &str = "t,pv_kw,load_kw,soc_kwh,direct_pv_kw,charge_kw,\
                       discharge_total_kw,discharge_peak_kw,discharge_pv_kw,\
                       charge_from_pv_kw,charge_from_grid_kw,grid_import_kw,\
                       grid_export_kw,curtailment_kw";

/// Exports a dispatch run's hourly step records to a CSV file at `path`.
///
/// Writes a header row followed by one data row per step. Produces
/// deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_hourly_csv(rows: &[StepRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_hourly_csv(rows, buf)
}

/// Writes hourly dispatch step records as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_hourly_csv(rows: &[StepRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in rows {
        wtr.write_record(&[
            r.t.to_string(),
            format!("{:.4}", r.pv_kw),
            format!("{:.4}", r.load_kw),
            format!("{:.4}", r.soc_kwh),
            format!("{:.4}", r.flows.direct_pv_kw),
            format!("{:.4}", r.flows.charge_kw),
            format!("{:.4}", r.flows.discharge_total_kw),
            format!("{:.4}", r.flows.discharge_peak_kw),
            format!("{:.4}", r.flows.discharge_pv_kw),
            format!("{:.4}", r.flows.charge_from_pv_kw),
            format!("{:.4}", r.flows.charge_from_grid_kw),
            format!("{:.4}", r.flows.grid_import_kw),
            format!("{:.4}", r.flows.grid_export_kw),
            format!("{:.4}", r.flows.curtailment_kw),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::StepFlowsDto;

    fn make_row(t: usize) -> StepRecord {
        StepRecord {
            t,
            pv_kw: 10.0,
            load_kw: 8.0,
            soc_kwh: 150.0,
            flows: StepFlowsDto {
                direct_pv_kw: 8.0,
                charge_kw: 2.0,
                discharge_total_kw: 0.0,
                discharge_peak_kw: 0.0,
                discharge_pv_kw: 0.0,
                charge_from_pv_kw: 2.0,
                charge_from_grid_kw: 0.0,
                grid_import_kw: 0.0,
                grid_export_kw: 0.0,
                curtailment_kw: 0.0,
            },
        }
    }

    #[test]
    fn header_matches_schema_v1() {
        let rows = vec![make_row(0)];
        let mut buf = Vec::new();
        write_hourly_csv(&rows, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let first_line = output.lines().next().unwrap();
        assert_eq!(
            first_line,
            "t,pv_kw,load_kw,soc_kwh,direct_pv_kw,charge_kw,\
             discharge_total_kw,discharge_peak_kw,discharge_pv_kw,\
             charge_from_pv_kw,charge_from_grid_kw,grid_import_kw,\
             grid_export_kw,curtailment_kw"
        );
    }

    #[test]
    fn row_count_matches_step_count() {
        let rows: Vec<StepRecord> = (0..24).map(make_row).collect();
        let mut buf = Vec::new();
        write_hourly_csv(&rows, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert_eq!(output.lines().count(), 25);
    }

    #[test]
    fn deterministic_output() {
        let rows: Vec<StepRecord> = (0..5).map(make_row).collect();
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_hourly_csv(&rows, &mut buf1).unwrap();
        write_hourly_csv(&rows, &mut buf2).unwrap();
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn round_trip_parseable() {
        let rows: Vec<StepRecord> = (0..3).map(make_row).collect();
        let mut buf = Vec::new();
        write_hourly_csv(&rows, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().cloned().unwrap();
        assert_eq!(headers.len(), 14);

        let mut row_count = 0;
        for record in rdr.records() {
            let rec = record.unwrap();
            for field in rec.iter() {
                let val: Result<f64, _> = field.parse::<f64>().or_else(|_| field.parse::<usize>().map(|v| v as f64));
                assert!(val.is_ok(), "every column should parse numerically");
            }
            row_count += 1;
        }
        assert_eq!(row_count, 3);
    }
}
