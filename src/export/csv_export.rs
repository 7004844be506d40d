//! CSV export of dense/sparse per-sample data. Adapted from
//! `rust_daq::data::storage::CsvWriter`'s write-then-flush shape, but as a
//! one-shot dump over an already-closed, fully-decoded file rather than an
//! incremental per-sample writer.

use std::path::Path;

use crate::error::CoreResult;

#[cfg(feature = "export_csv")]
mod enabled {
    use super::*;
    use crate::container::cellset::CellSetFile;
    use crate::container::events::EventsFile;
    use crate::container::vesselset::VesselSetFile;
    use crate::error::CoreError;

    fn csv_err(path: &Path, e: csv::Error) -> CoreError {
        CoreError::file_io(e.to_string(), path)
    }

    pub fn export_cellset_traces(cellset: &CellSetFile, output_path: &Path) -> CoreResult<()> {
        let mut writer =
            csv::Writer::from_path(output_path).map_err(|e| csv_err(output_path, e))?;

        let mut header = vec!["Time (s)".to_string()];
        for i in 0..cellset.num_cells() {
            header.push(cellset.cell_name(i)?.to_string());
        }
        writer
            .write_record(&header)
            .map_err(|e| csv_err(output_path, e))?;

        let traces = (0..cellset.num_cells())
            .map(|i| cellset.get_trace(i))
            .collect::<CoreResult<Vec<_>>>()?;
        let timing = cellset.timing();
        for sample in 0..timing.num_samples {
            let t = timing.index_to_start_time(sample)?;
            let mut row = vec![format!("{:.6}", t.secs_since_epoch.to_f64())];
            for trace in &traces {
                row.push(trace.get(sample).unwrap_or(f32::NAN).to_string());
            }
            writer
                .write_record(&row)
                .map_err(|e| csv_err(output_path, e))?;
        }
        writer
            .flush()
            .map_err(|e| CoreError::file_io(e.to_string(), output_path))
    }

    pub fn export_vesselset_traces(vesselset: &VesselSetFile, output_path: &Path) -> CoreResult<()> {
        let mut writer =
            csv::Writer::from_path(output_path).map_err(|e| csv_err(output_path, e))?;

        let mut header = vec!["Time (s)".to_string()];
        for i in 0..vesselset.num_vessels() {
            header.push(vesselset.vessel_name(i)?.to_string());
        }
        writer
            .write_record(&header)
            .map_err(|e| csv_err(output_path, e))?;

        let traces = (0..vesselset.num_vessels())
            .map(|i| vesselset.get_trace(i))
            .collect::<CoreResult<Vec<_>>>()?;
        let timing = vesselset.timing();
        for sample in 0..timing.num_samples {
            let t = timing.index_to_start_time(sample)?;
            let mut row = vec![format!("{:.6}", t.secs_since_epoch.to_f64())];
            for trace in &traces {
                row.push(trace.get(sample).unwrap_or(f32::NAN).to_string());
            }
            writer
                .write_record(&row)
                .map_err(|e| csv_err(output_path, e))?;
        }
        writer
            .flush()
            .map_err(|e| CoreError::file_io(e.to_string(), output_path))
    }

    pub fn export_events(events: &EventsFile, output_path: &Path) -> CoreResult<()> {
        let mut writer =
            csv::Writer::from_path(output_path).map_err(|e| csv_err(output_path, e))?;
        writer
            .write_record(["Time (s)", "Channel", "Value"])
            .map_err(|e| csv_err(output_path, e))?;
        for name in events.channel_names() {
            let channel = events.read_channel(name)?;
            for &(t, value) in channel.points() {
                writer
                    .write_record(&[
                        format!("{:.6}", t.secs_since_epoch.to_f64()),
                        name.clone(),
                        value.to_string(),
                    ])
                    .map_err(|e| csv_err(output_path, e))?;
            }
        }
        writer
            .flush()
            .map_err(|e| CoreError::file_io(e.to_string(), output_path))
    }

    pub fn write_timestamp_column(values: &[f64], output_path: &Path) -> CoreResult<()> {
        let mut writer =
            csv::Writer::from_path(output_path).map_err(|e| csv_err(output_path, e))?;
        writer
            .write_record(["Time"])
            .map_err(|e| csv_err(output_path, e))?;
        for &v in values {
            writer
                .write_record([format!("{v:.6}")])
                .map_err(|e| csv_err(output_path, e))?;
        }
        writer
            .flush()
            .map_err(|e| CoreError::file_io(e.to_string(), output_path))
    }
}

#[cfg(not(feature = "export_csv"))]
mod disabled {
    use super::*;
    use crate::container::cellset::CellSetFile;
    use crate::container::events::EventsFile;
    use crate::container::vesselset::VesselSetFile;
    use crate::error::CoreError;

    fn not_enabled() -> CoreError {
        CoreError::user_input("export_csv feature is not enabled")
    }

    pub fn export_cellset_traces(_cellset: &CellSetFile, _output_path: &Path) -> CoreResult<()> {
        Err(not_enabled())
    }

    pub fn export_vesselset_traces(
        _vesselset: &VesselSetFile,
        _output_path: &Path,
    ) -> CoreResult<()> {
        Err(not_enabled())
    }

    pub fn export_events(_events: &EventsFile, _output_path: &Path) -> CoreResult<()> {
        Err(not_enabled())
    }

    pub fn write_timestamp_column(_values: &[f64], _output_path: &Path) -> CoreResult<()> {
        Err(not_enabled())
    }
}

#[cfg(feature = "export_csv")]
pub use enabled::{export_cellset_traces, export_events, export_vesselset_traces, write_timestamp_column};

#[cfg(not(feature = "export_csv"))]
pub use disabled::{export_cellset_traces, export_events, export_vesselset_traces, write_timestamp_column};
