//! Export surface: parameter structs mirroring the data an exporter needs,
//! dispatching into per-format submodules. CSV and TIFF are real; NWB is
//! gated behind `export_nwb`; MP4 always reports `CoreError::Algorithm`
//! since pixel-level video compression is not implemented.

pub mod csv_export;
pub mod mp4_export;
pub mod nwb_export;
pub mod tiff_export;

use std::path::PathBuf;

use crate::container::cellset::CellSetFile;
use crate::container::events::EventsFile;
use crate::container::movie::MovieFile;
use crate::container::vesselset::VesselSetFile;
use crate::error::{CoreError, CoreResult};
use crate::time::Time;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovieExportFormat {
    Nwb,
    Tiff,
    Mp4,
}

pub struct MovieExporterParams {
    pub sources: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub format: MovieExportFormat,
}

/// What a movie's exported frame timestamps are expressed relative to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampReference {
    /// Seconds since the first valid frame across all sources.
    FirstDataItem,
    /// Seconds since the Unix epoch.
    UnixEpoch,
    /// The raw hardware tick count embedded in each frame's header band.
    Tsc,
}

pub struct MovieTimestampExporterParams {
    pub sources: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub relative_to: TimestampReference,
}

pub struct CellSetExporterParams {
    pub source: PathBuf,
    pub output_path: PathBuf,
}

pub struct VesselSetExporterParams {
    pub source: PathBuf,
    pub output_path: PathBuf,
}

pub struct EventsExporterParams {
    pub source: PathBuf,
    pub output_path: PathBuf,
}

pub struct GpioExporterParams {
    pub source: PathBuf,
    pub output_path: PathBuf,
}

/// No encoder behind this yet: nVision tracking data is produced by an
/// external collaborator this crate does not implement.
pub struct NVisionMovieTrackingExporterParams {
    pub sources: Vec<PathBuf>,
    pub output_path: PathBuf,
}

fn open_movies(paths: &[PathBuf]) -> CoreResult<Vec<MovieFile>> {
    paths.iter().map(MovieFile::open).collect()
}

pub fn run_movie_exporter(params: &MovieExporterParams) -> CoreResult<()> {
    let movies = open_movies(&params.sources)?;
    match params.format {
        MovieExportFormat::Tiff => tiff_export::export_movie(&movies, &params.output_path),
        MovieExportFormat::Nwb => nwb_export::export_movie(
            &movies,
            &params.output_path,
            "mosaic-store export",
            "exported by mosaic-store",
        ),
        MovieExportFormat::Mp4 => mp4_export::export_movie(&movies, &params.output_path),
    }
}

fn first_valid_time(movies: &[MovieFile]) -> CoreResult<Time> {
    for movie in movies {
        let timing = movie.timing();
        for index in 0..timing.num_samples {
            if timing.is_valid(index) {
                return timing.index_to_start_time(index);
            }
        }
    }
    Err(CoreError::user_input("no valid frames to export timestamps from"))
}

/// One timestamp per valid frame, in source order, expressed per
/// `relative_to`: `UnixEpoch` is seconds since the Unix epoch,
/// `FirstDataItem` is seconds since the first valid frame across all
/// sources, and `Tsc` is the raw hardware tick count stored in the frame
/// header band.
pub fn export_movie_timestamps(params: &MovieTimestampExporterParams) -> CoreResult<Vec<f64>> {
    let movies = open_movies(&params.sources)?;
    let first_data_item = first_valid_time(&movies)?;
    let mut out = Vec::new();
    for movie in &movies {
        let timing = movie.timing();
        for index in 0..timing.num_samples {
            if !timing.is_valid(index) {
                continue;
            }
            let value = match params.relative_to {
                TimestampReference::UnixEpoch => {
                    timing.index_to_start_time(index)?.secs_since_epoch.to_f64()
                }
                TimestampReference::FirstDataItem => {
                    let t = timing.index_to_start_time(index)?;
                    t.checked_sub(first_data_item)?.to_f64()
                }
                TimestampReference::Tsc => movie.get_frame_timestamp(index)? as f64,
            };
            out.push(value);
        }
    }
    csv_export::write_timestamp_column(&out, &params.output_path)?;
    Ok(out)
}

pub fn run_cellset_trace_exporter(params: &CellSetExporterParams) -> CoreResult<()> {
    let cellset = CellSetFile::open(&params.source)?;
    csv_export::export_cellset_traces(&cellset, &params.output_path)
}

pub fn run_vesselset_trace_exporter(params: &VesselSetExporterParams) -> CoreResult<()> {
    let vesselset = VesselSetFile::open(&params.source)?;
    csv_export::export_vesselset_traces(&vesselset, &params.output_path)
}

pub fn run_events_exporter(params: &EventsExporterParams) -> CoreResult<()> {
    let events = EventsFile::open(&params.source)?;
    csv_export::export_events(&events, &params.output_path)
}

pub fn run_gpio_exporter(params: &GpioExporterParams) -> CoreResult<()> {
    let gpio = EventsFile::open(&params.source)?;
    csv_export::export_events(&gpio, &params.output_path)
}
