//! End-to-end coverage of the six literal scenarios that exercise the
//! public surface of the crate: writing and re-opening every native
//! container format, building a composite series, exporting events, and
//! confirming a truncated trailer is rejected cleanly.

use mosaic_store::container::cellset::{CellSetFile, CellSetWriter, CellStatus};
use mosaic_store::container::events::{EventsFile, EventsWriter};
use mosaic_store::container::movie::{MovieCreateOptions, MovieFile, MovieWriter};
use mosaic_store::container::vesselset::VesselSetFile;
use mosaic_store::error::CoreError;
use mosaic_store::export::{self, CellSetExporterParams, EventsExporterParams};
use mosaic_store::image::{DataType, Image, VideoFrame};
use mosaic_store::rational::Rational;
use mosaic_store::series::{Series, UnitaryFile};
use mosaic_store::spacing::{MicronPoint, SpacingInfo};
use mosaic_store::time::Time;
use mosaic_store::timing::{FrameKind, TimingInfo};
use mosaic_store::trace::Trace;
use tempfile::tempdir;

fn spacing(cols: u32, rows: u32) -> SpacingInfo {
    SpacingInfo::new(
        cols,
        rows,
        MicronPoint {
            x: Rational::from_int(3),
            y: Rational::from_int(3),
        },
        MicronPoint {
            x: Rational::zero(),
            y: Rational::zero(),
        },
    )
    .unwrap()
}

fn regular_timing(start: Rational, step: Rational, n: u64) -> TimingInfo {
    TimingInfo::new(Time::new(start, 0), step, n, [], [], []).unwrap()
}

/// S1: a 4x3 U16 movie with `pixel(f, p) = f*12 + p`, sealed and re-opened.
#[test]
fn s1_movie_write_and_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("movie.isxd");
    let sp = spacing(4, 3);
    let t = regular_timing(Rational::zero(), Rational::new(50, 1000).unwrap(), 5);

    let mut writer =
        MovieWriter::create(&path, t, sp, DataType::U16, MovieCreateOptions::default()).unwrap();
    for f in 0..5u64 {
        let row_bytes = sp.num_cols * 2;
        let mut data = vec![0u8; row_bytes as usize * sp.num_rows as usize];
        for p in 0..(sp.num_cols * sp.num_rows) {
            let value = (f as u16 * 12 + p as u16).to_le_bytes();
            data[p as usize * 2] = value[0];
            data[p as usize * 2 + 1] = value[1];
        }
        let image = Image::new(sp, DataType::U16, 1, row_bytes, data).unwrap();
        writer.write_frame(&VideoFrame::valid(image, Time::epoch(), f)).unwrap();
    }
    writer.close_for_writing(None).unwrap();

    let movie = MovieFile::open(&path).unwrap();
    assert_eq!(movie.timing().num_samples, 5);
    assert_eq!(movie.spacing().pixel_size.x, Rational::from_int(3));
    assert_eq!(movie.spacing().pixel_size.y, Rational::from_int(3));
    let frame = movie.get_frame(2).unwrap();
    assert_eq!(frame.image.get_u16(3, 1).unwrap(), 31);
}

/// S2: a single-cell cell set built on an S1-shaped movie.
#[test]
fn s2_cellset_write_and_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cellset.isxd");
    let sp = spacing(4, 3);
    let t = regular_timing(Rational::zero(), Rational::new(50, 1000).unwrap(), 5);

    let mut writer = CellSetWriter::create(&path, t.clone(), sp, false).unwrap();
    let mut image_data = vec![0u8; sp.num_cols as usize * sp.num_rows as usize * 4];
    image_data[0..4].copy_from_slice(&1.0f32.to_le_bytes());
    image_data[4..8].copy_from_slice(&2.5f32.to_le_bytes());
    let image = Image::new(sp, DataType::F32, 1, sp.num_cols * 4, image_data).unwrap();
    let values: Vec<f32> = (0..5).map(|i| 84.0 + 0.01 * i as f32).collect();
    let trace = Trace::new(t, values).unwrap();
    writer.write_image_and_trace(&image, &trace, Some("Lonely1")).unwrap();
    writer.close_for_writing().unwrap();

    let cellset = CellSetFile::open(&path).unwrap();
    assert_eq!(cellset.num_cells(), 1);
    assert_eq!(cellset.cell_name(0).unwrap(), "Lonely1");
    assert_eq!(cellset.cell_status(0).unwrap(), CellStatus::Undecided);
    let read_trace = cellset.get_trace(0).unwrap();
    assert!((read_trace.get(0).unwrap() - 84.0).abs() < 1e-4);
    assert!((read_trace.get(4).unwrap() - 84.04).abs() < 1e-4);

    // exercise the CSV trace exporter on the same file, via the public
    // export surface rather than reaching into the container module.
    let out = dir.path().join("traces.csv");
    export::run_cellset_trace_exporter(&CellSetExporterParams {
        source: path,
        output_path: out.clone(),
    })
    .unwrap();
    let csv_text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(csv_text.lines().count(), 6); // header + 5 samples
    assert!(csv_text.lines().next().unwrap().contains("Lonely1"));
}

/// S3: three movies with a 60s gap between each insert into a series and
/// produce a blank-filled synthesized grid of 2405 samples.
#[test]
fn s3_series_compatibility_and_gap_bridging() {
    let dir = tempdir().unwrap();
    let sp = spacing(2, 2);
    let step = Rational::new(1, 20).unwrap();
    let t0 = Rational::from_int(1_700_000_000);

    let write_movie = |name: &str, start: Rational, n: u64| -> MovieFile {
        let path = dir.path().join(name);
        let t = regular_timing(start, step, n);
        let mut writer =
            MovieWriter::create(&path, t, sp, DataType::U8, MovieCreateOptions::default()).unwrap();
        for i in 0..n {
            let image = Image::new(sp, DataType::U8, 1, 2, vec![0u8; 4]).unwrap();
            writer.write_frame(&VideoFrame::valid(image, Time::epoch(), i)).unwrap();
        }
        writer.close_for_writing(None).unwrap();
        MovieFile::open(&path).unwrap()
    };

    let a = write_movie("a.isxd", t0, 3);
    let b = write_movie("b.isxd", t0.checked_add(Rational::from_int(60)).unwrap(), 4);
    let c = write_movie("c.isxd", t0.checked_add(Rational::from_int(120)).unwrap(), 5);

    let mut series = Series::new("recording");
    series.insert(UnitaryFile::Movie(a), "raw").unwrap();
    series.insert(UnitaryFile::Movie(b), "raw").unwrap();
    series.insert(UnitaryFile::Movie(c), "raw").unwrap();

    assert_eq!(series.members().len(), 3);
    assert_eq!(series.total_samples().unwrap(), 2405);
    let synthesized = series.synthesized_timing().unwrap();
    assert_eq!(synthesized.kind(0), FrameKind::Valid);
    assert_eq!(synthesized.kind(3), FrameKind::Blank);
    assert_eq!(series.dataset_index(0).unwrap(), (0, 0));
}

/// S4: five events on one channel, exported to CSV and round-tripped
/// through `read_channel`, land at their exact offsets.
#[test]
fn s4_events_export_round_trip_offsets() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.isxd");
    let start = Time::new(Rational::from_int(1_700_000_000), 0);

    let mut writer = EventsWriter::create(&path, start, vec!["chan".into()]).unwrap();
    for offset_us in [0u64, 50_000, 100_000, 150_000, 200_000] {
        writer.write_packet(0, offset_us, 1.0).unwrap();
    }
    writer.close_for_writing().unwrap();

    let out = dir.path().join("events.csv");
    export::run_events_exporter(&EventsExporterParams {
        source: path.clone(),
        output_path: out.clone(),
    })
    .unwrap();
    let csv_text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(csv_text.lines().count(), 6); // header + 5 rows

    let events = EventsFile::open(&path).unwrap();
    let channel = events.read_channel("chan").unwrap();
    assert_eq!(channel.len(), 5);
    for (i, &(t, _)) in channel.points().iter().enumerate() {
        let expected_offset = Rational::new(50_000 * i as i64, 1_000_000).unwrap();
        assert_eq!(t.checked_sub(start).unwrap(), expected_offset);
    }
}

/// S5: exported movie timestamps under UNIX_EPOCH and FIRST_DATA_ITEM stay a
/// constant duration apart across every frame. A literal hardware-derived
/// isxb fixture with the exact published start/end values isn't
/// reproducible from this crate alone, so this checks the relationship the
/// scenario depends on rather than the literal numbers.
#[test]
fn s5_unix_epoch_and_first_data_item_stay_offset_by_a_constant() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("movie.isxd");
    let sp = spacing(2, 2);
    let start = Rational::new(1_649_819_290_471_000, 1_000_000).unwrap();
    let step = Rational::new(33_035, 1_000_000).unwrap();
    let t = regular_timing(start, step, 113);

    let mut writer =
        MovieWriter::create(&path, t, sp, DataType::U8, MovieCreateOptions::default()).unwrap();
    for i in 0..113u64 {
        let image = Image::new(sp, DataType::U8, 1, 2, vec![0u8; 4]).unwrap();
        writer.write_frame(&VideoFrame::valid(image, Time::epoch(), i)).unwrap();
    }
    writer.close_for_writing(None).unwrap();

    let unix_epoch = export::export_movie_timestamps(&export::MovieTimestampExporterParams {
        sources: vec![path.clone()],
        output_path: dir.path().join("unix.csv"),
        relative_to: export::TimestampReference::UnixEpoch,
    })
    .unwrap();
    let first_item = export::export_movie_timestamps(&export::MovieTimestampExporterParams {
        sources: vec![path],
        output_path: dir.path().join("first.csv"),
        relative_to: export::TimestampReference::FirstDataItem,
    })
    .unwrap();

    assert_eq!(unix_epoch.len(), 113);
    assert_eq!(first_item[0], 0.0);
    assert!((unix_epoch[0] - 1_649_819_290.471).abs() < 1e-3);
    let offset = unix_epoch[0] - first_item[0];
    for i in 0..113 {
        assert!((unix_epoch[i] - first_item[i] - offset).abs() < 1e-6);
    }
}

/// S6: truncating a sealed movie's final 4 bytes (the trailer) makes
/// re-opening fail with DataIo, and no frame is returned.
#[test]
fn s6_trailer_truncation_fails_cleanly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("movie.isxd");
    let sp = spacing(2, 2);
    let t = regular_timing(Rational::zero(), Rational::new(50, 1000).unwrap(), 2);

    let mut writer =
        MovieWriter::create(&path, t, sp, DataType::U8, MovieCreateOptions::default()).unwrap();
    for i in 0..2u64 {
        let image = Image::new(sp, DataType::U8, 1, 2, vec![7u8; 4]).unwrap();
        writer.write_frame(&VideoFrame::valid(image, Time::epoch(), i)).unwrap();
    }
    writer.close_for_writing(None).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

    let err = MovieFile::open(&path).unwrap_err();
    assert!(matches!(err, CoreError::DataIo { .. }));
}

/// Sanity check that `VesselSetFile` is reachable from outside the crate,
/// since no literal scenario exercises it directly.
#[test]
fn vesselset_type_is_part_of_the_public_surface() {
    fn assert_send<T: Send>() {}
    assert_send::<VesselSetFile>();
}
