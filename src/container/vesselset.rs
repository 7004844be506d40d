//! VesselSet file: a projection image, a geometry line, a primary trace,
//! and a subtype-specific extra trace per vessel.
//!
//! Grounded on `examples/original_source/test/VesselSetFileTest.cpp` for
//! the `writeVesselData(index, image, trace, name?)` write contract and
//! `VesselSetTest.cpp`'s `VesselLine`/`Contour_t` of pixel endpoints, and
//! on `api/isxMetadata.h` for the `VesselSetType_t`/`VesselSetUnits_t`/
//! `VesselDiameterEstimationMethod_t`/`ProjectionType` vocabulary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::container::envelope::{EnvelopeReader, EnvelopeWriter};
use crate::error::{CoreError, CoreResult};
use crate::extra_properties::ExtraProperties;
use crate::image::{DataType, Image};
use crate::spacing::{PixelPoint, SpacingInfo};
use crate::timing::TimingInfo;
use crate::trace::Trace;

const VESSELSET_TYPE_TAG: &str = "vessel set";
const CURRENT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VesselStatus {
    Accepted,
    Undecided,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VesselSetType {
    VesselDiameter,
    RbcVelocity,
}

/// The pixel-coordinate geometry a vessel's diameter or velocity is
/// measured along: two endpoints for a diameter line, or two parallel
/// chords (four points) for an RBC-velocity line-of-estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VesselLine {
    points: Vec<PixelPoint>,
}

impl VesselLine {
    pub fn diameter(start: PixelPoint, end: PixelPoint) -> Self {
        Self {
            points: vec![start, end],
        }
    }

    pub fn velocity(chord_a: (PixelPoint, PixelPoint), chord_b: (PixelPoint, PixelPoint)) -> Self {
        Self {
            points: vec![chord_a.0, chord_a.1, chord_b.0, chord_b.1],
        }
    }

    pub fn points(&self) -> &[PixelPoint] {
        &self.points
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct VesselHeaderEntry {
    name: String,
    status: VesselStatus,
    line: VesselLine,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct VesselSetHeaderJson {
    version: u32,
    #[serde(rename = "type")]
    type_tag: String,
    vessel_set_type: VesselSetType,
    timing_info: TimingInfo,
    spacing_info: SpacingInfo,
    extra_properties: serde_json::Value,
    vessels: Vec<VesselHeaderEntry>,
    has_correlation_volumes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_size: Option<(u32, u32)>,
}

fn default_vessel_name(index: usize, num_vessels: usize) -> String {
    let width = num_vessels.saturating_sub(1).to_string().len().max(1);
    format!("V{:0width$}", index, width = width)
}

pub struct VesselSetWriter {
    envelope: EnvelopeWriter,
    timing: TimingInfo,
    spacing: SpacingInfo,
    vessel_set_type: VesselSetType,
    extra_properties: ExtraProperties,
    vessels: Vec<VesselHeaderEntry>,
    correlation_size: Option<(u32, u32)>,
}

impl VesselSetWriter {
    pub fn create(
        path: impl AsRef<Path>,
        timing: TimingInfo,
        spacing: SpacingInfo,
        vessel_set_type: VesselSetType,
    ) -> CoreResult<Self> {
        Ok(Self {
            envelope: EnvelopeWriter::create(path)?,
            timing,
            spacing,
            vessel_set_type,
            extra_properties: ExtraProperties::default(),
            vessels: Vec::new(),
            correlation_size: None,
        })
    }

    pub fn set_extra_properties(&mut self, properties: ExtraProperties) {
        self.extra_properties = properties;
    }

    /// Writes the projection image, geometry line, primary trace and the
    /// extra trace every vessel carries: the line-of-estimate center trace
    /// for `VesselDiameter` sets, the direction trace for `RbcVelocity`
    /// sets. Vessels must be written in index order.
    pub fn write_vessel_data(
        &mut self,
        image: &Image,
        line: VesselLine,
        trace: &Trace,
        extra_trace: Option<&Trace>,
        correlations: Option<&[f32]>,
        name: Option<&str>,
    ) -> CoreResult<usize> {
        if image.spacing() != &self.spacing || image.data_type() != DataType::F32 {
            return Err(CoreError::user_input(
                "vessel projection image does not match the vessel set's SpacingInfo/DataType",
            ));
        }
        if trace.timing().num_samples != self.timing.num_samples {
            return Err(CoreError::user_input(
                "vessel trace TimingInfo does not match the vessel set's TimingInfo",
            ));
        }
        let expected_points = match self.vessel_set_type {
            VesselSetType::VesselDiameter => 2,
            VesselSetType::RbcVelocity => 4,
        };
        if line.points().len() != expected_points {
            return Err(CoreError::user_input(format!(
                "{:?} vessels require a {}-point line, got {}",
                self.vessel_set_type,
                expected_points,
                line.points().len()
            )));
        }
        let Some(extra_trace) = extra_trace else {
            return Err(CoreError::user_input(match self.vessel_set_type {
                VesselSetType::VesselDiameter => "vessel diameter vessels require a center extra trace",
                VesselSetType::RbcVelocity => "RBC velocity vessels require a direction extra trace",
            }));
        };
        if extra_trace.timing().num_samples != self.timing.num_samples {
            return Err(CoreError::user_input(
                "vessel extra trace TimingInfo does not match the vessel set's TimingInfo",
            ));
        }

        self.envelope.write_payload(image.raw())?;
        for &v in trace.values() {
            self.envelope.write_payload(&v.to_le_bytes())?;
        }
        for &v in extra_trace.values() {
            self.envelope.write_payload(&v.to_le_bytes())?;
        }
        if let Some(corr) = correlations {
            let (w, h) = self.correlation_size.get_or_insert((
                (corr.len() as f64).sqrt().round() as u32,
                (corr.len() as f64).sqrt().round() as u32,
            ));
            if (*w as usize) * (*h as usize) != corr.len() {
                return Err(CoreError::user_input(
                    "correlation volume size is inconsistent across vessels",
                ));
            }
            for &v in corr {
                self.envelope.write_payload(&v.to_le_bytes())?;
            }
        }

        let index = self.vessels.len();
        self.vessels.push(VesselHeaderEntry {
            name: name.map(str::to_owned).unwrap_or_default(),
            status: VesselStatus::Undecided,
            line,
        });
        Ok(index)
    }

    pub fn close_for_writing(mut self) -> CoreResult<PathBuf> {
        let num_vessels = self.vessels.len();
        for (i, v) in self.vessels.iter_mut().enumerate() {
            if v.name.is_empty() {
                v.name = default_vessel_name(i, num_vessels);
            }
        }
        let path = self.envelope.path().to_path_buf();
        let header = VesselSetHeaderJson {
            version: CURRENT_VERSION,
            type_tag: VESSELSET_TYPE_TAG.to_string(),
            vessel_set_type: self.vessel_set_type,
            timing_info: self.timing,
            spacing_info: self.spacing,
            extra_properties: self.extra_properties.to_value().clone(),
            vessels: self.vessels,
            has_correlation_volumes: self.correlation_size.is_some(),
            correlation_size: self.correlation_size,
        };
        self.envelope.seal(&header)?;
        Ok(path)
    }
}

pub struct VesselSetFile {
    reader: EnvelopeReader,
    header: VesselSetHeaderJson,
    image_bytes: u64,
    trace_bytes: u64,
    extra_trace_bytes: u64,
    correlation_bytes: u64,
    record_bytes: u64,
}

impl VesselSetFile {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let reader = EnvelopeReader::open(path)?;
        let header: VesselSetHeaderJson = reader.header()?;
        if header.version != CURRENT_VERSION {
            return Err(CoreError::data_io_at(
                format!("unknown VesselSet version {}", header.version),
                path,
            ));
        }
        if header.type_tag != VESSELSET_TYPE_TAG {
            return Err(CoreError::data_io_at(
                format!("expected vessel set type, found '{}'", header.type_tag),
                path,
            ));
        }
        let image_bytes =
            header.spacing_info.num_cols as u64 * header.spacing_info.num_rows as u64 * 4;
        let trace_bytes = header.timing_info.num_samples * 4;
        // Every vessel carries an extra trace: center for VesselDiameter,
        // direction for RbcVelocity.
        let extra_trace_bytes = trace_bytes;
        let correlation_bytes = header
            .correlation_size
            .map(|(w, h)| w as u64 * h as u64 * 4)
            .unwrap_or(0);
        let record_bytes = image_bytes + trace_bytes + extra_trace_bytes + correlation_bytes;
        let expected = record_bytes * header.vessels.len() as u64;
        if reader.payload().len() as u64 != expected {
            return Err(CoreError::data_io_at(
                "vessel set payload size does not match declared vessel count",
                path,
            ));
        }
        Ok(Self {
            reader,
            header,
            image_bytes,
            trace_bytes,
            extra_trace_bytes,
            correlation_bytes,
            record_bytes,
        })
    }

    pub fn num_vessels(&self) -> usize {
        self.header.vessels.len()
    }

    pub fn vessel_set_type(&self) -> VesselSetType {
        self.header.vessel_set_type
    }

    pub fn timing(&self) -> &TimingInfo {
        &self.header.timing_info
    }

    pub fn spacing(&self) -> &SpacingInfo {
        &self.header.spacing_info
    }

    pub fn extra_properties(&self) -> CoreResult<ExtraProperties> {
        ExtraProperties::from_value(self.header.extra_properties.clone())
    }

    pub fn vessel_name(&self, index: usize) -> CoreResult<&str> {
        self.header
            .vessels
            .get(index)
            .map(|v| v.name.as_str())
            .ok_or_else(|| CoreError::user_input("vessel index out of range"))
    }

    pub fn vessel_status(&self, index: usize) -> CoreResult<VesselStatus> {
        self.header
            .vessels
            .get(index)
            .map(|v| v.status)
            .ok_or_else(|| CoreError::user_input("vessel index out of range"))
    }

    pub fn line_endpoints(&self, index: usize) -> CoreResult<VesselLine> {
        self.header
            .vessels
            .get(index)
            .map(|v| v.line.clone())
            .ok_or_else(|| CoreError::user_input("vessel index out of range"))
    }

    fn record_start(&self, index: usize) -> CoreResult<u64> {
        if index >= self.header.vessels.len() {
            return Err(CoreError::user_input("vessel index out of range"));
        }
        Ok(index as u64 * self.record_bytes)
    }

    pub fn get_image(&self, index: usize) -> CoreResult<Image> {
        let start = self.record_start(index)? as usize;
        let bytes = &self.reader.payload()[start..start + self.image_bytes as usize];
        let row_bytes = self.header.spacing_info.num_cols * 4;
        Image::new(
            self.header.spacing_info,
            DataType::F32,
            1,
            row_bytes,
            bytes.to_vec(),
        )
    }

    fn read_f32_trace(&self, bytes: &[u8]) -> Trace {
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Trace::new(self.header.timing_info.clone(), values)
            .expect("trace length derived from TimingInfo.num_samples")
    }

    pub fn get_trace(&self, index: usize) -> CoreResult<Trace> {
        let start = self.record_start(index)? as usize + self.image_bytes as usize;
        let bytes = &self.reader.payload()[start..start + self.trace_bytes as usize];
        Ok(self.read_f32_trace(bytes))
    }

    /// The extra trace every vessel carries: the line-of-estimate center
    /// trace for `VesselDiameter` sets, the direction trace for
    /// `RbcVelocity` sets.
    pub fn get_extra_trace(&self, index: usize) -> CoreResult<Option<Trace>> {
        if self.extra_trace_bytes == 0 {
            return Ok(None);
        }
        let start = self.record_start(index)? as usize
            + self.image_bytes as usize
            + self.trace_bytes as usize;
        let bytes = &self.reader.payload()[start..start + self.extra_trace_bytes as usize];
        Ok(Some(self.read_f32_trace(bytes)))
    }

    pub fn get_correlation_volume(&self, index: usize) -> CoreResult<Option<Image>> {
        let Some((w, h)) = self.header.correlation_size else {
            return Ok(None);
        };
        let start = self.record_start(index)? as usize
            + self.image_bytes as usize
            + self.trace_bytes as usize
            + self.extra_trace_bytes as usize;
        let bytes = &self.reader.payload()[start..start + self.correlation_bytes as usize];
        let corr_spacing = SpacingInfo::new(
            w,
            h,
            self.header.spacing_info.pixel_size,
            self.header.spacing_info.top_left,
        )?;
        Ok(Some(Image::new(
            corr_spacing,
            DataType::F32,
            1,
            w * 4,
            bytes.to_vec(),
        )?))
    }
}

/// Per-vessel bookkeeping surfaced under `idps.vesselset.*`: windows the
/// estimation algorithm flagged as clipped, without significant signal, or
/// where the measured direction flipped mid-recording.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VesselSetFlags {
    pub clipped_vessels: HashMap<String, Vec<u64>>,
    pub no_significant_vessels: HashMap<String, Vec<u64>>,
    pub direction_changed_vessels: HashMap<String, Vec<u64>>,
    pub invalid_windows: HashMap<String, Vec<(u64, u64)>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::Rational;
    use crate::spacing::MicronPoint;
    use crate::time::Time;
    use tempfile::tempdir;

    fn spacing() -> SpacingInfo {
        SpacingInfo::new(
            4,
            3,
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

    fn timing() -> TimingInfo {
        TimingInfo::new(
            Time::new(Rational::from_int(0), 0),
            Rational::new(50, 1000).unwrap(),
            5,
            [],
            [],
            [],
        )
        .unwrap()
    }

    fn image(sp: SpacingInfo) -> Image {
        let mut data = vec![0u8; sp.num_cols as usize * sp.num_rows as usize * 4];
        data[0..4].copy_from_slice(&1.0f32.to_le_bytes());
        data[4..8].copy_from_slice(&2.5f32.to_le_bytes());
        Image::new(sp, DataType::F32, 1, sp.num_cols * 4, data).unwrap()
    }

    #[test]
    fn diameter_vessel_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vessels.isxd");
        let sp = spacing();
        let t = timing();
        let mut w = VesselSetWriter::create(&path, t.clone(), sp, VesselSetType::VesselDiameter).unwrap();
        let line = VesselLine::diameter(
            PixelPoint { col: 0, row: 0 },
            PixelPoint { col: 1, row: 1 },
        );
        let trace = Trace::new(t.clone(), vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let center = Trace::new(t, vec![0.5; 5]).unwrap();
        w.write_vessel_data(&image(sp), line.clone(), &trace, Some(&center), None, Some("testName"))
            .unwrap();
        w.close_for_writing().unwrap();

        let vs = VesselSetFile::open(&path).unwrap();
        assert_eq!(vs.num_vessels(), 1);
        assert_eq!(vs.vessel_name(0).unwrap(), "testName");
        assert_eq!(vs.vessel_status(0).unwrap(), VesselStatus::Undecided);
        assert_eq!(vs.line_endpoints(0).unwrap(), line);
        let read = vs.get_trace(0).unwrap();
        assert_eq!(read.get(4), Some(5.0));
        let extra = vs.get_extra_trace(0).unwrap().unwrap();
        assert_eq!(extra.get(0), Some(0.5));
    }

    #[test]
    fn diameter_vessel_requires_center_trace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vessels.isxd");
        let sp = spacing();
        let t = timing();
        let mut w = VesselSetWriter::create(&path, t.clone(), sp, VesselSetType::VesselDiameter).unwrap();
        let line = VesselLine::diameter(
            PixelPoint { col: 0, row: 0 },
            PixelPoint { col: 1, row: 1 },
        );
        let trace = Trace::new(t, vec![0.0; 5]).unwrap();
        assert!(w
            .write_vessel_data(&image(sp), line, &trace, None, None, None)
            .is_err());
    }

    #[test]
    fn velocity_vessel_requires_four_point_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vessels.isxd");
        let sp = spacing();
        let t = timing();
        let mut w = VesselSetWriter::create(&path, t.clone(), sp, VesselSetType::RbcVelocity).unwrap();
        let line = VesselLine::diameter(
            PixelPoint { col: 0, row: 0 },
            PixelPoint { col: 2, row: 2 },
        );
        let trace = Trace::new(t.clone(), vec![0.0; 5]).unwrap();
        let direction = Trace::new(t, vec![0.0; 5]).unwrap();
        assert!(w
            .write_vessel_data(&image(sp), line, &trace, Some(&direction), None, None)
            .is_err());
    }

    #[test]
    fn velocity_vessel_requires_extra_trace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vessels.isxd");
        let sp = spacing();
        let t = timing();
        let mut w = VesselSetWriter::create(&path, t.clone(), sp, VesselSetType::RbcVelocity).unwrap();
        let line = VesselLine::velocity(
            (PixelPoint { col: 0, row: 0 }, PixelPoint { col: 2, row: 0 }),
            (PixelPoint { col: 0, row: 2 }, PixelPoint { col: 2, row: 2 }),
        );
        let trace = Trace::new(t, vec![0.0; 5]).unwrap();
        assert!(w
            .write_vessel_data(&image(sp), line, &trace, None, None, None)
            .is_err());
    }

    #[test]
    fn velocity_vessel_round_trips_direction_and_chords() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vessels.isxd");
        let sp = spacing();
        let t = timing();
        let mut w = VesselSetWriter::create(&path, t.clone(), sp, VesselSetType::RbcVelocity).unwrap();
        let line = VesselLine::velocity(
            (PixelPoint { col: 0, row: 0 }, PixelPoint { col: 2, row: 0 }),
            (PixelPoint { col: 0, row: 2 }, PixelPoint { col: 2, row: 2 }),
        );
        let trace = Trace::new(t.clone(), vec![1.0; 5]).unwrap();
        let direction = Trace::new(t, vec![90.0; 5]).unwrap();
        w.write_vessel_data(&image(sp), line.clone(), &trace, Some(&direction), None, None)
            .unwrap();
        w.close_for_writing().unwrap();

        let vs = VesselSetFile::open(&path).unwrap();
        assert_eq!(vs.line_endpoints(0).unwrap().points().len(), 4);
        assert_eq!(vs.line_endpoints(0).unwrap(), line);
        let extra = vs.get_extra_trace(0).unwrap().unwrap();
        assert_eq!(extra.get(0), Some(90.0));
    }
}
