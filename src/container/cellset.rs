//! CellSet file: one spatial footprint image plus one trace per cell.
//!
//! Grounded on `examples/original_source/api/isxCellSetFactory.h` for the
//! write-then-read lifecycle, and `api/isxMetadata.h` for the
//! method/type/units vocabulary stored under the `idps.cellset`
//! extra-properties path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::container::envelope::{EnvelopeReader, EnvelopeWriter};
use crate::error::{CoreError, CoreResult};
use crate::extra_properties::ExtraProperties;
use crate::image::{DataType, Image};
use crate::spacing::SpacingInfo;
use crate::timing::TimingInfo;
use crate::trace::Trace;

const CELLSET_TYPE_TAG: &str = "cell set";
const CURRENT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellStatus {
    Accepted,
    Undecided,
    Rejected,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CellMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colour: Option<[u8; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<(f32, f32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_components: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CellHeaderEntry {
    name: String,
    status: CellStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<CellMetrics>,
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct CellSetHeaderJson {
    version: u32,
    #[serde(rename = "type")]
    type_tag: String,
    timing_info: TimingInfo,
    spacing_info: SpacingInfo,
    data_type: DataType,
    extra_properties: serde_json::Value,
    is_roi_set: bool,
    cells: Vec<CellHeaderEntry>,
}

fn default_cell_name(index: usize, num_cells: usize) -> String {
    let width = num_cells.saturating_sub(1).to_string().len().max(1);
    format!("C{:0width$}", index, width = width)
}

pub struct CellSetWriter {
    envelope: EnvelopeWriter,
    timing: TimingInfo,
    spacing: SpacingInfo,
    is_roi_set: bool,
    extra_properties: ExtraProperties,
    cells: Vec<CellHeaderEntry>,
}

impl CellSetWriter {
    pub fn create(
        path: impl AsRef<Path>,
        timing: TimingInfo,
        spacing: SpacingInfo,
        is_roi_set: bool,
    ) -> CoreResult<Self> {
        Ok(Self {
            envelope: EnvelopeWriter::create(path)?,
            timing,
            spacing,
            is_roi_set,
            extra_properties: ExtraProperties::default(),
            cells: Vec::new(),
        })
    }

    pub fn set_extra_properties(&mut self, properties: ExtraProperties) {
        self.extra_properties = properties;
    }

    /// Writes the footprint image and trace for the next cell. Cells must
    /// be written in index order; re-writing a cell is not supported.
    pub fn write_image_and_trace(
        &mut self,
        image: &Image,
        trace: &Trace,
        name: Option<&str>,
    ) -> CoreResult<usize> {
        if image.spacing() != &self.spacing {
            return Err(CoreError::user_input(
                "cell footprint SpacingInfo does not match the cell set's SpacingInfo",
            ));
        }
        if trace.timing().num_samples != self.timing.num_samples
            || trace.timing().start != self.timing.start
        {
            return Err(CoreError::user_input(
                "cell trace TimingInfo does not match the cell set's TimingInfo",
            ));
        }
        let index = self.cells.len();
        let image_bytes =
            self.spacing.num_cols as u64 * self.spacing.num_rows as u64 * DataType::F32.byte_size() as u64;
        if image.raw().len() as u64 != image_bytes || image.data_type() != DataType::F32 {
            return Err(CoreError::user_input(
                "cell footprint must be an F32 image matching cols*rows",
            ));
        }
        self.envelope.write_payload(image.raw())?;
        for &v in trace.values() {
            self.envelope.write_payload(&v.to_le_bytes())?;
        }
        self.cells.push(CellHeaderEntry {
            name: name.map(str::to_owned).unwrap_or_default(),
            status: CellStatus::Undecided,
            metrics: None,
        });
        Ok(index)
    }

    pub fn set_cell_metrics(&mut self, index: usize, metrics: CellMetrics) -> CoreResult<()> {
        let entry = self
            .cells
            .get_mut(index)
            .ok_or_else(|| CoreError::user_input("cell index out of range"))?;
        entry.metrics = Some(metrics);
        Ok(())
    }

    pub fn set_cell_status(&mut self, index: usize, status: CellStatus) -> CoreResult<()> {
        let entry = self
            .cells
            .get_mut(index)
            .ok_or_else(|| CoreError::user_input("cell index out of range"))?;
        entry.status = status;
        Ok(())
    }

    pub fn close_for_writing(mut self) -> CoreResult<PathBuf> {
        let num_cells = self.cells.len();
        for (i, cell) in self.cells.iter_mut().enumerate() {
            if cell.name.is_empty() {
                cell.name = default_cell_name(i, num_cells);
            }
        }
        let path = self.envelope.path().to_path_buf();
        let header = CellSetHeaderJson {
            version: CURRENT_VERSION,
            type_tag: CELLSET_TYPE_TAG.to_string(),
            timing_info: self.timing,
            spacing_info: self.spacing,
            data_type: DataType::F32,
            extra_properties: self.extra_properties.to_value().clone(),
            is_roi_set: self.is_roi_set,
            cells: self.cells,
        };
        self.envelope.seal(&header)?;
        Ok(path)
    }
}

pub struct CellSetFile {
    reader: EnvelopeReader,
    header: CellSetHeaderJson,
    record_bytes: u64,
    image_bytes: u64,
}

impl CellSetFile {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let reader = EnvelopeReader::open(path)?;
        let header: CellSetHeaderJson = reader.header()?;
        if header.version != CURRENT_VERSION {
            return Err(CoreError::data_io_at(
                format!("unknown CellSet version {}", header.version),
                path,
            ));
        }
        if header.type_tag != CELLSET_TYPE_TAG {
            return Err(CoreError::data_io_at(
                format!("expected cell set type, found '{}'", header.type_tag),
                path,
            ));
        }
        let image_bytes =
            header.spacing_info.num_cols as u64 * header.spacing_info.num_rows as u64 * 4;
        let trace_bytes = header.timing_info.num_samples * 4;
        let record_bytes = image_bytes + trace_bytes;
        let expected = record_bytes * header.cells.len() as u64;
        if reader.payload().len() as u64 != expected {
            return Err(CoreError::data_io_at(
                "cell set payload size does not match declared cell count",
                path,
            ));
        }
        Ok(Self {
            reader,
            header,
            record_bytes,
            image_bytes,
        })
    }

    pub fn num_cells(&self) -> usize {
        self.header.cells.len()
    }

    pub fn timing(&self) -> &TimingInfo {
        &self.header.timing_info
    }

    pub fn spacing(&self) -> &SpacingInfo {
        &self.header.spacing_info
    }

    pub fn is_roi_set(&self) -> bool {
        self.header.is_roi_set
    }

    pub fn extra_properties(&self) -> CoreResult<ExtraProperties> {
        ExtraProperties::from_value(self.header.extra_properties.clone())
    }

    pub fn cell_name(&self, index: usize) -> CoreResult<&str> {
        self.header
            .cells
            .get(index)
            .map(|c| c.name.as_str())
            .ok_or_else(|| CoreError::user_input("cell index out of range"))
    }

    pub fn cell_status(&self, index: usize) -> CoreResult<CellStatus> {
        self.header
            .cells
            .get(index)
            .map(|c| c.status)
            .ok_or_else(|| CoreError::user_input("cell index out of range"))
    }

    pub fn get_image(&self, index: usize) -> CoreResult<Image> {
        if index >= self.header.cells.len() {
            return Err(CoreError::user_input("cell index out of range"));
        }
        let start = index as u64 * self.record_bytes;
        let bytes = &self.reader.payload()[start as usize..(start + self.image_bytes) as usize];
        let row_bytes = self.header.spacing_info.num_cols * 4;
        Image::new(
            self.header.spacing_info,
            DataType::F32,
            1,
            row_bytes,
            bytes.to_vec(),
        )
    }

    pub fn get_trace(&self, index: usize) -> CoreResult<Trace> {
        if index >= self.header.cells.len() {
            return Err(CoreError::user_input("cell index out of range"));
        }
        let start = index as u64 * self.record_bytes + self.image_bytes;
        let trace_bytes = self.header.timing_info.num_samples * 4;
        let bytes = &self.reader.payload()[start as usize..(start + trace_bytes) as usize];
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Trace::new(self.header.timing_info.clone(), values)
    }
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

    #[test]
    fn s2_cellset_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cellset.isxd");
        let sp = spacing();
        let t = timing();
        let mut w = CellSetWriter::create(&path, t.clone(), sp, false).unwrap();

        let mut image_data = vec![0u8; sp.num_cols as usize * sp.num_rows as usize * 4];
        image_data[0..4].copy_from_slice(&1.0f32.to_le_bytes());
        image_data[4..8].copy_from_slice(&2.5f32.to_le_bytes());
        let image = Image::new(sp, DataType::F32, 1, sp.num_cols * 4, image_data).unwrap();

        let values: Vec<f32> = (0..5).map(|i| 84.0 + 0.01 * i as f32).collect();
        let trace = Trace::new(t, values).unwrap();

        w.write_image_and_trace(&image, &trace, Some("Lonely1")).unwrap();
        w.close_for_writing().unwrap();

        let cs = CellSetFile::open(&path).unwrap();
        assert_eq!(cs.num_cells(), 1);
        assert_eq!(cs.cell_name(0).unwrap(), "Lonely1");
        assert_eq!(cs.cell_status(0).unwrap(), CellStatus::Undecided);
        let read_trace = cs.get_trace(0).unwrap();
        assert!((read_trace.get(0).unwrap() - 84.0).abs() < 1e-4);
        assert!((read_trace.get(4).unwrap() - 84.04).abs() < 1e-4);
        let read_image = cs.get_image(0).unwrap();
        assert_eq!(read_image.get_f32(0, 0).unwrap(), 1.0);
        assert_eq!(read_image.get_f32(1, 0).unwrap(), 2.5);
    }

    #[test]
    fn default_names_are_zero_padded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cellset.isxd");
        let sp = spacing();
        let t = timing();
        let mut w = CellSetWriter::create(&path, t.clone(), sp, false).unwrap();
        let image = Image::zeroed(sp, DataType::F32, 1);
        for _ in 0..11 {
            let trace = Trace::new(t.clone(), vec![0.0; 5]).unwrap();
            w.write_image_and_trace(&image, &trace, None).unwrap();
        }
        w.close_for_writing().unwrap();
        let cs = CellSetFile::open(&path).unwrap();
        assert_eq!(cs.cell_name(0).unwrap(), "C00");
        assert_eq!(cs.cell_name(10).unwrap(), "C10");
    }

    #[test]
    fn mismatched_spacing_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cellset.isxd");
        let sp = spacing();
        let other_sp = SpacingInfo::new(
            2,
            2,
            MicronPoint {
                x: Rational::from_int(1),
                y: Rational::from_int(1),
            },
            MicronPoint {
                x: Rational::zero(),
                y: Rational::zero(),
            },
        )
        .unwrap();
        let t = timing();
        let mut w = CellSetWriter::create(&path, t.clone(), sp, false).unwrap();
        let image = Image::zeroed(other_sp, DataType::F32, 1);
        let trace = Trace::new(t, vec![0.0; 5]).unwrap();
        assert!(w.write_image_and_trace(&image, &trace, None).is_err());
    }
}
