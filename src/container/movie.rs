//! MosaicMovie file: a sequence of equally-sized frame records, optionally
//! bracketed by fixed-size header/footer metadata bands. Frames for
//! dropped/cropped/blank indices are never physically stored; they are
//! materialized on read as all-zero buffers.
//!
//! Grounded on `examples/original_source/src/isxMosaicMovie.h` for the
//! frame-record-with-optional-header/footer-band shape.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::container::envelope::{EnvelopeReader, EnvelopeWriter};
use crate::error::{messages, CoreError, CoreResult};
use crate::extra_properties::ExtraProperties;
use crate::image::{DataType, Image, VideoFrame};
use crate::spacing::SpacingInfo;
use crate::time::Time;
use crate::timing::{FrameKind, TimingInfo};

/// Legacy invariant: header/footer band size is fixed regardless of
/// cropped ROI.
const HEADER_FOOTER_BAND_BYTES: u64 = 2 * 1280 * 2;

const MOVIE_TYPE_TAG: &str = "miniscope movie";
/// Current version: frames may carry header/footer bands. Bump this and
/// extend `MovieHeaderJson` whenever the payload shape changes again;
/// `MovieFile::open` rejects any version it doesn't recognize.
const CURRENT_VERSION: u32 = 2;

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct MovieHeaderJson {
    version: u32,
    #[serde(rename = "type")]
    type_tag: String,
    timing_info: TimingInfo,
    spacing_info: SpacingInfo,
    data_type: DataType,
    extra_properties: serde_json::Value,
    has_frame_header_footer: bool,
}

fn frame_bytes(spacing: &SpacingInfo, data_type: DataType, channels: u32) -> u64 {
    spacing.num_cols as u64 * spacing.num_rows as u64 * channels as u64 * data_type.byte_size() as u64
}

fn record_bytes(spacing: &SpacingInfo, data_type: DataType, channels: u32, has_hf: bool) -> u64 {
    let frame = frame_bytes(spacing, data_type, channels);
    if has_hf {
        frame + 2 * HEADER_FOOTER_BAND_BYTES
    } else {
        frame
    }
}

pub struct MovieCreateOptions {
    pub channels: u32,
    pub has_frame_header_footer: bool,
    pub extra_properties: ExtraProperties,
}

impl Default for MovieCreateOptions {
    fn default() -> Self {
        Self {
            channels: 1,
            has_frame_header_footer: false,
            extra_properties: ExtraProperties::default(),
        }
    }
}

pub struct MovieWriter {
    envelope: EnvelopeWriter,
    timing: TimingInfo,
    spacing: SpacingInfo,
    data_type: DataType,
    channels: u32,
    has_frame_header_footer: bool,
    extra_properties: ExtraProperties,
    last_index_written: Option<u64>,
}

impl MovieWriter {
    pub fn create(
        path: impl AsRef<Path>,
        timing: TimingInfo,
        spacing: SpacingInfo,
        data_type: DataType,
        options: MovieCreateOptions,
    ) -> CoreResult<Self> {
        Ok(Self {
            envelope: EnvelopeWriter::create(path)?,
            timing,
            spacing,
            data_type,
            channels: options.channels,
            has_frame_header_footer: options.has_frame_header_footer,
            extra_properties: options.extra_properties,
            last_index_written: None,
        })
    }

    /// Appends `frame`. A no-op (with a warning logged) if `frame.index`
    /// is not a valid index under the declared `TimingInfo`.
    pub fn write_frame(&mut self, frame: &VideoFrame) -> CoreResult<()> {
        self.write_frame_with_header_footer(frame, None, None)
    }

    pub fn write_frame_with_header_footer(
        &mut self,
        frame: &VideoFrame,
        header: Option<&[u8]>,
        footer: Option<&[u8]>,
    ) -> CoreResult<()> {
        if !self.timing.is_valid(frame.index) {
            log::warn!(
                "MosaicMovie: ignoring write for non-valid frame index {}",
                frame.index
            );
            return Ok(());
        }
        if let Some(last) = self.last_index_written {
            if frame.index as i128 <= last as i128 {
                return Err(CoreError::user_input(
                    "movie frames must be written in increasing index order",
                ));
            }
        }
        if frame.image.spacing() != &self.spacing || frame.image.data_type() != self.data_type {
            return Err(CoreError::user_input(
                "frame image SpacingInfo/DataType does not match the movie's",
            ));
        }
        if self.has_frame_header_footer {
            let band = header.unwrap_or(&[]);
            if band.len() as u64 > HEADER_FOOTER_BAND_BYTES {
                return Err(CoreError::user_input("frame header band too large"));
            }
            let mut padded = vec![0u8; HEADER_FOOTER_BAND_BYTES as usize];
            padded[..band.len()].copy_from_slice(band);
            self.envelope.write_payload(&padded)?;
        }
        self.envelope.write_payload(frame.image.raw())?;
        if self.has_frame_header_footer {
            let band = footer.unwrap_or(&[]);
            if band.len() as u64 > HEADER_FOOTER_BAND_BYTES {
                return Err(CoreError::user_input("frame footer band too large"));
            }
            let mut padded = vec![0u8; HEADER_FOOTER_BAND_BYTES as usize];
            padded[..band.len()].copy_from_slice(band);
            self.envelope.write_payload(&padded)?;
        }
        self.last_index_written = Some(frame.index);
        Ok(())
    }

    pub fn set_extra_properties(&mut self, properties: ExtraProperties) {
        self.extra_properties = properties;
    }

    /// Seals the file. If `override_timing` is given with fewer samples
    /// than were actually written, this fails with `DataIo`; more samples
    /// is allowed (the trailing samples are implicitly `BLANK` — the
    /// caller is responsible for declaring that in the `TimingInfo` it
    /// passes).
    pub fn close_for_writing(self, override_timing: Option<TimingInfo>) -> CoreResult<PathBuf> {
        let timing = override_timing.unwrap_or(self.timing);
        if let Some(last) = self.last_index_written {
            if timing.num_samples <= last {
                return Err(CoreError::data_io_at(
                    "close_for_writing: TimingInfo has fewer samples than frames written",
                    self.envelope.path(),
                ));
            }
        }
        let path = self.envelope.path().to_path_buf();
        let header = MovieHeaderJson {
            version: CURRENT_VERSION,
            type_tag: MOVIE_TYPE_TAG.to_string(),
            timing_info: timing,
            spacing_info: self.spacing,
            data_type: self.data_type,
            extra_properties: self.extra_properties.to_value().clone(),
            has_frame_header_footer: self.has_frame_header_footer,
        };
        self.envelope.seal(&header)?;
        Ok(path)
    }
}

pub struct MovieFile {
    reader: EnvelopeReader,
    header: MovieHeaderJson,
    channels: u32,
}

impl MovieFile {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let reader = EnvelopeReader::open(path)?;
        let header: MovieHeaderJson = reader.header()?;
        if header.version == 0 || header.version > CURRENT_VERSION {
            return Err(CoreError::data_io_at(
                format!("unknown MosaicMovie version {}", header.version),
                path,
            ));
        }
        if header.type_tag != MOVIE_TYPE_TAG {
            return Err(CoreError::data_io_at(
                format!("expected movie type, found '{}'", header.type_tag),
                path,
            ));
        }
        let expected_payload = {
            // channels is not persisted on old-version files; default 1.
            let channels = 1;
            let stored = header.timing_info.num_stored_samples();
            stored * record_bytes(&header.spacing_info, header.data_type, channels, header.has_frame_header_footer)
        };
        if reader.payload().len() as u64 != expected_payload {
            return Err(CoreError::data_io_at(
                "movie payload size does not match declared TimingInfo/SpacingInfo",
                path,
            ));
        }
        Ok(Self {
            reader,
            header,
            channels: 1,
        })
    }

    pub fn timing(&self) -> &TimingInfo {
        &self.header.timing_info
    }

    pub fn spacing(&self) -> &SpacingInfo {
        &self.header.spacing_info
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    pub fn has_frame_header_footer(&self) -> bool {
        self.header.has_frame_header_footer
    }

    pub fn extra_properties(&self) -> CoreResult<ExtraProperties> {
        ExtraProperties::from_value(self.header.extra_properties.clone())
    }

    fn record_bytes(&self) -> u64 {
        record_bytes(
            &self.header.spacing_info,
            self.header.data_type,
            self.channels,
            self.header.has_frame_header_footer,
        )
    }

    fn stored_record_start(&self, index: u64) -> u64 {
        let stored_offset = index - self.header.timing_info.preceding_invalid_count(index);
        stored_offset * self.record_bytes()
    }

    pub fn get_frame(&self, index: u64) -> CoreResult<VideoFrame> {
        if index >= self.header.timing_info.num_samples {
            return Err(CoreError::user_input("frame index out of range"));
        }
        let kind = self.header.timing_info.kind(index);
        if kind != FrameKind::Valid {
            let image = Image::zeroed(self.header.spacing_info, self.header.data_type, self.channels);
            return Ok(VideoFrame::invalid(image, index, kind));
        }
        let record_start = self.stored_record_start(index) as usize;
        let frame_start = if self.header.has_frame_header_footer {
            record_start + HEADER_FOOTER_BAND_BYTES as usize
        } else {
            record_start
        };
        let frame_len = frame_bytes(&self.header.spacing_info, self.header.data_type, self.channels) as usize;
        let bytes = &self.reader.payload()[frame_start..frame_start + frame_len];
        let row_bytes = self.header.spacing_info.num_cols * self.channels * self.header.data_type.byte_size() as u32;
        let image = Image::new(
            self.header.spacing_info,
            self.header.data_type,
            self.channels,
            row_bytes,
            bytes.to_vec(),
        )?;
        let timestamp = self.header.timing_info.index_to_start_time(index)?;
        Ok(VideoFrame::valid(image, timestamp, index))
    }

    fn band(&self, index: u64, footer: bool) -> CoreResult<Vec<u8>> {
        if !self.header.has_frame_header_footer || !self.header.timing_info.is_valid(index) {
            return Ok(Vec::new());
        }
        let record_start = self.stored_record_start(index) as usize;
        let frame_len = frame_bytes(&self.header.spacing_info, self.header.data_type, self.channels) as usize;
        let start = if footer {
            record_start + HEADER_FOOTER_BAND_BYTES as usize + frame_len
        } else {
            record_start
        };
        Ok(self.reader.payload()[start..start + HEADER_FOOTER_BAND_BYTES as usize].to_vec())
    }

    pub fn get_frame_header(&self, index: u64) -> CoreResult<Vec<u8>> {
        self.band(index, false)
    }

    pub fn get_frame_footer(&self, index: u64) -> CoreResult<Vec<u8>> {
        self.band(index, true)
    }

    /// Decodes the monotonic hardware counter embedded in the first 8
    /// bytes of the frame header band.
    pub fn get_frame_timestamp(&self, index: u64) -> CoreResult<u64> {
        if !self.header.has_frame_header_footer {
            return Err(CoreError::data_io(messages::MOVIE_NO_FRAME_TIMESTAMPS));
        }
        if !self.header.timing_info.is_valid(index) {
            return Err(CoreError::user_input("frame index is not valid"));
        }
        let header = self.get_frame_header(index)?;
        Ok(u64::from_le_bytes(header[0..8].try_into().unwrap()))
    }
}
