//! Owned pixel buffers and the per-frame view a movie reader hands back.
//!
//! Adapted from `rust_daq::core::PixelBuffer` (a `U8`/`U16`/`F64` enum
//! with `as_f64`/`memory_bytes` accessors): this crate's grids are always
//! `U8`/`U16`/`F32`, and the buffer is wrapped in an `Image` that also
//! knows its `SpacingInfo`, channel count, and row stride.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::spacing::SpacingInfo;
use crate::time::Time;
use crate::timing::FrameKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U8,
    U16,
    F32,
}

impl DataType {
    pub fn byte_size(self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 => 2,
            DataType::F32 => 4,
        }
    }
}

/// An owned pixel buffer over a `SpacingInfo` grid.
///
/// `row_bytes` is the payload stride; any bytes beyond
/// `num_cols * channels * data_type.byte_size()` per row are
/// implementation padding and are not interpreted.
#[derive(Clone, Debug)]
pub struct Image {
    spacing: SpacingInfo,
    data_type: DataType,
    channels: u32,
    row_bytes: u32,
    data: Vec<u8>,
}

impl Image {
    pub fn new(
        spacing: SpacingInfo,
        data_type: DataType,
        channels: u32,
        row_bytes: u32,
        data: Vec<u8>,
    ) -> CoreResult<Self> {
        if channels == 0 {
            return Err(CoreError::user_input("Image channels must be non-zero"));
        }
        let min_row_bytes = spacing.num_cols as u64 * channels as u64 * data_type.byte_size() as u64;
        if (row_bytes as u64) < min_row_bytes {
            return Err(CoreError::user_input(
                "Image row_bytes is smaller than cols * channels * pixel size",
            ));
        }
        let expected_len = row_bytes as u64 * spacing.num_rows as u64;
        if data.len() as u64 != expected_len {
            return Err(CoreError::user_input(
                "Image payload length does not match row_bytes * num_rows",
            ));
        }
        Ok(Self {
            spacing,
            data_type,
            channels,
            row_bytes,
            data,
        })
    }

    /// An all-zero image for the given grid, used to materialize
    /// non-valid frames on read.
    pub fn zeroed(spacing: SpacingInfo, data_type: DataType, channels: u32) -> Self {
        let row_bytes = spacing.num_cols * channels * data_type.byte_size() as u32;
        let data = vec![0u8; row_bytes as usize * spacing.num_rows as usize];
        Self {
            spacing,
            data_type,
            channels,
            row_bytes,
            data,
        }
    }

    pub fn spacing(&self) -> &SpacingInfo {
        &self.spacing
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn row_bytes(&self) -> u32 {
        self.row_bytes
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reads pixel `(col, row)`, channel 0, as `u16`. Only meaningful
    /// when `data_type() == DataType::U16`.
    pub fn get_u16(&self, col: u32, row: u32) -> CoreResult<u16> {
        let offset = self.pixel_offset(col, row, self.data_type.byte_size())?;
        Ok(u16::from_le_bytes([self.data[offset], self.data[offset + 1]]))
    }

    pub fn get_u8(&self, col: u32, row: u32) -> CoreResult<u8> {
        let offset = self.pixel_offset(col, row, self.data_type.byte_size())?;
        Ok(self.data[offset])
    }

    pub fn get_f32(&self, col: u32, row: u32) -> CoreResult<f32> {
        let offset = self.pixel_offset(col, row, self.data_type.byte_size())?;
        Ok(f32::from_le_bytes(
            self.data[offset..offset + 4].try_into().unwrap(),
        ))
    }

    fn pixel_offset(&self, col: u32, row: u32, pixel_size: usize) -> CoreResult<usize> {
        if col >= self.spacing.num_cols || row >= self.spacing.num_rows {
            return Err(CoreError::user_input("pixel coordinate out of range"));
        }
        Ok(row as usize * self.row_bytes as usize + col as usize * self.channels as usize * pixel_size)
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }
}

/// One sample of a movie, with the spatial extent of an `Image` plus
/// timing metadata. Non-`Valid` frames carry an all-zero payload and no
/// acquisition timestamp.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub image: Image,
    pub timestamp: Option<Time>,
    pub index: u64,
    pub kind: FrameKind,
}

impl VideoFrame {
    pub fn valid(image: Image, timestamp: Time, index: u64) -> Self {
        Self {
            image,
            timestamp: Some(timestamp),
            index,
            kind: FrameKind::Valid,
        }
    }

    pub fn invalid(image: Image, index: u64, kind: FrameKind) -> Self {
        debug_assert_ne!(kind, FrameKind::Valid);
        Self {
            image,
            timestamp: None,
            index,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::Rational;
    use crate::spacing::MicronPoint;

    fn spacing(cols: u32, rows: u32) -> SpacingInfo {
        SpacingInfo::new(
            cols,
            rows,
            MicronPoint {
                x: Rational::from_int(1),
                y: Rational::from_int(1),
            },
            MicronPoint {
                x: Rational::zero(),
                y: Rational::zero(),
            },
        )
        .unwrap()
    }

    #[test]
    fn round_trips_u16_pixels() {
        let sp = spacing(4, 3);
        let mut data = vec![0u8; 4 * 3 * 2];
        for p in 0..12u16 {
            let bytes = (p * 12).to_le_bytes();
            data[p as usize * 2] = bytes[0];
            data[p as usize * 2 + 1] = bytes[1];
        }
        let image = Image::new(sp, DataType::U16, 1, 4 * 2, data).unwrap();
        assert_eq!(image.get_u16(3, 1).unwrap(), 7 * 12);
    }

    #[test]
    fn zeroed_image_is_all_zero() {
        let sp = spacing(2, 2);
        let image = Image::zeroed(sp, DataType::U8, 1);
        assert!(image.raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_undersized_row_bytes() {
        let sp = spacing(4, 3);
        let data = vec![0u8; 4 * 3 * 2];
        assert!(Image::new(sp, DataType::U16, 1, 4, data).is_err());
    }
}
