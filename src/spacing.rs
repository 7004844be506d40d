//! The pixel grid each image-modality file is defined over: dimensions in
//! pixels plus a micron-scale origin and pixel size, with exact
//! pixel<->micron coordinate conversion.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::rational::{round_half_down, Rational};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct MicronPoint {
    pub x: Rational,
    pub y: Rational,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct PixelPoint {
    pub col: u32,
    pub row: u32,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpacingInfo {
    pub num_cols: u32,
    pub num_rows: u32,
    pub pixel_size: MicronPoint,
    pub top_left: MicronPoint,
}

impl SpacingInfo {
    pub fn new(
        num_cols: u32,
        num_rows: u32,
        pixel_size: MicronPoint,
        top_left: MicronPoint,
    ) -> CoreResult<Self> {
        if num_cols == 0 || num_rows == 0 {
            return Err(CoreError::user_input(
                "SpacingInfo dimensions must be non-zero",
            ));
        }
        if !pixel_size.x.is_positive() || !pixel_size.y.is_positive() {
            return Err(CoreError::user_input("SpacingInfo pixel size must be positive"));
        }
        Ok(Self {
            num_cols,
            num_rows,
            pixel_size,
            top_left,
        })
    }

    pub fn total_pixels(&self) -> u64 {
        self.num_cols as u64 * self.num_rows as u64
    }

    pub fn total_size_microns(&self) -> CoreResult<MicronPoint> {
        Ok(MicronPoint {
            x: self.pixel_size.x.checked_mul_i64(self.num_cols as i64)?,
            y: self.pixel_size.y.checked_mul_i64(self.num_rows as i64)?,
        })
    }

    pub fn bottom_right(&self) -> CoreResult<MicronPoint> {
        let size = self.total_size_microns()?;
        Ok(MicronPoint {
            x: self.top_left.x.checked_add(size.x)?,
            y: self.top_left.y.checked_add(size.y)?,
        })
    }

    /// Microns of the center of pixel `(col, row)`:
    /// `top_left + (col+1/2, row+1/2) * pixel_size`.
    pub fn pixel_center_in_microns(&self, col: u32, row: u32) -> CoreResult<MicronPoint> {
        let half = Rational::new(1, 2)?;
        let cx = Rational::from_int(col as i64).checked_add(half)?;
        let cy = Rational::from_int(row as i64).checked_add(half)?;
        Ok(MicronPoint {
            x: self
                .top_left
                .x
                .checked_add(cx.checked_mul(self.pixel_size.x)?)?,
            y: self
                .top_left
                .y
                .checked_add(cy.checked_mul(self.pixel_size.y)?)?,
        })
    }

    /// Nearest pixel whose center is closest to `point`, ties toward the
    /// lower index, clamped into `[0, num_cols) x [0, num_rows)`.
    pub fn microns_to_pixel(&self, point: MicronPoint) -> CoreResult<PixelPoint> {
        let col = self.nearest_index(point.x, self.top_left.x, self.pixel_size.x, self.num_cols)?;
        let row = self.nearest_index(point.y, self.top_left.y, self.pixel_size.y, self.num_rows)?;
        Ok(PixelPoint { col, row })
    }

    fn nearest_index(
        &self,
        coord: Rational,
        origin: Rational,
        pixel_size: Rational,
        count: u32,
    ) -> CoreResult<u32> {
        // index = (coord - origin) / pixel_size - 1/2
        let delta = coord.checked_sub(origin)?;
        let half = Rational::new(1, 2)?;
        let ratio_minus_half = delta.checked_div(pixel_size)?.checked_sub(half)?;
        let num = ratio_minus_half.num() as i128;
        let den = ratio_minus_half.den() as i128;
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let idx = round_half_down(num, den);
        let clamped = idx.clamp(0, count as i128 - 1);
        Ok(clamped as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn round_trip_pixel_and_microns() {
        let s = spacing();
        for col in 0..s.num_cols {
            for row in 0..s.num_rows {
                let microns = s.pixel_center_in_microns(col, row).unwrap();
                let pixel = s.microns_to_pixel(microns).unwrap();
                assert_eq!(pixel, PixelPoint { col, row });
            }
        }
    }

    #[test]
    fn bottom_right_matches_total_size() {
        let s = spacing();
        let br = s.bottom_right().unwrap();
        assert_eq!(br.x, Rational::from_int(12));
        assert_eq!(br.y, Rational::from_int(9));
    }

    #[test]
    fn out_of_bounds_microns_clamp_into_grid() {
        let s = spacing();
        let far = MicronPoint {
            x: Rational::from_int(1000),
            y: Rational::from_int(-1000),
        };
        let pixel = s.microns_to_pixel(far).unwrap();
        assert_eq!(pixel, PixelPoint { col: 3, row: 0 });
    }
}
