//! TIFF export for movies, via the `image` crate's TIFF codec (the
//! teacher's own choice for baseline image export: `daq-storage`'s
//! `Cargo.toml` pulls `image` with `features = ["tiff"]` rather than the
//! standalone `tiff` crate).

use std::path::Path;

use crate::error::CoreResult;

#[cfg(feature = "export_tiff")]
mod enabled {
    use super::*;
    use crate::container::movie::MovieFile;
    use crate::error::CoreError;
    use crate::image::DataType;
    use image::codecs::tiff::TiffEncoder;
    use image::ExtendedColorType;

    /// Writes one TIFF page per valid frame, across all `movies` in order.
    /// Non-valid (dropped/cropped/blank) frames are skipped, matching the
    /// "exported timestamps only cover valid frames" convention used by
    /// the timestamp exporter.
    pub fn export_movie(movies: &[MovieFile], output_path: &Path) -> CoreResult<()> {
        let file = std::fs::File::create(output_path)
            .map_err(|e| CoreError::file_io_source("failed to create TIFF output", output_path, e))?;
        let mut encoder = TiffEncoder::new(file);
        for movie in movies {
            let color = match movie.data_type() {
                DataType::U8 => ExtendedColorType::L8,
                DataType::U16 => ExtendedColorType::L16,
                DataType::F32 => {
                    return Err(CoreError::algorithm(
                        "TIFF export does not support F32 pixel data",
                    ))
                }
            };
            let timing = movie.timing();
            for index in 0..timing.num_samples {
                if !timing.is_valid(index) {
                    continue;
                }
                let frame = movie.get_frame(index)?;
                let spacing = frame.image.spacing();
                encoder
                    .encode(frame.image.raw(), spacing.num_cols, spacing.num_rows, color)
                    .map_err(|e| CoreError::algorithm(format!("TIFF encode failed: {e}")))?;
            }
        }
        Ok(())
    }
}

#[cfg(not(feature = "export_tiff"))]
mod disabled {
    use super::*;
    use crate::container::movie::MovieFile;
    use crate::error::CoreError;

    pub fn export_movie(_movies: &[MovieFile], _output_path: &Path) -> CoreResult<()> {
        Err(CoreError::user_input("export_tiff feature is not enabled"))
    }
}

#[cfg(feature = "export_tiff")]
pub use enabled::export_movie;

#[cfg(not(feature = "export_tiff"))]
pub use disabled::export_movie;
