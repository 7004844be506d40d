//! NWB export for movies, gated behind `export_nwb` the same way the
//! teacher gates its own HDF5 writer behind `storage_hdf5` in
//! `rust_daq::data::storage::Hdf5Writer` (not-enabled stub module paired
//! with a real one, `pub use`d under the same name).
//!
//! Schema grounded on `examples/original_source/test/MovieExportTest.cpp`:
//! top-level `nwb_version`/`identifier`/`session_description`/
//! `session_start_time` datasets, an `acquisition/timeseries/<name>` group
//! per source movie holding an `(num_valid, height, width)` `f32` `data`
//! dataset and a `(num_valid,)` `f64` `timestamps` dataset (seconds since
//! the first source's start), with `num_samples`/`bits_per_pixel`/
//! `dimension`/`format` metadata alongside.

use std::path::Path;

use crate::error::CoreResult;

#[cfg(feature = "export_nwb")]
mod enabled {
    use super::*;
    use crate::container::movie::MovieFile;
    use crate::error::CoreError;
    use crate::image::DataType;
    use crate::time::Time;

    fn h5_err(path: &Path, e: hdf5::Error) -> CoreError {
        CoreError::data_io_at(format!("HDF5/NWB export failed: {e}"), path)
    }

    fn write_scalar_str(
        parent: &hdf5::Group,
        name: &str,
        value: &str,
        path: &Path,
    ) -> CoreResult<()> {
        let data = hdf5::types::VarLenAscii::from_ascii(value)
            .map_err(|e| CoreError::data_io_at(format!("invalid ASCII for '{name}': {e}"), path))?;
        parent
            .new_dataset::<hdf5::types::VarLenAscii>()
            .create(name)
            .map_err(|e| h5_err(path, e))?
            .write_scalar(&data)
            .map_err(|e| h5_err(path, e))
    }

    fn write_attr_str(loc: &hdf5::Group, name: &str, value: &str, path: &Path) -> CoreResult<()> {
        let data = hdf5::types::VarLenAscii::from_ascii(value)
            .map_err(|e| CoreError::data_io_at(format!("invalid ASCII for '{name}': {e}"), path))?;
        loc.new_attr::<hdf5::types::VarLenAscii>()
            .create(name)
            .map_err(|e| h5_err(path, e))?
            .write_scalar(&data)
            .map_err(|e| h5_err(path, e))
    }

    fn write_dataset_i32(
        parent: &hdf5::Group,
        name: &str,
        value: i32,
        path: &Path,
    ) -> CoreResult<()> {
        parent
            .new_dataset::<i32>()
            .create(name)
            .map_err(|e| h5_err(path, e))?
            .write_scalar(&value)
            .map_err(|e| h5_err(path, e))
    }

    pub fn export_movie(
        movies: &[MovieFile],
        output_path: &Path,
        identifier: &str,
        session_description: &str,
    ) -> CoreResult<()> {
        let first = movies
            .first()
            .ok_or_else(|| CoreError::user_input("NWB export needs at least one source movie"))?;
        let series_start = first.timing().start;

        let file = hdf5::File::create(output_path).map_err(|e| h5_err(output_path, e))?;
        let root = file.as_group().map_err(|e| h5_err(output_path, e))?;
        write_scalar_str(&root, "nwb_version", "NWB-1.0.6", output_path)?;
        write_scalar_str(&root, "identifier", identifier, output_path)?;
        write_scalar_str(
            &root,
            "session_description",
            session_description,
            output_path,
        )?;
        write_scalar_str(
            &root,
            "session_start_time",
            &format!("{:.6}", series_start.secs_since_epoch.to_f64()),
            output_path,
        )?;

        let acquisition = file.create_group("acquisition").map_err(|e| h5_err(output_path, e))?;
        let timeseries_group = acquisition
            .create_group("timeseries")
            .map_err(|e| h5_err(output_path, e))?;
        acquisition
            .create_group("images")
            .map_err(|e| h5_err(output_path, e))?;

        for (i, movie) in movies.iter().enumerate() {
            export_one_timeseries(&timeseries_group, movie, series_start, &format!("movie{i}"), output_path)?;
        }
        Ok(())
    }

    fn export_one_timeseries(
        parent: &hdf5::Group,
        movie: &MovieFile,
        series_start: Time,
        name: &str,
        path: &Path,
    ) -> CoreResult<()> {
        let timing = movie.timing();
        let spacing = movie.spacing();
        let width = spacing.num_cols as usize;
        let height = spacing.num_rows as usize;
        let num_valid = timing.num_stored_samples() as usize;

        let mut pixels = Vec::with_capacity(num_valid * width * height);
        let mut timestamps = Vec::with_capacity(num_valid);
        for index in 0..timing.num_samples {
            if !timing.is_valid(index) {
                continue;
            }
            let frame = movie.get_frame(index)?;
            for row in 0..spacing.num_rows {
                for col in 0..spacing.num_cols {
                    let value = match movie.data_type() {
                        DataType::U8 => frame.image.get_u8(col, row)? as f32,
                        DataType::U16 => frame.image.get_u16(col, row)? as f32,
                        DataType::F32 => frame.image.get_f32(col, row)?,
                    };
                    pixels.push(value);
                }
            }
            let timestamp = frame
                .timestamp
                .ok_or_else(|| CoreError::data_io_at("valid frame missing timestamp", path))?;
            timestamps.push(timestamp.checked_sub(series_start)?.to_f64());
        }

        let group = parent.create_group(name).map_err(|e| h5_err(path, e))?;
        write_attr_str(&group, "neurodata_type", "TimeSeries", path)?;
        write_attr_str(&group, "source", name, path)?;
        write_dataset_i32(&group, "num_samples", num_valid as i32, path)?;
        write_dataset_i32(
            &group,
            "bits_per_pixel",
            8 * movie.data_type().byte_size() as i32,
            path,
        )?;
        write_scalar_str(&group, "format", "raw", path)?;

        group
            .new_dataset::<i32>()
            .shape(2)
            .create("dimension")
            .map_err(|e| h5_err(path, e))?
            .write_raw(&[width as i32, height as i32])
            .map_err(|e| h5_err(path, e))?;

        group
            .new_dataset::<f32>()
            .shape((num_valid, height, width))
            .create("data")
            .map_err(|e| h5_err(path, e))?
            .write_raw(&pixels)
            .map_err(|e| h5_err(path, e))?;

        group
            .new_dataset::<f64>()
            .shape(num_valid)
            .create("timestamps")
            .map_err(|e| h5_err(path, e))?
            .write_raw(&timestamps)
            .map_err(|e| h5_err(path, e))?;

        Ok(())
    }
}

#[cfg(not(feature = "export_nwb"))]
mod disabled {
    use super::*;
    use crate::container::movie::MovieFile;
    use crate::error::CoreError;

    pub fn export_movie(
        _movies: &[MovieFile],
        _output_path: &Path,
        _identifier: &str,
        _session_description: &str,
    ) -> CoreResult<()> {
        Err(CoreError::user_input("export_nwb feature is not enabled"))
    }
}

#[cfg(feature = "export_nwb")]
pub use enabled::export_movie;

#[cfg(not(feature = "export_nwb"))]
pub use disabled::export_movie;
