//! MP4 export is out of scope: pixel-level video compression is not
//! implemented here. This module exists only so `MovieExportFormat::Mp4`
//! has somewhere to dispatch to.

use std::path::Path;

use crate::container::movie::MovieFile;
use crate::error::{CoreError, CoreResult};

pub fn export_movie(_movies: &[MovieFile], _output_path: &Path) -> CoreResult<()> {
    Err(CoreError::algorithm(
        "MP4 export is out of scope: pixel-level video compression is not implemented",
    ))
}
