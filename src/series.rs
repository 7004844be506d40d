//! Series: an ordered composition of unitary files of one modality into a
//! single logical stream, plus the compatibility rules `insert()` enforces
//! before a member joins.
//!
//! Grounded on `rust_daq::data::registry`'s pattern of holding handles by
//! id with a non-owning parent back-reference rather than a strong
//! pointer cycle.

use crate::container::cellset::CellSetFile;
use crate::container::events::EventsFile;
use crate::container::movie::MovieFile;
use crate::container::vesselset::VesselSetFile;
use crate::error::{messages, CoreError, CoreResult};
use crate::image::DataType;
use crate::rational::Rational;
use crate::spacing::SpacingInfo;
use crate::time::Time;
use crate::timing::TimingInfo;

/// One file a `Series` can hold, tagged by modality so compatibility
/// checks can compare like with like without downcasting.
pub enum UnitaryFile {
    Movie(MovieFile),
    CellSet(CellSetFile),
    VesselSet(VesselSetFile),
    Events(EventsFile),
}

impl UnitaryFile {
    fn modality(&self) -> &'static str {
        match self {
            UnitaryFile::Movie(_) => "movie",
            UnitaryFile::CellSet(_) => "cellset",
            UnitaryFile::VesselSet(_) => "vesselset",
            UnitaryFile::Events(_) => "events",
        }
    }

    fn start_time(&self) -> Time {
        match self {
            UnitaryFile::Movie(m) => m.timing().start,
            UnitaryFile::CellSet(c) => c.timing().start,
            UnitaryFile::VesselSet(v) => v.timing().start,
            UnitaryFile::Events(e) => e.start(),
        }
    }

    fn timing(&self) -> Option<&TimingInfo> {
        match self {
            UnitaryFile::Movie(m) => Some(m.timing()),
            UnitaryFile::CellSet(c) => Some(c.timing()),
            UnitaryFile::VesselSet(v) => Some(v.timing()),
            UnitaryFile::Events(_) => None,
        }
    }

    fn spacing(&self) -> Option<&SpacingInfo> {
        match self {
            UnitaryFile::Movie(m) => Some(m.spacing()),
            UnitaryFile::CellSet(c) => Some(c.spacing()),
            UnitaryFile::VesselSet(v) => Some(v.spacing()),
            UnitaryFile::Events(_) => None,
        }
    }

    fn data_type(&self) -> Option<DataType> {
        match self {
            UnitaryFile::Movie(m) => Some(m.data_type()),
            UnitaryFile::CellSet(_) => Some(DataType::F32),
            UnitaryFile::VesselSet(_) => Some(DataType::F32),
            UnitaryFile::Events(_) => None,
        }
    }
}

/// Snaps `start` up to the next position on the grid defined by `(grid_start,
/// step)`, i.e. the smallest `grid_start + k*step >= start` for integer
/// `k >= 0`. Insertion snaps up rather than rounding to nearest, so a new
/// member's synthesized start is never earlier than it actually began
/// recording.
pub fn snap_start_up(start: Time, grid_start: Time, step: Rational) -> CoreResult<Time> {
    if start <= grid_start {
        return Ok(grid_start);
    }
    let delta = start.checked_sub(grid_start)?;
    let num = delta.num() as i128 * step.den() as i128;
    let den = delta.den() as i128 * step.num() as i128;
    let k_floor = num.div_euclid(den);
    let k = if num.rem_euclid(den) == 0 { k_floor } else { k_floor + 1 };
    grid_start.checked_add(step.checked_mul_i64(k as i64)?)
}

/// An ordered composition of unitary files of one modality. A `Series`
/// with a single member is the "unitary" case; `insert` is how additional
/// members join to make it composite.
pub struct Series {
    name: String,
    id: String,
    members: Vec<UnitaryFile>,
    processing_history_tag: Option<String>,
    parent: Option<String>,
    children: Vec<Series>,
    modified: bool,
}

impl Series {
    /// Builds a new series with a freshly generated unique id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(name, uuid::Uuid::new_v4().to_string())
    }

    /// Builds a series with a caller-supplied id, for reconstructing one
    /// whose id was already generated (e.g. re-opening from a manifest).
    pub fn with_id(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            members: Vec::new(),
            processing_history_tag: None,
            parent: None,
            children: Vec::new(),
            modified: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn members(&self) -> &[UnitaryFile] {
        &self.members
    }

    pub fn is_unitary(&self) -> bool {
        self.members.len() <= 1
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn set_parent(&mut self, parent_id: impl Into<String>) {
        self.parent = Some(parent_id.into());
    }

    pub fn add_child(&mut self, child: Series) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[Series] {
        &self.children
    }

    pub fn modified(&self) -> bool {
        self.modified
    }

    /// Runs the five-step compatibility checklist and inserts `member` so
    /// members remain sorted by start time.
    pub fn insert(&mut self, member: UnitaryFile, processing_history_tag: &str) -> CoreResult<()> {
        // Step 2: same modality.
        if let Some(first) = self.members.first() {
            if first.modality() != member.modality() {
                return Err(CoreError::series(format!(
                    "cannot add a {} member to a series of {} members",
                    member.modality(),
                    first.modality()
                )));
            }
        }

        // Step 3: same processing history tag.
        match &self.processing_history_tag {
            Some(existing) if existing != processing_history_tag => {
                return Err(CoreError::series(
                    "member's processing history does not match the series",
                ));
            }
            _ => {}
        }

        // Step 4: modality-specific checks (spacing/data type for image
        // modalities; step for all non-events modalities).
        if let Some(first) = self.members.first() {
            match (first.spacing(), member.spacing()) {
                (Some(a), Some(b)) if a.num_cols != b.num_cols || a.num_rows != b.num_rows => {
                    return Err(CoreError::series("member SpacingInfo does not match the series"));
                }
                _ => {}
            }
            if first.data_type() != member.data_type() {
                return Err(CoreError::series("member DataType does not match the series"));
            }
            if let (Some(a), Some(b)) = (first.timing(), member.timing()) {
                if a.step != b.step {
                    return Err(CoreError::series("member sample step does not match the series"));
                }
            }
        }

        // Step 5: no time overlap, members stay ordered by start.
        let member_start = member.start_time();
        let insertion_index = match self
            .members
            .binary_search_by(|m| m.start_time().cmp(&member_start))
        {
            Ok(_) => {
                return Err(CoreError::series(messages::SERIES_NOT_ORDERED));
            }
            Err(i) => i,
        };
        if let Some(before) = insertion_index.checked_sub(1).and_then(|i| self.members.get(i)) {
            if let (Some(before_timing), Some(_)) = (before.timing(), member.timing()) {
                let before_end = before_timing.end()?;
                if before_end > member_start {
                    return Err(CoreError::series("member time span overlaps an existing member"));
                }
            }
        }
        if let Some(after) = self.members.get(insertion_index) {
            if let Some(member_timing) = member.timing() {
                let member_end = member_timing.end()?;
                if member_end > after.start_time() {
                    return Err(CoreError::series("member time span overlaps an existing member"));
                }
            }
        }

        // A member whose start is off the common grid still has to land
        // somewhere on the synthesized timeline: fail now, at insert time,
        // if snapping it up would overflow rather than only discovering
        // that when `synthesized_timing` is later called.
        if let (Some(origin), Some(member_timing)) =
            (self.members.first().and_then(UnitaryFile::timing), member.timing())
        {
            snap_start_up(member_timing.start, origin.start, origin.step)?;
        }

        if self.processing_history_tag.is_none() {
            self.processing_history_tag = Some(processing_history_tag.to_string());
        }
        self.members.insert(insertion_index, member);
        self.modified = true;
        Ok(())
    }

    /// The offset, in grid steps from the first member's start, at which
    /// `member_index` begins. A member whose raw start falls off the
    /// common grid is snapped up to the next grid position first (see
    /// `snap_start_up`), so the division by `origin.step` below is always
    /// exact.
    fn member_offset(&self, member_index: usize) -> CoreResult<u64> {
        let origin = self.members[0]
            .timing()
            .ok_or_else(|| CoreError::series("series member has no TimingInfo"))?;
        let member = self.members[member_index]
            .timing()
            .ok_or_else(|| CoreError::series("series member has no TimingInfo"))?;
        let snapped_start = snap_start_up(member.start, origin.start, origin.step)?;
        let delta = snapped_start.checked_sub(origin.start)?;
        let steps = delta.checked_div(origin.step)?;
        if steps.den() != 1 || steps.num() < 0 {
            return Err(CoreError::series(
                "member start could not be snapped onto the series' common sample grid",
            ));
        }
        Ok(steps.num() as u64)
    }

    /// A single `TimingInfo` spanning every member's timespan, with the
    /// indices between members marked `BLANK` — members never overlap,
    /// but need not be contiguous. Sample count comes from the snapped
    /// member offsets rather than from dividing the raw end-to-start span
    /// by the step, since a member's raw start may itself be off-grid.
    pub fn synthesized_timing(&self) -> CoreResult<TimingInfo> {
        let first = self
            .members
            .first()
            .ok_or_else(|| CoreError::series("series has no members"))?
            .timing()
            .ok_or_else(|| CoreError::series("series member has no TimingInfo"))?;

        let mut blank = Vec::new();
        let mut cursor = 0u64;
        for member_index in 0..self.members.len() {
            let offset = self.member_offset(member_index)?;
            if offset > cursor {
                blank.extend(cursor..offset);
            }
            let timing = self.members[member_index].timing().unwrap();
            cursor = offset + timing.num_samples;
        }
        let num_samples = cursor;

        TimingInfo::new(first.start, first.step, num_samples, [], [], blank)
    }

    /// Maps a global sample index on the synthesized grid to `(member_index,
    /// local_index)`. Indices that fall in an inter-member gap have no
    /// owning member and are reported as a `UserInput` error.
    pub fn dataset_index(&self, global_index: u64) -> CoreResult<(usize, u64)> {
        for member_index in 0..self.members.len() {
            let offset = self.member_offset(member_index)?;
            let timing = self
                .members[member_index]
                .timing()
                .ok_or_else(|| CoreError::series("series member has no TimingInfo"))?;
            if global_index >= offset && global_index < offset + timing.num_samples {
                return Ok((member_index, global_index - offset));
            }
        }
        Err(CoreError::user_input("global index falls in a gap between series members"))
    }

    pub fn total_samples(&self) -> CoreResult<u64> {
        Ok(self.synthesized_timing()?.num_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::movie::{MovieCreateOptions, MovieFile, MovieWriter};
    use crate::image::{Image, VideoFrame};
    use crate::spacing::MicronPoint;
    use crate::timing::FrameKind;
    use tempfile::tempdir;

    fn spacing() -> SpacingInfo {
        SpacingInfo::new(
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
        .unwrap()
    }

    fn write_movie_with_step(
        dir: &std::path::Path,
        name: &str,
        start: Rational,
        step: Rational,
        n: u64,
    ) -> MovieFile {
        let path = dir.join(name);
        let sp = spacing();
        let t = TimingInfo::new(Time::new(start, 0), step, n, [], [], []).unwrap();
        let mut w = MovieWriter::create(&path, t, sp, DataType::U8, MovieCreateOptions::default()).unwrap();
        for i in 0..n {
            let data = vec![0u8; 4];
            let image = Image::new(sp, DataType::U8, 1, 2, data).unwrap();
            w.write_frame(&VideoFrame::valid(image, Time::epoch(), i)).unwrap();
        }
        w.close_for_writing(None).unwrap();
        MovieFile::open(&path).unwrap()
    }

    fn write_movie(dir: &std::path::Path, name: &str, start_secs: i64, n: u64) -> MovieFile {
        write_movie_with_step(dir, name, Rational::from_int(start_secs), Rational::from_int(1), n)
    }

    #[test]
    fn new_generates_distinct_ids() {
        let a = Series::new("recording");
        let b = Series::new("recording");
        assert_ne!(a.id(), b.id());
        assert!(uuid::Uuid::parse_str(a.id()).is_ok());
    }

    #[test]
    fn insert_builds_an_ordered_composite() {
        let dir = tempdir().unwrap();
        let mut series = Series::new("recording");
        let second = write_movie(dir.path(), "b.isxd", 5, 5);
        let first = write_movie(dir.path(), "a.isxd", 0, 5);
        series.insert(UnitaryFile::Movie(second), "raw").unwrap();
        series.insert(UnitaryFile::Movie(first), "raw").unwrap();
        assert_eq!(series.members().len(), 2);
        assert_eq!(series.total_samples().unwrap(), 10);
        assert_eq!(series.dataset_index(7).unwrap(), (1, 2));
    }

    #[test]
    fn s3_series_synthesizes_blank_filled_grid() {
        let dir = tempdir().unwrap();
        let mut series = Series::new("recording");
        let step = Rational::new(1, 20).unwrap();
        let t0 = Rational::from_int(1_700_000_000);
        let a = write_movie_with_step(dir.path(), "a.isxd", t0, step, 3);
        let b = write_movie_with_step(dir.path(), "b.isxd", t0.checked_add(Rational::from_int(60)).unwrap(), step, 4);
        let c = write_movie_with_step(dir.path(), "c.isxd", t0.checked_add(Rational::from_int(120)).unwrap(), step, 5);
        series.insert(UnitaryFile::Movie(a), "raw").unwrap();
        series.insert(UnitaryFile::Movie(b), "raw").unwrap();
        series.insert(UnitaryFile::Movie(c), "raw").unwrap();
        assert_eq!(series.total_samples().unwrap(), 2405);
        let synthesized = series.synthesized_timing().unwrap();
        assert_eq!(synthesized.kind(0), FrameKind::Valid);
        assert_eq!(synthesized.kind(3), FrameKind::Blank);
        assert_eq!(series.dataset_index(0).unwrap(), (0, 0));
        assert_eq!(series.dataset_index(1200).unwrap(), (1, 0));
        assert!(series.dataset_index(3).is_err());
    }

    #[test]
    fn overlapping_members_are_rejected() {
        let dir = tempdir().unwrap();
        let mut series = Series::new("recording");
        let a = write_movie(dir.path(), "a.isxd", 0, 5);
        let b = write_movie(dir.path(), "b.isxd", 2, 5);
        series.insert(UnitaryFile::Movie(a), "raw").unwrap();
        let err = series.insert(UnitaryFile::Movie(b), "raw").unwrap_err();
        assert!(matches!(err, CoreError::Series(_)));
    }

    #[test]
    fn mismatched_modality_is_rejected() {
        let dir = tempdir().unwrap();
        let mut series = Series::new("recording");
        let a = write_movie(dir.path(), "a.isxd", 0, 5);
        series.insert(UnitaryFile::Movie(a), "raw").unwrap();

        let ev_path = dir.path().join("events.isxd");
        let w = crate::container::events::EventsWriter::create(
            &ev_path,
            Time::epoch(),
            vec!["chan".into()],
        )
        .unwrap();
        w.close_for_writing().unwrap();
        let events = crate::container::events::EventsFile::open(&ev_path).unwrap();

        let err = series.insert(UnitaryFile::Events(events), "raw").unwrap_err();
        assert!(matches!(err, CoreError::Series(_)));
    }

    #[test]
    fn snap_start_up_lands_on_next_grid_point() {
        let grid_start = Time::new(Rational::from_int(0), 0);
        let step = Rational::new(1, 1).unwrap();
        let snapped = snap_start_up(Time::new(Rational::new(5, 2).unwrap(), 0), grid_start, step).unwrap();
        assert_eq!(snapped, Time::new(Rational::from_int(3), 0));
    }

    #[test]
    fn snap_start_up_is_identity_on_grid() {
        let grid_start = Time::new(Rational::from_int(0), 0);
        let step = Rational::new(1, 1).unwrap();
        let snapped = snap_start_up(Time::new(Rational::from_int(4), 0), grid_start, step).unwrap();
        assert_eq!(snapped, Time::new(Rational::from_int(4), 0));
    }

    #[test]
    fn insert_snaps_an_off_grid_member_start_up() {
        let dir = tempdir().unwrap();
        let mut series = Series::new("recording");
        let step = Rational::new(1, 20).unwrap();
        let a = write_movie_with_step(dir.path(), "a.isxd", Rational::from_int(0), step, 3);
        // b starts a third of a step past the 3rd grid position (0.15s):
        // should snap up to the 4th position (0.2s) rather than being
        // rejected as unaligned.
        let off_grid_start = Rational::new(16, 100).unwrap();
        let b = write_movie_with_step(dir.path(), "b.isxd", off_grid_start, step, 2);

        series.insert(UnitaryFile::Movie(a), "raw").unwrap();
        series.insert(UnitaryFile::Movie(b), "raw").unwrap();

        assert_eq!(series.dataset_index(4).unwrap(), (1, 0));
        let synthesized = series.synthesized_timing().unwrap();
        assert_eq!(synthesized.kind(3), FrameKind::Blank);
        assert_eq!(synthesized.kind(4), FrameKind::Valid);
    }
}
