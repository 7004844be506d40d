//! EventsFile v2: sparse, multi-channel, microsecond-timestamped samples.
//! GPIO and IMU recordings are both persisted in this same wire format,
//! distinguished only by `type_tag` and channel naming convention.
//!
//! Grounded on `examples/original_source/test/GpioFileTest.cpp`'s
//! `isAnalog()`/`numberOfChannels()`/`getChannelList()`/`getLogicalData(name)`
//! surface, which this module's `EventsFile` reproduces directly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::container::envelope::{EnvelopeReader, EnvelopeWriter};
use crate::error::{CoreError, CoreResult};
use crate::extra_properties::ExtraProperties;
use crate::time::Time;
use crate::trace::LogicalTrace;

const EVENTS_TYPE_TAG: &str = "events";
const GPIO_TYPE_TAG: &str = "gpio";
const IMU_TYPE_TAG: &str = "imu";
const CURRENT_VERSION: u32 = 2;
const PACKET_BYTES: u64 = 8 + 4 + 4; // offset_us: u64, value: f32, channel_index: u32

/// Standard IMU channel names, in read order, for files opened with
/// `EventsFile::open_imu`.
pub const IMU_CHANNEL_NAMES: &[&str] = &[
    "accel.x",
    "accel.y",
    "accel.z",
    "mag.x",
    "mag.y",
    "mag.z",
    "orient.w",
    "orient.x",
    "orient.y",
    "orient.z",
];

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct EventsHeaderJson {
    version: u32,
    #[serde(rename = "type")]
    type_tag: String,
    channel_names: Vec<String>,
    /// Per channel, the constant offset delta between consecutive samples,
    /// in microseconds, or 0 if the channel has fewer than two samples or
    /// its spacing isn't constant.
    sampling_steps_us: Vec<u64>,
    start: Time,
    extra_properties: serde_json::Value,
}

/// Tracks whether a channel's offsets land on a regular grid as packets
/// are written, so the step can be stamped into the header on close
/// without a second pass over the payload.
struct ChannelStepTracker {
    last_offset_us: Option<u64>,
    step_us: Option<u64>,
    regular: bool,
}

impl ChannelStepTracker {
    fn new() -> Self {
        Self {
            last_offset_us: None,
            step_us: None,
            regular: true,
        }
    }

    fn observe(&mut self, offset_us: u64) {
        if let Some(last) = self.last_offset_us {
            let delta = offset_us - last;
            match self.step_us {
                None => self.step_us = Some(delta),
                Some(step) if step == delta => {}
                Some(_) => self.regular = false,
            }
        }
        self.last_offset_us = Some(offset_us);
    }

    fn sampling_step_us(&self) -> u64 {
        if self.regular {
            self.step_us.unwrap_or(0)
        } else {
            0
        }
    }
}

pub struct EventsWriter {
    envelope: EnvelopeWriter,
    type_tag: String,
    channel_names: Vec<String>,
    start: Time,
    extra_properties: ExtraProperties,
    last_offset_us: Vec<Option<u64>>,
    step_trackers: Vec<ChannelStepTracker>,
}

impl EventsWriter {
    pub fn create(
        path: impl AsRef<Path>,
        start: Time,
        channel_names: Vec<String>,
    ) -> CoreResult<Self> {
        Self::create_tagged(path, start, channel_names, EVENTS_TYPE_TAG)
    }

    pub fn create_gpio(
        path: impl AsRef<Path>,
        start: Time,
        channel_names: Vec<String>,
    ) -> CoreResult<Self> {
        Self::create_tagged(path, start, channel_names, GPIO_TYPE_TAG)
    }

    pub fn create_imu(path: impl AsRef<Path>, start: Time) -> CoreResult<Self> {
        let names: Vec<String> = IMU_CHANNEL_NAMES.iter().map(|s| s.to_string()).collect();
        Self::create_tagged(path, start, names, IMU_TYPE_TAG)
    }

    fn create_tagged(
        path: impl AsRef<Path>,
        start: Time,
        channel_names: Vec<String>,
        type_tag: &str,
    ) -> CoreResult<Self> {
        if channel_names.is_empty() {
            return Err(CoreError::user_input("an events file needs at least one channel"));
        }
        let n = channel_names.len();
        Ok(Self {
            envelope: EnvelopeWriter::create(path)?,
            type_tag: type_tag.to_string(),
            channel_names,
            start,
            extra_properties: ExtraProperties::default(),
            last_offset_us: vec![None; n],
            step_trackers: (0..n).map(|_| ChannelStepTracker::new()).collect(),
        })
    }

    pub fn set_extra_properties(&mut self, properties: ExtraProperties) {
        self.extra_properties = properties;
    }

    /// Appends one sample. `offset_us` is microseconds since `start` and
    /// must not decrease within the same channel.
    pub fn write_packet(&mut self, channel_index: u32, offset_us: u64, value: f32) -> CoreResult<()> {
        let idx = channel_index as usize;
        let last = self
            .last_offset_us
            .get(idx)
            .copied()
            .ok_or_else(|| CoreError::user_input("channel index out of range"))?;
        if let Some(last) = last {
            if offset_us < last {
                return Err(CoreError::user_input(
                    "events must be written in non-decreasing offset order per channel",
                ));
            }
        }
        self.envelope.write_payload(&offset_us.to_le_bytes())?;
        self.envelope.write_payload(&value.to_le_bytes())?;
        self.envelope.write_payload(&channel_index.to_le_bytes())?;
        self.last_offset_us[idx] = Some(offset_us);
        self.step_trackers[idx].observe(offset_us);
        Ok(())
    }

    pub fn close_for_writing(self) -> CoreResult<PathBuf> {
        let path = self.envelope.path().to_path_buf();
        let sampling_steps_us = self.step_trackers.iter().map(ChannelStepTracker::sampling_step_us).collect();
        let header = EventsHeaderJson {
            version: CURRENT_VERSION,
            type_tag: self.type_tag,
            channel_names: self.channel_names,
            sampling_steps_us,
            start: self.start,
            extra_properties: self.extra_properties.to_value().clone(),
        };
        self.envelope.seal(&header)?;
        Ok(path)
    }
}

pub struct EventsFile {
    reader: EnvelopeReader,
    header: EventsHeaderJson,
}

impl EventsFile {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let reader = EnvelopeReader::open(path)?;
        let header: EventsHeaderJson = reader.header()?;
        if header.version != CURRENT_VERSION {
            return Err(CoreError::data_io_at(
                format!("unknown EventsFile version {}", header.version),
                path,
            ));
        }
        if ![EVENTS_TYPE_TAG, GPIO_TYPE_TAG, IMU_TYPE_TAG].contains(&header.type_tag.as_str()) {
            return Err(CoreError::data_io_at(
                format!("unrecognized events type tag '{}'", header.type_tag),
                path,
            ));
        }
        if reader.payload().len() as u64 % PACKET_BYTES != 0 {
            return Err(CoreError::data_io_at(
                "events payload size is not a whole number of packets",
                path,
            ));
        }
        Ok(Self { reader, header })
    }

    pub fn start(&self) -> Time {
        self.header.start
    }

    pub fn is_gpio(&self) -> bool {
        self.header.type_tag == GPIO_TYPE_TAG
    }

    pub fn is_imu(&self) -> bool {
        self.header.type_tag == IMU_TYPE_TAG
    }

    /// `true` when this file carries exactly one channel, matching the
    /// legacy "analog GPIO" interpretation where a single dense channel is
    /// read as `LogicalTrace` values keyed by sample index rather than by
    /// channel name.
    pub fn is_analog(&self) -> bool {
        self.num_channels() == 1
    }

    pub fn num_channels(&self) -> usize {
        self.header.channel_names.len()
    }

    pub fn channel_names(&self) -> &[String] {
        &self.header.channel_names
    }

    /// Number of samples recorded on the named channel.
    pub fn channel_count(&self, name: &str) -> CoreResult<u64> {
        let target = self.channel_index(name)?;
        let num_packets = self.reader.payload().len() as u64 / PACKET_BYTES;
        let mut count = 0u64;
        for i in 0..num_packets as usize {
            let (_, _, channel_index) = self.read_packet(i);
            if channel_index == target {
                count += 1;
            }
        }
        Ok(count)
    }

    /// The named channel's constant sample spacing in microseconds, or 0
    /// if it has fewer than two samples or isn't evenly spaced.
    pub fn sampling_step_us(&self, name: &str) -> CoreResult<u64> {
        let idx = self.channel_index(name)? as usize;
        Ok(self.header.sampling_steps_us[idx])
    }

    pub fn extra_properties(&self) -> CoreResult<ExtraProperties> {
        ExtraProperties::from_value(self.header.extra_properties.clone())
    }

    fn channel_index(&self, name: &str) -> CoreResult<u32> {
        self.header
            .channel_names
            .iter()
            .position(|c| c == name)
            .map(|i| i as u32)
            .ok_or_else(|| CoreError::user_input(format!("unknown channel '{name}'")))
    }

    fn read_packet(&self, i: usize) -> (u64, f32, u32) {
        let bytes = self.reader.payload();
        let start = i * PACKET_BYTES as usize;
        let offset_us = u64::from_le_bytes(bytes[start..start + 8].try_into().unwrap());
        let value = f32::from_le_bytes(bytes[start + 8..start + 12].try_into().unwrap());
        let channel_index = u32::from_le_bytes(bytes[start + 12..start + 16].try_into().unwrap());
        (offset_us, value, channel_index)
    }

    pub fn read_channel(&self, name: &str) -> CoreResult<LogicalTrace> {
        let target = self.channel_index(name)?;
        let num_packets = self.reader.payload().len() as u64 / PACKET_BYTES;
        let mut points = Vec::new();
        for i in 0..num_packets as usize {
            let (offset_us, value, channel_index) = self.read_packet(i);
            if channel_index != target {
                continue;
            }
            let t = self
                .header
                .start
                .checked_add(crate::rational::Rational::new(offset_us as i64, 1_000_000)?)?;
            points.push((t, value));
        }
        Ok(LogicalTrace::new(name, points))
    }
}
