//! Free-form acquisition metadata carried through read/write cycles.
//!
//! Adapted from `rust_daq::metadata::Metadata`/`MetadataBuilder` (a flat
//! struct of known fields over a `serde_json::Value` parameters bag): here
//! the *whole* document is loosely typed JSON, because the key families
//! here are nested (`probe.name`, `idps.cellset.method`, ...). Typed
//! accessors read/write specific paths; every other key is left untouched,
//! so round-tripping through a reader/writer pair never drops metadata an
//! accessor doesn't know about.

use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// A JSON object carrying acquisition metadata. Always a `Value::Object`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtraProperties(Value);

impl Default for ExtraProperties {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl ExtraProperties {
    pub fn from_value(value: Value) -> CoreResult<Self> {
        if !value.is_object() {
            return Err(CoreError::data_io("extraProperties must be a JSON object"));
        }
        Ok(Self(value))
    }

    pub fn to_value(&self) -> &Value {
        &self.0
    }

    /// Reads a dot-separated path, e.g. `"idps.cellset.method"`.
    pub fn get_raw(&self, path: &str) -> Option<&Value> {
        let mut current = &self.0;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Writes a dot-separated path, creating intermediate objects as
    /// needed. Only the given path is touched; every other key (known or
    /// unknown to this crate) is preserved.
    pub fn set_raw(&mut self, path: &str, value: Value) {
        let mut current = &mut self.0;
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments[..segments.len() - 1] {
            let obj = current
                .as_object_mut()
                .expect("ExtraProperties invariant: always an object");
            current = obj
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        if let Some(obj) = current.as_object_mut() {
            obj.insert(segments[segments.len() - 1].to_string(), value);
        }
    }

    fn get_str(&self, path: &str) -> Option<String> {
        self.get_raw(path)?.as_str().map(str::to_owned)
    }

    fn get_f64(&self, path: &str) -> Option<f64> {
        self.get_raw(path)?.as_f64()
    }

    fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_raw(path)?.as_bool()
    }

    // -- probe.* --
    pub fn probe_name(&self) -> Option<String> {
        self.get_str("probe.name")
    }
    pub fn probe_id(&self) -> Option<String> {
        self.get_str("probe.id")
    }
    pub fn probe_type(&self) -> Option<String> {
        self.get_str("probe.type")
    }
    pub fn probe_length(&self) -> Option<f64> {
        self.get_f64("probe.length")
    }
    pub fn probe_diameter(&self) -> Option<f64> {
        self.get_f64("probe.diameter")
    }

    // -- microscope.* --
    pub fn microscope_type(&self) -> Option<String> {
        self.get_str("microscope.type")
    }
    pub fn microscope_focus(&self) -> Option<f64> {
        self.get_f64("microscope.focus")
    }
    pub fn microscope_down_sampling_factor(&self) -> Option<f64> {
        self.get_f64("microscope.downSamplingFactor")
    }
    pub fn microscope_widefield(&self) -> Option<bool> {
        self.get_bool("microscope.widefield")
    }
    pub fn microscope_dual_color(&self, field: &str) -> Option<Value> {
        self.get_raw(&format!("microscope.dualColor.{field}")).cloned()
    }

    // -- idps.* --
    pub fn idps_integrated_base_plate(&self) -> Option<bool> {
        self.get_bool("idps.integratedBasePlate")
    }
    pub fn idps_pixels_per_cm(&self) -> Option<f64> {
        self.get_f64("idps.pixelsPerCm")
    }
    pub fn idps_spatial_downsampling(&self) -> Option<f64> {
        self.get_f64("idps.spatialDownsampling")
    }
    pub fn idps_temporal_downsampling(&self) -> Option<f64> {
        self.get_f64("idps.temporalDownsampling")
    }
    pub fn idps_pre_mc(&self) -> Option<bool> {
        self.get_bool("idps.pre_mc")
    }
    pub fn idps_mc_padding(&self) -> Option<Value> {
        self.get_raw("idps.mc_padding").cloned()
    }
    pub fn idps_interpolated_frames(&self) -> Option<Value> {
        self.get_raw("idps.interpolatedFrames").cloned()
    }
    pub fn idps_channel(&self) -> Option<String> {
        self.get_str("idps.channel")
    }
    pub fn idps_efocus(&self) -> Option<f64> {
        self.get_f64("idps.efocus")
    }
    pub fn idps_cellset(&self) -> Option<Value> {
        self.get_raw("idps.cellset").cloned()
    }
    pub fn idps_vesselset(&self) -> Option<Value> {
        self.get_raw("idps.vesselset").cloned()
    }

    /// Deserializes `idps.vesselset` into
    /// [`VesselSetFlags`](crate::container::vesselset::VesselSetFlags).
    /// Returns `Ok(None)` if the key is absent, and an error only if the
    /// value is present but doesn't match that shape.
    pub fn vessel_set_flags(
        &self,
    ) -> CoreResult<Option<crate::container::vesselset::VesselSetFlags>> {
        match self.get_raw("idps.vesselset") {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| CoreError::data_io(format!("idps.vesselset: {e}"))),
        }
    }

    /// Writes `idps.vesselset` from a typed
    /// [`VesselSetFlags`](crate::container::vesselset::VesselSetFlags),
    /// overwriting whatever was there before.
    pub fn set_vessel_set_flags(&mut self, flags: &crate::container::vesselset::VesselSetFlags) {
        let value = serde_json::to_value(flags)
            .unwrap_or_else(|_| Value::Object(Map::new()));
        self.set_raw("idps.vesselset", value);
    }
    pub fn idps_pcaica_estimated(&self) -> Option<bool> {
        self.get_bool("idps.pcaica.estimated")
    }
    pub fn idps_cnmfe_estimated(&self) -> Option<bool> {
        self.get_bool("idps.cnmfe.estimated")
    }

    // -- processingInterface.* / trackingInterface.* / cameraName --
    pub fn processing_interface(&self, field: &str) -> Option<Value> {
        self.get_raw(&format!("processingInterface.{field}")).cloned()
    }
    pub fn tracking_interface(&self, field: &str) -> Option<Value> {
        self.get_raw(&format!("trackingInterface.{field}")).cloned()
    }
    pub fn camera_name(&self) -> Option<String> {
        self.get_str("cameraName")
    }
}
