use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Field element type a sensor's payload bytes decode into.
///
/// Closed alphabet — the decoder dispatches on this with a `match`,
/// never on the raw descriptor strings (`spec.md` §9: "tagged
/// variants... decoder dispatch becomes a match on the variant").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    U8,
    U16,
    U32,
    U64,
    I16,
    I32,
    F32,
    String,
}

impl FieldType {
    /// Fixed byte width for this type, or `None` for the variable-width
    /// `String` type (terminated by `0x00`, not length-prefixed).
    ///
    /// `I32` is the one type whose width isn't implied by the variant —
    /// some Libellium sensors pack a 2-byte signed value into what the
    /// wire calls an `int`; the descriptor's `field_width` carries the
    /// real width and is preferred over this default.
    pub fn default_width(self) -> Option<u8> {
        match self {
            FieldType::U8 => Some(1),
            FieldType::U16 => Some(2),
            FieldType::U32 => Some(4),
            FieldType::U64 => Some(8),
            FieldType::I16 => Some(2),
            FieldType::I32 => Some(4),
            FieldType::F32 => Some(4),
            FieldType::String => None,
        }
    }
}

/// Static metadata describing how to decode one sensor's payload record.
///
/// Immutable for the process lifetime once loaded (`spec.md` §3/§9 —
/// "model as a value created during initialization and handed by
/// shared read-only reference to each worker").
#[derive(Debug, Clone, Deserialize)]
pub struct SensorDescriptor {
    pub binary_id: u8,
    pub ascii_id: String,
    pub name: String,
    #[serde(default)]
    pub reference: String,
    pub unit: String,
    pub field_count: u8,
    pub field_type: FieldType,
    /// Bytes per field when fixed-width. Ignored (and may be omitted)
    /// for `field_type = String`.
    #[serde(default)]
    pub field_width: u8,
    #[serde(default)]
    pub decimal_precision: u8,
}

impl SensorDescriptor {
    /// Effective byte width per field, falling back to the type's
    /// natural width when the descriptor doesn't override it.
    pub fn effective_width(&self) -> Option<u8> {
        if self.field_width > 0 {
            Some(self.field_width)
        } else {
            self.field_type.default_width()
        }
    }
}

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    sensors: Vec<SensorDescriptor>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read sensor descriptor file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse sensor descriptor file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("sensor descriptor file {path} contains no sensors")]
    Empty { path: String },
}

/// Read-only table of sensor descriptors keyed by binary ID.
///
/// Populated once at startup (`spec.md` §4.1) and shared across ingest
/// tasks behind an `Arc` — never mutated, so no lock is needed.
#[derive(Debug)]
pub struct Registry {
    sensors: HashMap<u8, SensorDescriptor>,
}

impl Registry {
    /// Load the descriptor table from a JSON file shaped
    /// `{"sensors": [...]}`, one record per `SensorDescriptor` field.
    ///
    /// Fails fast on a missing file or malformed record — a bad
    /// descriptor table should never be discovered mid-flight by a
    /// worker task.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.display().to_string();

        let raw = std::fs::read_to_string(path_ref).map_err(|source| RegistryError::Read {
            path: path_str.clone(),
            source,
        })?;

        let file: DescriptorFile =
            serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                path: path_str.clone(),
                source,
            })?;

        if file.sensors.is_empty() {
            return Err(RegistryError::Empty { path: path_str });
        }

        let sensors = file
            .sensors
            .into_iter()
            .map(|s| (s.binary_id, s))
            .collect();

        Ok(Self { sensors })
    }

    /// `lookup(binary_id) -> SensorDescriptor | NotFound`, per `spec.md` §4.1.
    pub fn lookup(&self, binary_id: u8) -> Option<&SensorDescriptor> {
        self.sensors.get(&binary_id)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_json(contents: &str) -> tempfile_path::TempPath {
        tempfile_path::write(contents)
    }

    // Minimal ad-hoc temp-file helper; avoids pulling in a `tempfile`
    // dependency the teacher crate doesn't already carry.
    mod tempfile_path {
        use std::io::Write;
        use std::path::PathBuf;

        pub struct TempPath(pub PathBuf);

        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }

        pub fn write(contents: &str) -> TempPath {
            let mut path = std::env::temp_dir();
            let unique = format!(
                "libellium-registry-test-{}-{:?}.json",
                std::process::id(),
                std::thread::current().id()
            );
            path.push(unique);
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(contents.as_bytes()).unwrap();
            TempPath(path)
        }
    }

    #[test]
    fn test_load_valid_descriptor_file() {
        let json = r#"{
            "sensors": [
                {"binary_id": 52, "ascii_id": "BAT", "name": "Battery level", "unit": "%", "field_count": 1, "field_type": "u8"},
                {"binary_id": 0, "ascii_id": "CO", "name": "Carbon Monoxide", "unit": "ppm", "field_count": 1, "field_type": "f32", "field_width": 4, "decimal_precision": 3}
            ]
        }"#;
        let tmp = write_temp_json(json);
        let registry = Registry::load(&tmp.0).unwrap();
        assert_eq!(registry.len(), 2);
        let bat = registry.lookup(52).unwrap();
        assert_eq!(bat.ascii_id, "BAT");
        assert_eq!(bat.effective_width(), Some(1));
        assert!(registry.lookup(200).is_none());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = Registry::load("/nonexistent/path/sensors.json").unwrap_err();
        assert!(matches!(err, RegistryError::Read { .. }));
    }

    #[test]
    fn test_malformed_json_is_fatal() {
        let tmp = write_temp_json("not json");
        let err = Registry::load(&tmp.0).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }

    #[test]
    fn test_empty_sensor_list_is_fatal() {
        let tmp = write_temp_json(r#"{"sensors": []}"#);
        let err = Registry::load(&tmp.0).unwrap_err();
        assert!(matches!(err, RegistryError::Empty { .. }));
    }

    #[test]
    fn test_string_type_ignores_field_width() {
        let json = r#"{
            "sensors": [
                {"binary_id": 65, "ascii_id": "STR", "name": "String", "unit": "N/A", "field_count": 1, "field_type": "string"}
            ]
        }"#;
        let tmp = write_temp_json(json);
        let registry = Registry::load(&tmp.0).unwrap();
        let str_sensor = registry.lookup(65).unwrap();
        assert_eq!(str_sensor.effective_width(), None);
    }
}
