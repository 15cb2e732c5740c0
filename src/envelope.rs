use crate::decoder::{DecodedFrame, MeasurementValue, ScalarValue};
use serde::Serialize;
use std::collections::BTreeMap;

/// Metadata block, matching `tcp_module.py`'s `to_mqtt_broker` JSON
/// shape field-for-field (`spec.md` §6.3).
#[derive(Debug, Serialize, PartialEq)]
pub struct Metadata {
    pub date: String,
    pub time: String,
    pub descriptor: String,
    #[serde(rename = "sensor name")]
    pub sensor_name: String,
    #[serde(rename = "sensor model")]
    pub sensor_model: String,
    pub room: String,
    pub protocol: String,
    pub broker: String,
    pub topic: String,
}

/// Outgoing publish envelope, `spec.md` §6.3. `data` keys are the
/// sensors' ASCII IDs in ascending binary-ID order — a `BTreeMap`
/// gives that ordering deterministically without an extra sort step.
#[derive(Debug, Serialize, PartialEq)]
pub struct Envelope {
    pub metadata: Metadata,
    pub data: BTreeMap<String, String>,
}

/// Static configuration needed to fill an envelope's metadata block —
/// everything that doesn't change frame to frame.
pub struct EnvelopeContext<'a> {
    pub descriptor: &'a str,
    pub sensor_name: &'a str,
    pub sensor_model: &'a str,
    pub room: &'a str,
    pub protocol: &'a str,
    pub broker: &'a str,
    pub topic: &'a str,
}

/// Build the publish envelope for a decoded frame.
///
/// `date`/`time` are passed in rather than sourced from `SystemNow`
/// internally, keeping this function a pure formatter (`spec.md` §9 —
/// time is the one piece of real-world state the decoder/envelope
/// layer must accept from its caller, never read for itself).
pub fn build_envelope(frame: &DecodedFrame, ctx: &EnvelopeContext, date: String, time: String) -> Envelope {
    let mut data = BTreeMap::new();

    for measurement in &frame.measurements {
        let formatted = format_value(&measurement.value);
        let entry = format!("{} {}", formatted, measurement.descriptor.unit);
        data.insert(measurement.descriptor.ascii_id.clone(), entry);
    }

    Envelope {
        metadata: Metadata {
            date,
            time,
            descriptor: ctx.descriptor.to_string(),
            sensor_name: ctx.sensor_name.to_string(),
            sensor_model: ctx.sensor_model.to_string(),
            room: ctx.room.to_string(),
            protocol: ctx.protocol.to_string(),
            broker: ctx.broker.to_string(),
            topic: ctx.topic.to_string(),
        },
        data,
    }
}

/// Render one scalar's natural representation. `spec.md` §3 calls
/// `decimal_precision` a "suggested rendering precision (not enforced
/// by the decoder)" — the grounding source (`tcp_module.py`'s
/// `decode()`, `f"{measure[1]} {measure[0].unit}"`) interpolates the
/// raw decoded number with no precision applied, so this does the same.
fn format_scalar(scalar: &ScalarValue) -> String {
    match scalar {
        ScalarValue::U8(v) => v.to_string(),
        ScalarValue::U16(v) => v.to_string(),
        ScalarValue::U32(v) => v.to_string(),
        ScalarValue::U64(v) => v.to_string(),
        ScalarValue::I16(v) => v.to_string(),
        ScalarValue::I32(v) => v.to_string(),
        ScalarValue::F32(v) => v.to_string(),
    }
}

fn format_value(value: &MeasurementValue) -> String {
    match value {
        MeasurementValue::Scalar(s) => format_scalar(s),
        MeasurementValue::Vector(values) => values
            .iter()
            .map(format_scalar)
            .collect::<Vec<_>>()
            .join(","),
        MeasurementValue::Text(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{decode, FrameEncoding, FrameKind};
    use crate::registry::Registry;

    fn registry_with_battery() -> Registry {
        let json = serde_json::json!({
            "sensors": [
                {"binary_id": 52, "ascii_id": "BAT", "name": "Battery level", "unit": "%", "field_count": 1, "field_type": "u8", "decimal_precision": 0},
                {"binary_id": 0, "ascii_id": "CO", "name": "Carbon Monoxide", "unit": "ppm", "field_count": 1, "field_type": "f32", "field_width": 4, "decimal_precision": 2}
            ]
        });
        let mut path = std::env::temp_dir();
        path.push(format!(
            "libellium-envelope-test-{}-{:?}.json",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, json.to_string()).unwrap();
        let reg = Registry::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        reg
    }

    #[test]
    fn test_envelope_shape_matches_spec() {
        let registry = registry_with_battery();
        let mut hex = String::from("3C3D3E06");
        hex.push_str("00");
        hex.push_str(&"00".repeat(8));
        hex.push_str("23");
        hex.push_str("00");
        hex.push_str("34"); // sensor 52 = BAT
        hex.push_str("64"); // 100

        let frame = decode(&hex, &registry).unwrap();
        assert_eq!(frame.frame_type.encoding, FrameEncoding::Binary);
        assert_eq!(frame.frame_type.kind, FrameKind::Information);

        let ctx = EnvelopeContext {
            descriptor: "libellium-desc-v1",
            sensor_name: "waspmote-01",
            sensor_model: "waspmote-plug-sense",
            room: "office-3",
            protocol: "TCP",
            broker: "mqtt://localhost:1883",
            topic: "measurements",
        };
        let envelope = build_envelope(&frame, &ctx, "2026-07-28".to_string(), "10:00:00.0".to_string());

        assert_eq!(envelope.metadata.room, "office-3");
        assert_eq!(envelope.metadata.sensor_name, "waspmote-01");
        assert_eq!(envelope.data.get("BAT"), Some(&"100 %".to_string()));

        let serialized = serde_json::to_value(&envelope).unwrap();
        assert_eq!(serialized["metadata"]["sensor model"], "waspmote-plug-sense");
        assert_eq!(serialized["data"]["BAT"], "100 %");
    }

    #[test]
    fn test_float_value_is_rendered_unrounded() {
        // `spec.md` §3: decimal_precision is a rendering hint, "not
        // enforced by the decoder" — and §8 scenario 5's own worked
        // example (`TC: 22.5` -> `"22.5 ºC"`) renders the raw value
        // rather than padding/rounding to the descriptor's precision.
        let registry = registry_with_battery();
        let mut hex = String::from("3C3D3E06");
        hex.push_str("00");
        hex.push_str(&"00".repeat(8));
        hex.push_str("23");
        hex.push_str("00");
        hex.push_str("00"); // sensor 0 = CO, decimal_precision = 2
        hex.push_str(&hex::encode(22.5f32.to_le_bytes()));

        let frame = decode(&hex, &registry).unwrap();
        let ctx = EnvelopeContext {
            descriptor: "d",
            sensor_name: "s",
            sensor_model: "m",
            room: "r",
            protocol: "TCP",
            broker: "b",
            topic: "t",
        };
        let envelope = build_envelope(&frame, &ctx, "2026-07-28".to_string(), "10:00:00.0".to_string());
        assert_eq!(envelope.data.get("CO"), Some(&"22.5 ppm".to_string()));
    }

    #[test]
    fn test_data_keys_are_ordered_ascending_by_ascii_id() {
        // BTreeMap orders by key, not insertion order — with ascii_ids
        // "BAT" and "CO" this happens to coincide with ascending binary
        // ID too, but the ordering guarantee is alphabetic on the key.
        let registry = registry_with_battery();
        let mut hex = String::from("3C3D3E06");
        hex.push_str("00");
        hex.push_str(&"00".repeat(8));
        hex.push_str("23");
        hex.push_str("00");
        hex.push_str("34"); // BAT
        hex.push_str("64");
        hex.push_str("00"); // CO
        hex.push_str(&hex::encode(0.0f32.to_le_bytes()));

        let frame = decode(&hex, &registry).unwrap();
        let keys: Vec<&String> = frame
            .measurements
            .iter()
            .map(|m| &m.descriptor.ascii_id)
            .collect();
        assert_eq!(keys, vec!["BAT", "CO"]);

        let ctx = EnvelopeContext {
            descriptor: "d",
            sensor_name: "s",
            sensor_model: "m",
            room: "r",
            protocol: "TCP",
            broker: "b",
            topic: "t",
        };
        let envelope = build_envelope(&frame, &ctx, "2026-07-28".to_string(), "10:00:00.0".to_string());
        let ordered_keys: Vec<&String> = envelope.data.keys().collect();
        assert_eq!(ordered_keys, vec!["BAT", "CO"]);
    }
}
