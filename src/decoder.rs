use crate::registry::{FieldType, Registry, SensorDescriptor};
use thiserror::Error;

/// Frame encoding, per `spec.md` §6.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    Binary,
    Ascii,
}

/// Frame kind, per `spec.md` §6.1. `Unknown` is the soft-failure case —
/// the decoder records the raw byte and keeps going rather than
/// aborting the frame (`spec.md` §4.2: "Unknown value → UnknownFrameType
/// (non-fatal)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Information,
    TimeOut,
    Event,
    Alarm,
    Service1,
    Service2,
    TimeSync,
    AesEcbV15,
    Aes128EcbV12,
    Aes192EcbV12,
    Aes256EcbV12,
    Aes128EcbEndToEndV15,
    Aes128EcbEndToEndV12,
    Unknown(u8),
}

/// `(encoding, kind)` pair, per `spec.md` §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameType {
    pub encoding: FrameEncoding,
    pub kind: FrameKind,
}

/// Authoritative frame-type byte table, `spec.md` §6.1.
fn frame_type_for(byte: u8) -> FrameType {
    use FrameEncoding::*;
    use FrameKind::*;

    let (encoding, kind) = match byte {
        0x00 => (Binary, Information),
        0x01 => (Binary, TimeOut),
        0x02 => (Binary, Event),
        0x03 => (Binary, Alarm),
        0x04 => (Binary, Service1),
        0x05 => (Binary, Service2),
        0x06..=0x08 => (Binary, Information),
        0x60 => (Binary, AesEcbV15),
        0x61 => (Binary, Aes128EcbV12),
        0x62 => (Binary, Aes192EcbV12),
        0x63 => (Binary, Aes256EcbV12),
        0x64 => (Binary, Aes128EcbEndToEndV15),
        0x65 => (Binary, Aes128EcbEndToEndV12),
        0x80 => (Ascii, Information),
        0x81 => (Ascii, TimeOut),
        0x82 => (Ascii, Event),
        0x83 => (Ascii, Alarm),
        0x84 => (Ascii, Service1),
        0x85 => (Ascii, Service2),
        0x86..=0x88 => (Ascii, Information),
        0x9b => (Ascii, TimeSync),
        other => (Binary, Unknown(other)),
    };

    FrameType { encoding, kind }
}

/// A single decoded scalar — one element of a fixed-width field.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I16(i16),
    I32(i32),
    F32(f32),
}

/// Value of one decoded [`Measurement`] — a scalar, a fixed-length
/// vector of scalars (GPS's two `f32` fields, the accelerometer's
/// three `i16` fields), or a NUL-terminated string.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementValue {
    Scalar(ScalarValue),
    Vector(Vec<ScalarValue>),
    Text(String),
}

/// `(SensorDescriptor, value)` pair, `spec.md` §3.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub descriptor: SensorDescriptor,
    pub value: MeasurementValue,
}

/// Fully decoded Libellium frame, `spec.md` §3.
///
/// Built once inside one ingest task and consumed by JSON serialization
/// — never shared across tasks.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame_type: FrameType,
    /// 1-byte length field from the header. Read but never used to
    /// bound payload reads — the decoder relies on end-of-input
    /// instead (`spec.md` §9 open question, resolved: this matches
    /// the original `edge/libellium/libellium.py` behavior, which
    /// never checks `number_of_bytes` against the actual payload span).
    pub declared_byte_count: u8,
    /// Big-endian concatenation of the 8 serial bytes (`spec.md` §9:
    /// preserved as-is per the open question on serial-ID endianness).
    pub serial_id: u64,
    pub mote_id: String,
    pub sequence: u8,
    pub measurements: Vec<Measurement>,
    /// Set when the frame-type byte wasn't in the authoritative table
    /// (`spec.md` §4.2 soft failure). The frame is still returned.
    pub unknown_frame_type: bool,
    /// Set to the unrecognized sensor ID that cut payload decoding
    /// short, if any (`spec.md` §4.2/§7 soft failure).
    pub unknown_sensor: Option<u8>,
}

/// Fatal decode failures, `spec.md` §7. The two soft outcomes
/// (`UnknownFrameType`, `UnknownSensorId`) are not represented here —
/// they surface as fields on [`DecodedFrame`] instead, since the
/// decoder still returns a (partial) frame for those.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("hex string is malformed: odd length or non-hex characters")]
    MalformedHex,
    #[error("frame does not start with the '<=>' magic sequence")]
    BadMagic,
    #[error("mote ID separator '#' not found within 16 bytes of the header")]
    MissingSeparator,
    #[error("payload ends before a sensor's declared fields were fully read")]
    TruncatedPayload,
}

const MAGIC: [u8; 3] = [0x3c, 0x3d, 0x3e];
const MAX_MOTE_ID_LEN: usize = 16;
const SEPARATOR: u8 = 0x23; // '#'
const STRING_TERMINATOR: u8 = 0x00;

/// Decode a hex-encoded Libellium frame.
///
/// Pure function: no I/O, no retained state (`spec.md` §4.2). Fatal
/// grammar violations (`spec.md` §7) return `Err`; unrecognized frame
/// types and sensor IDs are soft failures recorded on the returned
/// frame instead.
pub fn decode(hex_frame: &str, registry: &Registry) -> Result<DecodedFrame, DecodeError> {
    let bytes = tokenize(hex_frame)?;
    let (mut frame, payload_start) = parse_header(&bytes)?;
    parse_payload(&bytes, payload_start, registry, &mut frame)?;
    Ok(frame)
}

/// Split a hex string into bytes. Odd length or non-hex characters are
/// fatal (`spec.md` §4.2 "Tokenization").
fn tokenize(hex_frame: &str) -> Result<Vec<u8>, DecodeError> {
    if hex_frame.len() % 2 != 0 {
        return Err(DecodeError::MalformedHex);
    }
    hex::decode(hex_frame).map_err(|_| DecodeError::MalformedHex)
}

/// Parse the fixed-then-variable header, `spec.md` §4.2.
///
/// Returns the partially-populated frame and the index of the first
/// payload byte.
fn parse_header(bytes: &[u8]) -> Result<(DecodedFrame, usize), DecodeError> {
    if bytes.len() < 3 || bytes[0..3] != MAGIC {
        return Err(DecodeError::BadMagic);
    }

    if bytes.len() < 5 {
        return Err(DecodeError::TruncatedPayload);
    }
    let type_byte = bytes[3];
    let frame_type = frame_type_for(type_byte);
    let unknown_frame_type = matches!(frame_type.kind, FrameKind::Unknown(_));

    let declared_byte_count = bytes[4];

    if bytes.len() < 13 {
        return Err(DecodeError::TruncatedPayload);
    }
    let serial_id = u64::from_be_bytes(bytes[5..13].try_into().unwrap());

    // Mote ID: bytes until '#', at most 16 bytes of scanning.
    let mut mote_id_bytes = Vec::with_capacity(MAX_MOTE_ID_LEN);
    let mut index = 13;
    let mut found_separator = false;
    while index < bytes.len() && mote_id_bytes.len() <= MAX_MOTE_ID_LEN {
        if bytes[index] == SEPARATOR {
            found_separator = true;
            break;
        }
        mote_id_bytes.push(bytes[index]);
        index += 1;
    }
    if !found_separator {
        return Err(DecodeError::MissingSeparator);
    }
    let mote_id = String::from_utf8_lossy(&mote_id_bytes).into_owned();

    index += 1; // consume '#'

    if index >= bytes.len() {
        return Err(DecodeError::TruncatedPayload);
    }
    let sequence = bytes[index];
    index += 1;

    let frame = DecodedFrame {
        frame_type,
        declared_byte_count,
        serial_id,
        mote_id,
        sequence,
        measurements: Vec::new(),
        unknown_frame_type,
        unknown_sensor: None,
    };

    Ok((frame, index))
}

/// Parse the variable payload, `spec.md` §4.2.
///
/// Stops (leaving the partial measurement list in place) on an
/// unrecognized sensor ID — a soft failure, not an `Err`. A fixed-width
/// read that would overrun the remaining bytes is fatal
/// (`TruncatedPayload`): a sensor that announced itself has to be
/// fully readable, or the frame as a whole is unusable.
fn parse_payload(
    bytes: &[u8],
    start: usize,
    registry: &Registry,
    frame: &mut DecodedFrame,
) -> Result<(), DecodeError> {
    let mut index = start;

    while index < bytes.len() {
        let sensor_id = bytes[index];
        let cursor_after_id = index + 1;

        let descriptor = match registry.lookup(sensor_id) {
            Some(d) => d.clone(),
            None => {
                frame.unknown_sensor = Some(sensor_id);
                break;
            }
        };

        let (value, next_index) = read_measurement(bytes, cursor_after_id, &descriptor)
            .ok_or(DecodeError::TruncatedPayload)?;
        index = next_index;
        frame.measurements.push(Measurement { descriptor, value });
    }

    Ok(())
}

/// Read one sensor's fields starting at `index` (just past the sensor
/// ID byte). Returns `(value, next_index)`, or `None` if the payload
/// ends before the declared fields could be fully read.
fn read_measurement(
    bytes: &[u8],
    index: usize,
    descriptor: &SensorDescriptor,
) -> Option<(MeasurementValue, usize)> {
    if descriptor.field_type == FieldType::String {
        return read_string(bytes, index).map(|(s, next)| (MeasurementValue::Text(s), next));
    }

    let width = descriptor.effective_width()? as usize;

    if descriptor.field_count <= 1 {
        let (scalar, next) = read_scalar(bytes, index, descriptor.field_type, width)?;
        Some((MeasurementValue::Scalar(scalar), next))
    } else {
        let mut values = Vec::with_capacity(descriptor.field_count as usize);
        let mut cursor = index;
        for _ in 0..descriptor.field_count {
            let (scalar, next) = read_scalar(bytes, cursor, descriptor.field_type, width)?;
            values.push(scalar);
            cursor = next;
        }
        Some((MeasurementValue::Vector(values), cursor))
    }
}

/// Read a NUL-terminated string: bytes up to (and consuming) the first
/// `0x00`. `spec.md` §4.1: "bytes until first 0x00, inclusive of
/// terminator in the consumed span."
fn read_string(bytes: &[u8], index: usize) -> Option<(String, usize)> {
    let mut cursor = index;
    let mut out = Vec::new();
    loop {
        let byte = *bytes.get(cursor)?;
        cursor += 1;
        if byte == STRING_TERMINATOR {
            break;
        }
        out.push(byte);
    }
    Some((String::from_utf8_lossy(&out).into_owned(), cursor))
}

/// Decode one fixed-width scalar field per the `spec.md` §4.1 table.
fn read_scalar(
    bytes: &[u8],
    index: usize,
    field_type: FieldType,
    width: usize,
) -> Option<(ScalarValue, usize)> {
    let end = index.checked_add(width)?;
    let slice = bytes.get(index..end)?;

    let scalar = match field_type {
        FieldType::U8 => ScalarValue::U8(slice[0]),
        FieldType::U16 => ScalarValue::U16(u16::from_le_bytes(slice.try_into().ok()?)),
        FieldType::U32 => ScalarValue::U32(u32::from_le_bytes(slice.try_into().ok()?)),
        FieldType::U64 => ScalarValue::U64(u64::from_le_bytes(slice.try_into().ok()?)),
        FieldType::I16 => match width {
            1 => ScalarValue::I16(slice[0] as i8 as i16),
            2 => ScalarValue::I16(i16::from_le_bytes(slice.try_into().ok()?)),
            _ => return None,
        },
        FieldType::I32 => match width {
            2 => {
                let v = i16::from_le_bytes(slice.try_into().ok()?);
                ScalarValue::I32(v as i32)
            }
            4 => ScalarValue::I32(i32::from_le_bytes(slice.try_into().ok()?)),
            _ => return None,
        },
        FieldType::F32 => ScalarValue::F32(f32::from_le_bytes(slice.try_into().ok()?)),
        FieldType::String => unreachable!("string fields are handled by read_string"),
    };

    Some((scalar, end))
}
