use crate::config::Config;
use crate::decoder::{decode, DecodeError};
use crate::envelope::{build_envelope, EnvelopeContext};
use crate::publisher::Publisher;
use crate::registry::Registry;
use crate::stats::Stats;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Bind the listening socket with the configured backlog applied.
/// `tokio::net::TcpListener::bind` has no backlog parameter of its own
/// (it always asks the OS for the platform default), so the socket is
/// built and `listen()`-ed through `socket2` first, grounded in the
/// teacher's `udp_receiver.rs::bind_reuseport` (raw `socket2::Socket`
/// construction, then handed to a tokio socket type via `from_std`).
fn bind_with_backlog(addr: &str, backlog: u32) -> anyhow::Result<TcpListener> {
    let parsed: SocketAddr = addr.parse()?;

    let socket = socket2::Socket::new(
        match parsed {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_nonblocking(true)?;
    socket.bind(&parsed.into())?;
    socket.listen(backlog as i32)?;

    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}

/// Spawn the TCP frame server: one accept loop, one task per
/// connection, each connection reads exactly one frame
/// (`tcp_module.py`'s `thread_function` — a single blocking `recv`,
/// never a read loop; this protocol is one frame per session).
pub async fn spawn_server(
    config: Arc<Config>,
    registry: Arc<Registry>,
    stats: Arc<Stats>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let addr = config.listen_addr();
    let listener = bind_with_backlog(&addr, config.backlog)?;
    info!(addr = %addr, backlog = config.backlog, "TCP frame server started");

    let connection_seq = Arc::new(AtomicU64::new(0));

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "client connected");
                    stats.record_connection();

                    let config = config.clone();
                    let registry = registry.clone();
                    let stats = stats.clone();
                    let seq = connection_seq.fetch_add(1, Ordering::Relaxed);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, config, registry, stats, seq).await {
                            debug!(peer = %peer, error = %e, "connection ended with error");
                        }
                        debug!(peer = %peer, "client disconnected");
                    });
                }
                Err(e) => {
                    warn!(error = %e, "TCP accept error");
                }
            }
        }
    });

    Ok(handle)
}

/// ACCEPTED → READ → DECODED → PUBLISHED → CLOSED, per `spec.md` §5.
async fn handle_connection(
    mut stream: TcpStream,
    config: Arc<Config>,
    registry: Arc<Registry>,
    stats: Arc<Stats>,
    connection_seq: u64,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; config.buffer_size];

    let read_result = tokio::time::timeout(
        Duration::from_secs(config.read_timeout_secs),
        stream.read(&mut buf),
    )
    .await;

    let n = match read_result {
        Ok(Ok(0)) => return Ok(()), // client closed without sending anything
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            warn!(timeout_secs = config.read_timeout_secs, "read timed out");
            return Ok(());
        }
    };

    stats.record_read(n);

    let raw = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s.trim(),
        Err(_) => {
            stats.record_decode_error();
            warn!("connection sent non-UTF-8 bytes, discarding");
            return Ok(());
        }
    };

    let frame = match decode(raw, &registry) {
        Ok(frame) => frame,
        Err(e) => {
            stats.record_decode_error();
            warn!(error = %e, kind = decode_error_kind(&e), "frame decode failed");
            return Ok(());
        }
    };

    stats.record_decoded(frame.unknown_frame_type, frame.unknown_sensor.is_some());
    if frame.unknown_frame_type {
        warn!(mote_id = %frame.mote_id, "unrecognized frame type");
    }
    if let Some(sensor_id) = frame.unknown_sensor {
        warn!(mote_id = %frame.mote_id, sensor_id, "unrecognized sensor id, payload truncated at this point");
    }

    let now = envelope_timestamp();
    let ctx = EnvelopeContext {
        descriptor: &config.descriptor,
        sensor_name: &config.sensor_name,
        sensor_model: &config.sensor_model,
        room: &config.room,
        protocol: &config.protocol,
        broker: &config.broker,
        topic: &config.topic_measurements,
    };
    let envelope = build_envelope(&frame, &ctx, now.0, now.1);

    let payload = match serde_json::to_vec(&envelope) {
        Ok(p) => p,
        Err(e) => {
            stats.record_publish_error();
            warn!(error = %e, "failed to serialize envelope");
            return Ok(());
        }
    };

    let client_id = format!("{}-{}", config.mqtt_client_id, connection_seq);
    match Publisher::connect(
        &client_id,
        &config.broker,
        config.mqtt_port,
        Duration::from_secs(config.mqtt_keep_alive_secs),
    )
    .await
    {
        Ok(publisher) => {
            match publisher.publish(&config.topic_measurements, payload).await {
                Ok(()) => {
                    stats.record_publish_success();
                }
                Err(e) => {
                    stats.record_publish_error();
                    warn!(error = %e, "MQTT publish failed");
                }
            }
            publisher.stop().await;
        }
        Err(e) => {
            stats.record_publish_error();
            warn!(error = %e, "MQTT connect failed");
        }
    }

    Ok(())
}

fn decode_error_kind(err: &DecodeError) -> &'static str {
    match err {
        DecodeError::MalformedHex => "malformed_hex",
        DecodeError::BadMagic => "bad_magic",
        DecodeError::MissingSeparator => "missing_separator",
        DecodeError::TruncatedPayload => "truncated_payload",
    }
}

/// Wall-clock date/time strings for the envelope's metadata block,
/// matching `tcp_module.py`'s `%Y-%m-%d` / `%H:%M:%S.%f`-trimmed-to-
/// tenths formatting. `spec.md` keeps the decoder/envelope builder a
/// pure function, so the one piece of ambient state — "now" — is read
/// here, at the I/O edge, and threaded in rather than sourced deep
/// inside `build_envelope`.
fn envelope_timestamp() -> (String, String) {
    let now = chrono::Utc::now();
    let date = now.format("%Y-%m-%d").to_string();
    let time = now.format("%H:%M:%S%.1f").to_string();
    (date, time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_kind_covers_all_fatal_variants() {
        assert_eq!(decode_error_kind(&DecodeError::MalformedHex), "malformed_hex");
        assert_eq!(decode_error_kind(&DecodeError::BadMagic), "bad_magic");
        assert_eq!(
            decode_error_kind(&DecodeError::MissingSeparator),
            "missing_separator"
        );
        assert_eq!(
            decode_error_kind(&DecodeError::TruncatedPayload),
            "truncated_payload"
        );
    }

    #[test]
    fn test_now_produces_plausible_date_shape() {
        let (date, time) = envelope_timestamp();
        assert_eq!(date.len(), 10);
        assert_eq!(&date[4..5], "-");
        assert_eq!(&date[7..8], "-");
        assert!(time.len() >= 10);
    }
}
