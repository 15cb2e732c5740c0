use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Connection return codes, mirroring the broker's CONNACK codes
/// (`mqttx.py`'s `RETURN_CODES` table). Used only for diagnostic
/// logging — `rumqttc` already turns a rejected CONNACK into a
/// `ConnectionError` we surface as [`PublisherError::Connect`].
#[allow(dead_code)]
fn connect_return_code_text(code: u8) -> &'static str {
    match code {
        0 => "connection accepted",
        1 => "connection refused: incorrect protocol version",
        2 => "connection refused: invalid client identifier",
        3 => "connection refused: server unavailable",
        4 => "connection refused: bad username or password",
        5 => "connection refused: not authorized",
        _ => "connection refused: unrecognized return code",
    }
}

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("failed to connect to MQTT broker {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: rumqttc::ConnectionError,
    },
    #[error("failed to publish to topic '{topic}': {source}")]
    Publish {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
    #[error("no topic configured for this publish")]
    TopicUnspecified,
    #[error("failed to subscribe to topic '{topic}': {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },
}

/// One short-lived MQTT publish session, grounded in `tcp_module.py`'s
/// `to_mqtt_broker`: connect, publish a single message, disconnect —
/// never a long-lived shared client across ingest tasks.
pub struct Publisher {
    client: AsyncClient,
    eventloop_handle: tokio::task::JoinHandle<()>,
}

impl Publisher {
    /// Open a fresh connection to the broker. Blocks until the
    /// CONNACK arrives (or the connection fails).
    pub async fn connect(
        client_id: &str,
        host: &str,
        port: u16,
        keep_alive: Duration,
    ) -> Result<Self, PublisherError> {
        let mut opts = MqttOptions::new(client_id, host, port);
        opts.set_keep_alive(keep_alive);
        opts.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(opts, 16);

        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!(code = ?ack.code, "MQTT connected");
            }
            Ok(other) => {
                debug!(event = ?other, "unexpected first MQTT event, proceeding");
            }
            Err(source) => {
                return Err(PublisherError::Connect {
                    host: host.to_string(),
                    port,
                    source,
                });
            }
        }

        let eventloop_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => debug!(event = ?event, "MQTT event"),
                    Err(e) => {
                        warn!(error = %e, "MQTT event loop ended");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            client,
            eventloop_handle,
        })
    }

    /// Publish one payload, fire-and-forget (QoS 0), per `spec.md` §4.3.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublisherError> {
        if topic.is_empty() {
            return Err(PublisherError::TopicUnspecified);
        }

        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|source| PublisherError::Publish {
                topic: topic.to_string(),
                source,
            })
    }

    /// Register a topic on the active session, per `spec.md` §4.3. Not
    /// exercised on the ingest hot path (`TOPIC_COMMANDS` is carried
    /// through as config/envelope metadata only, per `spec.md` §6.4),
    /// but kept as part of the Publisher Client's public contract —
    /// grounded in the teacher's `transport_mqtt.rs::spawn_mqtt_subscriber`,
    /// which calls `client.subscribe(&topic, QoS::AtMostOnce)` the same way.
    pub async fn subscribe(&self, topic: &str) -> Result<(), PublisherError> {
        if topic.is_empty() {
            return Err(PublisherError::TopicUnspecified);
        }

        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|source| PublisherError::Subscribe {
                topic: topic.to_string(),
                source,
            })
    }

    /// Tear the session down. The event loop task is aborted rather
    /// than joined — QoS 0 gives no delivery acknowledgment to wait
    /// for, so there is nothing left to drain once `publish` returns.
    pub async fn stop(self) {
        self.eventloop_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_return_code_text_covers_known_codes() {
        assert_eq!(connect_return_code_text(0), "connection accepted");
        assert_eq!(
            connect_return_code_text(5),
            "connection refused: not authorized"
        );
        assert_eq!(
            connect_return_code_text(200),
            "connection refused: unrecognized return code"
        );
    }
}
