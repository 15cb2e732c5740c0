use clap::Parser;

/// Edge ingester for Libellium/Waspmote sensor frames: TCP listener,
/// strict frame decoder, MQTT publisher.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Listen address for the TCP frame server
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port for the TCP frame server
    #[arg(long, default_value_t = 9000)]
    pub port: u16,

    /// Pending-connection backlog passed to the listening socket
    #[arg(long, default_value_t = 5)]
    pub backlog: u32,

    /// Max bytes read from one connection before decoding is attempted
    #[arg(long, default_value_t = 1024)]
    pub buffer_size: usize,

    /// Seconds to wait for a frame on a connection before closing it
    #[arg(long, default_value_t = 30)]
    pub read_timeout_secs: u64,

    /// Path to the sensor descriptor JSON file
    #[arg(long, env = "DESCRIPTOR_PATH", default_value = "sensors.json")]
    pub descriptor_path: String,

    /// MQTT broker host
    #[arg(long, env = "BROKER")]
    pub broker: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT client ID prefix (a connection sequence number is appended)
    #[arg(long, default_value = "libellium-ingest")]
    pub mqtt_client_id: String,

    /// MQTT keep-alive interval in seconds
    #[arg(long, default_value_t = 60)]
    pub mqtt_keep_alive_secs: u64,

    /// Topic measurements are published to
    #[arg(long, env = "TOPIC_MEASUREMENTS")]
    pub topic_measurements: String,

    /// Topic reserved for inbound commands (not consumed by this process
    /// — carried through as envelope/config metadata only)
    #[arg(long, env = "TOPIC_COMMANDS")]
    pub topic_commands: String,

    /// Free-text room/location label attached to every published envelope
    #[arg(long, env = "ROOM")]
    pub room: String,

    /// Descriptor set name attached to every published envelope
    #[arg(long, env = "DESCRIPTOR")]
    pub descriptor: String,

    /// Sensor/mote name attached to every published envelope
    #[arg(long, env = "SENSOR_NAME")]
    pub sensor_name: String,

    /// Sensor/mote model attached to every published envelope
    #[arg(long, env = "SENSOR_MODEL")]
    pub sensor_model: String,

    /// Transport protocol label attached to every published envelope
    #[arg(long, env = "PROTOCOL")]
    pub protocol: String,

    /// Stats logging interval in seconds (0 = disabled)
    #[arg(long, default_value_t = 5)]
    pub stats_interval_secs: u64,
}

impl Config {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
