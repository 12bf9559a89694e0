// ABOUTME: Example IMU firmware client streaming orientation and step events over MinBiT
// ABOUTME: Mirrors the reference firmware's poll loop plus a periodic orientation-write timer

//! ## Usage
//!
//! ```bash
//! cargo run --example imu_firmware_client -- --host 127.0.0.1 --port 7777
//! ```

use argh::FromArgs;
use minbit::codec::Quat;
use minbit::schema::PacketSchema;
use minbit::{ClientConfig, TcpClient};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// IMU firmware client: connects once and streams orientation updates
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the driver host to connect to (default: 127.0.0.1)
    #[argh(option)]
    host: Option<String>,

    /// the driver port to connect to (default: 7777)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// orientation update interval in milliseconds (default: 20)
    #[argh(option)]
    orientation_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let host = cli_args.host.unwrap_or_else(|| "127.0.0.1".to_owned());
    let port = cli_args.port.unwrap_or(7777);
    let orientation_interval = Duration::from_millis(cli_args.orientation_interval.unwrap_or(20));

    info!("Connecting to {host}:{port}");

    let client = Arc::new(TcpClient::new("imu-firmware", ClientConfig::default()));
    client.set_schema(PacketSchema::reference_imu_schema());
    client.set_read_handler(|_engine, request| async move {
        info!(header = request.header(), status = ?request.status(), "response received");
    });
    client.begin(&host, port).await.map_err(|e| {
        error!("connect failed: {e}");
        Box::<dyn Error>::from(e.to_string())
    })?;

    info!("Connected; streaming orientation updates every {orientation_interval:?}");

    let mut ticker = interval(orientation_interval);
    let mut step_count: u64 = 0;
    loop {
        ticker.tick().await;
        let Some(engine) = client.protocol().await else {
            warn!("connection dropped");
            break;
        };
        if !engine.is_open() {
            warn!("connection closed by peer");
            break;
        }

        // A stationary identity quaternion stands in for a real sensor read.
        engine.write_byte(0x02).await?;
        engine.write_quat(Quat {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        })
        .await?;
        engine.send_all().await?;

        step_count += 1;
        if step_count % 50 == 0 {
            engine.write_byte(0x03).await?;
            engine.write_u64(step_count).await?;
            engine.send_all().await?;
        }
    }

    client.end().await;
    Ok(())
}
