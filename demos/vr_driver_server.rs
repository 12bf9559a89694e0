// ABOUTME: Example VR driver server accepting IMU connections over MinBiT
// ABOUTME: Answers pings, logs quaternion/step packets, demonstrates the TcpServer harness

//! ## Usage
//!
//! ```bash
//! cargo run --example vr_driver_server -- --port 7777
//! ```

use argh::FromArgs;
use minbit::schema::{PacketSchema, ACK};
use minbit::{ServerConfig, TcpServer};
use std::error::Error;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// VR driver server: accepts IMU connections and answers the reference schema
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// the port to listen on (default: 7777)
    #[argh(option, short = 'p')]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let port = cli_args.port.unwrap_or(7777);
    info!("Starting VR driver server on port {port}");

    let server = Arc::new(TcpServer::new("vr-driver", port, ServerConfig::default()));

    server.set_init_handler(|engine| async move {
        engine.set_schema(PacketSchema::reference_imu_schema());
    });

    server.set_read_handler(|engine, request| async move {
        match request.header() {
            0x01 if request.is_incoming() => {
                info!(id = request.id(), "ping received, replying ack");
                let _ = engine.write_byte(ACK).await;
                let _ = engine.send_all().await;
            }
            0x02 => {
                if let Ok(quat) = engine.read_quat().await {
                    info!(?quat, "imu orientation update");
                }
            }
            0x03 => {
                if let Ok(delta_ns) = engine.read_u64().await {
                    info!(delta_ns, "step event");
                }
            }
            header => {
                info!(header, status = ?request.status(), "unhandled request");
            }
        }
    });

    server.begin().await?;
    info!("Server listening; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.end().await;

    Ok(())
}
