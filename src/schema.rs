// ABOUTME: PacketSchema maps header bytes to expected payload lengths for the three framing directions
// ABOUTME: Supports construction from literal tables and from an optional JSON document

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{MinBitError, MinBitResult};

/// Marker recorded in a schema table meaning "a u8 length byte follows the header".
pub const VARIABLE_LENGTH: i16 = -1;

/// Standardized response header meaning the peer acknowledged our request.
pub const ACK: u8 = 0x01;
/// Standardized response header meaning the peer rejected our request.
pub const NACK: u8 = 0x02;

/// Static mapping from header byte to expected payload length.
///
/// Three independent tables cover the three ways a header byte can be
/// resolved: as a response to something we sent (checked two ways, by
/// response header first and by our own request header second), or as
/// something the peer initiated unprompted.
#[derive(Debug, Clone, Default)]
pub struct PacketSchema {
    outgoing_by_request: HashMap<u8, i16>,
    outgoing_by_response: HashMap<u8, i16>,
    incoming_by_request: HashMap<u8, i16>,
}

impl PacketSchema {
    /// Start building a schema with all three tables empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the expected response length for a header we send as a request.
    pub fn with_outgoing_by_request(mut self, header: u8, length: i16) -> Self {
        self.outgoing_by_request.insert(header, length);
        self
    }

    /// Register the expected response length keyed by the peer's response header.
    /// Takes priority over `outgoing_by_request` during resolution.
    pub fn with_outgoing_by_response(mut self, header: u8, length: i16) -> Self {
        self.outgoing_by_response.insert(header, length);
        self
    }

    /// Register the expected payload length for a header the peer initiates with.
    pub fn with_incoming_by_request(mut self, header: u8, length: i16) -> Self {
        self.incoming_by_request.insert(header, length);
        self
    }

    /// Whether `header` is recognized as a peer-initiated request header.
    pub fn is_incoming_header(&self, header: u8) -> bool {
        self.incoming_by_request.contains_key(&header)
    }

    /// Whether `header` is registered as something we can initiate as an
    /// outgoing request (ignoring `outgoing_by_response` overrides, which are
    /// keyed on the peer's reply, not on `header` itself).
    pub fn is_outgoing_request_header(&self, header: u8) -> bool {
        self.outgoing_by_request.contains_key(&header)
    }

    /// Resolve the expected payload length for an outgoing request awaiting a response.
    /// Checks `outgoing_by_response[response_header]` first, then
    /// `outgoing_by_request[request_header]`.
    pub fn resolve_outgoing(&self, request_header: u8, response_header: u8) -> Option<i16> {
        self.outgoing_by_response
            .get(&response_header)
            .or_else(|| self.outgoing_by_request.get(&request_header))
            .copied()
    }

    /// Resolve the expected payload length for a peer-initiated request header.
    pub fn resolve_incoming(&self, header: u8) -> Option<i16> {
        self.incoming_by_request.get(&header).copied()
    }

    /// Load (and merge into) this schema from a JSON document. On parse failure the
    /// existing tables are left untouched and an error is returned.
    pub fn load_json_str(&mut self, json: &str) -> MinBitResult<()> {
        let doc: SchemaDocument =
            serde_json::from_str(json).map_err(|e| MinBitError::SchemaLoad(e.to_string()))?;
        self.merge(doc);
        Ok(())
    }

    /// Load (and merge into) this schema from a JSON file on disk.
    pub fn load_json_file(&mut self, path: impl AsRef<Path>) -> MinBitResult<()> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(MinBitError::Io)?;
        self.load_json_str(&contents)
    }

    /// Parse a schema document from a JSON string without touching an existing schema.
    pub fn from_json_str(json: &str) -> MinBitResult<Self> {
        let mut schema = Self::new();
        schema.load_json_str(json)?;
        Ok(schema)
    }

    fn merge(&mut self, doc: SchemaDocument) {
        for entry in doc.outgoing_by_request {
            self.outgoing_by_request.insert(entry.header, entry.length);
        }
        for entry in doc.outgoing_by_response {
            self.outgoing_by_response
                .insert(entry.header, entry.length);
        }
        for entry in doc.incoming_by_request {
            self.incoming_by_request.insert(entry.header, entry.length);
        }
    }

    /// Convenience constructor for the reference IMU schema used in the scenario
    /// tests: PING (0x01, len 0), IMU_QUAT (0x02, len 16), IMU_STEP (0x03, len 8),
    /// each mirrored into `outgoing_by_request` so either side of a loopback pair
    /// can initiate them.
    pub fn reference_imu_schema() -> Self {
        Self::new()
            .with_incoming_by_request(0x01, 0)
            .with_incoming_by_request(0x02, 16)
            .with_incoming_by_request(0x03, 8)
            .with_outgoing_by_request(0x01, 0)
    }
}

#[derive(Debug, Deserialize)]
struct SchemaEntry {
    header: u8,
    length: i16,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SchemaDocument {
    #[serde(default)]
    outgoing_by_request: Vec<SchemaEntry>,
    #[serde(default)]
    outgoing_by_response: Vec<SchemaEntry>,
    #[serde(default)]
    incoming_by_request: Vec<SchemaEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_incoming_fixed_length() {
        let schema = PacketSchema::new().with_incoming_by_request(0x02, 16);
        assert_eq!(schema.resolve_incoming(0x02), Some(16));
        assert_eq!(schema.resolve_incoming(0x99), None);
    }

    #[test]
    fn outgoing_by_response_takes_priority() {
        let schema = PacketSchema::new()
            .with_outgoing_by_request(0x01, 0)
            .with_outgoing_by_response(0x01, 4);
        assert_eq!(schema.resolve_outgoing(0x01, 0x01), Some(4));
    }

    #[test]
    fn outgoing_falls_back_to_request_header() {
        let schema = PacketSchema::new().with_outgoing_by_request(0x01, 0);
        assert_eq!(schema.resolve_outgoing(0x01, 0xAA), Some(0));
    }

    #[test]
    fn variable_length_marker_round_trips_through_json() {
        let json = r#"{
            "incomingByRequest": [ { "header": 16, "length": -1 } ]
        }"#;
        let schema = PacketSchema::from_json_str(json).unwrap();
        assert_eq!(schema.resolve_incoming(0x10), Some(VARIABLE_LENGTH));
    }

    #[test]
    fn malformed_json_leaves_existing_tables_untouched() {
        let mut schema = PacketSchema::new().with_incoming_by_request(0x01, 0);
        let result = schema.load_json_str("{ not json");
        assert!(result.is_err());
        assert_eq!(schema.resolve_incoming(0x01), Some(0));
    }

    #[test]
    fn is_incoming_header_checks_membership() {
        let schema = PacketSchema::new().with_incoming_by_request(0x02, 16);
        assert!(schema.is_incoming_header(0x02));
        assert!(!schema.is_incoming_header(0x03));
    }

    #[test]
    fn is_outgoing_request_header_ignores_response_overrides() {
        let schema = PacketSchema::new()
            .with_outgoing_by_request(0x01, 0)
            .with_outgoing_by_response(0x00, 4);
        assert!(schema.is_outgoing_request_header(0x01));
        // 0x00 only appears as a response override, not a request header.
        assert!(!schema.is_outgoing_request_header(0x00));
    }
}
