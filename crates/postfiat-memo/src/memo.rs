//! The memo field triple and its hex wire form.

use serde::{Deserialize, Serialize};

/// A decoded memo: the three UTF-8 fields attached to a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Memo {
    pub memo_type: String,
    pub memo_format: String,
    pub memo_data: String,
}

impl Memo {
    pub fn new(
        memo_type: impl Into<String>,
        memo_format: impl Into<String>,
        memo_data: impl Into<String>,
    ) -> Self {
        Self {
            memo_type: memo_type.into(),
            memo_format: memo_format.into(),
            memo_data: memo_data.into(),
        }
    }

    /// Hex-encode all three fields for on-ledger transport.
    pub fn to_wire(&self) -> WireMemo {
        WireMemo {
            memo_type: hex::encode_upper(self.memo_type.as_bytes()),
            memo_format: hex::encode_upper(self.memo_format.as_bytes()),
            memo_data: hex::encode_upper(self.memo_data.as_bytes()),
        }
    }
}

/// The hex-encoded memo triple as it appears inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WireMemo {
    #[serde(rename = "MemoType", default, skip_serializing_if = "String::is_empty")]
    pub memo_type: String,
    #[serde(rename = "MemoFormat", default, skip_serializing_if = "String::is_empty")]
    pub memo_format: String,
    #[serde(rename = "MemoData", default, skip_serializing_if = "String::is_empty")]
    pub memo_data: String,
}

impl WireMemo {
    /// Hex-decode back to text. Fields that are not valid hex or not valid
    /// UTF-8 decode to a lossy string rather than failing the whole memo.
    pub fn decode(&self) -> Memo {
        Memo {
            memo_type: decode_hex_field(&self.memo_type),
            memo_format: decode_hex_field(&self.memo_format),
            memo_data: decode_hex_field(&self.memo_data),
        }
    }
}

fn decode_hex_field(field: &str) -> String {
    match hex::decode(field) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip() {
        let memo = Memo::new("2025-01-01_10:00__AA00", "alice", "REQUEST_POST_FIAT ___ report");
        let wire = memo.to_wire();
        assert!(wire.memo_type.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(wire.decode(), memo);
    }

    #[test]
    fn lower_case_hex_decodes() {
        let wire = WireMemo {
            memo_type: hex::encode("HANDSHAKE"),
            memo_format: String::new(),
            memo_data: String::new(),
        };
        assert_eq!(wire.decode().memo_type, "HANDSHAKE");
    }

    #[test]
    fn invalid_hex_passes_through() {
        let wire = WireMemo {
            memo_type: "not-hex".to_string(),
            memo_format: String::new(),
            memo_data: String::new(),
        };
        assert_eq!(wire.decode().memo_type, "not-hex");
    }
}
