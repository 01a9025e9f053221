//! Minimum-PFT requirements on memo-bearing payments.
//!
//! Sends to node-controlled addresses must carry a signalling amount of PFT
//! before the queues will act on them; system memos (handshakes, rites,
//! doc links) are exempt, and the whole gate can be switched off on
//! testnet.

use crate::constants::SYSTEM_MEMO_TYPES;
use crate::{NetworkConfig, NodeConfig, RuntimeConfig};

/// Types of special addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// Each node has an address.
    Node,
    /// Each node may have a separate address for its remembrancer.
    Remembrancer,
    /// There's only one PFT issuer per network.
    Issuer,
    /// Any other address, including users.
    Other,
}

impl AddressType {
    /// Base PFT requirement for payments addressed to this kind of account.
    const fn base_pft_requirement(&self) -> f64 {
        match self {
            Self::Node | Self::Remembrancer => 1.0,
            Self::Issuer | Self::Other => 0.0,
        }
    }
}

/// Per-address minimum-PFT policy.
#[derive(Debug, Clone)]
pub struct TransactionRequirements {
    node_address: String,
    remembrancer_address: Option<String>,
    issuer_address: String,
    disabled: bool,
}

impl TransactionRequirements {
    pub fn new(
        node_address: String,
        remembrancer_address: Option<String>,
        issuer_address: String,
        disabled: bool,
    ) -> Self {
        Self {
            node_address,
            remembrancer_address,
            issuer_address,
            disabled,
        }
    }

    /// Build from the loaded configs. The disable switch only takes effect
    /// on testnet.
    pub fn from_configs(
        network: &NetworkConfig,
        node: &NodeConfig,
        runtime: &RuntimeConfig,
    ) -> Self {
        Self::new(
            node.node_address.clone(),
            node.remembrancer_address.clone(),
            network.issuer_address.clone(),
            runtime.use_testnet && runtime.disable_pft_requirements,
        )
    }

    pub fn address_type(&self, address: &str) -> AddressType {
        if address == self.node_address {
            AddressType::Node
        } else if self.remembrancer_address.as_deref() == Some(address) {
            AddressType::Remembrancer
        } else if address == self.issuer_address {
            AddressType::Issuer
        } else {
            AddressType::Other
        }
    }

    /// The PFT a payment to `address` must carry before the engine acts on
    /// its memo. System memo types never require PFT.
    pub fn pft_requirement(&self, address: &str, memo_type: Option<&str>) -> f64 {
        if self.disabled {
            return 0.0;
        }
        if let Some(memo_type) = memo_type {
            if SYSTEM_MEMO_TYPES.contains(&memo_type) {
                return 0.0;
            }
        }
        self.address_type(address).base_pft_requirement()
    }

    /// Whether a payment carrying `pft_amount` satisfies the requirement.
    pub fn meets_requirement(
        &self,
        address: &str,
        memo_type: Option<&str>,
        pft_amount: f64,
    ) -> bool {
        pft_amount >= self.pft_requirement(address, memo_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements(disabled: bool) -> TransactionRequirements {
        TransactionRequirements::new(
            "rNODE".to_string(),
            Some("rREMEMBRANCER".to_string()),
            "rISSUER".to_string(),
            disabled,
        )
    }

    #[test]
    fn address_typing() {
        let reqs = requirements(false);
        assert_eq!(reqs.address_type("rNODE"), AddressType::Node);
        assert_eq!(reqs.address_type("rREMEMBRANCER"), AddressType::Remembrancer);
        assert_eq!(reqs.address_type("rISSUER"), AddressType::Issuer);
        assert_eq!(reqs.address_type("rUSER"), AddressType::Other);
    }

    #[test]
    fn node_and_remembrancer_require_one_pft() {
        let reqs = requirements(false);
        assert_eq!(reqs.pft_requirement("rNODE", Some("2025-01-01_10:00")), 1.0);
        assert_eq!(reqs.pft_requirement("rREMEMBRANCER", None), 1.0);
        assert_eq!(reqs.pft_requirement("rISSUER", None), 0.0);
        assert_eq!(reqs.pft_requirement("rUSER", None), 0.0);
    }

    #[test]
    fn system_memos_are_exempt() {
        let reqs = requirements(false);
        assert_eq!(reqs.pft_requirement("rNODE", Some("HANDSHAKE")), 0.0);
        assert_eq!(reqs.pft_requirement("rNODE", Some("INITIATION_RITE")), 0.0);
        assert_eq!(
            reqs.pft_requirement("rNODE", Some("google_doc_context_link")),
            0.0
        );
    }

    #[test]
    fn disabled_gate_waives_everything() {
        let reqs = requirements(true);
        assert_eq!(reqs.pft_requirement("rNODE", Some("2025-01-01_10:00")), 0.0);
        assert!(reqs.meets_requirement("rNODE", Some("2025-01-01_10:00"), 0.0));
    }

    #[test]
    fn meets_requirement_compares_amounts() {
        let reqs = requirements(false);
        assert!(reqs.meets_requirement("rNODE", Some("2025-01-01_10:00"), 1.0));
        assert!(!reqs.meets_requirement("rNODE", Some("2025-01-01_10:00"), 0.5));
    }

    #[test]
    fn disable_switch_is_testnet_only() {
        let node = crate::NodeConfig {
            node_name: "pf".to_string(),
            node_address: "rNODE".to_string(),
            remembrancer_name: None,
            remembrancer_address: None,
            auto_handshake_addresses: Default::default(),
            schema_extensions: vec![],
        };
        let runtime = crate::RuntimeConfig {
            disable_pft_requirements: true,
            ..Default::default()
        };
        let reqs = TransactionRequirements::from_configs(
            &crate::NetworkConfig::mainnet(),
            &node,
            &runtime,
        );
        // Mainnet ignores the switch.
        assert_eq!(reqs.pft_requirement("rNODE", Some("2025-01-01_10:00")), 1.0);
    }
}
