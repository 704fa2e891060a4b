//! # bastion-contracts
//!
//! Shared types and error contracts for the BASTION permission engine.
//!
//! All crates in the workspace import from here. Apart from name
//! normalization and default-policy resolution, no logic lives in this
//! crate.

pub mod decision;
pub mod effective;
pub mod error;
pub mod key;
pub mod node;
pub mod principal;

#[cfg(test)]
mod tests {
    use super::*;
    use error::BastionError;
    use key::PermissionKey;
    use node::{DefaultPolicy, PermissionNode};
    use principal::AttachmentId;

    // ── PermissionKey ────────────────────────────────────────────────────────

    #[test]
    fn key_is_lower_cased_and_trimmed() {
        let key = PermissionKey::new("  World.Build ").unwrap();
        assert_eq!(key.as_str(), "world.build");
        assert_eq!(key, PermissionKey::new("WORLD.BUILD").unwrap());
        assert_eq!(PermissionKey::new(" build").unwrap(), PermissionKey::new("build").unwrap());
        assert_eq!(PermissionKey::new("chat. send").unwrap().as_str(), "chat. send");
    }

    #[test]
    fn key_rejects_empty_names() {
        for name in ["", "   ", "\t"] {
            match PermissionKey::new(name) {
                Err(BastionError::InvalidArgument { reason }) => {
                    assert!(reason.contains("empty"), "unexpected reason: {reason}");
                }
                other => panic!("expected InvalidArgument for {name:?}, got {:?}", other),
            }
        }
    }

    #[test]
    fn key_deserializes_through_normalization() {
        let key: PermissionKey = serde_json::from_str("\"Chat.Color\"").unwrap();
        assert_eq!(key.as_str(), "chat.color");

        let empty: Result<PermissionKey, _> = serde_json::from_str("\"\"");
        assert!(empty.is_err(), "empty names must not deserialize");
    }

    // ── DefaultPolicy ────────────────────────────────────────────────────────

    #[test]
    fn default_policy_resolution_table() {
        assert!(DefaultPolicy::AlwaysTrue.resolve(false));
        assert!(DefaultPolicy::AlwaysTrue.resolve(true));
        assert!(!DefaultPolicy::AlwaysFalse.resolve(false));
        assert!(!DefaultPolicy::AlwaysFalse.resolve(true));
        assert!(DefaultPolicy::TrueIfOperator.resolve(true));
        assert!(!DefaultPolicy::TrueIfOperator.resolve(false));
        assert!(DefaultPolicy::TrueIfNotOperator.resolve(false));
        assert!(!DefaultPolicy::TrueIfNotOperator.resolve(true));
    }

    #[test]
    fn default_policy_accepts_legacy_spellings() {
        assert_eq!("OP".parse::<DefaultPolicy>().unwrap(), DefaultPolicy::TrueIfOperator);
        assert_eq!("isop".parse::<DefaultPolicy>().unwrap(), DefaultPolicy::TrueIfOperator);
        assert_eq!("!op".parse::<DefaultPolicy>().unwrap(), DefaultPolicy::TrueIfNotOperator);
        assert_eq!(
            "not_operator".parse::<DefaultPolicy>().unwrap(),
            DefaultPolicy::TrueIfNotOperator
        );
        assert_eq!(" True ".parse::<DefaultPolicy>().unwrap(), DefaultPolicy::AlwaysTrue);
        assert!("sometimes".parse::<DefaultPolicy>().is_err());
    }

    #[test]
    fn default_policy_defaults_to_operator_only() {
        assert_eq!(DefaultPolicy::default(), DefaultPolicy::TrueIfOperator);
    }

    // ── PermissionNode ───────────────────────────────────────────────────────

    #[test]
    fn node_children_are_normalized_and_last_write_wins() {
        let node = PermissionNode::new("World.Build", DefaultPolicy::AlwaysTrue)
            .unwrap()
            .child("World.Break", true)
            .unwrap()
            .child("world.break", false)
            .unwrap();

        assert_eq!(node.name.as_str(), "world.build");
        assert_eq!(node.children.len(), 1);
        assert_eq!(
            node.children.get(&PermissionKey::new("world.break").unwrap()),
            Some(&false)
        );
    }

    #[test]
    fn node_deserializes_with_defaults() {
        let node: PermissionNode =
            serde_json::from_str(r#"{ "name": "Chat.Send" }"#).unwrap();
        assert_eq!(node.name.as_str(), "chat.send");
        assert_eq!(node.default, DefaultPolicy::TrueIfOperator);
        assert!(node.children.is_empty());
        assert!(node.description.is_none());
    }

    // ── AttachmentId ─────────────────────────────────────────────────────────

    #[test]
    fn attachment_id_new_produces_unique_values() {
        let ids: std::collections::HashSet<AttachmentId> =
            (0..100).map(|_| AttachmentId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    // ── BastionError display messages ────────────────────────────────────────

    #[test]
    fn error_not_attached_display() {
        let err = BastionError::NotAttached {
            attachment: "a-1".to_string(),
            principal: "player:alex".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a-1"));
        assert!(msg.contains("player:alex"));
    }

    #[test]
    fn error_invalid_owner_display() {
        let err = BastionError::InvalidOwner {
            owner: "worldguard".to_string(),
            reason: "owner is disabled".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("worldguard"));
        assert!(msg.contains("disabled"));
    }

    #[test]
    fn error_scheduling_failed_display() {
        let err = BastionError::SchedulingFailed {
            reason: "scheduler is shut down".to_string(),
        };
        assert!(err.to_string().contains("could not schedule attachment expiry"));
    }

    #[test]
    fn error_registry_cycle_display() {
        let err = BastionError::RegistryCycle {
            permission: "x".to_string(),
        };
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn error_config_error_display() {
        let err = BastionError::ConfigError {
            reason: "missing registry path".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("configuration error"));
        assert!(msg.contains("missing registry path"));
    }
}
