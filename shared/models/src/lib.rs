//! # BOM Sync Core Domain Models
//!
//! Plain data shared by the BOM engine and its collaborators.
//!
//! ## Key Models
//!
//! - **BomNode**: one node of the arena tree, either a container (levels 1-5)
//!   or a part (levels 6-7) carrying `PartAttributes`
//! - **PartAttributes**: cost, supplier, lifecycle and item status of a part
//! - **DiffRecord**: one discrepancy between the local BOM and an ERP snapshot
//! - **BomError**: the error taxonomy used across the workspace
//!
//! ## Validation
//!
//! `PartAttributes` derives `validator::Validate` (non-empty identifiers,
//! non-negative quantity and cost).

pub mod diff;
pub mod error;
pub mod node;


pub use diff::*;
pub use error::*;
pub use node::*;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_level_round_trip_and_bounds() {
        for raw in 1..=7u8 {
            assert_eq!(Level::from_u8(raw).unwrap().as_u8(), raw);
        }
        assert_eq!(Level::from_u8(0), Err(BomError::InvalidLevel { level: 0 }));
        assert_eq!(Level::from_u8(8), Err(BomError::InvalidLevel { level: 8 }));
        assert!(Level::Primary.is_part());
        assert!(Level::Group.is_container());
        assert_eq!(Level::Group.child(), Some(Level::Primary));
        assert_eq!(Level::Alternate.child(), None);
    }

    #[test]
    fn test_node_kind_matches_level() {
        let attrs = PartAttributes::new("CPU-A", "CPU", 2599.0);
        assert!(BomNode::part(NodeId(0), None, "P".into(), Level::Group, attrs.clone()).is_err());
        assert!(BomNode::container(NodeId(0), None, "M1".into(), Level::Primary, "x").is_err());

        let node = BomNode::part(NodeId(1), None, "M1.P1".into(), Level::Primary, attrs).unwrap();
        assert!(node.is_part());
        assert!(node.is_active_part());
        assert_eq!(node.display_name(), "CPU");
    }

    #[test]
    fn test_quantity_park_and_restore() {
        let mut attrs = PartAttributes::new("R-1", "Resistor", 0.1).with_quantity(12.0);
        attrs.deactivate(ItemStatus::Inactive);
        assert_eq!(attrs.quantity, 0.0);
        assert_eq!(attrs.restore_quantity, Some(12.0));
        assert_eq!(attrs.lifecycle, Lifecycle::PhaseOut);

        attrs.activate();
        assert_eq!(attrs.quantity, 12.0);
        assert_eq!(attrs.status, ItemStatus::Active);
        assert_eq!(attrs.lifecycle, Lifecycle::Active);

        let mut fresh = PartAttributes::new("R-2", "Resistor", 0.1).with_quantity(0.0);
        fresh.activate();
        assert_eq!(fresh.quantity, 1.0);
    }

    #[test]
    fn test_part_attribute_validation() {
        let valid = PartAttributes::new("CPU-A", "CPU", 10.0);
        assert!(valid.validate().is_ok());

        let negative_cost = PartAttributes::new("CPU-A", "CPU", -1.0);
        assert!(negative_cost.validate().is_err());

        let unnamed = PartAttributes::new("", "CPU", 1.0);
        assert!(unnamed.validate().is_err());

        let mut blank_cert = PartAttributes::new("CPU-A", "CPU", 1.0);
        blank_cert.certifications.push("  ".to_string());
        assert!(blank_cert.validate().is_err());
    }

    #[test]
    fn test_status_and_lifecycle_parsing() {
        assert_eq!(ItemStatus::from_str("Deprecated"), Some(ItemStatus::Deprecated));
        assert_eq!(ItemStatus::from_str("gone"), None);
        assert_eq!(Lifecycle::from_str("Phase-Out"), Some(Lifecycle::PhaseOut));
        assert_eq!(Lifecycle::from_str("phase_out"), Some(Lifecycle::PhaseOut));
        assert_eq!(Lifecycle::PhaseOut.to_string(), "phase_out");
    }

    #[test]
    fn test_diff_record_resolution_copy() {
        let record = DiffRecord::new("U1.A", "CPU-B", DiffType::Add, Severity::High);
        assert!(!record.is_resolved());

        let fixed = record.with_resolution(true, false);
        assert!(fixed.is_resolved());
        assert_eq!(fixed.id, record.id);
        assert!(!record.fixed);
    }

    #[test]
    fn test_severity_ordering() {
        let mut severities = vec![Severity::Low, Severity::High, Severity::Medium];
        severities.sort_by(|a, b| b.cmp(a));
        assert_eq!(severities, vec![Severity::High, Severity::Medium, Severity::Low]);
    }

    #[test]
    fn test_error_codes() {
        let error = BomError::node_not_found(NodeId(4));
        assert_eq!(error.error_code(), "NODE_NOT_FOUND");
        assert_eq!(error.to_string(), "Node not found: #4");
        assert!(BomError::snapshot_unavailable("timeout").is_external());
    }
}
