// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for controller error types.

#[cfg(test)]
mod tests {
    use crate::errors::*;

    #[test]
    fn test_instance_in_use_error() {
        let error = ControllerError::InstanceInUse {
            instance: "acme".to_string(),
            clusters: 2,
        };

        assert_eq!(
            error.to_string(),
            "Instance 'acme' still owns 2 destination cluster(s) with live destinations"
        );
        assert!(!error.is_retryable(), "in-use rejections are surfaced, not retried");
    }

    #[test]
    fn test_orphaned_resource_group_error() {
        let error = ControllerError::OrphanedResourceGroup {
            namespace: "acme".to_string(),
            group_id: "orders".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Resource group 'orders' in namespace acme has no address configuration"
        );
    }

    #[test]
    fn test_platform_unavailable_is_retryable() {
        let error = ControllerError::unavailable("list deployments", "503 Service Unavailable");

        assert!(error.is_retryable());
        assert_eq!(
            error.to_string(),
            "Platform unavailable during list deployments: 503 Service Unavailable"
        );
    }

    #[test]
    fn test_watch_disconnected_is_retryable() {
        let error = ControllerError::WatchDisconnected {
            namespace: "acme".to_string(),
            selector: "type=address-config".to_string(),
            reason: "stream closed".to_string(),
        };

        assert!(error.is_retryable());
    }

    #[test]
    fn test_permanent_errors_not_retryable() {
        let errors = [
            ControllerError::platform("create namespace", "403 Forbidden"),
            ControllerError::MalformedAddressRecord {
                reason: "expected value".to_string(),
            },
            ControllerError::DuplicateAddress {
                group_id: "orders".to_string(),
                address: "in".to_string(),
            },
            ControllerError::TemplateNotFound {
                name: "queue-persisted".to_string(),
            },
        ];

        for error in errors {
            assert!(!error.is_retryable(), "{error} should not be retryable");
        }
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(
            ControllerError::unavailable("get", "timeout").kind(),
            "platform_unavailable"
        );
        assert_eq!(
            ControllerError::InstanceInUse {
                instance: "acme".to_string(),
                clusters: 1,
            }
            .kind(),
            "instance_in_use"
        );
        assert_eq!(
            ControllerError::Configuration {
                reason: "missing".to_string(),
            }
            .kind(),
            "configuration"
        );
    }
}
