//! Deterministic names for every object an execution unit owns
//!
//! All names derive from the unit id (plus index or step id), so re-deriving
//! a name never requires a cluster lookup. Unit ids are used verbatim: they
//! must pass [`crate::unit::validate_unit_id`], which keeps every derived
//! name within a DNS label and makes the unit label value the id itself.

/// Maximum length of a Kubernetes DNS label
pub const DNS_LABEL_MAX: usize = 63;

/// Suffix appended to the upper-cased step id for port variables
pub const SERVICE_PORT_SUFFIX: &str = "_SERVICE_PORT";

const LOGGING_SECRET_SUFFIX: &str = "log-service";
const STEP_CONTAINER_PREFIX: &str = "step";

/// Longest unit id whose fixed-suffix names still fit a DNS label
pub const MAX_UNIT_ID_LEN: usize = DNS_LABEL_MAX - LOGGING_SECRET_SUFFIX.len() - 1;

/// Longest sanitized step id whose container name still fits a DNS label
pub const MAX_STEP_ID_LEN: usize = DNS_LABEL_MAX - STEP_CONTAINER_PREFIX.len() - 1;

/// True for `[a-z0-9]([-a-z0-9]*[a-z0-9])?` of at most 63 characters
pub fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            s.len() <= DNS_LABEL_MAX
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        }
        _ => false,
    }
}

/// Sanitize a string into a valid K8s DNS label.
///
/// DNS labels: `[a-z0-9]([-a-z0-9]*[a-z0-9])?`, max 63 chars.
pub fn sanitize_dns_label(s: &str) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches('-');
    if trimmed.len() > DNS_LABEL_MAX {
        trimmed[..DNS_LABEL_MAX].trim_end_matches('-').to_string()
    } else {
        trimmed.to_string()
    }
}

/// Name of the pod for a unit
pub fn pod_name(unit_id: &str) -> String {
    unit_id.to_string()
}

/// Name of the control-plane service for a unit
pub fn service_name(unit_id: &str) -> String {
    format!("{unit_id}-control")
}

/// Name of the `index`th image-pull secret of a unit
pub fn image_pull_secret_name(unit_id: &str, index: usize) -> String {
    format!("{unit_id}-image-{index}")
}

/// Name of the `index`th secret declared by a step
pub fn step_secret_name(unit_id: &str, step_id: &str, index: usize) -> String {
    format!("{unit_id}-{}-secret-{index}", sanitize_dns_label(step_id))
}

/// Name of the unit's logging-credentials secret
pub fn logging_secret_name(unit_id: &str) -> String {
    format!("{unit_id}-{LOGGING_SECRET_SUFFIX}")
}

/// Container name for a step; the prefix keeps steps clear of the
/// built-in container names
pub fn step_container_name(step_id: &str) -> String {
    format!("{STEP_CONTAINER_PREFIX}-{}", sanitize_dns_label(step_id))
}

/// Environment variable carrying a step's port, e.g. `UNIT_TEST_SERVICE_PORT`
pub fn step_port_env_var(step_id: &str) -> String {
    let upper: String = step_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{upper}{SERVICE_PORT_SUFFIX}")
}

/// Label selector matching every object of a unit
pub fn unit_selector(label_key: &str, unit_id: &str) -> String {
    format!("{label_key}={unit_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_labels_are_lowercase_and_trimmed() {
        assert_eq!(sanitize_dns_label("Build_Step.1"), "build-step-1");
        assert_eq!(sanitize_dns_label("--x--"), "x");
        assert_eq!(sanitize_dns_label(&"a".repeat(80)).len(), 63);
    }

    #[test]
    fn dns_label_check() {
        assert!(is_dns_label("u1"));
        assert!(is_dns_label("ci-42-a"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label("u/1"));
        assert!(!is_dns_label("U1"));
        assert!(!is_dns_label("-u1"));
        assert!(!is_dns_label("u1-"));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[test]
    fn derived_names_are_deterministic() {
        assert_eq!(pod_name("u1"), "u1");
        assert_eq!(service_name("u1"), "u1-control");
        assert_eq!(image_pull_secret_name("u1", 0), "u1-image-0");
        assert_eq!(step_secret_name("u1", "build", 1), "u1-build-secret-1");
        assert_eq!(logging_secret_name("u1"), "u1-log-service");
        assert_eq!(image_pull_secret_name("u1", 3), image_pull_secret_name("u1", 3));
        assert_eq!(step_container_name("Unit Test"), "step-unit-test");
    }

    #[test]
    fn longest_ids_keep_unit_prefix_and_index() {
        let unit = "u".repeat(MAX_UNIT_ID_LEN);
        assert_eq!(logging_secret_name(&unit).len(), DNS_LABEL_MAX);
        assert!(is_dns_label(&logging_secret_name(&unit)));

        let step = "s".repeat(MAX_STEP_ID_LEN);
        assert_eq!(step_container_name(&step).len(), DNS_LABEL_MAX);

        let first = step_secret_name("u1", &step, 0);
        let second = step_secret_name("u1", &step, 1);
        assert_ne!(first, second);
        assert!(first.starts_with("u1-"));
        assert!(first.ends_with("-secret-0"));
    }

    #[test]
    fn long_step_ids_that_differ_late_get_distinct_containers() {
        let a = format!("{}a", "s".repeat(MAX_STEP_ID_LEN - 1));
        let b = format!("{}b", "s".repeat(MAX_STEP_ID_LEN - 1));
        assert_ne!(step_container_name(&a), step_container_name(&b));
    }

    #[test]
    fn port_env_var_names() {
        assert_eq!(step_port_env_var("build"), "BUILD_SERVICE_PORT");
        assert_eq!(step_port_env_var("unit-test"), "UNIT_TEST_SERVICE_PORT");
    }

    #[test]
    fn selector_is_the_raw_unit_id() {
        assert_eq!(unit_selector("podwright.dev/unit", "u1"), "podwright.dev/unit=u1");
        assert_ne!(
            unit_selector("podwright.dev/unit", "u-1"),
            unit_selector("podwright.dev/unit", "u/1")
        );
    }
}
