//! Transport path selection.

use crate::domain::entities::MessageSpec;

/// Which private transport operation carries a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPath {
    /// Dedicated topic derived from a negotiated secret.
    SharedSecret,
    /// Partitioned topic derived from the recipient's key.
    Partitioned,
}

impl TransportPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SharedSecret => "shared_secret",
            Self::Partitioned => "partitioned",
        }
    }
}

/// A descriptor with a shared secret always goes over the shared-secret
/// path; every other descriptor goes over the partitioned path.
pub fn select_path(spec: &MessageSpec) -> TransportPath {
    match spec.shared_secret {
        Some(_) => TransportPath::SharedSecret,
        None => TransportPath::Partitioned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::SharedSecret;
    use shared_types::PublicKey;

    #[test]
    fn test_secret_marker_selects_shared_secret_path() {
        let spec = MessageSpec::new(vec![1]).with_shared_secret(SharedSecret {
            identity: PublicKey([2; 33]),
            key: [1; 32],
        });
        assert_eq!(select_path(&spec), TransportPath::SharedSecret);
    }

    #[test]
    fn test_no_marker_selects_partitioned_path() {
        assert_eq!(
            select_path(&MessageSpec::new(vec![1])),
            TransportPath::Partitioned
        );
    }
}
