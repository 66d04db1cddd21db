//! Peer capability discovery.

use crate::connection::Connection;
use crate::error::TransferError;
use tracing::debug;
use xfer_wire::{NS_SI, NS_SI_PROFILE_PREFIX};

/// Ask `peer` what it supports and return its stream initiation profiles in
/// advertised order
pub async fn discover_profiles(
    conn: &dyn Connection,
    peer: &str,
) -> Result<Vec<String>, TransferError> {
    let features = conn
        .discover_features(peer)
        .await
        .ok_or(TransferError::Discovery)?;

    classify_features(&features)
}

/// Split a feature list into stream initiation support and profiles
pub fn classify_features(features: &[String]) -> Result<Vec<String>, TransferError> {
    let mut found_si = false;
    let mut profiles = Vec::new();

    for feature in features {
        if feature == NS_SI {
            found_si = true;
        } else if feature.starts_with(NS_SI_PROFILE_PREFIX) {
            profiles.push(feature.clone());
        }
    }

    if !found_si {
        return Err(TransferError::NoSupport);
    }

    if profiles.is_empty() {
        return Err(TransferError::NoProfiles);
    }

    debug!("Peer advertises {} SI profile(s)", profiles.len());
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackConnection;
    use xfer_wire::PROFILE_FILE_TRANSFER;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_returns_advertised_profiles() {
        let conn = LoopbackConnection::builder()
            .features(strings(&[
                "http://jabber.org/protocol/disco#info",
                NS_SI,
                PROFILE_FILE_TRANSFER,
                "http://jabber.org/protocol/si/profile/other",
            ]))
            .build();

        let profiles = discover_profiles(&conn, "bob@example.org/res").await.unwrap();
        assert_eq!(
            profiles,
            strings(&[
                PROFILE_FILE_TRANSFER,
                "http://jabber.org/protocol/si/profile/other",
            ])
        );
    }

    #[tokio::test]
    async fn test_query_failure() {
        let conn = LoopbackConnection::builder().discovery_fails().build();
        let err = discover_profiles(&conn, "bob@example.org").await.unwrap_err();
        assert!(matches!(err, TransferError::Discovery));
    }

    #[test]
    fn test_missing_si_support() {
        let err = classify_features(&strings(&[PROFILE_FILE_TRANSFER])).unwrap_err();
        assert!(matches!(err, TransferError::NoSupport));

        let err = classify_features(&[]).unwrap_err();
        assert!(matches!(err, TransferError::NoSupport));
    }

    #[test]
    fn test_si_without_profiles() {
        let err = classify_features(&strings(&[NS_SI, "urn:xmpp:ping"])).unwrap_err();
        assert!(matches!(err, TransferError::NoProfiles));
    }
}
