//! AAGUID-driven selection of a metadata statement.

use super::source::{MetadataError, MetadataSource};
use super::{AttestationMetadata, MetadataEntry, MetadataStatement};
use uuid::Uuid;

/// Resolve attestation metadata for a registered authenticator.
///
/// Selection:
/// 1. Ask the source for candidate entries.
/// 2. Prefer the first entry whose AAGUID hex-matches the registration's
///    (dashes stripped, case-insensitive).
/// 3. With no AAGUID match, fall back to an arbitrary candidate. Best-effort
///    on purpose: without a matching AAGUID there is no authoritative
///    statement, so any candidate is as good a guess as another.
/// 4. Extract the statement fields. An entry without a statement resolves to
///    `None`; that is a normal outcome, not an error.
pub fn resolve(
    source: &dyn MetadataSource,
    aaguid: Uuid,
) -> Result<Option<AttestationMetadata>, MetadataError> {
    let entries = source.find_entries(&aaguid)?;
    tracing::debug!("Metadata source returned {} candidate entries", entries.len());

    let target = aaguid.simple().to_string();
    let chosen = entries
        .iter()
        .find(|entry| entry_matches(entry, &target))
        .or_else(|| entries.first());

    Ok(chosen
        .and_then(|entry| entry.metadata_statement.as_ref())
        .map(extract))
}

fn entry_matches(entry: &MetadataEntry, target_hex: &str) -> bool {
    entry
        .aaguid
        .as_deref()
        .map(normalize_aaguid)
        .is_some_and(|hex| hex == target_hex)
}

/// Strip dashes and lowercase, so "2FC0579F-8113-..." and the Uuid's simple
/// form compare equal.
fn normalize_aaguid(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_lowercase()
}

fn extract(statement: &MetadataStatement) -> AttestationMetadata {
    AttestationMetadata {
        aaguid: statement.aaguid.clone(),
        aaid: statement.aaid.clone(),
        attachment_hints: statement.attachment_hint.clone(),
        icon: statement.icon.clone(),
        description: statement.description.clone(),
        transports: statement
            .authenticator_get_info
            .as_ref()
            .map(|info| info.transports.clone())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::AuthenticatorGetInfo;

    struct StaticSource(Vec<MetadataEntry>);

    impl MetadataSource for StaticSource {
        fn find_entries(&self, _aaguid: &Uuid) -> Result<Vec<MetadataEntry>, MetadataError> {
            Ok(self.0.clone())
        }
    }

    fn entry(aaguid: Option<&str>, description: Option<&str>) -> MetadataEntry {
        MetadataEntry {
            aaguid: aaguid.map(str::to_string),
            metadata_statement: Some(MetadataStatement {
                aaguid: aaguid.map(str::to_string),
                aaid: None,
                attachment_hint: vec!["external".to_string()],
                icon: None,
                description: description.map(str::to_string),
                authenticator_get_info: Some(AuthenticatorGetInfo {
                    transports: vec!["usb".to_string(), "nfc".to_string()],
                }),
            }),
        }
    }

    const AAGUID: &str = "2fc0579f-8113-47ea-b116-bb5a8db9202a";

    #[test]
    fn aaguid_match_wins_over_other_entries() {
        let source = StaticSource(vec![
            entry(Some("00000000-0000-0000-0000-000000000001"), Some("Wrong Key")),
            entry(Some(AAGUID), Some("YubiKey 5 NFC")),
        ]);

        let resolved = resolve(&source, Uuid::parse_str(AAGUID).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(resolved.description.as_deref(), Some("YubiKey 5 NFC"));
        assert_eq!(resolved.transports, vec!["usb", "nfc"]);
    }

    #[test]
    fn matching_is_case_and_dash_insensitive() {
        let source = StaticSource(vec![entry(
            Some("2FC0579F811347EAB116BB5A8DB9202A"),
            Some("YubiKey 5 NFC"),
        )]);

        let resolved = resolve(&source, Uuid::parse_str(AAGUID).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(resolved.description.as_deref(), Some("YubiKey 5 NFC"));
    }

    #[test]
    fn falls_back_to_arbitrary_entry_without_a_match() {
        let source = StaticSource(vec![entry(
            Some("00000000-0000-0000-0000-000000000001"),
            Some("Some Other Authenticator"),
        )]);

        let resolved = resolve(&source, Uuid::parse_str(AAGUID).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(
            resolved.description.as_deref(),
            Some("Some Other Authenticator")
        );
    }

    #[test]
    fn zero_entries_resolve_to_none() {
        let source = StaticSource(vec![]);
        let resolved = resolve(&source, Uuid::parse_str(AAGUID).unwrap()).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn entry_without_statement_resolves_to_none() {
        let source = StaticSource(vec![MetadataEntry {
            aaguid: Some(AAGUID.to_string()),
            metadata_statement: None,
        }]);

        let resolved = resolve(&source, Uuid::parse_str(AAGUID).unwrap()).unwrap();
        assert!(resolved.is_none());
    }
}
