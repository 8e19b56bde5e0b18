//! Conference directory collaborator
//!
//! The directory resolves a dialed extension to the conference behind it
//! and lists the conference roster once the local user has joined.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use softphone_core::{PhoneError, PhoneResult};

/// A directory source (backend) holding contacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySource {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub backend: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactNumber {
    #[serde(default)]
    pub label: String,
    pub number: String,
}

/// A conference as listed by a directory source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceContact {
    pub name: String,
    /// Conference identifier used for roster lookups
    #[serde(rename = "source_id", alias = "sourceId")]
    pub source_id: String,
    #[serde(default)]
    pub numbers: Vec<ContactNumber>,
}

impl ConferenceContact {
    pub fn has_number(&self, number: &str) -> bool {
        self.numbers.iter().any(|n| n.number == number)
    }
}

/// One member of a conference as reported by the API or the membership feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub call_id: String,
    #[serde(default)]
    pub user_uuid: Option<String>,
    #[serde(default)]
    pub caller_id_name: Option<String>,
    #[serde(default)]
    pub caller_id_number: Option<String>,
    #[serde(default)]
    pub muted: bool,
}

impl RosterEntry {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_uuid: impl Into<String>) -> Self {
        self.user_uuid = Some(user_uuid.into());
        self
    }

    pub fn with_caller_id(mut self, name: impl Into<String>, number: impl Into<String>) -> Self {
        self.caller_id_name = Some(name.into());
        self.caller_id_number = Some(number.into());
        self
    }

    pub fn is_user(&self, user_uuid: &str) -> bool {
        self.user_uuid.as_deref() == Some(user_uuid)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRoster {
    pub items: Vec<RosterEntry>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConferenceDirectory: Send + Sync {
    /// Sources whose name matches `name`
    async fn fetch_conference_sources(&self, name: &str) -> PhoneResult<Vec<DirectorySource>>;

    async fn fetch_conference_contacts(&self, source: &DirectorySource) -> PhoneResult<Vec<ConferenceContact>>;

    /// Only allowed once the local user is in the conference
    async fn get_conference_participants_as_user(&self, conference_id: &str) -> PhoneResult<ParticipantRoster>;
}

/// Find the conference reachable at `extension` in the first source named
/// `source_name`
pub async fn find_conference(
    directory: &dyn ConferenceDirectory,
    source_name: &str,
    extension: &str,
) -> PhoneResult<ConferenceContact> {
    let sources = directory.fetch_conference_sources(source_name).await?;
    let source = sources.into_iter().next().ok_or_else(|| PhoneError::ConferenceNotFound {
        extension: extension.to_string(),
    })?;

    directory
        .fetch_conference_contacts(&source)
        .await?
        .into_iter()
        .find(|contact| contact.has_number(extension))
        .ok_or_else(|| PhoneError::ConferenceNotFound {
            extension: extension.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> DirectorySource {
        DirectorySource {
            uuid: "src-1".to_string(),
            name: "default".to_string(),
            backend: "conference".to_string(),
        }
    }

    fn conference(name: &str, source_id: &str, number: &str) -> ConferenceContact {
        ConferenceContact {
            name: name.to_string(),
            source_id: source_id.to_string(),
            numbers: vec![ContactNumber {
                label: "primary".to_string(),
                number: number.to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn finds_conference_by_extension() {
        let mut directory = MockConferenceDirectory::new();
        directory
            .expect_fetch_conference_sources()
            .withf(|name| name == "default")
            .times(1)
            .returning(|_| Ok(vec![source()]));
        directory
            .expect_fetch_conference_contacts()
            .withf(|source| source.uuid == "src-1")
            .times(1)
            .returning(|_| Ok(vec![conference("Ops", "1", "4000"), conference("Standup", "2", "4001")]));

        let found = find_conference(&directory, "default", "4001").await.expect("found");
        assert_eq!(found.name, "Standup");
        assert_eq!(found.source_id, "2");
    }

    #[tokio::test]
    async fn missing_source_or_extension_is_not_found() {
        let mut directory = MockConferenceDirectory::new();
        directory.expect_fetch_conference_sources().returning(|_| Ok(vec![]));
        let err = find_conference(&directory, "default", "4001").await.expect_err("no source");
        assert!(matches!(err, PhoneError::ConferenceNotFound { .. }));

        let mut directory = MockConferenceDirectory::new();
        directory
            .expect_fetch_conference_sources()
            .returning(|_| Ok(vec![source()]));
        directory
            .expect_fetch_conference_contacts()
            .returning(|_| Ok(vec![conference("Ops", "1", "4000")]));
        let err = find_conference(&directory, "default", "4001").await.expect_err("no match");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn roster_deserializes_api_payload() {
        let roster: ParticipantRoster = serde_json::from_str(
            r#"{"items":[{"call_id":"X","user_uuid":"me","caller_id_name":"Ann","caller_id_number":"1001","join_time":5}]}"#,
        )
        .expect("roster");
        assert_eq!(roster.items.len(), 1);
        assert!(roster.items[0].is_user("me"));
        assert_eq!(roster.items[0].caller_id_name.as_deref(), Some("Ann"));
    }
}
