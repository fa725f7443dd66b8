// policy.rs — Allow/deny partition and per-repository records.

use serde::{Deserialize, Serialize};

/// Closed repository state. Serialized as lowercase strings; any other
/// value fails the settings load instead of being coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoState {
    Allowed,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Embedding,
    Image,
}

/// One entry per remote repository known to the system, persisted in the
/// settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub repo_id: String,
    #[serde(default = "default_state")]
    pub state: RepoState,
    #[serde(default)]
    pub artifact_kind: ArtifactKind,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub is_scan_clean: bool,
    #[serde(default)]
    pub is_reachable: bool,
    #[serde(default)]
    pub is_nonempty: bool,
    // Recomputed every pass; a stale persisted value must never gate
    // behavior, so it is skipped in both serde directions.
    #[serde(skip)]
    pub needs_fetch: bool,
}

fn default_state() -> RepoState {
    RepoState::Allowed
}

impl RepoRecord {
    pub fn new(repo_id: impl Into<String>, state: RepoState) -> Self {
        Self {
            repo_id: repo_id.into(),
            state,
            artifact_kind: ArtifactKind::Embedding,
            sha256: String::new(),
            md5: String::new(),
            is_scan_clean: false,
            is_reachable: false,
            is_nonempty: false,
            needs_fetch: false,
        }
    }
}

/// File stem for local paths: the segment after the last `/`, so artifacts
/// of all repositories land flat in one directory.
pub fn file_stem(repo_id: &str) -> &str {
    match repo_id.rsplit_once('/') {
        Some((_, stem)) => stem,
        None => repo_id,
    }
}

/// How a catalog identifier relates to the current policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Allowed,
    Denied,
}

/// The persisted allow/deny partition. A repository id appears in at most
/// one of the two lists; list membership is canonical and records are
/// normalized to the list they were loaded from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, deserialize_with = "record_entries")]
    pub allow_list: Vec<RepoRecord>,
    #[serde(default, deserialize_with = "record_entries")]
    pub deny_list: Vec<RepoRecord>,
}

impl Policy {
    /// Reassert list membership as the canonical state after a load.
    pub fn normalize(&mut self) {
        for record in &mut self.allow_list {
            record.state = RepoState::Allowed;
        }
        for record in &mut self.deny_list {
            record.state = RepoState::Denied;
        }
    }

    pub fn classify(&self, repo_id: &str) -> Classification {
        if self.allow_list.iter().any(|r| r.repo_id == repo_id) {
            Classification::Allowed
        } else if self.deny_list.iter().any(|r| r.repo_id == repo_id) {
            Classification::Denied
        } else {
            Classification::New
        }
    }

    /// Admit a newly discovered repository as a default-allowed record.
    /// Ids already on either list are left alone.
    pub fn admit(&mut self, repo_id: &str) {
        if self.classify(repo_id) == Classification::New {
            self.allow_list
                .push(RepoRecord::new(repo_id, RepoState::Allowed));
        }
    }

    pub fn record_mut(&mut self, repo_id: &str) -> Option<&mut RepoRecord> {
        if let Some(i) = self.allow_list.iter().position(|r| r.repo_id == repo_id) {
            return Some(&mut self.allow_list[i]);
        }
        if let Some(i) = self.deny_list.iter().position(|r| r.repo_id == repo_id) {
            return Some(&mut self.deny_list[i]);
        }
        None
    }

    /// Move a repository to the allow list, keeping its record (and thus
    /// its digests) intact. Creates a fresh record for unknown ids.
    // The sync loop only ever denies; re-allowing is an operator action.
    #[allow(dead_code)]
    pub fn promote_to_allow(&mut self, repo_id: &str) {
        if self.allow_list.iter().any(|r| r.repo_id == repo_id) {
            return;
        }
        let mut record = match self.deny_list.iter().position(|r| r.repo_id == repo_id) {
            Some(i) => self.deny_list.remove(i),
            None => RepoRecord::new(repo_id, RepoState::Allowed),
        };
        record.state = RepoState::Allowed;
        self.allow_list.push(record);
    }

    /// Move a repository to the deny list, keeping its record intact.
    pub fn promote_to_deny(&mut self, repo_id: &str) {
        if self.deny_list.iter().any(|r| r.repo_id == repo_id) {
            return;
        }
        let mut record = match self.allow_list.iter().position(|r| r.repo_id == repo_id) {
            Some(i) => self.allow_list.remove(i),
            None => RepoRecord::new(repo_id, RepoState::Denied),
        };
        record.state = RepoState::Denied;
        self.deny_list.push(record);
    }
}

// List entries may be full record objects or bare id strings (the legacy
// document shape); bare strings are upgraded to default records.
fn record_entries<'de, D>(deserializer: D) -> std::result::Result<Vec<RepoRecord>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RecordEntry {
        Id(String),
        Record(RepoRecord),
    }

    let entries = Vec::<RecordEntry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            RecordEntry::Id(id) => RepoRecord::new(id, RepoState::Allowed),
            RecordEntry::Record(record) => record,
        })
        .collect())
}
