// sync.rs — Per-repository synchronization state machine and run loop.
//
// Order per repository: reachability, presence, emptiness, digest match,
// malware scan. A file is trusted only when digest match AND scan-clean both
// hold; the scan is always the last gate, whether the file was just fetched
// or already on disk. Execution is strictly sequential: one repository is
// fully finished before the next begins.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::catalog;
use crate::config;
use crate::digest;
use crate::error::{Result, SyncError};
use crate::policy::{self, Classification, RepoRecord};
use crate::scanner::Screener;
use crate::settings::Settings;
use crate::transport::Transport;

/// Per-invocation counters, discarded after the summary is printed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub downloaded_repos: u32,
    pub already_downloaded_repos: u32,
    pub skipped_repos: u32,
    pub failed_repos: u32,
    pub downloaded_images: u32,
    pub already_downloaded_images: u32,
    pub failed_images: u32,
}

impl RunStats {
    /// Human summary for stdout: one line per non-zero counter, with
    /// singular/plural agreement, closed by "Done.".
    pub fn summary(&self) -> String {
        let mut out = String::new();
        push_count(&mut out, "Downloaded", self.downloaded_repos, "repo");
        push_count(
            &mut out,
            "Already downloaded",
            self.already_downloaded_repos,
            "repo",
        );
        push_count(&mut out, "Skipped", self.skipped_repos, "repo");
        push_count(&mut out, "Downloaded", self.downloaded_images, "image");
        push_count(
            &mut out,
            "Already downloaded",
            self.already_downloaded_images,
            "image",
        );
        if self.failed_repos > 0 {
            out.push_str(&format!(
                "{} {} failed.\n",
                self.failed_repos,
                plural(self.failed_repos, "repo")
            ));
        }
        if self.failed_images > 0 {
            out.push_str(&format!(
                "{} {} failed.\n",
                self.failed_images,
                plural(self.failed_images, "image")
            ));
        }
        out.push('\n');
        out.push_str("Done.\n");
        out
    }
}

fn plural(n: u32, noun: &str) -> String {
    if n == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    }
}

fn push_count(out: &mut String, verb: &str, n: u32, noun: &str) {
    if n > 0 {
        out.push_str(&format!("{verb} {n} {}\n", plural(n, noun)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Downloaded,
    AlreadyDownloaded,
}

fn artifact_url(repo_id: &str) -> String {
    format!(
        "{}/{repo_id}/resolve/main/{}",
        config::artifacts::HF_HOST,
        config::artifacts::EMBEDDING_REMOTE_NAME
    )
}

fn image_url(repo_id: &str, index: u32) -> String {
    format!(
        "{}/{repo_id}/resolve/main/{}/{index}.jpeg",
        config::artifacts::HF_HOST,
        config::artifacts::IMAGE_DIR_NAME
    )
}

pub struct Syncer<'a> {
    pub transport: &'a dyn Transport,
    pub screener: &'a dyn Screener,
}

impl Syncer<'_> {
    /// Bring one repository's primary artifact to a verified state.
    ///
    /// Mutates the record along the way: reachability, emptiness, fetch
    /// need, scan verdict; digests only after a clean post-download scan.
    pub fn sync_repo(&self, record: &mut RepoRecord, dest: &Path) -> Result<SyncOutcome> {
        let url = artifact_url(&record.repo_id);

        // Reachability first; nothing else is worth doing against a dead URL.
        record.is_reachable = match self.transport.exists(&url) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("Reachability probe failed for {url}: {e}");
                false
            }
        };
        if !record.is_reachable {
            return Err(SyncError::Unreachable { url });
        }

        record.needs_fetch = !dest.exists();

        if !record.needs_fetch {
            let size = fs::metadata(dest).map_err(|e| SyncError::io(dest, e))?.len();
            record.is_nonempty = size != 0;
            if !record.is_nonempty {
                record.needs_fetch = true;
            }
        }

        if !record.needs_fetch {
            let current = digest::digest_file(dest)?;
            record.needs_fetch = !digest::matches(&record.md5, &record.sha256, &current);
        }

        if !record.needs_fetch {
            // Digests matched, but the scan still has the final say on a
            // file that is already on disk.
            let verdict = self.screener.scan(&record.repo_id, dest)?;
            record.is_scan_clean = verdict.is_clean();
            if !record.is_scan_clean {
                fs::remove_file(dest).map_err(|e| SyncError::io(dest, e))?;
                return Err(SyncError::Infected {
                    repo_id: record.repo_id.clone(),
                    infected_files: verdict.infected_files,
                });
            }
            return Ok(SyncOutcome::AlreadyDownloaded);
        }

        // Fetch: replace whatever currently sits at the destination.
        if dest.exists() {
            fs::remove_file(dest).map_err(|e| SyncError::io(dest, e))?;
        }
        log::info!("  downloading {url} to {}", dest.display());
        self.download_to(&url, dest)?;

        // Post-download gate. Infected files never survive on disk.
        let verdict = self.screener.scan(&record.repo_id, dest)?;
        record.is_scan_clean = verdict.is_clean();
        if !record.is_scan_clean {
            fs::remove_file(dest).map_err(|e| SyncError::io(dest, e))?;
            return Err(SyncError::Infected {
                repo_id: record.repo_id.clone(),
                infected_files: verdict.infected_files,
            });
        }

        // Digest exactly the bytes that passed the scan.
        let digests = digest::digest_file(dest)?;
        record.md5 = digests.md5;
        record.sha256 = digests.sha256;
        record.is_nonempty = fs::metadata(dest).map_err(|e| SyncError::io(dest, e))?.len() != 0;
        record.needs_fetch = false;
        Ok(SyncOutcome::Downloaded)
    }

    /// Best-effort preview-image sub-flow: probe indices from 0 until the
    /// first missing one or `max_images`. Images get no digest or scan
    /// checks; a locally present image is counted and does not stop the
    /// loop.
    pub fn sync_images(&self, repo_id: &str, settings: &Settings, stats: &mut RunStats) {
        let stem = policy::file_stem(repo_id);
        for index in 0..settings.max_images {
            thread::sleep(Duration::from_millis(config::images::PROBE_DELAY_MS));

            let dest = settings.image_path(stem, index);
            if dest.exists() {
                log::info!("  already downloaded {index}.jpeg");
                stats.already_downloaded_images += 1;
                continue;
            }

            let url = image_url(repo_id, index);
            let present = match self.transport.exists(&url) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("Image probe failed for {url}: {e}");
                    break;
                }
            };
            if !present {
                break;
            }

            match self.download_to(&url, &dest) {
                Ok(()) => {
                    log::info!("  downloaded {index}.jpeg to {}", dest.display());
                    stats.downloaded_images += 1;
                }
                Err(e) => {
                    log::warn!("Image download failed for {url}: {e}");
                    let _ = fs::remove_file(&dest);
                    stats.failed_images += 1;
                }
            }
        }
    }

    fn download_to(&self, url: &str, dest: &Path) -> Result<()> {
        let fetched = self.transport.fetch(url)?;
        log::debug!(
            "GET {url} returned {} bytes (status {})",
            fetched.body.len(),
            fetched.status
        );
        fs::write(dest, &fetched.body).map_err(|e| SyncError::io(dest, e))?;
        Ok(())
    }
}

/// One full synchronization pass. With `refresh_catalog` the candidate set
/// comes from the remote catalog (new ids are admitted as allowed);
/// without it, only repositories already on the allow list are synced.
///
/// Per-repository failures land in the statistics; only catalog failures
/// abort the run.
pub fn run(
    transport: &dyn Transport,
    screener: &dyn Screener,
    settings: &mut Settings,
    refresh_catalog: bool,
) -> Result<RunStats> {
    if let Err(e) = screener.ping() {
        log::warn!("Malware scanner not reachable at startup: {e}");
    }

    let candidates: Vec<String> = if refresh_catalog {
        catalog::list_repositories(transport, &settings.concepts_library_url)?
    } else {
        log::info!("Catalog refresh disabled, syncing the current allow list");
        settings
            .policy
            .allow_list
            .iter()
            .map(|r| r.repo_id.clone())
            .collect()
    };

    let syncer = Syncer {
        transport,
        screener,
    };
    let mut stats = RunStats::default();

    for repo_id in &candidates {
        match settings.policy.classify(repo_id) {
            Classification::Denied => {
                log::info!("Skipping denied repository {repo_id}");
                stats.skipped_repos += 1;
                continue;
            }
            Classification::New => settings.policy.admit(repo_id),
            Classification::Allowed => {}
        }

        log::info!("Processing {repo_id}");
        let dest = settings.embedding_path(policy::file_stem(repo_id));
        let record = match settings.policy.record_mut(repo_id) {
            Some(r) => r,
            None => continue,
        };

        let outcome = syncer.sync_repo(record, &dest);
        match outcome {
            Ok(SyncOutcome::Downloaded) => {
                stats.downloaded_repos += 1;
            }
            Ok(SyncOutcome::AlreadyDownloaded) => {
                log::info!("  already downloaded");
                stats.already_downloaded_repos += 1;
            }
            Err(e) => {
                log::error!("Sync failed for {repo_id}: {e}");
                stats.failed_repos += 1;
                if matches!(e, SyncError::Unreachable { .. }) {
                    log::warn!("Adding {repo_id} to the deny list");
                    settings.policy.promote_to_deny(repo_id);
                }
            }
        }

        if settings.download_images {
            syncer.sync_images(repo_id, settings, &mut stats);
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::collections::HashMap;

    use tempfile::{tempdir, TempDir};

    use crate::policy::RepoState;
    use crate::scanner::ScanVerdict;
    use crate::transport::Fetched;

    struct FakeTransport {
        responses: HashMap<String, Vec<u8>>,
        fetch_count: RefCell<u32>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                fetch_count: RefCell::new(0),
            }
        }

        fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.responses.insert(url.to_string(), body.to_vec());
            self
        }

        fn with_catalog(self, library_url: &str, ids: &[&str]) -> Self {
            let repos: Vec<String> = ids
                .iter()
                .map(|id| format!("{{\"id\":\"{id}\"}}"))
                .collect();
            let page = format!(
                "<html><body><div data-props='{{\"repos\":[{}]}}'><div id=\"models\"></div></div></body></html>",
                repos.join(",")
            );
            self.with(library_url, page.as_bytes())
        }

        fn fetches(&self) -> u32 {
            *self.fetch_count.borrow()
        }
    }

    impl Transport for FakeTransport {
        fn fetch(&self, url: &str) -> crate::error::Result<Fetched> {
            *self.fetch_count.borrow_mut() += 1;
            match self.responses.get(url) {
                Some(body) => Ok(Fetched {
                    status: 200,
                    body: body.clone(),
                }),
                None => Err(SyncError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }

        fn exists(&self, url: &str) -> crate::error::Result<bool> {
            Ok(self.responses.contains_key(url))
        }
    }

    struct FakeScreener {
        infected: Vec<String>,
        available: bool,
    }

    impl FakeScreener {
        fn clean() -> Self {
            Self {
                infected: Vec::new(),
                available: true,
            }
        }

        fn flagging(repo_id: &str) -> Self {
            Self {
                infected: vec![repo_id.to_string()],
                available: true,
            }
        }

        fn offline() -> Self {
            Self {
                infected: Vec::new(),
                available: false,
            }
        }
    }

    impl Screener for FakeScreener {
        fn scan(&self, repo_id: &str, _artifact: &Path) -> crate::error::Result<ScanVerdict> {
            if !self.available {
                return Err(SyncError::ScannerUnavailable {
                    message: "scanner offline".to_string(),
                });
            }
            let infected_files = u32::from(self.infected.iter().any(|r| r == repo_id));
            Ok(ScanVerdict { infected_files })
        }

        fn ping(&self) -> crate::error::Result<()> {
            if self.available {
                Ok(())
            } else {
                Err(SyncError::ScannerUnavailable {
                    message: "scanner offline".to_string(),
                })
            }
        }
    }

    const MOXXI: &str = "sd-concepts-library/moxxi";

    fn test_settings(dir: &TempDir) -> Settings {
        let settings = Settings {
            embeddings_dir: dir.path().join("embeddings"),
            embeddings_samples_dir: dir.path().join("samples"),
            ..Settings::default()
        };
        fs::create_dir_all(&settings.embeddings_dir).unwrap();
        fs::create_dir_all(&settings.embeddings_samples_dir).unwrap();
        settings
    }

    #[test]
    fn test_unreachable_repo_fails_and_lands_on_deny_list() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        // Catalog advertises the repo but its artifact URL resolves nowhere.
        let transport =
            FakeTransport::new().with_catalog(&settings.concepts_library_url, &[MOXXI]);
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.failed_repos, 1);
        assert_eq!(stats.downloaded_repos, 0);
        assert!(!settings.embedding_path("moxxi").exists());
        assert_eq!(settings.policy.classify(MOXXI), Classification::Denied);
    }

    #[test]
    fn test_fresh_repo_downloads_and_persists_digests() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"embedding payload");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.downloaded_repos, 1);
        assert_eq!(stats.failed_repos, 0);

        let dest = settings.embedding_path("moxxi");
        assert_eq!(fs::read(&dest).unwrap(), b"embedding payload");

        let expected = digest::digest_bytes(b"embedding payload");
        let record = settings.policy.record_mut(MOXXI).unwrap();
        assert_eq!(record.sha256, expected.sha256);
        assert_eq!(record.md5, expected.md5);
        assert!(record.is_scan_clean);
        assert!(record.is_nonempty);
        assert_eq!(record.state, RepoState::Allowed);
    }

    #[test]
    fn test_satisfied_repo_downloads_nothing() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let dest = settings.embedding_path("moxxi");
        fs::write(&dest, b"verified content").unwrap();

        let digests = digest::digest_bytes(b"verified content");
        let mut record = RepoRecord::new(MOXXI, RepoState::Allowed);
        record.md5 = digests.md5;
        record.sha256 = digests.sha256;
        settings.policy.allow_list.push(record);

        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"verified content");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.already_downloaded_repos, 1);
        assert_eq!(stats.downloaded_repos, 0);
        // Only the catalog page itself was fetched.
        assert_eq!(transport.fetches(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"verified content");
    }

    #[test]
    fn test_digest_mismatch_triggers_refetch() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let dest = settings.embedding_path("moxxi");
        fs::write(&dest, b"stale local copy").unwrap();

        let old = digest::digest_bytes(b"some earlier content");
        let mut record = RepoRecord::new(MOXXI, RepoState::Allowed);
        record.md5 = old.md5;
        record.sha256 = old.sha256;
        settings.policy.allow_list.push(record);

        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"fresh content");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.downloaded_repos, 1);
        assert_eq!(fs::read(&dest).unwrap(), b"fresh content");

        let expected = digest::digest_bytes(b"fresh content");
        let record = settings.policy.record_mut(MOXXI).unwrap();
        assert_eq!(record.sha256, expected.sha256);
    }

    #[test]
    fn test_empty_local_file_triggers_refetch() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let dest = settings.embedding_path("moxxi");
        fs::write(&dest, b"").unwrap();
        settings
            .policy
            .allow_list
            .push(RepoRecord::new(MOXXI, RepoState::Allowed));

        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"real bytes");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.downloaded_repos, 1);
        assert_eq!(fs::read(&dest).unwrap(), b"real bytes");
    }

    #[test]
    fn test_infected_cached_file_is_deleted_without_denial() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let dest = settings.embedding_path("moxxi");
        fs::write(&dest, b"cached content").unwrap();

        let digests = digest::digest_bytes(b"cached content");
        let mut record = RepoRecord::new(MOXXI, RepoState::Allowed);
        record.md5 = digests.md5;
        record.sha256 = digests.sha256;
        settings.policy.allow_list.push(record);

        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"cached content");
        let screener = FakeScreener::flagging(MOXXI);

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.failed_repos, 1);
        assert!(!dest.exists());
        // Infection fails the run for this repo but does not deny it.
        assert_eq!(settings.policy.classify(MOXXI), Classification::Allowed);
    }

    #[test]
    fn test_infected_download_is_deleted() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"malicious payload");
        let screener = FakeScreener::flagging(MOXXI);

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.failed_repos, 1);
        assert_eq!(stats.downloaded_repos, 0);
        assert!(!settings.embedding_path("moxxi").exists());
        assert_eq!(settings.policy.classify(MOXXI), Classification::Allowed);

        let record = settings.policy.record_mut(MOXXI).unwrap();
        assert!(record.sha256.is_empty());
        assert!(!record.is_scan_clean);
    }

    #[test]
    fn test_unavailable_scanner_fails_but_keeps_file() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let dest = settings.embedding_path("moxxi");
        fs::write(&dest, b"cached content").unwrap();

        let digests = digest::digest_bytes(b"cached content");
        let mut record = RepoRecord::new(MOXXI, RepoState::Allowed);
        record.md5 = digests.md5.clone();
        record.sha256 = digests.sha256.clone();
        settings.policy.allow_list.push(record);

        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"cached content");
        let screener = FakeScreener::offline();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        // Never clean-by-default: the repo fails, but nothing is deleted.
        assert_eq!(stats.failed_repos, 1);
        assert!(dest.exists());
        assert_eq!(settings.policy.classify(MOXXI), Classification::Allowed);
        let record = settings.policy.record_mut(MOXXI).unwrap();
        assert_eq!(record.sha256, digests.sha256);
    }

    #[test]
    fn test_unavailable_scanner_after_download_keeps_file_without_digests() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"fresh download");
        let screener = FakeScreener::offline();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        // The fetch happened, but nothing is trusted: the file stays for
        // the next run to verify, and no digests are persisted.
        assert_eq!(stats.failed_repos, 1);
        assert_eq!(stats.downloaded_repos, 0);
        let dest = settings.embedding_path("moxxi");
        assert_eq!(fs::read(&dest).unwrap(), b"fresh download");

        assert_eq!(settings.policy.classify(MOXXI), Classification::Allowed);
        let record = settings.policy.record_mut(MOXXI).unwrap();
        assert!(record.md5.is_empty());
        assert!(record.sha256.is_empty());
        assert!(!record.is_scan_clean);
    }

    #[test]
    fn test_denied_repos_are_skipped() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        settings.policy.promote_to_deny(MOXXI);

        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"payload");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.skipped_repos, 1);
        assert_eq!(stats.downloaded_repos, 0);
        assert_eq!(transport.fetches(), 1); // catalog page only
    }

    #[test]
    fn test_offline_run_syncs_allow_list_without_catalog() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        settings
            .policy
            .allow_list
            .push(RepoRecord::new(MOXXI, RepoState::Allowed));

        // No catalog page mapped; run must not ask for it.
        let transport = FakeTransport::new().with(&artifact_url(MOXXI), b"payload");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, false).unwrap();

        assert_eq!(stats.downloaded_repos, 1);
        assert!(settings.embedding_path("moxxi").exists());
    }

    #[test]
    fn test_catalog_parse_failure_aborts_run() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let transport = FakeTransport::new().with(
            &settings.concepts_library_url.clone(),
            b"<html><body>maintenance page</body></html>",
        );
        let screener = FakeScreener::clean();

        let err = run(&transport, &screener, &mut settings, true).unwrap_err();
        assert!(matches!(err, SyncError::CatalogParse { .. }));
    }

    #[test]
    fn test_image_flow_stops_at_first_missing_index() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        settings.download_images = true;

        // Remote has images at indices 0 and 1 only; max_images is 4.
        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"payload")
            .with(&image_url(MOXXI, 0), b"jpeg zero")
            .with(&image_url(MOXXI, 1), b"jpeg one");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.downloaded_images, 2);
        assert_eq!(stats.failed_images, 0);
        assert!(settings.image_path("moxxi", 0).exists());
        assert!(settings.image_path("moxxi", 1).exists());
        assert!(!settings.image_path("moxxi", 2).exists());
    }

    #[test]
    fn test_local_image_counts_and_does_not_stop_loop() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        settings.download_images = true;
        fs::write(settings.image_path("moxxi", 0), b"already here").unwrap();

        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"payload")
            .with(&image_url(MOXXI, 1), b"jpeg one");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.already_downloaded_images, 1);
        assert_eq!(stats.downloaded_images, 1);
        // The pre-existing file is left untouched.
        assert_eq!(
            fs::read(settings.image_path("moxxi", 0)).unwrap(),
            b"already here"
        );
    }

    #[test]
    fn test_image_loop_respects_max_images() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        settings.download_images = true;
        settings.max_images = 2;

        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI])
            .with(&artifact_url(MOXXI), b"payload")
            .with(&image_url(MOXXI, 0), b"jpeg zero")
            .with(&image_url(MOXXI, 1), b"jpeg one")
            .with(&image_url(MOXXI, 2), b"jpeg two");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.downloaded_images, 2);
        assert!(!settings.image_path("moxxi", 2).exists());
    }

    #[test]
    fn test_new_catalog_entries_are_admitted_as_allowed() {
        let dir = tempdir().unwrap();
        let mut settings = test_settings(&dir);
        let other = "sd-concepts-library/borderlands";
        let transport = FakeTransport::new()
            .with_catalog(&settings.concepts_library_url, &[MOXXI, other])
            .with(&artifact_url(MOXXI), b"a")
            .with(&artifact_url(other), b"b");
        let screener = FakeScreener::clean();

        let stats = run(&transport, &screener, &mut settings, true).unwrap();

        assert_eq!(stats.downloaded_repos, 2);
        assert_eq!(settings.policy.allow_list.len(), 2);
        assert_eq!(settings.policy.classify(other), Classification::Allowed);
    }

    #[test]
    fn test_summary_pluralization() {
        let stats = RunStats {
            downloaded_repos: 1,
            failed_repos: 2,
            ..RunStats::default()
        };
        let text = stats.summary();
        assert!(text.contains("Downloaded 1 repo\n"));
        assert!(text.contains("2 repos failed.\n"));
        assert!(text.ends_with("\nDone.\n"));
    }

    #[test]
    fn test_summary_omits_zero_counters() {
        let stats = RunStats::default();
        assert_eq!(stats.summary(), "\nDone.\n");
    }

    #[test]
    fn test_artifact_and_image_urls() {
        assert_eq!(
            artifact_url(MOXXI),
            "https://huggingface.co/sd-concepts-library/moxxi/resolve/main/learned_embeds.bin"
        );
        assert_eq!(
            image_url(MOXXI, 3),
            "https://huggingface.co/sd-concepts-library/moxxi/resolve/main/concept_images/3.jpeg"
        );
    }
}
