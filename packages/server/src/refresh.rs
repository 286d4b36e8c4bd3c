//! Proactive refresh of expiring source URLs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::CatalogStore;
use crate::entity::video;
use crate::error::ServiceError;
use crate::storage::{ResolvedLink, StorageRotator};

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct SweepReport {
    /// Videos whose link was inside the refresh window.
    pub scanned: u32,
    pub refreshed: u32,
    /// Provider or store failures. These videos are retried next sweep.
    pub failed: u32,
    /// Videos with no remote file or storage account to resolve against.
    pub skipped: u32,
}

pub struct LinkRefresher {
    catalog: Arc<dyn CatalogStore>,
    rotator: Arc<StorageRotator>,
    window: chrono::Duration,
    running: AtomicBool,
}

/// Clears the run flag when the sweep ends, including on panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LinkRefresher {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        rotator: Arc<StorageRotator>,
        window: chrono::Duration,
    ) -> Self {
        Self {
            catalog,
            rotator,
            window,
            running: AtomicBool::new(false),
        }
    }

    pub fn window(&self) -> chrono::Duration {
        self.window
    }

    /// Whether `video`'s link expires inside the refresh window, or has no
    /// known expiry at all.
    pub fn needs_refresh(&self, video: &video::Model, now: DateTime<Utc>) -> bool {
        video
            .source_url_expires_at
            .is_none_or(|expires_at| expires_at < now + self.window)
    }

    /// Run one sweep unless another is in progress.
    ///
    /// Returns `None` when skipped because a previous sweep is still running.
    pub async fn run_sweep(&self) -> Option<Result<SweepReport, ServiceError>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Link refresh sweep already running, skipping");
            return None;
        }
        let _guard = RunGuard(&self.running);

        Some(self.refresh_expiring().await)
    }

    /// Re-resolve every link expiring within the window.
    ///
    /// Per-video failures are logged and counted; only failing to list the
    /// candidates fails the sweep. There is no retry within a sweep: a video
    /// that failed stays in the expiring set and is picked up next time.
    pub async fn refresh_expiring(&self) -> Result<SweepReport, ServiceError> {
        let candidates = self
            .catalog
            .list_videos_with_expiring_links(self.window)
            .await?;

        let mut report = SweepReport {
            scanned: candidates.len() as u32,
            ..SweepReport::default()
        };

        for video in &candidates {
            if video.remote_file_id.is_none() || video.storage_account_id.is_none() {
                warn!(video_id = %video.id, "Video has no remote file to refresh, skipping");
                report.skipped += 1;
                continue;
            }

            match self.refresh_video(video).await {
                Ok(_) => report.refreshed += 1,
                Err(e) => {
                    error!(video_id = %video.id, error = %e, "Failed to refresh video link");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            refreshed = report.refreshed,
            failed = report.failed,
            skipped = report.skipped,
            "Link refresh sweep finished"
        );
        Ok(report)
    }

    /// Resolve and persist a fresh link for one video.
    pub async fn refresh_video(&self, video: &video::Model) -> Result<ResolvedLink, ServiceError> {
        let (Some(remote_file_id), Some(account_id)) =
            (video.remote_file_id.as_deref(), video.storage_account_id)
        else {
            return Err(ServiceError::Validation(format!(
                "video {} has no remote file",
                video.id
            )));
        };

        let account = self.rotator.account(account_id).await?;
        let link = self
            .rotator
            .resolve_link(remote_file_id, &account.credential(), &CancellationToken::new())
            .await?;

        self.catalog
            .update_source_url(video.id, &link.url, link.expires_at)
            .await?;

        Ok(link)
    }
}

/// Run the link refresher as a background task until `shutdown` fires.
pub async fn run_link_refresher(
    refresher: Arc<LinkRefresher>,
    every: Duration,
    shutdown: CancellationToken,
) {
    info!(
        interval_secs = every.as_secs(),
        window_secs = refresher.window().num_seconds(),
        "Starting link refresher"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Link refresher stopped");
                return;
            }
            _ = interval.tick() => {}
        }

        if let Some(Err(e)) = refresher.run_sweep().await {
            error!(error = %e, "Link refresh sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::catalog::{Fault, MemoryCatalog};
    use crate::testing::{FakeStorage, account, video};

    struct Fixture {
        catalog: Arc<MemoryCatalog>,
        provider: Arc<FakeStorage>,
        refresher: Arc<LinkRefresher>,
        account_id: uuid::Uuid,
    }

    async fn fixture() -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        let provider = Arc::new(FakeStorage::new());
        let acct = account("main", 0.0, 500.0);
        catalog.save_storage_account(acct.clone()).await.unwrap();
        let rotator = Arc::new(StorageRotator::new(
            catalog.clone(),
            provider.clone(),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        Fixture {
            refresher: Arc::new(LinkRefresher::new(
                catalog.clone(),
                rotator,
                chrono::Duration::hours(1),
            )),
            catalog,
            provider,
            account_id: acct.id,
        }
    }

    async fn stored_video(
        f: &Fixture,
        file_id: &str,
        expires_in: chrono::Duration,
    ) -> crate::entity::video::Model {
        let mut v = video(Some(Utc::now()), 0, 0);
        v.remote_file_id = Some(file_id.into());
        v.storage_account_id = Some(f.account_id);
        v.source_url_expires_at = Some(Utc::now() + expires_in);
        f.catalog.save_video(v).await.unwrap()
    }

    #[tokio::test]
    async fn refreshes_only_links_inside_the_window() {
        let f = fixture().await;
        let soon = stored_video(&f, "soon", chrono::Duration::minutes(10)).await;
        let later = stored_video(&f, "later", chrono::Duration::hours(5)).await;

        let report = f.refresher.refresh_expiring().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.refreshed, 1);

        let soon = f.catalog.get_video(soon.id).await.unwrap().unwrap();
        assert_eq!(soon.source_url, "https://p-def1.example/soon/video.mp4");
        assert!(soon.source_url_expires_at.unwrap() > Utc::now() + chrono::Duration::hours(3));

        let later_now = f.catalog.get_video(later.id).await.unwrap().unwrap();
        assert_eq!(later_now.source_url, later.source_url);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_sweep() {
        let f = fixture().await;
        let ids: Vec<_> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let mut videos = Vec::new();
        for id in &ids {
            videos.push(stored_video(&f, id, chrono::Duration::minutes(5)).await);
        }
        f.provider.fail_link_for("b");

        let report = f.refresher.refresh_expiring().await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.refreshed, 2);
        assert_eq!(report.failed, 1);

        let failed = f.catalog.get_video(videos[1].id).await.unwrap().unwrap();
        assert_eq!(failed.source_url, videos[1].source_url);

        // Still expiring, so the next sweep picks it up again.
        f.provider.failing_links.lock().unwrap().clear();
        let report = f.refresher.refresh_expiring().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.refreshed, 1);
    }

    #[tokio::test]
    async fn persist_failure_counts_as_failed() {
        let f = fixture().await;
        stored_video(&f, "a", chrono::Duration::minutes(5)).await;
        f.catalog.set_fault(Fault::SourceUrl, true);

        let report = f.refresher.refresh_expiring().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.refreshed, 0);
    }

    #[tokio::test]
    async fn videos_without_remote_file_are_skipped() {
        let f = fixture().await;
        let mut v = video(Some(Utc::now()), 0, 0);
        v.remote_file_id = None;
        v.source_url_expires_at = Some(Utc::now());
        f.catalog.save_video(v).await.unwrap();

        let report = f.refresher.refresh_expiring().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(f.provider.link_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overlapping_sweep_is_skipped() {
        let f = fixture().await;
        stored_video(&f, "slow", chrono::Duration::minutes(5)).await;
        *f.provider.delay.lock().unwrap() = Duration::from_millis(200);

        let first = {
            let refresher = f.refresher.clone();
            tokio::spawn(async move { refresher.run_sweep().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(f.refresher.run_sweep().await.is_none());

        let first = first.await.unwrap().unwrap().unwrap();
        assert_eq!(first.refreshed, 1);

        // The guard was released, so a later sweep runs.
        *f.provider.delay.lock().unwrap() = Duration::ZERO;
        assert!(f.refresher.run_sweep().await.is_some());
    }

    #[tokio::test]
    async fn background_loop_stops_on_shutdown() {
        let f = fixture().await;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_link_refresher(
            f.refresher.clone(),
            Duration::from_millis(10),
            shutdown.clone(),
        ));

        stored_video(&f, "a", chrono::Duration::minutes(5)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(f.provider.link_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn needs_refresh_follows_the_window() {
        let f = fixture().await;
        let now = Utc::now();
        let mut v = video(Some(now), 0, 0);

        v.source_url_expires_at = Some(now + chrono::Duration::minutes(59));
        assert!(f.refresher.needs_refresh(&v, now));
        v.source_url_expires_at = Some(now + chrono::Duration::minutes(61));
        assert!(!f.refresher.needs_refresh(&v, now));
        v.source_url_expires_at = None;
        assert!(f.refresher.needs_refresh(&v, now));
    }
}
