//! The control loop.
//!
//! A single control task ticks at a base interval and fires three
//! independently-paced checks in a fixed order: queue pressure, instance
//! health, instance staleness. Handlers never overlap and every external
//! command they trigger goes through the robust executor inside the
//! plugins. A handler failure is logged and the loop moves on; only
//! shutdown ends it.
mod cadence;
use cadence::Cadence;

mod settings;
pub use settings::LoopSettings;

use std::{sync::Arc, time::Instant};

use tracing::{debug, info, warn};

use vmq_model::{InstanceId, InstanceState};

use crate::{
    error::CoreResult,
    plugin::{BatchPlugin, CloudProvider},
    shutdown::ShutdownCoordinator,
    state::InstanceStateStore,
};

pub struct ControlLoop {
    settings: LoopSettings,
    batch: Arc<dyn BatchPlugin>,
    cloud: Arc<dyn CloudProvider>,
    store: InstanceStateStore,
    shutdown: ShutdownCoordinator,
    queue: Cadence,
    health: Cadence,
    stale: Cadence,
}

impl ControlLoop {
    pub fn new(
        settings: LoopSettings,
        batch: Arc<dyn BatchPlugin>,
        cloud: Arc<dyn CloudProvider>,
        store: InstanceStateStore,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        let queue = Cadence::new("queue", settings.check_queue_every);
        let health = Cadence::new("health", settings.check_vms_every);
        let stale = Cadence::new("stale", settings.check_vms_in_error_every);
        Self {
            settings,
            batch,
            cloud,
            store,
            shutdown,
            queue,
            health,
            stale,
        }
    }

    /// Run until shutdown is requested. Always returns `Ok(())` so the
    /// daemon can exit with status zero after a graceful stop.
    pub async fn run(mut self) -> CoreResult<()> {
        info!(
            batch = self.batch.name(),
            cloud = self.cloud.name(),
            sleep_s = self.settings.sleep.as_secs(),
            "control loop started",
        );

        let cancel = self.shutdown.token();
        loop {
            self.tick(Instant::now()).await;

            if self.shutdown.is_shutting_down() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.sleep) => {}
                _ = cancel.cancelled() => break,
            }
        }

        info!("exiting gracefully");
        Ok(())
    }

    /// Fire every due cadence, sequentially and in fixed order.
    async fn tick(&mut self, now: Instant) {
        if self.queue.due(now) {
            if let Err(e) = self.check_queue().await {
                warn!(cadence = self.queue.name(), error = %e, "check failed");
            }
            self.queue.mark(now);
        }
        if self.health.due(now) {
            if let Err(e) = self.check_vms().await {
                warn!(cadence = self.health.name(), error = %e, "check failed");
            }
            self.health.mark(now);
        }
        if self.stale.due(now) {
            if let Err(e) = self.check_vms_in_error().await {
                warn!(cadence = self.stale.name(), error = %e, "check failed");
            }
            self.stale.mark(now);
        }
    }

    /// Scale up when enough jobs have been waiting for long enough,
    /// clamped so the owned pool never exceeds `max_vms`.
    async fn check_queue(&mut self) -> CoreResult<()> {
        debug!("checking queue");
        let waiting = self
            .batch
            .count_waiting_jobs(self.settings.waiting_jobs_time)
            .await?;

        if waiting <= self.settings.waiting_jobs_threshold {
            debug!(
                waiting,
                threshold = self.settings.waiting_jobs_threshold,
                "waiting jobs below threshold",
            );
            return Ok(());
        }

        let desired = waiting.div_ceil(self.settings.n_jobs_per_vm.max(1));
        let owned = self.store.len() as u64;
        let to_boot = if self.settings.max_vms >= 1 {
            desired.min(self.settings.max_vms.saturating_sub(owned))
        } else {
            // max_vms = 0 disables the upper quota.
            desired
        };

        if to_boot == 0 {
            warn!(
                owned,
                max_vms = self.settings.max_vms,
                "over quota: cannot launch any more instances",
            );
            return Ok(());
        }

        info!(waiting, desired, to_boot, owned, "requesting more instances");
        if self.settings.dry_run_boot {
            info!(count = to_boot, "not booting instances: dry run active");
            return Ok(());
        }

        let ids = self.cloud.boot_instances(to_boot).await?;
        for id in ids {
            info!(instance = %id, "instance booted");
            self.store.insert(id);
        }
        self.store.persist()?;
        Ok(())
    }

    /// Terminate owned instances that have been idle past the configured
    /// time, never dropping the owned count below `min_vms`; then boot
    /// replacements when the pool has fallen below the minimum.
    async fn check_vms(&mut self) -> CoreResult<()> {
        debug!("checking instance health");
        let instances = self.cloud.list_instances().await?;

        let candidates: Vec<InstanceId> = instances
            .iter()
            .filter(|i| {
                self.store.contains(&i.id)
                    && i.state == InstanceState::Idle
                    && i.age >= self.settings.idle_for_time
            })
            .map(|i| i.id.clone())
            .collect();

        if !candidates.is_empty() {
            let owned = self.store.len() as u64;
            let budget = owned.saturating_sub(self.settings.min_vms);
            if budget == 0 {
                info!(
                    min_vms = self.settings.min_vms,
                    candidates = candidates.len(),
                    "not terminating idle instances: at minimum quota",
                );
            }

            let mut terminated: u64 = 0;
            for id in candidates {
                if terminated >= budget {
                    break;
                }
                if self.settings.dry_run_shutdown {
                    info!(instance = %id, "not terminating instance: dry run active");
                    terminated += 1;
                    continue;
                }
                match self.cloud.terminate_instance(&id).await {
                    Ok(()) => {
                        info!(
                            instance = %id,
                            idle_for_s = self.settings.idle_for_time.as_secs(),
                            "idle instance terminated",
                        );
                        self.store.remove(&id);
                        terminated += 1;
                    }
                    Err(e) => warn!(instance = %id, error = %e, "terminate request failed"),
                }
            }

            if terminated > 0 && !self.settings.dry_run_shutdown {
                self.store.persist()?;
            }
        }

        self.replenish_to_min().await
    }

    /// Boot instances when the owned pool is below `min_vms`, still
    /// respecting the `max_vms` ceiling.
    async fn replenish_to_min(&mut self) -> CoreResult<()> {
        let owned = self.store.len() as u64;
        if owned >= self.settings.min_vms {
            return Ok(());
        }

        let mut needed = self.settings.min_vms - owned;
        if self.settings.max_vms >= 1 {
            needed = needed.min(self.settings.max_vms.saturating_sub(owned));
        }
        if needed == 0 {
            return Ok(());
        }

        info!(
            owned,
            min_vms = self.settings.min_vms,
            needed,
            "pool below minimum quota: replenishing",
        );
        if self.settings.dry_run_boot {
            info!(count = needed, "not booting instances: dry run active");
            return Ok(());
        }

        let ids = self.cloud.boot_instances(needed).await?;
        for id in ids {
            info!(instance = %id, "instance booted");
            self.store.insert(id);
        }
        self.store.persist()?;
        Ok(())
    }

    /// Drop instances stuck in boot past the deploy estimate or reported
    /// errored. They leave the owned set first; the terminate request is
    /// best-effort afterwards.
    async fn check_vms_in_error(&mut self) -> CoreResult<()> {
        debug!("checking stale and errored instances");
        let instances = self.cloud.list_instances().await?;

        let mut doomed: Vec<(InstanceId, &'static str)> = Vec::new();
        for info in &instances {
            if !self.store.contains(&info.id) {
                continue;
            }
            match info.state {
                InstanceState::Error => doomed.push((info.id.clone(), "errored")),
                InstanceState::Booting if info.age >= self.settings.estimated_vm_deploy_time => {
                    doomed.push((info.id.clone(), "stale boot"))
                }
                _ => {}
            }
        }

        if doomed.is_empty() {
            return Ok(());
        }

        if self.settings.dry_run_shutdown {
            for (id, reason) in &doomed {
                info!(instance = %id, reason, "not dropping instance: dry run active");
            }
            return Ok(());
        }

        for (id, reason) in &doomed {
            warn!(instance = %id, reason, "dropping instance from owned set");
            self.store.remove(id);

            if let Err(e) = self.cloud.terminate_instance(id).await {
                warn!(instance = %id, error = %e, "terminate request failed");
            }
        }

        self.store.persist()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;

    use vmq_model::{InstanceInfo, ResolvedConfig, defaults};

    use super::*;
    use crate::error::CoreError;

    struct StaticBatch(u64);

    #[async_trait]
    impl BatchPlugin for StaticBatch {
        fn name(&self) -> &'static str {
            "static-batch"
        }
        async fn count_waiting_jobs(&self, _older_than: Duration) -> CoreResult<u64> {
            Ok(self.0)
        }
    }

    struct FailingBatch;

    #[async_trait]
    impl BatchPlugin for FailingBatch {
        fn name(&self) -> &'static str {
            "failing-batch"
        }
        async fn count_waiting_jobs(&self, _older_than: Duration) -> CoreResult<u64> {
            Err(CoreError::plugin("failing-batch", "queue unavailable"))
        }
    }

    #[derive(Default)]
    struct MockCloud {
        instances: Mutex<Vec<InstanceInfo>>,
        boot_requests: Mutex<Vec<u64>>,
        terminate_requests: Mutex<Vec<InstanceId>>,
        list_calls: AtomicU64,
        next_id: AtomicU64,
        fail_terminate: bool,
    }

    impl MockCloud {
        fn with_instances(instances: Vec<InstanceInfo>) -> Self {
            Self {
                instances: Mutex::new(instances),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl CloudProvider for MockCloud {
        fn name(&self) -> &'static str {
            "mock-cloud"
        }

        async fn list_instances(&self) -> CoreResult<Vec<InstanceInfo>> {
            self.list_calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.instances.lock().unwrap().clone())
        }

        async fn boot_instances(&self, count: u64) -> CoreResult<Vec<InstanceId>> {
            self.boot_requests.lock().unwrap().push(count);
            Ok((0..count)
                .map(|_| {
                    let n = self.next_id.fetch_add(1, Ordering::Relaxed);
                    InstanceId::new(format!("m-{n}"))
                })
                .collect())
        }

        async fn terminate_instance(&self, id: &InstanceId) -> CoreResult<()> {
            self.terminate_requests.lock().unwrap().push(id.clone());
            if self.fail_terminate {
                return Err(CoreError::plugin("mock-cloud", "terminate rejected"));
            }
            Ok(())
        }
    }

    fn base_settings() -> LoopSettings {
        let mut s = LoopSettings::from_config(&ResolvedConfig::resolve(&defaults(), None));
        s.sleep = Duration::from_millis(10);
        s
    }

    fn empty_store(dir: &tempfile::TempDir) -> InstanceStateStore {
        InstanceStateStore::open(dir.path().join("instances")).unwrap()
    }

    fn make_loop(
        settings: LoopSettings,
        batch: Arc<dyn BatchPlugin>,
        cloud: Arc<dyn CloudProvider>,
        store: InstanceStateStore,
    ) -> ControlLoop {
        ControlLoop::new(settings, batch, cloud, store, ShutdownCoordinator::new())
    }

    #[tokio::test]
    async fn queue_check_boots_clamped_by_max_vms() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.waiting_jobs_threshold = 10;
        settings.max_vms = 3;

        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(
            settings,
            Arc::new(StaticBatch(100)),
            cloud.clone(),
            empty_store(&dir),
        );

        cl.check_queue().await.unwrap();

        // 100 jobs / 4 per vm = 25 desired, clamped to the quota of 3.
        assert_eq!(*cloud.boot_requests.lock().unwrap(), vec![3]);
        assert_eq!(cl.store.len(), 3);

        let reloaded = InstanceStateStore::open(dir.path().join("instances")).unwrap();
        assert_eq!(reloaded.len(), 3, "booted ids must be persisted");
    }

    #[tokio::test]
    async fn queue_check_below_threshold_boots_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.waiting_jobs_threshold = 10;

        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(
            settings,
            Arc::new(StaticBatch(10)),
            cloud.clone(),
            empty_store(&dir),
        );

        cl.check_queue().await.unwrap();
        assert!(cloud.boot_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn queue_check_counts_existing_owned_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.max_vms = 3;

        let mut store = empty_store(&dir);
        store.insert(InstanceId::from("i-1"));
        store.insert(InstanceId::from("i-2"));

        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(settings, Arc::new(StaticBatch(100)), cloud.clone(), store);

        cl.check_queue().await.unwrap();
        assert_eq!(*cloud.boot_requests.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn queue_check_over_quota_boots_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.max_vms = 2;

        let mut store = empty_store(&dir);
        store.insert(InstanceId::from("i-1"));
        store.insert(InstanceId::from("i-2"));

        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(settings, Arc::new(StaticBatch(50)), cloud.clone(), store);

        cl.check_queue().await.unwrap();
        assert!(cloud.boot_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_boot_skips_the_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.dry_run_boot = true;

        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(
            settings,
            Arc::new(StaticBatch(50)),
            cloud.clone(),
            empty_store(&dir),
        );

        cl.check_queue().await.unwrap();
        assert!(cloud.boot_requests.lock().unwrap().is_empty());
        assert!(cl.store.is_empty());
    }

    #[tokio::test]
    async fn health_check_honors_min_vms() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.min_vms = 1;
        settings.idle_for_time = Duration::from_secs(3600);

        let mut store = empty_store(&dir);
        store.insert(InstanceId::from("i-1"));
        store.insert(InstanceId::from("i-2"));

        let cloud = Arc::new(MockCloud::with_instances(vec![
            InstanceInfo::new("i-1", InstanceState::Idle, Duration::from_secs(4000)),
            InstanceInfo::new("i-2", InstanceState::Idle, Duration::from_secs(5000)),
        ]));
        let mut cl = make_loop(settings, Arc::new(StaticBatch(0)), cloud.clone(), store);

        cl.check_vms().await.unwrap();

        assert_eq!(cloud.terminate_requests.lock().unwrap().len(), 1);
        assert_eq!(cl.store.len(), 1, "owned count never drops below min_vms");
    }

    #[tokio::test]
    async fn health_check_ignores_unowned_and_fresh_instances() {
        let dir = tempfile::tempdir().unwrap();
        let settings = base_settings();

        let mut store = empty_store(&dir);
        store.insert(InstanceId::from("i-1"));

        let cloud = Arc::new(MockCloud::with_instances(vec![
            // Owned but idle for less than the threshold.
            InstanceInfo::new("i-1", InstanceState::Idle, Duration::from_secs(30)),
            // Idle long enough but not owned by this daemon.
            InstanceInfo::new("foreign", InstanceState::Idle, Duration::from_secs(9000)),
        ]));
        let mut cl = make_loop(settings, Arc::new(StaticBatch(0)), cloud.clone(), store);

        cl.check_vms().await.unwrap();
        assert!(cloud.terminate_requests.lock().unwrap().is_empty());
        assert_eq!(cl.store.len(), 1);
    }

    #[tokio::test]
    async fn stale_check_removes_errored_even_when_terminate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = base_settings();

        let mut store = empty_store(&dir);
        store.insert(InstanceId::from("i-1"));

        let cloud = Arc::new(MockCloud {
            instances: Mutex::new(vec![InstanceInfo::new(
                "i-1",
                InstanceState::Error,
                Duration::from_secs(5),
            )]),
            fail_terminate: true,
            ..Default::default()
        });
        let mut cl = make_loop(settings, Arc::new(StaticBatch(0)), cloud.clone(), store);

        cl.check_vms_in_error().await.unwrap();

        assert!(cl.store.is_empty(), "errored instance leaves the owned set");
        assert_eq!(cloud.terminate_requests.lock().unwrap().len(), 1);

        let reloaded = InstanceStateStore::open(dir.path().join("instances")).unwrap();
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn dry_run_shutdown_keeps_stale_instances_owned() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.dry_run_shutdown = true;

        let mut store = empty_store(&dir);
        store.insert(InstanceId::from("i-1"));
        store.persist().unwrap();

        let cloud = Arc::new(MockCloud::with_instances(vec![InstanceInfo::new(
            "i-1",
            InstanceState::Error,
            Duration::from_secs(5),
        )]));
        let mut cl = make_loop(settings, Arc::new(StaticBatch(0)), cloud.clone(), store);

        cl.check_vms_in_error().await.unwrap();

        assert!(cloud.terminate_requests.lock().unwrap().is_empty());
        assert!(cl.store.contains(&InstanceId::from("i-1")));

        let reloaded = InstanceStateStore::open(dir.path().join("instances")).unwrap();
        assert!(
            reloaded.contains(&InstanceId::from("i-1")),
            "dry run must leave the persisted owned set untouched"
        );
    }

    #[tokio::test]
    async fn health_check_replenishes_below_min_vms() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.min_vms = 2;

        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(
            settings,
            Arc::new(StaticBatch(0)),
            cloud.clone(),
            empty_store(&dir),
        );

        cl.check_vms().await.unwrap();

        assert_eq!(*cloud.boot_requests.lock().unwrap(), vec![2]);
        assert_eq!(cl.store.len(), 2);

        let reloaded = InstanceStateStore::open(dir.path().join("instances")).unwrap();
        assert_eq!(reloaded.len(), 2, "replenished ids must be persisted");
    }

    #[tokio::test]
    async fn replenish_is_clamped_by_max_vms() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.min_vms = 5;
        settings.max_vms = 3;

        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(
            settings,
            Arc::new(StaticBatch(0)),
            cloud.clone(),
            empty_store(&dir),
        );

        cl.check_vms().await.unwrap();
        assert_eq!(*cloud.boot_requests.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn replenish_honors_dry_run_boot() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.min_vms = 2;
        settings.dry_run_boot = true;

        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(
            settings,
            Arc::new(StaticBatch(0)),
            cloud.clone(),
            empty_store(&dir),
        );

        cl.check_vms().await.unwrap();
        assert!(cloud.boot_requests.lock().unwrap().is_empty());
        assert!(cl.store.is_empty());
    }

    #[tokio::test]
    async fn stale_check_drops_long_booting_instances_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = base_settings();
        settings.estimated_vm_deploy_time = Duration::from_secs(600);

        let mut store = empty_store(&dir);
        store.insert(InstanceId::from("slow"));
        store.insert(InstanceId::from("fresh"));

        let cloud = Arc::new(MockCloud::with_instances(vec![
            InstanceInfo::new("slow", InstanceState::Booting, Duration::from_secs(700)),
            InstanceInfo::new("fresh", InstanceState::Booting, Duration::from_secs(10)),
        ]));
        let mut cl = make_loop(settings, Arc::new(StaticBatch(0)), cloud.clone(), store);

        cl.check_vms_in_error().await.unwrap();

        assert!(!cl.store.contains(&InstanceId::from("slow")));
        assert!(cl.store.contains(&InstanceId::from("fresh")));
    }

    #[tokio::test]
    async fn failing_batch_check_does_not_abort_the_tick() {
        let dir = tempfile::tempdir().unwrap();
        let cloud = Arc::new(MockCloud::default());
        let mut cl = make_loop(
            base_settings(),
            Arc::new(FailingBatch),
            cloud.clone(),
            empty_store(&dir),
        );

        cl.tick(Instant::now()).await;

        // The later cadences still fired despite the queue failure.
        assert!(cloud.list_calls.load(Ordering::Relaxed) >= 1);
    }

    #[tokio::test]
    async fn run_exits_with_ok_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = ShutdownCoordinator::new();
        let cl = ControlLoop::new(
            base_settings(),
            Arc::new(StaticBatch(0)),
            Arc::new(MockCloud::default()),
            empty_store(&dir),
            shutdown.clone(),
        );

        let handle = tokio::spawn(cl.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.request_stop();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop must exit promptly after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }
}
