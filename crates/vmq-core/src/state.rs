use std::{
    collections::BTreeSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use vmq_model::InstanceId;

use crate::error::CoreResult;

/// Persistent set of instance identifiers owned by this daemon.
///
/// On disk the set is one identifier per line, UTF-8, at a fixed path. The
/// file on disk always reflects the last committed in-memory state: writes go
/// to a temporary file in the same directory followed by an atomic rename, so
/// a crash mid-write never leaves a partial file behind.
#[derive(Debug)]
pub struct InstanceStateStore {
    path: PathBuf,
    owned: BTreeSet<InstanceId>,
}

impl InstanceStateStore {
    /// Open the store at `path`, loading any previously persisted set.
    ///
    /// A missing file is an empty set. Failure to create the parent
    /// directory or to read an existing file is the one fatal startup
    /// condition of the daemon.
    pub fn open<P: Into<PathBuf>>(path: P) -> CoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let owned = match fs::read_to_string(&path) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(InstanceId::from)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), owned = owned.len(), "instance state loaded");
        Ok(Self { path, owned })
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.owned.contains(id)
    }

    pub fn owned(&self) -> &BTreeSet<InstanceId> {
        &self.owned
    }

    /// Track a newly provisioned instance. Returns `false` when already
    /// present.
    pub fn insert(&mut self, id: InstanceId) -> bool {
        self.owned.insert(id)
    }

    /// Stop tracking an instance. Returns `false` when it was not owned.
    pub fn remove(&mut self, id: &InstanceId) -> bool {
        self.owned.remove(id)
    }

    /// Flush the in-memory set to disk with atomic-replace semantics.
    pub fn persist(&self) -> CoreResult<()> {
        let tmp = self.path.with_extension("tmp");

        let mut file = fs::File::create(&tmp)?;
        for id in &self.owned {
            writeln!(file, "{id}")?;
        }
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), owned = self.owned.len(), "instance state persisted");
        Ok(())
    }
}
