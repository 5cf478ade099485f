use shipway_core::ReleaseId;

/// The release directories found on the cluster, oldest first. Foreign
/// entries in the remote root (other projects, stray files) are dropped at
/// parse time.
#[derive(Debug, Clone, Default)]
pub struct ReleaseSet {
    releases: Vec<ReleaseId>,
}

impl ReleaseSet {
    /// Builds the set from an `ls -1` style listing.
    pub fn from_listing(project: &str, listing: &str) -> Self {
        let mut releases: Vec<ReleaseId> = listing
            .lines()
            .filter_map(|line| ReleaseId::parse(project, line.trim()))
            .collect();
        releases.sort();
        Self { releases }
    }

    pub fn all(&self) -> &[ReleaseId] {
        &self.releases
    }

    /// The live release, if any deployment ever happened.
    pub fn last(&self) -> Option<&ReleaseId> {
        self.releases.last()
    }

    /// The release a rollback would reactivate.
    pub fn previous(&self) -> Option<&ReleaseId> {
        self.releases.len().checked_sub(2).map(|index| &self.releases[index])
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }
}
