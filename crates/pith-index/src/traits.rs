use pith_types::ObjectPath;

use crate::error::IndexResult;
use crate::version::{NewVersion, PurgeScope, Version, VersionSelector};

/// Version index boundary.
///
/// Implementations must satisfy these invariants:
/// - Serials per object are strictly increasing and never reused once
///   published.
/// - `modified` is strictly increasing per object.
/// - Staged versions are invisible to every read except `head`.
/// - Published versions are immutable; only `purge` removes them.
pub trait VersionIndex: Send + Sync {
    /// Allocate the next serial and publish in one atomic step.
    fn create_version(&self, new: NewVersion) -> IndexResult<Version>;

    /// Stage `expected_head + 1` as a pending version.
    ///
    /// Fails with `Conflict` if the latest serial (pending included) is not
    /// `expected_head`.
    fn stage_version(&self, new: NewVersion, expected_head: Option<u64>) -> IndexResult<Version>;

    /// Make a staged version visible.
    fn publish(&self, path: &ObjectPath, serial: u64) -> IndexResult<Version>;

    /// Drop a staged version.
    fn discard(&self, path: &ObjectPath, serial: u64) -> IndexResult<()>;

    fn get_version(&self, path: &ObjectPath, selector: VersionSelector) -> IndexResult<Version>;

    /// Latest version including pending versions and tombstones.
    fn head(&self, path: &ObjectPath) -> IndexResult<Option<Version>>;

    /// Published versions in serial order, tombstones included.
    fn list_versions(&self, path: &ObjectPath) -> IndexResult<Vec<Version>>;

    /// Current, non-deleted versions in a container, sorted by name.
    fn list_objects(&self, account: &str, container: &str) -> IndexResult<Vec<Version>>;

    /// Containers of an account that hold at least one version.
    fn list_containers(&self, account: &str) -> IndexResult<Vec<String>>;

    /// Remove published versions and return them.
    fn purge(&self, path: &ObjectPath, scope: PurgeScope) -> IndexResult<Vec<Version>>;

    /// Insert an already-committed version as published.
    fn restore(&self, version: Version) -> IndexResult<()>;
}
