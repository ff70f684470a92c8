use crate::error::PoolError;
use crate::pool::{Group, Pool, Upstream};
use std::sync::Arc;
use tracing::trace;

/// A held slot on an upstream. The counter is incremented and decremented
/// inside `Group`'s own lock (see `pool.rs`), so release here is just
/// telling that group which slot to give back. Rust's ownership model
/// gives us the "released at most once" contract for free: a handle is
/// consumed by `release` (or simply goes out of scope), and the compiler
/// refuses a program that tries to use it again — there is no runtime
/// idempotency check to get wrong.
pub struct UpstreamHandle {
	group: Arc<Group>,
	upstream: Arc<Upstream>,
}

impl UpstreamHandle {
	fn new(group: Arc<Group>, upstream: Arc<Upstream>) -> Self {
		Self { group, upstream }
	}

	pub fn addr(&self) -> std::net::SocketAddr {
		self.upstream.addr
	}

	/// Releases the slot. Equivalent to dropping the handle; kept as a
	/// named method so call sites read as an explicit lifecycle step.
	pub fn release(self) {
		drop(self);
	}
}

impl Drop for UpstreamHandle {
	fn drop(&mut self) {
		self.group.release(&self.upstream);
		trace!(addr = %self.upstream.addr, "released upstream slot");
	}
}

/// Picks and holds upstream slots within authorized groups.
pub struct Forwarder {
	pool: Arc<Pool>,
}

impl Forwarder {
	pub fn new(pool: Arc<Pool>) -> Self {
		Self { pool }
	}

	/// Selects the least-loaded member of `group_label`, ties broken by
	/// lowest insertion index, and returns a handle holding its slot. The
	/// scan and the claim happen atomically inside the group's own lock.
	pub fn pick(&self, group_label: &str) -> Result<UpstreamHandle, PoolError> {
		let group = self.pool.group(group_label).ok_or_else(|| PoolError::GroupUnknown(group_label.to_string()))?;
		let upstream = group.pick().ok_or_else(|| PoolError::GroupEmpty(group_label.to_string()))?;
		Ok(UpstreamHandle::new(group, upstream))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::PoolSpec;
	use std::collections::HashMap;

	fn forwarder(groups: &[(&str, &[&str])]) -> Forwarder {
		let mut map = HashMap::new();
		for (label, addrs) in groups {
			map.insert((*label).to_string(), addrs.iter().map(|a| (*a).to_string()).collect());
		}
		let pool = Pool::from_spec(&PoolSpec { groups: map }).unwrap();
		Forwarder::new(Arc::new(pool))
	}

	#[test]
	fn pick_increments_and_drop_releases() {
		let fwd = forwarder(&[("groupA", &["127.0.0.1:9000", "127.0.0.1:9001"])]);
		let handle = fwd.pick("groupA").unwrap();
		assert_eq!(handle.addr().port(), 9000);
		let second = fwd.pick("groupA").unwrap();
		assert_eq!(second.addr().port(), 9001);
		drop(handle);
		let third = fwd.pick("groupA").unwrap();
		assert_eq!(third.addr().port(), 9000);
	}

	#[test]
	fn unknown_group_is_rejected() {
		let fwd = forwarder(&[("groupA", &["127.0.0.1:9000"])]);
		assert!(matches!(fwd.pick("groupZ"), Err(PoolError::GroupUnknown(_))));
	}
}
