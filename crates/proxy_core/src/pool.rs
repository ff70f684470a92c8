use crate::config::PoolSpec;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A single upstream target. `index` is the upstream's position within its
/// group's configuration list and is fixed for the process lifetime; it is
/// the tie-break key when two upstreams carry the same load.
#[derive(Debug)]
pub struct Upstream {
	pub addr: SocketAddr,
	pub index: usize,
	connections: AtomicU64,
}

impl Upstream {
	pub fn active_connections(&self) -> u64 {
		self.connections.load(Ordering::Relaxed)
	}
}

/// An authorized group of upstreams, addressed by label. Membership is
/// fixed after construction — dynamic discovery is out of scope. `lock`
/// serializes every pick/release against this group: the scan for the
/// least-loaded member and the counter increment that claims it happen
/// inside the same critical section, so two concurrent picks can never
/// both observe the same minimum and both claim it.
#[derive(Debug)]
pub struct Group {
	pub label: String,
	pub members: Vec<Arc<Upstream>>,
	lock: Mutex<()>,
}

impl Group {
	/// Selects the least-loaded member, tie-broken by lowest `index`,
	/// increments its counter, and returns it. `members` is never empty
	/// for a `Group` that made it out of construction, so this only
	/// returns `None` for a defensively-built empty group (never produced
	/// by `Pool::from_spec`).
	pub(crate) fn pick(&self) -> Option<Arc<Upstream>> {
		let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		let upstream = self.members.iter().min_by_key(|u| (u.active_connections(), u.index))?;
		upstream.connections.fetch_add(1, Ordering::AcqRel);
		Some(Arc::clone(upstream))
	}

	/// Releases a slot previously returned by `pick`. Serialized on the
	/// same lock so a release can never interleave with a scan in a way
	/// that hands the same claimed slot to two callers.
	pub(crate) fn release(&self, upstream: &Upstream) {
		let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		upstream.connections.fetch_sub(1, Ordering::AcqRel);
	}
}

/// The full set of authorized upstream groups, built once at startup from
/// `PoolSpec` and never mutated afterward — a plain `HashMap` is enough
/// here (unlike the per-client rate limiter, there is no concurrent
/// insertion to guard against). Each `Group` is handed out as a shared
/// `Arc` so a held `UpstreamHandle` can release through the same group
/// lock it was picked under, even after `Pool` itself has gone away.
#[derive(Debug)]
pub struct Pool {
	groups: HashMap<String, Arc<Group>>,
}

impl Pool {
	pub fn from_spec(spec: &PoolSpec) -> Result<Self, ConfigError> {
		let mut groups = HashMap::with_capacity(spec.groups.len());
		for (label, addrs) in &spec.groups {
			let mut members = Vec::with_capacity(addrs.len());
			for (index, raw_addr) in addrs.iter().enumerate() {
				let addr: SocketAddr = raw_addr
					.parse()
					.map_err(|_| ConfigError::CertLoad(format!("invalid upstream address {raw_addr:?} in group {label}")))?;
				members.push(Arc::new(Upstream { addr, index, connections: AtomicU64::new(0) }));
			}
			groups.insert(label.clone(), Arc::new(Group { label: label.clone(), members, lock: Mutex::new(()) }));
		}
		Ok(Self { groups })
	}

	pub fn group(&self, label: &str) -> Option<Arc<Group>> {
		self.groups.get(label).cloned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn spec(groups: &[(&str, &[&str])]) -> PoolSpec {
		let mut map = std::collections::HashMap::new();
		for (label, addrs) in groups {
			map.insert((*label).to_string(), addrs.iter().map(|a| (*a).to_string()).collect());
		}
		PoolSpec { groups: map }
	}

	#[test]
	fn picks_least_loaded_member() {
		let spec = spec(&[("groupA", &["127.0.0.1:9000", "127.0.0.1:9001"])]);
		let pool = Pool::from_spec(&spec).unwrap();
		let group = pool.group("groupA").unwrap();
		let first = group.pick().unwrap();
		assert_eq!(first.addr.port(), 9000);
		let second = group.pick().unwrap();
		assert_eq!(second.addr.port(), 9001);
	}

	#[test]
	fn ties_break_on_lowest_index() {
		let spec = spec(&[("groupA", &["127.0.0.1:9000", "127.0.0.1:9001", "127.0.0.1:9002"])]);
		let pool = Pool::from_spec(&spec).unwrap();
		let group = pool.group("groupA").unwrap();
		let chosen = group.pick().unwrap();
		assert_eq!(chosen.index, 0);
		assert_eq!(chosen.addr.port(), 9000);
	}

	#[test]
	fn release_restores_eligibility() {
		let spec = spec(&[("groupA", &["127.0.0.1:9000", "127.0.0.1:9001"])]);
		let pool = Pool::from_spec(&spec).unwrap();
		let group = pool.group("groupA").unwrap();
		let first = group.pick().unwrap();
		group.release(&first);
		let chosen = group.pick().unwrap();
		assert_eq!(chosen.index, 0);
	}

	#[test]
	fn unknown_group_is_none() {
		let spec = spec(&[("groupA", &["127.0.0.1:9000"])]);
		let pool = Pool::from_spec(&spec).unwrap();
		assert!(pool.group("groupB").is_none());
	}

	#[test]
	fn concurrent_picks_never_double_claim_the_same_minimum() {
		let spec = spec(&[("groupA", &["127.0.0.1:9000", "127.0.0.1:9001"])]);
		let pool = Arc::new(Pool::from_spec(&spec).unwrap());

		let handles: Vec<_> = (0..2)
			.map(|_| {
				let pool = Arc::clone(&pool);
				std::thread::spawn(move || pool.group("groupA").unwrap().pick().unwrap())
			})
			.collect();
		let picked: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

		// Both upstreams started at 0 load; two concurrent picks must land on
		// the two distinct members, never both on the same one.
		assert_ne!(picked[0].index, picked[1].index);
	}
}
