//! Periodic synchronization of the identity source into the snapshot cache.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::{
	sync::{watch, Mutex},
	task::JoinHandle,
	time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
	cache::{Snapshot, SnapshotCache},
	config::DirectoryConfig,
	error::Error,
	layout::Layout,
	membership::{self, Directory, LinkStats, MembershipOptions},
	source::IdentitySource,
	synthesize::{self, name_key},
};

/// What a single call to [`Synchronizer::sync_once`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
	/// A new snapshot was published.
	Published(SyncStats),
	/// Another pass was still running, nothing was done.
	Skipped,
}

/// Figures about a published snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
	/// Group entries published.
	pub groups: usize,
	/// User entries published.
	pub users: usize,
	/// Links written by the membership resolver.
	pub links: LinkStats,
}

/// Rebuilds the directory snapshot from an [`IdentitySource`].
///
/// Passes never overlap: [`sync_once`](Self::sync_once) holds a lock for the
/// whole pass and returns [`SyncOutcome::Skipped`] if it is already held.
#[derive(Debug)]
pub struct Synchronizer<S> {
	/// Where users and groups come from.
	source: Arc<S>,
	/// Where entries are placed in the tree.
	layout: Layout,
	/// Membership publishing modes.
	options: MembershipOptions,
	/// Destination of each pass.
	cache: Arc<SnapshotCache>,
	/// Time between passes.
	period: Duration,
	/// Run the first pass right away.
	sync_on_startup: bool,
	/// Held while a pass runs.
	running: Mutex<()>,
}

impl<S: IdentitySource + 'static> Synchronizer<S> {
	/// Create a synchronizer publishing into `cache`.
	pub fn new(
		config: &DirectoryConfig,
		source: Arc<S>,
		cache: Arc<SnapshotCache>,
	) -> Result<Self, Error> {
		if config.sync_interval == 0 {
			return Err(Error::Config("sync_interval must be at least one second".to_owned()));
		}
		Ok(Self {
			source,
			layout: config.layout()?,
			options: MembershipOptions::from(config),
			cache,
			period: config.sync_period(),
			sync_on_startup: config.sync_on_startup,
			running: Mutex::new(()),
		})
	}

	/// Perform one full pass and publish the result, unless a pass is
	/// already running. On error the published snapshot is left as it was.
	pub async fn sync_once(&self) -> Result<SyncOutcome, Error> {
		let Ok(_guard) = self.running.try_lock() else {
			warn!("Synchronization pass still running, skipping");
			return Ok(SyncOutcome::Skipped);
		};

		info!("Synchronization started");
		let started = Instant::now();
		let (snapshot, links) = build_snapshot(self.source.as_ref(), &self.layout, self.options).await?;
		let stats = SyncStats { groups: snapshot.groups().len(), users: snapshot.users().len(), links };
		self.cache.publish(snapshot);
		info!(
			groups = stats.groups,
			users = stats.users,
			user_links = stats.links.user_links,
			group_links = stats.links.group_links,
			skipped = stats.links.skipped,
			elapsed_ms = started.elapsed().as_millis(),
			"Synchronization complete"
		);
		Ok(SyncOutcome::Published(stats))
	}

	/// Perform a pass every period until `shutdown` becomes `true` or its
	/// sender is dropped. Failed passes are logged and retried at the next
	/// tick.
	pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
		let start = if self.sync_on_startup { Instant::now() } else { Instant::now() + self.period };
		let mut ticker = tokio::time::interval_at(start, self.period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					if let Err(err) = self.sync_once().await {
						error!("Synchronization failed, keeping previous snapshot: {err}");
					}
				}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						debug!("Synchronizer shutting down");
						break;
					}
				}
			}
		}
	}

	/// Run [`run`](Self::run) on a background task.
	pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
		tokio::spawn(async move { self.run(shutdown).await })
	}
}

/// Fetch everything from `source` and build a complete snapshot.
pub async fn build_snapshot<S: IdentitySource + ?Sized>(
	source: &S,
	layout: &Layout,
	options: MembershipOptions,
) -> Result<(Snapshot, LinkStats), Error> {
	let (groups, users, edges) =
		tokio::try_join!(source.search_groups(), source.search_users(), source.memberships())?;
	debug!(groups = groups.len(), users = users.len(), edges = edges.len(), "Fetched identity data");

	let mut group_entries = synthesize::group_entries(layout, &groups)?;
	let mut user_entries = synthesize::user_entries(layout, &users)?;
	let groups: BTreeMap<_, _> = groups.into_iter().map(|g| (name_key(&g.name), g)).collect();
	let users: BTreeMap<_, _> = users.into_iter().map(|u| (name_key(&u.name), u)).collect();

	let links = membership::resolve(
		&edges,
		&mut Directory {
			groups: &groups,
			users: &users,
			group_entries: &mut group_entries,
			user_entries: &mut user_entries,
		},
		options,
	);

	let snapshot = Snapshot::new(
		group_entries.into_values().collect(),
		user_entries.into_values().collect(),
		OffsetDateTime::now_utc(),
	);
	Ok((snapshot, links))
}
