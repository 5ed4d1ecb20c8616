use crate::config::{VoipConfig, CONFIG};
use crate::events::LinkEvent;
use crate::feed;
use crate::ingest::Ingestor;
use crate::session::{IdentityId, Vec3, VisibilityPolicy};
use anyhow::Context as _;
use backtrace::Backtrace;
use bus::{Bus, BusReader};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use vclink_link::LinkWriter;

/// This represents one voice link bridge bound to a host game process. Owns
/// the whole ingestion pipeline with an explicit init/shutdown lifecycle
/// tied to the host's server start/stop.
pub struct LinkServer {
    ingestor: Ingestor,
    broadcaster: Bus<LinkEvent>,
    voip: Option<VoipConfig>,
}

impl LinkServer {
    /// Opens the link region described by `Config.toml`.
    pub fn init() -> anyhow::Result<LinkServer> {
        let writer = LinkWriter::create(&CONFIG.link_path, CONFIG.max_links as usize)
            .with_context(|| format!("creating link region at {}", CONFIG.link_path))?;
        Ok(LinkServer::with_writer(
            writer,
            Duration::from_millis(CONFIG.position_publish_ms as u64),
            CONFIG.voip.clone(),
        ))
    }

    /// Builds a server around an existing region writer. Embedders and
    /// tests use this instead of the global config.
    pub fn with_writer(
        writer: LinkWriter,
        coalesce_window: Duration,
        voip: Option<VoipConfig>,
    ) -> LinkServer {
        LinkServer {
            ingestor: Ingestor::new(writer, coalesce_window),
            broadcaster: Bus::new(100),
            voip,
        }
    }

    /// Subscribes to the internal rebroadcast of session events.
    pub fn add_listener(&mut self) -> BusReader<LinkEvent> {
        self.broadcaster.add_rx()
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn on_player_join(&mut self, id: IdentityId, name: &str) {
        info!("{} linked", name);
        if let Some(voip) = &self.voip {
            info!("VoIP client URL for {}: {}", name, voip.client_url(name));
        }
        self.ingestor.on_player_join(id, name);
        self.broadcaster.broadcast(LinkEvent::PlayerJoined {
            id,
            name: name.to_string(),
        });
    }

    pub fn on_player_leave(&mut self, id: IdentityId) {
        self.ingestor.on_player_leave(id);
        self.broadcaster.broadcast(LinkEvent::PlayerLeft { id });
    }

    pub fn on_world_change(&mut self, id: IdentityId, world: &str) {
        self.ingestor.on_world_change(id, world);
        self.broadcaster.broadcast(LinkEvent::WorldChanged {
            id,
            world: world.to_string(),
        });
    }

    pub fn on_teams_modify(
        &mut self,
        group: &str,
        members: &[IdentityId],
        policy: VisibilityPolicy,
    ) {
        self.ingestor.on_teams_modify(group, members, policy);
        self.broadcaster.broadcast(LinkEvent::TeamsModified {
            group: group.to_string(),
            policy,
            members: members.to_vec(),
        });
    }

    pub fn on_teams_remove(&mut self, group: &str) {
        self.ingestor.on_teams_remove(group);
        self.broadcaster.broadcast(LinkEvent::TeamsRemoved {
            group: group.to_string(),
        });
    }

    pub fn on_position_tick(&mut self, id: IdentityId, pos: Vec3, front: Vec3) {
        self.ingestor.on_position_tick(id, pos, front);
    }

    pub fn end_tick(&mut self) {
        self.ingestor.end_tick();
    }

    /// Publishes a final empty snapshot and removes the region file, so
    /// voice clients drop everyone instead of replaying the last state.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        info!("Unlinking voice clients...");
        self.ingestor.clear();
        self.ingestor
            .into_writer()
            .unlink()
            .context("removing link region")?;
        info!("Unlinked");
        Ok(())
    }

    /// Runs the bridge as a standalone process fed by `feed_path` (or
    /// stdin) until end of input or ctrl-c.
    pub fn run(feed_path: Option<&Path>) -> anyhow::Result<()> {
        std::panic::set_hook(Box::new(|panic_info| {
            let backtrace = Backtrace::new();
            error!("{}\n{:?}", panic_info, backtrace);
        }));

        info!("Starting link bridge...");
        let start_time = Instant::now();

        let stop = Arc::new(AtomicBool::new(false));
        let ctrl_stop = stop.clone();
        ctrlc::set_handler(move || ctrl_stop.store(true, Ordering::Relaxed))
            .context("setting the ctrl-c handler")?;

        let mut server = LinkServer::init()?;
        info!(
            "Link region ready at {} ({} slots), start took {:?}",
            CONFIG.link_path,
            CONFIG.max_links,
            start_time.elapsed()
        );

        match feed_path {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening feed {}", path.display()))?;
                feed::run(&mut server, BufReader::new(file), &stop)?;
            }
            None => feed::run(&mut server, io::stdin().lock(), &stop)?,
        }

        server.shutdown()
    }
}
