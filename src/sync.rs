//! The sidecar loop: find survival worlds, give each one an inventory group,
//! and tell the server to reload when the group file changed.
//!
//! Neither file is parsed. Worlds are found by their `survival_g_<id>:` key and
//! groups by their `hardcore_<id>:` key, and new groups are appended as text.

use crate::{
    errors::{RconError, SyncError},
    rcon::RconSession,
};
use std::{
    collections::BTreeSet,
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

const WORLD_PREFIX: &str = "survival_g_";

/// Dimension suffixes, longest first so `_the_end` wins over `_end`.
const DIMENSION_SUFFIXES: [&str; 3] = ["_the_end", "_nether", "_end"];

const BASELINE_GROUP: &str = "hardcore_vanilla";

const BASELINE_BLOCK: &str = "
  hardcore_vanilla:
    worlds:
    - survival_vanilla
    - survival_vanilla_nether
    - survival_vanilla_the_end
    shares:
    - all
";

/// Ticks to skip reload attempts after the server rejected the password.
const AUTH_COOLDOWN_TICKS: u32 = 6;

/// Files and command the sync loop works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTargets {
    /// Multiverse-Core world list.
    pub worlds_file: PathBuf,
    /// Multiverse-Inventories group file.
    pub groups_file: PathBuf,
    /// Command sent after the group file changed.
    pub reload_command: String,
}

/// What one pass of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Number of survival world groups found.
    pub groups: usize,
    /// Whether the group file was rewritten.
    pub changed: bool,
    /// Whether the reload command went through.
    pub reloaded: bool,
}

/// Collect the group IDs of all survival worlds mentioned in `worlds`.
///
/// A world key is `survival_g_` followed by letters, digits, `_` or `-` and a
/// colon. The dimension suffix is stripped, so `survival_g_foo`,
/// `survival_g_foo_nether` and `survival_g_foo_the_end` all yield `foo`.
#[must_use]
pub fn survival_groups(worlds: &str) -> BTreeSet<String> {
    let mut groups = BTreeSet::new();
    let mut rest = worlds;

    while let Some(start) = rest.find(WORLD_PREFIX) {
        let after = &rest[start + WORLD_PREFIX.len()..];
        let id_len = after
            .find(|c: char| !is_id_char(c))
            .unwrap_or(after.len());

        if id_len > 0 && after[id_len..].starts_with(':') {
            let group = strip_dimension(&after[..id_len]);
            if !group.is_empty() {
                groups.insert(group.to_owned());
            }
            rest = &after[id_len + 1..];
        } else {
            rest = &rest[start + 1..];
        }
    }

    groups
}

/// Read the world list at `path`. A missing file has no worlds.
///
/// # Errors
/// Returns [`SyncError::Io`] if the file exists but cannot be read.
pub async fn read_survival_groups(path: &Path) -> Result<BTreeSet<String>, SyncError> {
    match read_optional(path).await? {
        Some(worlds) => Ok(survival_groups(&worlds)),
        None => {
            debug!(path = %path.display(), "world list not found");
            Ok(BTreeSet::new())
        }
    }
}

/// Append the baseline group and one group per ID missing from `content`.
///
/// Returns the new content, or `None` if nothing had to be added.
#[must_use]
pub fn add_missing_groups(content: &str, groups: &BTreeSet<String>) -> Option<String> {
    let mut updated = content.to_owned();

    if !content.contains(&format!("{BASELINE_GROUP}:")) {
        info!("adding {BASELINE_GROUP} baseline group");
        updated.push_str(BASELINE_BLOCK);
    }

    for group in groups {
        if updated.contains(&format!("hardcore_{group}:")) {
            continue;
        }

        info!(group = %group, "adding inventory group");
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&group_block(group));
    }

    (updated != content).then_some(updated)
}

/// Make sure the group file at `path` has a group for each ID.
///
/// A missing group file is left alone, since the plugin has not set up yet.
///
/// # Errors
/// Returns [`SyncError::Io`] if the file cannot be read or written.
pub async fn update_groups(path: &Path, groups: &BTreeSet<String>) -> Result<bool, SyncError> {
    let Some(content) = read_optional(path).await? else {
        debug!(path = %path.display(), "group file not found");
        return Ok(false);
    };

    let Some(updated) = add_missing_groups(&content, groups) else {
        return Ok(false);
    };

    fs::write(path, updated).await.map_err(|source| SyncError::Io {
        path: path.to_owned(),
        source,
    })?;

    Ok(true)
}

/// Polls the world list and keeps the group file and the server in step.
#[derive(Debug)]
pub struct SyncLoop {
    session: RconSession,
    targets: SyncTargets,
    reload_pending: bool,
    cooldown: u32,
}

impl SyncLoop {
    /// Create a loop that reloads through `session`.
    #[must_use]
    pub fn new(session: RconSession, targets: SyncTargets) -> Self {
        Self {
            session,
            targets,
            reload_pending: false,
            cooldown: 0,
        }
    }

    /// Whether a reload is still owed to the server.
    #[must_use]
    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }

    /// Run one pass: scan, update, and reload if needed.
    ///
    /// A reload that fails stays pending and is attempted again on the next
    /// pass, except after an authentication failure, which pauses attempts for
    /// a few passes.
    ///
    /// # Errors
    /// Returns [`SyncError`] if a file could not be accessed or the reload
    /// command failed. The RCON session is closed in the latter case.
    pub async fn tick(&mut self) -> Result<TickReport, SyncError> {
        let groups = read_survival_groups(&self.targets.worlds_file).await?;
        let changed = update_groups(&self.targets.groups_file, &groups).await?;

        let mut report = TickReport {
            groups: groups.len(),
            changed,
            reloaded: false,
        };

        if changed {
            info!("groups updated, reload pending");
            self.reload_pending = true;
        }

        if !self.reload_pending {
            return Ok(report);
        }

        if self.cooldown > 0 {
            self.cooldown -= 1;
            debug!(remaining = self.cooldown, "skipping reload after rejected password");
            return Ok(report);
        }

        info!(command = %self.targets.reload_command, "triggering reload");
        match self.session.execute(&self.targets.reload_command).await {
            Ok(response) => {
                info!(response = %response.trim_end(), "reload done");
                self.reload_pending = false;
                report.reloaded = true;
                Ok(report)
            }
            Err(err) => {
                self.session.disconnect().await;
                if !err.is_retryable() {
                    self.cooldown = AUTH_COOLDOWN_TICKS;
                    if matches!(err, RconError::Authentication) {
                        error!("rcon password rejected, check RCON_PASS");
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Tick every `every` until `shutdown` resolves. Errors are logged and the
    /// loop carries on.
    pub async fn run<F>(&mut self, every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "sync pass failed");
                    }
                }
            }
        }

        self.close().await;
    }

    /// Close the RCON session.
    pub async fn close(&mut self) {
        self.session.disconnect().await;
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn strip_dimension(id: &str) -> &str {
    DIMENSION_SUFFIXES
        .iter()
        .find_map(|suffix| id.strip_suffix(suffix))
        .unwrap_or(id)
}

fn group_block(group: &str) -> String {
    format!(
        "  hardcore_{group}:
    worlds:
    - survival_g_{group}
    - survival_g_{group}_nether
    - survival_g_{group}_the_end
    shares:
    - all
"
    )
}

async fn read_optional(path: &Path) -> Result<Option<String>, SyncError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SyncError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{add_missing_groups, survival_groups, update_groups, SyncLoop, SyncTargets};
    use crate::{
        config::RconConfig,
        errors::{RconError, SyncError},
        rcon::{
            packet::{RconPacket, RconPacketType},
            RconSession, MAX_FRAME_LEN,
        },
        socket::ReadWriteFrame,
    };
    use std::{collections::BTreeSet, path::Path, time::Duration};
    use tempfile::TempDir;
    use tokio::{
        fs,
        io::{self, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    const WORLDS: &str = "\
worlds:
  survival_g_alpha:
    environment: NORMAL
  survival_g_alpha_nether:
    environment: NETHER
  survival_g_alpha_the_end:
    environment: THE_END
  survival_g_beta-2_end:
    environment: THE_END
  survival_vanilla:
    environment: NORMAL
";

    const GROUPS: &str = "groups:\n  default:\n    worlds:\n    - world\n";

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| (*id).to_owned()).collect()
    }

    #[test]
    fn test_survival_groups() {
        assert_eq!(survival_groups(WORLDS), set(&["alpha", "beta-2"]));
    }

    #[test]
    fn test_survival_groups_needs_colon() {
        let worlds = "see survival_g_draft and survival_g_real: yes";

        assert_eq!(survival_groups(worlds), set(&["real"]));
    }

    #[test]
    fn test_survival_groups_strips_one_suffix() {
        let worlds = "survival_g_end:\nsurvival_g_x_nether_end:\nsurvival_g__end:\n";

        assert_eq!(survival_groups(worlds), set(&["end", "x_nether"]));
    }

    #[test]
    fn test_add_missing_groups() {
        let updated = add_missing_groups(GROUPS, &set(&["alpha"])).unwrap();

        assert_eq!(
            updated,
            "groups:
  default:
    worlds:
    - world

  hardcore_vanilla:
    worlds:
    - survival_vanilla
    - survival_vanilla_nether
    - survival_vanilla_the_end
    shares:
    - all
  hardcore_alpha:
    worlds:
    - survival_g_alpha
    - survival_g_alpha_nether
    - survival_g_alpha_the_end
    shares:
    - all
"
        );

        assert_eq!(add_missing_groups(&updated, &set(&["alpha"])), None);
    }

    #[test]
    fn test_add_missing_groups_terminates_last_line() {
        let content = "groups:\n  hardcore_vanilla:\n    shares: [all]";
        let updated = add_missing_groups(content, &set(&["a"])).unwrap();

        assert!(updated.starts_with("groups:\n  hardcore_vanilla:\n    shares: [all]\n  hardcore_a:\n"));
    }

    #[test]
    fn test_prefix_is_not_presence() {
        let content = "  hardcore_vanilla:\n  hardcore_alphabet:\n";
        let updated = add_missing_groups(content, &set(&["alpha", "alphabet"])).unwrap();

        assert!(updated.contains("  hardcore_alpha:\n"));
        assert_eq!(updated.matches("hardcore_alphabet:").count(), 1);
    }

    #[tokio::test]
    async fn test_update_groups_missing_file() -> Result<(), SyncError> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groups.yml");

        assert!(!update_groups(&path, &set(&["alpha"])).await?);
        assert!(!path.exists());

        Ok(())
    }

    #[tokio::test]
    async fn test_update_groups_writes_once() -> Result<(), SyncError> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groups.yml");
        fs::write(&path, GROUPS).await.unwrap();

        assert!(update_groups(&path, &set(&["alpha"])).await?);
        assert!(!update_groups(&path, &set(&["alpha"])).await?);

        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.matches("hardcore_alpha:").count(), 1);

        Ok(())
    }

    async fn read_packet(stream: &mut TcpStream) -> io::Result<RconPacket> {
        let body = stream.read_frame(MAX_FRAME_LEN).await?;
        Ok(RconPacket::decode(body)?)
    }

    async fn reply(stream: &mut TcpStream, request_id: i32, payload: &str) -> io::Result<()> {
        let frame = RconPacket::new(request_id, RconPacketType::Response, payload)
            .encode(MAX_FRAME_LEN)?;
        stream.write_all(&frame).await
    }

    async fn fixture(dir: &Path, port: u16) -> SyncLoop {
        let targets = SyncTargets {
            worlds_file: dir.join("worlds.yml"),
            groups_file: dir.join("groups.yml"),
            reload_command: "mvinv reload".to_owned(),
        };
        fs::write(&targets.worlds_file, WORLDS).await.unwrap();
        fs::write(&targets.groups_file, GROUPS).await.unwrap();

        let config = RconConfig::new("127.0.0.1", port, "secret")
            .with_timeout(Duration::from_millis(500));

        SyncLoop::new(RconSession::new(config), targets)
    }

    #[tokio::test]
    async fn test_tick_reloads_once() -> io::Result<()> {
        let dir = TempDir::new()?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let mut sync = fixture(dir.path(), listener.local_addr()?.port()).await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await?;
            let login = read_packet(&mut stream).await?;
            reply(&mut stream, login.request_id, "").await?;
            let command = read_packet(&mut stream).await?;
            reply(&mut stream, command.request_id, "Reloaded.").await?;
            io::Result::Ok(command.payload)
        });

        let report = sync.tick().await.unwrap();
        assert_eq!(report.groups, 2);
        assert!(report.changed);
        assert!(report.reloaded);
        assert!(!sync.reload_pending());

        let report = sync.tick().await.unwrap();
        assert!(!report.changed);
        assert!(!report.reloaded);

        sync.close().await;
        assert_eq!(server.await??, "mvinv reload");

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_reload_stays_pending() -> io::Result<()> {
        let dir = TempDir::new()?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let mut sync = fixture(dir.path(), listener.local_addr()?.port()).await;

        let server = tokio::spawn(async move {
            // hang up before answering the login
            let (mut stream, _) = listener.accept().await?;
            read_packet(&mut stream).await?;
            drop(stream);

            let (mut stream, _) = listener.accept().await?;
            let login = read_packet(&mut stream).await?;
            reply(&mut stream, login.request_id, "").await?;
            let command = read_packet(&mut stream).await?;
            reply(&mut stream, command.request_id, "").await?;
            io::Result::Ok(())
        });

        let result = sync.tick().await;
        assert!(matches!(result, Err(SyncError::Rcon(RconError::Transport(_)))));
        assert!(sync.reload_pending());

        let report = sync.tick().await.unwrap();
        assert!(!report.changed);
        assert!(report.reloaded);
        assert!(!sync.reload_pending());

        sync.close().await;
        server.await??;

        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_password_cools_down() -> io::Result<()> {
        let dir = TempDir::new()?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let mut sync = fixture(dir.path(), listener.local_addr()?.port()).await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await?;
            read_packet(&mut stream).await?;
            reply(&mut stream, -1, "").await?;
            io::Result::Ok(listener)
        });

        let result = sync.tick().await;
        assert!(matches!(result, Err(SyncError::Rcon(RconError::Authentication))));

        // no new connection while cooling down
        let listener = server.await??;
        for _ in 0..super::AUTH_COOLDOWN_TICKS {
            let report = sync.tick().await.unwrap();
            assert!(!report.reloaded);
            assert!(sync.reload_pending());
        }
        assert!(
            tokio::time::timeout(Duration::from_millis(50), listener.accept())
                .await
                .is_err()
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut sync = fixture(dir.path(), 1).await;
        fs::remove_file(dir.path().join("groups.yml")).await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(2),
            sync.run(Duration::from_millis(10), tokio::time::sleep(Duration::from_millis(50))),
        )
        .await
        .unwrap();

        assert!(!sync.reload_pending());
    }
}
