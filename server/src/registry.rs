//! Game module registry
//!
//! Game types are pluggable state machines. Each one implements
//! [`GameModule`] (static facts plus a factory for sessions) and
//! [`GameLogic`] (the per-session state machine). Modules are linked into
//! the server through a compile-time catalog of `(name, factory)` entries.
//!
//! When a module directory is configured, a game type only counts as
//! installed if its artifacts are present there: `<name>.*` or
//! `<name>server.*`, `<name>commons.*`, and the shared base library.
//! Resolved modules are cached under the lower-cased name until an explicit
//! [`ModuleRegistry::rebuild_all`] succeeds.

use crate::error::{GameError, ModuleError};
use crate::games;
use log::{error, info, warn};
use shared::{GameMode, GamePayload, Player};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

/// Stem of the shared library every module links against.
pub const DEFAULT_BASE_LIBRARY: &str = "gamebase";

/// Artifact stem suffixes that belong to a game type rather than name one.
const COMPANION_SUFFIXES: [&str; 4] = ["server", "commons", "client", "sources"];

/// Something a session's logic wants the server to do.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Deliver a payload to one roster seat
    Send { to: usize, payload: GamePayload },
    /// Deliver a payload to every seat
    Broadcast(GamePayload),
    /// It is now this seat's turn
    Turn(usize),
    /// The game is over; the session ends with this reason
    Finished(String),
}

/// Per-session state machine of one game type.
pub trait GameLogic: Send {
    /// Called once when the session starts running.
    fn initialize(&mut self, roster: &[Player]) -> Result<Vec<GameEvent>, GameError>;

    /// Handles a payload sent by the player at roster index `sender`.
    fn handle(&mut self, sender: usize, payload: &GamePayload) -> Result<Vec<GameEvent>, GameError>;
}

/// A pluggable game type.
pub trait GameModule: Send + Sync {
    fn name(&self) -> &str;
    fn min_players(&self) -> usize;
    fn max_players(&self) -> usize;
    fn create(&self, mode: GameMode) -> Result<Box<dyn GameLogic>, GameError>;
}

pub type ModuleFactory = fn() -> Result<Arc<dyn GameModule>, String>;

/// Entry point of a game type linked into the server.
#[derive(Clone, Copy)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub factory: ModuleFactory,
}

pub fn builtin_catalog() -> Vec<CatalogEntry> {
    vec![CatalogEntry {
        name: games::tictactoe::NAME,
        factory: games::tictactoe::module,
    }]
}

pub struct ModuleRegistry {
    catalog: Vec<CatalogEntry>,
    module_dir: Option<PathBuf>,
    base_library: String,
    build_command: Option<String>,
    cache: Mutex<HashMap<String, Arc<dyn GameModule>>>,
}

impl ModuleRegistry {
    pub fn new(module_dir: Option<PathBuf>, build_command: Option<String>) -> Self {
        Self::with_catalog(builtin_catalog(), module_dir, build_command)
    }

    pub fn with_catalog(
        catalog: Vec<CatalogEntry>,
        module_dir: Option<PathBuf>,
        build_command: Option<String>,
    ) -> Self {
        Self {
            catalog,
            module_dir,
            base_library: DEFAULT_BASE_LIBRARY.to_string(),
            build_command,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves a game type, linking and caching it on first use.
    pub fn resolve(&self, game_type: &str) -> Result<Arc<dyn GameModule>, ModuleError> {
        let key = game_type.to_lowercase();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = cache.get(&key) {
            return Ok(Arc::clone(module));
        }

        if let Some(dir) = &self.module_dir {
            self.check_artifacts(dir, &key)?;
        }

        let entry = self
            .catalog
            .iter()
            .find(|entry| entry.name.to_lowercase() == key)
            .ok_or_else(|| ModuleError::MissingEntryPoint(game_type.to_string()))?;

        let module = (entry.factory)().map_err(|reason| ModuleError::Construction {
            name: game_type.to_string(),
            reason,
        })?;

        info!(
            "Linked game module {} ({}-{} players)",
            module.name(),
            module.min_players(),
            module.max_players()
        );
        cache.insert(key, Arc::clone(&module));
        Ok(module)
    }

    fn check_artifacts(&self, dir: &Path, key: &str) -> Result<(), ModuleError> {
        let stems = scan_stems(dir)?;
        let missing = |what: String| ModuleError::MissingArtifact {
            name: key.to_string(),
            dir: dir.to_path_buf(),
            missing: what,
        };

        if !stems.contains(key) && !stems.contains(&format!("{}server", key)) {
            return Err(missing(format!("{0} or {0}server", key)));
        }
        let commons = format!("{}commons", key);
        if !stems.contains(&commons) {
            return Err(missing(commons));
        }
        let base = self.base_library.to_lowercase();
        if !stems.contains(&base) {
            return Err(missing(base));
        }
        Ok(())
    }

    /// Lists the game types available for play.
    pub fn list_installed(&self) -> Result<Vec<String>, ModuleError> {
        let Some(dir) = &self.module_dir else {
            return Ok(self.catalog.iter().map(|entry| entry.name.to_string()).collect());
        };

        let base = self.base_library.to_lowercase();
        let names = scan_stems(dir)?
            .into_iter()
            .filter(|stem| *stem != base)
            .filter(|stem| !COMPANION_SUFFIXES.iter().any(|suffix| stem.ends_with(suffix)))
            .map(|stem| {
                // Report the catalog spelling when one exists.
                self.catalog
                    .iter()
                    .find(|entry| entry.name.to_lowercase() == stem)
                    .map(|entry| entry.name.to_string())
                    .unwrap_or(stem)
            })
            .collect();
        Ok(names)
    }

    /// Runs the configured build command and, if it succeeds, drops every
    /// cached module so the next resolve links fresh artifacts.
    ///
    /// Blocks until the build finishes. On failure the cache is untouched.
    pub fn rebuild_all(&self) -> Result<(), ModuleError> {
        let Some(command) = &self.build_command else {
            return Err(ModuleError::BuildFailed(
                "no build command configured".to_string(),
            ));
        };

        info!("Rebuilding game modules: {}", command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| ModuleError::BuildFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Module build failed ({}): {}", output.status, stderr.trim());
            return Err(ModuleError::BuildFailed(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = cache.len();
        cache.clear();
        info!("Module build succeeded, dropped {} cached modules", dropped);
        Ok(())
    }

    /// Lower-cased names of the modules resolved so far.
    pub fn cached(&self) -> Vec<String> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = cache.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Lower-cased file stems of the regular files in `dir`.
fn scan_stems(dir: &Path) -> Result<BTreeSet<String>, ModuleError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ModuleError::Io(dir.to_path_buf(), e))?;

    let mut stems = BTreeSet::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.insert(stem.to_lowercase());
        }
    }
    Ok(stems)
}
