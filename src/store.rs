//! Durable snapshots of the resolution engine's state.
//!
//! Four independent JSON artifacts live in the data directory: the resolved
//! and not-found identifier sets, the per-channel block status, and the
//! visited-URL set. A missing or corrupt artifact degrades to empty state
//! with a logged warning; it never aborts a run. Saves are best-effort per
//! artifact for the same reason.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::channels::{ChannelHealth, PersistedChannel};
use crate::visited::VisitedUrls;

pub const RESOLVED_FILE: &str = "resolved.json";
pub const NOT_FOUND_FILE: &str = "not_found.json";
pub const CHANNEL_STATUS_FILE: &str = "channel_status.json";
pub const VISITED_URLS_FILE: &str = "visited_urls.json";

/// Everything reloaded at process start.
pub struct PersistedState {
    pub resolved: HashSet<String>,
    pub not_found: HashSet<String>,
    pub channels: ChannelHealth,
    pub visited: VisitedUrls,
}

pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> io::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn load(&self) -> PersistedState {
        let resolved: HashSet<String> = self.load_or_default(RESOLVED_FILE);
        let not_found: HashSet<String> = self.load_or_default(NOT_FOUND_FILE);
        let visited_urls: Vec<String> = self.load_or_default(VISITED_URLS_FILE);
        let channels = self.load_channels();

        tracing::info!(
            resolved = resolved.len(),
            not_found = not_found.len(),
            visited = visited_urls.len(),
            "loaded persisted state"
        );

        PersistedState {
            resolved,
            not_found,
            channels,
            visited: VisitedUrls::from_urls(visited_urls),
        }
    }

    /// Write all four artifacts. Each is independent: one failed write is
    /// logged and the others still go out.
    pub fn save(
        &self,
        resolved: &HashSet<String>,
        not_found: &HashSet<String>,
        channels: &ChannelHealth,
        visited: &VisitedUrls,
    ) {
        self.write_json(RESOLVED_FILE, &sorted(resolved.iter().map(String::as_str)));
        self.write_json(NOT_FOUND_FILE, &sorted(not_found.iter().map(String::as_str)));
        self.write_json(CHANNEL_STATUS_FILE, &channels.to_persisted());
        self.write_json(VISITED_URLS_FILE, &sorted(visited.iter()));
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    fn load_or_default<T>(&self, file: &str) -> T
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let path = self.path(file);
        if !path.exists() {
            return T::default();
        }
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(file, error = %e, "corrupt state file, starting that piece empty");
                    T::default()
                }
            },
            Err(e) => {
                tracing::warn!(file, error = %e, "unreadable state file, starting that piece empty");
                T::default()
            }
        }
    }

    /// The current shape maps channel name to `{blocked, last_block_time}`.
    /// Older snapshots stored flat booleans with a nested `last_block_time`
    /// map; both load.
    fn load_channels(&self) -> ChannelHealth {
        let raw: serde_json::Value = self.load_or_default(CHANNEL_STATUS_FILE);
        if raw.is_null() {
            return ChannelHealth::new();
        }

        if let Ok(snapshot) =
            serde_json::from_value::<HashMap<String, PersistedChannel>>(raw.clone())
        {
            return ChannelHealth::from_persisted(&snapshot);
        }

        let Some(object) = raw.as_object() else {
            tracing::warn!(
                file = CHANNEL_STATUS_FILE,
                "unrecognized channel status shape, starting empty"
            );
            return ChannelHealth::new();
        };

        let block_times: HashMap<String, u64> = object
            .get("last_block_time")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let mut snapshot = HashMap::new();
        for (name, value) in object {
            if let Some(blocked) = value.as_bool() {
                snapshot.insert(
                    name.clone(),
                    PersistedChannel {
                        blocked,
                        last_block_time: block_times.get(name).copied(),
                    },
                );
            }
        }
        ChannelHealth::from_persisted(&snapshot)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) {
        let path = self.path(file);
        let payload = match serde_json::to_string_pretty(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(file, error = %e, "failed to serialize state file");
                return;
            }
        };
        if let Err(e) = fs::write(&path, payload) {
            tracing::warn!(file, error = %e, "failed to write state file");
        }
    }
}

fn sorted<'a, I: Iterator<Item = &'a str>>(iter: I) -> Vec<&'a str> {
    let mut items: Vec<&str> = iter.collect();
    items.sort_unstable();
    items
}
