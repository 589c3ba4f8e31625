//! Keyed output streams.
//!
//! A `ChannelManager` lazily opens one buffered file per key under a
//! destination directory. File names come from a caller-supplied naming
//! function, so the same manager serves normalization (keyed by base name,
//! channel key and marker) and binning (keyed by a plain channel name).
//! The manager exclusively owns its writers; they are flushed and closed by
//! [`ChannelManager::close`] or, on any other exit path, when it is dropped.

use crate::error::{IoResultExt, Result};
use crate::file_identity::FileIdentity;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::hash::Hash;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One normalized output line together with its routing information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelData {
    pub channel_base_name: String,
    pub channel_key: String,
    pub value: String,
    pub marker: Option<String>,
}

impl ChannelData {
    pub fn new<B, K>(channel_base_name: B, channel_key: K, value: String) -> Self
    where
        B: Into<String>,
        K: Into<String>,
    {
        Self {
            channel_base_name: channel_base_name.into(),
            channel_key: channel_key.into(),
            value,
            marker: None,
        }
    }

    /// Copy of this line routed to the marker-scoped channel.
    pub fn for_marker(&self, marker: &str) -> Self {
        Self {
            marker: Some(marker.to_string()),
            ..self.clone()
        }
    }

    /// Key under which a normalizer caches the stream for this line.
    pub fn stream_id(&self) -> StreamId {
        StreamId {
            base_name: self.channel_base_name.clone(),
            key: self.channel_key.clone(),
            marker: self.marker.clone(),
        }
    }
}

/// Cache key of a normalizer output stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub base_name: String,
    pub key: String,
    pub marker: Option<String>,
}

type Naming<K> = Box<dyn Fn(&K) -> FileIdentity + Send>;

/// Lazily opened, cached output streams keyed by `K`.
pub struct ChannelManager<K = String>
where
    K: Eq + Hash + Clone,
{
    dest_dir: PathBuf,
    naming: Naming<K>,
    channels: HashMap<K, BufWriter<File>>,
    opened: Vec<PathBuf>,
}

impl<K> ChannelManager<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new<P, F>(dest_dir: P, naming: F) -> Self
    where
        P: Into<PathBuf>,
        F: Fn(&K) -> FileIdentity + Send + 'static,
    {
        Self {
            dest_dir: dest_dir.into(),
            naming: Box::new(naming),
            channels: HashMap::new(),
            opened: Vec::new(),
        }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Return the stream for `key`, creating the file and its parent
    /// directories on first use.
    pub fn channel(&mut self, key: &K) -> Result<&mut BufWriter<File>> {
        match self.channels.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.dest_dir.join((self.naming)(key).render());
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).with_path(parent)?;
                }
                let file = File::create(&path).with_path(&path)?;
                debug!("Opened channel file {:?}", path);
                self.opened.push(path);
                Ok(entry.insert(BufWriter::new(file)))
            }
        }
    }

    /// Append `line` plus a line terminator to the channel for `key`.
    pub fn write_line(&mut self, key: &K, line: &str) -> Result<()> {
        let dest_dir = self.dest_dir.clone();
        let writer = self.channel(key)?;
        writeln!(writer, "{}", line).with_path(dest_dir)
    }

    /// Paths of every file opened so far, in opening order.
    pub fn opened_files(&self) -> &[PathBuf] {
        &self.opened
    }

    /// Flush and close every open stream. Errors are logged, not returned.
    pub fn close(&mut self) {
        for (_, mut writer) in self.channels.drain() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush channel file: {}", e);
            }
        }
    }
}

impl<K> Drop for ChannelManager<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_channels_are_opened_lazily_and_cached() {
        let dir = TempDir::new().unwrap();
        let base = FileIdentity::new("global", ["measuring", "login"], "csv");
        let mut manager: ChannelManager =
            ChannelManager::new(dir.path(), move |key: &String| base.with_part(key.as_str()));

        assert!(manager.opened_files().is_empty());
        manager.write_line(&"quantiles".to_string(), "a").unwrap();
        manager.write_line(&"quantiles".to_string(), "b").unwrap();
        manager.write_line(&"executions".to_string(), "c").unwrap();
        assert_eq!(manager.opened_files().len(), 2);
        manager.close();

        let quantiles = dir.path().join("global/[measuring][login][quantiles].csv");
        assert_eq!(fs::read_to_string(quantiles).unwrap(), "a\nb\n");
        let executions = dir.path().join("global/[measuring][login][executions].csv");
        assert_eq!(fs::read_to_string(executions).unwrap(), "c\n");
    }

    #[test]
    fn test_drop_flushes_streams() {
        let dir = TempDir::new().unwrap();
        {
            let mut manager: ChannelManager<StreamId> = ChannelManager::new(dir.path(), |id: &StreamId| {
                FileIdentity::new("", [id.base_name.as_str(), id.key.as_str()], "csv")
                    .with_marker(id.marker.as_deref())
            });
            let data = ChannelData::new("perfmon", "cpu_X", "\"1\"".to_string());
            manager.write_line(&data.stream_id(), &data.value).unwrap();
            let marked = data.for_marker("peak");
            manager.write_line(&marked.stream_id(), &marked.value).unwrap();
        }
        assert_eq!(
            fs::read_to_string(dir.path().join("[perfmon][cpu_X].csv")).unwrap(),
            "\"1\"\n"
        );
        assert!(dir.path().join("[perfmon][cpu_X]{peak}.csv").exists());
    }
}
