use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::MapperError;
use crate::marshal::MarshalOptions;

use super::Connection;

/// Whether the database file may be created or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenMode {
    #[default]
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
}

/// Native threading mode requested for the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreadingMode {
    /// `SQLITE_OPEN_NOMUTEX`: the caller guarantees one thread at a time.
    Single,
    /// `SQLITE_OPEN_FULLMUTEX`: the native layer serialises calls.
    #[default]
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    #[must_use]
    pub fn as_pragma(self) -> &'static str {
        match self {
            JournalMode::Delete => "delete",
            JournalMode::Truncate => "truncate",
            JournalMode::Persist => "persist",
            JournalMode::Memory => "memory",
            JournalMode::Wal => "wal",
            JournalMode::Off => "off",
        }
    }
}

/// Key handed to the native layer before any schema access.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Passphrase(String),
    /// A raw 32-byte key, passed as a blob literal.
    Raw([u8; 32]),
}

impl KeyMaterial {
    /// Value for `PRAGMA key` / `PRAGMA rekey`.
    pub(crate) fn pragma_value(&self) -> String {
        match self {
            KeyMaterial::Passphrase(passphrase) => passphrase.clone(),
            KeyMaterial::Raw(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
                format!("x'{hex}'")
            }
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Passphrase(_) => f.write_str("Passphrase(..)"),
            KeyMaterial::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}

/// Statements run around keying, e.g. `PRAGMA cipher_page_size`.
pub type ConnectionHook = Arc<dyn Fn(&rusqlite::Connection) -> rusqlite::Result<()> + Send + Sync>;

/// Options for opening a [`Connection`].
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub path: String,
    #[serde(default)]
    pub open_mode: OpenMode,
    #[serde(default)]
    pub threading: ThreadingMode,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout: Duration,
    #[serde(default)]
    pub journal_mode: Option<JournalMode>,
    #[serde(default)]
    pub marshal: MarshalOptions,
    #[serde(skip)]
    pub key: Option<KeyMaterial>,
    #[serde(skip)]
    pub pre_key_hook: Option<ConnectionHook>,
    #[serde(skip)]
    pub post_key_hook: Option<ConnectionHook>,
}

fn default_busy_timeout() -> Duration {
    Duration::from_millis(100)
}

impl ConnectionOptions {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            open_mode: OpenMode::default(),
            threading: ThreadingMode::default(),
            busy_timeout: default_busy_timeout(),
            journal_mode: None,
            marshal: MarshalOptions::default(),
            key: None,
            pre_key_hook: None,
            post_key_hook: None,
        }
    }

    /// Private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    #[must_use]
    pub fn builder(path: impl Into<String>) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(path)
    }

    #[must_use]
    pub fn with_open_mode(mut self, open_mode: OpenMode) -> Self {
        self.open_mode = open_mode;
        self
    }

    #[must_use]
    pub fn with_threading(mut self, threading: ThreadingMode) -> Self {
        self.threading = threading;
        self
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn with_journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.journal_mode = Some(journal_mode);
        self
    }

    #[must_use]
    pub fn with_marshal(mut self, marshal: MarshalOptions) -> Self {
        self.marshal = marshal;
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: KeyMaterial) -> Self {
        self.key = Some(key);
        self
    }

    #[must_use]
    pub fn with_pre_key_hook(mut self, hook: ConnectionHook) -> Self {
        self.pre_key_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_post_key_hook(mut self, hook: ConnectionHook) -> Self {
        self.post_key_hook = Some(hook);
        self
    }

    pub(crate) fn open_flags(&self) -> rusqlite::OpenFlags {
        use rusqlite::OpenFlags;

        let mut flags = match self.open_mode {
            OpenMode::ReadWriteCreate => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
        };
        flags |= match self.threading {
            ThreadingMode::Single => OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ThreadingMode::Full => OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        };
        flags | OpenFlags::SQLITE_OPEN_URI
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("path", &self.path)
            .field("open_mode", &self.open_mode)
            .field("threading", &self.threading)
            .field("busy_timeout", &self.busy_timeout)
            .field("journal_mode", &self.journal_mode)
            .field("marshal", &self.marshal)
            .field("key", &self.key)
            .field("pre_key_hook", &self.pre_key_hook.is_some())
            .field("post_key_hook", &self.post_key_hook.is_some())
            .finish()
    }
}

/// Fluent builder for [`ConnectionOptions`].
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    opts: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            opts: ConnectionOptions::new(path),
        }
    }

    #[must_use]
    pub fn open_mode(mut self, open_mode: OpenMode) -> Self {
        self.opts.open_mode = open_mode;
        self
    }

    #[must_use]
    pub fn threading(mut self, threading: ThreadingMode) -> Self {
        self.opts.threading = threading;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn journal_mode(mut self, journal_mode: JournalMode) -> Self {
        self.opts.journal_mode = Some(journal_mode);
        self
    }

    #[must_use]
    pub fn marshal(mut self, marshal: MarshalOptions) -> Self {
        self.opts.marshal = marshal;
        self
    }

    #[must_use]
    pub fn key(mut self, key: KeyMaterial) -> Self {
        self.opts.key = Some(key);
        self
    }

    #[must_use]
    pub fn pre_key_hook(mut self, hook: ConnectionHook) -> Self {
        self.opts.pre_key_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn post_key_hook(mut self, hook: ConnectionHook) -> Self {
        self.opts.post_key_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectionOptions {
        self.opts
    }

    /// Open a synchronous connection with these options.
    ///
    /// # Errors
    /// Returns [`MapperError`] if the database cannot be opened or configured.
    pub fn open(self) -> Result<Connection, MapperError> {
        Connection::open(self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_round_trip_skips_runtime_fields() {
        let opts = ConnectionOptions::builder("app.db")
            .journal_mode(JournalMode::Wal)
            .busy_timeout(Duration::from_secs(2))
            .key(KeyMaterial::Passphrase("secret".into()))
            .finish();
        let json = serde_json::to_string(&opts).expect("serialize");
        assert!(!json.contains("secret"));
        let back: ConnectionOptions = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.path, "app.db");
        assert_eq!(back.journal_mode, Some(JournalMode::Wal));
        assert_eq!(back.busy_timeout, Duration::from_secs(2));
        assert!(back.key.is_none());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let opts: ConnectionOptions = serde_json::from_str(r#"{"path":"x.db"}"#).expect("parse");
        assert_eq!(opts.open_mode, OpenMode::ReadWriteCreate);
        assert_eq!(opts.threading, ThreadingMode::Full);
        assert_eq!(opts.marshal, MarshalOptions::default());
    }

    #[test]
    fn raw_key_is_a_blob_literal() {
        let key = KeyMaterial::Raw([0xab; 32]);
        let value = key.pragma_value();
        assert!(value.starts_with("x'abab"));
        assert_eq!(value.len(), 3 + 64);
        assert_eq!(format!("{key:?}"), "Raw(..)");
    }

    #[test]
    fn journal_mode_parses_from_cli_text() {
        let mode = JournalMode::from_str("wal", true).expect("value enum");
        assert_eq!(mode, JournalMode::Wal);
    }
}
