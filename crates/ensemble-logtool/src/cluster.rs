use std::path::Path;

use tracing::debug;

use crate::archive::{ArchiveCodec, TarCli};
use crate::config::{self, ClusterDoc, ScannerKind};
use crate::error::Result;
use crate::feed::{ResultsFeed, open_feed};
use crate::selector::{ByteScanner, ContentScanner, GrepCli};
use crate::store::{LogStore, open_store};

/// An open connection to the result store and feed.
///
/// Opened once per process and handed to each subcommand.
pub struct Cluster {
    doc: ClusterDoc,
    store: LogStore,
    feed: Box<dyn ResultsFeed>,
    codec: Box<dyn ArchiveCodec>,
    scanner: Box<dyn ContentScanner>,
}

impl Cluster {
    pub fn open(cluster_file: Option<&Path>) -> Result<Self> {
        let doc = config::load_or_default(cluster_file)?;
        debug!(
            "Using cluster file {}",
            doc.path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<default>".into())
        );
        Self::from_doc(doc)
    }

    pub fn from_doc(doc: ClusterDoc) -> Result<Self> {
        let store = open_store(&doc)?;
        let feed = open_feed(&doc)?;
        let codec: Box<dyn ArchiveCodec> = Box::new(TarCli::new(doc.config.archive.compression));
        let scanner: Box<dyn ContentScanner> = match doc.config.upload.scanner {
            ScannerKind::Grep => Box::new(GrepCli),
            ScannerKind::Builtin => Box::new(ByteScanner),
        };
        debug!("Store {}, feed {}", store.describe(), feed.describe());
        Ok(Self {
            doc,
            store,
            feed,
            codec,
            scanner,
        })
    }

    pub fn with_codec(mut self, codec: Box<dyn ArchiveCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_scanner(mut self, scanner: Box<dyn ContentScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn cluster_file(&self) -> Option<&Path> {
        self.doc.path.as_deref()
    }

    pub fn markers(&self) -> &[String] {
        &self.doc.config.upload.markers
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn feed(&self) -> &dyn ResultsFeed {
        self.feed.as_ref()
    }

    pub fn codec(&self) -> &dyn ArchiveCodec {
        self.codec.as_ref()
    }

    pub fn scanner(&self) -> &dyn ContentScanner {
        self.scanner.as_ref()
    }
}
