//! Object storage behind the file sink

use crate::error::{Error, Result};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Which store a destination talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Local,
    Memory,
    S3,
    /// Cloudflare R2 through the S3 API
    R2,
    Gcs,
    Azure,
}

impl StoreBackend {
    /// URL scheme of locations in this store
    pub fn scheme(self) -> &'static str {
        match self {
            StoreBackend::Local => "file",
            StoreBackend::Memory => "memory",
            StoreBackend::S3 => "s3",
            StoreBackend::R2 => "r2",
            StoreBackend::Gcs => "gs",
            StoreBackend::Azure => "az",
        }
    }

    /// Check if objects leave the machine
    pub fn is_remote(self) -> bool {
        !matches!(self, StoreBackend::Local | StoreBackend::Memory)
    }
}

/// An object store plus the key prefix every file goes under
///
/// Locations are either a URL (`s3://bucket/raw/`, `r2://`, `gs://`,
/// `az://container/`, `memory://`, `file:///srv/lake`) or a plain local
/// directory, which is created when missing. Cloud credentials come from
/// the usual environment variables of each provider.
#[derive(Debug, Clone)]
pub struct CloudDestination {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
    backend: StoreBackend,
}

impl CloudDestination {
    /// Open the store a location points at
    pub fn parse(location: &str) -> Result<Self> {
        match Url::parse(location) {
            // A one-letter scheme is a Windows drive, not a URL
            Ok(url) if url.scheme().len() > 1 => Self::from_url(&url),
            _ => Self::local(Path::new(location)),
        }
    }

    /// In-process store
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            prefix: ObjectPath::default(),
            backend: StoreBackend::Memory,
        }
    }

    /// Directory on the local filesystem
    pub fn local(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::invalid_value("file_sink.base", format!("cannot create {}: {e}", dir.display()))
        })?;
        let store = LocalFileSystem::new_with_prefix(dir)?;
        Ok(Self {
            store: Arc::new(store),
            prefix: ObjectPath::default(),
            backend: StoreBackend::Local,
        })
    }

    fn from_url(url: &Url) -> Result<Self> {
        let backend = match url.scheme() {
            "file" => {
                let dir: PathBuf = url.to_file_path().map_err(|()| {
                    Error::invalid_value("file_sink.base", format!("not a local path: {url}"))
                })?;
                return Self::local(&dir);
            }
            "memory" => return Ok(Self::in_memory()),
            "s3" => StoreBackend::S3,
            "r2" => StoreBackend::R2,
            "gs" => StoreBackend::Gcs,
            "az" => StoreBackend::Azure,
            other => {
                return Err(Error::invalid_value(
                    "file_sink.base",
                    format!("unsupported storage scheme '{other}'"),
                ))
            }
        };

        let bucket = url
            .host_str()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::invalid_value("file_sink.base", format!("no bucket in {url}")))?;
        let store = open_remote(backend, bucket)?;

        Ok(Self {
            store,
            prefix: ObjectPath::from(url.path().trim_matches('/')),
            backend,
        })
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    /// Key of a file relative to the prefix
    fn key(&self, file: &str) -> ObjectPath {
        file.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.prefix.clone(), |path, part| path.child(part))
    }

    /// Replace the object at `file`, returning its full location
    pub async fn write(&self, file: &str, data: Bytes) -> Result<String> {
        let key = self.key(file);
        self.store.put(&key, data.into()).await?;
        Ok(format!("{}://{key}", self.backend.scheme()))
    }

    /// Read the object at `file`, `None` if there is none
    pub async fn read(&self, file: &str) -> Result<Option<Bytes>> {
        let key = self.key(file);
        match self.store.get(&key).await {
            Ok(object) => Ok(Some(object.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn open_remote(backend: StoreBackend, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match backend {
        StoreBackend::S3 => Arc::new(AmazonS3Builder::from_env().with_bucket_name(bucket).build()?),
        StoreBackend::R2 => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            // R2 lives at an account endpoint; AWS_ENDPOINT is already read by from_env
            if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                builder = builder.with_endpoint(endpoint);
            }
            Arc::new(builder.build()?)
        }
        StoreBackend::Gcs => Arc::new(
            GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()?,
        ),
        StoreBackend::Azure => Arc::new(
            MicrosoftAzureBuilder::from_env()
                .with_container_name(bucket)
                .build()?,
        ),
        StoreBackend::Local | StoreBackend::Memory => {
            return Err(Error::output(format!("{} is not a remote store", backend.scheme())))
        }
    };
    Ok(store)
}
