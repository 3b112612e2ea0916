//! HTTP driver for a restAssured server
//!
//! Blobs live under `/uploader` (manifest, upload, update, delete) and are
//! served back from `/media/<content key>`. Table liaisons hang off the same
//! base URL.

use super::{parse_response, BlobTransport, ManifestResponse, RestResponse};
use crate::auth::Signer;
use crate::config::DriverConfig;
use crate::liaison::{HandlerLiaison, LiaisonRegistry};
use crate::model::{
    Attributes, Checksum, ChecksumEngine, ManifestRecord, SerializationKind, CHECKSUM_ALGO_KEY,
    CHECKSUM_KEY, CONTENT_KEY, META_DATA_KEY,
};
use crate::serializer::{BlobStream, ChunkStream, DEFAULT_CHUNK_SIZE};
use crate::{Error, Result};
use parking_lot::RwLock;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Resource name of the built-in job table
pub const JOB_TABLE: &str = "Job";
/// Resource name of the built-in worker table
pub const WORKER_TABLE: &str = "Worker";

/// Driver for one (host, port) pair
pub struct RestDriver {
    config: DriverConfig,
    base_url: String,
    client: Client,
    engine: ChecksumEngine,
    liaisons: RwLock<LiaisonRegistry>,
    signer: RwLock<Option<Signer>>,
}

impl RestDriver {
    /// Create a driver. Fails fast when the checksum algorithm is unknown.
    pub fn new(config: DriverConfig) -> Result<Self> {
        let engine = ChecksumEngine::new(&config.checksum_algorithm)?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let base_url = config.base_url();
        let mut liaisons = LiaisonRegistry::new(client.clone(), base_url.clone());
        liaisons.register(JOB_TABLE, "/jobTable/jobHandler");
        liaisons.register(WORKER_TABLE, "/jobTable/workerHandler");

        let signer = config.secret_key.as_deref().map(Signer::new).transpose()?;

        Ok(RestDriver {
            config,
            base_url,
            client,
            engine,
            liaisons: RwLock::new(liaisons),
            signer: RwLock::new(signer),
        })
    }

    /// Create a driver for a host and port with default settings
    pub fn connect(host: &str, port: &str) -> Result<Self> {
        Self::new(DriverConfig::new(host, port))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn checksum_engine(&self) -> ChecksumEngine {
        self.engine
    }

    /// Build the full URL for an endpoint
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn upload_url(&self) -> String {
        self.url("/uploader")
    }

    fn media_url(&self, content_key: &str) -> String {
        self.url(&format!("/media/{}", content_key.trim_start_matches('/')))
    }

    // === Manifest ===

    /// Fetch the manifest records matching `query`
    pub fn manifest(&self, query: &Attributes) -> ManifestResponse {
        debug!(url = %self.upload_url(), ?query, "manifest query");
        let response = match self.client.get(self.upload_url()).query(query).send() {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "manifest request failed");
                return ManifestResponse::from_error(e);
            }
        };

        let status = response.status().as_u16();

        #[derive(serde::Deserialize)]
        struct ManifestBody {
            #[serde(default)]
            data: Vec<ManifestRecord>,
        }

        match response.json::<ManifestBody>() {
            Ok(body) => ManifestResponse {
                status,
                data: body.data,
                reason: None,
            },
            Err(e) => ManifestResponse {
                status,
                data: Vec::new(),
                reason: Some(e.to_string()),
            },
        }
    }

    // === Blob transfer ===

    fn form_for(attrs: &Attributes) -> Form {
        attrs.iter().fold(Form::new(), |form, (key, value)| {
            form.text(key.clone(), value.clone())
        })
    }

    fn post_blob(&self, part: Part, attrs: &Attributes) -> RestResponse {
        debug!(url = %self.upload_url(), "uploading blob");
        let form = Self::form_for(attrs).part("blob", part);
        parse_response(self.client.post(self.upload_url()).multipart(form).send())
    }

    fn put_blob(&self, part: Part, query: &Attributes, attrs: &Attributes) -> RestResponse {
        debug!(url = %self.upload_url(), ?query, "updating blob");
        let form = Self::form_for(attrs).part("blob", part);
        parse_response(
            self.client
                .put(self.upload_url())
                .query(query)
                .multipart(form)
                .send(),
        )
    }

    fn stream_part(stream: BlobStream) -> Part {
        let len = stream.len();
        Part::reader_with_length(stream, len).file_name("blob")
    }

    /// Attributes with the checksum fields the server expects filled in
    fn transfer_attrs(
        &self,
        checksum: &Checksum,
        kind: Option<SerializationKind>,
        attrs: &Attributes,
    ) -> Attributes {
        let mut attrs = attrs.clone();
        attrs.insert(CHECKSUM_KEY.to_string(), checksum.to_string());
        attrs
            .entry(CHECKSUM_ALGO_KEY.to_string())
            .or_insert_with(|| self.engine.algorithm().name().to_string());
        if let Some(kind) = kind {
            attrs.insert(META_DATA_KEY.to_string(), kind.tag().to_string());
        }
        attrs
    }

    // === Files ===

    /// Upload a file from disk
    ///
    /// 403 when the file cannot be opened, 404 when the path is not a
    /// regular file. The checksum is computed unless `attrs` carries one.
    pub fn upload_file(&self, path: impl AsRef<Path>, attrs: &Attributes) -> RestResponse {
        match self.file_transfer(path.as_ref(), attrs) {
            Ok((part, attrs)) => self.post_blob(part, &attrs),
            Err(response) => response,
        }
    }

    /// Replace a stored file; `attrs` doubles as the selector query
    pub fn update_file(&self, path: impl AsRef<Path>, attrs: &Attributes) -> RestResponse {
        match self.file_transfer(path.as_ref(), attrs) {
            Ok((part, full)) => self.put_blob(part, attrs, &full),
            Err(response) => response,
        }
    }

    fn file_transfer(
        &self,
        path: &Path,
        attrs: &Attributes,
    ) -> std::result::Result<(Part, Attributes), RestResponse> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "file not readable");
                return Err(RestResponse::with_status(StatusCode::FORBIDDEN));
            }
        };
        match file.metadata() {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(RestResponse::with_status(StatusCode::NOT_FOUND)),
        }

        let checksum = match attrs.get(CHECKSUM_KEY) {
            Some(sum) => Checksum::from_hex(sum.clone()),
            None => self
                .engine
                .digest_reader(std::io::BufReader::new(file))
                .map_err(RestResponse::from_error)?,
        };
        let part = Part::file(path).map_err(RestResponse::from_error)?;
        Ok((part, self.transfer_attrs(&checksum, None, attrs)))
    }

    /// Download a blob into one buffer
    pub fn download_to_buffer(&self, content_key: &str) -> Option<Vec<u8>> {
        match self.download_stream(content_key)?.drain() {
            Ok(buf) => Some(buf),
            Err(e) => {
                warn!(content_key, error = %e, "download interrupted");
                None
            }
        }
    }

    /// Download a blob to disk, named `alt_name` or the key's last segment.
    /// Returns the number of bytes written; 0 when the blob is absent.
    pub fn download_file(&self, content_key: &str, alt_name: Option<&Path>) -> Result<u64> {
        let Some(chunks) = self.download_stream(content_key) else {
            return Ok(0);
        };

        let local = match alt_name {
            Some(name) => name.to_path_buf(),
            None => Path::new(content_key)
                .file_name()
                .map(|n| n.into())
                .ok_or_else(|| Error::Config(format!("No file name in key: {}", content_key)))?,
        };

        let mut file = std::fs::File::create(&local)?;
        let mut written = 0u64;
        for chunk in chunks {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        file.flush()?;
        Ok(written)
    }

    // === Tables ===

    /// Register a REST table under `name`. Returns false when either
    /// argument is blank.
    pub fn register_liaison(&self, name: &str, path: &str) -> bool {
        self.liaisons.write().register(name, path).is_some()
    }

    pub fn liaison(&self, name: &str) -> Option<HandlerLiaison> {
        self.liaisons.read().get(name).cloned()
    }

    pub fn liaison_names(&self) -> Vec<String> {
        self.liaisons.read().names().map(str::to_string).collect()
    }

    pub fn jobs(&self) -> Option<HandlerLiaison> {
        self.liaison(JOB_TABLE)
    }

    pub fn workers(&self) -> Option<HandlerLiaison> {
        self.liaison(WORKER_TABLE)
    }

    // === Signing ===

    pub fn update_secret_key(&self, secret_key: &str) -> Result<()> {
        *self.signer.write() = Some(Signer::new(secret_key)?);
        Ok(())
    }

    /// Hex HMAC signature per item with the current secret key
    pub fn sign_items<I, T>(&self, items: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let signer = self.signer.read();
        let signer = signer
            .as_ref()
            .ok_or_else(|| Error::Config("No secret key configured".into()))?;
        Ok(signer.sign_items_hex(items))
    }
}

impl BlobTransport for RestDriver {
    fn checksum_algorithm(&self) -> &str {
        &self.config.checksum_algorithm
    }

    fn manifest_query(&self, filter: &Attributes) -> ManifestResponse {
        self.manifest(filter)
    }

    fn upload_stream(
        &self,
        stream: BlobStream,
        checksum: &Checksum,
        kind: SerializationKind,
        attrs: &Attributes,
    ) -> RestResponse {
        let attrs = self.transfer_attrs(checksum, Some(kind), attrs);
        self.post_blob(Self::stream_part(stream), &attrs)
    }

    fn update_stream(
        &self,
        stream: BlobStream,
        content_key: &str,
        checksum: &Checksum,
        kind: SerializationKind,
        attrs: &Attributes,
    ) -> RestResponse {
        let attrs = self.transfer_attrs(checksum, Some(kind), attrs);
        let query = Attributes::from([(CONTENT_KEY.to_string(), content_key.to_string())]);
        self.put_blob(Self::stream_part(stream), &query, &attrs)
    }

    fn download_stream(&self, content_key: &str) -> Option<ChunkStream> {
        let url = self.media_url(content_key);
        debug!(%url, "downloading blob");
        match self.client.get(&url).send() {
            Ok(resp) if resp.status() == StatusCode::OK => {
                Some(ChunkStream::from_reader(resp, DEFAULT_CHUNK_SIZE))
            }
            Ok(resp) => {
                debug!(%url, status = %resp.status(), "blob not available");
                None
            }
            Err(e) => {
                warn!(%url, error = %e, "download request failed");
                None
            }
        }
    }

    fn delete_blob(&self, filter: &Attributes) -> RestResponse {
        debug!(url = %self.upload_url(), ?filter, "deleting blobs");
        parse_response(self.client.delete(self.upload_url()).query(filter).send())
    }
}

impl std::fmt::Debug for RestDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestDriver")
            .field("base_url", &self.base_url)
            .field("checksum_algorithm", &self.config.checksum_algorithm)
            .finish_non_exhaustive()
    }
}
