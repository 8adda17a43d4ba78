use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::{presigning::PresigningConfig, primitives::ByteStream};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use uuid::Uuid;

/// Content type every stored score carries.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("presign failed: {0}")]
    Presign(String),
    #[error("object lookup failed: {0}")]
    Lookup(String),
    #[error("delete failed: {0}")]
    Delete(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Contract for the object store holding score PDFs. Handlers only see this trait,
/// so the R2/MinIO client and the in-memory mock are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the bucket if missing. Only called for the local MinIO setup.
    async fn ensure_bucket_exists(&self);

    /// Stores `body` under `key` as a PDF and returns its public URL.
    async fn upload_pdf(&self, key: &str, body: Vec<u8>) -> Result<String, StorageError>;

    /// Signs a time-limited GET for `key`. The response is served as an attachment
    /// named `filename`.
    async fn get_download_url(
        &self,
        key: &str,
        expires_in: Duration,
        filename: &str,
    ) -> Result<String, StorageError>;

    async fn file_exists(&self, key: &str) -> Result<bool, StorageError>;

    async fn delete_pdf(&self, key: &str) -> Result<(), StorageError>;
}

// 2. The Real Implementation (Cloudflare R2 / MinIO)
/// S3StorageClient
///
/// AWS SDK client pointed at an S3-compatible endpoint. Path-style addressing is
/// forced for MinIO; R2 accepts it as well.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_url: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            // Already-exists lands here too.
            tracing::debug!(bucket = %self.bucket_name, error = ?e, "create_bucket");
        }
    }

    async fn upload_pdf(&self, key: &str, body: Vec<u8>) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(PDF_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        Ok(format!("{}/{}", self.public_url, key))
    }

    async fn get_download_url(
        &self,
        key: &str,
        expires_in: Duration,
        filename: &str,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        let presigned_req = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .response_content_disposition(format!("attachment; filename=\"{}\"", filename))
            .response_content_type(PDF_CONTENT_TYPE)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }

    async fn file_exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(StorageError::Lookup(e.to_string())),
        }
    }

    async fn delete_pdf(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Delete(e.to_string()))?;
        Ok(())
    }
}

// --- Key & filename helpers ---

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a key can never climb out of its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// slugify
///
/// Lowercase ASCII slug: accented Latin letters fold to their base letter, any
/// other run of non-alphanumerics becomes a single `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        let folded = match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' | 'ª' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' | 'ø' | 'º' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            c => c,
        };
        if folded.is_ascii_alphanumeric() {
            slug.push(folded);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// generate_pdf_key
///
/// `scores/{composer_id}/{slug}-{8 hex}.pdf`. The random suffix keeps re-uploads of
/// the same title from overwriting each other.
pub fn generate_pdf_key(title: &str, composer_id: Uuid) -> String {
    let slug = match slugify(title) {
        s if s.is_empty() => "score".to_string(),
        s => s,
    };
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    sanitize_key(&format!("scores/{}/{}-{}.pdf", composer_id, slug, suffix))
}

/// pdf_key_from_url
///
/// A stored `pdf_url` is one of:
/// - a URL under `public_url` (what `upload_pdf` hands out): the rest is the key,
/// - any other `http…` URL: its path is the key,
/// - the key itself.
///
/// Returns `None` for URLs that do not parse or leave an empty key.
pub fn pdf_key_from_url(pdf_url: &str, public_url: &str) -> Option<String> {
    let public_url = public_url.trim_end_matches('/');
    let raw_path = if !public_url.is_empty() && pdf_url.starts_with(&format!("{}/", public_url)) {
        pdf_url[public_url.len()..].to_string()
    } else if pdf_url.starts_with("http") {
        reqwest::Url::parse(pdf_url).ok()?.path().to_string()
    } else {
        pdf_url.to_string()
    };

    let path = raw_path.split(['?', '#']).next().unwrap_or_default();
    let decoded = urlencoding::decode(path).ok()?;
    let key = sanitize_key(&decoded);
    (!key.is_empty()).then_some(key)
}

/// is_owned_pdf
///
/// True when `pdf_url` points into our bucket: a bare key, or a URL under
/// `public_url`. Scores may also reference PDFs hosted elsewhere.
pub fn is_owned_pdf(pdf_url: &str, public_url: &str) -> bool {
    let prefix = format!("{}/", public_url.trim_end_matches('/'));
    !pdf_url.starts_with("http") || pdf_url.starts_with(&prefix)
}

/// download_filename
///
/// `"{title} - {composer}.pdf"` reduced to letters, digits, `-`, `.` and `_`.
/// Every whitespace run becomes one `_`, including leading and trailing runs.
pub fn download_filename(title: &str, composer: &str) -> String {
    let raw = format!("{} - {}.pdf", title, composer);
    let mut name = String::with_capacity(raw.len());
    let mut in_space = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            if !in_space {
                name.push('_');
            }
            in_space = true;
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            name.push(c);
            in_space = false;
        }
    }
    name
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory object store for tests. Clones share the same objects.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockStorageService {
    pub const PUBLIC_URL: &'static str = "http://localhost:9000/mock-bucket";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Seeds an object, as if it had been uploaded earlier.
    pub fn with_object(self, key: &str) -> Self {
        self.put(key, b"%PDF-1.4 mock".to_vec());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.lock().len()
    }

    fn put(&self, key: &str, body: Vec<u8>) {
        self.lock().insert(key.to_string(), body);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A panicked test thread must not poison the store for the others.
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fail_if_requested(&self) -> Result<(), String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload_pdf(&self, key: &str, body: Vec<u8>) -> Result<String, StorageError> {
        self.fail_if_requested().map_err(StorageError::Upload)?;
        let key = sanitize_key(key);
        self.put(&key, body);
        Ok(format!("{}/{}", Self::PUBLIC_URL, key))
    }

    async fn get_download_url(
        &self,
        key: &str,
        expires_in: Duration,
        filename: &str,
    ) -> Result<String, StorageError> {
        self.fail_if_requested().map_err(StorageError::Presign)?;
        Ok(format!(
            "{}/{}?X-Amz-Expires={}&filename={}&signature=fake",
            Self::PUBLIC_URL,
            sanitize_key(key),
            expires_in.as_secs(),
            urlencoding::encode(filename)
        ))
    }

    async fn file_exists(&self, key: &str) -> Result<bool, StorageError> {
        self.fail_if_requested().map_err(StorageError::Lookup)?;
        Ok(self.contains(&sanitize_key(key)))
    }

    async fn delete_pdf(&self, key: &str) -> Result<(), StorageError> {
        self.fail_if_requested().map_err(StorageError::Delete)?;
        self.lock().remove(&sanitize_key(key));
        Ok(())
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
