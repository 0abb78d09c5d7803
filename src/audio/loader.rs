use std::{
    collections::hash_map::DefaultHasher,
    fs,
    hash::{Hash, Hasher},
    io::Write,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

/// Where a track's `file_location` points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Local(PathBuf),
    Remote(String),
}

impl SourceLocation {
    pub fn parse(location: &str) -> Result<Self, String> {
        let location = location.trim();
        if location.is_empty() {
            return Err("empty file location".into());
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return Ok(Self::Remote(location.to_string()));
        }
        if let Some(rest) = location.strip_prefix("file://") {
            let decoded = urlencoding::decode(rest).map_err(|e| format!("bad file URL: {e}"))?;
            return Ok(Self::Local(PathBuf::from(decoded.into_owned())));
        }
        Ok(Self::Local(PathBuf::from(location)))
    }
}

/// Turns catalog file locations into local paths the decoder can open,
/// downloading remote objects into a cache directory once.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    cache_dir: PathBuf,
    timeout: Duration,
}

impl SourceLoader {
    pub fn new(cache_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            timeout,
        }
    }

    pub fn resolve(&self, location: &str) -> Result<PathBuf, String> {
        match SourceLocation::parse(location)? {
            SourceLocation::Local(path) => {
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(format!("{} does not exist", path.display()))
                }
            }
            SourceLocation::Remote(url) => {
                let target = self.cache_dir.join(cache_file_name(&url));
                if target.is_file() {
                    log::debug!("Cache hit for {url}");
                    return Ok(target);
                }
                fs::create_dir_all(&self.cache_dir).map_err(|e| format!("cache dir: {e}"))?;
                self.download(url, &target)?;
                Ok(target)
            }
        }
    }

    /// Blocking fetch on a helper thread so it is safe to call from inside an
    /// async runtime.
    fn download(&self, url: String, target: &Path) -> Result<(), String> {
        let timeout = self.timeout;
        let partial = target.with_extension("part");
        let partial_t = partial.clone();
        let result = thread::Builder::new()
            .name("source-download".into())
            .spawn(move || -> Result<u64, String> {
                let client = reqwest::blocking::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(|e| e.to_string())?;
                let mut resp = client
                    .get(&url)
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| format!("GET {url}: {e}"))?;
                let mut file = fs::File::create(&partial_t).map_err(|e| e.to_string())?;
                let n = resp.copy_to(&mut file).map_err(|e| e.to_string())?;
                file.flush().map_err(|e| e.to_string())?;
                log::info!("Downloaded {n} bytes from {url}");
                Ok(n)
            })
            .map_err(|e| format!("Failed to spawn download thread: {e}"))?
            .join()
            .map_err(|_| "download thread panicked".to_string())?;

        match result {
            Ok(_) => fs::rename(&partial, target).map_err(|e| e.to_string()),
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }
}

/// Stable cache name for a URL; keeps the extension as a decoder hint.
fn cache_file_name(url: &str) -> String {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
        Some(ext) => format!("{:016x}.{ext}", hasher.finish()),
        None => format!("{:016x}", hasher.finish()),
    }
}
