//! Release provisioning: resolve, download, and unpack the signal-cli binary
//! into a version-scoped local cache.
//!
//! The cache lives at `<cache_root>/<version_tag>/` with the downloaded
//! archive kept beside it. Prior versions are never pruned. A cached version
//! with an intact entry point short-circuits all network access.

use std::fs::File;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, RuntimeError};

/// Repository the CLI releases are published under.
pub const DEFAULT_RELEASE_REPO: &str = "AsamK/signal-cli";

const ENTRY_POINT: &str = if cfg!(windows) { "signal-cli.bat" } else { "signal-cli" };

/// Where releases come from and where installs land.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
	/// `owner/repo` slug on the hosting API.
	pub repo_slug: String,
	/// Root of the version-scoped install cache.
	pub cache_root: PathBuf,
}

impl ProvisionerConfig {
	pub fn new(cache_root: impl Into<PathBuf>) -> Self {
		Self {
			repo_slug: DEFAULT_RELEASE_REPO.to_string(),
			cache_root: cache_root.into(),
		}
	}

	/// Default cache root under the platform cache directory.
	pub fn with_default_cache_root() -> Result<Self> {
		let base = dirs::cache_dir()
			.ok_or_else(|| RuntimeError::ArtifactLookup("no cache directory available on this platform".to_string()))?;
		Ok(Self::new(base.join("siglink").join("cli")))
	}
}

/// A provisioned CLI install. Only constructed once the entry point exists.
#[derive(Debug, Clone)]
pub struct Artifact {
	pub version: String,
	pub archive_path: PathBuf,
	pub install_dir: PathBuf,
	pub entry_point: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Release {
	tag_name: String,
	assets: Vec<ReleaseAsset>,
}

/// Downloadable asset subset of the release API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
	pub name: String,
	pub browser_download_url: String,
	#[serde(default)]
	pub size: u64,
}

/// Resolves and materializes versioned CLI installs. Idempotent per version.
pub struct ArtifactProvisioner {
	config: ProvisionerConfig,
	client: reqwest::Client,
}

impl ArtifactProvisioner {
	pub fn new(config: ProvisionerConfig) -> Result<Self> {
		// The release API rejects requests without a user agent.
		let client = reqwest::Client::builder().user_agent("siglink").build()?;
		Ok(Self { config, client })
	}

	/// Ensures an install for `version` (latest published release when
	/// `None`) and returns it. `progress` observes the download as
	/// `(bytes_downloaded, bytes_total)`; provisioning errors are not retried
	/// here, since a corrupted cache must not silently propagate.
	pub async fn ensure(&self, version: Option<&str>, mut progress: impl FnMut(u64, u64)) -> Result<Artifact> {
		if let Some(tag) = version {
			if let Some(artifact) = self.cached(tag) {
				info!(target = "siglink.artifact", version = %tag, "using cached install");
				return Ok(artifact);
			}
		}

		let release = match version {
			Some(tag) => self.release_by_tag(tag).await?,
			None => self.latest_release().await?,
		};

		if let Some(artifact) = self.cached(&release.tag_name) {
			info!(target = "siglink.artifact", version = %release.tag_name, "using cached install");
			return Ok(artifact);
		}

		let asset = select_asset(&release.assets, cfg!(windows)).ok_or_else(|| {
			RuntimeError::ArtifactLookup(format!("release {} has no asset for this platform", release.tag_name))
		})?;

		std::fs::create_dir_all(&self.config.cache_root)?;
		let archive_path = self.config.cache_root.join(&asset.name);
		self.download(asset, &archive_path, &mut progress).await?;

		let install_dir = self.config.cache_root.join(&release.tag_name);
		extract(&archive_path, &install_dir)?;

		let entry_point = find_entry_point(&install_dir).ok_or_else(|| {
			RuntimeError::ArtifactExtraction(format!(
				"no {} entry point under {}",
				ENTRY_POINT,
				install_dir.display()
			))
		})?;

		info!(
			target = "siglink.artifact",
			version = %release.tag_name,
			entry_point = %entry_point.display(),
			"install ready"
		);

		Ok(Artifact {
			version: release.tag_name,
			archive_path,
			install_dir,
			entry_point,
		})
	}

	/// Fast path: a version directory whose entry point already exists.
	fn cached(&self, tag: &str) -> Option<Artifact> {
		let install_dir = self.config.cache_root.join(tag);
		let entry_point = find_entry_point(&install_dir)?;
		let archive_path = std::fs::read_dir(&self.config.cache_root)
			.ok()?
			.flatten()
			.map(|entry| entry.path())
			.find(|path| path.is_file() && path.file_name().is_some_and(|name| name.to_string_lossy().contains(tag)))
			.unwrap_or_else(|| install_dir.clone());
		Some(Artifact {
			version: tag.to_string(),
			archive_path,
			install_dir,
			entry_point,
		})
	}

	async fn latest_release(&self) -> Result<Release> {
		self.fetch_release(&format!(
			"https://api.github.com/repos/{}/releases/latest",
			self.config.repo_slug
		))
		.await
	}

	async fn release_by_tag(&self, tag: &str) -> Result<Release> {
		self.fetch_release(&format!(
			"https://api.github.com/repos/{}/releases/tags/{}",
			self.config.repo_slug, tag
		))
		.await
	}

	async fn fetch_release(&self, url: &str) -> Result<Release> {
		debug!(target = "siglink.artifact", %url, "querying release api");
		let response = self
			.client
			.get(url)
			.header("Accept", "application/vnd.github+json")
			.send()
			.await
			.map_err(|e| RuntimeError::ArtifactLookup(format!("{url}: {e}")))?;

		if !response.status().is_success() {
			return Err(RuntimeError::ArtifactLookup(format!(
				"{url}: unexpected status {}",
				response.status()
			)));
		}

		let release: Release = response
			.json()
			.await
			.map_err(|e| RuntimeError::ArtifactLookup(format!("{url}: malformed response: {e}")))?;

		if release.assets.is_empty() {
			return Err(RuntimeError::ArtifactLookup(format!(
				"release {} lists no assets",
				release.tag_name
			)));
		}

		Ok(release)
	}

	async fn download(&self, asset: &ReleaseAsset, dest: &Path, progress: &mut impl FnMut(u64, u64)) -> Result<()> {
		info!(target = "siglink.artifact", asset = %asset.name, "downloading");
		let response = self
			.client
			.get(&asset.browser_download_url)
			.send()
			.await
			.map_err(|e| RuntimeError::ArtifactDownload(format!("{}: {e}", asset.name)))?;

		if !response.status().is_success() {
			return Err(RuntimeError::ArtifactDownload(format!(
				"{}: unexpected status {}",
				asset.name,
				response.status()
			)));
		}

		let total = response.content_length().unwrap_or(asset.size);

		// A partial previous download is overwritten, never resumed.
		let part_path = dest.with_extension("part");
		let mut file = tokio::fs::File::create(&part_path).await?;
		let mut stream = response.bytes_stream();
		let mut downloaded = 0u64;

		while let Some(chunk) = stream.next().await {
			let chunk = chunk.map_err(|e| RuntimeError::ArtifactDownload(format!("{}: {e}", asset.name)))?;
			file.write_all(&chunk).await?;
			downloaded += chunk.len() as u64;
			progress(downloaded, total);
		}
		file.flush().await?;
		drop(file);

		if total > 0 && downloaded != total {
			return Err(RuntimeError::ArtifactDownload(format!(
				"{}: got {downloaded} of {total} declared bytes",
				asset.name
			)));
		}

		std::fs::rename(&part_path, dest)?;
		Ok(())
	}
}

/// Picks the platform asset by filename pattern: `.zip` on Windows, otherwise
/// the JVM `.tar.gz` build (skipping platform-native archives).
fn select_asset(assets: &[ReleaseAsset], windows: bool) -> Option<&ReleaseAsset> {
	if windows {
		assets.iter().find(|asset| asset.name.ends_with(".zip"))
	} else {
		assets.iter().find(|asset| {
			let name = asset.name.to_lowercase();
			asset.name.ends_with(".tar.gz") && !name.contains("linux") && !name.contains("native")
		})
	}
}

/// Unpacks `archive` into `install_dir`, choosing the codec by extension.
fn extract(archive: &Path, install_dir: &Path) -> Result<()> {
	info!(target = "siglink.artifact", archive = %archive.display(), "extracting");
	std::fs::create_dir_all(install_dir)?;
	let file = File::open(archive)?;

	let name = archive.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
	if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
		tar::Archive::new(flate2::read::GzDecoder::new(file))
			.unpack(install_dir)
			.map_err(|e| RuntimeError::ArtifactExtraction(format!("{name}: {e}")))?;
	} else if name.ends_with(".zip") {
		zip::ZipArchive::new(file)
			.and_then(|mut zip| zip.extract(install_dir))
			.map_err(|e| RuntimeError::ArtifactExtraction(format!("{name}: {e}")))?;
	} else {
		return Err(RuntimeError::ArtifactExtraction(format!("{name}: unrecognized archive format")));
	}
	Ok(())
}

/// Walks `dir` for the `bin/<entry point>` script of the extracted tree.
fn find_entry_point(dir: &Path) -> Option<PathBuf> {
	let mut pending = vec![dir.to_path_buf()];
	while let Some(current) = pending.pop() {
		let entries = std::fs::read_dir(&current).ok()?;
		for entry in entries.flatten() {
			let path = entry.path();
			if path.is_dir() {
				pending.push(path);
			} else if path.file_name().is_some_and(|name| name == ENTRY_POINT)
				&& path.parent().and_then(Path::file_name).is_some_and(|parent| parent == "bin")
			{
				return Some(path);
			}
		}
	}
	None
}
