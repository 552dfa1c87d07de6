//! Stage layer extraction
//!
//! Reads an image archive produced by `docker save` / `podman save`,
//! picks the topmost layer of the first image in `manifest.json` and
//! unpacks it. Only the first image entry is considered; archives holding
//! several images are a known limitation and are reported with a warning.

use crate::error::{StagecraftError, StagecraftResult};
use flate2::read::GzDecoder;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, warn};

const MANIFEST_FILE: &str = "manifest.json";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One image entry of `manifest.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    #[serde(default)]
    pub config: String,

    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,

    pub layers: Vec<String>,
}

/// Result of extracting a layer
#[derive(Debug)]
pub struct ExtractReport {
    /// Archive path of the extracted layer
    pub layer: String,
    /// Number of layers listed for the image
    pub layer_count: usize,
    /// Number of entries unpacked
    pub entries: usize,
}

/// Extract the topmost layer of `archive_path` into `dest`.
///
/// When `base_layers` is given the image must have exactly one layer more
/// than its base, otherwise the topmost layer is not the package delta.
pub fn extract_stage_layer(
    archive_path: &Path,
    dest: &Path,
    base_layers: Option<usize>,
) -> StagecraftResult<ExtractReport> {
    let manifest = read_manifest(archive_path)?;

    let image = manifest.first().ok_or_else(|| {
        StagecraftError::ManifestInvalid(format!("{} lists no images", MANIFEST_FILE))
    })?;
    if manifest.len() > 1 {
        warn!(
            "Image archive holds {} images, using only the first",
            manifest.len()
        );
    }

    let layer = image
        .layers
        .last()
        .ok_or_else(|| StagecraftError::ManifestInvalid("image has no layers".to_string()))?
        .clone();

    if let Some(base) = base_layers {
        if image.layers.len() != base + 1 {
            return Err(StagecraftError::LayerCount {
                base_layers: base,
                found: image.layers.len(),
            });
        }
    }

    fs::create_dir_all(dest)
        .map_err(|e| StagecraftError::io(format!("creating {}", dest.display()), e))?;

    let entries = unpack_layer_member(archive_path, &layer, dest)?;
    debug!("Unpacked {} entries from {}", entries, layer);

    Ok(ExtractReport {
        layer,
        layer_count: image.layers.len(),
        entries,
    })
}

/// Parse `manifest.json` from an image archive
pub fn read_manifest(archive_path: &Path) -> StagecraftResult<Vec<ManifestEntry>> {
    let mut archive = open_archive(archive_path)?;
    let entries = archive
        .entries()
        .map_err(|e| StagecraftError::io(format!("reading {}", archive_path.display()), e))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| StagecraftError::io(format!("reading {}", archive_path.display()), e))?;
        if !member_matches(&entry_path(&entry)?, MANIFEST_FILE) {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| StagecraftError::io("reading manifest.json", e))?;
        return serde_json::from_str(&content)
            .map_err(|e| StagecraftError::ManifestInvalid(e.to_string()));
    }

    Err(StagecraftError::ManifestMissing(archive_path.to_path_buf()))
}

fn open_archive(path: &Path) -> StagecraftResult<Archive<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| StagecraftError::io(format!("opening {}", path.display()), e))?;
    Ok(Archive::new(BufReader::new(file)))
}

fn entry_path<R: Read>(entry: &tar::Entry<'_, R>) -> StagecraftResult<PathBuf> {
    entry
        .path()
        .map(|p| p.into_owned())
        .map_err(|e| StagecraftError::io("reading archive entry path", e))
}

/// Archive member names may carry a leading `./`
fn member_matches(path: &Path, name: &str) -> bool {
    path == Path::new(name) || path.strip_prefix(".").is_ok_and(|p| p == Path::new(name))
}

/// Expected sha256 of a content-addressed layer path (`blobs/sha256/<hex>`)
fn expected_digest(layer: &str) -> Option<&str> {
    layer
        .strip_prefix("blobs/sha256/")
        .filter(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Locate the layer member and unpack its nested tar stream
fn unpack_layer_member(archive_path: &Path, layer: &str, dest: &Path) -> StagecraftResult<usize> {
    let mut archive = open_archive(archive_path)?;
    let entries = archive
        .entries()
        .map_err(|e| StagecraftError::io(format!("reading {}", archive_path.display()), e))?;

    for entry in entries {
        let entry = entry
            .map_err(|e| StagecraftError::io(format!("reading {}", archive_path.display()), e))?;
        if !member_matches(&entry_path(&entry)?, layer) {
            continue;
        }

        let mut hasher = Sha256::new();
        let count = {
            let reader = HashingReader {
                inner: entry,
                hasher: &mut hasher,
            };
            unpack_layer_stream(reader, dest)?
        };

        if let Some(expected) = expected_digest(layer) {
            let actual = hex::encode(hasher.finalize());
            if actual != expected {
                return Err(StagecraftError::LayerDigest {
                    layer: layer.to_string(),
                    actual,
                });
            }
        }
        return Ok(count);
    }

    Err(StagecraftError::LayerMissing(layer.to_string()))
}

/// Unpack a plain or gzip-compressed layer stream, consuming it fully
fn unpack_layer_stream<R: Read>(reader: R, dest: &Path) -> StagecraftResult<usize> {
    let mut buffered = BufReader::new(reader);
    let is_gzip = buffered
        .fill_buf()
        .map_err(|e| StagecraftError::io("reading layer", e))?
        .starts_with(&GZIP_MAGIC);

    if is_gzip {
        debug!("Layer is gzip-compressed");
        let mut decoder = GzDecoder::new(buffered);
        let count = unpack_entries(&mut decoder, dest)?;
        drain(&mut decoder)?;
        drain(&mut decoder.into_inner())?;
        Ok(count)
    } else {
        let count = unpack_entries(&mut buffered, dest)?;
        drain(&mut buffered)?;
        Ok(count)
    }
}

fn unpack_entries<R: Read>(reader: R, dest: &Path) -> StagecraftResult<usize> {
    let mut layer = Archive::new(reader);
    layer.set_preserve_permissions(true);
    layer.set_preserve_mtime(true);
    layer.set_unpack_xattrs(false);
    layer.set_overwrite(true);

    let mut count = 0;
    let entries = layer
        .entries()
        .map_err(|e| StagecraftError::io("reading layer entries", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| StagecraftError::io("reading layer entry", e))?;
        let path = entry_path(&entry)?;
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| StagecraftError::io(format!("unpacking {}", path.display()), e))?;
        if unpacked {
            count += 1;
        } else {
            warn!("Skipped layer entry outside destination: {}", path.display());
        }
    }
    Ok(count)
}

fn drain<R: Read>(reader: &mut R) -> StagecraftResult<()> {
    io::copy(reader, &mut io::sink())
        .map(|_| ())
        .map_err(|e| StagecraftError::io("reading layer", e))
}

/// Feeds every byte read through a sha256 hasher
struct HashingReader<'h, R> {
    inner: R,
    hasher: &'h mut Sha256,
}

impl<R: Read> Read for HashingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tar::{Builder, EntryType, Header};
    use tempfile::TempDir;

    fn layer_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn add_member(builder: &mut Builder<File>, path: &str, data: &[u8]) {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, data).unwrap();
    }

    fn image_archive(dir: &Path, layers: &[(&str, Vec<u8>)], manifest: Option<String>) -> PathBuf {
        let path = dir.join("image.tar");
        let mut builder = Builder::new(File::create(&path).unwrap());
        for (name, data) in layers {
            add_member(&mut builder, name, data);
        }
        if let Some(manifest) = manifest {
            add_member(&mut builder, "manifest.json", manifest.as_bytes());
        }
        builder.finish().unwrap();
        path
    }

    fn manifest_for(layers: &[&str]) -> String {
        serde_json::json!([{
            "Config": "config.json",
            "RepoTags": ["stagecraft-stage:latest"],
            "Layers": layers,
        }])
        .to_string()
    }

    #[test]
    fn extracts_only_topmost_layer() {
        let temp = TempDir::new().unwrap();
        let names = ["l0/layer.tar", "l1/layer.tar", "l2/layer.tar"];
        let archive = image_archive(
            temp.path(),
            &[
                (names[0], layer_tar(&[("bin/base", b"base")])),
                (names[1], layer_tar(&[("etc/middle", b"middle")])),
                (names[2], layer_tar(&[("usr/bin/curl", b"curl")])),
            ],
            Some(manifest_for(&names)),
        );
        let dest = temp.path().join("out");

        let report = extract_stage_layer(&archive, &dest, None).unwrap();
        assert_eq!(report.layer, "l2/layer.tar");
        assert_eq!(report.entries, 1);
        assert_eq!(fs::read(dest.join("usr/bin/curl")).unwrap(), b"curl");
        assert!(!dest.join("bin/base").exists());
        assert!(!dest.join("etc/middle").exists());

        let mode = fs::metadata(dest.join("usr/bin/curl")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn first_image_wins_when_archive_holds_several() {
        let temp = TempDir::new().unwrap();
        let manifest = serde_json::json!([
            {"Config": "a.json", "RepoTags": ["first:latest"], "Layers": ["a0/layer.tar", "a1/layer.tar"]},
            {"Config": "b.json", "RepoTags": ["second:latest"], "Layers": ["a0/layer.tar", "b1/layer.tar"]},
        ])
        .to_string();
        let archive = image_archive(
            temp.path(),
            &[
                ("a0/layer.tar", layer_tar(&[("etc/base", b"base")])),
                ("a1/layer.tar", layer_tar(&[("usr/bin/first", b"first")])),
                ("b1/layer.tar", layer_tar(&[("usr/bin/second", b"second")])),
            ],
            Some(manifest),
        );
        let dest = temp.path().join("out");

        let report = extract_stage_layer(&archive, &dest, Some(1)).unwrap();
        assert_eq!(report.layer, "a1/layer.tar");
        assert_eq!(report.layer_count, 2);
        assert_eq!(fs::read(dest.join("usr/bin/first")).unwrap(), b"first");
        assert!(!dest.join("usr/bin/second").exists());
        assert!(!dest.join("etc/base").exists());
    }

    #[test]
    fn preserves_symlinks() {
        let temp = TempDir::new().unwrap();
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, "usr/bin/link", "curl")
            .unwrap();
        let layer = builder.into_inner().unwrap();

        let archive = image_archive(
            temp.path(),
            &[("top/layer.tar", layer)],
            Some(manifest_for(&["top/layer.tar"])),
        );
        let dest = temp.path().join("out");
        extract_stage_layer(&archive, &dest, None).unwrap();

        assert_eq!(
            fs::read_link(dest.join("usr/bin/link")).unwrap(),
            PathBuf::from("curl")
        );
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let temp = TempDir::new().unwrap();
        let archive = image_archive(temp.path(), &[("l0/layer.tar", layer_tar(&[]))], None);

        let err = extract_stage_layer(&archive, &temp.path().join("out"), None).unwrap_err();
        assert!(matches!(err, StagecraftError::ManifestMissing(_)));
    }

    #[test]
    fn empty_layer_gives_empty_destination() {
        let temp = TempDir::new().unwrap();
        let archive = image_archive(
            temp.path(),
            &[("l0/layer.tar", layer_tar(&[]))],
            Some(manifest_for(&["l0/layer.tar"])),
        );
        let dest = temp.path().join("out");

        let report = extract_stage_layer(&archive, &dest, None).unwrap();
        assert_eq!(report.entries, 0);
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn layer_count_precondition() {
        let temp = TempDir::new().unwrap();
        let names = ["l0/layer.tar", "l1/layer.tar", "l2/layer.tar"];
        let archive = image_archive(
            temp.path(),
            &[
                (names[0], layer_tar(&[])),
                (names[1], layer_tar(&[])),
                (names[2], layer_tar(&[])),
            ],
            Some(manifest_for(&names)),
        );

        assert!(extract_stage_layer(&archive, &temp.path().join("ok"), Some(2)).is_ok());
        let err = extract_stage_layer(&archive, &temp.path().join("bad"), Some(1)).unwrap_err();
        assert!(matches!(
            err,
            StagecraftError::LayerCount {
                base_layers: 1,
                found: 3
            }
        ));
    }

    #[test]
    fn content_addressed_layer_is_verified() {
        let temp = TempDir::new().unwrap();
        let layer = layer_tar(&[("opt/tool", b"tool")]);
        let digest = hex::encode(Sha256::digest(&layer));
        let good = format!("blobs/sha256/{}", digest);
        let archive = image_archive(
            temp.path(),
            &[(good.as_str(), layer.clone())],
            Some(manifest_for(&[good.as_str()])),
        );
        extract_stage_layer(&archive, &temp.path().join("good"), None).unwrap();

        let forged = format!("blobs/sha256/{}", "0".repeat(64));
        let dir = temp.path().join("forged");
        fs::create_dir_all(&dir).unwrap();
        let archive = image_archive(
            &dir,
            &[(forged.as_str(), layer)],
            Some(manifest_for(&[forged.as_str()])),
        );
        let err = extract_stage_layer(&archive, &dir.join("out"), None).unwrap_err();
        assert!(matches!(err, StagecraftError::LayerDigest { .. }));
    }

    #[test]
    fn gzip_layers_are_supported() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let temp = TempDir::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&layer_tar(&[("etc/zipped", b"zipped")]))
            .unwrap();
        let compressed = encoder.finish().unwrap();

        let archive = image_archive(
            temp.path(),
            &[("l0/layer.tar.gz", compressed)],
            Some(manifest_for(&["l0/layer.tar.gz"])),
        );
        let dest = temp.path().join("out");
        extract_stage_layer(&archive, &dest, None).unwrap();
        assert_eq!(fs::read(dest.join("etc/zipped")).unwrap(), b"zipped");
    }
}
