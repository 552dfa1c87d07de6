//! Shared fixtures: a scratch project and an engine double

use async_trait::async_trait;
use stagecraft::error::{StagecraftError, StagecraftResult};
use stagecraft::layer::{FinalImageComposer, ImageBuilder, LayerCache, StageMaterializer};
use stagecraft::lifecycle::{LocalLifecycle, ProjectInfo};
use stagecraft::orchestration::ContainerEngine;
use stagecraft::pipeline::{ImageHooks, NoHooks, PipelineDriver, RunOptions, RunOutcome};
use stagecraft::ui::UiContext;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tar::{Builder, Header};
use tempfile::TempDir;

pub const STAGING_TAG: &str = "stagecraft-stage";
pub const IMAGE_NAME: &str = "demo-image";
const INSTALL_PREFIX: &str = "RUN apt-get update && apt-get install -y ";

/// A project directory with a `hello` part
pub struct Project {
    pub temp: TempDir,
}

impl Project {
    pub fn new(packages: &[&str]) -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/hello/bin")).unwrap();
        fs::write(temp.path().join("src/hello/bin/hello"), "#!/bin/sh\necho hello\n").unwrap();
        let project = Self { temp };
        project.set_packages(packages);
        project
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Rewrite the parts file with a new stage package list
    pub fn set_packages(&self, packages: &[&str]) {
        let yaml = format!(
            "parts:\n  hello:\n    plugin: dump\n    source: src/hello\n    stage-packages: [{}]\n",
            packages.join(", ")
        );
        fs::write(self.path("parts.yaml"), yaml).unwrap();
    }

    pub fn info(&self) -> ProjectInfo {
        ProjectInfo {
            work_dir: self.root().to_path_buf(),
            parts_dir: self.path("parts"),
            stage_dir: self.path("stage"),
            prime_dir: self.path("prime"),
            base_image: "ubuntu:20.04".to_string(),
            image_name: IMAGE_NAME.to_string(),
        }
    }

    /// Load the lifecycle and run the pipeline once, like a CLI invocation
    pub async fn run(
        &self,
        engine: &FakeEngine,
        options: &RunOptions,
    ) -> StagecraftResult<RunOutcome> {
        let mut lifecycle = LocalLifecycle::load(&self.path("parts.yaml"), self.info()).await?;
        let ui = UiContext::non_interactive();
        let cache = LayerCache::new(self.path("layer"));
        let builder = ImageBuilder::new(
            engine,
            ui,
            self.path(".stagecraft/build"),
            self.path("image_data.tar"),
            STAGING_TAG,
        );
        let materializer = StageMaterializer::new(cache.clone(), builder, engine);
        let mut hooks = ImageHooks::new(materializer, FinalImageComposer::new(engine, ui));

        let mut driver = PipelineDriver::new(&mut lifecycle, &mut hooks, cache);
        let outcome = driver.run(options).await?;
        Ok(outcome)
    }

    pub async fn clean(&self) -> StagecraftResult<()> {
        let mut lifecycle = LocalLifecycle::load(&self.path("parts.yaml"), self.info()).await?;
        let mut hooks = NoHooks;
        let cache = LayerCache::new(self.path("layer"));
        let mut driver = PipelineDriver::new(&mut lifecycle, &mut hooks, cache);
        driver.clean(&[], false).await?;
        Ok(())
    }
}

/// Relative file path -> contents for every regular file under `root`
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Engine double that records calls and writes three-layer image archives.
///
/// The two base layers hold `etc/os-release` and `usr/lib/base.so`; the
/// topmost layer holds `usr/bin/<package>` for every installed package.
#[derive(Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<String>>,
    packages: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn is_available(&self) -> StagecraftResult<bool> {
        Ok(true)
    }

    async fn build_image(
        &self,
        _context_dir: &Path,
        dockerfile: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> StagecraftResult<()> {
        self.record(format!("build {}", tag));
        let description = fs::read_to_string(dockerfile)
            .map_err(|e| StagecraftError::io("reading build description", e))?;
        on_output("STEP 1/2: FROM ubuntu:20.04".to_string());

        if tag == STAGING_TAG {
            let packages = description
                .lines()
                .find_map(|l| l.strip_prefix(INSTALL_PREFIX))
                .map(|rest| rest.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            *self.packages.lock().unwrap() = packages;
        }
        Ok(())
    }

    async fn save_image(&self, tag: &str, archive: &Path) -> StagecraftResult<()> {
        self.record(format!("save {}", tag));
        let packages = self.packages.lock().unwrap().clone();
        let top: Vec<(String, Vec<u8>)> = packages
            .iter()
            .map(|p| (format!("usr/bin/{}", p), format!("{} binary\n", p).into_bytes()))
            .collect();

        let layers = [
            ("base0/layer.tar", layer_tar(&[("etc/os-release".into(), b"focal\n".to_vec())])),
            ("base1/layer.tar", layer_tar(&[("usr/lib/base.so".into(), b"base\n".to_vec())])),
            ("top/layer.tar", layer_tar(&top)),
        ];
        let names: Vec<&str> = layers.iter().map(|(n, _)| *n).collect();
        let manifest = serde_json::json!([{
            "Config": "config.json",
            "RepoTags": [format!("{}:latest", tag)],
            "Layers": names,
        }])
        .to_string();

        let mut builder = Builder::new(fs::File::create(archive).unwrap());
        append(&mut builder, "manifest.json", manifest.as_bytes());
        for (name, data) in &layers {
            append(&mut builder, name, data);
        }
        builder.finish().unwrap();
        Ok(())
    }

    async fn layer_count(&self, image: &str) -> StagecraftResult<usize> {
        self.record(format!("inspect {}", image));
        Ok(2)
    }

    fn engine_name(&self) -> &str {
        "fake"
    }
}

fn layer_tar(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (path, data) in files {
        append(&mut builder, path, data);
    }
    builder.into_inner().unwrap()
}

fn append<W: std::io::Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
}
