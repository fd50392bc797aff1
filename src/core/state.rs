//! Output store: plan files and the app manifest, written atomically.

use super::digest;
use super::error::{Error, Result};
use super::types::{Manifest, ManifestEntry, Plan};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub const MANIFEST_VERSION: &str = "1.0";

/// Directory holding one stack's plan; the engine runs here.
pub fn stack_dir(out: &Path, stack: &str) -> PathBuf {
    out.join("stacks").join(stack)
}

pub fn plan_path(out: &Path, stack: &str) -> PathBuf {
    stack_dir(out, stack).join("plan.json")
}

pub fn manifest_path(out: &Path) -> PathBuf {
    out.join("manifest.json")
}

/// Write `content` to `path` via a sibling temp file and rename.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content).map_err(|e| Error::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Save a plan. Returns its digest. An identical plan already on disk is
/// left untouched.
pub fn save_plan(out: &Path, plan: &Plan) -> Result<String> {
    let path = plan_path(out, &plan.stack);
    let json = plan.to_json()?;
    let hash = digest::hash_string(&json);

    if path.exists() && digest::hash_file(&path)? == hash {
        log::debug!("{} unchanged", path.display());
        return Ok(hash);
    }
    write_atomic(&path, &json)?;
    log::info!("wrote {}", path.display());
    Ok(hash)
}

/// Load a stack's plan. Returns None if it was never synthesized.
pub fn load_plan(out: &Path, stack: &str) -> Result<Option<Plan>> {
    let path = plan_path(out, stack);
    if !path.exists() {
        return Ok(None);
    }
    read_plan(&path).map(Some)
}

/// Read any plan file.
pub fn read_plan(path: &Path) -> Result<Plan> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| Error::parse(path.display().to_string(), e))
}

/// Save every plan of an app and the manifest describing them.
pub fn save_app(out: &Path, app: &str, plans: &[Plan]) -> Result<Manifest> {
    let mut stacks = IndexMap::new();
    for plan in plans {
        let digest = save_plan(out, plan)?;
        stacks.insert(
            plan.stack.clone(),
            ManifestEntry {
                plan: format!("stacks/{}/plan.json", plan.stack),
                digest,
                resources: plan.resources.len(),
            },
        );
    }
    let manifest = Manifest {
        version: MANIFEST_VERSION.to_string(),
        app: app.to_string(),
        stacks,
    };
    save_manifest(out, &manifest)?;
    Ok(manifest)
}

pub fn save_manifest(out: &Path, manifest: &Manifest) -> Result<()> {
    let mut json = serde_json::to_string_pretty(manifest).map_err(|e| Error::Serialization {
        resource: manifest.app.clone(),
        field: "manifest".to_string(),
        reason: e.to_string(),
    })?;
    json.push('\n');
    write_atomic(&manifest_path(out), &json)
}

/// Load the manifest. Returns None if the directory holds no synthesis.
pub fn load_manifest(out: &Path) -> Result<Option<Manifest>> {
    let path = manifest_path(out);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    let manifest = serde_json::from_str(&content)
        .map_err(|e| Error::parse(path.display().to_string(), e))?;
    Ok(Some(manifest))
}

/// Plan files whose content no longer matches the manifest digest.
pub fn stale_plans(out: &Path, manifest: &Manifest) -> Result<Vec<String>> {
    let mut stale = Vec::new();
    for (stack, entry) in &manifest.stacks {
        let path = out.join(&entry.plan);
        if !path.exists() || digest::hash_file(&path)? != entry.digest {
            stale.push(stack.clone());
        }
    }
    Ok(stale)
}
