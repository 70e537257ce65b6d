//! Archive codec: portable export/import of a content version
//!
//! The archive is a zip container with `manifest.json` at the root plus one
//! UTF-8 text file per introduction, conclusion and extract body. Blob paths
//! are declared in the manifest and nest under the parent container's slug
//! directory:
//!
//! ```text
//! manifest.json
//! introduction.md
//! conclusion.md
//! part-slug/introduction.md
//! part-slug/chapter-slug/extract-slug.md
//! ```
//!
//! Import never trusts archived slugs: every title is re-slugified on the
//! way in, so importing into an existing content cannot collide with its
//! siblings. Every blob the manifest declares must exist in the archive and
//! fit the configured size bound, otherwise the import fails with
//! `CorruptArchive` and nothing is created.

use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, Result};
use crate::store::{ContentId, ContentMeta, VersionId, VersionStore};
use crate::tree::{ContentKind, NodeId, NodeKind, Tree, ROOT};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Write};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Extension used for text blobs
const BLOB_EXT: &str = "md";

/// Archive manifest, serialized as `manifest.json`
///
/// Field order is the canonical key order: re-serializing the same tree
/// yields byte-identical manifest bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveManifest {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub title: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licence: Option<String>,
    /// Relative path of the root introduction blob
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    /// Relative path of the root conclusion blob
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    pub children: Vec<ManifestNode>,
}

/// One node in the manifest; text fields hold blob paths, not text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ManifestNode {
    Container {
        title: String,
        slug: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        introduction: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        conclusion: Option<String>,
        children: Vec<ManifestNode>,
    },
    Extract {
        title: String,
        slug: String,
        text: String,
    },
}

/// Content parsed back out of an archive
pub struct ImportedContent {
    pub kind: ContentKind,
    pub title: String,
    pub description: Option<String>,
    pub licence: Option<String>,
    pub tree: Tree,
}

/// Export one version of a content as archive bytes
pub fn export(store: &VersionStore, content: ContentId, version: Option<&str>) -> Result<Vec<u8>> {
    let meta = store.load_meta(content)?;
    let tree = store.load_with_meta(&meta, version)?;

    let mut blobs: Vec<(String, String)> = Vec::new();
    let manifest = build_manifest(&meta, &tree, &mut blobs);
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer
        .start_file("manifest.json", options)
        .map_err(zip_export_err)?;
    writer.write_all(&manifest_bytes)?;

    for (path, text) in &blobs {
        writer.start_file(path, options).map_err(zip_export_err)?;
        writer.write_all(text.as_bytes())?;
    }

    let cursor = writer.finish().map_err(zip_export_err)?;
    let bytes = cursor.into_inner();
    info!(
        content,
        blobs = blobs.len(),
        size = bytes.len(),
        "exported archive"
    );
    Ok(bytes)
}

fn build_manifest(
    meta: &ContentMeta,
    tree: &Tree,
    blobs: &mut Vec<(String, String)>,
) -> ArchiveManifest {
    let root = tree.node(ROOT);
    let (introduction, conclusion) = match &root.kind {
        NodeKind::Container {
            introduction,
            conclusion,
            ..
        } => (
            push_blob(blobs, "", "introduction", introduction.as_deref()),
            push_blob(blobs, "", "conclusion", conclusion.as_deref()),
        ),
        NodeKind::Extract { .. } => (None, None),
    };

    ArchiveManifest {
        kind: tree.kind(),
        title: root.title.clone(),
        slug: root.slug.clone(),
        description: meta.description.clone(),
        licence: meta.licence.clone(),
        introduction,
        conclusion,
        children: manifest_children(tree, ROOT, "", blobs),
    }
}

fn manifest_children(
    tree: &Tree,
    parent: NodeId,
    prefix: &str,
    blobs: &mut Vec<(String, String)>,
) -> Vec<ManifestNode> {
    let children = match &tree.node(parent).kind {
        NodeKind::Container { children, .. } => children.clone(),
        NodeKind::Extract { .. } => return Vec::new(),
    };

    children
        .iter()
        .map(|&child| {
            let node = tree.node(child);
            let path = if prefix.is_empty() {
                node.slug.clone()
            } else {
                format!("{}/{}", prefix, node.slug)
            };
            match &node.kind {
                NodeKind::Container {
                    introduction,
                    conclusion,
                    ..
                } => ManifestNode::Container {
                    title: node.title.clone(),
                    slug: node.slug.clone(),
                    introduction: push_blob(blobs, &path, "introduction", introduction.as_deref()),
                    conclusion: push_blob(blobs, &path, "conclusion", conclusion.as_deref()),
                    children: manifest_children(tree, child, &path, blobs),
                },
                NodeKind::Extract { text } => {
                    let blob_path = format!("{}.{}", path, BLOB_EXT);
                    blobs.push((blob_path.clone(), text.clone()));
                    ManifestNode::Extract {
                        title: node.title.clone(),
                        slug: node.slug.clone(),
                        text: blob_path,
                    }
                }
            }
        })
        .collect()
}

fn push_blob(
    blobs: &mut Vec<(String, String)>,
    dir: &str,
    name: &str,
    text: Option<&str>,
) -> Option<String> {
    let text = text?;
    let path = if dir.is_empty() {
        format!("{}.{}", name, BLOB_EXT)
    } else {
        format!("{}/{}.{}", dir, name, BLOB_EXT)
    };
    blobs.push((path.clone(), text.to_string()));
    Some(path)
}

/// Parse archive bytes into a tree, without touching the store
pub fn parse_archive(bytes: &[u8], config: &RepositoryConfig) -> Result<ImportedContent> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| RepositoryError::CorruptArchive(format!("unreadable archive: {}", e)))?;

    let manifest: ArchiveManifest = {
        let mut file = archive.by_name("manifest.json").map_err(|_| {
            RepositoryError::CorruptArchive("archive has no manifest.json".to_string())
        })?;
        let mut raw = String::new();
        file.read_to_string(&mut raw).map_err(|e| {
            RepositoryError::CorruptArchive(format!("manifest.json is not UTF-8: {}", e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            RepositoryError::CorruptArchive(format!("malformed manifest.json: {}", e))
        })?
    };

    let introduction = manifest
        .introduction
        .as_deref()
        .map(|p| read_blob(&mut archive, p, config.max_blob_size))
        .transpose()?;
    let conclusion = manifest
        .conclusion
        .as_deref()
        .map(|p| read_blob(&mut archive, p, config.max_blob_size))
        .transpose()?;

    let root_slug = crate::slug::slugify(&manifest.title, config.slug_max_length)
        .ok_or_else(|| {
            RepositoryError::CorruptArchive(format!(
                "title '{}' normalizes to an empty slug",
                manifest.title
            ))
        })?;

    let mut tree = Tree::new(
        manifest.kind,
        manifest.title.clone(),
        root_slug,
        introduction,
        conclusion,
        config.max_container_depth,
        config.slug_max_length,
    );
    hydrate(&mut archive, &mut tree, ROOT, &manifest.children, config)?;

    debug!(title = %manifest.title, "parsed archive");
    Ok(ImportedContent {
        kind: manifest.kind,
        title: manifest.title,
        description: manifest.description,
        licence: manifest.licence,
        tree,
    })
}

fn hydrate(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    tree: &mut Tree,
    parent: NodeId,
    nodes: &[ManifestNode],
    config: &RepositoryConfig,
) -> Result<()> {
    for node in nodes {
        match node {
            ManifestNode::Container {
                title,
                introduction,
                conclusion,
                children,
                ..
            } => {
                let introduction = introduction
                    .as_deref()
                    .map(|p| read_blob(archive, p, config.max_blob_size))
                    .transpose()?;
                let conclusion = conclusion
                    .as_deref()
                    .map(|p| read_blob(archive, p, config.max_blob_size))
                    .transpose()?;
                let id = tree.add_container(parent, title, introduction, conclusion)?;
                hydrate(archive, tree, id, children, config)?;
            }
            ManifestNode::Extract { title, text, .. } => {
                let body = read_blob(archive, text, config.max_blob_size)?;
                tree.add_extract(parent, title, &body)?;
            }
        }
    }
    Ok(())
}

fn read_blob(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    path: &str,
    max_size: u64,
) -> Result<String> {
    let mut file = archive.by_name(path).map_err(|_| {
        RepositoryError::CorruptArchive(format!("manifest references missing blob '{}'", path))
    })?;
    if file.size() > max_size {
        return Err(RepositoryError::CorruptArchive(format!(
            "blob '{}' exceeds the size bound ({} > {})",
            path,
            file.size(),
            max_size
        )));
    }
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|e| {
        RepositoryError::CorruptArchive(format!("blob '{}' is not UTF-8: {}", path, e))
    })?;
    Ok(text)
}

/// Import an archive as a brand-new content
///
/// The new content gets its own identity: a fresh id and a slug deduplicated
/// against everything the store already holds.
pub fn import_new(
    store: &VersionStore,
    bytes: &[u8],
    authors: Vec<u64>,
) -> Result<ContentMeta> {
    let parsed = parse_archive(bytes, store.config())?;

    let (introduction, conclusion) = root_texts(&parsed.tree);
    let mut meta = store.create_content(
        parsed.kind,
        &parsed.title,
        parsed.description.clone(),
        parsed.licence.clone(),
        authors,
        introduction,
        conclusion,
    )?;

    let mut tree = parsed.tree;
    tree.rename_root(&parsed.title, &meta.slug);
    let parent = meta.pointers.draft.clone();
    store.commit(&mut meta, &tree, parent)?;
    info!(content = meta.id, slug = %meta.slug, "imported archive as new content");
    Ok(meta)
}

/// Import an archive into an existing content, replacing its draft tree
pub fn import_into(
    store: &VersionStore,
    content: ContentId,
    bytes: &[u8],
) -> Result<VersionId> {
    let parsed = parse_archive(bytes, store.config())?;

    let _lock = store.try_lock_content(content)?;
    let mut meta = store.load_meta(content)?;

    store.rename_content(&mut meta, &parsed.title)?;
    meta.description = parsed.description;
    meta.licence = parsed.licence;

    let mut tree = parsed.tree;
    tree.rename_root(&parsed.title, &meta.slug);
    let parent = meta.pointers.draft.clone();
    let version = store.commit(&mut meta, &tree, parent)?;
    info!(content, version = %version, "imported archive into existing content");
    Ok(version)
}

fn root_texts(tree: &Tree) -> (Option<String>, Option<String>) {
    match &tree.node(ROOT).kind {
        NodeKind::Container {
            introduction,
            conclusion,
            ..
        } => (introduction.clone(), conclusion.clone()),
        NodeKind::Extract { .. } => (None, None),
    }
}

fn zip_export_err(e: zip::result::ZipError) -> RepositoryError {
    RepositoryError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}
