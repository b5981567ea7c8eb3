//! Chapter bundle assembly
//!
//! External collaborator boundary: consumes the ordered set of verified
//! page files for one chapter and produces a single bundle. The default
//! implementation writes a CBZ (stored zip of the pages in reading
//! order), which keeps the raster data byte-identical.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::errors::AssemblyError;

/// Merges ordered page files into one paginated bundle
#[async_trait]
pub trait BundleAssembler: Send {
    /// Assemble `pages` (already in reading order) into `output`.
    async fn assemble(&self, pages: &[PathBuf], output: &Path) -> Result<(), AssemblyError>;
}

/// CBZ assembler: a zip archive of the pages, stored uncompressed since
/// the images are already compressed formats.
pub struct CbzAssembler;

#[async_trait]
impl BundleAssembler for CbzAssembler {
    async fn assemble(&self, pages: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
        if pages.is_empty() {
            return Err(AssemblyError::NoPages {
                name: output.display().to_string(),
            });
        }

        let file = std::fs::File::create(output)?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);

        for page in pages {
            let name = page
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| AssemblyError::NoPages {
                    name: page.display().to_string(),
                })?;
            let bytes = std::fs::read(page)?;
            writer.start_file(name, options)?;
            writer.write_all(&bytes)?;
        }

        writer.finish()?;
        info!(
            pages = pages.len(),
            bundle = %output.display(),
            "chapter bundle assembled"
        );
        Ok(())
    }
}
