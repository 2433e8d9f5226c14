use crate::error::AppError;
use crate::services::file_source::{FileSource, PathFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif", "ico",
];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files inside a directory, sorted by path.
pub fn list_image_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, AppError> {
    if !dir.is_dir() {
        return Err(AppError::read(&dir.display().to_string(), "not a directory"));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    images.sort();
    Ok(images)
}

/// Turn user-supplied paths into an ordered selection. Directories expand to
/// the images they contain; explicit files are kept whatever their type.
pub fn expand_selection(paths: &[PathBuf], recursive: bool) -> Result<Vec<Arc<dyn FileSource>>, AppError> {
    let mut files: Vec<Arc<dyn FileSource>> = Vec::new();
    for path in paths {
        if path.is_dir() {
            for image in list_image_files(path, recursive)? {
                files.push(Arc::new(PathFile::new(image)));
            }
        } else {
            files.push(Arc::new(PathFile::new(path.clone())));
        }
    }
    Ok(files)
}
