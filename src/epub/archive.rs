//! EPUB归档模块
//!
//! 负责把EPUB解压到临时工作目录，以及把工作目录重新打包为EPUB。

use crate::epub::error::Result;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// mimetype文件名
pub const MIMETYPE_PATH: &str = "mimetype";
/// EPUB的mimetype内容
pub const EPUB_MIMETYPE: &str = "application/epub+zip";

/// 临时工作目录，离开作用域时自动删除
#[derive(Debug)]
pub struct WorkingTree {
    dir: TempDir,
}

impl WorkingTree {
    /// 创建新的临时工作目录
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("chapterforge-").tempdir()?;
        debug!("创建工作目录: {}", dir.path().display());
        Ok(Self { dir })
    }

    /// 把EPUB解压到新的工作目录
    pub fn extract<P: AsRef<Path>>(archive: P) -> Result<Self> {
        let tree = Self::new()?;
        unpack(archive.as_ref(), tree.path())?;
        Ok(tree)
    }

    /// 工作目录路径
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// 解压EPUB文件
///
/// mimetype缺失或内容不符只记录警告。条目路径经过校验，不会写到目标目录之外。
///
/// # 参数
/// * `archive` - EPUB文件路径
/// * `dest` - 目标目录
pub fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;

    match read_mimetype(&mut zip) {
        Some(mimetype) if mimetype.trim() == EPUB_MIMETYPE => {}
        Some(mimetype) => warn!("mimetype内容异常: 期望 {}，实际 {}", EPUB_MIMETYPE, mimetype.trim()),
        None => warn!("EPUB中缺少mimetype文件"),
    }

    zip.extract(dest)?;
    info!("解压 {} 个条目到 {}", zip.len(), dest.display());
    Ok(())
}

fn read_mimetype(zip: &mut ZipArchive<File>) -> Option<String> {
    let mut entry = zip.by_name(MIMETYPE_PATH).ok()?;
    let mut content = String::new();
    entry.read_to_string(&mut content).ok()?;
    Some(content)
}

/// 把目录打包为EPUB文件
///
/// mimetype以不压缩方式写在第一个，目录中没有时自动补上；
/// 其余文件按相对路径排序后压缩写入。
///
/// # 参数
/// * `src_dir` - 工作目录
/// * `archive` - 输出的EPUB文件路径
pub fn pack(src_dir: &Path, archive: &Path) -> Result<()> {
    let mut files = Vec::new();
    collect_files(src_dir, src_dir, &mut files)?;
    files.sort();

    let file = File::create(archive)?;
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MIMETYPE_PATH, stored)?;
    zip.write_all(EPUB_MIMETYPE.as_bytes())?;

    let mut count = 1;
    for (name, path) in files {
        if name == MIMETYPE_PATH {
            continue;
        }
        zip.start_file(name, deflated)?;
        zip.write_all(&fs::read(&path)?)?;
        count += 1;
    }
    zip.finish()?;

    info!("写入 {} 个条目到 {}", count, archive.display());
    Ok(())
}

/// 递归收集文件，名称为以 `/` 分隔的相对路径
fn collect_files(root: &Path, dir: &Path, files: &mut Vec<(String, PathBuf)>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((name, path));
    }
    Ok(())
}
