//! 链接改写模块
//!
//! 章节文档写在OPF所在目录，而源文档可能位于子目录中。从源文档复制出来的
//! head与正文标记里的相对链接需要从源文档目录换算到OPF目录。

use crate::epub::error::{EpubError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::io;

/// 需要改写的链接属性(本地名)
const LINK_ATTRIBUTES: [&[u8]; 3] = [b"href", b"src", b"poster"];

/// href所在目录，不含末尾的 `/`
pub fn document_dir(href: &str) -> &str {
    href.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// 是否为不需要改写的链接：外部URL、绝对路径或文档内锚点
pub fn is_external(url: &str) -> bool {
    if url.is_empty() || url.starts_with('#') || url.starts_with('/') {
        return true;
    }
    let end = url.find(['/', '?', '#']).unwrap_or(url.len());
    match url[..end].split_once(':') {
        Some((scheme, _)) => {
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// 消去路径中的 `.` 与 `..`，越过起点的 `..` 保留
fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// 把相对于`from_dir`的链接换算为相对于OPF目录的链接
///
/// # 参数
/// * `url` - 原链接，可带查询串与锚点
/// * `from_dir` - 链接所在文档的目录(相对于OPF目录)
///
/// # 返回值
/// * `String` - 换算后的链接，外部链接原样返回
pub fn rebase_url(url: &str, from_dir: &str) -> String {
    if is_external(url) || from_dir.is_empty() {
        return url.to_string();
    }
    let split = url.find(['#', '?']).unwrap_or(url.len());
    let (path, suffix) = url.split_at(split);
    format!("{}{}", normalize(&format!("{}/{}", from_dir, path)), suffix)
}

/// 改写整个文档中的相对链接，使其相对于OPF目录
///
/// 只改动带链接属性的元素，其余内容按原样写出。
///
/// # 参数
/// * `source` - 文档源文本
/// * `document_href` - 文档相对于OPF目录的路径
///
/// # 返回值
/// * `Result<String>` - 改写后的文档
pub fn rebase_document(source: &str, document_href: &str) -> Result<String> {
    let from_dir = document_dir(document_href);
    if from_dir.is_empty() {
        return Ok(source.to_string());
    }

    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::new());

    loop {
        match reader.read_event()? {
            Event::Start(e) => match rebased_element(&e, from_dir)? {
                Some(updated) => writer.write_event(Event::Start(updated))?,
                None => writer.write_event(Event::Start(e))?,
            },
            Event::Empty(e) => match rebased_element(&e, from_dir)? {
                Some(updated) => writer.write_event(Event::Empty(updated))?,
                None => writer.write_event(Event::Empty(e))?,
            },
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| EpubError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// 链接有变化时返回改写后的元素
fn rebased_element(e: &BytesStart, from_dir: &str) -> Result<Option<BytesStart<'static>>> {
    let mut changed = false;
    let mut attributes = Vec::new();
    for attr_result in e.attributes() {
        let attr = attr_result?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        if LINK_ATTRIBUTES.contains(&attr.key.local_name().as_ref()) {
            let rebased = rebase_url(&value, from_dir);
            changed |= rebased != value;
            attributes.push((key, rebased));
        } else {
            attributes.push((key, value));
        }
    }
    if !changed {
        return Ok(None);
    }

    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut updated = BytesStart::new(name);
    for (key, value) in &attributes {
        updated.push_attribute((key.as_str(), value.as_str()));
    }
    Ok(Some(updated.into_owned()))
}
