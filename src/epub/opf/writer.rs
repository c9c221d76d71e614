//! OPF写入模块
//!
//! 以事件流的方式重写OPF文件：manifest与spine按包模型的最终状态重新生成，
//! 其余内容原样保留。

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::{ManifestItem, Opf, SpineItem};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use std::collections::{HashMap, HashSet};
use std::io;

const DEFAULT_INDENT: &str = "\n    ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Manifest,
    Spine,
}

/// 按包模型重写OPF文档
///
/// - 清单中已不存在的item被删除，href或媒体类型有变化的item原地更新，新增的item追加在末尾
/// - spine的子元素整体按模型重新生成，保留原itemref的其它属性
///
/// # 参数
/// * `source` - 原OPF文档
/// * `opf` - 更新后的包模型
///
/// # 返回值
/// * `Result<String>` - 新的OPF文档
pub fn rewrite_package_document(source: &str, opf: &Opf) -> Result<String> {
    let mut reader = Reader::from_str(source);
    let mut writer = Writer::new(Vec::new());

    let mut section = Section::Outside;
    let mut seen_manifest = false;
    let mut seen_spine = false;
    // 被丢弃元素的剩余嵌套深度
    let mut skip_depth = 0usize;

    let mut item_prefix = String::new();
    let mut item_indent: Option<String> = None;
    let mut pending_space: Option<String> = None;
    let mut written_items: HashSet<String> = HashSet::new();

    let mut spine_indent: Option<String> = None;
    let mut spine_trailing: Option<String> = None;
    let mut itemref_prefix = String::new();
    let mut original_itemrefs: HashMap<String, BytesStart<'static>> = HashMap::new();

    loop {
        let event = reader.read_event()?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match section {
            Section::Outside => match event {
                Event::Start(ref e) | Event::Empty(ref e)
                    if matches!(e.local_name().as_ref(), b"manifest" | b"spine") =>
                {
                    let is_manifest = e.local_name().as_ref() == b"manifest";
                    let prefix = qualified_prefix(e);
                    writer.write_event(Event::Start(e.borrow()))?;

                    if is_manifest {
                        seen_manifest = true;
                        item_prefix = prefix;
                    } else {
                        seen_spine = true;
                        itemref_prefix = prefix;
                    }

                    if let Event::Empty(_) = event {
                        if is_manifest {
                            write_new_items(&mut writer, opf, &written_items, &item_prefix, None)?;
                        } else {
                            write_spine(&mut writer, &opf.spine, &original_itemrefs, &itemref_prefix, None)?;
                        }
                        writer.write_event(Event::End(e.to_end()))?;
                    } else {
                        section = if is_manifest { Section::Manifest } else { Section::Spine };
                    }
                }
                Event::Eof => break,
                other => writer.write_event(other)?,
            },
            Section::Manifest => match event {
                Event::Text(ref text) if is_whitespace(text) => {
                    let space = String::from_utf8_lossy(text).into_owned();
                    if item_indent.is_none() {
                        item_indent = Some(space.clone());
                    }
                    pending_space = Some(space);
                }
                Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"item" => {
                    let is_start = matches!(event, Event::Start(_));
                    let id = attribute_value(e, b"id")?;
                    match id.as_deref().and_then(|id| opf.get_manifest_item(id)) {
                        Some(item) => {
                            flush_space(&mut writer, &mut pending_space)?;
                            let element = match updated_item(e, item)? {
                                Some(updated) => updated,
                                None => e.borrow(),
                            };
                            if is_start {
                                writer.write_event(Event::Start(element))?;
                            } else {
                                writer.write_event(Event::Empty(element))?;
                            }
                            written_items.insert(item.id.clone());
                        }
                        None => {
                            pending_space = None;
                            if is_start {
                                skip_depth = 1;
                            }
                        }
                    }
                }
                Event::End(ref e) if e.local_name().as_ref() == b"manifest" => {
                    write_new_items(
                        &mut writer,
                        opf,
                        &written_items,
                        &item_prefix,
                        item_indent.as_deref(),
                    )?;
                    flush_space(&mut writer, &mut pending_space)?;
                    writer.write_event(Event::End(e.clone()))?;
                    section = Section::Outside;
                }
                Event::Eof => break,
                other => {
                    flush_space(&mut writer, &mut pending_space)?;
                    writer.write_event(other)?;
                }
            },
            Section::Spine => match event {
                Event::Text(ref text) if is_whitespace(text) => {
                    let space = String::from_utf8_lossy(text).into_owned();
                    if spine_indent.is_none() {
                        spine_indent = Some(space.clone());
                    }
                    spine_trailing = Some(space);
                }
                Event::Start(ref e) | Event::Empty(ref e)
                    if e.local_name().as_ref() == b"itemref" =>
                {
                    if let Some(idref) = attribute_value(e, b"idref")? {
                        original_itemrefs.insert(idref, e.clone().into_owned());
                    }
                    if let Event::Start(_) = event {
                        skip_depth = 1;
                    }
                    spine_trailing = None;
                }
                Event::End(ref e) if e.local_name().as_ref() == b"spine" => {
                    write_spine(
                        &mut writer,
                        &opf.spine,
                        &original_itemrefs,
                        &itemref_prefix,
                        spine_indent.as_deref(),
                    )?;
                    if let Some(space) = spine_trailing.take() {
                        writer.write_event(Event::Text(BytesText::from_escaped(space)))?;
                    }
                    writer.write_event(Event::End(e.clone()))?;
                    section = Section::Outside;
                }
                Event::Eof => break,
                _ => {}
            },
        }
    }

    if !seen_manifest {
        return Err(EpubError::MissingManifestElement);
    }
    if !seen_spine {
        return Err(EpubError::MissingSpineElement);
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| EpubError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn is_whitespace(text: &BytesText) -> bool {
    text.iter().all(|b| b.is_ascii_whitespace())
}

/// 元素限定名的前缀部分，如 `opf:`
fn qualified_prefix(e: &BytesStart) -> String {
    match e.name().prefix() {
        Some(prefix) => format!("{}:", String::from_utf8_lossy(prefix.as_ref())),
        None => String::new(),
    }
}

fn attribute_value(e: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr_result in e.attributes() {
        let attr = attr_result?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn flush_space<W: io::Write>(writer: &mut Writer<W>, pending: &mut Option<String>) -> Result<()> {
    if let Some(space) = pending.take() {
        writer.write_event(Event::Text(BytesText::from_escaped(space)))?;
    }
    Ok(())
}

/// href或媒体类型变化时生成新的item元素，否则返回None
fn updated_item(e: &BytesStart, item: &ManifestItem) -> Result<Option<BytesStart<'static>>> {
    let href = attribute_value(e, b"href")?;
    let media_type = attribute_value(e, b"media-type")?;
    if href.as_deref() == Some(item.href.as_str())
        && media_type.as_deref() == Some(item.media_type.as_str())
    {
        return Ok(None);
    }

    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut updated = BytesStart::new(name);
    for attr_result in e.attributes() {
        let attr = attr_result?;
        match attr.key.local_name().as_ref() {
            b"href" | b"media-type" => {}
            _ => updated.push_attribute(attr),
        }
    }
    updated.push_attribute(("href", item.href.as_str()));
    updated.push_attribute(("media-type", item.media_type.as_str()));
    Ok(Some(updated.into_owned()))
}

fn new_item_element(item: &ManifestItem, prefix: &str) -> BytesStart<'static> {
    let mut element = BytesStart::new(format!("{}item", prefix));
    element.push_attribute(("id", item.id.as_str()));
    element.push_attribute(("href", item.href.as_str()));
    element.push_attribute(("media-type", item.media_type.as_str()));
    if let Some(properties) = &item.properties {
        element.push_attribute(("properties", properties.as_str()));
    }
    element.into_owned()
}

fn write_new_items<W: io::Write>(
    writer: &mut Writer<W>,
    opf: &Opf,
    written: &HashSet<String>,
    prefix: &str,
    indent: Option<&str>,
) -> Result<()> {
    let indent = indent.unwrap_or(DEFAULT_INDENT);
    for item in opf.items().filter(|item| !written.contains(&item.id)) {
        writer.write_event(Event::Text(BytesText::from_escaped(indent)))?;
        writer.write_event(Event::Empty(new_item_element(item, prefix)))?;
    }
    Ok(())
}

fn write_spine<W: io::Write>(
    writer: &mut Writer<W>,
    spine: &[SpineItem],
    originals: &HashMap<String, BytesStart<'static>>,
    prefix: &str,
    indent: Option<&str>,
) -> Result<()> {
    let indent = indent.unwrap_or(DEFAULT_INDENT);
    for spine_item in spine {
        let element = match originals.get(&spine_item.idref) {
            Some(original) => original.clone(),
            None => {
                let mut element = BytesStart::new(format!("{}itemref", prefix));
                element.push_attribute(("idref", spine_item.idref.as_str()));
                if !spine_item.linear {
                    element.push_attribute(("linear", "no"));
                }
                element.into_owned()
            }
        };
        writer.write_event(Event::Text(BytesText::from_escaped(indent)))?;
        writer.write_event(Event::Empty(element))?;
    }
    Ok(())
}
