//! 章节切分模块
//!
//! 按阅读顺序扫描正文文档，在指定级别的标题处切分出章节。切分过程是一个只有
//! 两个状态（无打开章节 / 有打开章节）的状态机，状态值在文档之间依次传递，
//! 因此一个章节可以跨越多个源文档。

use crate::epub::config::{CHAPTER_ID_PREFIX, RebuildConfig};
use crate::epub::error::Result;
use crate::epub::link::rebase_document;
use crate::epub::markup::{MarkupTree, NodeId};
use crate::epub::opf::Opf;
use scraper::Html;
use std::fs;
use tracing::debug;

/// 待切分的正文文档
#[derive(Debug, Clone)]
pub struct ContentDocument {
    /// 文档在清单中的href
    pub href: String,
    /// 文档源文本
    pub source: String,
}

impl ContentDocument {
    pub fn new(href: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            source: source.into(),
        }
    }
}

/// 切分得到的章节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterUnit {
    /// 章节ID，形如 `ch_0`
    pub id: String,
    /// 标题文字
    pub title: String,
    /// 章节标记，从标题元素开始
    pub content: String,
}

/// 正在累积的章节
#[derive(Debug)]
struct OpenChapter {
    title: String,
    fragments: Vec<String>,
}

/// 切分状态
#[derive(Debug)]
enum ChapterState {
    NoChapterOpen,
    ChapterOpen(OpenChapter),
}

/// 章节切分器
///
/// 作为折叠的累积值使用：每次 [`Segmenter::feed`] 消费一个文档并返回新的状态，
/// 最后由 [`Segmenter::finish`] 关闭仍然打开的章节。
#[derive(Debug)]
pub struct Segmenter<'a> {
    heading_tag: &'a str,
    state: ChapterState,
    chapters: Vec<ChapterUnit>,
}

impl<'a> Segmenter<'a> {
    /// 创建切分器
    ///
    /// # 参数
    /// * `heading_tag` - 章节标题标签，如 `h1`
    pub fn new(heading_tag: &'a str) -> Self {
        Self {
            heading_tag,
            state: ChapterState::NoChapterOpen,
            chapters: Vec::new(),
        }
    }

    /// 处理一个文档
    ///
    /// 文档中没有标题时，整个正文并入当前打开的章节；没有打开的章节则丢弃。
    /// 有标题时，第一个标题之前的内容同样并入当前打开的章节。
    /// 每遇到一个标题就先关闭上一章，再以该标题及其之后的节点开启新章，
    /// 遇到下一个标题为止。
    pub fn feed(mut self, document: &ContentDocument) -> Result<Self> {
        let tree = MarkupTree::parse(&document.source)?;
        let scope = tree.content_scope();
        let headings = tree.find_all(scope, self.heading_tag);

        if headings.is_empty() {
            match &mut self.state {
                ChapterState::ChapterOpen(chapter) => {
                    debug!("{} 没有章节标题，并入《{}》", document.href, chapter.title);
                    chapter.fragments.push(tree.content_markup().to_string());
                }
                ChapterState::NoChapterOpen => {
                    debug!("{} 位于第一个章节标题之前，跳过", document.href);
                }
            }
            return Ok(self);
        }

        debug!("{} 包含{}个章节标题", document.href, headings.len());
        if let (ChapterState::ChapterOpen(chapter), Some(scope)) = (&mut self.state, scope) {
            leading_fragments(&tree, scope, self.heading_tag, &mut chapter.fragments);
        }
        for heading in headings {
            self.flush();
            let fragments = section_fragments(&tree, scope, heading, self.heading_tag);
            self.state = ChapterState::ChapterOpen(OpenChapter {
                title: heading_title(tree.outer_markup(heading)),
                fragments,
            });
        }

        Ok(self)
    }

    /// 结束切分，关闭仍然打开的章节
    pub fn finish(mut self) -> Vec<ChapterUnit> {
        self.flush();
        self.chapters
    }

    fn flush(&mut self) {
        let state = std::mem::replace(&mut self.state, ChapterState::NoChapterOpen);
        if let ChapterState::ChapterOpen(chapter) = state {
            let id = format!("{}{}", CHAPTER_ID_PREFIX, self.chapters.len());
            self.chapters.push(ChapterUnit {
                id,
                title: chapter.title,
                content: chapter.fragments.concat(),
            });
        }
    }
}

/// 标题元素及其之后的节点，直到下一个标题为止
///
/// 兄弟节点用完后向上一层，继续收集父元素之后的兄弟节点，直到正文范围。
/// 遇到内部含有标题的节点时，只收集该节点里标题之前的部分。
fn section_fragments(
    tree: &MarkupTree<'_>,
    scope: Option<NodeId>,
    heading: NodeId,
    heading_tag: &str,
) -> Vec<String> {
    let mut fragments = vec![tree.outer_markup(heading).to_string()];
    let mut current = heading;
    loop {
        for &sibling in tree.next_siblings(current) {
            if tree.contains_element(sibling, heading_tag) {
                leading_fragments(tree, sibling, heading_tag, &mut fragments);
                return fragments;
            }
            fragments.push(tree.outer_markup(sibling).to_string());
        }
        match tree.node(current).parent {
            Some(parent) if Some(parent) != scope => current = parent,
            _ => return fragments,
        }
    }
}

/// 收集节点内第一个标题之前的子节点
fn leading_fragments(
    tree: &MarkupTree<'_>,
    node: NodeId,
    heading_tag: &str,
    fragments: &mut Vec<String>,
) {
    if tree.is_element(node, heading_tag) {
        return;
    }
    for &child in &tree.node(node).children {
        if tree.contains_element(child, heading_tag) {
            leading_fragments(tree, child, heading_tag, fragments);
            return;
        }
        fragments.push(tree.outer_markup(child).to_string());
    }
}

/// 切分一组按阅读顺序排列的文档
///
/// # 参数
/// * `documents` - 正文文档
/// * `heading_tag` - 章节标题标签
///
/// # 返回值
/// * `Result<Vec<ChapterUnit>>` - 按出现顺序编号的章节
pub fn segment_documents(
    documents: &[ContentDocument],
    heading_tag: &str,
) -> Result<Vec<ChapterUnit>> {
    documents
        .iter()
        .try_fold(Segmenter::new(heading_tag), |segmenter, document| {
            segmenter.feed(document)
        })
        .map(Segmenter::finish)
}

/// 按阅读顺序读取需要切分的正文文档
///
/// 文档中的相对链接会换算到OPF目录，章节文档写在那里。
pub fn load_content_documents(opf: &Opf, config: &RebuildConfig) -> Result<Vec<ContentDocument>> {
    opf.content_documents(config)
        .into_iter()
        .map(|item| -> Result<ContentDocument> {
            let source = fs::read_to_string(&item.path)?;
            let source = rebase_document(source.trim_start_matches('\u{feff}'), &item.href)?;
            Ok(ContentDocument::new(item.href.clone(), source))
        })
        .collect()
}

/// 提取标题文字：解码实体并压缩空白
fn heading_title(markup: &str) -> String {
    let fragment = Html::parse_fragment(markup);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
