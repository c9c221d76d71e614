//! XHTML标记树模块
//!
//! 用quick-xml把XHTML文档解析为一棵轻量的节点树。每个节点只记录它在源文本中的
//! 字节范围，切分、拼接时直接引用原始标记，不做任何重新序列化。

use crate::epub::error::Result;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::ops::Range;

/// 节点在树中的索引
pub type NodeId = usize;

/// 节点类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// 元素，名称为去掉命名空间前缀的本地名称
    Element { name: String },
    /// 文本（包括标签之间的空白）
    Text,
    /// 注释、CDATA、处理指令、文档声明等
    Other,
}

/// 标记树节点
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// 节点完整标记在源文本中的范围
    pub outer: Range<usize>,
    /// 起止标签之间内容的范围，自闭合元素和非元素节点为None
    pub inner: Option<Range<usize>>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// 元素属性(限定名, 值)
    pub attributes: Vec<(String, String)>,
}

impl Node {
    fn leaf(kind: NodeKind, outer: Range<usize>, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            outer,
            inner: None,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// 元素名称
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { name } => Some(name),
            _ => None,
        }
    }
}

/// 保留源文本范围的标记树
#[derive(Debug)]
pub struct MarkupTree<'a> {
    source: &'a str,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl<'a> MarkupTree<'a> {
    /// 解析XHTML文档
    ///
    /// 节点按文档顺序存放，因此节点索引的顺序就是文档顺序。
    ///
    /// # 参数
    /// * `source` - 文档源文本
    ///
    /// # 返回值
    /// * `Result<MarkupTree>` - 标记树，文档不是格式良好的XML时返回错误
    pub fn parse(source: &'a str) -> Result<Self> {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = true;

        let mut tree = MarkupTree {
            source,
            nodes: Vec::new(),
            roots: Vec::new(),
        };
        let mut stack: Vec<NodeId> = Vec::new();
        // 上一个标记结束的位置，到下一个'<'之间的内容就是文本
        let mut cursor = 0usize;

        loop {
            let event = reader.read_event()?;
            if let Event::Eof = event {
                break;
            }
            if let Event::Text(_) = event {
                continue;
            }

            let end = reader.buffer_position() as usize;
            let start = source
                .get(cursor..)
                .and_then(|rest| rest.find('<'))
                .map(|offset| cursor + offset)
                .unwrap_or(cursor);
            let parent = stack.last().copied();
            if start > cursor {
                tree.push(Node::leaf(NodeKind::Text, cursor..start, parent));
            }

            match event {
                Event::Start(ref e) => {
                    let mut node = Node::leaf(
                        NodeKind::Element {
                            name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                        },
                        start..end,
                        parent,
                    );
                    node.inner = Some(end..end);
                    node.attributes = collect_attributes(e);
                    let id = tree.push(node);
                    stack.push(id);
                }
                Event::Empty(ref e) => {
                    let mut node = Node::leaf(
                        NodeKind::Element {
                            name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                        },
                        start..end,
                        parent,
                    );
                    node.attributes = collect_attributes(e);
                    tree.push(node);
                }
                Event::End(_) => {
                    if let Some(id) = stack.pop() {
                        let node = &mut tree.nodes[id];
                        node.outer.end = end;
                        if let Some(inner) = node.inner.as_mut() {
                            inner.end = start;
                        }
                    }
                }
                _ => {
                    tree.push(Node::leaf(NodeKind::Other, start..end, parent));
                }
            }
            cursor = end;
        }

        if cursor < source.len() {
            let parent = stack.last().copied();
            tree.push(Node::leaf(NodeKind::Text, cursor..source.len(), parent));
        }
        // 未闭合的元素延伸到文档末尾
        while let Some(id) = stack.pop() {
            let node = &mut tree.nodes[id];
            node.outer.end = source.len();
            if let Some(inner) = node.inner.as_mut() {
                inner.end = source.len();
            }
        }

        Ok(tree)
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len();
        match node.parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        id
    }

    /// 获取节点
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// 节点是否为指定名称的元素
    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.nodes[id].name() == Some(name)
    }

    /// 节点的完整标记
    pub fn outer_markup(&self, id: NodeId) -> &'a str {
        self.slice(self.nodes[id].outer.clone())
    }

    /// 元素起止标签之间的标记，自闭合元素为空串
    pub fn inner_markup(&self, id: NodeId) -> &'a str {
        match &self.nodes[id].inner {
            Some(range) => self.slice(range.clone()),
            None => "",
        }
    }

    fn slice(&self, range: Range<usize>) -> &'a str {
        self.source.get(range).unwrap_or("")
    }

    /// 按名称读取属性，匹配限定名或本地名称
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id]
            .attributes
            .iter()
            .find(|(key, _)| key == name || local_part(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// 节点之后的兄弟节点
    pub fn next_siblings(&self, id: NodeId) -> &[NodeId] {
        let siblings = match self.nodes[id].parent {
            Some(parent) => &self.nodes[parent].children,
            None => &self.roots,
        };
        match siblings.iter().position(|&sibling| sibling == id) {
            Some(index) => &siblings[index + 1..],
            None => &[],
        }
    }

    /// 判断`ancestor`是否包含`id`（不含自身）
    pub fn is_descendant(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes[id].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent].parent;
        }
        false
    }

    /// 按文档顺序查找指定名称的元素，`scope`为None时搜索整个文档
    pub fn find_all(&self, scope: Option<NodeId>, name: &str) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| self.is_element(id, name))
            .filter(|&id| scope.is_none_or(|scope| self.is_descendant(id, scope)))
            .collect()
    }

    /// 查找第一个指定名称的元素
    pub fn find_first(&self, scope: Option<NodeId>, name: &str) -> Option<NodeId> {
        self.find_all(scope, name).into_iter().next()
    }

    /// 节点本身或其后代中是否有指定名称的元素
    pub fn contains_element(&self, id: NodeId, name: &str) -> bool {
        self.is_element(id, name)
            || self.nodes[id]
                .children
                .iter()
                .any(|&child| self.contains_element(child, name))
    }

    /// 正文范围：body元素，缺少body时退回根元素
    pub fn content_scope(&self) -> Option<NodeId> {
        self.find_first(None, "body").or_else(|| {
            self.roots
                .iter()
                .copied()
                .find(|&id| self.nodes[id].name().is_some())
        })
    }

    /// 正文范围内的全部标记
    pub fn content_markup(&self) -> &'a str {
        match self.content_scope() {
            Some(scope) => self.inner_markup(scope),
            None => self.source,
        }
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn collect_attributes(e: &quick_xml::events::BytesStart) -> Vec<(String, String)> {
    let mut attributes = e.attributes();
    attributes.with_checks(false);
    attributes
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>T</title></head>
<body class="main"><h1 id="a">One</h1><p>x<br/>y</p><!-- note --><h1>Two</h1></body>
</html>"#;

    #[test]
    fn test_spans_reproduce_source() {
        let tree = MarkupTree::parse(DOC).unwrap();
        let body = tree.find_first(None, "body").unwrap();
        assert_eq!(
            tree.inner_markup(body),
            r#"<h1 id="a">One</h1><p>x<br/>y</p><!-- note --><h1>Two</h1>"#
        );

        let p = tree.find_first(None, "p").unwrap();
        assert_eq!(tree.outer_markup(p), "<p>x<br/>y</p>");
        assert_eq!(tree.node(p).children.len(), 3);

        let br = tree.find_first(None, "br").unwrap();
        assert_eq!(tree.inner_markup(br), "");
    }

    #[test]
    fn test_siblings_and_attributes() {
        let tree = MarkupTree::parse(DOC).unwrap();
        let headings = tree.find_all(None, "h1");
        assert_eq!(headings.len(), 2);
        assert_eq!(tree.attribute(headings[0], "id"), Some("a"));

        let siblings = tree.next_siblings(headings[0]);
        assert_eq!(siblings.len(), 3);
        assert_eq!(siblings[2], headings[1]);
        assert_eq!(tree.node(siblings[1]).kind, NodeKind::Other);

        let body = tree.content_scope().unwrap();
        assert_eq!(tree.attribute(body, "class"), Some("main"));
        assert!(tree.contains_element(body, "br"));
    }

    #[test]
    fn test_prefixed_attribute_lookup() {
        let tree = MarkupTree::parse(r#"<nav epub:type="toc"><ol/></nav>"#).unwrap();
        let nav = tree.find_first(None, "nav").unwrap();
        assert_eq!(tree.attribute(nav, "epub:type"), Some("toc"));
        assert_eq!(tree.attribute(nav, "type"), Some("toc"));
    }

    #[test]
    fn test_missing_body_falls_back_to_root() {
        let tree = MarkupTree::parse("<div><p>a</p></div>").unwrap();
        assert_eq!(tree.content_markup(), "<p>a</p>");
    }

    #[test]
    fn test_mismatched_tags_are_rejected() {
        assert!(MarkupTree::parse("<body><p>a</div></body>").is_err());
    }
}
