//! Document-tree boundary.
//!
//! The scheduler never walks a markdown AST itself: the host hands it link
//! nodes through [`DocumentTree`] and receives mutated nodes back. A small
//! built-in [`Document`] implementation covers the CLI and tests.

/// A link node as seen by the executor: stable id within the tree, target
/// URL, and the link text (which doubles as the card/preview marker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    pub id: usize,
    pub url: String,
    pub text: String,
}

/// Traversal primitive consumed from the host.
///
/// `links` yields every link node; `replace_with_html` mutates one node in
/// place and its former content is discarded. The core never creates or frees
/// nodes, it only mutates the ones it is given.
pub trait DocumentTree {
    fn links(&self) -> Vec<LinkRef>;
    fn replace_with_html(&mut self, id: usize, html: String);
}

/// One node of the built-in flat document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Link { url: String, text: String },
    Html(String),
}

/// Minimal flat document: a sequence of text, link, and raw-HTML nodes.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Serialize back to text: links as markdown, HTML nodes verbatim.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Link { url, text } => {
                    out.push_str(&format!("[{text}]({url})"));
                }
                Node::Html(html) => out.push_str(html),
            }
        }
        out
    }
}

impl DocumentTree for Document {
    fn links(&self) -> Vec<LinkRef> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| match node {
                Node::Link { url, text } => Some(LinkRef {
                    id,
                    url: url.clone(),
                    text: text.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn replace_with_html(&mut self, id: usize, html: String) {
        if let Some(node) = self.nodes.get_mut(id) {
            *node = Node::Html(html);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(vec![
            Node::Text("intro ".into()),
            Node::Link {
                url: "https://example.com".into(),
                text: "$card".into(),
            },
            Node::Text(" outro".into()),
        ])
    }

    #[test]
    fn links_yield_ids_and_text() {
        let doc = sample();
        let links = doc.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, 1);
        assert_eq!(links[0].text, "$card");
    }

    #[test]
    fn replace_mutates_in_place() {
        let mut doc = sample();
        doc.replace_with_html(1, "<div>card</div>".into());
        assert_eq!(doc.nodes()[1], Node::Html("<div>card</div>".into()));
        assert_eq!(doc.to_text(), "intro <div>card</div> outro");
    }

    #[test]
    fn replace_ignores_unknown_id() {
        let mut doc = sample();
        doc.replace_with_html(99, "x".into());
        assert_eq!(doc.nodes().len(), 3);
    }
}
