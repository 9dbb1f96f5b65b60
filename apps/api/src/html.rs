//! HTML Reducer: turns arbitrary HTML into readable plain text.
//!
//! Parsing goes through `scraper` (html5ever), so malformed markup is repaired
//! the same way a browser would repair it. Nothing is executed and nothing
//! referenced by the markup is fetched; the tree is only walked.

use scraper::{Html, Node};

/// Elements whose whole subtree is dropped, text included.
const DROPPED: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "svg", "canvas",
];

/// Elements that start and end a line of output.
const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "dd", "details", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "html", "li", "main", "nav", "ol", "p", "pre", "section", "summary",
    "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr", "ul",
];

/// Reduces an HTML document to plain text: one line per block element,
/// whitespace inside a line collapsed to single spaces, blank lines removed.
pub fn reduce(raw_html: &str) -> String {
    let document = Html::parse_document(raw_html);
    let mut sink = TextSink::default();

    // Explicit stack instead of recursion: nesting depth is attacker-controlled.
    // The bool marks the closing visit of an element.
    let mut stack = vec![(document.tree.root(), false)];

    while let Some((node, closing)) = stack.pop() {
        match node.value() {
            Node::Element(element) => {
                let name = element.name();
                if DROPPED.contains(&name) {
                    continue;
                }
                if name == "br" {
                    sink.break_line();
                    continue;
                }
                let is_block = BLOCKS.contains(&name);
                if closing {
                    if is_block {
                        sink.break_line();
                    }
                    continue;
                }
                if is_block {
                    sink.break_line();
                }
                stack.push((node, true));
                for child in node.children().rev() {
                    stack.push((child, false));
                }
            }
            Node::Text(text) => sink.push_text(text),
            Node::Document | Node::Fragment => {
                for child in node.children().rev() {
                    stack.push((child, false));
                }
            }
            // comments, doctype, processing instructions
            _ => {}
        }
    }

    sink.finish()
}

#[derive(Default)]
struct TextSink {
    lines: Vec<String>,
    current: String,
    pending_space: bool,
}

impl TextSink {
    fn push_text(&mut self, text: &str) {
        let mut words = text.split_whitespace().peekable();
        if words.peek().is_none() {
            if !text.is_empty() {
                self.pending_space = true;
            }
            return;
        }

        if text.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        for (i, word) in words.enumerate() {
            if (i > 0 || self.pending_space) && !self.current.is_empty() {
                self.current.push(' ');
            }
            self.current.push_str(word);
        }
        self.pending_space = text.ends_with(char::is_whitespace);
    }

    fn break_line(&mut self) {
        let line = self.current.trim();
        if !line.is_empty() {
            self.lines.push(line.to_string());
        }
        self.current.clear();
        self.pending_space = false;
    }

    fn finish(mut self) -> String {
        self.break_line();
        self.lines.join("\n")
    }
}
