//! DOT output for graph dumps.
//!
//! Graphs render as record-shaped nodes whose labels are the block contents. Type
//! descriptors and method names (`Ljava/lang/Object;.<init>:()V`) are full of characters
//! that DOT treats specially, so every label goes through [`escape_dot`].

use std::fmt::Write;

/// Escapes a string for use inside a quoted DOT label.
///
/// Quotes, backslashes, newlines and angle brackets are escaped; carriage returns are
/// dropped.
///
/// # Examples
///
/// ```rust
/// use dexflow::utils::escape_dot;
///
/// assert_eq!(escape_dot("<init>"), "\\<init\\>");
/// ```
#[must_use]
pub fn escape_dot(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '<' => out.push_str("\\<"),
            '>' => out.push_str("\\>"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '|' => out.push_str("\\|"),
            _ => out.push(c),
        }
    }
    out
}

/// Incremental builder for a `digraph` document.
pub(crate) struct DotWriter {
    out: String,
}

impl DotWriter {
    pub(crate) fn new(name: &str) -> Self {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape_dot(name));
        out.push_str("  node [shape=record, fontname=\"monospace\"];\n");
        Self { out }
    }

    /// Adds a node whose label is one left-aligned line per entry of `lines`.
    pub(crate) fn node(&mut self, id: &str, title: &str, lines: &[String]) {
        let mut label = escape_dot(title);
        label.push_str("\\l");
        for line in lines {
            label.push_str(&escape_dot(line));
            label.push_str("\\l");
        }
        let _ = writeln!(self.out, "  {id} [label=\"{{{label}}}\"];");
    }

    pub(crate) fn edge(&mut self, from: &str, to: &str, label: &str, style: Option<&str>) {
        let _ = write!(self.out, "  {from} -> {to} [label=\"{}\"", escape_dot(label));
        if let Some(style) = style {
            let _ = write!(self.out, ", style={style}");
        }
        self.out.push_str("];\n");
    }

    pub(crate) fn finish(mut self) -> String {
        self.out.push_str("}\n");
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_descriptors() {
        assert_eq!(escape_dot("LFoo;.<init>:()V"), "LFoo;.\\<init\\>:()V");
        assert_eq!(escape_dot("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_dot("a\\b"), "a\\\\b");
        assert_eq!(escape_dot("l1\r\nl2"), "l1\\nl2");
        assert_eq!(escape_dot("{a|b}"), "\\{a\\|b\\}");
    }

    #[test]
    fn writer_emits_nodes_and_edges() {
        let mut dot = DotWriter::new("m");
        dot.node("B0", "B0", &["const v0 1".to_string()]);
        dot.node("B1", "B1", &[]);
        dot.edge("B0", "B1", "goto", None);
        dot.edge("B0", "B1", "catch", Some("dashed"));
        let text = dot.finish();

        assert!(text.starts_with("digraph \"m\" {"));
        assert!(text.contains("B0 [label=\"{B0\\lconst v0 1\\l}\"];"));
        assert!(text.contains("B0 -> B1 [label=\"goto\"];"));
        assert!(text.contains("style=dashed"));
        assert!(text.trim_end().ends_with('}'));
    }
}
