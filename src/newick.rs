//! Newick and NEXUS tree-log parsing.
//!
//! Handles the output of a Bayesian inference run: a NEXUS envelope with a
//! `Translate` table and one `tree STATE_x = [&R] ...;` line per sample, or a
//! bare file of Newick strings. Node comments in the BEAST style
//! (`[&rate=1.23,...]`) are parsed and the `rate` entry is attached to the
//! node as its branch-rate annotation.

use std::collections::HashMap;

use crate::error::{AdequacyError, PpResult};
use crate::tree::{Tree, TreeNode};

struct RawNode {
    name: Option<String>,
    length: f64,
    rate: Option<f64>,
    children: Vec<RawNode>,
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn fail(&self, msg: &str) -> AdequacyError {
        AdequacyError::Validation(format!("newick parse error at byte {}: {}", self.pos, msg))
    }

    fn subtree(&mut self) -> PpResult<RawNode> {
        self.skip_ws();
        let mut node = if self.peek() == Some(b'(') {
            self.bump();
            let mut children = vec![self.subtree()?];
            loop {
                self.skip_ws();
                match self.peek() {
                    Some(b',') => {
                        self.bump();
                        children.push(self.subtree()?);
                    }
                    Some(b')') => {
                        self.bump();
                        break;
                    }
                    _ => return Err(self.fail("expected ',' or ')'")),
                }
            }
            RawNode {
                name: None,
                length: 0.0,
                rate: None,
                children,
            }
        } else {
            RawNode {
                name: None,
                length: 0.0,
                rate: None,
                children: Vec::new(),
            }
        };

        self.skip_ws();
        let name = self.read_label();
        if !name.is_empty() {
            node.name = Some(name);
        }
        if let Some(meta) = self.read_metadata()? {
            if node.rate.is_none() {
                node.rate = meta.get("rate").and_then(|v| v.parse::<f64>().ok());
            }
        }
        self.skip_ws();
        if self.peek() == Some(b':') {
            self.bump();
            // BEAST sometimes places the branch comment after the colon.
            if let Some(meta) = self.read_metadata()? {
                if node.rate.is_none() {
                    node.rate = meta.get("rate").and_then(|v| v.parse::<f64>().ok());
                }
            }
            node.length = self.read_number()?;
        }
        Ok(node)
    }

    fn read_label(&mut self) -> String {
        if self.peek() == Some(b'\'') {
            // Quoted label: read to the closing quote.
            self.bump();
            let start = self.pos;
            while let Some(b) = self.peek() {
                if b == b'\'' {
                    break;
                }
                self.pos += 1;
            }
            let label = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
            self.bump();
            return label;
        }
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b',' | b'(' | b')' | b':' | b';' | b'[') || b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    /// Parse one `[...]` comment. Returns the key=value entries of a `[&...]`
    /// metadata block; plain comments are skipped and yield an empty map.
    fn read_metadata(&mut self) -> PpResult<Option<HashMap<String, String>>> {
        self.skip_ws();
        if self.peek() != Some(b'[') {
            return Ok(None);
        }
        self.bump();
        let annotated = self.peek() == Some(b'&');
        if annotated {
            self.bump();
        }
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.bump() {
                Some(b'{') => depth += 1,
                Some(b'}') => depth = depth.saturating_sub(1),
                Some(b']') if depth == 0 => break,
                Some(_) => {}
                None => return Err(self.fail("unterminated comment")),
            }
        }
        let body = String::from_utf8_lossy(&self.bytes[start..self.pos - 1]).into_owned();
        let mut map = HashMap::new();
        if annotated {
            for entry in split_top_level(&body) {
                if let Some((k, v)) = entry.split_once('=') {
                    map.insert(k.trim().to_string(), v.trim().to_string());
                }
            }
        }
        Ok(Some(map))
    }

    fn read_number(&mut self) -> PpResult<f64> {
        self.skip_ws();
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.fail("invalid number"))?;
        text.parse::<f64>()
            .map_err(|_| self.fail("invalid branch length"))
    }
}

/// Split a metadata body on commas that are not nested inside `{}`.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

/// Parse a single Newick string into a height-annotated [`Tree`].
///
/// Branch lengths become node heights: depth is accumulated root-to-tip and
/// every height is the maximum tip depth minus the node's own depth, so the
/// deepest tip sits at height 0.
pub fn parse_newick(input: &str) -> PpResult<Tree> {
    let trimmed = input.trim().trim_end_matches(';');
    let mut parser = Parser::new(trimmed);
    let raw = parser.subtree()?;
    parser.skip_ws();
    if parser.peek().is_some() {
        return Err(parser.fail("trailing input after tree"));
    }

    // First pass: depths. Second pass: arena nodes with heights.
    let mut max_depth: f64 = 0.0;
    collect_max_depth(&raw, 0.0, &mut max_depth);

    let mut nodes: Vec<TreeNode> = Vec::new();
    build_arena(&raw, None, 0.0, max_depth, &mut nodes);
    Tree::from_nodes(nodes, 0)
}

fn collect_max_depth(raw: &RawNode, depth: f64, max: &mut f64) {
    if depth > *max {
        *max = depth;
    }
    for child in &raw.children {
        collect_max_depth(child, depth + child.length, max);
    }
}

fn build_arena(
    raw: &RawNode,
    parent: Option<usize>,
    depth: f64,
    max_depth: f64,
    nodes: &mut Vec<TreeNode>,
) -> usize {
    let id = nodes.len();
    nodes.push(TreeNode {
        id,
        parent,
        children: Vec::new(),
        height: max_depth - depth,
        rate: raw.rate,
        name: raw.name.clone(),
    });
    for child in &raw.children {
        let child_id = build_arena(child, Some(id), depth + child.length, max_depth, nodes);
        nodes[id].children.push(child_id);
    }
    id
}

/// Parse the content of a tree log: a NEXUS trees block or bare Newick lines.
pub fn parse_tree_log(content: &str) -> PpResult<Vec<Tree>> {
    if content.trim_start().to_ascii_lowercase().starts_with("#nexus") {
        parse_nexus(content)
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && l.contains(';'))
            .map(parse_newick)
            .collect()
    }
}

fn parse_nexus(content: &str) -> PpResult<Vec<Tree>> {
    let mut translate: HashMap<String, String> = HashMap::new();
    let mut trees = Vec::new();
    let mut in_translate = false;

    for line in content.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("translate") {
            in_translate = true;
            let rest = &trimmed["translate".len()..];
            in_translate = !consume_translate_entries(rest, &mut translate);
            continue;
        }
        if in_translate {
            in_translate = !consume_translate_entries(trimmed, &mut translate);
            continue;
        }
        if lower.starts_with("tree ") || lower.starts_with("tree\t") {
            let newick = trimmed
                .split_once('=')
                .map(|(_, rhs)| rhs.trim())
                .ok_or_else(|| {
                    AdequacyError::Validation(format!("malformed tree line: {}", trimmed))
                })?;
            // Strip a leading rooting comment like [&R].
            let newick = strip_leading_comment(newick);
            let mut tree = parse_newick(newick)?;
            if !translate.is_empty() {
                apply_translate(&mut tree, &translate);
            }
            trees.push(tree);
        }
    }
    Ok(trees)
}

/// Feed one line of translate entries into `map`; returns true when the
/// terminating ';' was seen.
fn consume_translate_entries(line: &str, map: &mut HashMap<String, String>) -> bool {
    let done = line.contains(';');
    let body = line.trim_end_matches(';');
    for entry in body.split(',') {
        let mut toks = entry.split_whitespace();
        if let (Some(key), Some(name)) = (toks.next(), toks.next()) {
            map.insert(key.to_string(), name.trim_matches('\'').to_string());
        }
    }
    done
}

fn strip_leading_comment(s: &str) -> &str {
    let trimmed = s.trim_start();
    if let Some(rest) = trimmed.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[end + 1..].trim_start();
        }
    }
    trimmed
}

fn apply_translate(tree: &mut Tree, translate: &HashMap<String, String>) {
    for id in 0..tree.node_count() {
        if let Some(name) = tree.node(id).name.clone() {
            if let Some(full) = translate.get(&name) {
                tree.node_mut(id).name = Some(full.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_newick_heights() {
        let tree = parse_newick("((A:0.1,B:0.1):0.2,C:0.3);").unwrap();
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);
        let root = tree.root();
        assert!((tree.node(root).height - 0.3).abs() < 1e-12);
        // Leaf heights: all tips are equidistant here, so all sit at 0.
        for id in tree.leaves() {
            assert!(tree.node(id).height.abs() < 1e-12);
        }
    }

    #[test]
    fn non_ultrametric_tips_keep_relative_heights() {
        let tree = parse_newick("(A:0.1,B:0.3);").unwrap();
        let a = tree
            .leaves()
            .into_iter()
            .find(|&id| tree.node(id).name.as_deref() == Some("A"))
            .unwrap();
        assert!((tree.node(a).height - 0.2).abs() < 1e-12);
    }

    #[test]
    fn rate_annotation_before_colon() {
        let tree = parse_newick("(A[&rate=0.5]:0.1,B[&rate=2.0]:0.1);").unwrap();
        let rates: Vec<Option<f64>> = tree.leaves().iter().map(|&id| tree.node(id).rate).collect();
        assert!(rates.contains(&Some(0.5)));
        assert!(rates.contains(&Some(2.0)));
    }

    #[test]
    fn rate_annotation_after_colon() {
        let tree = parse_newick("(A:[&rate=1.5]0.2,B:0.2);").unwrap();
        let a = tree
            .leaves()
            .into_iter()
            .find(|&id| tree.node(id).name.as_deref() == Some("A"))
            .unwrap();
        assert_eq!(tree.node(a).rate, Some(1.5));
    }

    #[test]
    fn metadata_with_nested_braces() {
        let tree =
            parse_newick("(A[&rate=2.0,height_95%_HPD={0.1,0.4}]:0.1,B:0.1);").unwrap();
        let a = tree
            .leaves()
            .into_iter()
            .find(|&id| tree.node(id).name.as_deref() == Some("A"))
            .unwrap();
        assert_eq!(tree.node(a).rate, Some(2.0));
    }

    #[test]
    fn parses_nexus_with_translate() {
        let log = "#NEXUS\nBegin trees;\n\tTranslate\n\t\t1 human,\n\t\t2 chimp,\n\t\t3 gorilla;\ntree STATE_0 = [&R] ((1:0.1,2:0.1):0.1,3:0.2);\ntree STATE_1000 = [&R] ((1:0.2,2:0.2):0.1,3:0.3);\nEnd;\n";
        let trees = parse_tree_log(log).unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].leaf_names(), vec!["chimp", "gorilla", "human"]);
    }

    #[test]
    fn parses_bare_newick_lines() {
        let log = "(A:0.1,B:0.1);\n(A:0.2,B:0.2);\n";
        let trees = parse_tree_log(log).unwrap();
        assert_eq!(trees.len(), 2);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_newick("((A:0.1,B:0.1").is_err());
    }
}
