use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use phylotree::tree::Tree as PhyloTree;

use crate::error::ParseError;
use crate::tree::{Tree, TreeNode};

mod newick;

use newick::NormalisedNewick;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TreeFileFormat {
    Newick,
    Nexus,
}

/// Read an input file as text, the way an upload would hand it over.
pub fn read_upload(path: &Path, what: &str) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} file: {}", path.display()))?;
    info!("Read {what} file {} ({} bytes)", path.display(), raw.len());
    Ok(raw)
}

/// Parse the first tree of a Newick or Nexus document.
pub fn parse_tree_text(raw: &str) -> Result<Tree, ParseError> {
    match detect_format(raw) {
        TreeFileFormat::Newick => {
            let first = first_newick_statement(raw)?;
            build_tree(None, first, &HashMap::new())
        }
        TreeFileFormat::Nexus => {
            let nexus = parse_nexus(raw)?;
            build_tree(nexus.label, &nexus.newick, &nexus.translate)
        }
    }
}

fn detect_format(raw: &str) -> TreeFileFormat {
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || (trimmed.starts_with('[') && trimmed.ends_with(']')) {
            continue;
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("#NEXUS") || upper.starts_with("BEGIN ") {
            return TreeFileFormat::Nexus;
        }
        return TreeFileFormat::Newick;
    }

    TreeFileFormat::Newick
}

fn first_newick_statement(raw: &str) -> Result<&str, ParseError> {
    let mut statements = split_statements(raw)
        .into_iter()
        .filter(|statement| !statement.trim().is_empty());
    let first = statements.next().ok_or(ParseError::Empty)?;
    let remaining = statements.count();
    if remaining > 0 {
        warn!("Tree file holds {} additional tree(s); only the first is used", remaining);
    }
    Ok(first)
}

/// Split on `;` outside of quotes and `[...]` comments, keeping the terminator.
fn split_statements(raw: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut comment_depth = 0usize;
    let mut quote: Option<char> = None;

    for (offset, c) in raw.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if comment_depth == 0 => quote = Some(c),
            (None, '[') => comment_depth += 1,
            (None, ']') => comment_depth = comment_depth.saturating_sub(1),
            (None, ';') if comment_depth == 0 => {
                statements.push(&raw[start..=offset]);
                start = offset + 1;
            }
            _ => {}
        }
    }

    if !raw[start..].trim().is_empty() {
        statements.push(&raw[start..]);
    }
    statements
}

struct NexusTree {
    label: Option<String>,
    newick: String,
    translate: HashMap<String, String>,
}

fn parse_nexus(raw: &str) -> Result<NexusTree, ParseError> {
    let mut in_trees_block = false;
    let mut translate = HashMap::new();

    for statement in split_statements(raw) {
        let trimmed = statement_body(statement);
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("begin trees") {
            in_trees_block = true;
            continue;
        }
        if lower == "end" || lower == "endblock" {
            in_trees_block = false;
            continue;
        }
        if !in_trees_block {
            continue;
        }

        if lower.starts_with("translate") {
            translate = parse_translate(&trimmed["translate".len()..]);
        } else if let Some(rest) = strip_keyword(trimmed, &["tree", "utree"]) {
            let (label_part, tree_part) = rest.split_once('=').ok_or(ParseError::NoNexusTree)?;
            let label = label_part
                .trim()
                .trim_start_matches('*')
                .trim()
                .trim_matches('"')
                .trim_matches('\'');
            return Ok(NexusTree {
                label: (!label.is_empty()).then(|| label.to_owned()),
                newick: format!("{};", tree_part.trim()),
                translate,
            });
        }
    }

    Err(ParseError::NoNexusTree)
}

/// Statement text without the `#NEXUS` marker, leading comments and the terminator.
fn statement_body(statement: &str) -> &str {
    let mut text = statement.trim_start();
    loop {
        if text.starts_with('[') {
            match text.find(']') {
                Some(end) => text = text[end + 1..].trim_start(),
                None => break,
            }
        } else if text.get(..6).is_some_and(|head| head.eq_ignore_ascii_case("#nexus")) {
            text = text[6..].trim_start();
        } else {
            break;
        }
    }
    text.trim_end().trim_end_matches(';').trim_end()
}

fn strip_keyword<'a>(statement: &'a str, keywords: &[&str]) -> Option<&'a str> {
    let lower = statement.to_ascii_lowercase();
    keywords.iter().find_map(|keyword| {
        let rest = lower.strip_prefix(keyword)?;
        rest.starts_with(char::is_whitespace)
            .then(|| &statement[keyword.len()..])
    })
}

fn parse_translate(body: &str) -> HashMap<String, String> {
    body.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let (key, value) = entry.split_once(char::is_whitespace)?;
            let value = value.trim().trim_matches('\'').trim_matches('"');
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

fn build_tree(
    label: Option<String>,
    raw: &str,
    translate: &HashMap<String, String>,
) -> Result<Tree, ParseError> {
    let normalised = newick::normalise(raw)?;

    let mut arena = if normalised.is_single_node() {
        vec![single_node(&normalised)]
    } else {
        let phylo = PhyloTree::from_newick(&normalised.text).map_err(newick_error)?;
        arena_from_phylo(&phylo, &normalised)?
    };

    for node in arena.iter_mut().filter(|node| node.children.is_empty()) {
        if let Some(name) = node.name.as_ref().and_then(|name| translate.get(name)) {
            node.name = Some(name.clone());
        }
    }

    Ok(Tree::from_arena(label, arena, 0))
}

fn newick_error(err: impl std::fmt::Display) -> ParseError {
    ParseError::Newick {
        message: err.to_string(),
    }
}

fn single_node(normalised: &NormalisedNewick) -> TreeNode {
    let body = normalised.text.trim_end_matches(';');
    let (name, length) = match body.split_once(':') {
        Some((name, length)) => (name, length.parse::<f64>().ok()),
        None => (body, None),
    };
    let name = normalised.restore_label(name);
    TreeNode::new(0, (!name.is_empty()).then_some(name), length)
}

fn arena_from_phylo(
    phylo: &PhyloTree,
    normalised: &NormalisedNewick,
) -> Result<Vec<TreeNode>, ParseError> {
    let root = phylo.get_root().map_err(newick_error)?;
    let mut arena: Vec<TreeNode> = Vec::with_capacity(phylo.size());
    let mut stack = vec![(root, None)];

    while let Some((phylo_id, parent)) = stack.pop() {
        let node = phylo.get(&phylo_id).map_err(newick_error)?;
        let id = arena.len();
        let is_terminal = node.children.is_empty();

        let label = node
            .name
            .as_deref()
            .map(|name| normalised.restore_label(name))
            .filter(|name| !name.is_empty());
        let (name, confidence) = match label {
            Some(label) if !is_terminal => match label.parse::<f64>() {
                Ok(support) => (None, Some(support)),
                Err(_) => (Some(label), None),
            },
            other => (other, None),
        };

        let length = node.parent_edge.map(|length| {
            if length < 0.0 {
                warn!("Negative branch length {length} clamped to zero");
                0.0
            } else {
                length
            }
        });

        let mut tree_node = TreeNode::new(id, name, length);
        tree_node.confidence = confidence;
        tree_node.parent = parent;
        arena.push(tree_node);

        if let Some(parent) = parent {
            arena[parent].children.push(id);
        }
        for &child in node.children.iter().rev() {
            stack.push((child, Some(id)));
        }
    }

    Ok(arena)
}
